//! アプリケーション設定ファイルの管理
//!
//! server / database / pubchem / import の各設定を chemtrack_config.json で管理する。
//! 在庫データは DB テーブル、設定はこのファイルに分離する。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILENAME: &str = "chemtrack_config.json";

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pubchem: PubChemConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

/// HTTPサーバ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// データベース設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// PubChem 呼び出し設定
///
/// base URL はテストや検証環境で差し替えられるよう設定に出している。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubChemConfig {
    pub api_base_url: String,
    pub web_base_url: String,
    pub request_timeout_secs: u64,
}

/// 一括インポート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// 取り込み元（ローカルファイルパス または http(s) URL）
    pub source: String,
    /// バッチ間のディレイ（ミリ秒）。PubChem のレート制限対策
    pub delay_ms: u64,
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "chemtrack_data.db".to_string(),
        }
    }
}

impl Default for PubChemConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://pubchem.ncbi.nlm.nih.gov/rest".to_string(),
            web_base_url: "https://pubchem.ncbi.nlm.nih.gov".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source: "import.csv".to_string(),
            delay_ms: 500,
            batch_size: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            pubchem: PubChemConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

/// 設定を読み込む。ファイルが存在しない場合はデフォルトを返し、保存する。
pub fn load(config_dir: &Path) -> Result<AppConfig, String> {
    let path = config_dir.join(CONFIG_FILENAME);

    if path.exists() {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        serde_json::from_str(&contents).map_err(|e| format!("Invalid config JSON: {e}"))
    } else {
        let config = AppConfig::default();
        save(config_dir, &config)?;
        Ok(config)
    }
}

/// 設定を保存する。
pub fn save(config_dir: &Path, config: &AppConfig) -> Result<(), String> {
    std::fs::create_dir_all(config_dir).map_err(|e| format!("Failed to create config dir: {e}"))?;

    let path = config_dir.join(CONFIG_FILENAME);
    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    fs::write(&path, contents).map_err(|e| format!("Failed to write config file: {e}"))
}
