//! プロセスエントリポイント
//!
//! `chemtrack` はHTTPサーバとして起動する。
//! `chemtrack import [source]` で一括インポートを実行して終了する。

use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use chemtrack::config;
use chemtrack::pubchem::{HazardResolutionService, PubChemClient};
use chemtrack::repository::{run_migrations, SqliteChemicalRepository};
use chemtrack::server::{serve, AppState};

#[tokio::main]
async fn main() {
    // リリースビルドではWarnレベル以上、デバッグビルドではInfoレベル以上のログを出力
    #[cfg(debug_assertions)]
    let default_level = log::LevelFilter::Info;
    #[cfg(not(debug_assertions))]
    let default_level = log::LevelFilter::Warn;

    env_logger::Builder::from_default_env()
        .filter_level(default_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = config::load(Path::new(".")).expect("failed to load config");

    let db_url = format!("sqlite:{}", config.database.path);
    log::info!("Database path: {}", config.database.path);

    let options = SqliteConnectOptions::from_str(&db_url)
        .expect("Failed to parse database URL")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .expect("Failed to create sqlx pool");

    run_migrations(&pool).await.expect("failed to run migrations");

    let client = PubChemClient::new(&config.pubchem).expect("failed to create PubChem client");
    let resolver = HazardResolutionService::new(client, &config.pubchem.web_base_url);
    let repository = SqliteChemicalRepository::new(pool);

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("import") {
        let mut import_config = config.import.clone();
        if let Some(source) = args.get(2) {
            import_config.source = source.clone();
        }

        match chemtrack::import::run_import(
            &import_config,
            Arc::new(resolver),
            Arc::new(repository),
        )
        .await
        {
            Ok(result) => {
                log::info!(
                    "Import finished: {} success, {} failed",
                    result.success_count,
                    result.failed_count
                );
            }
            Err(e) => {
                log::error!("Import failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let state = Arc::new(AppState {
        repository,
        resolver,
    });
    if let Err(e) = serve(&config.server.bind_addr, state).await {
        log::error!("Server error: {e}");
        std::process::exit(1);
    }
}
