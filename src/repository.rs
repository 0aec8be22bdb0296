//! リポジトリパターンによるDB操作の抽象化
//!
//! このモジュールはデータベース操作を抽象化し、テスト時にモック可能にします。
//! 在庫レコードは作成・一覧・検索・エクスポートのみで、更新・削除のAPIは存在しません。

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

/// 在庫レコード（chemicals テーブルの1行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chemical {
    pub id: i64,
    pub name: String,
    pub cas_number: String,
    pub barcode: Option<String>,
    pub tracking_id: Option<String>,
    pub quantity_value: f64,
    pub quantity_unit: String,
    pub hazards: String,
    pub sds_link: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

/// レコード作成リクエスト（クライアント送信値）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChemical {
    pub name: String,
    #[serde(default)]
    pub cas_number: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub quantity_value: f64,
    #[serde(default = "default_quantity_unit")]
    pub quantity_unit: String,
    #[serde(default)]
    pub hazards: String,
    #[serde(default)]
    pub sds_link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_quantity_unit() -> String {
    "ml".to_string()
}

/// 在庫レコードのDB操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChemicalRepository: Send + Sync {
    /// レコードを挿入し、採番済みの行を返す
    async fn insert_chemical(&self, record: &NewChemical) -> Result<Chemical, String>;

    /// IDで1件取得
    async fn get_chemical(&self, id: i64) -> Result<Option<Chemical>, String>;

    /// skip/limit 付きで一覧取得（id昇順）
    async fn list_chemicals(&self, skip: i64, limit: i64) -> Result<Vec<Chemical>, String>;

    /// 名前・CAS番号・バーコードに対する部分一致検索
    async fn search_chemicals(&self, query: &str) -> Result<Vec<Chemical>, String>;

    /// 全件取得（CSVエクスポート用）
    async fn all_chemicals(&self) -> Result<Vec<Chemical>, String>;

    /// トラッキングIDの重複チェック
    async fn tracking_id_exists(&self, tracking_id: &str) -> Result<bool, String>;

    /// レコード数を取得
    async fn count_chemicals(&self) -> Result<i64, String>;
}

/// SELECT 句の共通列リスト（行タプルの並びと一致させること）
const CHEMICAL_COLUMNS: &str = "id, name, cas_number, barcode, tracking_id, quantity_value, \
     quantity_unit, hazards, sds_link, description, created_at";

type ChemicalRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    f64,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn chemical_from_row(row: ChemicalRow) -> Chemical {
    Chemical {
        id: row.0,
        name: row.1,
        cas_number: row.2,
        barcode: row.3,
        tracking_id: row.4,
        quantity_value: row.5,
        quantity_unit: row.6,
        hazards: row.7,
        sds_link: row.8,
        description: row.9,
        created_at: row.10,
    }
}

/// SQLiteを使用したChemicalRepositoryの実装
pub struct SqliteChemicalRepository {
    pool: SqlitePool,
}

impl SqliteChemicalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChemicalRepository for SqliteChemicalRepository {
    async fn insert_chemical(&self, record: &NewChemical) -> Result<Chemical, String> {
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let id = sqlx::query(
            r#"
            INSERT INTO chemicals
                (name, cas_number, barcode, tracking_id, quantity_value,
                 quantity_unit, hazards, sds_link, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.name)
        .bind(&record.cas_number)
        .bind(record.barcode.as_deref())
        .bind(record.tracking_id.as_deref())
        .bind(record.quantity_value)
        .bind(&record.quantity_unit)
        .bind(&record.hazards)
        .bind(record.sds_link.as_deref())
        .bind(record.description.as_deref())
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert chemical: {e}"))?
        .last_insert_rowid();

        self.get_chemical(id)
            .await?
            .ok_or_else(|| format!("Inserted chemical {id} not found"))
    }

    async fn get_chemical(&self, id: i64) -> Result<Option<Chemical>, String> {
        let row: Option<ChemicalRow> = sqlx::query_as(&format!(
            "SELECT {CHEMICAL_COLUMNS} FROM chemicals WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to fetch chemical {id}: {e}"))?;

        Ok(row.map(chemical_from_row))
    }

    async fn list_chemicals(&self, skip: i64, limit: i64) -> Result<Vec<Chemical>, String> {
        let rows: Vec<ChemicalRow> = sqlx::query_as(&format!(
            "SELECT {CHEMICAL_COLUMNS} FROM chemicals ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to list chemicals: {e}"))?;

        Ok(rows.into_iter().map(chemical_from_row).collect())
    }

    async fn search_chemicals(&self, query: &str) -> Result<Vec<Chemical>, String> {
        // SQLite の LIKE はASCIIに対して大文字小文字を区別しない
        let pattern = format!("%{query}%");
        let rows: Vec<ChemicalRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHEMICAL_COLUMNS} FROM chemicals
            WHERE name LIKE ? OR cas_number LIKE ? OR barcode LIKE ?
            ORDER BY id
            "#
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to search chemicals: {e}"))?;

        Ok(rows.into_iter().map(chemical_from_row).collect())
    }

    async fn all_chemicals(&self) -> Result<Vec<Chemical>, String> {
        let rows: Vec<ChemicalRow> = sqlx::query_as(&format!(
            "SELECT {CHEMICAL_COLUMNS} FROM chemicals ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to fetch chemicals for export: {e}"))?;

        Ok(rows.into_iter().map(chemical_from_row).collect())
    }

    async fn tracking_id_exists(&self, tracking_id: &str) -> Result<bool, String> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM chemicals WHERE tracking_id = ? LIMIT 1")
                .bind(tracking_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| format!("Failed to check tracking id: {e}"))?;

        Ok(row.is_some())
    }

    async fn count_chemicals(&self) -> Result<i64, String> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chemicals")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count chemicals: {e}"))?;

        Ok(row.0)
    }
}

/// バージョン管理されたマイグレーション
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// 適用対象のマイグレーション一覧（バージョン昇順）
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "init",
            sql: include_str!("../migrations/001_init.sql"),
        },
        Migration {
            version: 2,
            description: "add_barcode",
            sql: include_str!("../migrations/002_add_barcode.sql"),
        },
    ]
}

/// 未適用のマイグレーションを順に適用する
///
/// 002 の ALTER TABLE は再実行できないため、適用済みバージョンを
/// _migrations テーブルに記録してスキップする。
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create migrations table: {e}"))?;

    for migration in migrations() {
        let applied: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM _migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await
                .map_err(|e| format!("Failed to read migrations table: {e}"))?;

        if applied.is_some() {
            continue;
        }

        sqlx::raw_sql(migration.sql)
            .execute(pool)
            .await
            .map_err(|e| {
                format!(
                    "Migration {} ({}) failed: {e}",
                    migration.version, migration.description
                )
            })?;

        sqlx::query("INSERT INTO _migrations (version, description, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .bind(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
            .execute(pool)
            .await
            .map_err(|e| format!("Failed to record migration {}: {e}", migration.version))?;

        log::info!(
            "Applied migration {}: {}",
            migration.version,
            migration.description
        );
    }

    Ok(())
}
