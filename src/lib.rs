//! chemtrack: 薬品在庫トラッカー
//!
//! 在庫レコードのCRUD（作成・一覧・検索・CSVエクスポート）と、
//! PubChem を使ったハザード分類の提案を提供する。HTTP層は `server`、
//! 永続化は `repository`、解決パイプラインは `pubchem` に分離している。

use once_cell::sync::Lazy;
use regex::Regex;

pub mod batch_runner;
pub mod config;
pub mod csv_export;
pub mod import;
pub mod pubchem;
pub mod repository;
pub mod server;

use crate::pubchem::{HazardResolutionService, PubChemClientTrait, Resolution};
use crate::repository::{Chemical, ChemicalRepository, NewChemical};

/// 一覧取得の最大件数（LIMITの上限）
pub const MAX_PAGE_SIZE: i64 = 500;

/// 一覧取得のデフォルト件数
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// CAS登録番号の形式（2〜7桁-2桁-チェック1桁）
static CAS_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2,7}-\d{2}-\d$").expect("invalid CAS regex"));

/// 値がCAS番号の形式かどうか
///
/// チェックディジットまでは検証しない。形式チェックのみ
pub fn is_valid_cas_number(value: &str) -> bool {
    CAS_NUMBER_RE.is_match(value)
}

/// トラッキングIDを生成（uuid v4 の先頭8文字）
///
/// 容器ラベルに手書き・印字できる長さを優先している
pub fn generate_tracking_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 在庫レコードを作成する
///
/// トラッキングIDが指定されていれば重複をチェックし、未指定なら生成する。
/// 数量は非負であること。
pub async fn create_chemical<R>(repo: &R, mut record: NewChemical) -> Result<Chemical, String>
where
    R: ChemicalRepository,
{
    if record.name.trim().is_empty() {
        return Err("Chemical name must not be empty".to_string());
    }
    if !record.quantity_value.is_finite() || record.quantity_value < 0.0 {
        return Err("Quantity must be a non-negative number".to_string());
    }
    if !record.cas_number.is_empty() && !is_valid_cas_number(&record.cas_number) {
        // CAS欄には商品名やバーコードが入ってくることもあるため、拒否せずログのみ
        log::debug!(
            "cas_number does not look like a CAS number (length={})",
            record.cas_number.len()
        );
    }

    let supplied_tracking_id = record.tracking_id.clone().filter(|t| !t.is_empty());
    if let Some(tracking_id) = supplied_tracking_id {
        if repo.tracking_id_exists(&tracking_id).await? {
            return Err("Tracking ID already registered".to_string());
        }
    } else {
        // 生成IDの衝突はUNIQUE制約が最終防衛線になる
        record.tracking_id = Some(generate_tracking_id());
    }

    repo.insert_chemical(&record).await
}

/// 在庫レコードを一覧取得する（skip/limit はここで正規化する）
pub async fn list_chemicals<R>(repo: &R, skip: i64, limit: i64) -> Result<Vec<Chemical>, String>
where
    R: ChemicalRepository,
{
    let skip = skip.max(0);
    let limit = if limit <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    };
    repo.list_chemicals(skip, limit).await
}

/// 名前・CAS番号・バーコードで部分一致検索する
pub async fn search_chemicals<R>(repo: &R, query: &str) -> Result<Vec<Chemical>, String>
where
    R: ChemicalRepository,
{
    let query = query.trim();
    if query.is_empty() {
        return Err("Search query must not be empty".to_string());
    }
    repo.search_chemicals(query).await
}

/// 全レコードをCSVテキストとしてエクスポートする
pub async fn export_inventory_csv<R>(repo: &R) -> Result<String, String>
where
    R: ChemicalRepository,
{
    let records = repo.all_chemicals().await?;
    log::info!("Exporting {} chemicals to CSV", records.len());
    Ok(csv_export::render_inventory_csv(&records))
}

/// 商品名からハザード分類を解決する
///
/// パイプライン内の失敗は found=false に畳み込まれるため、
/// この関数がErrを返すのは入力が空のときだけ
pub async fn resolve_chemical<C>(
    resolver: &HazardResolutionService<C>,
    query: &str,
) -> Result<Resolution, String>
where
    C: PubChemClientTrait,
{
    let query = query.trim();
    if query.is_empty() {
        return Err("Query must not be empty".to_string());
    }
    Ok(resolver.resolve(query).await)
}
