//! 一括インポート（クラウドシート/ローカルCSV → 在庫レコード）
//!
//! # 概要
//! CSV風のテキスト（ローカルファイルまたは公開URL）の各行について、
//! 先頭カラムをCAS番号または物質名とみなして解決パイプラインに通し、
//! 成功したものを在庫レコードとして登録する。
//!
//! # レート制限対策
//! PubChem への連続問い合わせになるため、バッチ間に固定ディレイを入れる。
//! 解決に失敗した行はスキップして件数のみ記録し、処理全体は止めない。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::batch_runner::{BatchResult, BatchRunner, BatchTask};
use crate::config::ImportConfig;
use crate::pubchem::{HazardResolutionService, PubChemClientTrait};
use crate::repository::{Chemical, ChemicalRepository, NewChemical};

/// 先頭カラムがこれらの値の行はヘッダとみなして読み飛ばす
const HEADER_VALUES: &[&str] = &["name", "cas", "cas_number", "chemical"];

/// リモート取得のタイムアウト（秒）
const FETCH_TIMEOUT_SECS: u64 = 30;

/// 1行から取り込み対象の識別子（CAS番号または物質名）を取り出す
///
/// 先頭のカンマ区切りカラムを採用し、引用符と前後の空白を除去する。
/// 空行・ヘッダ行は None を返す。
pub fn extract_identifier(line: &str) -> Option<String> {
    let first_column = line.split(',').next().unwrap_or("");
    let value = first_column.trim().trim_matches('"').trim().to_string();

    if value.is_empty() {
        return None;
    }
    if HEADER_VALUES.contains(&value.to_lowercase().as_str()) {
        return None;
    }
    Some(value)
}

/// HTTP(S) URL からテキストを取得する
async fn fetch_remote_text(source: &str) -> Result<String, String> {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| format!("Failed to create HTTPS connector: {e}"))?
        .https_or_http()
        .enable_http1()
        .build();
    let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(https);

    let req = Request::builder()
        .method(Method::GET)
        .uri(source)
        .body(Full::new(Bytes::new()))
        .map_err(|e| format!("Failed to build request: {e}"))?;

    let result = tokio::time::timeout(Duration::from_secs(FETCH_TIMEOUT_SECS), async {
        let response = client
            .request(req)
            .await
            .map_err(|e| format!("Failed to download import source: {e}"))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("Failed to read import source body: {e}"))?
            .to_bytes();
        Ok::<_, String>((status, body))
    })
    .await
    .map_err(|_| format!("Import source download timed out after {FETCH_TIMEOUT_SECS} seconds"))??;

    let (status, body) = result;
    if !status.is_success() {
        return Err(format!("Import source returned status {status}"));
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// 取り込み元から行のリストを読み込む（ローカルファイル または http(s) URL）
pub async fn read_lines_from_source(source: &str) -> Result<Vec<String>, String> {
    let is_remote = matches!(
        Url::parse(source).map(|u| u.scheme().to_string()),
        Ok(scheme) if scheme == "http" || scheme == "https"
    );

    let text = if is_remote {
        log::info!("Downloading import list from remote source");
        fetch_remote_text(source).await?
    } else {
        log::info!("Reading local import file: {source}");
        std::fs::read_to_string(source).map_err(|e| format!("Failed to read {source}: {e}"))?
    };

    Ok(text.lines().map(|l| l.to_string()).collect())
}

/// 薬品インポートのコンテキスト
pub struct ChemicalImportContext<C: PubChemClientTrait, R: ChemicalRepository> {
    pub resolver: Arc<HazardResolutionService<C>>,
    pub repository: Arc<R>,
}

/// 薬品インポートタスク
///
/// 1件の処理 = 解決パイプライン + レコード登録。失敗は件数として集計される。
pub struct ChemicalImportTask<C, R>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    _phantom: PhantomData<(C, R)>,
}

impl<C, R> ChemicalImportTask<C, R>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<C, R> Default for ChemicalImportTask<C, R>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<C, R> BatchTask for ChemicalImportTask<C, R>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    type Input = String;
    type Output = Chemical;
    type Context = ChemicalImportContext<C, R>;

    fn name(&self) -> &str {
        "chemical import"
    }

    async fn process(
        &self,
        identifier: Self::Input,
        context: &Self::Context,
    ) -> Result<Self::Output, String> {
        let resolution = context.resolver.resolve_for_import(&identifier).await;

        if !resolution.found {
            return Err(format!("'{identifier}' not found in PubChem"));
        }

        let name = resolution
            .suggested_name
            .unwrap_or_else(|| identifier.clone());

        // 数量0の参照アイテムとして登録する。数量は棚卸し時に更新される想定
        let record = NewChemical {
            name,
            cas_number: identifier,
            barcode: None,
            tracking_id: None,
            quantity_value: 0.0,
            quantity_unit: "ml".to_string(),
            hazards: resolution.hazards.join(", "),
            sds_link: resolution.sds_link,
            description: Some("Cloud Import".to_string()),
        };

        crate::create_chemical(context.repository.as_ref(), record).await
    }
}

/// 取り込み元を読み込み、全行をインポートする
pub async fn run_import<C, R>(
    config: &ImportConfig,
    resolver: Arc<HazardResolutionService<C>>,
    repository: Arc<R>,
) -> Result<BatchResult<Chemical>, String>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    let lines = read_lines_from_source(&config.source).await?;
    let identifiers: Vec<String> = lines.iter().filter_map(|l| extract_identifier(l)).collect();

    log::info!(
        "Import source has {} rows, {} usable identifiers",
        lines.len(),
        identifiers.len()
    );

    if identifiers.is_empty() {
        return Err("No usable rows found in import source".to_string());
    }

    let context = ChemicalImportContext {
        resolver,
        repository,
    };
    let runner = BatchRunner::new(
        ChemicalImportTask::new(),
        config.batch_size,
        config.delay_ms,
    );
    runner.run(identifiers, &context, || false).await
}
