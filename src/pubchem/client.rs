//! PubChem PUG REST クライアント
//!
//! # 送信データ
//! PubChem に送るのは化学物質名（または CID）のみ。在庫の数量・保管場所などは送信しない。
//!
//! # レート制限
//! PubChem は短時間の連続リクエストを制限するため、一括処理側でディレイを入れること。

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::PubChemConfig;

/// PubChem 呼び出しの内部エラー分類
///
/// 外部契約は `found` の真偽のみだが、内部では「接続できない/タイムアウト/非2xx」と
/// 「応答は返ったが期待した形ではない」を区別して記録する。
#[derive(Debug, Clone, PartialEq)]
pub enum PubChemError {
    /// ネットワーク断・タイムアウト・非2xxステータス
    Unavailable(String),
    /// JSONとして不正、または期待キーの欠落
    Malformed(String),
}

impl fmt::Display for PubChemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PubChemError::Unavailable(msg) => write!(f, "PubChem unavailable: {msg}"),
            PubChemError::Malformed(msg) => write!(f, "PubChem response malformed: {msg}"),
        }
    }
}

/// CID検索レスポンスの構造
#[derive(Debug, Deserialize)]
struct CidSearchResponse {
    #[serde(rename = "IdentifierList")]
    identifier_list: Option<IdentifierList>,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID")]
    cids: Vec<u64>,
}

/// 物質名（Title）レスポンスの構造
#[derive(Debug, Deserialize)]
struct PropertyTableResponse {
    #[serde(rename = "PropertyTable")]
    property_table: Option<PropertyTable>,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties")]
    properties: Vec<PropertyEntry>,
}

#[derive(Debug, Deserialize)]
struct PropertyEntry {
    #[serde(rename = "Title")]
    title: Option<String>,
}

/// PubChem クライアントトレイト（テスト用モック対応）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PubChemClientTrait: Send + Sync {
    /// 物質名から CID を検索（返り値は PubChem の返却順）
    async fn search_cids(&self, name: &str) -> Result<Vec<u64>, PubChemError>;

    /// GHS分類ビューを生テキストとして取得
    ///
    /// 呼び出し側はツリー構造をパースせず、ハザードコードの部分文字列だけを見る
    async fn fetch_ghs_classification(&self, cid: u64) -> Result<String, PubChemError>;

    /// CID の正式名称（Title プロパティ）を取得
    async fn fetch_title(&self, cid: u64) -> Result<String, PubChemError>;
}

/// PubChem PUG REST クライアント実装
pub struct PubChemClient {
    api_base_url: String,
    request_timeout: Duration,
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl PubChemClient {
    pub fn new(config: &PubChemConfig) -> Result<Self, String> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| format!("Failed to create HTTPS connector: {e}"))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        log::info!(
            "PubChemClient created: base={}, timeout={}s",
            config.api_base_url,
            config.request_timeout_secs
        );

        Ok(Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            http_client,
        })
    }

    /// CID検索エンドポイントURLを構築
    fn cid_search_url(&self, name: &str) -> String {
        format!(
            "{}/pug/compound/name/{}/cids/JSON",
            self.api_base_url,
            urlencoding::encode(name)
        )
    }

    /// GHS分類ビューのURLを構築
    fn ghs_view_url(&self, cid: u64) -> String {
        format!(
            "{}/pug_view/data/compound/{}/JSON?heading=GHS%20Classification",
            self.api_base_url, cid
        )
    }

    /// TitleプロパティのURLを構築
    fn title_url(&self, cid: u64) -> String {
        format!(
            "{}/pug/compound/cid/{}/property/Title/JSON",
            self.api_base_url, cid
        )
    }

    /// GETを1回実行し、2xxならボディをテキストで返す
    async fn get_text(&self, url: &str) -> Result<String, PubChemError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header("Accept", "application/json")
            .body(Full::new(Bytes::new()))
            .map_err(|e| PubChemError::Unavailable(format!("Failed to build request: {e}")))?;

        // ハングしたリクエストが resolve を永久に塞がないようタイムアウトを設定
        let request_result = tokio::time::timeout(self.request_timeout, async {
            let response = self
                .http_client
                .request(req)
                .await
                .map_err(|e| format!("Failed to send request to PubChem: {e}"))?;
            let status = response.status();
            let body_bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| format!("Failed to read response body: {e}"))?
                .to_bytes();
            Ok::<_, String>((status, body_bytes))
        })
        .await;

        let (status, body_bytes) = match request_result {
            Ok(Ok((s, b))) => (s, b),
            Ok(Err(e)) => return Err(PubChemError::Unavailable(e)),
            Err(_) => {
                return Err(PubChemError::Unavailable(format!(
                    "Request timed out after {} seconds",
                    self.request_timeout.as_secs()
                )))
            }
        };

        if !status.is_success() {
            // ボディ全文はログに出さず、メタ情報のみ
            log::debug!(
                "PubChem non-success response: status={}, body_length={}",
                status,
                body_bytes.len()
            );
            return Err(PubChemError::Unavailable(format!(
                "PubChem returned status {status}"
            )));
        }

        Ok(String::from_utf8_lossy(&body_bytes).into_owned())
    }
}

/// CID検索レスポンスをパース
fn parse_cid_response(body: &str) -> Result<Vec<u64>, PubChemError> {
    let parsed: CidSearchResponse = serde_json::from_str(body)
        .map_err(|e| PubChemError::Malformed(format!("CID search response is not JSON: {e}")))?;

    let list = parsed.identifier_list.ok_or_else(|| {
        PubChemError::Malformed("CID search response is missing IdentifierList".to_string())
    })?;

    Ok(list.cids)
}

/// Titleプロパティレスポンスをパース
fn parse_title_response(body: &str) -> Result<String, PubChemError> {
    let parsed: PropertyTableResponse = serde_json::from_str(body)
        .map_err(|e| PubChemError::Malformed(format!("Title response is not JSON: {e}")))?;

    parsed
        .property_table
        .and_then(|t| t.properties.into_iter().next())
        .and_then(|p| p.title)
        .ok_or_else(|| PubChemError::Malformed("Title response is missing Title".to_string()))
}

#[async_trait]
impl PubChemClientTrait for PubChemClient {
    async fn search_cids(&self, name: &str) -> Result<Vec<u64>, PubChemError> {
        log::info!("Searching PubChem CID for name (length={})", name.len());
        let body = self.get_text(&self.cid_search_url(name)).await?;
        parse_cid_response(&body)
    }

    async fn fetch_ghs_classification(&self, cid: u64) -> Result<String, PubChemError> {
        log::info!("Fetching GHS classification for CID {cid}");
        // ツリーはパースしない。生テキストを返し、タグ導出は呼び出し側で行う
        self.get_text(&self.ghs_view_url(cid)).await
    }

    async fn fetch_title(&self, cid: u64) -> Result<String, PubChemError> {
        log::info!("Fetching title for CID {cid}");
        let body = self.get_text(&self.title_url(cid)).await?;
        parse_title_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_uri: &str) -> PubChemConfig {
        PubChemConfig {
            api_base_url: format!("{server_uri}/rest"),
            web_base_url: server_uri.to_string(),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_parse_cid_response_ok() {
        let cids = parse_cid_response(r#"{"IdentifierList":{"CID":[180,241]}}"#).unwrap();
        assert_eq!(cids, vec![180, 241]);
    }

    #[test]
    fn test_parse_cid_response_missing_identifier_list() {
        let err = parse_cid_response(r#"{"Fault":{"Code":"PUGREST.NotFound"}}"#).unwrap_err();
        assert!(matches!(err, PubChemError::Malformed(_)));
    }

    #[test]
    fn test_parse_cid_response_invalid_json() {
        let err = parse_cid_response("<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, PubChemError::Malformed(_)));
    }

    #[test]
    fn test_parse_title_response_ok() {
        let title = parse_title_response(
            r#"{"PropertyTable":{"Properties":[{"CID":180,"Title":"Acetone"}]}}"#,
        )
        .unwrap();
        assert_eq!(title, "Acetone");
    }

    #[test]
    fn test_parse_title_response_missing_title() {
        let err = parse_title_response(r#"{"PropertyTable":{"Properties":[]}}"#).unwrap_err();
        assert!(matches!(err, PubChemError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_search_cids_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/pug/compound/name/acetone/cids/JSON"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"IdentifierList":{"CID":[180]}}"#),
            )
            .mount(&server)
            .await;

        let client = PubChemClient::new(&test_config(&server.uri())).unwrap();
        let cids = client.search_cids("acetone").await.unwrap();
        assert_eq!(cids, vec![180]);
    }

    #[tokio::test]
    async fn test_search_cids_non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"Fault":{"Code":"PUGREST.NotFound"}}"#,
            ))
            .mount(&server)
            .await;

        let client = PubChemClient::new(&test_config(&server.uri())).unwrap();
        let err = client.search_cids("no such thing").await.unwrap_err();
        assert!(matches!(err, PubChemError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_ghs_classification_returns_raw_body() {
        let server = MockServer::start().await;
        let raw = r#"{"Record":{"Section":[{"Information":"H225 H319"}]}}"#;
        Mock::given(method("GET"))
            .and(path("/rest/pug_view/data/compound/180/JSON"))
            .and(query_param("heading", "GHS Classification"))
            .respond_with(ResponseTemplate::new(200).set_body_string(raw))
            .mount(&server)
            .await;

        let client = PubChemClient::new(&test_config(&server.uri())).unwrap();
        let body = client.fetch_ghs_classification(180).await.unwrap();
        // 生テキストをそのまま返す（構造パースはしない）
        assert_eq!(body, raw);
    }

    #[tokio::test]
    async fn test_fetch_title_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/pug/compound/cid/180/property/Title/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"PropertyTable":{"Properties":[{"CID":180,"Title":"Acetone"}]}}"#,
            ))
            .mount(&server)
            .await;

        let client = PubChemClient::new(&test_config(&server.uri())).unwrap();
        assert_eq!(client.fetch_title(180).await.unwrap(), "Acetone");
    }
}
