//! HTTPサーバ（薄いルーティング層）
//!
//! ここではリクエストの受け口とJSON整形のみを行い、バリデーションや
//! 永続化はサービス層（lib.rs）とリポジトリに委譲する。
//! ルート構成:
//! - GET  /            死活確認
//! - GET  /chemicals   一覧（skip/limit）
//! - POST /chemicals   作成
//! - GET  /search      検索（q）
//! - GET  /export_csv  CSVエクスポート
//! - GET  /resolve     ハザード解決（q）

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::pubchem::{HazardResolutionService, PubChemClientTrait};
use crate::repository::{ChemicalRepository, NewChemical};
use crate::DEFAULT_PAGE_SIZE;

/// ハンドラが共有するアプリケーション状態
pub struct AppState<C: PubChemClientTrait, R: ChemicalRepository> {
    pub repository: R,
    pub resolver: HazardResolutionService<C>,
}

/// クエリ文字列から指定キーの値を取り出す（URLデコード込み）
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        if key != name {
            continue;
        }
        let raw = parts.next().unwrap_or("").replace('+', " ");
        return match urlencoding::decode(&raw) {
            Ok(decoded) => Some(decoded.into_owned()),
            Err(_) => Some(raw),
        };
    }
    None
}

fn query_param_i64(query: Option<&str>, name: &str, default: i64) -> i64 {
    query_param(query, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("response builder with static parts")
}

/// エラー応答（{"detail": "..."} 形式）
fn error_response(status: StatusCode, detail: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "detail": detail }))
}

fn csv_response(csv: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/csv; charset=utf-8")
        .header("Content-Disposition", "attachment; filename=inventory.csv")
        .body(Full::new(Bytes::from(csv)))
        .expect("response builder with static parts")
}

/// サービス層のエラーをHTTPステータスに割り当てる
///
/// リポジトリ層のメッセージは "Failed to" で始まる規約（= サーバ内部起因で500）。
/// それ以外はクライアント入力起因として400を返す
fn status_for_error(message: &str) -> StatusCode {
    if message.starts_with("Failed to") {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// メソッド+パスでディスパッチする
async fn route<C, R>(
    state: &AppState<C, R>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>>
where
    C: PubChemClientTrait,
    R: ChemicalRepository,
{
    if method == Method::GET && path == "/" {
        return match state.repository.count_chemicals().await {
            Ok(count) => json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "message": "Chemical inventory API is live",
                    "records": count,
                }),
            ),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
        };
    }

    if method == Method::GET && path == "/chemicals" {
        let skip = query_param_i64(query, "skip", 0);
        let limit = query_param_i64(query, "limit", DEFAULT_PAGE_SIZE);
        return match crate::list_chemicals(&state.repository, skip, limit).await {
            Ok(chemicals) => json_response(StatusCode::OK, &chemicals),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
        };
    }

    if method == Method::POST && path == "/chemicals" {
        let record: NewChemical = match serde_json::from_slice(&body) {
            Ok(record) => record,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {e}"))
            }
        };
        return match crate::create_chemical(&state.repository, record).await {
            Ok(chemical) => json_response(StatusCode::OK, &chemical),
            Err(e) => error_response(status_for_error(&e), &e),
        };
    }

    if method == Method::GET && path == "/search" {
        let q = match query_param(query, "q") {
            Some(q) if !q.trim().is_empty() => q,
            _ => return error_response(StatusCode::BAD_REQUEST, "Query parameter 'q' is required"),
        };
        return match crate::search_chemicals(&state.repository, &q).await {
            Ok(chemicals) => json_response(StatusCode::OK, &chemicals),
            Err(e) => error_response(status_for_error(&e), &e),
        };
    }

    if method == Method::GET && path == "/export_csv" {
        return match crate::export_inventory_csv(&state.repository).await {
            Ok(csv) => csv_response(csv),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
        };
    }

    if method == Method::GET && path == "/resolve" {
        let q = match query_param(query, "q") {
            Some(q) if !q.trim().is_empty() => q,
            _ => return error_response(StatusCode::BAD_REQUEST, "Query parameter 'q' is required"),
        };
        return match crate::resolve_chemical(&state.resolver, &q).await {
            Ok(resolution) => json_response(StatusCode::OK, &resolution),
            Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
        };
    }

    error_response(StatusCode::NOT_FOUND, "Not Found")
}

async fn handle_request<C, R>(
    state: Arc<AppState<C, R>>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>>
where
    C: PubChemClientTrait,
    R: ChemicalRepository,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read request body: {e}"),
            )
        }
    };

    let response = route(state.as_ref(), &method, &path, query.as_deref(), body).await;
    log::info!("{} {} -> {}", method, path, response.status());
    response
}

/// HTTPサーバを起動し、接続を受け続ける
pub async fn serve<C, R>(bind_addr: &str, state: Arc<AppState<C, R>>) -> Result<(), String>
where
    C: PubChemClientTrait + 'static,
    R: ChemicalRepository + 'static,
{
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("Invalid bind address '{bind_addr}': {e}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {addr}: {e}"))?;

    log::info!("Listening on http://{addr}");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| format!("Failed to accept connection: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_request(state, req).await) }
            });

            if let Err(e) = ConnectionBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                log::debug!("Connection error from {peer}: {e}");
            }
        });
    }
}
