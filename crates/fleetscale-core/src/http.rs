//! Minimal JSON-over-HTTP/1 client.
//!
//! One TCP connection per request, driven by hyper's low-level client
//! connection API. The entire exchange (connect, handshake, request, body)
//! runs under a single deadline so a stalled peer can never block a check.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Transport-level failures. HTTP error statuses are not errors here; they
/// come back in [`HttpResponse::status`].
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme in {0} (only http:// is supported)")]
    UnsupportedScheme(String),

    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("http handshake failed: {0}")]
    Handshake(String),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("request failed: {0}")]
    Send(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type HttpResult<T> = Result<T, HttpError>;

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send one request and buffer the response, all within `timeout`.
///
/// `headers` are added after the defaults (`host`, `user-agent`, `accept`).
/// When `body` is present it is sent as `application/json` unless the caller
/// supplies its own `content-type`.
pub async fn send(
    method: Method,
    url: &str,
    headers: &[(&str, &str)],
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> HttpResult<HttpResponse> {
    let uri: Uri = url
        .parse()
        .map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;
    if uri.scheme_str() != Some("http") {
        return Err(HttpError::UnsupportedScheme(url.to_string()));
    }
    let host = uri
        .host()
        .ok_or_else(|| HttpError::InvalidUrl(format!("{url}: missing host")))?;
    let addr = format!("{host}:{}", uri.port_u16().unwrap_or(80));
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let exchange = async move {
        let stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| HttpError::Connect {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HttpError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let has_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path.as_str())
            .header(HOST, addr.as_str())
            .header(USER_AGENT, "fleetscale/0.1")
            .header(ACCEPT, "application/json");
        if body.is_some() && !has_content_type {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Send(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?
            .to_bytes();

        debug!(%method, %url, %status, bytes = body.len(), "http exchange complete");
        Ok(HttpResponse { status, body })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::Timeout(timeout)),
    }
}
