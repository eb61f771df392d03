//! Forwarding client for worker inference APIs.
//!
//! Opens one HTTP/1.1 connection per request to the chosen worker and
//! streams the worker's response back unchanged, minus hop-by-hop
//! headers.

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, Request, Response};
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const HOP_BY_HOP: [HeaderName; 4] = [
    CONNECTION,
    TRANSFER_ENCODING,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("upgrade"),
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper::Error),

    #[error("invalid upstream request: {0}")]
    Build(#[from] http::Error),
}

/// POST `body` as JSON to `http://{endpoint}{path}`.
pub async fn forward_json(
    endpoint: &str,
    path: &str,
    body: Bytes,
) -> Result<Response<Body>, ProxyError> {
    let uri = format!("http://{endpoint}{path}");

    let stream = tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(endpoint))
        .await
        .map_err(|_| ProxyError::ConnectTimeout(endpoint.to_string()))?
        .map_err(|source| ProxyError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(ProxyError::Handshake)?;

    // Drive the connection until the response body is fully streamed.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection closed with error");
        }
    });

    let req = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(HOST, endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body))?;

    let resp = sender.send_request(req).await.map_err(ProxyError::Upstream)?;
    debug!(%uri, status = %resp.status(), "upstream responded");

    let (mut parts, incoming) = resp.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(incoming)))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}
