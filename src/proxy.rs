//! Dashboard reverse proxy
//!
//! Forwards allowed requests to the locally bound dashboard server,
//! preserving the original path, and bridges WebSocket connections in
//! both directions. Backend failures surface as a uniform 500; the raw
//! transport error never reaches the caller.

use axum::{
    body::Body,
    extract::{
        ws::{CloseFrame, Message as ClientMessage, WebSocket, WebSocketUpgrade},
        FromRequestParts, Request, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::CloseFrame as UpstreamCloseFrame, Message as UpstreamMessage},
};
use tracing::{debug, error, info};

use crate::server::AppState;

/// Ceiling on connection establishment and unary HTTP exchanges. An
/// upgraded WebSocket stream is long-lived and not subject to it.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest request body the proxy will buffer for forwarding.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// CSP permitting the dashboard's inline/eval scripts, same origin only.
const CONTENT_SECURITY_POLICY: &str = "script-src 'self' 'unsafe-inline' 'unsafe-eval';";

/// Headers that are connection-scoped and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

#[derive(Debug, Error)]
enum ProxyError {
    #[error("dashboard server request failed: {0}")]
    Backend(String),

    #[error("request body unreadable: {0}")]
    Body(String),
}

/// Fallback handler for everything the gateway lets through.
pub async fn handle(State(state): State<AppState>, req: Request) -> Response {
    // axum 0.8 has no `Option<WebSocketUpgrade>` extractor, so pull the
    // optional upgrade off the request parts by hand: success means a
    // valid upgrade request, failure means an ordinary HTTP request.
    let (mut parts, body) = req.into_parts();
    let ws = WebSocketUpgrade::from_request_parts(&mut parts, &state)
        .await
        .ok();
    let req = Request::from_parts(parts, body);

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    if let Some(upgrade) = ws {
        let target = format!(
            "ws://127.0.0.1:{}{}",
            state.config.backend_port, path_and_query
        );
        debug!("bridging websocket to {}", target);
        return upgrade.on_upgrade(move |socket| bridge_websocket(socket, target));
    }

    match forward_http(&state, req, &path_and_query).await {
        Ok(response) => response,
        Err(err) => {
            error!("error proxying request '{}': {}", path_and_query, err);
            backend_error()
        }
    }
}

async fn forward_http(
    state: &AppState,
    req: Request,
    path_and_query: &str,
) -> Result<Response, ProxyError> {
    // The original path is forwarded verbatim; nothing upstream of
    // this handler may have rewritten it.
    let target = format!(
        "http://127.0.0.1:{}{}",
        state.config.backend_port, path_and_query
    );
    let method = req.method().clone();

    let mut outbound = HeaderMap::new();
    for (name, value) in req.headers() {
        if !is_hop_by_hop(name) {
            outbound.append(name.clone(), value.clone());
        }
    }

    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::Body(e.to_string()))?;

    let upstream_response = state
        .upstream
        .request(method.clone(), &target)
        .headers(outbound)
        .body(body)
        .timeout(PROXY_TIMEOUT)
        .send()
        .await
        .map_err(|e| ProxyError::Backend(e.to_string()))?;

    info!(
        "dashboard server response for {} {}: {}",
        method,
        path_and_query,
        upstream_response.status()
    );

    let mut builder = Response::builder().status(upstream_response.status());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in upstream_response.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        rewrite_security_headers(headers);
    }

    builder
        .body(Body::from_stream(upstream_response.bytes_stream()))
        .map_err(|e| ProxyError::Backend(e.to_string()))
}

/// Relax the response headers that would stop the dashboard from
/// rendering inside the host UI's iframe.
pub fn rewrite_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn backend_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Error proxying request" })),
    )
        .into_response()
}

/// Pump messages between the caller's socket and the dashboard server
/// until either side closes. The connect attempt is bounded; the open
/// stream is not.
async fn bridge_websocket(client: WebSocket, target: String) {
    let upstream = match tokio::time::timeout(PROXY_TIMEOUT, connect_async(target)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(err)) => {
            error!("failed to reach dashboard server websocket: {}", err);
            return;
        }
        Err(_) => {
            error!("timed out connecting to dashboard server websocket");
            return;
        }
    };

    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    let (mut client_tx, mut client_rx) = client.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let Some(message) = into_upstream(message) else {
                continue;
            };
            let closing = matches!(message, UpstreamMessage::Close(_));
            if upstream_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = into_client(message) else {
                continue;
            };
            let closing = matches!(message, ClientMessage::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => debug!("websocket caller closed"),
        _ = upstream_to_client => debug!("dashboard server closed websocket"),
    }
}

fn into_upstream(message: ClientMessage) -> Option<UpstreamMessage> {
    match message {
        ClientMessage::Text(text) => Some(UpstreamMessage::Text(text.as_str().to_owned().into())),
        ClientMessage::Binary(data) => Some(UpstreamMessage::Binary(data)),
        ClientMessage::Ping(data) => Some(UpstreamMessage::Ping(data)),
        ClientMessage::Pong(data) => Some(UpstreamMessage::Pong(data)),
        ClientMessage::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| {
            UpstreamCloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned().into(),
            }
        }))),
    }
}

fn into_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text.as_str().to_owned().into())),
        UpstreamMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        UpstreamMessage::Ping(data) => Some(ClientMessage::Ping(data)),
        UpstreamMessage::Pong(data) => Some(ClientMessage::Pong(data)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        }))),
        // Raw frames are an internal tungstenite detail.
        UpstreamMessage::Frame(_) => None,
    }
}
