//! Request authentication gateway
//!
//! Per-request decision in front of the proxy: static assets, the root
//! document and WebSocket upgrades pass through untouched; everything
//! else must carry a caller token the identity provider accepts. No
//! session state is kept between requests; validation repeats per
//! request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::identity::{CredentialValidator, IdentityError};

/// Header carrying the caller's token.
pub const TOKEN_HEADER: &str = "x-backstage-token";

/// Path prefixes the dashboard serves without authentication.
const STATIC_ASSET_PATHS: &[&str] = &[
    "/assets",
    "/android-chrome",
    "/apple-touch-icon",
    "/favicon",
    "/icon",
    "/logo",
    "/mstile",
    "/safari-pinned-tab",
    "/manifest.json",
    "/robots.txt",
    "/mockServiceWorker.js",
    "/index.html",
];

/// Outcome of screening a request's path and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Allowed without credential checks
    Exempt,
    /// Caller token present, must be validated
    Token(String),
    /// Token required but absent
    Missing,
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoToken,
    InvalidToken,
    AuthFailed,
}

/// Final gateway decision for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Reject(RejectReason),
}

/// Classify a request without touching the network.
pub fn screen(path: &str, headers: &HeaderMap) -> Screen {
    let exempt = path == "/"
        || STATIC_ASSET_PATHS
            .iter()
            .any(|prefix| path.starts_with(prefix))
        || is_websocket_upgrade(headers);

    if exempt {
        return Screen::Exempt;
    }

    match headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if !token.is_empty() => Screen::Token(token.to_string()),
        _ => Screen::Missing,
    }
}

/// WebSocket upgrade detection: an `Upgrade: websocket` header together
/// with a `Connection` header containing "upgrade", case-insensitive.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);

    upgrade && connection
}

/// Gateway bound to a credential validator.
#[derive(Clone)]
pub struct AuthGateway {
    validator: Arc<dyn CredentialValidator>,
}

impl AuthGateway {
    pub fn new(validator: Arc<dyn CredentialValidator>) -> Self {
        Self { validator }
    }

    /// Decide whether a request may reach the proxy.
    ///
    /// A present token is submitted to the identity provider as a
    /// bearer credential; any validation failure rejects the request.
    pub async fn decide(&self, path: &str, headers: &HeaderMap) -> AuthDecision {
        match screen(path, headers) {
            Screen::Exempt => AuthDecision::Allow,
            Screen::Missing => AuthDecision::Reject(RejectReason::NoToken),
            Screen::Token(token) => match self.validator.validate_bearer(&token).await {
                Ok(()) => AuthDecision::Allow,
                Err(IdentityError::Unauthorized) => {
                    AuthDecision::Reject(RejectReason::InvalidToken)
                }
                Err(err) => {
                    warn!("authentication error: {}", err);
                    AuthDecision::Reject(RejectReason::AuthFailed)
                }
            },
        }
    }
}

fn reject_response(reason: RejectReason) -> Response {
    let message = match reason {
        RejectReason::NoToken => "Unauthorized - No token provided",
        RejectReason::InvalidToken => "Unauthorized - Invalid token",
        RejectReason::AuthFailed => "Unauthorized - Authentication failed",
    };

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": message })),
    )
        .into_response()
}

/// axum middleware wrapping the proxied routes.
pub async fn auth_middleware(
    State(gateway): State<AuthGateway>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match gateway.decide(&path, req.headers()).await {
        AuthDecision::Allow => next.run(req).await,
        AuthDecision::Reject(reason) => reject_response(reason),
    }
}
