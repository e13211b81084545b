//! Gateway HTTP server
//!
//! Wires the public surface together: the health probe, the kubeconfig
//! fetch endpoint, and the authenticated proxy fallback in front of the
//! dashboard server. The two named routes sit outside the auth gateway;
//! everything else goes through it.

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aggregator::CredentialAggregator;
use crate::config::GatewayConfig;
use crate::gateway::{auth_middleware, AuthGateway, TOKEN_HEADER};
use crate::identity::{AuthHints, CredentialValidator};
use crate::kubeconfig;
use crate::proxy;
use crate::supervisor::ProcessSupervisor;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub aggregator: Arc<CredentialAggregator>,
    pub validator: Arc<dyn CredentialValidator>,
    pub supervisor: Arc<ProcessSupervisor>,
    /// Client for the HTTP leg of the proxy
    pub upstream: reqwest::Client,
}

/// Failures behind the kubeconfig fetch endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing caller token")]
    MissingToken,

    #[error("caller token rejected: {0}")]
    InvalidToken(String),

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The caller only ever sees the generic message; detail stays
        // in the log.
        error!("error fetching kubeconfig: {}", self);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "message": "Error fetching kubeconfig" })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(rename = "serverRunning")]
    server_running: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchKubeconfigRequest {
    /// Per-cluster auth material forwarded to the credential strategies
    #[serde(default)]
    pub auth: AuthHints,
}

#[derive(Debug, Serialize)]
pub struct FetchKubeconfigResponse {
    /// Base64-encoded kubeconfig document
    pub kubeconfig: String,
}

/// The gateway's HTTP server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let gateway = AuthGateway::new(self.state.validator.clone());

        // Everything that is not a named route goes through the auth
        // gateway and on to the dashboard server.
        let proxied = Router::new()
            .fallback(proxy::handle)
            .layer(middleware::from_fn_with_state(gateway, auth_middleware))
            .with_state(self.state.clone());

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_handler))
            .route("/fetchKubeconfig", post(fetch_kubeconfig_handler))
            .with_state(self.state.clone())
            .merge(proxied)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Serve until a shutdown signal, then stop the supervised process.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.listen_addr, self.state.config.listen_port
        );
        let supervisor = self.state.supervisor.clone();
        let router = self.build_router();

        info!("starting headlamp gateway on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        supervisor.stop();
        info!("headlamp gateway shut down gracefully");
        Ok(())
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        server_running: state.supervisor.is_running().await,
    })
}

async fn fetch_kubeconfig_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FetchKubeconfigRequest>,
) -> Result<Json<FetchKubeconfigResponse>, ApiError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)?;

    state
        .validator
        .validate_bearer(token)
        .await
        .map_err(|e| ApiError::InvalidToken(e.to_string()))?;

    let records = state
        .aggregator
        .aggregate(token, &request.auth)
        .await
        .map_err(|e| ApiError::Aggregation(e.to_string()))?;

    let document = kubeconfig::build(&records);
    let serialized =
        kubeconfig::serialize(&document).map_err(|e| ApiError::Serialization(e.to_string()))?;

    // Keep the supervised process's config file current. A write
    // failure must not fail the request.
    if let Err(err) = tokio::fs::write(&state.config.kubeconfig_path, &serialized).await {
        warn!(
            "failed to refresh kubeconfig at '{}': {}",
            state.config.kubeconfig_path.display(),
            err
        );
    }

    Ok(Json(FetchKubeconfigResponse {
        kubeconfig: BASE64.encode(serialized.as_bytes()),
    }))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
