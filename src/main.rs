//! Headlamp Gateway - Entry Point

use headlamp_gateway::{
    AppState, CredentialAggregator, GatewayConfig, GatewayServer, HttpIdentityProvider,
    ProcessSupervisor, StrategyRegistry,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Headlamp Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(GatewayConfig::from_env()?);
    info!("dashboard binary path: {}", config.binary_path.display());
    info!("kubeconfig path: {}", config.kubeconfig_path.display());
    info!("plugins path: {}", config.plugins_path.display());

    // Single-shot: a failed launch is logged and the gateway keeps
    // serving; proxied requests degrade to backend errors.
    let supervisor = Arc::new(ProcessSupervisor::spawn(
        &config.binary_path,
        &config.kubeconfig_path,
        &config.plugins_path,
        &config.base_path,
    ));

    let provider = Arc::new(HttpIdentityProvider::new(
        config.identity_provider_url.clone(),
    ));
    let aggregator = Arc::new(CredentialAggregator::new(
        provider.clone(),
        StrategyRegistry::with_defaults(),
    ));

    let state = AppState {
        config,
        aggregator,
        validator: provider,
        supervisor,
        upstream: reqwest::Client::new(),
    };

    GatewayServer::new(state).run().await
}
