//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Gateway configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on
    pub listen_addr: String,

    /// Port the gateway listens on
    pub listen_port: u16,

    /// Local port the dashboard server binary listens on
    pub backend_port: u16,

    /// Path to the dashboard server binary
    pub binary_path: PathBuf,

    /// Directory the dashboard server loads plugins from
    pub plugins_path: PathBuf,

    /// Where the generated kubeconfig file is written
    pub kubeconfig_path: PathBuf,

    /// Base path under which the dashboard exposes its own routes
    pub base_path: String,

    /// Base URL of the identity provider
    pub identity_provider_url: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr =
            std::env::var("HEADLAMP_GATEWAY_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());

        let listen_port = std::env::var("HEADLAMP_GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7007);

        let backend_port = std::env::var("HEADLAMP_BACKEND_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4466);

        let binary_path = std::env::var("HEADLAMP_BINARY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                PathBuf::from("bin").join(if cfg!(windows) {
                    "headlamp-standalone.exe"
                } else {
                    "headlamp-standalone"
                })
            });

        let plugins_path = std::env::var("HEADLAMP_PLUGINS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("plugins"));

        let kubeconfig_path = std::env::var("HEADLAMP_KUBECONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("kubeconfig.yaml"));

        let base_path =
            std::env::var("HEADLAMP_BASE_PATH").unwrap_or_else(|_| "/api/headlamp".to_string());

        let identity_provider_url = std::env::var("IDENTITY_PROVIDER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:7007/api/auth".to_string());

        Ok(Self {
            listen_addr,
            listen_port,
            backend_port,
            binary_path,
            plugins_path,
            kubeconfig_path,
            base_path,
            identity_provider_url,
        })
    }
}
