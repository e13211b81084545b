//! Identity provider client
//!
//! Talks to the external identity/credential provider: cluster
//! membership lookups and bearer-token validation. Both capabilities
//! sit behind traits so the server wires against stubs in tests, and
//! cluster lists are cached for a short validity window to bound the
//! staleness of cluster membership.

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How long a fetched cluster list stays valid.
const CLUSTER_LIST_TTL_SECS: u64 = 60;

/// Ceiling on identity provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Auth metadata key carrying a cluster's service account token.
pub const METADATA_SERVICE_ACCOUNT_TOKEN: &str = "serviceAccountToken";
/// Auth metadata key naming a cluster's OIDC token provider.
pub const METADATA_OIDC_TOKEN_PROVIDER: &str = "oidcTokenProvider";
/// Auth metadata key carrying a cluster's client certificate data.
pub const METADATA_CLIENT_CERTIFICATE_DATA: &str = "clientCertificateData";
/// Auth metadata key carrying a cluster's client key data.
pub const METADATA_CLIENT_KEY_DATA: &str = "clientKeyData";

/// Identity provider errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider unreachable: {0}")]
    Unavailable(String),

    #[error("credentials rejected by identity provider")]
    Unauthorized,

    #[error("unexpected identity provider response: {0}")]
    Protocol(String),
}

/// One managed cluster as reported by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    /// Unique cluster name
    pub name: String,
    /// URL of the cluster's API server
    #[serde(rename = "url")]
    pub server_url: String,
    /// Whether TLS verification is skipped for this cluster
    #[serde(default, rename = "skipTLSVerify")]
    pub skip_tls_verify: bool,
    /// Certificate authority data, base64
    #[serde(default, rename = "caData")]
    pub ca_data: Option<String>,
    /// Declared auth-provider name, resolved via the strategy registry
    #[serde(rename = "authProvider")]
    pub auth_provider: String,
    /// Provider-specific auth annotations (service account token, OIDC
    /// token provider name, embedded client certificate material)
    #[serde(default, rename = "authMetadata")]
    pub auth_metadata: HashMap<String, String>,
}

/// Per-cluster auth material supplied by the caller with a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthHints {
    /// OIDC tokens keyed by token-provider name
    #[serde(default)]
    pub oidc: HashMap<String, String>,
    /// Plain bearer token, when the caller supplies one directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Lists the clusters the caller may connect to.
#[async_trait]
pub trait ClusterLister: Send + Sync {
    async fn list_clusters(
        &self,
        caller_token: &str,
    ) -> Result<Vec<ClusterDescriptor>, IdentityError>;
}

/// Validates a caller-supplied bearer token.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate_bearer(&self, token: &str) -> Result<(), IdentityError>;
}

/// HTTP implementation of both provider capabilities.
///
/// Speaks a minimal contract against the configured base URL:
/// `GET /clusters` and `GET /validate`, both with bearer auth.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    cluster_cache: Cache<String, Arc<Vec<ClusterDescriptor>>>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cluster_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(Duration::from_secs(CLUSTER_LIST_TTL_SECS))
                .build(),
        }
    }

    /// Cache key for a caller token. The token itself never lands in
    /// the cache, only its digest.
    fn cache_key(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn map_status(status: StatusCode) -> Result<(), IdentityError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IdentityError::Unauthorized);
        }
        if !status.is_success() {
            return Err(IdentityError::Protocol(format!("status {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterLister for HttpIdentityProvider {
    async fn list_clusters(
        &self,
        caller_token: &str,
    ) -> Result<Vec<ClusterDescriptor>, IdentityError> {
        let key = Self::cache_key(caller_token);
        if let Some(cached) = self.cluster_cache.get(&key).await {
            debug!("cluster list served from cache");
            return Ok(cached.as_ref().clone());
        }

        let url = format!("{}/clusters", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(caller_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Self::map_status(response.status())?;

        let clusters: Vec<ClusterDescriptor> = response
            .json()
            .await
            .map_err(|e| IdentityError::Protocol(e.to_string()))?;

        debug!("fetched {} cluster descriptors", clusters.len());
        self.cluster_cache
            .insert(key, Arc::new(clusters.clone()))
            .await;

        Ok(clusters)
    }
}

#[async_trait]
impl CredentialValidator for HttpIdentityProvider {
    async fn validate_bearer(&self, token: &str) -> Result<(), IdentityError> {
        let url = format!("{}/validate", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Self::map_status(response.status())
    }
}
