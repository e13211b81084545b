//! Auth-provider credential strategies
//!
//! Maps a cluster's declared auth-provider name to the logic that
//! produces its connection credential. Providers are entries in a
//! dispatch table, not a class hierarchy: new ones register at startup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::identity::{
    AuthHints, ClusterDescriptor, METADATA_CLIENT_CERTIFICATE_DATA, METADATA_CLIENT_KEY_DATA,
    METADATA_OIDC_TOKEN_PROVIDER, METADATA_SERVICE_ACCOUNT_TOKEN,
};

/// Resolved authentication material for one cluster.
///
/// Never persisted; lives for the duration of one aggregation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    BearerToken { token: String },
    ClientCertificate { cert_data: String, key_data: String },
    Anonymous,
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("cluster '{cluster}' is missing '{key}' auth metadata")]
    MissingMetadata { cluster: String, key: &'static str },

    #[error("no '{provider}' token supplied for cluster '{cluster}'")]
    MissingHint { cluster: String, provider: String },
}

/// Produces a credential for one cluster.
///
/// Strategies may call out to network services; each invocation fails
/// independently and a failure only drops its own cluster.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn credential(
        &self,
        cluster: &ClusterDescriptor,
        hints: &AuthHints,
    ) -> Result<Credential, StrategyError>;
}

/// Bearer token taken from the cluster's service account annotation.
pub struct ServiceAccountStrategy;

#[async_trait]
impl AuthStrategy for ServiceAccountStrategy {
    async fn credential(
        &self,
        cluster: &ClusterDescriptor,
        _hints: &AuthHints,
    ) -> Result<Credential, StrategyError> {
        let token = cluster
            .auth_metadata
            .get(METADATA_SERVICE_ACCOUNT_TOKEN)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StrategyError::MissingMetadata {
                cluster: cluster.name.clone(),
                key: METADATA_SERVICE_ACCOUNT_TOKEN,
            })?;

        Ok(Credential::BearerToken {
            token: token.clone(),
        })
    }
}

/// Bearer token taken from the caller's hints, keyed by the cluster's
/// declared OIDC token provider.
pub struct OidcStrategy;

#[async_trait]
impl AuthStrategy for OidcStrategy {
    async fn credential(
        &self,
        cluster: &ClusterDescriptor,
        hints: &AuthHints,
    ) -> Result<Credential, StrategyError> {
        let provider = cluster
            .auth_metadata
            .get(METADATA_OIDC_TOKEN_PROVIDER)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StrategyError::MissingMetadata {
                cluster: cluster.name.clone(),
                key: METADATA_OIDC_TOKEN_PROVIDER,
            })?;

        let token = hints
            .oidc
            .get(provider)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StrategyError::MissingHint {
                cluster: cluster.name.clone(),
                provider: provider.clone(),
            })?;

        Ok(Credential::BearerToken {
            token: token.clone(),
        })
    }
}

/// Client certificate pair embedded in the cluster's auth metadata.
pub struct ClientCertificateStrategy;

#[async_trait]
impl AuthStrategy for ClientCertificateStrategy {
    async fn credential(
        &self,
        cluster: &ClusterDescriptor,
        _hints: &AuthHints,
    ) -> Result<Credential, StrategyError> {
        let cert_data = cluster
            .auth_metadata
            .get(METADATA_CLIENT_CERTIFICATE_DATA)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StrategyError::MissingMetadata {
                cluster: cluster.name.clone(),
                key: METADATA_CLIENT_CERTIFICATE_DATA,
            })?;

        let key_data = cluster
            .auth_metadata
            .get(METADATA_CLIENT_KEY_DATA)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StrategyError::MissingMetadata {
                cluster: cluster.name.clone(),
                key: METADATA_CLIENT_KEY_DATA,
            })?;

        Ok(Credential::ClientCertificate {
            cert_data: cert_data.clone(),
            key_data: key_data.clone(),
        })
    }
}

/// No credential at all; the cluster is reached through a local proxy.
pub struct LocalProxyStrategy;

#[async_trait]
impl AuthStrategy for LocalProxyStrategy {
    async fn credential(
        &self,
        _cluster: &ClusterDescriptor,
        _hints: &AuthHints,
    ) -> Result<Credential, StrategyError> {
        Ok(Credential::Anonymous)
    }
}

/// Dispatch table from auth-provider name to strategy.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn AuthStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with the built-in provider strategies installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("serviceAccount", Arc::new(ServiceAccountStrategy));
        registry.register("oidc", Arc::new(OidcStrategy));
        registry.register("clientCertificate", Arc::new(ClientCertificateStrategy));
        registry.register("localKubectlProxy", Arc::new(LocalProxyStrategy));
        registry
    }

    /// Register a strategy for an auth-provider name, replacing any
    /// previous entry.
    pub fn register(&mut self, provider: impl Into<String>, strategy: Arc<dyn AuthStrategy>) {
        self.strategies.insert(provider.into(), strategy);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn AuthStrategy>> {
        self.strategies.get(provider).cloned()
    }
}
