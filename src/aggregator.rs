//! Credential aggregation
//!
//! Resolves a connection credential for every cluster the identity
//! provider reports and assembles the records the kubeconfig builder
//! consumes. Resolution fans out concurrently across clusters and one
//! cluster failing never aborts the others: it is logged and dropped,
//! and partial results are valid.

use futures_util::future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::{AuthHints, ClusterLister, IdentityError};
use crate::kubeconfig::ClusterConnectionRecord;
use crate::strategy::StrategyRegistry;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("cluster source unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("caller credentials rejected by cluster source")]
    Unauthorized,
}

/// Turns per-cluster authentication results into connection records.
///
/// Composes two injected capabilities: a [`ClusterLister`] for cluster
/// membership and a [`StrategyRegistry`] for per-provider credential
/// retrieval.
pub struct CredentialAggregator {
    lister: Arc<dyn ClusterLister>,
    strategies: StrategyRegistry,
}

impl CredentialAggregator {
    pub fn new(lister: Arc<dyn ClusterLister>, strategies: StrategyRegistry) -> Self {
        Self { lister, strategies }
    }

    /// Fetch the caller's clusters and resolve a credential for each.
    ///
    /// Clusters resolve concurrently; the result preserves the
    /// lister's descriptor order. A cluster with an unregistered or
    /// failing auth provider is dropped with a warning.
    pub async fn aggregate(
        &self,
        caller_token: &str,
        hints: &AuthHints,
    ) -> Result<Vec<ClusterConnectionRecord>, AggregationError> {
        let clusters = self
            .lister
            .list_clusters(caller_token)
            .await
            .map_err(|err| match err {
                IdentityError::Unauthorized => AggregationError::Unauthorized,
                other => AggregationError::UpstreamUnavailable(other.to_string()),
            })?;

        let resolutions = clusters.into_iter().map(|descriptor| {
            let strategy = self.strategies.get(&descriptor.auth_provider);
            async move {
                let Some(strategy) = strategy else {
                    warn!(
                        "no auth strategy registered for provider '{}', dropping cluster '{}'",
                        descriptor.auth_provider, descriptor.name
                    );
                    return None;
                };

                match strategy.credential(&descriptor, hints).await {
                    Ok(credential) => Some(ClusterConnectionRecord {
                        descriptor,
                        credential,
                    }),
                    Err(err) => {
                        warn!(
                            "credential resolution failed for cluster '{}': {}",
                            descriptor.name, err
                        );
                        None
                    }
                }
            }
        });

        // join_all preserves input order, so records come back in the
        // order the lister reported the clusters.
        let records: Vec<ClusterConnectionRecord> = future::join_all(resolutions)
            .await
            .into_iter()
            .flatten()
            .collect();

        debug!("aggregated {} cluster connection records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClusterDescriptor;
    use crate::strategy::{AuthStrategy, Credential, StrategyError};
    use async_trait::async_trait;

    struct StaticLister {
        clusters: Vec<ClusterDescriptor>,
    }

    #[async_trait]
    impl ClusterLister for StaticLister {
        async fn list_clusters(
            &self,
            _caller_token: &str,
        ) -> Result<Vec<ClusterDescriptor>, IdentityError> {
            Ok(self.clusters.clone())
        }
    }

    struct DownLister;

    #[async_trait]
    impl ClusterLister for DownLister {
        async fn list_clusters(
            &self,
            _caller_token: &str,
        ) -> Result<Vec<ClusterDescriptor>, IdentityError> {
            Err(IdentityError::Unavailable("connection refused".into()))
        }
    }

    struct FixedStrategy(Credential);

    #[async_trait]
    impl AuthStrategy for FixedStrategy {
        async fn credential(
            &self,
            _cluster: &ClusterDescriptor,
            _hints: &AuthHints,
        ) -> Result<Credential, StrategyError> {
            Ok(self.0.clone())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl AuthStrategy for FailingStrategy {
        async fn credential(
            &self,
            cluster: &ClusterDescriptor,
            _hints: &AuthHints,
        ) -> Result<Credential, StrategyError> {
            Err(StrategyError::MissingMetadata {
                cluster: cluster.name.clone(),
                key: "serviceAccountToken",
            })
        }
    }

    fn descriptor(name: &str, provider: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            name: name.to_string(),
            server_url: format!("https://{}.example.com:6443", name),
            skip_tls_verify: false,
            ca_data: None,
            auth_provider: provider.to_string(),
            auth_metadata: Default::default(),
        }
    }

    fn registry_with(entries: &[(&str, Arc<dyn AuthStrategy>)]) -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        for (name, strategy) in entries {
            registry.register(*name, strategy.clone());
        }
        registry
    }

    #[tokio::test]
    async fn test_failing_strategy_drops_only_its_cluster() {
        let lister = Arc::new(StaticLister {
            clusters: vec![
                descriptor("one", "good"),
                descriptor("two", "bad"),
                descriptor("three", "good"),
            ],
        });
        let registry = registry_with(&[
            (
                "good",
                Arc::new(FixedStrategy(Credential::Anonymous)) as Arc<dyn AuthStrategy>,
            ),
            ("bad", Arc::new(FailingStrategy) as Arc<dyn AuthStrategy>),
        ]);

        let aggregator = CredentialAggregator::new(lister, registry);
        let records = aggregator
            .aggregate("caller", &AuthHints::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].descriptor.name, "one");
        assert_eq!(records[1].descriptor.name, "three");
    }

    #[tokio::test]
    async fn test_unknown_provider_drops_cluster() {
        let lister = Arc::new(StaticLister {
            clusters: vec![
                descriptor("known", "good"),
                descriptor("mystery", "unregistered"),
            ],
        });
        let registry = registry_with(&[(
            "good",
            Arc::new(FixedStrategy(Credential::BearerToken {
                token: "t".into(),
            })) as Arc<dyn AuthStrategy>,
        )]);

        let aggregator = CredentialAggregator::new(lister, registry);
        let records = aggregator
            .aggregate("caller", &AuthHints::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].descriptor.name, "known");
    }

    #[tokio::test]
    async fn test_descriptor_order_is_preserved() {
        let names = ["e", "a", "c", "b", "d"];
        let lister = Arc::new(StaticLister {
            clusters: names.iter().map(|n| descriptor(n, "good")).collect(),
        });
        let registry = registry_with(&[(
            "good",
            Arc::new(FixedStrategy(Credential::Anonymous)) as Arc<dyn AuthStrategy>,
        )]);

        let aggregator = CredentialAggregator::new(lister, registry);
        let records = aggregator
            .aggregate("caller", &AuthHints::default())
            .await
            .unwrap();

        let got: Vec<&str> = records.iter().map(|r| r.descriptor.name.as_str()).collect();
        assert_eq!(got, names);
    }

    #[tokio::test]
    async fn test_unreachable_lister_is_upstream_unavailable() {
        let aggregator =
            CredentialAggregator::new(Arc::new(DownLister), StrategyRegistry::with_defaults());

        let result = aggregator.aggregate("caller", &AuthHints::default()).await;

        assert!(matches!(
            result,
            Err(AggregationError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_cluster_set_yields_empty_records() {
        let aggregator = CredentialAggregator::new(
            Arc::new(StaticLister { clusters: vec![] }),
            StrategyRegistry::with_defaults(),
        );

        let records = aggregator
            .aggregate("caller", &AuthHints::default())
            .await
            .unwrap();

        assert!(records.is_empty());
    }
}
