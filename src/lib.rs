//! Headlamp Gateway
//!
//! Authenticating reverse proxy in front of the Headlamp Kubernetes
//! dashboard server.
//!
//! # Features
//!
//! - **Process supervision**: launches the dashboard binary once and
//!   streams its output into the host log; no auto-restart
//! - **Auth gateway**: per-request bearer-token validation against an
//!   external identity provider, with static-asset and WebSocket
//!   exemptions
//! - **Protocol-aware proxy**: HTTP forwarding with security-header
//!   rewrites plus bidirectional WebSocket bridging
//! - **Credential aggregation**: per-cluster auth strategies merged
//!   into a single kubeconfig document, served base64-encoded
//!
//! # Architecture
//!
//! ```text
//! Browser ──► AuthGateway ──► ProxyRouter ──► dashboard server (child)
//!                 │                                  ▲
//!                 ▼                                  │ supervised
//!         identity provider                   ProcessSupervisor
//!
//! POST /fetchKubeconfig ──► CredentialAggregator ──► kubeconfig::build
//! ```

pub mod aggregator;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod kubeconfig;
pub mod proxy;
pub mod server;
pub mod strategy;
pub mod supervisor;

pub use aggregator::{AggregationError, CredentialAggregator};
pub use config::GatewayConfig;
pub use gateway::{AuthDecision, AuthGateway, RejectReason};
pub use identity::{
    AuthHints, ClusterDescriptor, ClusterLister, CredentialValidator, HttpIdentityProvider,
    IdentityError,
};
pub use kubeconfig::{ClusterConnectionRecord, Kubeconfig};
pub use server::{AppState, GatewayServer};
pub use strategy::{AuthStrategy, Credential, StrategyRegistry};
pub use supervisor::{ProcessStatus, ProcessSupervisor};
