//! Kubeconfig document assembly
//!
//! Builds the merged connection document the dashboard server consumes:
//! one cluster/user/context triple per resolved cluster, serialized as
//! deterministic YAML with no anchors or aliases. Building is pure;
//! nothing here performs I/O.

use serde::{Deserialize, Serialize};

use crate::identity::ClusterDescriptor;
use crate::strategy::Credential;

const API_VERSION: &str = "v1";
const KIND: &str = "Config";

/// A cluster descriptor paired with its resolved credential.
#[derive(Debug, Clone)]
pub struct ClusterConnectionRecord {
    pub descriptor: ClusterDescriptor,
    pub credential: Credential,
}

/// Top-level kubeconfig document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(
        default,
        rename = "current-context",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
}

/// Cluster entry: name plus API server connection details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEndpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub server: String,
    #[serde(default, rename = "insecure-skip-tls-verify")]
    pub insecure_skip_tls_verify: bool,
    #[serde(
        default,
        rename = "certificate-authority-data",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
}

/// User entry: name plus whatever auth material the credential carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(
        default,
        rename = "client-certificate-data",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_certificate_data: Option<String>,
    #[serde(
        default,
        rename = "client-key-data",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_key_data: Option<String>,
}

/// Context entry linking a cluster and user by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRef {
    pub cluster: String,
    pub user: String,
}

impl Kubeconfig {
    /// Empty document with no current context.
    pub fn empty() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            clusters: Vec::new(),
            users: Vec::new(),
            contexts: Vec::new(),
            current_context: None,
        }
    }
}

/// Build a merged document from resolved cluster records.
///
/// One cluster, user and context entry per record, all keyed by the
/// cluster name and kept in input order. `current-context` is the first
/// context's name, absent for empty input.
pub fn build(records: &[ClusterConnectionRecord]) -> Kubeconfig {
    let mut document = Kubeconfig::empty();

    for record in records {
        let name = record.descriptor.name.clone();

        document.clusters.push(NamedCluster {
            name: name.clone(),
            cluster: ClusterEndpoint {
                server: record.descriptor.server_url.clone(),
                insecure_skip_tls_verify: record.descriptor.skip_tls_verify,
                certificate_authority_data: record
                    .descriptor
                    .ca_data
                    .clone()
                    .filter(|ca| !ca.is_empty()),
            },
        });

        document.users.push(NamedUser {
            name: name.clone(),
            user: user_auth(&record.credential),
        });

        document.contexts.push(NamedContext {
            name: name.clone(),
            context: ContextRef {
                cluster: name.clone(),
                user: name,
            },
        });
    }

    document.current_context = document.contexts.first().map(|c| c.name.clone());
    document
}

/// Concatenate several documents into one.
///
/// Equivalent to building once from the concatenated record sequences:
/// arrays are appended in order and `current-context` is taken from the
/// first context of the result.
pub fn combine(documents: Vec<Kubeconfig>) -> Kubeconfig {
    let mut combined = Kubeconfig::empty();

    for document in documents {
        combined.clusters.extend(document.clusters);
        combined.users.extend(document.users);
        combined.contexts.extend(document.contexts);
    }

    combined.current_context = combined.contexts.first().map(|c| c.name.clone());
    combined
}

/// Render the document as YAML.
///
/// Output is deterministic (struct field order) and serde_yaml never
/// emits anchors or aliases, so diffs between generations stay stable.
pub fn serialize(document: &Kubeconfig) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(document)
}

fn user_auth(credential: &Credential) -> UserAuth {
    match credential {
        Credential::BearerToken { token } => UserAuth {
            token: Some(token.clone()),
            ..UserAuth::default()
        },
        Credential::ClientCertificate {
            cert_data,
            key_data,
        } => UserAuth {
            client_certificate_data: Some(cert_data.clone()),
            client_key_data: Some(key_data.clone()),
            ..UserAuth::default()
        },
        Credential::Anonymous => UserAuth::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            name: name.to_string(),
            server_url: format!("https://{}.example.com:6443", name),
            skip_tls_verify: false,
            ca_data: None,
            auth_provider: "serviceAccount".to_string(),
            auth_metadata: Default::default(),
        }
    }

    fn record(name: &str, credential: Credential) -> ClusterConnectionRecord {
        ClusterConnectionRecord {
            descriptor: descriptor(name),
            credential,
        }
    }

    #[test]
    fn test_build_aligns_entries_by_cluster_name() {
        let records = vec![
            record("alpha", Credential::Anonymous),
            record(
                "beta",
                Credential::BearerToken {
                    token: "tok".into(),
                },
            ),
        ];

        let document = build(&records);

        assert_eq!(document.clusters.len(), 2);
        assert_eq!(document.users.len(), 2);
        assert_eq!(document.contexts.len(), 2);
        for i in 0..2 {
            assert_eq!(document.clusters[i].name, document.users[i].name);
            assert_eq!(document.clusters[i].name, document.contexts[i].name);
            assert_eq!(document.contexts[i].context.cluster, document.contexts[i].name);
            assert_eq!(document.contexts[i].context.user, document.contexts[i].name);
        }
        assert_eq!(document.current_context.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_build_empty_input() {
        let document = build(&[]);

        assert!(document.clusters.is_empty());
        assert!(document.users.is_empty());
        assert!(document.contexts.is_empty());
        assert!(document.current_context.is_none());
    }

    #[test]
    fn test_bearer_token_user_has_only_token() {
        let document = build(&[record(
            "c1",
            Credential::BearerToken {
                token: "secret".into(),
            },
        )]);

        let user = &document.users[0].user;
        assert_eq!(user.token.as_deref(), Some("secret"));
        assert!(user.client_certificate_data.is_none());
        assert!(user.client_key_data.is_none());
    }

    #[test]
    fn test_client_certificate_user_has_only_cert_and_key() {
        let document = build(&[record(
            "c1",
            Credential::ClientCertificate {
                cert_data: "cert".into(),
                key_data: "key".into(),
            },
        )]);

        let user = &document.users[0].user;
        assert!(user.token.is_none());
        assert_eq!(user.client_certificate_data.as_deref(), Some("cert"));
        assert_eq!(user.client_key_data.as_deref(), Some("key"));
    }

    #[test]
    fn test_anonymous_user_is_empty() {
        let document = build(&[record("c1", Credential::Anonymous)]);

        assert_eq!(document.users[0].user, UserAuth::default());
    }

    #[test]
    fn test_empty_ca_data_omitted() {
        let mut with_empty = descriptor("c1");
        with_empty.ca_data = Some(String::new());
        let mut with_ca = descriptor("c2");
        with_ca.ca_data = Some("Y2EtZGF0YQ==".into());

        let document = build(&[
            ClusterConnectionRecord {
                descriptor: with_empty,
                credential: Credential::Anonymous,
            },
            ClusterConnectionRecord {
                descriptor: with_ca,
                credential: Credential::Anonymous,
            },
        ]);

        assert!(document.clusters[0].cluster.certificate_authority_data.is_none());
        assert_eq!(
            document.clusters[1].cluster.certificate_authority_data.as_deref(),
            Some("Y2EtZGF0YQ==")
        );
    }

    #[test]
    fn test_combine_equals_single_build_over_concatenation() {
        let first = vec![
            record("a", Credential::Anonymous),
            record(
                "b",
                Credential::BearerToken {
                    token: "t1".into(),
                },
            ),
        ];
        let second = vec![record(
            "c",
            Credential::ClientCertificate {
                cert_data: "cd".into(),
                key_data: "kd".into(),
            },
        )];

        let combined = combine(vec![build(&first), build(&second)]);

        let mut all = first.clone();
        all.extend(second.clone());
        let at_once = build(&all);

        assert_eq!(combined, at_once);
        assert_eq!(combined.current_context.as_deref(), Some("a"));
    }

    #[test]
    fn test_combine_empty_documents() {
        let combined = combine(vec![build(&[]), build(&[])]);

        assert!(combined.clusters.is_empty());
        assert!(combined.current_context.is_none());
    }

    #[test]
    fn test_serialize_is_deterministic_and_round_trips() {
        let document = build(&[record(
            "prod",
            Credential::BearerToken {
                token: "abc123".into(),
            },
        )]);

        let first = serialize(&document).unwrap();
        let second = serialize(&document).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains('&'), "no YAML anchors expected");
        assert!(!first.contains('*'), "no YAML aliases expected");

        let parsed: Kubeconfig = serde_yaml::from_str(&first).unwrap();
        assert_eq!(parsed, document);
        assert_eq!(parsed.current_context.as_deref(), Some("prod"));
    }

    #[test]
    fn test_serialized_empty_document_has_no_current_context() {
        let yaml = serialize(&build(&[])).unwrap();
        assert!(!yaml.contains("current-context"));
    }
}
