//! Cluster access descriptors
//!
//! The credential service answers with a kubeconfig-shaped document
//! (`clusters[].cluster.server`, `users[].user.token`). [`CredentialBundle`]
//! parses that document, either as JSON or YAML, and [`ClusterConfig`] is the
//! resolved form every cluster-touching operation works with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Resolved access to one cluster on behalf of a release
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Cluster name from the credential bundle
    pub cluster_name: String,

    /// API server URL
    pub server: String,

    /// Bearer token
    pub token: String,

    /// Base64 PEM bundle for the API server CA
    pub certificate_authority_data: Option<String>,

    /// Skip TLS verification of the API server
    pub insecure_skip_tls_verify: bool,

    /// Rendered kubeconfig on disk, set by the caching resolver
    pub kubeconfig_path: Option<PathBuf>,
}

impl ClusterConfig {
    /// Create a config from a server URL and token
    pub fn new(
        cluster_name: impl Into<String>,
        server: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            server: server.into(),
            token: token.into(),
            certificate_authority_data: None,
            insecure_skip_tls_verify: false,
            kubeconfig_path: None,
        }
    }

    /// Point commands at a kubeconfig file instead of explicit flags
    pub fn with_kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig_path = Some(path.into());
        self
    }

    /// Render a self-contained kubeconfig document for this cluster
    pub fn to_kubeconfig(&self, namespace: Option<&str>) -> Result<String> {
        let user_name = format!("{}-user", self.cluster_name);
        let bundle = CredentialBundle {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            clusters: vec![NamedCluster {
                name: self.cluster_name.clone(),
                cluster: ClusterEntry {
                    server: self.server.clone(),
                    certificate_authority_data: self.certificate_authority_data.clone(),
                    insecure_skip_tls_verify: self.insecure_skip_tls_verify.then_some(true),
                },
            }],
            users: vec![NamedUser {
                name: user_name.clone(),
                user: UserEntry {
                    token: Some(self.token.clone()),
                },
            }],
            contexts: vec![NamedContext {
                name: self.cluster_name.clone(),
                context: ContextEntry {
                    cluster: self.cluster_name.clone(),
                    user: user_name,
                    namespace: namespace.map(str::to_string),
                },
            }],
            current_context: Some(self.cluster_name.clone()),
        };

        Ok(serde_yaml::to_string(&bundle)?)
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("cluster_name", &self.cluster_name)
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .field(
                "certificate_authority_data",
                &self.certificate_authority_data.is_some(),
            )
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("kubeconfig_path", &self.kubeconfig_path)
            .finish()
    }
}

/// Credential document as returned by the credential service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub clusters: Vec<NamedCluster>,

    #[serde(default)]
    pub users: Vec<NamedUser>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<NamedContext>,

    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCluster {
    #[serde(default)]
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedUser {
    #[serde(default)]
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl CredentialBundle {
    /// Parse a credential document, JSON first, then YAML
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str(text) {
            Ok(bundle) => Ok(bundle),
            Err(_) => Ok(serde_yaml::from_str(text)?),
        }
    }

    /// Extract the first cluster and the first user's token
    pub fn into_cluster_config(self, fallback_name: &str) -> Result<ClusterConfig> {
        let cluster = self
            .clusters
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::InvalidCredentials {
                message: "no cluster entry".to_string(),
            })?;

        if cluster.cluster.server.trim().is_empty() {
            return Err(CoreError::InvalidCredentials {
                message: "cluster entry has no server".to_string(),
            });
        }

        let token = self
            .users
            .into_iter()
            .next()
            .and_then(|u| u.user.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::InvalidCredentials {
                message: "no user token".to_string(),
            })?;

        let cluster_name = if cluster.name.is_empty() {
            fallback_name.to_string()
        } else {
            cluster.name
        };

        Ok(ClusterConfig {
            cluster_name,
            server: cluster.cluster.server,
            token,
            certificate_authority_data: cluster.cluster.certificate_authority_data,
            insecure_skip_tls_verify: cluster.cluster.insecure_skip_tls_verify.unwrap_or(false),
            kubeconfig_path: None,
        })
    }
}
