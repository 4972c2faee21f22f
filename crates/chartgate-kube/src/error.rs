//! Error types for chartgate-kube

use chartgate_core::CoreError;
use thiserror::Error;

/// Result type for chartgate-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Broad failure categories, used for logging and at the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed request identifiers; nothing external was called
    Validation,
    /// Credential service unreachable or without a mapping
    ConfigResolution,
    /// The helm process could not run to completion
    Execution,
    /// Helm ran but reported failure
    PackageManager,
    /// A Kubernetes API call failed
    ClusterQuery,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::ConfigResolution => "config_resolution_error",
            Self::Execution => "execution_error",
            Self::PackageManager => "package_manager_error",
            Self::ClusterQuery => "cluster_query_error",
        }
    }
}

/// Errors that can occur during release operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Request identifiers missing or invalid
    #[error("{0}")]
    Validation(String),

    /// Cluster credentials could not be resolved
    #[error("failed to resolve cluster config for release '{release}': {message}")]
    ConfigResolution { release: String, message: String },

    /// The helm process could not be spawned, waited on, or timed out
    #[error("failed to execute `{command}`: {message}")]
    Execution { command: String, message: String },

    /// Invalid gateway configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Helm wrote more output than the configured ceiling
    #[error("output of `{command}` exceeded {limit} bytes")]
    OutputTooLarge { command: String, limit: usize },

    /// Helm exited with a non-zero status
    #[error("{stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Helm output could not be interpreted
    #[error("unexpected package manager output: {0}")]
    InvalidResponse(String),

    /// Install ended in a terminal non-success state
    #[error("{0}")]
    InstallFailed(String),

    /// Upgrade ended in a terminal non-success state
    #[error("{0}")]
    UpgradeFailed(String),

    /// Kubernetes list/delete call failed
    #[error("failed to query {kind} in namespace '{namespace}': {source}")]
    ClusterQuery {
        kind: &'static str,
        namespace: String,
        #[source]
        source: kube::Error,
    },

    /// A kube client could not be built from the resolved config
    #[error("invalid cluster connection: {0}")]
    Connection(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeError {
    /// Map onto the failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ConfigResolution { .. } | Self::InvalidConfig(_) => ErrorKind::ConfigResolution,
            Self::Execution { .. } | Self::OutputTooLarge { .. } | Self::Io(_) => {
                ErrorKind::Execution
            }
            Self::CommandFailed { .. }
            | Self::InvalidResponse(_)
            | Self::InstallFailed(_)
            | Self::UpgradeFailed(_) => ErrorKind::PackageManager,
            Self::ClusterQuery { .. } | Self::Connection(_) => ErrorKind::ClusterQuery,
        }
    }

    pub(crate) fn config_resolution(release: &str, message: impl ToString) -> Self {
        Self::ConfigResolution {
            release: release.to_string(),
            message: message.to_string(),
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KubeError::ClusterQuery { source: kube::Error::Api(resp), .. } if resp.code == 404
        )
    }
}

impl From<CoreError> for KubeError {
    fn from(e: CoreError) -> Self {
        if e.is_validation() {
            KubeError::Validation(e.to_string())
        } else {
            KubeError::InvalidResponse(e.to_string())
        }
    }
}
