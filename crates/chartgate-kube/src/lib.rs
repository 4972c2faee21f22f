//! Chartgate Kube - cluster integration for Chartgate
//!
//! This crate provides:
//! - **Credential Resolution**: Look up a release's cluster through the credential service, optionally cached on disk
//! - **Helm Gateway**: Run helm as a child process with bounded output and a timeout
//! - **Readiness Checks**: Verify services, pods, volumes and workloads with real Kubernetes API calls
//! - **Connection Details**: Export opaque secrets and services of a release namespace
//! - **Release Management**: Install, upgrade, uninstall and status orchestration
//! - **Mocks**: In-memory collaborators for tests without a cluster

pub mod cluster;
pub mod error;
pub mod export;
pub mod gateway;
pub mod manager;
pub mod mock;
pub mod readiness;
pub mod resolver;

pub use cluster::{ClusterApi, ClusterConnector, KubeClusterApi, KubeConnector};
pub use error::{ErrorKind, KubeError, Result};
pub use export::{ConnectionBundle, ResourceExporter, SecretEntry, ServiceEntry};
pub use gateway::{
    CommandOutput, DEFAULT_COMMAND_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES, GatewayConfig, HelmGateway,
    PackageManager, prepare_repositories,
};
pub use manager::{DeployOutcome, DeployedState, ReleaseManager};
pub use mock::{MockClusterApi, MockPackageManager, OperationCounts, StaticResolver};
pub use readiness::ReadinessEvaluator;
pub use resolver::{CachingResolver, ClusterConfigResolver, RemoteResolver};
