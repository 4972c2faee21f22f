//! Chartgate Core - domain types for the per-tenant release gateway
//!
//! This crate holds everything that does not touch the network or a process:
//! - `Release`: an install/upgrade request and its validation rules
//! - `HelmCommand`: typed package-manager command lines and their builder
//! - `ClusterConfig`: resolved cluster access and kubeconfig rendering
//! - `LifecycleState`: normalized helm release status
//! - `ReadinessVerdict`: the aggregated workload health result

pub mod cluster;
pub mod command;
pub mod error;
pub mod lifecycle;
pub mod readiness;
pub mod release;

pub use cluster::{ClusterConfig, CredentialBundle};
pub use command::{CommandBuilder, Flag, HelmCommand, Intent, Verb};
pub use error::{CoreError, Result};
pub use lifecycle::{LifecycleState, RawStatus, ReleaseInfo, ReleaseResponse};
pub use readiness::{ReadinessStatus, ReadinessVerdict};
pub use release::{
    Release, is_truthy, validate_chart_name, validate_flag_name, validate_release_name,
    validate_value_key,
};
