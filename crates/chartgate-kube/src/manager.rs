//! Release lifecycle orchestration
//!
//! [`ReleaseManager`] ties the collaborators together. Every operation runs
//! its steps strictly in sequence:
//!
//! 1. validate the request (no external call is made for invalid input)
//! 2. make sure the helm client is initialized
//! 3. resolve the release's cluster credentials
//! 4. render the command
//! 5. for install and upgrade, register and refresh chart repositories
//! 6. execute and interpret the result
//!
//! The manager holds no per-request state; collaborators are shared handles.

use chartgate_core::{
    ClusterConfig, CommandBuilder, Intent, LifecycleState, ReadinessVerdict, Release, ReleaseResponse,
    validate_release_name,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::cluster::ClusterConnector;
use crate::error::{KubeError, Result};
use crate::export::{ConnectionBundle, ResourceExporter, ServiceEntry};
use crate::gateway::{PackageManager, prepare_repositories, validate_repository_url};
use crate::readiness::ReadinessEvaluator;
use crate::resolver::ClusterConfigResolver;

/// Message for releases helm still reports as pending
pub const DEPLOY_IN_PROGRESS: &str = "deploy in progress";

/// Result of an install or upgrade that helm accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub release_name: String,
    /// First Service created by the chart, when there is one
    pub service_name: Option<String>,
    pub state: LifecycleState,
    pub description: String,
}

/// Helm's view of a release, without looking at the workloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedState {
    pub release_name: String,
    pub state: LifecycleState,
    pub raw_status: String,
    pub description: String,
}

/// Orchestrates install, upgrade, uninstall and status checks
#[derive(Clone)]
pub struct ReleaseManager {
    resolver: Arc<dyn ClusterConfigResolver>,
    helm: Arc<dyn PackageManager>,
    connector: Arc<dyn ClusterConnector>,
}

impl ReleaseManager {
    pub fn new(
        resolver: Arc<dyn ClusterConfigResolver>,
        helm: Arc<dyn PackageManager>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        Self {
            resolver,
            helm,
            connector,
        }
    }

    /// Initialize the helm client. Idempotent; called at startup.
    pub async fn initialize(&self) -> Result<()> {
        self.helm.initialize().await
    }

    /// Whether the helm client is initialized
    pub fn is_ready(&self) -> bool {
        self.helm.is_ready()
    }

    /// Install a chart as a new release
    #[instrument(skip_all, fields(release = %release.release_name, chart = %release.chart_name))]
    pub async fn install(&self, release: &Release) -> Result<DeployOutcome> {
        self.deploy(Intent::Install, release).await
    }

    /// Upgrade an existing release
    #[instrument(skip_all, fields(release = %release.release_name, chart = %release.chart_name))]
    pub async fn upgrade(&self, release: &Release) -> Result<DeployOutcome> {
        self.deploy(Intent::Upgrade, release).await
    }

    async fn deploy(&self, intent: Intent, release: &Release) -> Result<DeployOutcome> {
        release.validate_for_deploy()?;
        if let Some(url) = release.private_charts_repo.as_deref().filter(|u| !u.trim().is_empty()) {
            validate_repository_url(url)?;
        }

        self.helm.initialize().await?;
        let cluster = self.resolver.resolve(&release.release_name).await?;
        let command = CommandBuilder::build(intent, release, &cluster)?;

        prepare_repositories(self.helm.as_ref(), release).await?;
        let output = self.helm.execute(&command).await?;
        let response = ReleaseResponse::parse(&output.stdout)?;

        let state = response.lifecycle();
        if state == LifecycleState::Failed {
            let reason = failure_reason(&response);
            tracing::warn!(status = %response.status(), reason = %reason, "Release did not deploy");
            return Err(match intent {
                Intent::Upgrade => KubeError::UpgradeFailed(reason),
                _ => KubeError::InstallFailed(reason),
            });
        }

        let service_name = response.first_service();
        tracing::info!(state = %state, service = ?service_name, "Release accepted");

        Ok(DeployOutcome {
            release_name: release.release_name.clone(),
            service_name,
            state,
            description: response.description().to_string(),
        })
    }

    /// Remove a release, then delete its namespace.
    ///
    /// The helm uninstall decides the outcome. Namespace deletion is best
    /// effort and only logged when it fails.
    #[instrument(skip(self))]
    pub async fn uninstall(&self, release_name: &str) -> Result<()> {
        validate_release_name(release_name)?;

        self.helm.initialize().await?;
        let cluster = self.resolver.resolve(release_name).await?;
        let command = CommandBuilder::uninstall(release_name, &cluster)?;
        self.helm.execute(&command).await?;
        tracing::info!("Release uninstalled");

        let deleted = match self.connector.connect(&cluster).await {
            Ok(api) => api.delete_namespace(release_name).await,
            Err(e) => Err(e),
        };
        match deleted {
            Ok(()) => tracing::info!(namespace = release_name, "Namespace deleted"),
            Err(e) if e.is_not_found() => {
                tracing::info!(namespace = release_name, "Namespace already absent")
            }
            Err(e) => {
                tracing::warn!(namespace = release_name, error = %e, "Failed to delete namespace")
            }
        }

        Ok(())
    }

    /// Helm status, and for deployed releases the workload readiness verdict
    #[instrument(skip(self))]
    pub async fn release_status(&self, release_name: &str) -> Result<ReadinessVerdict> {
        let (cluster, response) = self.helm_status(release_name).await?;

        match response.lifecycle() {
            LifecycleState::Deployed => {
                let api = self.connector.connect(&cluster).await?;
                ReadinessEvaluator::new(api.as_ref())
                    .evaluate(release_name)
                    .await
            }
            LifecycleState::InProgress => Ok(ReadinessVerdict::in_progress(DEPLOY_IN_PROGRESS)),
            LifecycleState::Failed => Ok(ReadinessVerdict::failed(format!(
                "deploy failed with code:{}",
                response.status()
            ))),
        }
    }

    /// Helm's status only, no readiness evaluation
    #[instrument(skip(self))]
    pub async fn deployed(&self, release_name: &str) -> Result<DeployedState> {
        let (_, response) = self.helm_status(release_name).await?;

        Ok(DeployedState {
            release_name: release_name.to_string(),
            state: response.lifecycle(),
            raw_status: response.status().to_string(),
            description: response.description().to_string(),
        })
    }

    /// Opaque secrets and services of the release namespace
    #[instrument(skip(self))]
    pub async fn connection_details(&self, release_name: &str) -> Result<ConnectionBundle> {
        validate_release_name(release_name)?;

        let cluster = self.resolver.resolve(release_name).await?;
        let api = self.connector.connect(&cluster).await?;
        ResourceExporter::new(api.as_ref()).export(release_name).await
    }

    /// Services of the release namespace
    #[instrument(skip(self))]
    pub async fn services(&self, release_name: &str) -> Result<Vec<ServiceEntry>> {
        validate_release_name(release_name)?;

        let cluster = self.resolver.resolve(release_name).await?;
        let api = self.connector.connect(&cluster).await?;
        ResourceExporter::new(api.as_ref()).services(release_name).await
    }

    async fn helm_status(&self, release_name: &str) -> Result<(ClusterConfig, ReleaseResponse)> {
        validate_release_name(release_name)?;

        self.helm.initialize().await?;
        let cluster = self.resolver.resolve(release_name).await?;
        let command = CommandBuilder::status(release_name, &cluster)?;
        let output = self.helm.execute(&command).await?;
        let response = ReleaseResponse::parse(&output.stdout)?;

        tracing::debug!(status = %response.status(), "Helm status");
        Ok((cluster, response))
    }
}

fn failure_reason(response: &ReleaseResponse) -> String {
    let description = response.description().trim();
    if description.is_empty() {
        format!("release ended in status {}", response.status())
    } else {
        description.to_string()
    }
}
