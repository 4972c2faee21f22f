//! Workload readiness for a deployed release
//!
//! Helm reporting `deployed` only means the manifests were accepted. The
//! evaluator checks what actually runs in the release namespace, one resource
//! kind at a time, and stops at the first kind that is not ready:
//!
//! 1. LoadBalancer services have an ingress address
//! 2. Pods are `Running`
//! 3. PersistentVolumeClaims are `Bound`
//! 4. Deployments have their replicas ready
//! 5. StatefulSets have their replicas ready
//!
//! The per-kind checks are plain functions over resource lists so they can be
//! tested without a cluster.

use chartgate_core::ReadinessVerdict;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};

use crate::cluster::ClusterApi;
use crate::error::Result;

/// Message returned when every check passes
pub const PROVISIONED: &str = "successfully provisioned";

/// Message returned while a load balancer waits for its address
pub const LOAD_BALANCER_PENDING: &str = "service deployment load balancer in progress";

/// Runs the ordered readiness checks against one namespace
pub struct ReadinessEvaluator<'a> {
    cluster: &'a dyn ClusterApi,
}

impl<'a> ReadinessEvaluator<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self { cluster }
    }

    /// Evaluate the namespace, short-circuiting at the first non-ready kind
    pub async fn evaluate(&self, namespace: &str) -> Result<ReadinessVerdict> {
        tracing::debug!(namespace, "Checking resource readiness");

        let services = self.cluster.list_services(namespace).await?;
        if let Some(verdict) = check_services(&services) {
            return Ok(pending(namespace, "Service", verdict));
        }

        let pods = self.cluster.list_pods(namespace).await?;
        if let Some(verdict) = check_pods(&pods) {
            return Ok(pending(namespace, "Pod", verdict));
        }

        let claims = self.cluster.list_persistent_volume_claims(namespace).await?;
        if let Some(verdict) = check_volume_claims(&claims) {
            return Ok(pending(namespace, "PersistentVolumeClaim", verdict));
        }

        let deployments = self.cluster.list_deployments(namespace).await?;
        if let Some(verdict) = check_deployments(&deployments) {
            return Ok(pending(namespace, "Deployment", verdict));
        }

        let stateful_sets = self.cluster.list_stateful_sets(namespace).await?;
        if let Some(verdict) = check_stateful_sets(&stateful_sets) {
            return Ok(pending(namespace, "StatefulSet", verdict));
        }

        tracing::info!(namespace, "All resources ready");
        Ok(ReadinessVerdict::success(PROVISIONED))
    }
}

fn pending(namespace: &str, kind: &str, verdict: ReadinessVerdict) -> ReadinessVerdict {
    tracing::info!(namespace, kind, message = %verdict.message, "Resources not ready");
    verdict
}

/// Every LoadBalancer service must have at least one ingress address
pub fn check_services(services: &[Service]) -> Option<ReadinessVerdict> {
    let waiting = services.iter().any(|svc| {
        let is_load_balancer = svc
            .spec
            .as_ref()
            .and_then(|s| s.type_.as_deref())
            == Some("LoadBalancer");

        let has_address = svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|ingress| {
                ingress.iter().any(|i| {
                    i.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                        || i.hostname.as_deref().is_some_and(|h| !h.is_empty())
                })
            });

        is_load_balancer && !has_address
    });

    waiting.then(|| ReadinessVerdict::in_progress(LOAD_BALANCER_PENDING))
}

/// Every pod must be `Running`.
///
/// The verdict message collects the condition messages of all pods that are
/// not, one per line.
pub fn check_pods(pods: &[Pod]) -> Option<ReadinessVerdict> {
    let not_running: Vec<&Pod> = pods
        .iter()
        .filter(|pod| {
            pod.status.as_ref().and_then(|s| s.phase.as_deref()) != Some("Running")
        })
        .collect();

    let first = not_running.first()?;

    let messages: Vec<&str> = not_running
        .iter()
        .filter_map(|pod| pod.status.as_ref()?.conditions.as_ref())
        .flatten()
        .filter_map(|condition| condition.message.as_deref())
        .filter(|message| !message.is_empty())
        .collect();

    let message = if messages.is_empty() {
        format!("Pod is not ready: {}", name_of(&first.metadata))
    } else {
        messages.join("\n")
    };

    Some(ReadinessVerdict::in_progress(message))
}

/// Every claim must be `Bound`
pub fn check_volume_claims(claims: &[PersistentVolumeClaim]) -> Option<ReadinessVerdict> {
    claims
        .iter()
        .find(|pvc| pvc.status.as_ref().and_then(|s| s.phase.as_deref()) != Some("Bound"))
        .map(|pvc| {
            ReadinessVerdict::in_progress(format!(
                "PersistentVolumeClaim is not ready: {}",
                name_of(&pvc.metadata)
            ))
        })
}

/// Ready replicas must reach the declared count. A missing ready count means
/// none are ready; a missing declared count means one.
pub fn check_deployments(deployments: &[Deployment]) -> Option<ReadinessVerdict> {
    deployments
        .iter()
        .find(|deploy| {
            let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let ready = deploy
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0);
            ready < desired
        })
        .map(|deploy| {
            ReadinessVerdict::in_progress(format!(
                "Deployment is not ready: {}",
                name_of(&deploy.metadata)
            ))
        })
}

/// Like [`check_deployments`], except a missing ready count is never ready,
/// even when zero replicas are declared.
pub fn check_stateful_sets(stateful_sets: &[StatefulSet]) -> Option<ReadinessVerdict> {
    stateful_sets
        .iter()
        .find(|sts| {
            let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            match sts.status.as_ref().and_then(|s| s.ready_replicas) {
                Some(ready) => ready < desired,
                None => true,
            }
        })
        .map(|sts| {
            ReadinessVerdict::in_progress(format!(
                "Statefulset is not ready: {}",
                name_of(&sts.metadata)
            ))
        })
}

fn name_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or("<unnamed>")
}
