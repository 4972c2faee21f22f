//! In-memory collaborators for testing
//!
//! These stand in for the cluster, the helm binary and the credential service
//! so orchestration can be tested without any of them. Each one records what
//! it was asked to do.

use async_trait::async_trait;
use chartgate_core::{ClusterConfig, HelmCommand, Verb};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Secret, Service};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::cluster::{ClusterApi, ClusterConnector};
use crate::error::{KubeError, Result};
use crate::gateway::{CommandOutput, PackageManager};
use crate::resolver::ClusterConfigResolver;

#[derive(Debug, Default, Clone)]
struct NamespaceObjects {
    services: Vec<Service>,
    pods: Vec<Pod>,
    volume_claims: Vec<PersistentVolumeClaim>,
    deployments: Vec<Deployment>,
    stateful_sets: Vec<StatefulSet>,
    secrets: Vec<Secret>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Failures {
    lists: bool,
    /// HTTP code returned by namespace deletion, if it fails
    namespace_delete: Option<u16>,
}

/// In-memory cluster, also usable as its own [`ClusterConnector`]
#[derive(Clone, Default)]
pub struct MockClusterApi {
    /// namespace -> objects
    store: Arc<RwLock<HashMap<String, NamespaceObjects>>>,
    operations: Arc<RwLock<OperationCounts>>,
    failures: Arc<RwLock<Failures>>,
    deleted: Arc<RwLock<Vec<String>>>,
}

/// Calls made against a [`MockClusterApi`]
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub connects: usize,
    pub services: usize,
    pub pods: usize,
    pub volume_claims: usize,
    pub deployments: usize,
    pub stateful_sets: usize,
    pub secrets: usize,
    pub namespace_deletes: usize,
}

impl OperationCounts {
    /// List calls of any kind
    pub fn total_lists(&self) -> usize {
        self.services
            + self.pods
            + self.volume_claims
            + self.deployments
            + self.stateful_sets
            + self.secrets
    }

    /// Any interaction with the cluster at all
    pub fn total(&self) -> usize {
        self.connects + self.total_lists() + self.namespace_deletes
    }
}

impl MockClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Make every list call fail
    pub fn fail_lists(&self, fail: bool) {
        self.failures.write().unwrap().lists = fail;
    }

    /// Make namespace deletion fail
    pub fn fail_namespace_delete(&self, fail: bool) {
        self.failures.write().unwrap().namespace_delete = fail.then_some(500);
    }

    /// Make namespace deletion answer 404, as for a namespace already gone
    pub fn namespace_already_deleted(&self) {
        self.failures.write().unwrap().namespace_delete = Some(404);
    }

    /// Namespaces deleted so far, in order
    pub fn deleted_namespaces(&self) -> Vec<String> {
        self.deleted.read().unwrap().clone()
    }

    pub fn add_service(&self, namespace: &str, service: Service) {
        self.with_namespace(namespace, |ns| ns.services.push(service));
    }

    pub fn add_pod(&self, namespace: &str, pod: Pod) {
        self.with_namespace(namespace, |ns| ns.pods.push(pod));
    }

    pub fn add_volume_claim(&self, namespace: &str, claim: PersistentVolumeClaim) {
        self.with_namespace(namespace, |ns| ns.volume_claims.push(claim));
    }

    pub fn add_deployment(&self, namespace: &str, deployment: Deployment) {
        self.with_namespace(namespace, |ns| ns.deployments.push(deployment));
    }

    pub fn add_stateful_set(&self, namespace: &str, stateful_set: StatefulSet) {
        self.with_namespace(namespace, |ns| ns.stateful_sets.push(stateful_set));
    }

    pub fn add_secret(&self, namespace: &str, secret: Secret) {
        self.with_namespace(namespace, |ns| ns.secrets.push(secret));
    }

    fn with_namespace(&self, namespace: &str, f: impl FnOnce(&mut NamespaceObjects)) {
        let mut store = self.store.write().unwrap();
        f(store.entry(namespace.to_string()).or_default());
    }

    fn list<T: Clone>(
        &self,
        kind: &'static str,
        namespace: &str,
        count: impl FnOnce(&mut OperationCounts),
        select: impl FnOnce(&NamespaceObjects) -> &Vec<T>,
    ) -> Result<Vec<T>> {
        count(&mut *self.operations.write().unwrap());

        if self.failures.read().unwrap().lists {
            return Err(injected_failure(kind, namespace, 500));
        }

        let store = self.store.read().unwrap();
        Ok(store.get(namespace).map(|ns| select(ns).clone()).unwrap_or_default())
    }
}

fn injected_failure(kind: &'static str, namespace: &str, code: u16) -> KubeError {
    let reason = if code == 404 { "NotFound" } else { "InternalError" };
    KubeError::ClusterQuery {
        kind,
        namespace: namespace.to_string(),
        source: kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "injected failure".to_string(),
            reason: reason.to_string(),
            code,
        }),
    }
}

#[async_trait]
impl ClusterApi for MockClusterApi {
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        self.list("Service", namespace, |c| c.services += 1, |ns| &ns.services)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.list("Pod", namespace, |c| c.pods += 1, |ns| &ns.pods)
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.list(
            "PersistentVolumeClaim",
            namespace,
            |c| c.volume_claims += 1,
            |ns| &ns.volume_claims,
        )
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        self.list("Deployment", namespace, |c| c.deployments += 1, |ns| &ns.deployments)
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        self.list(
            "StatefulSet",
            namespace,
            |c| c.stateful_sets += 1,
            |ns| &ns.stateful_sets,
        )
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        self.list("Secret", namespace, |c| c.secrets += 1, |ns| &ns.secrets)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.operations.write().unwrap().namespace_deletes += 1;

        if let Some(code) = self.failures.read().unwrap().namespace_delete {
            return Err(injected_failure("Namespace", namespace, code));
        }

        self.store.write().unwrap().remove(namespace);
        self.deleted.write().unwrap().push(namespace.to_string());
        Ok(())
    }
}

#[async_trait]
impl ClusterConnector for MockClusterApi {
    async fn connect(&self, _config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
        self.operations.write().unwrap().connects += 1;
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Failure { code: i32, stderr: String },
}

/// Scripted [`PackageManager`] that records every command it receives.
///
/// Verbs without a scripted response succeed with empty output.
#[derive(Clone, Default)]
pub struct MockPackageManager {
    responses: Arc<RwLock<HashMap<Verb, Scripted>>>,
    commands: Arc<RwLock<Vec<HelmCommand>>>,
    initializations: Arc<RwLock<usize>>,
    fail_initialize: Arc<RwLock<bool>>,
}

impl MockPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `verb` with the given stdout
    pub fn respond(&self, verb: Verb, stdout: impl Into<String>) {
        self.responses
            .write()
            .unwrap()
            .insert(verb, Scripted::Output(CommandOutput::new(stdout, "")));
    }

    /// Answer `verb` with a helm `--output json` document
    pub fn respond_release(&self, verb: Verb, status: &str, description: &str) {
        self.respond(verb, fixtures::release_json("release", status, description));
    }

    /// Make `verb` exit with status 1 and the given stderr
    pub fn fail(&self, verb: Verb, stderr: impl Into<String>) {
        self.responses.write().unwrap().insert(
            verb,
            Scripted::Failure {
                code: 1,
                stderr: stderr.into(),
            },
        );
    }

    /// Make [`PackageManager::initialize`] fail
    pub fn fail_initialize(&self, fail: bool) {
        *self.fail_initialize.write().unwrap() = fail;
    }

    /// Every command executed, in order
    pub fn commands(&self) -> Vec<HelmCommand> {
        self.commands.read().unwrap().clone()
    }

    /// Verbs executed, in order
    pub fn verbs(&self) -> Vec<Verb> {
        self.commands.read().unwrap().iter().map(HelmCommand::verb).collect()
    }

    pub fn command_count(&self) -> usize {
        self.commands.read().unwrap().len()
    }

    /// How many times initialization actually ran
    pub fn initializations(&self) -> usize {
        *self.initializations.read().unwrap()
    }
}

#[async_trait]
impl PackageManager for MockPackageManager {
    async fn execute(&self, command: &HelmCommand) -> Result<CommandOutput> {
        self.commands.write().unwrap().push(command.clone());

        let scripted = self.responses.read().unwrap().get(&command.verb()).cloned();
        match scripted {
            None => Ok(CommandOutput::default()),
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Failure { code, stderr }) => Err(KubeError::CommandFailed {
                command: command.to_string(),
                code: Some(code),
                stderr,
            }),
        }
    }

    async fn initialize(&self) -> Result<()> {
        if *self.fail_initialize.read().unwrap() {
            return Err(KubeError::Execution {
                command: "version --short".to_string(),
                message: "helm not found".to_string(),
            });
        }

        let mut count = self.initializations.write().unwrap();
        if *count == 0 {
            *count = 1;
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        *self.initializations.read().unwrap() > 0
    }
}

/// Resolver that always answers with the same cluster, or always fails
#[derive(Clone)]
pub struct StaticResolver {
    config: Option<ClusterConfig>,
    resolutions: Arc<RwLock<Vec<String>>>,
}

impl StaticResolver {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config: Some(config),
            resolutions: Arc::default(),
        }
    }

    /// A resolver whose credential service has no mapping for anything
    pub fn failing() -> Self {
        Self {
            config: None,
            resolutions: Arc::default(),
        }
    }

    /// Release names resolved so far
    pub fn resolutions(&self) -> Vec<String> {
        self.resolutions.read().unwrap().clone()
    }
}

#[async_trait]
impl ClusterConfigResolver for StaticResolver {
    async fn resolve(&self, release_name: &str) -> Result<ClusterConfig> {
        self.resolutions
            .write()
            .unwrap()
            .push(release_name.to_string());

        self.config
            .clone()
            .ok_or_else(|| KubeError::config_resolution(release_name, "no cluster mapping for release"))
    }
}

/// Builders for Kubernetes objects and helm responses used in tests
pub mod fixtures {
    use k8s_openapi::api::apps::v1::{
        Deployment, DeploymentSpec, DeploymentStatus, StatefulSet, StatefulSetSpec,
        StatefulSetStatus,
    };
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, PersistentVolumeClaim,
        PersistentVolumeClaimStatus, Pod, PodCondition, PodStatus, Secret, Service, ServiceSpec,
        ServiceStatus,
    };
    use k8s_openapi::ByteString;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// A service of the given type, optionally with a load balancer IP
    pub fn service(name: &str, service_type: &str, ingress_ip: Option<&str>) -> Service {
        Service {
            metadata: meta(name),
            spec: Some(ServiceSpec {
                type_: Some(service_type.to_string()),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: ingress_ip.map(|ip| {
                        vec![LoadBalancerIngress {
                            ip: Some(ip.to_string()),
                            ..Default::default()
                        }]
                    }),
                }),
                ..Default::default()
            }),
        }
    }

    /// A pod in `phase` with one condition per message
    pub fn pod(name: &str, phase: &str, condition_messages: &[&str]) -> Pod {
        let conditions = condition_messages
            .iter()
            .map(|message| PodCondition {
                type_: "PodScheduled".to_string(),
                status: "False".to_string(),
                message: Some(message.to_string()),
                ..Default::default()
            })
            .collect();

        Pod {
            metadata: meta(name),
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: Some(conditions),
                ..Default::default()
            }),
        }
    }

    pub fn volume_claim(name: &str, phase: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: meta(name),
            spec: None,
            status: Some(PersistentVolumeClaimStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn deployment(name: &str, desired: Option<i32>, ready: Option<i32>) -> Deployment {
        Deployment {
            metadata: meta(name),
            spec: Some(DeploymentSpec {
                replicas: desired,
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
        }
    }

    pub fn stateful_set(name: &str, desired: Option<i32>, ready: Option<i32>) -> StatefulSet {
        StatefulSet {
            metadata: meta(name),
            spec: Some(StatefulSetSpec {
                replicas: desired,
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
        }
    }

    /// A secret of `secret_type` holding raw (already decoded) bytes
    pub fn secret(name: &str, secret_type: &str, data: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = data
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();

        Secret {
            metadata: meta(name),
            type_: Some(secret_type.to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    /// A helm `--output json` release document
    pub fn release_json(name: &str, status: &str, description: &str) -> String {
        serde_json::json!({
            "name": name,
            "namespace": name,
            "info": {
                "status": status,
                "description": description,
            },
            "manifest": "",
        })
        .to_string()
    }
}
