//! Kubernetes API access scoped to a release's cluster
//!
//! [`ClusterApi`] is the narrow surface the readiness checks, the resource
//! exporter and uninstall need. [`KubeConnector`] builds a real client from a
//! resolved [`ClusterConfig`]; tests use the in-memory mock instead.

use async_trait::async_trait;
use chartgate_core::ClusterConfig;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::sync::Arc;

use crate::error::{KubeError, Result};

/// Namespaced reads and namespace deletion against one cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
    ) -> Result<Vec<PersistentVolumeClaim>>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>>;

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>>;

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Opens a [`ClusterApi`] for a resolved cluster config
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>>;
}

/// [`ClusterApi`] backed by kube-rs
#[derive(Clone)]
pub struct KubeClusterApi {
    client: kube::Client,
}

impl KubeClusterApi {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    async fn list<K>(&self, kind: &'static str, namespace: &str) -> Result<Vec<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|source| KubeError::ClusterQuery {
                kind,
                namespace: namespace.to_string(),
                source,
            })
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        self.list("Service", namespace).await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.list("Pod", namespace).await
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: &str,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.list("PersistentVolumeClaim", namespace).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        self.list("Deployment", namespace).await
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        self.list("StatefulSet", namespace).await
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        self.list("Secret", namespace).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(namespace, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|source| KubeError::ClusterQuery {
                kind: "Namespace",
                namespace: namespace.to_string(),
                source,
            })
    }
}

/// Builds kube-rs clients from resolved cluster configs
#[derive(Debug, Clone, Default)]
pub struct KubeConnector;

impl KubeConnector {
    pub fn new() -> Self {
        Self
    }

    /// Build a kube client for the given cluster
    pub async fn client(config: &ClusterConfig) -> Result<kube::Client> {
        let rendered = config
            .to_kubeconfig(None)
            .map_err(|e| KubeError::Connection(e.to_string()))?;
        let kubeconfig =
            Kubeconfig::from_yaml(&rendered).map_err(|e| KubeError::Connection(e.to_string()))?;
        let client_config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| KubeError::Connection(e.to_string()))?;

        kube::Client::try_from(client_config).map_err(|e| KubeError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
        let client = Self::client(config).await?;
        Ok(Arc::new(KubeClusterApi::new(client)))
    }
}
