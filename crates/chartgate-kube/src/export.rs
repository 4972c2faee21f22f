//! Connection details for a release namespace
//!
//! Tenants need the generated credentials and service endpoints to connect
//! to what was deployed. Only `Opaque` secrets are exported (service account
//! tokens, TLS and registry secrets stay in the cluster), and their payloads
//! are passed through as-is, base64 encoded as the API returns them.

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceSpec, ServiceStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cluster::ClusterApi;
use crate::error::Result;

const OPAQUE: &str = "Opaque";

/// Secrets and services of one namespace
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionBundle {
    pub secrets: Vec<SecretEntry>,
    pub services: Vec<ServiceEntry>,
}

/// An exported secret
#[derive(Debug, Clone, Serialize)]
pub struct SecretEntry {
    pub name: String,
    pub data: BTreeMap<String, ByteString>,
}

/// An exported service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceEntry {
    pub name: String,
    pub metadata: ObjectMeta,
    pub spec: Option<ServiceSpec>,
    pub status: Option<ServiceStatus>,
}

impl From<Secret> for SecretEntry {
    fn from(secret: Secret) -> Self {
        Self {
            name: secret.metadata.name.unwrap_or_default(),
            data: secret.data.unwrap_or_default(),
        }
    }
}

impl From<Service> for ServiceEntry {
    fn from(service: Service) -> Self {
        Self {
            name: service.metadata.name.clone().unwrap_or_default(),
            metadata: service.metadata,
            spec: service.spec,
            status: service.status,
        }
    }
}

/// Reads the connection bundle of a namespace
pub struct ResourceExporter<'a> {
    cluster: &'a dyn ClusterApi,
}

impl<'a> ResourceExporter<'a> {
    pub fn new(cluster: &'a dyn ClusterApi) -> Self {
        Self { cluster }
    }

    /// Opaque secrets and all services of the namespace
    pub async fn export(&self, namespace: &str) -> Result<ConnectionBundle> {
        let secrets = self.secrets(namespace).await?;
        let services = self.services(namespace).await?;

        tracing::debug!(
            namespace,
            secrets = secrets.len(),
            services = services.len(),
            "Exported connection details"
        );
        Ok(ConnectionBundle { secrets, services })
    }

    pub async fn secrets(&self, namespace: &str) -> Result<Vec<SecretEntry>> {
        let secrets = self.cluster.list_secrets(namespace).await?;
        Ok(secrets
            .into_iter()
            .filter(|s| s.type_.as_deref() == Some(OPAQUE))
            .map(SecretEntry::from)
            .collect())
    }

    pub async fn services(&self, namespace: &str) -> Result<Vec<ServiceEntry>> {
        let services = self.cluster.list_services(namespace).await?;
        Ok(services.into_iter().map(ServiceEntry::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClusterApi, fixtures};

    #[tokio::test]
    async fn test_only_opaque_secrets_are_exported() {
        let cluster = MockClusterApi::new();
        cluster.add_secret("ns", fixtures::secret("db-credentials", "Opaque", &[("password", "hunter2")]));
        cluster.add_secret("ns", fixtures::secret("default-token", "kubernetes.io/service-account-token", &[("token", "t")]));
        cluster.add_secret("ns", fixtures::secret("tls", "kubernetes.io/tls", &[]));
        cluster.add_service("ns", fixtures::service("db", "ClusterIP", None));

        let bundle = ResourceExporter::new(&cluster).export("ns").await.unwrap();

        assert_eq!(bundle.secrets.len(), 1);
        assert_eq!(bundle.secrets[0].name, "db-credentials");
        assert_eq!(bundle.services.len(), 1);
        assert_eq!(bundle.services[0].name, "db");
    }

    #[tokio::test]
    async fn test_wire_shape() {
        let cluster = MockClusterApi::new();
        cluster.add_secret("ns", fixtures::secret("db-credentials", "Opaque", &[("password", "hunter2")]));
        cluster.add_service("ns", fixtures::service("web", "LoadBalancer", Some("34.1.2.3")));

        let bundle = ResourceExporter::new(&cluster).export("ns").await.unwrap();
        let json = serde_json::to_value(&bundle).unwrap();

        // Payloads stay base64 encoded
        assert_eq!(json["secrets"][0]["data"]["password"], "aHVudGVyMg==");
        assert_eq!(json["services"][0]["name"], "web");
        assert_eq!(json["services"][0]["metadata"]["name"], "web");
        assert_eq!(json["services"][0]["spec"]["type"], "LoadBalancer");
        assert_eq!(json["services"][0]["status"]["loadBalancer"]["ingress"][0]["ip"], "34.1.2.3");
    }

    #[tokio::test]
    async fn test_empty_namespace() {
        let cluster = MockClusterApi::new();
        let bundle = ResourceExporter::new(&cluster).export("ns").await.unwrap();
        assert!(bundle.secrets.is_empty());
        assert!(bundle.services.is_empty());
    }
}
