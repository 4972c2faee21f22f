//! Cluster credential resolution
//!
//! Two strategies are available:
//! - [`RemoteResolver`] asks the credential service on every call
//! - [`CachingResolver`] asks once per release and keeps the answer as a
//!   kubeconfig file, which helm then receives through `--kubeconfig`
//!
//! Cache files are written to a temporary file in the cache directory and
//! renamed into place, so a reader never observes a partial document.

use async_trait::async_trait;
use chartgate_core::{ClusterConfig, CredentialBundle, validate_release_name};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{KubeError, Result};

/// Resolves the cluster a release lives on
#[async_trait]
pub trait ClusterConfigResolver: Send + Sync {
    async fn resolve(&self, release_name: &str) -> Result<ClusterConfig>;
}

/// Fetches credentials from the credential service on every call
#[derive(Debug, Clone)]
pub struct RemoteResolver {
    endpoint: Url,
    client: reqwest::Client,
}

impl RemoteResolver {
    /// Create a resolver for the service rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut endpoint = Url::parse(base_url).map_err(|e| {
            KubeError::InvalidConfig(format!("credential service URL '{}': {}", base_url, e))
        })?;

        endpoint
            .path_segments_mut()
            .map_err(|_| {
                KubeError::InvalidConfig(format!(
                    "credential service URL '{}' cannot be a base",
                    base_url
                ))
            })?
            .pop_if_empty()
            .push("clusterConfig");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KubeError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self { endpoint, client })
    }

    /// Full lookup URL for a release
    pub fn lookup_url(&self, release_name: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("releaseName", release_name);
        url
    }

    /// Fetch the raw credential document
    pub async fn fetch_bundle(&self, release_name: &str) -> Result<CredentialBundle> {
        let url = self.lookup_url(release_name);
        tracing::debug!(release = release_name, %url, "fetching cluster credentials");

        let response = self.client.get(url).send().await.map_err(|e| {
            KubeError::config_resolution(release_name, format!("credential service unreachable: {}", e))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(KubeError::config_resolution(
                release_name,
                "no cluster mapping for release",
            ));
        }
        if !status.is_success() {
            return Err(KubeError::config_resolution(
                release_name,
                format!("credential service returned {}", status),
            ));
        }

        let body = response.text().await.map_err(|e| {
            KubeError::config_resolution(release_name, format!("reading response: {}", e))
        })?;

        if body.trim().is_empty() {
            return Err(KubeError::config_resolution(
                release_name,
                "no cluster mapping for release",
            ));
        }

        CredentialBundle::parse(&body).map_err(|e| KubeError::config_resolution(release_name, e))
    }
}

#[async_trait]
impl ClusterConfigResolver for RemoteResolver {
    async fn resolve(&self, release_name: &str) -> Result<ClusterConfig> {
        let bundle = self.fetch_bundle(release_name).await?;
        bundle
            .into_cluster_config(release_name)
            .map_err(|e| KubeError::config_resolution(release_name, e))
    }
}

/// Fetches once per release and reuses a kubeconfig kept on disk
#[derive(Debug, Clone)]
pub struct CachingResolver {
    remote: RemoteResolver,
    cache_dir: PathBuf,
}

impl CachingResolver {
    /// Create the resolver, creating the cache directory if needed
    pub fn new(remote: RemoteResolver, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { remote, cache_dir })
    }

    /// Path of the cached kubeconfig for a release
    pub fn cache_path(&self, release_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.kubeconfig", release_name))
    }

    fn load_cached(&self, release_name: &str, path: &Path) -> Option<ClusterConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(release = release_name, error = %e, "Unreadable credential cache, refetching");
                return None;
            }
        };

        match CredentialBundle::parse(&content).and_then(|b| b.into_cluster_config(release_name)) {
            Ok(config) => Some(config.with_kubeconfig_path(path)),
            Err(e) => {
                tracing::warn!(release = release_name, error = %e, "Credential cache corrupted, refetching");
                None
            }
        }
    }

    fn persist(&self, path: &Path, contents: &str) -> Result<()> {
        let mut file = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| KubeError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ClusterConfigResolver for CachingResolver {
    async fn resolve(&self, release_name: &str) -> Result<ClusterConfig> {
        // The name becomes a file name
        validate_release_name(release_name)?;

        let path = self.cache_path(release_name);
        if let Some(config) = self.load_cached(release_name, &path) {
            tracing::debug!(release = release_name, path = %path.display(), "using cached cluster credentials");
            return Ok(config);
        }

        let config = self.remote.resolve(release_name).await?;
        let kubeconfig = config
            .to_kubeconfig(Some(release_name))
            .map_err(|e| KubeError::config_resolution(release_name, e))?;

        self.persist(&path, &kubeconfig).map_err(|e| {
            KubeError::config_resolution(release_name, format!("writing credential cache: {}", e))
        })?;
        tracing::info!(release = release_name, path = %path.display(), "cached cluster credentials");

        Ok(config.with_kubeconfig_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bundle_json() -> serde_json::Value {
        serde_json::json!({
            "clusters": [{"name": "prod-eu", "cluster": {"server": "https://prod.example.com"}}],
            "users": [{"user": {"token": "tok-123"}}]
        })
    }

    async fn credential_service(expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/clusterConfig"))
            .and(query_param("releaseName", "tenant-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bundle_json()))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn remote(server: &MockServer) -> RemoteResolver {
        RemoteResolver::new(&format!("{}/api", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_lookup_url() {
        let resolver = RemoteResolver::new("http://hcaas:8080/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            resolver.lookup_url("tenant-42").as_str(),
            "http://hcaas:8080/api/clusterConfig?releaseName=tenant-42"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = RemoteResolver::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, KubeError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_remote_resolve() {
        let server = credential_service(1).await;
        let config = remote(&server).resolve("tenant-42").await.unwrap();

        assert_eq!(config.cluster_name, "prod-eu");
        assert_eq!(config.server, "https://prod.example.com");
        assert_eq!(config.token, "tok-123");
        assert_eq!(config.kubeconfig_path, None);
    }

    #[tokio::test]
    async fn test_remote_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = remote(&server).resolve("tenant-42").await.unwrap_err();
        assert!(matches!(err, KubeError::ConfigResolution { .. }));
        assert!(err.to_string().contains("no cluster mapping"));
    }

    #[tokio::test]
    async fn test_remote_unreachable() {
        let resolver = RemoteResolver::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = resolver.resolve("tenant-42").await.unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_remote_bundle_without_users() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "clusters": [{"cluster": {"server": "https://x"}}]
            })))
            .mount(&server)
            .await;

        let err = remote(&server).resolve("tenant-42").await.unwrap_err();
        assert!(err.to_string().contains("no user token"));
    }

    #[tokio::test]
    async fn test_caching_fetches_once() {
        let server = credential_service(1).await;
        let dir = tempfile::tempdir().unwrap();
        let resolver = CachingResolver::new(remote(&server), dir.path()).unwrap();

        let first = resolver.resolve("tenant-42").await.unwrap();
        let second = resolver.resolve("tenant-42").await.unwrap();

        let path = resolver.cache_path("tenant-42");
        assert!(path.exists());
        assert_eq!(first.kubeconfig_path.as_deref(), Some(path.as_path()));
        assert_eq!(first, second);
        assert_eq!(second.token, "tok-123");
        // Only the kubeconfig is left behind, no temp files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_cache_is_replaced() {
        let server = credential_service(1).await;
        let dir = tempfile::tempdir().unwrap();
        let resolver = CachingResolver::new(remote(&server), dir.path()).unwrap();
        std::fs::write(resolver.cache_path("tenant-42"), "clusters: [").unwrap();

        let config = resolver.resolve("tenant-42").await.unwrap();
        assert_eq!(config.server, "https://prod.example.com");

        let content = std::fs::read_to_string(resolver.cache_path("tenant-42")).unwrap();
        assert!(content.contains("tok-123"));
    }

    #[tokio::test]
    async fn test_caching_rejects_path_like_names() {
        let server = credential_service(0).await;
        let dir = tempfile::tempdir().unwrap();
        let resolver = CachingResolver::new(remote(&server), dir.path()).unwrap();

        let err = resolver.resolve("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, KubeError::Validation(_)));
    }
}
