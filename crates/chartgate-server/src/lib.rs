//! Chartgate Server - HTTP gateway for per-tenant helm releases
//!
//! Wires the release manager from `chartgate-kube` to an axum router:
//! - `api`: routes, request extraction and success envelopes
//! - `config`: flags and environment variables
//! - `error`: uniform failure responses

pub mod api;
pub mod config;
pub mod error;

use chartgate_kube::{
    CachingResolver, ClusterConfigResolver, HelmGateway, KubeConnector, ReleaseManager,
    RemoteResolver,
};
use std::sync::Arc;

pub use api::{AppState, router};
pub use config::{CredentialStrategy, ServerConfig};
pub use error::ApiError;

impl AppState {
    /// Build the production collaborators from configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        let remote = RemoteResolver::new(&config.credential_service_url, config.credential_timeout())?;

        let resolver: Arc<dyn ClusterConfigResolver> = match config.credential_strategy {
            CredentialStrategy::Remote => Arc::new(remote),
            CredentialStrategy::Cached => {
                let dir = config.cache_dir()?;
                tracing::info!(path = %dir.display(), "Caching cluster credentials");
                Arc::new(CachingResolver::new(remote, dir)?)
            }
        };

        let helm = Arc::new(HelmGateway::new(config.gateway_config()));
        let manager = ReleaseManager::new(resolver, helm, Arc::new(KubeConnector::new()));
        Ok(Self::new(manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_invalid_credential_service_url() {
        let config =
            ServerConfig::try_parse_from(["chartgate", "--credential-service-url", "not a url"]).unwrap();
        assert!(AppState::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_cached_strategy_creates_cache_dir() {
        let dir = std::env::temp_dir().join(format!("chartgate-test-{}", std::process::id()));
        let config = ServerConfig::try_parse_from([
            "chartgate",
            "--credential-service-url",
            "http://hcaas:8080",
            "--credential-strategy",
            "cached",
            "--credential-cache-dir",
            dir.to_str().unwrap(),
        ])
        .unwrap();

        let state = AppState::from_config(&config).unwrap();
        assert!(dir.is_dir());
        assert!(!state.manager.is_ready());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
