//! Server configuration from flags and environment

use chartgate_kube::{DEFAULT_MAX_OUTPUT_BYTES, GatewayConfig};
use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ApiError;

/// How cluster credentials are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialStrategy {
    /// Ask the credential service for every operation
    Remote,
    /// Ask once per release and keep a kubeconfig on disk
    Cached,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "chartgate")]
#[command(version)]
#[command(about = "HTTP gateway for provisioning per-tenant helm releases", long_about = None)]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Path to the helm binary
    #[arg(long, env = "HELM_BINARY", default_value = "helm")]
    pub helm_binary: PathBuf,

    /// Base URL of the cluster credential service
    #[arg(long, env = "HCAAS_API_URL")]
    pub credential_service_url: String,

    /// Credential resolution strategy
    #[arg(long, env = "CREDENTIAL_STRATEGY", value_enum, default_value_t = CredentialStrategy::Remote)]
    pub credential_strategy: CredentialStrategy,

    /// Directory for cached kubeconfigs [default: <data dir>/chartgate/clusters]
    #[arg(long, env = "CREDENTIAL_CACHE_DIR")]
    pub credential_cache_dir: Option<PathBuf>,

    /// Ceiling for helm stdout and stderr, each
    #[arg(long, env = "HELM_MAX_OUTPUT_BYTES", default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    pub max_output_bytes: usize,

    /// Seconds a helm command may run, 0 for no limit
    #[arg(long, env = "HELM_COMMAND_TIMEOUT_SECS", default_value_t = 600)]
    pub command_timeout_secs: u64,

    /// Seconds to wait for the credential service
    #[arg(long, env = "CREDENTIAL_TIMEOUT_SECS", default_value_t = 30)]
    pub credential_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn credential_timeout(&self) -> Duration {
        Duration::from_secs(self.credential_timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            binary: self.helm_binary.clone(),
            max_output_bytes: self.max_output_bytes,
            timeout: (self.command_timeout_secs > 0)
                .then(|| Duration::from_secs(self.command_timeout_secs)),
        }
    }

    /// Cache directory, falling back to the platform data directory
    pub fn cache_dir(&self) -> Result<PathBuf, ApiError> {
        if let Some(dir) = &self.credential_cache_dir {
            return Ok(dir.clone());
        }

        dirs::data_dir()
            .map(|d| d.join("chartgate").join("clusters"))
            .ok_or_else(|| ApiError::Startup {
                message: "no data directory available for the credential cache".to_string(),
                help: Some("set --credential-cache-dir or CREDENTIAL_CACHE_DIR".to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        ServerConfig::command().debug_assert();
    }

    #[test]
    fn test_flags() {
        let config = ServerConfig::try_parse_from([
            "chartgate",
            "--port",
            "8080",
            "--bind-address",
            "127.0.0.1",
            "--credential-service-url",
            "http://hcaas:8080/api",
            "--credential-strategy",
            "cached",
            "--credential-cache-dir",
            "/var/lib/chartgate",
            "--command-timeout-secs",
            "0",
        ])
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.credential_strategy, CredentialStrategy::Cached);
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/var/lib/chartgate"));
        assert_eq!(config.gateway_config().timeout, None);
    }

    #[test]
    fn test_command_timeout() {
        let config = ServerConfig::try_parse_from([
            "chartgate",
            "--credential-service-url",
            "http://hcaas",
            "--command-timeout-secs",
            "90",
        ])
        .unwrap();

        assert_eq!(config.gateway_config().timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result = ServerConfig::try_parse_from([
            "chartgate",
            "--credential-service-url",
            "http://hcaas",
            "--credential-strategy",
            "sometimes",
        ]);
        assert!(result.is_err());
    }
}
