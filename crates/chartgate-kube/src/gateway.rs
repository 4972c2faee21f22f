//! Helm process execution
//!
//! [`HelmGateway`] runs the helm binary with an argv vector (no shell),
//! captures stdout and stderr up to a size ceiling, and optionally enforces a
//! timeout. A child that overflows or times out is killed.
//!
//! Initialization is explicit: [`PackageManager::initialize`] probes the
//! binary once and flips the readiness flag. Later calls are no-ops, and a
//! failed probe is retried on the next call.

use async_trait::async_trait;
use chartgate_core::{CommandBuilder, HelmCommand, Release};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;

use crate::error::{KubeError, Result};

/// Default ceiling for each output stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4_000_000;

/// Default time a single helm invocation may take
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Executes helm commands
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Run a command to completion
    async fn execute(&self, command: &HelmCommand) -> Result<CommandOutput>;

    /// One-time client setup, safe to call repeatedly
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded
    fn is_ready(&self) -> bool {
        true
    }
}

/// Register the release's private repository, if any, then refresh all
/// repositories. Both must succeed before install or upgrade runs.
pub async fn prepare_repositories(helm: &dyn PackageManager, release: &Release) -> Result<()> {
    if let Some(repo_url) = release
        .private_charts_repo
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        validate_repository_url(repo_url)?;
        let root = release.repository_root();
        tracing::info!(repository = root, url = repo_url, "Registering private chart repository");
        helm.execute(&CommandBuilder::repo_add(root, repo_url)).await?;
    }

    helm.execute(&CommandBuilder::repo_update()).await?;
    Ok(())
}

/// A private repository must be an absolute URL
pub fn validate_repository_url(repo_url: &str) -> Result<()> {
    url::Url::parse(repo_url.trim()).map(|_| ()).map_err(|e| {
        KubeError::Validation(format!("invalid privateChartsRepo '{}': {}", repo_url, e))
    })
}

/// Gateway settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Path to the helm binary
    pub binary: PathBuf,

    /// Ceiling for stdout and stderr, each
    pub max_output_bytes: usize,

    /// Per-command timeout; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

/// [`PackageManager`] that spawns the helm binary
#[derive(Debug)]
pub struct HelmGateway {
    config: GatewayConfig,
    version: OnceCell<String>,
}

enum ReadError {
    Io(std::io::Error),
    Overflow,
}

impl HelmGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            version: OnceCell::new(),
        }
    }

    /// Version reported by the binary once initialized
    pub fn version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }

    async fn run(&self, command: &HelmCommand) -> Result<CommandOutput> {
        let cmd_display = command.to_string();
        let limit = self.config.max_output_bytes;
        tracing::info!(command = %cmd_display, "Executing helm");

        let mut child = tokio::process::Command::new(&self.config.binary)
            .args(command.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KubeError::Execution {
                command: cmd_display.clone(),
                message: format!("failed to spawn {}: {}", self.config.binary.display(), e),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let completion = async {
            let (out, err) = tokio::try_join!(read_limited(stdout, limit), read_limited(stderr, limit))?;
            let status = child.wait().await.map_err(ReadError::Io)?;
            Ok::<_, ReadError>((out, err, status))
        };

        let finished = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, completion).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.start_kill();
                    return Err(KubeError::Execution {
                        command: cmd_display,
                        message: format!("timed out after {:?}", timeout),
                    });
                }
            },
            None => completion.await,
        };

        let (out, err, status) = match finished {
            Ok(done) => done,
            Err(ReadError::Overflow) => {
                let _ = child.start_kill();
                tracing::warn!(command = %cmd_display, limit, "Helm output exceeded ceiling");
                return Err(KubeError::OutputTooLarge {
                    command: cmd_display,
                    limit,
                });
            }
            Err(ReadError::Io(e)) => {
                let _ = child.start_kill();
                return Err(KubeError::Execution {
                    command: cmd_display,
                    message: e.to_string(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&out).into_owned();
        let stderr = String::from_utf8_lossy(&err).into_owned();

        if !status.success() {
            let text = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            tracing::warn!(command = %cmd_display, code = ?status.code(), stderr = text, "Helm command failed");
            return Err(KubeError::CommandFailed {
                command: cmd_display,
                code: status.code(),
                stderr: text.to_string(),
            });
        }

        tracing::debug!(
            command = %cmd_display,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "Helm command finished"
        );
        Ok(CommandOutput { stdout, stderr })
    }
}

#[async_trait]
impl PackageManager for HelmGateway {
    async fn execute(&self, command: &HelmCommand) -> Result<CommandOutput> {
        self.run(command).await
    }

    async fn initialize(&self) -> Result<()> {
        self.version
            .get_or_try_init(|| async {
                let output = self.run(&CommandBuilder::version()).await?;
                let version = output.stdout.trim().to_string();
                tracing::info!(
                    binary = %self.config.binary.display(),
                    version = %version,
                    "Package manager initialized"
                );
                Ok::<_, KubeError>(version)
            })
            .await?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.version.initialized()
    }
}

async fn read_limited<R>(reader: Option<R>, limit: usize) -> std::result::Result<Vec<u8>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(ReadError::Io)?;

    if buf.len() > limit {
        return Err(ReadError::Overflow);
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chartgate_core::ClusterConfig;
    use std::os::unix::fs::PermissionsExt;

    fn gateway(binary: impl Into<PathBuf>) -> HelmGateway {
        HelmGateway::new(GatewayConfig {
            binary: binary.into(),
            ..Default::default()
        })
    }

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("helm");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn status_command() -> HelmCommand {
        let cluster = ClusterConfig::new("prod", "https://prod:6443", "tok");
        CommandBuilder::status("tenant-42", &cluster).unwrap()
    }

    #[tokio::test]
    async fn test_arguments_are_passed_verbatim() {
        let output = gateway("echo").execute(&status_command()).await.unwrap();
        assert_eq!(
            output.stdout.trim(),
            "status tenant-42 --namespace tenant-42 --output json --kube-apiserver https://prod:6443 --kube-token tok"
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let helm = script(&dir, "echo 'Error: release: not found' >&2\nexit 1");

        let err = gateway(helm).execute(&status_command()).await.unwrap_err();
        match err {
            KubeError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "Error: release: not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = gateway("/nonexistent/helm")
            .execute(&status_command())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Execution { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_output_ceiling() {
        let gateway = HelmGateway::new(GatewayConfig {
            binary: PathBuf::from("yes"),
            max_output_bytes: 1024,
            timeout: Some(Duration::from_secs(10)),
        });

        let err = gateway.execute(&status_command()).await.unwrap_err();
        assert!(matches!(err, KubeError::OutputTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let helm = script(&dir, "sleep 5");
        let gateway = HelmGateway::new(GatewayConfig {
            binary: helm,
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        });

        let err = gateway.execute(&status_command()).await.unwrap_err();
        assert!(err.to_string().contains("timed out after 200ms"), "{err}");
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let helm = script(
            &dir,
            &format!("echo x >> {}\necho v3.14.2+g1234", counter.display()),
        );
        let gateway = gateway(helm);

        assert!(!gateway.is_ready());
        gateway.initialize().await.unwrap();
        gateway.initialize().await.unwrap();

        assert!(gateway.is_ready());
        assert_eq!(gateway.version(), Some("v3.14.2+g1234"));
        let calls = std::fs::read_to_string(counter).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_stays_unready() {
        let gateway = gateway("/nonexistent/helm");
        assert!(gateway.initialize().await.is_err());
        assert!(!gateway.is_ready());
    }
}
