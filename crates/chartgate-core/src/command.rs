//! Typed helm command lines
//!
//! Commands are kept as a verb, positionals and flags until the very last
//! moment, when [`HelmCommand::to_args`] turns them into an argv vector for
//! the process gateway. Nothing is ever passed through a shell.
//!
//! The `Display` form is meant for logs: secret flag values are masked.

use serde_json::Value;
use std::fmt;

use crate::cluster::ClusterConfig;
use crate::error::Result;
use crate::release::{
    Release, validate_chart_name, validate_flag_name, validate_release_name, validate_value_key,
};

/// Helm subcommands used by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Install,
    Upgrade,
    Status,
    Uninstall,
    RepoAdd,
    RepoUpdate,
    Version,
}

impl Verb {
    /// Words the verb expands to on the command line
    pub fn words(&self) -> &'static [&'static str] {
        match self {
            Self::Install => &["install"],
            Self::Upgrade => &["upgrade"],
            Self::Status => &["status"],
            Self::Uninstall => &["uninstall"],
            Self::RepoAdd => &["repo", "add"],
            Self::RepoUpdate => &["repo", "update"],
            Self::Version => &["version"],
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words().join(" "))
    }
}

/// Lifecycle operations that act on a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Install,
    Upgrade,
    Status,
    Uninstall,
}

impl Intent {
    pub fn verb(self) -> Verb {
        match self {
            Self::Install => Verb::Install,
            Self::Upgrade => Verb::Upgrade,
            Self::Status => Verb::Status,
            Self::Uninstall => Verb::Uninstall,
        }
    }

    /// Install and upgrade need a chart and accept values
    pub fn deploys_chart(self) -> bool {
        matches!(self, Self::Install | Self::Upgrade)
    }

    /// Whether helm is asked for `--output json`
    pub fn structured_output(self) -> bool {
        !matches!(self, Self::Uninstall)
    }
}

/// A single command-line flag
#[derive(Clone, PartialEq, Eq)]
pub enum Flag {
    /// `--name`
    Switch(String),
    /// `--name value`
    Pair(String, String),
    /// `--name=value`
    Inline(String, String),
    /// `--name value`, masked in logs
    Secret(String, String),
}

impl Flag {
    pub fn switch(name: impl Into<String>) -> Self {
        Self::Switch(name.into())
    }

    pub fn pair(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Pair(name.into(), value.into())
    }

    pub fn secret(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Secret(name.into(), value.into())
    }

    /// Flag name without leading dashes
    pub fn name(&self) -> &str {
        match self {
            Self::Switch(n) | Self::Pair(n, _) | Self::Inline(n, _) | Self::Secret(n, _) => n,
        }
    }

    /// Flag value, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Switch(_) => None,
            Self::Pair(_, v) | Self::Inline(_, v) | Self::Secret(_, v) => Some(v),
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::Switch(n) => args.push(format!("--{}", n)),
            Self::Pair(n, v) | Self::Secret(n, v) => {
                args.push(format!("--{}", n));
                args.push(v.clone());
            }
            Self::Inline(n, v) => args.push(format!("--{}={}", n, v)),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(n, _) => f.debug_tuple("Secret").field(n).field(&"***").finish(),
            Self::Switch(n) => f.debug_tuple("Switch").field(n).finish(),
            Self::Pair(n, v) => f.debug_tuple("Pair").field(n).field(v).finish(),
            Self::Inline(n, v) => f.debug_tuple("Inline").field(n).field(v).finish(),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch(n) => write!(f, "--{}", n),
            Self::Pair(n, v) => write!(f, "--{} {}", n, v),
            Self::Inline(n, v) => write!(f, "--{}={}", n, v),
            Self::Secret(n, _) => write!(f, "--{} ***", n),
        }
    }
}

/// A rendered but not yet executed helm invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmCommand {
    verb: Verb,
    positionals: Vec<String>,
    flags: Vec<Flag>,
}

impl HelmCommand {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            positionals: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.positionals.push(value.into());
        self
    }

    /// Append a flag
    pub fn flag(mut self, flag: Flag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn positionals(&self) -> &[String] {
        &self.positionals
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// Whether a flag with this name is present
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.name() == name)
    }

    /// All values of a repeated flag, in order
    pub fn flag_values(&self, name: &str) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|f| f.name() == name)
            .filter_map(Flag::value)
            .collect()
    }

    /// Render the argv vector passed to the helm binary
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.verb.words().iter().map(|w| w.to_string()).collect();
        args.extend(self.positionals.iter().cloned());
        for flag in &self.flags {
            flag.push_args(&mut args);
        }
        args
    }
}

impl fmt::Display for HelmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        for p in &self.positionals {
            write!(f, " {}", p)?;
        }
        for flag in &self.flags {
            write!(f, " {}", flag)?;
        }
        Ok(())
    }
}

/// Renders lifecycle intents into helm commands
pub struct CommandBuilder;

impl CommandBuilder {
    /// Build the command for a lifecycle intent.
    ///
    /// Fails before rendering anything if the release name (or, for install
    /// and upgrade, the chart name) is missing.
    pub fn build(intent: Intent, release: &Release, cluster: &ClusterConfig) -> Result<HelmCommand> {
        validate_release_name(&release.release_name)?;
        if intent.deploys_chart() {
            validate_chart_name(&release.chart_name)?;
        }

        let name = &release.release_name;
        let mut cmd = HelmCommand::new(intent.verb()).arg(name);
        if intent.deploys_chart() {
            cmd = cmd.arg(&release.chart_name);
        }

        cmd = cmd.flag(Flag::pair("namespace", name));
        if intent == Intent::Install {
            cmd = cmd.flag(Flag::switch("create-namespace"));
        }
        if intent.structured_output() {
            cmd = cmd.flag(Flag::pair("output", "json"));
        }

        cmd = Self::with_credentials(cmd, cluster);

        if intent.deploys_chart() {
            if release.reuse_values() {
                cmd = cmd.flag(Flag::switch("reuse-values"));
            }
            for (key, value) in &release.flags {
                cmd = cmd.flag(user_flag(key, value)?);
            }
            for (key, value) in &release.values {
                validate_value_key(key)?;
                cmd = cmd.flag(Flag::pair("set", format!("{}={}", key, render_scalar(value))));
            }
        }

        Ok(cmd)
    }

    pub fn install(release: &Release, cluster: &ClusterConfig) -> Result<HelmCommand> {
        Self::build(Intent::Install, release, cluster)
    }

    pub fn upgrade(release: &Release, cluster: &ClusterConfig) -> Result<HelmCommand> {
        Self::build(Intent::Upgrade, release, cluster)
    }

    pub fn status(release_name: &str, cluster: &ClusterConfig) -> Result<HelmCommand> {
        Self::build(Intent::Status, &Release::new(release_name, ""), cluster)
    }

    pub fn uninstall(release_name: &str, cluster: &ClusterConfig) -> Result<HelmCommand> {
        Self::build(Intent::Uninstall, &Release::new(release_name, ""), cluster)
    }

    /// `helm repo add <name> <url>`
    pub fn repo_add(name: &str, url: &str) -> HelmCommand {
        HelmCommand::new(Verb::RepoAdd).arg(name).arg(url)
    }

    /// `helm repo update`
    pub fn repo_update() -> HelmCommand {
        HelmCommand::new(Verb::RepoUpdate)
    }

    /// `helm version --short`, used to probe the binary at startup
    pub fn version() -> HelmCommand {
        HelmCommand::new(Verb::Version).flag(Flag::switch("short"))
    }

    fn with_credentials(cmd: HelmCommand, cluster: &ClusterConfig) -> HelmCommand {
        if let Some(path) = &cluster.kubeconfig_path {
            return cmd.flag(Flag::pair("kubeconfig", path.display().to_string()));
        }

        let cmd = cmd
            .flag(Flag::pair("kube-apiserver", &cluster.server))
            .flag(Flag::secret("kube-token", &cluster.token));

        if cluster.insecure_skip_tls_verify {
            cmd.flag(Flag::switch("kube-insecure-skip-tls-verify"))
        } else {
            cmd
        }
    }
}

fn user_flag(key: &str, value: &Value) -> Result<Flag> {
    let name = validate_flag_name(key)?;

    Ok(match value {
        Value::Bool(true) | Value::Null => Flag::switch(name),
        Value::String(s) if s.is_empty() => Flag::switch(name),
        other => Flag::Inline(name.to_string(), render_scalar(other)),
    })
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
