//! Release request types and validation
//!
//! A release is identified by its name, which doubles as the Kubernetes
//! namespace it is installed into. Nothing about a release is persisted here:
//! helm and the cluster remain the source of truth.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

use crate::error::{CoreError, Result};

/// Helm refuses release names longer than this
pub const MAX_RELEASE_NAME_LEN: usize = 53;

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

/// A deployment request for a single tenant release
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name, also used as the namespace
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_name: String,

    /// Chart reference, usually `<repo>/<chart>`
    #[serde(default, deserialize_with = "null_as_default")]
    pub chart_name: String,

    /// URL of a private chart repository to register before installing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_charts_repo: Option<String>,

    /// Value overrides, rendered as `--set key=value` in insertion order
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: IndexMap<String, serde_json::Value>,

    /// Extra helm flags, rendered as `--key=value`
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: IndexMap<String, serde_json::Value>,

    /// Boolean-like text; see [`is_truthy`]
    #[serde(
        default,
        deserialize_with = "scalar_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub reuse_value: Option<String>,
}

impl Release {
    /// Create a request for the given release and chart
    pub fn new(release_name: impl Into<String>, chart_name: impl Into<String>) -> Self {
        Self {
            release_name: release_name.into(),
            chart_name: chart_name.into(),
            ..Default::default()
        }
    }

    /// Add a value override
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add an extra helm flag
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }

    /// Register a private chart repository before install/upgrade
    pub fn with_private_repo(mut self, url: impl Into<String>) -> Self {
        self.private_charts_repo = Some(url.into());
        self
    }

    /// Set the reuse-values text
    pub fn with_reuse_value(mut self, value: impl Into<String>) -> Self {
        self.reuse_value = Some(value.into());
        self
    }

    /// Whether `--reuse-values` should be passed
    pub fn reuse_values(&self) -> bool {
        self.reuse_value.as_deref().is_some_and(is_truthy)
    }

    /// Repository alias for a private repo: the chart name up to the first `/`
    pub fn repository_root(&self) -> &str {
        self.chart_name
            .split('/')
            .next()
            .unwrap_or(&self.chart_name)
    }

    /// Validate everything install and upgrade render into the command line
    pub fn validate_for_deploy(&self) -> Result<()> {
        validate_release_name(&self.release_name)?;
        validate_chart_name(&self.chart_name)?;
        for key in self.flags.keys() {
            validate_flag_name(key)?;
        }
        for key in self.values.keys() {
            validate_value_key(key)?;
        }
        Ok(())
    }
}

/// Textual truthiness: `true`, `1` or `on`, case-insensitive, surrounding
/// whitespace ignored. Everything else is false.
pub fn is_truthy(text: &str) -> bool {
    let text = text.trim();
    ["true", "1", "on"]
        .iter()
        .any(|candidate| text.eq_ignore_ascii_case(candidate))
}

/// Validate a release name.
///
/// The name becomes a namespace, so it must be a DNS-1123 label within helm's
/// length limit.
pub fn validate_release_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::missing("releaseName"));
    }

    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(CoreError::InvalidField {
            field: "releaseName".to_string(),
            value: name.to_string(),
            reason: format!("must be at most {} characters", MAX_RELEASE_NAME_LEN),
        });
    }

    if !DNS_LABEL.is_match(name) {
        return Err(CoreError::InvalidField {
            field: "releaseName".to_string(),
            value: name.to_string(),
            reason: "must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric".to_string(),
        });
    }

    Ok(())
}

/// Validate a chart reference
pub fn validate_chart_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::missing("chartName"));
    }

    if name.starts_with('-') {
        return Err(CoreError::InvalidField {
            field: "chartName".to_string(),
            value: name.to_string(),
            reason: "must not start with '-'".to_string(),
        });
    }

    Ok(())
}

/// Validate a user flag name and return it without leading dashes
pub fn validate_flag_name(key: &str) -> Result<&str> {
    let name = key.trim_start_matches('-');
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(CoreError::InvalidField {
            field: "flags".to_string(),
            value: key.to_string(),
            reason: "flag names must be non-empty and contain no whitespace".to_string(),
        });
    }
    Ok(name)
}

/// Validate a `--set` key
pub fn validate_value_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CoreError::InvalidField {
            field: "values".to_string(),
            value: String::new(),
            reason: "keys must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Treat an explicit `null` like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept any JSON scalar and keep its text form
fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
