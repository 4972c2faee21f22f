//! Helm release status normalization
//!
//! Helm reports `info.status` as a lowercase token (`pending-install`), older
//! versions as an uppercase token or a numeric code, sometimes wrapped in an
//! object (`{"code": 1}`). Everything is folded into [`RawStatus`] right at
//! the parsing boundary; the rest of the system only sees [`LifecycleState`].
//!
//! | code | token            | lifecycle   |
//! |------|------------------|-------------|
//! | 0    | unknown          | failed      |
//! | 1    | deployed         | deployed    |
//! | 2    | deleted          | failed      |
//! | 3    | superseded       | failed      |
//! | 4    | failed           | failed      |
//! | 5    | deleting         | failed      |
//! | 6    | pending_install  | in_progress |
//! | 7    | pending_upgrade  | in_progress |
//! | 8    | pending_rollback | in_progress |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

/// Normalized lifecycle of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Deployed,
    InProgress,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deployed => "deployed",
            Self::InProgress => "in_progress",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Status as reported by helm, folded onto the known set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawStatus {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Superseded,
    Failed,
    Deleting,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    /// Anything outside the table, case-folded
    Unrecognized(String),
}

impl RawStatus {
    /// Map a legacy numeric status code
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Deployed,
            2 => Self::Deleted,
            3 => Self::Superseded,
            4 => Self::Failed,
            5 => Self::Deleting,
            6 => Self::PendingInstall,
            7 => Self::PendingUpgrade,
            8 => Self::PendingRollback,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Map a status token, ignoring case and `-`/`_` differences
    pub fn from_token(token: &str) -> Self {
        let folded = token.trim().to_ascii_lowercase().replace('-', "_");
        if let Ok(code) = folded.parse::<i64>() {
            return Self::from_code(code);
        }

        match folded.as_str() {
            "unknown" | "" => Self::Unknown,
            "deployed" => Self::Deployed,
            "deleted" | "uninstalled" => Self::Deleted,
            "superseded" => Self::Superseded,
            "failed" => Self::Failed,
            "deleting" | "uninstalling" => Self::Deleting,
            "pending_install" => Self::PendingInstall,
            "pending_upgrade" => Self::PendingUpgrade,
            "pending_rollback" => Self::PendingRollback,
            _ => Self::Unrecognized(folded),
        }
    }

    /// Map whatever JSON shape helm used for `info.status`
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::from_token(s),
            Value::Number(n) => n
                .as_i64()
                .map(Self::from_code)
                .unwrap_or_else(|| Self::Unrecognized(n.to_string())),
            Value::Object(map) => map
                .get("code")
                .map(Self::from_json)
                .unwrap_or(Self::Unknown),
            Value::Null => Self::Unknown,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Canonical lowercase token
    pub fn as_token(&self) -> &str {
        match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Deleted => "deleted",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::PendingInstall => "pending_install",
            Self::PendingUpgrade => "pending_upgrade",
            Self::PendingRollback => "pending_rollback",
            Self::Unrecognized(s) => s,
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        match self {
            Self::Deployed => LifecycleState::Deployed,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback => {
                LifecycleState::InProgress
            }
            _ => LifecycleState::Failed,
        }
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

/// The `info` block of a helm JSON response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default, deserialize_with = "status_from_json")]
    pub status: RawStatus,

    #[serde(default)]
    pub description: String,
}

/// A helm `--output json` response for install, upgrade or status
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseResponse {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub info: ReleaseInfo,

    /// Rendered manifests, multi-document YAML
    #[serde(default)]
    pub manifest: Option<String>,

    /// Resource groups as `[{name: "v1/Service", resources: [...]}]`
    #[serde(default)]
    pub resources: Value,
}

impl ReleaseResponse {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn status(&self) -> &RawStatus {
        &self.info.status
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.info.status.lifecycle()
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    /// Name of the first Service created by the release, if any
    pub fn first_service(&self) -> Option<String> {
        self.service_from_resources()
            .or_else(|| self.service_from_manifest())
    }

    fn service_from_resources(&self) -> Option<String> {
        let group = self.resources.as_array()?.iter().find(|group| {
            group
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.to_lowercase().contains("/service"))
        })?;

        match group.get("resources")?.get(0)? {
            Value::String(name) => Some(name.clone()),
            other => other
                .pointer("/metadata/name")
                .or_else(|| other.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    fn service_from_manifest(&self) -> Option<String> {
        let manifest = self.manifest.as_deref()?;

        for document in serde_yaml::Deserializer::from_str(manifest) {
            let Ok(doc) = serde_yaml::Value::deserialize(document) else {
                continue;
            };

            if doc.get("kind").and_then(|k| k.as_str()) != Some("Service") {
                continue;
            }

            if let Some(name) = doc
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|n| n.as_str())
            {
                return Some(name.to_string());
            }
        }

        None
    }
}

fn status_from_json<'de, D>(deserializer: D) -> std::result::Result<RawStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(RawStatus::from_json(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_folding() {
        assert_eq!(RawStatus::from_token("DEPLOYED"), RawStatus::Deployed);
        assert_eq!(RawStatus::from_token("pending-install"), RawStatus::PendingInstall);
        assert_eq!(RawStatus::from_token("PENDING_UPGRADE"), RawStatus::PendingUpgrade);
        assert_eq!(RawStatus::from_token("uninstalled"), RawStatus::Deleted);
        assert_eq!(
            RawStatus::from_token("Exploded"),
            RawStatus::Unrecognized("exploded".to_string())
        );
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(RawStatus::from_json(&json!(1)), RawStatus::Deployed);
        assert_eq!(RawStatus::from_json(&json!({"code": 7})), RawStatus::PendingUpgrade);
        assert_eq!(RawStatus::from_json(&json!("8")), RawStatus::PendingRollback);
        assert_eq!(
            RawStatus::from_json(&json!(42)),
            RawStatus::Unrecognized("42".to_string())
        );
    }

    #[test]
    fn test_lifecycle_mapping() {
        assert_eq!(RawStatus::Deployed.lifecycle(), LifecycleState::Deployed);
        for status in [
            RawStatus::PendingInstall,
            RawStatus::PendingUpgrade,
            RawStatus::PendingRollback,
        ] {
            assert_eq!(status.lifecycle(), LifecycleState::InProgress);
        }
        for status in [
            RawStatus::Unknown,
            RawStatus::Deleted,
            RawStatus::Superseded,
            RawStatus::Failed,
            RawStatus::Deleting,
            RawStatus::Unrecognized("weird".to_string()),
        ] {
            assert_eq!(status.lifecycle(), LifecycleState::Failed);
        }
    }

    #[test]
    fn test_parse_helm3_response() {
        let json = r#"{
            "name": "tenant-42",
            "namespace": "tenant-42",
            "info": {"status": "deployed", "description": "Install complete"},
            "manifest": "---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: tenant-42-web\n"
        }"#;

        let response = ReleaseResponse::parse(json).unwrap();
        assert_eq!(response.lifecycle(), LifecycleState::Deployed);
        assert_eq!(response.description(), "Install complete");
        assert_eq!(response.first_service().as_deref(), Some("tenant-42-web"));
    }

    #[test]
    fn test_parse_resource_groups() {
        let json = r#"{
            "info": {"status": {"code": 1}, "description": "ok"},
            "resources": [
                {"name": "v1/ConfigMap", "resources": ["cfg"]},
                {"name": "v1/Service", "resources": ["tenant-42-db", "tenant-42-web"]}
            ]
        }"#;

        let response = ReleaseResponse::parse(json).unwrap();
        assert_eq!(response.status(), &RawStatus::Deployed);
        assert_eq!(response.first_service().as_deref(), Some("tenant-42-db"));
    }

    #[test]
    fn test_no_service() {
        let response =
            ReleaseResponse::parse(r#"{"info": {"status": "failed", "description": "boom"}}"#)
                .unwrap();
        assert_eq!(response.first_service(), None);
        assert_eq!(response.lifecycle(), LifecycleState::Failed);
    }

    #[test]
    fn test_invalid_json() {
        assert!(ReleaseResponse::parse("Error: release not found").is_err());
    }
}
