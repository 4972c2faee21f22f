//! Readiness verdicts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a readiness evaluation or a status request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    Success,
    InProgress,
    Failed,
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::InProgress => "inprogress",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// `{status, message}` as returned by the readiness checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessVerdict {
    pub status: ReadinessStatus,
    pub message: String,
}

impl ReadinessVerdict {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ReadinessStatus::Success,
            message: message.into(),
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            status: ReadinessStatus::InProgress,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ReadinessStatus::Failed,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReadinessStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let verdict = ReadinessVerdict::in_progress("deploy in progress");
        assert_eq!(
            serde_json::to_string(&verdict).unwrap(),
            r#"{"status":"inprogress","message":"deploy in progress"}"#
        );
        assert_eq!(ReadinessStatus::InProgress.to_string(), "inprogress");
    }
}
