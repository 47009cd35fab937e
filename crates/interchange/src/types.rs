//! Typed structs for normalized workflow messages.
//!
//! Granule entries are kept as raw `serde_json::Value` objects: they are
//! validated (and rejected as a batch) by the record builder, not here, so a
//! malformed granule never turns the whole message into a `MalformedMessage`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status shared by executions, granules and PDRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Completed,
    Failed,
}

impl Status {
    /// Parse a status reported by the orchestrator or carried in a message.
    ///
    /// Matching is case-insensitive. `succeeded` normalizes to `completed`;
    /// `aborted` and `timed_out` normalize to `failed`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Status::Running),
            "completed" | "succeeded" => Some(Status::Completed),
            "failed" | "aborted" | "timed_out" => Some(Status::Failed),
            _ => None,
        }
    }

    /// `completed` and `failed` are terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details attached to a failed execution, granule or PDR.
///
/// Serialized with the orchestrator's capitalized `Error`/`Cause` keys so the
/// same object can be copied verbatim between records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause")]
    pub cause: String,
}

impl ErrorInfo {
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        ErrorInfo {
            error: error.into(),
            cause: cause.into(),
        }
    }

    /// Interpret a message's `exception` field.
    ///
    /// `null`, a missing field and the literal string `"None"` mean no error.
    /// Objects with `Error`/`Cause` are taken as-is (a non-string `Cause` is
    /// rendered as JSON). Anything else is wrapped as an `Unknown Error`.
    pub fn from_exception(exception: &Value) -> Option<Self> {
        match exception {
            Value::Null => None,
            Value::String(s) if s == "None" || s.is_empty() => None,
            Value::Object(obj) if obj.is_empty() => None,
            Value::Object(obj) => {
                let error = obj
                    .get("Error")
                    .or_else(|| obj.get("error"))
                    .map(value_to_text)
                    .unwrap_or_else(|| "Unknown Error".to_string());
                let cause = obj
                    .get("Cause")
                    .or_else(|| obj.get("cause"))
                    .map(value_to_text)
                    .unwrap_or_default();
                Some(ErrorInfo { error, cause })
            }
            other => Some(ErrorInfo {
                error: "Unknown Error".to_string(),
                cause: other.to_string(),
            }),
        }
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// PDR section of a workflow message, with the execution counters that the
/// PDR parse workflow accumulates in its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdrSection {
    /// PDR name. `None` means the section exists but is unusable.
    pub name: Option<String>,
    pub pan_sent: bool,
    pub pan_message: Option<String>,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

/// The unwrapped, normalized form of a workflow-completion notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMessage {
    pub execution_arn: String,
    pub state_machine_arn: Option<String>,
    pub execution_name: String,
    /// Always lower-cased, `succeeded` already mapped to `completed`.
    pub status: Status,
    pub workflow_name: Option<String>,
    /// The full workflow message as received, after envelope unwrapping.
    pub input: Value,
    /// The workflow payload (`payload` field), `Null` when absent.
    pub output: Value,
    pub error: Option<ErrorInfo>,
    /// `name___version` of the collection the run belongs to.
    pub collection_id: Option<String>,
    pub provider: Option<String>,
    pub parent_execution_arn: Option<String>,
    pub pdr: Option<PdrSection>,
    /// Raw granule objects from `payload.granules`.
    pub granules: Vec<Value>,
    /// Workflow start time, epoch milliseconds.
    pub created_at: Option<i64>,
    /// Workflow stop time, epoch milliseconds.
    pub stopped_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parse_normalizes_case_and_aliases() {
        assert_eq!(Status::parse("SUCCEEDED"), Some(Status::Completed));
        assert_eq!(Status::parse("Completed"), Some(Status::Completed));
        assert_eq!(Status::parse("RUNNING"), Some(Status::Running));
        assert_eq!(Status::parse("TIMED_OUT"), Some(Status::Failed));
        assert_eq!(Status::parse("aborted"), Some(Status::Failed));
        assert_eq!(Status::parse("queued"), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Status::Failed).unwrap(), json!("failed"));
        assert!(Status::Failed.is_terminal());
        assert!(!Status::Running.is_terminal());
    }

    #[test]
    fn exception_none_variants() {
        assert_eq!(ErrorInfo::from_exception(&Value::Null), None);
        assert_eq!(ErrorInfo::from_exception(&json!("None")), None);
        assert_eq!(ErrorInfo::from_exception(&json!({})), None);
    }

    #[test]
    fn exception_object_and_scalar() {
        let e = ErrorInfo::from_exception(&json!({"Error": "Boom", "Cause": {"x": 1}})).unwrap();
        assert_eq!(e.error, "Boom");
        assert_eq!(e.cause, r#"{"x":1}"#);

        let e = ErrorInfo::from_exception(&json!(42)).unwrap();
        assert_eq!(e.error, "Unknown Error");
        assert_eq!(e.cause, "42");
    }

    #[test]
    fn error_info_uses_capitalized_keys() {
        let v = serde_json::to_value(ErrorInfo::new("Not Found", "gone")).unwrap();
        assert_eq!(v, json!({"Error": "Not Found", "Cause": "gone"}));
    }
}
