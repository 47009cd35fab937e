//! Event normalization: transport envelope in, [`CanonicalMessage`] out.
//!
//! The main entry point is [`normalize`]. Batched deliveries are split with
//! [`split_batch`] first so each record is normalized (and can fail)
//! independently.

use crate::ids;
use crate::types::*;
use serde_json::{json, Value};
use std::fmt;

/// Errors while unwrapping or interpreting a workflow message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// The payload (or an envelope's inner payload) is not valid JSON, or is
    /// not shaped like a workflow message at all.
    MalformedMessage { message: String },
    /// The workflow message lacks a field the core cannot do without.
    MissingField { field: String },
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MalformedMessage { message } => {
                write!(f, "malformed message: {}", message)
            }
            InterchangeError::MissingField { field } => {
                write!(f, "workflow message missing required field: '{}'", field)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Unwrap `event` and normalize the workflow message inside it.
pub fn normalize(event: &Value) -> Result<CanonicalMessage, InterchangeError> {
    let message = unwrap_envelope(event)?;
    from_workflow_message(&message)
}

/// Split a transport batch (`{"Records": [...]}`) into its records. Any other
/// event is a single direct invocation payload.
pub fn split_batch(event: &Value) -> Vec<Value> {
    match event.get("Records").and_then(Value::as_array) {
        Some(records) => records.clone(),
        None => vec![event.clone()],
    }
}

/// Strip the transport envelope from `event`, returning the workflow message.
///
/// Recognized envelopes:
/// - pub/sub notification: `EventSource == "aws:sns"`, message in `Sns.Message`
/// - queue record: `eventSource == "aws:sqs"`, message in `body`; the body may
///   itself be a pub/sub notification or an execution status-change event
///
/// Anything else is returned unchanged.
pub fn unwrap_envelope(event: &Value) -> Result<Value, InterchangeError> {
    if str_field(event, "EventSource") == Some("aws:sns") {
        let raw = event
            .pointer("/Sns/Message")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("Sns.Message"))?;
        return parse_json(raw, "Sns.Message");
    }

    if str_field(event, "eventSource") == Some("aws:sqs") {
        let raw = event
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("body"))?;
        let body = parse_json(raw, "body")?;
        return unwrap_queue_body(body);
    }

    Ok(event.clone())
}

fn unwrap_queue_body(body: Value) -> Result<Value, InterchangeError> {
    if str_field(&body, "Type") == Some("Notification") {
        let raw = body
            .get("Message")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("Message"))?;
        return parse_json(raw, "Message");
    }
    match body.get("detail") {
        Some(detail) if detail.is_object() => from_status_change_event(detail),
        _ => Ok(body),
    }
}

/// Execution status-change events carry the workflow message as a JSON string
/// in `output` (terminal runs) or `input`, and the authoritative status next
/// to it.
fn from_status_change_event(detail: &Value) -> Result<Value, InterchangeError> {
    let raw = ["output", "input"]
        .iter()
        .find_map(|field| detail.get(*field).and_then(Value::as_str))
        .ok_or_else(|| missing("detail.input"))?;
    let mut message = parse_json(raw, "detail")?;

    let status = detail
        .get("status")
        .and_then(Value::as_str)
        .and_then(Status::parse);

    if let Some(obj) = message.as_object_mut() {
        if let Some(status) = status {
            let meta = obj.entry("meta").or_insert_with(|| json!({}));
            if let Some(meta) = meta.as_object_mut() {
                meta.insert("status".to_string(), json!(status.as_str()));
            }
            let has_exception = obj
                .get("exception")
                .and_then(ErrorInfo::from_exception)
                .is_some();
            if status == Status::Failed && !has_exception {
                if let Some(error) = detail.get("error").and_then(Value::as_str) {
                    let cause = detail.get("cause").and_then(Value::as_str).unwrap_or("");
                    obj.insert(
                        "exception".to_string(),
                        json!({ "Error": error, "Cause": cause }),
                    );
                }
            }
        }
    }
    Ok(message)
}

/// Interpret an already-unwrapped workflow message.
pub fn from_workflow_message(message: &Value) -> Result<CanonicalMessage, InterchangeError> {
    if !message.is_object() {
        return Err(InterchangeError::MalformedMessage {
            message: "workflow message must be a JSON object".to_string(),
        });
    }

    let state_machine = str_at(message, "/cumulus_meta/state_machine");
    let execution_name = str_at(message, "/cumulus_meta/execution_name");

    let execution_arn = match str_at(message, "/cumulus_meta/execution_arn") {
        Some(arn) => arn.to_string(),
        None => state_machine
            .zip(execution_name)
            .and_then(|(sm, name)| ids::execution_arn(sm, name))
            .ok_or_else(|| missing("cumulus_meta.state_machine/execution_name"))?,
    };

    let execution_name = execution_name
        .or_else(|| ids::execution_name_from_arn(&execution_arn))
        .ok_or_else(|| missing("cumulus_meta.execution_name"))?
        .to_string();

    let state_machine_arn = state_machine
        .map(str::to_string)
        .or_else(|| ids::state_machine_arn(&execution_arn));

    let raw_status = str_at(message, "/meta/status").ok_or_else(|| missing("meta.status"))?;
    let status = Status::parse(raw_status).ok_or_else(|| InterchangeError::MalformedMessage {
        message: format!("unrecognized status '{}'", raw_status),
    })?;

    let collection_id = match (
        str_at(message, "/meta/collection/name"),
        str_at(message, "/meta/collection/version"),
    ) {
        (Some(name), Some(version)) => Some(ids::collection_id(name, version)),
        _ => None,
    };

    let output = message.get("payload").cloned().unwrap_or(Value::Null);
    let granules = output
        .get("granules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(CanonicalMessage {
        execution_arn,
        state_machine_arn,
        execution_name,
        status,
        workflow_name: str_at(message, "/meta/workflow_name").map(str::to_string),
        input: message.clone(),
        error: message.get("exception").and_then(ErrorInfo::from_exception),
        collection_id,
        provider: str_at(message, "/meta/provider/id").map(str::to_string),
        parent_execution_arn: str_at(message, "/cumulus_meta/parentExecutionArn")
            .map(str::to_string),
        pdr: parse_pdr(message),
        granules,
        created_at: millis_at(message, "/cumulus_meta/workflow_start_time"),
        stopped_at: millis_at(message, "/cumulus_meta/workflow_stop_time"),
        output,
    })
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn parse_pdr(message: &Value) -> Option<PdrSection> {
    let section = message
        .pointer("/payload/pdr")
        .filter(|v| v.is_object())
        .or_else(|| message.pointer("/meta/pdr").filter(|v| v.is_object()))?;

    let count = |field: &str| -> u64 {
        message
            .pointer(&format!("/payload/{}", field))
            .and_then(Value::as_array)
            .map_or(0, |arr| arr.len() as u64)
    };

    Some(PdrSection {
        name: section.get("name").and_then(Value::as_str).map(str::to_string),
        pan_sent: section.get("PANSent").and_then(Value::as_bool).unwrap_or(false),
        pan_message: section
            .get("PANmessage")
            .and_then(Value::as_str)
            .map(str::to_string),
        running: count("running"),
        completed: count("completed"),
        failed: count("failed"),
    })
}

fn parse_json(raw: &str, field: &str) -> Result<Value, InterchangeError> {
    serde_json::from_str(raw).map_err(|e| InterchangeError::MalformedMessage {
        message: format!("'{}' is not valid JSON: {}", field, e),
    })
}

fn missing(field: &str) -> InterchangeError {
    InterchangeError::MissingField {
        field: field.to_string(),
    }
}

fn str_field<'a>(obj: &'a Value, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

fn str_at<'a>(obj: &'a Value, pointer: &str) -> Option<&'a str> {
    obj.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn millis_at(obj: &Value, pointer: &str) -> Option<i64> {
    let v = obj.pointer(pointer)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}
