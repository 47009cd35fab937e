//! The workflow orchestrator as seen by the repair job.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("orchestrator throttled: {0}")]
    Throttled(String),

    #[error("execution '{0}' cannot be stopped: not running")]
    NotRunning(String),

    #[error("orchestrator error: {0}")]
    Backend(String),
}

impl OrchestratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::Throttled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    NotFound,
}

/// What the orchestrator knows about one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDescription {
    pub arn: String,
    pub status: ExecutionStatus,
    /// The workflow message the execution was started with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// The workflow message the execution finished with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,
}

impl ExecutionDescription {
    pub fn not_found(arn: impl Into<String>) -> Self {
        ExecutionDescription {
            arn: arn.into(),
            status: ExecutionStatus::NotFound,
            input: None,
            output: None,
            error: None,
            cause: None,
            start_date: None,
        }
    }
}

#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    /// Describe an execution. An unknown ARN is `ExecutionStatus::NotFound`,
    /// not an error.
    async fn describe_execution(&self, arn: &str)
        -> Result<ExecutionDescription, OrchestratorError>;

    async fn stop_execution(
        &self,
        arn: &str,
        cause: &str,
        error: &str,
    ) -> Result<(), OrchestratorError>;
}

#[derive(Default)]
struct Inner {
    executions: BTreeMap<String, ExecutionDescription>,
    throttle_remaining: usize,
    stopped: Vec<String>,
}

/// An in-process orchestrator holding execution descriptions by ARN.
#[derive(Default)]
pub struct MemoryOrchestrator {
    inner: Mutex<Inner>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptions(descriptions: impl IntoIterator<Item = ExecutionDescription>) -> Self {
        let orchestrator = Self::new();
        for description in descriptions {
            orchestrator.insert(description);
        }
        orchestrator
    }

    pub fn insert(&self, description: ExecutionDescription) {
        self.lock()
            .executions
            .insert(description.arn.clone(), description);
    }

    pub fn descriptions(&self) -> Vec<ExecutionDescription> {
        self.lock().executions.values().cloned().collect()
    }

    /// ARNs stopped so far, in call order.
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    /// Fail the next `calls` calls with `Throttled`.
    pub fn throttle_next(&self, calls: usize) {
        self.lock().throttle_remaining = calls;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_throttle(inner: &mut Inner) -> Result<(), OrchestratorError> {
        if inner.throttle_remaining > 0 {
            inner.throttle_remaining -= 1;
            return Err(OrchestratorError::Throttled("rate exceeded".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for MemoryOrchestrator {
    async fn describe_execution(
        &self,
        arn: &str,
    ) -> Result<ExecutionDescription, OrchestratorError> {
        let mut inner = self.lock();
        Self::check_throttle(&mut inner)?;
        Ok(inner
            .executions
            .get(arn)
            .cloned()
            .unwrap_or_else(|| ExecutionDescription::not_found(arn)))
    }

    async fn stop_execution(
        &self,
        arn: &str,
        cause: &str,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        Self::check_throttle(&mut inner)?;
        let Some(execution) = inner.executions.get_mut(arn) else {
            return Err(OrchestratorError::Backend(format!(
                "execution '{}' does not exist",
                arn
            )));
        };
        if execution.status != ExecutionStatus::Running {
            return Err(OrchestratorError::NotRunning(arn.to_string()));
        }
        execution.status = ExecutionStatus::Failed;
        execution.error = Some(error.to_string());
        execution.cause = Some(cause.to_string());
        inner.stopped.push(arn.to_string());
        Ok(())
    }
}
