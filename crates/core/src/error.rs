use cirrus_index::IndexError;
use cirrus_interchange::InterchangeError;
use cirrus_storage::{RecordKey, RecordType, StorageError};

/// Failure taxonomy of the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The event could not be unwrapped or lacks execution identity.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A record failed schema or construction checks.
    #[error("invalid {record_type}: {message}")]
    Validation {
        record_type: RecordType,
        message: String,
    },

    /// A targeted update found no primary row.
    #[error("{key} does not exist")]
    RecordDoesNotExist { key: RecordKey },

    /// A backend call was still failing transiently when its retry budget
    /// ran out.
    #[error("transient backend failure after retries: {0}")]
    TransientBackend(String),

    /// The workflow orchestrator has no record of an execution.
    #[error("Execution {arn} does not exist in the orchestrator")]
    NotFoundUpstream { arn: String },

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    Index(IndexError),
}

// Backend calls go through `RetryPolicy::run` before their errors are
// converted, so a transient error arriving here has exhausted its retries.
impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            PipelineError::TransientBackend(e.to_string())
        } else {
            PipelineError::Storage(e)
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(e: IndexError) -> Self {
        if e.is_transient() {
            PipelineError::TransientBackend(e.to_string())
        } else {
            PipelineError::Index(e)
        }
    }
}

impl PipelineError {
    pub fn validation(record_type: RecordType, message: impl Into<String>) -> Self {
        PipelineError::Validation {
            record_type,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::TransientBackend(_) => true,
            PipelineError::Storage(e) => e.is_transient(),
            PipelineError::Index(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<InterchangeError> for PipelineError {
    fn from(e: InterchangeError) -> Self {
        match e {
            InterchangeError::MalformedMessage { message } => {
                PipelineError::MalformedMessage(message)
            }
            missing @ InterchangeError::MissingField { .. } => {
                PipelineError::MalformedMessage(missing.to_string())
            }
        }
    }
}
