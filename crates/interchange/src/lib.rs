//! cirrus-interchange: workflow message types and the event normalizer.
//!
//! Workflow completion notifications reach the ingest core wrapped in a
//! transport envelope (a pub/sub notification, a queue record, or nothing at
//! all for direct invocations). [`normalize`] peels the envelope and produces
//! a single [`CanonicalMessage`], which is the only shape the record builder
//! ever sees.
//!
//! The crate also owns the small vocabulary shared by every other crate in
//! the workspace: [`Status`], [`ErrorInfo`] and the identifier helpers in
//! [`ids`].

pub mod ids;
pub mod normalize;
pub mod types;

pub use ids::{
    collection_id, execution_arn, execution_name_from_arn, split_collection_id,
    state_machine_arn,
};
pub use normalize::{from_workflow_message, normalize, split_batch, unwrap_envelope, InterchangeError};
pub use types::*;
