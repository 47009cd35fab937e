//! cirrus-core: from workflow event to records in both stores.
//!
//! The flow is `normalize → RecordBuilder → DualWriteCoordinator →
//! {PrimaryStore, IndexReplicator}`. [`Pipeline`] wires the pieces together
//! and is the entry point for ingest; the coordinator's `mark_failed` is the
//! write path for repair propagation.
//!
//! Configuration ([`CirrusConfig`]) and the retry policy shared by the
//! operational jobs also live here.

pub mod builder;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod schema;
pub mod writer;

pub use builder::RecordBuilder;
pub use config::{CirrusConfig, ConfigError};
pub use error::PipelineError;
pub use pipeline::{BatchFailure, BatchSummary, PayloadResult, Pipeline};
pub use retry::RetryPolicy;
pub use schema::RecordSchemas;
pub use writer::{DualWriteCoordinator, WritePolicy, WriteSummary};
