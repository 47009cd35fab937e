//! cirrus-ops: the operational jobs that keep the two stores converged.
//!
//! - [`index_from_database`] rebuilds index documents from the primary store.
//! - [`Reconciler`] reports where the two stores disagree.
//! - [`StaleExecutionSweep`] drives executions stuck in `running` to a
//!   terminal state by asking the orchestrator what happened.

pub mod reconcile;
pub mod reindex;
pub mod repair;

pub use reconcile::{Conflict, ReconcileError, ReconcileRequest, ReconciliationReport, Reconciler};
pub use reindex::{index_from_database, ReindexRequest, ReindexSummary, TypeCounts};
pub use repair::{
    ExecutionDescription, ExecutionStatus, MemoryOrchestrator, Orchestrator, OrchestratorError,
    RepairError, RepairSettings, StaleExecutionSweep, SweepSummary,
};
