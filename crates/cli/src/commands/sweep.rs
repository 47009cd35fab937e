use std::sync::Arc;

use cirrus_core::RetryPolicy;
use cirrus_ops::{RepairSettings, StaleExecutionSweep};

use crate::Context;

pub(crate) async fn run(ctx: &Context) -> Result<(), String> {
    let sweep = StaleExecutionSweep::new(
        Arc::new(ctx.pipeline()?),
        ctx.state.orchestrator.clone(),
        RepairSettings::from(&ctx.config.repair),
        RetryPolicy::from(&ctx.config.retry),
    );
    let summary = sweep.run().await.map_err(|e| e.to_string())?;
    ctx.emit(&summary, || {
        format!(
            "examined {}: {} skipped, {} redriven, {} not found, {} stopped, {} propagated, {} errors",
            summary.examined,
            summary.skipped,
            summary.redriven,
            summary.not_found,
            summary.stopped,
            summary.propagated,
            summary.errors
        )
    });
    Ok(())
}
