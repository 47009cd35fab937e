use cirrus_core::RetryPolicy;
use cirrus_ops::{ReconcileRequest, Reconciler};

use crate::Context;

pub(crate) async fn run(ctx: &Context, request: ReconcileRequest) -> Result<(), String> {
    let reconciler = Reconciler::new(
        ctx.state.store.clone(),
        ctx.state.index.clone(),
        ctx.config.index.name.clone(),
        &ctx.config.reconcile,
    )
    .with_retry(RetryPolicy::from(&ctx.config.retry));
    let report = reconciler
        .reconcile(&request)
        .await
        .map_err(|e| e.to_string())?;
    ctx.emit(&report, || {
        format!(
            "{}: {} ok, {} only in primary, {} only in index, {} conflicting",
            report.record_type,
            report.ok_count,
            report.only_in_primary.len(),
            report.only_in_index.len(),
            report.with_conflicts.len()
        )
    });
    Ok(())
}
