use cirrus_core::RetryPolicy;
use cirrus_ops::{index_from_database, ReindexRequest};
use cirrus_storage::RecordType;

use crate::Context;

pub(crate) async fn run(
    ctx: &Context,
    record_types: Vec<RecordType>,
    index: Option<String>,
    concurrency: Option<usize>,
) -> Result<(), String> {
    let mut request = ReindexRequest::from(&ctx.config.reindex);
    if !record_types.is_empty() {
        request.record_types = record_types;
    }
    request.index_name = index;
    request.retry = RetryPolicy::from(&ctx.config.retry);
    if let Some(concurrency) = concurrency {
        if concurrency == 0 {
            return Err("--concurrency must be at least 1".to_string());
        }
        request.concurrency = concurrency;
    }

    let summary = index_from_database(ctx.state.store.as_ref(), &ctx.replicator(), &request)
        .await
        .map_err(|e| e.to_string())?;
    ctx.emit(&summary, || {
        let mut text = format!("reindexed into {}", summary.index);
        for (record_type, counts) in &summary.counts {
            text.push_str(&format!(
                "\n  {}: {} indexed, {} failed",
                record_type, counts.indexed, counts.failed
            ));
        }
        text
    });
    Ok(())
}
