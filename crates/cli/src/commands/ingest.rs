use std::path::Path;

use serde_json::Value;

use crate::Context;

pub(crate) async fn run(ctx: &Context, event_path: &Path) -> Result<(), String> {
    let raw = std::fs::read_to_string(event_path)
        .map_err(|e| format!("error reading file '{}': {}", event_path.display(), e))?;
    let event: Value = serde_json::from_str(&raw)
        .map_err(|e| format!("error parsing JSON in '{}': {}", event_path.display(), e))?;
    let pipeline = ctx.pipeline()?;

    if event.get("Records").is_some() {
        let summary = pipeline.handle_batch(&event).await;
        ctx.emit(&summary, || {
            let mut text = format!(
                "processed {} message(s): {} succeeded, {} failed",
                summary.messages,
                summary.succeeded,
                summary.failures.len()
            );
            for failure in &summary.failures {
                text.push_str(&format!("\n  - message {}: {}", failure.position, failure.error));
            }
            text
        });
        if !summary.failures.is_empty() {
            return Err(format!("{} message(s) failed", summary.failures.len()));
        }
        return Ok(());
    }

    let result = pipeline
        .handle_payload(&event)
        .await
        .map_err(|e| e.to_string())?;
    ctx.emit(&result, || {
        let mut text = format!(
            "execution {} {}: {} granule(s), pdr {}",
            result.execution.arn,
            result.execution.status,
            result.granules.len(),
            result.pdr.as_ref().map_or("none", |p| p.pdr_name.as_str())
        );
        if let Some(e) = &result.granule_error {
            text.push_str(&format!("\n  granules skipped: {}", e));
        }
        if let Some(e) = &result.pdr_error {
            text.push_str(&format!("\n  pdr skipped: {}", e));
        }
        text
    });
    Ok(())
}
