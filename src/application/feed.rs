//! Trigger feed.
//!
//! Reads newline-delimited triggers (`hook` or `hook:id`) and dispatches each
//! one through the hook registry. Blank lines and `#` comments are skipped.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::cache::{HookRegistry, Trigger, TriggerOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub dispatched: usize,
    /// Parsed but not subscribed.
    pub ignored: usize,
    pub rejected: usize,
}

/// Dispatch every trigger read from `reader` until end of input.
pub async fn dispatch_lines<R>(reader: R, hooks: &HookRegistry) -> io::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let trigger = match line.parse::<Trigger>() {
            Ok(trigger) => trigger,
            Err(err) => {
                warn!(target = "purgeline::feed", line, error = %err, "Trigger rejected");
                summary.rejected += 1;
                continue;
            }
        };

        match hooks.dispatch(trigger).await {
            Some(outcome) => {
                log_outcome(trigger, &outcome);
                summary.dispatched += 1;
            }
            None => summary.ignored += 1,
        }
    }

    Ok(summary)
}

fn log_outcome(trigger: Trigger, outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Purged(status) | TriggerOutcome::PurgedAndFlushed(status) => info!(
            target = "purgeline::feed",
            hook = trigger.hook(),
            status = %status,
            "Trigger handled"
        ),
        TriggerOutcome::Swept(report) => info!(
            target = "purgeline::feed",
            hook = trigger.hook(),
            files_removed = report.files_removed,
            "Trigger handled"
        ),
    }
}
