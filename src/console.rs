//! Terminal rendering of batch events.

use af_batch::BatchResult;
use af_core::events::{Event, EventPayload};
use af_core::JobStatus;
use tokio::sync::broadcast;

/// One terminal line for `payload`, or `None` if it is not shown.
pub fn render_event(payload: &EventPayload) -> Option<String> {
    match payload {
        EventPayload::JobStatusChanged {
            input,
            status,
            error,
            ..
        } => Some(match (status, error) {
            (JobStatus::Processing, _) => format!("  → {input}"),
            (JobStatus::Completed, _) => format!("  ✓ {input}"),
            (JobStatus::Failed, Some(err)) => format!("  ✗ {input}: {}", err.user_message()),
            (JobStatus::Failed, None) => format!("  ✗ {input}"),
            (JobStatus::Pending, _) => return None,
        }),
        EventPayload::BatchProgress { progress, message } => {
            Some(format!("[{:>3.0}%] {message}", progress * 100.0))
        }
        EventPayload::JobProgress { .. } | EventPayload::BatchFinished { .. } => None,
    }
}

/// Print events from `rx` until the batch finishes.
pub async fn print_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = render_event(&event.payload) {
                    println!("{line}");
                }
                if matches!(event.payload, EventPayload::BatchFinished { .. }) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Console fell behind by {n} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Final tally plus one line per failure.
pub fn render_summary(result: &BatchResult) -> String {
    let mut out = format!(
        "\n{} ({:.1}s)",
        result.summary(),
        result.elapsed().num_milliseconds() as f64 / 1000.0
    );
    for failure in result.failures() {
        let reason = failure
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        out.push_str(&format!("\n  {}: {reason}", failure.input.display()));
    }
    out
}
