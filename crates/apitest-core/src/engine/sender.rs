use std::time::Instant;

use crate::http::request::RequestTask;
use crate::http::transport::Transport;
use crate::results::Outcome;

/// Send one request over `transport` and time it.
///
/// Never fails: transport problems come back inside the outcome with no
/// status, so the caller can count them like any other result.
pub async fn send_request(transport: &dyn Transport, task: &RequestTask) -> Outcome {
    let start = Instant::now();
    let delivery = transport.send(task).await;
    let elapsed = start.elapsed();

    if let Some(err) = &delivery.error {
        tracing::debug!(url = %task.url(), status = ?delivery.status, "request failed: {err}");
    } else {
        tracing::trace!(
            url = %task.url(),
            status = ?delivery.status,
            bytes = delivery.bytes,
            elapsed_us = elapsed.as_micros() as u64,
            "request completed"
        );
    }

    Outcome {
        elapsed,
        status: delivery.status,
        bytes: delivery.bytes,
        error: delivery.error,
    }
}
