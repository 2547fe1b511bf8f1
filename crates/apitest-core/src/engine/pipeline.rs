use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::aggregator::Aggregator;
use crate::engine::sender::send_request;
use crate::error::ApitestError;
use crate::http::client::HttpClient;
use crate::http::request::RequestTask;
use crate::http::transport::Transport;
use crate::results::{Outcome, RunResult};

/// Queued tasks per worker before the producer waits.
const TASK_QUEUE_DEPTH: usize = 2;

/// Outcomes buffered between the workers and the aggregation loop.
const OUTCOME_BUFFER: usize = 4096;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Producer → worker pool → aggregator over one shared transport.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Pipeline over a reqwest client whose idle pool holds one connection per
    /// worker.
    pub fn http(concurrency: usize, timeout: Duration) -> Result<Self, ApitestError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(concurrency.max(1))
            .build()?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Stop feeding new tasks once `cancel` fires. In-flight sends finish and
    /// are still counted.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send `count` clones of `template` using `concurrency` workers and return
    /// the finalized summary.
    ///
    /// Only degenerate input fails the run; per-request failures are counted in
    /// the result.
    pub async fn run(
        &self,
        template: &RequestTask,
        count: usize,
        concurrency: usize,
    ) -> Result<RunResult, ApitestError> {
        if count == 0 {
            return Err(ApitestError::Validation(
                "request count must be at least 1".to_string(),
            ));
        }
        if concurrency == 0 {
            return Err(ApitestError::Validation(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let workers = concurrency.min(count);
        tracing::info!(
            url = %template.url(),
            method = %template.method(),
            count,
            workers,
            "starting run"
        );

        let (task_tx, task_rx) = mpsc::channel::<RequestTask>(workers * TASK_QUEUE_DEPTH);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(OUTCOME_BUFFER);

        let mut aggregator = Aggregator::new(template);
        let start = Instant::now();

        let producer = tokio::spawn(produce(
            template.clone(),
            count,
            task_tx,
            self.cancel.clone(),
        ));

        let mut pool: JoinSet<()> = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(run_worker(
                worker_id,
                Arc::clone(&self.transport),
                Arc::clone(&task_rx),
                outcome_tx.clone(),
                self.cancel.clone(),
            ));
        }

        // The outcome channel closes once every worker has dropped its clone.
        drop(outcome_tx);

        while let Some(outcome) = outcome_rx.recv().await {
            aggregator.merge(&outcome);
        }
        let total = start.elapsed();

        producer
            .await
            .map_err(|e| ApitestError::Internal(format!("producer task failed: {e}")))?;
        while let Some(joined) = pool.join_next().await {
            joined.map_err(|e| ApitestError::Internal(format!("worker task failed: {e}")))?;
        }

        let cancelled = aggregator.requests() < count as u64;
        if cancelled {
            tracing::warn!(
                sent = aggregator.requests(),
                count,
                "run cancelled before all requests were sent"
            );
        }

        let result = aggregator.finish(total, cancelled);
        tracing::info!(
            requests = result.requests,
            errors = result.errors,
            rps = result.requests_per_second,
            duration_ms = total.as_millis() as u64,
            "run finished"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Emit `count` independent clones of `template`, then close the queue.
async fn produce(
    template: RequestTask,
    count: usize,
    tasks: mpsc::Sender<RequestTask>,
    cancel: CancellationToken,
) {
    for _ in 0..count {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tasks.send(template.clone()) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

/// Pull tasks until the queue is exhausted or the run is cancelled. Checked
/// between requests, never mid-request.
async fn run_worker(
    worker_id: usize,
    transport: Arc<dyn Transport>,
    tasks: Arc<Mutex<mpsc::Receiver<RequestTask>>>,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) {
    let mut sent = 0usize;
    loop {
        let next = {
            let mut rx = tasks.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = next else { break };

        let outcome = send_request(transport.as_ref(), &task).await;
        sent += 1;
        if outcomes.send(outcome).await.is_err() {
            break;
        }
    }
    tracing::trace!(worker_id, sent, "worker finished");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::request::HttpMethod;
    use crate::http::transport::Delivery;
    use crate::test_support::ScriptedTransport;

    fn template() -> RequestTask {
        RequestTask::get("https://example.test/ok").unwrap()
    }

    #[tokio::test]
    async fn always_ok_scenario() {
        let transport = Arc::new(ScriptedTransport::status(|_| 200));
        let pipeline = Pipeline::new(transport.clone());

        let result = pipeline.run(&template(), 10, 3).await.unwrap();

        assert_eq!(result.requests, 10);
        assert_eq!(result.errors, 0);
        assert_eq!(transport.calls(), 10);
        let expected_rps = 10.0 / result.duration.as_secs_f64();
        assert!((result.requests_per_second - expected_rps).abs() < 1e-6);
        assert_eq!(result.success_rate(), 100.0);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn always_500_scenario() {
        let pipeline = Pipeline::new(Arc::new(ScriptedTransport::status(|_| 500)));

        let result = pipeline.run(&template(), 5, 1).await.unwrap();

        assert_eq!(result.requests, 5);
        assert_eq!(result.errors, 5);
        assert_eq!(result.success_rate(), 0.0);
        assert_eq!(result.status_code(), Some(500));
    }

    #[tokio::test]
    async fn request_count_matches_for_any_count() {
        for count in [1usize, 2, 7, 25, 64] {
            let transport = Arc::new(ScriptedTransport::status(|_| 200));
            let pipeline = Pipeline::new(transport.clone());

            let result = pipeline.run(&template(), count, 4).await.unwrap();

            assert_eq!(result.requests, count as u64);
            assert_eq!(result.errors, 0);
            assert_eq!(transport.calls(), count);
        }
    }

    #[tokio::test]
    async fn statistics_do_not_depend_on_worker_count() {
        let script = |n: usize| match n % 4 {
            0 => Delivery::response(200, n as u64),
            1 => Delivery::response(404, 3),
            2 => Delivery::failed(TransportError::Timeout),
            _ => Delivery::response(201, 7),
        };

        let mut seen = Vec::new();
        for concurrency in [1usize, 4, 16] {
            let pipeline = Pipeline::new(Arc::new(ScriptedTransport::new(script)));
            let result = pipeline.run(&template(), 40, concurrency).await.unwrap();
            seen.push((result.requests, result.errors, result.bytes));
        }

        assert_eq!(seen[0], (40, 20, seen[0].2));
        assert!(seen.iter().all(|s| *s == seen[0]));
    }

    #[tokio::test]
    async fn transport_failures_never_abort_the_run() {
        let transport = Arc::new(ScriptedTransport::new(|n| {
            if n % 2 == 0 {
                Delivery::failed(TransportError::Connect("refused".into()))
            } else {
                Delivery::response(200, 1)
            }
        }));
        let pipeline = Pipeline::new(transport);

        let result = pipeline.run(&template(), 10, 3).await.unwrap();

        assert_eq!(result.requests, 10);
        assert_eq!(result.errors, 5);
        assert_eq!(result.error_messages.get("connection failed: refused"), Some(&5));
    }

    #[tokio::test]
    async fn zero_count_is_rejected_before_dispatch() {
        let transport = Arc::new(ScriptedTransport::status(|_| 200));
        let pipeline = Pipeline::new(transport.clone());

        let err = pipeline.run(&template(), 0, 4).await.unwrap_err();

        assert!(matches!(err, ApitestError::Validation(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected_before_dispatch() {
        let transport = Arc::new(ScriptedTransport::status(|_| 200));
        let pipeline = Pipeline::new(transport.clone());

        let err = pipeline.run(&template(), 5, 0).await.unwrap_err();

        assert!(matches!(err, ApitestError::Validation(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn workers_are_clamped_to_count() {
        let transport = Arc::new(
            ScriptedTransport::status(|_| 200).with_delay(Duration::from_millis(20)),
        );
        let pipeline = Pipeline::new(transport.clone());

        let result = pipeline.run(&template(), 3, 16).await.unwrap();

        assert_eq!(result.requests, 3);
        assert!(transport.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_concurrency() {
        let transport = Arc::new(
            ScriptedTransport::status(|_| 200).with_delay(Duration::from_millis(10)),
        );
        let pipeline = Pipeline::new(transport.clone());

        let result = pipeline.run(&template(), 24, 4).await.unwrap();

        assert_eq!(result.requests, 24);
        assert!(transport.max_in_flight() >= 1);
        assert!(transport.max_in_flight() <= 4);
    }

    #[tokio::test]
    async fn bodies_are_sent_by_every_clone() {
        let template = RequestTask::new(HttpMethod::Post, "https://example.test/items")
            .unwrap()
            .with_body("payload");
        let pipeline = Pipeline::new(Arc::new(ScriptedTransport::status(|_| 201)));

        let result = pipeline.run(&template, 6, 3).await.unwrap();

        assert_eq!(result.requests, 6);
        assert_eq!(result.method, HttpMethod::Post);
        assert_eq!(result.status_code(), Some(201));
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch_and_keeps_in_flight_outcomes() {
        let transport = Arc::new(
            ScriptedTransport::status(|_| 200).with_delay(Duration::from_millis(10)),
        );
        let cancel = CancellationToken::new();
        let pipeline = Pipeline::new(transport.clone()).with_cancellation(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let result = pipeline.run(&template(), 10_000, 2).await.unwrap();
        trigger.await.unwrap();

        assert!(result.cancelled);
        assert!(result.requests < 10_000);
        assert_eq!(result.requests as usize, transport.calls());
    }

    #[tokio::test]
    async fn already_cancelled_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::status(|_| 200));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = Pipeline::new(transport.clone()).with_cancellation(cancel);

        let result = pipeline.run(&template(), 5, 2).await.unwrap();

        assert_eq!(result.requests, 0);
        assert_eq!(result.requests_per_second, 0.0);
        assert!(result.cancelled);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn http_pipeline_builds() {
        let pipeline = Pipeline::http(8, Duration::from_secs(5));
        assert!(pipeline.is_ok());
    }
}
