use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::http::request::RequestTask;
use crate::http::transport::{Delivery, Transport};

type Script = dyn Fn(usize) -> Delivery + Send + Sync;

/// In-process transport whose deliveries come from a script indexed by call
/// number (0-based, in dispatch order).
pub(crate) struct ScriptedTransport {
    script: Arc<Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl Fn(usize) -> Delivery + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn always(delivery: Delivery) -> Self {
        Self::new(move |_| delivery.clone())
    }

    /// Status per call from a url-independent rule.
    pub(crate) fn status(rule: impl Fn(usize) -> u16 + Send + Sync + 'static) -> Self {
        Self::new(move |n| Delivery::response(rule(n), 16))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _task: &RequestTask) -> Delivery {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.script)(n)
    }
}
