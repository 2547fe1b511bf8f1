use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::request::{HttpMethod, RequestTask};
use crate::results::{Outcome, RunResult};

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Running statistics for one pipeline run.
///
/// Every field is order independent: merging the same outcomes in any order,
/// or splitting them across several aggregators and [`absorb`](Self::absorb)ing
/// those, gives the same state. An aggregator has a single writer; the
/// pipeline's aggregation loop owns it and never shares it across tasks.
#[derive(Debug, Clone)]
pub struct Aggregator {
    url: String,
    method: HttpMethod,
    started_at: DateTime<Utc>,
    requests: u64,
    errors: u64,
    bytes: u64,
    fastest: Option<Duration>,
    slowest: Option<Duration>,
    /// Sum and count of outcomes that received a response, for the mean.
    timed_sum: Duration,
    timed: u64,
    status_codes: BTreeMap<u16, u64>,
    error_messages: BTreeMap<String, u64>,
}

impl Aggregator {
    /// Start an empty aggregator for runs of `template`.
    pub fn new(template: &RequestTask) -> Self {
        Self {
            url: template.url().to_string(),
            method: template.method(),
            started_at: Utc::now(),
            requests: 0,
            errors: 0,
            bytes: 0,
            fastest: None,
            slowest: None,
            timed_sum: Duration::ZERO,
            timed: 0,
            status_codes: BTreeMap::new(),
            error_messages: BTreeMap::new(),
        }
    }

    /// Fold one outcome into the running state.
    ///
    /// Latency extremes and the mean only consider outcomes that received a
    /// status; a pure transport failure measures the failure, not the server.
    pub fn merge(&mut self, outcome: &Outcome) {
        self.requests += 1;
        self.bytes += outcome.bytes;

        if let Some(status) = outcome.status {
            let elapsed = outcome.elapsed;
            if self.fastest.map_or(true, |f| elapsed < f) {
                self.fastest = Some(elapsed);
            }
            if self.slowest.map_or(true, |s| elapsed > s) {
                self.slowest = Some(elapsed);
            }
            self.timed_sum += elapsed;
            self.timed += 1;
            *self.status_codes.entry(status).or_insert(0) += 1;
        }

        if let Some(err) = &outcome.error {
            *self.error_messages.entry(err.to_string()).or_insert(0) += 1;
        }

        if outcome.is_error() {
            self.errors += 1;
        }
    }

    /// Reduce another partial aggregator of the same run into this one.
    pub fn absorb(&mut self, other: Aggregator) {
        self.requests += other.requests;
        self.errors += other.errors;
        self.bytes += other.bytes;
        self.fastest = match (self.fastest, other.fastest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.slowest = match (self.slowest, other.slowest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.timed_sum += other.timed_sum;
        self.timed += other.timed;
        self.started_at = self.started_at.min(other.started_at);
        for (code, n) in other.status_codes {
            *self.status_codes.entry(code).or_insert(0) += n;
        }
        for (msg, n) in other.error_messages {
            *self.error_messages.entry(msg).or_insert(0) += n;
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn fastest(&self) -> Option<Duration> {
        self.fastest
    }

    pub fn slowest(&self) -> Option<Duration> {
        self.slowest
    }

    /// Freeze the summary with the externally measured wall-clock span.
    ///
    /// Requests per second is 0 when nothing was sent or no time elapsed.
    pub fn finalize(self, total: Duration) -> RunResult {
        self.finish(total, false)
    }

    pub(crate) fn finish(self, total: Duration, cancelled: bool) -> RunResult {
        let secs = total.as_secs_f64();
        let requests_per_second = if self.requests == 0 || secs <= 0.0 {
            0.0
        } else {
            self.requests as f64 / secs
        };
        let mean = (self.timed > 0)
            .then(|| Duration::from_nanos((self.timed_sum.as_nanos() / self.timed as u128) as u64));

        RunResult {
            url: self.url,
            method: self.method,
            started_at: self.started_at,
            finished_at: Utc::now(),
            requests: self.requests,
            errors: self.errors,
            bytes: self.bytes,
            fastest: self.fastest,
            slowest: self.slowest,
            mean,
            duration: total,
            requests_per_second,
            status_codes: self.status_codes,
            error_messages: self.error_messages,
            cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
