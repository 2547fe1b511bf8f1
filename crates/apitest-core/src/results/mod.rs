use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::TransportError;
use crate::http::request::HttpMethod;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The result of sending exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub elapsed: Duration,
    /// `None` when no response arrived.
    pub status: Option<u16>,
    pub bytes: u64,
    pub error: Option<TransportError>,
}

impl Outcome {
    /// An outcome counts as an error when the transport failed or the server
    /// answered in the 4xx/5xx range.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|s| s >= 400)
    }
}

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

/// Finalized summary of one pipeline run.
///
/// Produced once by [`crate::engine::Aggregator::finalize`]; nothing in the
/// crate mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RunResult {
    pub url: String,
    pub method: HttpMethod,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of requests merged.
    pub requests: u64,
    /// Requests that failed at transport level or returned a status >= 400.
    pub errors: u64,
    /// Total response bytes drained.
    pub bytes: u64,
    #[serde(rename = "fastest_ms", serialize_with = "opt_duration_ms")]
    pub fastest: Option<Duration>,
    #[serde(rename = "slowest_ms", serialize_with = "opt_duration_ms")]
    pub slowest: Option<Duration>,
    #[serde(rename = "mean_ms", serialize_with = "opt_duration_ms")]
    pub mean: Option<Duration>,
    /// Wall-clock span of the whole run.
    #[serde(rename = "duration_ms", serialize_with = "duration_ms")]
    pub duration: Duration,
    pub requests_per_second: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub error_messages: BTreeMap<String, u64>,
    /// The run stopped early because it was cancelled.
    pub cancelled: bool,
}

impl RunResult {
    /// Percentage of requests that were not errors, in `[0, 100]`.
    /// Zero when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        let ok = self.requests.saturating_sub(self.errors) as f64;
        ok * 100.0 / self.requests as f64
    }

    /// The status code every response shared, if there was exactly one.
    pub fn status_code(&self) -> Option<u16> {
        let mut codes = self.status_codes.keys();
        match (codes.next(), codes.next()) {
            (Some(&code), None) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "\tSuccess    : {:.0}%", self.success_rate())?;
        writeln!(f, "\tRPS        : {:.1}", self.requests_per_second)?;
        writeln!(f, "\tRequests   : {}", self.requests)?;
        writeln!(f, "\tErrors     : {}", self.errors)?;
        writeln!(f, "\tBytes      : {}", self.bytes)?;
        writeln!(f, "\tDuration   : {}", format_duration(self.duration))?;
        if self.requests > 1 {
            if let (Some(fastest), Some(slowest)) = (self.fastest, self.slowest) {
                writeln!(f, "\tFastest    : {}", format_duration(fastest))?;
                writeln!(f, "\tSlowest    : {}", format_duration(slowest))?;
            }
        }
        if self.cancelled {
            writeln!(f, "\t(cancelled before all requests were sent)")?;
        }
        Ok(())
    }
}

/// Render a duration rounded to the microsecond, e.g. `12.345ms`.
pub fn format_duration(d: Duration) -> String {
    let micros = d.as_micros().min(u64::MAX as u128) as u64;
    format!("{:?}", Duration::from_micros(micros))
}

pub(crate) fn duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

pub(crate) fn opt_duration_ms<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => duration_ms(d, s),
        None => s.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
