//! Expectation checks: run each declared request, compare what came back with
//! what was declared, and optionally follow up with a load run.

pub mod report;
pub mod suite;

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::engine::Pipeline;
use crate::error::ApitestError;
use crate::http::transport::Transport;
use crate::results::RunResult;

pub use report::{Mismatch, Report, TestType};
pub use suite::{Expectation, ExpectationSuite, PerformanceTest};

/// Drives one pipeline per expectation over a shared transport.
#[derive(Clone)]
pub struct Evaluator {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.transport)).with_cancellation(self.cancel.clone())
    }

    /// Evaluate one expectation.
    ///
    /// The functional check sends the request once. When it passes and the
    /// expected status is 2xx, the declared performance test (if any) runs and
    /// its success rate is checked against the declared minimum.
    pub async fn evaluate(&self, expectation: &Expectation) -> Report {
        let url = expectation.input.url.clone();
        let task = match expectation.request_task() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(url = %url, "expectation skipped: {e}");
                return Report::configuration_error(url, e);
            }
        };

        let pipeline = self.pipeline();
        let functional = match pipeline.run(&task, 1, 1).await {
            Ok(result) => result,
            Err(e) => return Report::configuration_error(url, e),
        };

        let expected_status = expectation.expected_status();
        let mut report = Report {
            url: task.url().to_string(),
            test_type: TestType::Functional,
            passed: true,
            result: None,
            performance: None,
            mismatches: check_status(&functional, expected_status),
            error: None,
        };
        report.passed = report.mismatches.is_empty();
        report.result = Some(functional);

        if let Some(perf) = &expectation.performance_test {
            if report.passed && is_success_class(expected_status) {
                report.test_type = TestType::Performance;
                match pipeline.run(&task, perf.requests, perf.concurrency).await {
                    Ok(result) => {
                        report.mismatches.extend(check_performance(&result, perf));
                        report.performance = Some(result);
                    }
                    Err(e) => report.error = Some(e.to_string()),
                }
                report.passed = report.mismatches.is_empty() && report.error.is_none();
            }
        }

        tracing::info!(
            url = %report.url,
            passed = report.passed,
            test_type = %report.test_type,
            "expectation evaluated"
        );
        report
    }

    /// Evaluate every expectation concurrently. Reports come back in
    /// declaration order.
    pub async fn evaluate_all(&self, suite: &ExpectationSuite) -> Result<Vec<Report>, ApitestError> {
        let mut set: JoinSet<(usize, Report)> = JoinSet::new();
        for (index, expectation) in suite.expects.iter().cloned().enumerate() {
            let evaluator = self.clone();
            set.spawn(async move { (index, evaluator.evaluate(&expectation).await) });
        }

        let mut reports = Vec::with_capacity(suite.expects.len());
        while let Some(joined) = set.join_next().await {
            let entry = joined
                .map_err(|e| ApitestError::Internal(format!("expectation task failed: {e}")))?;
            reports.push(entry);
        }
        reports.sort_by_key(|(index, _)| *index);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}

fn is_success_class(status: u16) -> bool {
    (200..300).contains(&status)
}

fn check_status(result: &RunResult, expected: u16) -> Vec<Mismatch> {
    match result.status_code() {
        Some(observed) if observed == expected => Vec::new(),
        Some(observed) => vec![Mismatch::new(
            "status_code",
            observed.to_string(),
            expected.to_string(),
        )],
        None => {
            let observed = result
                .error_messages
                .keys()
                .next()
                .map_or_else(|| "no response".to_string(), |e| format!("no response ({e})"));
            vec![Mismatch::new("status_code", observed, expected.to_string())]
        }
    }
}

fn check_performance(result: &RunResult, perf: &PerformanceTest) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    if result.cancelled {
        mismatches.push(Mismatch::new(
            "requests",
            result.requests.to_string(),
            perf.requests.to_string(),
        ));
    }
    let rate = result.success_rate();
    if rate < perf.success {
        mismatches.push(Mismatch::new(
            "success_rate",
            format!("{rate:.2}%"),
            format!(">= {:.2}%", perf.success),
        ));
    }
    mismatches
}
