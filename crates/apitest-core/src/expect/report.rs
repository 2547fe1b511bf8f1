use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::results::{format_duration, RunResult};

/// Which checks produced a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    #[default]
    Functional,
    Performance,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestType::Functional => "functional",
            TestType::Performance => "performance",
        };
        write!(f, "{s}")
    }
}

/// One declared field whose observed value differed from the expected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub field: String,
    pub observed: String,
    pub expected: String,
}

impl Mismatch {
    pub fn new(
        field: impl Into<String>,
        observed: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            observed: observed.into(),
            expected: expected.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mismatched {}: got {}, want {}",
            self.field, self.observed, self.expected
        )
    }
}

/// Verdict for one expectation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub url: String,
    pub test_type: TestType,
    pub passed: bool,
    /// Functional run. Absent when the expectation could not be built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<RunResult>,
    pub mismatches: Vec<Mismatch>,
    /// Why the expectation could not be run at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    /// A failed report for an expectation that never reached the network.
    pub fn configuration_error(url: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            test_type: TestType::Functional,
            passed: false,
            result: None,
            performance: None,
            mismatches: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.passed
    }

    /// Duration of the performance run when one happened, otherwise of the
    /// functional request.
    pub fn duration(&self) -> Duration {
        self.performance
            .as_ref()
            .or(self.result.as_ref())
            .map_or(Duration::ZERO, |r| r.duration)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "SUCCESS" } else { "FAILURE" };
        writeln!(f, "Test [{}]", self.url)?;
        writeln!(f, "\tTest Status: {status}")?;
        writeln!(f, "\tTest Type: {}", self.test_type)?;
        if self.mismatches.is_empty() && self.error.is_none() {
            writeln!(f, "\tTest Errors: <nil>")?;
        } else {
            writeln!(f, "\tTest Errors:")?;
            if let Some(err) = &self.error {
                writeln!(f, "\t\t- {err}")?;
            }
            for mismatch in &self.mismatches {
                writeln!(f, "\t\t- {mismatch}")?;
            }
        }
        writeln!(f, "\tDuration: {}", format_duration(self.duration()))
    }
}
