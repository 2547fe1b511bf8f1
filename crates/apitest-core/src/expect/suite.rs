use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ApitestError;
use crate::http::request::{HttpMethod, RequestTask};

/// Status expected when a suite entry does not declare one.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

// ---------------------------------------------------------------------------
// Suite model
// ---------------------------------------------------------------------------

/// A YAML document of declared expectations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectationSuite {
    #[serde(default)]
    pub expects: Vec<Expectation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub input: Input,
    #[serde(default)]
    pub expected_output: ExpectedOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_test: Option<PerformanceTest>,
}

/// The request an expectation sends.
///
/// `method` stays a string here so that an unknown method fails only its own
/// expectation instead of the whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub params: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutput {
    /// 0 means "not declared" and becomes [`DEFAULT_EXPECTED_STATUS`].
    #[serde(default)]
    pub status_code: u16,
}

/// Load run performed after a passing functional check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTest {
    #[serde(default = "one")]
    pub requests: usize,
    #[serde(default = "one")]
    pub concurrency: usize,
    /// Minimum success rate in percent.
    #[serde(default)]
    pub success: f64,
}

fn default_method() -> String {
    HttpMethod::Get.to_string()
}

fn one() -> usize {
    1
}

// ---------------------------------------------------------------------------
// Loading and normalization
// ---------------------------------------------------------------------------

impl ExpectationSuite {
    /// Parse a suite and apply defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ApitestError> {
        let mut suite: ExpectationSuite = serde_yaml::from_str(content)?;
        suite.normalize();
        Ok(suite)
    }

    /// Read and parse a suite file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ApitestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let suite = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), expects = suite.expects.len(), "loaded expectation suite");
        Ok(suite)
    }

    fn normalize(&mut self) {
        for expect in &mut self.expects {
            if expect.expected_output.status_code == 0 {
                expect.expected_output.status_code = DEFAULT_EXPECTED_STATUS;
            }
            if let Some(perf) = &mut expect.performance_test {
                perf.normalize(&expect.input.url);
            }
        }
    }
}

impl PerformanceTest {
    fn normalize(&mut self, url: &str) {
        if self.requests == 0 || self.concurrency == 0 {
            tracing::warn!(url, "performance test requests/concurrency of 0 raised to 1");
            self.requests = self.requests.max(1);
            self.concurrency = self.concurrency.max(1);
        }
        if !self.success.is_finite() {
            self.success = 0.0;
        }
        self.success = self.success.clamp(0.0, 100.0);
    }
}

impl Expectation {
    /// Build the validated request this expectation sends.
    pub fn request_task(&self) -> Result<RequestTask, ApitestError> {
        let method: HttpMethod = self.input.method.parse()?;
        let mut task = RequestTask::new(method, &self.input.url)?;
        for param in &self.input.params {
            task = task.with_query(&param.name, &param.value);
        }
        for header in &self.input.headers {
            task = task.with_header(header.name.as_str(), header.value.as_str())?;
        }
        if let Some(body) = &self.input.body {
            task = task.with_body(body.as_bytes());
        }
        Ok(task)
    }

    pub fn expected_status(&self) -> u16 {
        match self.expected_output.status_code {
            0 => DEFAULT_EXPECTED_STATUS,
            code => code,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INPUT:")?;
        writeln!(f, "\turl: {}", self.input.url)?;
        writeln!(f, "\tmethod: {}", self.input.method)?;
        writeln!(f, "OUTPUT:")?;
        write!(f, "\tstatusCode: {}", self.expected_status())
    }
}
