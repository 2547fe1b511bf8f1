use std::str::FromStr;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApitestError;

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Whether a declared body is sent with this method.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{s}")
    }
}

impl FromStr for HttpMethod {
    type Err = ApitestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(ApitestError::UnsupportedMethod(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestTask
// ---------------------------------------------------------------------------

/// An immutable description of one HTTP call.
///
/// The URL is validated at construction time, so a `RequestTask` that exists is
/// always dispatchable. The body is owned bytes: cloning a task gives every
/// worker its own readable copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTask {
    method: HttpMethod,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RequestTask {
    /// Build a task for `method` against an absolute `http`/`https` URL.
    ///
    /// Methods that carry a body start with an empty one, so a POST without a
    /// declared body is still sent with `Content-Length: 0`.
    pub fn new(method: HttpMethod, url: &str) -> Result<Self, ApitestError> {
        let url = parse_absolute_url(url)?;
        let body = method.carries_body().then(Vec::new);
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
            body,
        })
    }

    /// Shorthand for a GET task.
    pub fn get(url: &str) -> Result<Self, ApitestError> {
        Self::new(HttpMethod::Get, url)
    }

    /// Append a header. Headers are sent in the order they were added.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ApitestError> {
        let (name, value) = (name.into(), value.into());
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ApitestError::Validation(format!("invalid header name '{name}'")));
        }
        if HeaderValue::from_str(&value).is_err() {
            return Err(ApitestError::Validation(format!(
                "invalid value for header '{name}'"
            )));
        }
        self.headers.push((name, value));
        Ok(self)
    }

    /// Append a query parameter to the URL.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Set the body. Ignored for methods that do not carry one.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        if self.method.carries_body() {
            self.body = Some(body.into());
        } else {
            tracing::debug!(method = %self.method, "ignoring body for method without payload");
        }
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

fn parse_absolute_url(raw: &str) -> Result<Url, ApitestError> {
    let url = Url::parse(raw.trim()).map_err(|e| ApitestError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ApitestError::InvalidUrl(format!(
                "{raw}: unsupported scheme '{other}'"
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ApitestError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}
