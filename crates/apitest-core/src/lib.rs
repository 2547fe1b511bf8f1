pub mod engine;
pub mod error;
pub mod expect;
pub mod http;
pub mod results;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{Aggregator, Pipeline};
pub use error::{ApitestError, TransportError};
pub use expect::{Evaluator, ExpectationSuite, Report};
pub use http::{HttpClient, HttpMethod, RequestTask, Transport};
pub use results::{Outcome, RunResult};
