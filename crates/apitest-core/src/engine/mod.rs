//! Request pipeline: sender, worker pool and result aggregation.

pub mod aggregator;
pub mod pipeline;
pub mod sender;

pub use aggregator::Aggregator;
pub use pipeline::Pipeline;
pub use sender::send_request;
