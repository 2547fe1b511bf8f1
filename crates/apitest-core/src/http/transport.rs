use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::request::RequestTask;

/// What a transport reports for one send, before timing is attached.
///
/// `status` is `None` when no response arrived. A delivery can carry both a
/// status and an error when the body read failed partway; `bytes` then holds
/// what was read before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub status: Option<u16>,
    pub bytes: u64,
    pub error: Option<TransportError>,
}

impl Delivery {
    pub fn response(status: u16, bytes: u64) -> Self {
        Self {
            status: Some(status),
            bytes,
            error: None,
        }
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            status: None,
            bytes: 0,
            error: Some(error),
        }
    }
}

/// Capability to send a request and drain its response.
///
/// One transport is shared by every worker of a run, so implementations must
/// be safe to call concurrently and should pool connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, task: &RequestTask) -> Delivery;
}
