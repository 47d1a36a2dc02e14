pub mod json_lines;

use crate::model::OutboundMessage;
use async_trait::async_trait;
use statuser_core::Result;

/// Outbound stream. One call transmits one whole batch; errors are reported,
/// never retried by the caller.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn send(&self, batch: Vec<OutboundMessage>) -> Result<()>;
}

pub use json_lines::JsonLinesSink;
