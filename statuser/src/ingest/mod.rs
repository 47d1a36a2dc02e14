pub mod json_lines;

use crate::model::{InboundMessage, SourceRequest};
use async_trait::async_trait;
use statuser_core::{Error, Result};

#[async_trait]
pub trait RequestStream: Send {
    /// Wait for the next inbound message. `Ok(None)` means the stream has
    /// ended and no further messages will arrive.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>>;

    /// Get the stream identifier
    fn stream_id(&self) -> &str;
}

/// Decode an inbound payload into a request. Malformed payloads never reach
/// the router.
pub fn decode(message: &InboundMessage) -> Result<SourceRequest> {
    let request: SourceRequest = serde_json::from_slice(&message.payload)
        .map_err(|e| Error::Decode(e.to_string()))?;

    if request.source_id.trim().is_empty() {
        return Err(Error::Decode("source_id is empty".to_string()));
    }

    Ok(request)
}

pub use json_lines::JsonLinesSource;
