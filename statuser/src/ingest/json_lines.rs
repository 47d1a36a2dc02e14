use super::RequestStream;
use crate::model::{InboundMessage, Principal};
use async_trait::async_trait;
use bytes::Bytes;
use statuser_core::Result;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, instrument};

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Line-delimited inbound stream. Every non-blank line is one message
/// payload; all messages carry the configured principal.
pub struct JsonLinesSource {
    lines: Lines<BoxedReader>,
    identity: Principal,
    name: String,
}

impl JsonLinesSource {
    pub fn new(reader: BoxedReader, identity: Principal, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            identity,
            name: name.into(),
        }
    }

    pub fn stdin(identity: Principal) -> Self {
        Self::new(Box::new(BufReader::new(tokio::io::stdin())), identity, "stdin")
    }

    pub async fn open(path: &Path, identity: Principal) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(
            Box::new(BufReader::new(file)),
            identity,
            path.display().to_string(),
        ))
    }
}

#[async_trait]
impl RequestStream for JsonLinesSource {
    #[instrument(skip(self), fields(stream = %self.name))]
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!(bytes = line.len(), "Read inbound message");
            return Ok(Some(InboundMessage {
                payload: Bytes::copy_from_slice(line.as_bytes()),
                identity: self.identity.clone(),
            }));
        }

        Ok(None)
    }

    fn stream_id(&self) -> &str {
        &self.name
    }
}
