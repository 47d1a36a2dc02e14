use super::ResultSink;
use crate::model::OutboundMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use statuser_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

#[derive(Serialize)]
struct Record<'a> {
    id: Uuid,
    topic: &'a str,
    headers: BTreeMap<&'a str, &'a str>,
    value: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl<'a> Record<'a> {
    fn from_message(message: &'a OutboundMessage) -> Result<Self> {
        Ok(Self {
            id: message.id,
            topic: &message.topic,
            headers: message
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            value: serde_json::from_slice(&message.value)?,
            created_at: message.created_at,
        })
    }
}

/// Writes every outbound message as one JSON line. A batch is written and
/// flushed as a single unit.
pub struct JsonLinesSink {
    writer: Mutex<BoxedWriter>,
}

impl JsonLinesSink {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(Box::new(file)))
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn send(&self, batch: Vec<OutboundMessage>) -> Result<()> {
        let count = batch.len();
        let mut buf = Vec::with_capacity(count * 256);
        for message in &batch {
            serde_json::to_writer(&mut buf, &Record::from_message(message)?)?;
            buf.push(b'\n');
        }

        let transport = |e: std::io::Error| Error::Transport {
            count,
            details: e.to_string(),
        };

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await.map_err(transport)?;
        writer.flush().await.map_err(transport)?;
        Ok(())
    }
}
