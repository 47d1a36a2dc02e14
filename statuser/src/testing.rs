//! In-memory collaborators for unit tests.

use crate::ingest::RequestStream;
use crate::model::{
    Authentication, InboundMessage, OutboundMessage, Principal, ProbeResult, Provider,
    ProviderType, ResolvedSource,
};
use crate::probe::ProviderProbe;
use crate::resolver::CredentialResolver;
use crate::sink::ResultSink;
use crate::worker::{ProbeEvent, ProbeObserver};
use async_trait::async_trait;
use bytes::Bytes;
use statuser_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

pub fn principal() -> Principal {
    Principal {
        org_id: "org-1".into(),
        account_number: Some("acct-1".into()),
    }
}

pub fn inbound(source_id: &str) -> InboundMessage {
    InboundMessage {
        payload: Bytes::from(format!(r#"{{"source_id":"{source_id}"}}"#)),
        identity: principal(),
    }
}

fn provider_type(provider: Provider) -> ProviderType {
    match provider {
        Provider::Aws => ProviderType::Aws,
        Provider::Azure => ProviderType::Azure,
        Provider::Gcp => ProviderType::Gcp,
    }
}

pub fn resolved_as(application_id: &str, provider_type: ProviderType) -> ResolvedSource {
    ResolvedSource {
        authentication: Authentication {
            provider_type,
            payload: format!("credentials-for-{application_id}"),
            source_application_id: application_id.to_string(),
        },
        application_id: application_id.to_string(),
        provider_type,
        identity: principal(),
    }
}

pub fn resolved(application_id: &str, provider: Provider) -> ResolvedSource {
    resolved_as(application_id, provider_type(provider))
}

pub fn probe_result(application_id: &str, provider: Provider) -> ProbeResult {
    ProbeResult::available(&resolved(application_id, provider))
}

/// Resolves registered sources; anything else is not found.
#[derive(Default)]
pub struct FakeResolver {
    sources: HashMap<String, ProviderType>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: &str, provider_type: ProviderType) -> Self {
        self.sources.insert(source_id.to_string(), provider_type);
        self
    }

    pub fn with_failure(mut self, source_id: &str) -> Self {
        self.failing.insert(source_id.to_string());
        self
    }

    pub fn with_panic(mut self, source_id: &str) -> Self {
        self.panicking.insert(source_id.to_string());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CredentialResolver for FakeResolver {
    async fn resolve(&self, source_id: &str, identity: &Principal) -> Result<ResolvedSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.panicking.contains(source_id) {
            panic!("resolver crashed on source {source_id}");
        }

        if self.failing.contains(source_id) {
            return Err(Error::Lookup {
                source_id: source_id.to_string(),
                status: Some(500),
                details: "sources unavailable".into(),
            });
        }

        match self.sources.get(source_id) {
            Some(provider_type) => {
                let mut source = resolved_as(source_id, *provider_type);
                source.identity = identity.clone();
                Ok(source)
            }
            None => Err(Error::NotFound {
                source_id: source_id.to_string(),
            }),
        }
    }
}

enum ProbeMode {
    Reachable,
    FailingFor(HashSet<String>),
    Hanging,
}

pub struct FakeProbe {
    mode: ProbeMode,
}

impl FakeProbe {
    pub fn reachable() -> Self {
        Self {
            mode: ProbeMode::Reachable,
        }
    }

    pub fn failing_for<const N: usize>(application_ids: [&str; N]) -> Self {
        Self {
            mode: ProbeMode::FailingFor(application_ids.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: ProbeMode::Hanging,
        }
    }
}

#[async_trait]
impl ProviderProbe for FakeProbe {
    async fn probe(&self, authentication: &Authentication) -> Result<()> {
        match &self.mode {
            ProbeMode::Reachable => Ok(()),
            ProbeMode::FailingFor(ids) if ids.contains(&authentication.source_application_id) => {
                Err(Error::Probe {
                    provider: authentication.provider_type.to_string(),
                    details: "unreachable".into(),
                })
            }
            ProbeMode::FailingFor(_) => Ok(()),
            ProbeMode::Hanging => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProbeEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ProbeEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProbeObserver for RecordingObserver {
    fn on_probe(&self, event: &ProbeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Keeps every successfully sent batch with the time it arrived.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<(Instant, Vec<OutboundMessage>)>>,
    fail_remaining: AtomicUsize,
    notify: Notify,
}

impl RecordingSink {
    pub fn failing_first(count: usize) -> Self {
        Self {
            fail_remaining: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<(Instant, Vec<OutboundMessage>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, batch)| batch.len())
            .collect()
    }

    pub fn resource_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, batch)| batch.iter())
            .map(|message| {
                let value: serde_json::Value = serde_json::from_slice(&message.value).unwrap();
                value["resource_id"].as_str().unwrap().to_string()
            })
            .collect()
    }

    pub async fn wait_for_batches(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.batches.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn send(&self, batch: Vec<OutboundMessage>) -> Result<()> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Transport {
                count: batch.len(),
                details: "broker unavailable".into(),
            });
        }

        self.batches.lock().unwrap().push((Instant::now(), batch));
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Inbound stream fed from a channel; ends when every sender is dropped.
pub struct ChannelStream {
    rx: mpsc::Receiver<InboundMessage>,
}

pub fn channel_stream() -> (mpsc::Sender<InboundMessage>, ChannelStream) {
    let (tx, rx) = mpsc::channel(64);
    (tx, ChannelStream { rx })
}

#[async_trait]
impl RequestStream for ChannelStream {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        Ok(self.rx.recv().await)
    }

    fn stream_id(&self) -> &str {
        "channel"
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.inner.lock().unwrap().clone()).unwrap()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
