use crate::ingest;
use crate::model::{InboundMessage, Principal, Provider, ProviderType, ResolvedSource, SourceRequest};
use crate::resolver::CredentialResolver;
use statuser_core::record_metric;
use statuser_core::telemetry::{REQUESTS_DROPPED, REQUESTS_ROUTED};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Routed(Provider),
    Malformed,
    NotFound,
    LookupFailed,
    Noop,
    UnknownProvider,
    QueueClosed,
}

impl DispatchOutcome {
    fn drop_reason(self) -> Option<&'static str> {
        match self {
            DispatchOutcome::Routed(_) => None,
            DispatchOutcome::Malformed => Some("decode_error"),
            DispatchOutcome::NotFound => Some("not_found"),
            DispatchOutcome::LookupFailed => Some("resolve_error"),
            DispatchOutcome::Noop => Some("noop"),
            DispatchOutcome::UnknownProvider => Some("unknown_provider"),
            DispatchOutcome::QueueClosed => Some("queue_closed"),
        }
    }
}

/// Sending halves of the per-provider queues. The router is their only
/// writer; dropping it closes every queue.
pub struct ProviderQueues {
    aws: mpsc::Sender<ResolvedSource>,
    azure: mpsc::Sender<ResolvedSource>,
    gcp: mpsc::Sender<ResolvedSource>,
}

impl ProviderQueues {
    /// Create one bounded queue per provider and hand back the receiving
    /// halves for the workers.
    pub fn bounded(capacity: usize) -> (Self, Vec<(Provider, mpsc::Receiver<ResolvedSource>)>) {
        let (aws, aws_rx) = mpsc::channel(capacity);
        let (azure, azure_rx) = mpsc::channel(capacity);
        let (gcp, gcp_rx) = mpsc::channel(capacity);

        let receivers = vec![
            (Provider::Aws, aws_rx),
            (Provider::Azure, azure_rx),
            (Provider::Gcp, gcp_rx),
        ];

        (Self { aws, azure, gcp }, receivers)
    }

    fn sender(&self, provider: Provider) -> &mpsc::Sender<ResolvedSource> {
        match provider {
            Provider::Aws => &self.aws,
            Provider::Azure => &self.azure,
            Provider::Gcp => &self.gcp,
        }
    }
}

pub struct Router {
    resolver: Arc<dyn CredentialResolver>,
    queues: ProviderQueues,
}

impl Router {
    pub fn new(resolver: Arc<dyn CredentialResolver>, queues: ProviderQueues) -> Self {
        Self { resolver, queues }
    }

    /// Decode and dispatch one inbound message.
    pub async fn handle(&self, message: InboundMessage) -> DispatchOutcome {
        let outcome = match ingest::decode(&message) {
            Ok(request) => self.dispatch(request, &message.identity).await,
            Err(e) => {
                warn!(error = %e, "Could not decode availability status message");
                DispatchOutcome::Malformed
            }
        };

        if let Some(reason) = outcome.drop_reason() {
            record_metric!(counter, REQUESTS_DROPPED, 1, "reason" = reason);
        } else if let DispatchOutcome::Routed(provider) = outcome {
            record_metric!(counter, REQUESTS_ROUTED, 1, "provider" = provider.as_str());
        }

        outcome
    }

    /// Resolve credentials for the request and enqueue it for its provider.
    /// Waits while the provider queue is full.
    #[instrument(skip(self, request, identity), fields(source_id = %request.source_id))]
    pub async fn dispatch(&self, request: SourceRequest, identity: &Principal) -> DispatchOutcome {
        trace!("Received availability check request");

        let resolved = match self.resolver.resolve(&request.source_id, identity).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_not_found() => {
                debug!(error = %e, "Source not found, skipping");
                return DispatchOutcome::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "Could not get authentication");
                return DispatchOutcome::LookupFailed;
            }
        };

        let provider = match resolved.provider_type {
            ProviderType::Aws => Provider::Aws,
            ProviderType::Azure => Provider::Azure,
            ProviderType::Gcp => Provider::Gcp,
            ProviderType::Noop => {
                trace!("Noop source, skipping");
                return DispatchOutcome::Noop;
            }
            ProviderType::Unknown => {
                warn!(
                    application_id = %resolved.application_id,
                    "Authentication provider type is unknown"
                );
                return DispatchOutcome::UnknownProvider;
            }
        };

        if self.queues.sender(provider).send(resolved).await.is_err() {
            warn!(%provider, "Provider queue closed, dropping request");
            return DispatchOutcome::QueueClosed;
        }

        DispatchOutcome::Routed(provider)
    }
}
