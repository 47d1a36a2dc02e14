use crate::batcher::Batcher;
use crate::ingest::RequestStream;
use crate::probe::ProviderProbes;
use crate::resolver::CredentialResolver;
use crate::router::{DispatchOutcome, ProviderQueues, Router};
use crate::shutdown::{IntakeStats, PipelineReport, PipelineState, ShutdownCoordinator, Stages};
use crate::sink::ResultSink;
use crate::worker::{run_worker, MetricsObserver, ProbeObserver};
use statuser_core::config::PipelineConfig;
use statuser_core::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Everything the stages share, built once at startup.
pub struct Pipeline {
    config: PipelineConfig,
    topic: String,
    resolver: Arc<dyn CredentialResolver>,
    probes: ProviderProbes,
    sink: Arc<dyn ResultSink>,
    observer: Arc<dyn ProbeObserver>,
    coordinator: ShutdownCoordinator,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        topic: String,
        resolver: Arc<dyn CredentialResolver>,
        probes: ProviderProbes,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let coordinator = ShutdownCoordinator::new(config.shutdown_timeout());
        Self {
            config,
            topic,
            resolver,
            probes,
            sink,
            observer: Arc::new(MetricsObserver),
            coordinator,
        }
    }

    #[cfg(test)]
    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.coordinator.subscribe()
    }

    /// Start every stage and run until `shutdown` is cancelled or the inbound
    /// stream ends, then drain in order.
    #[instrument(skip_all, fields(stream = %stream.stream_id()))]
    pub async fn run<S>(self, stream: S, shutdown: CancellationToken) -> Result<PipelineReport>
    where
        S: RequestStream + 'static,
    {
        let capacity = self.config.channel_buffer_size;
        let (queues, receivers) = ProviderQueues::bounded(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        let batcher = tokio::spawn(
            Batcher::new(
                results_rx,
                Arc::clone(&self.sink),
                self.topic.clone(),
                self.config.batch_size,
                self.config.tick_interval(),
            )
            .run(),
        );

        let workers = receivers
            .into_iter()
            .map(|(provider, queue)| {
                let handle = tokio::spawn(run_worker(
                    provider,
                    queue,
                    self.probes.get(provider),
                    results_tx.clone(),
                    Arc::clone(&self.observer),
                ));
                (provider, handle)
            })
            .collect();
        // Workers hold the only result senders from here on.
        drop(results_tx);

        let router = Router::new(Arc::clone(&self.resolver), queues);
        let intake_cancel = CancellationToken::new();
        let intake = tokio::spawn(run_intake(stream, router, intake_cancel.clone()));

        info!(
            channel_buffer_size = capacity,
            batch_size = self.config.batch_size,
            "Statuser pipeline started"
        );

        self.coordinator
            .supervise(
                Stages {
                    intake,
                    intake_cancel,
                    workers,
                    batcher,
                },
                shutdown,
            )
            .await
    }
}

/// Consume the inbound stream until cancelled or the stream ends. A message
/// already being dispatched is finished before the cancellation is observed.
async fn run_intake<S: RequestStream>(
    mut stream: S,
    router: Router,
    cancel: CancellationToken,
) -> IntakeStats {
    let mut stats = IntakeStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next_message() => next,
        };

        match next {
            Ok(Some(message)) => {
                stats.received += 1;
                match router.handle(message).await {
                    DispatchOutcome::Routed(_) => stats.routed += 1,
                    _ => stats.dropped += 1,
                }
            }
            Ok(None) => {
                warn!(stream = stream.stream_id(), "Inbound stream ended");
                break;
            }
            Err(e) => {
                error!(stream = stream.stream_id(), error = %e, "Inbound stream failed");
                break;
            }
        }
    }

    info!(
        received = stats.received,
        routed = stats.routed,
        dropped = stats.dropped,
        "Intake stopped"
    );
    stats
}
