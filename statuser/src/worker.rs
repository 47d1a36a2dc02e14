use crate::model::{AvailabilityStatus, ProbeResult, Provider, ResolvedSource};
use crate::probe::ProviderProbe;
use statuser_core::record_metric;
use statuser_core::telemetry::{PROBE_DURATION, RESULTS_LOST, RESULTS_SENT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Emitted by a worker after every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEvent {
    pub provider: Provider,
    pub status: AvailabilityStatus,
    pub elapsed: Duration,
}

pub trait ProbeObserver: Send + Sync {
    fn on_probe(&self, event: &ProbeEvent);
}

/// Records probe events as Prometheus counters and histograms.
#[derive(Debug, Default)]
pub struct MetricsObserver;

impl ProbeObserver for MetricsObserver {
    fn on_probe(&self, event: &ProbeEvent) {
        record_metric!(
            counter,
            RESULTS_SENT,
            1,
            "provider" = event.provider.as_str(),
            "status" = event.status.as_str()
        );
        record_metric!(
            histogram,
            PROBE_DURATION,
            event.elapsed.as_secs_f64(),
            "provider" = event.provider.as_str()
        );
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub unavailable: u64,
    pub lost: u64,
}

/// Run one provider worker until its queue is closed and drained.
///
/// A probe failure becomes an `Unavailable` result; nothing a probe returns
/// ends the loop.
pub async fn run_worker(
    provider: Provider,
    mut queue: mpsc::Receiver<ResolvedSource>,
    probe: Arc<dyn ProviderProbe>,
    results: mpsc::Sender<ProbeResult>,
    observer: Arc<dyn ProbeObserver>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    info!(%provider, "Provider worker started");

    while let Some(source) = queue.recv().await {
        trace!(
            %provider,
            application_id = %source.application_id,
            "Checking source availability"
        );

        let started = Instant::now();
        let result = match probe.probe(&source.authentication).await {
            Ok(()) => ProbeResult::available(&source),
            Err(e) => {
                warn!(
                    %provider,
                    application_id = %source.application_id,
                    error = %e,
                    "Source is unavailable"
                );
                stats.unavailable += 1;
                ProbeResult::unavailable(&source, e.to_string())
            }
        };

        observer.on_probe(&ProbeEvent {
            provider,
            status: result.status,
            elapsed: started.elapsed(),
        });
        stats.processed += 1;

        if let Err(mpsc::error::SendError(result)) = results.send(result).await {
            error!(
                %provider,
                resource_id = %result.resource_id,
                "Result queue closed, dropping probe result"
            );
            record_metric!(counter, RESULTS_LOST, 1);
            stats.lost += 1;
        }
    }

    debug!(%provider, processed = stats.processed, "Provider queue drained");
    info!(%provider, "Provider worker stopped");
    stats
}
