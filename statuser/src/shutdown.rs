use crate::batcher::BatcherStats;
use crate::worker::WorkerStats;
use crate::model::Provider;
use futures::future::join_all;
use statuser_core::{Error, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// External cancellation, e.g. SIGTERM.
    Signal,
    /// The inbound consumer ended on its own.
    ConsumerExited,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntakeStats {
    pub received: u64,
    pub routed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub reason: ShutdownReason,
    pub intake: IntakeStats,
    pub workers: Vec<(Provider, WorkerStats)>,
    pub batcher: BatcherStats,
}

/// Join handles of every running stage.
pub(crate) struct Stages {
    pub intake: JoinHandle<IntakeStats>,
    pub intake_cancel: CancellationToken,
    pub workers: Vec<(Provider, JoinHandle<WorkerStats>)>,
    pub batcher: JoinHandle<BatcherStats>,
}

/// Sequences termination: stop intake, wait for the workers to drain their
/// queues, wait for the batcher to flush, then report.
pub struct ShutdownCoordinator {
    state: watch::Sender<PipelineState>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(PipelineState::Running);
        Self {
            state,
            drain_timeout,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub(crate) async fn supervise(
        &self,
        mut stages: Stages,
        shutdown: CancellationToken,
    ) -> Result<PipelineReport> {
        let exited = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Exiting due to signal");
                None
            }
            joined = &mut stages.intake => {
                warn!("Exiting due to closed consumer");
                Some(joined)
            }
        };
        let reason = match exited {
            Some(_) => ShutdownReason::ConsumerExited,
            None => ShutdownReason::Signal,
        };

        self.state.send_replace(PipelineState::Draining);

        match tokio::time::timeout(self.drain_timeout, Self::drain(stages, reason, exited)).await {
            Ok(report) => {
                self.state.send_replace(PipelineState::Stopped);
                info!("Shutdown finished");
                report
            }
            Err(_) => {
                error!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain did not finish in time, abandoning in-flight work"
                );
                self.state.send_replace(PipelineState::Stopped);
                Err(Error::Pipeline(format!(
                    "drain exceeded {}s",
                    self.drain_timeout.as_secs()
                )))
            }
        }
    }

    /// Wait for every stage in order. A stage that panicked is logged and the
    /// drain continues, so the batcher still sends what reached it. The first
    /// failure is returned once the batcher is done.
    async fn drain(
        stages: Stages,
        reason: ShutdownReason,
        exited: Option<std::result::Result<IntakeStats, JoinError>>,
    ) -> Result<PipelineReport> {
        let mut failure: Option<Error> = None;

        // 1. Stop intake. The router is dropped with the intake task, which
        //    closes every provider queue.
        stages.intake_cancel.cancel();
        let joined = match exited {
            Some(joined) => joined,
            None => stages.intake.await,
        };
        let intake = match joined {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Intake task failed, draining remaining stages");
                failure.get_or_insert(Error::Internal(format!("intake task panicked: {}", e)));
                IntakeStats::default()
            }
        };
        info!(received = intake.received, "Consumer stopped");

        // 2. Workers exit once their queue is closed and empty. The last one
        //    to finish drops the final result sender.
        let (providers, handles): (Vec<_>, Vec<_>) = stages.workers.into_iter().unzip();
        let mut workers = Vec::with_capacity(providers.len());
        for (provider, joined) in providers.into_iter().zip(join_all(handles).await) {
            let stats = match joined {
                Ok(stats) => stats,
                Err(e) => {
                    error!(%provider, error = %e, "Provider worker failed");
                    failure.get_or_insert(Error::Internal(format!(
                        "{} worker panicked: {}",
                        provider, e
                    )));
                    WorkerStats::default()
                }
            };
            workers.push((provider, stats));
        }
        info!("Provider workers stopped");

        // 3. The batcher sees the closed result queue and sends what is left.
        let batcher = match stages.batcher.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Result batcher failed");
                failure.get_or_insert(Error::Internal(format!("batcher task panicked: {}", e)));
                BatcherStats::default()
            }
        };

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(PipelineReport {
            reason,
            intake,
            workers,
            batcher,
        })
    }
}
