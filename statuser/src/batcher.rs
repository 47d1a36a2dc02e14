use crate::model::{OutboundMessage, ProbeResult};
use crate::sink::ResultSink;
use statuser_core::record_metric;
use statuser_core::telemetry::{BATCH_FLUSHES, BATCH_SEND_FAILURES, RESULTS_LOST};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, trace, warn};

/// Size-bounded buffer of pending items.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
    limit: usize,
}

impl<T> Batch<T> {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            items: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Append an item. Returns the full batch once `limit` is reached.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.limit {
            return Some(self.drain());
        }
        None
    }

    /// Take whatever is pending, if anything.
    pub fn take(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.drain())
        }
    }

    fn drain(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.limit))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Full,
    Tick,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::Full => "full",
            FlushTrigger::Tick => "tick",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatcherStats {
    pub full_flushes: u64,
    pub tick_flushes: u64,
    pub shutdown_flushes: u64,
    pub sent: u64,
    pub lost: u64,
}

/// Sole consumer of the result queue. Owns the pending batch and decides
/// when it goes out.
pub struct Batcher {
    results: mpsc::Receiver<ProbeResult>,
    sink: Arc<dyn ResultSink>,
    topic: String,
    batch_size: usize,
    tick_interval: Duration,
    stats: BatcherStats,
}

impl Batcher {
    pub fn new(
        results: mpsc::Receiver<ProbeResult>,
        sink: Arc<dyn ResultSink>,
        topic: String,
        batch_size: usize,
        tick_interval: Duration,
    ) -> Self {
        Self {
            results,
            sink,
            topic,
            batch_size,
            tick_interval,
            stats: BatcherStats::default(),
        }
    }

    /// Run until the result queue is closed and drained, then flush what is
    /// left and return.
    pub async fn run(mut self) -> BatcherStats {
        let mut batch = Batch::new(self.batch_size);
        let mut ticker = time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            batch_size = self.batch_size,
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Result batcher started"
        );

        loop {
            tokio::select! {
                received = self.results.recv() => {
                    let Some(result) = received else {
                        if let Some(messages) = batch.take() {
                            self.flush(messages, FlushTrigger::Shutdown).await;
                        }
                        break;
                    };

                    let message = match result.to_message(&self.topic) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(
                                resource_id = %result.resource_id,
                                error = %e,
                                "Could not encode availability status message"
                            );
                            record_metric!(counter, RESULTS_LOST, 1);
                            self.stats.lost += 1;
                            continue;
                        }
                    };

                    if let Some(messages) = batch.push(message) {
                        self.flush(messages, FlushTrigger::Full).await;
                        ticker.reset();
                    }
                }

                _ = ticker.tick() => {
                    if let Some(messages) = batch.take() {
                        self.flush(messages, FlushTrigger::Tick).await;
                    }
                }
            }
        }

        info!(
            sent = self.stats.sent,
            lost = self.stats.lost,
            "Result batcher stopped"
        );
        self.stats
    }

    async fn flush(&mut self, messages: Vec<OutboundMessage>, trigger: FlushTrigger) {
        let count = messages.len();
        trace!(
            messages = count,
            trigger = trigger.as_str(),
            "Sending {} source availability status messages",
            count
        );

        match trigger {
            FlushTrigger::Full => self.stats.full_flushes += 1,
            FlushTrigger::Tick => self.stats.tick_flushes += 1,
            FlushTrigger::Shutdown => self.stats.shutdown_flushes += 1,
        }
        record_metric!(counter, BATCH_FLUSHES, 1, "trigger" = trigger.as_str());

        match self.sink.send(messages).await {
            Ok(()) => self.stats.sent += count as u64,
            Err(e) => {
                warn!(
                    lost = count,
                    trigger = trigger.as_str(),
                    error = %e,
                    "Could not send source availability status messages"
                );
                record_metric!(counter, BATCH_SEND_FAILURES, 1);
                record_metric!(counter, RESULTS_LOST, count as u64);
                self.stats.lost += count as u64;
            }
        }
    }
}
