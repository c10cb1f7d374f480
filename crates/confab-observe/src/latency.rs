//! Response latency observer.
//!
//! Consumes [`EngineEvent::ResponseLatency`] samples off the event bus and
//! keeps a running summary, logging each sample at debug level. The
//! gateway publishes fire-and-forget, so observation never sits on the
//! response path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use confab_core::event::EventBus;
use confab_types::event::EngineEvent;

/// Running latency summary over observed gateway responses.
#[derive(Debug, Default)]
pub struct LatencyObserver {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    last_ms: Mutex<Option<u64>>,
}

/// Point-in-time summary of observed latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: u64,
    pub max_ms: u64,
    pub last_ms: Option<u64>,
}

impl LatencyObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        *self.last_ms.lock().unwrap_or_else(PoisonError::into_inner) = Some(ms);
        debug!(latency_ms = ms, "inference response latency");
    }

    pub fn summary(&self) -> LatencySummary {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        LatencySummary {
            count,
            mean_ms: if count == 0 { 0 } else { total / count },
            max_ms: self.max_ms.load(Ordering::Relaxed),
            last_ms: *self.last_ms.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Consume latency events from the bus until cancelled.
    pub async fn run(&self, events: &EventBus, cancel: CancellationToken) {
        let mut rx = events.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(EngineEvent::ResponseLatency { ms }) => self.record(ms),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "latency observer lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        let summary = self.summary();
        if summary.count > 0 {
            info!(
                count = summary.count,
                mean_ms = summary.mean_ms,
                max_ms = summary.max_ms,
                "latency summary"
            );
        }
    }
}
