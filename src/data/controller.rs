use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::data::pubsub::{MessageSink, TopicMessage};
use crate::error::Result;
use crate::rates::{PairUniverse, PairView, RateSource};

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub markup_percent: f64,
    /// Pause between full cycles. Zero only yields to the runtime.
    pub cycle_interval: Duration,
    /// Re-fetch rates between cycles.
    pub refresh_rates: bool,
}

#[derive(Debug, Default)]
pub struct BroadcastStats {
    running: AtomicBool,
    cycles: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub cycles: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            running: self.running.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sent: usize,
    pub failed: usize,
}

/// Client rates as of the last completed refresh.
pub type PairSnapshot = Arc<Vec<PairView>>;

/// Publishes every pair of a universe, in order, once per cycle until told
/// to stop. Rates are only refreshed between cycles, on the same task, which
/// is also the only writer of the pair snapshot.
pub struct BroadcastLoop {
    settings: BroadcastSettings,
    source: Arc<dyn RateSource>,
    stats: Arc<BroadcastStats>,
    snapshot: watch::Sender<PairSnapshot>,
}

impl BroadcastLoop {
    pub fn new(settings: BroadcastSettings, source: Arc<dyn RateSource>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            settings,
            source,
            stats: Arc::new(BroadcastStats::default()),
            snapshot,
        }
    }

    pub fn stats(&self) -> Arc<BroadcastStats> {
        self.stats.clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<PairSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn publish_snapshot(&self, universe: &PairUniverse) {
        self.snapshot.send_replace(Arc::new(universe.views()));
    }

    /// Sends one message per pair. A failed send is logged and skipped; a
    /// rate that cannot be rendered aborts the cycle.
    pub fn broadcast_cycle(&self, universe: &PairUniverse, sink: &dyn MessageSink) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        for pair in universe.pairs() {
            let message = TopicMessage::new(pair.topic(), pair.payload()?);

            match sink.publish(&message) {
                Ok(_) => {
                    report.sent += 1;
                    self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed += 1;
                    self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                    error!("Failed to publish {}: {}", pair.key(), e);
                }
            }
        }

        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    /// Runs exactly `cycles` cycles without pausing between them.
    pub fn run_cycles(&self, universe: &mut PairUniverse, sink: &dyn MessageSink, cycles: usize) -> Result<CycleReport> {
        let mut total = CycleReport::default();
        self.publish_snapshot(universe);
        for i in 0..cycles {
            let report = self.broadcast_cycle(universe, sink)?;
            total.sent += report.sent;
            total.failed += report.failed;
            if i + 1 < cycles {
                self.refresh(universe);
            }
        }
        Ok(total)
    }

    /// Broadcasts until `shutdown` carries `true` or its sender is dropped.
    pub async fn run(
        &self,
        universe: &mut PairUniverse,
        sink: &dyn MessageSink,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        if universe.is_empty() {
            warn!("Broadcast loop started with an empty pair universe");
        }

        self.publish_snapshot(universe);
        self.stats.running.store(true, Ordering::Relaxed);
        info!(
            "🚀 Broadcasting {} pairs (cycle interval {:?}, refresh {})",
            universe.len(),
            self.settings.cycle_interval,
            self.settings.refresh_rates
        );

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            if let Err(e) = self.broadcast_cycle(universe, sink) {
                error!("Broadcast cycle aborted: {}", e);
                break Err(e);
            }

            self.refresh(universe);

            if self.settings.cycle_interval.is_zero() {
                if shutdown.has_changed().is_err() {
                    info!("Shutdown sender dropped, stopping broadcast");
                    break Ok(());
                }
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender dropped, stopping broadcast");
                        break Ok(());
                    }
                }
            }
        };

        self.stats.running.store(false, Ordering::Relaxed);
        info!("🛑 Broadcasting stopped after {} cycles", self.stats.cycles.load(Ordering::Relaxed));
        outcome
    }

    fn refresh(&self, universe: &mut PairUniverse) {
        if self.settings.refresh_rates {
            universe.refresh_all(self.source.as_ref(), self.settings.markup_percent);
            self.publish_snapshot(universe);
        }
    }
}
