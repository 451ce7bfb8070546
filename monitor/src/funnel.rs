//! Single-consumer ingestion funnel.
//!
//! The ring buffers inside [`VolatilityEngine`] and [`CascadeDetector`] are
//! single-writer. When several network listeners ingest in parallel they
//! funnel through one bounded channel and one consumer task instead of
//! sharing locks on the hot path. Queued events are drained in batches and
//! applied in embedded-timestamp order, so acceleration math never sees
//! time run backwards when feeds race.
//!
//! Modeled as an Arc-managed async service: shared snapshot state plus a
//! list of subscriber channels that receive every refreshed snapshot.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use cascade::{CascadeDetector, LiquidationEvent, LiquidationMetrics};
use volatility::{VolatilityEngine, VolatilityMetrics};

/// A tick or liquidation from any upstream feed.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    Tick { price: f64, ts_ms: u64 },
    Liquidation(LiquidationEvent),
}

impl FeedEvent {
    fn ts_ms(&self) -> u64 {
        match self {
            FeedEvent::Tick { ts_ms, .. } => *ts_ms,
            FeedEvent::Liquidation(event) => event.ts_ms,
        }
    }
}

/// Latest snapshots produced by the funnel.
#[derive(Clone, Debug, Default)]
pub struct MonitorSnapshot {
    pub volatility: Option<VolatilityMetrics>,
    pub liquidation: Option<LiquidationMetrics>,
}

/// Owns the engines behind a feed channel and broadcasts their snapshots.
pub struct MarketMonitor {
    state: Arc<Mutex<MonitorSnapshot>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<MonitorSnapshot>>>>,
}

impl MarketMonitor {
    /// Spawn the consumer task. Returns the monitor handle plus the sender
    /// every feed listener should clone.
    pub fn spawn(
        engine: VolatilityEngine,
        detector: CascadeDetector,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Sender<FeedEvent>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(16));

        let monitor = Arc::new(Self {
            state: Arc::new(Mutex::new(MonitorSnapshot::default())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        });

        let consumer = Arc::clone(&monitor);
        tokio::spawn(async move {
            consumer.run(engine, detector, rx).await;
        });

        (monitor, tx)
    }

    /// Register a component interested in refreshed snapshots.
    pub async fn subscribe(&self, sender: mpsc::Sender<MonitorSnapshot>) {
        self.subscribers.lock().await.push(sender);
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        self.state.lock().await.clone()
    }

    async fn run(
        self: Arc<Self>,
        mut engine: VolatilityEngine,
        mut detector: CascadeDetector,
        mut rx: mpsc::Receiver<FeedEvent>,
    ) {
        info!("market monitor started");
        let mut batch: Vec<FeedEvent> = Vec::new();

        while let Some(first) = rx.recv().await {
            batch.push(first);
            while let Ok(more) = rx.try_recv() {
                batch.push(more);
            }
            // Racing feeds deliver by arrival; acceleration-sensitive math
            // needs embedded-timestamp order.
            batch.sort_by_key(FeedEvent::ts_ms);

            let mut snapshot = self.state.lock().await.clone();
            for event in batch.drain(..) {
                match event {
                    FeedEvent::Tick { price, ts_ms } => {
                        if price <= 0.0 {
                            warn!(price, "non-positive tick dropped");
                            continue;
                        }
                        let metrics = engine.update_price_at(price, ts_ms);
                        if metrics.regime_change {
                            detector.apply_signal_adjustment(engine.signal_adjustment());
                        }
                        snapshot.volatility = Some(metrics);
                    }
                    FeedEvent::Liquidation(event) => {
                        snapshot.liquidation = Some(detector.process_liquidation(&event));
                    }
                }
            }

            *self.state.lock().await = snapshot.clone();
            self.broadcast(snapshot).await;
        }

        warn!("feed channel closed; market monitor stopping");
    }

    async fn broadcast(&self, snapshot: MonitorSnapshot) {
        let subscribers = self.subscribers.lock().await;
        for subscriber in subscribers.iter() {
            let _ = subscriber.send(snapshot.clone()).await;
        }
    }
}
