//! The single process-owned aggregate: Assembler + Markov engine + score
//! history behind one mutex, plus the control loop that drives them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::assembler::TraceAssembler;
use crate::history::ScoreHistory;
use crate::markov::MarkovEngine;

/// Inner state mutated by the Assembler and the control loop; guarded by a
/// single `std::sync::Mutex` (see `SPEC_FULL.md` §5 — the lock is held
/// briefly and never across an `.await`, so a blocking mutex is correct).
struct Inner {
    assembler: TraceAssembler,
    engine: MarkovEngine,
    history: ScoreHistory,
}

/// Snapshot of the gauges published by the most recent control-loop tick,
/// read lock-free by HTTP handlers.
pub struct Gauges {
    pub integrity_score: AtomicU64,
    pub model_ready: AtomicU64,
    pub traces_tracked: AtomicU64,
    pub active_traces: AtomicU64,
    pub window_size: AtomicU64,
    pub state_count: AtomicU64,
    pub edge_count: AtomicU64,
    readiness_threshold: usize,
}

impl Gauges {
    fn new(readiness_threshold: usize) -> Self {
        Self {
            integrity_score: AtomicU64::new(1.0_f64.to_bits()),
            model_ready: AtomicU64::new(0),
            traces_tracked: AtomicU64::new(0),
            active_traces: AtomicU64::new(0),
            window_size: AtomicU64::new(0),
            state_count: AtomicU64::new(0),
            edge_count: AtomicU64::new(0),
            readiness_threshold,
        }
    }

    pub fn integrity_score(&self) -> f64 {
        f64::from_bits(self.integrity_score.load(Ordering::Relaxed))
    }

    pub fn model_ready(&self) -> bool {
        self.model_ready.load(Ordering::Relaxed) != 0
    }

    pub fn window_size(&self) -> u64 {
        self.window_size.load(Ordering::Relaxed)
    }

    pub fn active_traces(&self) -> u64 {
        self.active_traces.load(Ordering::Relaxed)
    }

    pub fn state_count(&self) -> u64 {
        self.state_count.load(Ordering::Relaxed)
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count.load(Ordering::Relaxed)
    }

    pub fn readiness_reason(&self) -> String {
        let window = self.window_size();
        if (window as usize) > self.readiness_threshold {
            "ready".to_owned()
        } else {
            format!("window has {}/{} traces needed", window, self.readiness_threshold)
        }
    }
}

/// The process' single owned aggregate. Constructed once, shared via `Arc`
/// across the Poller, Control Loop, and HTTP tasks.
pub struct Core {
    inner: Mutex<Inner>,
    gauges: Gauges,
    window_capacity: usize,
}

impl Core {
    pub fn new(
        max_traces: usize,
        trace_ttl_secs: f64,
        alpha: f64,
        window_capacity: usize,
        score_history_capacity: usize,
        readiness_threshold: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                assembler: TraceAssembler::new(max_traces, trace_ttl_secs),
                engine: MarkovEngine::new(alpha, window_capacity),
                history: ScoreHistory::new(score_history_capacity),
            }),
            gauges: Gauges::new(readiness_threshold),
            window_capacity,
        }
    }

    pub fn gauges(&self) -> &Gauges {
        &self.gauges
    }

    /// Forward a raw event into the Assembler. Called by the Poller.
    pub fn ingest_event(&self, event: Value) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.assembler.process_event(event);
    }

    /// One control-loop tick: maintenance, drain, score-before-learn, window
    /// trim, then publish gauges. See `SPEC_FULL.md` §4.4.
    pub fn tick(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        inner.assembler.maintenance();
        self.gauges.active_traces.store(inner.assembler.active_count() as u64, Ordering::Relaxed);

        let finalized = inner.assembler.drain_finalized();
        for trace in finalized {
            let score = inner.engine.score_trace(&trace.events);
            inner.history.push(score);
            inner.engine.add_trace(&trace.events);
            if inner.engine.window_size() > self.window_capacity {
                inner.engine.expire_oldest();
            }
        }

        let window_size = inner.engine.window_size() as u64;
        let ready = inner.engine.window_size() > self.gauges.readiness_threshold;
        let integrity = inner.history.integrity_score();

        self.gauges.window_size.store(window_size, Ordering::Relaxed);
        self.gauges.model_ready.store(ready as u64, Ordering::Relaxed);
        self.gauges.integrity_score.store(integrity.to_bits(), Ordering::Relaxed);
        self.gauges.state_count.store(inner.engine.state_count() as u64, Ordering::Relaxed);
        self.gauges.edge_count.store(inner.engine.edge_count() as u64, Ordering::Relaxed);
        self.gauges.traces_tracked.store(window_size, Ordering::Relaxed);
    }

    /// Mean of the current score history; `0.0` if empty.
    pub fn recent_anomaly_scores_avg(&self) -> f64 {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.history.mean()
    }
}

/// Run the control loop forever at `interval`, honoring `shutdown`.
pub async fn run_control_loop(core: Arc<Core>, mut shutdown: tokio::sync::watch::Receiver<bool>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "control loop started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        core.tick();
    }

    info!("control loop shut down");
}
