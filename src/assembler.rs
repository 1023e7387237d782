//! Trace assembly: groups audit events by correlation key into bounded,
//! time-limited buffers and finalizes them into a drain queue.

use std::collections::HashMap;
use std::time::Instant;

use chrono::DateTime;
use serde_json::Value;

use crate::event::RawEvent;

/// Best-effort conversion of a `ts` field (ISO-8601 string or numeric epoch)
/// into epoch seconds. `None` if the field is absent or unparseable.
fn ts_epoch_seconds(ts: Option<&Value>) -> Option<f64> {
    match ts {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let normalized = s.replace('Z', "+00:00");
            DateTime::parse_from_rfc3339(&normalized)
                .map(|dt| dt.timestamp() as f64 + dt.timestamp_subsec_millis() as f64 / 1000.0)
                .ok()
        }
        _ => None,
    }
}

fn sort_key(event: &Value) -> (f64, String) {
    let raw = RawEvent(event.clone());
    let ts = ts_epoch_seconds(raw.ts()).unwrap_or(0.0);
    let event_id = raw.event_id().unwrap_or("").to_owned();
    (ts, event_id)
}

/// An ordered sequence of events sharing a correlation key.
#[derive(Debug, Clone)]
pub struct Trace {
    pub correlation_key: String,
    pub events: Vec<Value>,
    pub last_updated: Instant,
    pub finalized: bool,
}

impl Trace {
    fn new(correlation_key: String) -> Self {
        Self {
            correlation_key,
            events: Vec::new(),
            last_updated: Instant::now(),
            finalized: false,
        }
    }

    fn add(&mut self, event: Value) {
        self.events.push(event);
        self.events.sort_by(|a, b| sort_key(a).partial_cmp(&sort_key(b)).unwrap_or(std::cmp::Ordering::Equal));
        self.last_updated = Instant::now();
    }

    /// Elapsed seconds between the first and last event's `ts`.
    ///
    /// Zero for fewer than two events, or if either endpoint's timestamp is
    /// absent or unparseable.
    pub fn duration(&self) -> f64 {
        if self.events.len() < 2 {
            return 0.0;
        }
        let first = RawEvent(self.events[0].clone());
        let last = RawEvent(self.events[self.events.len() - 1].clone());
        let (Some(start), Some(end)) = (ts_epoch_seconds(first.ts()), ts_epoch_seconds(last.ts())) else {
            return 0.0;
        };
        end - start
    }
}

/// Groups raw audit events into correlated traces.
///
/// Enforces memory bounds (`max_traces`, evicting the least-recently-updated
/// trace) and time-based eviction (`trace_ttl`, swept by `maintenance()`).
pub struct TraceAssembler {
    active: HashMap<String, Trace>,
    drain_queue: Vec<Trace>,
    max_traces: usize,
    trace_ttl_secs: f64,
}

impl TraceAssembler {
    pub fn new(max_traces: usize, trace_ttl_secs: f64) -> Self {
        Self {
            active: HashMap::new(),
            drain_queue: Vec::new(),
            max_traces,
            trace_ttl_secs,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Ingest a single raw event, assigning it to a trace by correlation key.
    ///
    /// Events with no resolvable correlation key are dropped silently.
    pub fn process_event(&mut self, event: Value) {
        let raw = RawEvent(event.clone());
        let Some(key) = raw.correlation_key() else {
            return;
        };

        if !self.active.contains_key(&key) {
            if self.active.len() >= self.max_traces {
                self.evict_oldest();
            }
            self.active.insert(key.clone(), Trace::new(key.clone()));
        }

        if let Some(trace) = self.active.get_mut(&key) {
            trace.add(event);
        }
    }

    /// Force-finalize the trace with the smallest `last_updated` (linear scan;
    /// acceptable at the default capacity — see `SPEC_FULL.md` §9 D2).
    fn evict_oldest(&mut self) {
        let oldest_key = self
            .active
            .iter()
            .min_by_key(|(_, trace)| trace.last_updated)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest_key {
            self.finalize(&key);
        }
    }

    fn finalize(&mut self, key: &str) {
        if let Some(mut trace) = self.active.remove(key) {
            trace.finalized = true;
            self.drain_queue.push(trace);
        }
    }

    /// Sweep active traces, finalizing any idle longer than `trace_ttl_secs`.
    pub fn maintenance(&mut self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .active
            .iter()
            .filter(|(_, trace)| now.duration_since(trace.last_updated).as_secs_f64() > self.trace_ttl_secs)
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            self.finalize(&key);
        }
    }

    /// Return and clear the accumulated finalized traces, in finalization order.
    pub fn drain_finalized(&mut self) -> Vec<Trace> {
        std::mem::take(&mut self.drain_queue)
    }
}
