//! Periodic ingestion from the upstream audit service.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::Core;
use crate::cursor::{Cursor, SeenEvents};
use crate::event::RawEvent;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PollError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(#[from] reqwest::Error),
    #[error("upstream rate limited the request")]
    RateLimited,
    #[error("upstream returned an unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    items: Vec<Value>,
}

/// Fetches the newest batch of events from the audit service at a fixed
/// interval, deduplicates by `event_id`, and forwards survivors to the
/// shared [`Core`].
pub struct Poller {
    client: Client,
    audit_service_url: String,
    batch_size: usize,
    seen: SeenEvents,
    cursor: Option<Cursor>,
}

impl Poller {
    pub fn new(
        audit_service_url: String,
        batch_size: usize,
        max_seen_events: usize,
        cursor: Option<Cursor>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
        Ok(Self {
            client,
            audit_service_url,
            batch_size,
            seen: SeenEvents::new(max_seen_events),
            cursor,
        })
    }

    /// Run one poll cycle against `core`.
    ///
    /// `Ok(n)` reports how many new (non-duplicate) events were forwarded.
    /// Backoff on error is the caller's responsibility (see [`run`]).
    pub async fn poll_once(&mut self, core: &Arc<Core>) -> Result<usize, PollError> {
        let url = format!("{}/api/events", self.audit_service_url.trim_end_matches('/'));
        let response = self.client.get(url).query(&[("limit", self.batch_size)]).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(PollError::RateLimited);
        }
        if response.status().is_server_error() {
            return Err(PollError::UnexpectedStatus(response.status()));
        }
        if !response.status().is_success() {
            return Err(PollError::UnexpectedStatus(response.status()));
        }

        let body: EventsResponse = response.json().await?;
        let mut forwarded = 0;

        for event in body.items {
            let raw = RawEvent(event.clone());
            if let Some(event_id) = raw.event_id() {
                if self.seen.check_and_record(event_id) {
                    continue;
                }
                if let Some(cursor) = self.cursor.as_mut() {
                    if let Err(err) = cursor.advance(event_id) {
                        warn!(error = %err, "failed to persist poller cursor");
                    }
                }
            }

            core.ingest_event(event);
            forwarded += 1;
        }

        debug!(forwarded, "poll cycle delivered events to assembler");
        Ok(forwarded)
    }

    /// Run the poll loop forever, honoring `shutdown`.
    pub async fn run(mut self, core: Arc<Core>, mut shutdown: tokio::sync::watch::Receiver<bool>, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "poller started");
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

            match self.poll_once(&core).await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "ingested events from audit service");
                    }
                }
                Err(PollError::RateLimited) => {
                    warn!("audit service rate limited the poller, backing off");
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(err) => {
                    warn!(error = %err, "transient failure polling audit service");
                    tokio::time::sleep(TRANSIENT_BACKOFF).await;
                }
            }
        }

        info!("poller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seen_events_dedup_does_not_double_advance_cursor() {
        let mut seen = SeenEvents::new(10);
        assert!(!seen.check_and_record("e1"));
        assert!(seen.check_and_record("e1"));
    }

    #[test]
    fn events_response_deserializes_items_array() {
        let raw = json!({"items": [{"event_id": "e1"}, {"event_id": "e2"}]});
        let parsed: EventsResponse = serde_json::from_value(raw).unwrap_or(EventsResponse { items: vec![] });
        assert_eq!(parsed.items.len(), 2);
    }
}
