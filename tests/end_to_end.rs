use aiops_sentinel::core::Core;
use serde_json::{json, Value};

fn event(correlation_field: &str, correlation: &str, event_id: &str, ts: i64) -> Value {
    json!({correlation_field: correlation, "event_id": event_id, "ts": ts})
}

fn meta_event(correlation: &str, request_id: &str, event_id: &str, ts: i64) -> Value {
    json!({"meta": {"correlation_id": correlation}, "request_id": request_id, "event_id": event_id, "ts": ts})
}

#[test]
fn correlation_precedence_collides_both_events_into_one_trace() {
    let core = Core::new(10_000, 60.0, 0.5, 2_000, 100, 1);
    core.ingest_event(meta_event("A", "B", "e1", 1));
    core.ingest_event(event("request_id", "A", "e2", 2));

    core.tick();
    assert_eq!(core.gauges().active_traces(), 1);
}

#[test]
fn eviction_finalizes_the_oldest_trace_when_over_capacity() {
    let core = Core::new(2, 60.0, 0.5, 2_000, 100, 1);
    core.ingest_event(event("correlation_id", "t1", "e1", 1));
    std::thread::sleep(std::time::Duration::from_millis(5));
    core.ingest_event(event("correlation_id", "t2", "e2", 2));
    std::thread::sleep(std::time::Duration::from_millis(5));
    core.ingest_event(event("correlation_id", "t3", "e3", 3));

    core.tick();

    assert_eq!(core.gauges().active_traces(), 2);
    assert_eq!(core.gauges().window_size(), 1);
}

#[test]
fn ttl_expiry_finalizes_an_idle_trace_on_the_next_tick() {
    let core = Core::new(10_000, 0.05, 0.5, 2_000, 100, 1);
    core.ingest_event(event("correlation_id", "t1", "e1", 1));
    std::thread::sleep(std::time::Duration::from_millis(100));

    core.tick();

    assert_eq!(core.gauges().active_traces(), 0);
    assert_eq!(core.gauges().window_size(), 1);
}

#[test]
fn anomaly_detection_scores_unseen_transition_higher() {
    use aiops_sentinel::markov::MarkovEngine;

    let mut engine = MarkovEngine::new(0.5, 2_000);
    let normal = vec![
        json!({"principal": {"type": "A"}, "action": "act", "outcome": "OK"}),
        json!({"principal": {"type": "B"}, "action": "act", "outcome": "OK"}),
    ];
    for _ in 0..10 {
        engine.add_trace(&normal);
    }

    let anomaly = vec![
        json!({"principal": {"type": "A"}, "action": "act", "outcome": "OK"}),
        json!({"principal": {"type": "C"}, "action": "act", "outcome": "OK"}),
    ];

    assert!(engine.score_trace(&anomaly) > engine.score_trace(&normal));
}

#[test]
fn sliding_window_symmetry_returns_counts_to_baseline_after_expiry() {
    use aiops_sentinel::markov::MarkovEngine;

    let mut engine = MarkovEngine::new(0.5, 2_000);
    let trace = vec![
        json!({"principal": {"type": "A"}, "action": "act", "outcome": "OK"}),
        json!({"principal": {"type": "B"}, "action": "act", "outcome": "OK"}),
    ];

    let probability_before = engine.get_probability("A:act:OK", "B:act:OK");
    engine.add_trace(&trace);
    engine.expire_oldest();
    let probability_after = engine.get_probability("A:act:OK", "B:act:OK");

    assert_eq!(probability_before, probability_after);
    assert_eq!(engine.edge_count(), 0);
}

#[tokio::test]
async fn health_and_integrity_endpoints_return_well_formed_json_before_and_after_readiness() {
    use aiops_sentinel::http;
    use std::sync::Arc;

    let core = Arc::new(Core::new(10_000, 60.0, 0.5, 2_000, 100, 1));
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let bound = tokio::net::TcpListener::bind("127.0.0.1:0").await;
    assert!(bound.is_ok());
    let Ok(listener) = bound else { return };
    let Ok(addr) = listener.local_addr() else { return };
    drop(listener);

    let serve_core = core.clone();
    let serve_addr = addr.to_string();
    let serve_rx = rx.clone();
    tokio::spawn(async move {
        let _ = http::serve(serve_core, &serve_addr, serve_rx).await;
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let health_response = client.get(format!("http://{addr}/health")).send().await;
    assert!(health_response.is_ok());
    if let Ok(response) = health_response {
        let body: Result<Value, _> = response.json().await;
        assert!(body.is_ok());
        if let Ok(body) = body {
            assert_eq!(body["status"], "ok");
        }
    }

    core.ingest_event(event("correlation_id", "t1", "e1", 1));
    core.tick();

    let integrity_response = client.get(format!("http://{addr}/metrics/integrity")).send().await;
    assert!(integrity_response.is_ok());
    if let Ok(response) = integrity_response {
        let body: Result<Value, _> = response.json().await;
        assert!(body.is_ok());
        if let Ok(body) = body {
            assert!(body["integrity_score"].is_number());
        }
    }
}
