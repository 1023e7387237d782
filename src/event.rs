//! Tagged extraction over the loosely-typed upstream audit event.
//!
//! The audit service hands us a `serde_json::Value` map with no fixed schema.
//! Every accessor here degrades to a documented fallback rather than failing;
//! extraction never propagates an error to the caller (see `SPEC_FULL.md` §9).

use serde_json::Value;

/// One state in the Markov chain: `actor:action:outcome`.
pub type State = String;

/// Raw event as handed back by the audit service, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawEvent(pub Value);

impl RawEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.0.get("event_id").and_then(Value::as_str)
    }

    pub fn ts(&self) -> Option<&Value> {
        self.0.get("ts")
    }

    /// Correlation key: `meta.correlation_id` → `correlation_id` → `request_id`.
    pub fn correlation_key(&self) -> Option<String> {
        self.0
            .get("meta")
            .and_then(|meta| meta.get("correlation_id"))
            .and_then(Value::as_str)
            .or_else(|| self.0.get("correlation_id").and_then(Value::as_str))
            .or_else(|| self.0.get("request_id").and_then(Value::as_str))
            .map(str::to_owned)
    }

    fn actor(&self) -> String {
        match self.0.get("principal") {
            Some(Value::Object(_)) => self
                .0
                .get("principal")
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned(),
            Some(Value::String(s)) => {
                if s == "gateway" || s == "audit-service" {
                    "service".to_owned()
                } else {
                    "user".to_owned()
                }
            }
            _ => "unknown".to_owned(),
        }
    }

    fn action(&self) -> String {
        if let Some(action) = self.0.get("action").and_then(Value::as_str) {
            return action.to_owned();
        }
        if let Some(method) = self.0.get("method").and_then(Value::as_str) {
            return method.to_owned();
        }
        if let Some(path) = self
            .0
            .get("http")
            .and_then(|http| http.get("path"))
            .and_then(Value::as_str)
        {
            return normalize_path(path);
        }
        "unknown".to_owned()
    }

    fn outcome(&self) -> String {
        self.0
            .get("outcome")
            .and_then(Value::as_str)
            .unwrap_or("OK")
            .to_owned()
    }

    /// Render the `actor:action:outcome` state for this event.
    ///
    /// Never fails: every source field falls back to `"unknown"`/`"OK"`.
    pub fn state(&self) -> State {
        format!("{}:{}:{}", self.actor(), self.action(), self.outcome())
    }
}

/// Normalise a raw HTTP path before it is allowed into a `State`.
///
/// The two known audit-service routes get friendly names; anything else has
/// its numeric and UUID-shaped segments collapsed to `:id` so that per-request
/// identifiers don't leak into the state space and inflate the smoothing
/// denominator (`SPEC_FULL.md` §9, decision D1).
fn normalize_path(path: &str) -> String {
    match path {
        "/api/events" => return "emit_audit".to_owned(),
        "/mcp/tools" => return "tool_use".to_owned(),
        _ => {}
    }

    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                segment.to_owned()
            } else if is_numeric_segment(segment) || is_uuid_segment(segment) {
                ":id".to_owned()
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

fn is_uuid_segment(segment: &str) -> bool {
    let groups: Vec<&str> = segment.split('-').collect();
    let expected_lens = [8, 4, 4, 4, 12];
    groups.len() == expected_lens.len()
        && groups
            .iter()
            .zip(expected_lens)
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlation_key_prefers_meta_then_top_level_then_request_id() {
        let event = RawEvent(json!({"meta": {"correlation_id": "A"}, "request_id": "B"}));
        assert_eq!(event.correlation_key().as_deref(), Some("A"));

        let event = RawEvent(json!({"correlation_id": "A", "request_id": "B"}));
        assert_eq!(event.correlation_key().as_deref(), Some("A"));

        let event = RawEvent(json!({"request_id": "B"}));
        assert_eq!(event.correlation_key().as_deref(), Some("B"));

        let event = RawEvent(json!({}));
        assert_eq!(event.correlation_key(), None);
    }

    #[test]
    fn actor_maps_principal_mapping_and_string() {
        let event = RawEvent(json!({"principal": {"type": "user"}}));
        assert_eq!(event.actor(), "user");

        let event = RawEvent(json!({"principal": "gateway"}));
        assert_eq!(event.actor(), "service");

        let event = RawEvent(json!({"principal": "audit-service"}));
        assert_eq!(event.actor(), "service");

        let event = RawEvent(json!({"principal": "alice"}));
        assert_eq!(event.actor(), "user");

        let event = RawEvent(json!({}));
        assert_eq!(event.actor(), "unknown");
    }

    #[test]
    fn action_falls_back_through_method_then_http_path() {
        let event = RawEvent(json!({"action": "login"}));
        assert_eq!(event.action(), "login");

        let event = RawEvent(json!({"method": "GET"}));
        assert_eq!(event.action(), "GET");

        let event = RawEvent(json!({"http": {"path": "/api/events"}}));
        assert_eq!(event.action(), "emit_audit");

        let event = RawEvent(json!({"http": {"path": "/mcp/tools"}}));
        assert_eq!(event.action(), "tool_use");

        let event = RawEvent(json!({}));
        assert_eq!(event.action(), "unknown");
    }

    #[test]
    fn action_normalises_numeric_and_uuid_path_segments() {
        let event = RawEvent(json!({"http": {"path": "/users/1234/orders"}}));
        assert_eq!(event.action(), "/users/:id/orders");

        let event = RawEvent(json!({
            "http": {"path": "/sessions/550e8400-e29b-41d4-a716-446655440000"}
        }));
        assert_eq!(event.action(), "/sessions/:id");
    }

    #[test]
    fn state_renders_actor_action_outcome_triple() {
        let event = RawEvent(json!({
            "principal": {"type": "user"},
            "action": "login",
            "outcome": "OK"
        }));
        assert_eq!(event.state(), "user:login:OK");

        let event = RawEvent(json!({}));
        assert_eq!(event.state(), "unknown:unknown:OK");
    }
}
