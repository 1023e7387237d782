//! Prometheus text exposition for the three published gauges.

use std::fmt::Write as _;

use crate::core::Core;

/// Render `core`'s current gauges as Prometheus text exposition format.
pub fn to_prometheus_text(core: &Core) -> String {
    let gauges = core.gauges();
    let mut out = String::with_capacity(256);

    write_gauge(&mut out, "aiops_integrity_score", "Current system integrity score in (0, 1]", gauges.integrity_score());
    write_gauge(
        &mut out,
        "aiops_model_ready",
        "Whether the Markov model has absorbed enough traces to be trusted",
        if gauges.model_ready() { 1.0 } else { 0.0 },
    );
    write_gauge(&mut out, "aiops_traces_tracked", "Number of finalized trace sequences in the sliding window", gauges.window_size() as f64);

    out
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: f64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_all_three_gauges_with_type_lines() {
        let core = Core::new(10_000, 60.0, 0.5, 2_000, 100, 100);
        let text = to_prometheus_text(&core);

        for name in ["aiops_integrity_score", "aiops_model_ready", "aiops_traces_tracked"] {
            assert!(text.contains(&format!("# TYPE {name} gauge")));
            assert!(text.contains(&format!("# HELP {name}")));
        }
    }

    #[test]
    fn integrity_gauge_defaults_to_one_before_any_traces() {
        let core = Core::new(10_000, 60.0, 0.5, 2_000, 100, 100);
        let text = to_prometheus_text(&core);
        assert!(text.contains("aiops_integrity_score 1"));
    }
}
