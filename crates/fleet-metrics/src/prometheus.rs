//! Prometheus text exposition format.
//!
//! Renders the fleet's current pool sizes, pending demand and the most
//! recent GPU reading for scraping by a Prometheus server.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::probe::ScalingMetrics;

/// Everything `/metrics` exposes.
#[derive(Debug, Default)]
pub struct Exposition {
    pub workers: BTreeMap<String, usize>,
    pub pending_requests: BTreeMap<String, u64>,
    pub last_reading: Option<ScalingMetrics>,
    pub cycles: u64,
}

/// Render an exposition into Prometheus text format.
pub fn render_prometheus(exp: &Exposition) -> String {
    let mut out = String::new();

    out.push_str("# HELP ollama_fleet_workers Registered workers per model.\n");
    out.push_str("# TYPE ollama_fleet_workers gauge\n");
    for (model, n) in &exp.workers {
        let _ = writeln!(out, "ollama_fleet_workers{{model=\"{}\"}} {n}", escape(model));
    }

    out.push_str(
        "# HELP ollama_fleet_pending_requests Requests recorded since the last scaling cycle.\n",
    );
    out.push_str("# TYPE ollama_fleet_pending_requests gauge\n");
    for (model, n) in &exp.pending_requests {
        let _ = writeln!(
            out,
            "ollama_fleet_pending_requests{{model=\"{}\"}} {n}",
            escape(model)
        );
    }

    out.push_str("# HELP ollama_fleet_scaling_cycles_total Completed scaling cycles.\n");
    out.push_str("# TYPE ollama_fleet_scaling_cycles_total counter\n");
    let _ = writeln!(out, "ollama_fleet_scaling_cycles_total {}", exp.cycles);

    if let Some(m) = exp.last_reading {
        out.push_str("# HELP ollama_fleet_gpu_utilization_percent GPU utilization at the last cycle.\n");
        out.push_str("# TYPE ollama_fleet_gpu_utilization_percent gauge\n");
        let _ = writeln!(
            out,
            "ollama_fleet_gpu_utilization_percent {:.2}",
            m.gpu_utilization_pct
        );

        out.push_str("# HELP ollama_fleet_vram_used_megabytes VRAM used at the last cycle.\n");
        out.push_str("# TYPE ollama_fleet_vram_used_megabytes gauge\n");
        let _ = writeln!(out, "ollama_fleet_vram_used_megabytes {:.0}", m.vram_used_mb);
    }

    out
}

fn escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
