//! Prometheus text exposition format.
//!
//! Renders published allocations into the Prometheus text exposition
//! format. The `inferscale_desired_replicas` series is the one consumed by
//! the external horizontal autoscaler; `inferscale_current_replicas`
//! mirrors the runtime-reported state for dashboards.

use inferscale_state::{AllocationStatus, WorkloadSpec};

fn labels(w: &WorkloadSpec) -> String {
    format!(
        "workload=\"{}\",kind=\"{}\",namespace=\"{}\",accelerator=\"{}\"",
        w.name, w.kind, w.namespace, w.accelerator
    )
}

/// Render allocation records for scraping.
///
/// Workloads without a decision yet are omitted from the respective
/// series rather than reported as zero.
pub fn render_prometheus(records: &[(WorkloadSpec, AllocationStatus)]) -> String {
    let mut out = String::new();

    out.push_str("# HELP inferscale_desired_replicas Replica count recommended by the optimizer.\n");
    out.push_str("# TYPE inferscale_desired_replicas gauge\n");
    for (w, status) in records {
        if let Some(desired) = &status.desired {
            out.push_str(&format!(
                "inferscale_desired_replicas{{{}}} {}\n",
                labels(w),
                desired.num_replicas
            ));
        }
    }

    out.push_str("# HELP inferscale_current_replicas Replica count observed from the runtime.\n");
    out.push_str("# TYPE inferscale_current_replicas gauge\n");
    for (w, status) in records {
        if let Some(current) = &status.current {
            out.push_str(&format!(
                "inferscale_current_replicas{{{}}} {}\n",
                labels(w),
                current.num_replicas
            ));
        }
    }

    out
}
