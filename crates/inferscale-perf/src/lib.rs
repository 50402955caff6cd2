//! inferscale-perf — the performance model behind replica decisions.
//!
//! Two pure pieces: `latency` predicts TTFT and ITL for a hypothetical
//! replica count from per-accelerator linear coefficients, and `optimizer`
//! scans replica counts for the smallest one that meets a workload's SLO
//! targets. Neither piece touches I/O, time, or state; everything is
//! deterministic and unit-testable in isolation.

pub mod latency;
pub mod optimizer;

pub use latency::{LatencyEstimate, predict};
pub use optimizer::{DEFAULT_SEARCH_CEILING, Recommendation, optimize};
