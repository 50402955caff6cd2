//! inferscale-metrics — load signals for the decision engine.
//!
//! Serving runtimes expose cumulative counters (request successes, token
//! sums, latency sums). This crate turns two such snapshots into per-cycle
//! rates and averages, caches the previous snapshot per workload so deltas
//! can be computed without a time-series database, defines the
//! `MetricSource` boundary the engine pulls through, and renders published
//! allocations in Prometheus text format for the external autoscaler.

pub mod deriver;
pub mod prometheus;
pub mod source;

pub use deriver::{MetricSample, RawCounters, SnapshotCache, derive};
pub use prometheus::render_prometheus;
pub use source::{FetchFuture, MetricSource, PushMetricSource};
