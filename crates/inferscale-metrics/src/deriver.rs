//! Counter-delta derivation.
//!
//! Raw serving metrics arrive as cumulative counters. Rates and averages
//! for one evaluation window are computed from the delta between the
//! previous and current snapshot. Counter resets (a restarted runtime
//! reports smaller cumulative values) yield "no data" for the window, and
//! zero-denominator averages carry the previous window's value forward.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// One scrape of cumulative counters for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCounters {
    /// Unix timestamp (seconds) when the counters were read.
    pub timestamp: u64,
    /// Successfully completed requests.
    pub success_total: u64,
    /// Sum of prompt token counts over all requests.
    pub prompt_tokens_sum: f64,
    /// Number of requests contributing to `prompt_tokens_sum`.
    pub prompt_tokens_count: u64,
    /// Sum of generated token counts over all requests.
    pub gen_tokens_sum: f64,
    /// Number of requests contributing to `gen_tokens_sum`.
    pub gen_tokens_count: u64,
    /// Sum of observed time-to-first-token, milliseconds.
    pub ttft_ms_sum: f64,
    /// Number of requests contributing to `ttft_ms_sum`.
    pub ttft_count: u64,
    /// Sum of observed per-output-token times, milliseconds.
    pub tpot_ms_sum: f64,
    /// Number of samples contributing to `tpot_ms_sum`.
    pub tpot_count: u64,
}

/// Derived load signal for one evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Request arrival rate, requests per second.
    pub arrival_rate: f64,
    pub avg_prompt_tokens: f64,
    pub avg_gen_tokens: f64,
    /// Observed time-to-first-token average, milliseconds.
    pub observed_ttft_ms: f64,
    /// Observed inter-token latency average, milliseconds.
    pub observed_itl_ms: f64,
    /// Unix timestamp (seconds) of the window's end.
    pub timestamp: u64,
}

impl MetricSample {
    /// A zero-load sample for cycles with no usable metric data.
    pub fn idle(timestamp: u64) -> Self {
        Self {
            arrival_rate: 0.0,
            avg_prompt_tokens: 0.0,
            avg_gen_tokens: 0.0,
            observed_ttft_ms: 0.0,
            observed_itl_ms: 0.0,
            timestamp,
        }
    }
}

/// Average over a counter delta, carrying the previous value forward when
/// the window saw no contributing samples.
fn delta_avg(sum_delta: f64, count_delta: u64, carry: f64) -> f64 {
    if count_delta == 0 {
        carry
    } else {
        sum_delta / count_delta as f64
    }
}

/// Derive a `MetricSample` from two counter snapshots taken at t0 < t1.
///
/// Returns `None` ("no data this window") when the snapshots are not in
/// chronological order or any cumulative counter decreased — the latter
/// means the serving runtime restarted and the delta is meaningless.
/// Callers treat `None` as zero load, never as an error.
pub fn derive(
    prev: &RawCounters,
    cur: &RawCounters,
    carry: Option<&MetricSample>,
) -> Option<MetricSample> {
    if cur.timestamp <= prev.timestamp {
        return None;
    }
    let reset = cur.success_total < prev.success_total
        || cur.prompt_tokens_sum < prev.prompt_tokens_sum
        || cur.prompt_tokens_count < prev.prompt_tokens_count
        || cur.gen_tokens_sum < prev.gen_tokens_sum
        || cur.gen_tokens_count < prev.gen_tokens_count
        || cur.ttft_ms_sum < prev.ttft_ms_sum
        || cur.ttft_count < prev.ttft_count
        || cur.tpot_ms_sum < prev.tpot_ms_sum
        || cur.tpot_count < prev.tpot_count;
    if reset {
        return None;
    }

    let window_secs = (cur.timestamp - prev.timestamp) as f64;
    let arrival_rate = (cur.success_total - prev.success_total) as f64 / window_secs;

    let zero = MetricSample::idle(0);
    let carry = carry.unwrap_or(&zero);

    Some(MetricSample {
        arrival_rate,
        avg_prompt_tokens: delta_avg(
            cur.prompt_tokens_sum - prev.prompt_tokens_sum,
            cur.prompt_tokens_count - prev.prompt_tokens_count,
            carry.avg_prompt_tokens,
        ),
        avg_gen_tokens: delta_avg(
            cur.gen_tokens_sum - prev.gen_tokens_sum,
            cur.gen_tokens_count - prev.gen_tokens_count,
            carry.avg_gen_tokens,
        ),
        observed_ttft_ms: delta_avg(
            cur.ttft_ms_sum - prev.ttft_ms_sum,
            cur.ttft_count - prev.ttft_count,
            carry.observed_ttft_ms,
        ),
        observed_itl_ms: delta_avg(
            cur.tpot_ms_sum - prev.tpot_ms_sum,
            cur.tpot_count - prev.tpot_count,
            carry.observed_itl_ms,
        ),
        timestamp: cur.timestamp,
    })
}

/// Per-workload window state.
struct CacheEntry {
    /// Previous raw snapshot (the delta baseline).
    prev: RawCounters,
    /// Last successfully derived sample, for carry-forward averages.
    last_sample: Option<MetricSample>,
}

/// Per-workload cache of the previous counter snapshot.
///
/// The engine owns rate computation end to end: it keeps the previous
/// cycle's raw snapshot here instead of asking a time-series database for
/// precomputed rates.
#[derive(Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll the window for a workload: derive a sample from the cached
    /// previous snapshot and `cur`, then make `cur` the new baseline.
    ///
    /// The first snapshot for a workload returns `None` (no interval yet).
    pub async fn advance(&self, workload_id: &str, cur: RawCounters) -> Option<MetricSample> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(workload_id) {
            Some(entry) => {
                let sample = derive(&entry.prev, &cur, entry.last_sample.as_ref());
                entry.prev = cur;
                if let Some(s) = sample {
                    entry.last_sample = Some(s);
                }
                sample
            }
            None => {
                debug!(workload = %workload_id, "first counter snapshot cached");
                entries.insert(
                    workload_id.to_string(),
                    CacheEntry {
                        prev: cur,
                        last_sample: None,
                    },
                );
                None
            }
        }
    }

    /// Drop a workload's window history (deployment recreated).
    pub async fn reset(&self, workload_id: &str) {
        self.entries.write().await.remove(workload_id);
    }

    /// Discard entries for workloads no longer registered.
    pub async fn prune(&self, known: &HashSet<String>) {
        self.entries
            .write()
            .await
            .retain(|id, _| known.contains(id));
    }
}
