//! Metric source boundary.
//!
//! The engine pulls the latest cumulative counters per workload through
//! `MetricSource` once per evaluation cycle. How counters get here (scrape
//! transport, wire format) is the collaborator's concern; the shipped
//! implementation is a push target an external scraper feeds over the API.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;
use tracing::debug;

use inferscale_state::WorkloadSpec;

use crate::deriver::RawCounters;

/// Boxed fetch future, so `MetricSource` stays object-safe.
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Option<RawCounters>>> + Send + 'a>>;

/// Read-only source of raw counters, keyed by workload identity.
///
/// `Ok(None)` means the metrics backend has not observed the workload yet;
/// callers treat it as zero load, not as an error.
pub trait MetricSource: Send + Sync {
    fn fetch<'a>(&'a self, workload: &'a WorkloadSpec) -> FetchFuture<'a>;
}

/// In-process metric source fed by counter pushes.
///
/// Holds only the most recent snapshot per workload; delta computation
/// against the previous cycle happens in the engine's `SnapshotCache`.
#[derive(Default)]
pub struct PushMetricSource {
    latest: RwLock<HashMap<String, RawCounters>>,
}

impl PushMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest counter snapshot for a workload.
    pub async fn ingest(&self, workload_id: &str, counters: RawCounters) {
        debug!(workload = %workload_id, timestamp = counters.timestamp, "counters ingested");
        self.latest
            .write()
            .await
            .insert(workload_id.to_string(), counters);
    }

    /// Drop a workload's snapshot (deregistration or recreate).
    pub async fn clear(&self, workload_id: &str) {
        self.latest.write().await.remove(workload_id);
    }
}

impl MetricSource for PushMetricSource {
    fn fetch<'a>(&'a self, workload: &'a WorkloadSpec) -> FetchFuture<'a> {
        Box::pin(async move { Ok(self.latest.read().await.get(&workload.id).copied()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferscale_state::{LinearCoefficients, PerfProfile, SloTargets};

    fn test_workload(id: &str) -> WorkloadSpec {
        let (namespace, name) = id.split_once('/').unwrap();
        WorkloadSpec {
            id: id.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: "Deployment".to_string(),
            model_id: "llama-3-70b".to_string(),
            accelerator: "A100".to_string(),
            accelerators_per_replica: 4,
            slo: SloTargets {
                ttft_ms: 2000.0,
                itl_ms: 500.0,
            },
            perf: PerfProfile {
                decode: LinearCoefficients {
                    base_ms: 20.58,
                    per_token_ms: 0.41,
                },
                prefill: LinearCoefficients {
                    base_ms: 20.58,
                    per_token_ms: 0.041,
                },
            },
            max_batch_size: 8,
            min_replicas: None,
            max_replicas: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn counters(timestamp: u64) -> RawCounters {
        RawCounters {
            timestamp,
            success_total: 100,
            prompt_tokens_sum: 51200.0,
            prompt_tokens_count: 100,
            gen_tokens_sum: 12800.0,
            gen_tokens_count: 100,
            ttft_ms_sum: 25000.0,
            ttft_count: 100,
            tpot_ms_sum: 3000.0,
            tpot_count: 100,
        }
    }

    #[tokio::test]
    async fn fetch_unknown_workload_is_none() {
        let source = PushMetricSource::new();
        let w = test_workload("default/llama");
        assert!(source.fetch(&w).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ingest_then_fetch() {
        let source = PushMetricSource::new();
        let w = test_workload("default/llama");

        source.ingest("default/llama", counters(100)).await;
        let fetched = source.fetch(&w).await.unwrap().unwrap();
        assert_eq!(fetched.timestamp, 100);

        // Newer push replaces the snapshot.
        source.ingest("default/llama", counters(160)).await;
        let fetched = source.fetch(&w).await.unwrap().unwrap();
        assert_eq!(fetched.timestamp, 160);
    }

    #[tokio::test]
    async fn clear_removes_snapshot() {
        let source = PushMetricSource::new();
        let w = test_workload("default/llama");
        source.ingest("default/llama", counters(100)).await;
        source.clear("default/llama").await;
        assert!(source.fetch(&w).await.unwrap().is_none());
    }
}
