//! Allocation reconciler — one evaluation cycle per tick, per workload.
//!
//! The engine owns the cycle: refresh the scaling policy once, list the
//! registered workloads, then evaluate each in its own task. A workload's
//! evaluation reads only its own spec, lifecycle record, and counters, so
//! workloads proceed fully in parallel; failures are logged per workload
//! and never interrupt the rest of the batch.
//!
//! The published decision (`desired`) is replaced as a whole record in one
//! store transaction, so a cycle interrupted by shutdown can never leave a
//! half-written allocation behind.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use inferscale_config::ConfigProvider;
use inferscale_metrics::{MetricSample, MetricSource, SnapshotCache};
use inferscale_perf::optimize;
use inferscale_state::{
    Allocation, AllocationReason, StateResult, StateStore, WorkloadId, WorkloadSpec,
};

use crate::lifecycle::{LifecycleTracker, Phase};

/// Bound on a single metric fetch; a slow source degrades to "no data"
/// instead of stalling the cycle.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Injectable time source (tests pin this to a counter).
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The allocation decision engine.
///
/// Cheap to clone; all state is shared behind `Arc`s or the store handle.
#[derive(Clone)]
pub struct Engine {
    store: StateStore,
    source: Arc<dyn MetricSource>,
    config: Arc<dyn ConfigProvider>,
    lifecycle: Arc<LifecycleTracker>,
    cache: Arc<SnapshotCache>,
    fetch_timeout: Duration,
    clock: Clock,
}

impl Engine {
    /// Create an engine over the given store, metric source, and policy
    /// provider.
    pub fn new(
        store: StateStore,
        source: Arc<dyn MetricSource>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            store,
            source,
            config,
            lifecycle: Arc::new(LifecycleTracker::new()),
            cache: Arc::new(SnapshotCache::new()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            clock: Arc::new(epoch_secs),
        }
    }

    /// Override the metric fetch timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Override the time source (tests drive retention arithmetic with a
    /// pinned clock).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run one evaluation cycle across all registered workloads.
    ///
    /// Returns the decisions made this cycle. Per-workload failures are
    /// logged and skipped; only a store listing failure aborts the cycle.
    pub async fn reconcile_all(&self) -> anyhow::Result<Vec<(WorkloadId, Allocation)>> {
        if let Err(e) = self.config.refresh() {
            warn!(error = %e, "scaling policy refresh failed; keeping previous entries");
        }

        let workloads = self.store.list_workloads()?;
        let known: HashSet<String> = workloads.iter().map(|w| w.id.clone()).collect();
        self.lifecycle.prune(&known).await;
        self.cache.prune(&known).await;

        let mut handles = Vec::new();
        for workload in workloads {
            if let Err(e) = workload.validate() {
                warn!(workload = %workload.id, error = %e, "invalid spec excluded from cycle");
                continue;
            }
            let engine = self.clone();
            handles.push(tokio::spawn(async move {
                let id = workload.id.clone();
                match engine.evaluate(&workload).await {
                    Ok(alloc) => Some((id, alloc)),
                    Err(e) => {
                        warn!(workload = %id, error = %e, "evaluation failed");
                        None
                    }
                }
            }));
        }

        let mut decisions = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(decision)) => decisions.push(decision),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "evaluation task aborted"),
            }
        }
        Ok(decisions)
    }

    /// Evaluate one workload and publish its desired allocation.
    async fn evaluate(&self, workload: &WorkloadSpec) -> anyhow::Result<Allocation> {
        let now = (self.clock)();
        let cfg = self.config.model_config(&workload.model_id);

        // 1. Latest counters, bounded; absence/failure degrades to no data.
        let counters = match timeout(self.fetch_timeout, self.source.fetch(workload)).await {
            Ok(Ok(counters)) => counters,
            Ok(Err(e)) => {
                warn!(workload = %workload.id, error = %e, "metric fetch failed; treating as no data");
                None
            }
            Err(_) => {
                warn!(
                    workload = %workload.id,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "metric fetch timed out; treating as no data"
                );
                None
            }
        };

        let sample = match counters {
            Some(counters) => self.cache.advance(&workload.id, counters).await,
            None => None,
        };
        let sample = sample.unwrap_or_else(|| MetricSample::idle(now));
        let has_load = sample.arrival_rate > 0.0;

        // 2. Minimal SLO-satisfying count for the observed load.
        let rec = optimize(workload, &sample);
        if !rec.feasible {
            warn!(
                workload = %workload.id,
                ceiling = rec.replicas,
                arrival_rate = sample.arrival_rate,
                "no replica count meets latency targets; holding at ceiling"
            );
        }

        // 3. Temporal policy.
        let verdict = self.lifecycle.observe(&workload.id, has_load, &cfg, now).await;

        // 4. Raw desired count before operator bounds.
        let raw = if verdict.may_scale_to_zero && !has_load {
            0
        } else {
            rec.replicas.max(verdict.floor_replicas)
        };

        // 5. Operator bounds. min_replicas defaults to zero only when the
        // model may scale to zero at all; otherwise the floor is one.
        let effective_min = match workload.min_replicas {
            Some(min) if cfg.enable_scale_to_zero => min,
            Some(min) => min.max(1),
            None if cfg.enable_scale_to_zero => 0,
            None => 1,
        };
        let mut desired = raw.max(effective_min);
        if let Some(max) = workload.max_replicas {
            desired = desired.min(max);
        }

        // 6. Attribute the value to the rule that produced it.
        let reason = if desired > raw {
            AllocationReason::MinReplicasEnforced
        } else if desired == 0 {
            AllocationReason::ScaleToZero
        } else if !has_load && verdict.phase == Phase::Retaining {
            AllocationReason::RetentionPeriodActive
        } else if verdict.phase == Phase::Bootstrap {
            AllocationReason::Bootstrap
        } else {
            AllocationReason::OptimizerRecommendation
        };

        // 7. Atomic replace of the desired allocation.
        let alloc = Allocation {
            num_replicas: desired,
            reason,
            updated_at: now,
        };
        self.store.update_desired(&workload.id, alloc)?;
        debug!(
            workload = %workload.id,
            replicas = desired,
            reason = ?reason,
            phase = ?verdict.phase,
            "desired allocation published"
        );
        Ok(alloc)
    }

    /// Runtime feedback: record the externally observed replica count.
    pub fn record_observed(&self, workload_id: &str, replicas: u32) -> StateResult<()> {
        self.store
            .set_observed_replicas(workload_id, replicas, (self.clock)())
    }

    /// External recreate signal: restart lifecycle and metric history.
    pub async fn reset_workload(&self, workload_id: &str) {
        self.lifecycle.reset(workload_id, (self.clock)()).await;
        self.cache.reset(workload_id).await;
    }

    /// Current lifecycle phase for a workload, if observed.
    pub async fn phase(&self, workload_id: &str) -> Option<Phase> {
        self.lifecycle.phase(workload_id).await
    }

    /// Run the periodic evaluation loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "allocation engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.reconcile_all().await {
                        Ok(decisions) => {
                            debug!(workloads = decisions.len(), "evaluation cycle complete");
                        }
                        Err(e) => tracing::error!(error = %e, "evaluation cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("allocation engine shutting down");
                    break;
                }
            }
        }
    }
}
