//! Scale-to-zero lifecycle state machine.
//!
//! Tracks, per workload, whether zero replicas is currently permissible.
//! The machine never picks a replica count itself; it emits a policy
//! verdict (may the count be overridden to zero, and what floor applies)
//! that the reconciler combines with the optimizer's recommendation.
//!
//! Phases:
//! - `Bootstrap`: just registered or just recreated, no reliable load
//!   history. Exits to `Active` on the first loaded cycle, or is forced
//!   out once a grace window (one retention period) elapses.
//! - `Active`: load observed within the current cycle.
//! - `Retaining`: load dropped to zero less than one retention period ago.
//! - `Idle`: a full retention period passed with zero load and
//!   scale-to-zero is enabled; eligible for zero replicas.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use inferscale_config::ModelConfig;

/// Lifecycle phase of a managed workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Bootstrap,
    Active,
    Retaining,
    Idle,
}

/// Policy verdict consumed by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyVerdict {
    /// Phase after this cycle's observation.
    pub phase: Phase,
    /// Whether the final allocation may be overridden to zero.
    pub may_scale_to_zero: bool,
    /// Minimum replicas the lifecycle imposes this cycle (0 or 1).
    pub floor_replicas: u32,
}

/// Per-workload lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    pub phase: Phase,
    /// Unix timestamp of the last cycle that observed load.
    pub last_active_at: u64,
    /// Unix timestamp when the current phase was entered.
    pub entered_at: u64,
}

impl LifecycleState {
    /// Fresh state for a just-registered or just-recreated workload.
    pub fn bootstrap(now: u64) -> Self {
        Self {
            phase: Phase::Bootstrap,
            last_active_at: now,
            entered_at: now,
        }
    }

    fn enter(&mut self, phase: Phase, now: u64) {
        debug!(from = ?self.phase, to = ?phase, "lifecycle transition");
        self.phase = phase;
        self.entered_at = now;
    }

    /// Advance the machine by one cycle's observation.
    ///
    /// At most one transition happens per observation; a workload whose
    /// bootstrap grace expires becomes `Active` this cycle and, if still
    /// unloaded, `Retaining` on the next.
    pub fn observe(&mut self, has_load: bool, cfg: &ModelConfig, now: u64) -> PolicyVerdict {
        match self.phase {
            Phase::Bootstrap => {
                if has_load {
                    self.enter(Phase::Active, now);
                    self.last_active_at = now;
                } else if now.saturating_sub(self.entered_at) >= cfg.retention_period_secs {
                    // Grace expired with no traffic. Treating the exit as
                    // "active now" guarantees one more retention period of
                    // warm replicas before Idle is reachable.
                    self.enter(Phase::Active, now);
                    self.last_active_at = now;
                }
            }
            Phase::Active => {
                if has_load {
                    self.last_active_at = now;
                } else {
                    self.enter(Phase::Retaining, now);
                }
            }
            Phase::Retaining => {
                if has_load {
                    self.enter(Phase::Active, now);
                    self.last_active_at = now;
                } else if cfg.enable_scale_to_zero
                    && now.saturating_sub(self.last_active_at) >= cfg.retention_period_secs
                {
                    self.enter(Phase::Idle, now);
                }
            }
            Phase::Idle => {
                if has_load {
                    self.enter(Phase::Active, now);
                    self.last_active_at = now;
                } else if !cfg.enable_scale_to_zero {
                    // Policy flipped while idle: zero is no longer allowed.
                    self.enter(Phase::Retaining, now);
                }
            }
        }
        self.verdict()
    }

    fn verdict(&self) -> PolicyVerdict {
        let idle = self.phase == Phase::Idle;
        PolicyVerdict {
            phase: self.phase,
            may_scale_to_zero: idle,
            floor_replicas: if idle { 0 } else { 1 },
        }
    }
}

/// Keyed store of lifecycle state, one record per workload.
///
/// The outer map lock is held only for entry lookup/insertion; each
/// workload's state sits behind its own mutex, so evaluations of
/// different workloads never serialize on one another.
#[derive(Default)]
pub struct LifecycleTracker {
    states: RwLock<HashMap<String, Arc<Mutex<LifecycleState>>>>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, workload_id: &str, now: u64) -> Arc<Mutex<LifecycleState>> {
        if let Some(slot) = self.states.read().await.get(workload_id) {
            return slot.clone();
        }
        let mut states = self.states.write().await;
        states
            .entry(workload_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LifecycleState::bootstrap(now))))
            .clone()
    }

    /// Observe one cycle for a workload, creating a `Bootstrap` record on
    /// first sight.
    pub async fn observe(
        &self,
        workload_id: &str,
        has_load: bool,
        cfg: &ModelConfig,
        now: u64,
    ) -> PolicyVerdict {
        let slot = self.slot(workload_id, now).await;
        let mut state = slot.lock().await;
        state.observe(has_load, cfg, now)
    }

    /// External recreate signal: restart the machine in `Bootstrap`.
    pub async fn reset(&self, workload_id: &str, now: u64) {
        let mut states = self.states.write().await;
        states.insert(
            workload_id.to_string(),
            Arc::new(Mutex::new(LifecycleState::bootstrap(now))),
        );
        info!(workload = %workload_id, "lifecycle reset to bootstrap");
    }

    /// Current phase, if the workload has been observed.
    pub async fn phase(&self, workload_id: &str) -> Option<Phase> {
        let slot = {
            let states = self.states.read().await;
            states.get(workload_id).cloned()
        };
        match slot {
            Some(s) => Some(s.lock().await.phase),
            None => None,
        }
    }

    /// Discard state for workloads no longer registered; they will be
    /// rebuilt in `Bootstrap` if observed again.
    pub async fn prune(&self, known: &HashSet<String>) {
        self.states
            .write()
            .await
            .retain(|id, _| known.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(enable: bool, retention: u64) -> ModelConfig {
        ModelConfig {
            enable_scale_to_zero: enable,
            retention_period_secs: retention,
        }
    }

    #[test]
    fn bootstrap_activates_on_first_load() {
        let mut state = LifecycleState::bootstrap(100);
        let verdict = state.observe(true, &cfg(true, 120), 130);
        assert_eq!(verdict.phase, Phase::Active);
        assert_eq!(state.last_active_at, 130);
        assert_eq!(verdict.floor_replicas, 1);
        assert!(!verdict.may_scale_to_zero);
    }

    #[test]
    fn bootstrap_holds_within_grace() {
        let mut state = LifecycleState::bootstrap(100);
        let verdict = state.observe(false, &cfg(true, 120), 150);
        assert_eq!(verdict.phase, Phase::Bootstrap);
        assert_eq!(verdict.floor_replicas, 1);
    }

    #[test]
    fn bootstrap_forced_out_after_grace() {
        let mut state = LifecycleState::bootstrap(100);
        let verdict = state.observe(false, &cfg(true, 120), 220);
        assert_eq!(verdict.phase, Phase::Active);
        // The forced exit counts as activity: a full retention period must
        // still elapse before the workload can go idle.
        assert_eq!(state.last_active_at, 220);
    }

    #[test]
    fn active_to_retaining_on_zero_load() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(true, 120), 100);
        let verdict = state.observe(false, &cfg(true, 120), 130);
        assert_eq!(verdict.phase, Phase::Retaining);
        assert_eq!(state.last_active_at, 100);
        assert_eq!(verdict.floor_replicas, 1);
    }

    #[test]
    fn retaining_back_to_active_refreshes_timestamp() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(true, 120), 100);
        state.observe(false, &cfg(true, 120), 130);
        let verdict = state.observe(true, &cfg(true, 120), 160);
        assert_eq!(verdict.phase, Phase::Active);
        assert_eq!(state.last_active_at, 160);
    }

    #[test]
    fn retaining_to_idle_after_retention() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(true, 120), 100);
        state.observe(false, &cfg(true, 120), 130);

        // 90 seconds since last activity: still retaining.
        let verdict = state.observe(false, &cfg(true, 120), 190);
        assert_eq!(verdict.phase, Phase::Retaining);

        // 120 seconds since last activity: idle, zero permitted.
        let verdict = state.observe(false, &cfg(true, 120), 220);
        assert_eq!(verdict.phase, Phase::Idle);
        assert!(verdict.may_scale_to_zero);
        assert_eq!(verdict.floor_replicas, 0);
    }

    #[test]
    fn disabled_scale_to_zero_never_idles() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(false, 120), 100);
        state.observe(false, &cfg(false, 120), 130);

        // Far beyond the retention period; still retaining.
        let verdict = state.observe(false, &cfg(false, 120), 100_000);
        assert_eq!(verdict.phase, Phase::Retaining);
        assert_eq!(verdict.floor_replicas, 1);
        assert!(!verdict.may_scale_to_zero);
    }

    #[test]
    fn idle_reactivates_on_load() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(true, 120), 100);
        state.observe(false, &cfg(true, 120), 130);
        state.observe(false, &cfg(true, 120), 220);
        assert_eq!(state.phase, Phase::Idle);

        let verdict = state.observe(true, &cfg(true, 120), 300);
        assert_eq!(verdict.phase, Phase::Active);
        assert_eq!(state.last_active_at, 300);
    }

    #[test]
    fn idle_falls_back_when_policy_disabled() {
        let mut state = LifecycleState::bootstrap(0);
        state.observe(true, &cfg(true, 120), 100);
        state.observe(false, &cfg(true, 120), 130);
        state.observe(false, &cfg(true, 120), 220);
        assert_eq!(state.phase, Phase::Idle);

        let verdict = state.observe(false, &cfg(false, 120), 250);
        assert_eq!(verdict.phase, Phase::Retaining);
        assert_eq!(verdict.floor_replicas, 1);
    }

    #[test]
    fn never_loaded_workload_stays_warm_for_two_windows() {
        // Grace (one retention) + retaining (one retention) before Idle.
        let mut state = LifecycleState::bootstrap(0);
        let c = cfg(true, 120);

        assert_eq!(state.observe(false, &c, 60).phase, Phase::Bootstrap);
        assert_eq!(state.observe(false, &c, 120).phase, Phase::Active);
        assert_eq!(state.observe(false, &c, 180).phase, Phase::Retaining);
        assert_eq!(state.observe(false, &c, 230).phase, Phase::Retaining);
        assert_eq!(state.observe(false, &c, 240).phase, Phase::Idle);
    }

    #[tokio::test]
    async fn tracker_creates_bootstrap_on_first_sight() {
        let tracker = LifecycleTracker::new();
        assert_eq!(tracker.phase("ns/w").await, None);

        let verdict = tracker.observe("ns/w", false, &cfg(true, 120), 100).await;
        assert_eq!(verdict.phase, Phase::Bootstrap);
        assert_eq!(tracker.phase("ns/w").await, Some(Phase::Bootstrap));
    }

    #[tokio::test]
    async fn tracker_reset_rebuilds_bootstrap() {
        let tracker = LifecycleTracker::new();
        tracker.observe("ns/w", true, &cfg(true, 120), 100).await;
        assert_eq!(tracker.phase("ns/w").await, Some(Phase::Active));

        tracker.reset("ns/w", 200).await;
        assert_eq!(tracker.phase("ns/w").await, Some(Phase::Bootstrap));
    }

    #[tokio::test]
    async fn tracker_prune_discards_unknown() {
        let tracker = LifecycleTracker::new();
        tracker.observe("ns/a", true, &cfg(true, 120), 100).await;
        tracker.observe("ns/b", true, &cfg(true, 120), 100).await;

        let known: HashSet<String> = ["ns/a".to_string()].into_iter().collect();
        tracker.prune(&known).await;

        assert_eq!(tracker.phase("ns/a").await, Some(Phase::Active));
        assert_eq!(tracker.phase("ns/b").await, None);
    }
}
