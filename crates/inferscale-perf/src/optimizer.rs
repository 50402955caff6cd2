//! Minimal-replica search.
//!
//! Predicted TTFT and ITL are non-increasing in the replica count for a
//! fixed load, so the smallest SLO-satisfying count is found by a linear
//! scan from 1 upward. Zero is never returned here: reducing a workload to
//! zero replicas is a lifecycle decision, not a performance one.

use tracing::trace;

use inferscale_metrics::MetricSample;
use inferscale_state::WorkloadSpec;

use crate::latency::predict;

/// Search ceiling applied when a workload sets no `max_replicas`.
pub const DEFAULT_SEARCH_CEILING: u32 = 64;

/// Outcome of a replica search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    /// Smallest SLO-satisfying count, or the ceiling when none satisfies.
    pub replicas: u32,
    /// False when no count up to the ceiling meets the SLO targets.
    pub feasible: bool,
}

/// Find the minimal replica count meeting the workload's SLO targets.
///
/// With no observed traffic the answer is one warm replica; whether that
/// replica may be taken away entirely is decided downstream by the
/// lifecycle policy.
pub fn optimize(workload: &WorkloadSpec, sample: &MetricSample) -> Recommendation {
    let ceiling = workload
        .max_replicas
        .unwrap_or(DEFAULT_SEARCH_CEILING)
        .max(1);

    if sample.arrival_rate <= 0.0 {
        return Recommendation {
            replicas: 1,
            feasible: true,
        };
    }

    for replicas in 1..=ceiling {
        let est = predict(
            replicas,
            sample.arrival_rate,
            sample.avg_prompt_tokens,
            sample.avg_gen_tokens,
            &workload.perf,
            workload.max_batch_size,
        );
        trace!(
            workload = %workload.id,
            replicas,
            ttft_ms = est.ttft_ms,
            itl_ms = est.itl_ms,
            "candidate evaluated"
        );
        if est.within(workload.slo.ttft_ms, workload.slo.itl_ms) {
            return Recommendation {
                replicas,
                feasible: true,
            };
        }
    }

    Recommendation {
        replicas: ceiling,
        feasible: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferscale_state::{LinearCoefficients, PerfProfile, SloTargets};

    fn test_workload() -> WorkloadSpec {
        WorkloadSpec {
            id: "default/llama".to_string(),
            namespace: "default".to_string(),
            name: "llama".to_string(),
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

    fn sample(arrival_rate: f64) -> MetricSample {
        MetricSample {
            arrival_rate,
            avg_prompt_tokens: 512.0,
            avg_gen_tokens: 128.0,
            observed_ttft_ms: 0.0,
            observed_itl_ms: 0.0,
            timestamp: 1000,
        }
    }

    #[test]
    fn zero_traffic_recommends_one_warm_replica() {
        let rec = optimize(&test_workload(), &sample(0.0));
        assert_eq!(
            rec,
            Recommendation {
                replicas: 1,
                feasible: true
            }
        );
    }

    #[test]
    fn moderate_load_is_feasible() {
        // 20 req/s against ~41.6ms prefill: one replica runs at rho ≈ 0.83,
        // TTFT ≈ 245ms, well under the 2s target.
        let rec = optimize(&test_workload(), &sample(20.0));
        assert_eq!(rec.replicas, 1);
        assert!(rec.feasible);
    }

    #[test]
    fn returns_smallest_satisfying_count() {
        let w = test_workload();
        let s = sample(100.0);
        let rec = optimize(&w, &s);
        assert!(rec.feasible);
        assert!(rec.replicas > 1);

        // Minimality: one replica fewer must violate the SLO.
        let below = predict(
            rec.replicas - 1,
            s.arrival_rate,
            s.avg_prompt_tokens,
            s.avg_gen_tokens,
            &w.perf,
            w.max_batch_size,
        );
        assert!(!below.within(w.slo.ttft_ms, w.slo.itl_ms));
    }

    #[test]
    fn tight_ttft_target_needs_more_replicas() {
        let mut w = test_workload();
        let loose = optimize(&w, &sample(40.0)).replicas;
        w.slo.ttft_ms = 50.0;
        let tight = optimize(&w, &sample(40.0)).replicas;
        assert!(tight > loose);
    }

    #[test]
    fn saturated_model_returns_ceiling_infeasible() {
        let mut w = test_workload();
        // An ITL target below the batched decode step time can never be met.
        w.slo.itl_ms = 0.1;
        w.max_replicas = Some(8);

        let rec = optimize(&w, &sample(20.0));
        assert_eq!(rec.replicas, 8);
        assert!(!rec.feasible);
    }

    #[test]
    fn respects_max_replicas_as_ceiling() {
        let mut w = test_workload();
        w.max_replicas = Some(2);
        // Load that would want far more than 2 replicas.
        let rec = optimize(&w, &sample(500.0));
        assert_eq!(rec.replicas, 2);
        assert!(!rec.feasible);
    }

    #[test]
    fn default_ceiling_bounds_the_scan() {
        let w = test_workload();
        // Absurd load: scan stops at the default ceiling.
        let rec = optimize(&w, &sample(1.0e9));
        assert_eq!(rec.replicas, DEFAULT_SEARCH_CEILING);
        assert!(!rec.feasible);
    }
}
