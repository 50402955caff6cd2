//! Latency prediction from per-accelerator coefficients.
//!
//! Each replica is modeled as a single-queue server. Prefill work (one
//! burst per request) drives time-to-first-token through queueing delay;
//! decode work (token-by-token, batched across concurrent sequences)
//! drives inter-token latency.
//!
//! Queueing uses the M/M/1-style wait factor rho/(1-rho) on the prefill
//! stage. This is an approximation of the serving runtime's real behavior
//! and should be validated against reference measurements per accelerator
//! before the coefficients are trusted for tight SLOs.
//!
//! Load is assumed to spread evenly across replicas. That is a modeling
//! simplification, not a load-balancer guarantee.

use serde::{Deserialize, Serialize};

use inferscale_state::PerfProfile;

/// Predicted latencies for one (replica count, load) combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyEstimate {
    /// Predicted time-to-first-token, milliseconds. `f64::INFINITY` when
    /// the replica count cannot keep up with the arrival rate.
    pub ttft_ms: f64,
    /// Predicted inter-token latency, milliseconds.
    pub itl_ms: f64,
}

impl LatencyEstimate {
    /// Whether a prediction meets the given targets.
    pub fn within(&self, ttft_target_ms: f64, itl_target_ms: f64) -> bool {
        self.ttft_ms <= ttft_target_ms && self.itl_ms <= itl_target_ms
    }
}

/// Predict TTFT and ITL for a hypothetical replica count.
///
/// Callers guarantee `replicas >= 1` and `arrival_rate >= 0`; the
/// optimizer owns those checks, not this function.
pub fn predict(
    replicas: u32,
    arrival_rate: f64,
    avg_prompt_tokens: f64,
    avg_gen_tokens: f64,
    perf: &PerfProfile,
    max_batch_size: u32,
) -> LatencyEstimate {
    debug_assert!(replicas >= 1);
    debug_assert!(arrival_rate >= 0.0);

    let prefill_ms = perf.prefill.service_ms(avg_prompt_tokens);
    let decode_ms = perf.decode.service_ms(avg_gen_tokens);

    // One decode step advances every sequence in the batch by one token.
    let itl_ms = decode_ms / max_batch_size.max(1) as f64;

    let per_replica_rate = arrival_rate / replicas as f64;
    let rho = per_replica_rate * prefill_ms / 1000.0;

    let ttft_ms = if rho >= 1.0 {
        // Saturated: the queue grows without bound at this count.
        f64::INFINITY
    } else {
        prefill_ms + (rho / (1.0 - rho)) * prefill_ms
    };

    LatencyEstimate { ttft_ms, itl_ms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferscale_state::LinearCoefficients;

    fn profile() -> PerfProfile {
        PerfProfile {
            decode: LinearCoefficients {
                base_ms: 20.58,
                per_token_ms: 0.41,
            },
            prefill: LinearCoefficients {
                base_ms: 20.58,
                per_token_ms: 0.041,
            },
        }
    }

    #[test]
    fn idle_load_predicts_bare_service_time() {
        let est = predict(1, 0.0, 512.0, 128.0, &profile(), 8);
        // No queueing at zero arrival rate: TTFT is one prefill pass.
        let prefill = 20.58 + 0.041 * 512.0;
        assert!((est.ttft_ms - prefill).abs() < 1e-9);
        let decode = 20.58 + 0.41 * 128.0;
        assert!((est.itl_ms - decode / 8.0).abs() < 1e-9);
    }

    #[test]
    fn queueing_delay_grows_with_load() {
        let light = predict(4, 1.0, 512.0, 128.0, &profile(), 8);
        let heavy = predict(4, 80.0, 512.0, 128.0, &profile(), 8);
        assert!(heavy.ttft_ms > light.ttft_ms);
    }

    #[test]
    fn saturation_is_infinite() {
        // prefill ≈ 41.6ms → one replica saturates near 24 req/s.
        let est = predict(1, 30.0, 512.0, 128.0, &profile(), 8);
        assert!(est.ttft_ms.is_infinite());
        // More replicas bring it back to finite territory.
        let est = predict(4, 30.0, 512.0, 128.0, &profile(), 8);
        assert!(est.ttft_ms.is_finite());
    }

    #[test]
    fn ttft_is_monotone_in_replicas() {
        let mut prev = f64::INFINITY;
        for replicas in 1..=32 {
            let est = predict(replicas, 50.0, 512.0, 128.0, &profile(), 8);
            assert!(
                est.ttft_ms <= prev,
                "ttft rose from {prev} to {} at {replicas} replicas",
                est.ttft_ms
            );
            prev = est.ttft_ms;
        }
    }

    #[test]
    fn itl_is_monotone_in_replicas() {
        let mut prev = f64::INFINITY;
        for replicas in 1..=32 {
            let est = predict(replicas, 50.0, 512.0, 128.0, &profile(), 8);
            assert!(est.itl_ms <= prev);
            prev = est.itl_ms;
        }
    }

    #[test]
    fn longer_prompts_cost_more_ttft() {
        let short = predict(2, 10.0, 128.0, 128.0, &profile(), 8);
        let long = predict(2, 10.0, 2048.0, 128.0, &profile(), 8);
        assert!(long.ttft_ms > short.ttft_ms);
    }

    #[test]
    fn within_checks_both_targets() {
        let est = LatencyEstimate {
            ttft_ms: 100.0,
            itl_ms: 10.0,
        };
        assert!(est.within(200.0, 20.0));
        assert!(!est.within(50.0, 20.0));
        assert!(!est.within(200.0, 5.0));

        let saturated = LatencyEstimate {
            ttft_ms: f64::INFINITY,
            itl_ms: 10.0,
        };
        assert!(!saturated.within(f64::MAX, 20.0));
    }
}
