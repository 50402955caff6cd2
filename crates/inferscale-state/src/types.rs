//! Domain types for the InferScale state store.
//!
//! These types describe a managed inference workload (its SLO targets and
//! per-accelerator latency coefficients) and the controller's replica
//! decisions for it. All types are serializable to/from JSON for storage
//! in redb tables and for the REST surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a workload (namespace-scoped).
pub type WorkloadId = String;

// ── Workload ──────────────────────────────────────────────────────

/// Specification for a managed inference deployment.
///
/// Registered by the operator, read-only for the decision engine. The
/// engine never mutates a spec; it only derives allocations from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSpec {
    pub id: WorkloadId,
    pub namespace: String,
    pub name: String,
    /// Kind of the scaled runtime object (publication label for the
    /// external autoscaler), e.g. "Deployment".
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Model identifier served by this deployment; key into the per-model
    /// scaling policy.
    pub model_id: String,
    /// Accelerator class the replicas run on, e.g. "A100", "H100".
    pub accelerator: String,
    /// Accelerators consumed by one replica.
    pub accelerators_per_replica: u32,
    /// Latency service-level objectives.
    pub slo: SloTargets,
    /// Empirical latency coefficients for this model/accelerator pairing.
    pub perf: PerfProfile,
    /// Maximum concurrent sequences one replica batches together.
    pub max_batch_size: u32,
    /// Operator-set lower bound on replicas. Unset means 0, unless
    /// scale-to-zero is disabled for the model (then the floor is 1).
    pub min_replicas: Option<u32>,
    /// Operator-set upper bound on replicas. Unset means no bound beyond
    /// the optimizer's search ceiling.
    pub max_replicas: Option<u32>,
    /// Unix timestamp (seconds) when this spec was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this spec was last updated.
    pub updated_at: u64,
}

fn default_kind() -> String {
    "Deployment".to_string()
}

/// Latency SLO targets for a workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SloTargets {
    /// Max acceptable time-to-first-token, milliseconds.
    pub ttft_ms: f64,
    /// Max acceptable inter-token latency, milliseconds.
    pub itl_ms: f64,
}

/// Linear latency model: `base_ms + per_token_ms * tokens`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinearCoefficients {
    pub base_ms: f64,
    pub per_token_ms: f64,
}

impl LinearCoefficients {
    /// Service time in milliseconds for the given token count.
    pub fn service_ms(&self, tokens: f64) -> f64 {
        self.base_ms + self.per_token_ms * tokens
    }

    fn is_valid(&self) -> bool {
        self.base_ms.is_finite()
            && self.per_token_ms.is_finite()
            && self.base_ms >= 0.0
            && self.per_token_ms >= 0.0
    }
}

/// Per-accelerator latency coefficients for a workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PerfProfile {
    /// Decode stage: base + per-generated-token cost.
    pub decode: LinearCoefficients,
    /// Prefill stage: base + per-prompt-token cost.
    pub prefill: LinearCoefficients,
}

// ── Registration validation ───────────────────────────────────────

/// Rejection causes for a workload registration.
///
/// Validation happens once, at registration time. A spec that passes is
/// never re-validated on the hot path; a spec that fails is excluded from
/// evaluation cycles until corrected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkloadValidationError {
    #[error("namespace and name must be non-empty")]
    EmptyIdentity,

    #[error("model_id must be non-empty")]
    EmptyModelId,

    #[error("SLO targets must be positive and finite")]
    NonPositiveSlo,

    #[error("latency coefficients must be non-negative and finite")]
    InvalidCoefficients,

    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("accelerators_per_replica must be at least 1")]
    ZeroAccelerators,

    #[error("min_replicas {min} exceeds max_replicas {max}")]
    InvertedBounds { min: u32, max: u32 },

    #[error("max_replicas must be at least 1 when set")]
    ZeroMaxReplicas,
}

impl WorkloadSpec {
    /// Build the composite key for the workloads table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Registration-time validation.
    pub fn validate(&self) -> Result<(), WorkloadValidationError> {
        if self.namespace.is_empty() || self.name.is_empty() {
            return Err(WorkloadValidationError::EmptyIdentity);
        }
        if self.model_id.is_empty() {
            return Err(WorkloadValidationError::EmptyModelId);
        }
        if !(self.slo.ttft_ms.is_finite() && self.slo.ttft_ms > 0.0)
            || !(self.slo.itl_ms.is_finite() && self.slo.itl_ms > 0.0)
        {
            return Err(WorkloadValidationError::NonPositiveSlo);
        }
        if !self.perf.decode.is_valid() || !self.perf.prefill.is_valid() {
            return Err(WorkloadValidationError::InvalidCoefficients);
        }
        if self.max_batch_size == 0 {
            return Err(WorkloadValidationError::ZeroBatchSize);
        }
        if self.accelerators_per_replica == 0 {
            return Err(WorkloadValidationError::ZeroAccelerators);
        }
        if let Some(max) = self.max_replicas {
            if max == 0 {
                return Err(WorkloadValidationError::ZeroMaxReplicas);
            }
            if let Some(min) = self.min_replicas
                && min > max
            {
                return Err(WorkloadValidationError::InvertedBounds { min, max });
            }
        }
        Ok(())
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// Which rule determined an allocation's replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationReason {
    /// The optimizer's minimal SLO-satisfying count was used as-is.
    OptimizerRecommendation,
    /// Zero load, but the retention window has not elapsed yet.
    RetentionPeriodActive,
    /// Retention elapsed with zero load; workload reduced to zero.
    ScaleToZero,
    /// The operator's min_replicas bound raised the value.
    MinReplicasEnforced,
    /// The workload has no reliable load history yet.
    Bootstrap,
}

/// A replica-count decision at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub num_replicas: u32,
    pub reason: AllocationReason,
    /// Unix timestamp (seconds) when this decision was made.
    pub updated_at: u64,
}

/// The pair of allocations tracked per workload.
///
/// `desired` is the engine's recommendation, replaced atomically every
/// cycle. `current` mirrors what the runtime actually runs and is only
/// updated from external feedback, never inferred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationStatus {
    pub workload_id: WorkloadId,
    pub current: Option<Allocation>,
    pub desired: Option<Allocation>,
}

impl AllocationStatus {
    /// An empty status for a workload with no decisions yet.
    pub fn empty(workload_id: &str) -> Self {
        Self {
            workload_id: workload_id.to_string(),
            current: None,
            desired: None,
        }
    }
}
