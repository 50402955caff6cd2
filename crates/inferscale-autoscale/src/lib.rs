//! inferscale-autoscale — the allocation decision engine.
//!
//! Each evaluation cycle, per managed workload: derive load from counter
//! deltas, ask the performance model for the minimal SLO-satisfying
//! replica count, pass the result through the scale-to-zero lifecycle
//! policy, clamp to operator bounds, and publish the decision atomically.
//!
//! The lifecycle machine is what keeps the controller from thrashing: a
//! workload whose load drops to zero is retained warm for a configured
//! period before it may be reduced to zero replicas, and a freshly
//! (re)created workload gets a bootstrap grace window before zero is ever
//! considered.

pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::{LifecycleState, LifecycleTracker, Phase, PolicyVerdict};
pub use reconciler::{DEFAULT_FETCH_TIMEOUT, Engine};
