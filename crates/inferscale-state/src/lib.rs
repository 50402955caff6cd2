//! inferscale-state — embedded state store for InferScale.
//!
//! Backed by [redb](https://docs.rs/redb), persists the two records the
//! controller owns per managed workload: the registered `WorkloadSpec`
//! and its `AllocationStatus` (current + desired replica decisions).
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by `{namespace}/{name}`. The desired allocation is only ever
//! replaced as a whole record inside a single write transaction, which is
//! what lets an interrupted evaluation cycle never leave a half-written
//! decision behind.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
