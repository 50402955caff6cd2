//! redb table definitions for the InferScale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Keys follow the pattern `{namespace}/{name}`.

use redb::TableDefinition;

/// Workload specs keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Allocation status records keyed by `{namespace}/{name}`.
pub const ALLOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("allocations");
