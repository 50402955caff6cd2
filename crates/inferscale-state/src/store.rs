//! StateStore — redb-backed persistence for InferScale.
//!
//! Provides typed CRUD operations over workload specs and allocation
//! records. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).
//!
//! Allocation records are always written as whole `AllocationStatus`
//! values inside one write transaction: `update_desired` and
//! `set_observed_replicas` each read, modify, and replace the record so
//! the current/desired pair can never be observed half-updated.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or update a workload spec.
    pub fn put_workload(&self, spec: &WorkloadSpec) -> StateResult<()> {
        let key = spec.table_key();
        let value = serde_json::to_vec(spec).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "workload stored");
        Ok(())
    }

    /// Get a workload by its `{namespace}/{name}` key.
    pub fn get_workload(&self, key: &str) -> StateResult<Option<WorkloadSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let spec: WorkloadSpec =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    /// List all registered workloads.
    pub fn list_workloads(&self) -> StateResult<Vec<WorkloadSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let spec: WorkloadSpec =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(spec);
        }
        Ok(results)
    }

    /// Delete a workload and its allocation record. Returns true if the
    /// workload existed.
    pub fn delete_workload(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
            let mut allocs = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            allocs.remove(key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "workload deleted");
        Ok(existed)
    }

    // ── Allocations ────────────────────────────────────────────────

    /// Get the allocation status for a workload.
    pub fn get_allocation(&self, key: &str) -> StateResult<Option<AllocationStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let status: AllocationStatus =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// List all allocation status records.
    pub fn list_allocations(&self) -> StateResult<Vec<AllocationStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let status: AllocationStatus =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(status);
        }
        Ok(results)
    }

    /// Replace the desired allocation for a workload, preserving `current`.
    ///
    /// The whole record is rewritten in one transaction.
    pub fn update_desired(&self, key: &str, desired: Allocation) -> StateResult<()> {
        self.mutate_allocation(key, |status| status.desired = Some(desired))
    }

    /// Record the externally observed replica count for a workload.
    ///
    /// The reason carried by `current` is the desired decision that drove
    /// the runtime there; when no desired decision exists yet the count is
    /// attributed to the optimizer.
    pub fn set_observed_replicas(&self, key: &str, replicas: u32, now: u64) -> StateResult<()> {
        self.mutate_allocation(key, |status| {
            let reason = status
                .desired
                .map(|d| d.reason)
                .unwrap_or(AllocationReason::OptimizerRecommendation);
            status.current = Some(Allocation {
                num_replicas: replicas,
                reason,
                updated_at: now,
            });
        })
    }

    /// Read-modify-write of one allocation record in a single transaction.
    fn mutate_allocation<F>(&self, key: &str, mutate: F) -> StateResult<()>
    where
        F: FnOnce(&mut AllocationStatus),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALLOCATIONS).map_err(map_err!(Table))?;
            let mut status = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => AllocationStatus::empty(key),
            };
            mutate(&mut status);
            let value = serde_json::to_vec(&status).map_err(map_err!(Serialize))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn test_workload(ns: &str, name: &str) -> WorkloadSpec {
        WorkloadSpec {
            id: format!("{ns}/{name}"),
            namespace: ns.to_string(),
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
            max_replicas: Some(16),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[test]
    fn put_get_delete_workload() {
        let store = test_store();
        let spec = test_workload("default", "llama");

        store.put_workload(&spec).unwrap();
        let fetched = store.get_workload("default/llama").unwrap().unwrap();
        assert_eq!(fetched, spec);

        assert!(store.delete_workload("default/llama").unwrap());
        assert!(store.get_workload("default/llama").unwrap().is_none());
        assert!(!store.delete_workload("default/llama").unwrap());
    }

    #[test]
    fn list_workloads_returns_all() {
        let store = test_store();
        store.put_workload(&test_workload("ns1", "a")).unwrap();
        store.put_workload(&test_workload("ns2", "b")).unwrap();
        assert_eq!(store.list_workloads().unwrap().len(), 2);
    }

    #[test]
    fn update_desired_creates_record() {
        let store = test_store();
        let alloc = Allocation {
            num_replicas: 3,
            reason: AllocationReason::OptimizerRecommendation,
            updated_at: 2000,
        };
        store.update_desired("default/llama", alloc).unwrap();

        let status = store.get_allocation("default/llama").unwrap().unwrap();
        assert_eq!(status.desired, Some(alloc));
        assert_eq!(status.current, None);
    }

    #[test]
    fn update_desired_preserves_current() {
        let store = test_store();
        store.set_observed_replicas("default/llama", 2, 1500).unwrap();
        store
            .update_desired(
                "default/llama",
                Allocation {
                    num_replicas: 4,
                    reason: AllocationReason::OptimizerRecommendation,
                    updated_at: 2000,
                },
            )
            .unwrap();

        let status = store.get_allocation("default/llama").unwrap().unwrap();
        assert_eq!(status.current.unwrap().num_replicas, 2);
        assert_eq!(status.desired.unwrap().num_replicas, 4);
    }

    #[test]
    fn observed_replicas_carry_desired_reason() {
        let store = test_store();
        store
            .update_desired(
                "default/llama",
                Allocation {
                    num_replicas: 0,
                    reason: AllocationReason::ScaleToZero,
                    updated_at: 2000,
                },
            )
            .unwrap();
        store.set_observed_replicas("default/llama", 0, 2100).unwrap();

        let status = store.get_allocation("default/llama").unwrap().unwrap();
        assert_eq!(status.current.unwrap().reason, AllocationReason::ScaleToZero);
    }

    #[test]
    fn delete_workload_removes_allocation() {
        let store = test_store();
        let spec = test_workload("default", "llama");
        store.put_workload(&spec).unwrap();
        store.set_observed_replicas("default/llama", 1, 1500).unwrap();

        store.delete_workload("default/llama").unwrap();
        assert!(store.get_allocation("default/llama").unwrap().is_none());
    }

    #[test]
    fn allocation_roundtrips_through_json() {
        let store = test_store();
        let alloc = Allocation {
            num_replicas: 0,
            reason: AllocationReason::ScaleToZero,
            updated_at: 3000,
        };
        store.update_desired("ns/w", alloc).unwrap();
        let listed = store.list_allocations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].workload_id, "ns/w");
        assert_eq!(listed[0].desired, Some(alloc));
    }
}
