//! Availability store: verified sidecars keyed by slot.

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use ssz::{Decode, Encode};
use std::{collections::BTreeMap, path::Path, sync::Mutex};
use tracing::debug;
use viridian_types::{blob::BlobSidecars, slot::Slot};

use crate::error::BlobError;

/// Persistence seam for verified sidecars. One batch per slot; persist is
/// atomic per call.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn persist(&self, slot: Slot, sidecars: &BlobSidecars) -> Result<(), BlobError>;

    async fn sidecars_for_slot(&self, slot: Slot) -> Result<Option<BlobSidecars>, BlobError>;

    /// Drop everything below `slot` (DA-window pruning). Returns the number
    /// of batches removed.
    async fn prune_below(&self, slot: Slot) -> Result<usize, BlobError>;
}

const SIDECARS_TABLE: TableDefinition<u64, Vec<u8>> = TableDefinition::new("sidecars");

/// redb-backed availability store used in production.
pub struct RedbAvailabilityStore {
    db: Database,
}

impl RedbAvailabilityStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlobError> {
        let db = Database::create(path).map_err(|e| BlobError::Store(e.to_string()))?;
        // Make sure the table exists so reads on a fresh database succeed.
        let tx = db.begin_write().map_err(|e| BlobError::Store(e.to_string()))?;
        tx.open_table(SIDECARS_TABLE).map_err(|e| BlobError::Store(e.to_string()))?;
        tx.commit().map_err(|e| BlobError::Store(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl AvailabilityStore for RedbAvailabilityStore {
    async fn persist(&self, slot: Slot, sidecars: &BlobSidecars) -> Result<(), BlobError> {
        let tx = self.db.begin_write().map_err(|e| BlobError::Store(e.to_string()))?;
        {
            let mut table =
                tx.open_table(SIDECARS_TABLE).map_err(|e| BlobError::Store(e.to_string()))?;
            table
                .insert(slot.as_u64(), sidecars.as_ssz_bytes())
                .map_err(|e| BlobError::Store(e.to_string()))?;
        }
        tx.commit().map_err(|e| BlobError::Store(e.to_string()))?;
        debug!(%slot, count = sidecars.len(), "persisted sidecar batch");
        Ok(())
    }

    async fn sidecars_for_slot(&self, slot: Slot) -> Result<Option<BlobSidecars>, BlobError> {
        let tx = self.db.begin_read().map_err(|e| BlobError::Store(e.to_string()))?;
        let table =
            tx.open_table(SIDECARS_TABLE).map_err(|e| BlobError::Store(e.to_string()))?;
        let Some(bytes) =
            table.get(slot.as_u64()).map_err(|e| BlobError::Store(e.to_string()))?
        else {
            return Ok(None);
        };
        BlobSidecars::from_ssz_bytes(&bytes.value())
            .map(Some)
            .map_err(|e| BlobError::Store(format!("sidecar decode: {e:?}")))
    }

    async fn prune_below(&self, slot: Slot) -> Result<usize, BlobError> {
        let tx = self.db.begin_write().map_err(|e| BlobError::Store(e.to_string()))?;
        let removed = {
            let mut table =
                tx.open_table(SIDECARS_TABLE).map_err(|e| BlobError::Store(e.to_string()))?;

            let stale: Vec<u64> = {
                let range = table
                    .range(..slot.as_u64())
                    .map_err(|e| BlobError::Store(e.to_string()))?;
                range
                    .map(|entry| {
                        entry
                            .map(|(key, _)| key.value())
                            .map_err(|e| BlobError::Store(e.to_string()))
                    })
                    .collect::<Result<_, _>>()?
            };

            for key in &stale {
                table.remove(*key).map_err(|e| BlobError::Store(e.to_string()))?;
            }
            stale.len()
        };
        tx.commit().map_err(|e| BlobError::Store(e.to_string()))?;
        Ok(removed)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryAvailabilityStore {
    batches: Mutex<BTreeMap<u64, BlobSidecars>>,
}

impl MemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn persist(&self, slot: Slot, sidecars: &BlobSidecars) -> Result<(), BlobError> {
        self.batches.lock().unwrap().insert(slot.as_u64(), sidecars.clone());
        Ok(())
    }

    async fn sidecars_for_slot(&self, slot: Slot) -> Result<Option<BlobSidecars>, BlobError> {
        Ok(self.batches.lock().unwrap().get(&slot.as_u64()).cloned())
    }

    async fn prune_below(&self, slot: Slot) -> Result<usize, BlobError> {
        let mut batches = self.batches.lock().unwrap();
        let keep = batches.split_off(&slot.as_u64());
        let removed = batches.len();
        *batches = keep;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use viridian_types::{
        blob::{Blob, BlobSidecar, KzgCommitment, KzgProof},
        block::{BeaconBlockHeader, SignedBeaconBlockHeader},
        crypto::BlsSignature,
    };

    use super::*;

    fn batch_for_slot(slot: u64) -> BlobSidecars {
        let header = SignedBeaconBlockHeader {
            message: BeaconBlockHeader { slot: Slot::new(slot), ..Default::default() },
            signature: BlsSignature::empty(),
        };
        BlobSidecars::new(vec![BlobSidecar {
            index: 0,
            blob: Blob::zero(),
            kzg_commitment: KzgCommitment([1; 48]),
            kzg_proof: KzgProof([2; 48]),
            signed_block_header: header,
            kzg_commitment_inclusion_proof: Default::default(),
        }])
        .unwrap()
    }

    #[tokio::test]
    async fn redb_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbAvailabilityStore::open(dir.path().join("blobs.redb")).unwrap();

        let batch = batch_for_slot(5);
        store.persist(Slot::new(5), &batch).await.unwrap();

        let loaded = store.sidecars_for_slot(Slot::new(5)).await.unwrap().unwrap();
        assert_eq!(loaded, batch);
        assert!(store.sidecars_for_slot(Slot::new(6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redb_prune_below_removes_old_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbAvailabilityStore::open(dir.path().join("blobs.redb")).unwrap();

        for slot in 1..=4u64 {
            store.persist(Slot::new(slot), &batch_for_slot(slot)).await.unwrap();
        }

        let removed = store.prune_below(Slot::new(3)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.sidecars_for_slot(Slot::new(2)).await.unwrap().is_none());
        assert!(store.sidecars_for_slot(Slot::new(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_store_prunes() {
        let store = MemoryAvailabilityStore::new();
        store.persist(Slot::new(1), &batch_for_slot(1)).await.unwrap();
        store.persist(Slot::new(9), &batch_for_slot(9)).await.unwrap();

        assert_eq!(store.prune_below(Slot::new(5)).await.unwrap(), 1);
        assert!(store.sidecars_for_slot(Slot::new(1)).await.unwrap().is_none());
        assert!(store.sidecars_for_slot(Slot::new(9)).await.unwrap().is_some());
    }
}
