//! Chain store: beacon states, blocks, deposits and head pointers.
//!
//! One redb database, written atomically per finalize call. Crash recovery is
//! redb's: reads after restart see the last committed transaction, so the
//! node resumes from the last atomically committed height.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use ssz::{Decode, Encode};
use viridian_types::{
    Hash256,
    block::SignedBeaconBlock,
    deposit::Deposit,
    slot::Slot,
    state::BeaconState,
};

use crate::error::StoreError;

const STATES_TABLE: TableDefinition<u64, Vec<u8>> = TableDefinition::new("beacon_states");
const BLOCKS_TABLE: TableDefinition<u64, Vec<u8>> = TableDefinition::new("beacon_blocks");
const DEPOSITS_TABLE: TableDefinition<u64, Vec<u8>> = TableDefinition::new("deposits");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const META_HEAD_SLOT: &str = "head_slot";
const META_FINALIZED_SLOT: &str = "finalized_slot";
const META_ETH1_BLOCK: &str = "last_processed_eth1_block";

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

pub struct ChainStore {
    db: Database,
}

impl ChainStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(db_err)?;
        let tx = db.begin_write().map_err(db_err)?;
        tx.open_table(STATES_TABLE).map_err(db_err)?;
        tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        tx.open_table(DEPOSITS_TABLE).map_err(db_err)?;
        tx.open_table(META_TABLE).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Seed the store with the genesis state. Head and finalized pointers
    /// land on slot zero in the same transaction.
    pub fn commit_genesis(&self, state: &BeaconState) -> Result<(), StoreError> {
        let tx = self.db.begin_write().map_err(db_err)?;
        {
            let mut states = tx.open_table(STATES_TABLE).map_err(db_err)?;
            states.insert(0u64, state.as_ssz_bytes()).map_err(db_err)?;
            let mut meta = tx.open_table(META_TABLE).map_err(db_err)?;
            meta.insert(META_HEAD_SLOT, 0u64).map_err(db_err)?;
            meta.insert(META_FINALIZED_SLOT, 0u64).map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    /// Persist a finalized (state, block) pair and advance both pointers.
    /// One write transaction: either everything lands or nothing does.
    pub fn commit_finalized(
        &self,
        slot: Slot,
        state: &BeaconState,
        block: &SignedBeaconBlock,
    ) -> Result<(), StoreError> {
        let tx = self.db.begin_write().map_err(db_err)?;
        {
            let mut states = tx.open_table(STATES_TABLE).map_err(db_err)?;
            states.insert(slot.as_u64(), state.as_ssz_bytes()).map_err(db_err)?;
            let mut blocks = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
            blocks.insert(slot.as_u64(), block.as_ssz_bytes()).map_err(db_err)?;
            let mut meta = tx.open_table(META_TABLE).map_err(db_err)?;
            meta.insert(META_HEAD_SLOT, slot.as_u64()).map_err(db_err)?;
            meta.insert(META_FINALIZED_SLOT, slot.as_u64()).map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    pub fn head_slot(&self) -> Result<Option<Slot>, StoreError> {
        self.meta_u64(META_HEAD_SLOT).map(|v| v.map(Slot::new))
    }

    pub fn finalized_slot(&self) -> Result<Option<Slot>, StoreError> {
        self.meta_u64(META_FINALIZED_SLOT).map(|v| v.map(Slot::new))
    }

    /// Snapshot of the state at the current head. Callers own the copy; the
    /// transition mutates it and either commits or discards.
    pub fn head_state(&self) -> Result<Option<BeaconState>, StoreError> {
        let Some(head) = self.head_slot()? else { return Ok(None) };
        self.state_at(head)
    }

    pub fn state_at(&self, slot: Slot) -> Result<Option<BeaconState>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(STATES_TABLE).map_err(db_err)?;
        let Some(bytes) = table.get(slot.as_u64()).map_err(db_err)? else {
            return Ok(None);
        };
        BeaconState::from_ssz_bytes(&bytes.value())
            .map(Some)
            .map_err(|e| StoreError::Codec(format!("state at {slot}: {e:?}")))
    }

    pub fn block_at(&self, slot: Slot) -> Result<Option<SignedBeaconBlock>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        let Some(bytes) = table.get(slot.as_u64()).map_err(db_err)? else {
            return Ok(None);
        };
        SignedBeaconBlock::from_ssz_bytes(&bytes.value())
            .map(Some)
            .map_err(|e| StoreError::Codec(format!("block at {slot}: {e:?}")))
    }

    /// Buffer deposits by index. Rejects gaps so the store stays dense;
    /// duplicates overwrite idempotently.
    pub fn put_deposits(&self, deposits: &[Deposit]) -> Result<(), StoreError> {
        if deposits.is_empty() {
            return Ok(());
        }

        let tx = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = tx.open_table(DEPOSITS_TABLE).map_err(db_err)?;
            let mut next = match table.last().map_err(db_err)? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            for deposit in deposits {
                if deposit.index > next {
                    return Err(StoreError::DepositGap { expected: next });
                }
                table.insert(deposit.index, deposit.as_ssz_bytes()).map_err(db_err)?;
                next = next.max(deposit.index + 1);
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Pending deposits starting at `from_index`, at most `limit`, ascending.
    pub fn deposits_from(&self, from_index: u64, limit: u64) -> Result<Vec<Deposit>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(DEPOSITS_TABLE).map_err(db_err)?;

        let mut deposits = Vec::new();
        for entry in table.range(from_index..).map_err(db_err)? {
            if deposits.len() as u64 == limit {
                break;
            }
            let (_, value) = entry.map_err(db_err)?;
            let deposit = Deposit::from_ssz_bytes(&value.value())
                .map_err(|e| StoreError::Codec(format!("deposit: {e:?}")))?;
            deposits.push(deposit);
        }
        Ok(deposits)
    }

    /// Contract-tree leaf roots for deposits `0..count`. Errors on a gap:
    /// proofs over an incomplete leaf set would be garbage.
    pub fn deposit_leaves(&self, count: u64) -> Result<Vec<Hash256>, StoreError> {
        let deposits = self.deposits_from(0, count)?;
        if deposits.len() as u64 != count {
            return Err(StoreError::DepositGap { expected: deposits.len() as u64 });
        }
        Ok(deposits.iter().map(Deposit::leaf_root).collect())
    }

    pub fn highest_deposit_index(&self) -> Result<Option<u64>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(DEPOSITS_TABLE).map_err(db_err)?;
        Ok(table.last().map_err(db_err)?.map(|(key, _)| key.value()))
    }

    pub fn last_processed_eth1_block(&self) -> Result<Option<u64>, StoreError> {
        self.meta_u64(META_ETH1_BLOCK)
    }

    pub fn set_last_processed_eth1_block(&self, block: u64) -> Result<(), StoreError> {
        let tx = self.db.begin_write().map_err(db_err)?;
        {
            let mut meta = tx.open_table(META_TABLE).map_err(db_err)?;
            meta.insert(META_ETH1_BLOCK, block).map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    fn meta_u64(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(META_TABLE).map_err(db_err)?;
        Ok(table.get(key).map_err(db_err)?.map(|v| v.value()))
    }
}

#[cfg(test)]
mod tests {
    use viridian_types::{
        crypto::{BlsPublicKey, BlsSignature},
        slot::Slot,
    };

    use super::*;

    fn open_store() -> (tempfile::TempDir, ChainStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path().join("chain.redb")).unwrap();
        (dir, store)
    }

    fn deposit(index: u64) -> Deposit {
        Deposit {
            pubkey: BlsPublicKey::new([index as u8 + 1; 48]),
            withdrawal_credentials: Hash256::repeat_byte(0x01),
            amount: 32_000_000_000,
            signature: BlsSignature::empty(),
            index,
            proof: Default::default(),
        }
    }

    #[test]
    fn fresh_store_has_no_head() {
        let (_dir, store) = open_store();
        assert!(store.head_slot().unwrap().is_none());
        assert!(store.head_state().unwrap().is_none());
    }

    #[test]
    fn genesis_then_finalize_advances_pointers() {
        let (_dir, store) = open_store();
        let state = BeaconState::default();
        store.commit_genesis(&state).unwrap();
        assert_eq!(store.head_slot().unwrap(), Some(Slot::new(0)));

        let mut next = state.clone();
        next.slot = Slot::new(1);
        let block = SignedBeaconBlock::default();
        store.commit_finalized(Slot::new(1), &next, &block).unwrap();

        assert_eq!(store.head_slot().unwrap(), Some(Slot::new(1)));
        assert_eq!(store.finalized_slot().unwrap(), Some(Slot::new(1)));
        assert_eq!(store.head_state().unwrap().unwrap().slot, Slot::new(1));
        assert!(store.block_at(Slot::new(1)).unwrap().is_some());
    }

    #[test]
    fn deposits_stay_dense() {
        let (_dir, store) = open_store();
        store.put_deposits(&[deposit(0), deposit(1)]).unwrap();
        assert_eq!(store.highest_deposit_index().unwrap(), Some(1));

        // A gap is rejected.
        assert!(matches!(
            store.put_deposits(&[deposit(5)]),
            Err(StoreError::DepositGap { expected: 2 })
        ));

        // Duplicates are idempotent.
        store.put_deposits(&[deposit(1), deposit(2)]).unwrap();
        assert_eq!(store.highest_deposit_index().unwrap(), Some(2));
    }

    #[test]
    fn deposit_range_reads_ascending_with_limit() {
        let (_dir, store) = open_store();
        store.put_deposits(&[deposit(0), deposit(1), deposit(2), deposit(3)]).unwrap();

        let range = store.deposits_from(1, 2).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].index, 1);
        assert_eq!(range[1].index, 2);

        assert_eq!(store.deposit_leaves(4).unwrap().len(), 4);
        assert!(store.deposit_leaves(9).is_err());
    }

    #[test]
    fn eth1_follower_pointer_roundtrip() {
        let (_dir, store) = open_store();
        assert!(store.last_processed_eth1_block().unwrap().is_none());
        store.set_last_processed_eth1_block(77).unwrap();
        assert_eq!(store.last_processed_eth1_block().unwrap(), Some(77));
    }
}
