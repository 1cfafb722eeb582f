//! End-to-end transition scenarios against an in-memory genesis chain.

use std::sync::Arc;

use viridian_state_transition::{
    Context, NoopExecutor, PayloadExecutor, PayloadVerdict, StateProcessor,
    StateTransitionError, TransitionOutcome, expected_withdrawals,
    initialize_state_from_genesis,
};
use viridian_types::{
    B256, Hash256,
    block::{BeaconBlock, BeaconBlockBody, SignedBeaconBlock},
    chain_spec::ChainSpec,
    crypto::{BlsSecretKey, BlsSignature},
    deposit::{Deposit, deposit_tree},
    eth1::Eth1Data,
    execution_payload::{ExecutionPayload, Withdrawals},
    genesis::Genesis,
    slot::Slot,
    state::BeaconState,
};

const GWEI_PER_ETH: u64 = 1_000_000_000;

fn spec() -> ChainSpec {
    ChainSpec::devnet()
}

fn eth1_credentials(byte: u8) -> Hash256 {
    let mut credentials = Hash256::ZERO;
    credentials.0[0] = 0x01;
    credentials.0[31] = byte;
    credentials
}

fn genesis_deposit(seed: u8, index: u64, amount: u64) -> Deposit {
    let sk = BlsSecretKey::from_ikm(&[seed; 32]).unwrap();
    Deposit {
        pubkey: sk.public_key(),
        withdrawal_credentials: eth1_credentials(seed),
        amount,
        signature: BlsSignature::empty(),
        index,
        proof: Default::default(),
    }
}

/// Genesis with 4 validators of 32 ETH each.
fn genesis_state() -> (BeaconState, Genesis) {
    let spec = spec();
    let genesis = Genesis {
        genesis_time: 0,
        eth1_block_hash: Hash256::repeat_byte(0xe1),
        deposits: (0..4).map(|i| genesis_deposit(i + 1, i as u64, 32 * GWEI_PER_ETH)).collect(),
        execution_payload_header: Default::default(),
    };
    let (state, _) = initialize_state_from_genesis(&spec, &genesis).unwrap();
    (state, genesis)
}

/// Build a block that validates against `state` at `slot`, the same way the
/// validator service does: advance a copy, derive linkage fields, dry-run the
/// transition to fill in the state root.
async fn build_block(
    processor: &StateProcessor,
    state: &BeaconState,
    slot: Slot,
    new_deposits: Vec<Deposit>,
) -> SignedBeaconBlock {
    let spec = processor.spec().clone();
    let mut pre = state.clone();
    processor.process_slots(&mut pre, slot).unwrap();

    let epoch = pre.current_epoch(spec.slots_per_epoch);

    let mut payload = ExecutionPayload {
        parent_hash: pre.latest_execution_payload_header.block_hash,
        block_hash: B256::repeat_byte(slot.as_u64() as u8 + 0x10),
        block_number: slot.as_u64(),
        timestamp: pre.latest_execution_payload_header.timestamp + spec.seconds_per_slot,
        prev_randao: pre.randao_mix(epoch),
        ..Default::default()
    };
    payload.withdrawals = Withdrawals::new(expected_withdrawals(&spec, &pre)).unwrap();

    let eth1_data;
    let mut deposits = new_deposits;
    if deposits.is_empty() {
        eth1_data = pre.eth1_data.clone();
    } else {
        // Rebuild the contract tree over every deposit so far. The genesis
        // deposits are deterministic, so their leaves are reproducible here.
        let (_, genesis) = genesis_state();
        let mut all_leaves: Vec<Hash256> =
            genesis.deposits.iter().map(Deposit::leaf_root).collect();
        all_leaves.extend(deposits.iter().map(Deposit::leaf_root));
        let (root, branches) = deposit_tree(&all_leaves);
        for deposit in deposits.iter_mut() {
            deposit.proof = branches[deposit.index as usize].clone();
        }
        eth1_data = Eth1Data {
            deposit_root: root,
            deposit_count: all_leaves.len() as u64,
            block_hash: pre.eth1_data.block_hash,
        };
    }

    let body = BeaconBlockBody {
        eth1_data,
        deposits: viridian_types::block::Deposits::new(deposits).unwrap(),
        execution_payload: payload,
        ..Default::default()
    };

    let mut block = SignedBeaconBlock {
        message: BeaconBlock {
            slot,
            proposer_index: 0,
            parent_root: pre.latest_block_root(),
            state_root: Hash256::ZERO,
            body,
        },
        signature: BlsSignature::empty(),
    };

    // Dry-run to compute the post-state root.
    let mut scratch = state.clone();
    let ctx = Context::for_proposal_dry_run();
    processor.transition(&mut scratch, &block, &ctx).await.unwrap();
    block.message.state_root = scratch.hash_tree_root();
    block
}

fn unsigned_ctx() -> Context {
    Context {
        verify_signatures: false,
        verify_proposer: false,
        expected_proposer: None,
        verify_state_root: true,
        executor: Arc::new(NoopExecutor),
    }
}

/// Genesis then an empty block at slot 1.
#[tokio::test]
async fn genesis_then_slot_one() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();

    let genesis_header_root = {
        let mut copy = genesis_state.clone();
        processor.process_slots(&mut copy, Slot::new(1)).unwrap();
        copy.latest_block_header.hash_tree_root()
    };

    let block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;
    assert_eq!(block.message.parent_root, genesis_header_root);

    let mut state = genesis_state.clone();
    let outcome = processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap();

    assert_eq!(state.slot, Slot::new(1));
    assert_eq!(state.latest_block_header.parent_root, genesis_header_root);
    assert!(
        outcome.validator_updates.is_empty(),
        "no validator changed weight on an empty block"
    );
    assert_eq!(outcome.payload_verdict, PayloadVerdict::Valid);
}

/// A deposit for a new pubkey lands at slot 11.
#[tokio::test]
async fn deposit_admits_fifth_validator() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();

    let mut state = genesis_state.clone();
    processor.process_slots(&mut state, Slot::new(10)).unwrap();
    let deposit_index_before = state.eth1_deposit_index;

    let new_deposit = genesis_deposit(42, 4, 32 * GWEI_PER_ETH);
    let new_pubkey = new_deposit.pubkey;
    let block = build_block(&processor, &state, Slot::new(11), vec![new_deposit]).await;

    let outcome = processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap();

    assert_eq!(state.validators.len(), 5);
    assert_eq!(state.balance(4), 32 * GWEI_PER_ETH);
    assert_eq!(state.eth1_deposit_index, deposit_index_before + 1);
    assert!(outcome.validator_updates.iter().any(|u| u.pubkey == new_pubkey));
}

/// Invariant: total balance moves only by deposits minus withdrawals.
#[tokio::test]
async fn balance_conservation() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();

    let sum_before: u64 = genesis_state.balances.iter().sum();
    let deposit_amount = 5 * GWEI_PER_ETH;
    let block = build_block(
        &processor,
        &genesis_state,
        Slot::new(1),
        vec![genesis_deposit(9, 4, deposit_amount)],
    )
    .await;

    let withdrawn: u64 =
        block.message.body.execution_payload.withdrawals.iter().map(|w| w.amount).sum();

    let mut state = genesis_state.clone();
    processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap();

    let sum_after: u64 = state.balances.iter().sum();
    assert_eq!(sum_after, sum_before + deposit_amount - withdrawn);
}

/// Invariant: byte-for-byte determinism across independent runs.
#[tokio::test]
async fn transition_is_deterministic() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;

    let mut a = genesis_state.clone();
    let mut b = genesis_state.clone();
    let outcome_a = processor.transition(&mut a, &block, &unsigned_ctx()).await.unwrap();
    let outcome_b = processor.transition(&mut b, &block, &unsigned_ctx()).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(a.hash_tree_root(), b.hash_tree_root());
    assert_eq!(outcome_a.validator_updates, outcome_b.validator_updates);
}

#[tokio::test]
async fn wrong_state_root_is_rejected() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let mut block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;
    block.message.state_root = Hash256::repeat_byte(0xbd);

    let mut state = genesis_state.clone();
    let error = processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap_err();
    assert!(matches!(error, StateTransitionError::StateRootMismatch { .. }));
}

#[tokio::test]
async fn wrong_prev_randao_is_rejected() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let mut block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;
    block.message.body.execution_payload.prev_randao = Hash256::repeat_byte(0x66);

    let mut state = genesis_state.clone();
    let error = processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap_err();
    assert!(matches!(error, StateTransitionError::PayloadPrevRandaoMismatch { .. }));
}

#[tokio::test]
async fn wrong_parent_root_is_rejected() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let mut block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;
    block.message.parent_root = Hash256::repeat_byte(0x01);

    let mut state = genesis_state.clone();
    let error = processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap_err();
    assert!(matches!(error, StateTransitionError::ParentRootMismatch { .. }));
}

/// An engine `INVALID` verdict fails the transition.
#[tokio::test]
async fn engine_invalid_fails_transition() {
    struct RejectingExecutor;

    #[async_trait::async_trait]
    impl PayloadExecutor for RejectingExecutor {
        async fn notify_new_payload(
            &self,
            _payload: &ExecutionPayload,
            _versioned_hashes: Vec<B256>,
            _parent_beacon_block_root: Hash256,
        ) -> Result<PayloadVerdict, StateTransitionError> {
            Err(StateTransitionError::PayloadInvalid { reason: "bad block".into() })
        }
    }

    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;

    let mut ctx = unsigned_ctx();
    ctx.executor = Arc::new(RejectingExecutor);

    let mut state = genesis_state.clone();
    let error = processor.transition(&mut state, &block, &ctx).await.unwrap_err();
    assert!(matches!(error, StateTransitionError::PayloadInvalid { .. }));
}

/// A `SYNCING` engine is tolerated: the transition proceeds optimistically.
#[tokio::test]
async fn engine_syncing_is_tolerated() {
    struct SyncingExecutor;

    #[async_trait::async_trait]
    impl PayloadExecutor for SyncingExecutor {
        async fn notify_new_payload(
            &self,
            _payload: &ExecutionPayload,
            _versioned_hashes: Vec<B256>,
            _parent_beacon_block_root: Hash256,
        ) -> Result<PayloadVerdict, StateTransitionError> {
            Ok(PayloadVerdict::Optimistic)
        }
    }

    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let block = build_block(&processor, &genesis_state, Slot::new(1), vec![]).await;

    let mut ctx = unsigned_ctx();
    ctx.executor = Arc::new(SyncingExecutor);

    let mut state = genesis_state.clone();
    let outcome: TransitionOutcome =
        processor.transition(&mut state, &block, &ctx).await.unwrap();
    assert_eq!(state.slot, Slot::new(1));
    assert_eq!(
        outcome.payload_verdict,
        PayloadVerdict::Optimistic,
        "the deferred judgement is surfaced so callers can skip optimistic builds"
    );
}

/// Epoch boundary crossing runs epoch processing deterministically.
#[tokio::test]
async fn epoch_boundary_crossing() {
    let processor = StateProcessor::new(spec());
    let (genesis_state, _) = genesis_state();
    let slots_per_epoch = processor.spec().slots_per_epoch;

    let block =
        build_block(&processor, &genesis_state, Slot::new(slots_per_epoch + 1), vec![]).await;

    let mut state = genesis_state.clone();
    processor.transition(&mut state, &block, &unsigned_ctx()).await.unwrap();
    assert_eq!(state.current_epoch(slots_per_epoch), viridian_types::slot::Epoch::new(1));
}
