//! Shared harness: a full chain stack over mocks, plus a block builder that
//! produces fully signed blocks the way the validator service does.
#![allow(dead_code)]

pub mod mocks;

use std::{sync::Arc, time::Duration};

use c_kzg::ethereum_kzg_settings;
use mocks::MockEngine;
use viridian_chain::{
    ChainService, ChainStore, ConsensusMiddleware,
    metrics::ChainMetrics,
    service::ChainServiceConfig,
};
use viridian_da::{BlobProcessor, MemoryAvailabilityStore, metrics::BlobMetrics};
use viridian_events::{
    BlockCommittedEvent, BlockProposalEvent, DepositIngestedEvent, EventBus, EventId,
    NewSlotEvent, Publisher,
};
use viridian_execution::PayloadBuilder;
use viridian_state_transition::{Context, StateProcessor, expected_withdrawals};
use viridian_types::{
    B256, Hash256,
    blob::{Blob, BlobSidecar, BlobSidecars, BlobsBundle, KzgCommitment, KzgCommitments, KzgProof},
    block::{
        BeaconBlock, BeaconBlockBody, Deposits, SignedBeaconBlock, block_signing_root,
        inclusion_proof_vector,
    },
    chain_spec::{ChainSpec, DomainType},
    crypto::{BlsSecretKey, BlsSignature},
    deposit::{Deposit, deposit_tree},
    eth1::Eth1Data,
    execution_payload::{ExecutionPayload, Withdrawals},
    genesis::Genesis,
    signing::compute_signing_root,
    slot::Slot,
    state::BeaconState,
};

pub const GWEI_PER_ETH: u64 = 1_000_000_000;
pub const GAS_PER_BLOB: u64 = 131_072;

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub spec: ChainSpec,
    pub engine: Arc<MockEngine>,
    pub bus: EventBus,
    pub chain: Arc<ChainService>,
    pub middleware: ConsensusMiddleware,
    pub payload_builder: Arc<PayloadBuilder>,
    pub store: Arc<ChainStore>,
    pub availability: Arc<MemoryAvailabilityStore>,
}

pub fn validator_key(index: usize) -> BlsSecretKey {
    BlsSecretKey::from_ikm(&[index as u8 + 1; 32]).unwrap()
}

pub fn eth1_credentials(byte: u8) -> Hash256 {
    let mut credentials = Hash256::ZERO;
    credentials.0[0] = 0x01;
    credentials.0[31] = byte;
    credentials
}

pub fn genesis_deposit(validator: usize, index: u64, amount: u64, spec: &ChainSpec) -> Deposit {
    let sk = validator_key(validator);
    let credentials = eth1_credentials(validator as u8);
    Deposit {
        pubkey: sk.public_key(),
        withdrawal_credentials: credentials,
        amount,
        signature: Deposit::sign_deposit_data(&sk, credentials, amount, spec),
        index,
        proof: Default::default(),
    }
}

pub fn genesis_file(spec: &ChainSpec) -> Genesis {
    Genesis {
        genesis_time: 0,
        eth1_block_hash: Hash256::repeat_byte(0xe1),
        deposits: (0..4).map(|i| genesis_deposit(i, i as u64, 32 * GWEI_PER_ETH, spec)).collect(),
        execution_payload_header: Default::default(),
    }
}

pub fn new_bus() -> EventBus {
    let bus = EventBus::new();
    bus.register(Publisher::<NewSlotEvent>::new(EventId::NewSlot, 16)).unwrap();
    bus.register(Publisher::<BlockCommittedEvent>::new(EventId::BlockCommitted, 16)).unwrap();
    bus.register(Publisher::<BlockProposalEvent>::new(EventId::BlockProposal, 16)).unwrap();
    bus.register(Publisher::<DepositIngestedEvent>::new(EventId::DepositIngested, 64)).unwrap();
    bus
}

pub fn harness_with(optimistic_builds: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let spec = ChainSpec::devnet();

    let store = Arc::new(ChainStore::open(dir.path().join("chain.redb")).unwrap());
    let availability = Arc::new(MemoryAvailabilityStore::new());
    let blob_processor = Arc::new(BlobProcessor::new(
        spec.clone(),
        Arc::clone(&availability) as _,
        BlobMetrics::new(),
    ));

    let engine = Arc::new(MockEngine::new());
    let payload_builder = Arc::new(PayloadBuilder::new(Arc::clone(&engine) as _));
    let bus = new_bus();

    let chain = Arc::new(ChainService::new(
        ChainServiceConfig { optimistic_builds, fee_recipient: Default::default() },
        Arc::clone(&store),
        Arc::clone(&blob_processor),
        Arc::clone(&engine) as _,
        Arc::clone(&payload_builder),
        StateProcessor::new(spec.clone()),
        bus.clone(),
        ChainMetrics::new(),
    ));

    let middleware = ConsensusMiddleware::new(
        spec.clone(),
        Arc::clone(&chain),
        bus.clone(),
        Duration::from_secs(5),
    )
    .unwrap();

    Harness {
        _dir: dir,
        spec,
        engine,
        bus,
        chain,
        middleware,
        payload_builder,
        store,
        availability,
    }
}

pub fn harness() -> Harness {
    harness_with(true)
}

/// Real KZG commitment and proof for the zero blob, so sidecar batches pass
/// the batched pairing check in tests.
pub fn zero_blob_bundle(count: usize) -> BlobsBundle {
    let settings = ethereum_kzg_settings(0);
    let blob = Blob::zero();
    let ckzg_blob = c_kzg::Blob::from_bytes(blob.as_bytes()).unwrap();

    let commitment = settings.blob_to_kzg_commitment(&ckzg_blob).unwrap();
    let proof =
        settings.compute_blob_kzg_proof(&ckzg_blob, &commitment.to_bytes()).unwrap();

    BlobsBundle {
        commitments: vec![
            KzgCommitment::from_slice(commitment.to_bytes().as_slice()).unwrap();
            count
        ],
        proofs: vec![KzgProof::from_slice(proof.to_bytes().as_slice()).unwrap(); count],
        blobs: vec![blob; count],
    }
}

pub struct BlockSpec {
    pub slot: Slot,
    pub bundle: BlobsBundle,
    pub deposits: Vec<Deposit>,
    pub graffiti: Hash256,
}

impl BlockSpec {
    pub fn empty(slot: u64) -> Self {
        Self {
            slot: Slot::new(slot),
            bundle: BlobsBundle::default(),
            deposits: Vec::new(),
            graffiti: Hash256::ZERO,
        }
    }

    pub fn with_bundle(mut self, bundle: BlobsBundle) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_deposits(mut self, deposits: Vec<Deposit>) -> Self {
        self.deposits = deposits;
        self
    }

    pub fn with_graffiti(mut self, graffiti: Hash256) -> Self {
        self.graffiti = graffiti;
        self
    }
}

/// Build a fully signed block plus sidecars that validate against the current
/// head state of `harness`. Proposer is always validator 0.
pub async fn build_block(harness: &Harness, block_spec: BlockSpec) -> (SignedBeaconBlock, BlobSidecars) {
    let spec = &harness.spec;
    let processor = StateProcessor::new(spec.clone());
    let head_state = harness.store.head_state().unwrap().expect("genesis committed");

    let mut pre = head_state.clone();
    processor.process_slots(&mut pre, block_spec.slot).unwrap();
    let parent_root = pre.latest_block_root();
    let epoch = pre.current_epoch(spec.slots_per_epoch);

    let bundle = block_spec.bundle;
    let mut payload = ExecutionPayload {
        parent_hash: pre.latest_execution_payload_header.block_hash,
        block_hash: {
            let mut hash = B256::repeat_byte(0x20);
            hash.0[..8].copy_from_slice(&block_spec.slot.as_u64().to_be_bytes());
            hash.0[31] = block_spec.graffiti.0[0];
            hash
        },
        block_number: block_spec.slot.as_u64(),
        timestamp: pre.latest_execution_payload_header.timestamp + spec.seconds_per_slot,
        prev_randao: pre.randao_mix(epoch),
        blob_gas_used: bundle.len() as u64 * GAS_PER_BLOB,
        ..Default::default()
    };
    payload.withdrawals = Withdrawals::new(expected_withdrawals(spec, &pre)).unwrap();

    // Deposit tree over genesis plus any new deposits.
    let mut deposits = block_spec.deposits;
    let eth1_data = if deposits.is_empty() {
        pre.eth1_data.clone()
    } else {
        let genesis = genesis_file(spec);
        let mut leaves: Vec<Hash256> = genesis.deposits.iter().map(Deposit::leaf_root).collect();
        leaves.extend(deposits.iter().map(Deposit::leaf_root));
        let (root, branches) = deposit_tree(&leaves);
        for deposit in deposits.iter_mut() {
            deposit.proof = branches[deposit.index as usize].clone();
        }
        Eth1Data {
            deposit_root: root,
            deposit_count: leaves.len() as u64,
            block_hash: pre.eth1_data.block_hash,
        }
    };

    let signer = validator_key(0);
    let fork = spec.active_fork_for_slot(block_spec.slot);
    let randao_domain =
        spec.compute_domain(DomainType::Randao, fork, pre.genesis_validators_root);
    let mut epoch_root = Hash256::ZERO;
    epoch_root.0[..8].copy_from_slice(&epoch.as_u64().to_le_bytes());
    let randao_reveal = signer.sign(compute_signing_root(epoch_root, randao_domain).as_slice());

    let body = BeaconBlockBody {
        randao_reveal,
        eth1_data,
        graffiti: block_spec.graffiti,
        deposits: Deposits::new(deposits).unwrap(),
        execution_payload: payload,
        blob_kzg_commitments: KzgCommitments::new(bundle.commitments.clone()).unwrap(),
    };

    let mut block = BeaconBlock {
        slot: block_spec.slot,
        proposer_index: 0,
        parent_root,
        state_root: Hash256::ZERO,
        body,
    };

    // Dry-run for the state root.
    let unsigned = SignedBeaconBlock { message: block.clone(), signature: BlsSignature::empty() };
    let mut scratch = head_state;
    processor
        .transition(&mut scratch, &unsigned, &Context::for_proposal_dry_run())
        .await
        .unwrap();
    block.state_root = scratch.hash_tree_root();

    let signing_root =
        block_signing_root(block.hash_tree_root(), spec, fork, pre.genesis_validators_root);
    let signature = signer.sign(signing_root.as_slice());
    let signed = SignedBeaconBlock { message: block, signature };

    let header = signed.signed_header();
    let sidecars: Vec<BlobSidecar> = bundle
        .blobs
        .iter()
        .enumerate()
        .map(|(index, blob)| BlobSidecar {
            index: index as u64,
            blob: blob.clone(),
            kzg_commitment: bundle.commitments[index],
            kzg_proof: bundle.proofs[index],
            signed_block_header: header.clone(),
            kzg_commitment_inclusion_proof: inclusion_proof_vector(
                signed.message.body.kzg_commitment_inclusion_proof(index).unwrap(),
            )
            .unwrap(),
        })
        .collect();

    (signed, BlobSidecars::new(sidecars).unwrap())
}

/// SSZ-encode a (block, sidecars) pair the way the host consensus carries it.
pub fn encode_txs(block: &SignedBeaconBlock, sidecars: &BlobSidecars) -> Vec<bytes::Bytes> {
    use ssz::Encode;
    vec![bytes::Bytes::from(block.as_ssz_bytes()), bytes::Bytes::from(sidecars.as_ssz_bytes())]
}
