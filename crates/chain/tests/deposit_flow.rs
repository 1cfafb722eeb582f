//! Deposit catch-up: polling, follow distance, dedup, event fan-out and
//! failed-block retry clearing.

mod common;

use std::{sync::Arc, time::Duration};

use common::{
    BlockSpec, build_block, encode_txs, genesis_deposit, genesis_file, harness,
};
use viridian_chain::deposit_fetcher::DepositFetcher;
use viridian_events::{DepositIngestedEvent, EventId};
use viridian_types::slot::Slot;

use crate::common::mocks::MockDepositReader;

fn fetcher(h: &common::Harness, reader: Arc<MockDepositReader>) -> DepositFetcher {
    DepositFetcher::new(
        Arc::clone(&h.chain),
        reader,
        h.bus.clone(),
        Duration::from_millis(10),
        h.spec.eth1_follow_distance,
    )
}

#[tokio::test]
async fn poll_respects_follow_distance() {
    let h = harness();
    h.middleware.init_genesis(&genesis_file(&h.spec).to_json_bytes().unwrap()).unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    h.bus.start(cancel.clone());

    // Follow distance is 8; a deposit at eth1 block 15 is only visible once
    // the head reaches 23.
    let reader = Arc::new(MockDepositReader::new(16));
    reader.emit(15, genesis_deposit(9, 4, 32 * common::GWEI_PER_ETH, &h.spec));

    let fetcher = fetcher(&h, Arc::clone(&reader));
    assert_eq!(fetcher.poll_once().await.unwrap(), 0);

    *reader.head.lock().unwrap() = 23;
    assert_eq!(fetcher.poll_once().await.unwrap(), 1);
    assert_eq!(h.store.highest_deposit_index().unwrap(), Some(4));

    cancel.cancel();
}

#[tokio::test]
async fn repolls_do_not_duplicate() {
    let h = harness();
    h.middleware.init_genesis(&genesis_file(&h.spec).to_json_bytes().unwrap()).unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    h.bus.start(cancel.clone());

    let reader = Arc::new(MockDepositReader::new(30));
    reader.emit(10, genesis_deposit(9, 4, 32 * common::GWEI_PER_ETH, &h.spec));
    reader.emit(11, genesis_deposit(10, 5, 16 * common::GWEI_PER_ETH, &h.spec));

    let fetcher = fetcher(&h, Arc::clone(&reader));
    assert_eq!(fetcher.poll_once().await.unwrap(), 2);

    // Head advances, old logs overlap the next window start.
    *reader.head.lock().unwrap() = 40;
    assert_eq!(fetcher.poll_once().await.unwrap(), 0);
    assert_eq!(h.store.highest_deposit_index().unwrap(), Some(5));

    cancel.cancel();
}

/// Deposit events fan out in ascending index order.
#[tokio::test]
async fn deposit_events_are_ordered() {
    let h = harness();
    h.middleware.init_genesis(&genesis_file(&h.spec).to_json_bytes().unwrap()).unwrap();
    let mut deposits_rx =
        h.bus.subscribe::<DepositIngestedEvent>(EventId::DepositIngested).unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    h.bus.start(cancel.clone());

    let reader = Arc::new(MockDepositReader::new(30));
    // Emitted out of order across blocks.
    reader.emit(12, genesis_deposit(10, 5, 1 * common::GWEI_PER_ETH, &h.spec));
    reader.emit(10, genesis_deposit(9, 4, 2 * common::GWEI_PER_ETH, &h.spec));

    fetcher(&h, Arc::clone(&reader)).poll_once().await.unwrap();

    assert_eq!(deposits_rx.recv().await.unwrap().deposit.index, 4);
    assert_eq!(deposits_rx.recv().await.unwrap().deposit.index, 5);

    cancel.cancel();
}

/// Fetch errors surface as retryable failures, not panics.
#[tokio::test]
async fn poll_error_is_reported() {
    let h = harness();
    h.middleware.init_genesis(&genesis_file(&h.spec).to_json_bytes().unwrap()).unwrap();

    let reader = Arc::new(MockDepositReader::new(30));
    *reader.fail_next.lock().unwrap() = true;

    let fetcher = fetcher(&h, Arc::clone(&reader));
    assert!(fetcher.poll_once().await.is_err());
    // The next round succeeds.
    assert_eq!(fetcher.poll_once().await.unwrap(), 0);
}

/// A failed block is parked until a poll round ingests fresh deposits.
#[tokio::test]
async fn fresh_deposits_clear_failed_blocks() {
    let h = harness();
    h.middleware.init_genesis(&genesis_file(&h.spec).to_json_bytes().unwrap()).unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    h.bus.start(cancel.clone());

    // Park slot 1: the engine rejects the payload, finalize fails.
    let (block, sidecars) = build_block(&h, BlockSpec::empty(1)).await;
    h.engine.set_new_payload_behaviour(common::mocks::NewPayloadBehaviour::Invalid);
    assert!(h.middleware.finalize_block(1, &encode_txs(&block, &sidecars), 1).await.is_err());
    assert!(h.chain.is_failed(Slot::new(1)).await);
    h.engine.set_new_payload_behaviour(common::mocks::NewPayloadBehaviour::Valid);

    let reader = Arc::new(MockDepositReader::new(30));
    reader.emit(10, genesis_deposit(9, 4, 32 * common::GWEI_PER_ETH, &h.spec));
    fetcher(&h, Arc::clone(&reader)).poll_once().await.unwrap();

    assert_eq!(h.chain.failed_block_count().await, 0, "slot retryable after catch-up");

    cancel.cancel();
}
