//! Deposit catch-up fetcher.
//!
//! Long-running task polling the execution client for deposit logs between
//! the last processed block and `head - eth1_follow_distance`. Fresh deposits
//! are buffered into the chain store in ascending index order, fanned out on
//! the bus, and parked failed blocks become retryable again. Fetch errors
//! back off exponentially and never kill the task.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use viridian_events::{DepositIngestedEvent, EventBus, EventId};
use viridian_execution::deposits::DepositReader;

use crate::service::ChainService;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct DepositFetcher {
    chain: Arc<ChainService>,
    reader: Arc<dyn DepositReader>,
    bus: EventBus,
    poll_interval: Duration,
    eth1_follow_distance: u64,
}

impl DepositFetcher {
    pub fn new(
        chain: Arc<ChainService>,
        reader: Arc<dyn DepositReader>,
        bus: EventBus,
        poll_interval: Duration,
        eth1_follow_distance: u64,
    ) -> Self {
        Self { chain, reader, bus, poll_interval, eth1_follow_distance }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = self.poll_interval;
            loop {
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    () = cancel.cancelled() => {
                        debug!("deposit fetcher shutting down");
                        return;
                    }
                }

                match self.poll_once().await {
                    Ok(_) => backoff = self.poll_interval,
                    Err(error) => {
                        warn!(%error, "deposit poll failed, backing off");
                        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                    }
                }
            }
        })
    }

    /// One poll round. Returns the number of deposits ingested.
    pub async fn poll_once(&self) -> Result<usize, crate::ChainError> {
        let head = self
            .reader
            .latest_block_number()
            .await
            .map_err(|e| crate::ChainError::DepositFetch(e.to_string()))?;
        let target = head.saturating_sub(self.eth1_follow_distance);

        let store = self.chain.store();
        let from = store.last_processed_eth1_block()?.map(|b| b + 1).unwrap_or(0);
        if target < from {
            return Ok(0);
        }

        let mut deposits = self
            .reader
            .deposits_in_range(from, target)
            .await
            .map_err(|e| crate::ChainError::DepositFetch(e.to_string()))?;

        // Drop anything already buffered; logs can overlap on re-polls.
        if let Some(highest) = store.highest_deposit_index()? {
            deposits.retain(|d| d.index > highest);
        }

        let ingested = deposits.len();
        if ingested > 0 {
            store.put_deposits(&deposits)?;
            for deposit in deposits {
                self.bus
                    .publish(EventId::DepositIngested, DepositIngestedEvent { deposit })
                    .await?;
            }
        }
        store.set_last_processed_eth1_block(target)?;

        if ingested > 0 {
            self.chain.note_deposits_ingested(ingested);
            let retryable = self.chain.clear_failed_blocks().await;
            info!(
                ingested,
                through_block = target,
                retryable_slots = retryable,
                "buffered deposits from the execution layer"
            );
        }
        Ok(ingested)
    }
}
