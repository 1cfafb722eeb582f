//! Build and run the full component stack.

use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use color_eyre::eyre::{self, Context as _, eyre};
use prometheus_client::registry::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use viridian_chain::{
    ChainService, ChainStore, ConsensusMiddleware, ValidatorService,
    deposit_fetcher::DepositFetcher,
    metrics::ChainMetrics,
    service::ChainServiceConfig,
    validator::graffiti_from_bytes,
};
use viridian_cli::NodeConfig;
use viridian_da::{BlobProcessor, RedbAvailabilityStore, metrics::BlobMetrics};
use viridian_events::{
    BlockCommittedEvent, BlockProposalEvent, DepositIngestedEvent, EventBus, EventId,
    NewSlotEvent, Publisher,
};
use viridian_execution::{
    EngineClient, PayloadBuilder,
    client::EngineClientConfig,
    deposits::RpcDepositReader,
    jwt::JwtProvider,
    transport::http::HttpTransport,
};
use viridian_state_transition::StateProcessor;
use viridian_types::crypto::BlsSecretKey;

pub struct Node {
    pub config: NodeConfig,
    pub genesis_path: PathBuf,
}

/// Everything the embedding host-consensus runtime needs to drive the node,
/// plus the handles to wind it down.
pub struct NodeHandle {
    pub middleware: Arc<ConsensusMiddleware>,
    pub chain: Arc<ChainService>,
    pub metrics: Registry,
    pub cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub fn new(config: NodeConfig, genesis_path: PathBuf) -> Self {
        Self { config, genesis_path }
    }

    /// Wire every component and start the long-running tasks. The returned
    /// handle exposes the middleware for the host consensus to call.
    pub fn start(&self) -> eyre::Result<NodeHandle> {
        let config = &self.config;
        let spec = config.chain_spec.clone();
        let cancel = CancellationToken::new();
        let mut registry = Registry::default();

        fs::create_dir_all(&config.data_dir)
            .wrap_err("failed to create data directory")?;

        // Stores.
        let chain_store = Arc::new(
            ChainStore::open(config.data_dir.join("chain.redb"))
                .map_err(|e| eyre!("failed to open chain store: {e}"))?,
        );
        let availability_store = Arc::new(
            RedbAvailabilityStore::open(config.data_dir.join("blobs.redb"))
                .map_err(|e| eyre!("failed to open availability store: {e}"))?,
        );

        // Event bus, one publisher per event id.
        let bus = EventBus::new();
        let capacity = config.events.queue_capacity;
        bus.register(Publisher::<NewSlotEvent>::new(EventId::NewSlot, capacity))?;
        bus.register(Publisher::<BlockCommittedEvent>::new(EventId::BlockCommitted, capacity))?;
        bus.register(Publisher::<BlockProposalEvent>::new(EventId::BlockProposal, capacity))?;
        bus.register(Publisher::<DepositIngestedEvent>::new(
            EventId::DepositIngested,
            capacity,
        ))?;

        // Engine client.
        let engine_url: Url =
            config.engine.http_url.parse().wrap_err("invalid engine URL")?;
        let mut transport = HttpTransport::new(engine_url.clone());
        if let Some(jwt_path) = &config.engine.jwt_path {
            let raw = fs::read_to_string(jwt_path).wrap_err("failed to read JWT secret")?;
            let secret = JwtProvider::secret_from_hex(&raw).map_err(|e| eyre!(e))?;
            transport = transport.with_jwt(secret);
        }
        let engine = Arc::new(EngineClient::new(
            transport,
            EngineClientConfig {
                call_timeout: Duration::from_millis(config.engine.call_timeout_ms),
                max_retries: config.engine.max_retries,
                ..Default::default()
            },
        ));

        // Core services.
        let payload_builder = Arc::new(PayloadBuilder::new(engine.clone() as _));
        let blob_metrics = BlobMetrics::new();
        blob_metrics.register(&mut registry);
        let blob_processor = Arc::new(BlobProcessor::new(
            spec.clone(),
            availability_store as _,
            blob_metrics,
        ));
        let chain_metrics = ChainMetrics::new();
        chain_metrics.register(&mut registry);

        let chain = Arc::new(ChainService::new(
            ChainServiceConfig {
                optimistic_builds: config.optimistic_builds,
                fee_recipient: config.validator.fee_recipient,
            },
            Arc::clone(&chain_store),
            Arc::clone(&blob_processor),
            engine.clone() as _,
            Arc::clone(&payload_builder),
            StateProcessor::new(spec.clone()),
            bus.clone(),
            chain_metrics,
        ));

        // First boot: seed the chain from the genesis file. On later boots
        // the store already holds the last committed state and the host
        // consensus replays from there.
        if chain_store.head_slot().map_err(|e| eyre!("{e}"))?.is_none() {
            let genesis_bytes = fs::read(&self.genesis_path)
                .wrap_err("failed to read genesis file")?;
            let updates = chain.init_chain(&genesis_bytes)?;
            info!(validators = updates.len(), "initialized chain from genesis file");
        }

        let middleware = Arc::new(ConsensusMiddleware::new(
            spec.clone(),
            Arc::clone(&chain),
            bus.clone(),
            Duration::from_millis(config.events.proposal_timeout_ms),
        )?);

        let mut tasks = bus.start(cancel.clone());

        // Deposit follower over the execution JSON-RPC endpoint.
        let eth1_url: Url = config
            .deposits
            .eth1_rpc_url
            .clone()
            .unwrap_or_else(|| config.engine.http_url.clone())
            .parse()
            .wrap_err("invalid eth1 RPC URL")?;
        let deposit_reader = Arc::new(RpcDepositReader::new(
            HttpTransport::new(eth1_url),
            config.deposits.contract_address,
        ));
        let fetcher = DepositFetcher::new(
            Arc::clone(&chain),
            deposit_reader,
            bus.clone(),
            Duration::from_secs(config.deposits.poll_interval_secs),
            spec.eth1_follow_distance,
        );
        tasks.push(fetcher.spawn(cancel.clone()));

        // Validator service, only with a signing key.
        if config.validator.enabled {
            let key_path = config
                .validator
                .key_path
                .as_ref()
                .ok_or_else(|| eyre!("validator enabled but no key_path configured"))?;
            let raw = fs::read_to_string(key_path).wrap_err("failed to read validator key")?;
            let stripped = raw.trim().trim_start_matches("0x");
            let key_bytes = hex::decode(stripped).wrap_err("invalid validator key hex")?;
            let signer = BlsSecretKey::from_bytes(&key_bytes).map_err(|e| eyre!(e))?;

            let validator = ValidatorService::new(
                bus.clone(),
                Arc::clone(&chain_store),
                Arc::clone(&payload_builder),
                Arc::new(StateProcessor::new(spec.clone())),
                signer,
                config.validator.fee_recipient,
                graffiti_from_bytes(config.validator.graffiti.as_bytes()),
            )?;
            let validator_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(error) = validator.run(validator_cancel).await {
                    warn!(%error, "validator service stopped with error");
                }
            }));
        }

        info!(
            engine = %engine_url,
            data_dir = %config.data_dir.display(),
            validator = config.validator.enabled,
            "viridian node started"
        );

        Ok(NodeHandle { middleware, chain, metrics: registry, cancel, tasks })
    }
}

impl NodeHandle {
    /// Signal shutdown and wait for every task to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
