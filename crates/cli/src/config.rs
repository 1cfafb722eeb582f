//! Node configuration, loaded from TOML with CLI overrides.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use viridian_types::{ExecutionAddress, chain_spec::ChainSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base directory for databases and key material.
    pub data_dir: PathBuf,
    pub chain_spec: ChainSpec,
    pub engine: EngineConfig,
    pub deposits: DepositConfig,
    pub validator: ValidatorConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
    /// Build the next slot's payload speculatively on block verification.
    pub optimistic_builds: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub http_url: String,
    /// Hex-encoded 32-byte engine JWT secret file.
    pub jwt_path: Option<PathBuf>,
    pub call_timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositConfig {
    /// Execution JSON-RPC endpoint used for `eth_getLogs`; defaults to the
    /// engine endpoint when unset.
    pub eth1_rpc_url: Option<String>,
    pub contract_address: ExecutionAddress,
    pub poll_interval_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Hex-encoded BLS secret key file. Required when `enabled`.
    pub key_path: Option<PathBuf>,
    pub fee_recipient: ExecutionAddress,
    pub graffiti: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of each publisher's input and subscriber queues.
    pub queue_capacity: usize,
    /// Deadline for the validator service to hand back a proposal.
    pub proposal_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,viridian_chain=debug`.
    pub filter: String,
    /// Emit JSON lines instead of the human formatter.
    pub json: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./viridian-data"),
            chain_spec: ChainSpec::devnet(),
            engine: EngineConfig::default(),
            deposits: DepositConfig::default(),
            validator: ValidatorConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
            optimistic_builds: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8551".to_owned(),
            jwt_path: None,
            call_timeout_ms: 8_000,
            max_retries: 3,
        }
    }
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            eth1_rpc_url: None,
            contract_address: ExecutionAddress::ZERO,
            poll_interval_secs: 6,
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_path: None,
            fee_recipient: ExecutionAddress::ZERO,
            graffiti: String::new(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { queue_capacity: 64, proposal_timeout_ms: 4_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_owned(), json: false }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        toml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }

    /// Write the default configuration, used by `viridian init`.
    pub fn write_default(path: &Path) -> Result<(), std::io::Error> {
        let rendered = toml::to_string_pretty(&Self::default())
            .expect("default config always serializes");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, rendered)
    }
}
