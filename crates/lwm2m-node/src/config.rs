//! TOML configuration for the exchange node and simulator.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use lwm2m_core::{Clock, RandomSource};
use lwm2m_exchange::block::MIN_BLOCK_SIZE;
use lwm2m_exchange::timing::{
    DEFAULT_ACK_RANDOM_FACTOR, DEFAULT_ACK_TIMEOUT, DEFAULT_MAX_RETRANSMIT,
    DEFAULT_SERVER_EXCHANGE_TIMEOUT,
};
use lwm2m_exchange::{DEFAULT_CACHE_ENTRIES, Exchange, ExchangeCache, TxParams};

use crate::error::NodeError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub simulation: SimulationSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s)
            .map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the exchange layer would reject later.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.tx_params()?;
        if self.exchange.server_exchange_timeout_ms == 0 {
            return Err(NodeError::Config(
                "server_exchange_timeout_ms must be positive".into(),
            ));
        }
        if self.exchange.buffer_size < MIN_BLOCK_SIZE {
            return Err(NodeError::Config(format!(
                "buffer_size must be at least {MIN_BLOCK_SIZE}, got {}",
                self.exchange.buffer_size
            )));
        }
        if self.cache.enabled && self.cache.entries == 0 {
            return Err(NodeError::Config("cache.entries must be positive".into()));
        }
        let loss = self.simulation.loss_rate;
        if !(0.0..=1.0).contains(&loss) {
            return Err(NodeError::Config(format!(
                "loss_rate must be within [0, 1], got {loss}"
            )));
        }
        if self.simulation.tick_ms == 0 {
            return Err(NodeError::Config("tick_ms must be positive".into()));
        }
        Ok(())
    }

    /// Transmission parameters from the `[exchange]` section.
    pub fn tx_params(&self) -> Result<TxParams, NodeError> {
        TxParams::new(
            Duration::from_millis(self.exchange.ack_timeout_ms),
            self.exchange.ack_random_factor,
            self.exchange.max_retransmit,
        )
        .map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn server_exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange.server_exchange_timeout_ms)
    }

    /// Apply timing and cache settings to `exchange`.
    pub fn configure<C: Clock, R: RandomSource>(
        &self,
        exchange: &mut Exchange<C, R>,
    ) -> Result<(), NodeError> {
        exchange
            .set_tx_params(self.tx_params()?)
            .map_err(|e| NodeError::Config(e.to_string()))?;
        exchange
            .set_server_request_timeout(self.server_exchange_timeout())
            .map_err(|e| NodeError::Config(e.to_string()))?;
        if self.cache.enabled {
            let cache = ExchangeCache::new(self.cache.entries)
                .map_err(|e| NodeError::Config(e.to_string()))?;
            exchange.setup_cache(cache);
        }
        Ok(())
    }
}

/// The `[exchange]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_ack_random_factor")]
    pub ack_random_factor: f64,
    #[serde(default = "default_max_retransmit")]
    pub max_retransmit: u16,
    #[serde(default = "default_server_exchange_timeout_ms")]
    pub server_exchange_timeout_ms: u64,
    /// Capacity of the message buffer; bounds the block size.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_ack_timeout_ms() -> u64 {
    DEFAULT_ACK_TIMEOUT.as_millis() as u64
}

fn default_ack_random_factor() -> f64 {
    DEFAULT_ACK_RANDOM_FACTOR
}

fn default_max_retransmit() -> u16 {
    DEFAULT_MAX_RETRANSMIT
}

fn default_server_exchange_timeout_ms() -> u64 {
    DEFAULT_SERVER_EXCHANGE_TIMEOUT.as_millis() as u64
}

fn default_buffer_size() -> usize {
    1024
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            ack_random_factor: default_ack_random_factor(),
            max_retransmit: default_max_retransmit(),
            server_exchange_timeout_ms: default_server_exchange_timeout_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// The `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Total responses remembered, the most recent one included.
    #[serde(default = "default_cache_entries")]
    pub entries: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_entries() -> usize {
    DEFAULT_CACHE_ENTRIES
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            entries: default_cache_entries(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The `[simulation]` section, used by the simulator binary.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    /// Bytes sent by the simulated client.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Probability that the simulated link drops a datagram, per direction.
    #[serde(default)]
    pub loss_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Manual clock step between polls.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_payload_size() -> usize {
    4096
}

fn default_seed() -> u64 {
    1
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            payload_size: default_payload_size(),
            loss_rate: 0.0,
            seed: default_seed(),
            tick_ms: default_tick_ms(),
        }
    }
}
