//! Immutable runtime configuration.
//!
//! Every tunable constant (gas limits, detector thresholds, poll intervals,
//! relay URLs, scan ranges) lives here and is handed to components at
//! construction. Loaded from an optional TOML file; missing sections and keys
//! take the documented defaults.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::{address, Address};
use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{GasConfig, RescueAction};

/// Default Flashbots Protect RPC (private transaction submission).
pub const DEFAULT_PRIVATE_RPC_URL: &str = "https://rpc.flashbots.net";

/// Default Flashbots bundle relay.
pub const DEFAULT_RELAY_URL: &str = "https://relay.flashbots.net";

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub network: NetworkConfig,
    pub detector: DetectorConfig,
    pub monitor: MonitorConfig,
    pub execution: ExecutionConfig,
    pub bundle: BundleConfig,
    pub gas_limits: GasLimits,
    pub presets: GasPresets,
    pub ens: EnsConfig,
}

/// Endpoints and chain settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Public RPC endpoint; `SHIELD_RPC_URL` takes precedence when set.
    pub rpc_url: Option<String>,
    /// Private-mempool RPC used for protected broadcasts.
    pub private_rpc_url: String,
    /// Bundle relay endpoint.
    pub relay_url: String,
    /// Explorer API key (`SHIELD_EXPLORER_KEY` takes precedence).
    pub explorer_api_key: Option<String>,
    /// Explorer base URL override; otherwise chosen by chain id.
    pub explorer_url: Option<String>,
    /// Chain id used for offline signing when the provider cannot be asked.
    pub chain_id: u64,
    /// HTTP timeout for every JSON-RPC request.
    pub rpc_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            private_rpc_url: DEFAULT_PRIVATE_RPC_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            explorer_api_key: None,
            explorer_url: None,
            chain_id: 1,
            rpc_timeout_ms: 10_000,
        }
    }
}

impl NetworkConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Drainer detector thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum number of history transactions analyzed.
    pub tx_scan_count: usize,
    /// Timeout for the indexed history source.
    pub history_timeout_ms: u64,
    /// Number of recent blocks scanned when the history source is unavailable.
    pub fallback_block_range: u64,
    /// Timeout per block fetch during the fallback scan.
    pub block_fetch_timeout_ms: u64,
    /// Concurrent block fetches during the fallback scan.
    pub block_fetch_concurrency: usize,
    /// A sweep within this many seconds of its deposit counts as fast.
    pub fast_sweep_seconds: u64,
    /// Fast sweeps needed, together with `aggressive_concentration`, for an aggressive bot.
    pub aggressive_fast_sweeps: usize,
    /// Destination concentration needed for an aggressive bot.
    pub aggressive_concentration: f64,
    /// Fast sweeps that confirm a bot on their own.
    pub confirmed_fast_sweeps: usize,
    /// Destination concentration above which sweeps look automated.
    pub concentration_threshold: f64,
    /// Priority-fee multiplier over bot gas for high risk.
    pub high_fee_multiplier: f64,
    /// Priority-fee multiplier over bot gas for medium risk.
    pub medium_fee_multiplier: f64,
    /// Bot gas assumed when no sweep gas price was observed.
    pub default_bot_gas_gwei: f64,
    /// Flag wallets whose outgoing transfers all go to one address.
    pub single_destination_heuristic: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tx_scan_count: 20,
            history_timeout_ms: 8_000,
            fallback_block_range: 100,
            block_fetch_timeout_ms: 3_000,
            block_fetch_concurrency: 10,
            fast_sweep_seconds: 15,
            aggressive_fast_sweeps: 3,
            aggressive_concentration: 0.7,
            confirmed_fast_sweeps: 2,
            concentration_threshold: 0.5,
            high_fee_multiplier: 1.5,
            medium_fee_multiplier: 1.2,
            default_bot_gas_gwei: 10.0,
            single_destination_heuristic: true,
        }
    }
}

impl DetectorConfig {
    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }

    pub fn block_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.block_fetch_timeout_ms)
    }
}

/// Balance monitor cadence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            poll_timeout_ms: 5_000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Rescue executor retry and confirmation bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Total broadcast attempts before giving up.
    pub broadcast_attempts: u32,
    pub retry_backoff_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    /// Bound on each nonce, chain-id and broadcast call.
    pub rpc_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            broadcast_attempts: 2,
            retry_backoff_ms: 500,
            confirmation_timeout_ms: 120_000,
            receipt_poll_interval_ms: 1_000,
            rpc_timeout_ms: 10_000,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Atomic bundle submission window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Consecutive candidate blocks tried, starting at head + 1.
    pub max_candidate_blocks: u64,
    /// Wait per candidate for the chain to reach it.
    pub inclusion_wait_ms: u64,
    pub block_poll_interval_ms: u64,
    pub relay_timeout_ms: u64,
    /// Bound on each chain read made while building and tracking a bundle.
    pub rpc_timeout_ms: u64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_candidate_blocks: 5,
            inclusion_wait_ms: 30_000,
            block_poll_interval_ms: 1_000,
            relay_timeout_ms: 10_000,
            rpc_timeout_ms: 10_000,
        }
    }
}

impl BundleConfig {
    pub fn inclusion_wait(&self) -> Duration {
        Duration::from_millis(self.inclusion_wait_ms)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Gas limit per rescue action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
    pub eth_rescue: u64,
    pub erc20_rescue: u64,
    pub erc721_rescue: u64,
    pub approval_revoke: u64,
    pub ens_transfer: u64,
    pub ens_record: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            eth_rescue: 21_000,
            erc20_rescue: 65_000,
            erc721_rescue: 100_000,
            approval_revoke: 65_000,
            ens_transfer: 120_000,
            ens_record: 80_000,
        }
    }
}

impl GasLimits {
    pub fn for_action(&self, action: RescueAction) -> u64 {
        match action {
            RescueAction::EthRescue => self.eth_rescue,
            RescueAction::Erc20Rescue => self.erc20_rescue,
            RescueAction::Erc721Rescue => self.erc721_rescue,
            RescueAction::ApprovalRevoke => self.approval_revoke,
            RescueAction::EnsTransfer => self.ens_transfer,
            RescueAction::EnsRecord => self.ens_record,
        }
    }
}

/// Priority/max fee pair in gwei.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetFees {
    pub priority_gwei: u64,
    pub max_gwei: u64,
}

impl PresetFees {
    pub fn gas_config(&self) -> GasConfig {
        GasConfig::from_gwei(self.priority_gwei, self.max_gwei)
    }
}

/// Named gas presets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPresets {
    pub normal: PresetFees,
    pub fast: PresetFees,
    pub aggressive: PresetFees,
}

impl Default for GasPresets {
    fn default() -> Self {
        Self {
            normal: PresetFees {
                priority_gwei: 3,
                max_gwei: 50,
            },
            fast: PresetFees {
                priority_gwei: 10,
                max_gwei: 100,
            },
            aggressive: PresetFees {
                priority_gwei: 25,
                max_gwei: 200,
            },
        }
    }
}

/// ENS contract addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsConfig {
    pub name_wrapper: Address,
    pub public_resolver: Address,
}

impl Default for EnsConfig {
    fn default() -> Self {
        Self {
            name_wrapper: address!("D4416b13d2b3a9aBae7AcD5D6C2BbDBE25686401"),
            public_resolver: address!("231b0Ee14048e9dCcD1d247744d114a4EB5E8E63"),
        }
    }
}

impl ShieldConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a present but malformed file is an
    /// error so that mistyped thresholds are never silently ignored.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;

        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Rejects values that would stall or disable a component.
    ///
    /// # Errors
    /// Returns error naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(eyre!("monitor.poll_interval_ms must be > 0"));
        }
        if self.execution.broadcast_attempts == 0 {
            return Err(eyre!("execution.broadcast_attempts must be > 0"));
        }
        if self.bundle.max_candidate_blocks == 0 {
            return Err(eyre!("bundle.max_candidate_blocks must be > 0"));
        }
        if self.bundle.block_poll_interval_ms == 0 || self.execution.receipt_poll_interval_ms == 0
        {
            return Err(eyre!("poll intervals must be > 0"));
        }
        for (key, timeout) in [
            ("network.rpc_timeout_ms", self.network.rpc_timeout_ms),
            ("execution.rpc_timeout_ms", self.execution.rpc_timeout_ms),
            ("execution.confirmation_timeout_ms", self.execution.confirmation_timeout_ms),
            ("bundle.rpc_timeout_ms", self.bundle.rpc_timeout_ms),
            ("bundle.inclusion_wait_ms", self.bundle.inclusion_wait_ms),
            ("bundle.relay_timeout_ms", self.bundle.relay_timeout_ms),
        ] {
            if timeout == 0 {
                return Err(eyre!("{key} must be > 0"));
            }
        }
        if self.detector.tx_scan_count < 2 {
            return Err(eyre!("detector.tx_scan_count must be >= 2"));
        }
        for (key, ratio) in [
            ("aggressive_concentration", self.detector.aggressive_concentration),
            ("concentration_threshold", self.detector.concentration_threshold),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(eyre!("detector.{key} must be within [0, 1], got {ratio}"));
            }
        }
        Ok(())
    }
}

/// Human-readable network name for a chain id.
pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "Ethereum Mainnet",
        5 => "Goerli",
        11155111 => "Sepolia",
        _ => "Unknown network",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = ShieldConfig::load(dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, ShieldConfig::default());
        assert_eq!(config.gas_limits.for_action(RescueAction::EnsTransfer), 120_000);
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(300));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("shield.toml");
        std::fs::write(
            &path,
            "[detector]\nfast_sweep_seconds = 30\n\n[bundle]\nmax_candidate_blocks = 8\n",
        )
        .expect("write config");

        let config = ShieldConfig::load(&path).expect("load");
        assert_eq!(config.detector.fast_sweep_seconds, 30);
        assert_eq!(config.detector.tx_scan_count, 20);
        assert_eq!(config.bundle.max_candidate_blocks, 8);
        assert_eq!(config.network.relay_url, DEFAULT_RELAY_URL);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("shield.toml");
        std::fs::write(&path, "[detector\nfast_sweep_seconds = ").expect("write config");
        assert!(ShieldConfig::load(&path).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_ratio() {
        let mut config = ShieldConfig::default();
        config.detector.concentration_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = ShieldConfig::default();
        config.execution.broadcast_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unbounded_calls() {
        let mut config = ShieldConfig::default();
        config.bundle.rpc_timeout_ms = 0;
        let err = config.validate().expect_err("zero timeout");
        assert!(err.to_string().contains("bundle.rpc_timeout_ms"));
    }

    #[test]
    fn chain_names_cover_supported_networks() {
        assert_eq!(chain_name(1), "Ethereum Mainnet");
        assert_eq!(chain_name(11155111), "Sepolia");
        assert_eq!(chain_name(42), "Unknown network");
    }
}
