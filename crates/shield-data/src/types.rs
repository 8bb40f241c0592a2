//! Type definitions for rescue data structures.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::ShieldError;

/// Rescue action a transaction template performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescueAction {
    /// Sweep the native balance to a safe address.
    EthRescue,
    /// ERC-20 `transfer` to a safe address.
    Erc20Rescue,
    /// ERC-721 `transferFrom` to a safe address.
    Erc721Rescue,
    /// ERC-20 `approve(spender, 0)`.
    ApprovalRevoke,
    /// ENS NameWrapper `safeTransferFrom` to a safe address.
    EnsTransfer,
    /// ENS PublicResolver `setText`.
    EnsRecord,
}

impl RescueAction {
    /// Every action, in display order.
    pub const ALL: [RescueAction; 6] = [
        RescueAction::EthRescue,
        RescueAction::Erc20Rescue,
        RescueAction::Erc721Rescue,
        RescueAction::ApprovalRevoke,
        RescueAction::EnsTransfer,
        RescueAction::EnsRecord,
    ];

    /// Stable snake_case tag.
    pub fn as_str(self) -> &'static str {
        match self {
            RescueAction::EthRescue => "eth_rescue",
            RescueAction::Erc20Rescue => "erc20_rescue",
            RescueAction::Erc721Rescue => "erc721_rescue",
            RescueAction::ApprovalRevoke => "approval_revoke",
            RescueAction::EnsTransfer => "ens_transfer",
            RescueAction::EnsRecord => "ens_record",
        }
    }
}

impl fmt::Display for RescueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fee-market fee pair in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Priority fee (tip) per gas in wei.
    pub max_priority_fee_per_gas: u128,
    /// Maximum total fee per gas in wei.
    pub max_fee_per_gas: u128,
}

impl GasConfig {
    /// Builds a fee pair from whole-gwei amounts.
    pub fn from_gwei(priority_gwei: u64, max_gwei: u64) -> Self {
        Self {
            max_priority_fee_per_gas: u128::from(priority_gwei) * GWEI,
            max_fee_per_gas: u128::from(max_gwei) * GWEI,
        }
    }
}

/// Wei per gwei.
pub const GWEI: u128 = 1_000_000_000;

/// Unsigned description of one rescue transaction.
///
/// For [`RescueAction::EthRescue`] the `value` is a zero placeholder that the
/// executors replace at broadcast time with `balance - gas_limit * max_fee`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTemplate {
    /// Destination address (safe wallet or target contract).
    pub to: Address,
    /// Encoded call data, if the action calls a contract.
    pub data: Option<Bytes>,
    /// Native value in wei (placeholder zero for ETH rescue).
    pub value: U256,
    /// Gas limit for the action.
    pub gas_limit: u64,
    /// Priority fee per gas in wei.
    pub max_priority_fee_per_gas: u128,
    /// Maximum fee per gas in wei.
    pub max_fee_per_gas: u128,
    /// Action tag.
    pub action: RescueAction,
    /// Human-readable label (e.g. token symbol).
    pub label: Option<String>,
}

impl TransactionTemplate {
    /// Worst-case gas cost in wei (`gas_limit * max_fee_per_gas`).
    pub fn max_gas_cost(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.max_fee_per_gas)
    }

    /// Native value to send given the sender's balance at trigger time.
    ///
    /// ETH rescue sweeps everything above the gas budget; other actions send
    /// their fixed value.
    ///
    /// # Errors
    /// Returns [`ShieldError::InsufficientFunds`] if an ETH rescue would send
    /// zero or less.
    pub fn send_value(&self, available_balance: U256) -> Result<U256, ShieldError> {
        if self.action != RescueAction::EthRescue {
            return Ok(self.value);
        }
        let gas_cost = self.max_gas_cost();
        if available_balance <= gas_cost {
            return Err(ShieldError::InsufficientFunds {
                required: gas_cost,
                available: available_balance,
            });
        }
        Ok(available_balance - gas_cost)
    }
}

/// Historical transaction touching the monitored address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
    /// Block number.
    pub block_number: u64,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    /// Gas price (or effective gas price) in wei.
    pub gas_price: u128,
}

/// One deposit paired with the first outgoing transfer after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepPattern {
    /// Deposit timestamp in unix seconds.
    pub deposit_timestamp: u64,
    /// Sweep timestamp in unix seconds.
    pub sweep_timestamp: u64,
    /// Sweep destination (None for contract creation).
    pub destination: Option<Address>,
    /// Sweep gas price in wei.
    pub gas_price: u128,
}

impl SweepPattern {
    /// Seconds between deposit and sweep.
    pub fn latency_seconds(&self) -> u64 {
        self.sweep_timestamp.saturating_sub(self.deposit_timestamp)
    }
}

/// Drainer risk classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No automated activity detected.
    Low,
    /// Likely automated sweeper.
    Medium,
    /// Confirmed fast drainer bot.
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(label)
    }
}

/// Result of one drainer analysis over a wallet's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrainerAnalysis {
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Whether bot-like activity was observed.
    pub bot_detected: bool,
    /// Number of deposit→sweep pairs (or same-destination outgoing transfers).
    pub sweep_count: usize,
    /// Average deposit→sweep latency in seconds, rounded.
    pub avg_sweep_seconds: Option<u64>,
    /// Dominant sweep destination.
    pub bot_destination: Option<Address>,
    /// Highest observed sweep gas price in gwei, rounded.
    pub estimated_bot_gas_gwei: Option<u64>,
    /// Human-readable recommendation.
    pub recommendation: String,
    /// Number of history transactions the analysis looked at.
    pub transactions_analyzed: usize,
}

impl DrainerAnalysis {
    /// Conservative result used when there is too little history.
    pub fn insufficient_history(transactions_analyzed: usize) -> Self {
        Self {
            risk_level: RiskLevel::Low,
            bot_detected: false,
            sweep_count: 0,
            avg_sweep_seconds: None,
            bot_destination: None,
            estimated_bot_gas_gwei: None,
            recommendation: "Not enough transaction history to analyze. Standard gas settings \
                             are a reasonable starting point."
                .to_string(),
            transactions_analyzed,
        }
    }
}

/// Terminal status of a rescue execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Mined successfully (or dry-run signed).
    Success,
    /// Mined but failed on-chain.
    Reverted,
    /// Not broadcast or not confirmed.
    Error,
}

/// Terminal value of one rescue execution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Broadcast transaction hash (sentinel for dry runs).
    pub tx_hash: Option<B256>,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Failure detail.
    pub error: Option<ShieldError>,
    /// True when nothing was transmitted.
    pub dry_run: bool,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
}

impl ExecutionResult {
    /// Failure before or during broadcast.
    pub fn failed(error: ShieldError, dry_run: bool) -> Self {
        Self {
            tx_hash: None,
            status: ExecutionStatus::Error,
            error: Some(error),
            dry_run,
            block_number: None,
        }
    }
}

/// Terminal status of a bundle submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    /// Both transactions landed (or dry-run built).
    Success,
    /// No candidate block included the bundle.
    NotIncluded,
    /// Bundle could not be built or submitted.
    Error,
}

/// Terminal value of one bundle execution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BundleResult {
    /// Relay-assigned bundle identifier.
    pub bundle_hash: Option<String>,
    /// Terminal status.
    pub status: BundleStatus,
    /// Failure detail.
    pub error: Option<ShieldError>,
    /// Last candidate block targeted.
    pub target_block: u64,
    /// Funding and rescue transaction hashes, in bundle order.
    pub tx_hashes: Vec<B256>,
    /// Block the rescue transaction was mined in.
    pub included_block: Option<u64>,
}

impl BundleResult {
    /// Bundle could not be built or submitted.
    pub fn failed(error: ShieldError, target_block: u64) -> Self {
        Self {
            bundle_hash: None,
            status: BundleStatus::Error,
            error: Some(error),
            target_block,
            tx_hashes: Vec::new(),
            included_block: None,
        }
    }
}
