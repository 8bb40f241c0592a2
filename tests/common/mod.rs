//! Shared test doubles and factories.
//!
//! `MockLedger` is a scripted in-memory chain node and `MockRelay` a scripted
//! bundle relay. Both record every call so tests can assert on what was (or
//! was not) transmitted.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use shield_data::error::ShieldError;
use shield_data::provider::{
    FeeEstimate, LedgerBlock, LedgerProvider, LogEntry, LogQuery, ReceiptSummary,
};
use shield_data::types::{GasConfig, HistoricalTransaction, RescueAction, TransactionTemplate};
use shield_exec::relay::{BundleRelay, BundleSubmission, RelayResponse};
use shield_exec::signer::signer_from_key;
use shield_exec::SigningIdentity;

/// Anvil dev account 0, used as the compromised wallet.
pub const COMPROMISED_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Anvil dev account 1, used as the funding wallet.
pub const FUNDING_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const SAFE: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

pub const ONE_ETH: u128 = 1_000_000_000_000_000_000;

pub fn compromised() -> PrivateKeySigner {
    signer_from_key(COMPROMISED_KEY).expect("dev key 0")
}

pub fn funding() -> PrivateKeySigner {
    signer_from_key(FUNDING_KEY).expect("dev key 1")
}

pub fn eth(amount: u128) -> U256 {
    U256::from(amount * ONE_ETH)
}

/// ETH-sweep template to [`SAFE`] at 2/50 gwei.
pub fn eth_template() -> TransactionTemplate {
    let gas = GasConfig::from_gwei(2, 50);
    TransactionTemplate {
        to: SAFE,
        data: None,
        value: U256::ZERO,
        gas_limit: 21_000,
        max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
        max_fee_per_gas: gas.max_fee_per_gas,
        action: RescueAction::EthRescue,
        label: None,
    }
}

/// History record with a synthetic hash derived from `seq`.
pub fn history_tx(
    seq: u64,
    from: Address,
    to: Address,
    value: U256,
    timestamp: u64,
    gas_gwei: u128,
) -> HistoricalTransaction {
    HistoricalTransaction {
        hash: keccak256(seq.to_be_bytes()),
        from,
        to: Some(to),
        value,
        block_number: 19_000_000 + seq,
        timestamp,
        gas_price: gas_gwei * 1_000_000_000,
    }
}

/// Three deposits, each swept to `bot` two seconds later.
pub fn bot_history(wallet: Address, bot: Address) -> Vec<HistoricalTransaction> {
    let funder = address!("90F79bf6EB2c4f870365E785982E1f101E93b906");
    let mut txs = Vec::new();
    for i in 0..3u64 {
        let t = 1_700_000_000 + i * 600;
        txs.push(history_tx(i * 2, funder, wallet, eth(1), t, 20));
        txs.push(history_tx(i * 2 + 1, wallet, bot, eth(1), t + 2, 80));
    }
    txs
}

#[derive(Default)]
struct LedgerState {
    chain_id: u64,
    /// Scripted per-address readings; the last one repeats.
    balances: HashMap<Address, VecDeque<Result<U256, ShieldError>>>,
    balance_delay: Option<Duration>,
    balance_calls: usize,
    /// Scripted heights; the last one repeats.
    heights: VecDeque<u64>,
    height_error: Option<ShieldError>,
    height_calls: usize,
    /// Height polls past this many never answer.
    hang_heights_after: Option<usize>,
    blocks: HashMap<u64, LedgerBlock>,
    failing_blocks: HashSet<u64>,
    block_requests: Vec<u64>,
    receipts: HashMap<B256, ReceiptSummary>,
    /// Confirm any queried hash in this block with this outcome.
    confirm_all: Option<(u64, bool)>,
    nonces: HashMap<Address, u64>,
    send_errors: VecDeque<ShieldError>,
    /// Broadcasts are recorded but never answered.
    hang_sends: bool,
    sent: Vec<Bytes>,
    logs: Option<Result<Vec<LogEntry>, ShieldError>>,
    /// Contract call answers keyed by target and calldata.
    calls: HashMap<(Address, Bytes), Result<Bytes, ShieldError>>,
    call_count: usize,
    log_queries: Vec<LogQuery>,
}

/// Scripted [`LedgerProvider`].
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                chain_id: 1,
                heights: VecDeque::from([100]),
                ..LedgerState::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        let mut state = self.state.lock().expect("mock ledger lock");
        f(&mut state)
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.script_balances(address, vec![Ok(balance)]);
    }

    pub fn script_balances(&self, address: Address, readings: Vec<Result<U256, ShieldError>>) {
        self.with(|s| {
            s.balances.insert(address, readings.into());
        });
    }

    pub fn set_balance_delay(&self, delay: Duration) {
        self.with(|s| s.balance_delay = Some(delay));
    }

    pub fn script_heights(&self, heights: Vec<u64>) {
        self.with(|s| s.heights = heights.into());
    }

    pub fn fail_block_number(&self, error: ShieldError) {
        self.with(|s| s.height_error = Some(error));
    }

    /// Answers the first `calls` height polls, then hangs forever.
    pub fn hang_block_number_after(&self, calls: usize) {
        self.with(|s| s.hang_heights_after = Some(calls));
    }

    pub fn hang_sends(&self) {
        self.with(|s| s.hang_sends = true);
    }

    pub fn add_block(&self, block: LedgerBlock) {
        self.with(|s| {
            s.blocks.insert(block.number, block);
        });
    }

    pub fn fail_block(&self, number: u64) {
        self.with(|s| {
            s.failing_blocks.insert(number);
        });
    }

    pub fn confirm_all(&self, block_number: u64, success: bool) {
        self.with(|s| s.confirm_all = Some((block_number, success)));
    }

    /// Mines `raw` transactions into `block_number`.
    pub fn include(&self, raw: &[Bytes], block_number: u64, success: bool) {
        self.with(|s| {
            for tx in raw {
                let tx_hash = keccak256(tx);
                s.receipts.insert(
                    tx_hash,
                    ReceiptSummary {
                        tx_hash,
                        block_number: Some(block_number),
                        success,
                    },
                );
            }
        });
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.with(|s| {
            s.nonces.insert(address, nonce);
        });
    }

    pub fn fail_next_sends(&self, errors: Vec<ShieldError>) {
        self.with(|s| s.send_errors = errors.into());
    }

    pub fn set_logs(&self, logs: Result<Vec<LogEntry>, ShieldError>) {
        self.with(|s| s.logs = Some(logs));
    }

    /// Answers `eth_call` to `to` with exactly `data`. Unscripted calls
    /// return a zero word.
    pub fn set_call(&self, to: Address, data: Vec<u8>, answer: Result<Bytes, ShieldError>) {
        self.with(|s| {
            s.calls.insert((to, Bytes::from(data)), answer);
        });
    }

    pub fn call_count(&self) -> usize {
        self.with(|s| s.call_count)
    }

    /// Raw transactions submitted, including failed submissions.
    pub fn sent(&self) -> Vec<Bytes> {
        self.with(|s| s.sent.clone())
    }

    pub fn balance_calls(&self) -> usize {
        self.with(|s| s.balance_calls)
    }

    pub fn block_requests(&self) -> Vec<u64> {
        self.with(|s| s.block_requests.clone())
    }

    pub fn log_queries(&self) -> Vec<LogQuery> {
        self.with(|s| s.log_queries.clone())
    }
}

fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl LedgerProvider for MockLedger {
    async fn chain_id(&self) -> Result<u64, ShieldError> {
        Ok(self.with(|s| s.chain_id))
    }

    async fn balance(&self, address: Address) -> Result<U256, ShieldError> {
        let (reading, delay) = self.with(|s| {
            s.balance_calls += 1;
            let reading = s
                .balances
                .get_mut(&address)
                .and_then(next_sticky)
                .unwrap_or(Ok(U256::ZERO));
            (reading, s.balance_delay)
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reading
    }

    async fn block_number(&self) -> Result<u64, ShieldError> {
        let (reading, hang) = self.with(|s| {
            s.height_calls += 1;
            let hang = s.hang_heights_after.is_some_and(|limit| s.height_calls > limit);
            let reading = match &s.height_error {
                Some(e) => Err(e.clone()),
                None => Ok(next_sticky(&mut s.heights).unwrap_or(0)),
            };
            (reading, hang)
        });
        if hang {
            std::future::pending::<()>().await;
        }
        reading
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<LedgerBlock>, ShieldError> {
        self.with(|s| {
            s.block_requests.push(number);
            if s.failing_blocks.contains(&number) {
                return Err(ShieldError::Transport(format!("block {number} unavailable")));
            }
            Ok(s.blocks.get(&number).cloned())
        })
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, ShieldError> {
        self.with(|s| {
            if let Some(receipt) = s.receipts.get(&tx_hash) {
                return Ok(Some(*receipt));
            }
            Ok(s.confirm_all.map(|(block, success)| ReceiptSummary {
                tx_hash,
                block_number: Some(block),
                success,
            }))
        })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ShieldError> {
        Ok(FeeEstimate {
            gas_price: 20_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        })
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ShieldError> {
        Ok(self.with(|s| s.nonces.get(&address).copied().unwrap_or(0)))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ShieldError> {
        let (result, hang) = self.with(|s| {
            s.sent.push(Bytes::copy_from_slice(raw));
            let result = match s.send_errors.pop_front() {
                Some(e) => Err(e),
                None => Ok(keccak256(raw)),
            };
            (result, s.hang_sends)
        });
        if hang {
            std::future::pending::<()>().await;
        }
        result
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ShieldError> {
        self.with(|s| {
            s.log_queries.push(query.clone());
            s.logs.clone().unwrap_or(Ok(Vec::new()))
        })
    }

    async fn call(&self, to: Address, data: &[u8]) -> Result<Bytes, ShieldError> {
        self.with(|s| {
            s.call_count += 1;
            s.calls
                .get(&(to, Bytes::copy_from_slice(data)))
                .cloned()
                .unwrap_or_else(|| Ok(Bytes::from(U256::ZERO.to_be_bytes::<32>().to_vec())))
        })
    }
}

/// Scripted [`BundleRelay`].
///
/// Responses are consumed in order; once exhausted the default applies. When
/// built with [`MockRelay::including_into`], every accepted bundle is mined
/// into its target block on that ledger.
pub struct MockRelay {
    responses: Mutex<VecDeque<Result<RelayResponse, ShieldError>>>,
    default: RelayResponse,
    submissions: Mutex<Vec<(BundleSubmission, Address)>>,
    ledger: Option<Arc<MockLedger>>,
}

impl MockRelay {
    pub fn rejecting(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default: RelayResponse::Rejected {
                message: message.to_string(),
            },
            submissions: Mutex::new(Vec::new()),
            ledger: None,
        }
    }

    pub fn accepting() -> Self {
        Self {
            default: RelayResponse::Accepted {
                bundle_hash: Some("0xb0b".into()),
            },
            ..Self::rejecting("")
        }
    }

    pub fn including_into(ledger: Arc<MockLedger>) -> Self {
        Self {
            ledger: Some(ledger),
            ..Self::accepting()
        }
    }

    pub fn script(self, responses: Vec<Result<RelayResponse, ShieldError>>) -> Self {
        *self.responses.lock().expect("relay lock") = responses.into();
        self
    }

    /// Submitted bundles with the address that authenticated each.
    pub fn submissions(&self) -> Vec<(BundleSubmission, Address)> {
        self.submissions.lock().expect("relay lock").clone()
    }
}

#[async_trait]
impl BundleRelay for MockRelay {
    async fn send_bundle(
        &self,
        bundle: &BundleSubmission,
        auth: &dyn SigningIdentity,
    ) -> Result<RelayResponse, ShieldError> {
        self.submissions
            .lock()
            .expect("relay lock")
            .push((bundle.clone(), auth.address()));

        let response = self
            .responses
            .lock()
            .expect("relay lock")
            .pop_front()
            .unwrap_or_else(|| Ok(self.default.clone()));

        if let (Ok(RelayResponse::Accepted { .. }), Some(ledger)) = (&response, &self.ledger) {
            ledger.include(&bundle.txs, bundle.block_number, true);
        }
        response
    }
}
