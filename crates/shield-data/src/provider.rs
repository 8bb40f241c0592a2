//! Ledger query provider.
//!
//! [`LedgerProvider`] is the seam between the rescue engine and the chain.
//! [`AlloyLedger`] implements it over an Alloy HTTP provider; tests implement
//! it with scripted in-memory doubles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::{Ethereum, TransactionResponse};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::eth::{
    BlockId, BlockNumberOrTag, Filter, TransactionInput, TransactionRequest,
};
use alloy::transports::http::Http;
use async_trait::async_trait;

use crate::error::ShieldError;
use crate::types::HistoricalTransaction;

/// Per-request HTTP timeout used by [`AlloyLedger::new`].
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Awaits one provider call, failing with [`ShieldError::Transport`] once
/// `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, call: &str, fut: F) -> Result<T, ShieldError>
where
    F: Future<Output = Result<T, ShieldError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ShieldError::Transport(format!(
            "{call} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Block header fields plus its transactions, mapped to history records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerBlock {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<HistoricalTransaction>,
}

/// The parts of a receipt the executors act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    /// True when execution succeeded.
    pub success: bool,
}

/// Network fee estimate in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_price: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Event-log query by emitter, topics and block range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Option<Address>,
    pub from_block: u64,
    pub to_block: u64,
    /// Topic filters by position; `None` matches anything.
    pub topics: [Option<B256>; 4],
}

/// One emitted event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
}

/// Read and submit operations the rescue engine needs from a chain node.
///
/// Implementations must be cheap to share: one instance is reused read-only
/// by every component of a rescue attempt.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    /// Chain id of the connected network.
    async fn chain_id(&self) -> Result<u64, ShieldError>;

    /// Latest balance of `address` in wei.
    async fn balance(&self, address: Address) -> Result<U256, ShieldError>;

    /// Current chain height.
    async fn block_number(&self) -> Result<u64, ShieldError>;

    /// Block `number` with its full transactions, `None` if unknown.
    async fn block_with_transactions(&self, number: u64)
        -> Result<Option<LedgerBlock>, ShieldError>;

    /// Receipt for `tx_hash`, `None` while pending or unknown.
    async fn transaction_receipt(&self, tx_hash: B256)
        -> Result<Option<ReceiptSummary>, ShieldError>;

    /// Current fee estimate.
    async fn fee_estimate(&self) -> Result<FeeEstimate, ShieldError>;

    /// Next nonce for `address`.
    async fn transaction_count(&self, address: Address) -> Result<u64, ShieldError>;

    /// Submits a signed EIP-2718 transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ShieldError>;

    /// Event logs matching `query`.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ShieldError>;

    /// Read-only contract call (`eth_call`) against the latest block.
    async fn call(&self, to: Address, data: &[u8]) -> Result<Bytes, ShieldError>;
}

/// [`LedgerProvider`] backed by an Alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyLedger {
    /// Transactions arrive signed, so no fillers are installed.
    provider: Arc<RootProvider<Ethereum>>,
    url: String,
}

impl std::fmt::Debug for AlloyLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyLedger").field("url", &self.url).finish()
    }
}

impl AlloyLedger {
    /// Creates a ledger over `rpc_url` without contacting it.
    ///
    /// # Errors
    /// Returns [`ShieldError::InvalidParameter`] if the URL does not parse.
    pub fn new(rpc_url: &str) -> Result<Self, ShieldError> {
        Self::with_request_timeout(rpc_url, DEFAULT_RPC_TIMEOUT)
    }

    /// Like [`AlloyLedger::new`], with every HTTP request bounded by
    /// `request_timeout`.
    pub fn with_request_timeout(
        rpc_url: &str,
        request_timeout: Duration,
    ) -> Result<Self, ShieldError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ShieldError::InvalidParameter(format!("invalid RPC URL {rpc_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ShieldError::transport)?;

        let transport = Http::with_client(client, url);
        let is_local = transport.guess_local();
        let provider: RootProvider<Ethereum> = ProviderBuilder::new()
            .disable_recommended_fillers()
            .on_client(RpcClient::new(transport, is_local));
        Ok(Self {
            provider: Arc::new(provider),
            url: rpc_url.to_string(),
        })
    }

    /// Creates a ledger and verifies connectivity via `eth_blockNumber`.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the node is unreachable.
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(rpc_url: &str, request_timeout: Duration) -> Result<Self, ShieldError> {
        let ledger = Self::with_request_timeout(rpc_url, request_timeout)?;
        let block_number = ledger.block_number().await?;
        tracing::info!(latest_block = block_number, "RPC connection successful");
        Ok(ledger)
    }

    /// Endpoint this ledger talks to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn map_transaction(
    tx: &alloy::rpc::types::eth::Transaction,
    block_number: u64,
    timestamp: u64,
) -> HistoricalTransaction {
    let gas_price = tx
        .effective_gas_price
        .or_else(|| ConsensusTransaction::gas_price(tx))
        .unwrap_or_else(|| ConsensusTransaction::max_fee_per_gas(tx));

    HistoricalTransaction {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value: ConsensusTransaction::value(tx),
        block_number,
        timestamp,
        gas_price,
    }
}

#[async_trait]
impl LedgerProvider for AlloyLedger {
    async fn chain_id(&self) -> Result<u64, ShieldError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(ShieldError::transport)
    }

    async fn balance(&self, address: Address) -> Result<U256, ShieldError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(ShieldError::transport)
    }

    async fn block_number(&self) -> Result<u64, ShieldError> {
        self.provider
            .get_block_number()
            .await
            .map_err(ShieldError::transport)
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<LedgerBlock>, ShieldError> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumberOrTag::Number(number)))
            .full()
            .await
            .map_err(|e| ShieldError::Transport(format!("failed to fetch block {number}: {e}")))?;

        let Some(block) = block else {
            tracing::debug!(block_number = number, "block not found");
            return Ok(None);
        };

        let timestamp = block.header.timestamp;
        let transactions = block
            .transactions
            .as_transactions()
            .map(|txs| {
                txs.iter()
                    .map(|tx| map_transaction(tx, number, timestamp))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(LedgerBlock {
            number: block.header.number,
            timestamp,
            transactions,
        }))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, ShieldError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ShieldError::transport)?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            tx_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        }))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ShieldError> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(ShieldError::transport)?;
        let max_priority_fee_per_gas = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .map_err(ShieldError::transport)?;
        Ok(FeeEstimate {
            gas_price,
            max_priority_fee_per_gas,
        })
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ShieldError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(ShieldError::transport)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ShieldError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(ShieldError::transport)?;
        Ok(*pending.tx_hash())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ShieldError> {
        let mut filter = Filter::new()
            .from_block(query.from_block)
            .to_block(query.to_block);
        if let Some(address) = query.address {
            filter = filter.address(address);
        }
        if let Some(topic) = query.topics[0] {
            filter = filter.event_signature(topic);
        }
        if let Some(topic) = query.topics[1] {
            filter = filter.topic1(topic);
        }
        if let Some(topic) = query.topics[2] {
            filter = filter.topic2(topic);
        }
        if let Some(topic) = query.topics[3] {
            filter = filter.topic3(topic);
        }

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(ShieldError::transport)?;

        Ok(logs
            .into_iter()
            .map(|log| LogEntry {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
                block_number: log.block_number,
            })
            .collect())
    }

    async fn call(&self, to: Address, data: &[u8]) -> Result<Bytes, ShieldError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(Bytes::copy_from_slice(data)));
        self.provider
            .call(request)
            .await
            .map_err(ShieldError::transport)
    }
}
