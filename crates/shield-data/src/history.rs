//! Transaction-history sources for drainer analysis.
//!
//! The preferred source is an Etherscan-compatible `txlist` endpoint, which
//! returns the most recent transactions for an address in one call. When it is
//! unavailable the detector falls back to [`scan_recent_blocks`], which walks a
//! bounded window of recent blocks through the [`LedgerProvider`].
//!
//! Neither path is fatal: a failed block is skipped, and a failed explorer call
//! is reported so the caller can switch paths.

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ShieldError;
use crate::provider::LedgerProvider;
use crate::types::HistoricalTransaction;

/// Indexed transaction-history source.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` most recent transactions touching `address`, newest first.
    async fn recent_transactions(
        &self,
        address: Address,
        limit: usize,
    ) -> Result<Vec<HistoricalTransaction>, ShieldError>;
}

/// Explorer API base URL for a chain id.
pub fn explorer_base_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://api.etherscan.io/api"),
        5 => Some("https://api-goerli.etherscan.io/api"),
        11155111 => Some("https://api-sepolia.etherscan.io/api"),
        _ => None,
    }
}

/// Etherscan-compatible `account/txlist` client.
#[derive(Clone, Debug)]
pub struct ExplorerHistory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxListRow {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    block_number: String,
    time_stamp: String,
    #[serde(default)]
    gas_price: String,
}

impl ExplorerHistory {
    /// Client for a known chain, `None` when the chain has no explorer API.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn for_chain(
        chain_id: u64,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Option<Self>, ShieldError> {
        match explorer_base_url(chain_id) {
            Some(url) => Self::with_base_url(url, api_key, timeout).map(Some),
            None => Ok(None),
        }
    }

    /// Client for an explicit base URL.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ShieldError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShieldError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl HistorySource for ExplorerHistory {
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    async fn recent_transactions(
        &self,
        address: Address,
        limit: usize,
    ) -> Result<Vec<HistoricalTransaction>, ShieldError> {
        let offset = limit.to_string();
        let address_param = format!("{address:#x}");
        let mut query: Vec<(&str, &str)> = vec![
            ("module", "account"),
            ("action", "txlist"),
            ("address", address_param.as_str()),
            ("startblock", "0"),
            ("endblock", "99999999"),
            ("page", "1"),
            ("offset", offset.as_str()),
            ("sort", "desc"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("apikey", key));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ShieldError::DegradedData(format!("explorer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShieldError::DegradedData(format!(
                "explorer returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: TxListResponse = response
            .json()
            .await
            .map_err(|e| ShieldError::DegradedData(format!("malformed explorer response: {e}")))?;

        if body.status != "1" {
            // "No transactions found" is reported as status 0 with an empty array.
            if body.result.as_array().is_some_and(|rows| rows.is_empty()) {
                return Ok(Vec::new());
            }
            return Err(ShieldError::DegradedData(format!(
                "explorer error: {} {}",
                body.message, body.result
            )));
        }

        let rows: Vec<TxListRow> = serde_json::from_value(body.result)
            .map_err(|e| ShieldError::DegradedData(format!("malformed txlist rows: {e}")))?;

        let total = rows.len();
        let txs: Vec<HistoricalTransaction> = rows
            .iter()
            .filter_map(parse_row)
            .take(limit)
            .collect();
        if txs.len() < total.min(limit) {
            debug!(
                skipped = total.min(limit) - txs.len(),
                "skipped malformed explorer rows"
            );
        }

        info!(tx_count = txs.len(), "fetched explorer history");
        Ok(txs)
    }
}

fn parse_u256(value: &str) -> Option<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(U256::ZERO);
    }
    trimmed.parse::<U256>().ok()
}

fn parse_row(row: &TxListRow) -> Option<HistoricalTransaction> {
    let to = if row.to.trim().is_empty() {
        None
    } else {
        Some(row.to.parse::<Address>().ok()?)
    };
    let gas_price = parse_u256(&row.gas_price)?;

    Some(HistoricalTransaction {
        hash: row.hash.parse::<B256>().ok()?,
        from: row.from.parse::<Address>().ok()?,
        to,
        value: parse_u256(&row.value)?,
        block_number: row.block_number.trim().parse().ok()?,
        timestamp: row.time_stamp.trim().parse().ok()?,
        gas_price: u128::try_from(gas_price).ok()?,
    })
}

/// Scans the most recent `range` blocks for transactions sent from or to
/// `address`.
///
/// Blocks are fetched newest first with at most `concurrency` requests in
/// flight; each fetch is bounded by `per_block_timeout` and skipped on
/// failure. Collection stops after the block in which `limit` matching
/// transactions have been found.
#[tracing::instrument(skip_all, fields(address = %address, range))]
pub async fn scan_recent_blocks(
    provider: &dyn LedgerProvider,
    address: Address,
    range: u64,
    limit: usize,
    per_block_timeout: Duration,
    concurrency: usize,
) -> Result<Vec<HistoricalTransaction>, ShieldError> {
    let head = provider.block_number().await?;
    let start = head.saturating_sub(range);

    info!(head, start, "scanning recent blocks");

    let mut blocks = futures::stream::iter((start..=head).rev())
        .map(|number| async move {
            match tokio::time::timeout(per_block_timeout, provider.block_with_transactions(number))
                .await
            {
                Ok(Ok(block)) => block,
                Ok(Err(e)) => {
                    debug!(block_number = number, error = %e, "skipping block");
                    None
                }
                Err(_) => {
                    debug!(block_number = number, "block fetch timed out");
                    None
                }
            }
        })
        .buffered(concurrency.max(1));

    let mut found = Vec::new();
    let mut skipped = 0u64;
    while let Some(block) = blocks.next().await {
        let Some(block) = block else {
            skipped += 1;
            continue;
        };
        found.extend(
            block
                .transactions
                .into_iter()
                .filter(|tx| tx.from == address || tx.to == Some(address)),
        );
        if found.len() >= limit {
            break;
        }
    }

    if skipped > 0 {
        warn!(skipped, "some blocks could not be fetched during scan");
    }
    found.truncate(limit);
    Ok(found)
}
