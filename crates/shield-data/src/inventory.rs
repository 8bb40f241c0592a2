//! Wallet inventory: native balance, watched ERC-20 balances and
//! allowances, plus NFTs recently received.
//!
//! NFTs are found from ERC-721 `Transfer` logs whose `to` topic is the wallet.
//! ERC-20 transfers share the event signature but carry the amount in the
//! data field, so only logs with exactly four topics are treated as NFTs.
//!
//! Allowances to well-known routers are what an `approval_revoke` rescue
//! cancels. Token contracts missing on the connected chain are skipped.

use alloy::primitives::{address, b256, Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ShieldError;
use crate::provider::{LedgerProvider, LogQuery};

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
    }
}

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Blocks searched for received NFTs.
pub const NFT_SCAN_BLOCKS: u64 = 10_000;

/// ERC-20 contract checked during a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WatchedToken {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Contract that commonly holds token approvals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WatchedSpender {
    pub address: Address,
    pub label: String,
}

/// Tokens and spenders a scan checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watchlist {
    pub tokens: Vec<WatchedToken>,
    pub spenders: Vec<WatchedSpender>,
}

impl Watchlist {
    /// Major mainnet stablecoins and wrapped assets against the common DEX
    /// routers.
    pub fn mainnet() -> Self {
        let token = |address, symbol: &str, decimals| WatchedToken {
            address,
            symbol: symbol.to_string(),
            decimals,
        };
        let spender = |address, label: &str| WatchedSpender {
            address,
            label: label.to_string(),
        };
        Self {
            tokens: vec![
                token(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), "USDC", 6),
                token(address!("dAC17F958D2ee523a2206206994597C13D831ec7"), "USDT", 6),
                token(address!("6B175474E89094C44Da98b954EedeAC495271d0F"), "DAI", 18),
                token(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), "WETH", 18),
                token(address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"), "WBTC", 8),
            ],
            spenders: vec![
                spender(address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"), "Uniswap V2 Router"),
                spender(address!("E592427A0AEce92De3Edee1F18E0157C05861564"), "Uniswap V3 Router"),
                spender(address!("d9e1cE17f2641f24aE83637ab66a2cca9C378B9F"), "SushiSwap Router"),
                spender(address!("1111111254EEB25477B68fb85Ed929f73A960582"), "1inch V5"),
            ],
        }
    }
}

impl Default for Watchlist {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Non-zero balance of a watched token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenHolding {
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    pub balance: U256,
}

/// Live allowance from the wallet to a watched spender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveApproval {
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    pub spender: Address,
    pub spender_label: String,
    pub allowance: U256,
}

impl ActiveApproval {
    /// `approve(spender, type(uint256).max)`.
    pub fn is_unlimited(&self) -> bool {
        self.allowance == U256::MAX
    }
}

/// An ERC-721 token the wallet received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NftAsset {
    pub contract: Address,
    pub token_id: U256,
}

/// Snapshot of rescuable assets.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WalletInventory {
    pub address: Address,
    pub eth_balance: U256,
    pub tokens: Vec<TokenHolding>,
    pub approvals: Vec<ActiveApproval>,
    pub nfts: Vec<NftAsset>,
    /// True when the NFT log scan failed and `nfts` is empty for that reason.
    pub nft_scan_degraded: bool,
    /// Unix seconds.
    pub scanned_at: u64,
}

/// [`scan_wallet_with`] over [`Watchlist::mainnet`].
pub async fn scan_wallet(
    provider: &dyn LedgerProvider,
    address: Address,
) -> Result<WalletInventory, ShieldError> {
    scan_wallet_with(provider, address, &Watchlist::mainnet()).await
}

/// Reads the balance, watched token balances and allowances, and the NFTs
/// received over the last [`NFT_SCAN_BLOCKS`].
///
/// # Errors
/// Returns error only if the balance query fails. Failed token calls are
/// skipped; a failed NFT scan is logged and reported through
/// [`WalletInventory::nft_scan_degraded`].
#[tracing::instrument(skip_all, fields(address = %address))]
pub async fn scan_wallet_with(
    provider: &dyn LedgerProvider,
    address: Address,
    watchlist: &Watchlist,
) -> Result<WalletInventory, ShieldError> {
    let eth_balance = provider.balance(address).await?;
    info!(%eth_balance, "balance read");

    let (tokens, approvals) = tokio::join!(
        token_holdings(provider, address, &watchlist.tokens),
        active_approvals(provider, address, watchlist),
    );

    let (nfts, nft_scan_degraded) = match received_nfts(provider, address).await {
        Ok(nfts) => (nfts, false),
        Err(e) => {
            warn!(error = %e, "NFT scan unavailable, continuing without it");
            (Vec::new(), true)
        }
    };

    Ok(WalletInventory {
        address,
        eth_balance,
        tokens,
        approvals,
        nfts,
        nft_scan_degraded,
        scanned_at: chrono::Utc::now().timestamp().max(0) as u64,
    })
}

/// Watched tokens `owner` holds a non-zero balance of, in watchlist order.
pub async fn token_holdings(
    provider: &dyn LedgerProvider,
    owner: Address,
    tokens: &[WatchedToken],
) -> Vec<TokenHolding> {
    let calldata = IERC20::balanceOfCall { account: owner }.abi_encode();
    let reads = tokens.iter().map(|token| {
        let calldata = &calldata;
        async move {
            let balance = read_word(provider, token.address, calldata).await?;
            Some(TokenHolding {
                token: token.address,
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                balance,
            })
        }
    });

    let holdings: Vec<TokenHolding> = join_all(reads)
        .await
        .into_iter()
        .flatten()
        .filter(|holding| !holding.balance.is_zero())
        .collect();
    for holding in &holdings {
        info!(symbol = %holding.symbol, balance = %holding.balance, "token balance found");
    }
    holdings
}

/// Non-zero allowances from `owner` to every watched spender on every
/// watched token.
pub async fn active_approvals(
    provider: &dyn LedgerProvider,
    owner: Address,
    watchlist: &Watchlist,
) -> Vec<ActiveApproval> {
    let reads = watchlist.tokens.iter().flat_map(move |token| {
        watchlist.spenders.iter().map(move |spender| async move {
            let calldata = IERC20::allowanceCall {
                owner,
                spender: spender.address,
            }
            .abi_encode();
            let allowance = read_word(provider, token.address, &calldata).await?;
            Some(ActiveApproval {
                token: token.address,
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                spender: spender.address,
                spender_label: spender.label.clone(),
                allowance,
            })
        })
    });

    let approvals: Vec<ActiveApproval> = join_all(reads)
        .await
        .into_iter()
        .flatten()
        .filter(|approval| !approval.allowance.is_zero())
        .collect();
    for approval in &approvals {
        warn!(
            symbol = %approval.symbol,
            spender = %approval.spender_label,
            unlimited = approval.is_unlimited(),
            "active token approval"
        );
    }
    approvals
}

/// One `uint256` return word, `None` when the call fails or returns nothing
/// (no contract at `to` on this chain).
async fn read_word(provider: &dyn LedgerProvider, to: Address, calldata: &[u8]) -> Option<U256> {
    match provider.call(to, calldata).await {
        Ok(output) if output.len() >= 32 => Some(U256::from_be_slice(&output[..32])),
        Ok(_) => {
            debug!(contract = %to, "empty call result, skipping token");
            None
        }
        Err(e) => {
            debug!(contract = %to, error = %e, "token call failed, skipping");
            None
        }
    }
}

/// ERC-721 tokens transferred to `address` in the recent block window,
/// de-duplicated by contract and token id in first-seen order.
///
/// # Errors
/// Returns [`ShieldError::DegradedData`] if the height or log query fails.
pub async fn received_nfts(
    provider: &dyn LedgerProvider,
    address: Address,
) -> Result<Vec<NftAsset>, ShieldError> {
    let head = provider
        .block_number()
        .await
        .map_err(|e| ShieldError::DegradedData(format!("NFT scan: {e}")))?;

    let query = LogQuery {
        address: None,
        from_block: head.saturating_sub(NFT_SCAN_BLOCKS),
        to_block: head,
        topics: [Some(TRANSFER_TOPIC), None, Some(address.into_word()), None],
    };
    let logs = provider
        .logs(&query)
        .await
        .map_err(|e| ShieldError::DegradedData(format!("NFT scan: {e}")))?;

    let mut nfts: Vec<NftAsset> = Vec::new();
    for entry in logs.iter().filter(|entry| entry.topics.len() == 4) {
        let nft = NftAsset {
            contract: entry.address,
            token_id: U256::from_be_bytes(entry.topics[3].0),
        };
        if !nfts.contains(&nft) {
            nfts.push(nft);
        }
    }

    if !nfts.is_empty() {
        info!(nft_count = nfts.len(), "found received NFTs");
    }
    Ok(nfts)
}
