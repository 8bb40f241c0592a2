//! Rescue executor.
//!
//! Signs the rescue transaction and broadcasts it over the public mempool or
//! a private-mempool RPC, then waits for one confirmation. Failures never
//! escape as `Err`; they are folded into the returned [`ExecutionResult`].

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use shield_data::config::ExecutionConfig;
use shield_data::error::ShieldError;
use shield_data::provider::{bounded, LedgerProvider, ReceiptSummary};
use shield_data::types::{ExecutionResult, ExecutionStatus, RescueAction, TransactionTemplate};
use tracing::{debug, info, warn};

use crate::signer::{unsigned_transaction, SigningIdentity};

/// Hash reported for dry runs.
pub const DRY_RUN_TX_HASH: B256 = B256::with_last_byte(1);

/// Broadcast path and whether to transmit at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionMode {
    /// Broadcast through the private-mempool RPC.
    pub private: bool,
    /// Sign only; never transmit.
    pub dry_run: bool,
}

/// Signs and broadcasts rescue transactions with bounded retries.
#[derive(Clone)]
pub struct RescueExecutor {
    provider: Arc<dyn LedgerProvider>,
    private_provider: Option<Arc<dyn LedgerProvider>>,
    config: ExecutionConfig,
    fallback_chain_id: u64,
}

impl RescueExecutor {
    /// Executor over `provider`, signing for `fallback_chain_id` when the
    /// node cannot be asked in dry-run mode.
    pub fn new(
        provider: Arc<dyn LedgerProvider>,
        config: ExecutionConfig,
        fallback_chain_id: u64,
    ) -> Self {
        Self {
            provider,
            private_provider: None,
            config,
            fallback_chain_id,
        }
    }

    /// Adds the private-mempool endpoint used when [`ExecutionMode::private`]
    /// is set. Receipts are still read from the primary provider.
    pub fn with_private_relay(mut self, private_provider: Arc<dyn LedgerProvider>) -> Self {
        self.private_provider = Some(private_provider);
        self
    }

    /// Executes `template` for `signer` given the balance at trigger time.
    #[tracing::instrument(
        skip_all,
        fields(
            from = %signer.address(),
            action = %template.action,
            private = mode.private,
            dry_run = mode.dry_run
        )
    )]
    pub async fn execute(
        &self,
        signer: &dyn SigningIdentity,
        template: &TransactionTemplate,
        available_balance: U256,
        mode: ExecutionMode,
    ) -> ExecutionResult {
        let value = match template.send_value(available_balance) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "rescue not affordable, nothing broadcast");
                return ExecutionResult::failed(e, mode.dry_run);
            }
        };
        if template.action == RescueAction::EthRescue {
            info!(
                %value,
                gas_budget_wei = %template.max_gas_cost(),
                "sweeping balance above gas budget"
            );
        }

        if mode.dry_run {
            return self.dry_run(signer, template, value).await;
        }

        let broadcaster = if mode.private {
            match &self.private_provider {
                Some(private) => {
                    info!("broadcasting via private relay");
                    Arc::clone(private)
                }
                None => {
                    return ExecutionResult::failed(
                        ShieldError::InvalidParameter("private relay endpoint not configured".into()),
                        false,
                    )
                }
            }
        } else {
            info!("broadcasting to public mempool");
            Arc::clone(&self.provider)
        };

        let attempts = self.config.broadcast_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self
                .attempt(signer, template, value, broadcaster.as_ref())
                .await
            {
                Ok(receipt) if receipt.success => {
                    info!(tx_hash = %receipt.tx_hash, block_number = ?receipt.block_number, "rescue confirmed");
                    return ExecutionResult {
                        tx_hash: Some(receipt.tx_hash),
                        status: ExecutionStatus::Success,
                        error: None,
                        dry_run: false,
                        block_number: receipt.block_number,
                    };
                }
                Ok(receipt) => {
                    warn!(tx_hash = %receipt.tx_hash, "rescue transaction reverted");
                    return ExecutionResult {
                        tx_hash: Some(receipt.tx_hash),
                        status: ExecutionStatus::Reverted,
                        error: Some(ShieldError::Reverted {
                            tx_hash: receipt.tx_hash,
                        }),
                        dry_run: false,
                        block_number: receipt.block_number,
                    };
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "rescue attempt failed, not retrying");
                    return ExecutionResult::failed(e, false);
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "rescue attempt failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff()).await;
                    }
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        ExecutionResult::failed(
            ShieldError::Transport(format!("failed after {attempts} attempts: {last}")),
            false,
        )
    }

    async fn dry_run(
        &self,
        signer: &dyn SigningIdentity,
        template: &TransactionTemplate,
        value: U256,
    ) -> ExecutionResult {
        let from = signer.address();
        let limit = self.config.rpc_timeout();
        let chain_id = bounded(limit, "eth_chainId", self.provider.chain_id())
            .await
            .unwrap_or(self.fallback_chain_id);
        let nonce = bounded(
            limit,
            "eth_getTransactionCount",
            self.provider.transaction_count(from),
        )
        .await
        .unwrap_or(0);

        match signer.sign_transaction(unsigned_transaction(template, chain_id, nonce, value)) {
            Ok(signed) => {
                info!(
                    signed_bytes = signed.raw.len(),
                    to = %template.to,
                    %value,
                    "dry run: transaction signed, not broadcast"
                );
                ExecutionResult {
                    tx_hash: Some(DRY_RUN_TX_HASH),
                    status: ExecutionStatus::Success,
                    error: None,
                    dry_run: true,
                    block_number: None,
                }
            }
            Err(e) => ExecutionResult::failed(e, true),
        }
    }

    /// One sign-broadcast-confirm round with a fresh nonce. Every call is
    /// bounded, so a hung node surfaces as a retryable transport error.
    async fn attempt(
        &self,
        signer: &dyn SigningIdentity,
        template: &TransactionTemplate,
        value: U256,
        broadcaster: &dyn LedgerProvider,
    ) -> Result<ReceiptSummary, ShieldError> {
        let from: Address = signer.address();
        let limit = self.config.rpc_timeout();
        let chain_id = bounded(limit, "eth_chainId", self.provider.chain_id()).await?;
        let nonce =
            bounded(limit, "eth_getTransactionCount", self.provider.transaction_count(from)).await?;

        let signed = signer.sign_transaction(unsigned_transaction(template, chain_id, nonce, value))?;
        let tx_hash = bounded(
            limit,
            "eth_sendRawTransaction",
            broadcaster.send_raw_transaction(&signed.raw),
        )
        .await?;
        info!(%tx_hash, nonce, "rescue transaction broadcast, waiting for confirmation");

        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ReceiptSummary, ShieldError> {
        let timeout = self.config.confirmation_timeout();
        let limit = self.config.rpc_timeout();
        let poll = async {
            loop {
                let receipt = bounded(
                    limit,
                    "eth_getTransactionReceipt",
                    self.provider.transaction_receipt(tx_hash),
                );
                match receipt.await {
                    Ok(Some(receipt)) if receipt.block_number.is_some() => return receipt,
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "receipt poll failed"),
                }
                tokio::time::sleep(self.config.receipt_poll_interval()).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            ShieldError::Transport(format!(
                "transaction {tx_hash} not confirmed within {}s",
                timeout.as_secs()
            ))
        })
    }
}
