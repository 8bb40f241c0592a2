//! Atomic funding + rescue bundles.
//!
//! A second, uncompromised wallet funds the compromised one and the rescue
//! transaction spends that funding in the same block. The pair is only ever
//! sent to a block-builder relay, so the drainer never sees the funding land
//! on its own.
//!
//! A `not_included` result is a normal outcome under contention: the relay
//! drops bundles whose nonces were consumed by the drainer's own sweep.

use std::sync::Arc;

use alloy::primitives::{B256, U256};
use shield_data::config::BundleConfig;
use shield_data::error::ShieldError;
use shield_data::provider::{bounded, LedgerProvider, ReceiptSummary};
use shield_data::types::{BundleResult, BundleStatus, RescueAction, TransactionTemplate};
use tracing::{debug, info, warn};

use crate::relay::{BundleRelay, BundleSubmission, RelayResponse};
use crate::signer::{unsigned_transaction, SignedTransaction, SigningIdentity};

/// Gas limit of the plain-transfer funding transaction.
pub const FUNDING_GAS_LIMIT: u64 = 21_000;

/// Identifier reported for dry-run bundles.
pub const DRY_RUN_BUNDLE_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";

/// Placeholder funding-transaction hash for dry runs.
pub const DRY_RUN_FUNDING_HASH: B256 = B256::with_last_byte(0x0f);

/// Placeholder rescue-transaction hash for dry runs.
pub const DRY_RUN_RESCUE_HASH: B256 = B256::with_last_byte(0x0e);

/// Builds, signs and submits funding + rescue bundles.
#[derive(Clone)]
pub struct BundleExecutor {
    provider: Arc<dyn LedgerProvider>,
    relay: Arc<dyn BundleRelay>,
    config: BundleConfig,
}

struct SignedPair {
    funding: SignedTransaction,
    rescue: SignedTransaction,
}

impl BundleExecutor {
    pub fn new(
        provider: Arc<dyn LedgerProvider>,
        relay: Arc<dyn BundleRelay>,
        config: BundleConfig,
    ) -> Self {
        Self {
            provider,
            relay,
            config,
        }
    }

    /// Funds `compromised` with `funding_amount` from `funding` and runs
    /// `template` in the same bundle.
    ///
    /// Each of up to `max_candidate_blocks` blocks after the current head is
    /// targeted in turn until the rescue transaction has a receipt.
    #[tracing::instrument(
        skip_all,
        fields(
            compromised = %compromised.address(),
            funding = %funding.address(),
            action = %template.action,
            dry_run = dry_run
        )
    )]
    pub async fn execute(
        &self,
        compromised: &dyn SigningIdentity,
        funding: &dyn SigningIdentity,
        template: &TransactionTemplate,
        funding_amount: U256,
        dry_run: bool,
    ) -> BundleResult {
        let limit = self.config.rpc_timeout();
        let head = bounded(limit, "eth_blockNumber", self.provider.block_number()).await;
        let current_block = match head {
            Ok(block) => block,
            Err(e) => return BundleResult::failed(e, 0),
        };

        let pair = match self
            .build_pair(compromised, funding, template, funding_amount)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "bundle could not be built");
                return BundleResult::failed(e, current_block);
            }
        };
        let tx_hashes = vec![pair.funding.hash, pair.rescue.hash];

        if dry_run {
            info!(
                funding_amount = %funding_amount,
                target_block = current_block + 1,
                "dry run: bundle built, relay not contacted"
            );
            return BundleResult {
                bundle_hash: Some(DRY_RUN_BUNDLE_HASH.to_string()),
                status: BundleStatus::Success,
                error: None,
                target_block: current_block + 1,
                tx_hashes: vec![DRY_RUN_FUNDING_HASH, DRY_RUN_RESCUE_HASH],
                included_block: None,
            };
        }

        let candidates = self.config.max_candidate_blocks;
        for offset in 1..=candidates {
            let target_block = current_block + offset;
            let submission = BundleSubmission {
                txs: vec![pair.funding.raw.clone(), pair.rescue.raw.clone()],
                block_number: target_block,
            };

            info!(target_block, "submitting bundle");
            let sent = bounded(
                self.config.relay_timeout(),
                "eth_sendBundle",
                self.relay.send_bundle(&submission, funding),
            );
            let bundle_hash = match sent.await {
                Ok(RelayResponse::Accepted { bundle_hash }) => {
                    info!(target_block, bundle_hash = ?bundle_hash, "bundle accepted");
                    bundle_hash
                }
                Ok(RelayResponse::Rejected { message }) => {
                    warn!(target_block, %message, "relay rejected bundle");
                    continue;
                }
                Err(e) => {
                    warn!(target_block, error = %e, "bundle submission failed");
                    continue;
                }
            };

            if let Some(receipt) = self.await_inclusion(target_block, pair.rescue.hash).await {
                if !receipt.success {
                    warn!(target_block, "bundle included but rescue reverted");
                    return BundleResult {
                        bundle_hash,
                        status: BundleStatus::Error,
                        error: Some(ShieldError::Reverted {
                            tx_hash: pair.rescue.hash,
                        }),
                        target_block,
                        tx_hashes,
                        included_block: receipt.block_number,
                    };
                }
                info!(target_block, included_block = ?receipt.block_number, "bundle included");
                return BundleResult {
                    bundle_hash,
                    status: BundleStatus::Success,
                    error: None,
                    target_block,
                    tx_hashes,
                    included_block: receipt.block_number,
                };
            }

            if offset < candidates {
                info!(target_block, "not included, retrying next block");
            }
        }

        warn!(candidates, "bundle not included in any candidate block");
        BundleResult {
            bundle_hash: None,
            status: BundleStatus::NotIncluded,
            error: Some(ShieldError::NotIncluded { candidates }),
            target_block: current_block + candidates,
            tx_hashes,
            included_block: None,
        }
    }

    /// Reads nonces and chain id, prices the rescue and signs both legs.
    async fn build_pair(
        &self,
        compromised: &dyn SigningIdentity,
        funding: &dyn SigningIdentity,
        template: &TransactionTemplate,
        funding_amount: U256,
    ) -> Result<SignedPair, ShieldError> {
        let limit = self.config.rpc_timeout();
        // Nonces are read concurrently from the same provider.
        let (funding_nonce, compromised_nonce, chain_id) = tokio::join!(
            bounded(
                limit,
                "eth_getTransactionCount",
                self.provider.transaction_count(funding.address())
            ),
            bounded(
                limit,
                "eth_getTransactionCount",
                self.provider.transaction_count(compromised.address())
            ),
            bounded(limit, "eth_chainId", self.provider.chain_id()),
        );
        let (funding_nonce, compromised_nonce, chain_id) =
            (funding_nonce?, compromised_nonce?, chain_id?);

        match bounded(limit, "eth_gasPrice", self.provider.fee_estimate()).await {
            Ok(fees) => debug!(
                network_gas_price = fees.gas_price,
                network_priority_fee = fees.max_priority_fee_per_gas,
                template_max_fee = template.max_fee_per_gas,
                "network fee snapshot"
            ),
            Err(e) => debug!(error = %e, "fee estimate unavailable"),
        }

        let rescue_value = if template.action == RescueAction::EthRescue {
            let balance = bounded(
                limit,
                "eth_getBalance",
                self.provider.balance(compromised.address()),
            )
            .await?;
            let value = template.send_value(balance.saturating_add(funding_amount))?;
            info!(sweep_value = %value, "bundle sweeps balance plus funding after gas");
            value
        } else {
            template.value
        };

        let funding_template = TransactionTemplate {
            to: compromised.address(),
            data: None,
            value: funding_amount,
            gas_limit: FUNDING_GAS_LIMIT,
            max_priority_fee_per_gas: template.max_priority_fee_per_gas,
            max_fee_per_gas: template.max_fee_per_gas,
            action: RescueAction::EthRescue,
            label: Some("funding".into()),
        };

        let funding_tx = funding.sign_transaction(unsigned_transaction(
            &funding_template,
            chain_id,
            funding_nonce,
            funding_amount,
        ))?;
        let rescue_tx = compromised.sign_transaction(unsigned_transaction(
            template,
            chain_id,
            compromised_nonce,
            rescue_value,
        ))?;

        Ok(SignedPair {
            funding: funding_tx,
            rescue: rescue_tx,
        })
    }

    /// Polls until the chain reaches `target_block`, then checks once for the
    /// rescue receipt. `None` if no receipt exists or `inclusion_wait`
    /// elapses first, however long any single call takes.
    async fn await_inclusion(
        &self,
        target_block: u64,
        rescue_hash: B256,
    ) -> Option<ReceiptSummary> {
        let limit = self.config.rpc_timeout();
        let poll = async {
            loop {
                tokio::time::sleep(self.config.block_poll_interval()).await;

                match bounded(limit, "eth_blockNumber", self.provider.block_number()).await {
                    Ok(head) if head >= target_block => {
                        let receipt = bounded(
                            limit,
                            "eth_getTransactionReceipt",
                            self.provider.transaction_receipt(rescue_hash),
                        );
                        return match receipt.await {
                            Ok(receipt) => receipt,
                            Err(e) => {
                                debug!(error = %e, "receipt lookup failed");
                                None
                            }
                        };
                    }
                    Ok(head) => debug!(head, target_block, "waiting for target block"),
                    Err(e) => debug!(error = %e, "block height poll failed"),
                }
            }
        };

        match tokio::time::timeout(self.config.inclusion_wait(), poll).await {
            Ok(receipt) => receipt,
            Err(_) => {
                debug!(target_block, "inclusion wait elapsed");
                None
            }
        }
    }
}
