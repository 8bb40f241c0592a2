//! Local signing identities.
//!
//! Keys never leave the process: transactions are signed here and only the
//! raw EIP-2718 bytes are handed to a transport.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{hex, keccak256, Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use shield_data::error::ShieldError;
use shield_data::types::TransactionTemplate;

/// A signed transaction ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    /// EIP-2718 encoded envelope.
    pub raw: Bytes,
    pub hash: B256,
}

/// Something that can sign transactions and messages for one address.
pub trait SigningIdentity: Send + Sync {
    fn address(&self) -> Address;

    /// Signs a fee-market transaction.
    fn sign_transaction(&self, tx: TxEip1559) -> Result<SignedTransaction, ShieldError>;

    /// EIP-191 personal-message signature, 65 bytes `r || s || v`.
    fn sign_message(&self, message: &[u8]) -> Result<Bytes, ShieldError>;
}

impl SigningIdentity for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy::signers::Signer::address(self)
    }

    fn sign_transaction(&self, mut tx: TxEip1559) -> Result<SignedTransaction, ShieldError> {
        let sig = TxSignerSync::sign_transaction_sync(self, &mut tx)
            .map_err(|e| ShieldError::Signing(format!("sign tx failed: {e}")))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok(SignedTransaction {
            raw: signed.encoded_2718().into(),
            hash: *signed.tx_hash(),
        })
    }

    fn sign_message(&self, message: &[u8]) -> Result<Bytes, ShieldError> {
        let signature = self
            .sign_message_sync(message)
            .map_err(|e| ShieldError::Signing(format!("sign message failed: {e}")))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

/// Parses a hex private key (with or without `0x`).
///
/// The error never echoes the input.
pub fn signer_from_key(key: &str) -> Result<PrivateKeySigner, ShieldError> {
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|_| ShieldError::Signing("invalid private key".into()))
}

/// The EIP-1559 transaction for `template` sending `value`.
pub fn unsigned_transaction(
    template: &TransactionTemplate,
    chain_id: u64,
    nonce: u64,
    value: U256,
) -> TxEip1559 {
    TxEip1559 {
        chain_id,
        nonce,
        gas_limit: template.gas_limit,
        max_fee_per_gas: template.max_fee_per_gas,
        max_priority_fee_per_gas: template.max_priority_fee_per_gas,
        to: TxKind::Call(template.to),
        value,
        access_list: Default::default(),
        input: template.data.clone().unwrap_or_default(),
    }
}

/// `X-Flashbots-Signature` value: `<address>:<signature over keccak256(body) hex>`.
pub fn relay_auth_header(identity: &dyn SigningIdentity, body: &[u8]) -> Result<String, ShieldError> {
    let digest = keccak256(body).to_string();
    let signature = identity.sign_message(digest.as_bytes())?;
    Ok(format!("{}:{}", identity.address(), hex::encode_prefixed(&signature)))
}
