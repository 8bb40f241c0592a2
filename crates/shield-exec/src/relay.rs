//! Bundle relay client.
//!
//! Bundles go to the relay as a signed `eth_sendBundle` JSON-RPC request. The
//! relay authenticates the sender from the `X-Flashbots-Signature` header,
//! which carries a personal-message signature over `keccak256(body)`.

use std::time::Duration;

use alloy::primitives::{hex, Bytes};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use shield_data::error::ShieldError;
use tracing::debug;

use crate::signer::{relay_auth_header, SigningIdentity};

/// Signed transactions to land together in one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleSubmission {
    /// EIP-2718 raw transactions, in execution order.
    pub txs: Vec<Bytes>,
    pub block_number: u64,
}

impl BundleSubmission {
    /// `eth_sendBundle` JSON-RPC request body.
    pub fn to_request_body(&self) -> Value {
        let txs: Vec<String> = self.txs.iter().map(hex::encode_prefixed).collect();
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [{
                "txs": txs,
                "blockNumber": format!("0x{:x}", self.block_number),
            }],
        })
    }
}

/// Relay verdict on one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayResponse {
    Accepted { bundle_hash: Option<String> },
    /// JSON-RPC error for this submission; the next block may still work.
    Rejected { message: String },
}

/// A block-builder relay accepting atomic bundles.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submits `bundle`, authenticating as `auth`.
    async fn send_bundle(
        &self,
        bundle: &BundleSubmission,
        auth: &dyn SigningIdentity,
    ) -> Result<RelayResponse, ShieldError>;
}

/// Flashbots-compatible relay over HTTP.
#[derive(Clone, Debug)]
pub struct FlashbotsRelay {
    client: reqwest::Client,
    url: String,
}

impl FlashbotsRelay {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ShieldError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShieldError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BundleRelay for FlashbotsRelay {
    #[tracing::instrument(skip_all, fields(relay = %self.url, target_block = bundle.block_number))]
    async fn send_bundle(
        &self,
        bundle: &BundleSubmission,
        auth: &dyn SigningIdentity,
    ) -> Result<RelayResponse, ShieldError> {
        let body = serde_json::to_vec(&bundle.to_request_body())
            .map_err(|e| ShieldError::InvalidParameter(format!("bundle body: {e}")))?;
        let signature = relay_auth_header(auth, &body)?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Flashbots-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| ShieldError::Transport(format!("relay request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ShieldError::Transport(format!("relay response unreadable: {e}")))?;
        debug!(status = status.as_u16(), "relay responded");

        parse_relay_response(&text).ok_or_else(|| {
            ShieldError::Transport(format!(
                "unexpected relay response (HTTP {}): {}",
                status.as_u16(),
                truncate(&text, 200)
            ))
        })
    }
}

fn parse_relay_response(text: &str) -> Option<RelayResponse> {
    let value: Value = serde_json::from_str(text).ok()?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(RelayResponse::Rejected { message });
    }

    let result = value.get("result")?;
    let bundle_hash = result
        .get("bundleHash")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(RelayResponse::Accepted { bundle_hash })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
