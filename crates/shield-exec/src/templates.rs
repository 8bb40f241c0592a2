//! Rescue transaction templates.
//!
//! [`TemplateBuilder::build`] turns one [`RescueRequest`] and a fee pair into
//! an unsigned [`TransactionTemplate`]. Building is pure: the same inputs
//! always give the same template and nothing touches the network.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use shield_data::config::{EnsConfig, GasLimits, ShieldConfig};
use shield_data::error::ShieldError;
use shield_data::types::{GasConfig, RescueAction, TransactionTemplate};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IERC721 {
        function transferFrom(address from, address to, uint256 tokenId) external;
    }

    interface INameWrapper {
        function safeTransferFrom(address from, address to, uint256 id, uint256 amount, bytes data) external;
    }

    interface IPublicResolver {
        function setText(bytes32 node, string key, string value) external;
    }
}

/// Action-specific builder input. Addresses are unparsed user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RescueRequest {
    /// Sweep the native balance to `safe`.
    Eth { safe: String },
    /// Transfer `amount` base units of `token` to `safe`.
    Erc20 {
        token: String,
        safe: String,
        amount: U256,
        symbol: Option<String>,
    },
    /// Move one NFT from `owner` to `safe`.
    Erc721 {
        owner: String,
        contract: String,
        token_id: U256,
        safe: String,
    },
    /// Reset `spender`'s allowance on `token` to zero.
    ApprovalRevoke {
        token: String,
        spender: String,
        symbol: Option<String>,
    },
    /// Move a wrapped ENS name from `owner` to `safe`.
    EnsTransfer {
        owner: String,
        name: String,
        safe: String,
    },
    /// Set text record `key` on `name`.
    EnsRecord {
        name: String,
        key: String,
        value: String,
    },
}

impl RescueRequest {
    pub fn action(&self) -> RescueAction {
        match self {
            RescueRequest::Eth { .. } => RescueAction::EthRescue,
            RescueRequest::Erc20 { .. } => RescueAction::Erc20Rescue,
            RescueRequest::Erc721 { .. } => RescueAction::Erc721Rescue,
            RescueRequest::ApprovalRevoke { .. } => RescueAction::ApprovalRevoke,
            RescueRequest::EnsTransfer { .. } => RescueAction::EnsTransfer,
            RescueRequest::EnsRecord { .. } => RescueAction::EnsRecord,
        }
    }
}

/// Builds rescue templates from configured gas limits and ENS contracts.
#[derive(Clone, Debug, Default)]
pub struct TemplateBuilder {
    gas_limits: GasLimits,
    ens: EnsConfig,
}

impl TemplateBuilder {
    pub fn new(gas_limits: GasLimits, ens: EnsConfig) -> Self {
        Self { gas_limits, ens }
    }

    pub fn from_config(config: &ShieldConfig) -> Self {
        Self::new(config.gas_limits.clone(), config.ens.clone())
    }

    /// Builds the template for `request` priced at `gas`.
    ///
    /// # Errors
    /// Returns [`ShieldError::InvalidParameter`] if an address or ENS name is
    /// missing or malformed, an amount is zero, or the fee pair is unusable.
    pub fn build(
        &self,
        request: &RescueRequest,
        gas: GasConfig,
    ) -> Result<TransactionTemplate, ShieldError> {
        validate_fees(gas)?;

        let (to, data, label) = match request {
            RescueRequest::Eth { safe } => (parse_address("safe address", safe)?, None, None),

            RescueRequest::Erc20 {
                token,
                safe,
                amount,
                symbol,
            } => {
                if amount.is_zero() {
                    return Err(ShieldError::InvalidParameter(
                        "token amount must be greater than zero".into(),
                    ));
                }
                let call = IERC20::transferCall {
                    to: parse_address("safe address", safe)?,
                    amount: *amount,
                };
                (
                    parse_address("token address", token)?,
                    Some(call.abi_encode()),
                    symbol.clone(),
                )
            }

            RescueRequest::Erc721 {
                owner,
                contract,
                token_id,
                safe,
            } => {
                let call = IERC721::transferFromCall {
                    from: parse_address("owner address", owner)?,
                    to: parse_address("safe address", safe)?,
                    tokenId: *token_id,
                };
                (
                    parse_address("NFT contract address", contract)?,
                    Some(call.abi_encode()),
                    Some(format!("#{token_id}")),
                )
            }

            RescueRequest::ApprovalRevoke {
                token,
                spender,
                symbol,
            } => {
                let call = IERC20::approveCall {
                    spender: parse_address("spender address", spender)?,
                    amount: U256::ZERO,
                };
                (
                    parse_address("token address", token)?,
                    Some(call.abi_encode()),
                    symbol.clone(),
                )
            }

            RescueRequest::EnsTransfer { owner, name, safe } => {
                let name = normalize_ens_name(name)?;
                let call = INameWrapper::safeTransferFromCall {
                    from: parse_address("owner address", owner)?,
                    to: parse_address("safe address", safe)?,
                    id: U256::from_be_bytes(namehash(&name).0),
                    amount: U256::from(1u64),
                    data: Bytes::new(),
                };
                (self.ens.name_wrapper, Some(call.abi_encode()), Some(name))
            }

            RescueRequest::EnsRecord { name, key, value } => {
                let name = normalize_ens_name(name)?;
                if key.trim().is_empty() {
                    return Err(ShieldError::InvalidParameter("missing text record key".into()));
                }
                let call = IPublicResolver::setTextCall {
                    node: namehash(&name),
                    key: key.clone(),
                    value: value.clone(),
                };
                (self.ens.public_resolver, Some(call.abi_encode()), Some(name))
            }
        };

        let action = request.action();
        Ok(TransactionTemplate {
            to,
            data: data.map(Bytes::from),
            value: U256::ZERO,
            gas_limit: self.gas_limits.for_action(action),
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            max_fee_per_gas: gas.max_fee_per_gas,
            action,
            label,
        })
    }
}

fn validate_fees(gas: GasConfig) -> Result<(), ShieldError> {
    if gas.max_fee_per_gas == 0 {
        return Err(ShieldError::InvalidParameter(
            "max fee per gas must be greater than zero".into(),
        ));
    }
    if gas.max_priority_fee_per_gas > gas.max_fee_per_gas {
        return Err(ShieldError::InvalidParameter(format!(
            "priority fee {} exceeds max fee {}",
            gas.max_priority_fee_per_gas, gas.max_fee_per_gas
        )));
    }
    Ok(())
}

fn parse_address(field: &str, value: &str) -> Result<Address, ShieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ShieldError::InvalidParameter(format!("missing {field}")));
    }
    trimmed
        .parse::<Address>()
        .map_err(|_| ShieldError::InvalidParameter(format!("invalid {field}: {trimmed}")))
}

/// Lower-cases ASCII and checks every label is non-empty and there are at
/// least two of them.
fn normalize_ens_name(name: &str) -> Result<String, ShieldError> {
    let name = name.trim().to_ascii_lowercase();
    let valid = name.contains('.') && name.split('.').all(|label| !label.is_empty());
    if !valid {
        return Err(ShieldError::InvalidParameter(format!("invalid ENS name: '{name}'")));
    }
    Ok(name)
}

/// ENS namehash: `keccak256(namehash(parent) ++ keccak256(label))`, with the
/// empty name hashing to zero.
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        buf[32..].copy_from_slice(keccak256(label.as_bytes()).as_slice());
        node = keccak256(buf);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    const SAFE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn gas() -> GasConfig {
        GasConfig::from_gwei(10, 100)
    }

    #[test]
    fn namehash_matches_known_values() {
        assert_eq!(namehash(""), B256::ZERO);
        assert_eq!(
            namehash("eth"),
            b256!("93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae")
        );
        assert_eq!(
            namehash("vitalik.eth"),
            b256!("ee6c4522aab0003e8d14cd40a6af439055fd2577951148c14b6cea9a53475835")
        );
    }

    #[test]
    fn eth_rescue_has_placeholder_value() {
        let builder = TemplateBuilder::default();
        let template = builder
            .build(&RescueRequest::Eth { safe: SAFE.into() }, gas())
            .expect("eth template");

        assert_eq!(template.to, address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"));
        assert_eq!(template.value, U256::ZERO);
        assert_eq!(template.gas_limit, 21_000);
        assert_eq!(template.data, None);
        assert_eq!(template.action, RescueAction::EthRescue);
    }

    #[test]
    fn erc20_rescue_encodes_transfer() {
        let builder = TemplateBuilder::default();
        let request = RescueRequest::Erc20 {
            token: USDC.into(),
            safe: SAFE.into(),
            amount: U256::from(5_000_000u64),
            symbol: Some("USDC".into()),
        };
        let template = builder.build(&request, gas()).expect("erc20 template");

        assert_eq!(template.to, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"));
        assert_eq!(template.gas_limit, 65_000);
        let data = template.data.expect("calldata");
        assert_eq!(&data[..4], IERC20::transferCall::SELECTOR.as_slice());
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(template.label.as_deref(), Some("USDC"));
    }

    #[test]
    fn approval_revoke_sets_zero_allowance() {
        let template = TemplateBuilder::default()
            .build(
                &RescueRequest::ApprovalRevoke {
                    token: USDC.into(),
                    spender: OWNER.into(),
                    symbol: None,
                },
                gas(),
            )
            .expect("revoke template");

        let data = template.data.expect("calldata");
        let decoded = IERC20::approveCall::abi_decode(&data, true).expect("decode approve");
        assert_eq!(decoded.amount, U256::ZERO);
        assert_eq!(template.gas_limit, 65_000);
    }

    #[test]
    fn ens_transfer_targets_name_wrapper_with_namehash_id() {
        let builder = TemplateBuilder::default();
        let template = builder
            .build(
                &RescueRequest::EnsTransfer {
                    owner: OWNER.into(),
                    name: "Vitalik.eth".into(),
                    safe: SAFE.into(),
                },
                gas(),
            )
            .expect("ens transfer template");

        assert_eq!(template.to, EnsConfig::default().name_wrapper);
        assert_eq!(template.gas_limit, 120_000);
        let decoded = INameWrapper::safeTransferFromCall::abi_decode(
            &template.data.expect("calldata"),
            true,
        )
        .expect("decode safeTransferFrom");
        assert_eq!(decoded.id, U256::from_be_bytes(namehash("vitalik.eth").0));
        assert_eq!(decoded.amount, U256::from(1u64));
    }

    #[test]
    fn ens_record_encodes_set_text() {
        let template = TemplateBuilder::default()
            .build(
                &RescueRequest::EnsRecord {
                    name: "vitalik.eth".into(),
                    key: "url".into(),
                    value: "https://example.org".into(),
                },
                gas(),
            )
            .expect("ens record template");

        assert_eq!(template.to, EnsConfig::default().public_resolver);
        assert_eq!(template.gas_limit, 80_000);
        let decoded =
            IPublicResolver::setTextCall::abi_decode(&template.data.expect("calldata"), true)
                .expect("decode setText");
        assert_eq!(decoded.key, "url");
        assert_eq!(decoded.node, namehash("vitalik.eth"));
    }

    #[test]
    fn malformed_inputs_are_invalid_parameters() {
        let builder = TemplateBuilder::default();
        let cases = [
            RescueRequest::Eth { safe: "".into() },
            RescueRequest::Eth {
                safe: "0x1234".into(),
            },
            RescueRequest::Erc20 {
                token: USDC.into(),
                safe: SAFE.into(),
                amount: U256::ZERO,
                symbol: None,
            },
            RescueRequest::EnsTransfer {
                owner: OWNER.into(),
                name: "eth".into(),
                safe: SAFE.into(),
            },
            RescueRequest::EnsRecord {
                name: "a..eth".into(),
                key: "url".into(),
                value: String::new(),
            },
            RescueRequest::EnsRecord {
                name: "vitalik.eth".into(),
                key: " ".into(),
                value: String::new(),
            },
        ];
        for request in &cases {
            let err = builder.build(request, gas()).expect_err("invalid request");
            assert!(
                matches!(err, ShieldError::InvalidParameter(_)),
                "{request:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn unusable_fees_are_rejected() {
        let builder = TemplateBuilder::default();
        let request = RescueRequest::Eth { safe: SAFE.into() };
        assert!(builder.build(&request, GasConfig::from_gwei(0, 0)).is_err());
        assert!(builder.build(&request, GasConfig::from_gwei(50, 10)).is_err());
    }

    #[test]
    fn identical_inputs_give_identical_templates() {
        let builder = TemplateBuilder::default();
        let request = RescueRequest::Erc721 {
            owner: OWNER.into(),
            contract: "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D".into(),
            token_id: U256::from(42u64),
            safe: SAFE.into(),
        };
        let first = builder.build(&request, gas()).expect("first");
        let second = builder.build(&request, gas()).expect("second");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).expect("serialize"),
            serde_json::to_vec(&second).expect("serialize")
        );
        assert_eq!(first.gas_limit, 100_000);
    }
}
