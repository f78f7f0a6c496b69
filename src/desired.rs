//! Desired delivery provider configuration
//!
//! Read from `<config_dir>/<env>/scriptConfigs/<processName>.json`:
//!
//! ```json
//! {
//!   "rewardAddress": "0x...",
//!   "rewardAddresses": { "4": "0x..." },
//!   "supportedKeys": [1],
//!   "targets": [
//!     { "chainId": 2, "gasPrice": "1000000000", "nativeCurrencyPrice": "2000000000000",
//!       "deliverGasOverhead": 100000, "maximumBudget": "1000000000000000000",
//!       "isSupported": true,
//!       "assetConversionBuffer": { "numerator": 5, "denominator": 100 } }
//!   ]
//! }
//! ```
//!
//! Numeric fields accept JSON numbers or decimal / `0x` strings so values
//! wider than 64 bits stay exact.

use alloy::primitives::{Address, B256, U256};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::bitmap::generate_bitmap;
use crate::error::ConfigError;
use crate::registry::ChainDescriptor;

/// Default script config name for the reconciler
pub const DEFAULT_PROCESS_NAME: &str = "configureDeliveryProvider";

/// Asset conversion buffer as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionBuffer {
    pub numerator: u16,
    pub denominator: u16,
}

/// Desired pricing and routing for one target chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredTarget {
    pub gas_price: U256,
    pub native_currency_price: U256,
    pub deliver_gas_overhead: U256,
    pub maximum_budget: U256,
    /// When `None`, the target's delivery provider address is used
    pub target_chain_address: Option<B256>,
    pub is_supported: bool,
    pub asset_conversion_buffer: ConversionBuffer,
}

/// Desired configuration shared by all operating chains
#[derive(Debug, Clone, Default)]
pub struct DesiredConfig {
    pub targets: BTreeMap<u16, DesiredTarget>,
    /// Reward address applied to every operating chain without an override
    pub reward_address: Option<Address>,
    /// Per operating chain reward address overrides
    pub reward_addresses: BTreeMap<u16, Address>,
    pub supported_keys: BTreeSet<u8>,
}

impl DesiredConfig {
    /// Load `scriptConfigs/<process_name>.json` under the environment config dir
    pub fn load(env_config_dir: &Path, process_name: &str) -> Result<Self> {
        let path = env_config_dir
            .join("scriptConfigs")
            .join(format!("{}.json", process_name));
        let raw = fs::read_to_string(&path)
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("Invalid desired config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: DesiredConfigFile = serde_json::from_str(raw)?;
        file.try_into()
    }

    /// Desired target for a chain, if configured
    pub fn target(&self, chain_id: u16) -> Option<&DesiredTarget> {
        self.targets.get(&chain_id)
    }

    /// Reward address for an operating chain; `None` means "leave as is"
    pub fn reward_address_for(&self, chain_id: u16) -> Option<Address> {
        self.reward_addresses
            .get(&chain_id)
            .copied()
            .or(self.reward_address)
    }

    pub fn supported_keys_bitmap(&self) -> U256 {
        generate_bitmap(self.supported_keys.iter().copied())
    }

    /// Target chain address to register for `target`
    pub fn target_chain_address(&self, target: &ChainDescriptor) -> Option<B256> {
        self.target(target.chain_id).map(|t| {
            t.target_chain_address
                .unwrap_or_else(|| target.delivery_provider_bytes32())
        })
    }

    /// Ensure every chain in the registry has a desired target entry
    pub fn ensure_covers(&self, chains: &[ChainDescriptor]) -> Result<()> {
        for chain in chains {
            if !self.targets.contains_key(&chain.chain_id) {
                return Err(ConfigError::MissingTarget {
                    chain_id: chain.chain_id,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesiredConfigFile {
    #[serde(default)]
    reward_address: Option<Address>,
    #[serde(default)]
    reward_addresses: BTreeMap<u16, Address>,
    #[serde(default)]
    supported_keys: Vec<u64>,
    targets: Vec<DesiredTargetFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesiredTargetFile {
    chain_id: u16,
    #[serde(deserialize_with = "de_u256")]
    gas_price: U256,
    #[serde(deserialize_with = "de_u256")]
    native_currency_price: U256,
    #[serde(deserialize_with = "de_u256")]
    deliver_gas_overhead: U256,
    #[serde(deserialize_with = "de_u256")]
    maximum_budget: U256,
    #[serde(default)]
    target_chain_address: Option<B256>,
    #[serde(default = "default_supported")]
    is_supported: bool,
    #[serde(default)]
    asset_conversion_buffer: ConversionBuffer,
}

fn default_supported() -> bool {
    true
}

impl TryFrom<DesiredConfigFile> for DesiredConfig {
    type Error = eyre::Report;

    fn try_from(file: DesiredConfigFile) -> Result<Self> {
        let mut supported_keys = BTreeSet::new();
        for position in file.supported_keys {
            let key = u8::try_from(position).map_err(|_| ConfigError::KeyOutOfRange { position })?;
            supported_keys.insert(key);
        }

        let mut targets = BTreeMap::new();
        for t in file.targets {
            let chain_id = t.chain_id;
            ensure_u128("gasPrice", t.gas_price, chain_id)?;
            ensure_u128("nativeCurrencyPrice", t.native_currency_price, chain_id)?;
            let previous = targets.insert(
                chain_id,
                DesiredTarget {
                    gas_price: t.gas_price,
                    native_currency_price: t.native_currency_price,
                    deliver_gas_overhead: t.deliver_gas_overhead,
                    maximum_budget: t.maximum_budget,
                    target_chain_address: t.target_chain_address,
                    is_supported: t.is_supported,
                    asset_conversion_buffer: t.asset_conversion_buffer,
                },
            );
            if previous.is_some() {
                return Err(ConfigError::DuplicateChain { chain_id }.into());
            }
        }

        Ok(Self {
            targets,
            reward_address: file.reward_address,
            reward_addresses: file.reward_addresses,
            supported_keys,
        })
    }
}

/// The contract stores both prices as uint128
fn ensure_u128(field: &'static str, value: U256, chain_id: u16) -> Result<()> {
    if value > U256::from(u128::MAX) {
        return Err(ConfigError::ValueOutOfRange { field, chain_id }.into());
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(u64),
    Str(String),
}

fn de_u256<'de, D>(deserializer: D) -> std::result::Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(U256::from(n)),
        NumOrString::Str(s) => U256::from_str(s.trim()).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "rewardAddress": "0x00000000000000000000000000000000000000aa",
        "rewardAddresses": { "4": "0x00000000000000000000000000000000000000bb" },
        "supportedKeys": [1, 2],
        "targets": [
            { "chainId": 2, "gasPrice": "1000000000", "nativeCurrencyPrice": 2000,
              "deliverGasOverhead": 100000, "maximumBudget": "340282366920938463463374607431768211456",
              "assetConversionBuffer": { "numerator": 5, "denominator": 100 } },
            { "chainId": 4, "gasPrice": "0x3b9aca00", "nativeCurrencyPrice": "1",
              "deliverGasOverhead": "0", "maximumBudget": "0", "isSupported": false,
              "targetChainAddress": "0x0000000000000000000000001111111111111111111111111111111111111111" }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let desired = DesiredConfig::from_json(SAMPLE).unwrap();
        assert_eq!(desired.targets.len(), 2);

        let t2 = desired.target(2).unwrap();
        assert_eq!(t2.gas_price, U256::from(1_000_000_000u64));
        assert_eq!(t2.native_currency_price, U256::from(2000u64));
        assert_eq!(t2.maximum_budget, U256::from(1u8) << 128);
        assert!(t2.is_supported);
        assert_eq!(
            t2.asset_conversion_buffer,
            ConversionBuffer {
                numerator: 5,
                denominator: 100
            }
        );

        let t4 = desired.target(4).unwrap();
        assert_eq!(t4.gas_price, U256::from(1_000_000_000u64));
        assert!(!t4.is_supported);
        assert!(t4.target_chain_address.is_some());
        assert_eq!(t4.asset_conversion_buffer, ConversionBuffer::default());
    }

    #[test]
    fn test_reward_address_overrides() {
        let desired = DesiredConfig::from_json(SAMPLE).unwrap();
        assert_eq!(
            desired.reward_address_for(2),
            Some(Address::with_last_byte(0xaa))
        );
        assert_eq!(
            desired.reward_address_for(4),
            Some(Address::with_last_byte(0xbb))
        );
    }

    #[test]
    fn test_absent_reward_address() {
        let desired = DesiredConfig::from_json(r#"{ "targets": [] }"#).unwrap();
        assert_eq!(desired.reward_address_for(2), None);
        assert_eq!(desired.supported_keys_bitmap(), U256::ZERO);
    }

    #[test]
    fn test_supported_keys_bitmap() {
        let desired = DesiredConfig::from_json(SAMPLE).unwrap();
        assert_eq!(desired.supported_keys_bitmap(), U256::from(6u8));
    }

    #[test]
    fn test_key_out_of_range_rejected() {
        let err = DesiredConfig::from_json(r#"{ "supportedKeys": [1, 256], "targets": [] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("256"));
    }

    #[test]
    fn test_prices_limited_to_uint128() {
        let target = |gas_price: &str, native_price: &str| {
            format!(
                r#"{{ "targets": [{{ "chainId": 6, "gasPrice": "{}", "nativeCurrencyPrice": "{}",
                    "deliverGasOverhead": 1, "maximumBudget": 1 }}] }}"#,
                gas_price, native_price
            )
        };
        let max = u128::MAX.to_string();
        let over = "340282366920938463463374607431768211456";

        let desired = DesiredConfig::from_json(&target(&max, &max)).unwrap();
        assert_eq!(desired.target(6).unwrap().gas_price, U256::from(u128::MAX));

        let err = DesiredConfig::from_json(&target(over, "1")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ValueOutOfRange {
                field: "gasPrice",
                chain_id: 6
            })
        ));

        let err = DesiredConfig::from_json(&target("1", over)).unwrap_err();
        assert!(err.to_string().contains("nativeCurrencyPrice"));
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let raw = r#"{ "targets": [
            { "chainId": 2, "gasPrice": 1, "nativeCurrencyPrice": 1, "deliverGasOverhead": 1, "maximumBudget": 1 },
            { "chainId": 2, "gasPrice": 2, "nativeCurrencyPrice": 1, "deliverGasOverhead": 1, "maximumBudget": 1 }
        ] }"#;
        assert!(DesiredConfig::from_json(raw).is_err());
    }

    #[test]
    fn test_ensure_covers_reports_missing_chain() {
        let desired = DesiredConfig::from_json(SAMPLE).unwrap();
        let chain = |chain_id| ChainDescriptor {
            chain_id,
            evm_network_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            core_address: Address::ZERO,
            delivery_provider_address: Address::with_last_byte(chain_id as u8),
            relayer_address: None,
            integration_address: None,
        };

        assert!(desired.ensure_covers(&[chain(2), chain(4)]).is_ok());
        let err = desired.ensure_covers(&[chain(2), chain(6)]).unwrap_err();
        assert!(err.to_string().contains("chain 6"));
    }

    #[test]
    fn test_default_target_chain_address() {
        let desired = DesiredConfig::from_json(SAMPLE).unwrap();
        let target = ChainDescriptor {
            chain_id: 2,
            evm_network_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            core_address: Address::ZERO,
            delivery_provider_address: Address::with_last_byte(0x22),
            relayer_address: None,
            integration_address: None,
        };
        assert_eq!(
            desired.target_chain_address(&target),
            Some(Address::with_last_byte(0x22).into_word())
        );
    }
}
