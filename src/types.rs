//! Shared types for reconciliation and delivery verification

use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

use crate::desired::ConversionBuffer;

/// On-chain state of one (operating chain, target chain) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTarget {
    pub gas_price: U256,
    pub native_currency_price: U256,
    pub deliver_gas_overhead: U256,
    pub maximum_budget: U256,
    pub asset_conversion_buffer: ConversionBuffer,
    pub target_chain_address: B256,
    pub is_supported: bool,
}

/// Chain-global on-chain state of one operating chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCore {
    pub reward_address: Address,
    pub supported_keys_bitmap: U256,
}

/// Changes for one (operating chain, target chain) pair.
///
/// Each `update_*` flag is set iff the matching field differs from what is on
/// chain. Values behind a cleared flag are ignored by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub chain_id: u16,
    pub update_price: bool,
    pub update_deliver_gas_overhead: bool,
    pub update_maximum_budget: bool,
    pub update_target_chain_address: bool,
    pub update_supported_chain: bool,
    pub update_asset_conversion_buffer: bool,
    pub gas_price: U256,
    pub native_currency_price: U256,
    pub deliver_gas_overhead: U256,
    pub maximum_budget: U256,
    pub target_chain_address: B256,
    pub is_supported: bool,
    pub asset_conversion_buffer: ConversionBuffer,
}

impl UpdateRecord {
    /// Empty record for a target chain; only built once a difference is found
    pub(crate) fn new(chain_id: u16) -> Self {
        Self {
            chain_id,
            update_price: false,
            update_deliver_gas_overhead: false,
            update_maximum_budget: false,
            update_target_chain_address: false,
            update_supported_chain: false,
            update_asset_conversion_buffer: false,
            gas_price: U256::ZERO,
            native_currency_price: U256::ZERO,
            deliver_gas_overhead: U256::ZERO,
            maximum_budget: U256::ZERO,
            target_chain_address: B256::ZERO,
            is_supported: false,
            asset_conversion_buffer: ConversionBuffer::default(),
        }
    }

    /// Number of dirty flags
    pub fn dirty_count(&self) -> usize {
        [
            self.update_price,
            self.update_deliver_gas_overhead,
            self.update_maximum_budget,
            self.update_target_chain_address,
            self.update_supported_chain,
            self.update_asset_conversion_buffer,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// Chain-global changes for one operating chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfigUpdate {
    pub update_reward_address: bool,
    pub reward_address: Address,
    pub update_supported_key_types: bool,
    pub supported_key_types_bitmap: U256,
}

impl CoreConfigUpdate {
    pub fn is_empty(&self) -> bool {
        !self.update_reward_address && !self.update_supported_key_types
    }
}

/// Result of a confirmed write transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: String,
    /// Receipt status; `false` means included but reverted
    pub success: bool,
}

/// Result of a probe send whose broadcast succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Confirmed { tx_hash: String },
    /// Receipt could not be fetched or the transaction reverted
    Failed { tx_hash: String, reason: String },
}
