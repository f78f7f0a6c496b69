//! Contract accessor interfaces
//!
//! The reconciler and the verifier only talk to chains through these traits.
//! [`crate::evm`] implements them over alloy HTTP providers; tests implement
//! them in memory.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use eyre::Result;

use crate::desired::ConversionBuffer;
use crate::registry::ChainDescriptor;
use crate::types::{CoreConfigUpdate, SendStatus, TxOutcome, UpdateRecord};

/// Reads and writes against one chain's delivery provider contract
#[async_trait]
pub trait DeliveryProviderAccessor: Send + Sync {
    async fn gas_price(&self, target_chain: u16) -> Result<U256>;

    async fn native_currency_price(&self, target_chain: u16) -> Result<U256>;

    async fn deliver_gas_overhead(&self, target_chain: u16) -> Result<U256>;

    async fn maximum_budget(&self, target_chain: u16) -> Result<U256>;

    async fn asset_conversion_buffer(&self, target_chain: u16) -> Result<ConversionBuffer>;

    async fn target_chain_address(&self, target_chain: u16) -> Result<B256>;

    async fn is_chain_supported(&self, target_chain: u16) -> Result<bool>;

    async fn reward_address(&self) -> Result<Address>;

    async fn supported_keys_bitmap(&self) -> Result<U256>;

    /// Submit one `updateConfig` transaction and wait for its receipt
    async fn submit_update(
        &self,
        updates: &[UpdateRecord],
        core: &CoreConfigUpdate,
    ) -> Result<TxOutcome>;
}

/// Relayer quote plus probe send/read on one chain
#[async_trait]
pub trait RelayAccessor: Send + Sync {
    /// Native-currency price for delivering to `target_chain`
    async fn quote_delivery_price(
        &self,
        target_chain: u16,
        receiver_value: U256,
        gas_limit: u64,
    ) -> Result<U256>;

    /// Send a probe message. `Err` means nothing was broadcast.
    async fn send_message(
        &self,
        payload: &[u8],
        target_chain: u16,
        gas_limit: u32,
        value: U256,
    ) -> Result<SendStatus>;

    /// Full history of messages received by this chain's integration contract
    async fn message_history(&self) -> Result<Vec<Vec<Bytes>>>;
}

/// Builds accessors for chain descriptors
pub trait ChainConnector: Send + Sync {
    fn delivery_provider(&self, chain: &ChainDescriptor)
        -> Result<Arc<dyn DeliveryProviderAccessor>>;

    fn relay(&self, chain: &ChainDescriptor) -> Result<Arc<dyn RelayAccessor>>;
}
