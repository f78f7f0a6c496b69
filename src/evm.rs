//! EVM accessors over alloy HTTP providers
//!
//! # Transaction Building
//!
//! Uses Alloy's `ProviderBuilder::with_recommended_fillers()` to automatically
//! populate transaction fields (nonce, gas_limit, max_fee_per_gas,
//! max_priority_fee_per_gas). Providers are built per call; every accessor
//! only holds the endpoint, contract address and signer.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};
use url::Url;

use crate::accessor::{ChainConnector, DeliveryProviderAccessor, RelayAccessor};
use crate::contracts::{DeliveryProvider, MockRelayerIntegration, WormholeRelayer};
use crate::desired::ConversionBuffer;
use crate::error::ConfigError;
use crate::registry::ChainDescriptor;
use crate::types::{CoreConfigUpdate, SendStatus, TxOutcome, UpdateRecord};

fn build_provider(rpc_url: &Url, signer: &PrivateKeySigner) -> impl Provider<Http<Client>> {
    let wallet = EthereumWallet::from(signer.clone());
    ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(wallet)
        .on_http(rpc_url.clone())
}

fn parse_rpc_url(chain: &ChainDescriptor) -> Result<Url> {
    Url::parse(&chain.rpc_url).map_err(|e| {
        eyre::Report::from(ConfigError::InvalidUrl {
            name: format!("chain {} rpc", chain.chain_id),
            reason: e.to_string(),
        })
    })
}

fn to_u128(value: U256, field: &str, chain_id: u16) -> Result<u128> {
    u128::try_from(value)
        .map_err(|_| eyre!("{} for chain {} does not fit uint128: {}", field, chain_id, value))
}

/// Delivery provider accessor for one operating chain
pub struct EvmDeliveryProvider {
    chain_id: u16,
    rpc_url: Url,
    address: Address,
    signer: PrivateKeySigner,
}

impl EvmDeliveryProvider {
    pub fn new(chain: &ChainDescriptor, signer: PrivateKeySigner) -> Result<Self> {
        Ok(Self {
            chain_id: chain.chain_id,
            rpc_url: parse_rpc_url(chain)?,
            address: chain.delivery_provider_address,
            signer,
        })
    }

    fn encode_update(record: &UpdateRecord) -> Result<DeliveryProvider::Update> {
        Ok(DeliveryProvider::Update {
            chainId: record.chain_id,
            updateAssetConversionBuffer: record.update_asset_conversion_buffer,
            updateDeliverGasOverhead: record.update_deliver_gas_overhead,
            updatePrice: record.update_price,
            updateTargetChainAddress: record.update_target_chain_address,
            updateMaximumBudget: record.update_maximum_budget,
            updateSupportedChain: record.update_supported_chain,
            isSupported: record.is_supported,
            buffer: record.asset_conversion_buffer.numerator,
            bufferDenominator: record.asset_conversion_buffer.denominator,
            newGasOverhead: record.deliver_gas_overhead,
            newMaximumBudget: record.maximum_budget,
            targetChainAddress: record.target_chain_address,
            gasPrice: to_u128(record.gas_price, "gasPrice", record.chain_id)?,
            nativeCurrencyPrice: to_u128(
                record.native_currency_price,
                "nativeCurrencyPrice",
                record.chain_id,
            )?,
        })
    }

    fn encode_core(core: &CoreConfigUpdate) -> DeliveryProvider::CoreConfig {
        DeliveryProvider::CoreConfig {
            updateWormholeRelayer: false,
            updateRewardAddress: core.update_reward_address,
            updateSupportedKeyTypes: core.update_supported_key_types,
            wormholeRelayer: Address::ZERO,
            rewardAddress: core.reward_address,
            supportedKeyTypesBitmap: core.supported_key_types_bitmap,
        }
    }
}

#[async_trait]
impl DeliveryProviderAccessor for EvmDeliveryProvider {
    async fn gas_price(&self, target_chain: u16) -> Result<U256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .quoteGasPrice(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query gas price: {}", e))?;
        Ok(result.price)
    }

    async fn native_currency_price(&self, target_chain: u16) -> Result<U256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .quoteAssetPrice(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query native currency price: {}", e))?;
        Ok(result.price)
    }

    async fn deliver_gas_overhead(&self, target_chain: u16) -> Result<U256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .quoteDeliveryOverhead(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query deliver gas overhead: {}", e))?;
        Ok(result.overhead)
    }

    async fn maximum_budget(&self, target_chain: u16) -> Result<U256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .maximumBudget(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query maximum budget: {}", e))?;
        Ok(result.budget)
    }

    async fn asset_conversion_buffer(&self, target_chain: u16) -> Result<ConversionBuffer> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .assetConversionBuffer(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query asset conversion buffer: {}", e))?;
        Ok(ConversionBuffer {
            numerator: result.tolerance,
            denominator: result.toleranceDenominator,
        })
    }

    async fn target_chain_address(&self, target_chain: u16) -> Result<B256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .getTargetChainAddress(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query target chain address: {}", e))?;
        Ok(result.deliveryProviderAddress)
    }

    async fn is_chain_supported(&self, target_chain: u16) -> Result<bool> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .isChainSupported(target_chain)
            .call()
            .await
            .map_err(|e| eyre!("Failed to query supported chain: {}", e))?;
        Ok(result.supported)
    }

    async fn reward_address(&self) -> Result<Address> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .getRewardAddress()
            .call()
            .await
            .map_err(|e| eyre!("Failed to query reward address: {}", e))?;
        Ok(result.rewardAddress)
    }

    async fn supported_keys_bitmap(&self) -> Result<U256> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);
        let result = contract
            .getSupportedKeys()
            .call()
            .await
            .map_err(|e| eyre!("Failed to query supported keys: {}", e))?;
        Ok(result.bitmap)
    }

    async fn submit_update(
        &self,
        updates: &[UpdateRecord],
        core: &CoreConfigUpdate,
    ) -> Result<TxOutcome> {
        let encoded = updates
            .iter()
            .map(Self::encode_update)
            .collect::<Result<Vec<_>>>()?;

        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = DeliveryProvider::new(self.address, &provider);

        debug!(
            chain_id = self.chain_id,
            updates = encoded.len(),
            update_reward_address = core.update_reward_address,
            update_supported_keys = core.update_supported_key_types,
            "Submitting updateConfig"
        );

        let pending_tx = contract
            .updateConfig(encoded, Self::encode_core(core))
            .send()
            .await
            .map_err(|e| eyre!("Failed to send updateConfig tx: {}", e))?;

        let tx_hash = *pending_tx.tx_hash();
        info!(chain_id = self.chain_id, tx_hash = %tx_hash, "updateConfig transaction sent");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        Ok(TxOutcome {
            tx_hash: format!("0x{:x}", tx_hash),
            success: receipt.status(),
        })
    }
}

/// Relayer quote and probe integration accessor for one chain
pub struct EvmRelay {
    chain: ChainDescriptor,
    rpc_url: Url,
    integration: Address,
    signer: PrivateKeySigner,
}

impl EvmRelay {
    pub fn new(chain: &ChainDescriptor, signer: PrivateKeySigner) -> Result<Self> {
        Ok(Self {
            chain: chain.clone(),
            rpc_url: parse_rpc_url(chain)?,
            integration: chain.integration()?,
            signer,
        })
    }
}

#[async_trait]
impl RelayAccessor for EvmRelay {
    async fn quote_delivery_price(
        &self,
        target_chain: u16,
        receiver_value: U256,
        gas_limit: u64,
    ) -> Result<U256> {
        let relayer = self.chain.relayer()?;
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = WormholeRelayer::new(relayer, &provider);
        let quote = contract
            .quoteEVMDeliveryPrice(target_chain, receiver_value, U256::from(gas_limit))
            .call()
            .await
            .map_err(|e| eyre!("Failed to quote delivery price: {}", e))?;
        Ok(quote.nativePriceQuote)
    }

    async fn send_message(
        &self,
        payload: &[u8],
        target_chain: u16,
        gas_limit: u32,
        value: U256,
    ) -> Result<SendStatus> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = MockRelayerIntegration::new(self.integration, &provider);

        let pending_tx = contract
            .sendMessage(Bytes::copy_from_slice(payload), target_chain, gas_limit, 0)
            .value(value)
            .send()
            .await
            .map_err(|e| eyre!("Failed to send probe message: {}", e))?;

        let tx_hash = format!("0x{:x}", pending_tx.tx_hash());
        debug!(chain_id = self.chain.chain_id, tx_hash = %tx_hash, "Probe transaction sent");

        match pending_tx.get_receipt().await {
            Ok(receipt) if receipt.status() => Ok(SendStatus::Confirmed { tx_hash }),
            Ok(_) => Ok(SendStatus::Failed {
                tx_hash,
                reason: "probe transaction reverted".to_string(),
            }),
            Err(e) => {
                warn!(chain_id = self.chain.chain_id, error = %e, "Failed to get probe receipt");
                Ok(SendStatus::Failed {
                    tx_hash,
                    reason: format!("Failed to get receipt: {}", e),
                })
            }
        }
    }

    async fn message_history(&self) -> Result<Vec<Vec<Bytes>>> {
        let provider = build_provider(&self.rpc_url, &self.signer);
        let contract = MockRelayerIntegration::new(self.integration, &provider);
        let result = contract
            .getMessageHistory()
            .call()
            .await
            .map_err(|e| eyre!("Failed to read message history: {}", e))?;
        Ok(result.history)
    }
}

/// Production [`ChainConnector`] signing with a single local key
pub struct EvmConnector {
    signer: PrivateKeySigner,
}

impl EvmConnector {
    pub fn new(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;
        info!(address = %signer.address(), "EVM connector initialized");
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl ChainConnector for EvmConnector {
    fn delivery_provider(
        &self,
        chain: &ChainDescriptor,
    ) -> Result<Arc<dyn DeliveryProviderAccessor>> {
        Ok(Arc::new(EvmDeliveryProvider::new(chain, self.signer.clone())?))
    }

    fn relay(&self, chain: &ChainDescriptor) -> Result<Arc<dyn RelayAccessor>> {
        Ok(Arc::new(EvmRelay::new(chain, self.signer.clone())?))
    }
}
