//! In-memory chain doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};

use relay_ops::accessor::{ChainConnector, DeliveryProviderAccessor, RelayAccessor};
use relay_ops::desired::{ConversionBuffer, DesiredConfig, DesiredTarget};
use relay_ops::registry::ChainDescriptor;
use relay_ops::types::{
    CoreConfigUpdate, ObservedCore, ObservedTarget, SendStatus, TxOutcome, UpdateRecord,
};

pub fn chain(chain_id: u16) -> ChainDescriptor {
    ChainDescriptor {
        chain_id,
        evm_network_id: 1000 + u64::from(chain_id),
        rpc_url: format!("http://localhost:{}", 8545 + chain_id),
        core_address: Address::with_last_byte(0xc0),
        delivery_provider_address: Address::with_last_byte(chain_id as u8),
        relayer_address: Some(Address::with_last_byte(0x80 + chain_id as u8)),
        integration_address: Some(Address::with_last_byte(0x40 + chain_id as u8)),
    }
}

pub fn chains(ids: &[u16]) -> Vec<ChainDescriptor> {
    ids.iter().copied().map(chain).collect()
}

pub fn desired_target() -> DesiredTarget {
    DesiredTarget {
        gas_price: U256::from(900_000_000u64),
        native_currency_price: U256::from(2_000_000_000_000u64),
        deliver_gas_overhead: U256::from(100_000u64),
        maximum_budget: U256::from(10u64).pow(U256::from(18u8)),
        target_chain_address: None,
        is_supported: true,
        asset_conversion_buffer: ConversionBuffer {
            numerator: 5,
            denominator: 100,
        },
    }
}

/// Same target for every chain, reward address 0xaa, keys {1}
pub fn desired_config(all: &[ChainDescriptor]) -> DesiredConfig {
    DesiredConfig {
        targets: all
            .iter()
            .map(|c| (c.chain_id, desired_target()))
            .collect::<BTreeMap<_, _>>(),
        reward_address: Some(Address::with_last_byte(0xaa)),
        reward_addresses: BTreeMap::new(),
        supported_keys: BTreeSet::from([1u8]),
    }
}

/// On-chain state that already matches `desired` for every chain in `all`
pub fn matching_state(desired: &DesiredConfig, all: &[ChainDescriptor]) -> ProviderState {
    let targets = all
        .iter()
        .map(|c| {
            let d = desired.target(c.chain_id).expect("target configured");
            (
                c.chain_id,
                ObservedTarget {
                    gas_price: d.gas_price,
                    native_currency_price: d.native_currency_price,
                    deliver_gas_overhead: d.deliver_gas_overhead,
                    maximum_budget: d.maximum_budget,
                    asset_conversion_buffer: d.asset_conversion_buffer,
                    target_chain_address: desired
                        .target_chain_address(c)
                        .expect("target configured"),
                    is_supported: d.is_supported,
                },
            )
        })
        .collect();

    ProviderState {
        targets,
        core: ObservedCore {
            reward_address: desired.reward_address.unwrap_or(Address::ZERO),
            supported_keys_bitmap: desired.supported_keys_bitmap(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct ProviderState {
    pub targets: HashMap<u16, ObservedTarget>,
    pub core: ObservedCore,
}

/// Delivery provider that applies submitted updates to its own state
pub struct MockDeliveryProvider {
    pub state: Mutex<ProviderState>,
    pub submissions: Mutex<Vec<(Vec<UpdateRecord>, CoreConfigUpdate)>>,
    pub reads: AtomicUsize,
    pub revert: bool,
}

impl MockDeliveryProvider {
    pub fn new(state: ProviderState) -> Self {
        Self {
            state: Mutex::new(state),
            submissions: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            revert: false,
        }
    }

    pub fn reverting(state: ProviderState) -> Self {
        Self {
            revert: true,
            ..Self::new(state)
        }
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    fn target(&self, chain_id: u16) -> Result<ObservedTarget> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .targets
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| eyre!("execution reverted: unknown chain {}", chain_id))
    }

    fn core(&self) -> ObservedCore {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().core.clone()
    }
}

#[async_trait]
impl DeliveryProviderAccessor for MockDeliveryProvider {
    async fn gas_price(&self, target_chain: u16) -> Result<U256> {
        Ok(self.target(target_chain)?.gas_price)
    }

    async fn native_currency_price(&self, target_chain: u16) -> Result<U256> {
        Ok(self.target(target_chain)?.native_currency_price)
    }

    async fn deliver_gas_overhead(&self, target_chain: u16) -> Result<U256> {
        Ok(self.target(target_chain)?.deliver_gas_overhead)
    }

    async fn maximum_budget(&self, target_chain: u16) -> Result<U256> {
        Ok(self.target(target_chain)?.maximum_budget)
    }

    async fn asset_conversion_buffer(&self, target_chain: u16) -> Result<ConversionBuffer> {
        Ok(self.target(target_chain)?.asset_conversion_buffer)
    }

    async fn target_chain_address(&self, target_chain: u16) -> Result<B256> {
        Ok(self.target(target_chain)?.target_chain_address)
    }

    async fn is_chain_supported(&self, target_chain: u16) -> Result<bool> {
        Ok(self.target(target_chain)?.is_supported)
    }

    async fn reward_address(&self) -> Result<Address> {
        Ok(self.core().reward_address)
    }

    async fn supported_keys_bitmap(&self) -> Result<U256> {
        Ok(self.core().supported_keys_bitmap)
    }

    async fn submit_update(
        &self,
        updates: &[UpdateRecord],
        core: &CoreConfigUpdate,
    ) -> Result<TxOutcome> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((updates.to_vec(), core.clone()));
        let tx_hash = format!("0x{:064x}", submissions.len());

        if self.revert {
            return Ok(TxOutcome {
                tx_hash,
                success: false,
            });
        }

        let mut state = self.state.lock().unwrap();
        for u in updates {
            let t = state
                .targets
                .get_mut(&u.chain_id)
                .ok_or_else(|| eyre!("unknown chain {}", u.chain_id))?;
            if u.update_price {
                t.gas_price = u.gas_price;
                t.native_currency_price = u.native_currency_price;
            }
            if u.update_deliver_gas_overhead {
                t.deliver_gas_overhead = u.deliver_gas_overhead;
            }
            if u.update_maximum_budget {
                t.maximum_budget = u.maximum_budget;
            }
            if u.update_target_chain_address {
                t.target_chain_address = u.target_chain_address;
            }
            if u.update_supported_chain {
                t.is_supported = u.is_supported;
            }
            if u.update_asset_conversion_buffer {
                t.asset_conversion_buffer = u.asset_conversion_buffer;
            }
        }
        if core.update_reward_address {
            state.core.reward_address = core.reward_address;
        }
        if core.update_supported_key_types {
            state.core.supported_keys_bitmap = core.supported_key_types_bitmap;
        }

        Ok(TxOutcome {
            tx_hash,
            success: true,
        })
    }
}

/// Every call fails like an unreachable RPC
pub struct UnreachableProvider;

#[async_trait]
impl DeliveryProviderAccessor for UnreachableProvider {
    async fn gas_price(&self, _: u16) -> Result<U256> {
        Err(eyre!("connection refused"))
    }

    async fn native_currency_price(&self, _: u16) -> Result<U256> {
        Err(eyre!("connection refused"))
    }

    async fn deliver_gas_overhead(&self, _: u16) -> Result<U256> {
        Err(eyre!("connection refused"))
    }

    async fn maximum_budget(&self, _: u16) -> Result<U256> {
        Err(eyre!("connection refused"))
    }

    async fn asset_conversion_buffer(&self, _: u16) -> Result<ConversionBuffer> {
        Err(eyre!("connection refused"))
    }

    async fn target_chain_address(&self, _: u16) -> Result<B256> {
        Err(eyre!("connection refused"))
    }

    async fn is_chain_supported(&self, _: u16) -> Result<bool> {
        Err(eyre!("connection refused"))
    }

    async fn reward_address(&self) -> Result<Address> {
        Err(eyre!("connection refused"))
    }

    async fn supported_keys_bitmap(&self) -> Result<U256> {
        Err(eyre!("connection refused"))
    }

    async fn submit_update(&self, _: &[UpdateRecord], _: &CoreConfigUpdate) -> Result<TxOutcome> {
        Err(eyre!("connection refused"))
    }
}

/// Messages in flight between mock chains
#[derive(Default)]
pub struct MockNetwork {
    pending: Mutex<HashMap<u16, Vec<Bytes>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Confirm,
    /// Broadcast succeeds, receipt reports a revert
    Revert,
    /// Broadcast itself fails
    Reject,
}

/// Relay endpoint of one mock chain
pub struct MockRelay {
    pub chain_id: u16,
    network: Arc<MockNetwork>,
    pub send_behavior: SendBehavior,
    pub quote_fails: bool,
    pub history_fails: bool,
    /// Pending messages land after this many history reads; `None` never
    pub deliver_after: Option<u32>,
    pub history: Mutex<Vec<Vec<Bytes>>>,
    pub reads: AtomicU32,
    pub sends: AtomicU32,
}

impl MockRelay {
    pub fn new(chain_id: u16, network: Arc<MockNetwork>) -> Self {
        Self {
            chain_id,
            network,
            send_behavior: SendBehavior::Confirm,
            quote_fails: false,
            history_fails: false,
            deliver_after: Some(1),
            history: Mutex::new(vec![vec![Bytes::from_static(b"ID: 1")]]),
            reads: AtomicU32::new(0),
            sends: AtomicU32::new(0),
        }
    }

    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayAccessor for MockRelay {
    async fn quote_delivery_price(
        &self,
        _target_chain: u16,
        _receiver_value: U256,
        gas_limit: u64,
    ) -> Result<U256> {
        if self.quote_fails {
            return Err(eyre!("request timed out"));
        }
        Ok(U256::from(gas_limit) * U256::from(10u8))
    }

    async fn send_message(
        &self,
        payload: &[u8],
        target_chain: u16,
        _gas_limit: u32,
        _value: U256,
    ) -> Result<SendStatus> {
        if self.send_behavior == SendBehavior::Reject {
            return Err(eyre!("insufficient funds for gas"));
        }
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = format!("0x{:04x}{:060x}", self.chain_id, n);

        if self.send_behavior == SendBehavior::Revert {
            return Ok(SendStatus::Failed {
                tx_hash,
                reason: "probe transaction reverted".to_string(),
            });
        }

        self.network
            .pending
            .lock()
            .unwrap()
            .entry(target_chain)
            .or_default()
            .push(Bytes::copy_from_slice(payload));
        Ok(SendStatus::Confirmed { tx_hash })
    }

    async fn message_history(&self) -> Result<Vec<Vec<Bytes>>> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.history_fails {
            return Err(eyre!("connection reset"));
        }

        let mut history = self.history.lock().unwrap();
        if matches!(self.deliver_after, Some(n) if reads >= n) {
            if let Some(arrived) = self.network.pending.lock().unwrap().remove(&self.chain_id) {
                history.extend(arrived.into_iter().map(|m| vec![m]));
            }
        }
        Ok(history.clone())
    }
}

/// Connector handing out pre-built accessors by chain id
#[derive(Default)]
pub struct MockConnector {
    pub providers: HashMap<u16, Arc<dyn DeliveryProviderAccessor>>,
    pub relays: HashMap<u16, Arc<dyn RelayAccessor>>,
}

impl ChainConnector for MockConnector {
    fn delivery_provider(
        &self,
        chain: &ChainDescriptor,
    ) -> Result<Arc<dyn DeliveryProviderAccessor>> {
        self.providers
            .get(&chain.chain_id)
            .cloned()
            .ok_or_else(|| eyre!("no provider for chain {}", chain.chain_id))
    }

    fn relay(&self, chain: &ChainDescriptor) -> Result<Arc<dyn RelayAccessor>> {
        self.relays
            .get(&chain.chain_id)
            .cloned()
            .ok_or_else(|| eyre!("no relay for chain {}", chain.chain_id))
    }
}
