//! Chain Registry
//!
//! Static list of chain descriptors for one environment, assembled from two
//! files under `<config_dir>/<env>/`:
//!
//! ```text
//! chains.json     { "operatingChains": [2, 4],
//!                   "chains": [{ "chainId": 2, "evmNetworkId": 5,
//!                                "rpc": "https://...", "wormholeAddress": "0x..." }] }
//! contracts.json  { "useLastRun": false,
//!                   "deliveryProviders": [{ "chainId": 2, "address": "0x..." }],
//!                   "wormholeRelayers":  [{ "chainId": 2, "address": "0x..." }],
//!                   "mockIntegrations":  [{ "chainId": 2, "address": "0x..." }] }
//! ```
//!
//! With `useLastRun: true` the contract addresses are taken from the last
//! deployment run under `<output_dir>/<env>/deploy*/lastrun.json` instead.

use alloy::primitives::{Address, B256};
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Immutable description of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    /// Relayer chain id (u16 as used by the delivery provider)
    pub chain_id: u16,
    /// Native EVM network id
    pub evm_network_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Core bridge contract address
    pub core_address: Address,
    /// Delivery provider contract address
    pub delivery_provider_address: Address,
    /// Relayer contract address (required for probe sends)
    pub relayer_address: Option<Address>,
    /// Probe integration contract address (required for probe sends and reads)
    pub integration_address: Option<Address>,
}

impl ChainDescriptor {
    /// Delivery provider address left-padded to bytes32, the form stored in
    /// other chains' `targetChainAddress` mapping
    pub fn delivery_provider_bytes32(&self) -> B256 {
        self.delivery_provider_address.into_word()
    }

    pub fn relayer(&self) -> Result<Address> {
        self.relayer_address.ok_or_else(|| {
            ConfigError::MissingContract {
                contract: "wormhole relayer",
                chain_id: self.chain_id,
            }
            .into()
        })
    }

    pub fn integration(&self) -> Result<Address> {
        self.integration_address.ok_or_else(|| {
            ConfigError::MissingContract {
                contract: "mock integration",
                chain_id: self.chain_id,
            }
            .into()
        })
    }
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {} (evm {})", self.chain_id, self.evm_network_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainsFile {
    #[serde(default)]
    operating_chains: Option<Vec<u16>>,
    chains: Vec<ChainInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    chain_id: u16,
    evm_network_id: u64,
    rpc: String,
    wormhole_address: Address,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    chain_id: u16,
    address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractsFile {
    #[serde(default)]
    use_last_run: bool,
    #[serde(default)]
    delivery_providers: Vec<Deployment>,
    #[serde(default)]
    wormhole_relayers: Vec<Deployment>,
    #[serde(default)]
    mock_integrations: Vec<Deployment>,
}

/// Validates that a URL uses http/https and has a host component.
pub fn validate_rpc_url(url_str: &str, name: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| ConfigError::InvalidUrl {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::InvalidUrl {
            name: name.to_string(),
            reason: format!("scheme must be http:// or https://, got {}", scheme),
        }
        .into());
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            name: name.to_string(),
            reason: "missing host".to_string(),
        }
        .into());
    }

    if scheme == "http" {
        tracing::warn!(
            "{} uses unencrypted http://; use https:// in production",
            name
        );
    }

    Ok(())
}

/// All chains of one environment plus the operating subset
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainDescriptor>,
    operating: Vec<u16>,
}

impl ChainRegistry {
    /// Build a registry from descriptors. `operating` of `None` means every
    /// chain operates.
    pub fn new(chains: Vec<ChainDescriptor>, operating: Option<Vec<u16>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for chain in &chains {
            if !seen.insert(chain.chain_id) {
                return Err(ConfigError::DuplicateChain {
                    chain_id: chain.chain_id,
                }
                .into());
            }
            validate_rpc_url(&chain.rpc_url, &format!("chain {} rpc", chain.chain_id))?;
        }

        let operating = match operating {
            Some(ids) => {
                for id in &ids {
                    if !seen.contains(id) {
                        return Err(ConfigError::UnknownChain { chain_id: *id }.into());
                    }
                }
                ids
            }
            None => chains.iter().map(|c| c.chain_id).collect(),
        };

        Ok(Self { chains, operating })
    }

    /// Load `chains.json` and `contracts.json` for one environment.
    ///
    /// `operating_override` (from `OPERATING_CHAINS`) wins over the file's
    /// `operatingChains` list.
    pub fn load(
        config_dir: &Path,
        output_dir: &Path,
        operating_override: Option<Vec<u16>>,
    ) -> Result<Self> {
        let chains_file: ChainsFile = read_json(&config_dir.join("chains.json"))?;
        let contracts_file: ContractsFile = read_json(&config_dir.join("contracts.json"))?;

        let (delivery_providers, relayers, integrations) = if contracts_file.use_last_run {
            (
                read_last_run(output_dir, "deployDeliveryProvider", "deliveryProviderProxies")?,
                read_optional_last_run(
                    output_dir,
                    "deployWormholeRelayer",
                    "wormholeRelayerProxies",
                )?,
                read_optional_last_run(output_dir, "deployMockIntegration", "mockIntegrations")?,
            )
        } else {
            (
                contracts_file.delivery_providers,
                contracts_file.wormhole_relayers,
                contracts_file.mock_integrations,
            )
        };

        let delivery_providers = by_chain(&delivery_providers);
        let relayers = by_chain(&relayers);
        let integrations = by_chain(&integrations);

        let mut chains = Vec::with_capacity(chains_file.chains.len());
        for info in chains_file.chains {
            let delivery_provider_address = *delivery_providers
                .get(&info.chain_id)
                .ok_or(ConfigError::MissingContract {
                    contract: "delivery provider",
                    chain_id: info.chain_id,
                })?;

            chains.push(ChainDescriptor {
                chain_id: info.chain_id,
                evm_network_id: info.evm_network_id,
                rpc_url: info.rpc,
                core_address: info.wormhole_address,
                delivery_provider_address,
                relayer_address: relayers.get(&info.chain_id).copied(),
                integration_address: integrations.get(&info.chain_id).copied(),
            });
        }

        let operating = operating_override.or(chains_file.operating_chains);
        let registry = Self::new(chains, operating)?;

        tracing::info!(
            chains = registry.chains.len(),
            operating = ?registry.operating,
            "Chain registry loaded"
        );

        Ok(registry)
    }

    /// Every chain in the registry
    pub fn all_chains(&self) -> &[ChainDescriptor] {
        &self.chains
    }

    /// Operating chains in configured order
    pub fn operating_chains(&self) -> Vec<ChainDescriptor> {
        self.operating
            .iter()
            .filter_map(|id| self.get(*id))
            .cloned()
            .collect()
    }

    pub fn operating_ids(&self) -> &[u16] {
        &self.operating
    }

    /// Look up a chain by id
    pub fn get(&self, chain_id: u16) -> Option<&ChainDescriptor> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Look up a chain by id, failing with a config error
    pub fn require(&self, chain_id: u16) -> Result<&ChainDescriptor> {
        self.get(chain_id)
            .ok_or_else(|| ConfigError::UnknownChain { chain_id }.into())
    }

    pub fn chain_ids(&self) -> Vec<u16> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }
}

fn by_chain(deployments: &[Deployment]) -> HashMap<u16, Address> {
    deployments
        .iter()
        .map(|d| (d.chain_id, d.address))
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("Failed to parse {}", path.display()))
}

fn read_last_run(output_dir: &Path, process: &str, key: &str) -> Result<Vec<Deployment>> {
    let path = output_dir.join(process).join("lastrun.json");
    let value: serde_json::Value = read_json(&path)?;
    let entries = value
        .get(key)
        .cloned()
        .ok_or_else(|| eyre!("{} has no {} entry", path.display(), key))?;
    serde_json::from_value(entries).wrap_err_with(|| format!("Invalid {} in {}", key, path.display()))
}

/// Like [`read_last_run`], but a deployment that never ran yields no entries
fn read_optional_last_run(output_dir: &Path, process: &str, key: &str) -> Result<Vec<Deployment>> {
    if !output_dir.join(process).join("lastrun.json").exists() {
        return Ok(Vec::new());
    }
    read_last_run(output_dir, process, key)
}
