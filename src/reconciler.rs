//! Delivery provider config reconciler
//!
//! For every operating chain, reads the current per-target pricing and routing
//! plus the chain-global reward address and supported key bitmap, diffs them
//! against the desired config, and submits at most one `updateConfig`
//! transaction carrying every difference.
//!
//! # Isolation
//!
//! Chains run concurrently and are joined with a settle-all join. A failing
//! RPC or a reverted update on one chain becomes a [`ChainOutcome::Failed`]
//! entry for that chain only; the other chains finish normally.

use alloy::primitives::{Address, B256, U256};
use eyre::{eyre, Result};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::accessor::{ChainConnector, DeliveryProviderAccessor};
use crate::bitmap::extract_keys;
use crate::desired::{DesiredConfig, DesiredTarget};
use crate::error::{classify_error, FailureKind};
use crate::registry::ChainDescriptor;
use crate::types::{CoreConfigUpdate, ObservedCore, ObservedTarget, UpdateRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Compute and report diffs without submitting transactions
    pub dry_run: bool,
}

/// Terminal state of one operating chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainOutcome {
    /// On-chain config already matched; nothing submitted
    NoOp,
    Applied { tx_hash: String },
    /// Dry run found differences
    Planned,
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub chain_id: u16,
    pub updates: Vec<UpdateRecord>,
    pub core_update: CoreConfigUpdate,
    pub outcome: ChainOutcome,
}

impl ReconciliationResult {
    fn failed(chain_id: u16, error: &eyre::Report) -> Self {
        let reason = format!("{:#}", error);
        Self {
            chain_id,
            updates: Vec::new(),
            core_update: CoreConfigUpdate::default(),
            outcome: ChainOutcome::Failed {
                kind: classify_error(&reason),
                reason,
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ChainOutcome::Failed { .. })
    }
}

/// End-of-run report, one result per operating chain in registry order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub results: Vec<ReconciliationResult>,
}

impl ReconciliationReport {
    pub fn all_succeeded(&self) -> bool {
        !self.results.iter().any(ReconciliationResult::is_failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn result(&self, chain_id: u16) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| r.chain_id == chain_id)
    }

    /// Number of `updateConfig` transactions that landed successfully
    pub fn applied_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ChainOutcome::Applied { .. }))
            .count()
    }

    /// Log one line per chain
    pub fn log_summary(&self) {
        for result in &self.results {
            match &result.outcome {
                ChainOutcome::NoOp => {
                    info!(chain_id = result.chain_id, "No config changes needed")
                }
                ChainOutcome::Applied { tx_hash } => info!(
                    chain_id = result.chain_id,
                    tx_hash = %tx_hash,
                    updates = result.updates.len(),
                    core_changed = !result.core_update.is_empty(),
                    "Config updated"
                ),
                ChainOutcome::Planned => info!(
                    chain_id = result.chain_id,
                    updates = result.updates.len(),
                    core_changed = !result.core_update.is_empty(),
                    "Config changes planned (dry run)"
                ),
                ChainOutcome::Failed { kind, reason } => error!(
                    chain_id = result.chain_id,
                    kind = ?kind,
                    reason = %reason,
                    "Config reconciliation failed"
                ),
            }
        }
    }
}

/// Diff one (operating, target) pair.
///
/// Returns `None` when every field already matches. Price and buffer fields
/// are written as pairs, so a change in either half sets the single shared
/// flag and carries both desired halves.
pub fn diff_target(
    target_chain: u16,
    desired: &DesiredTarget,
    desired_address: B256,
    observed: &ObservedTarget,
) -> Option<UpdateRecord> {
    let mut record: Option<UpdateRecord> = None;

    if desired.gas_price != observed.gas_price
        || desired.native_currency_price != observed.native_currency_price
    {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_price = true;
        r.gas_price = desired.gas_price;
        r.native_currency_price = desired.native_currency_price;
    }

    if desired.deliver_gas_overhead != observed.deliver_gas_overhead {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_deliver_gas_overhead = true;
        r.deliver_gas_overhead = desired.deliver_gas_overhead;
    }

    if desired.maximum_budget != observed.maximum_budget {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_maximum_budget = true;
        r.maximum_budget = desired.maximum_budget;
    }

    if desired_address != observed.target_chain_address {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_target_chain_address = true;
        r.target_chain_address = desired_address;
    }

    if desired.is_supported != observed.is_supported {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_supported_chain = true;
        r.is_supported = desired.is_supported;
    }

    if desired.asset_conversion_buffer != observed.asset_conversion_buffer {
        let r = record.get_or_insert_with(|| UpdateRecord::new(target_chain));
        r.update_asset_conversion_buffer = true;
        r.asset_conversion_buffer = desired.asset_conversion_buffer;
    }

    record
}

/// Diff the chain-global settings. An absent desired reward address leaves
/// the on-chain value alone.
pub fn diff_core(
    desired_reward: Option<Address>,
    desired_bitmap: U256,
    observed: &ObservedCore,
) -> CoreConfigUpdate {
    let mut update = CoreConfigUpdate::default();

    if let Some(reward) = desired_reward {
        if reward != observed.reward_address {
            update.update_reward_address = true;
            update.reward_address = reward;
        }
    }

    if desired_bitmap != observed.supported_keys_bitmap {
        update.update_supported_key_types = true;
        update.supported_key_types_bitmap = desired_bitmap;
    }

    update
}

async fn observe_target(
    accessor: &dyn DeliveryProviderAccessor,
    target_chain: u16,
) -> Result<ObservedTarget> {
    let (
        gas_price,
        native_currency_price,
        deliver_gas_overhead,
        maximum_budget,
        asset_conversion_buffer,
        target_chain_address,
        is_supported,
    ) = tokio::try_join!(
        accessor.gas_price(target_chain),
        accessor.native_currency_price(target_chain),
        accessor.deliver_gas_overhead(target_chain),
        accessor.maximum_budget(target_chain),
        accessor.asset_conversion_buffer(target_chain),
        accessor.target_chain_address(target_chain),
        accessor.is_chain_supported(target_chain),
    )?;

    Ok(ObservedTarget {
        gas_price,
        native_currency_price,
        deliver_gas_overhead,
        maximum_budget,
        asset_conversion_buffer,
        target_chain_address,
        is_supported,
    })
}

async fn observe_core(accessor: &dyn DeliveryProviderAccessor) -> Result<ObservedCore> {
    let (reward_address, supported_keys_bitmap) =
        tokio::try_join!(accessor.reward_address(), accessor.supported_keys_bitmap())?;
    Ok(ObservedCore {
        reward_address,
        supported_keys_bitmap,
    })
}

/// Read everything for one operating chain and compute its diff
async fn plan_chain(
    accessor: &dyn DeliveryProviderAccessor,
    operating: &ChainDescriptor,
    all_chains: &[ChainDescriptor],
    desired: &DesiredConfig,
) -> Result<(Vec<UpdateRecord>, CoreConfigUpdate)> {
    let (observed_targets, observed_core) = tokio::try_join!(
        try_join_all(
            all_chains
                .iter()
                .map(|target| observe_target(accessor, target.chain_id))
        ),
        observe_core(accessor),
    )?;

    let mut updates = Vec::new();
    for (target, observed) in all_chains.iter().zip(observed_targets.iter()) {
        let desired_target = desired.target(target.chain_id).ok_or_else(|| {
            eyre!("no desired target for chain {}", target.chain_id)
        })?;
        let desired_address = desired
            .target_chain_address(target)
            .unwrap_or_else(|| target.delivery_provider_bytes32());

        if let Some(record) = diff_target(target.chain_id, desired_target, desired_address, observed)
        {
            debug!(
                chain_id = operating.chain_id,
                target_chain = target.chain_id,
                dirty = record.dirty_count(),
                "Target config differs"
            );
            updates.push(record);
        }
    }

    let core_update = diff_core(
        desired.reward_address_for(operating.chain_id),
        desired.supported_keys_bitmap(),
        &observed_core,
    );
    if core_update.update_supported_key_types {
        debug!(
            chain_id = operating.chain_id,
            observed_keys = ?extract_keys(observed_core.supported_keys_bitmap),
            desired_keys = ?desired.supported_keys,
            "Supported key types differ"
        );
    }

    Ok((updates, core_update))
}

async fn reconcile_chain(
    operating: &ChainDescriptor,
    all_chains: &[ChainDescriptor],
    desired: &DesiredConfig,
    connector: &dyn ChainConnector,
    options: &ReconcileOptions,
) -> ReconciliationResult {
    let chain_id = operating.chain_id;

    let accessor = match connector.delivery_provider(operating) {
        Ok(accessor) => accessor,
        Err(e) => {
            warn!(chain_id, error = %e, "Failed to connect to delivery provider");
            return ReconciliationResult::failed(chain_id, &e);
        }
    };

    let (updates, core_update) =
        match plan_chain(accessor.as_ref(), operating, all_chains, desired).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(chain_id, error = %e, "Failed to read delivery provider config");
                return ReconciliationResult::failed(chain_id, &e);
            }
        };

    if updates.is_empty() && core_update.is_empty() {
        return ReconciliationResult {
            chain_id,
            updates,
            core_update,
            outcome: ChainOutcome::NoOp,
        };
    }

    if options.dry_run {
        return ReconciliationResult {
            chain_id,
            updates,
            core_update,
            outcome: ChainOutcome::Planned,
        };
    }

    info!(
        chain_id,
        updates = updates.len(),
        core_changed = !core_update.is_empty(),
        "Submitting delivery provider config update"
    );

    let outcome = match accessor.submit_update(&updates, &core_update).await {
        Ok(tx) if tx.success => ChainOutcome::Applied { tx_hash: tx.tx_hash },
        Ok(tx) => ChainOutcome::Failed {
            kind: FailureKind::Reverted,
            reason: format!("updateConfig transaction {} reverted", tx.tx_hash),
        },
        Err(e) => {
            let reason = format!("{:#}", e);
            ChainOutcome::Failed {
                kind: classify_error(&reason),
                reason,
            }
        }
    };

    ReconciliationResult {
        chain_id,
        updates,
        core_update,
        outcome,
    }
}

/// Reconcile every operating chain against `desired`.
///
/// Fails only when `desired` does not cover every chain in `all_chains`;
/// that check happens before any chain is contacted. Everything else is
/// reported per chain.
pub async fn reconcile(
    operating: &[ChainDescriptor],
    all_chains: &[ChainDescriptor],
    desired: &DesiredConfig,
    connector: &dyn ChainConnector,
    options: &ReconcileOptions,
) -> Result<ReconciliationReport> {
    desired.ensure_covers(all_chains)?;

    info!(
        operating = operating.len(),
        targets = all_chains.len(),
        dry_run = options.dry_run,
        "Reconciling delivery provider configs"
    );

    let results = join_all(
        operating
            .iter()
            .map(|chain| reconcile_chain(chain, all_chains, desired, connector, options)),
    )
    .await;

    Ok(ReconciliationReport { results })
}
