//! Delivery verifier
//!
//! Sends a probe message from a source chain and polls the target chain's
//! integration contract until the probe shows up in its message history or
//! the poll budget runs out.
//!
//! Flow:
//! 1. Quote the delivery price on the source relayer
//! 2. Send `"ID: <random>"` through the source integration with the quote as value
//! 3. Sleep, read the target history, look for the probe; repeat
//!
//! Quote and broadcast errors are returned as `Err`. Everything after the
//! broadcast is a typed [`DeliveryOutcome`].

use std::time::Duration;

use alloy::primitives::{Bytes, U256};
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accessor::RelayAccessor;
use crate::types::SendStatus;

/// Number of most recent history entries searched for the probe
pub const HISTORY_WINDOW: usize = 20;

/// Default delivery gas budget for probes
pub const DEFAULT_GAS_LIMIT: u32 = 2_000_000;

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub gas_limit: u32,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            poll_attempts: 20,
            poll_interval: Duration::from_millis(2000),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Probe found after `polls` history reads
    Delivered { polls: u32, tx_hash: String },
    /// Poll budget exhausted
    Undelivered { polls: u32, tx_hash: String },
    /// Broadcast succeeded but the receipt failed or reverted; never polled
    SendFailed { tx_hash: String, reason: String },
}

/// One probe send and its observed outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    pub source: u16,
    pub target: u16,
    pub probe: String,
    pub sent_at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
}

/// Random probe payload, distinct per attempt
pub fn generate_probe() -> String {
    format!("ID: {}", rand::thread_rng().gen::<u64>())
}

/// Whether `probe` is among the last [`HISTORY_WINDOW`] received messages.
///
/// The window counts history entries, not payloads. Every payload of an
/// entry inside the window is compared.
pub fn probe_in_history(history: &[Vec<Bytes>], probe: &str) -> bool {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .flatten()
        .any(|payload| String::from_utf8_lossy(payload) == probe)
}

/// Send one probe from `source` to `target` and wait for it to be observed
pub async fn send_and_verify(
    source: u16,
    target: u16,
    source_relay: &dyn RelayAccessor,
    target_relay: &dyn RelayAccessor,
    options: &VerifyOptions,
) -> Result<DeliveryAttempt> {
    let value = source_relay
        .quote_delivery_price(target, U256::ZERO, u64::from(options.gas_limit))
        .await
        .wrap_err_with(|| format!("Failed to quote delivery {} -> {}", source, target))?;

    let probe = generate_probe();
    let sent_at = Utc::now();
    debug!(source, target, probe = %probe, value = %value, "Sending probe");

    let status = source_relay
        .send_message(probe.as_bytes(), target, options.gas_limit, value)
        .await
        .wrap_err_with(|| format!("Failed to send probe {} -> {}", source, target))?;

    let tx_hash = match status {
        SendStatus::Confirmed { tx_hash } => tx_hash,
        SendStatus::Failed { tx_hash, reason } => {
            warn!(source, target, tx_hash = %tx_hash, reason = %reason, "Probe send failed");
            return Ok(DeliveryAttempt {
                source,
                target,
                probe,
                sent_at,
                outcome: DeliveryOutcome::SendFailed { tx_hash, reason },
            });
        }
    };

    info!(source, target, tx_hash = %tx_hash, "Probe sent, polling target");

    let mut polls = 0;
    while polls < options.poll_attempts {
        tokio::time::sleep(options.poll_interval).await;
        polls += 1;

        match target_relay.message_history().await {
            Ok(history) if probe_in_history(&history, &probe) => {
                info!(source, target, polls, "Probe delivered");
                return Ok(DeliveryAttempt {
                    source,
                    target,
                    probe,
                    sent_at,
                    outcome: DeliveryOutcome::Delivered { polls, tx_hash },
                });
            }
            Ok(_) => debug!(source, target, polls, "Probe not yet delivered"),
            Err(e) => warn!(source, target, polls, error = %e, "Failed to read message history"),
        }
    }

    warn!(source, target, polls, tx_hash = %tx_hash, "Probe undelivered");
    Ok(DeliveryAttempt {
        source,
        target,
        probe,
        sent_at,
        outcome: DeliveryOutcome::Undelivered { polls, tx_hash },
    })
}
