//! Probe scheduling for repeated delivery verification
//!
//! A [`Schedule`] expands into an ordered list of (source, target) pairs. The
//! [`LoadTester`] walks that list for a fixed number of rounds or until
//! shutdown, sleeping between calls and counting every outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::accessor::{ChainConnector, RelayAccessor};
use crate::metrics::DeliveryCounts;
use crate::registry::ChainRegistry;
use crate::server::SharedMetrics;
use crate::verifier::{send_and_verify, DeliveryOutcome, VerifyOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One fixed pair
    Single { from: u16, to: u16 },
    /// Each operating chain sends to the next one, wrapping around
    Ring,
    /// Every ordered pair of distinct operating chains
    Matrix,
}

impl Schedule {
    pub fn pairs(&self, operating: &[u16]) -> Vec<(u16, u16)> {
        match *self {
            Schedule::Single { from, to } => vec![(from, to)],
            Schedule::Ring => {
                let n = operating.len();
                (0..n).map(|i| (operating[i], operating[(i + 1) % n])).collect()
            }
            Schedule::Matrix => operating
                .iter()
                .flat_map(|&from| {
                    operating
                        .iter()
                        .filter(move |&&to| to != from)
                        .map(move |&to| (from, to))
                })
                .collect(),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Single { from, to } => write!(f, "single({}->{})", from, to),
            Schedule::Ring => write!(f, "ring"),
            Schedule::Matrix => write!(f, "matrix"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Passes over the pair list; `None` runs until shutdown
    pub rounds: Option<u32>,
    /// Sleep between consecutive probes
    pub delay: Duration,
    pub verify: VerifyOptions,
}

/// Drives `send_and_verify` over a schedule
pub struct LoadTester {
    pairs: Vec<(u16, u16)>,
    relays: HashMap<u16, Arc<dyn RelayAccessor>>,
    metrics: SharedMetrics,
    options: RunOptions,
}

impl LoadTester {
    /// Resolve the schedule against the registry and connect every chain it touches
    pub fn new(
        schedule: Schedule,
        registry: &ChainRegistry,
        connector: &dyn ChainConnector,
        metrics: SharedMetrics,
        options: RunOptions,
    ) -> Result<Self> {
        let pairs = schedule.pairs(registry.operating_ids());
        if pairs.is_empty() {
            return Err(eyre!("schedule {} has no chain pairs to probe", schedule));
        }

        let mut relays: HashMap<u16, Arc<dyn RelayAccessor>> = HashMap::new();
        for &(from, to) in &pairs {
            for chain_id in [from, to] {
                if !relays.contains_key(&chain_id) {
                    let chain = registry.require(chain_id)?;
                    relays.insert(chain_id, connector.relay(chain)?);
                }
            }
        }

        info!(schedule = %schedule, pairs = pairs.len(), "Load tester configured");
        Ok(Self {
            pairs,
            relays,
            metrics,
            options,
        })
    }

    pub fn pairs(&self) -> &[(u16, u16)] {
        &self.pairs
    }

    fn relay(&self, chain_id: u16) -> Result<&dyn RelayAccessor> {
        self.relays
            .get(&chain_id)
            .map(|r| r.as_ref())
            .ok_or_else(|| eyre!("no relay accessor for chain {}", chain_id))
    }

    /// Run until the configured rounds finish or shutdown is signalled.
    ///
    /// Returns the counts observed by this run.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> Result<DeliveryCounts> {
        let mut counts = DeliveryCounts::default();
        let mut round = 0u32;
        let mut first = true;
        let mut shutdown_open = true;

        'rounds: loop {
            if let Some(rounds) = self.options.rounds {
                if round >= rounds {
                    break;
                }
            }
            round += 1;
            info!(round, "Starting probe round");

            for &(source, target) in &self.pairs {
                if !first {
                    let delay = tokio::time::sleep(self.options.delay);
                    tokio::pin!(delay);
                    'delay: loop {
                        tokio::select! {
                            signal = shutdown.recv(), if shutdown_open => match signal {
                                Some(()) => {
                                    info!("Shutdown signal received");
                                    break 'rounds;
                                }
                                None => shutdown_closed(&mut shutdown_open),
                            },
                            _ = &mut delay => break 'delay,
                        }
                    }
                }
                first = false;

                let source_relay = self.relay(source)?;
                let target_relay = self.relay(target)?;

                let verify = send_and_verify(
                    source,
                    target,
                    source_relay,
                    target_relay,
                    &self.options.verify,
                );
                tokio::pin!(verify);
                let result = 'verify: loop {
                    tokio::select! {
                        signal = shutdown.recv(), if shutdown_open => match signal {
                            Some(()) => {
                                info!("Shutdown signal received, abandoning probe");
                                break 'rounds;
                            }
                            None => shutdown_closed(&mut shutdown_open),
                        },
                        result = &mut verify => break 'verify result,
                    }
                };

                if let Err(e) = &result {
                    error!(source, target, error = %e, "Probe attempt failed");
                }
                self.metrics.record(source, target, &result);

                counts.sent += 1;
                match result.as_ref().map(|a| &a.outcome) {
                    Ok(DeliveryOutcome::Delivered { .. }) => counts.delivered += 1,
                    Ok(DeliveryOutcome::Undelivered { .. }) => counts.undelivered += 1,
                    Ok(DeliveryOutcome::SendFailed { .. }) | Err(_) => counts.failed_to_send += 1,
                }
            }
        }

        info!(
            sent = counts.sent,
            delivered = counts.delivered,
            undelivered = counts.undelivered,
            failed_to_send = counts.failed_to_send,
            "Load test finished"
        );
        Ok(counts)
    }
}

/// A dropped sender is not a shutdown request; stop polling the channel
fn shutdown_closed(open: &mut bool) {
    warn!("Shutdown channel closed without a signal, continuing");
    *open = false;
}
