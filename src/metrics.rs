//! Prometheus counters for delivery verification

use eyre::Result;
use prometheus::{IntCounterVec, Opts, Registry};
use serde::Serialize;

use crate::verifier::{DeliveryAttempt, DeliveryOutcome};

const LABELS: &[&str] = &["source", "target"];

/// Probe counters per (source, target) chain pair
pub struct DeliveryMetrics {
    pub sent_total: IntCounterVec,
    pub delivered_total: IntCounterVec,
    pub undelivered_total: IntCounterVec,
    pub failed_to_send_total: IntCounterVec,
    pub registry: Registry,
}

/// Counter values for one pair, or summed over all pairs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub sent: u64,
    pub delivered: u64,
    pub undelivered: u64,
    pub failed_to_send: u64,
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_vec(name: &str, help: &str) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), LABELS).expect("constant metric name is valid")
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sent_total = counter_vec("relay_probes_sent_total", "Total probe messages attempted");
        let delivered_total = counter_vec(
            "relay_probes_delivered_total",
            "Probe messages observed on the target chain",
        );
        let undelivered_total = counter_vec(
            "relay_probes_undelivered_total",
            "Probe messages not observed before the poll budget ran out",
        );
        let failed_to_send_total = counter_vec(
            "relay_probes_failed_to_send_total",
            "Probe messages that could not be quoted, sent or confirmed",
        );

        for collector in [
            &sent_total,
            &delivered_total,
            &undelivered_total,
            &failed_to_send_total,
        ] {
            registry
                .register(Box::new(collector.clone()))
                .expect("metric registration must not be called twice");
        }

        Self {
            sent_total,
            delivered_total,
            undelivered_total,
            failed_to_send_total,
            registry,
        }
    }

    /// Count one `send_and_verify` call. A hard error counts as failed-to-send.
    pub fn record(&self, source: u16, target: u16, result: &Result<DeliveryAttempt>) {
        let (source, target) = (source.to_string(), target.to_string());
        let labels = [source.as_str(), target.as_str()];

        self.sent_total.with_label_values(&labels).inc();
        let outcome_counter = match result {
            Ok(attempt) => match attempt.outcome {
                DeliveryOutcome::Delivered { .. } => &self.delivered_total,
                DeliveryOutcome::Undelivered { .. } => &self.undelivered_total,
                DeliveryOutcome::SendFailed { .. } => &self.failed_to_send_total,
            },
            Err(_) => &self.failed_to_send_total,
        };
        outcome_counter.with_label_values(&labels).inc();
    }

    pub fn pair_counts(&self, source: u16, target: u16) -> DeliveryCounts {
        let (source, target) = (source.to_string(), target.to_string());
        let labels = [source.as_str(), target.as_str()];
        DeliveryCounts {
            sent: self.sent_total.with_label_values(&labels).get(),
            delivered: self.delivered_total.with_label_values(&labels).get(),
            undelivered: self.undelivered_total.with_label_values(&labels).get(),
            failed_to_send: self.failed_to_send_total.with_label_values(&labels).get(),
        }
    }

    /// Totals summed over every pair seen so far
    pub fn totals(&self) -> DeliveryCounts {
        let mut counts = DeliveryCounts::default();
        for family in self.registry.gather() {
            let sum: u64 = family
                .get_metric()
                .iter()
                .map(|m| m.get_counter().get_value() as u64)
                .sum();
            match family.get_name() {
                "relay_probes_sent_total" => counts.sent = sum,
                "relay_probes_delivered_total" => counts.delivered = sum,
                "relay_probes_undelivered_total" => counts.undelivered = sum,
                "relay_probes_failed_to_send_total" => counts.failed_to_send = sum,
                _ => {}
            }
        }
        counts
    }
}
