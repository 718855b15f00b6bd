//! Prometheus metrics for the Tessera node.
//!
//! The [`NodeMetrics`] struct owns a dedicated [`Registry`] that an exporter
//! can encode into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Rounds driven by the chain follower.
    pub rounds: IntCounter,
    /// Local duty per round, labelled by role.
    pub roles: IntCounterVec,
    /// Candidates produced, sealed and signed locally.
    pub blocks_produced: IntCounter,
    /// Production attempts that failed.
    pub production_failures: IntCounter,
    /// Validator verdicts, labelled `accepted` / `rejected`.
    pub verdicts: IntCounterVec,
    /// Direct announcements handed to the fetcher sink.
    pub announcements_delivered: IntCounter,
    /// Duty-holders skipped for lack of a connection or a failed send.
    pub announcements_skipped: IntCounter,
    /// Committee rotations observed.
    pub rotations: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub head_height: IntGauge,
    pub current_epoch: IntGauge,
    pub peer_count: IntGauge,
    /// 1 while mining is enabled.
    pub mining: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let rounds = register_int_counter_with_registry!(
            Opts::new("tessera_rounds_total", "Rounds driven by the chain follower"),
            registry
        )
        .expect("failed to register rounds counter");

        let roles = register_int_counter_vec_with_registry!(
            Opts::new("tessera_round_roles_total", "Local duty per round"),
            &["role"],
            registry
        )
        .expect("failed to register roles counter");

        let blocks_produced = register_int_counter_with_registry!(
            Opts::new(
                "tessera_blocks_produced_total",
                "Candidates produced and signed locally"
            ),
            registry
        )
        .expect("failed to register blocks_produced counter");

        let production_failures = register_int_counter_with_registry!(
            Opts::new(
                "tessera_production_failures_total",
                "Production attempts that failed"
            ),
            registry
        )
        .expect("failed to register production_failures counter");

        let verdicts = register_int_counter_vec_with_registry!(
            Opts::new("tessera_verdicts_total", "Validator verdicts"),
            &["outcome"],
            registry
        )
        .expect("failed to register verdicts counter");

        let announcements_delivered = register_int_counter_with_registry!(
            Opts::new(
                "tessera_announcements_delivered_total",
                "Direct announcements handed to the fetcher"
            ),
            registry
        )
        .expect("failed to register announcements_delivered counter");

        let announcements_skipped = register_int_counter_with_registry!(
            Opts::new(
                "tessera_announcements_skipped_total",
                "Duty-holders skipped during announcement"
            ),
            registry
        )
        .expect("failed to register announcements_skipped counter");

        let rotations = register_int_counter_with_registry!(
            Opts::new("tessera_rotations_total", "Committee rotations observed"),
            registry
        )
        .expect("failed to register rotations counter");

        let head_height = register_int_gauge_with_registry!(
            Opts::new("tessera_head_height", "Height of the current chain head"),
            registry
        )
        .expect("failed to register head_height gauge");

        let current_epoch = register_int_gauge_with_registry!(
            Opts::new("tessera_current_epoch", "Current committee epoch"),
            registry
        )
        .expect("failed to register current_epoch gauge");

        let peer_count = register_int_gauge_with_registry!(
            Opts::new("tessera_peer_count", "Current number of connected peers"),
            registry
        )
        .expect("failed to register peer_count gauge");

        let mining = register_int_gauge_with_registry!(
            Opts::new("tessera_mining", "1 while mining is enabled"),
            registry
        )
        .expect("failed to register mining gauge");

        Self {
            registry,
            rounds,
            roles,
            blocks_produced,
            production_failures,
            verdicts,
            announcements_delivered,
            announcements_skipped,
            rotations,
            head_height,
            current_epoch,
            peer_count,
            mining,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_metric_is_registered() {
        let metrics = NodeMetrics::new();
        metrics.roles.with_label_values(&["producer"]).inc();
        metrics.verdicts.with_label_values(&["rejected"]).inc();
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"tessera_round_roles_total".to_string()));
        assert!(names.contains(&"tessera_verdicts_total".to_string()));
        assert!(names.contains(&"tessera_mining".to_string()));
    }
}
