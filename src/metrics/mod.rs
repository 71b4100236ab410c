//! Prometheus metrics for HVLP
//!
//! Counters are bumped by the broker as events happen. Registry gauges are
//! refreshed from [`RegistryStats`] whenever the metrics are scraped.

use prometheus::{IntCounter, IntGauge, Opts, Registry};

use crate::registry::RegistryStats;

mod server;

pub use server::{status_report, AdminServer, StatusReport};


/// All HVLP metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Connection metrics
    pub connections_total: IntCounter,
    pub connections_current: IntGauge,

    // Registry snapshot
    pub sessions_current: IntGauge,
    pub topics_current: IntGauge,
    pub subscriptions_current: IntGauge,

    // Subscription requests
    pub subscribe_total: IntCounter,
    pub unsubscribe_total: IntCounter,

    // Fan-out
    pub publish_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub deliveries_dropped_total: IntCounter,
}

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help)).expect("static counter options are valid")
}

fn gauge(name: &str, help: &str) -> IntGauge {
    IntGauge::with_opts(Opts::new(name, help)).expect("static gauge options are valid")
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total = counter(
            "hvlp_connections_total",
            "Total number of client connections since startup",
        );
        let connections_current = gauge(
            "hvlp_connections_current",
            "Current number of connected clients",
        );
        let sessions_current = gauge(
            "hvlp_sessions_current",
            "Sessions currently recorded in the registry",
        );
        let topics_current = gauge(
            "hvlp_topics_current",
            "Topics with at least one subscriber",
        );
        let subscriptions_current = gauge(
            "hvlp_subscriptions_current",
            "Current number of topic/client subscription pairs",
        );
        let subscribe_total = counter(
            "hvlp_subscribe_total",
            "Subscribe requests handled since startup",
        );
        let unsubscribe_total = counter(
            "hvlp_unsubscribe_total",
            "Unsubscribe requests handled since startup",
        );
        let publish_total = counter(
            "hvlp_publish_total",
            "Messages published since startup",
        );
        let deliveries_total = counter(
            "hvlp_deliveries_total",
            "Messages queued to subscriber connections",
        );
        let deliveries_dropped_total = counter(
            "hvlp_deliveries_dropped_total",
            "Deliveries dropped (subscriber gone or channel full)",
        );

        let collectors: [Box<dyn prometheus::core::Collector>; 10] = [
            Box::new(connections_total.clone()),
            Box::new(connections_current.clone()),
            Box::new(sessions_current.clone()),
            Box::new(topics_current.clone()),
            Box::new(subscriptions_current.clone()),
            Box::new(subscribe_total.clone()),
            Box::new(unsubscribe_total.clone()),
            Box::new(publish_total.clone()),
            Box::new(deliveries_total.clone()),
            Box::new(deliveries_dropped_total.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric names are unique");
        }

        Metrics {
            registry,
            connections_total,
            connections_current,
            sessions_current,
            topics_current,
            subscriptions_current,
            subscribe_total,
            unsubscribe_total,
            publish_total,
            deliveries_total,
            deliveries_dropped_total,
        }
    }

    pub fn client_connected(&self) {
        self.connections_total.inc();
        self.connections_current.inc();
    }

    pub fn client_disconnected(&self) {
        self.connections_current.dec();
    }

    pub fn published(&self, delivered: usize, dropped: usize) {
        self.publish_total.inc();
        self.deliveries_total.inc_by(delivered as u64);
        self.deliveries_dropped_total.inc_by(dropped as u64);
    }

    /// Copy a registry snapshot into the gauges
    pub fn observe(&self, stats: RegistryStats) {
        self.sessions_current.set(stats.sessions as i64);
        self.topics_current.set(stats.topics as i64);
        self.subscriptions_current.set(stats.subscriptions as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
