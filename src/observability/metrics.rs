use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn init_metrics() {
    // Initialize Prometheus recorder
    // By default, it listens on 0.0.0.0:9000, but we can customize it.
    // We'll use port 9100 which is standard for node_exporter/prometheus metrics.
    let addr: SocketAddr = "0.0.0.0:9100".parse().expect("Invalid metrics address");

    let builder = PrometheusBuilder::new().with_http_listener(addr);

    builder
        .install()
        .expect("Failed to install Prometheus recorder");
}

// Helper constants for metric names
pub const METRIC_CONNECTIONS_TOTAL: &str = "tidekv_connections_total";
pub const METRIC_COMMANDS_TOTAL: &str = "tidekv_commands_total";
pub const METRIC_COMMAND_LATENCY: &str = "tidekv_command_latency_seconds";
pub const METRIC_ACTIVE_CONNECTIONS: &str = "tidekv_active_connections";
pub const METRIC_KEYS_TOTAL: &str = "tidekv_keys_total";

// Replication metrics
pub const METRIC_REPL_CONNECTED_SLAVES: &str = "tidekv_replication_connected_slaves";
pub const METRIC_REPL_OPLOG_SEQ: &str = "tidekv_replication_oplog_max_seq";
pub const METRIC_REPL_OPLOG_RING_LEN: &str = "tidekv_replication_oplog_ring_length";
pub const METRIC_REPL_CATCHUP_STARTED: &str = "tidekv_replication_catchup_started_total";
pub const METRIC_REPL_CATCHUP_COMPLETED: &str = "tidekv_replication_catchup_completed_total";
