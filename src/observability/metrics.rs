//! Metrics collection and exposition.
//!
//! # Metrics
//! - `custody_deposits_detected_total` (counter): new deposits by network, asset
//! - `custody_deposits_confirmed_total` (counter): deposits reaching CONFIRMED
//! - `custody_sweeps_total` (counter): sweep attempts by outcome
//! - `custody_swept_amount` (histogram): size of each consolidation
//! - `custody_notifications_total` (counter): ledger calls by event, outcome
//! - `custody_provider_errors_total` (counter): chain adapter failures
//! - `custody_cycle_duration_seconds` (histogram): poll loop cycle length
//! - `custody_reclaim_pending` (gauge): open reclaim tasks
//! - `custody_price` (gauge): last cached quote by pair

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::chain::types::Network;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {}", e))?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_deposit_detected(network: Network, asset: &str) {
    ::metrics::counter!(
        "custody_deposits_detected_total",
        "network" => network.as_str(),
        "asset" => asset.to_string()
    )
    .increment(1);
}

pub fn record_deposit_confirmed(network: Network, asset: &str) {
    ::metrics::counter!(
        "custody_deposits_confirmed_total",
        "network" => network.as_str(),
        "asset" => asset.to_string()
    )
    .increment(1);
}

/// `outcome` is one of `success`, `failed`, `skipped`.
pub fn record_sweep(network: Network, asset: &str, outcome: &'static str) {
    ::metrics::counter!(
        "custody_sweeps_total",
        "network" => network.as_str(),
        "asset" => asset.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_swept_amount(network: Network, asset: &str, amount: f64) {
    ::metrics::histogram!(
        "custody_swept_amount",
        "network" => network.as_str(),
        "asset" => asset.to_string()
    )
    .record(amount);
}

pub fn record_notification(event: &'static str, success: bool) {
    ::metrics::counter!(
        "custody_notifications_total",
        "event" => event,
        "outcome" => if success { "delivered" } else { "failed" }
    )
    .increment(1);
}

pub fn record_provider_error(network: Network, operation: &'static str) {
    ::metrics::counter!(
        "custody_provider_errors_total",
        "network" => network.as_str(),
        "operation" => operation
    )
    .increment(1);
}

pub fn record_cycle_duration(seconds: f64) {
    ::metrics::histogram!("custody_cycle_duration_seconds").record(seconds);
}

pub fn set_reclaim_pending(count: usize) {
    ::metrics::gauge!("custody_reclaim_pending").set(count as f64);
}

pub fn set_price(pair: &str, rate: f64) {
    ::metrics::gauge!("custody_price", "pair" => pair.to_string()).set(rate);
}
