//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // OAuth Metrics
    pub static ref OAUTH_STEPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dashfeed_oauth_steps_total", "Total number of OAuth handshake steps"),
        &["step", "outcome"]
    ).expect("metric can be created");

    // Session Store Metrics
    pub static ref SESSION_STORE_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dashfeed_session_store_operations_total", "Total number of session store operations"),
        &["operation", "outcome"]
    ).expect("metric can be created");

    // Streaming Metrics
    pub static ref STREAM_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "dashfeed_stream_connections_active",
        "Current number of open streaming connections"
    ).expect("metric can be created");
    pub static ref STREAM_CONNECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dashfeed_stream_connections_total", "Total number of streaming connections accepted"),
        &["authenticated"]
    ).expect("metric can be created");

    // Polling Metrics
    pub static ref POLL_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dashfeed_poll_fetches_total", "Total number of dashboard polls"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref POSTS_DELIVERED_TOTAL: IntCounter = IntCounter::new(
        "dashfeed_posts_delivered_total",
        "Total number of posts pushed to streaming clients"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dashfeed_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(OAUTH_STEPS_TOTAL.clone()))
        .expect("OAUTH_STEPS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSION_STORE_OPERATIONS_TOTAL.clone()))
        .expect("SESSION_STORE_OPERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(STREAM_CONNECTIONS_ACTIVE.clone()))
        .expect("STREAM_CONNECTIONS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(STREAM_CONNECTIONS_TOTAL.clone()))
        .expect("STREAM_CONNECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(POLL_FETCHES_TOTAL.clone()))
        .expect("POLL_FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(POSTS_DELIVERED_TOTAL.clone()))
        .expect("POSTS_DELIVERED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
