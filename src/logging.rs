//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing consumer hand-offs,
//! rejections and cancellations across the delivery and application threads.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let console = if use_json_format() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber installed by the host application is fine
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            level = %log_level,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PULL_BRIDGE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("PULL_BRIDGE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for consumer operations
pub fn log_consumer_operation(
    operation: &str,
    queue_name: &str,
    consumer_tag: Option<&str>,
    delivery_tag: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        queue = %queue_name,
        consumer_tag = consumer_tag,
        delivery_tag = delivery_tag,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CONSUMER_OPERATION"
    );
}
