//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem. Designed for
//! short-lived function invocations where logs go to stdout and are collected
//! by the surrounding platform.
//!
//! The `correlation_id` field is the primary tracing identifier across
//! components: the resolver stamps it on every routing decision, the dispatch
//! fan-out carries it on every action event, and the retry orchestrator logs it
//! when replaying a message. Emitting it first in structured log fields keeps
//! cross-invocation log queries cheap.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Global initialization state so repeated calls are safe in tests.
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

fn get_environment() -> String {
    std::env::var("MAILROUTE_ENV").unwrap_or_else(|_| "development".to_string())
}

fn default_level_for(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

fn get_log_level(environment: &str) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| default_level_for(environment).to_string())
}

/// Initialize console logging with environment-based level selection.
///
/// Plain formatted output with ANSI colors when stdout is a TTY. Safe to call
/// more than once; only the first call installs the subscriber.
pub fn init_console_only() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .with_filter(EnvFilter::new(&log_level));

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

/// Initialize structured JSON logging for deployed invocations.
///
/// One JSON object per line, suitable for log aggregation and the dashboard
/// queries that key off `correlation_id` and `messageId` fields.
pub fn init_structured_logging() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_filter(EnvFilter::new(&log_level));

        let subscriber = tracing_subscriber::registry().with(json_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                format = "json",
                "Structured logging initialized"
            );
        }
    });
}
