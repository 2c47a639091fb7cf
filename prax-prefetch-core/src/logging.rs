//! Logging setup for prefetch resolution.
//!
//! The engine logs through `tracing`; installing a subscriber is opt-in and
//! only available with the `tracing-subscriber` feature.
//!
//! # Environment Variables
//!
//! - `PRAX_DEBUG=true` / `PRAX_DEBUG=1` - Enable debug logging
//! - `PRAX_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `PRAX_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! The `[debug]` table of [`PrefetchConfig`](crate::config::PrefetchConfig)
//! supplies the same settings; environment variables win when both are set.
//!
//! ```rust,no_run
//! use prax_prefetch_core::logging;
//!
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

use crate::config::DebugConfig;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `PRAX_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("PRAX_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn normalize_level(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn normalize_format(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "pretty" => "pretty",
        "compact" => "compact",
        _ => "json",
    }
}

/// Resolve the log level: `PRAX_LOG_LEVEL`, then `PRAX_DEBUG`, then `fallback`.
pub fn get_log_level(fallback: &str) -> &'static str {
    if let Some(level) = env::var("PRAX_LOG_LEVEL").ok().as_deref().and_then(normalize_level) {
        return level;
    }
    if is_debug_enabled() {
        return "debug";
    }
    normalize_level(fallback).unwrap_or("warn")
}

/// Resolve the log format: `PRAX_LOG_FORMAT`, then `fallback`.
pub fn get_log_format(fallback: &str) -> &'static str {
    match env::var("PRAX_LOG_FORMAT") {
        Ok(format) => normalize_format(&format),
        Err(_) => normalize_format(fallback),
    }
}

/// Initialize logging from the environment. Subsequent calls are no-ops.
pub fn init() {
    if !is_debug_enabled() && env::var("PRAX_LOG_LEVEL").is_err() {
        return;
    }
    init_with_config(&DebugConfig::default());
}

/// Initialize logging from a `[debug]` config table, with environment overrides.
pub fn init_with_config(config: &DebugConfig) {
    INIT.call_once(|| {
        let level = get_log_level(&config.log_level);
        let format = get_log_format(&config.log_format);

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!(
                "prax_prefetch={},prax_prefetch_core={}",
                level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match format {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level = level, format = format, "Prax prefetch logging initialized");
            }
        }

        #[cfg(not(feature = "tracing-subscriber"))]
        {
            let _ = (level, format);
        }
    });
}
