//! Tracing initialization.

use crate::ColorWhen;
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Install the process-wide tracing subscriber.
///
/// - Respects `RUST_LOG` via `EnvFilter`, falling back to `info`.
/// - ANSI color controlled by `ColorWhen`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(color: ColorWhen) -> Result<()> {
    // ---
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_ansi(color.should_color_stderr())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
