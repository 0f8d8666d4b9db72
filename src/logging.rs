//! # Logging
//!
//! Global `tracing` subscriber setup. Filtering follows `RUST_LOG`, with
//! `TALLYSIM_LOG` taking precedence when set, and defaults to `info`.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Environment variable overriding `RUST_LOG` for this crate's binaries
pub const LOG_ENV: &str = "TALLYSIM_LOG";

/// Install the global fmt subscriber
pub fn init_tracing() -> Result<(), InitError> {
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let filter = build_filter()?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| InitError::AlreadyInitialised)
}

fn build_filter() -> Result<EnvFilter, InitError> {
    match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => {
            EnvFilter::try_new(raw.trim()).map_err(|err| InitError::Directive(err.to_string()))
        }
        Ok(_) | Err(std::env::VarError::NotPresent) => {
            Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        }
        Err(err) => Err(InitError::Env(err)),
    }
}

/// Errors emitted when configuring the tracing subscriber
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read TALLYSIM_LOG: {0}")]
    Env(std::env::VarError),
    #[error("invalid log directive: {0}")]
    Directive(String),
}
