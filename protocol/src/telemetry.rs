//! # Structured Logging
//!
//! The crate only emits `tracing` events; embedding applications decide
//! where they go. [`init_logging`] is a convenience for binaries and tests
//! that just want a sensible subscriber: pretty or JSON lines on stderr,
//! filtered by `RUST_LOG` when set.
//!
//! Events never carry key material, blinding factors, or plaintext amounts.
//! Addresses, feature ids, proof modes, and sizes are fair game.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, colored output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g. `"info"` or
/// `"cloak_protocol=debug"`. Returns an error instead of panicking if a
/// global subscriber is already installed, so libraries and test suites can
/// call it freely.
pub fn init_logging(
    default_level: &str,
    format: LogFormat,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init()?,
    }

    tracing::info!(format = ?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let first = init_logging("warn", LogFormat::Pretty);
        let second = init_logging("warn", LogFormat::Json);
        // Another test may have won the race for the first install.
        assert!(first.is_err() || second.is_err());
    }
}
