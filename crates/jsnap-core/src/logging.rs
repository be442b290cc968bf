//! Logging initialization.
//!
//! Dual-mode output on stderr: human-readable for interactive use,
//! JSON lines when the agent runs unattended and something else parses
//! the stream. stdout stays clean for attach-mode payloads.

use jsnap_config::LogSettings;
use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem once at startup.
///
/// `JSNAP_LOG` and `RUST_LOG` override the configured level, in that
/// order.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_env("JSNAP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init();
    } else {
        let use_ansi = std::io::stderr().is_terminal();
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(use_ansi),
            )
            .init();
    }
}
