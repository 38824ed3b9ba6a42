//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

pub const LOG_ENV: &str = "THREADTRACE_LOG";

/// Install the fmt subscriber.
///
/// Reads `THREADTRACE_LOG` for per-module levels, e.g.
/// `THREADTRACE_LOG=threadtrace::chain=debug,threadtrace::export=info`.
/// Falls back to `threadtrace=info`. Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("threadtrace=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
