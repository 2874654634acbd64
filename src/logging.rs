//! Tracing setup for tests that use testclusters

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogLevel;

/// Build the filter: `RUST_LOG` when set, otherwise `testclusters=<level>`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "testclusters={}",
            level.as_tracing_level().as_str().to_lowercase()
        ))
    })
}

/// Install a global subscriber. Every test binary may call this once per
/// cluster; later calls are no-ops.
pub fn init(level: LogLevel) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
