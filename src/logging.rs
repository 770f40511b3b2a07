use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogLevel;

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `level`. Does nothing if a global subscriber is already set.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    if fmt().with_env_filter(filter).with_target(false).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Test variant writing through the test harness's captured output.
#[cfg(test)]
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}
