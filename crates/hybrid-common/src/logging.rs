//! Tracing subscriber bootstrap.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Target that executed statements are logged under.
///
/// Enable with `RUST_LOG=hybrid::db=debug` to see every statement with its
/// literal values inlined.
pub const DB_LOG_TARGET: &str = "hybrid::db";

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to `level`.
///
/// A second call is a no-op.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging("debug");
        init_logging("info");
        tracing::debug!(target: DB_LOG_TARGET, "still alive");
    }
}
