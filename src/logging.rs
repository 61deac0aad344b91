//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise `[log].level` from the config
//! file applies. Logs go to stderr so command output on stdout stays
//! machine-readable.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing("debug");
        init_tracing("not a valid directive [");
        tracing::info!("still logging");
    }
}
