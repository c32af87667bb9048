//! Tracing bootstrap helpers.

use tracing_subscriber::EnvFilter;

/// Initialize a simple stdout tracing subscriber for development
pub fn init_stdout_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wiretap_core=debug,wiretap_channel=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
