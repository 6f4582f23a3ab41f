//! Tracing setup for binaries built on this crate.
//!
//! Library code only emits through `tracing`; installing a subscriber is
//! the application's call. These helpers give binaries the usual `RUST_LOG`
//! behavior in one line.

use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `default_directives` when the variable is unset.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with_default(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// [`init_with_default`] with info-level output for this stack.
pub fn init() {
    init_with_default("guilded=info,guilded_gateway=info,guilded_core=info");
}
