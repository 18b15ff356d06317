//! Tracing subscriber bootstrap. Mirrors the teacher's `main.rs`
//! (`tracing_subscriber::registry().with(...).init()`), but kept out of
//! the library's own call paths: a library must never install a global
//! subscriber behind an importer's back. Binaries and integration tests
//! that embed this crate call [`init_tracing`] themselves.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `tracing` subscriber reading `RUST_LOG`, defaulting
/// to `info` when unset. Panics if a subscriber is already installed;
/// call at most once, near process start.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
