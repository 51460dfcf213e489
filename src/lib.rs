//! Concurrent fetch, parse, dedup and digest core for a once-per-interval
//! terminal feed reader. See the per-module docs for the component this
//! crate is built from (C1-C7): identity normalization, the seen-hash
//! store, the feed parser, the batch fetcher, the pipeline coordinator, the
//! digest engine, and per-group state.

pub mod config;
pub mod digest;
pub mod error;
pub mod fetcher;
pub mod group_state;
pub mod identity;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod seen_store;
pub mod text;

pub use config::CoreConfig;
pub use digest::{DigestEngine, DigestRequest, DigestResult, FailedFeed};
pub use error::{Error, ErrorKind, Result};
pub use model::{Feed, Group, Item, Snapshot};

/// Install a `tracing_subscriber::EnvFilter`-driven subscriber for binaries
/// and tests that want one. The library itself never installs a global
/// subscriber (§1.1): only emits events.
pub fn init_diagnostics() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
