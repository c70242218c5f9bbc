//! Integration test infrastructure for Stash.
//!
//! Every suite in `tests/` runs the same scenarios against each storage
//! backend: memory, local disk, SQLite, tar archive and an in-memory
//! object store behind the `object_store` adapter.
//!
//! # Usage
//!
//! ```ignore
//! use stash_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     for ctx in TestContext::all().await.unwrap() {
//!         // Use ctx.service, ctx.namespace, ...
//!     }
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::{Backend, TestContext};
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,stash_tests=debug,stash_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}
