//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, SEEDED_BEATS};
//! use beatvault::store::MarketTable;
//!
//! #[tokio::test]
//! async fn test_stats() {
//!     let server = TestServer::spawn().await;
//!     let stats = server.manager().get_stats().await.unwrap();
//!     assert_eq!(stats.database["beats"], SEEDED_BEATS);
//! }
//! ```

mod constants;
mod fixtures;
mod server;

pub use constants::*;
pub use server::{TestServer, TestServerOptions};

#[allow(unused_imports)]
pub use fixtures::{media_bytes, seed_market};
