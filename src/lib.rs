#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! psc-reader: a private-transaction reader for permissioned ledgers.
//!
//! ## What you implement
//! - [`ChainClient`]: block height, blocks, transactions, receipts and read-only
//!   contract calls. [`JsonRpcChainClient`] speaks JSON-RPC to a node.
//! - [`RecordStore`]: identities (with TTL) and transactions. [`SqliteStore`] keeps them
//!   in an in-memory SQLite database.
//! - [`PrivacyGateway`]: delete a private payload by key. [`HttpPrivacyGateway`] talks
//!   to the privacy manager.
//!
//! ## What the reader does
//! - Polls the chain height and walks every block from its cursor, one transaction at a
//!   time.
//! - Keeps only **private** transactions (recovery marker 37 or 38), resolves the
//!   contract they touch and decodes the identity it holds.
//! - Validates and stores the identity next to the transaction that produced it.
//! - Serves listings, counts, **biometric matching** and cascading **deletes** over HTTP.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use psc_reader::prelude::*;
//! use std::{sync::Arc, time::Duration};
//!
//! async fn scan_once() -> anyhow::Result<()> {
//!     let chain = Arc::new(JsonRpcChainClient::new("http://localhost:22000", Duration::from_secs(10))?);
//!     let store = Arc::new(SqliteStore::new_in_memory(Duration::from_secs(48 * 3600))?);
//!     let strategy = ContractSchema::from_name("FlightPass").strategy("0xecf7e57d01d3d155e5fc33dbc7a58355685ba39c");
//!
//!     let mut scanner = BlockScanner::new(chain, store, strategy, 0, Duration::from_secs(5));
//!     let report = scanner.run_cycle().await?;
//!     println!("stored {} identities, next block {}", report.identities_stored, scanner.cursor());
//!     Ok(())
//! }
//! ```

/// Ledger access: the client trait, its JSON-RPC implementation and wire types.
pub mod chain;

/// Private/public classification by recovery marker.
pub mod classifier;

/// Contract-schema strategies that read identities out of contracts.
pub mod decoder;

/// Identity schema check.
pub mod validator;

/// Stored record types.
pub mod records;

/// Persistence layer (trait and SQLite implementation).
pub mod store;

/// Block scanning loop.
pub mod scanner;

/// Biometric matching against stored identities.
pub mod matcher;

/// Privacy-manager client.
pub mod gateway;

/// Cascading deletion of a contract's transactions and identity.
pub mod deletion;

/// HTTP routes.
pub mod api;

/// Startup configuration.
pub mod config;

#[cfg(feature = "store-sqlite")]
mod service;

// Public re-exports
pub use chain::{ChainClient, JsonRpcChainClient};
pub use config::ReaderConfig;
pub use decoder::{ContractSchema, DecodeStrategy};
pub use deletion::DeletionCoordinator;
pub use gateway::{HttpPrivacyGateway, PrivacyGateway};
pub use matcher::{BiometricMatcher, EuclideanMatcher};
pub use scanner::BlockScanner;
#[cfg(feature = "store-sqlite")]
pub use service::run;
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use store::RecordStore;

/// Convenience prelude for end users.
pub mod prelude {
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
    pub use crate::{
        BlockScanner, ChainClient, ContractSchema, DecodeStrategy, DeletionCoordinator,
        JsonRpcChainClient, PrivacyGateway, RecordStore, ReaderConfig,
    };
}
