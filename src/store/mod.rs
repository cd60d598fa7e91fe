//! Record storage: identities (with TTL) and private transactions, each keyed by a
//! unique id. Every operation is an atomic snapshot with respect to concurrent callers.
use async_trait::async_trait;
use thiserror::Error;

use crate::records::{Identity, TransactionRecord};

/// Default identity lifetime: 48 hours.
pub const DEFAULT_IDENTITY_TTL: std::time::Duration = std::time::Duration::from_secs(48 * 60 * 60);

/// Errors from the storage medium.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedded database rejected the operation.
    #[cfg(feature = "store-sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A previous writer panicked while holding the store.
    #[error("store lock poisoned")]
    Poisoned,

    /// The blocking task running the operation failed.
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Which identities an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFilter {
    /// Every live identity.
    All,
    /// The identity read from this contract address.
    Id(String),
}

/// Which transactions an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionFilter {
    /// Every transaction.
    All,
    /// The transaction with this hash.
    Hash(String),
    /// Every transaction that targeted or created this contract.
    ContractAddress(String),
}

/// Storage for the two collections.
///
/// Identities whose `created_at + ttl` has passed are never returned or counted.
/// Transactions do not expire.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert, or replace the identity with the same id.
    async fn upsert_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Live identities matching `filter`, in first-insertion order.
    async fn find_identities(&self, filter: &IdentityFilter) -> Result<Vec<Identity>, StoreError>;

    /// Number of live identities matching `filter`.
    async fn count_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError>;

    /// Delete identities matching `filter`; returns how many were removed.
    async fn remove_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError>;

    /// Physically drop expired identities; returns how many were dropped.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    /// Insert, or replace the transaction with the same hash.
    async fn upsert_transaction(&self, tx: &TransactionRecord) -> Result<(), StoreError>;

    /// Transactions matching `filter`, in first-insertion order.
    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Number of transactions matching `filter`.
    async fn count_transactions(&self, filter: &TransactionFilter) -> Result<u64, StoreError>;

    /// Delete transactions matching `filter`; returns how many were removed.
    async fn remove_transactions(&self, filter: &TransactionFilter) -> Result<u64, StoreError>;
}

// concrete stores live here
#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
