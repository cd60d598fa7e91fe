//! Records kept by the [`RecordStore`](crate::store::RecordStore): decoded identities and
//! the private transactions they were read from.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ChainTransaction;

/// One biometric descriptor (a fixed-length float vector).
pub type Embedding = Vec<f64>;

/// Identity decoded from a private contract, keyed by the contract address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Contract address the identity was read from.
    pub id: String,
    /// Payload format version reported by the contract.
    pub version: String,
    /// Display name.
    pub name: String,
    /// Biometric descriptors, possibly empty.
    pub biometrics: Vec<Embedding>,
    /// Ingestion time; the TTL is measured from here.
    pub created_at: DateTime<Utc>,
}

/// A private transaction as received from the node, annotated with the contract it
/// targets (or created).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction hash.
    pub id: String,
    /// Resolved contract address.
    pub contract_address: String,
    /// Raw transaction fields.
    #[serde(flatten)]
    pub tx: ChainTransaction,
}

impl TransactionRecord {
    /// Wrap a chain transaction, keying it by its hash.
    pub fn new(tx: ChainTransaction, contract_address: impl Into<String>) -> Self {
        Self {
            id: tx.hash.clone(),
            contract_address: contract_address.into(),
            tx,
        }
    }
}
