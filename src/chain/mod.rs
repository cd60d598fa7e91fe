//! Narrow view of the ledger node: chain height, blocks, transactions, receipts and
//! read-only contract calls.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

mod abi;
pub mod jsonrpc;

pub use jsonrpc::JsonRpcChainClient;

/// Errors surfaced by a [`ChainClient`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node could not be reached or the HTTP exchange failed.
    #[error("transport error calling {method}: {source}")]
    Transport {
        /// RPC method being called.
        method: &'static str,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The node answered with a JSON-RPC error (reverts land here too).
    #[error("{method} failed: {message}")]
    Rpc {
        /// RPC method being called.
        method: &'static str,
        /// Error message reported by the node.
        message: String,
    },

    /// The node answered with something we could not interpret.
    #[error("{method} returned an invalid response: {reason}")]
    InvalidResponse {
        /// RPC method being called.
        method: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Block header plus the hashes of its transactions, in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block height.
    pub number: u64,
    /// Block hash, if the node reported one.
    pub hash: Option<String>,
    /// Transaction hashes at indices `0..n`.
    pub transactions: Vec<String>,
}

/// Transaction detail as returned by the node. Fields the reader does not interpret are
/// kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    /// Transaction hash.
    pub hash: String,
    /// Sender.
    #[serde(default)]
    pub from: Option<String>,
    /// Target address; `None` for contract creation.
    #[serde(default)]
    pub to: Option<String>,
    /// Hex-encoded input payload.
    #[serde(default)]
    pub input: String,
    /// Signature recovery marker (number or hex quantity).
    #[serde(default)]
    pub v: Option<Value>,
    /// Signature `r`.
    #[serde(default)]
    pub r: Option<String>,
    /// Signature `s`.
    #[serde(default)]
    pub s: Option<String>,
    /// Every other field the node returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChainTransaction {
    /// Minimal transaction with the given hash and everything else empty.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            from: None,
            to: None,
            input: String::new(),
            v: None,
            r: None,
            s: None,
            extra: Map::new(),
        }
    }

    /// Numeric value of the recovery marker, if present and readable.
    pub fn recovery_marker(&self) -> Option<u64> {
        match self.v.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => parse_quantity(s),
            _ => None,
        }
    }
}

/// Subset of a transaction receipt the reader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Hash of the transaction the receipt belongs to.
    pub transaction_hash: String,
    /// Address of the contract created by the transaction, if any.
    #[serde(default)]
    pub contract_address: Option<String>,
}

/// A zero-argument, read-only contract method invocation.
#[derive(Debug, Clone, Copy)]
pub struct ContractCall<'a> {
    /// Contract address.
    pub contract: &'a str,
    /// Method name, e.g. `getName`.
    pub method: &'a str,
    /// Caller identity; private state is only visible to participating parties.
    pub from: Option<&'a str>,
}

/// Ledger node operations consumed by the reader.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Block at `number`, or `None` if the node does not have it.
    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError>;

    /// Transaction detail by hash.
    async fn transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, ChainError>;

    /// Transaction receipt by hash.
    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError>;

    /// Invoke a string-returning contract method and return the decoded string.
    async fn call_contract(&self, call: ContractCall<'_>) -> Result<String, ChainError>;
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex) or a plain decimal string.
pub fn parse_quantity(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => None,
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantities_parse_as_hex_or_decimal() {
        assert_eq!(parse_quantity("0x25"), Some(37));
        assert_eq!(parse_quantity("38"), Some(38));
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("zz"), None);
    }

    #[test]
    fn recovery_marker_accepts_number_and_hex() {
        let mut tx = ChainTransaction::new("0x01");
        assert_eq!(tx.recovery_marker(), None);

        tx.v = Some(json!(38));
        assert_eq!(tx.recovery_marker(), Some(38));

        tx.v = Some(json!("0x25"));
        assert_eq!(tx.recovery_marker(), Some(37));

        tx.v = Some(json!(true));
        assert_eq!(tx.recovery_marker(), None);
    }

    #[test]
    fn unknown_fields_survive_in_extra() {
        let raw = json!({
            "hash": "0xaa",
            "from": "0x01",
            "to": null,
            "input": "0xdead",
            "v": "0x26",
            "nonce": "0x7",
            "blockNumber": "0xa"
        });
        let tx: ChainTransaction = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.to, None);
        assert_eq!(tx.extra.get("nonce"), Some(&json!("0x7")));
        assert_eq!(tx.recovery_marker(), Some(38));
    }
}
