//! Contract-schema dispatch: turn a contract address into a candidate identity.
//!
//! The schema is picked once from configuration ([`ContractSchema`]) and turned into a
//! boxed [`DecodeStrategy`]; the scanner only ever sees the trait.
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::chain::{ChainClient, ChainError, ContractCall};
use crate::records::Embedding;
use crate::validator::Candidate;

/// Payload version stamped on identities read by [`TwoCallStrategy`].
pub const TWO_CALL_VERSION: &str = "1";

/// Why a contract could not be decoded. Every variant means "skip this transaction".
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A contract method reverted, timed out or could not be reached.
    #[error("contract call {method} failed: {source}")]
    ContractCall {
        /// Method that failed.
        method: &'static str,
        /// Chain client error.
        #[source]
        source: ChainError,
    },

    /// `getName` returned nothing, probably not the right contract.
    #[error("contract returned an empty name")]
    MissingName,

    /// `getVectors` returned data that is not a list of numeric vectors.
    #[error("getVectors did not return a list of numeric vectors: {0}")]
    BadVectors(#[source] serde_json::Error),

    /// `get` returned something other than a JSON identity object.
    #[error("get did not return an identity object: {0}")]
    BadPayload(String),
}

/// A way of reading an identity out of a contract.
#[async_trait]
pub trait DecodeStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the candidate identity held by `contract`.
    async fn decode(&self, chain: &dyn ChainClient, contract: &str)
        -> Result<Candidate, DecodeError>;
}

/// Contract layouts the reader knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractSchema {
    /// `getName()` + `getVectors()` getters, called as a fixed party.
    TwoCall,
    /// A single `get()` returning the identity as JSON.
    SingleCall,
}

impl ContractSchema {
    /// Resolve a configured schema name. `FlightPass` (and `two-call`) select
    /// [`ContractSchema::TwoCall`]; any other name falls back to
    /// [`ContractSchema::SingleCall`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "FlightPass" | "two-call" => Self::TwoCall,
            _ => Self::SingleCall,
        }
    }

    /// Build the strategy for this schema. `caller` is the account used for private
    /// state visibility.
    pub fn strategy(self, caller: impl Into<String>) -> Box<dyn DecodeStrategy> {
        match self {
            Self::TwoCall => Box::new(TwoCallStrategy::new(caller)),
            Self::SingleCall => Box::new(SingleCallStrategy),
        }
    }
}

/// `getName` + `getVectors`, both called from a fixed account.
#[derive(Debug, Clone)]
pub struct TwoCallStrategy {
    caller: String,
}

impl TwoCallStrategy {
    /// Strategy calling as `caller`.
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
        }
    }

    async fn call(
        &self,
        chain: &dyn ChainClient,
        contract: &str,
        method: &'static str,
    ) -> Result<String, DecodeError> {
        chain
            .call_contract(ContractCall {
                contract,
                method,
                from: Some(&self.caller),
            })
            .await
            .map_err(|source| DecodeError::ContractCall { method, source })
    }
}

#[async_trait]
impl DecodeStrategy for TwoCallStrategy {
    fn name(&self) -> &'static str {
        "two-call"
    }

    async fn decode(
        &self,
        chain: &dyn ChainClient,
        contract: &str,
    ) -> Result<Candidate, DecodeError> {
        let name = self.call(chain, contract, "getName").await?;
        if name.is_empty() {
            return Err(DecodeError::MissingName);
        }

        let raw = self.call(chain, contract, "getVectors").await?;
        let biometrics: Vec<Embedding> = if raw.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw).map_err(DecodeError::BadVectors)?
        };

        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name));
        fields.insert("biometrics".into(), serde_json::json!(biometrics));
        fields.insert("version".into(), Value::String(TWO_CALL_VERSION.into()));
        Ok(Candidate::from_fields(fields))
    }
}

/// A single `get()` whose result is the identity as a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCallStrategy;

#[async_trait]
impl DecodeStrategy for SingleCallStrategy {
    fn name(&self) -> &'static str {
        "single-call"
    }

    async fn decode(
        &self,
        chain: &dyn ChainClient,
        contract: &str,
    ) -> Result<Candidate, DecodeError> {
        let raw = chain
            .call_contract(ContractCall {
                contract,
                method: "get",
                from: None,
            })
            .await
            .map_err(|source| DecodeError::ContractCall {
                method: "get",
                source,
            })?;

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(fields)) => Ok(Candidate::from_fields(fields)),
            Ok(other) => Err(DecodeError::BadPayload(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(DecodeError::BadPayload(e.to_string())),
        }
    }
}
