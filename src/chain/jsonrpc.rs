//! [`ChainClient`] over an Ethereum-style JSON-RPC HTTP endpoint.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{abi, parse_quantity, Block, ChainClient, ChainError, ChainTransaction, ContractCall, Receipt};

/// JSON-RPC client backed by `reqwest`.
pub struct JsonRpcChainClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    transactions: Vec<String>,
}

impl JsonRpcChainClient {
    /// Build a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| ChainError::Transport { method, source })?;

        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|source| ChainError::Transport { method, source })?;

        if !status.is_success() {
            return Err(ChainError::Rpc {
                method,
                message: format!("HTTP {status}: {value}"),
            });
        }
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(ChainError::Rpc { method, message });
        }

        value.get("result").cloned().ok_or(ChainError::InvalidResponse {
            method,
            reason: "missing result field".to_string(),
        })
    }

    /// Call `method` and decode a nullable result into `T`.
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let result = self.call(method, params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ChainError::InvalidResponse {
                method,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        const METHOD: &str = "eth_blockNumber";
        let result = self.call(METHOD, json!([])).await?;
        result
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| ChainError::InvalidResponse {
                method: METHOD,
                reason: format!("not a quantity: {result}"),
            })
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError> {
        const METHOD: &str = "eth_getBlockByNumber";
        let raw: Option<RpcBlock> = self
            .call_optional(METHOD, json!([format!("{number:#x}"), false]))
            .await?;
        raw.map(|b| {
            let number = parse_quantity(&b.number).ok_or_else(|| ChainError::InvalidResponse {
                method: METHOD,
                reason: format!("bad block number {}", b.number),
            })?;
            Ok(Block {
                number,
                hash: b.hash,
                transactions: b.transactions,
            })
        })
        .transpose()
    }

    async fn transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, ChainError> {
        self.call_optional("eth_getTransactionByHash", json!([hash]))
            .await
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError> {
        self.call_optional("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    async fn call_contract(&self, call: ContractCall<'_>) -> Result<String, ChainError> {
        const METHOD: &str = "eth_call";
        let mut request = json!({
            "to": call.contract,
            "data": abi::call_data(call.method),
        });
        if let Some(from) = call.from {
            request["from"] = json!(from);
        }

        let result = self.call(METHOD, json!([request, "latest"])).await?;
        let encoded = result.as_str().ok_or_else(|| ChainError::InvalidResponse {
            method: METHOD,
            reason: format!("non-string result for {}: {result}", call.method),
        })?;
        abi::decode_string(encoded).map_err(|reason| ChainError::InvalidResponse {
            method: METHOD,
            reason: format!("{}: {reason}", call.method),
        })
    }
}
