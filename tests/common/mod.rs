#![allow(dead_code)]
//! In-memory fakes for the chain client and the privacy gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use psc_reader::chain::{Block, ChainClient, ChainError, ChainTransaction, ContractCall, Receipt};
use psc_reader::gateway::{GatewayError, PrivacyGateway};
use psc_reader::records::{Embedding, Identity};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const ACCOUNT: &str = "0xecf7e57d01d3d155e5fc33dbc7a58355685ba39c";

/// ------- Chain: blocks, txs, receipts and contract getters held in maps -------
#[derive(Default)]
pub struct FakeChain {
    height: Mutex<Option<u64>>,
    blocks: Mutex<HashMap<u64, Vec<String>>>,
    broken_blocks: Mutex<HashSet<u64>>,
    txs: Mutex<HashMap<String, ChainTransaction>>,
    receipts: Mutex<HashMap<String, Receipt>>,
    getters: Mutex<HashMap<(String, String), String>>,
    /// (contract, method, from) of every contract call, in order.
    pub calls: Mutex<Vec<(String, String, Option<String>)>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` makes `block_number` fail.
    pub fn set_height(&self, height: Option<u64>) {
        *self.height.lock().unwrap() = height;
    }

    pub fn add_block(&self, number: u64, txs: Vec<ChainTransaction>) {
        let hashes = txs.iter().map(|t| t.hash.clone()).collect();
        self.blocks.lock().unwrap().insert(number, hashes);
        for tx in txs {
            self.put_tx(tx);
        }
    }

    pub fn break_block(&self, number: u64) {
        self.broken_blocks.lock().unwrap().insert(number);
    }

    pub fn put_tx(&self, tx: ChainTransaction) {
        self.txs.lock().unwrap().insert(tx.hash.clone(), tx);
    }

    pub fn add_receipt(&self, tx_hash: &str, contract_address: Option<&str>) {
        self.receipts.lock().unwrap().insert(
            tx_hash.to_string(),
            Receipt {
                transaction_hash: tx_hash.to_string(),
                contract_address: contract_address.map(str::to_string),
            },
        );
    }

    pub fn set_getter(&self, contract: &str, method: &str, value: impl Into<String>) {
        self.getters
            .lock()
            .unwrap()
            .insert((contract.to_string(), method.to_string()), value.into());
    }

    /// Two-call contract holding `name` and `vectors`.
    pub fn add_two_call_contract(&self, contract: &str, name: &str, vectors: &[Embedding]) {
        self.set_getter(contract, "getName", name);
        self.set_getter(contract, "getVectors", json!(vectors).to_string());
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let height = *self.height.lock().unwrap();
        height.ok_or(ChainError::Rpc {
            method: "eth_blockNumber",
            message: "node unavailable".into(),
        })
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, ChainError> {
        if self.broken_blocks.lock().unwrap().contains(&number) {
            return Err(ChainError::Rpc {
                method: "eth_getBlockByNumber",
                message: "header not found".into(),
            });
        }
        let transactions = self
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default();
        Ok(Some(Block {
            number,
            hash: Some(format!("0xb{number}")),
            transactions,
        }))
    }

    async fn transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, ChainError> {
        Ok(self.txs.lock().unwrap().get(hash).cloned())
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError> {
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn call_contract(&self, call: ContractCall<'_>) -> Result<String, ChainError> {
        self.calls.lock().unwrap().push((
            call.contract.to_string(),
            call.method.to_string(),
            call.from.map(str::to_string),
        ));
        self.getters
            .lock()
            .unwrap()
            .get(&(call.contract.to_string(), call.method.to_string()))
            .cloned()
            .ok_or(ChainError::Rpc {
                method: "eth_call",
                message: "execution reverted".into(),
            })
    }
}

/// ------- Gateway: 204 unless a key is told otherwise -------
#[derive(Default)]
pub struct FakeGateway {
    statuses: Mutex<HashMap<String, u16>>,
    /// Keys the gateway was asked to delete, in order.
    pub requested: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, key: &str, status: u16) {
        self.statuses.lock().unwrap().insert(key.to_string(), status);
    }
}

#[async_trait]
impl PrivacyGateway for FakeGateway {
    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.requested.lock().unwrap().push(key.to_string());
        match self.statuses.lock().unwrap().get(key).copied().unwrap_or(204) {
            204 => Ok(()),
            status => Err(GatewayError::Rejected { status }),
        }
    }
}

/// Transaction carrying recovery marker `v`.
pub fn tx(hash: &str, to: Option<&str>, input: &str, v: u64) -> ChainTransaction {
    let mut tx = ChainTransaction::new(hash);
    tx.from = Some(ACCOUNT.to_string());
    tx.to = to.map(str::to_string);
    tx.input = input.to_string();
    tx.v = Some(json!(v));
    tx
}

pub fn private_tx(hash: &str, to: Option<&str>, input: &str) -> ChainTransaction {
    tx(hash, to, input, 37)
}

pub fn public_tx(hash: &str, to: Option<&str>) -> ChainTransaction {
    tx(hash, to, "0x", 27)
}

pub fn identity(id: &str, name: &str, biometrics: Vec<Embedding>, created_at: DateTime<Utc>) -> Identity {
    Identity {
        id: id.to_string(),
        version: "1".to_string(),
        name: name.to_string(),
        biometrics,
        created_at,
    }
}
