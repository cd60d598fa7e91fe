//! Runtime configuration of the reader, independent of how it was parsed.
use std::net::SocketAddr;
use std::time::Duration;

use crate::decoder::ContractSchema;
use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::store::DEFAULT_IDENTITY_TTL;

/// Account the two-call contract getters are invoked as.
pub const DEFAULT_ACCOUNT_ADDRESS: &str = "0xecf7e57d01d3d155e5fc33dbc7a58355685ba39c";

/// Everything the service needs at startup.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub web3_host: String,
    /// Contract layout identities are read with.
    pub schema: ContractSchema,
    /// Caller for two-call contract getters.
    pub account_address: String,
    /// First block to scan.
    pub start_block: u64,
    /// Pause between scan cycles.
    pub poll_interval: Duration,
    /// Identity lifetime from creation.
    pub identity_ttl: Duration,
    /// Base URL of the privacy-manager service.
    pub blackbox_host: String,
    /// Maximum accepted biometric distance.
    pub match_threshold: f64,
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            web3_host: "http://localhost:22000".into(),
            schema: ContractSchema::TwoCall,
            account_address: DEFAULT_ACCOUNT_ADDRESS.into(),
            start_block: 0,
            poll_interval: Duration::from_millis(5000),
            identity_ttl: DEFAULT_IDENTITY_TTL,
            blackbox_host: "http://localhost:9081".into(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            request_timeout: Duration::from_millis(10_000),
        }
    }
}
