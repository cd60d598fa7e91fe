use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Parser;
use psc_reader::{ContractSchema, ReaderConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-RPC endpoint of the ledger node
    #[arg(long, env = "WEB3_HOST", default_value = "http://localhost:22000")]
    web3_host: String,

    /// Contract layout to decode ("FlightPass" for the two-call getters)
    #[arg(long, env = "SMART_CONTRACT_FILE", default_value = "FlightPass")]
    contract_schema: String,

    /// Account the contract getters are called as
    #[arg(long, env = "ACCOUNT_ADDRESS", default_value = psc_reader::config::DEFAULT_ACCOUNT_ADDRESS)]
    account_address: String,

    /// First block to scan
    #[arg(long, env = "ACTUAL_BLOCK", default_value_t = 0)]
    start_block: u64,

    /// Pause between scan cycles, in milliseconds
    #[arg(long, env = "TIMEOUT", default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Identity lifetime, in seconds
    #[arg(long, env = "IDENTITY_TIMEOUT", default_value_t = 172_800)]
    identity_ttl_secs: u64,

    /// Base URL of the privacy manager
    #[arg(long, env = "BLACKBOX_HOST", default_value = "http://localhost:9081")]
    blackbox_host: String,

    /// Maximum biometric distance accepted as a match
    #[arg(long, env = "MATCH_THRESHOLD", default_value_t = 0.6)]
    match_threshold: f64,

    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Timeout for every outbound request, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<ReaderConfig> {
        ensure!(
            self.match_threshold.is_finite() && self.match_threshold >= 0.0,
            "match threshold must be a non-negative number"
        );
        Ok(ReaderConfig {
            web3_host: self.web3_host,
            schema: ContractSchema::from_name(&self.contract_schema),
            account_address: self.account_address,
            start_block: self.start_block,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            identity_ttl: Duration::from_secs(self.identity_ttl_secs),
            blackbox_host: self.blackbox_host,
            match_threshold: self.match_threshold,
            listen_addr: self.listen,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        })
    }
}

fn init_tracing(log_level: &str) {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = cli.into_config()?;
    psc_reader::run(config).await
}
