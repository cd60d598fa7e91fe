//! Wiring: build the clients, the store and the scanner from a [`ReaderConfig`], then run
//! the scanner next to the HTTP server until ctrl-c.
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{router, AppState};
use crate::chain::{ChainClient, JsonRpcChainClient};
use crate::config::ReaderConfig;
use crate::deletion::DeletionCoordinator;
use crate::gateway::{HttpPrivacyGateway, PrivacyGateway};
use crate::matcher::{BiometricMatcher, EuclideanMatcher};
use crate::scanner::BlockScanner;
use crate::store::{RecordStore, SqliteStore};

/// Run the reader until ctrl-c.
pub async fn run(config: ReaderConfig) -> Result<()> {
    let chain: Arc<dyn ChainClient> = Arc::new(
        JsonRpcChainClient::new(&config.web3_host, config.request_timeout)
            .context("building JSON-RPC client")?,
    );
    let gateway: Arc<dyn PrivacyGateway> = Arc::new(
        HttpPrivacyGateway::new(&config.blackbox_host, config.request_timeout)
            .context("building privacy-manager client")?,
    );
    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteStore::new_in_memory(config.identity_ttl).context("opening record store")?,
    );

    let scanner = BlockScanner::new(
        chain.clone(),
        store.clone(),
        config.schema.strategy(config.account_address.clone()),
        config.start_block,
        config.poll_interval,
    );

    let state = Arc::new(AppState {
        store: store.clone(),
        chain: chain.clone(),
        matcher: BiometricMatcher::new(
            store.clone(),
            Arc::new(EuclideanMatcher::new(config.match_threshold)),
        ),
        deletion: DeletionCoordinator::new(store, gateway),
    });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(
        addr = %config.listen_addr,
        web3 = %config.web3_host,
        schema = ?config.schema,
        start_block = config.start_block,
        "reader listening"
    );

    let scan_task = tokio::spawn(scanner.run());

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    scan_task.abort();
    info!("reader stopped");
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
