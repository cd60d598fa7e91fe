//! Ingestion loop: poll the chain height, then drain blocks `cursor..=height` one
//! transaction at a time, storing every private identity that decodes and validates.
//!
//! Everything inside a cycle is sequential. The cursor only moves once every
//! transaction of a block has been attempted, and cycles never overlap.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::{Block, ChainClient, ChainError};
use crate::classifier::{classify_transaction, Privacy};
use crate::decoder::{DecodeError, DecodeStrategy};
use crate::records::TransactionRecord;
use crate::store::{IdentityFilter, RecordStore};
use crate::validator::{validate, ValidationError};

/// Why a transaction produced no records.
#[derive(Debug, Error)]
pub enum SkipReason {
    /// Transaction detail could not be fetched.
    #[error("could not load transaction: {0}")]
    TxFetch(#[source] ChainError),
    /// The node does not know the transaction.
    #[error("transaction not found")]
    TxMissing,
    /// Ordinary public transaction.
    #[error("public transaction")]
    Public,
    /// Receipt could not be fetched.
    #[error("could not load receipt: {0}")]
    ReceiptFetch(#[source] ChainError),
    /// Contract creation without a receipt or created address.
    #[error("no receipt with a contract address")]
    ReceiptMissing,
    /// The contract did not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The decoded identity failed the schema.
    #[error("invalid identity: {0}")]
    Validation(#[from] ValidationError),
}

/// Per-reason skip counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    /// Transaction fetch failed or transaction unknown.
    pub tx_fetch: u64,
    /// Public transactions.
    pub public: u64,
    /// Receipt fetch failed or carried no contract address.
    pub receipt: u64,
    /// Contract call or decode failed.
    pub decode: u64,
    /// Identity failed validation.
    pub validation: u64,
}

impl SkipCounts {
    fn record(&mut self, reason: &SkipReason) {
        let slot = match reason {
            SkipReason::TxFetch(_) | SkipReason::TxMissing => &mut self.tx_fetch,
            SkipReason::Public => &mut self.public,
            SkipReason::ReceiptFetch(_) | SkipReason::ReceiptMissing => &mut self.receipt,
            SkipReason::Decode(_) => &mut self.decode,
            SkipReason::Validation(_) => &mut self.validation,
        };
        *slot += 1;
    }

    /// Total skipped transactions.
    pub fn total(&self) -> u64 {
        self.tx_fetch + self.public + self.receipt + self.decode + self.validation
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Chain height observed at the start of the cycle.
    pub height: u64,
    /// Blocks whose transactions were all attempted.
    pub blocks_scanned: u64,
    /// Blocks that could not be fetched and were passed over.
    pub blocks_failed: u64,
    /// Identities written (or overwritten).
    pub identities_stored: u64,
    /// Skipped transactions by reason.
    pub skipped: SkipCounts,
    /// Identity or transaction writes that failed.
    pub store_failures: u64,
}

/// Result of ingesting one private transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    /// Contract the identity was read from.
    pub contract: String,
    /// Identity write succeeded.
    pub identity_stored: bool,
    /// Transaction write succeeded.
    pub transaction_stored: bool,
}

/// The scanner context: chain, store, decode strategy and the block cursor.
pub struct BlockScanner {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn RecordStore>,
    strategy: Box<dyn DecodeStrategy>,
    cursor: u64,
    poll_interval: Duration,
}

impl BlockScanner {
    /// Scanner starting at block `start_block`.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn RecordStore>,
        strategy: Box<dyn DecodeStrategy>,
        start_block: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            store,
            strategy,
            cursor: start_block,
            poll_interval,
        }
    }

    /// Next block to process.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Run cycles forever, sleeping `poll_interval` after each one.
    pub async fn run(mut self) {
        info!(
            cursor = self.cursor,
            strategy = self.strategy.name(),
            "starting block scanner"
        );
        loop {
            match self.run_cycle().await {
                Ok(report) => debug!(?report, cursor = self.cursor, "scan cycle finished"),
                Err(err) => error!(%err, cursor = self.cursor, "could not load chain height"),
            }
            sleep(self.poll_interval).await;
        }
    }

    /// One cycle: read the height, then drain `cursor..=height`.
    ///
    /// # Errors
    /// Only if the chain height cannot be read; the cursor does not move in that case.
    #[instrument(skip(self), fields(cursor = self.cursor))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ChainError> {
        self.housekeeping().await;

        let height = self.chain.block_number().await?;
        let mut report = CycleReport {
            height,
            ..CycleReport::default()
        };

        while self.cursor <= height {
            let number = self.cursor;
            match self.chain.block(number).await {
                Ok(Some(block)) => {
                    self.scan_block(&block, &mut report).await;
                    report.blocks_scanned += 1;
                }
                Ok(None) => {
                    error!(block = number, "block not found, passing over it");
                    report.blocks_failed += 1;
                }
                Err(err) => {
                    error!(block = number, %err, "could not load block, passing over it");
                    report.blocks_failed += 1;
                }
            }
            self.cursor = number + 1;
        }

        info!(
            height,
            cursor = self.cursor,
            blocks = report.blocks_scanned,
            identities = report.identities_stored,
            "drained to chain height"
        );
        Ok(report)
    }

    /// Attempt every transaction of `block` in index order.
    async fn scan_block(&self, block: &Block, report: &mut CycleReport) {
        debug!(block = block.number, txs = block.transactions.len(), "scanning block");
        for (index, hash) in block.transactions.iter().enumerate() {
            match self.ingest_transaction(hash).await {
                Ok(done) => {
                    if done.identity_stored {
                        report.identities_stored += 1;
                    }
                    report.store_failures +=
                        u64::from(!done.identity_stored) + u64::from(!done.transaction_stored);
                }
                Err(SkipReason::Public) => report.skipped.record(&SkipReason::Public),
                Err(reason) => {
                    warn!(block = block.number, index, tx = %hash, %reason, "skipping transaction");
                    report.skipped.record(&reason);
                }
            }
        }
        info!(block = block.number, "finished processing block");
    }

    /// Fetch, classify, resolve, decode, validate and store one transaction.
    pub async fn ingest_transaction(&self, hash: &str) -> Result<Ingested, SkipReason> {
        let tx = self
            .chain
            .transaction(hash)
            .await
            .map_err(SkipReason::TxFetch)?
            .ok_or(SkipReason::TxMissing)?;

        if classify_transaction(&tx) == Privacy::Public {
            return Err(SkipReason::Public);
        }
        info!(tx = %tx.hash, v = ?tx.recovery_marker(), "got a private transaction");

        let contract = match &tx.to {
            Some(to) => to.clone(),
            None => self
                .chain
                .transaction_receipt(&tx.hash)
                .await
                .map_err(SkipReason::ReceiptFetch)?
                .and_then(|r| r.contract_address)
                .ok_or(SkipReason::ReceiptMissing)?,
        };

        let mut candidate = self.strategy.decode(self.chain.as_ref(), &contract).await?;
        candidate.stamp_created_at(Utc::now());
        let identity = validate(&candidate, &contract)?;

        let identity_stored = match self.store.upsert_identity(&identity).await {
            Ok(()) => true,
            Err(err) => {
                error!(%contract, tx = %tx.hash, %err, "failed to store identity");
                false
            }
        };

        let record = TransactionRecord::new(tx, contract.clone());
        let transaction_stored = match self.store.upsert_transaction(&record).await {
            Ok(()) => true,
            Err(err) => {
                error!(%contract, tx = %record.id, %err, "failed to store transaction");
                false
            }
        };

        if identity_stored || transaction_stored {
            info!(%contract, tx = %record.id, "stored identity");
        }
        Ok(Ingested {
            contract,
            identity_stored,
            transaction_stored,
        })
    }

    /// Drop expired identities and log how many are live.
    async fn housekeeping(&self) {
        match self.store.purge_expired().await {
            Ok(0) => {}
            Ok(n) => info!(expired = n, "purged expired identities"),
            Err(err) => error!(%err, "failed to purge expired identities"),
        }
        match self.store.count_identities(&IdentityFilter::All).await {
            Ok(count) => info!(count, "identities held in memory"),
            Err(err) => error!(%err, "failed to count identities"),
        }
    }
}
