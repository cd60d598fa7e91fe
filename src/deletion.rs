//! Cascading deletion: purge a contract's private payloads at the gateway, then the local
//! records that pointed at them.
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::gateway::{content_key, PrivacyGateway};
use crate::store::{IdentityFilter, RecordStore, StoreError, TransactionFilter};

/// What a deletion actually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    /// Hashes whose payload the gateway confirmed deleted, in processing order.
    pub deleted_transactions: Vec<String>,
    /// Whether the identity record was removed.
    pub identity_removed: bool,
}

/// Coordinates gateway deletes with store removals.
#[derive(Clone)]
pub struct DeletionCoordinator {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn PrivacyGateway>,
}

impl DeletionCoordinator {
    /// Coordinator over `store` and `gateway`.
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn PrivacyGateway>) -> Self {
        Self { store, gateway }
    }

    /// Delete every transaction recorded for `contract`, one at a time.
    ///
    /// A transaction is removed locally only once the gateway answered `204`; failures
    /// are logged and the record is kept (no retry). If at least one delete succeeded the
    /// identity read from `contract` is removed too.
    ///
    /// # Errors
    /// Only if the transaction lookup itself fails.
    pub async fn delete_by_contract(&self, contract: &str) -> Result<DeletionReport, StoreError> {
        let txs = self
            .store
            .find_transactions(&TransactionFilter::ContractAddress(contract.to_string()))
            .await?;

        let mut report = DeletionReport::default();
        for tx in txs {
            let key = match content_key(&tx.tx.input) {
                Ok(key) => key,
                Err(err) => {
                    warn!(tx = %tx.id, %err, "input payload is not hex, cannot derive gateway key");
                    continue;
                }
            };

            if let Err(err) = self.gateway.delete(&key).await {
                warn!(tx = %tx.id, contract, %err, "gateway did not delete private payload");
                continue;
            }

            if let Err(err) = self
                .store
                .remove_transactions(&TransactionFilter::Hash(tx.id.clone()))
                .await
            {
                error!(tx = %tx.id, %err, "payload deleted at gateway but local record remains");
            }
            report.deleted_transactions.push(tx.id);
        }

        if !report.deleted_transactions.is_empty() {
            match self
                .store
                .remove_identities(&IdentityFilter::Id(contract.to_string()))
                .await
            {
                Ok(n) => report.identity_removed = n > 0,
                Err(err) => error!(contract, %err, "failed to remove identity"),
            }
        }

        info!(
            contract,
            deleted = report.deleted_transactions.len(),
            identity_removed = report.identity_removed,
            "deletion finished"
        );
        Ok(report)
    }
}
