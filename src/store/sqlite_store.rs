//! Embedded in-memory SQLite implementation of [`RecordStore`].
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use tokio::task;

use crate::records::{Identity, TransactionRecord};
use crate::store::{IdentityFilter, RecordStore, StoreError, TransactionFilter};

/// Two tables, both holding the record as JSON in `body`:
///   identities(id TEXT PRIMARY KEY, created_at INTEGER /* unix µs */, body TEXT)
///   transactions(hash TEXT PRIMARY KEY, contract_address TEXT, body TEXT)
///
/// Expiry is decided on microsecond timestamps, so an identity may disappear up to 1µs
/// before `created_at + ttl`.
///
/// Upserts keep the row id, so a re-ingested record stays in its original position.
/// The database lives only as long as this store; nothing touches disk.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    ttl_us: i64,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS identities (
        id         TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL,
        body       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS identities_created_at ON identities(created_at);

    CREATE TABLE IF NOT EXISTS transactions (
        hash             TEXT PRIMARY KEY,
        contract_address TEXT NOT NULL,
        body             TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS transactions_contract ON transactions(contract_address);
"#;

impl SqliteStore {
    /// Fresh in-memory store whose identities expire `identity_ttl` after `created_at`.
    pub fn new_in_memory(identity_ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl_us: i64::try_from(identity_ttl.as_micros()).unwrap_or(i64::MAX),
        })
    }

    /// Run `f` against the connection on the blocking pool, one caller at a time.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }

    /// Identities created at or before this instant have expired.
    fn expiry_cutoff(&self) -> i64 {
        Utc::now().timestamp_micros().saturating_sub(self.ttl_us)
    }
}

/// `WHERE` clause and bind values for an identity filter, restricted to live rows.
fn identity_where(filter: &IdentityFilter, cutoff: i64) -> (&'static str, Vec<SqlValue>) {
    match filter {
        IdentityFilter::All => ("created_at > ?1", vec![SqlValue::Integer(cutoff)]),
        IdentityFilter::Id(id) => (
            "created_at > ?1 AND id = ?2",
            vec![SqlValue::Integer(cutoff), SqlValue::Text(id.clone())],
        ),
    }
}

fn transaction_where(filter: &TransactionFilter) -> (&'static str, Vec<SqlValue>) {
    match filter {
        TransactionFilter::All => ("1 = 1", vec![]),
        TransactionFilter::Hash(h) => ("hash = ?1", vec![SqlValue::Text(h.clone())]),
        TransactionFilter::ContractAddress(a) => {
            ("contract_address = ?1", vec![SqlValue::Text(a.clone())])
        }
    }
}

fn query_bodies<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    binds: &[SqlValue],
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(binds.iter()), |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for body in rows {
        out.push(serde_json::from_str(&body?)?);
    }
    Ok(out)
}

fn query_count(conn: &Connection, sql: &str, binds: &[SqlValue]) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(sql, params_from_iter(binds.iter()), |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let body = serde_json::to_string(identity)?;
        let id = identity.id.clone();
        let created_at = identity.created_at.timestamp_micros();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO identities(id, created_at, body) VALUES(?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET created_at = excluded.created_at, body = excluded.body",
                params![id, created_at, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_identities(&self, filter: &IdentityFilter) -> Result<Vec<Identity>, StoreError> {
        let (clause, binds) = identity_where(filter, self.expiry_cutoff());
        let sql = format!("SELECT body FROM identities WHERE {clause} ORDER BY rowid");
        self.with_conn(move |conn| query_bodies(conn, &sql, &binds))
            .await
    }

    async fn count_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        let (clause, binds) = identity_where(filter, self.expiry_cutoff());
        let sql = format!("SELECT COUNT(*) FROM identities WHERE {clause}");
        self.with_conn(move |conn| query_count(conn, &sql, &binds))
            .await
    }

    async fn remove_identities(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        let (clause, binds) = identity_where(filter, self.expiry_cutoff());
        let sql = format!("DELETE FROM identities WHERE {clause}");
        self.with_conn(move |conn| {
            let n = conn.execute(&sql, params_from_iter(binds.iter()))?;
            Ok(n as u64)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let cutoff = self.expiry_cutoff();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM identities WHERE created_at <= ?1",
                params![cutoff],
            )?;
            Ok(n as u64)
        })
        .await
    }

    async fn upsert_transaction(&self, tx: &TransactionRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(tx)?;
        let hash = tx.id.clone();
        let contract = tx.contract_address.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO transactions(hash, contract_address, body) VALUES(?1, ?2, ?3)
                 ON CONFLICT(hash) DO UPDATE SET contract_address = excluded.contract_address, body = excluded.body",
                params![hash, contract, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let (clause, binds) = transaction_where(filter);
        let sql = format!("SELECT body FROM transactions WHERE {clause} ORDER BY rowid");
        self.with_conn(move |conn| query_bodies(conn, &sql, &binds))
            .await
    }

    async fn count_transactions(&self, filter: &TransactionFilter) -> Result<u64, StoreError> {
        let (clause, binds) = transaction_where(filter);
        let sql = format!("SELECT COUNT(*) FROM transactions WHERE {clause}");
        self.with_conn(move |conn| query_count(conn, &sql, &binds))
            .await
    }

    async fn remove_transactions(&self, filter: &TransactionFilter) -> Result<u64, StoreError> {
        let (clause, binds) = transaction_where(filter);
        let sql = format!("DELETE FROM transactions WHERE {clause}");
        self.with_conn(move |conn| {
            let n = conn.execute(&sql, params_from_iter(binds.iter()))?;
            Ok(n as u64)
        })
        .await
    }
}
