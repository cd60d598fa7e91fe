//! HTTP query surface.
//!
//! Handler failures are reported as `200 OK` with an `{"err": "..."}` body, which is
//! what existing clients of the reader expect.
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{instrument, warn};

use crate::chain::ChainClient;
use crate::deletion::DeletionCoordinator;
use crate::matcher::{BiometricMatcher, MatchError, MatchResult};
use crate::records::{Identity, TransactionRecord};
use crate::store::{IdentityFilter, RecordStore, StoreError, TransactionFilter};

/// Shared state behind every route.
pub struct AppState {
    /// Identity and transaction records.
    pub store: Arc<dyn RecordStore>,
    /// Ledger client, used to re-check stored transactions.
    pub chain: Arc<dyn ChainClient>,
    /// Biometric lookups.
    pub matcher: BiometricMatcher,
    /// Cascading deletes.
    pub deletion: DeletionCoordinator,
}

/// Error body returned with status 200.
#[derive(Debug)]
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Json(json!({ "err": self.0 })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        Self(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        Self(err.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct IdentitiesBody {
    identities: Vec<Identity>,
}

#[derive(Serialize)]
struct CountBody {
    count: u64,
}

#[derive(Serialize)]
struct MatchBody {
    identity: MatchResult,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsBody {
    transactions: Vec<TransactionRecord>,
    transactions_valid: bool,
}

#[derive(Deserialize)]
struct BiometricsQuery {
    biometrics: Vec<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsQuery {
    contract_address: Option<String>,
}

/// Routes, CORS and request tracing over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::CONTENT_LENGTH, header::ETAG])
        .max_age(Duration::from_secs(600));

    Router::new()
        .route("/identities", get(list_identities))
        .route("/identities/count", get(count_identities))
        .route("/identities/biometrics", post(match_biometrics))
        .route("/transactions", get(list_transactions))
        .route("/transactions/count", get(count_transactions))
        .route("/transactions/:contract_address", delete(delete_transactions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_identities(State(state): State<Arc<AppState>>) -> ApiResult<IdentitiesBody> {
    let identities = state.store.find_identities(&IdentityFilter::All).await?;
    Ok(Json(IdentitiesBody { identities }))
}

async fn count_identities(State(state): State<Arc<AppState>>) -> ApiResult<CountBody> {
    let count = state.store.count_identities(&IdentityFilter::All).await?;
    Ok(Json(CountBody { count }))
}

#[instrument(skip_all)]
async fn match_biometrics(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BiometricsQuery>, JsonRejection>,
) -> ApiResult<MatchBody> {
    let Json(query) = body?;
    let identity = state.matcher.best_match(&query.biometrics).await?;
    Ok(Json(MatchBody { identity }))
}

async fn count_transactions(State(state): State<Arc<AppState>>) -> ApiResult<CountBody> {
    let count = state.store.count_transactions(&TransactionFilter::All).await?;
    Ok(Json(CountBody { count }))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> ApiResult<TransactionsBody> {
    let Query(query) = query?;
    let filter = match query.contract_address {
        Some(address) => TransactionFilter::ContractAddress(address),
        None => TransactionFilter::All,
    };
    let transactions = state.store.find_transactions(&filter).await?;
    let transactions_valid = still_on_chain(state.chain.as_ref(), &transactions).await;
    Ok(Json(TransactionsBody {
        transactions,
        transactions_valid,
    }))
}

#[instrument(skip(state))]
async fn delete_transactions(
    State(state): State<Arc<AppState>>,
    Path(contract_address): Path<String>,
) -> Response {
    match state.deletion.delete_by_contract(&contract_address).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// `true` iff the chain still returns every record with the same hash and input.
async fn still_on_chain(chain: &dyn ChainClient, records: &[TransactionRecord]) -> bool {
    for record in records {
        match chain.transaction(&record.id).await {
            Ok(Some(tx)) if tx.hash == record.id && tx.input == record.tx.input => {}
            Ok(_) => return false,
            Err(err) => {
                warn!(tx = %record.id, %err, "could not re-check stored transaction");
                return false;
            }
        }
    }
    true
}
