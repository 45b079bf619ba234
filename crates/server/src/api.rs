//! HTTP surface of the ledger.
//!
//! | Method | Path                | Success                         |
//! |--------|---------------------|---------------------------------|
//! | GET    | `/logs`             | history, most recent first      |
//! | GET    | `/balance/:address` | `{"balance": n}`                |
//! | POST   | `/transfer`         | the newly appended block        |
//! | GET    | `/health`           | readiness state                 |
//!
//! Every route except `/health` answers 503 until [`AppState::mark_ready`]
//! has been called.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tinyledger_chain::{Ledger, LedgerError};
use tinyledger_core::{Block, Transaction};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info};

const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

const HISTORY_FAILED: &str = "Failed reading blockchain history";
const BALANCE_FAILED: &str = "Reading balance failed for address provided";
const TRANSFER_FAILED: &str = "Transfer failed between recipients";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    ledger: Ledger,
    ready: Arc<AtomicBool>,
}

impl AppState {
    /// New state with the readiness gate closed.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the readiness gate.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Conflict(String),
    NotReady,
    /// `message` goes to the client, `detail` only to the log.
    Internal {
        message: &'static str,
        detail: String,
    },
}

impl ApiError {
    fn internal(message: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            message,
            detail: err.to_string(),
        }
    }

    /// Map a failed ledger call; a retryable conflict becomes 409.
    fn from_call(message: &'static str, err: LedgerCallError) -> Self {
        match err {
            LedgerCallError::Ledger(err) if err.is_retryable() => {
                ApiError::Conflict("Chain tail moved, retry the transfer".to_string())
            }
            other => ApiError::internal(message, other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service is not ready".to_string(),
            ),
            ApiError::Internal { message, detail } => {
                error!(error = %detail, "{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };

        (status, Json(MessageResponse { message })).into_response()
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

/// Failure of a ledger call run on the blocking pool.
#[derive(Debug, Error)]
pub enum LedgerCallError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("ledger task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run `f` against the ledger off the async workers; store I/O blocks.
async fn with_ledger<F, T>(state: &AppState, f: F) -> Result<T, LedgerCallError>
where
    F: FnOnce(&Ledger) -> tinyledger_chain::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let ledger = state.ledger.clone();
    Ok(tokio::task::spawn_blocking(move || f(&ledger)).await??)
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /transfer`. Every field is optional so that all missing
/// fields can be reported at once.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<i64>,
}

impl TransferRequest {
    /// Build the transaction, or list every missing field.
    ///
    /// Empty addresses count as missing.
    pub fn into_transaction(self) -> Result<Transaction, ApiError> {
        let from = self.from_address.filter(|s| !s.is_empty());
        let to = self.to_address.filter(|s| !s.is_empty());

        match (from, to, self.amount) {
            (Some(from), Some(to), Some(amount)) => Ok(Transaction::new(from, to, amount)),
            (from, to, amount) => {
                let mut missing = Vec::new();
                if from.is_none() {
                    missing.push("fromAddress");
                }
                if to.is_none() {
                    missing.push("toAddress");
                }
                if amount.is_none() {
                    missing.push("amount");
                }
                Err(ApiError::InvalidInput(format!(
                    "{} is missing",
                    missing.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

// ============================================================================
// Middleware
// ============================================================================

/// Reject everything but `/health` until startup has finished.
async fn readiness_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.is_ready() && req.uri().path() != "/health" {
        return ApiError::NotReady.into_response();
    }
    next.run(req).await
}

/// Request logging middleware. Logs method, path, status and duration.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::OPTIONS, Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

// ============================================================================
// Router
// ============================================================================

/// Build the API router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/logs", get(get_logs))
        .route("/balance", get(missing_address))
        .route("/balance/", get(missing_address))
        .route("/balance/:address", get(get_balance))
        .route("/transfer", post(transfer))
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(state.clone(), readiness_gate))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors_layer())
        .with_state(state)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_logs(State(state): State<AppState>) -> Result<Json<Vec<Block>>, ApiError> {
    let history = with_ledger(&state, |ledger| ledger.history())
        .await
        .map_err(|err| ApiError::from_call(HISTORY_FAILED, err))?;
    Ok(Json(history))
}

async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if address.is_empty() {
        return Err(missing_address_error());
    }

    let balance = with_ledger(&state, move |ledger| ledger.balance_of(&address))
        .await
        .map_err(|err| ApiError::from_call(BALANCE_FAILED, err))?;
    Ok(Json(BalanceResponse { balance }))
}

async fn missing_address() -> ApiError {
    missing_address_error()
}

fn missing_address_error() -> ApiError {
    ApiError::InvalidInput("Address not provided".to_string())
}

async fn transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<Block>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // A body that was never declared as JSON is read as no fields at all.
        Err(JsonRejection::MissingJsonContentType(_)) => TransferRequest::default(),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected transfer body");
            return Err(ApiError::InvalidInput(
                "Invalid transfer request body".to_string(),
            ));
        }
    };
    let tx = request.into_transaction()?;

    let block = with_ledger(&state, move |ledger| ledger.append(tx))
        .await
        .map_err(|err| ApiError::from_call(TRANSFER_FAILED, err))?;

    info!(hash = %block.hash(), prev_hash = %block.prev_hash(), "transfer appended");
    Ok(Json(block))
}

async fn health_check(State(state): State<AppState>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "starting" })),
        )
            .into_response()
    }
}
