use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::progress::{CompletionOutcome, ProgressError, TaskState, UserProgress};
use crate::rewards::{RedeemError, Reward};
use crate::session::Session;
use crate::transaction::{HistoryFilter, TransactionRecord};
use crate::transfer::{TransferError, TransferForm};

pub struct AppState {
    pub session: Mutex<Session>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn shared(session: Session) -> SharedState {
        Arc::new(Self {
            session: Mutex::new(session),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub connected: bool,
    pub address: Option<String>,
    pub short: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: f64,
    pub loading: bool,
    pub transfer_in_flight: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStateResponse {
    pub id: String,
    pub state: TaskState,
    pub progress: u8,
}

#[derive(Debug, Deserialize)]
pub struct ProgressUpdate {
    pub progress: u8,
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn transfer_error(e: &TransferError) -> Response {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    error_response(status, e)
}

fn progress_error(e: &ProgressError) -> Response {
    let status = match e {
        ProgressError::NotConnected => StatusCode::UNAUTHORIZED,
        ProgressError::UnknownTask(_) => StatusCode::NOT_FOUND,
        ProgressError::NotStarted(_) | ProgressError::Busy => StatusCode::CONFLICT,
        ProgressError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e)
}

fn redeem_error(e: &RedeemError) -> Response {
    let status = match e {
        RedeemError::NotConnected => StatusCode::UNAUTHORIZED,
        RedeemError::UnknownReward(_) => StatusCode::NOT_FOUND,
        RedeemError::Unavailable | RedeemError::InsufficientBalance => StatusCode::BAD_REQUEST,
        RedeemError::InFlight => StatusCode::CONFLICT,
    };
    error_response(status, e)
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/account", get(get_account))
        .route("/balance", get(get_balance))
        .route("/balance/refresh", post(refresh_balance))
        .route("/transfer", post(submit_transfer))
        .route("/transactions", get(get_transactions))
        .route("/progress", get(get_progress))
        .route("/progress", delete(reset_progress))
        .route("/tasks/:id/start", post(start_task))
        .route("/tasks/:id/progress", post(update_task_progress))
        .route("/tasks/:id/complete", post(complete_task))
        .route("/rewards", get(get_rewards))
        .route("/rewards/:id/redeem", post(redeem_reward))
        .route("/notifications", get(get_notifications))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_api_server(state: SharedState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 API Server running on http://{}", addr);
    axum::serve(listener, router(state)).await
}

async fn get_account(State(state): State<SharedState>) -> Json<AccountResponse> {
    let account = state.session.lock().await.account();
    Json(AccountResponse {
        connected: account.is_some(),
        address: account.map(|a| a.to_string()),
        short: account.map(|a| a.short()),
    })
}

async fn get_balance(State(state): State<SharedState>) -> Json<BalanceResponse> {
    let session = state.session.lock().await;
    Json(BalanceResponse {
        balance: session.balance.balance(),
        loading: session.balance.is_loading(),
        transfer_in_flight: session.transfers.is_in_flight(),
    })
}

async fn refresh_balance(State(state): State<SharedState>) -> Response {
    let mut session = state.session.lock().await;
    match session.refresh_balance().await {
        Ok(balance) => Json(BalanceResponse {
            balance,
            loading: false,
            transfer_in_flight: session.transfers.is_in_flight(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e),
    }
}

/// POST /transfer
/// Request body: { "recipient": "<base58>", "amount": "0.5" }
///
/// The session lock is released while the wallet signs and confirms, so a
/// second request in that window sees the transfer in flight.
async fn submit_transfer(
    State(state): State<SharedState>,
    Json(form): Json<TransferForm>,
) -> Response {
    debug!("API /transfer -> {} ({})", form.recipient, form.amount);

    let (prepared, wallet, commitment) = {
        let mut session = state.session.lock().await;
        session.form = form;
        match session.prepare_transfer() {
            Ok(prepared) => (prepared, session.wallet(), session.transfers.commitment()),
            Err(e) => return transfer_error(&e),
        }
    };

    // Runs to completion even if the client goes away.
    let worker = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let outcome = prepared.execute(&*wallet, commitment).await;
        let mut session = worker.session.lock().await;
        session.finish_transfer(prepared, outcome).await
    });

    match handle.await {
        Ok(Ok(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(Err(e)) => transfer_error(&e),
        Err(e) => {
            error!("Transfer task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Transfer task aborted")
        }
    }
}

async fn get_transactions(
    State(state): State<SharedState>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<TransactionRecord>>, Response> {
    let filter: HistoryFilter = query
        .filter
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(state.session.lock().await.transactions(filter)))
}

async fn get_progress(State(state): State<SharedState>) -> Json<UserProgress> {
    Json(state.session.lock().await.progress.progress().clone())
}

async fn reset_progress(State(state): State<SharedState>) -> Response {
    let mut session = state.session.lock().await;
    match session.reset_progress() {
        Ok(()) => Json(session.progress.progress().clone()).into_response(),
        Err(e) => progress_error(&e),
    }
}

async fn start_task(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let mut session = state.session.lock().await;
    match session.start_task(&id) {
        Ok(task_state) => {
            let progress = session.progress.task(&id).map(|t| t.progress).unwrap_or(0);
            Json(TaskStateResponse {
                id,
                state: task_state,
                progress,
            })
            .into_response()
        }
        Err(e) => progress_error(&e),
    }
}

async fn update_task_progress(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(update): Json<ProgressUpdate>,
) -> Response {
    let mut session = state.session.lock().await;
    match session.update_task_progress(&id, update.progress) {
        Ok(progress) => {
            let task_state = session
                .progress
                .task(&id)
                .map(|t| t.state())
                .unwrap_or(TaskState::NotStarted);
            Json(TaskStateResponse {
                id,
                state: task_state,
                progress,
            })
            .into_response()
        }
        Err(e) => progress_error(&e),
    }
}

/// POST /tasks/:id/complete
///
/// The session is released during the completion delay; other requests go
/// through while a second completion is refused.
async fn complete_task(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let pending = match state.session.lock().await.begin_completion(&id) {
        Ok(Some(pending)) => pending,
        Ok(None) => return Json(CompletionOutcome::AlreadyCompleted).into_response(),
        Err(e) => return progress_error(&e),
    };

    let worker = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        pending.wait().await;
        let mut session = worker.session.lock().await;
        session.finish_completion(pending)
    });

    match handle.await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => progress_error(&e),
        Err(e) => {
            error!("Completion task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Completion task aborted")
        }
    }
}

async fn get_rewards(State(state): State<SharedState>) -> Json<Vec<Reward>> {
    Json(state.session.lock().await.rewards.catalog().to_vec())
}

async fn redeem_reward(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let pending = match state.session.lock().await.begin_redemption(&id) {
        Ok(pending) => pending,
        Err(e) => return redeem_error(&e),
    };

    let worker = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        pending.wait().await;
        let mut session = worker.session.lock().await;
        session.finish_redemption(pending)
    });

    match handle.await {
        Ok(Ok(receipt)) => Json(receipt).into_response(),
        Ok(Err(e)) => redeem_error(&e),
        Err(e) => {
            error!("Redemption task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Redemption task aborted")
        }
    }
}

async fn get_notifications(
    State(state): State<SharedState>,
) -> Json<Vec<crate::notify::Notification>> {
    Json(state.session.lock().await.notes.drain())
}
