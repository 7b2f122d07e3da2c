use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::commitment;
use crate::config::Config;
use crate::error::AppError;
use crate::scheduler;
use crate::storage::Storage;
use crate::submission::{self, SubmitRequest};
use crate::vault::Vault;
use crate::{chat, verify};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub storage: Arc<Storage>,
    pub vault: Vault,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Admin auth
// ---------------------------------------------------------------------------

fn require_admin(headers: &HeaderMap, config: &Config) -> Result<(), AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;
    if !config.is_admin_token_valid(token) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "obelysk-core",
    }))
}

/// Diagnostic identity generator (§6): real clients derive this entirely
/// client-side. This endpoint exists purely as a convenience for manual
/// testing and never persists anything.
pub async fn identity() -> impl IntoResponse {
    use rand::RngCore;
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let identity_secret = hex::encode(secret);
    let (nullifier, commitment) = commitment::derive(&identity_secret);
    Json(json!({
        "identity_secret": identity_secret,
        "nullifier": nullifier,
        "commitment": commitment,
    }))
}

// ---------------------------------------------------------------------------
// Auth / submission
// ---------------------------------------------------------------------------

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let resp = submission::submit(&state.storage, &state.vault, &state.config, req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn read_submission(
    State(state): State<Arc<AppState>>,
    Path(msg_id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let resp = submission::read(&state.storage, &state.vault, msg_id).await?;
    Ok(Json(resp))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

pub async fn chat_send(
    State(state): State<Arc<AppState>>,
    Json(req): Json<chat::SendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let resp = chat::send(&state.storage, &state.vault, &state.config, req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn chat_inbox(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    Json(chat::inbox(&state.storage, &user_id).await)
}

// ---------------------------------------------------------------------------
// Public-key registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterKeyRequest {
    pub user_id: String,
    pub public_key: String,
}

pub async fn register_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.user_id.is_empty() || req.public_key.is_empty() {
        return Err(AppError::BadRequest(
            "user_id and public_key are both required".into(),
        ));
    }
    state
        .storage
        .register_public_key(req.user_id, req.public_key)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(StatusCode::CREATED)
}

pub async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let pem = state
        .storage
        .get_public_key(&user_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("no public key registered for {user_id}")))?;
    Ok(Json(json!({ "user_id": user_id, "public_key": pem })))
}

pub async fn server_pubkey(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let pem = state
        .vault
        .public_key_pem()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(json!({ "public_key": pem })))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

pub async fn verify_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(verify::root(&state.storage).await)
}

pub async fn verify_hash(
    State(state): State<Arc<AppState>>,
    Json(req): Json<verify::HashCheckRequest>,
) -> impl IntoResponse {
    Json(verify::check_hash(&state.storage, req).await)
}

pub async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let resp = verify::inclusion_proof(&state.storage, &id).await?;
    Ok(Json(resp))
}

pub async fn verify_signature(
    State(state): State<Arc<AppState>>,
    Json(req): Json<verify::SignatureCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let resp = verify::check_signature(&state.storage, &state.vault, req).await?;
    Ok(Json(resp))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AdminStatus {
    pub submissions: usize,
    pub chat_messages: usize,
    pub commitments: usize,
    pub pow_difficulty: usize,
    pub key_expiry_minutes: i64,
    pub sweep_interval_secs: u64,
}

pub async fn admin_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&headers, &state.config)?;
    Ok(Json(AdminStatus {
        submissions: state.storage.submission_count().await,
        chat_messages: state.storage.chat_count().await,
        commitments: state.storage.commitment_count().await,
        pow_difficulty: state.config.pow_difficulty,
        key_expiry_minutes: state.config.key_expiry_minutes,
        sweep_interval_secs: state.config.sweep_interval_secs,
    }))
}

pub async fn admin_expire(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&headers, &state.config)?;
    let (submissions_cleared, chat_cleared) = scheduler::sweep_once(&state.storage).await;
    Ok(Json(json!({
        "submissions_cleared": submissions_cleared,
        "chat_cleared": chat_cleared,
    })))
}
