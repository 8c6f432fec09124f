use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::{failure, found, listed, reply, ApiReply};
use crate::auth::{AuthError, LoginRequest, QuotaCounter, RegisterRequest, Registration, Token, User};
use crate::storage::StorageError;
use crate::AppContext;

pub fn users_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/tokens", get(list_tokens))
        .route("/tokens/:id", get(get_token))
        .route("/rate_limits", get(list_rate_limits))
        .route("/rate_limits/:user_id", get(get_rate_limit))
        .with_state(ctx)
}

// The raw token is only ever visible in this response.
async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<RegisterRequest>,
) -> ApiReply<Registration> {
    match ctx.registrar.register(req).await {
        Ok(registration) => reply(StatusCode::CREATED, registration),
        Err(
            e @ (AuthError::NoSubscription | AuthError::PasswordRequired | AuthError::PasswordMismatch),
        ) => failure(StatusCode::BAD_REQUEST, e),
        Err(AuthError::Storage(e @ StorageError::Conflict(_))) => failure(StatusCode::CONFLICT, e),
        Err(e) => {
            error!("Failed to register user: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn login(State(ctx): State<Arc<AppContext>>, Json(req): Json<LoginRequest>) -> ApiReply<User> {
    match ctx.registrar.login(req).await {
        Ok(user) => reply(StatusCode::OK, user),
        Err(e @ AuthError::InvalidLogin) => {
            warn!("Rejected login");
            failure(StatusCode::UNAUTHORIZED, e)
        }
        Err(e) => {
            error!("Failed to log in: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

// Token keys are never serialized, so these only expose metadata.
async fn list_tokens(State(ctx): State<Arc<AppContext>>) -> ApiReply<Vec<Token>> {
    listed(ctx.credentials.list_tokens().await, "tokens")
}

async fn get_token(State(ctx): State<Arc<AppContext>>, Path(id): Path<Uuid>) -> ApiReply<Token> {
    found(ctx.credentials.get_token(id).await, "Token", id)
}

async fn list_rate_limits(State(ctx): State<Arc<AppContext>>) -> ApiReply<Vec<QuotaCounter>> {
    listed(ctx.credentials.list_counters().await, "rate limits")
}

async fn get_rate_limit(
    State(ctx): State<Arc<AppContext>>,
    Path(user_id): Path<Uuid>,
) -> ApiReply<QuotaCounter> {
    found(ctx.credentials.get_counter(user_id).await, "Rate limit", user_id)
}
