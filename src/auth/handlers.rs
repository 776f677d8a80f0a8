use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, UserResponse},
        jwt::AuthUser,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/users/:id", get(get_user))
        .route("/auth/me", get(get_me))
        .route("/auth/health", get(health))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let Json(payload) = payload?;
    let res = state.service.register(payload).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    let res = state.service.login(payload).await?;
    Ok(Json(res))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AuthError> {
    info!(user_id = %id, "fetch user");
    let user = state.service.get_user_by_id(id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserResponse>, AuthError> {
    // A token can outlive its account only if the row was removed out of band.
    let user = state.service.get_user_by_id(claims.sub).await.map_err(|e| match e {
        AuthError::NotFound => AuthError::InvalidToken,
        other => other,
    })?;
    Ok(Json(user))
}

pub async fn health() -> &'static str {
    "Auth service is running"
}
