use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::domain::user::{ProfileView, UserId};
use crate::error::ApiError;
use crate::middleware::{auth::auth_middleware, rate_limit::rate_limit};
use crate::routes::ApiJson;
use crate::security::jwt::Claims;
use crate::service::accounts::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest,
};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    let protected = Router::new()
        .route("/api/auth/profile", get(profile).put(update_profile))
        .route("/api/auth/change-password", post(change_password))
        .route_layer(from_fn_with_state(state, auth_middleware));

    public.merge(protected)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    message: &'static str,
    user_id: UserId,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user_id = state.accounts.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "registration successful",
            user_id,
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.accounts.login(payload).await?))
}

async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProfileView>, ApiError> {
    Ok(Json(state.accounts.profile(claims.sub).await?))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, ApiError> {
    Ok(Json(state.accounts.update_profile(claims.sub, payload).await?))
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts.change_password(claims.sub, payload).await?;
    Ok(Json(MessageResponse {
        message: "password changed",
    }))
}
