use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use crate::domain::role::Role;
use crate::domain::user::UserId;
use crate::error::ApiError;
use crate::middleware::{admin::admin_only, auth::auth_middleware};
use crate::routes::ApiJson;
use crate::state::AppState;

const MAX_ROLE_NAME_LEN: usize = 64;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/roles", post(assign_role))
        .route("/api/admin/roles", get(list_roles).post(create_role))
        .route_layer(from_fn(admin_only))
        .route_layer(from_fn_with_state(state, auth_middleware))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserEntry {
    id: UserId,
    username: String,
    email: String,
    roles: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    last_login: Option<OffsetDateTime>,
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserEntry>>, ApiError> {
    let users = state.users.list_users_with_roles().await?;
    let entries = users
        .into_iter()
        .map(|(user, roles)| UserEntry {
            id: user.id,
            username: user.username,
            email: user.email,
            roles,
            created_at: user.created_at,
            last_login: user.last_login,
        })
        .collect();
    Ok(Json(entries))
}

async fn list_roles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.roles.list_roles().await?))
}

#[derive(Deserialize)]
struct RolePayload {
    name: String,
}

async fn create_role(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RolePayload>,
) -> Result<Json<Role>, ApiError> {
    validate_role_name(&payload.name)?;
    let id = state.roles.ensure_role(&payload.name).await?;
    info!(role = %payload.name, "role ensured");
    Ok(Json(Role {
        id,
        name: payload.name,
    }))
}

#[derive(Deserialize)]
struct AssignPayload {
    role: String,
}

/// Takes effect for tokens issued after the assignment.
async fn assign_role(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    ApiJson(payload): ApiJson<AssignPayload>,
) -> Result<StatusCode, ApiError> {
    validate_role_name(&payload.role)?;
    state.roles.assign_role(user_id, &payload.role).await?;
    info!(user_id = %user_id, role = %payload.role, "role assigned");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_role_name(name: &str) -> Result<(), ApiError> {
    let ok = !name.is_empty()
        && name.chars().count() <= MAX_ROLE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(ApiError::field(
            "name",
            "role names are 1-64 letters, digits, '-' or '_'",
        ))
    }
}
