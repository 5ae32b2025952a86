use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::domain::content::{CompanyContent, ContentInput};
use crate::error::{ApiError, FieldErrors};
use crate::infra::content::Upserted;
use crate::middleware::auth::AdminUser;
use crate::routes::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/company-content", get(list_content))
        .route(
            "/api/company-content/:key",
            get(get_content).put(put_content).delete(delete_content),
        )
}

async fn list_content(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CompanyContent>>, ApiError> {
    Ok(Json(state.content.list().await?))
}

async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CompanyContent>, ApiError> {
    state
        .content
        .get(&key)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("content"))
}

async fn put_content(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(key): Path<String>,
    ApiJson(input): ApiJson<ContentInput>,
) -> Result<(StatusCode, Json<CompanyContent>), ApiError> {
    let mut fields = FieldErrors::new();
    if input.title.trim().is_empty() {
        fields.insert("title".into(), vec!["is required".into()]);
    }
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    let (content, outcome) = state.content.upsert(&key, input).await?;
    let status = match outcome {
        Upserted::Created => StatusCode::CREATED,
        Upserted::Updated => StatusCode::OK,
    };
    Ok((status, Json(content)))
}

async fn delete_content(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.content.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
