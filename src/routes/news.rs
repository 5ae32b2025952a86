use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::domain::news::{News, NewsId, NewsInput};
use crate::error::{ApiError, FieldErrors};
use crate::middleware::auth::{AdminUser, MaybeUser};
use crate::routes::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/news", get(list_news).post(create_news))
        .route(
            "/api/news/:id",
            get(get_news).put(update_news).delete(delete_news),
        )
}

#[derive(Deserialize)]
struct NewsQuery {
    published: Option<bool>,
}

/// Anonymous callers and non-admins only ever see published articles.
async fn list_news(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Query(query): Query<NewsQuery>,
) -> Result<Json<Vec<News>>, ApiError> {
    let filter = if user.is_admin() {
        query.published
    } else if query.published == Some(false) {
        return Ok(Json(Vec::new()));
    } else {
        Some(true)
    };
    Ok(Json(state.news.list(filter).await?))
}

async fn get_news(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Path(id): Path<NewsId>,
) -> Result<Json<News>, ApiError> {
    match state.news.get(id).await? {
        Some(news) if news.is_published || user.is_admin() => Ok(Json(news)),
        _ => Err(ApiError::NotFound("news")),
    }
}

async fn create_news(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiJson(input): ApiJson<NewsInput>,
) -> Result<(StatusCode, Json<News>), ApiError> {
    validate(&input)?;
    let news = state.news.create(input).await?;
    tracing::info!(news_id = news.id, "news created");
    Ok((StatusCode::CREATED, Json(news)))
}

async fn update_news(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<NewsId>,
    ApiJson(input): ApiJson<NewsInput>,
) -> Result<Json<News>, ApiError> {
    validate(&input)?;
    Ok(Json(state.news.update(id, input).await?))
}

async fn delete_news(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<NewsId>,
) -> Result<StatusCode, ApiError> {
    state.news.delete(id).await?;
    tracing::info!(news_id = id, "news deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn validate(input: &NewsInput) -> Result<(), ApiError> {
    let mut fields = FieldErrors::new();
    if input.title.trim().is_empty() {
        fields.insert("title".into(), vec!["is required".into()]);
    }
    if input.content.trim().is_empty() {
        fields.insert("content".into(), vec!["is required".into()]);
    }
    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(fields))
    }
}
