use axum::{extract::Request, middleware::Next, response::Response};

use crate::domain::role::ADMIN;
use crate::error::ApiError;
use crate::security::{guard, jwt::Claims};

/// Runs after `auth_middleware`; lets only tokens carrying the Admin role through.
pub async fn admin_only(req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::Unauthenticated)?;
    guard::authorize(claims, ADMIN)?;
    Ok(next.run(req).await)
}
