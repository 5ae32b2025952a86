use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::domain::role::ADMIN;
use crate::error::ApiError;
use crate::security::{guard, jwt::Claims};
use crate::state::AppState;

/// Rejects requests without a valid bearer token and hands the claims to the handler.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = guard::authenticate(&state.jwt, req.headers())?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Extractor for handlers that mix public and admin methods on one path.
pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = guard::authenticate(&state.jwt, &parts.headers)?;
        guard::authorize(&claims, ADMIN)?;
        Ok(AdminUser(claims))
    }
}

/// Claims when a valid token is present, `None` for anonymous callers.
pub struct MaybeUser(pub Option<Claims>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|c| c.has_role(ADMIN))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(guard::optional_claims(&state.jwt, &parts.headers)))
    }
}
