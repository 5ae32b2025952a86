use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::ApiError;
use crate::security::jwt::{Claims, JwtManager};

/// Validates the bearer token on a request.
pub fn authenticate(jwt: &JwtManager, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = bearer_from_header(headers).ok_or(ApiError::Unauthenticated)?;
    Ok(jwt.verify(token)?)
}

/// Like [`authenticate`], but a missing or bad token just means "anonymous".
pub fn optional_claims(jwt: &JwtManager, headers: &HeaderMap) -> Option<Claims> {
    authenticate(jwt, headers).ok()
}

pub fn authorize(claims: &Claims, required_role: &str) -> Result<(), ApiError> {
    if claims.has_role(required_role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn bearer_from_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
