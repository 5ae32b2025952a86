use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::security::rate_limit::RateLimiter;
use crate::state::AppState;

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let ip = client_ip(peer, req.headers(), &state.rate_limiter);
    let key = format!("{}:{}", ip, req.uri().path());
    if !state.rate_limiter.check(&key) {
        warn!(%key, "rate limited");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

/// The socket peer, unless it is a trusted proxy: then the nearest
/// `X-Forwarded-For` hop that is not itself a trusted proxy.
fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap, limiter: &RateLimiter) -> String {
    let Some(peer) = peer else {
        return "unknown".into();
    };
    if !limiter.trusts(&peer) {
        return peer.to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| {
            s.rsplit(',')
                .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
                .find(|hop| !limiter.trusts(hop))
        })
        .unwrap_or(peer)
        .to_string()
}
