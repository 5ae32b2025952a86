mod domain;
mod error;
mod infra;
mod middleware;
mod routes;
mod security;
mod service;
mod state;

use std::net::SocketAddr;

use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use infra::{db::connect, seed::seed};
use security::config::{env_parse, SecurityConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SecurityConfig::from_env()?;
    let db = connect().await?;
    let shared_state = state::AppState::new(db, &config)?;
    seed(
        shared_state.users.as_ref(),
        shared_state.roles.as_ref(),
        &shared_state.hasher,
        &config.admin,
    )
    .await
    .context("startup seeding failed")?;

    let app = routes::router(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr =
        env_parse("BIND_ADDR").unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
