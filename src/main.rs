mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;
mod store;

use std::sync::Arc;

use crate::{
    auth::TokenKeys,
    config::{Config, StoreConfig},
    models::AppState,
    store::{MemoryStore, PgStore, Store},
};

use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::{HeaderValue, Method, header};
use tracing_subscriber::EnvFilter;

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let store: Arc<dyn Store> = match &cfg.store {
        StoreConfig::Postgres {
            url,
            max_connections,
        } => Arc::new(PgStore::new(db::connect_pg(url, *max_connections).await?)),
        StoreConfig::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState {
        store,
        tokens: TokenKeys::new(&cfg.jwt_secret, cfg.session_ttl_hours),
    };

    let app = routes::router(state)
        .layer(cors_layer(&cfg.cors_allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
