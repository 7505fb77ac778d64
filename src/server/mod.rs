//! HTTP server exposing the query interface

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::query::Dashboard;

/// Shared application state.
///
/// The dashboard's dataset is never mutated after load, so handlers share it
/// without locking.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

/// Dashboard HTTP server
pub struct DashServer {
    config: ServerConfig,
    state: AppState,
}

impl DashServer {
    pub fn new(config: ServerConfig, dashboard: Dashboard) -> Self {
        Self {
            config,
            state: AppState {
                dashboard: Arc::new(dashboard),
            },
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        router(self.state.clone())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Start the server
    pub async fn start(self) -> crate::Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .with_context(|| format!("Invalid address: {}", self.address()))?;

        let router = self.build_router();

        tracing::info!("Starting dashboard server on http://{}", addr);
        tracing::info!("Routes: /health, /api/commodities, /api/metrics, /api/query, /api/map");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        axum::serve(listener, router).await.context("Server error")?;

        Ok(())
    }
}

/// Router over the given state, with tracing and permissive CORS
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
