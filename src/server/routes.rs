//! API routes

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::data::Metric;
use crate::geojson::map_to_geojson;
use crate::query::{QueryResponse, Selection};
use crate::server::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/commodities", get(list_commodities))
        .route("/metrics", get(list_metrics))
        .route("/query", get(query))
        .route("/map", get(map))
}

/// Distinct commodities for the selection control
async fn list_commodities(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dashboard.commodities())
}

/// Metric columns for the axis controls
async fn list_metrics(State(state): State<AppState>) -> Json<Vec<Metric>> {
    Json(state.dashboard.metrics().to_vec())
}

/// `?commodity=Onion&x=modal_price&y=arrivals_in_qtl`
async fn query(State(state): State<AppState>, Query(selection): Query<Selection>) -> Json<QueryResponse> {
    Json(state.dashboard.handle_selection(&selection))
}

/// Same parameters as `/query`, answered as a GeoJSON FeatureCollection
async fn map(State(state): State<AppState>, Query(selection): Query<Selection>) -> Json<Value> {
    let response = state.dashboard.handle_selection(&selection);
    Json(map_to_geojson(state.dashboard.dataset(), &response.map))
}
