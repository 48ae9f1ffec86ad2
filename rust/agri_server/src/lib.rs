//! HTTP front for the crop recommendation and plant disease models.

pub mod error;
pub mod inference;
pub mod routes;
pub mod state;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use common::http::{CROP_PREDICT_PATH, DISEASE_PREDICT_PATH, DOCS_PATH, HEALTH_PATH, INFO_PATH};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::{AppState, ModelPaths, SharedState};

pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route(HEALTH_PATH, get(routes::health))
        .route(DOCS_PATH, get(routes::docs))
        .route(INFO_PATH, get(routes::info))
        .route(CROP_PREDICT_PATH, post(routes::predict_crop))
        .route(DISEASE_PREDICT_PATH, post(routes::predict_disease))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
