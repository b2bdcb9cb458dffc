use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit", post(handlers::submit))
        .route("/solve", post(handlers::solve))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
