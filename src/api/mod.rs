use crate::controller::ProcessController;
use axum::Router;
use axum::routing::get;

pub mod handlers;
pub mod responses;

pub fn router(controller: ProcessController) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/health", get(handlers::get_health))
        .with_state(controller)
}
