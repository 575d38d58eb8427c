use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/recommendations", recommendation_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Routes under /api/v1/recommendations
fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/child/:child_id", get(handlers::child_recommendations))
        .route("/activity/:child_id", get(handlers::activity_recommendations))
        .route("/children", get(handlers::list_children))
        .route("/available-interests", get(handlers::available_interests))
        .route("/stats", get(handlers::stats))
        .route("/update-interests/:child_id", post(handlers::update_interests))
}
