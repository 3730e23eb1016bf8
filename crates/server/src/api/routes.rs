use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware as api_middleware, series};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Health and metrics stay reachable without credentials so probes and
    // scrapers keep working when an api key is configured.
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::get_metrics));

    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Series tracking
        .route("/series", post(series::track))
        .route("/series", get(series::list_series))
        .route("/series/{id}", get(series::get_series))
        .route("/series/{id}", delete(series::untrack))
        .route("/series/{id}/refresh", post(series::refresh))
        // Engine operations
        .route("/reconcile", post(series::reconcile_all))
        .route("/store/clear", post(series::clear_store))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_middleware::auth_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes).with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(api_middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
