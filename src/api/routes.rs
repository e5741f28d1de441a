use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Session
        .route("/session", get(handlers::session_status))
        .route("/session/register", post(handlers::register))
        .route("/session/activate", post(handlers::activate))
        .route("/session/login", post(handlers::login))
        .route("/session/logout", post(handlers::logout))
        .route("/session/me", get(handlers::current_user))
        // Catalog
        .route("/movies", get(handlers::list_movies))
        .route("/movies/:movie_id", get(handlers::get_movie))
        .route("/movies/:movie_id/membership", get(handlers::membership_status))
        // Favorites and watchlist
        .route("/collections/:kind", get(handlers::list_collection))
        .route(
            "/collections/:kind/:movie_id",
            put(handlers::add_to_collection).delete(handlers::remove_from_collection),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
