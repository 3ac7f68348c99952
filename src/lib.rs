//src/lib.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use crate::config::AppState;
use crate::middleware::auth::auth_guard;

/// Monta o router completo da API.
pub fn app(app_state: AppState) -> Router {
    let adjustment_routes = Router::new()
        .route(
            "/",
            post(handlers::stock_adjustments::create_adjustment)
                .get(handlers::stock_adjustments::list_adjustments),
        )
        .route("/transfers", get(handlers::stock_adjustments::list_transfers))
        .route("/type/{adjustment_type}", get(handlers::stock_adjustments::list_by_type))
        .route(
            "/{id}",
            get(handlers::stock_adjustments::get_adjustment)
                .put(handlers::stock_adjustments::annotate_adjustment)
                .delete(handlers::stock_adjustments::reverse_adjustment),
        );

    let stock_taking_routes = Router::new()
        .route(
            "/",
            post(handlers::stock_taking::submit_stock_taking)
                .get(handlers::stock_taking::list_stock_takings),
        )
        .route("/import", post(handlers::stock_taking::import_stock_taking))
        .route("/{id}", get(handlers::stock_taking::get_stock_taking));

    let cache_routes = Router::new()
        .route(
            "/",
            get(handlers::medicines_cache::list_cache).post(handlers::medicines_cache::create_cache_entry),
        )
        .route("/audit", get(handlers::medicines_cache::audit_cache))
        .route("/products/{product_id}", get(handlers::medicines_cache::get_product_stock))
        .route(
            "/{id}",
            get(handlers::medicines_cache::get_cache_entry).put(handlers::medicines_cache::update_cache_entry),
        )
        .route("/{id}/reconciliation", get(handlers::medicines_cache::reconcile_cache_entry));

    // Tudo abaixo exige Bearer token
    let protected = Router::new()
        .nest("/stock-adjustments", adjustment_routes)
        .nest("/stock-taking", stock_taking_routes)
        .nest("/medicines-cache", cache_routes)
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        .nest("/api", protected)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
