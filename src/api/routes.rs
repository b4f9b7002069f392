use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::analytics::AnalyticsService;
use crate::auth::{auth_middleware, AuthService};
use crate::links::LinkManager;

use super::analytics::{get_series, get_value_counts};
use super::handlers::{
    create_link, delete_link, get_link, health_check, redefine_link, rename_link, ApiState,
};

pub fn create_api_router(
    analytics: Arc<AnalyticsService>,
    links: Arc<LinkManager>,
    auth_service: Arc<AuthService>,
) -> Router {
    let state = Arc::new(ApiState { analytics, links });

    let protected_routes = Router::new()
        .route("/api/links", post(create_link))
        .route(
            "/api/links/{code}",
            get(get_link).put(redefine_link).delete(delete_link),
        )
        .route("/api/links/{code}/rename", post(rename_link))
        .route("/api/links/{code}/series", get(get_series))
        .route("/api/links/{code}/values", get(get_value_counts))
        .route_layer(middleware::from_fn(move |headers, req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, headers, req, next)
        }))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
}
