use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::analytics::GeoIpService;
use crate::config::VisitorConfig;

use super::handlers::{health_check, resolve_link, RedirectState};
use super::service::RedirectService;

pub fn create_redirect_router(
    service: Arc<RedirectService>,
    geoip: GeoIpService,
    visitor_config: VisitorConfig,
) -> Router {
    let state = Arc::new(RedirectState {
        service,
        geoip,
        visitor_config,
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/resolve/{code}", post(resolve_link))
        .with_state(state)
}
