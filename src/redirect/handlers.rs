use axum::{
    extract::{ConnectInfo, Path, State},
    http::header::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use super::service::RedirectService;
use crate::analytics::geoip::UNKNOWN_COUNTRY;
use crate::analytics::{current_minute, extract_client_ip, GeoIpService};
use crate::config::VisitorConfig;
use crate::errors::ServiceError;
use crate::models::{Variable, VisitorSnapshot};

pub struct RedirectState {
    pub service: Arc<RedirectService>,
    pub geoip: GeoIpService,
    pub visitor_config: VisitorConfig,
}

/// Visitor attributes gathered by the client
#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    /// Keyed by variable display name, e.g. "Screen Width"
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// Query string of the visited short URL
    #[serde(default)]
    pub params: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub url: String,
}

/// Resolve a short link and record the visit in the background
pub async fn resolve_link(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ServiceError> {
    let mut snapshot = VisitorSnapshot::from_raw(body.data, body.params);

    // Country is derived server-side when a GeoIP database is configured
    if state.geoip.is_enabled() {
        let client_ip = extract_client_ip(&headers, addr.ip(), &state.visitor_config);
        snapshot.set(Variable::Country, state.geoip.country(client_ip));
    } else if snapshot.get(Variable::Country).is_none() {
        snapshot.set(Variable::Country, UNKNOWN_COUNTRY);
    }

    let resolved = state.service.resolve(&code, &snapshot).await?;
    let url = resolved.url.clone();

    let service = Arc::clone(&state.service);
    let minute = current_minute();
    tokio::spawn(async move {
        let report = service.record(&resolved, &snapshot, minute).await;
        if report.failed_writes > 0 {
            warn!(
                "Recorded redirect for {} with {} failed writes",
                resolved.link_uid, report.failed_writes
            );
        }
    });

    Ok(Json(ResolveResponse { url }))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
