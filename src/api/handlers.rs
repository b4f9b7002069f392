use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::AnalyticsService;
use crate::auth::Identity;
use crate::errors::ServiceError;
use crate::links::LinkManager;
use crate::models::{RuleInput, RuleSet, ShortLink};

pub struct ApiState {
    pub analytics: Arc<AnalyticsService>,
    pub links: Arc<LinkManager>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    pub id: String,
    pub rules: Vec<RuleInput>,
}

#[derive(Deserialize)]
pub struct RedefineLinkRequest {
    pub rules: Vec<RuleInput>,
}

#[derive(Deserialize)]
pub struct RenameLinkRequest {
    pub new_id: String,
}

/// What an owner sees of a link. The uid stays internal.
#[derive(Debug, Serialize)]
pub struct LinkDetails {
    pub id: String,
    pub rules: RuleSet,
    /// Redirects per rule, in rule order
    pub counters: Vec<i64>,
    /// Minute of the first recorded redirect
    pub first_event_minute: Option<i64>,
    pub created_at: i64,
}

impl From<ShortLink> for LinkDetails {
    fn from(link: ShortLink) -> Self {
        Self {
            id: link.id,
            rules: link.rules,
            counters: link.counters,
            first_event_minute: link.first_event_minute,
            created_at: link.created_at,
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK",
        service: "forklink-api",
    })
}

/// Create a link owned by the caller
pub async fn create_link(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkDetails>), ServiceError> {
    let link = state
        .links
        .create(&payload.id, &payload.rules, Some(identity.username.as_str()))
        .await?;
    Ok((StatusCode::CREATED, Json(link.into())))
}

/// Rules, per-rule counters and first redirect of a link
pub async fn get_link(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<Json<LinkDetails>, ServiceError> {
    let link = state.links.get_owned(&code, &identity.username).await?;
    Ok(Json(link.into()))
}

/// Replace the rules of a link
pub async fn redefine_link(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Json(payload): Json<RedefineLinkRequest>,
) -> Result<Json<LinkDetails>, ServiceError> {
    let link = state
        .links
        .redefine(&code, &payload.rules, &identity.username)
        .await?;
    Ok(Json(link.into()))
}

pub async fn rename_link(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Json(payload): Json<RenameLinkRequest>,
) -> Result<Json<LinkDetails>, ServiceError> {
    let link = state
        .links
        .rename(&code, &payload.new_id, &identity.username)
        .await?;
    Ok(Json(link.into()))
}

pub async fn delete_link(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.links.delete(&code, &identity.username).await?;
    Ok(StatusCode::NO_CONTENT)
}
