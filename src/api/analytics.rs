//! Analytics API handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::analytics::service::DEFAULT_PAGE_SIZE;
use crate::analytics::{
    QueryOutcome, SeriesPage, SeriesRequest, SortDirection, Span,
    ValueCountPage, ValueCountRequest,
};
use crate::api::handlers::ApiState;
use crate::auth::Identity;
use crate::errors::ServiceError;
use crate::models::Variable;
use crate::rules::ValidationError;

#[derive(Debug, Deserialize)]
pub struct SeriesQueryParams {
    /// Bucket width: `min`, `hour`, `day` or a number of minutes
    pub span: Option<String>,

    /// First bucket, in Unix minutes
    pub start: Option<i64>,

    /// Number of buckets (default: 30, max: 100)
    pub limit: Option<usize>,

    /// Restrict to one rule; negative means all rules
    pub selected_rule: Option<i64>,

    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ValueQueryParams {
    pub variable: String,

    pub selected_rule: Option<i64>,

    #[serde(default)]
    pub page: usize,

    pub page_size: Option<usize>,

    /// `Increasing` (default) or `Decreasing`
    pub sort: Option<String>,

    #[serde(default)]
    pub refresh: bool,
}

fn selected_rule(raw: Option<i64>) -> Option<usize> {
    raw.and_then(|r| usize::try_from(r).ok())
}

/// Bucketed redirect counts for a link
pub async fn get_series(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Query(params): Query<SeriesQueryParams>,
) -> Result<Json<QueryOutcome<SeriesPage>>, ServiceError> {
    let span = match params.span.as_deref() {
        Some(raw) => raw
            .parse::<Span>()
            .map_err(ValidationError::InvalidQuery)?,
        None => Span::default(),
    };

    let request = SeriesRequest {
        span,
        start: params.start,
        limit: params.limit,
        selected_rule: selected_rule(params.selected_rule),
        force_refresh: params.refresh,
    };

    let outcome = state
        .analytics
        .get_series(&code, &request, &identity.username)
        .await?;
    Ok(Json(outcome))
}

/// Paged per-value redirect counts for one variable of a link
pub async fn get_value_counts(
    State(state): State<Arc<ApiState>>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Query(params): Query<ValueQueryParams>,
) -> Result<Json<QueryOutcome<ValueCountPage>>, ServiceError> {
    let variable = params
        .variable
        .parse::<Variable>()
        .map_err(ValidationError::UnknownVariable)?;
    let sort = match params.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortDirection>()
            .map_err(ValidationError::InvalidQuery)?,
        None => SortDirection::default(),
    };

    let request = ValueCountRequest {
        variable,
        selected_rule: selected_rule(params.selected_rule),
        page: params.page,
        page_size: params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        sort,
        force_refresh: params.refresh,
    };

    let outcome = state
        .analytics
        .get_value_counts(&code, &request, &identity.username)
        .await?;
    Ok(Json(outcome))
}
