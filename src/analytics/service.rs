//! Owner-facing analytics queries: time series and value counts

use std::sync::Arc;
use tracing::debug;

use crate::analytics::buckets::group;
use crate::analytics::models::{
    CountRow, Granularity, QueryOutcome, SeriesPage, SortDirection, Span, ValueCountPage,
};
use crate::analytics::paging::{page_count, page_rows, sort_counts};
use crate::analytics::recorder::current_minute;
use crate::analytics::window_cache::{
    page_window, slice_series, CacheLookup, SeriesMeta, TableMeta, TableShape, WindowedCache,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::models::{ShortLink, Variable};
use crate::rules::{validate_link_id, ValidationError};
use crate::storage::Storage;

pub const DEFAULT_LIMIT: usize = 30;
pub const MAX_LIMIT: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
/// Series starts are accepted within this many minutes of the epoch
pub const MAX_START_MINUTE: i64 = 1 << 40;
pub const MAX_PAGE: usize = 1_000_000;

/// Full series longer than this are served but not cached
const MAX_CACHED_BUCKETS: i64 = 200_000;

#[derive(Debug, Clone, Default)]
pub struct SeriesRequest {
    pub span: Span,
    /// Defaults to `now - span * limit`
    pub start: Option<i64>,
    pub limit: Option<usize>,
    pub selected_rule: Option<usize>,
    pub force_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct ValueCountRequest {
    pub variable: Variable,
    pub selected_rule: Option<usize>,
    pub page: usize,
    pub page_size: usize,
    pub sort: SortDirection,
    pub force_refresh: bool,
}

impl ValueCountRequest {
    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            selected_rule: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortDirection::default(),
            force_refresh: false,
        }
    }
}

pub struct AnalyticsService {
    storage: Arc<dyn Storage>,
    cache: Arc<WindowedCache>,
}

impl AnalyticsService {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<WindowedCache>) -> Self {
        Self { storage, cache }
    }

    /// Load an active link the caller owns
    async fn owned_link(&self, id: &str, caller: &str) -> ServiceResult<ShortLink> {
        let link = self
            .storage
            .get_link(id)
            .await?
            .filter(|link| !link.deleted)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

        if !link.is_owned_by(caller) {
            return Err(ServiceError::Forbidden);
        }
        Ok(link)
    }

    fn check_selected_rule(link: &ShortLink, selected_rule: Option<usize>) -> ServiceResult<()> {
        match selected_rule {
            Some(rule) if rule >= link.rules.len() => Err(ValidationError::InvalidQuery(
                format!("selected rule {rule} does not exist"),
            )
            .into()),
            _ => Ok(()),
        }
    }

    /// Redirect counts for `limit` consecutive buckets of `span` minutes
    pub async fn get_series(
        &self,
        id: &str,
        request: &SeriesRequest,
        caller: &str,
    ) -> ServiceResult<QueryOutcome<SeriesPage>> {
        let id = validate_link_id(id)?;
        let span = request.span;
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        if limit == 0 {
            return Err(ValidationError::InvalidQuery("limit must be positive".to_string()).into());
        }
        if let Some(start) = request.start {
            if !(-MAX_START_MINUTE..=MAX_START_MINUTE).contains(&start) {
                return Err(ValidationError::InvalidQuery(format!(
                    "start must be within {MAX_START_MINUTE} minutes of the epoch"
                ))
                .into());
            }
        }

        let start = span.align(
            request
                .start
                .unwrap_or_else(|| current_minute() - span.minutes() * limit as i64),
        );
        let page = |data_points: Vec<i64>| SeriesPage {
            start,
            span: span.minutes(),
            data_points,
        };

        if !request.force_refresh {
            match self
                .cache
                .lookup_series(&id, caller, span, request.selected_rule, start, limit)
                .await
            {
                CacheLookup::Hit(points) => return Ok(QueryOutcome::cached(page(points))),
                CacheLookup::Forbidden => return Err(ServiceError::Forbidden),
                CacheLookup::Miss => {}
            }
        }

        let link = self.owned_link(&id, caller).await?;
        Self::check_selected_rule(&link, request.selected_rule)?;

        let granularity = Granularity::for_span(span);
        let points = self
            .storage
            .time_series(&link.uid, granularity, request.selected_rule)
            .await?;

        let (Some(&(first, _)), Some(&(last, _))) = (points.first(), points.last()) else {
            return Ok(QueryOutcome::fresh(page(vec![0; limit])));
        };

        let first_minute = span.align(first);
        let last_minute = span.align(last);
        let buckets = (last_minute - first_minute) / span.minutes() + 1;
        if buckets > MAX_CACHED_BUCKETS {
            debug!("Series for {} spans {} buckets, not caching", id, buckets);
            return Ok(QueryOutcome::fresh(page(group(&points, start, span, limit))));
        }

        let full = group(&points, first_minute, span, buckets as usize);
        let meta = SeriesMeta {
            owner: link.owner.clone(),
            uid: link.uid.clone(),
            span: span.minutes(),
            selected_rule: request.selected_rule,
            first_minute,
            last_minute,
        };
        self.cache.store_series(&id, &meta, &full).await;

        Ok(QueryOutcome::fresh(page(slice_series(
            &full,
            first_minute,
            span,
            start,
            limit,
        ))))
    }

    /// One page of per-value redirect counts for `variable`
    pub async fn get_value_counts(
        &self,
        id: &str,
        request: &ValueCountRequest,
        caller: &str,
    ) -> ServiceResult<QueryOutcome<ValueCountPage>> {
        let id = validate_link_id(id)?;
        if request.page_size == 0 || request.page_size > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidQuery(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            ))
            .into());
        }
        if request.page > MAX_PAGE {
            return Err(
                ValidationError::InvalidQuery(format!("page must be at most {MAX_PAGE}")).into(),
            );
        }

        let shape = TableShape {
            variable: request.variable,
            selected_rule: request.selected_rule,
            sort: request.sort,
            page_size: request.page_size,
        };

        if !request.force_refresh {
            match self
                .cache
                .lookup_table(&id, caller, &shape, request.page)
                .await
            {
                CacheLookup::Hit(page) => return Ok(QueryOutcome::cached(page)),
                CacheLookup::Forbidden => return Err(ServiceError::Forbidden),
                CacheLookup::Miss => {}
            }
        }

        let link = self.owned_link(&id, caller).await?;
        Self::check_selected_rule(&link, request.selected_rule)?;

        let counts = self
            .storage
            .value_counts(&link.uid, request.variable, request.selected_rule)
            .await?;
        let sorted = sort_counts(counts, request.sort);
        let pages = page_count(sorted.len(), request.page_size);

        let (first_page, last_page) = page_window(request.page, pages, self.cache.extra_pages());
        let from = first_page
            .saturating_mul(request.page_size)
            .min(sorted.len());
        let to = last_page
            .saturating_add(1)
            .saturating_mul(request.page_size)
            .min(sorted.len());
        let window: Vec<_> = sorted[from..to]
            .iter()
            .map(|(key, count)| CountRow::new(key.clone(), *count))
            .collect();

        let meta = TableMeta {
            owner: link.owner.clone(),
            uid: link.uid.clone(),
            variable: request.variable,
            selected_rule: request.selected_rule,
            sort: request.sort,
            page_size: request.page_size,
            first_page,
            last_page,
            page_count: pages,
        };
        self.cache.store_table(&id, &meta, &window).await;

        Ok(QueryOutcome::fresh(ValueCountPage {
            counts: page_rows(&sorted, request.page, request.page_size),
            page_count: pages,
        }))
    }
}
