//! Partial-hit caching of analytics results
//!
//! Each link has at most one series entry and one value-count entry. Element
//! 0 of an entry is its metadata (shape, owner, uid, valid range) and the
//! rest is payload, so a hit needs one metadata read and one range read.
//! Owners are embedded so a hit can be authorized without the store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::models::{CountRow, SortDirection, Span, ValueCountPage};
use crate::analytics::paging::pad_rows;
use crate::cache::{CacheError, CacheResult, ListCache};
use crate::models::Variable;

/// Result of consulting the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// Entry exists but belongs to someone else
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub owner: Option<String>,
    pub uid: String,
    pub span: i64,
    pub selected_rule: Option<usize>,
    /// Start of the first cached bucket
    pub first_minute: i64,
    /// Start of the last cached bucket
    pub last_minute: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub owner: Option<String>,
    pub uid: String,
    pub variable: Variable,
    pub selected_rule: Option<usize>,
    pub sort: SortDirection,
    pub page_size: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub page_count: usize,
}

/// Shape of a value-count query; a cached table only serves its own shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    pub variable: Variable,
    pub selected_rule: Option<usize>,
    pub sort: SortDirection,
    pub page_size: usize,
}

impl TableMeta {
    fn matches(&self, shape: &TableShape) -> bool {
        self.variable == shape.variable
            && self.selected_rule == shape.selected_rule
            && self.sort == shape.sort
            && self.page_size == shape.page_size
    }
}

fn series_key(id: &str) -> String {
    format!("{id}:series")
}

fn table_key(id: &str) -> String {
    format!("{id}:table")
}

fn is_owner(owner: Option<&str>, caller: &str) -> bool {
    owner == Some(caller)
}

/// Inclusive range of pages to cache around `page`.
///
/// The window holds `page` plus `extra_pages` more, centred on `page`. Near
/// an edge the extra pages all move to the side that has pages.
pub fn page_window(page: usize, page_count: usize, extra_pages: usize) -> (usize, usize) {
    let max_page = page_count.saturating_sub(1).max(page);
    let mut first = page.saturating_sub(extra_pages / 2);
    let mut last = first.saturating_add(extra_pages);
    if last > max_page {
        first = first.saturating_sub(last - max_page);
        last = max_page;
    }
    (first, last)
}

/// Cut `limit` buckets starting at aligned `start` out of a full series whose
/// first bucket starts at `first_minute`. Buckets outside the series are zero.
pub fn slice_series(
    series: &[i64],
    first_minute: i64,
    span: Span,
    start: i64,
    limit: usize,
) -> Vec<i64> {
    let width = span.minutes();
    (0..limit as i64)
        .map(|i| {
            let offset = start
                .saturating_add(i.saturating_mul(width))
                .saturating_sub(first_minute)
                .div_euclid(width);
            usize::try_from(offset)
                .ok()
                .and_then(|o| series.get(o).copied())
                .unwrap_or(0)
        })
        .collect()
}

fn parse_meta<T: for<'de> Deserialize<'de>>(items: &[String]) -> CacheResult<Option<T>> {
    match items.first() {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}

pub struct WindowedCache {
    backend: Option<Arc<dyn ListCache>>,
    extra_pages: usize,
}

impl WindowedCache {
    pub fn new(backend: Option<Arc<dyn ListCache>>, extra_pages: usize) -> Self {
        Self {
            backend,
            extra_pages,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    pub fn extra_pages(&self) -> usize {
        self.extra_pages
    }

    /// Serve `limit` buckets from `start` if a matching series entry covers
    /// any of that range
    pub async fn lookup_series(
        &self,
        id: &str,
        caller: &str,
        span: Span,
        selected_rule: Option<usize>,
        start: i64,
        limit: usize,
    ) -> CacheLookup<Vec<i64>> {
        let Some(backend) = self.backend.as_deref() else {
            return CacheLookup::Miss;
        };

        match Self::read_series(backend, id, caller, span, selected_rule, start, limit).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("Series cache read failed for {}: {}", id, e);
                CacheLookup::Miss
            }
        }
    }

    async fn read_series(
        backend: &dyn ListCache,
        id: &str,
        caller: &str,
        span: Span,
        selected_rule: Option<usize>,
        start: i64,
        limit: usize,
    ) -> CacheResult<CacheLookup<Vec<i64>>> {
        let key = series_key(id);
        let Some(meta) = parse_meta::<SeriesMeta>(&backend.range(&key, 0, 0).await?)? else {
            return Ok(CacheLookup::Miss);
        };

        if !is_owner(meta.owner.as_deref(), caller) {
            return Ok(CacheLookup::Forbidden);
        }
        if meta.span != span.minutes() || meta.selected_rule != selected_rule || limit == 0 {
            return Ok(CacheLookup::Miss);
        }

        let width = span.minutes();
        let end = start.saturating_add((limit as i64 - 1).saturating_mul(width));
        if end < meta.first_minute || start > meta.last_minute {
            return Ok(CacheLookup::Miss);
        }

        let from = start.max(meta.first_minute);
        let to = end.min(meta.last_minute);
        let first_index = 1 + ((from - meta.first_minute) / width) as usize;
        let last_index = 1 + ((to - meta.first_minute) / width) as usize;

        let items = backend.range(&key, first_index, last_index).await?;
        if items.len() != last_index - first_index + 1 {
            return Err(CacheError::Malformed(format!("{key} is shorter than its metadata")));
        }
        let cached = items
            .iter()
            .map(|raw| serde_json::from_str::<i64>(raw))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Series cache hit for {}", id);
        Ok(CacheLookup::Hit(slice_series(&cached, from, span, start, limit)))
    }

    /// Replace the series entry with a full series starting at `meta.first_minute`
    pub async fn store_series(&self, id: &str, meta: &SeriesMeta, series: &[i64]) {
        let Some(backend) = self.backend.as_deref() else {
            return;
        };

        let result: CacheResult<()> = async {
            let mut items = Vec::with_capacity(series.len() + 1);
            items.push(serde_json::to_string(meta)?);
            items.extend(series.iter().map(i64::to_string));
            backend.replace(&series_key(id), items).await
        }
        .await;

        if let Err(e) = result {
            warn!("Series cache write failed for {}: {}", id, e);
        }
    }

    /// Serve `page` if a matching value-count entry holds it
    pub async fn lookup_table(
        &self,
        id: &str,
        caller: &str,
        shape: &TableShape,
        page: usize,
    ) -> CacheLookup<ValueCountPage> {
        let Some(backend) = self.backend.as_deref() else {
            return CacheLookup::Miss;
        };

        match Self::read_table(backend, id, caller, shape, page).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("Value-count cache read failed for {}: {}", id, e);
                CacheLookup::Miss
            }
        }
    }

    async fn read_table(
        backend: &dyn ListCache,
        id: &str,
        caller: &str,
        shape: &TableShape,
        page: usize,
    ) -> CacheResult<CacheLookup<ValueCountPage>> {
        let key = table_key(id);
        let Some(meta) = parse_meta::<TableMeta>(&backend.range(&key, 0, 0).await?)? else {
            return Ok(CacheLookup::Miss);
        };

        if !is_owner(meta.owner.as_deref(), caller) {
            return Ok(CacheLookup::Forbidden);
        }
        if !meta.matches(shape) || page < meta.first_page || page > meta.last_page {
            return Ok(CacheLookup::Miss);
        }

        let start = 1 + (page - meta.first_page) * meta.page_size;
        let stop = start + meta.page_size - 1;
        let rows = backend
            .range(&key, start, stop)
            .await?
            .iter()
            .map(|raw| serde_json::from_str::<CountRow>(raw))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Value-count cache hit for {} page {}", id, page);
        Ok(CacheLookup::Hit(ValueCountPage {
            counts: pad_rows(rows, meta.page_size),
            page_count: meta.page_count,
        }))
    }

    /// Replace the value-count entry. `rows` are the rows of pages
    /// `meta.first_page..=meta.last_page`, unpadded.
    pub async fn store_table(&self, id: &str, meta: &TableMeta, rows: &[CountRow]) {
        let Some(backend) = self.backend.as_deref() else {
            return;
        };

        let result: CacheResult<()> = async {
            let mut items = Vec::with_capacity(rows.len() + 1);
            items.push(serde_json::to_string(meta)?);
            for row in rows {
                items.push(serde_json::to_string(row)?);
            }
            backend.replace(&table_key(id), items).await
        }
        .await;

        if let Err(e) = result {
            warn!("Value-count cache write failed for {}: {}", id, e);
        }
    }

    /// Drop every entry for a link
    pub async fn invalidate(&self, id: &str) {
        let Some(backend) = self.backend.as_deref() else {
            return;
        };

        for key in [series_key(id), table_key(id)] {
            if let Err(e) = backend.delete(&key).await {
                warn!("Failed to invalidate cache entry {}: {}", key, e);
            }
        }
    }
}
