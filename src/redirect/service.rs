//! Resolving a short link for one visitor

use std::sync::Arc;
use tracing::debug;

use crate::analytics::{current_minute, EventRecorder, RecordReport};
use crate::errors::{ServiceError, ServiceResult};
use crate::models::VisitorSnapshot;
use crate::rules::{resolve, validate_link_id};
use crate::storage::Storage;

/// Destination chosen for a visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRedirect {
    pub url: String,
    pub link_uid: String,
    pub rule_index: usize,
}

pub struct RedirectService {
    storage: Arc<dyn Storage>,
    recorder: EventRecorder,
}

impl RedirectService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            recorder: EventRecorder::new(Arc::clone(&storage)),
            storage,
        }
    }

    /// Pick the destination without recording anything
    pub async fn resolve(
        &self,
        id: &str,
        snapshot: &VisitorSnapshot,
    ) -> ServiceResult<ResolvedRedirect> {
        let id = validate_link_id(id).map_err(|_| ServiceError::NotFound(id.to_string()))?;
        let link = self
            .storage
            .get_link(&id)
            .await?
            .filter(|link| !link.deleted)
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;

        let resolution = resolve(&link.rules, snapshot);
        debug!("Link {} resolved to rule {}", id, resolution.rule_index);

        Ok(ResolvedRedirect {
            url: resolution.url.to_string(),
            rule_index: resolution.rule_index,
            link_uid: link.uid,
        })
    }

    /// Record a resolved redirect. Failures are logged and counted, never
    /// returned.
    pub async fn record(
        &self,
        resolved: &ResolvedRedirect,
        snapshot: &VisitorSnapshot,
        minute: i64,
    ) -> RecordReport {
        self.recorder
            .record(&resolved.link_uid, resolved.rule_index, snapshot, minute)
            .await
    }

    /// Resolve and record in one call, returning the destination URL
    pub async fn resolve_redirect(
        &self,
        id: &str,
        snapshot: &VisitorSnapshot,
    ) -> ServiceResult<String> {
        let resolved = self.resolve(id, snapshot).await?;
        self.record(&resolved, snapshot, current_minute()).await;
        Ok(resolved.url)
    }
}
