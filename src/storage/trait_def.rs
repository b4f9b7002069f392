use crate::analytics::models::{Granularity, RedirectEvent};
use crate::models::{RuleSet, ShortLink, Variable};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short link id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Get a link by id, deleted or not, with its per-rule counters
    async fn get_link(&self, id: &str) -> Result<Option<ShortLink>>;

    /// Insert a new link. Fails with `Conflict` if the id is taken, even by
    /// a deleted link.
    async fn insert_link(&self, link: &ShortLink) -> StorageResult<()>;

    /// Swap in new rules under a new uid. Also clears the first event and
    /// the deleted flag, and sets the owner. Returns false if no such link.
    async fn replace_rules(
        &self,
        id: &str,
        uid: &str,
        rules: &RuleSet,
        owner: Option<&str>,
    ) -> Result<bool>;

    /// Move an active link to `new_id`, keeping its uid and first event.
    /// The old id stays behind as a deleted link under `tombstone_uid`. A
    /// deleted link at `new_id` with the same owner is replaced; any other
    /// link there fails with `Conflict`. Returns false if `link` is no
    /// longer active under its uid.
    async fn move_link(
        &self,
        link: &ShortLink,
        new_id: &str,
        tombstone_uid: &str,
    ) -> StorageResult<bool>;

    /// Soft delete. Returns false if the link does not exist or is already
    /// deleted.
    async fn soft_delete(&self, id: &str) -> Result<bool>;

    async fn increment_rule_counter(&self, uid: &str, rule_index: usize) -> Result<()>;

    /// Set the first-event minute unless it is already set. Returns true if
    /// this call set it.
    async fn mark_first_event(&self, uid: &str, minute: i64) -> Result<bool>;

    async fn insert_event(&self, event: &RedirectEvent) -> Result<()>;

    /// Increment the minute, hour and day buckets containing `minute`
    async fn increment_time_buckets(&self, uid: &str, rule_index: usize, minute: i64)
        -> Result<()>;

    async fn increment_value_count(
        &self,
        uid: &str,
        variable: Variable,
        value: &str,
        rule_index: usize,
    ) -> Result<()>;

    /// Time-ascending `(bucket_start, count)` pairs at `granularity`, summed
    /// across rules unless `selected_rule` is given
    async fn time_series(
        &self,
        uid: &str,
        granularity: Granularity,
        selected_rule: Option<usize>,
    ) -> Result<Vec<(i64, i64)>>;

    /// Count per observed value of `variable`
    async fn value_counts(
        &self,
        uid: &str,
        variable: Variable,
        selected_rule: Option<usize>,
    ) -> Result<HashMap<String, i64>>;

    /// Raw redirect events for a link uid, oldest first
    async fn events(&self, uid: &str) -> Result<Vec<RedirectEvent>>;
}
