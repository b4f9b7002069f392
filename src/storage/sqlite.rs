use crate::analytics::models::{Granularity, RedirectEvent};
use crate::models::{Rule, RuleSet, ShortLink, Variable};
use crate::rules::revalidate;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: String,
    uid: String,
    rules: String,
    first_event_minute: Option<i64>,
    owner: Option<String>,
    deleted: bool,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    link_uid: String,
    rule_index: i64,
    minute: i64,
    observed: String,
}

fn decode_rules(raw: &str) -> Result<RuleSet> {
    let rules: Vec<Rule> = serde_json::from_str(raw).context("stored rules are not valid JSON")?;
    Ok(revalidate(rules)?)
}

fn rule_filter(selected_rule: Option<usize>) -> Option<i64> {
    selected_rule.map(|r| r as i64)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id TEXT PRIMARY KEY NOT NULL,
                uid TEXT NOT NULL UNIQUE,
                rules TEXT NOT NULL,
                first_event_minute INTEGER,
                owner TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_uid ON links(uid)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rule_counters (
                link_uid TEXT NOT NULL,
                rule_index INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (link_uid, rule_index)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS redirect_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_uid TEXT NOT NULL,
                rule_index INTEGER NOT NULL,
                minute INTEGER NOT NULL,
                observed TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_uid ON redirect_events(link_uid)")
            .execute(self.pool.as_ref())
            .await?;

        // bucket_start is in minutes, aligned to the granularity
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS time_buckets (
                link_uid TEXT NOT NULL,
                granularity TEXT NOT NULL,
                bucket_start INTEGER NOT NULL,
                rule_index INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (link_uid, granularity, bucket_start, rule_index)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS value_counts (
                link_uid TEXT NOT NULL,
                variable TEXT NOT NULL,
                value TEXT NOT NULL,
                rule_index INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (link_uid, variable, value, rule_index)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_link(&self, id: &str) -> Result<Option<ShortLink>> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, uid, rules, first_event_minute, owner, deleted, created_at
            FROM links
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rules = decode_rules(&row.rules).with_context(|| format!("link '{}'", row.id))?;

        let stored: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT rule_index, count
            FROM rule_counters
            WHERE link_uid = ?
            "#,
        )
        .bind(&row.uid)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut counters = vec![0; rules.len()];
        for (index, count) in stored {
            if let Some(slot) = usize::try_from(index).ok().and_then(|i| counters.get_mut(i)) {
                *slot = count;
            }
        }

        Ok(Some(ShortLink {
            id: row.id,
            uid: row.uid,
            rules,
            counters,
            first_event_minute: row.first_event_minute,
            owner: row.owner,
            deleted: row.deleted,
            created_at: row.created_at,
        }))
    }

    async fn insert_link(&self, link: &ShortLink) -> StorageResult<()> {
        let rules = serde_json::to_string(&link.rules).map_err(|e| StorageError::Other(e.into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO links (id, uid, rules, first_event_minute, owner, deleted, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&link.id)
        .bind(&link.uid)
        .bind(rules)
        .bind(link.first_event_minute)
        .bind(link.owner.as_deref())
        .bind(link.deleted)
        .bind(link.created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(())
    }

    async fn replace_rules(
        &self,
        id: &str,
        uid: &str,
        rules: &RuleSet,
        owner: Option<&str>,
    ) -> Result<bool> {
        let rules = serde_json::to_string(rules)?;

        let result = sqlx::query(
            r#"
            UPDATE links
            SET uid = ?, rules = ?, owner = ?, first_event_minute = NULL, deleted = 0
            WHERE id = ?
            "#,
        )
        .bind(uid)
        .bind(rules)
        .bind(owner)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn move_link(
        &self,
        link: &ShortLink,
        new_id: &str,
        tombstone_uid: &str,
    ) -> StorageResult<bool> {
        let rules = serde_json::to_string(&link.rules).map_err(anyhow::Error::from)?;
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        sqlx::query("DELETE FROM links WHERE id = ? AND deleted = 1 AND owner = ?")
            .bind(new_id)
            .bind(link.owner.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

        // re-read inside the transaction, a redirect may have set it since
        let first_event: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT first_event_minute FROM links WHERE id = ? AND uid = ? AND deleted = 0",
        )
        .bind(&link.id)
        .bind(&link.uid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        let Some((first_event_minute,)) = first_event else {
            return Ok(false);
        };

        // the uid must leave the old row before the new row can take it
        sqlx::query(
            r#"
            UPDATE links
            SET uid = ?, deleted = 1, first_event_minute = NULL
            WHERE id = ?
            "#,
        )
        .bind(tombstone_uid)
        .bind(&link.id)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        let moved = sqlx::query(
            r#"
            INSERT INTO links (id, uid, rules, first_event_minute, owner, deleted, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(new_id)
        .bind(&link.uid)
        .bind(rules)
        .bind(first_event_minute)
        .bind(link.owner.as_deref())
        .bind(link.created_at)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        if moved.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(true)
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET deleted = 1
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_rule_counter(&self, uid: &str, rule_index: usize) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_counters (link_uid, rule_index, count)
            VALUES (?, ?, 1)
            ON CONFLICT(link_uid, rule_index) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(uid)
        .bind(rule_index as i64)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn mark_first_event(&self, uid: &str, minute: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE links
            SET first_event_minute = ?
            WHERE uid = ? AND first_event_minute IS NULL
            "#,
        )
        .bind(minute)
        .bind(uid)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_event(&self, event: &RedirectEvent) -> Result<()> {
        let observed = serde_json::to_string(&event.values)?;

        sqlx::query(
            r#"
            INSERT INTO redirect_events (link_uid, rule_index, minute, observed)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&event.link_uid)
        .bind(event.rule_index as i64)
        .bind(event.minute)
        .bind(observed)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn increment_time_buckets(
        &self,
        uid: &str,
        rule_index: usize,
        minute: i64,
    ) -> Result<()> {
        for granularity in Granularity::ALL {
            sqlx::query(
                r#"
                INSERT INTO time_buckets (link_uid, granularity, bucket_start, rule_index, count)
                VALUES (?, ?, ?, ?, 1)
                ON CONFLICT(link_uid, granularity, bucket_start, rule_index)
                DO UPDATE SET count = count + 1
                "#,
            )
            .bind(uid)
            .bind(granularity.as_str())
            .bind(granularity.bucket_start(minute))
            .bind(rule_index as i64)
            .execute(self.pool.as_ref())
            .await?;
        }

        Ok(())
    }

    async fn increment_value_count(
        &self,
        uid: &str,
        variable: Variable,
        value: &str,
        rule_index: usize,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO value_counts (link_uid, variable, value, rule_index, count)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(link_uid, variable, value, rule_index)
            DO UPDATE SET count = count + 1
            "#,
        )
        .bind(uid)
        .bind(variable.as_str())
        .bind(value)
        .bind(rule_index as i64)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn time_series(
        &self,
        uid: &str,
        granularity: Granularity,
        selected_rule: Option<usize>,
    ) -> Result<Vec<(i64, i64)>> {
        let selected_rule = rule_filter(selected_rule);

        let points: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT bucket_start, SUM(count)
            FROM time_buckets
            WHERE link_uid = ? AND granularity = ? AND (? IS NULL OR rule_index = ?)
            GROUP BY bucket_start
            ORDER BY bucket_start ASC
            "#,
        )
        .bind(uid)
        .bind(granularity.as_str())
        .bind(selected_rule)
        .bind(selected_rule)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(points)
    }

    async fn value_counts(
        &self,
        uid: &str,
        variable: Variable,
        selected_rule: Option<usize>,
    ) -> Result<HashMap<String, i64>> {
        let selected_rule = rule_filter(selected_rule);

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT value, SUM(count)
            FROM value_counts
            WHERE link_uid = ? AND variable = ? AND (? IS NULL OR rule_index = ?)
            GROUP BY value
            "#,
        )
        .bind(uid)
        .bind(variable.as_str())
        .bind(selected_rule)
        .bind(selected_rule)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn events(&self, uid: &str) -> Result<Vec<RedirectEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT link_uid, rule_index, minute, observed
            FROM redirect_events
            WHERE link_uid = ?
            ORDER BY id ASC
            "#,
        )
        .bind(uid)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RedirectEvent {
                    link_uid: row.link_uid,
                    rule_index: usize::try_from(row.rule_index)
                        .context("negative rule index in redirect event")?,
                    minute: row.minute,
                    values: serde_json::from_str(&row.observed)
                        .context("stored event values are not valid JSON")?,
                })
            })
            .collect()
    }
}
