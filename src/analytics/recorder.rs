//! Persists redirect events and bumps the counters queries read from

use std::sync::Arc;
use tracing::warn;

use crate::analytics::models::RedirectEvent;
use crate::models::VisitorSnapshot;
use crate::storage::Storage;

/// Current Unix time in whole minutes
pub fn current_minute() -> i64 {
    chrono::Utc::now().timestamp().div_euclid(60)
}

/// What happened while recording one redirect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordReport {
    /// This redirect was the first one for the link
    pub first_event: bool,
    /// Number of individual writes that failed and were skipped
    pub failed_writes: usize,
}

impl RecordReport {
    fn check(&mut self, uid: &str, what: &str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            warn!("Failed to record {} for link {}: {}", what, uid, e);
            self.failed_writes += 1;
        }
    }
}

/// Writes are independent upserts; one failing does not stop the rest
pub struct EventRecorder {
    storage: Arc<dyn Storage>,
}

impl EventRecorder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn record(
        &self,
        uid: &str,
        rule_index: usize,
        snapshot: &VisitorSnapshot,
        minute: i64,
    ) -> RecordReport {
        let mut report = RecordReport::default();

        let result = self.storage.increment_rule_counter(uid, rule_index).await;
        report.check(uid, "rule counter", result);

        match self.storage.mark_first_event(uid, minute).await {
            Ok(first) => report.first_event = first,
            Err(e) => report.check(uid, "first event", Err(e)),
        }

        let event = RedirectEvent {
            link_uid: uid.to_string(),
            rule_index,
            minute,
            values: snapshot.observed(),
        };
        let result = self.storage.insert_event(&event).await;
        report.check(uid, "event", result);

        let result = self
            .storage
            .increment_time_buckets(uid, rule_index, minute)
            .await;
        report.check(uid, "time buckets", result);

        for (variable, value) in &event.values {
            let result = self
                .storage
                .increment_value_count(uid, *variable, value, rule_index)
                .await;
            report.check(uid, "value count", result);
        }

        report
    }
}
