//! Cache-flush notifications.
//!
//! Every successful path purge appends a notification here so that external
//! observers (audit logs, other cache layers) can react to it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const DEFAULT_LOG_LIMIT: usize = 1024;

/// Monotonic sequence number for ordering notifications within this process.
pub type Sequence = u64;

/// Emitted after a path purge succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushNotification {
    /// Unique identifier for idempotent handling by observers.
    pub id: Uuid,
    pub sequence: Sequence,
    /// The URL the purge was requested for, as supplied by the caller.
    pub url: String,
    pub timestamp: OffsetDateTime,
}

/// Bounded in-memory log of flush notifications.
///
/// When full, the oldest notification is dropped.
pub struct NotificationLog {
    entries: Mutex<VecDeque<FlushNotification>>,
    sequence: AtomicU64,
    limit: usize,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LOG_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
            limit: limit.max(1),
        }
    }

    /// Record that `url` was flushed.
    pub fn publish(&self, url: &str) -> FlushNotification {
        let notification = FlushNotification {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            url: url.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };

        info!(
            notification_id = %notification.id,
            sequence = notification.sequence,
            url = %notification.url,
            "Cache flushed"
        );

        let mut entries = mutex_lock(&self.entries, SOURCE, "publish");
        if entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(notification.clone());
        notification
    }

    /// Remove and return up to `limit` notifications, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<FlushNotification> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "drain");
        let count = limit.min(entries.len());
        entries.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_drain_in_order() {
        let log = NotificationLog::new();

        log.publish("https://example.com/");
        log.publish("https://example.com/posts/5");
        assert_eq!(log.len(), 2);

        let drained = log.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].url, "https://example.com/");
        assert_eq!(drained[1].url, "https://example.com/posts/5");
        assert!(drained[0].sequence < drained[1].sequence);
        assert!(log.is_empty());
    }

    #[test]
    fn bounded_log_drops_oldest() {
        let log = NotificationLog::with_limit(2);

        log.publish("/a");
        log.publish("/b");
        log.publish("/c");

        let urls: Vec<_> = log.drain(10).into_iter().map(|n| n.url).collect();
        assert_eq!(urls, vec!["/b", "/c"]);
    }

    #[test]
    fn notifications_have_unique_ids() {
        let log = NotificationLog::new();
        let first = log.publish("/a");
        let second = log.publish("/a");
        assert_ne!(first.id, second.id);
    }
}
