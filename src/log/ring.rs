use super::LogSink;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// Default ring capacity; overflow discards the oldest records.
pub const MAX_LOG_RECORDS: usize = 1000;

/// One stored log line.
///
/// IDs are monotonic within a ring and seeded from the nanosecond clock, so
/// they do not repeat across daemon restarts and are usable as ETags. They
/// are not unique across different rings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub text: String,
}

struct RingInner {
    records: Vec<Option<LogRecord>>,
    /// Total lines ever written; `count % capacity` is the next slot.
    count: usize,
    id: i64,
}

/// Bounded in-memory log with change notification.
///
/// Writers append newline-delimited text; each line gets a fresh ID and a
/// wall-clock stamp. Readers get an ordered snapshot plus the high-water ID,
/// and can block on [`RingLog::watch`] until the ID advances.
pub struct RingLog {
    inner: Mutex<RingInner>,
    tx: watch::Sender<i64>,
}

impl RingLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_RECORDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let id = nano_seed();
        let (tx, _) = watch::channel(id);
        Self {
            inner: Mutex::new(RingInner {
                records: vec![None; capacity],
                count: 0,
                id,
            }),
            tx,
        }
    }

    /// Appends text, splitting on newlines; empty trailing segments are
    /// dropped so `"a\nb\n"` stores exactly two records.
    pub fn write(&self, text: &str) {
        let trimmed = text.trim_matches('\n');
        if trimmed.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        let capacity = inner.records.len();
        for line in trimmed.split('\n') {
            let idx = inner.count % capacity;
            inner.id += 1;
            inner.records[idx] = Some(LogRecord {
                id: inner.id,
                time: Utc::now(),
                text: line.to_string(),
            });
            inner.count += 1;
        }
        // Publish while the lock is held so a watcher that sees an unchanged
        // ID has genuinely not missed a write.
        self.tx.send_replace(inner.id);
    }

    /// Returns the stored records in order plus the current high-water ID.
    ///
    /// When `last` equals the current ID the log has not changed since that
    /// ID was handed out and no records are copied.
    pub fn records(&self, last: i64) -> (Vec<LogRecord>, i64) {
        let inner = self.inner.lock();
        if inner.id == last {
            return (Vec::new(), last);
        }
        let capacity = inner.records.len();
        let cnt = inner.count.min(capacity);
        let mut recs = Vec::with_capacity(cnt);
        let start = inner.count - cnt;
        for j in 0..cnt {
            if let Some(rec) = &inner.records[(start + j) % capacity] {
                recs.push(rec.clone());
            }
        }
        (recs, inner.id)
    }

    /// The current high-water ID without copying records.
    pub fn head(&self) -> i64 {
        self.inner.lock().id
    }

    /// Discards all records and reseeds the ID from the nanosecond clock so
    /// stale ETags held by clients cannot alias the cleared log.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.count = 0;
        for slot in inner.records.iter_mut() {
            *slot = None;
        }
        inner.id = nano_seed();
        self.tx.send_replace(inner.id);
    }

    /// Blocks until the log ID differs from `last` or `expire` elapses, and
    /// returns the current ID either way.
    pub async fn watch(&self, last: i64, expire: Duration) -> i64 {
        let mut rx = self.tx.subscribe();
        let _ = tokio::time::timeout(expire, rx.wait_for(|id| *id != last)).await;
        self.head()
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for RingLog {
    fn log_line(&self, line: &str) {
        self.write(line);
    }
}

fn nano_seed() -> i64 {
    // Falls back to the millisecond clock far outside the representable
    // nanosecond range (year 2262).
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}
