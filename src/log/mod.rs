//! Supervisor-visible logging: the bounded ring log served over the HTTP API
//! and the fan-out writer that feeds one stream of lines to many sinks.
//!
//! This is deliberately separate from `tracing` diagnostics: ring records are
//! part of the data model (they carry IDs used as ETags), while tracing is
//! operator-facing. A [`TracingSink`] bridges the two so service lines also
//! show up in the daemon's diagnostic output.

mod fanout;
mod ring;

pub use fanout::FanoutLogger;
pub use ring::{LogRecord, RingLog, MAX_LOG_RECORDS};

use std::sync::Arc;

/// A destination for line-delimited log output.
///
/// Sinks are compared by identity (the `Arc` pointer), not by value; adding
/// the same sink to a fan-out twice is a no-op.
pub trait LogSink: Send + Sync {
    fn log_line(&self, line: &str);
}

/// Prepends a fixed prefix to every line before forwarding. Used to tag
/// per-service lines with `[name] ` when they land in a shared log.
pub struct PrefixedSink {
    prefix: String,
    target: Arc<dyn LogSink>,
}

impl PrefixedSink {
    pub fn new(prefix: impl Into<String>, target: Arc<dyn LogSink>) -> Self {
        Self {
            prefix: prefix.into(),
            target,
        }
    }
}

impl LogSink for PrefixedSink {
    fn log_line(&self, line: &str) {
        self.target.log_line(&format!("{}{}", self.prefix, line));
    }
}

/// Forwards lines to `tracing` at info level.
pub struct TracingSink {
    service: String,
}

impl TracingSink {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn log_line(&self, line: &str) {
        tracing::info!(service = %self.service, "{}", line);
    }
}
