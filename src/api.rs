//! Wire types and header names shared by the HTTP server and client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header a client sends (with [`POLL_TIME_HEADER`]) to opt into long
/// polling: the quoted ETag it already holds.
pub const POLL_ETAG_HEADER: &str = "X-Warden-Poll-Etag";
/// Maximum seconds the server may hold the poll open.
pub const POLL_TIME_HEADER: &str = "X-Warden-Poll-Time";

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSummary {
    pub name: String,
    /// Hex-encoded manager serial; quoted, it is the ETag.
    pub serial: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Body for refused or failed requests. `code` matches the HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

/// Body for successful POST operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkReply {
    pub status: String,
}

impl OkReply {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Formats a serial as its quoted-hex ETag form.
pub fn etag_for(serial: i64) -> String {
    format!("\"{:x}\"", serial)
}

/// Parses a quoted-hex ETag back to a serial.
pub fn parse_etag(etag: &str) -> Option<i64> {
    let inner = etag.strip_prefix('"')?.strip_suffix('"')?;
    i64::from_str_radix(inner, 16).ok()
}
