//! The HTTP surface over a [`Manager`].
//!
//! Every GET carries an `ETag` (the resource serial, quoted hex) and a
//! `Last-Modified` stamp, and honors `If-None-Match` / `If-Modified-Since`.
//! A client opts into long polling by sending both `X-Warden-Poll-Etag`
//! (the ETag it holds) and `X-Warden-Poll-Time` (seconds): the handler then
//! blocks on the corresponding watcher before taking its snapshot, so an
//! unchanged resource costs one request per timeout instead of a busy poll.

pub mod auth;

use crate::api::{etag_for, parse_etag, ApiError, ManagerSummary, OkReply, POLL_ETAG_HEADER, POLL_TIME_HEADER};
use crate::error::Error;
use crate::log::RingLog;
use crate::manager::{Manager, ServiceRef};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Builds the API router for a manager.
pub fn router(mgr: Manager) -> Router {
    Router::new()
        .route("/", get(get_manager))
        .route("/services", get(list_services))
        .route("/services/:service", get(get_service))
        .route("/services/:service/enable", post(enable_service))
        .route("/services/:service/disable", post(disable_service))
        .route("/services/:service/clear", post(clear_service))
        .route("/services/:service/restart", post(restart_service))
        .route("/services/:service/log", get(get_service_log))
        .route("/log", get(get_global_log))
        .with_state(mgr)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn not_found() -> ApiError {
    ApiError {
        code: 404,
        message: "Service not found".to_string(),
    }
}

fn refused(e: Error) -> ApiError {
    ApiError {
        code: 400,
        message: e.to_string(),
    }
}

/// Extracts the long-poll opt-in, if the request carries both headers and a
/// well-formed ETag.
fn poll_params(headers: &HeaderMap) -> Option<(i64, Duration)> {
    let etag = headers.get(POLL_ETAG_HEADER)?.to_str().ok()?;
    let serial = parse_etag(etag)?;
    let secs = headers
        .get(POLL_TIME_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    Some((serial, Duration::from_secs(secs)))
}

fn http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Evaluates the conditional-request headers. Returns `Some(304)` when the
/// client's view is current.
fn not_modified(headers: &HeaderMap, etag: &str, ts: DateTime<Utc>) -> Option<Response> {
    if let Some(check) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if check == etag {
            return Some(StatusCode::NOT_MODIFIED.into_response());
        }
    }
    if let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(when) = DateTime::parse_from_rfc2822(since) {
            // HTTP dates have one-second resolution; round our stamp up so
            // an equal timestamp still counts as unmodified.
            if ts < when.with_timezone(&Utc) + chrono::Duration::seconds(1) {
                return Some(StatusCode::NOT_MODIFIED.into_response());
            }
        }
    }
    None
}

fn cached_json<T: serde::Serialize>(
    headers: &HeaderMap,
    etag: String,
    ts: DateTime<Utc>,
    body: &T,
) -> Response {
    if let Some(resp) = not_modified(headers, &etag, ts) {
        return resp;
    }
    (
        [
            (header::ETAG, etag),
            (header::LAST_MODIFIED, http_date(ts)),
        ],
        Json(body),
    )
        .into_response()
}

async fn get_manager(State(mgr): State<Manager>, headers: HeaderMap) -> Response {
    if let Some((old, expire)) = poll_params(&headers) {
        mgr.watch_serial(old, expire).await;
    }
    let info = mgr.info().await;
    let body = ManagerSummary {
        name: info.name,
        serial: format!("{:x}", info.serial),
        created: info.create_time,
        updated: info.update_time,
    };
    cached_json(&headers, etag_for(info.serial), info.update_time, &body)
}

async fn list_services(State(mgr): State<Manager>, headers: HeaderMap) -> Response {
    if let Some((old, expire)) = poll_params(&headers) {
        mgr.watch_services(old, expire).await;
    }
    let (services, list_serial, ts) = mgr.services().await;
    let names: Vec<String> = services.iter().map(|s| s.name().to_string()).collect();
    cached_json(&headers, etag_for(list_serial), ts, &names)
}

async fn find(mgr: &Manager, name: &str) -> Result<ServiceRef, ApiError> {
    mgr.lookup(name).await.ok_or_else(not_found)
}

async fn get_service(
    State(mgr): State<Manager>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let svc = match find(&mgr, &name).await {
        Ok(svc) => svc,
        Err(e) => return e.into_response(),
    };
    if let Some((old, expire)) = poll_params(&headers) {
        svc.watch(old, expire).await;
    }
    match svc.info().await {
        Ok(info) => {
            let etag = info.etag();
            let ts = info.tstamp;
            cached_json(&headers, etag, ts, &info)
        }
        Err(_) => not_found().into_response(),
    }
}

async fn enable_service(State(mgr): State<Manager>, Path(name): Path<String>) -> Response {
    run_op(&mgr, &name, |svc| async move { svc.enable().await }).await
}

async fn disable_service(State(mgr): State<Manager>, Path(name): Path<String>) -> Response {
    run_op(&mgr, &name, |svc| async move { svc.disable().await }).await
}

async fn clear_service(State(mgr): State<Manager>, Path(name): Path<String>) -> Response {
    run_op(&mgr, &name, |svc| async move { svc.clear().await }).await
}

async fn restart_service(State(mgr): State<Manager>, Path(name): Path<String>) -> Response {
    run_op(&mgr, &name, |svc| async move { svc.restart().await }).await
}

async fn run_op<F, Fut>(mgr: &Manager, name: &str, op: F) -> Response
where
    F: FnOnce(ServiceRef) -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<()>>,
{
    let svc = match find(mgr, name).await {
        Ok(svc) => svc,
        Err(e) => return e.into_response(),
    };
    match op(svc).await {
        Ok(()) => Json(OkReply::ok()).into_response(),
        Err(Error::NoManager) => not_found().into_response(),
        Err(e) => refused(e).into_response(),
    }
}

async fn get_service_log(
    State(mgr): State<Manager>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let svc = match find(&mgr, &name).await {
        Ok(svc) => svc,
        Err(e) => return e.into_response(),
    };
    if let Some((old, expire)) = poll_params(&headers) {
        let _ = svc.watch_log(old, expire).await;
    }
    match svc.log_records(0).await {
        Ok((records, id)) => {
            let ts = records.last().map(|r| r.time).unwrap_or_else(Utc::now);
            cached_json(&headers, etag_for(id), ts, &records)
        }
        Err(_) => not_found().into_response(),
    }
}

async fn get_global_log(State(mgr): State<Manager>, headers: HeaderMap) -> Response {
    let log: Arc<RingLog> = mgr.log();
    if let Some((old, expire)) = poll_params(&headers) {
        log.watch(old, expire).await;
    }
    let (records, id) = log.records(0);
    let ts = records.last().map(|r| r.time).unwrap_or_else(Utc::now);
    cached_json(&headers, etag_for(id), ts, &records)
}
