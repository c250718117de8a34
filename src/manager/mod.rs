//! The manager: owns the service set, the global lock, the monitor loop and
//! the versioned change notification that feeds long-polling clients.
//!
//! # Concurrency model
//!
//! One `tokio::sync::Mutex` guards the whole registry. Every public
//! operation acquires it at entry and holds it across the full operation,
//! including recursive graph walks and provider start/stop/check calls:
//! graph traversal must observe a consistent snapshot, and propagation must
//! be atomic with respect to concurrent admin operations. The flip side is
//! documented in the provider contract: a provider that stalls blocks other
//! admin operations on the same manager.
//!
//! Two monotonic serials drive change notification. `serial` bumps on every
//! state change; `list_serial` bumps only when the set of services changes.
//! Both are seeded from the nanosecond clock so a restarted daemon never
//! hands out a serial an old client could still be holding. Each bump is
//! written into a `watch` channel while the lock is held, so a waiter that
//! observes an unchanged value has missed nothing.

mod monitor;
mod registry;

pub use monitor::MONITOR_INTERVAL;

use crate::error::{Error, Result};
use crate::log::{FanoutLogger, LogRecord, LogSink, RingLog};
use crate::provider::{PropertyName, PropertyValue};
use crate::service::{Service, ServiceId, ServiceInfo};
use chrono::{DateTime, Utc};
use registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

/// Snapshot of manager-level metadata.
#[derive(Debug, Clone)]
pub struct ManagerInfo {
    pub name: String,
    pub serial: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

pub(crate) struct Shared {
    name: String,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) serial_tx: watch::Sender<i64>,
    pub(crate) list_tx: watch::Sender<i64>,
    /// The consolidated ring, always one of `fanout`'s sinks.
    pub(crate) log: Arc<RingLog>,
    /// Consolidated stream: every service's tagged lines plus manager
    /// events. Embedders may attach additional sinks.
    pub(crate) fanout: Arc<FanoutLogger>,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    /// Propagates the registry's serials to watchers. Call with the
    /// registry guard still held so wakers always see the post-bump value.
    pub(crate) fn publish(&self, reg: &Registry) {
        self.serial_tx.send_replace(reg.serial);
        self.list_tx.send_replace(reg.list_serial);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A supervisor instance. Cheap to clone; all clones share the same state.
///
/// Must be created inside a tokio runtime: the monitor loop is spawned at
/// construction and lives until the last clone is dropped or
/// [`Manager::shutdown`] is called.
#[derive(Clone)]
pub struct Manager {
    shared: Arc<Shared>,
}

impl Manager {
    pub fn new(name: &str) -> Self {
        let name = if name.is_empty() { "warden" } else { name };
        let reg = Registry::new();
        let (serial_tx, _) = watch::channel(reg.serial);
        let (list_tx, _) = watch::channel(reg.list_serial);
        let log = Arc::new(RingLog::new());
        let fanout = Arc::new(FanoutLogger::new());
        fanout.add_sink(log.clone());
        let shared = Arc::new(Shared {
            name: name.to_string(),
            registry: Mutex::new(reg),
            serial_tx,
            list_tx,
            log,
            fanout,
            cancel: CancellationToken::new(),
        });
        monitor::spawn_monitor(&shared);
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The consolidated log: every service's lines, tagged `[name] `, plus
    /// manager events.
    pub fn log(&self) -> Arc<RingLog> {
        self.shared.log.clone()
    }

    /// Attaches an additional sink to the consolidated stream, for
    /// embedders that want the supervisor's lines in their own logging.
    pub fn add_log_sink(&self, sink: Arc<dyn LogSink>) {
        self.shared.fanout.add_sink(sink);
    }

    /// Detaches a sink added with [`Manager::add_log_sink`].
    pub fn remove_log_sink(&self, sink: &Arc<dyn LogSink>) {
        self.shared.fanout.remove_sink(sink);
    }

    /// Registers a service and returns a handle to it. The manager takes
    /// ownership; a service cannot belong to two managers.
    pub async fn add_service(&self, svc: Service) -> ServiceRef {
        let mut reg = self.shared.registry.lock().await;
        let id = reg.alloc_id();
        let notify = monitor::notify_handle(Arc::downgrade(&self.shared), id);
        let name = svc.name().to_string();
        reg.add(id, svc, &self.shared.fanout, notify);
        self.shared.publish(&reg);
        ServiceRef {
            shared: self.shared.clone(),
            id,
            name,
        }
    }

    /// Unregisters a service. Fails with [`Error::IsEnabled`] while the
    /// service is enabled, and [`Error::NoManager`] if it is already gone.
    pub async fn delete_service(&self, svc: &ServiceRef) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.remove(svc.id, &self.shared.fanout);
        self.shared.publish(&reg);
        result
    }

    /// All registered services in insertion order, with the list serial and
    /// the time of the last list change.
    pub async fn services(&self) -> (Vec<ServiceRef>, i64, DateTime<Utc>) {
        let reg = self.shared.registry.lock().await;
        let refs = reg
            .order
            .iter()
            .filter_map(|&id| {
                reg.services.get(&id).map(|s| ServiceRef {
                    shared: self.shared.clone(),
                    id,
                    name: s.name().to_string(),
                })
            })
            .collect();
        (refs, reg.list_serial, reg.list_stamp)
    }

    /// Services whose name or provides matches `pattern` by the
    /// `base`/`base:variant` rules.
    pub async fn find_services(&self, pattern: &str) -> Vec<ServiceRef> {
        let reg = self.shared.registry.lock().await;
        reg.find_matching(pattern)
            .into_iter()
            .filter_map(|id| {
                reg.services.get(&id).map(|s| ServiceRef {
                    shared: self.shared.clone(),
                    id,
                    name: s.name().to_string(),
                })
            })
            .collect()
    }

    /// The service with exactly this name, if registered.
    pub async fn lookup(&self, name: &str) -> Option<ServiceRef> {
        let reg = self.shared.registry.lock().await;
        reg.find_by_name(name).map(|id| ServiceRef {
            shared: self.shared.clone(),
            id,
            name: name.to_string(),
        })
    }

    pub async fn info(&self) -> ManagerInfo {
        let reg = self.shared.registry.lock().await;
        ManagerInfo {
            name: self.shared.name.clone(),
            serial: reg.serial,
            create_time: reg.create_time,
            update_time: reg.update_time,
        }
    }

    /// Blocks until the global serial differs from `old` or `expire`
    /// elapses; returns the current serial either way.
    pub async fn watch_serial(&self, old: i64, expire: Duration) -> i64 {
        let mut rx = self.shared.serial_tx.subscribe();
        let _ = tokio::time::timeout(expire, rx.wait_for(|v| *v != old)).await;
        *self.shared.serial_tx.borrow()
    }

    /// Like [`Manager::watch_serial`] for the list serial, which only moves
    /// when services are added or removed.
    pub async fn watch_services(&self, old: i64, expire: Duration) -> i64 {
        let mut rx = self.shared.list_tx.subscribe();
        let _ = tokio::time::timeout(expire, rx.wait_for(|v| *v != old)).await;
        *self.shared.list_tx.borrow()
    }

    /// Enables the periodic health-check pass. New managers start with
    /// monitoring off.
    pub async fn start_monitoring(&self) {
        self.shared.registry.lock().await.monitoring = true;
    }

    pub async fn stop_monitoring(&self) {
        self.shared.registry.lock().await.monitoring = false;
    }

    /// Stops monitoring, stops and unregisters every service. Idempotent.
    pub async fn shutdown(&self) {
        let mut reg = self.shared.registry.lock().await;
        reg.shutdown(&self.shared.fanout).await;
        self.shared.publish(&reg);
    }
}

/// Handle to a registered service. All operations go through the owning
/// manager's lock. Handles stay valid after the service is deleted, but
/// every operation then returns [`Error::NoManager`].
#[derive(Clone)]
pub struct ServiceRef {
    shared: Arc<Shared>,
    id: ServiceId,
    name: String,
}

impl ServiceRef {
    /// The service name, captured at registration (names are immutable once
    /// registered).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enables the service and starts it (and anything it newly satisfies)
    /// if its dependencies allow. Idempotent. Fails with
    /// [`Error::Conflict`] when a conflicting service is enabled, or
    /// [`Error::RateLimited`] when the governor denies the start.
    pub async fn enable(&self) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.enable(self.id).await;
        self.shared.publish(&reg);
        result
    }

    /// Disables and stops the service, along with dependents that can no
    /// longer run. Clears any latched fault. Idempotent.
    pub async fn disable(&self) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.disable(self.id).await;
        self.shared.publish(&reg);
        result
    }

    /// Stops then starts the service, clearing any fault. No-op when
    /// disabled.
    pub async fn restart(&self) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.restart(self.id).await;
        self.shared.publish(&reg);
        result
    }

    /// Clears a latched fault and resets the start count, then attempts a
    /// start if the service is enabled and eligible.
    pub async fn clear(&self) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.clear(self.id).await;
        self.shared.publish(&reg);
        result
    }

    /// Runs the provider's health check now. Returns the latched fault if
    /// one is set, [`Error::NotRunning`] if the service is down, or the
    /// fresh check failure (which also latches and stops the service).
    pub async fn check(&self) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = reg.check_service(self.id).await;
        self.shared.publish(&reg);
        result
    }

    pub async fn enabled(&self) -> bool {
        let reg = self.shared.registry.lock().await;
        reg.services.get(&self.id).map_or(false, |s| s.enabled)
    }

    pub async fn running(&self) -> bool {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .map_or(false, |s| s.running && !s.stopping)
    }

    pub async fn failed(&self) -> bool {
        let reg = self.shared.registry.lock().await;
        reg.services.get(&self.id).map_or(false, |s| s.failed)
    }

    /// The most recent status message and when it was recorded.
    pub async fn status(&self) -> Result<(String, DateTime<Utc>)> {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .map(|s| (s.reason.clone(), s.stamp))
            .ok_or(Error::NoManager)
    }

    pub async fn serial(&self) -> Result<i64> {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .map(|s| s.serial)
            .ok_or(Error::NoManager)
    }

    /// Consistent snapshot for the HTTP API.
    pub async fn info(&self) -> Result<ServiceInfo> {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .map(|s| s.info())
            .ok_or(Error::NoManager)
    }

    pub async fn set_property(&self, prop: PropertyName, value: PropertyValue) -> Result<()> {
        let mut reg = self.shared.registry.lock().await;
        let result = match reg.services.get_mut(&self.id) {
            Some(s) => s.set_property(prop, value),
            None => Err(Error::NoManager),
        };
        self.shared.publish(&reg);
        result
    }

    pub async fn property(&self, prop: PropertyName) -> Result<PropertyValue> {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .ok_or(Error::NoManager)?
            .property(prop)
    }

    /// The per-service ring log records plus its high-water ID. `last` as
    /// returned by a previous call suppresses an unchanged copy.
    pub async fn log_records(&self, last: i64) -> Result<(Vec<LogRecord>, i64)> {
        let ring = self.ring().await?;
        Ok(ring.records(last))
    }

    /// Blocks until the per-service log advances past `last` or `expire`
    /// elapses.
    pub async fn watch_log(&self, last: i64, expire: Duration) -> Result<i64> {
        let ring = self.ring().await?;
        Ok(ring.watch(last, expire).await)
    }

    /// Blocks until this service's serial differs from `old` or `expire`
    /// elapses; returns the current serial (or `old` when the service is
    /// gone).
    pub async fn watch(&self, old: i64, expire: Duration) -> i64 {
        let deadline = tokio::time::Instant::now() + expire;
        let mut rx = self.shared.serial_tx.subscribe();
        loop {
            let cur = match self.serial().await {
                Ok(s) => s,
                Err(_) => return old,
            };
            if cur != old {
                return cur;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return cur;
            }
            if tokio::time::timeout(deadline - now, rx.changed())
                .await
                .is_err()
            {
                return self.serial().await.unwrap_or(old);
            }
        }
    }

    async fn ring(&self) -> Result<Arc<RingLog>> {
        let reg = self.shared.registry.lock().await;
        reg.services
            .get(&self.id)
            .map(|s| s.ring.clone())
            .ok_or(Error::NoManager)
    }
}

/// Resolves the daemon's state directory: `$WARDEN_DIR`, else `/var` when
/// running as root, else the home directory, else the current directory.
pub fn base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    #[cfg(unix)]
    if nix::unistd::geteuid().is_root() {
        return PathBuf::from("/var");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
