//! # Warden
//!
//! A user-space service supervisor: a long-running coordinator that manages
//! a set of named services, drives each through its lifecycle honoring
//! declared dependencies and conflicts, continuously verifies health,
//! restarts faulty services under a rate limit, and exposes state and
//! control through a long-polling HTTP API as well as in-process embedding.
//!
//! ## Quick start
//!
//! ```no_run
//! use warden::{Manager, Process, Service};
//!
//! # async fn example() -> warden::Result<()> {
//! let manager = Manager::new("demo");
//! manager.start_monitoring().await;
//!
//! let redis = Service::new(Box::new(Process::new(
//!     "redis",
//!     vec!["redis-server".into()],
//! )));
//! let handle = manager.add_service(redis).await;
//! handle.enable().await?;
//!
//! // Tear everything down when done.
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Model
//!
//! - A [`Service`] wraps a [`Provider`] (anything with start/stop/check);
//!   the shipped provider is [`Process`], configured directly or from JSON
//!   manifests.
//! - A [`Manager`] owns registered services and their dependency/conflict
//!   graph. Enabling a service starts it once its dependencies run, and
//!   starts dependents that were waiting on it; disabling stops dependents
//!   first. A background monitor health-checks enabled services every 587 ms
//!   and self-heals the ones marked `restart`, subject to a per-service
//!   start rate limit.
//! - Every state change bumps a monotonic serial used for HTTP ETags and
//!   long-poll wake-ups; see [`crate::server`] for the wire surface.

pub mod api;
pub mod client;
pub mod error;
pub mod log;
pub mod manager;
pub mod name;
pub mod process;
pub mod provider;
pub mod rate;
pub mod server;
pub mod service;
pub mod tui;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use log::{FanoutLogger, LogRecord, LogSink, RingLog};
pub use manager::{base_dir, Manager, ManagerInfo, ServiceRef, MONITOR_INTERVAL};
pub use process::{load_manifest_dir, load_manifest_file, Process, ProcessManifest};
pub use provider::{NotifyHandle, PropertyName, PropertyValue, Provider};
pub use service::{Service, ServiceInfo, ServiceState};

/// Default address the daemon listens on and clients connect to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8641";
