//! The capability contract between the supervision engine and whatever
//! actually runs a service.
//!
//! A provider can represent anything with a start/stop/check lifecycle; the
//! shipped implementation is [`crate::process::Process`]. Except for the
//! identity getters, the manager never invokes two provider methods
//! concurrently for the same provider, so implementations need no internal
//! locking for lifecycle state.

use crate::error::Result;
use crate::log::LogSink;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback installed by the manager so a provider can report failures it
/// detects asynchronously (for example, a child process exiting). Must not
/// be invoked from within [`Provider::check`].
pub type NotifyHandle = Arc<dyn Fn() + Send + Sync>;

/// Well-known property names.
///
/// The service entity intercepts the first group; the rest are forwarded to
/// the provider. `Name`, `Description`, `Provides`, `Depends` and
/// `Conflicts` become read-only once the service is registered with a
/// manager, because the dependency graph is compiled from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyName {
    Name,
    Description,
    Provides,
    Depends,
    Conflicts,
    Logger,
    Restart,
    RateLimit,
    RatePeriod,
    Notify,
    // Process-provider properties.
    FailOnExit,
    StopTime,
    StopCommand,
    CheckCommand,
}

/// Typed property payloads.
#[derive(Clone)]
pub enum PropertyValue {
    Bool(bool),
    Int(u64),
    Duration(Duration),
    Text(String),
    TextList(Vec<String>),
    Sink(Arc<dyn LogSink>),
    Notify(NotifyHandle),
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "Bool({})", v),
            PropertyValue::Int(v) => write!(f, "Int({})", v),
            PropertyValue::Duration(v) => write!(f, "Duration({:?})", v),
            PropertyValue::Text(v) => write!(f, "Text({:?})", v),
            PropertyValue::TextList(v) => write!(f, "TextList({:?})", v),
            PropertyValue::Sink(_) => write!(f, "Sink(..)"),
            PropertyValue::Notify(_) => write!(f, "Notify(..)"),
        }
    }
}

/// What service providers must implement.
///
/// `start` and `check` report failures; `stop` is not allowed to fail and
/// blocks until the service is down. All three are called serially, under
/// the owning manager's lock: a provider that stalls in any of them stalls
/// every admin operation on that manager, so implementations are expected
/// to complete in bounded time.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The service name, either `base` or `base:variant`.
    fn name(&self) -> &str;

    /// A short description; user interfaces budget about 32 columns for it.
    fn description(&self) -> &str;

    /// Additional names this service satisfies, beyond its own name.
    fn provides(&self) -> Vec<String>;

    /// Names of services that must be running for this one to run.
    fn depends(&self) -> Vec<String>;

    /// Names of services that may not be enabled together with this one.
    fn conflicts(&self) -> Vec<String>;

    /// Starts the service, blocking until it is up or has definitively
    /// failed.
    async fn start(&mut self) -> Result<()>;

    /// Stops the service, blocking until it is down. Never fails.
    async fn stop(&mut self);

    /// Health check. Returns `Ok(())` when the service is healthy.
    async fn check(&mut self) -> Result<()>;

    /// Reads a provider property.
    fn property(&self, name: PropertyName) -> Result<PropertyValue>;

    /// Sets a provider property.
    fn set_property(&mut self, name: PropertyName, value: PropertyValue) -> Result<()>;
}
