//! The service entity: per-service state, configuration, graph edges and the
//! property bag.
//!
//! A [`Service`] is constructed from a [`Provider`] and is inert until it is
//! registered with a [`crate::manager::Manager`], which compiles its
//! dependency and conflict edges against the other registered services and
//! takes ownership. From then on every operation goes through the manager's
//! lock; the handle type for that is [`crate::manager::ServiceRef`].

use crate::error::{Error, Result};
use crate::log::{FanoutLogger, LogSink, RingLog};
use crate::name;
use crate::provider::{NotifyHandle, PropertyName, PropertyValue, Provider};
use crate::rate::RateGovernor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Registry key for a service. Keys are never reused within a manager, so a
/// stale handle can never alias a later registration.
pub type ServiceId = u64;

/// Logical state derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not enabled.
    Disabled,
    /// Enabled but not running; waiting on dependencies, rate limits, or a
    /// start attempt.
    DepWait,
    /// Enabled and running.
    Running,
    /// A fault is latched; stays until cleared, disabled or restarted.
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Disabled => write!(f, "disabled"),
            ServiceState::DepWait => write!(f, "waiting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Failed => write!(f, "failed"),
        }
    }
}

/// Wire-format snapshot of one service, served by the HTTP API.
///
/// `serial` is the hex-encoded per-service serial; quoted, it doubles as the
/// resource's ETag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub running: bool,
    pub failed: bool,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub conflicts: Vec<String>,
    pub status: String,
    pub tstamp: DateTime<Utc>,
    pub serial: String,
}

impl ServiceInfo {
    pub fn state(&self) -> ServiceState {
        if self.failed {
            ServiceState::Failed
        } else if !self.enabled {
            ServiceState::Disabled
        } else if self.running {
            ServiceState::Running
        } else {
            ServiceState::DepWait
        }
    }

    pub fn etag(&self) -> String {
        format!("\"{}\"", self.serial)
    }
}

/// The unit of supervision.
pub struct Service {
    pub(crate) provider: Box<dyn Provider>,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) provides: Vec<String>,
    pub(crate) depends: Vec<String>,
    pub(crate) conflicts: Vec<String>,

    // Administrative and runtime state.
    pub(crate) enabled: bool,
    pub(crate) running: bool,
    pub(crate) stopping: bool,
    pub(crate) failed: bool,
    pub(crate) checking: bool,
    pub(crate) restart: bool,
    pub(crate) err: Option<String>,

    // Graph edges, valid only while registered. `parents` keeps one entry
    // per declared dependency name so alternative providers of the same
    // dependency stay distinguishable.
    pub(crate) parents: HashMap<String, HashSet<ServiceId>>,
    pub(crate) children: HashSet<ServiceId>,
    pub(crate) incompat: HashSet<ServiceId>,

    pub(crate) governor: RateGovernor,
    pub(crate) reason: String,
    pub(crate) stamp: DateTime<Utc>,
    pub(crate) serial: i64,
    pub(crate) registered: bool,

    pub(crate) logger: Arc<FanoutLogger>,
    pub(crate) ring: Arc<RingLog>,
    /// Extra sink installed through the Logger property, tracked so a
    /// replacement can detach the previous one.
    user_sink: Option<Arc<dyn LogSink>>,
    /// Application callback fired after a provider-reported failure has been
    /// handled. Not forwarded to the provider.
    pub(crate) notify: Option<NotifyHandle>,
}

impl Service {
    /// Wraps a provider in a service. The provider's identity is captured
    /// here; the service's own ring log is created and handed to the
    /// provider as its logging sink.
    pub fn new(mut provider: Box<dyn Provider>) -> Self {
        let ring = Arc::new(RingLog::new());
        let logger = Arc::new(FanoutLogger::new());
        logger.add_sink(ring.clone());
        // The provider logs through the fan-out, so its output lands in the
        // ring and in any sinks attached later. Providers without logging
        // may refuse; that is fine.
        let _ = provider.set_property(
            PropertyName::Logger,
            PropertyValue::Sink(logger.clone()),
        );

        let name = provider.name().to_string();
        let description = provider.description().to_string();
        let provides = provider.provides();
        let depends = provider.depends();
        let conflicts = provider.conflicts();

        Self {
            provider,
            name,
            description,
            provides,
            depends,
            conflicts,
            enabled: false,
            running: false,
            stopping: false,
            failed: false,
            checking: false,
            restart: false,
            err: None,
            parents: HashMap::new(),
            children: HashSet::new(),
            incompat: HashSet::new(),
            governor: RateGovernor::default(),
            reason: String::new(),
            stamp: Utc::now(),
            serial: 0,
            registered: false,
            logger,
            ring,
            user_sink: None,
            notify: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }

    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// True when `check` matches this service's name or any name it
    /// provides, by the `base`/`base:variant` rules.
    pub fn matches(&self, check: &str) -> bool {
        if name::names_match(check, &self.name) {
            return true;
        }
        self.provides.iter().any(|p| name::names_match(check, p))
    }

    pub(crate) fn log(&self, line: &str) {
        self.logger.write(line);
    }

    pub(crate) fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub(crate) fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            // A service that is mid-stop is reported as not running, so
            // dependents and clients never act on a vanishing parent.
            running: self.running && !self.stopping,
            failed: self.failed,
            provides: self.provides.clone(),
            depends: self.depends.clone(),
            conflicts: self.conflicts.clone(),
            status: self.reason.clone(),
            tstamp: self.stamp,
            serial: format!("{:x}", self.serial),
        }
    }

    /// Sets a property, intercepting the engine-owned names and forwarding
    /// the rest (and a copy of most intercepted ones) to the provider.
    pub fn set_property(&mut self, prop: PropertyName, value: PropertyValue) -> Result<()> {
        if self.registered {
            // The graph is compiled from these at registration time.
            if matches!(
                prop,
                PropertyName::Name
                    | PropertyName::Description
                    | PropertyName::Provides
                    | PropertyName::Depends
                    | PropertyName::Conflicts
            ) {
                return Err(Error::PropReadOnly);
            }
        }
        match (prop, value) {
            (PropertyName::Logger, PropertyValue::Sink(sink)) => {
                if self.enabled {
                    return Err(Error::PropReadOnly);
                }
                if let Some(old) = self.user_sink.take() {
                    self.logger.remove_sink(&old);
                }
                self.logger.add_sink(sink.clone());
                self.user_sink = Some(sink);
            }
            (PropertyName::Restart, PropertyValue::Bool(v)) => self.restart = v,
            (PropertyName::RateLimit, PropertyValue::Int(v)) => {
                self.governor.set_limit(v as usize)
            }
            (PropertyName::RatePeriod, PropertyValue::Duration(v)) => {
                self.governor.set_period(v)
            }
            (PropertyName::Name, PropertyValue::Text(v)) => self.name = v,
            (PropertyName::Description, PropertyValue::Text(v)) => self.description = v,
            (PropertyName::Provides, PropertyValue::TextList(v)) => self.provides = v,
            (PropertyName::Depends, PropertyValue::TextList(v)) => self.depends = v,
            (PropertyName::Conflicts, PropertyValue::TextList(v)) => self.conflicts = v,
            (PropertyName::Notify, PropertyValue::Notify(f)) => {
                // Kept to ourselves: the provider's notify slot belongs to
                // the manager.
                self.notify = Some(f);
                return Ok(());
            }
            (
                PropertyName::Logger
                | PropertyName::Restart
                | PropertyName::RateLimit
                | PropertyName::RatePeriod
                | PropertyName::Name
                | PropertyName::Description
                | PropertyName::Provides
                | PropertyName::Depends
                | PropertyName::Conflicts
                | PropertyName::Notify,
                _,
            ) => return Err(Error::BadPropType),
            (prop, value) => return self.provider.set_property(prop, value),
        }
        Ok(())
    }

    /// Reads a property, answering the engine-owned names directly and
    /// delegating the rest to the provider.
    pub fn property(&self, prop: PropertyName) -> Result<PropertyValue> {
        match prop {
            PropertyName::Restart => Ok(PropertyValue::Bool(self.restart)),
            PropertyName::RateLimit => Ok(PropertyValue::Int(self.governor.limit() as u64)),
            PropertyName::RatePeriod => Ok(PropertyValue::Duration(self.governor.period())),
            PropertyName::Name => Ok(PropertyValue::Text(self.name.clone())),
            PropertyName::Description => Ok(PropertyValue::Text(self.description.clone())),
            PropertyName::Provides => Ok(PropertyValue::TextList(self.provides.clone())),
            PropertyName::Depends => Ok(PropertyValue::TextList(self.depends.clone())),
            PropertyName::Conflicts => Ok(PropertyValue::TextList(self.conflicts.clone())),
            PropertyName::Logger => match &self.user_sink {
                Some(sink) => Ok(PropertyValue::Sink(sink.clone())),
                None => Ok(PropertyValue::Sink(self.logger.clone())),
            },
            PropertyName::Notify => match &self.notify {
                Some(f) => Ok(PropertyValue::Notify(f.clone())),
                None => Err(Error::BadPropValue("no notify callback set".into())),
            },
            _ => self.provider.property(prop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubProvider;
    use std::time::Duration;

    #[test]
    fn matches_own_name_and_provides() {
        let svc = Service::new(Box::new(
            StubProvider::named("smtp:postfix").with_provides(&["mail"]),
        ));
        assert!(svc.matches("smtp"));
        assert!(svc.matches("smtp:postfix"));
        assert!(!svc.matches("smtp:qmail"));
        assert!(svc.matches("mail"));
        assert!(!svc.matches("pop3"));
    }

    #[test]
    fn identity_props_writable_until_registered() {
        let mut svc = Service::new(Box::new(StubProvider::named("a")));
        svc.set_property(
            PropertyName::Description,
            PropertyValue::Text("demo".into()),
        )
        .unwrap();
        assert_eq!(svc.description(), "demo");

        svc.registered = true;
        let err = svc
            .set_property(PropertyName::Description, PropertyValue::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, Error::PropReadOnly));
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let mut svc = Service::new(Box::new(StubProvider::named("a")));
        let err = svc
            .set_property(PropertyName::Restart, PropertyValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, Error::BadPropType));
    }

    #[test]
    fn rate_properties_configure_the_governor() {
        let mut svc = Service::new(Box::new(StubProvider::named("a")));
        svc.set_property(PropertyName::RateLimit, PropertyValue::Int(3))
            .unwrap();
        svc.set_property(
            PropertyName::RatePeriod,
            PropertyValue::Duration(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(svc.governor.limit(), 3);
        assert_eq!(svc.governor.period(), Duration::from_secs(5));
    }

    #[test]
    fn info_reports_stopping_as_not_running() {
        let mut svc = Service::new(Box::new(StubProvider::named("a")));
        svc.enabled = true;
        svc.running = true;
        svc.stopping = true;
        assert!(!svc.info().running);
        assert_eq!(svc.info().state(), ServiceState::DepWait);
    }

    #[test]
    fn unknown_prop_goes_to_provider() {
        let svc = Service::new(Box::new(StubProvider::named("a")));
        let err = svc.property(PropertyName::StopCommand).unwrap_err();
        assert!(matches!(err, Error::BadPropName));
    }
}
