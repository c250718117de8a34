//! The state behind the manager's global lock: every registered service,
//! the graph edges between them, and the lifecycle operations that walk the
//! graph. All methods here run with the lock held; provider calls happen
//! inside the critical section so a walk always observes a consistent
//! snapshot.

use crate::error::{Error, Result};
use crate::log::{FanoutLogger, PrefixedSink, TracingSink};
use crate::provider::{NotifyHandle, PropertyName, PropertyValue};
use crate::rate::Verdict;
use crate::service::{Service, ServiceId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub(crate) struct Registry {
    pub(crate) services: HashMap<ServiceId, Service>,
    /// Insertion order, for stable listings.
    pub(crate) order: Vec<ServiceId>,
    next_id: ServiceId,
    /// Global monotonic serial; seeded from the nanosecond clock so values
    /// never repeat across daemon restarts.
    pub(crate) serial: i64,
    /// Bumped only when the set of services changes.
    pub(crate) list_serial: i64,
    pub(crate) create_time: DateTime<Utc>,
    pub(crate) update_time: DateTime<Utc>,
    pub(crate) list_stamp: DateTime<Utc>,
    pub(crate) monitoring: bool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        let seed = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_millis());
        Self {
            services: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
            serial: seed,
            list_serial: seed,
            create_time: now,
            update_time: now,
            list_stamp: now,
            monitoring: false,
        }
    }

    pub(crate) fn alloc_id(&mut self) -> ServiceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bumps the global serial and stamps the given service with it.
    fn touch(&mut self, id: ServiceId) {
        self.serial += 1;
        let now = Utc::now();
        self.update_time = now;
        if let Some(s) = self.services.get_mut(&id) {
            s.serial = self.serial;
            s.stamp = now;
        }
    }

    fn touch_list(&mut self) {
        self.list_serial += 1;
        self.list_stamp = Utc::now();
        self.serial += 1;
        self.update_time = self.list_stamp;
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<ServiceId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.services.get(id).map_or(false, |s| s.name() == name))
    }

    pub(crate) fn find_matching(&self, pattern: &str) -> Vec<ServiceId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.services
                    .get(id)
                    .map_or(false, |s| s.matches(pattern))
            })
            .collect()
    }

    /// Registers a service under a pre-allocated id: compiles the graph
    /// edges pairwise against every existing service, attaches the shared
    /// log sinks, and installs the manager's notify callback.
    pub(crate) fn add(
        &mut self,
        id: ServiceId,
        mut svc: Service,
        shared_log: &Arc<FanoutLogger>,
        notify: NotifyHandle,
    ) {
        svc.registered = true;

        // Every declared dependency name gets a parent bucket, including
        // ones nothing currently satisfies; can_run treats an empty bucket
        // as an unsatisfied dependency.
        for d in svc.depends().to_vec() {
            svc.parents.entry(d).or_default();
        }

        for &tid in &self.order {
            let Some(t) = self.services.get_mut(&tid) else {
                continue;
            };

            // Does the new service satisfy a dependency of t?
            for d in t.depends().to_vec() {
                if svc.matches(&d) {
                    t.parents.entry(d).or_default().insert(id);
                    svc.children.insert(tid);
                }
            }

            // Does t satisfy a dependency of the new service?
            for d in svc.depends().to_vec() {
                if t.matches(&d) {
                    svc.parents.entry(d).or_default().insert(tid);
                    t.children.insert(id);
                }
            }

            // Conflicts are symmetric no matter which side declares them.
            let conflicted = t.conflicts().iter().any(|c| svc.matches(c))
                || svc.conflicts().iter().any(|c| t.matches(c));
            if conflicted {
                svc.incompat.insert(tid);
                t.incompat.insert(id);
            }
        }

        svc.logger.add_sink(Arc::new(PrefixedSink::new(
            format!("[{}] ", svc.name()),
            shared_log.clone(),
        )));
        svc.logger.add_sink(Arc::new(TracingSink::new(svc.name())));
        let _ = svc
            .provider
            .set_property(PropertyName::Notify, PropertyValue::Notify(notify));

        svc.set_reason("Added service");
        shared_log.write(&format!(
            "Added service {}: {}",
            svc.name(),
            svc.description()
        ));

        self.services.insert(id, svc);
        self.order.push(id);
        self.touch_list();
        self.touch(id);
    }

    /// Unregisters a service, severing its edges symmetrically. Refused
    /// while the service is enabled.
    pub(crate) fn remove(&mut self, id: ServiceId, shared_log: &Arc<FanoutLogger>) -> Result<()> {
        match self.services.get(&id) {
            None => return Err(Error::NoManager),
            Some(s) if s.enabled => return Err(Error::IsEnabled),
            Some(_) => {}
        }
        let Some(svc) = self.services.remove(&id) else {
            return Err(Error::NoManager);
        };

        for cid in &svc.incompat {
            if let Some(c) = self.services.get_mut(cid) {
                c.incompat.remove(&id);
            }
        }
        for cid in &svc.children {
            if let Some(c) = self.services.get_mut(cid) {
                for set in c.parents.values_mut() {
                    set.remove(&id);
                }
            }
        }
        for set in svc.parents.values() {
            for pid in set {
                if let Some(p) = self.services.get_mut(pid) {
                    p.children.remove(&id);
                }
            }
        }

        self.order.retain(|&x| x != id);
        shared_log.write(&format!("Removed service {}", svc.name()));
        self.touch_list();
        Ok(())
    }

    /// A service can run when it is enabled, not mid-stop, every declared
    /// dependency has at least one live provider, and no conflicting
    /// service is enabled.
    pub(crate) fn can_run(&self, id: ServiceId) -> bool {
        let Some(s) = self.services.get(&id) else {
            return false;
        };
        if s.stopping || !s.enabled {
            return false;
        }
        for providers in s.parents.values() {
            let satisfied = providers.iter().any(|pid| {
                self.services.get(pid).map_or(false, |p| {
                    p.enabled && p.running && !p.stopping && !p.failed
                })
            });
            if !satisfied {
                return false;
            }
        }
        for cid in &s.incompat {
            if self.services.get(cid).map_or(false, |c| c.enabled) {
                return false;
            }
        }
        true
    }

    pub(crate) async fn enable(&mut self, id: ServiceId) -> Result<()> {
        let conflict = {
            let Some(s) = self.services.get(&id) else {
                return Err(Error::NoManager);
            };
            if s.enabled {
                return Ok(());
            }
            s.incompat
                .iter()
                .copied()
                .find(|cid| self.services.get(cid).map_or(false, |c| c.enabled))
        };
        if let Some(cid) = conflict {
            let other = self
                .services
                .get(&cid)
                .map(|c| c.name().to_string())
                .unwrap_or_default();
            if let Some(s) = self.services.get(&id) {
                s.log(&format!(
                    "Cannot enable {}: conflicts with {}",
                    s.name(),
                    other
                ));
            }
            return Err(Error::Conflict);
        }

        if let Some(s) = self.services.get_mut(&id) {
            s.set_reason("Waiting to start");
            s.log(&format!("Enabling service {}", s.name()));
            s.enabled = true;
            s.governor.reset();
        }
        self.touch(id);
        self.start_recurse(id, "Enabled service").await
    }

    pub(crate) async fn disable(&mut self, id: ServiceId) -> Result<()> {
        {
            let Some(s) = self.services.get_mut(&id) else {
                return Err(Error::NoManager);
            };
            if !s.enabled {
                return Ok(());
            }
            s.log(&format!("Disabling service {}", s.name()));
            s.set_reason("Disabled service");
            s.enabled = false;
            s.failed = false;
            s.err = None;
        }
        self.touch(id);
        self.stop_recurse(id, "Disabled service").await;
        Ok(())
    }

    pub(crate) async fn restart(&mut self, id: ServiceId) -> Result<()> {
        {
            let Some(s) = self.services.get_mut(&id) else {
                return Err(Error::NoManager);
            };
            if !s.enabled {
                return Ok(());
            }
            s.log(&format!("Restarting service {}", s.name()));
            s.enabled = false;
        }
        self.stop_recurse(id, "Restarted service").await;
        if let Some(s) = self.services.get_mut(&id) {
            // The start count deliberately survives a restart; resetting it
            // here would let a tight restart loop sidestep the governor.
            s.set_reason("Restarted service");
            s.failed = false;
            s.err = None;
            s.enabled = true;
        }
        self.touch(id);
        self.start_recurse(id, "Restarted service").await
    }

    pub(crate) async fn clear(&mut self, id: ServiceId) -> Result<()> {
        {
            let Some(s) = self.services.get_mut(&id) else {
                return Err(Error::NoManager);
            };
            if s.failed {
                s.set_reason("Cleared fault");
                s.log(&format!("Clearing fault on {}", s.name()));
            }
            s.governor.reset();
            s.failed = false;
            s.err = None;
        }
        self.touch(id);
        self.start_recurse(id, "Cleared fault").await
    }

    /// Runs the provider health check. A failure latches the fault, stops
    /// the service and its dependents, and is returned to the caller.
    pub(crate) async fn check_service(&mut self, id: ServiceId) -> Result<()> {
        let check_result = {
            let Some(s) = self.services.get_mut(&id) else {
                return Err(Error::NoManager);
            };
            if s.failed {
                return Err(Error::Faulted(s.err.clone().unwrap_or_default()));
            }
            if !s.running {
                return Err(Error::NotRunning);
            }
            s.checking = true;
            s.provider.check().await
        };

        if let Err(e) = check_result {
            let msg = e.to_string();
            if let Some(s) = self.services.get_mut(&id) {
                s.log(&format!("Service {} faulted: {}", s.name(), msg));
                s.failed = true;
                s.err = Some(msg.clone());
            }
            self.touch(id);
            self.stop_recurse(id, &format!("Faulted: {}", msg)).await;
            if let Some(s) = self.services.get_mut(&id) {
                s.checking = false;
            }
            return Err(Error::Faulted(msg));
        }

        if let Some(s) = self.services.get_mut(&id) {
            s.checking = false;
        }
        Ok(())
    }

    /// Restart path for a latched fault when self-healing is configured.
    /// Still subject to the rate governor.
    pub(crate) async fn self_heal(&mut self, id: ServiceId) {
        let heal = match self.services.get(&id) {
            Some(s) if s.failed && s.restart => {
                s.log("Attempting self-healing");
                true
            }
            _ => false,
        };
        if heal {
            let _ = self.start_recurse(id, "Self-healing attempt").await;
        }
    }

    /// Dependency-aware start: starts this service if it is eligible, then
    /// gives every dependent a chance, parents before children. Returns
    /// `Error::RateLimited` only for the root service of the walk.
    pub(crate) fn start_recurse<'a>(
        &'a mut self,
        id: ServiceId,
        detail: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.services.get(&id).map_or(true, |s| s.running) {
                return Ok(());
            }
            if !self.can_run(id) {
                return Ok(());
            }

            let started = {
                let Some(s) = self.services.get_mut(&id) else {
                    return Ok(());
                };
                let now = Instant::now();
                match s.governor.check(now) {
                    Verdict::Limited { entered_cooldown } => {
                        if entered_cooldown {
                            s.log(&format!("Service {} restarting too quickly", s.name()));
                        }
                        return Err(Error::RateLimited);
                    }
                    Verdict::Allowed => {}
                }
                s.governor.note_start(now);
                match s.provider.start().await {
                    Err(e) => {
                        let msg = e.to_string();
                        s.log(&format!("Failed to start {}: {}", s.name(), msg));
                        s.set_reason(format!("Failed to start: {}", msg));
                        s.err = Some(msg);
                        s.failed = true;
                        false
                    }
                    Ok(()) => {
                        s.running = true;
                        s.failed = false;
                        s.set_reason(format!("Started: {}", detail));
                        s.log(&format!("Started {}: {}", s.name(), detail));
                        true
                    }
                }
            };
            self.touch(id);
            if !started {
                return Ok(());
            }

            let children: Vec<ServiceId> = self
                .services
                .get(&id)
                .map(|s| s.children.iter().copied().collect())
                .unwrap_or_default();
            for child in children {
                let _ = self.start_recurse(child, "Dependency running").await;
            }
            Ok(())
        })
    }

    /// Dependency-aware stop: dependents that can no longer run stop first,
    /// so they never observe a dependency disappearing under them.
    pub(crate) fn stop_recurse<'a>(
        &'a mut self,
        id: ServiceId,
        detail: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            {
                let Some(s) = self.services.get_mut(&id) else {
                    return;
                };
                if !s.running || s.stopping {
                    return;
                }
                s.stopping = true;
            }

            let children: Vec<ServiceId> = self
                .services
                .get(&id)
                .map(|s| s.children.iter().copied().collect())
                .unwrap_or_default();
            for child in children {
                if !self.can_run(child) {
                    self.stop_recurse(child, "Dependency stopped").await;
                }
            }

            if let Some(s) = self.services.get_mut(&id) {
                s.provider.stop().await;
                s.set_reason(format!("Stopped: {}", detail));
                s.log(&format!("Stopped {}: {}", s.name(), detail));
                s.running = false;
                s.stopping = false;
            }
            self.touch(id);
        })
    }

    /// Tears everything down: disables and stops every service, then
    /// severs and drops them all.
    pub(crate) async fn shutdown(&mut self, shared_log: &Arc<FanoutLogger>) {
        self.monitoring = false;
        for id in self.order.clone() {
            if let Some(s) = self.services.get_mut(&id) {
                s.enabled = false;
            }
            self.stop_recurse(id, "Shutting down").await;
            let _ = self.remove(id, shared_log);
        }
    }
}
