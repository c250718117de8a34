//! The background health-check pass and the asynchronous failure
//! notification path providers use to report faults between checks.

use super::Shared;
use crate::provider::NotifyHandle;
use crate::service::ServiceId;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// A prime number of milliseconds, so independently scheduled supervisors
/// spread their clock phase instead of thundering together.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(587);

/// Spawns the monitor task for a manager. The task holds only a weak
/// reference, so dropping the last `Manager` clone tears it down; the
/// cancellation token covers explicit shutdown.
pub(super) fn spawn_monitor(shared: &Arc<Shared>) {
    let weak = Arc::downgrade(shared);
    let cancel = shared.cancel.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(MONITOR_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let Some(shared) = weak.upgrade() else { break };
                    shared.monitor_pass().await;
                }
            }
        }
        tracing::debug!("monitor loop exited");
    });
}

/// Builds the callback handed to a provider at registration. Invoking it
/// schedules the same check-then-self-heal logic the monitor runs, on this
/// one service, without blocking the caller.
pub(super) fn notify_handle(weak: Weak<Shared>, id: ServiceId) -> NotifyHandle {
    Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            tokio::spawn(async move {
                shared.handle_notify(id).await;
            });
        }
    })
}

impl Shared {
    /// One monitor tick: walk the enabled services, health-check each, and
    /// self-heal the ones configured to restart.
    pub(super) async fn monitor_pass(&self) {
        let mut reg = self.registry.lock().await;
        if !reg.monitoring {
            return;
        }
        for id in reg.order.clone() {
            let enabled = reg.services.get(&id).map_or(false, |s| s.enabled);
            if !enabled {
                continue;
            }
            if reg.check_service(id).await.is_err() {
                reg.self_heal(id).await;
            }
        }
        self.publish(&reg);
    }

    /// Provider-reported failure. Must not be called from within a
    /// provider's check; the `checking` flag breaks the loop if it is.
    pub(super) async fn handle_notify(&self, id: ServiceId) {
        let user_cb = {
            let mut reg = self.registry.lock().await;
            let (checking, enabled, cb) = match reg.services.get(&id) {
                Some(s) => (s.checking, s.enabled, s.notify.clone()),
                None => return,
            };
            if checking {
                return;
            }
            if enabled && reg.check_service(id).await.is_err() {
                reg.self_heal(id).await;
            }
            self.publish(&reg);
            cb
        };
        if let Some(cb) = user_cb {
            cb();
        }
    }
}
