//! Shared test fixtures: a scriptable provider driven through the public
//! API.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use warden::{Error, NotifyHandle, PropertyName, PropertyValue, Provider, Result, Service};

#[derive(Default)]
pub struct TestState {
    pub started: usize,
    pub stopped: usize,
    pub checked: usize,
    pub fail_start: bool,
    pub fail_check: bool,
    pub notify: Option<NotifyHandle>,
}

#[derive(Clone, Default)]
pub struct TestHandle(pub Arc<Mutex<TestState>>);

impl TestHandle {
    pub fn started(&self) -> usize {
        self.0.lock().started
    }

    pub fn stopped(&self) -> usize {
        self.0.lock().stopped
    }

    pub fn checked(&self) -> usize {
        self.0.lock().checked
    }

    pub fn set_fail_check(&self, fail: bool) {
        self.0.lock().fail_check = fail;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.0.lock().fail_start = fail;
    }

    /// Fires the manager-installed notify callback, the way a provider
    /// reports an asynchronously detected failure.
    pub fn fire_notify(&self) {
        let cb = self.0.lock().notify.clone();
        if let Some(cb) = cb {
            cb();
        }
    }
}

pub struct TestProvider {
    name: String,
    description: String,
    provides: Vec<String>,
    depends: Vec<String>,
    conflicts: Vec<String>,
    handle: TestHandle,
}

impl TestProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("{} test service", name),
            provides: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            handle: TestHandle::default(),
        }
    }

    pub fn provides(mut self, names: &[&str]) -> Self {
        self.provides = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn depends(mut self, names: &[&str]) -> Self {
        self.depends = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn conflicts(mut self, names: &[&str]) -> Self {
        self.conflicts = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn handle(&self) -> TestHandle {
        self.handle.clone()
    }

    pub fn into_service(self) -> Service {
        Service::new(Box::new(self))
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn provides(&self) -> Vec<String> {
        self.provides.clone()
    }

    fn depends(&self) -> Vec<String> {
        self.depends.clone()
    }

    fn conflicts(&self) -> Vec<String> {
        self.conflicts.clone()
    }

    async fn start(&mut self) -> Result<()> {
        let mut state = self.handle.0.lock();
        if state.fail_start {
            return Err(Error::Process("injected start failure".into()));
        }
        state.started += 1;
        Ok(())
    }

    async fn stop(&mut self) {
        self.handle.0.lock().stopped += 1;
    }

    async fn check(&mut self) -> Result<()> {
        let mut state = self.handle.0.lock();
        state.checked += 1;
        if state.fail_check {
            return Err(Error::Process("injected check failure".into()));
        }
        Ok(())
    }

    fn property(&self, _name: PropertyName) -> Result<PropertyValue> {
        Err(Error::BadPropName)
    }

    fn set_property(&mut self, name: PropertyName, value: PropertyValue) -> Result<()> {
        if let (PropertyName::Notify, PropertyValue::Notify(cb)) = (name, value) {
            self.handle.0.lock().notify = Some(cb);
        }
        Ok(())
    }
}
