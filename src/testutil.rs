//! Scriptable provider for unit tests.

#![allow(dead_code)]

use crate::error::{Error, Result};
use crate::provider::{PropertyName, PropertyValue, Provider};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct StubState {
    pub started: usize,
    pub stopped: usize,
    pub checked: usize,
    pub fail_start: bool,
    pub fail_check: bool,
}

pub(crate) struct StubProvider {
    name: String,
    description: String,
    provides: Vec<String>,
    depends: Vec<String>,
    conflicts: Vec<String>,
    pub state: Arc<Mutex<StubState>>,
}

impl StubProvider {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("{} stub", name),
            provides: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            state: Arc::new(Mutex::new(StubState::default())),
        }
    }

    pub fn with_provides(mut self, provides: &[&str]) -> Self {
        self.provides = provides.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_conflicts(mut self, conflicts: &[&str]) -> Self {
        self.conflicts = conflicts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn state(&self) -> Arc<Mutex<StubState>> {
        self.state.clone()
    }
}

#[async_trait]
impl Provider for StubProvider {
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
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(Error::Process("injected start failure".into()));
        }
        state.started += 1;
        Ok(())
    }

    async fn stop(&mut self) {
        self.state.lock().stopped += 1;
    }

    async fn check(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.checked += 1;
        if state.fail_check {
            return Err(Error::Process("injected check failure".into()));
        }
        Ok(())
    }

    fn property(&self, _name: PropertyName) -> Result<PropertyValue> {
        Err(Error::BadPropName)
    }

    fn set_property(&mut self, _name: PropertyName, _value: PropertyValue) -> Result<()> {
        // Accept and ignore everything; the engine forwards logger/notify
        // properties it expects providers to tolerate.
        Ok(())
    }
}
