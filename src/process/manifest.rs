//! JSON service descriptors.
//!
//! One document per file, conventionally under a `services/` directory.
//! Example:
//!
//! ```json
//! {
//!     "name": "redis",
//!     "description": "Redis cache",
//!     "command": ["redis-server", "--port", "6379"],
//!     "env": ["REDIS_LOG=notice"],
//!     "check": ["redis-cli", "ping"],
//!     "stopTime": 5000000000,
//!     "restart": true,
//!     "provides": ["cache"],
//!     "depends": ["network"]
//! }
//! ```
//!
//! `stopTime` is in nanoseconds; zero means wait forever after SIGTERM.
//! `env` entries are `KEY=VALUE` pairs layered over the daemon's own
//! environment.

use super::Process;
use crate::error::{Error, Result};
use crate::name;
use crate::provider::{PropertyName, PropertyValue};
use crate::service::Service;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessManifest {
    pub name: String,
    pub description: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub stop_command: Vec<String>,
    /// Grace period in nanoseconds before SIGKILL; 0 waits forever.
    pub stop_time: u64,
    pub fail_on_exit: bool,
    #[serde(rename = "check")]
    pub check_command: Vec<String>,
    pub restart: bool,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub conflicts: Vec<String>,
}

impl ProcessManifest {
    /// Builds a supervised service from this descriptor.
    pub fn into_service(self) -> Result<Service> {
        name::validate(&self.name)?;
        if self.command.is_empty() {
            return Err(Error::Manifest(format!(
                "service {} has no command",
                self.name
            )));
        }
        for alias in &self.provides {
            name::validate(alias)?;
        }

        let mut proc = Process::new(self.name, self.command);
        if !self.description.is_empty() {
            proc.description = self.description;
        }
        proc.env = self.env;
        proc.provides = self.provides;
        proc.depends = self.depends;
        proc.conflicts = self.conflicts;
        proc.fail_on_exit = self.fail_on_exit;
        proc.stop_time = Duration::from_nanos(self.stop_time);
        if !self.stop_command.is_empty() {
            proc.stop_command = Some(self.stop_command);
        }
        if !self.check_command.is_empty() {
            proc.check_command = Some(self.check_command);
        }

        let mut svc = Service::new(Box::new(proc));
        svc.set_property(PropertyName::Restart, PropertyValue::Bool(self.restart))?;
        Ok(svc)
    }
}

/// Loads one descriptor file.
pub fn load_manifest_file(path: &Path) -> Result<Service> {
    let data = std::fs::read_to_string(path)?;
    let manifest: ProcessManifest = serde_json::from_str(&data)?;
    manifest.into_service()
}

/// Loads every descriptor in a directory. Unreadable or invalid files are
/// logged and skipped so one bad manifest cannot take the daemon down.
pub fn load_manifest_dir(dir: &Path) -> Result<Vec<Service>> {
    let mut services = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match load_manifest_file(&path) {
            Ok(svc) => services.push(svc),
            Err(e) => {
                tracing::warn!("Failed to load manifest {}: {}", path.display(), e);
            }
        }
    }
    Ok(services)
}
