//! The OS-process provider.
//!
//! Runs one child process per service. Stdout and stderr are drained by
//! background tasks into the service's logger until EOF. A wait task
//! watches for exit: an exit the supervisor did not ask for latches a fault
//! and fires the manager's notify callback, which drives the
//! check-and-self-heal path.
//!
//! Stopping sends SIGTERM to the child's process group (or runs the
//! configured stop command with `PID` in its environment), then escalates
//! to SIGKILL once the grace period expires. Stop blocks until the child is
//! actually gone and never fails.

mod manifest;

pub use manifest::{load_manifest_dir, load_manifest_file, ProcessManifest};

use crate::error::{Error, Result};
use crate::log::LogSink;
use crate::provider::{NotifyHandle, PropertyName, PropertyValue, Provider};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

/// Default bound on auxiliary (stop/check) command runtime.
const AUX_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_STOP_TIME: Duration = Duration::from_secs(10);

struct ProcState {
    pid: Option<u32>,
    /// Set before we take the child down, so the wait task can tell an
    /// ordered stop from a crash.
    stopped: bool,
    failed: bool,
    reason: Option<String>,
}

pub struct Process {
    name: String,
    description: String,
    provides: Vec<String>,
    depends: Vec<String>,
    conflicts: Vec<String>,

    command: Vec<String>,
    env: Vec<String>,
    stop_command: Option<Vec<String>>,
    check_command: Option<Vec<String>>,
    /// Zero means wait forever for a graceful exit.
    stop_time: Duration,
    fail_on_exit: bool,

    logger: Option<Arc<dyn LogSink>>,
    notify: Option<NotifyHandle>,
    state: Arc<Mutex<ProcState>>,
    /// Resolved by the wait task when the child exits.
    exit_rx: Option<oneshot::Receiver<()>>,
}

impl Process {
    /// A process service running `command` (argv form). The stop behavior
    /// defaults to SIGTERM with a 10 second grace period.
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        let name = name.into();
        let description = match command.first() {
            Some(argv0) => format!("{} process: {}", name, argv0),
            None => format!("{} process", name),
        };
        Self {
            name,
            description,
            provides: Vec::new(),
            depends: Vec::new(),
            conflicts: Vec::new(),
            command,
            env: Vec::new(),
            stop_command: None,
            check_command: None,
            stop_time: DEFAULT_STOP_TIME,
            fail_on_exit: false,
            logger: None,
            notify: None,
            state: Arc::new(Mutex::new(ProcState {
                pid: None,
                stopped: false,
                failed: false,
                reason: None,
            })),
            exit_rx: None,
        }
    }

    fn log(&self, line: &str) {
        if let Some(logger) = &self.logger {
            logger.log_line(line);
        }
    }

    fn spawn_drain(
        &self,
        reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        prefix: &'static str,
    ) {
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(logger) = &logger {
                    logger.log_line(&format!("{}{}", prefix, line));
                }
            }
        });
    }

    /// Runs a stop/check subcommand with its output drained into the
    /// service log and a hard runtime bound.
    async fn run_aux_command(
        &self,
        label: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<std::process::ExitStatus> {
        let Some(program) = argv.first() else {
            return Err(Error::Process(format!("empty {} command", label)));
        };
        let mut cmd = Command::new(program);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for entry in &self.env {
            if let Some((k, v)) = entry.split_once('=') {
                cmd.env(k, v);
            }
        }
        if let Some(pid) = self.state.lock().pid {
            cmd.env("PID", pid.to_string());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("failed to run {} command: {}", label, e)))?;
        if let Some(out) = child.stdout.take() {
            self.spawn_drain(out, "stdout> ");
        }
        if let Some(err) = child.stderr.take() {
            self.spawn_drain(err, "stderr> ");
        }

        let timeout = if timeout.is_zero() {
            AUX_COMMAND_TIMEOUT
        } else {
            timeout
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                status.map_err(|e| Error::Process(format!("{} command failed: {}", label, e)))
            }
            Err(_) => {
                self.log(&format!("Timeout waiting for {} command", label));
                let _ = child.kill().await;
                Err(Error::Process(format!("{} command timed out", label)))
            }
        }
    }

    fn signal_group(&self, pid: u32, signal: Signal) {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
            self.log(&format!("Failed sending {}: {}", signal, e));
        }
    }
}

#[async_trait]
impl Provider for Process {
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
        let Some(program) = self.command.first() else {
            return Err(Error::Process("no command configured".into()));
        };

        {
            let mut state = self.state.lock();
            state.stopped = false;
            state.failed = false;
            state.reason = None;
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Children get their own process group so stop signals reach
            // the whole tree, and the child survives a supervisor drop.
            .process_group(0)
            .kill_on_drop(false);
        for entry in &self.env {
            if let Some((k, v)) = entry.split_once('=') {
                cmd.env(k, v);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("failed to start: {}", e);
                let mut state = self.state.lock();
                state.failed = true;
                state.reason = Some(msg.clone());
                return Err(Error::Process(msg));
            }
        };

        let pid = child.id();
        self.state.lock().pid = pid;

        if let Some(out) = child.stdout.take() {
            self.spawn_drain(out, "stdout> ");
        }
        if let Some(err) = child.stderr.take() {
            self.spawn_drain(err, "stderr> ");
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        self.exit_rx = Some(exit_rx);

        let state = self.state.clone();
        let logger = self.logger.clone();
        let notify = self.notify.clone();
        let fail_on_exit = self.fail_on_exit;
        tokio::spawn(async move {
            let status = child.wait().await;
            let faulted = {
                let mut state = state.lock();
                state.pid = None;
                if state.stopped {
                    false
                } else {
                    match status {
                        Ok(st) if st.success() => {
                            if fail_on_exit {
                                state.failed = true;
                                state.reason = Some("Unexpected termination".into());
                            }
                        }
                        Ok(st) => {
                            state.failed = true;
                            state.reason = Some(format!("Failed: {}", st));
                        }
                        Err(e) => {
                            state.failed = true;
                            state.reason = Some(format!("Failed: {}", e));
                        }
                    }
                    state.failed
                }
            };
            if faulted {
                if let Some(logger) = &logger {
                    let reason = state
                        .lock()
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Failed".into());
                    logger.log_line(&reason);
                }
                if let Some(notify) = &notify {
                    notify();
                }
            }
            let _ = exit_tx.send(());
        });

        Ok(())
    }

    async fn stop(&mut self) {
        let pid = {
            let mut state = self.state.lock();
            state.stopped = true;
            state.pid
        };

        let Some(mut exit_rx) = self.exit_rx.take() else {
            return;
        };

        if let Some(pid) = pid {
            match self.stop_command.clone() {
                Some(argv) => {
                    if let Err(e) = self.run_aux_command("stop", &argv, self.stop_time).await {
                        self.log(&format!("Failed stop command: {}", e));
                    }
                }
                None => self.signal_group(pid, Signal::SIGTERM),
            }

            if self.stop_time.is_zero() {
                let _ = exit_rx.await;
            } else {
                tokio::select! {
                    _ = &mut exit_rx => {}
                    _ = tokio::time::sleep(self.stop_time) => {
                        self.log("Graceful shutdown timed out");
                        self.signal_group(pid, Signal::SIGKILL);
                        let _ = exit_rx.await;
                    }
                }
            }
        } else {
            // Already exited; the wait task has resolved or will shortly.
            let _ = exit_rx.await;
        }

        self.state.lock().pid = None;
    }

    async fn check(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            if state.failed {
                return Err(Error::Process(
                    state.reason.clone().unwrap_or_else(|| "failed".into()),
                ));
            }
        }
        if let Some(argv) = self.check_command.clone() {
            let status = self
                .run_aux_command("check", &argv, AUX_COMMAND_TIMEOUT)
                .await?;
            if !status.success() {
                return Err(Error::Process(format!("check command failed: {}", status)));
            }
        }
        Ok(())
    }

    fn property(&self, name: PropertyName) -> Result<PropertyValue> {
        match name {
            PropertyName::FailOnExit => Ok(PropertyValue::Bool(self.fail_on_exit)),
            PropertyName::StopTime => Ok(PropertyValue::Duration(self.stop_time)),
            PropertyName::StopCommand => match &self.stop_command {
                Some(argv) => Ok(PropertyValue::TextList(argv.clone())),
                None => Ok(PropertyValue::TextList(Vec::new())),
            },
            PropertyName::CheckCommand => match &self.check_command {
                Some(argv) => Ok(PropertyValue::TextList(argv.clone())),
                None => Ok(PropertyValue::TextList(Vec::new())),
            },
            _ => Err(Error::BadPropName),
        }
    }

    fn set_property(&mut self, name: PropertyName, value: PropertyValue) -> Result<()> {
        match (name, value) {
            (PropertyName::Logger, PropertyValue::Sink(sink)) => {
                self.logger = Some(sink);
                Ok(())
            }
            (PropertyName::Notify, PropertyValue::Notify(handle)) => {
                self.notify = Some(handle);
                Ok(())
            }
            (PropertyName::FailOnExit, PropertyValue::Bool(v)) => {
                self.fail_on_exit = v;
                Ok(())
            }
            (PropertyName::StopTime, PropertyValue::Duration(v)) => {
                self.stop_time = v;
                Ok(())
            }
            (PropertyName::StopCommand, PropertyValue::TextList(argv)) => {
                self.stop_command = if argv.is_empty() { None } else { Some(argv) };
                Ok(())
            }
            (PropertyName::CheckCommand, PropertyValue::TextList(argv)) => {
                self.check_command = if argv.is_empty() { None } else { Some(argv) };
                Ok(())
            }
            (
                PropertyName::Logger
                | PropertyName::Notify
                | PropertyName::FailOnExit
                | PropertyName::StopTime
                | PropertyName::StopCommand
                | PropertyName::CheckCommand,
                _,
            ) => Err(Error::BadPropType),
            _ => Err(Error::BadPropName),
        }
    }
}
