// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle of the single supervised worker.
//!
//! All state lives in one [`Inner`] behind one mutex, shared with the
//! monitor task. The lock is only held for short critical sections and never
//! across an `.await`: `stop()` drops it between liveness re-checks so the
//! monitor can still observe and report an exit during the grace period.

use crate::command::{self, CommandLine};
use crate::env::LaunchEnvironment;
use crate::errors::SupervisorError;
use crate::fields::{ConfigurationSet, FieldValue};
use crate::monitor::{MONITOR_INTERVAL, MonitorHandle};
use crate::orphan::{self, SweepReport};
use crate::process::{ExitReason, Liveness, SupervisedProcess};
use crate::state::SupervisorState;
use log::{debug, error, info, warn};
use nix::sys::signal::Signal;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::time::{Instant, sleep};

/// Wait between the graceful termination request and escalation to SIGKILL.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);
/// Upper bound on waiting for exit confirmation after SIGKILL.
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub(crate) struct Inner {
    config: ConfigurationSet,
    environment: LaunchEnvironment,
    state: SupervisorState,
    process: Option<SupervisedProcess>,
    last_message: String,
    last_exit: Option<ExitReason>,
    /// Command of the most recent launch, kept after exit for orphan sweeps.
    last_command: Option<CommandLine>,
    next_instance: u64,
}

impl Inner {
    fn new(config: ConfigurationSet, environment: LaunchEnvironment) -> Self {
        Self {
            config,
            environment,
            state: SupervisorState::Stopped,
            process: None,
            last_message: "Supervisor initialized".to_string(),
            last_exit: None,
            last_command: None,
            next_instance: 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(config: ConfigurationSet) -> Self {
        Self::new(config, LaunchEnvironment::default())
    }

    fn transition(&mut self, next: SupervisorState) {
        if !self.state.can_transition_to(next) {
            warn!("unexpected state transition {} -> {next}", self.state);
        }
        debug!("state {} -> {next}", self.state);
        self.state = next;
    }

    fn publish(&mut self, message: impl Into<String>) {
        self.last_message = message.into();
    }

    fn is_tracking(&self, instance: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.instance() == instance)
    }

    /// Common exit path: drop the tracked process, record why it ended and
    /// return to Stopped.
    fn finish(&mut self, reason: ExitReason) {
        self.process = None;
        self.last_exit = Some(reason);
        self.transition(SupervisorState::Stopped);
        self.publish(reason.message());
    }

    /// Non-blocking liveness check of the tracked process, reconciling
    /// state if it has exited. Returns the finished instance and reason.
    pub(crate) fn poll_tracked(&mut self) -> Option<(u64, ExitReason)> {
        let process = self.process.as_mut()?;
        let Liveness::Exited(reason) = process.poll() else {
            return None;
        };
        let (pid, instance) = (process.pid(), process.instance());
        match reason {
            ExitReason::Lost => warn!("[pid={pid}] {}", reason.message()),
            _ => info!("[pid={pid}] worker {reason}"),
        }
        self.finish(reason);
        Some((instance, reason))
    }
}

pub(crate) fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Started {
    pub pid: u32,
    pub command: CommandLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was tracked; no signal sent.
    NotRunning,
    /// Exited within the grace period.
    Graceful,
    /// Grace period expired and SIGKILL was required.
    Escalated,
    /// Killed without a graceful phase.
    Killed,
}

impl StopOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StopOutcome::NotRunning => "Process already stopped",
            StopOutcome::Graceful => "Process stopped successfully",
            StopOutcome::Escalated => "Process killed after grace period expired",
            StopOutcome::Killed => "Process force killed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub command_line: Option<String>,
    pub started_at: Option<SystemTime>,
    pub last_message: String,
    pub last_exit: Option<ExitReason>,
    /// Exit code or terminating signal of the last instance.
    pub exit_code: Option<i32>,
}

pub struct Supervisor {
    shared: Arc<Mutex<Inner>>,
    monitor: Option<MonitorHandle>,
}

impl Supervisor {
    /// Create the supervisor and its monitor task.
    ///
    /// The monitor is spawned on the current tokio runtime. Without one the
    /// supervisor runs degraded: exits are only noticed by `stop` and
    /// `force_kill`.
    pub fn new(config: ConfigurationSet) -> Self {
        Self::with_environment(config, LaunchEnvironment::default())
    }

    /// Like [`Supervisor::new`], launching the worker with `environment`.
    pub fn with_environment(config: ConfigurationSet, environment: LaunchEnvironment) -> Self {
        let shared = Arc::new(Mutex::new(Inner::new(config, environment)));
        let monitor = match MonitorHandle::spawn(Arc::clone(&shared), MONITOR_INTERVAL) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to start monitor task, automatic exit detection disabled: {e}");
                None
            }
        };
        Self { shared, monitor }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared)
    }

    pub fn is_degraded(&self) -> bool {
        self.monitor.is_none()
    }

    /// Launch the worker from the current configuration.
    ///
    /// Returns promptly; the recorded command line is a snapshot that later
    /// configuration edits never change. Outside a tokio runtime the launch
    /// fails and the state moves to Failed.
    pub fn start(&self) -> Result<Started, SupervisorError> {
        let mut inner = self.lock();
        if !inner.state.can_start() {
            debug!("start requested while {}", inner.state);
            return Err(SupervisorError::AlreadyRunning);
        }
        inner.transition(SupervisorState::Starting);

        let command = command::build(&inner.config);
        if command.is_minimal() {
            warn!(
                "command exceeds {} bytes, launching with mandatory fields only",
                command::MAX_COMMAND_LENGTH
            );
            let len = command.render().len();
            if len > command::MAX_COMMAND_LENGTH {
                warn!("mandatory-only command is still {len} bytes");
            }
        }
        let instance = inner.next_instance;
        inner.next_instance += 1;

        let spawned = SupervisedProcess::spawn(command.clone(), &inner.environment, instance);
        match spawned {
            Ok(process) => {
                let pid = process.pid();
                inner.process = Some(process);
                inner.last_command = Some(command.clone());
                inner.last_exit = None;
                inner.transition(SupervisorState::Running);
                inner.publish("Process started successfully");
                Ok(Started { pid, command })
            }
            Err(e) => {
                error!("{e}");
                inner.transition(SupervisorState::Failed);
                inner.publish(format!("Failed to start process: {e}"));
                Err(e)
            }
        }
    }

    /// SIGTERM, wait up to [`GRACE_PERIOD`], then SIGKILL. Always ends in
    /// Stopped with the process entity cleared.
    pub async fn stop(&self) -> StopOutcome {
        let instance = {
            let mut inner = self.lock();
            let Some(process) = inner.process.as_ref() else {
                return StopOutcome::NotRunning;
            };
            let instance = process.instance();
            if inner.state == SupervisorState::Running {
                info!("[pid={}] sending SIGTERM", process.pid());
                process.send_signal(Signal::SIGTERM);
                inner.transition(SupervisorState::Stopping);
                inner.publish("Sending SIGTERM to process");
            }
            // Already Stopping: another caller signalled, join its wait.
            instance
        };

        if self.wait_for_exit(instance, GRACE_PERIOD).await {
            self.settle(instance, StopOutcome::Graceful);
            return StopOutcome::Graceful;
        }

        {
            let mut inner = self.lock();
            if let Some(process) = inner.process.as_ref().filter(|p| p.instance() == instance) {
                warn!(
                    "[pid={}] grace period ({}s) expired, sending SIGKILL",
                    process.pid(),
                    GRACE_PERIOD.as_secs()
                );
                process.send_signal(Signal::SIGKILL);
                inner.publish("Sending SIGKILL to process");
            }
        }
        self.confirm_killed(instance).await;
        self.settle(instance, StopOutcome::Escalated);
        StopOutcome::Escalated
    }

    /// Immediate SIGKILL, no graceful phase. Same end state as `stop`.
    pub async fn force_kill(&self) -> StopOutcome {
        let instance = {
            let inner = self.lock();
            let Some(process) = inner.process.as_ref() else {
                return StopOutcome::NotRunning;
            };
            info!("[pid={}] force killing", process.pid());
            process.send_signal(Signal::SIGKILL);
            process.instance()
        };
        self.confirm_killed(instance).await;
        self.settle(instance, StopOutcome::Killed);
        StopOutcome::Killed
    }

    /// Poll until `instance` is no longer tracked or `timeout` elapses.
    async fn wait_for_exit(&self, instance: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                if !inner.is_tracking(instance) {
                    return true;
                }
                if inner.poll_tracked().is_some() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    async fn confirm_killed(&self, instance: u64) {
        if self.wait_for_exit(instance, KILL_CONFIRM_TIMEOUT).await {
            return;
        }
        let mut inner = self.lock();
        if inner.is_tracking(instance) {
            warn!("worker still running after SIGKILL, giving up on it");
            inner.finish(ExitReason::Lost);
        }
    }

    /// Publish the stop outcome unless a new instance was started meanwhile.
    fn settle(&self, instance: u64, outcome: StopOutcome) {
        let mut inner = self.lock();
        if inner.state == SupervisorState::Stopped && inner.next_instance == instance + 1 {
            inner.publish(outcome.message());
        }
    }

    pub fn get_state(&self) -> StatusSnapshot {
        let inner = self.lock();
        let process = inner.process.as_ref();
        StatusSnapshot {
            state: inner.state,
            pid: process.map(SupervisedProcess::pid),
            command_line: process.map(|p| p.command().render()),
            started_at: process.map(SupervisedProcess::started_at),
            last_message: inner.last_message.clone(),
            last_exit: inner.last_exit,
            exit_code: inner.last_exit.and_then(|r| r.code()),
        }
    }

    pub fn snapshot(&self) -> ConfigurationSet {
        self.lock().config.clone()
    }

    /// Write one field. Rejected writes keep the previous value and publish
    /// the reason.
    pub fn set_field(
        &self,
        name: &str,
        value: FieldValue,
        enabled: bool,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.lock();
        let label = inner
            .config
            .schema()
            .get(name)
            .map(|spec| spec.label.clone())
            .unwrap_or_else(|| name.to_string());
        match inner.config.set_field(name, value, enabled) {
            Ok(()) => {
                inner.publish(format!("{label} updated successfully"));
                Ok(())
            }
            Err(e) => {
                inner.publish(e.to_string());
                Err(e)
            }
        }
    }

    /// Apply `update` to the configuration under the supervisor lock.
    pub fn configure<T>(
        &self,
        update: impl FnOnce(&mut ConfigurationSet) -> Result<T, SupervisorError>,
    ) -> Result<T, SupervisorError> {
        let mut inner = self.lock();
        update(&mut inner.config)
    }

    /// Command the next `start` would launch.
    pub fn command_preview(&self) -> CommandLine {
        command::build(&self.lock().config)
    }

    pub fn last_command(&self) -> Option<CommandLine> {
        self.lock().last_command.clone()
    }

    pub(crate) fn publish(&self, message: impl Into<String>) {
        self.lock().publish(message);
    }

    /// Best-effort kill of worker instances that escaped tracking. Never
    /// touches the tracked process.
    pub fn sweep_orphans(&self) -> SweepReport {
        let (command, program, identifier, tracked) = {
            let inner = self.lock();
            (
                inner.last_command.clone(),
                inner.config.program().to_string(),
                inner.config.worker_identifier(),
                inner.process.as_ref().map(SupervisedProcess::pid),
            )
        };

        let mut exclude = vec![std::process::id()];
        exclude.extend(tracked);
        let report = orphan::sweep(
            orphan::root_path(),
            command.as_ref(),
            &program,
            identifier.as_deref(),
            &exclude,
        );
        match &report {
            SweepReport::Skipped | SweepReport::NothingMatched => info!("{}", report.message()),
            _ => warn!("{}", report.message()),
        }
        self.publish(report.message());
        report
    }

    /// Signal the monitor to stop and give it `window` to exit.
    pub(crate) async fn stop_monitor(&self, window: Duration) -> bool {
        match &self.monitor {
            Some(monitor) => monitor.shutdown(window).await,
            None => true,
        }
    }

    /// Human readable dump of the tracked process and configuration.
    pub fn describe(&self) -> String {
        let inner = self.lock();
        let process = inner.process.as_ref();
        let mut out = String::from("Process Information:\n");
        let _ = writeln!(out, "  State: {}", inner.state);
        let _ = writeln!(out, "  Process ID: {}", process.map_or(0, SupervisedProcess::pid));
        let _ = writeln!(
            out,
            "  Is Running: {}",
            if process.is_some() { "Yes" } else { "No" }
        );
        let _ = writeln!(
            out,
            "  Command Line: {}",
            process.map(|p| p.command().render()).unwrap_or_default()
        );
        let _ = writeln!(out, "  Program: {}", inner.config.program());
        if let Some(artifact) = inner.config.artifact() {
            let _ = writeln!(
                out,
                "  Artifact: {}{}",
                artifact.path(),
                if artifact.enabled { "" } else { " (disabled)" }
            );
        }
        for (spec, field) in inner.config.entries().filter(|(_, f)| f.enabled) {
            let _ = writeln!(out, "  {}: {}", spec.label, field.value);
        }
        let _ = write!(out, "  Last Message: {}", inner.last_message);
        out
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(monitor) = &self.monitor {
            monitor.cancel();
        }
        let mut inner = self.lock();
        if let Some(process) = inner.process.as_mut() {
            warn!(
                "[pid={}] supervisor dropped with worker running, killing it",
                process.pid()
            );
            process.start_kill();
        }
    }
}
