// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::CommandLine;
use crate::env::LaunchEnvironment;
use crate::errors::SupervisorError;
use log::{info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::SystemTime;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;

/// How a worker instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    Exited { code: i32 },
    Signaled { signal: i32 },
    /// The child vanished without the supervisor observing its status.
    Lost,
}

impl ExitReason {
    /// Exit code or signal number, whichever applies.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitReason::Exited { code } => Some(*code),
            ExitReason::Signaled { signal } => Some(*signal),
            ExitReason::Lost => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ExitReason::Exited { code } => format!("Process exited with code {code}"),
            ExitReason::Signaled { signal } => format!("Process terminated by signal {signal}"),
            ExitReason::Lost => "Process not found - may have been killed externally".to_string(),
        }
    }
}

impl From<ExitStatus> for ExitReason {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            ExitReason::Exited { code }
        } else if let Some(signal) = status.signal() {
            ExitReason::Signaled { signal }
        } else {
            ExitReason::Exited { code: -1 }
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Exited { code } => write!(f, "exited with code {code}"),
            ExitReason::Signaled { signal } => write!(f, "terminated by signal {signal}"),
            ExitReason::Lost => write!(f, "lost externally"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Exited(ExitReason),
}

/// The single worker instance currently tracked by a supervisor.
#[derive(Debug)]
pub struct SupervisedProcess {
    instance: u64,
    pid: u32,
    command: CommandLine,
    started_at: SystemTime,
    child: Child,
}

impl SupervisedProcess {
    /// Launch `command` as a child. The command line is recorded as given
    /// and never changes for the lifetime of this instance.
    ///
    /// The child is reaped by the tokio runtime, so launching outside of one
    /// fails with [`SupervisorError::Launch`].
    pub fn spawn(
        command: CommandLine,
        env: &LaunchEnvironment,
        instance: u64,
    ) -> Result<Self, SupervisorError> {
        if let Err(e) = Handle::try_current() {
            return Err(SupervisorError::Launch {
                command: command.render(),
                source: io::Error::other(e),
            });
        }

        let mut cmd = Command::new(command.program());
        cmd.args(command.args());
        cmd.stdin(Stdio::null());
        env.apply(&mut cmd);

        let child = cmd.spawn().map_err(|source| SupervisorError::Launch {
            command: command.render(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        info!("spawned (pid={pid}, cmd={command})");
        Ok(Self {
            instance,
            pid,
            command,
            started_at: SystemTime::now(),
            child,
        })
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Deliver `sig` to the worker. Returns false if it could not be sent.
    pub fn send_signal(&self, sig: Signal) -> bool {
        let Ok(raw) = i32::try_from(self.pid) else {
            warn!("pid {} out of range, cannot send {sig}", self.pid);
            return false;
        };
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => true,
            Err(e) => {
                warn!("[pid={}] failed to send {sig}: {e}", self.pid);
                false
            }
        }
    }

    /// Non-blocking liveness check. Reaps the child if it has exited.
    pub fn poll(&mut self) -> Liveness {
        liveness_from_wait(self.pid, self.child.try_wait())
    }

    /// Immediate SIGKILL without waiting, usable from synchronous contexts.
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("[pid={}] failed to kill: {e}", self.pid);
        }
    }
}

fn liveness_from_wait(pid: u32, result: io::Result<Option<ExitStatus>>) -> Liveness {
    match result {
        Ok(Some(status)) => Liveness::Exited(ExitReason::from(status)),
        Ok(None) => Liveness::Alive,
        Err(e) if e.raw_os_error() == Some(Errno::ECHILD as i32) => {
            Liveness::Exited(ExitReason::Lost)
        }
        Err(e) => {
            // Unknown wait failures are retried on the next poll.
            warn!("[pid={pid}] liveness check failed: {e}");
            Liveness::Alive
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    fn launch(cmd: CommandLine, instance: u64) -> Result<SupervisedProcess, SupervisorError> {
        SupervisedProcess::spawn(cmd, &LaunchEnvironment::default(), instance)
    }

    async fn poll_until_exit(proc: &mut SupervisedProcess) -> ExitReason {
        for _ in 0..100 {
            if let Liveness::Exited(reason) = proc.poll() {
                return reason;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("process {} did not exit", proc.pid());
    }

    #[test]
    fn test_exit_reason_from_status() {
        assert_eq!(
            ExitReason::from(ExitStatus::from_raw(3 << 8)),
            ExitReason::Exited { code: 3 }
        );
        assert_eq!(
            ExitReason::from(ExitStatus::from_raw(9)),
            ExitReason::Signaled { signal: 9 }
        );
    }

    #[test]
    fn test_exit_reason_messages() {
        assert_eq!(
            ExitReason::Exited { code: 3 }.message(),
            "Process exited with code 3"
        );
        assert_eq!(
            ExitReason::Signaled { signal: 15 }.message(),
            "Process terminated by signal 15"
        );
        assert!(ExitReason::Lost.message().contains("killed externally"));
        assert_eq!(ExitReason::Signaled { signal: 15 }.code(), Some(15));
        assert_eq!(ExitReason::Lost.code(), None);
    }

    #[test]
    fn test_echild_maps_to_lost() {
        let err = io::Error::from_raw_os_error(Errno::ECHILD as i32);
        assert_eq!(
            liveness_from_wait(1, Err(err)),
            Liveness::Exited(ExitReason::Lost)
        );
    }

    #[test]
    fn test_other_wait_errors_keep_alive() {
        let err = io::Error::from_raw_os_error(Errno::EINTR as i32);
        assert_eq!(liveness_from_wait(1, Err(err)), Liveness::Alive);
        assert_eq!(liveness_from_wait(1, Ok(None)), Liveness::Alive);
    }

    #[tokio::test]
    async fn test_spawn_and_poll_exit_code() {
        let mut proc = launch(sh("exit 7"), 1).unwrap();
        assert!(proc.pid() > 0);
        assert_eq!(proc.instance(), 1);
        assert_eq!(poll_until_exit(&mut proc).await, ExitReason::Exited { code: 7 });
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_binary() {
        let cmd = CommandLine::new("/nonexistent/worker", vec!["--httpPort=1".into()]);
        let err = launch(cmd, 1).unwrap_err();
        match err {
            SupervisorError::Launch { command, .. } => {
                assert_eq!(command, "/nonexistent/worker --httpPort=1")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_send_signal_sigterm() {
        let cmd = CommandLine::new("/bin/sleep", vec!["60".into()]);
        let mut proc = launch(cmd, 1).unwrap();
        assert_eq!(proc.poll(), Liveness::Alive);
        assert!(proc.send_signal(Signal::SIGTERM));
        assert_eq!(
            poll_until_exit(&mut proc).await,
            ExitReason::Signaled { signal: Signal::SIGTERM as i32 }
        );
    }

    #[tokio::test]
    async fn test_start_kill() {
        let cmd = CommandLine::new("/bin/sleep", vec!["60".into()]);
        let mut proc = launch(cmd, 2).unwrap();
        proc.start_kill();
        assert_eq!(
            poll_until_exit(&mut proc).await,
            ExitReason::Signaled { signal: Signal::SIGKILL as i32 }
        );
    }

    #[tokio::test]
    async fn test_command_is_recorded() {
        let cmd = CommandLine::new("/bin/sleep", vec!["60".into()]);
        let mut proc = launch(cmd.clone(), 3).unwrap();
        assert_eq!(proc.command(), &cmd);
        assert!(proc.started_at() <= SystemTime::now());
        proc.start_kill();
        poll_until_exit(&mut proc).await;
    }
}
