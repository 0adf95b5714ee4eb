// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a running dd-worker-supervisor daemon.
pub struct DaemonHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    log_lines: Arc<Mutex<Vec<String>>>,
    _stdout_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

fn collect_lines(
    stream: impl std::io::Read + Send + 'static,
    tag: &'static str,
    sink: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{tag}] {l}");
                    sink.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

impl DaemonHandle {
    /// Start the daemon on `config` with the console disabled.
    pub fn start(config: &Path) -> Self {
        let mut cmd = Self::command();
        cmd.arg("--config").arg(config).arg("--no-console");
        Self::spawn(cmd, false)
    }

    /// Start the daemon with `DD_WS_CONFIG` pointing at `config`.
    pub fn start_with_env(config: &Path) -> Self {
        let mut cmd = Self::command();
        cmd.env("DD_WS_CONFIG", config).arg("--no-console");
        Self::spawn(cmd, false)
    }

    /// Start the daemon with the operator console on a piped stdin.
    pub fn start_with_console(config: &Path) -> Self {
        let mut cmd = Self::command();
        cmd.arg("--config").arg(config);
        Self::spawn(cmd, true)
    }

    fn command() -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dd-worker-supervisor"));
        cmd.env_remove("DD_WS_CONFIG");
        cmd
    }

    fn spawn(mut cmd: Command, console: bool) -> Self {
        let mut child = cmd
            .stdin(if console { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start dd-worker-supervisor");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));

        // INFO and console replies go to stdout, WARN/ERROR to stderr.
        let stdout_thread = collect_lines(stdout, "daemon", Arc::clone(&log_lines));
        let stderr_thread = collect_lines(stderr, "daemon:err", Arc::clone(&log_lines));

        Self {
            stdin: child.stdin.take(),
            child,
            log_lines,
            _stdout_thread: stdout_thread,
            _stderr_thread: stderr_thread,
        }
    }

    /// Type a console line.
    pub fn send_line(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("console not enabled");
        writeln!(stdin, "{line}").expect("failed to write to daemon stdin");
        stdin.flush().expect("failed to flush daemon stdin");
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count_log_matches(pattern) > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn wait_for_log_default(&self, pattern: &str) -> bool {
        self.wait_for_log(pattern, DEFAULT_TIMEOUT)
    }

    pub fn count_log_matches(&self, pattern: &str) -> usize {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().filter(|l| l.contains(pattern)).count()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log_lines.lock().unwrap().clone()
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = i32::try_from(self.child.id()).expect("pid out of range");
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to daemon");
    }

    /// Send SIGTERM and wait for the daemon to exit.
    pub fn stop(&mut self) -> std::process::ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn wait_with_timeout(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check daemon status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed daemon");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// PIDs from "spawned (pid=NNN" log lines.
    pub fn spawned_pids(&self) -> Vec<u32> {
        let marker = "spawned (pid=";
        self.log_lines()
            .iter()
            .filter_map(|l| {
                let (_, rest) = l.split_once(marker)?;
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().ok()
            })
            .collect()
    }

    /// Wait for the first spawn and return its pid.
    pub fn wait_for_worker(&self) -> u32 {
        assert!(
            self.wait_for_log_default("spawned (pid="),
            "worker was never spawned"
        );
        self.spawned_pids()[0]
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Write `yaml` as the supervisor config in `dir` and return its path.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("worker-supervisor.yaml");
    std::fs::write(&path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

/// Config running `script` under `/bin/sh` with no artifact. `tag` ends up
/// in the worker's argv so parallel tests never share a command line.
pub fn sh_worker_config(script: &str, tag: &str) -> String {
    format!(
        "program: /bin/sh\nlaunch_args: [\"-c\", {script:?}, {tag:?}]\nartifact: null\n"
    )
}

pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(raw), None).is_ok()
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
