// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::orphan::SweepReport;
use crate::supervisor::{StopOutcome, Supervisor};
use log::info;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::Duration;

/// How long the monitor gets to observe cancellation before teardown
/// moves on without it.
pub const MONITOR_EXIT_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub monitor_stopped: bool,
    pub worker: StopOutcome,
    pub sweep: SweepReport,
}

/// One-shot teardown of a supervisor: stop the monitor, kill the worker,
/// sweep orphans. Safe to trigger from several paths (signal, console,
/// normal exit); only the first call does any work.
pub struct ShutdownCoordinator {
    supervisor: Arc<Supervisor>,
    performed: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            performed: AtomicBool::new(false),
        }
    }

    pub fn is_performed(&self) -> bool {
        self.performed.load(Ordering::SeqCst)
    }

    /// Returns `None` when teardown already ran.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        if self.performed.swap(true, Ordering::SeqCst) {
            info!("cleanup already performed, skipping");
            return None;
        }
        info!("performing worker supervisor cleanup");

        let monitor_stopped = self.supervisor.stop_monitor(MONITOR_EXIT_WINDOW).await;
        let worker = self.supervisor.force_kill().await;
        let sweep = self.supervisor.sweep_orphans();

        info!(
            "cleanup complete (monitor_stopped={monitor_stopped}, worker={worker:?}, orphans_killed={})",
            sweep.killed().len()
        );
        Some(ShutdownReport {
            monitor_stopped,
            worker,
            sweep,
        })
    }
}

/// Termination signals that trigger supervisor teardown.
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Register handlers for SIGINT, SIGTERM and SIGQUIT. Must run inside a
    /// tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Wait for the next termination signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        }
    }
}
