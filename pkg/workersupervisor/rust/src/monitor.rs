// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::ExitReason;
use crate::supervisor::{Inner, lock};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Background liveness checker. Lives as long as its supervisor and is
/// idle while nothing is tracked.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorHandle {
    /// Spawn on the current runtime. Fails when called outside of one.
    pub(crate) fn spawn(
        shared: Arc<Mutex<Inner>>,
        interval: Duration,
    ) -> Result<Self, TryCurrentError> {
        let runtime = Handle::try_current()?;
        let token = CancellationToken::new();
        let task = runtime.spawn(run(shared, interval, token.clone()));
        Ok(Self {
            token,
            task: Mutex::new(Some(task)),
        })
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait up to `window` for the task to finish. Returns false
    /// if it did not exit in time; it is abandoned in that case.
    pub(crate) async fn shutdown(&self, window: Duration) -> bool {
        self.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return true;
        };
        match tokio::time::timeout(window, task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("monitor task failed: {e}");
                true
            }
            Err(_) => {
                warn!(
                    "monitor did not exit within {}ms, abandoning it",
                    window.as_millis()
                );
                false
            }
        }
    }
}

async fn run(shared: Arc<Mutex<Inner>>, interval: Duration, token: CancellationToken) {
    info!("monitor started (interval={}ms)", interval.as_millis());
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Some(reason) = check(&shared) {
            debug!("monitor reconciled exit: {reason}");
        }
    }
    info!("monitor stopped");
}

/// One liveness check of the tracked worker.
pub(crate) fn check(shared: &Mutex<Inner>) -> Option<ExitReason> {
    lock(shared).poll_tracked().map(|(_, reason)| reason)
}
