// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    /// No worker tracked.
    Stopped,
    /// Launch in progress.
    Starting,
    /// Worker is alive.
    Running,
    /// Graceful termination requested, waiting for exit.
    Stopping,
    /// Last launch failed. A new start may be issued.
    Failed,
}

impl SupervisorState {
    pub fn can_start(self) -> bool {
        matches!(self, SupervisorState::Stopped | SupervisorState::Failed)
    }

    /// A worker process is tracked in this state.
    pub fn has_process(self) -> bool {
        matches!(self, SupervisorState::Running | SupervisorState::Stopping)
    }

    /// Numeric code published on the `STATUS` parameter.
    pub fn code(self) -> i64 {
        match self {
            SupervisorState::Stopped => 0,
            SupervisorState::Running => 1,
            SupervisorState::Starting => 2,
            SupervisorState::Stopping => 3,
            SupervisorState::Failed => 4,
        }
    }

    pub(crate) fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Failed, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Stopped => write!(f, "stopped"),
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Stopping => write!(f, "stopping"),
            SupervisorState::Failed => write!(f, "failed"),
        }
    }
}
