// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A field write was rejected; the previous value is retained.
    #[error("invalid value for {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("worker already running")]
    AlreadyRunning,

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub(crate) fn configuration(field: &str, reason: impl Into<String>) -> Self {
        SupervisorError::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for precondition reports that leave the supervisor untouched.
    pub fn is_informational(&self) -> bool {
        matches!(self, SupervisorError::AlreadyRunning)
    }
}
