// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Named parameters an operator reads and writes.
//!
//! Every schema field is exposed under its parameter name, plus a
//! `<NAME>_ENABLE` switch for fields that have one. The artifact, the
//! start/stop switch and the read-only status values follow. Each write
//! publishes a status message on the supervisor.

use crate::errors::SupervisorError;
use crate::fields::{FieldKind, FieldValue, Schema};
use crate::supervisor::{StopOutcome, Supervisor};
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const ARTIFACT_NAME: &str = "ARTIFACT_NAME";
pub const ARTIFACT_DIR: &str = "ARTIFACT_DIR";
pub const ARTIFACT_ENABLE: &str = "ARTIFACT_ENABLE";
/// Full artifact path, read back.
pub const ARTIFACT_RBV: &str = "ARTIFACT_RBV";
pub const START: &str = "START";
pub const STATUS: &str = "STATUS";
pub const PROCESS_ID: &str = "PROCESS_ID";
pub const COMMAND_LINE: &str = "COMMAND_LINE";
pub const ERROR_MSG: &str = "ERROR_MSG";

const ENABLE_SUFFIX: &str = "_ENABLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Param {
    Value { field: String },
    Enable { field: String },
    ArtifactName,
    ArtifactDir,
    ArtifactEnable,
    ArtifactPath,
    Start,
    Status,
    ProcessId,
    CommandLine,
    ErrorMsg,
}

impl Param {
    fn resolve(schema: &Schema, name: &str) -> Option<Param> {
        let fixed = match name {
            ARTIFACT_NAME => Some(Param::ArtifactName),
            ARTIFACT_DIR => Some(Param::ArtifactDir),
            ARTIFACT_ENABLE => Some(Param::ArtifactEnable),
            ARTIFACT_RBV => Some(Param::ArtifactPath),
            START => Some(Param::Start),
            STATUS => Some(Param::Status),
            PROCESS_ID => Some(Param::ProcessId),
            COMMAND_LINE => Some(Param::CommandLine),
            ERROR_MSG => Some(Param::ErrorMsg),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }
        if let Some(spec) = schema.by_param(name) {
            return Some(Param::Value {
                field: spec.name.clone(),
            });
        }
        let spec = schema.by_param(name.strip_suffix(ENABLE_SUFFIX)?)?;
        spec.toggle.then(|| Param::Enable {
            field: spec.name.clone(),
        })
    }
}

/// Parse an operator switch value.
fn parse_switch(name: &str, raw: &str) -> Result<bool, SupervisorError> {
    match raw.trim() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(SupervisorError::configuration(
            name,
            format!("`{other}` is not 0 or 1"),
        )),
    }
}

fn switch_message(label: &str, on: bool) -> String {
    format!("{label} {}", if on { "enabled" } else { "disabled" })
}

pub struct ParamRegistry {
    supervisor: Arc<Supervisor>,
}

impl ParamRegistry {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// All parameter names, fields first in declared order.
    pub fn names(&self) -> Vec<String> {
        let config = self.supervisor.snapshot();
        let mut names = Vec::new();
        for spec in config.schema().iter() {
            names.push(spec.param.clone());
            if spec.toggle {
                names.push(format!("{}{ENABLE_SUFFIX}", spec.param));
            }
        }
        names.extend(
            [
                ARTIFACT_NAME,
                ARTIFACT_DIR,
                ARTIFACT_ENABLE,
                ARTIFACT_RBV,
                START,
                STATUS,
                PROCESS_ID,
                COMMAND_LINE,
                ERROR_MSG,
            ]
            .map(str::to_string),
        );
        names
    }

    fn resolve(&self, name: &str) -> Result<Param, SupervisorError> {
        let config = self.supervisor.snapshot();
        Param::resolve(config.schema(), name)
            .ok_or_else(|| SupervisorError::UnknownField(name.to_string()))
    }

    pub fn read(&self, name: &str) -> Result<ParamValue, SupervisorError> {
        let param = self.resolve(name)?;
        let config = self.supervisor.snapshot();
        let artifact = config.artifact();
        let value = match param {
            Param::Value { field } => match config.field(&field).map(|f| &f.value) {
                Some(FieldValue::Integer(v)) => ParamValue::Int(*v),
                Some(FieldValue::Flag(on)) => ParamValue::Int(i64::from(*on)),
                Some(FieldValue::Text(s)) => ParamValue::Text(s.clone()),
                None => return Err(SupervisorError::UnknownField(field)),
            },
            Param::Enable { field } => match config.field(&field) {
                Some(f) => ParamValue::Int(i64::from(f.enabled)),
                None => return Err(SupervisorError::UnknownField(field)),
            },
            Param::ArtifactName => {
                ParamValue::Text(artifact.map(|a| a.file_name.clone()).unwrap_or_default())
            }
            Param::ArtifactDir => ParamValue::Text(artifact.map(|a| a.dir.clone()).unwrap_or_default()),
            Param::ArtifactEnable => ParamValue::Int(i64::from(artifact.is_some_and(|a| a.enabled))),
            Param::ArtifactPath => ParamValue::Text(
                artifact
                    .filter(|a| !a.file_name.is_empty())
                    .map(|a| a.path())
                    .unwrap_or_default(),
            ),
            Param::Start => {
                ParamValue::Int(i64::from(!self.supervisor.get_state().state.can_start()))
            }
            Param::Status => ParamValue::Int(self.supervisor.get_state().state.code()),
            Param::ProcessId => {
                ParamValue::Text(self.supervisor.get_state().pid.unwrap_or(0).to_string())
            }
            Param::CommandLine => {
                ParamValue::Text(self.supervisor.get_state().command_line.unwrap_or_default())
            }
            Param::ErrorMsg => ParamValue::Text(self.supervisor.get_state().last_message),
        };
        Ok(value)
    }

    /// Apply an operator write and return the published message.
    ///
    /// `START` writes drive the lifecycle: 1 starts, 0 stops (awaiting the
    /// grace period). Redundant requests are reported, not failed.
    pub async fn write(&self, name: &str, raw: &str) -> Result<String, SupervisorError> {
        debug!("write {name}={raw}");
        let result = match self.resolve(name)? {
            Param::Value { field } => self.write_value(&field, raw),
            Param::Enable { field } => self.write_enable(name, &field, raw),
            Param::ArtifactName => self
                .supervisor
                .configure(|c| c.set_artifact_name(raw.trim()))
                .map(|()| "Artifact name updated successfully".to_string()),
            Param::ArtifactDir => self
                .supervisor
                .configure(|c| c.set_artifact_dir(raw.trim()))
                .map(|()| "Artifact directory updated successfully".to_string()),
            Param::ArtifactEnable => parse_switch(name, raw).and_then(|on| {
                self.supervisor.configure(|c| {
                    c.set_artifact_enabled(on);
                    Ok(switch_message("Artifact", on))
                })
            }),
            Param::Start => return self.write_start(name, raw).await,
            Param::ArtifactPath
            | Param::Status
            | Param::ProcessId
            | Param::CommandLine
            | Param::ErrorMsg => Err(SupervisorError::configuration(name, "parameter is read-only")),
        };

        match result {
            Ok(message) => {
                self.supervisor.publish(message.clone());
                Ok(message)
            }
            Err(e) => {
                // Launch failures already published their own message.
                if !matches!(e, SupervisorError::Launch { .. }) {
                    self.supervisor.publish(e.to_string());
                }
                Err(e)
            }
        }
    }

    fn write_value(&self, field: &str, raw: &str) -> Result<String, SupervisorError> {
        self.supervisor.configure(|c| {
            let spec = c
                .schema()
                .get(field)
                .ok_or_else(|| SupervisorError::UnknownField(field.to_string()))?;
            let label = spec.label.clone();
            let value = spec.parse_value(raw)?;
            let message = match (&spec.kind, &value) {
                (FieldKind::Flag, FieldValue::Flag(on)) => switch_message(&label, *on),
                _ => format!("{label} updated successfully"),
            };
            c.set_value(field, value)?;
            Ok(message)
        })
    }

    fn write_enable(&self, name: &str, field: &str, raw: &str) -> Result<String, SupervisorError> {
        let on = parse_switch(name, raw)?;
        self.supervisor.configure(|c| {
            let label = c
                .schema()
                .get(field)
                .map(|s| s.label.clone())
                .unwrap_or_else(|| field.to_string());
            c.set_enabled(field, on)?;
            Ok(switch_message(&label, on))
        })
    }

    /// Lifecycle outcomes are published by the supervisor itself, which
    /// skips a stale stop result once a newer instance is running. Only the
    /// ignored-request and parse error messages are published here.
    async fn write_start(&self, name: &str, raw: &str) -> Result<String, SupervisorError> {
        let on = parse_switch(name, raw).inspect_err(|e| self.supervisor.publish(e.to_string()))?;
        if on {
            return match self.supervisor.start() {
                Ok(started) => {
                    info!("started worker (pid={}) on operator request", started.pid);
                    Ok("Process started successfully".to_string())
                }
                Err(SupervisorError::AlreadyRunning) => {
                    Ok(self.ignored("Process already running - start request ignored"))
                }
                Err(e) => Err(e),
            };
        }
        Ok(match self.supervisor.stop().await {
            StopOutcome::NotRunning => self.ignored("Process already stopped - stop request ignored"),
            outcome => outcome.message().to_string(),
        })
    }

    fn ignored(&self, message: &str) -> String {
        self.supervisor.publish(message);
        message.to_string()
    }
}
