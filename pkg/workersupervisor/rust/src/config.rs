// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::{LaunchEnvironment, parse_environment_file};
use crate::fields::{Artifact, ConfigurationSet, FieldValue};
use crate::schema;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/worker-supervisor.yaml";
const CONFIG_PATH_ENV: &str = "DD_WS_CONFIG";

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    schema::DEFAULT_PROGRAM.to_string()
}

fn default_launch_args() -> Vec<String> {
    schema::DEFAULT_LAUNCH_ARGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_artifact() -> Option<Artifact> {
    Some(Artifact::new(
        schema::DEFAULT_ARTIFACT_DIR,
        schema::DEFAULT_ARTIFACT_NAME,
    ))
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Initial value and enabled state for one schema field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverride {
    pub value: Option<FieldValue>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_launch_args")]
    pub launch_args: Vec<String>,
    /// `null` launches the program without an artifact.
    #[serde(default = "default_artifact")]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub environment_file: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldOverride>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            launch_args: default_launch_args(),
            artifact: default_artifact(),
            env: BTreeMap::new(),
            environment_file: None,
            working_dir: None,
            auto_start: true,
            log_level: default_log_level(),
            log_file: None,
            fields: BTreeMap::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn log_level(&self) -> Result<log::Level> {
        log::Level::from_str(&self.log_level)
            .with_context(|| format!("invalid log_level `{}`", self.log_level))
    }

    /// Build the initial configuration set over the Serval schema. Field
    /// overrides go through the same validation as runtime writes.
    pub fn configuration(&self) -> Result<ConfigurationSet> {
        let mut config = ConfigurationSet::new(&self.program, schema::serval())
            .context("invalid program")?
            .with_launch_args(self.launch_args.iter().cloned());
        if let Some(artifact) = &self.artifact {
            config = config
                .with_artifact(artifact.clone())
                .context("invalid artifact")?;
        }
        for (name, field) in &self.fields {
            if let Some(value) = &field.value {
                config
                    .set_value(name, value.clone())
                    .with_context(|| format!("field `{name}`"))?;
            }
            if let Some(enabled) = field.enabled {
                config
                    .set_enabled(name, enabled)
                    .with_context(|| format!("field `{name}`"))?;
            }
        }
        Ok(config)
    }

    /// Worker environment: `environment_file` first, then `env` on top.
    pub fn launch_environment(&self) -> Result<LaunchEnvironment> {
        let mut environment = LaunchEnvironment::default();
        if let Some(path) = &self.environment_file {
            environment = environment.with_vars(parse_environment_file(path)?);
        }
        environment = environment.with_vars(self.env.clone());
        if let Some(dir) = &self.working_dir {
            environment = environment.with_working_dir(dir);
        }
        Ok(environment)
    }
}

/// `cli`, else `DD_WS_CONFIG`, else the packaged default location.
pub fn config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Parse `path`. Returns `None` when the file does not exist.
pub fn load(path: &Path) -> Result<Option<SupervisorConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}
