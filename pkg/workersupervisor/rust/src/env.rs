// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Extra variables and working directory applied to every worker launch.
/// The supervisor's own environment is inherited underneath.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnvironment {
    vars: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl LaunchEnvironment {
    /// Later entries win over earlier ones with the same key.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub(crate) fn apply(&self, cmd: &mut Command) {
        cmd.envs(self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
    }
}

/// Read `KEY=VALUE` pairs from an env file, in file order. Values may be
/// single or double quoted; `#` lines and lines without `=` are ignored.
pub fn parse_environment_file(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading environment file: {}", path.display()))?;
    let vars = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, raw)| {
            let val = raw.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), val.to_string())
        })
        .collect();
    Ok(vars)
}
