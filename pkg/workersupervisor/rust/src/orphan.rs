// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Best-effort cleanup of worker instances that escaped tracking, for
//! example after a previous supervisor crashed.
//!
//! Candidates are found by scanning `/proc/<pid>/cmdline`. The exact match
//! compares the whole argv with the last launched command. The fallback
//! requires both the program's file name as argv[0] and the launched
//! artifact's file name as one of the arguments, so unrelated processes
//! running the same interpreter are left alone.

use crate::command::CommandLine;
use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// procfs mount point, `HOST_PROC` when set.
pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }
        "/proc".into()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: i32,
    pub argv: Vec<String>,
}

/// Parse the NUL separated contents of a cmdline file. Trailing NULs are
/// dropped; an empty result means a kernel thread or a zombie.
fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .split_terminator('\0')
        .map(str::to_string)
        .collect()
}

/// Every process under `root` with a non-empty command line. Processes
/// that vanish mid-scan are skipped.
pub fn scan(root: &Path) -> Vec<ProcEntry> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read {}: {e}", root.display());
            return Vec::new();
        }
    };

    let mut procs: Vec<ProcEntry> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(|pid| {
            let raw = fs::read(root.join(pid.to_string()).join("cmdline")).ok()?;
            let argv = parse_cmdline(&raw);
            (!argv.is_empty()).then_some(ProcEntry { pid, argv })
        })
        .collect();
    procs.sort_by_key(|p| p.pid);
    procs
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

pub fn exact_matches(procs: &[ProcEntry], command: &CommandLine) -> Vec<i32> {
    procs
        .iter()
        .filter(|p| p.argv.iter().map(String::as_str).eq(command.argv()))
        .map(|p| p.pid)
        .collect()
}

pub fn loose_matches(procs: &[ProcEntry], program: &str, identifier: &str) -> Vec<i32> {
    let program = file_name(program);
    procs
        .iter()
        .filter(|p| {
            let mut argv = p.argv.iter();
            argv.next().is_some_and(|arg0| file_name(arg0) == program)
                && argv.any(|arg| file_name(arg) == identifier)
        })
        .map(|p| p.pid)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SweepReport {
    /// Nothing to match against: no launch recorded and no artifact.
    Skipped,
    NothingMatched,
    Exact { killed: Vec<i32> },
    Loose { killed: Vec<i32> },
}

impl SweepReport {
    pub fn killed(&self) -> &[i32] {
        match self {
            SweepReport::Exact { killed } | SweepReport::Loose { killed } => killed,
            SweepReport::Skipped | SweepReport::NothingMatched => &[],
        }
    }

    pub fn message(&self) -> String {
        match self {
            SweepReport::Skipped => "Orphan sweep skipped, no worker command known".to_string(),
            SweepReport::NothingMatched => "No orphaned worker processes found".to_string(),
            SweepReport::Exact { killed } => {
                format!("Killed orphaned worker processes {killed:?} (exact command match)")
            }
            SweepReport::Loose { killed } => {
                format!("Killed orphaned worker processes {killed:?} (artifact match)")
            }
        }
    }
}

fn kill_all(pids: &[i32]) -> Vec<i32> {
    pids.iter()
        .copied()
        .filter(|&pid| match signal::kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => {
                debug!("[pid={pid}] orphan killed");
                true
            }
            Err(e) => {
                warn!("[pid={pid}] failed to kill orphan: {e}");
                false
            }
        })
        .collect()
}

/// Kill processes under `root` matching the last launched `command`, or,
/// when none of those could be killed, `program` running the artifact
/// `identifier`. Pids in `exclude` are never touched.
pub fn sweep(
    root: &Path,
    command: Option<&CommandLine>,
    program: &str,
    identifier: Option<&str>,
    exclude: &[u32],
) -> SweepReport {
    if command.is_none() && identifier.is_none() {
        return SweepReport::Skipped;
    }

    let procs: Vec<ProcEntry> = scan(root)
        .into_iter()
        .filter(|p| !u32::try_from(p.pid).is_ok_and(|pid| exclude.contains(&pid)))
        .collect();

    if let Some(command) = command {
        let killed = kill_all(&exact_matches(&procs, command));
        if !killed.is_empty() {
            return SweepReport::Exact { killed };
        }
    }
    if let Some(identifier) = identifier {
        let killed = kill_all(&loose_matches(&procs, program, identifier));
        if !killed.is_empty() {
            return SweepReport::Loose { killed };
        }
    }
    SweepReport::NothingMatched
}
