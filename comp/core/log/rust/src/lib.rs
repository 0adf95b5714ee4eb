// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `log` backend that writes records in the agent's line format:
//!
//! ```text
//! 2026-01-02 15:04:05 UTC | WORKER-SUPERVISOR | INFO | (src/supervisor.rs:120 in dd_worker_supervisor::supervisor) | spawned (pid=42, ...)
//! ```
//!
//! INFO and below go to stdout, WARN and ERROR to stderr. When a log file is
//! configured every record is appended to it as well.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Error, Debug)]
pub enum InitError {
    #[error("could not open log file: {0}")]
    Io(#[from] io::Error),

    #[error("could not install logger: {0}")]
    SetLogger(#[from] SetLoggerError),
}

pub struct AgentLogger {
    component: String,
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl AgentLogger {
    pub fn new(component: &str, level: LevelFilter) -> Self {
        Self {
            component: component.to_uppercase(),
            level,
            file: None,
        }
    }

    /// Also append every record to `path`, creating it if needed.
    pub fn with_file(mut self, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(Mutex::new(file));
        Ok(self)
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Install as the global logger.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for AgentLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(&self.component, record, OffsetDateTime::now_utc());

        // Write errors on the standard streams are dropped: there is nowhere
        // left to report them.
        let _ = match record.level() {
            Level::Error | Level::Warn => writeln!(io::stderr().lock(), "{line}"),
            _ => writeln!(io::stdout().lock(), "{line}"),
        };

        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Render one record in the agent line format.
pub fn format_record(component: &str, record: &Record, now: OffsetDateTime) -> String {
    let timestamp = now
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        (Some(file), None) => file.to_string(),
        _ => "unknown".to_string(),
    };
    let module = record.module_path().unwrap_or("unknown");
    format!(
        "{timestamp} UTC | {component} | {level} | ({location} in {module}) | {args}",
        level = record.level(),
        args = record.args(),
    )
}

/// Install the agent logger writing to the standard streams only.
pub fn init(component: &str, level: Level) -> Result<(), SetLoggerError> {
    AgentLogger::new(component, level.to_level_filter()).install()
}

/// Install the agent logger, additionally appending to `path`.
pub fn init_with_file(component: &str, level: Level, path: &Path) -> Result<(), InitError> {
    AgentLogger::new(component, level.to_level_filter())
        .with_file(path)?
        .install()?;
    Ok(())
}
