// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod command;
pub mod config;
pub mod console;
pub mod env;
mod errors;
pub mod fields;
mod monitor;
pub mod orphan;
pub mod params;
mod process;
pub mod schema;
pub mod shutdown;
mod state;
mod supervisor;

pub use command::{CommandBuilder, CommandLine};
pub use errors::SupervisorError;
pub use fields::{Artifact, ConfigurationSet, FieldSpec, FieldValue, Schema};
pub use monitor::MONITOR_INTERVAL;
pub use process::ExitReason;
pub use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownSignals};
pub use state::SupervisorState;
pub use supervisor::{GRACE_PERIOD, Started, StatusSnapshot, StopOutcome, Supervisor};
