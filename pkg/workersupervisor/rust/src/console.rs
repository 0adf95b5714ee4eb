// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Line-oriented operator console over the parameter registry.

use crate::params::{ParamRegistry, START};
use crate::supervisor::StopOutcome;
use log::debug;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const HELP: &str = "commands: start | stop | kill | set <PARAM> <value> | get <PARAM> | \
                        params | status | info | sweep | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Kill,
    Set { param: String, value: String },
    Get { param: String },
    Params,
    Status,
    Info,
    Sweep,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    /// Input closed.
    Eof,
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(v, r)| (v, r.trim()));

    let no_args = |cmd: ConsoleCommand| {
        if rest.is_empty() {
            Ok(Some(cmd))
        } else {
            Err(format!("usage: {verb} takes no arguments"))
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "start" => no_args(ConsoleCommand::Start),
        "stop" => no_args(ConsoleCommand::Stop),
        "kill" => no_args(ConsoleCommand::Kill),
        "params" => no_args(ConsoleCommand::Params),
        "status" => no_args(ConsoleCommand::Status),
        "info" => no_args(ConsoleCommand::Info),
        "sweep" => no_args(ConsoleCommand::Sweep),
        "help" | "?" => no_args(ConsoleCommand::Help),
        "quit" | "exit" => no_args(ConsoleCommand::Quit),
        "get" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [param] => Ok(Some(ConsoleCommand::Get {
                param: param.to_string(),
            })),
            _ => Err("usage: get <PARAM>".to_string()),
        },
        "set" => match rest.split_once(char::is_whitespace) {
            Some((param, value)) => Ok(Some(ConsoleCommand::Set {
                param: param.to_string(),
                value: unquote(value.trim()).to_string(),
            })),
            None => Err("usage: set <PARAM> <value>".to_string()),
        },
        _ => Err(format!("unknown command `{verb}`; {HELP}")),
    }
}

/// Run `cmd` and return the reply shown to the operator.
pub async fn execute(cmd: &ConsoleCommand, registry: &ParamRegistry) -> String {
    let supervisor = registry.supervisor();
    match cmd {
        ConsoleCommand::Start => reply(registry.write(START, "1").await),
        ConsoleCommand::Stop => reply(registry.write(START, "0").await),
        ConsoleCommand::Kill => match supervisor.force_kill().await {
            StopOutcome::NotRunning => "Process already stopped - kill request ignored".to_string(),
            outcome => outcome.message().to_string(),
        },
        ConsoleCommand::Set { param, value } => reply(registry.write(param, value).await),
        ConsoleCommand::Get { param } => match registry.read(param) {
            Ok(value) => format!("{param} = {value}"),
            Err(e) => format!("error: {e}"),
        },
        ConsoleCommand::Params => registry
            .names()
            .iter()
            .map(|name| match registry.read(name) {
                Ok(value) => format!("{name} = {value}"),
                Err(e) => format!("{name}: {e}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ConsoleCommand::Status => serde_json::to_string(&supervisor.get_state())
            .unwrap_or_else(|e| format!("error: cannot encode status: {e}")),
        ConsoleCommand::Info => supervisor.describe(),
        ConsoleCommand::Sweep => supervisor.sweep_orphans().message(),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "bye".to_string(),
    }
}

fn reply<E: std::fmt::Display>(result: Result<String, E>) -> String {
    match result {
        Ok(message) => message,
        Err(e) => format!("error: {e}"),
    }
}

/// Serve commands from `input` until `quit` or end of input.
pub async fn run<R, W>(input: R, mut output: W, registry: &ParamRegistry) -> io::Result<ConsoleExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let response = match parse(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => return Ok(ConsoleExit::Quit),
            Ok(Some(cmd)) => {
                debug!("console: {cmd:?}");
                execute(&cmd, registry).await
            }
            Err(usage) => usage,
        };
        output.write_all(response.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(ConsoleExit::Eof)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::fields::tests::small_schema;
    use crate::fields::ConfigurationSet;
    use crate::supervisor::Supervisor;
    use std::sync::Arc;
    use tokio::io::BufReader;

    fn registry(script: &str) -> ParamRegistry {
        let cfg = ConfigurationSet::new("/bin/sh", small_schema())
            .unwrap()
            .with_launch_args(["-c", script, "worker"]);
        ParamRegistry::new(Arc::new(Supervisor::new(cfg)))
    }

    #[test]
    fn test_parse_simple_verbs() {
        assert_eq!(parse("start").unwrap(), Some(ConsoleCommand::Start));
        assert_eq!(parse("  STOP  ").unwrap(), Some(ConsoleCommand::Stop));
        assert_eq!(parse("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_set_keeps_spaces_in_value() {
        assert_eq!(
            parse("set HTTP_LOG /var/log/my worker.log").unwrap(),
            Some(ConsoleCommand::Set {
                param: "HTTP_LOG".into(),
                value: "/var/log/my worker.log".into(),
            })
        );
        assert_eq!(
            parse(r#"set HTTP_LOG """#).unwrap(),
            Some(ConsoleCommand::Set {
                param: "HTTP_LOG".into(),
                value: String::new(),
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("set HTTP_PORT").unwrap_err().starts_with("usage: set"));
        assert!(parse("get").unwrap_err().starts_with("usage: get"));
        assert!(parse("get A B").is_err());
        assert!(parse("start now").is_err());
        assert!(parse("reboot").unwrap_err().contains("unknown command"));
    }

    #[tokio::test]
    async fn test_execute_get_and_set() {
        let reg = registry("sleep 60");
        let set = ConsoleCommand::Set {
            param: "POOL_SIZE".into(),
            value: "12".into(),
        };
        assert_eq!(execute(&set, &reg).await, "Pool size updated successfully");
        let get = ConsoleCommand::Get {
            param: "POOL_SIZE".into(),
        };
        assert_eq!(execute(&get, &reg).await, "POOL_SIZE = 12");
        let bad = ConsoleCommand::Get {
            param: "NOPE".into(),
        };
        assert_eq!(execute(&bad, &reg).await, "error: unknown field: NOPE");
    }

    #[tokio::test]
    async fn test_execute_params_lists_everything() {
        let reg = registry("sleep 60");
        let out = execute(&ConsoleCommand::Params, &reg).await;
        assert!(out.starts_with("PORT = 8081\nPORT_ENABLE = 1\n"));
        assert!(out.contains("PROCESS_ID = 0"));
    }

    #[tokio::test]
    async fn test_execute_status_is_json() {
        let reg = registry("sleep 60");
        let out = execute(&ConsoleCommand::Status, &reg).await;
        let status: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(status["state"], "stopped");
        assert!(status["pid"].is_null());
    }

    #[tokio::test]
    async fn test_run_script() {
        let reg = registry("sleep 60");
        let script = b"start\nstart\nstatus\nkill\nbogus\nquit\nstart\n";
        let mut out = Vec::new();
        let exit = run(BufReader::new(&script[..]), &mut out, &reg).await.unwrap();
        assert_eq!(exit, ConsoleExit::Quit);

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Process started successfully");
        assert_eq!(lines[1], "Process already running - start request ignored");
        assert!(lines[2].contains(r#""state":"running""#));
        assert_eq!(lines[3], "Process force killed");
        assert!(lines[4].starts_with("unknown command `bogus`"));
        assert_eq!(lines.len(), 5, "nothing after quit is executed");
        assert!(!reg.supervisor().get_state().state.has_process());
    }

    #[tokio::test]
    async fn test_run_until_eof() {
        let reg = registry("sleep 60");
        let mut out = Vec::new();
        let exit = run(BufReader::new(&b"help\n"[..]), &mut out, &reg).await.unwrap();
        assert_eq!(exit, ConsoleExit::Eof);
        assert_eq!(String::from_utf8(out).unwrap().trim_end(), HELP);
    }
}
