// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Renders a [`ConfigurationSet`] into the worker command line.
//!
//! The result is a structured argv (program plus arguments) which is what
//! gets executed; the shell-quoted string form is only for display, length
//! accounting and orphan matching. Token order follows the schema
//! declaration order, never the order in which fields were written.

use crate::fields::{ConfigurationSet, FieldSpec, FieldValue};
use serde::Serialize;
use std::fmt;

pub const MAX_COMMAND_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    minimal: bool,
}

impl CommandLine {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            minimal: false,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// True when the full command exceeded the length limit and only the
    /// mandatory fields were kept.
    pub fn is_minimal(&self) -> bool {
        self.minimal
    }

    /// Shell-quoted single string.
    pub fn render(&self) -> String {
        self.argv().map(shell_quote).collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder {
    max_len: usize,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self {
            max_len: MAX_COMMAND_LENGTH,
        }
    }
}

impl CommandBuilder {
    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Pure function of `config`. Falls back to program, launch arguments,
    /// artifact and mandatory fields when the rendered command would exceed
    /// the length limit. Tokens are never cut, so the fallback itself may
    /// still be longer than the limit.
    pub fn build(&self, config: &ConfigurationSet) -> CommandLine {
        let full = assemble(config, |_| true);
        if full.render().len() <= self.max_len {
            return full;
        }
        let mut minimal = assemble(config, |spec| spec.mandatory);
        minimal.minimal = true;
        minimal
    }
}

/// Build with the default length limit.
pub fn build(config: &ConfigurationSet) -> CommandLine {
    CommandBuilder::default().build(config)
}

fn assemble(config: &ConfigurationSet, keep: impl Fn(&FieldSpec) -> bool) -> CommandLine {
    let mut args = config.launch_args().to_vec();
    if let Some(artifact) = config.artifact()
        && artifact.enabled
        && !artifact.file_name.is_empty()
    {
        args.push(artifact.path());
    }
    for (spec, field) in config.entries() {
        if keep(spec) && field.renders(spec) {
            args.push(match &field.value {
                FieldValue::Flag(_) => format!("--{}", spec.name),
                value => format!("--{}={value}", spec.name),
            });
        }
    }
    CommandLine::new(config.program(), args)
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%')
}

/// Quote `arg` for a POSIX shell. Safe strings pass through untouched;
/// anything else is single-quoted with embedded quotes written as `'\''`.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fields::tests::small_schema;
    use crate::fields::{Artifact, FieldSpec, Schema};
    use crate::schema;

    fn worker() -> ConfigurationSet {
        ConfigurationSet::new("/opt/worker/bin/worker", small_schema()).unwrap()
    }

    #[test]
    fn test_example_scenario() {
        let mut cfg = worker();
        cfg.set_field("port", 8081.into(), true).unwrap();
        cfg.set_field("poolSize", 524288.into(), true).unwrap();
        cfg.set_field("debugPath", "".into(), false).unwrap();
        assert_eq!(
            build(&cfg).render(),
            "/opt/worker/bin/worker --port=8081 --poolSize=524288"
        );
    }

    #[test]
    fn test_order_is_declared_order_not_write_order() {
        let mut a = worker();
        a.set_field("debugPath", "/tmp/d".into(), true).unwrap();
        a.set_field("poolSize", 7.into(), true).unwrap();
        a.set_field("port", 9000.into(), true).unwrap();

        let mut b = worker();
        b.set_field("port", 9000.into(), true).unwrap();
        b.set_field("poolSize", 7.into(), true).unwrap();
        b.set_field("debugPath", "/tmp/d".into(), true).unwrap();

        let expected = vec!["--port=9000", "--poolSize=7", "--debugPath=/tmp/d"];
        assert_eq!(build(&a).args(), expected.as_slice());
        assert_eq!(build(&a), build(&b));
        assert_eq!(build(&a).render(), build(&b).render());
    }

    #[test]
    fn test_disabled_and_default_fields_are_omitted() {
        let mut cfg = worker();
        cfg.set_field("port", 8081.into(), false).unwrap();
        cfg.set_field("poolSize", 0.into(), true).unwrap();
        cfg.set_field("debugPath", "/tmp/d".into(), false).unwrap();
        cfg.set_field("verbose", false.into(), true).unwrap();
        let cmd = build(&cfg);
        assert!(cmd.args().is_empty(), "got {:?}", cmd.args());
        assert_eq!(cmd.render(), "/opt/worker/bin/worker");
    }

    #[test]
    fn test_enabled_field_appears_exactly_once() {
        let mut cfg = worker();
        cfg.set_field("poolSize", 3.into(), true).unwrap();
        cfg.set_field("poolSize", 4.into(), true).unwrap();
        let rendered = build(&cfg).render();
        assert_eq!(rendered.matches("--poolSize").count(), 1);
        assert!(rendered.contains("--poolSize=4"));
    }

    #[test]
    fn test_flags_render_bare() {
        let mut cfg = worker();
        cfg.set_field("verbose", true.into(), true).unwrap();
        assert_eq!(build(&cfg).args(), ["--port=8081", "--verbose"]);
        cfg.set_field("verbose", true.into(), false).unwrap();
        assert_eq!(build(&cfg).args(), ["--port=8081"]);
    }

    #[test]
    fn test_autodiscover_is_suppressed() {
        let schema = Schema::new(vec![FieldSpec::text("net", "NET", "Net", "autodiscover").enabled(true)]);
        let mut cfg = ConfigurationSet::new("w", schema).unwrap();
        assert!(build(&cfg).args().is_empty());
        cfg.set_value("net", "eth0".into()).unwrap();
        assert_eq!(build(&cfg).args(), ["--net=eth0"]);
    }

    #[test]
    fn test_launch_args_and_artifact_precede_flags() {
        let cfg = worker()
            .with_launch_args(["-jar"])
            .with_artifact(Artifact::new("/opt/asi", "serval.jar"))
            .unwrap();
        let cmd = build(&cfg);
        assert_eq!(cmd.program(), "/opt/worker/bin/worker");
        assert_eq!(cmd.args(), ["-jar", "/opt/asi/serval.jar", "--port=8081"]);
    }

    #[test]
    fn test_disabled_artifact_is_skipped() {
        let mut cfg = worker()
            .with_artifact(Artifact::new("/opt/asi", "serval.jar"))
            .unwrap();
        cfg.set_artifact_enabled(false);
        assert_eq!(build(&cfg).args(), ["--port=8081"]);
    }

    #[test]
    fn test_overlong_command_falls_back_to_mandatory_fields() {
        let mut cfg = worker();
        cfg.set_field("debugPath", "x".repeat(200).as_str().into(), true)
            .unwrap();
        cfg.set_field("poolSize", 12.into(), true).unwrap();

        let cmd = CommandBuilder::with_max_len(64).build(&cfg);
        assert!(cmd.is_minimal());
        assert_eq!(cmd.args(), ["--port=8081"]);

        let cmd = CommandBuilder::default().build(&cfg);
        assert!(!cmd.is_minimal());
        assert_eq!(cmd.args().len(), 3);
    }

    #[test]
    fn test_fallback_keeps_mandatory_tokens_past_the_limit() {
        let program = format!("/opt/{}/bin/worker", "p".repeat(90));
        let cfg = ConfigurationSet::new(&program, small_schema())
            .unwrap()
            .with_launch_args(["-Xmx2g"]);

        let cmd = CommandBuilder::with_max_len(64).build(&cfg);
        assert!(cmd.is_minimal());
        assert_eq!(cmd.program(), program);
        assert_eq!(cmd.args(), ["-Xmx2g", "--port=8081"]);
        assert!(cmd.render().len() > 64);
    }

    #[test]
    fn test_serval_defaults_render() {
        let cfg = schema::default_configuration().unwrap();
        assert_eq!(
            build(&cfg).render(),
            "java -jar ../../ASI/serval-4.1.1-rc1.jar --httpPort=8081 --resourcePoolSize=524288"
        );
    }

    #[test]
    fn test_serval_tcp_port_only_when_not_worker_default() {
        let mut cfg = schema::default_configuration().unwrap();
        cfg.set_value("tcpPort", 50001.into()).unwrap();
        cfg.set_field("releaseResources", true.into(), true).unwrap();
        assert!(
            build(&cfg)
                .render()
                .ends_with("--resourcePoolSize=524288 --tcpPort=50001 --releaseResources")
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("--port=8081"), "--port=8081");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_render_quotes_text_values() {
        let mut cfg = worker();
        cfg.set_field("debugPath", "/tmp/my dir".into(), true).unwrap();
        assert_eq!(
            build(&cfg).render(),
            "/opt/worker/bin/worker --port=8081 '--debugPath=/tmp/my dir'"
        );
    }
}
