// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launch parameters of the worker.
//!
//! A [`Schema`] declares the tunable fields in the order they are rendered on
//! the command line. A [`ConfigurationSet`] holds the current value and
//! enabled flag of each declared field, along with the program, the fixed
//! launch arguments and the optional launched artifact. Every write is
//! validated against the schema before it is applied.

use crate::errors::SupervisorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Text sentinel meaning "let the worker discover it".
pub const AUTODISCOVER: &str = "autodiscover";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Values that mean "use the worker default": `0` (and below), the
    /// empty string, [`AUTODISCOVER`] and `false`.
    pub fn is_sentinel(&self) -> bool {
        match self {
            FieldValue::Flag(on) => !on,
            FieldValue::Integer(v) => *v <= 0,
            FieldValue::Text(s) => s.is_empty() || s == AUTODISCOVER,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(on) => write!(f, "{on}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Flag(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer { min: i64, max: i64 },
    Text,
    /// Rendered as a bare `--name` when true.
    Flag,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Flag name on the worker command line (`--name=value`).
    pub name: String,
    /// Name under which the parameter registry exposes the value.
    pub param: String,
    /// Human readable label used in status messages.
    pub label: String,
    pub kind: FieldKind,
    pub default: FieldValue,
    pub default_enabled: bool,
    /// Value the worker assumes on its own; never rendered.
    pub worker_default: Option<FieldValue>,
    /// Kept in the minimal fallback command.
    pub mandatory: bool,
    /// Whether the field has an enable switch separate from its value.
    pub toggle: bool,
}

impl FieldSpec {
    fn new(name: &str, param: &str, label: &str, kind: FieldKind, default: FieldValue) -> Self {
        Self {
            name: name.to_string(),
            param: param.to_string(),
            label: label.to_string(),
            kind,
            default,
            default_enabled: false,
            worker_default: None,
            mandatory: false,
            toggle: true,
        }
    }

    pub fn integer(name: &str, param: &str, label: &str, default: i64) -> Self {
        Self::new(
            name,
            param,
            label,
            FieldKind::Integer {
                min: 0,
                max: i64::from(i32::MAX),
            },
            FieldValue::Integer(default),
        )
    }

    pub fn text(name: &str, param: &str, label: &str, default: &str) -> Self {
        Self::new(name, param, label, FieldKind::Text, FieldValue::Text(default.into()))
    }

    /// Boolean switch. Flags carry no separate enable toggle: the value is
    /// the switch.
    pub fn flag(name: &str, param: &str, label: &str) -> Self {
        let mut spec = Self::new(name, param, label, FieldKind::Flag, FieldValue::Flag(false));
        spec.default_enabled = true;
        spec.toggle = false;
        spec
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.kind = FieldKind::Integer { min, max };
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.default_enabled = enabled;
        self
    }

    pub fn worker_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.worker_default = Some(value.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    fn validate(&self, value: &FieldValue) -> Result<(), SupervisorError> {
        match (self.kind, value) {
            (FieldKind::Integer { min, max }, FieldValue::Integer(v)) => {
                if *v < min || *v > max {
                    return Err(SupervisorError::configuration(
                        &self.name,
                        format!("{v} is outside {min}..={max}"),
                    ));
                }
                Ok(())
            }
            (FieldKind::Text, FieldValue::Text(s)) => {
                if s.contains('\0') {
                    return Err(SupervisorError::configuration(
                        &self.name,
                        "value contains a NUL byte",
                    ));
                }
                Ok(())
            }
            (FieldKind::Flag, FieldValue::Flag(_)) => Ok(()),
            (kind, value) => Err(SupervisorError::configuration(
                &self.name,
                format!("expected {}, got `{value}`", kind_name(kind)),
            )),
        }
    }

    /// Parse a raw operator string into a value of this field's kind.
    pub fn parse_value(&self, raw: &str) -> Result<FieldValue, SupervisorError> {
        let raw = raw.trim();
        let value = match self.kind {
            FieldKind::Integer { .. } => raw.parse::<i64>().map(FieldValue::Integer).map_err(|e| {
                SupervisorError::configuration(&self.name, format!("`{raw}` is not an integer: {e}"))
            })?,
            FieldKind::Flag => match raw {
                "1" | "true" | "on" | "yes" => FieldValue::Flag(true),
                "0" | "false" | "off" | "no" => FieldValue::Flag(false),
                _ => {
                    return Err(SupervisorError::configuration(
                        &self.name,
                        format!("`{raw}` is not a boolean"),
                    ));
                }
            },
            FieldKind::Text => FieldValue::Text(raw.to_string()),
        };
        self.validate(&value)?;
        Ok(value)
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer { .. } => "an integer",
        FieldKind::Text => "a string",
        FieldKind::Flag => "a boolean",
    }
}

/// Ordered field declarations. Order is the command line order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn by_param(&self, param: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.param == param)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationField {
    pub name: String,
    pub value: FieldValue,
    pub enabled: bool,
}

impl ConfigurationField {
    /// Whether the field contributes a token to the command line.
    pub fn renders(&self, spec: &FieldSpec) -> bool {
        self.enabled
            && !self.value.is_sentinel()
            && spec.worker_default.as_ref() != Some(&self.value)
    }
}

/// The launched artifact (for example a jar), passed right after the
/// launch arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub dir: String,
    pub file_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Artifact {
    pub fn new(dir: &str, file_name: &str) -> Self {
        Self {
            dir: dir.to_string(),
            file_name: file_name.to_string(),
            enabled: true,
        }
    }

    /// `dir` and `file_name` joined, adding a separator only when `dir`
    /// does not already end with one.
    pub fn path(&self) -> String {
        let mut path = self.dir.clone();
        if !path.is_empty() && !path.ends_with('/') && !path.ends_with('\\') {
            path.push('/');
        }
        path.push_str(&self.file_name);
        path
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationSet {
    program: String,
    launch_args: Vec<String>,
    artifact: Option<Artifact>,
    schema: Arc<Schema>,
    fields: Vec<ConfigurationField>,
}

impl ConfigurationSet {
    /// All fields start at their declared default and enabled state.
    pub fn new(program: &str, schema: Schema) -> Result<Self, SupervisorError> {
        require_non_empty("program", program)?;
        let fields = schema
            .iter()
            .map(|spec| ConfigurationField {
                name: spec.name.clone(),
                value: spec.default.clone(),
                enabled: spec.default_enabled,
            })
            .collect();
        Ok(Self {
            program: program.to_string(),
            launch_args: Vec::new(),
            artifact: None,
            schema: Arc::new(schema),
            fields,
        })
    }

    pub fn with_launch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Result<Self, SupervisorError> {
        require_non_empty("artifact dir", &artifact.dir)?;
        require_non_empty("artifact name", &artifact.file_name)?;
        self.artifact = Some(artifact);
        Ok(self)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn field(&self, name: &str) -> Option<&ConfigurationField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields with their declarations, in declared order.
    pub fn entries(&self) -> impl Iterator<Item = (&FieldSpec, &ConfigurationField)> {
        self.schema.iter().zip(self.fields.iter())
    }

    pub fn set_program(&mut self, program: &str) -> Result<(), SupervisorError> {
        require_non_empty("program", program)?;
        self.program = program.to_string();
        Ok(())
    }

    /// Replace value and enabled flag together. Rejected writes leave the
    /// field untouched.
    pub fn set_field(
        &mut self,
        name: &str,
        value: FieldValue,
        enabled: bool,
    ) -> Result<(), SupervisorError> {
        let idx = self.index_of(name)?;
        self.validate(idx, &value)?;
        if let Some(field) = self.fields.get_mut(idx) {
            field.value = value;
            field.enabled = enabled;
        }
        Ok(())
    }

    pub fn set_value(&mut self, name: &str, value: FieldValue) -> Result<(), SupervisorError> {
        let idx = self.index_of(name)?;
        self.validate(idx, &value)?;
        if let Some(field) = self.fields.get_mut(idx) {
            field.value = value;
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), SupervisorError> {
        let idx = self.index_of(name)?;
        if let Some(field) = self.fields.get_mut(idx) {
            field.enabled = enabled;
        }
        Ok(())
    }

    pub fn set_artifact_dir(&mut self, dir: &str) -> Result<(), SupervisorError> {
        require_non_empty("artifact dir", dir)?;
        self.artifact_mut().dir = dir.to_string();
        Ok(())
    }

    pub fn set_artifact_name(&mut self, file_name: &str) -> Result<(), SupervisorError> {
        require_non_empty("artifact name", file_name)?;
        self.artifact_mut().file_name = file_name.to_string();
        Ok(())
    }

    pub fn set_artifact_enabled(&mut self, enabled: bool) {
        self.artifact_mut().enabled = enabled;
    }

    /// File name that identifies instances of this worker in a process
    /// table: the launched artifact, when one is enabled.
    pub fn worker_identifier(&self) -> Option<String> {
        self.artifact
            .as_ref()
            .filter(|a| a.enabled && !a.file_name.is_empty())
            .map(|a| a.file_name.clone())
    }

    fn artifact_mut(&mut self) -> &mut Artifact {
        self.artifact.get_or_insert_with(|| Artifact {
            dir: String::new(),
            file_name: String::new(),
            enabled: false,
        })
    }

    fn index_of(&self, name: &str) -> Result<usize, SupervisorError> {
        self.schema
            .position(name)
            .ok_or_else(|| SupervisorError::UnknownField(name.to_string()))
    }

    fn validate(&self, idx: usize, value: &FieldValue) -> Result<(), SupervisorError> {
        match self.schema.fields.get(idx) {
            Some(spec) => spec.validate(value),
            None => Err(SupervisorError::UnknownField(idx.to_string())),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SupervisorError> {
    if value.trim().is_empty() {
        return Err(SupervisorError::configuration(field, "cannot be empty"));
    }
    Ok(())
}
