//! Task flags: declared schema, layered resolution, and typed access.
//!
//! A task declares each flag with a default. At run time the default is
//! overridden by scope-level values and then by command-line values. Bodies
//! read the resolved values through [`Flags`]; the panicking accessors raise a
//! [`FlagError`] that the task runner recovers into a normal error.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{Arg, value_parser};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A flag value. The declared default fixes the flag's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FlagValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FlagValue::Bool(_) => "bool",
            FlagValue::Int(_) => "int",
            FlagValue::Str(_) => "string",
        }
    }

    /// Convert `value` to this value's type. Strings are parsed; anything
    /// becomes a string for string flags.
    fn coerce(&self, value: &FlagValue) -> Option<FlagValue> {
        match (self, value) {
            (FlagValue::Bool(_), FlagValue::Bool(_))
            | (FlagValue::Int(_), FlagValue::Int(_))
            | (FlagValue::Str(_), FlagValue::Str(_)) => Some(value.clone()),
            (FlagValue::Bool(_), FlagValue::Str(raw)) => raw.parse().ok().map(FlagValue::Bool),
            (FlagValue::Int(_), FlagValue::Str(raw)) => raw.parse().ok().map(FlagValue::Int),
            (FlagValue::Str(_), other) => Some(FlagValue::Str(other.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(value) => write!(f, "{value}"),
            FlagValue::Int(value) => write!(f, "{value}"),
            FlagValue::Str(value) => f.write_str(value),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Str(value)
    }
}

/// One declared flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagSpec {
    pub name: String,
    pub default: FlagValue,
    pub help: String,
}

/// Flag name -> value, as carried by scopes and the command line.
pub type FlagOverrides = BTreeMap<String, FlagValue>;

/// Bad flag name or type, raised while resolving or reading flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("task {task}: unknown flag {flag:?}")]
    Unknown { task: String, flag: String },
    #[error("task {task}: flag {flag:?} is a {actual}, not a {expected}")]
    WrongType {
        task: String,
        flag: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("task {task}: invalid {expected} value {value:?} for flag {flag:?}")]
    InvalidValue {
        task: String,
        flag: String,
        expected: &'static str,
        value: String,
    },
}

/// Resolved flag values for one task execution. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    task: String,
    values: BTreeMap<String, FlagValue>,
}

impl Flags {
    /// Start from declared defaults and apply each override layer in order;
    /// later layers win.
    pub fn resolve(
        task: &str,
        specs: &[FlagSpec],
        layers: &[&FlagOverrides],
    ) -> Result<Flags, FlagError> {
        let mut values: BTreeMap<String, FlagValue> = specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();
        for layer in layers {
            for (name, value) in layer.iter() {
                let default = values.get(name).ok_or_else(|| FlagError::Unknown {
                    task: task.to_string(),
                    flag: name.clone(),
                })?;
                let coerced = default.coerce(value).ok_or_else(|| FlagError::InvalidValue {
                    task: task.to_string(),
                    flag: name.clone(),
                    expected: default.kind(),
                    value: value.to_string(),
                })?;
                values.insert(name.clone(), coerced);
            }
        }
        Ok(Flags {
            task: task.to_string(),
            values,
        })
    }

    pub fn get(&self, name: &str) -> Result<&FlagValue, FlagError> {
        self.values.get(name).ok_or_else(|| FlagError::Unknown {
            task: self.task.clone(),
            flag: name.to_string(),
        })
    }

    pub fn try_bool(&self, name: &str) -> Result<bool, FlagError> {
        match self.get(name)? {
            FlagValue::Bool(value) => Ok(*value),
            other => Err(self.wrong_type(name, "bool", other)),
        }
    }

    pub fn try_int(&self, name: &str) -> Result<i64, FlagError> {
        match self.get(name)? {
            FlagValue::Int(value) => Ok(*value),
            other => Err(self.wrong_type(name, "int", other)),
        }
    }

    pub fn try_str(&self, name: &str) -> Result<&str, FlagError> {
        match self.get(name)? {
            FlagValue::Str(value) => Ok(value),
            other => Err(self.wrong_type(name, "string", other)),
        }
    }

    /// Panics with a [`FlagError`] payload on a bad name or type; the task
    /// runner turns that panic into the task's error.
    pub fn bool(&self, name: &str) -> bool {
        self.try_bool(name)
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// See [`Flags::bool`].
    pub fn int(&self, name: &str) -> i64 {
        self.try_int(name).unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// See [`Flags::bool`].
    pub fn str(&self, name: &str) -> &str {
        self.try_str(name).unwrap_or_else(|err| std::panic::panic_any(err))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn wrong_type(&self, name: &str, expected: &'static str, actual: &FlagValue) -> FlagError {
        FlagError::WrongType {
            task: self.task.clone(),
            flag: name.to_string(),
            expected,
            actual: actual.kind(),
        }
    }
}

/// Parse command-line arguments for one task against its flag schema.
///
/// Only flags actually present on the command line are returned, so the
/// result layers cleanly over defaults and scope overrides. Booleans accept
/// `--name` and `--name=false`.
pub fn parse_cli_flags(task: &str, specs: &[FlagSpec], args: &[String]) -> Result<FlagOverrides> {
    let mut command = clap::Command::new(task.to_string()).no_binary_name(true);
    for spec in specs {
        let arg = Arg::new(spec.name.clone())
            .long(spec.name.clone())
            .help(spec.help.clone());
        let arg = match spec.default {
            FlagValue::Bool(_) => arg
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true")
                .value_parser(value_parser!(bool)),
            FlagValue::Int(_) => arg.value_parser(value_parser!(i64)),
            FlagValue::Str(_) => arg.value_parser(value_parser!(String)),
        };
        command = command.arg(arg);
    }

    let matches = command
        .try_get_matches_from(args)
        .with_context(|| format!("parse flags for task {task}"))?;

    let mut overrides = FlagOverrides::new();
    for spec in specs {
        if matches.value_source(&spec.name) != Some(ValueSource::CommandLine) {
            continue;
        }
        let value = match spec.default {
            FlagValue::Bool(_) => matches.get_one::<bool>(&spec.name).copied().map(FlagValue::Bool),
            FlagValue::Int(_) => matches.get_one::<i64>(&spec.name).copied().map(FlagValue::Int),
            FlagValue::Str(_) => matches.get_one::<String>(&spec.name).cloned().map(FlagValue::Str),
        };
        if let Some(value) = value {
            overrides.insert(spec.name.clone(), value);
        }
    }
    Ok(overrides)
}
