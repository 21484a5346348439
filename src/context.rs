// src/context.rs
//! The slice of the host execution context the node depends on.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::Credentials;
use crate::error::{NodeError, Result};

/// Provenance tag linking an output record back to an input item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub json: Value,
    pub paired_item: PairedItem,
}

impl WorkItem {
    pub fn new(index: usize, json: Value) -> Self {
        WorkItem {
            json,
            paired_item: PairedItem { item: index },
        }
    }
}

pub trait ExecutionContext {
    fn input_items(&self) -> &[WorkItem];

    /// Resolved value of a declared parameter for the item at `index`.
    fn parameter(&self, name: &str, index: usize) -> Result<Option<Value>>;

    fn credentials(&self) -> Result<Credentials>;

    fn continue_on_fail(&self) -> bool;

    fn type_version(&self) -> f64;
}

/// Typed accessors shared by every operation handler.
pub trait ParameterExt: ExecutionContext {
    fn str_param(&self, name: &str, index: usize) -> Result<String> {
        self.optional_str_param(name, index)?
            .ok_or_else(|| NodeError::validation(format!("Could not get parameter \"{}\"", name)))
    }

    fn optional_str_param(&self, name: &str, index: usize) -> Result<Option<String>> {
        match self.parameter(name, index)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(_) => Err(NodeError::validation(format!(
                "Parameter \"{}\" must be a string",
                name
            ))),
        }
    }

    fn bool_param(&self, name: &str, index: usize, default: bool) -> Result<bool> {
        match self.parameter(name, index)? {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::String(s)) => match s.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                "" => Ok(default),
                other => Err(NodeError::validation(format!(
                    "Parameter \"{}\" must be a boolean, got \"{}\"",
                    name, other
                ))),
            },
            Some(_) => Err(NodeError::validation(format!(
                "Parameter \"{}\" must be a boolean",
                name
            ))),
        }
    }

    /// A JSON-bearing parameter. Text is parsed; values the host already
    /// structured are taken as they are.
    fn json_param(&self, name: &str, index: usize) -> Result<Value> {
        match self.parameter(name, index)? {
            None => Err(NodeError::validation(format!(
                "Could not get parameter \"{}\"",
                name
            ))),
            Some(Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            Some(value) => Ok(value),
        }
    }

    /// Like [`json_param`](Self::json_param), with blank text meaning "not set".
    fn optional_json_param(&self, name: &str, index: usize) -> Result<Option<Value>> {
        match self.parameter(name, index)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
            Some(Value::String(raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            Some(value) => Ok(Some(value)),
        }
    }
}

impl<T: ExecutionContext + ?Sized> ParameterExt for T {}
