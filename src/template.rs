// src/template.rs
use minijinja::{context, Environment};
use serde_json::Value;

use crate::context::WorkItem;
use crate::error::{NodeError, Result};

/// Resolves `{{ json.field }}` expressions in parameter values against the
/// current work item.
pub struct ParameterRenderer {
    env: Environment<'static>,
}

impl Default for ParameterRenderer {
    fn default() -> Self {
        ParameterRenderer::new()
    }
}

impl ParameterRenderer {
    pub fn new() -> Self {
        ParameterRenderer {
            env: Environment::new(),
        }
    }

    pub fn is_template(source: &str) -> bool {
        source.contains("{{") || source.contains("{%")
    }

    pub fn render(&self, source: &str, item: &WorkItem) -> Result<String> {
        if !Self::is_template(source) {
            return Ok(source.to_string());
        }

        let ctx = context! { json => &item.json, index => item.paired_item.item };
        self.env
            .render_str(source, ctx)
            .map_err(|e| NodeError::validation(format!("Template error: {}", e)))
    }

    /// Renders every string inside `value`, keeping its shape.
    pub fn render_value(&self, value: &Value, item: &WorkItem) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.render(s, item)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_value(v, item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.render_value(v, item)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other.clone(),
        })
    }
}
