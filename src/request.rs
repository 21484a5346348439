// src/request.rs
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::context::{ExecutionContext, WorkItem};
use crate::credentials::Credentials;
use crate::error::{NodeError, Result};
use crate::template::ParameterRenderer;

fn default_type_version() -> f64 {
    1.2
}

/// A node invocation described in YAML (or JSON).
///
/// ```yaml
/// operation: update
/// parameters:
///   collection: users
///   updateFilter: '{"_id": "{{ json.id }}"}'
///   update: '{"status": "active"}'
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRequest {
    pub operation: String,
    #[serde(default = "default_type_version")]
    pub type_version: f64,
    #[serde(default)]
    pub continue_on_fail: bool,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl NodeRequest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text).map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// [`ExecutionContext`] for the command line: parameters come from a
/// [`NodeRequest`] and are rendered against each input item.
pub struct RequestContext {
    request: NodeRequest,
    items: Vec<WorkItem>,
    credentials: Option<Credentials>,
    renderer: ParameterRenderer,
    empty: WorkItem,
}

impl RequestContext {
    pub fn new(request: NodeRequest, items: Vec<WorkItem>) -> Self {
        RequestContext {
            request,
            items,
            credentials: None,
            renderer: ParameterRenderer::new(),
            empty: WorkItem::new(0, Value::Object(Default::default())),
        }
    }

    /// Credentials that take precedence over the ones inside the request.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn set_continue_on_fail(&mut self, enabled: bool) {
        self.request.continue_on_fail = enabled;
    }

    fn item(&self, index: usize) -> &WorkItem {
        self.items.get(index).unwrap_or(&self.empty)
    }
}

impl ExecutionContext for RequestContext {
    fn input_items(&self) -> &[WorkItem] {
        &self.items
    }

    fn parameter(&self, name: &str, index: usize) -> Result<Option<Value>> {
        if name == "operation" {
            return Ok(Some(Value::String(self.request.operation.clone())));
        }
        self.request
            .parameters
            .get(name)
            .map(|value| self.renderer.render_value(value, self.item(index)))
            .transpose()
    }

    fn credentials(&self) -> Result<Credentials> {
        self.credentials
            .clone()
            .or_else(|| self.request.credentials.clone())
            .ok_or_else(|| NodeError::credentials("No credentials got returned!"))
    }

    fn continue_on_fail(&self) -> bool {
        self.request.continue_on_fail
    }

    fn type_version(&self) -> f64 {
        self.request.type_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParameterExt;
    use serde_json::json;

    const REQUEST: &str = r#"
operation: update
continue_on_fail: true
parameters:
  collection: users
  upsert: true
  updateFilter: '{"_id": "{{ json.id }}"}'
  options:
    limit: 5
credentials:
  connection_string: mongodb://localhost:27017
  database: shop
"#;

    fn context() -> RequestContext {
        let request = NodeRequest::from_yaml(REQUEST).unwrap();
        RequestContext::new(
            request,
            vec![
                WorkItem::new(0, json!({"id": "a"})),
                WorkItem::new(1, json!({"id": "b"})),
            ],
        )
    }

    #[test]
    fn defaults_apply() {
        let request = NodeRequest::from_yaml("operation: find\n").unwrap();
        assert_eq!(request.type_version, 1.2);
        assert!(!request.continue_on_fail);
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn parameters_render_per_item() {
        let ctx = context();
        assert_eq!(ctx.str_param("updateFilter", 0).unwrap(), r#"{"_id": "a"}"#);
        assert_eq!(ctx.str_param("updateFilter", 1).unwrap(), r#"{"_id": "b"}"#);
        assert_eq!(ctx.str_param("operation", 0).unwrap(), "update");
        assert!(ctx.bool_param("upsert", 0, false).unwrap());
        assert_eq!(ctx.parameter("options", 0).unwrap(), Some(json!({"limit": 5})));
        assert_eq!(ctx.parameter("missing", 0).unwrap(), None);
    }

    #[test]
    fn explicit_credentials_win() {
        let ctx = context().with_credentials(Credentials::from_uri("mongodb://other", "other"));
        assert_eq!(ctx.credentials().unwrap().database.as_deref(), Some("other"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let ctx = RequestContext::new(NodeRequest::from_yaml("operation: find\n").unwrap(), vec![]);
        let err = ctx.credentials().unwrap_err();
        assert_eq!(err.to_string(), "No credentials got returned!");
    }
}
