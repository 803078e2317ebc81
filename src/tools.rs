//! Tool declarations and the tool registry
//!
//! A [`ToolSpec`] is what the model sees: name, description, and a JSON
//! Schema for the arguments. A handler is what runs locally when the model
//! requests that tool. The [`ToolRegistry`] maps names to both.
//!
//! Handlers are async closures stored as `Arc<dyn Fn(Value) -> Pin<Box<dyn
//! Future ...>>>`: boxing erases the concrete future type so handlers of any
//! shape share one collection, pinning is required before polling, and the
//! `Send + Sync` bounds let the registry be shared across tasks.
//!
//! # Examples
//!
//! ```rust
//! use chat_thread::{ToolRegistry, ToolSpec};
//! use serde_json::json;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register_with_handler(
//!     ToolSpec::new("add", "Add two numbers")
//!         .param("a", "number")
//!         .param("b", "number"),
//!     |args| async move {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!({"result": a + b}))
//!     },
//! );
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for tool handler functions
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Declared shape of a tool: what is advertised to the model.
///
/// Unique by name within a registry; the parameter spec is a JSON-Schema
/// object built up with [`ToolSpec::param`] or supplied wholesale with
/// [`ToolSpec::parameters`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    name: String,
    description: String,
    parameters: Value,
}

impl ToolSpec {
    /// Start a spec with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Add one required parameter with a simple JSON type ("string",
    /// "number", "integer", "boolean", "array", "object").
    pub fn param(mut self, name: &str, json_type: &str) -> Self {
        if let Some(properties) = self
            .parameters
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        {
            properties.insert(
                name.to_string(),
                serde_json::json!({ "type": json_type }),
            );
        }
        if let Some(required) = self
            .parameters
            .get_mut("required")
            .and_then(Value::as_array_mut)
        {
            required.push(Value::String(name.to_string()));
        }
        self
    }

    /// Replace the parameter schema wholesale (for nested or optional
    /// parameters that the simple `param` notation cannot express).
    pub fn parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Function-calling wire form of this declaration
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Option<ToolHandler>,
}

/// Mapping from tool name to declaration and local handler.
///
/// Registration order is preserved; it is the order tools are advertised in.
/// Re-registering a name overwrites the previous entry in place (last
/// registration wins) with a log warning; use [`ToolRegistry::register_unique`]
/// to treat duplicates as a configuration error instead.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.spec.name == name)
    }

    fn insert(&mut self, spec: ToolSpec, handler: Option<ToolHandler>) {
        match self.position(&spec.name) {
            Some(index) => {
                log::warn!("tool '{}' re-registered, previous entry dropped", spec.name);
                self.entries[index] = RegisteredTool { spec, handler };
            }
            None => self.entries.push(RegisteredTool { spec, handler }),
        }
    }

    /// Register a declaration without a handler (advertise-only).
    /// Overwrites any prior entry under the same name.
    pub fn register(&mut self, spec: ToolSpec) {
        self.insert(spec, None);
    }

    /// Register a declaration and bind `handler` under its name.
    /// Overwrites any prior entry (declaration and handler) for that name.
    pub fn register_with_handler<F, Fut>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.insert(spec, Some(handler));
    }

    /// Like [`ToolRegistry::register_with_handler`] but fails on a duplicate
    /// name instead of overwriting.
    pub fn register_unique<F, Fut>(&mut self, spec: ToolSpec, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if self.position(&spec.name).is_some() {
            return Err(Error::DuplicateTool(spec.name));
        }
        self.register_with_handler(spec, handler);
        Ok(())
    }

    /// Declarations in registration order, for advertising to the model
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries.iter().map(|e| e.spec.clone()).collect()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.spec.name.as_str()).collect()
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.position(name).map(|i| &self.entries[i].spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke the handler bound under `name`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownTool`] if no handler is bound under that name (either
    /// the name was never registered or it was declared without a handler);
    /// otherwise whatever the handler itself returns.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value> {
        let handler = self
            .position(name)
            .and_then(|i| self.entries[i].handler.clone())
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        handler(arguments).await
    }

    /// Replace all declarations, keeping any existing handler whose name
    /// survives the replacement. Used by state restore: handlers are code and
    /// cannot be serialized, so re-binding by name is the best a restore can
    /// do.
    pub fn replace_specs(&mut self, specs: Vec<ToolSpec>) {
        let mut old = std::mem::take(&mut self.entries);
        for spec in specs {
            let handler = old
                .iter_mut()
                .find(|e| e.spec.name == spec.name)
                .and_then(|e| e.handler.take());
            self.entries.push(RegisteredTool { spec, handler });
        }
    }
}
