//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the model act on the artifacts under edit: read the
//! current stylesheet, save a new behavior script, fetch reference text.
//! Every tool is self-describing (name, description, parameter schema,
//! read/write class) so the system prompt can be rendered from metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::ToolError;

/// A parsed, not-yet-validated tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Parameters as a JSON object
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// A call with no parameters.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Map::new())
    }
}

/// The outcome of one tool execution. Always a value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Human-readable message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The tool that produced this result
    pub tool_name: String,

    pub timestamp: DateTime<Utc>,
}

impl ToolExecutionResult {
    pub fn ok(tool_name: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
        }
    }

    /// The structured outcome shown to the model: `{"success", "data"|"error"}`.
    pub fn outcome(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("success".into(), Value::Bool(self.success));
        if let Some(data) = &self.data {
            obj.insert("data".into(), data.clone());
        }
        if let Some(error) = &self.error {
            obj.insert("error".into(), Value::String(error.clone()));
        }
        Value::Object(obj)
    }
}

/// Primitive parameter types a schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a runtime JSON value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// Declared parameters of a tool.
///
/// The schema is a minimum, not an allow-list: unknown parameters pass.
/// An empty schema accepts anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub parameters: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with(name, param_type, description, true)
    }

    /// Declare an optional parameter.
    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with(name, param_type, description, false)
    }

    fn with(mut self, name: &str, param_type: ParamType, description: &str, required: bool) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check required presence and declared types.
    pub fn check(&self, parameters: &Map<String, Value>) -> Result<(), ToolError> {
        for spec in &self.parameters {
            match parameters.get(&spec.name) {
                None if spec.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required parameter '{}'",
                        spec.name
                    )));
                }
                None => {}
                Some(value) if !spec.param_type.matches(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "parameter '{}' must be {}, got {}",
                        spec.name,
                        spec.param_type.as_str(),
                        json_type_name(value)
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Render as a JSON Schema object for the capability catalogue.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.parameters {
            properties.insert(
                spec.name.clone(),
                serde_json::json!({
                    "type": spec.param_type.as_str(),
                    "description": spec.description,
                }),
            );
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Pure metadata describing a tool, used to render the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ParameterSchema,
    pub is_write: bool,
}

/// The core Tool trait.
///
/// Implementors provide metadata and `invoke`. The provided `execute`
/// validates parameters against the schema, runs `invoke`, and folds every
/// error into a failure-shaped `ToolExecutionResult`; it never returns `Err`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "save_css").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> &str;

    /// Declared parameters.
    fn parameter_schema(&self) -> ParameterSchema;

    /// Whether this tool mutates state.
    fn is_write(&self) -> bool;

    /// Perform the side effect. Only called with parameters that passed validation.
    async fn invoke(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError>;

    /// Check parameters against the schema.
    fn validate(&self, parameters: &Map<String, Value>) -> bool {
        self.parameter_schema().check(parameters).is_ok()
    }

    /// Validate and invoke, returning a result value in every case.
    async fn execute(&self, parameters: &Map<String, Value>) -> ToolExecutionResult {
        if let Err(e) = self.parameter_schema().check(parameters) {
            debug!(tool = %self.name(), error = %e, "Tool parameter validation failed");
            return ToolExecutionResult::failure(self.name(), e.to_string());
        }

        match self.invoke(parameters).await {
            Ok(data) => ToolExecutionResult::ok(self.name(), data),
            Err(e) => ToolExecutionResult::failure(self.name(), e.to_string()),
        }
    }

    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            schema: self.parameter_schema(),
            is_write: self.is_write(),
        }
    }
}

/// A registry of available tools, built once per session.
///
/// The loop uses this to:
/// 1. Render the capability catalogue for the system prompt
/// 2. Classify parsed calls as read or write
/// 3. Look up the tool to execute
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Read/write class of a tool, `None` when it is not registered.
    pub fn is_write(&self, name: &str) -> Option<bool> {
        self.tools.get(name).map(|t| t.is_write())
    }

    /// All tool descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<ToolDescriptor> = self.tools.values().map(|t| t.describe()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
