//! The tool registry and contract: schema, risk, scope, validation,
//! argument normalisation, and structured results.

pub mod builtin;
pub mod context;

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use context::{CompletionFlags, ExecutionContext};

use crate::permission::RiskLevel;

/// Wire-level error taxonomy. Every failure in the tool layer, the
/// task store, or git sync is eventually mapped onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    NotFound,
    ValidationFailed,
    InvalidArguments,
    PermissionDenied,
    IoError,
    ParseError,
    InternalError,
}

/// A capability a tool declares it needs. The executor never checks these
/// directly — they exist so a host process can grant or withhold whole
/// capability classes ahead of time (e.g. running with `network_access`
/// disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    ReadFiles,
    WriteFiles,
    ExecuteCommands,
    TodoManagement,
    NetworkAccess,
}

/// One entry in the tool-call batch a model turn produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw arguments as emitted by the model: a JSON string or object.
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultMetadata {
    pub execution_time_ms: u64,
    pub data_size_bytes: usize,
    pub timestamp: i64,
}

/// The canonical wire shape appended to the conversation as a `role=tool`
/// message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<String>,
    pub error_message: Option<String>,
    pub error_type: ErrorKind,
    pub metadata: ToolResultMetadata,
}

impl ToolResult {
    pub fn ok(data: impl Into<String>, started: Instant) -> Self {
        let data = data.into();
        let elapsed = started.elapsed();
        let size = data.len();
        Self {
            success: true,
            error_message: None,
            error_type: ErrorKind::None,
            metadata: ToolResultMetadata {
                execution_time_ms: elapsed.as_millis() as u64,
                data_size_bytes: size,
                timestamp: chrono::Utc::now().timestamp(),
            },
            data: Some(data),
        }
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>, started: Instant) -> Self {
        let elapsed = started.elapsed();
        Self {
            success: false,
            data: None,
            error_message: Some(message.into()),
            error_type: kind,
            metadata: ToolResultMetadata {
                execution_time_ms: elapsed.as_millis() as u64,
                data_size_bytes: 0,
                timestamp: chrono::Utc::now().timestamp(),
            },
        }
    }
}

/// A tool's implementation. Must be effectively synchronous from the
/// executor's point of view — long file or git IO is treated as a single
/// logical step.
pub type ToolFn = Box<dyn Fn(&Value, &mut ExecutionContext) -> Result<String, (ErrorKind, String)> + Send + Sync>;

pub type Validator = Box<dyn Fn(&Value) -> bool + Send + Sync>;

pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub json_schema: Value,
    pub risk_level: RiskLevel,
    pub scopes: HashSet<Scope>,
    pub validator: Option<Validator>,
    execute: ToolFn,
}

impl ToolDefinition {
    pub fn builder(name: impl Into<String>, description: impl Into<String>, json_schema: Value, execute: ToolFn) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder {
            name: name.into(),
            description: description.into(),
            json_schema,
            risk_level: RiskLevel::Low,
            scopes: HashSet::new(),
            validator: None,
            execute,
        }
    }

    pub fn run(&self, args: &Value, ctx: &mut ExecutionContext) -> Result<String, (ErrorKind, String)> {
        (self.execute)(args, ctx)
    }
}

pub struct ToolDefinitionBuilder {
    name: String,
    description: String,
    json_schema: Value,
    risk_level: RiskLevel,
    scopes: HashSet<Scope>,
    validator: Option<Validator>,
    execute: ToolFn,
}

impl ToolDefinitionBuilder {
    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.insert(scope);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            json_schema: self.json_schema,
            risk_level: self.risk_level,
            scopes: self.scopes,
            validator: self.validator,
            execute: self.execute,
        }
    }
}

/// Schema descriptor sent to the LLM transport — OpenAI-compatible
/// `{type:"function", function:{name, description, parameters}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Static registration of every available tool.
pub struct ToolRegistry {
    tools: std::collections::HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, def: ToolDefinition) {
        self.tools.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.json_schema.clone(),
            })
            .collect()
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

/// Normalises tool-call arguments that may arrive as a JSON string *or* a
/// JSON object into a canonical object `Value`.
pub fn normalize_arguments(raw: &Value) -> Result<Value, (ErrorKind, String)> {
    match raw {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map_err(|e| (ErrorKind::ParseError, format!("arguments were not valid JSON: {e}"))),
        Value::Object(_) => Ok(raw.clone()),
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        other => Err((ErrorKind::InvalidArguments, format!("arguments must be an object or JSON string, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_string_arguments() {
        let raw = Value::String(r#"{"path": "a.txt"}"#.to_string());
        let normalized = normalize_arguments(&raw).unwrap();
        assert_eq!(normalized["path"], "a.txt");
    }

    #[test]
    fn passes_through_object_arguments() {
        let raw = serde_json::json!({"path": "a.txt", "n": 3, "ok": true, "nested": {"x": null}});
        let normalized = normalize_arguments(&raw).unwrap();
        assert_eq!(normalized, raw);
    }

    #[test]
    fn rejects_non_object_non_string() {
        let raw = serde_json::json!(42);
        let result = normalize_arguments(&raw);
        assert!(matches!(result, Err((ErrorKind::InvalidArguments, _))));
    }
}
