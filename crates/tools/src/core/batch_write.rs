//! `batch_file_write`  — writes several files under the session
//! output directory as one logical unit. If any single write fails, every
//! operation already applied in the batch is rolled back (pre-existing
//! files restored to their prior content, newly created files removed).

use pf_domain::tool::ToolResult;
use serde_json::Value;

use crate::context::ToolContext;
use crate::path_guard;
use crate::registry::Tool;

pub struct BatchFileWrite;

struct Applied {
    path: std::path::PathBuf,
    previous_content: Option<String>,
}

#[async_trait::async_trait]
impl Tool for BatchFileWrite {
    fn name(&self) -> &str {
        "batch_file_write"
    }

    fn description(&self) -> &str {
        "Write multiple files under the session output directory as one unit, rolling back on any failure."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string"},
                            "content": {"type": "string"}
                        },
                        "required": ["path", "content"]
                    }
                }
            },
            "required": ["operations"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let operations = match params.get("operations").and_then(|v| v.as_array()) {
            Some(ops) if !ops.is_empty() => ops,
            Some(_) => return ToolResult::err("operations must not be empty"),
            None => return ToolResult::err("operations must be an array"),
        };

        let mut resolved_ops = Vec::with_capacity(operations.len());
        for (i, op) in operations.iter().enumerate() {
            let path = match op.get("path").and_then(|v| v.as_str()) {
                Some(p) => p,
                None => return ToolResult::err(format!("operations[{i}].path must be a string")),
            };
            let content = match op.get("content").and_then(|v| v.as_str()) {
                Some(c) => c,
                None => return ToolResult::err(format!("operations[{i}].content must be a string")),
            };
            let resolved = match path_guard::resolve_within(&ctx.session_output_dir, path) {
                Ok(r) => r,
                Err(e) => return ToolResult::err(format!("operations[{i}] path rejected: {e}")),
            };
            resolved_ops.push((resolved, content.to_string()));
        }

        let mut applied: Vec<Applied> = Vec::with_capacity(resolved_ops.len());
        for (path, content) in &resolved_ops {
            let previous_content = std::fs::read_to_string(path).ok();
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    rollback(&applied);
                    return ToolResult::err(format!("failed to create parent dir for {path:?}: {e}"));
                }
            }
            if let Err(e) = std::fs::write(path, content) {
                rollback(&applied);
                return ToolResult::err(format!("failed to write {path:?}: {e}"));
            }
            applied.push(Applied { path: path.clone(), previous_content });
        }

        let written: Vec<Value> = resolved_ops
            .iter()
            .map(|(p, _)| serde_json::json!(p.display().to_string()))
            .collect();
        ToolResult::ok(format!("wrote {} file(s)", resolved_ops.len())).with_artifact("paths", serde_json::json!(written))
    }
}

/// Best-effort rollback: restore overwritten files, delete newly created
/// ones. Applied in reverse order of application.
fn rollback(applied: &[Applied]) {
    for entry in applied.iter().rev() {
        match &entry.previous_content {
            Some(content) => {
                let _ = std::fs::write(&entry.path, content);
            }
            None => {
                let _ = std::fs::remove_file(&entry.path);
            }
        }
    }
}
