use crate::error::BatonResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A tool invocation requested by an agent's language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the matching result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as free-form JSON.
    pub arguments: serde_json::Value,
}

/// The result returned after executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this result answers.
    pub call_id: String,
    /// Output text, or an error description when `is_error` is set.
    pub content: String,
    /// Whether the execution failed.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed result. Failures are reported in-band so the conversation
    /// can continue; they never abort the task.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Describes a tool so the language model can decide when to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters_schema: serde_json::Value,
}

/// A callable tool implementation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The descriptor advertised to language models.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Executes one call. Tool-level failures should come back as
    /// [`ToolResult::error`], not as an `Err`.
    async fn execute(&self, call: &ToolCall) -> BatonResult<ToolResult>;
}

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool under its descriptor name, replacing any previous
    /// registration with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Looks up a single tool's descriptor.
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| t.descriptor())
    }

    /// All descriptors, sorted by name for deterministic prompt assembly.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Descriptors for the named tools only, in the same sorted order.
    /// Names without a registered tool are skipped.
    pub fn descriptors_for(&self, allowed: &[String]) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> = allowed
            .iter()
            .filter_map(|name| self.descriptor(name).cloned())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Executes a tool call. An unknown tool name produces an in-band error
    /// result rather than failing the task.
    pub async fn execute(&self, call: &ToolCall) -> BatonResult<ToolResult> {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Call to unknown tool");
            return Ok(ToolResult::error(
                &call.id,
                format!("Unknown tool: {}", call.name),
            ));
        };
        tool.execute(call).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    description: "Echoes its input".to_string(),
                    parameters_schema: serde_json::json!({
                        "type": "object",
                        "properties": { "text": { "type": "string" } }
                    }),
                },
            }
        }
    }

    #[async_trait]
    impl ToolExecutor for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, call: &ToolCall) -> BatonResult<ToolResult> {
            let text = call
                .arguments
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(ToolResult::success(&call.id, text))
        }
    }

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("call_1", "output");
        assert!(!result.is_error);
        assert_eq!(result.content, "output");
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("call_1", "failed");
        assert!(result.is_error);
    }

    #[test]
    fn test_tool_result_wire_field_names() {
        let json = serde_json::to_value(ToolResult::success("c1", "ok"))
            .expect("serializable");
        assert_eq!(json["callId"], "c1");
        assert_eq!(json["isError"], false);
    }

    #[tokio::test]
    async fn test_registry_executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo")));

        let call = ToolCall {
            id: "call_1".to_string(),
            name: "echo".to_string(),
            arguments: serde_json::json!({ "text": "hello" }),
        };
        let result = registry.execute(&call).await.expect("execute");
        assert!(!result.is_error);
        assert_eq!(result.content, "hello");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_is_in_band_error() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "missing".to_string(),
            arguments: serde_json::Value::Null,
        };
        let result = registry.execute(&call).await.expect("execute");
        assert!(result.is_error);
        assert!(result.content.contains("missing"));
    }

    #[test]
    fn test_descriptors_sorted_and_filtered() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("zeta")));
        registry.register(Arc::new(EchoTool::new("alpha")));
        registry.register(Arc::new(EchoTool::new("mid")));

        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        let allowed = vec!["zeta".to_string(), "nope".to_string(), "alpha".to_string()];
        let filtered: Vec<String> = registry
            .descriptors_for(&allowed)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(filtered, vec!["alpha", "zeta"]);
        assert_eq!(registry.tool_count(), 3);
        assert!(registry.contains("mid"));
    }
}
