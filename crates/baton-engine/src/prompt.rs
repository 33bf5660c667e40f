use crate::state::TaskState;
use baton_brain::{ChatMessage, ChatRole};
use baton_core::{AgentConfig, StepPart, TaskStep, Team, ToolDescriptor, USER_AGENT};

/// Builds the system prompt for one agent turn.
///
/// Starts from the agent's configured prompt and appends the live context
/// the agent needs to act: team identity, callable tools, allowed handoff
/// destinations with the directive format, and artifact names.
pub fn render_system_prompt(
    team: &Team,
    agent: &AgentConfig,
    tools: &[ToolDescriptor],
    state: &TaskState,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !agent.system_prompt.is_empty() {
        sections.push(agent.system_prompt.clone());
    }

    sections.push(format!(
        "You are the agent '{}' in the team '{}'. Work on the task \
         conversationally; your reply becomes one turn in a shared history.",
        agent.name, team.name
    ));

    if !tools.is_empty() {
        let mut lines = vec!["You can call these tools:".to_string()];
        for tool in tools {
            lines.push(format!("- {}: {}", tool.name, tool.description));
        }
        sections.push(lines.join("\n"));
    }

    let targets = team.handoff_targets(&agent.name);
    if !targets.is_empty() {
        sections.push(format!(
            "When your part is done you may hand the conversation to one of: {}. \
             To hand off, end your reply with exactly:\n\
             HANDOFF_REQUEST: {{\"destination_agent\": \"<name>\"}}",
            targets.join(", ")
        ));
    }

    if !state.artifacts.is_empty() {
        let mut names: Vec<&str> = state.artifacts.keys().map(String::as_str).collect();
        names.sort_unstable();
        sections.push(format!(
            "Artifacts produced so far (by name): {}",
            names.join(", ")
        ));
    }

    sections.join("\n\n")
}

/// Flattens task history into chat messages from `current_agent`'s point of
/// view.
///
/// The current agent's own past turns become assistant messages; user turns
/// and everything produced by others become user messages, with other
/// agents' text prefixed by their name so attribution survives flattening.
/// Tool results are rendered in the provider-neutral backfill shape the
/// brain backends translate onward. Consecutive same-role messages are
/// merged, since chat APIs require alternating roles.
pub fn flatten_history(history: &[TaskStep], current_agent: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    for step in history {
        let Some((role, content)) = render_step(step, current_agent) else {
            continue;
        };

        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&content);
            }
            _ => messages.push(match role {
                ChatRole::User => ChatMessage::user(content),
                ChatRole::Assistant => ChatMessage::assistant(content),
            }),
        }
    }

    messages
}

fn render_step(step: &TaskStep, current_agent: &str) -> Option<(ChatRole, String)> {
    let mut lines: Vec<String> = Vec::new();

    for part in &step.parts {
        match part {
            StepPart::Text { text } => lines.push(text.clone()),
            StepPart::ToolCall {
                tool_name, args, ..
            } => lines.push(format!("[tool call: {tool_name} {args}]")),
            StepPart::ToolResult {
                call_id,
                result,
                is_error,
            } => lines.push(
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": result,
                    "is_error": is_error,
                })
                .to_string(),
            ),
            StepPart::Artifact { name, .. } => lines.push(format!("[artifact: {name}]")),
            // Guardrail verdicts are bookkeeping, not conversation.
            StepPart::Guardrail { .. } => {}
        }
    }

    let content = lines.join("\n");
    if content.is_empty() {
        return None;
    }

    if step.agent_name == current_agent {
        Some((ChatRole::Assistant, content))
    } else if step.agent_name == USER_AGENT {
        Some((ChatRole::User, content))
    } else {
        Some((ChatRole::User, format!("[{}]: {}", step.agent_name, content)))
    }
}
