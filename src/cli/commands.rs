//! CLI commands
//!
//! Special commands that can be executed in the REPL, plus the text blocks
//! the REPL prints for approvals, usage, and the session summary.

use crate::agent::{ConversationState, Engine, PendingApproval, UsageReport};
use crate::core::{Result, ThreadId};

const RULE_WIDTH: usize = 70;
const ARG_PREVIEW_CHARS: usize = 100;
const BAR_WIDTH: usize = 40;

/// Result of parsing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Not a command; send as a user turn
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Start a fresh thread
    NewThread,
    /// Exit the REPL
    Exit,
}

/// Parse and handle special commands
pub async fn handle_command(input: &str, engine: &Engine, thread_id: &ThreadId) -> Result<CommandResult> {
    let input = input.trim();
    let cmd = input.to_lowercase();

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "new" | "reset" => Ok(CommandResult::NewThread),

        "status" => {
            let config = engine.config();
            let messages = engine
                .get_state(thread_id)
                .await?
                .map(|s| s.messages.len())
                .unwrap_or(0);
            let pending = engine.pending_approval(thread_id).await?.is_some();
            let status = format!(
                "Docent Status:\n\
                 ─────────────────────────────\n\
                 Document:   {}\n\
                 Ollama:     {}\n\
                 Chat model: {}\n\
                 Retrieval:  {}\n\
                 Approval:   {}\n\
                 Thread:     {}{}\n\
                 History:    {} messages",
                config.document.name,
                config.ollama_url(),
                config.models.chat,
                config.models.retrieval,
                if config.approval.enabled { "required" } else { "off" },
                thread_id,
                if pending { " (awaiting approval)" } else { "" },
                messages
            );
            Ok(CommandResult::Handled(status))
        }

        "usage" => {
            let output = match engine.get_state(thread_id).await? {
                Some(state) => format_session_summary(&state),
                None => "No conversation yet.".to_string(),
            };
            Ok(CommandResult::Handled(output))
        }

        _ => {
            if input.starts_with('/') {
                Ok(CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                )))
            } else {
                Ok(CommandResult::Continue(input.to_string()))
            }
        }
    }
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn preview(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > ARG_PREVIEW_CHARS {
        let head: String = text.chars().take(ARG_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text
    }
}

/// Approval request block, ending with the y/n question
pub fn format_approval_request(pending: &PendingApproval) -> String {
    let mut lines = vec![String::new(), rule(), "TOOL APPROVAL REQUEST".to_string(), rule()];

    for (i, call) in pending.tool_calls.iter().enumerate() {
        lines.push(format!("\n[{}] Tool: {}", i + 1, call.name));
        lines.push("    Arguments:".to_string());
        if let Some(args) = call.arguments.as_object() {
            for (key, value) in args {
                lines.push(format!("      {}: {}", key, preview(value)));
            }
        }
    }

    lines.push(format!("\n{}", rule()));
    lines.push(format!(
        "Approve execution of these {} tool(s)? (y/n): ",
        pending.tool_calls.len()
    ));
    lines.join("\n")
}

/// Per-turn usage block
pub fn format_usage(report: &UsageReport) -> String {
    if !report.available {
        return "Token tracking unavailable: the model did not report token counts.".to_string();
    }

    let divider = "-".repeat(RULE_WIDTH);
    format!(
        "{divider}\n\
         TOKEN USAGE:\n\
         \x20 Prompt: {} tokens\n\
         \x20 Completion: {} tokens\n\
         \x20 This interaction: {} tokens\n\
         \x20 Cumulative: {} / {} tokens ({:.1}%)\n\
         \x20 Remaining: {} tokens\n\
         \n\
         Context: {}\n\
         {divider}",
        report.prompt_tokens,
        report.completion_tokens,
        report.interaction_tokens,
        report.total_tokens,
        report.context_limit,
        report.usage_percentage,
        report.remaining_tokens,
        report.progress_bar(BAR_WIDTH),
        divider = divider,
    )
}

/// Summary printed when the session ends
pub fn format_session_summary(state: &ConversationState) -> String {
    format!(
        "{rule}\n\
         SESSION SUMMARY\n\
         {rule}\n\
         Total tokens used: {}\n\
         \x20 Prompt tokens: {}\n\
         \x20 Completion tokens: {}\n\
         Total interactions: {}\n\
         Final context usage: {:.1}%\n\
         Remaining tokens: {}\n\
         {rule}",
        state.total_tokens,
        state.total_prompt_tokens,
        state.total_completion_tokens,
        state.interactions(),
        state.usage_percentage(),
        state.remaining_tokens(),
        rule = rule(),
    )
}

/// Generate help text
pub fn help_text() -> String {
    r#"Docent Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Print the session summary and exit
  status           Show current configuration and thread
  usage            Show token usage for this thread
  new              Start a new conversation thread

Tips:
  - Ask specific questions; answers cite document pages
  - Greetings and thanks are answered instantly
  - With approval on, you confirm each tool batch (y/n)
─────────────────────────────────────────────"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::UsageBand;
    use crate::core::{Message, ToolCall, MANUAL_SEARCH_TOOL};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_approval_request_truncates_arguments() {
        let long = "x".repeat(150);
        let pending = PendingApproval {
            thread_id: ThreadId::from("t"),
            token: uuid::Uuid::new_v4(),
            tool_calls: vec![ToolCall::new("c1", MANUAL_SEARCH_TOOL, json!({"question": long}))],
            requested_at: Utc::now(),
        };
        let text = format_approval_request(&pending);
        assert!(text.contains("[1] Tool: search_manual"));
        assert!(text.contains(&format!("question: {}...", "x".repeat(100))));
        assert!(!text.contains(&"x".repeat(101)));
        assert!(text.trim_end().ends_with("(y/n):"));
    }

    #[test]
    fn test_usage_block() {
        let report = UsageReport {
            prompt_tokens: 900,
            completion_tokens: 100,
            interaction_tokens: 1000,
            total_tokens: 1000,
            context_limit: 128000,
            usage_percentage: 0.78125,
            remaining_tokens: 127000,
            band: UsageBand::Normal,
            available: true,
        };
        let text = format_usage(&report);
        assert!(text.contains("This interaction: 1000 tokens"));
        assert!(text.contains("(LOW)"));
    }

    #[test]
    fn test_session_summary_counts_user_turns() {
        let mut state = ConversationState::new(ThreadId::from("t"), 1000);
        state.begin_turn("hello there");
        state.messages.push(Message::assistant("Hello!"));
        state.begin_turn("thanks");
        state.total_tokens = 250;
        let text = format_session_summary(&state);
        assert!(text.contains("Total interactions: 2"));
        assert!(text.contains("Final context usage: 25.0%"));
        assert!(text.contains("Remaining tokens: 750"));
    }
}
