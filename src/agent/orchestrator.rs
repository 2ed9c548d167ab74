//! Agent orchestrator
//!
//! The reasoning node. It calls the completion service with the system prompt,
//! the clean conversation history, and any retrieval context staged for this
//! single invocation, then returns the assistant turn as a patch.

use std::sync::Arc;

use crate::agent::state::{ContextUpdate, ConversationState, StatePatch};
use crate::core::{Message, Result, MANUAL_SEARCH_TOOL, WEB_SEARCH_TOOL};
use crate::llm::{GenerateOptions, LLMProvider};
use crate::tools::ToolRegistry;

/// Built-in persona and tool rules for the configured document
pub fn default_system_prompt(document_name: &str, web_search: bool) -> String {
    let web_tool = if web_search {
        format!(
            "\n2. {} - Search the web for current information and real-world knowledge",
            WEB_SEARCH_TOOL
        )
    } else {
        String::new()
    };

    let web_routing = if web_search {
        format!(
            r#"
Use {web} for:
- Known issues, recalls, and service bulletins
- Real-world troubleshooting tips and community solutions
- Information not covered in the document

For troubleshooting problems, start with {manual} for official guidance, then
use {web} for real-world fixes. Distinguish official guidance from
web-sourced information."#,
            web = WEB_SEARCH_TOOL,
            manual = MANUAL_SEARCH_TOOL
        )
    } else {
        String::new()
    };

    format!(
        r#"You are an expert on the {doc} with master's level knowledge of its contents.

You have access to these search tools:
1. {manual} - Search the {doc}{web_tool}

Help users with questions about features and controls, maintenance schedules
and procedures, safety systems and warnings, specifications and capacities,
troubleshooting, and fuse locations.

TOOL USAGE RULES (follow strictly):
- DO NOT call any tools for greetings, thanks, acknowledgments, farewells, or
  off-topic questions. Respond directly.
- ONLY call tools when the user asks a specific question that needs
  information from the document.

Use {manual} for specifications, operating procedures, feature explanations,
fuse diagrams, maintenance schedules, and official safety warnings.{web_routing}

When answering:
1. Provide detailed information and cite your sources
2. Reference page numbers from document searches
3. Include relevant safety warnings when appropriate
4. Use clear language a non-specialist can understand

Always prioritize user safety."#,
        doc = document_name,
        manual = MANUAL_SEARCH_TOOL,
        web_tool = web_tool,
        web_routing = web_routing,
    )
}

/// Build the prompt for one orchestrator call.
///
/// Retrieval context is folded into the system turn; it never enters the
/// history that is returned to the caller.
pub fn build_prompt(
    system_prompt: &str,
    history: Vec<Message>,
    rag_context: Option<&str>,
) -> Vec<Message> {
    let system = match rag_context.filter(|c| !c.trim().is_empty()) {
        Some(context) => format!(
            "{}\n\n{}\n\nIMPORTANT: Use the retrieved context above to answer the user's question accurately.\nReference page numbers when citing information from the document.",
            system_prompt, context
        ),
        None => system_prompt.to_string(),
    };

    let mut prompt = Vec::with_capacity(history.len() + 1);
    prompt.push(Message::system(system));
    prompt.extend(history);
    prompt
}

/// The reasoning node
pub struct Orchestrator {
    llm: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tools,
            model: model.into(),
            temperature,
            system_prompt: system_prompt.into(),
        }
    }

    /// Produce exactly one assistant turn.
    ///
    /// With `tools_enabled` false the model is called without tool schema and
    /// any tool calls it still emits are dropped, forcing a final answer.
    pub async fn respond(
        &self,
        state: &ConversationState,
        tools_enabled: bool,
    ) -> Result<StatePatch> {
        let prompt = build_prompt(
            &self.system_prompt,
            state.clean_history(),
            state.rag_context.as_deref(),
        );
        let options = Some(GenerateOptions::with_temperature(self.temperature));

        tracing::debug!(
            thread_id = %state.thread_id,
            messages = prompt.len(),
            rag_context = state.rag_context.is_some(),
            tools_enabled,
            "calling orchestrator"
        );

        let response = if tools_enabled {
            self.llm
                .chat_with_tools(&self.model, &prompt, self.tools.definitions(), options)
                .await?
        } else {
            let mut response = self.llm.chat(&self.model, &prompt, options).await?;
            if !response.tool_calls.is_empty() {
                tracing::warn!(
                    thread_id = %state.thread_id,
                    dropped = response.tool_calls.len(),
                    "iteration limit reached, dropping tool calls"
                );
                response.tool_calls.clear();
            }
            response
        };

        if response.tool_calls.is_empty() {
            tracing::info!(thread_id = %state.thread_id, "orchestrator produced final answer");
        } else {
            let names: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
            tracing::info!(thread_id = %state.thread_id, tools = ?names, "orchestrator requested tools");
        }

        Ok(StatePatch {
            rag_context: ContextUpdate::Clear,
            ..StatePatch::new().append(response.into_message())
        })
    }
}
