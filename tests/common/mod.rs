//! Scripted collaborators for driving the engine without a network

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use docent::agent::{CheckpointStore, Engine, MemoryCheckpointStore};
use docent::core::{
    Config, DocentError, Document, Message, Result, Role, TokenUsage, ToolCall, ToolDefinition,
    MANUAL_SEARCH_TOOL, WEB_SEARCH_TOOL,
};
use docent::llm::{GenerateOptions, LLMProvider, LLMResponse};
use docent::retrieval::RetrievalIndex;
use docent::tools::{Tool, ToolRegistry, WebSearchTool};

/// One recorded orchestrator call
#[derive(Debug, Clone)]
pub struct OrchestratorCall {
    pub prompt: Vec<Message>,
    pub tools_bound: bool,
}

/// Completion service that replays scripted orchestrator turns.
///
/// Retrieval prompts (rewrite and relevance) are answered from fixed settings.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<LLMResponse>>>,
    /// `None` makes every rewrite fail
    rewrite: Mutex<Option<String>>,
    /// `None` makes every relevance judgment fail
    relevance: Mutex<Option<String>>,
    pub orchestrator_calls: Mutex<Vec<OrchestratorCall>>,
    pub rewrite_calls: Mutex<usize>,
    pub relevance_calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<LLMResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            rewrite: Mutex::new(Some("fuse 33 purpose amperage".to_string())),
            relevance: Mutex::new(Some("YES".to_string())),
            orchestrator_calls: Mutex::new(Vec::new()),
            rewrite_calls: Mutex::new(0),
            relevance_calls: Mutex::new(0),
        })
    }

    pub fn set_rewrite(&self, rewrite: Option<&str>) {
        *self.rewrite.lock() = rewrite.map(str::to_string);
    }

    pub fn set_relevance(&self, answer: &str) {
        *self.relevance.lock() = Some(answer.to_string());
    }

    pub fn fail_relevance(&self) {
        *self.relevance.lock() = None;
    }

    pub fn push(&self, response: Result<LLMResponse>) {
        self.script.lock().push_back(response);
    }

    pub fn orchestrator_count(&self) -> usize {
        self.orchestrator_calls.lock().len()
    }

    pub fn last_orchestrator_call(&self) -> OrchestratorCall {
        self.orchestrator_calls
            .lock()
            .last()
            .cloned()
            .expect("no orchestrator call recorded")
    }

    pub fn total_calls(&self) -> usize {
        self.orchestrator_count() + *self.rewrite_calls.lock() + *self.relevance_calls.lock()
    }

    fn next_orchestrator(&self, messages: &[Message], tools_bound: bool) -> Result<LLMResponse> {
        self.orchestrator_calls.lock().push(OrchestratorCall {
            prompt: messages.to_vec(),
            tools_bound,
        });
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(answer("(script exhausted)", 10, 5)))
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn chat(
        &self,
        _model: &str,
        messages: &[Message],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let first = messages.first().cloned().unwrap_or_else(|| Message::user(""));
        if first.role == Role::System {
            return self.next_orchestrator(messages, false);
        }
        if first.content.starts_with("Reformulate") {
            *self.rewrite_calls.lock() += 1;
            return match self.rewrite.lock().clone() {
                Some(text) => Ok(answer(&text, 0, 0)),
                None => Err(DocentError::ollama("rewrite model offline")),
            };
        }
        if first.content.starts_with("Is this excerpt") {
            *self.relevance_calls.lock() += 1;
            return match self.relevance.lock().clone() {
                Some(text) => Ok(answer(&text, 0, 0)),
                None => Err(DocentError::ollama("judge model timed out")),
            };
        }
        Err(DocentError::Other(format!("unexpected prompt: {}", first.content)))
    }

    async fn chat_with_tools(
        &self,
        _model: &str,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        self.next_orchestrator(messages, true)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["llama3.2:latest".to_string()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Final answer with reported usage
pub fn answer(text: &str, prompt_tokens: u64, completion_tokens: u64) -> LLMResponse {
    LLMResponse {
        content: text.to_string(),
        tool_calls: Vec::new(),
        usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
        model: "scripted".to_string(),
    }
}

/// Assistant turn requesting tools
pub fn tool_request(calls: Vec<ToolCall>) -> LLMResponse {
    LLMResponse {
        content: String::new(),
        tool_calls: calls,
        usage: Some(TokenUsage::new(50, 5)),
        model: "scripted".to_string(),
    }
}

pub fn manual_search(id: &str, question: &str) -> ToolCall {
    ToolCall::new(id, MANUAL_SEARCH_TOOL, serde_json::json!({ "question": question }))
}

pub fn web_search(id: &str, query: &str) -> ToolCall {
    ToolCall::new(id, WEB_SEARCH_TOOL, serde_json::json!({ "query": query }))
}

/// Index that returns fixed documents and records every search
pub struct RecordingIndex {
    documents: Vec<Document>,
    /// Served from the second search on, when set
    retry_documents: Option<Vec<Document>>,
    pub searches: Mutex<Vec<(String, usize)>>,
}

impl RecordingIndex {
    pub fn new(documents: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            documents,
            retry_documents: None,
            searches: Mutex::new(Vec::new()),
        })
    }

    pub fn with_retry(first: Vec<Document>, retry: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            documents: first,
            retry_documents: Some(retry),
            searches: Mutex::new(Vec::new()),
        })
    }

    pub fn search_log(&self) -> Vec<(String, usize)> {
        self.searches.lock().clone()
    }
}

#[async_trait]
impl RetrievalIndex for RecordingIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let mut searches = self.searches.lock();
        let source = match (&self.retry_documents, searches.is_empty()) {
            (Some(retry), false) => retry,
            _ => &self.documents,
        };
        searches.push((query.to_string(), k));
        Ok(source.iter().take(k).cloned().collect())
    }
}

/// Web search stand-in that fails on demand
pub struct FakeWebSearch;

#[async_trait]
impl Tool for FakeWebSearch {
    fn definition(&self) -> ToolDefinition {
        WebSearchTool::tool_definition()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String> {
        match call.get_string("query").as_deref() {
            Some("boom") => Err(DocentError::tool("search API returned 503")),
            Some(q) => Ok(format!("1. Recall notice for {}", q)),
            None => Err(DocentError::tool("missing query")),
        }
    }
}

pub fn fuse_documents() -> Vec<Document> {
    vec![Document::new(
        "Fuse 33: 10A. Auxiliary power point (console).",
        Some(412),
        "chunk-412-1",
    )]
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.document.name = "Test Owner's Manual".to_string();
    config.document.short_name = "Test Truck".to_string();
    config.approval.enabled = false;
    config.approval.stale_after_secs = None;
    config.tracking.enabled = true;
    config.tracking.context_limit = 1000;
    config.agent.max_iterations = 10;
    config.agent.system_prompt = None;
    config
}

pub fn try_build_engine(
    config: Config,
    llm: Arc<ScriptedLlm>,
    index: Arc<RecordingIndex>,
) -> Result<Engine> {
    let mut tools = ToolRegistry::new(&config.document.name);
    tools.register(Arc::new(FakeWebSearch));
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    Engine::new(config, llm, index, Arc::new(tools), store)
}

pub fn build_engine(config: Config, llm: Arc<ScriptedLlm>, index: Arc<RecordingIndex>) -> Engine {
    try_build_engine(config, llm, index).expect("engine builds")
}
