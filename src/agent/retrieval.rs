//! Agentic retrieval node
//!
//! Serves manual-search tool calls: rewrite the query, search the index,
//! filter by relevance, and stage a page-cited context block for the next
//! orchestrator call. Only a short acknowledgment enters the conversation log.

use std::sync::Arc;

use crate::agent::state::{ContextUpdate, ConversationState, StatePatch};
use crate::core::config::RetrievalConfig;
use crate::core::{Document, Message, Result, ToolCall, ToolKind, MANUAL_SEARCH_TOOL};
use crate::llm::{GenerateOptions, LLMProvider};
use crate::retrieval::RetrievalIndex;

// Lowercase prefixes models add despite being told not to.
const PREAMBLES: &[&str] = &[
    "here's a reformulated query:",
    "here is a reformulated query:",
    "here is the reformulated query:",
    "reformulated query:",
    "reformulated:",
];

/// Outcome of one retrieval pass, before it becomes a patch
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    pub query: String,
    pub reformulated: String,
    pub documents: Vec<Document>,
    pub fallback_used: bool,
}

pub struct RetrievalAgent {
    llm: Arc<dyn LLMProvider>,
    index: Arc<dyn RetrievalIndex>,
    model: String,
    temperature: f32,
    document_name: String,
    config: RetrievalConfig,
}

impl RetrievalAgent {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        index: Arc<dyn RetrievalIndex>,
        model: impl Into<String>,
        temperature: f32,
        document_name: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            index,
            model: model.into(),
            temperature,
            document_name: document_name.into(),
            config,
        }
    }

    /// Graph node: serve the pending manual-search call
    pub async fn run(&self, state: &ConversationState) -> StatePatch {
        let calls = state.pending_tool_calls();
        let Some(position) = calls.iter().position(|c| c.kind() == ToolKind::ManualSearch) else {
            return StatePatch::new();
        };
        let call = &calls[position];

        let mut patch = StatePatch {
            rag_context: ContextUpdate::Clear,
            retrieved_documents: Some(Vec::new()),
            ..StatePatch::default()
        };

        match extract_question(call) {
            None => {
                tracing::warn!(thread_id = %state.thread_id, call_id = %call.id, "manual search call without a question");
                patch.append.push(Message::tool_result(call, "Error: No search query found"));
            }
            Some(query) => match self.retrieve(&query).await {
                Ok(outcome) => {
                    let ack = self.acknowledgment(outcome.documents.len());
                    if !outcome.documents.is_empty() {
                        patch.rag_context =
                            ContextUpdate::Set(format_context(&self.document_name, &outcome.documents));
                    }
                    tracing::info!(
                        thread_id = %state.thread_id,
                        relevant = outcome.documents.len(),
                        fallback = outcome.fallback_used,
                        "retrieval complete"
                    );
                    patch.retrieved_documents = Some(outcome.documents);
                    patch.append.push(Message::tool_result(call, ack));
                }
                Err(e) => {
                    tracing::warn!(thread_id = %state.thread_id, error = %e, "retrieval index failed");
                    patch
                        .append
                        .push(Message::tool_result(call, format!("Error: {}", e)));
                }
            },
        }

        // The rest of the batch still needs correlated results.
        for (i, other) in calls.iter().enumerate() {
            if i == position {
                continue;
            }
            tracing::debug!(thread_id = %state.thread_id, tool = %other.name, "skipping call in retrieval batch");
            patch.append.push(Message::tool_result(
                other,
                format!(
                    "Not executed: this step only served one {} request. Call {} again if still needed.",
                    MANUAL_SEARCH_TOOL, other.name
                ),
            ));
        }

        patch
    }

    /// Reformulate, search, filter, and fall back once if too little survives
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalOutcome> {
        let reformulated = self.reformulate(query).await;
        tracing::debug!(query, reformulated = %reformulated, "searching index");

        let candidates = self.index.similarity_search(&reformulated, self.config.k).await?;
        let mut documents = self.assess_relevance(candidates, query).await;
        let mut fallback_used = false;

        if documents.len() < self.config.min_relevant && reformulated != query {
            tracing::debug!(
                relevant = documents.len(),
                k = self.config.fallback_k,
                "too few relevant documents, retrying with original query"
            );
            let candidates = self
                .index
                .similarity_search(query, self.config.fallback_k)
                .await?;
            documents = self.assess_relevance(candidates, query).await;
            fallback_used = true;
        }

        Ok(RetrievalOutcome {
            query: query.to_string(),
            reformulated,
            documents,
            fallback_used,
        })
    }

    /// Rewrite the query for search. Never fails; falls back to the input.
    pub async fn reformulate(&self, query: &str) -> String {
        let prompt = reformulation_prompt(&self.document_name, query, self.config.max_query_words);
        let response = self
            .llm
            .chat(
                &self.model,
                &[Message::user(prompt)],
                Some(GenerateOptions::with_temperature(self.temperature)),
            )
            .await;

        match response {
            Ok(response) => {
                let cleaned = clean_reformulation(&response.content, self.config.max_query_words);
                if cleaned.is_empty() {
                    query.to_string()
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "query reformulation failed, using original query");
                query.to_string()
            }
        }
    }

    /// Keep the documents worth putting in context
    pub async fn assess_relevance(&self, documents: Vec<Document>, query: &str) -> Vec<Document> {
        if documents.len() <= self.config.max_relevant {
            return documents;
        }

        let mut relevant = Vec::new();
        for document in documents.into_iter().take(self.config.max_assessed) {
            if self.is_relevant(&document, query).await {
                relevant.push(document);
            }
        }
        relevant.truncate(self.config.max_relevant);
        relevant
    }

    async fn is_relevant(&self, document: &Document, query: &str) -> bool {
        let excerpt: String = document.content.chars().take(self.config.excerpt_chars).collect();
        let prompt = format!(
            "Is this excerpt from the {} relevant to the query?\n\nQuery: \"{}\"\n\nExcerpt: \"{}\"\n\nAnswer ONLY \"YES\" or \"NO\":",
            self.document_name, query, excerpt
        );

        match self
            .llm
            .chat(
                &self.model,
                &[Message::user(prompt)],
                Some(GenerateOptions::with_temperature(self.temperature)),
            )
            .await
        {
            Ok(response) => response.content.to_lowercase().contains("yes"),
            Err(e) => {
                tracing::warn!(source_id = %document.source_id, error = %e, "relevance judgment failed, including document");
                true
            }
        }
    }

    fn acknowledgment(&self, relevant: usize) -> String {
        if relevant == 0 {
            format!(
                "No relevant information found in the {} for this query.",
                self.document_name
            )
        } else {
            format!(
                "Retrieved {} relevant sections from the {}.",
                relevant, self.document_name
            )
        }
    }
}

/// Question argument of a manual-search call
fn extract_question(call: &ToolCall) -> Option<String> {
    call.get_string("question")
        .or_else(|| call.get_string("query"))
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
}

fn reformulation_prompt(document_name: &str, query: &str, max_words: usize) -> String {
    format!(
        r#"Reformulate this search query for a search index over the {doc}.

CRITICAL RULES:
1. Return ONLY the reformulated query text (no explanations, no preambles)
2. DO NOT include the document or product name (the index only covers this document)
3. Extract core component/feature names and their attributes
4. Remove conversational words ("what", "how", "please")
5. Keep it under {max_words} words

Examples:
- "What is fuse 33 for?" -> "fuse 33 purpose amperage"
- "How do I reset the oil light?" -> "oil change indicator reset procedure"
- "What's the towing capacity?" -> "maximum towing capacity"
- "Where is the spare tire?" -> "spare tire location access"
- "How to check transmission fluid?" -> "transmission fluid level check procedure"

Query: "{query}"
Reformulated:"#,
        doc = document_name,
        max_words = max_words,
        query = query,
    )
}

/// Strip preambles and quotes, then cap the word count
fn clean_reformulation(raw: &str, max_words: usize) -> String {
    let mut text = raw.trim();
    // Only the first line is the query; anything after is commentary.
    if let Some(first) = text.lines().find(|l| !l.trim().is_empty()) {
        text = first.trim();
    }

    if let Some(preamble) = PREAMBLES
        .iter()
        .find(|p| text.get(..p.len()).is_some_and(|head| head.eq_ignore_ascii_case(p)))
    {
        text = text[preamble.len()..].trim();
    }
    let text = text.trim_matches(|c| c == '"' || c == '\'').trim();

    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Page-cited context block handed to the orchestrator
pub fn format_context(document_name: &str, documents: &[Document]) -> String {
    let mut parts = vec![format!(
        "=== RETRIEVED CONTEXT FROM {} ===\n",
        document_name.to_uppercase()
    )];
    for (i, document) in documents.iter().enumerate() {
        parts.push(format!(
            "[Excerpt {} - Page {}]\n{}\n",
            i + 1,
            document.page_label(),
            document.content.trim()
        ));
    }
    parts.push("=== END OF RETRIEVED CONTEXT ===\n".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reformulation_strips_preamble_and_quotes() {
        assert_eq!(
            clean_reformulation("Reformulated query: \"fuse 33 purpose\"", 10),
            "fuse 33 purpose"
        );
        assert_eq!(
            clean_reformulation("  'spare tire location'  ", 10),
            "spare tire location"
        );
        assert_eq!(
            clean_reformulation("oil reset procedure\nThis query focuses on...", 10),
            "oil reset procedure"
        );
    }

    #[test]
    fn test_clean_reformulation_caps_words() {
        let long = "one two three four five six seven eight nine ten eleven twelve";
        assert_eq!(clean_reformulation(long, 10).split_whitespace().count(), 10);
        assert_eq!(clean_reformulation("   ", 10), "");
    }

    #[test]
    fn test_extract_question() {
        let call = ToolCall::new("c1", "search_manual", serde_json::json!({"question": " fuse 33 "}));
        assert_eq!(extract_question(&call).as_deref(), Some("fuse 33"));

        let alt = ToolCall::new("c2", "search_manual", serde_json::json!({"query": "tow hitch"}));
        assert_eq!(extract_question(&alt).as_deref(), Some("tow hitch"));

        let empty = ToolCall::new("c3", "search_manual", serde_json::json!({"question": ""}));
        assert!(extract_question(&empty).is_none());
    }

    #[test]
    fn test_format_context_cites_pages() {
        let docs = vec![
            Document::new("Fuse 33: 10A power point.", Some(412), "c1"),
            Document::new("Fuse panel overview.", None, "c2"),
        ];
        let context = format_context("Owner's Manual", &docs);
        assert!(context.starts_with("=== RETRIEVED CONTEXT FROM OWNER'S MANUAL ==="));
        assert!(context.contains("[Excerpt 1 - Page 412]\nFuse 33: 10A power point."));
        assert!(context.contains("[Excerpt 2 - Page unknown]"));
        assert!(context.trim_end().ends_with("=== END OF RETRIEVED CONTEXT ==="));
    }
}
