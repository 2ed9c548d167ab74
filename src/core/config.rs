//! Configuration management for Docent
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/docent/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{DocentError, Result};

/// Main configuration for Docent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// The document being answered about
    #[serde(default)]
    pub document: DocumentConfig,
    /// Agentic retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Human approval of tool calls
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Context budget tracking
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Agent loop behavior
    #[serde(default)]
    pub agent: AgentConfig,
    /// Web search tool
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model that answers and decides on tool calls
    pub chat: String,
    /// Model used for query rewriting and relevance judgments
    pub retrieval: String,
    /// Sampling temperature for every call
    pub temperature: f32,
}

/// The fixed document the assistant answers about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Full title, used in prompts and context headers
    pub name: String,
    /// Short name, used in canned replies
    pub short_name: String,
    /// JSON corpus produced by the ingestion step
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Documents requested on the first search
    pub k: usize,
    /// Documents requested on the fallback search with the original query
    pub fallback_k: usize,
    /// Upper bound on candidates judged individually
    pub max_assessed: usize,
    /// Upper bound on documents accepted into context
    pub max_relevant: usize,
    /// Below this many accepted documents the fallback search runs
    pub min_relevant: usize,
    /// Characters of each excerpt shown to the relevance judge
    pub excerpt_chars: usize,
    /// Word cap applied to reformulated queries
    pub max_query_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Whether tool calls wait for a human decision
    pub enabled: bool,
    /// Suspensions older than this many seconds are evicted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Whether the context tracker runs at the end of a turn
    pub enabled: bool,
    /// Context window of the chat model in tokens
    pub context_limit: u64,
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum orchestrator invocations per turn before tools are unbound
    /// Default: 10
    pub max_iterations: usize,
    /// Whether to show debug output
    pub debug: bool,
    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Brave Search API key; the tool is not offered without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Search endpoint
    pub endpoint: String,
    /// Results requested per search
    pub count: u32,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let chat = env::var("DOCENT_CHAT_MODEL")
            .or_else(|_| env::var("OLLAMA_MODEL"))
            .unwrap_or_else(|_| "llama3.2".to_string());
        Self {
            retrieval: env::var("DOCENT_RETRIEVAL_MODEL").unwrap_or_else(|_| chat.clone()),
            chat,
            temperature: 0.0,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            name: env::var("DOCENT_DOCUMENT_NAME")
                .unwrap_or_else(|_| "2018 Ford F-150 Owner's Manual".to_string()),
            short_name: env::var("DOCENT_DOCUMENT_SHORT_NAME")
                .unwrap_or_else(|_| "2018 F-150".to_string()),
            index_path: env::var("DOCENT_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Config::config_dir().join("index.json")),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            fallback_k: 8,
            max_assessed: 10,
            max_relevant: 5,
            min_relevant: 2,
            excerpt_chars: 500,
            max_query_words: 10,
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("TOOL_APPROVAL_ENABLED", false),
            stale_after_secs: None,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            context_limit: 128_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            debug: env_flag("DOCENT_DEBUG", false),
            system_prompt: None,
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("BRAVE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
            count: 5,
        }
    }
}

impl ApprovalConfig {
    /// Eviction age for parked suspensions, if eviction is on
    pub fn stale_after(&self) -> Result<Option<chrono::Duration>> {
        self.stale_after_secs
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .ok_or_else(|| {
                        DocentError::config(format!(
                            "approval.stale_after_secs is out of range: {}",
                            secs
                        ))
                    })
            })
            .transpose()
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docent")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(DocentError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| DocentError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DocentError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| DocentError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DocentError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| DocentError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Check settings that would make the session unusable
    pub fn validate(&self) -> Result<()> {
        if self.ollama.host.trim().is_empty() {
            return Err(DocentError::config("OLLAMA_HOST is empty"));
        }
        if self.ollama.port == 0 {
            return Err(DocentError::config("OLLAMA_PORT must be non-zero"));
        }
        if self.models.chat.trim().is_empty() {
            return Err(DocentError::config("chat model name is empty"));
        }
        if self.models.retrieval.trim().is_empty() {
            return Err(DocentError::config("retrieval model name is empty"));
        }
        if self.tracking.context_limit == 0 {
            return Err(DocentError::config("context_limit must be greater than zero"));
        }
        if self.agent.max_iterations == 0 {
            return Err(DocentError::config("max_iterations must be at least 1"));
        }
        if self.retrieval.k == 0 || self.retrieval.fallback_k == 0 {
            return Err(DocentError::config("retrieval k values must be at least 1"));
        }
        self.approval.stale_after()?;
        url::Url::parse(&self.web_search.endpoint)
            .map_err(|e| DocentError::config(format!("Invalid web search endpoint: {}", e)))?;
        Ok(())
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
