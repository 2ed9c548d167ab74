//! Docent - Question answering over a fixed technical document
//!
//! A resumable conversation engine that runs local models through Ollama,
//! retrieves cited excerpts from an indexed document, and can pause for human
//! approval before any tool runs.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Completion service abstraction with Ollama implementation
//! - **Retrieval**: Similarity search over the indexed document
//! - **Tools**: Tool registry and web search
//! - **Agent**: Conversation graph, checkpoints, and the engine
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use docent::agent::{Engine, TurnOutcome};
//! use docent::core::ThreadId;
//! use docent::Config;
//!
//! #[tokio::main]
//! async fn main() -> docent::Result<()> {
//!     let engine = Engine::from_config(Config::load()).await?;
//!     engine.initialize().await?;
//!
//!     let thread = ThreadId::new();
//!     if let TurnOutcome::Completed(turn) = engine.invoke(&thread, "What is fuse 33 for?").await? {
//!         println!("{}", turn.reply);
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod retrieval;
pub mod tools;

// Re-export commonly used items
pub use agent::{ApprovalDecision, Engine, TurnOutcome};
pub use cli::Repl;
pub use core::{Config, DocentError, Result};
