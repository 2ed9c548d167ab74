//! Docent - Question answering over a fixed technical document
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use docent::cli::commands::{format_approval_request, format_usage};
use docent::core::ThreadId;
use docent::{ApprovalDecision, Config, Engine, Repl, TurnOutcome};
use tracing_subscriber::EnvFilter;

/// Docent - Ask questions about a technical document
#[derive(Parser, Debug)]
#[command(name = "docent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat model (answers and decides on tool calls)
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Path to the JSON document index
    #[arg(long, short = 'i')]
    index: Option<PathBuf>,

    /// Require approval before tools run
    #[arg(long, short = 'a')]
    approve: bool,

    /// Conversation thread id
    #[arg(long, short = 't')]
    thread: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("docent=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docent=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(model) = args.model {
        if config.models.retrieval == config.models.chat {
            config.models.retrieval = model.clone();
        }
        config.models.chat = model;
    }

    if let Some(index) = args.index {
        config.document.index_path = index;
    }

    if args.approve {
        config.approval.enabled = true;
    }

    if args.debug {
        config.agent.debug = true;
    }

    init_tracing(config.agent.debug);

    let thread_id = args.thread.map(ThreadId::from);

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let engine = Engine::from_config(config)
            .await
            .context("failed to start")?;
        engine.initialize().await?;

        let thread_id = thread_id.unwrap_or_default();
        let mut outcome = engine.invoke(&thread_id, &prompt).await?;
        while let TurnOutcome::Suspended(pending) = outcome {
            // No one to ask; report the request and reject it.
            eprintln!("{}", format_approval_request(&pending));
            eprintln!("Rejected: approving tools needs an interactive session.");
            outcome = engine
                .resume(&thread_id, ApprovalDecision::reject().with_token(pending.token))
                .await?;
        }
        if let TurnOutcome::Completed(turn) = outcome {
            println!("{}", turn.reply);
            if let Some(usage) = turn.usage.filter(|_| engine.config().agent.debug) {
                eprintln!("{}", format_usage(&usage));
            }
        }
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config, thread_id)
        .await
        .context("failed to start")?;
    repl.run().await?;

    Ok(())
}
