//! Interactive REPL for Docent
//!
//! Provides the main user interaction loop, including the y/n approval
//! prompt when tool approval is enabled.

use std::io::{self, BufRead, Write};

use crate::agent::{ApprovalDecision, Engine, PendingApproval, TurnOutcome};
use crate::cli::commands::{
    format_approval_request, format_session_summary, format_usage, handle_command, CommandResult,
};
use crate::core::{Config, Result, ThreadId};

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    engine: Engine,
    thread_id: ThreadId,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub async fn with_config(config: Config, thread_id: Option<ThreadId>) -> Result<Self> {
        Ok(Self {
            engine: Engine::from_config(config).await?,
            thread_id: thread_id.unwrap_or_default(),
        })
    }

    /// Create a REPL around an existing engine
    pub fn with_engine(engine: Engine, thread_id: ThreadId) -> Self {
        Self { engine, thread_id }
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        print!("Initializing...");
        io::stdout().flush()?;

        if let Err(e) = self.engine.initialize().await {
            println!("\n\nInitialization Error: {}\n", e);
            return Err(e);
        }
        println!(" Ready!\n");

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    self.print_summary().await;
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match handle_command(input, &self.engine, &self.thread_id).await {
                Ok(CommandResult::Exit) => {
                    self.print_summary().await;
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::NewThread) => {
                    if let Err(e) = self.engine.remove_thread(&self.thread_id).await {
                        eprintln!("Unable to discard the previous conversation: {}", e);
                    }
                    self.thread_id = ThreadId::new();
                    println!("Started new conversation ({}).\n", self.thread_id);
                }
                Ok(CommandResult::Handled(output)) => println!("{}\n", output),
                Ok(CommandResult::Continue(text)) => {
                    if let Err(e) = self.ask(&text).await {
                        eprintln!("\nError: {}\n", e);
                        if e.is_fatal() {
                            return Err(e);
                        }
                    }
                }
                Err(e) => eprintln!("Command error: {}\n", e),
            }
        }

        Ok(())
    }

    /// Send one user turn, asking on stdin for approval decisions
    pub async fn ask(&self, text: &str) -> Result<()> {
        self.ask_with(text, |pending| {
            print!("{}", format_approval_request(pending));
            io::stdout().flush()?;
            read_decision()
        })
        .await
    }

    /// Send one user turn, taking approval decisions from `decide`.
    ///
    /// A request left parked by an earlier failure is settled first, so a
    /// failed resume never locks the thread.
    pub async fn ask_with<F>(&self, text: &str, mut decide: F) -> Result<()>
    where
        F: FnMut(&PendingApproval) -> Result<bool>,
    {
        if let Some(pending) = self.engine.pending_approval(&self.thread_id).await? {
            println!("\nThe previous request is still waiting for approval.");
            self.settle(TurnOutcome::Suspended(pending), &mut decide).await?;
        }

        let outcome = self.engine.invoke(&self.thread_id, text).await?;
        self.settle(outcome, &mut decide).await
    }

    /// Drive approval round-trips until the turn completes
    async fn settle<F>(&self, mut outcome: TurnOutcome, decide: &mut F) -> Result<()>
    where
        F: FnMut(&PendingApproval) -> Result<bool>,
    {
        loop {
            match outcome {
                TurnOutcome::Suspended(pending) => {
                    let approved = decide(&pending)?;
                    let decision = ApprovalDecision::from(approved).with_token(pending.token);
                    outcome = self.engine.resume(&self.thread_id, decision).await?;
                }
                TurnOutcome::Completed(turn) => {
                    println!("\nAssistant:\n{}\n", turn.reply);
                    if let Some(advisory) = &turn.advisory {
                        println!("{}\n", advisory);
                    }
                    if let Some(usage) = &turn.usage {
                        println!("{}\n", format_usage(usage));
                    }
                    return Ok(());
                }
            }
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    async fn print_summary(&self) {
        match self.engine.get_state(&self.thread_id).await {
            Ok(Some(state)) => println!("\n{}", format_session_summary(&state)),
            Ok(None) => {}
            Err(e) => eprintln!("Unable to retrieve session summary: {}", e),
        }
    }

    /// Print the startup banner
    fn print_banner(&self) {
        let config = self.engine.config();
        let rule = "=".repeat(70);

        println!("{}", rule);
        println!("{} Assistant", config.document.name);
        println!("{}", rule);
        println!("Ask me anything about your {}!", config.document.short_name);
        if config.approval.enabled {
            println!("  [Approval mode: you will be asked to approve tool calls]");
        }
        println!();
        println!("Ollama:     {}", config.ollama_url());
        println!("Chat model: {}", config.models.chat);
        println!("Thread:     {}", self.thread_id);
        println!();
        println!("Commands: help, status, usage, new, exit");
        println!("{}", rule);
    }
}

/// Read y/n from stdin, re-prompting on anything else
fn read_decision() -> Result<bool> {
    let stdin = io::stdin();
    loop {
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            // EOF counts as a rejection.
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {
                print!("Invalid input. Please enter 'y' or 'n': ");
                io::stdout().flush()?;
            }
        }
    }
}
