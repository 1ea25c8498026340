//! CLI interface for kaizen
//!
//! The executor, judge, classifier, and optimization engine are external
//! collaborators wired in by the embedding application, so the binary
//! exposes the durable-state surface: inspecting and maintaining the
//! training buffer, instruction snapshots, archive, and conversation.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::agent::ConversationMemory;
use crate::config::Config;
use crate::learning::LearningStore;

#[derive(Parser)]
#[command(name = "kaizen")]
#[command(about = "Continuously-learning task agent state", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show learning-state overview
    Status,
    /// Show the buffered training results awaiting optimization
    Buffer,
    /// Show the current instruction snapshot
    Instructions,
    /// List archived training batches
    History,
    /// Manage the conversation window
    Conversation {
        #[command(subcommand)]
        command: ConversationCommands,
    },
    /// Show configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[derive(Subcommand)]
enum ConversationCommands {
    /// Show the retained turns
    Show,
    /// Clear the window and delete the persisted conversation
    Clear,
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let root = config.storage_root()?;
    let store = Arc::new(LearningStore::with_dir(&root)?);

    match cli.command {
        Commands::Status => {
            let buffer = store.peek_buffer().await;
            let snapshot = store.load_instructions();
            let archives = store.archive_entries();
            let memory =
                ConversationMemory::open(root.join("conversation"), config.conversation.max_turns);

            println!("Storage root:       {}", root.display());
            println!(
                "Buffered results:   {} (optimizes at {})",
                buffer.len(),
                config.optimizer.min_batch_size
            );
            println!("Archived batches:   {}", archives.len());
            match snapshot {
                Some(s) => println!(
                    "Instructions:       generation {} (score {:.2}, updated {})",
                    s.generation,
                    s.score,
                    s.updated_at.format("%Y-%m-%d %H:%M UTC")
                ),
                None => println!("Instructions:       none (built-in defaults)"),
            }
            println!(
                "Conversation:       {} turn(s), {} pending suggestion(s)",
                memory.len(),
                memory.current_suggestions().len()
            );
        }
        Commands::Buffer => {
            let buffer = store.peek_buffer().await;
            if buffer.is_empty() {
                println!("Training buffer is empty.");
                return Ok(());
            }
            for (i, result) in buffer.iter().enumerate() {
                println!(
                    "{}. [{:.1}] {} ({})",
                    i + 1,
                    result.score,
                    result.task,
                    result.timestamp.format("%Y-%m-%d %H:%M UTC")
                );
            }
        }
        Commands::Instructions => match store.load_instructions() {
            Some(snapshot) => {
                println!(
                    "Generation {} (score {:.2}, updated {})\n",
                    snapshot.generation,
                    snapshot.score,
                    snapshot.updated_at.format("%Y-%m-%d %H:%M UTC")
                );
                let mut roles: Vec<_> = snapshot.instructions.iter().collect();
                roles.sort_by(|a, b| a.0.cmp(b.0));
                for (role, instruction) in roles {
                    match instruction {
                        Some(text) => println!("[{}]\n{}\n", role, text),
                        None => println!("[{}]\n(built-in default)\n", role),
                    }
                }
            }
            None => println!("No instruction snapshot yet; executor uses built-in defaults."),
        },
        Commands::History => {
            let archives = store.archive_entries();
            if archives.is_empty() {
                println!("No archived batches.");
                return Ok(());
            }
            for path in archives {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    println!("{}", name);
                }
            }
        }
        Commands::Conversation { command } => {
            let mut memory =
                ConversationMemory::open(root.join("conversation"), config.conversation.max_turns);
            match command {
                ConversationCommands::Show => {
                    if memory.is_empty() {
                        println!("No conversation recorded.");
                        return Ok(());
                    }
                    for turn in memory.turns() {
                        println!(
                            "#{} [{:.1}] {} -> {}",
                            turn.turn_number, turn.score, turn.task, turn.resolved_task
                        );
                    }
                    let suggestions = memory.current_suggestions();
                    if !suggestions.is_empty() {
                        println!("\nPending suggestions:");
                        for (i, s) in suggestions.iter().enumerate() {
                            println!("  {}. {}", i + 1, s);
                        }
                    }
                }
                ConversationCommands::Clear => {
                    memory.clear()?;
                    println!("Conversation cleared.");
                }
            }
        }
        Commands::Config { path } => {
            if path {
                println!("{}", crate::config::config_path()?.display());
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}
