//! Kaizen - continuously-learning task-coordination library
//!
//! The coordination layer of a self-improving task agent:
//! - Durable learning state: append-only training buffer, timestamp-keyed
//!   archive, and a versioned instruction snapshot with hot reload
//! - Bounded conversation memory with a lean context projection
//! - Hybrid deterministic/probabilistic intent routing
//! - A background scheduler that periodically hands accumulated results to
//!   an external optimization engine and publishes the improved
//!   instructions back to the live executor
//!
//! The task executor, judge, intent classifier, and optimization engine
//! are external collaborators expressed as async traits; this crate
//! coordinates them and owns the durable state they share.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kaizen::agent::{AgentSession, ConversationMemory};
//! use kaizen::learning::LearningStore;
//! use kaizen::optimizer::{OptimizerConfig, OptimizerScheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(LearningStore::new()?);
//!     let memory = ConversationMemory::open(store.base_dir().join("conversation"), 10);
//!
//!     let scheduler = Arc::new(OptimizerScheduler::new(
//!         store.clone(),
//!         my_engine,
//!         OptimizerConfig::default(),
//!     ));
//!     scheduler.start();
//!
//!     let mut session = AgentSession::new(my_executor, Some(my_judge), my_classifier, store, memory);
//!     let report = session.handle_input("triage the failing builds").await?;
//!     println!("{}", report.solution);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod config;
pub mod learning; // Durable learning state store
pub mod router; // Intent routing; must come before agent which depends on it
pub mod agent; // Foreground session and conversation memory
pub mod optimizer; // Background optimization scheduler
pub mod cli;

// Re-export commonly used types for convenience
pub use agent::{AgentSession, ConversationMemory, ExecutionContext, Judge, TaskExecutor, TurnReport};

pub use learning::{LearningStore, StoreError};

pub use router::{ClassifierVerdict, IntentClassifier, IntentRouter};

pub use optimizer::{
    CompiledProgram, OptimizationEngine, OptimizerConfig, OptimizerScheduler, TrainingExample,
};

pub use types::{
    ConversationTurn, InstructionSnapshot, Intent, IntentClassification, Judgment, TaskContext,
    TaskOutcome, TrainingResult,
};

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Continuously-learning task agent", NAME, VERSION)
}
