//! Agent module - foreground task-execution session
//!
//! `AgentSession` is the interactive path: it projects conversation
//! context, routes raw input to an actionable task, runs the external
//! executor under the currently-active instruction snapshot (hot-reloaded
//! whenever the background optimizer publishes a new generation), records
//! the outcome in the learning store, and appends the turn to conversation
//! memory. Collaborator failures are surfaced to the caller; the session
//! itself stays usable.

pub mod conversation;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::learning::LearningStore;
use crate::router::{IntentClassifier, IntentRouter};
use crate::types::{IntentClassification, Judgment, TaskContext, TaskOutcome, TrainingResult};

pub use conversation::ConversationMemory;

/// Everything the executor sees for one task.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Lean conversation projection.
    pub conversation: TaskContext,
    /// Per-role instructions from the active snapshot. An empty map means
    /// no snapshot exists yet and built-in defaults apply.
    pub instructions: HashMap<String, Option<String>>,
}

/// External task executor (the reasoning/tool-use loop). Opaque here.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, task: &str, context: &ExecutionContext) -> anyhow::Result<TaskOutcome>;
}

/// External judge scoring and critiquing a solution.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(
        &self,
        task: &str,
        solution: &str,
        expected_behavior: Option<&str>,
    ) -> anyhow::Result<Judgment>;
}

/// What one handled input produced, for display by the caller.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub classification: IntentClassification,
    pub solution: String,
    pub score: f64,
    pub suggestions: Vec<String>,
    pub turn_number: usize,
}

/// Foreground interactive session.
pub struct AgentSession {
    executor: Arc<dyn TaskExecutor>,
    judge: Option<Arc<dyn Judge>>,
    router: IntentRouter,
    store: Arc<LearningStore>,
    memory: ConversationMemory,
    /// `updated_at` of the applied snapshot; the hot-reload token.
    loaded_at: Option<DateTime<Utc>>,
    instructions: HashMap<String, Option<String>>,
}

impl AgentSession {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        judge: Option<Arc<dyn Judge>>,
        classifier: Arc<dyn IntentClassifier>,
        store: Arc<LearningStore>,
        memory: ConversationMemory,
    ) -> Self {
        Self {
            executor,
            judge,
            router: IntentRouter::new(classifier),
            store,
            memory,
            loaded_at: None,
            instructions: HashMap::new(),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }

    /// Handle one piece of raw user input end to end.
    pub async fn handle_input(&mut self, raw_input: &str) -> anyhow::Result<TurnReport> {
        let context = self.memory.to_context();
        let classification = self.router.classify(raw_input, &context).await?;
        debug!(
            "Routed input as {} (confidence {:.2}): {}",
            classification.intent, classification.confidence, classification.resolved_task
        );

        self.reload_instructions_if_changed();
        let exec_context = ExecutionContext {
            conversation: context,
            instructions: self.instructions.clone(),
        };

        let outcome = self
            .executor
            .run(&classification.resolved_task, &exec_context)
            .await?;

        let judgment = match &self.judge {
            Some(judge) => Some(
                judge
                    .evaluate(&classification.resolved_task, &outcome.solution, None)
                    .await?,
            ),
            None => None,
        };
        let score = judgment.as_ref().map(|j| j.score).unwrap_or(outcome.score);
        let suggestions = judgment
            .as_ref()
            .map(|j| j.suggestions.clone())
            .unwrap_or_default();

        self.store
            .append_result(&TrainingResult::new(
                classification.resolved_task.clone(),
                outcome.solution.clone(),
                outcome.score,
                outcome.feedback.clone(),
            ))
            .await?;

        let turn = self.memory.add_turn(
            raw_input,
            classification.resolved_task.clone(),
            outcome.solution.clone(),
            score,
            suggestions.clone(),
            judgment,
        )?;

        Ok(TurnReport {
            classification,
            solution: outcome.solution,
            score,
            suggestions,
            turn_number: turn.turn_number,
        })
    }

    /// Hot-swap the instruction snapshot when the optimizer published a
    /// new one since we last looked. `updated_at` is the change token.
    fn reload_instructions_if_changed(&mut self) {
        match self.store.load_instructions() {
            Some(snapshot) if self.loaded_at != Some(snapshot.updated_at) => {
                info!(
                    "Hot-swapped instruction snapshot generation {} (score {:.2})",
                    snapshot.generation, snapshot.score
                );
                self.loaded_at = Some(snapshot.updated_at);
                self.instructions = snapshot.instructions;
            }
            Some(_) => {}
            None => {
                if self.loaded_at.take().is_some() {
                    info!("Instruction snapshot gone; reverting to built-in defaults");
                    self.instructions.clear();
                }
            }
        }
    }
}
