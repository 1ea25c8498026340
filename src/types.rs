//! Shared types used across modules
//!
//! This module contains the data model shared by the learning store,
//! conversation memory, intent router, and optimizer to avoid circular
//! dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One captured outcome of a task execution, used as optimization input.
///
/// Immutable once created; identity is its position in the training buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingResult {
    pub task: String,
    pub solution: String,
    /// Score in `[0, 10]`.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    pub timestamp: DateTime<Utc>,
}

impl TrainingResult {
    /// Create a result stamped with the current time.
    pub fn new(task: impl Into<String>, solution: impl Into<String>, score: f64, feedback: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            solution: solution.into(),
            score,
            feedback: feedback.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The currently-active, versioned per-role instruction configuration
/// for the task executor.
///
/// Exactly one snapshot is current at a time; `generation` increases by one
/// per successful optimization pass and `updated_at` is the change-detection
/// token used for hot reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstructionSnapshot {
    /// Role name to instruction text. `None` means "use the built-in
    /// default for this role". Open-ended so new optimization targets can
    /// be added without reshaping the snapshot format.
    #[serde(default)]
    pub instructions: HashMap<String, Option<String>>,
    /// Aggregate score reported by the optimization engine for this
    /// snapshot.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl InstructionSnapshot {
    /// Instruction text for a role, if one is set.
    pub fn instruction_for(&self, role: &str) -> Option<&str> {
        self.instructions.get(role).and_then(|i| i.as_deref())
    }
}

/// Verdict produced by the external judge collaborator. Stored opaquely
/// on the conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgment {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub critique: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// A single interaction recorded in the conversation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Raw user input.
    pub task: String,
    /// Task actually executed, after intent routing.
    pub resolved_task: String,
    pub solution: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub judgment: Option<Judgment>,
    pub timestamp: DateTime<Utc>,
    /// Windowed number: retained-window length + 1 at append time.
    /// Not a global monotonic id; eviction makes numbering drift.
    #[serde(default)]
    pub turn_number: usize,
}

/// Lean projection of the conversation window handed to the router and
/// the task executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    pub previous_task: Option<String>,
    pub previous_solution_summary: Option<String>,
    pub available_suggestions: Vec<String>,
}

impl TaskContext {
    pub fn is_empty(&self) -> bool {
        self.previous_task.is_none()
            && self.previous_solution_summary.is_none()
            && self.available_suggestions.is_empty()
    }
}

/// What the user wants done with their input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// A fresh task, unrelated to pending suggestions.
    NewTask,
    /// Continue or refine the previous task.
    FollowUp,
    /// Execute one of the currently pending suggestions.
    SelectSuggestion,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::NewTask => write!(f, "new_task"),
            Intent::FollowUp => write!(f, "follow_up"),
            Intent::SelectSuggestion => write!(f, "select_suggestion"),
        }
    }
}

/// Routed interpretation of a piece of raw user input.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentClassification {
    pub intent: Intent,
    /// The actionable task text to execute.
    pub resolved_task: String,
    /// 1-based index into the pending suggestion list, when the intent is
    /// a selection.
    pub suggestion_index: Option<usize>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

/// What the external task executor returns for one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub solution: String,
    pub score: f64,
    pub feedback: String,
}
