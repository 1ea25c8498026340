//! Conversation memory with a bounded turn window and persistence
//!
//! Retains at most `max_turns` turns (oldest evicted first), tracks the
//! suggestions pending from the latest turn, and projects a lean
//! [`TaskContext`] for the router and executor. The full window is
//! persisted after every mutation; a corrupt persisted file resets to an
//! empty conversation instead of failing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::types::{ConversationTurn, Judgment, TaskContext};

/// Solutions longer than this are truncated in the context projection.
const SUMMARY_LIMIT: usize = 200;
const TRUNCATION_MARKER: &str = "...";

/// On-disk shape of the `conversation` artifact.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedConversation {
    #[serde(default)]
    turns: Vec<ConversationTurn>,
    #[serde(default)]
    current_suggestions: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Bounded conversation window.
pub struct ConversationMemory {
    path: PathBuf,
    max_turns: usize,
    turns: Vec<ConversationTurn>,
    current_suggestions: Vec<String>,
}

impl ConversationMemory {
    /// Open (or create) the conversation persisted at `path`.
    pub fn open(path: impl Into<PathBuf>, max_turns: usize) -> Self {
        let path = path.into();
        let persisted = Self::load(&path);
        Self {
            path,
            max_turns,
            turns: persisted.turns,
            current_suggestions: persisted.current_suggestions,
        }
    }

    fn load(path: &PathBuf) -> PersistedConversation {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PersistedConversation::default()
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return PersistedConversation::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(
                    "Malformed conversation at {} ({}); starting empty",
                    path.display(),
                    e
                );
                PersistedConversation::default()
            }
        }
    }

    /// Record one completed turn.
    ///
    /// The turn number is the retained-window length plus one at append
    /// time (windowed numbering, not a global id). The turn's suggestions
    /// replace the pending suggestion list, and the whole window is
    /// persisted before returning.
    pub fn add_turn(
        &mut self,
        task: impl Into<String>,
        resolved_task: impl Into<String>,
        solution: impl Into<String>,
        score: f64,
        suggestions: Vec<String>,
        judgment: Option<Judgment>,
    ) -> Result<ConversationTurn> {
        let turn = ConversationTurn {
            task: task.into(),
            resolved_task: resolved_task.into(),
            solution: solution.into(),
            score,
            suggestions: suggestions.clone(),
            judgment,
            timestamp: Utc::now(),
            turn_number: self.turns.len() + 1,
        };

        self.turns.push(turn.clone());
        while self.turns.len() > self.max_turns {
            let evicted = self.turns.remove(0);
            debug!("Evicted conversation turn {}", evicted.turn_number);
        }
        self.current_suggestions = suggestions;

        self.persist()?;
        Ok(turn)
    }

    /// Lean context derived from the last retained turn only.
    pub fn to_context(&self) -> TaskContext {
        let last = self.turns.last();
        TaskContext {
            previous_task: last.map(|t| t.resolved_task.clone()),
            previous_solution_summary: last.map(|t| summarize(&t.solution)),
            available_suggestions: self.current_suggestions.clone(),
        }
    }

    /// Pending suggestion at a 1-based index.
    pub fn suggestion_at(&self, index: usize) -> Option<&str> {
        if index < 1 {
            return None;
        }
        self.current_suggestions.get(index - 1).map(|s| s.as_str())
    }

    /// Copy of the pending suggestion list.
    pub fn current_suggestions(&self) -> Vec<String> {
        self.current_suggestions.clone()
    }

    /// The retained turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget everything and delete the persisted artifact.
    pub fn clear(&mut self) -> Result<()> {
        self.turns.clear();
        self.current_suggestions.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete {}", self.path.display()))
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let persisted = PersistedConversation {
            turns: self.turns.clone(),
            current_suggestions: self.current_suggestions.clone(),
            updated_at: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Truncate a solution for the context projection: at most 200 characters
/// plus a 3-character marker (203 total when truncated).
fn summarize(solution: &str) -> String {
    if solution.chars().count() <= SUMMARY_LIMIT {
        return solution.to_string();
    }
    let mut summary: String = solution.chars().take(SUMMARY_LIMIT).collect();
    summary.push_str(TRUNCATION_MARKER);
    summary
}
