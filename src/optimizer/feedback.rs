//! Per-role feedback decomposition
//!
//! Raw judge feedback covers the whole task. Each independently tunable
//! role only wants the lines that concern it, so the optimizer hands the
//! engine a map of role-specific line filters.

use std::collections::HashMap;

/// Lines matching these are relevant to every role.
const SHARED_KEYWORDS: &[&str] = &["score", "critique", "suggestion"];

const REASONING_KEYWORDS: &[&str] = &["reason", "think", "plan", "approach", "logic", "decision"];
const OBSERVATION_KEYWORDS: &[&str] = &["observ", "interpret", "understand", "result", "output"];

pub const REASONING_ROLE: &str = "reasoning";
pub const OBSERVATION_ROLE: &str = "observation";

/// Keyword line filter for one optimization role.
#[derive(Debug, Clone)]
pub struct FeedbackFilter {
    keywords: &'static [&'static str],
}

impl FeedbackFilter {
    fn new(keywords: &'static [&'static str]) -> Self {
        Self { keywords }
    }

    /// Keep the feedback lines relevant to this role.
    ///
    /// A line is relevant when it contains one of the role's keywords or
    /// one of the shared score/critique/suggestion markers. When nothing
    /// matches, the unfiltered feedback is returned so the role never
    /// optimizes against empty guidance.
    pub fn apply(&self, feedback: &str) -> String {
        let relevant: Vec<&str> = feedback
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                self.keywords
                    .iter()
                    .chain(SHARED_KEYWORDS.iter())
                    .any(|k| lower.contains(k))
            })
            .collect();

        if relevant.is_empty() {
            feedback.to_string()
        } else {
            relevant.join("\n")
        }
    }
}

/// Role name to feedback filter.
pub type FeedbackMap = HashMap<String, FeedbackFilter>;

/// The built-in optimization targets: the reasoning role and the
/// observation-interpretation role.
pub fn default_feedback_map() -> FeedbackMap {
    let mut map = HashMap::new();
    map.insert(
        REASONING_ROLE.to_string(),
        FeedbackFilter::new(REASONING_KEYWORDS),
    );
    map.insert(
        OBSERVATION_ROLE.to_string(),
        FeedbackFilter::new(OBSERVATION_KEYWORDS),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEEDBACK: &str = "The plan was sound but verbose.\n\
                            Output interpretation missed the error line.\n\
                            Score: 6/10\n\
                            Formatting was fine.";

    #[test]
    fn reasoning_filter_keeps_plan_and_score_lines() {
        let map = default_feedback_map();
        let filtered = map[REASONING_ROLE].apply(FEEDBACK);
        assert!(filtered.contains("plan was sound"));
        assert!(filtered.contains("Score: 6/10"));
        assert!(!filtered.contains("Formatting"));
        assert!(!filtered.contains("interpretation"));
    }

    #[test]
    fn observation_filter_keeps_output_and_score_lines() {
        let map = default_feedback_map();
        let filtered = map[OBSERVATION_ROLE].apply(FEEDBACK);
        assert!(filtered.contains("Output interpretation"));
        assert!(filtered.contains("Score: 6/10"));
        assert!(!filtered.contains("plan was sound"));
    }

    #[test]
    fn no_matching_lines_falls_back_to_full_feedback() {
        let map = default_feedback_map();
        let feedback = "Nothing relevant here.\nJust prose.";
        assert_eq!(map[REASONING_ROLE].apply(feedback), feedback);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let map = default_feedback_map();
        let filtered = map[REASONING_ROLE].apply("THE APPROACH WAS WRONG\nirrelevant");
        assert_eq!(filtered, "THE APPROACH WAS WRONG");
    }
}
