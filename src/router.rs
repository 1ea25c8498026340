//! Intent router - deterministic fast paths over a probabilistic fallback
//!
//! Raw input runs through an ordered chain of pure matchers (numeral,
//! phrase + number, ordinal word, bare affirmative); the first match wins
//! and the external classifier is never invoked for it. Only input no rule
//! understands is delegated to the probabilistic collaborator.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::types::{Intent, IntentClassification, TaskContext};

/// Confidence assigned to deterministic suggestion selections.
const FAST_PATH_CONFIDENCE: f64 = 0.95;
/// Confidence assigned to the synthesized bare-affirmative follow-up.
const FOLLOW_UP_CONFIDENCE: f64 = 0.8;

/// Raw verdict from the probabilistic classifier collaborator.
#[derive(Debug, Clone, Default)]
pub struct ClassifierVerdict {
    pub intent_label: String,
    pub resolved_task: String,
    /// 1-based, advisory.
    pub suggestion_index: Option<usize>,
    pub confidence: f64,
    pub reasoning: String,
}

/// External model-backed intent classifier.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        context: &TaskContext,
    ) -> anyhow::Result<ClassifierVerdict>;
}

static PHRASE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:go with|go for|option|suggestion|yes|yeah|do|pick|choose|select)\b\D*?(\d+)",
    )
    .expect("phrase-number pattern is valid")
});

static ORDINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:the\s+)?(first|second|third|fourth|fifth)(?:\s+(?:one|suggestion|option))?\b")
        .expect("ordinal pattern is valid")
});

const AFFIRMATIVES: &[&str] = &[
    "yes", "yeah", "sure", "ok", "okay", "yep", "yup", "do it", "go ahead", "proceed", "continue",
];

/// A deterministic rule: returns `Some` only when it fully resolves the
/// input on its own.
type Matcher = fn(&str, &TaskContext) -> Option<IntentClassification>;

/// Priority-ordered rule chain; first non-empty result wins.
const MATCHERS: &[(&str, Matcher)] = &[
    ("numeral", match_numeral),
    ("phrase-number", match_phrase_number),
    ("ordinal", match_ordinal),
    ("affirmative", match_affirmative),
];

/// Hybrid deterministic/probabilistic intent router.
pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Resolve raw input into an actionable classification.
    pub async fn classify(
        &self,
        raw_input: &str,
        context: &TaskContext,
    ) -> anyhow::Result<IntentClassification> {
        let input = raw_input.trim();

        for (rule, matcher) in MATCHERS {
            if let Some(classification) = matcher(input, context) {
                debug!("Intent matched deterministically by {} rule", rule);
                return Ok(classification);
            }
        }

        debug!("No deterministic match; delegating to classifier");
        let verdict = self.classifier.classify(input, context).await?;
        Ok(normalize_verdict(verdict, input))
    }
}

/// Build a selection classification, provided `index` is in range.
fn select_suggestion(
    index: usize,
    context: &TaskContext,
    reasoning: String,
) -> Option<IntentClassification> {
    let text = context.available_suggestions.get(index.checked_sub(1)?)?;
    Some(IntentClassification {
        intent: Intent::SelectSuggestion,
        resolved_task: text.clone(),
        suggestion_index: Some(index),
        confidence: FAST_PATH_CONFIDENCE,
        reasoning,
    })
}

/// Rule 1: the whole input is a number, e.g. `"2"`.
fn match_numeral(input: &str, context: &TaskContext) -> Option<IntentClassification> {
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let index: usize = input.parse().ok()?;
    select_suggestion(
        index,
        context,
        format!("Input is the bare suggestion number {}", index),
    )
}

/// Rule 2: a selection phrase followed by a number, e.g. `"go with 2"`.
fn match_phrase_number(input: &str, context: &TaskContext) -> Option<IntentClassification> {
    let captures = PHRASE_NUMBER.captures(input)?;
    let index: usize = captures.get(1)?.as_str().parse().ok()?;
    select_suggestion(
        index,
        context,
        format!("Selection phrase names suggestion {}", index),
    )
}

/// Rule 3: an ordinal word, e.g. `"the second one"`.
fn match_ordinal(input: &str, context: &TaskContext) -> Option<IntentClassification> {
    let captures = ORDINAL.captures(input)?;
    let index = match captures.get(1)?.as_str().to_lowercase().as_str() {
        "first" => 1,
        "second" => 2,
        "third" => 3,
        "fourth" => 4,
        "fifth" => 5,
        _ => return None,
    };
    select_suggestion(
        index,
        context,
        format!("Ordinal word names suggestion {}", index),
    )
}

/// Rule 4: a bare affirmative token.
///
/// With suggestions pending this is inherently ambiguous (which one?), so
/// the rule deliberately falls through to the probabilistic path instead of
/// guessing an index. Without suggestions but with a previous task it is a
/// follow-up on that task.
fn match_affirmative(input: &str, context: &TaskContext) -> Option<IntentClassification> {
    let normalized = input
        .to_lowercase()
        .trim_end_matches(['!', '.', '?'])
        .trim()
        .to_string();
    if !AFFIRMATIVES.contains(&normalized.as_str()) {
        return None;
    }
    if !context.available_suggestions.is_empty() {
        return None;
    }
    let previous = context.previous_task.as_ref()?;
    Some(IntentClassification {
        intent: Intent::FollowUp,
        resolved_task: format!("Continue working on the previous task: {}", previous),
        suggestion_index: None,
        confidence: FOLLOW_UP_CONFIDENCE,
        reasoning: "Affirmative with no pending suggestions; continuing previous task".to_string(),
    })
}

/// Normalize a collaborator verdict into the three-variant enum.
/// Unrecognized or empty labels default to a new task; an empty resolved
/// task falls back to the raw input.
fn normalize_verdict(verdict: ClassifierVerdict, raw_input: &str) -> IntentClassification {
    let label: String = verdict
        .intent_label
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let intent = match label.as_str() {
        "followup" => Intent::FollowUp,
        "selectsuggestion" => Intent::SelectSuggestion,
        "newtask" => Intent::NewTask,
        _ => Intent::NewTask,
    };

    let resolved_task = if verdict.resolved_task.trim().is_empty() {
        raw_input.to_string()
    } else {
        verdict.resolved_task
    };

    IntentClassification {
        intent,
        resolved_task,
        suggestion_index: verdict.suggestion_index,
        confidence: verdict.confidence,
        reasoning: verdict.reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier double that counts invocations and replays a fixed verdict.
    struct ScriptedClassifier {
        verdict: ClassifierVerdict,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(verdict: ClassifierVerdict) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntentClassifier for ScriptedClassifier {
        async fn classify(
            &self,
            _input: &str,
            _context: &TaskContext,
        ) -> anyhow::Result<ClassifierVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    fn context_with_suggestions(suggestions: &[&str]) -> TaskContext {
        TaskContext {
            previous_task: Some("refactor the parser".to_string()),
            previous_solution_summary: Some("done".to_string()),
            available_suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn router() -> (Arc<ScriptedClassifier>, IntentRouter) {
        let classifier = ScriptedClassifier::new(ClassifierVerdict {
            intent_label: "new_task".to_string(),
            resolved_task: "from classifier".to_string(),
            confidence: 0.5,
            ..Default::default()
        });
        let router = IntentRouter::new(classifier.clone());
        (classifier, router)
    }

    #[tokio::test]
    async fn bare_numeral_selects_without_classifier() {
        let (classifier, router) = router();
        let context = context_with_suggestions(&["A", "B", "C"]);

        let result = router.classify("2", &context).await.unwrap();
        assert_eq!(result.intent, Intent::SelectSuggestion);
        assert_eq!(result.suggestion_index, Some(2));
        assert_eq!(result.resolved_task, "B");
        assert_eq!(result.confidence, 0.95);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn out_of_range_numeral_falls_through() {
        let (classifier, router) = router();
        let context = context_with_suggestions(&["A", "B", "C"]);

        let result = router.classify("7", &context).await.unwrap();
        assert_eq!(result.intent, Intent::NewTask);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn phrase_with_number_selects() {
        let (classifier, router) = router();
        let context = context_with_suggestions(&["A", "B", "C"]);

        for input in ["go with 2", "pick option 2", "select suggestion 2", "yeah 2"] {
            let result = router.classify(input, &context).await.unwrap();
            assert_eq!(result.intent, Intent::SelectSuggestion, "input: {}", input);
            assert_eq!(result.suggestion_index, Some(2), "input: {}", input);
            assert_eq!(result.resolved_task, "B", "input: {}", input);
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn ordinal_words_map_to_indices() {
        let (classifier, router) = router();
        let context = context_with_suggestions(&["A", "B", "C"]);

        let result = router.classify("the second one", &context).await.unwrap();
        assert_eq!(result.suggestion_index, Some(2));
        assert_eq!(result.resolved_task, "B");

        let result = router.classify("first", &context).await.unwrap();
        assert_eq!(result.suggestion_index, Some(1));
        assert_eq!(result.resolved_task, "A");

        // "fifth" is past the end of a 3-item list: no deterministic match.
        let result = router.classify("the fifth option", &context).await.unwrap();
        assert_eq!(result.intent, Intent::NewTask);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn bare_yes_with_suggestions_is_ambiguous() {
        let (classifier, router) = router();
        let context = context_with_suggestions(&["A", "B"]);

        let result = router.classify("yes", &context).await.unwrap();
        assert_eq!(result.intent, Intent::NewTask);
        assert_eq!(result.resolved_task, "from classifier");
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn bare_yes_without_suggestions_follows_up() {
        let (classifier, router) = router();
        let context = TaskContext {
            previous_task: Some("X".to_string()),
            previous_solution_summary: None,
            available_suggestions: vec![],
        };

        let result = router.classify("yes", &context).await.unwrap();
        assert_eq!(result.intent, Intent::FollowUp);
        assert!(result.resolved_task.contains("X"));
        assert_eq!(result.confidence, 0.8);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn multiword_affirmatives_follow_up() {
        let (classifier, router) = router();
        let context = TaskContext {
            previous_task: Some("X".to_string()),
            ..Default::default()
        };

        for input in ["do it", "go ahead", "proceed", "Okay!"] {
            let result = router.classify(input, &context).await.unwrap();
            assert_eq!(result.intent, Intent::FollowUp, "input: {}", input);
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn affirmative_with_no_history_goes_probabilistic() {
        let (classifier, router) = router();
        let result = router
            .classify("sure", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::NewTask);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn classifier_labels_are_normalized() {
        for (label, expected) in [
            ("FOLLOW_UP", Intent::FollowUp),
            ("follow up", Intent::FollowUp),
            ("SelectSuggestion", Intent::SelectSuggestion),
            ("new_task", Intent::NewTask),
            ("something weird", Intent::NewTask),
            ("", Intent::NewTask),
        ] {
            let classifier = ScriptedClassifier::new(ClassifierVerdict {
                intent_label: label.to_string(),
                resolved_task: "task".to_string(),
                ..Default::default()
            });
            let router = IntentRouter::new(classifier.clone());
            let result = router
                .classify("write me a haiku", &TaskContext::default())
                .await
                .unwrap();
            assert_eq!(result.intent, expected, "label: {:?}", label);
        }
    }

    #[tokio::test]
    async fn empty_resolved_task_falls_back_to_raw_input() {
        let classifier = ScriptedClassifier::new(ClassifierVerdict::default());
        let router = IntentRouter::new(classifier);
        let result = router
            .classify("summarize the logs", &TaskContext::default())
            .await
            .unwrap();
        assert_eq!(result.resolved_task, "summarize the logs");
    }
}
