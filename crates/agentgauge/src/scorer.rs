//! Scorer contract and the built-in rule-based scorers.
//!
//! A scorer maps an evaluation context to a single `[0, 1]` value plus an
//! explanation. Rule-based and trajectory scorers are deterministic and
//! side-effect-free; the LLM judge (see [`crate::judge`]) performs one
//! external call per invocation, which is why the contract is async.

use crate::error::{EvalError, Result};
use crate::trace::{SpanStatus, Trace};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A single quality judgment: a clamped value and the reason behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Score in `[0.0, 1.0]`
    pub value: f64,

    /// Explanation of how the value was reached
    pub reason: String,
}

impl ScoreResult {
    /// Create a score, clamping the value into `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Everything a scorer may look at for one (case, output) pair.
#[derive(Debug, Clone, Default)]
pub struct ScoreContext {
    /// The test case input
    pub input: Map<String, Value>,

    /// The agent's output, if an agent was executed
    pub output: Option<Value>,

    /// The expected output declared on the test case
    pub expected_output: Option<Value>,

    /// The execution trace, if one was captured
    pub trace: Option<Trace>,
}

impl ScoreContext {
    /// Context carrying only a case definition (no agent execution).
    #[must_use]
    pub fn from_case(input: Map<String, Value>, expected_output: Option<Value>) -> Self {
        Self {
            input,
            output: None,
            expected_output,
            trace: None,
        }
    }

    /// The output rendered as text, for substring-style checks.
    #[must_use]
    pub fn output_text(&self) -> Option<String> {
        self.output.as_ref().map(value_as_text)
    }

    /// The expected output rendered as text.
    #[must_use]
    pub fn expected_text(&self) -> Option<String> {
        self.expected_output.as_ref().map(value_as_text)
    }
}

/// Render a JSON value as comparison text: strings verbatim, everything
/// else via its compact JSON form.
#[must_use]
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A pure function producing a `[0, 1]` quality judgment for one context.
///
/// Implementations must not fail for well-formed input; a malformed context
/// (e.g. a scorer that requires an expected output handed a case without
/// one) is a caller contract violation surfaced as [`EvalError::Scorer`].
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Stable name the suite references this scorer by.
    fn name(&self) -> &str;

    /// Evaluate one context.
    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult>;
}

/// Per-run scorer registry, passed explicitly into the runner.
///
/// A registry is a plain value, constructed per run and never shared
/// mutable state, so concurrent suites with different scorer sets cannot
/// interfere with each other.
#[derive(Default, Clone)]
pub struct ScorerRegistry {
    scorers: HashMap<String, Arc<dyn Scorer>>,
}

impl ScorerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scorer under its own name. Replaces any previous scorer
    /// with the same name.
    pub fn register(&mut self, scorer: Arc<dyn Scorer>) {
        self.scorers.insert(scorer.name().to_string(), scorer);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.register(scorer);
        self
    }

    /// Look up a scorer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Scorer>> {
        self.scorers.get(name).cloned()
    }

    /// Names of all registered scorers (unordered).
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.scorers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerRegistry")
            .field("scorers", &self.names())
            .finish()
    }
}

/// Substring containment against the expected output.
#[derive(Debug, Clone)]
pub struct ContainsScorer {
    /// Compare case-insensitively
    pub case_insensitive: bool,
}

impl ContainsScorer {
    /// Case-sensitive containment scorer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            case_insensitive: false,
        }
    }
}

impl Default for ContainsScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for ContainsScorer {
    fn name(&self) -> &str {
        "contains"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let expected = ctx
            .expected_text()
            .ok_or_else(|| EvalError::scorer(self.name(), "case has no expected output"))?;
        let output = ctx
            .output_text()
            .ok_or_else(|| EvalError::scorer(self.name(), "context has no output"))?;

        let found = if self.case_insensitive {
            output.to_lowercase().contains(&expected.to_lowercase())
        } else {
            output.contains(&expected)
        };

        if found {
            Ok(ScoreResult::new(1.0, "Output contains expected text"))
        } else {
            Ok(ScoreResult::new(
                0.0,
                format!("Output does not contain expected text {expected:?}"),
            ))
        }
    }
}

/// Detects errors in the execution: error-status spans when a trace is
/// available, error markers in the output text otherwise.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetectionScorer;

#[async_trait]
impl Scorer for ErrorDetectionScorer {
    fn name(&self) -> &str {
        "error_detection"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        if let Some(trace) = &ctx.trace {
            let spans = trace.flatten();
            if spans.is_empty() {
                return Ok(ScoreResult::new(1.0, "Empty trace, no errors"));
            }
            let errors = spans
                .iter()
                .filter(|s| s.status == SpanStatus::Error)
                .count();
            if errors == 0 {
                return Ok(ScoreResult::new(1.0, "No error spans in trace"));
            }
            let value = 1.0 - errors as f64 / spans.len() as f64;
            return Ok(ScoreResult::new(
                value,
                format!("{errors} of {} spans errored", spans.len()),
            ));
        }

        // No trace: fall back to scanning the output text.
        let output = ctx.output_text().unwrap_or_default();
        let lowered = output.to_lowercase();
        if lowered.contains("error") || lowered.contains("exception") {
            Ok(ScoreResult::new(0.0, "Output contains an error marker"))
        } else {
            Ok(ScoreResult::new(1.0, "No error markers in output"))
        }
    }
}

/// Checks that the tool named in the case input was actually invoked.
#[derive(Debug, Clone, Default)]
pub struct ToolSelectionScorer;

#[async_trait]
impl Scorer for ToolSelectionScorer {
    fn name(&self) -> &str {
        "tool_selection"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let expected_tool = ctx
            .input
            .get("tool")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::scorer(self.name(), "case input has no 'tool' field"))?;

        let Some(trace) = &ctx.trace else {
            return Ok(ScoreResult::new(0.0, "No trace available"));
        };

        let used = trace
            .tool_spans()
            .iter()
            .any(|s| s.tool() == expected_tool);
        if used {
            Ok(ScoreResult::new(
                1.0,
                format!("Tool '{expected_tool}' was invoked"),
            ))
        } else {
            Ok(ScoreResult::new(
                0.0,
                format!("Tool '{expected_tool}' was never invoked"),
            ))
        }
    }
}

/// Generic success scorer for cases with no better signal: the run succeeds
/// if it produced output and its trace (when present) has no error spans.
#[derive(Debug, Clone, Default)]
pub struct SuccessScorer;

#[async_trait]
impl Scorer for SuccessScorer {
    fn name(&self) -> &str {
        "success"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        if let Some(trace) = &ctx.trace {
            let errored = trace
                .flatten()
                .iter()
                .any(|s| s.status == SpanStatus::Error);
            if errored {
                return Ok(ScoreResult::new(0.0, "Trace contains error spans"));
            }
        }
        if ctx.output.is_some() || ctx.trace.is_some() {
            Ok(ScoreResult::new(1.0, "Run completed without errors"))
        } else {
            Ok(ScoreResult::new(0.0, "No output or trace produced"))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Span, SpanKind};
    use serde_json::json;

    fn ctx_with_output(output: &str, expected: &str) -> ScoreContext {
        ScoreContext {
            input: Map::new(),
            output: Some(json!(output)),
            expected_output: Some(json!(expected)),
            trace: None,
        }
    }

    #[tokio::test]
    async fn test_contains_scorer_pass_and_fail() {
        let scorer = ContainsScorer::new();
        let hit = scorer
            .evaluate(&ctx_with_output("Rust is a systems language", "systems"))
            .await
            .unwrap();
        assert_eq!(hit.value, 1.0);

        let miss = scorer
            .evaluate(&ctx_with_output("Rust is fast", "garbage collected"))
            .await
            .unwrap();
        assert_eq!(miss.value, 0.0);
    }

    #[tokio::test]
    async fn test_contains_scorer_case_insensitive() {
        let scorer = ContainsScorer {
            case_insensitive: true,
        };
        let hit = scorer
            .evaluate(&ctx_with_output("RUST IS FAST", "rust"))
            .await
            .unwrap();
        assert_eq!(hit.value, 1.0);
    }

    #[tokio::test]
    async fn test_contains_scorer_missing_expected_is_contract_violation() {
        let scorer = ContainsScorer::new();
        let ctx = ScoreContext {
            output: Some(json!("text")),
            ..Default::default()
        };
        let err = scorer.evaluate(&ctx).await.unwrap_err();
        assert!(matches!(err, EvalError::Scorer { .. }));
    }

    #[tokio::test]
    async fn test_error_detection_over_trace() {
        let trace = Trace::new(
            "t",
            vec![
                Span::new("a", "search", SpanKind::Tool),
                Span::new("b", "fetch", SpanKind::Tool).with_status(SpanStatus::Error),
            ],
        );
        let ctx = ScoreContext {
            trace: Some(trace),
            ..Default::default()
        };
        let score = ErrorDetectionScorer.evaluate(&ctx).await.unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_error_detection_over_output_text() {
        let score = ErrorDetectionScorer
            .evaluate(&ctx_with_output("Internal Error: boom", "x"))
            .await
            .unwrap();
        assert_eq!(score.value, 0.0);

        let score = ErrorDetectionScorer
            .evaluate(&ctx_with_output("all good", "x"))
            .await
            .unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_tool_selection_scorer() {
        let mut input = Map::new();
        input.insert("tool".to_string(), json!("search"));
        let trace = Trace::new(
            "t",
            vec![Span::new("a", "step", SpanKind::Tool).with_tool("search")],
        );
        let ctx = ScoreContext {
            input,
            trace: Some(trace),
            ..Default::default()
        };
        let score = ToolSelectionScorer.evaluate(&ctx).await.unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_success_scorer_requires_some_signal() {
        let score = SuccessScorer
            .evaluate(&ScoreContext::default())
            .await
            .unwrap();
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn test_score_result_clamps() {
        assert_eq!(ScoreResult::new(1.7, "r").value, 1.0);
        assert_eq!(ScoreResult::new(-0.3, "r").value, 0.0);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ScorerRegistry::new()
            .with(Arc::new(SuccessScorer))
            .with(Arc::new(ErrorDetectionScorer));
        assert!(registry.get("success").is_some());
        assert!(registry.get("error_detection").is_some());
        assert!(registry.get("missing").is_none());
    }
}
