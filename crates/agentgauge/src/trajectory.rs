//! Deterministic trajectory scorers.
//!
//! These score the *path* an agent took, not just its final answer. All of
//! them operate over the flattened (parent-before-children) span sequence
//! of the context's trace and are pure functions of it.

use crate::error::{EvalError, Result};
use crate::scorer::{ScoreContext, ScoreResult, Scorer};
use crate::trace::{Span, SpanKind, SpanStatus, Trace};
use async_trait::async_trait;
use serde_json::Value;

/// Plan-adherence fallback when a plan exists but its action list cannot be
/// parsed. Heuristic constant kept for behavioral compatibility.
pub const UNPARSEABLE_PLAN_SCORE: f64 = 0.7;

fn require_trace<'a>(ctx: &'a ScoreContext, scorer: &str) -> Result<&'a Trace> {
    ctx.trace
        .as_ref()
        .ok_or_else(|| EvalError::scorer(scorer, "context has no trace"))
}

/// Scores how close the executed step count came to the expected minimum:
/// `min(1, min_steps_expected / actual_steps)`.
#[derive(Debug, Clone, Default)]
pub struct PathOptimalityScorer {
    /// Minimum steps an optimal agent would need. When unset it defaults to
    /// the actual step count, which yields 1.0.
    pub min_steps_expected: Option<usize>,
}

impl PathOptimalityScorer {
    /// Scorer with a known optimal step count.
    #[must_use]
    pub fn with_min_steps(min_steps: usize) -> Self {
        Self {
            min_steps_expected: Some(min_steps),
        }
    }
}

#[async_trait]
impl Scorer for PathOptimalityScorer {
    fn name(&self) -> &str {
        "path_optimality"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let trace = require_trace(ctx, self.name())?;
        let actual = trace.tool_spans().len();

        if actual == 0 {
            return Ok(ScoreResult::new(1.0, "No tool steps, vacuously optimal"));
        }

        let expected = self.min_steps_expected.unwrap_or(actual);
        let value = (expected as f64 / actual as f64).min(1.0);
        Ok(ScoreResult::new(
            value,
            format!("{actual} steps taken, {expected} expected at minimum"),
        ))
    }
}

/// Penalizes contradictory behavior: exact repeated `(tool, input)` pairs
/// and undo patterns (a step immediately reversed on the same payload).
#[derive(Debug, Clone, Default)]
pub struct StepConsistencyScorer;

/// Tool-name prefix pairs treated as an undo when they act on an identical
/// input payload back to back.
const UNDO_PREFIXES: &[(&str, &str)] = &[
    ("create", "delete"),
    ("add", "remove"),
    ("write", "delete"),
    ("open", "close"),
];

fn is_undo(first: &Span, second: &Span) -> bool {
    if first.input != second.input {
        return false;
    }
    let a = first.tool().to_lowercase();
    let b = second.tool().to_lowercase();
    UNDO_PREFIXES
        .iter()
        .any(|(do_p, undo_p)| a.starts_with(do_p) && b.starts_with(undo_p))
}

#[async_trait]
impl Scorer for StepConsistencyScorer {
    fn name(&self) -> &str {
        "step_consistency"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let trace = require_trace(ctx, self.name())?;
        let steps = trace.tool_spans();
        let total = steps.len();

        if total <= 1 {
            return Ok(ScoreResult::new(1.0, "Too few steps to contradict"));
        }

        let mut contradictions = 0usize;

        // Exact repeats: every occurrence of a (tool, input) pair beyond the
        // first counts once.
        let mut seen: Vec<(&str, &Option<Value>)> = Vec::with_capacity(total);
        for step in &steps {
            let key = (step.tool(), &step.input);
            if seen.contains(&key) {
                contradictions += 1;
            } else {
                seen.push(key);
            }
        }

        // Undo patterns between adjacent steps.
        for pair in steps.windows(2) {
            if is_undo(pair[0], pair[1]) {
                contradictions += 1;
            }
        }

        let value = 1.0 - contradictions as f64 / (total - 1).max(1) as f64;
        Ok(ScoreResult::new(
            value,
            format!("{contradictions} contradictions across {total} steps"),
        ))
    }
}

/// Fraction of error steps the agent recovered from, where a recovery is an
/// error immediately followed by a success of the same tool.
#[derive(Debug, Clone, Default)]
pub struct RecoveryEfficiencyScorer;

#[async_trait]
impl Scorer for RecoveryEfficiencyScorer {
    fn name(&self) -> &str {
        "recovery_efficiency"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let trace = require_trace(ctx, self.name())?;
        let steps = trace.tool_spans();

        let mut errors = 0usize;
        let mut recovered = 0usize;
        for (idx, step) in steps.iter().enumerate() {
            if step.status != SpanStatus::Error {
                continue;
            }
            errors += 1;
            if let Some(next) = steps.get(idx + 1) {
                if next.status == SpanStatus::Ok && next.tool() == step.tool() {
                    recovered += 1;
                }
            }
        }

        if errors == 0 {
            return Ok(ScoreResult::new(1.0, "No errors encountered"));
        }

        let value = recovered as f64 / errors as f64;
        Ok(ScoreResult::new(
            value,
            format!("Recovered from {recovered} of {errors} errors"),
        ))
    }
}

/// Measures how much of a declared plan was actually executed.
#[derive(Debug, Clone, Default)]
pub struct PlanAdherenceScorer;

impl PlanAdherenceScorer {
    /// Extract the declared action list from a planning span, trying the
    /// output payload first and the input second. Returns `None` when no
    /// machine-readable action list is present.
    fn extract_actions(plan: &Span) -> Option<Vec<String>> {
        plan.output
            .as_ref()
            .and_then(parse_action_list)
            .or_else(|| plan.input.as_ref().and_then(parse_action_list))
    }
}

/// Parse an action list out of a JSON payload: either a bare array or an
/// object with an `actions`/`steps` array, whose items are strings or
/// objects carrying a `tool`/`action`/`name` field.
fn parse_action_list(value: &Value) -> Option<Vec<String>> {
    let array = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("actions")
            .or_else(|| map.get("steps"))
            .and_then(Value::as_array)?,
        Value::String(raw) => {
            // Plans sometimes arrive as a JSON string payload.
            return serde_json::from_str::<Value>(raw)
                .ok()
                .as_ref()
                .and_then(parse_action_list);
        }
        _ => return None,
    };

    let mut actions = Vec::with_capacity(array.len());
    for item in array {
        let action = match item {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("tool")
                .or_else(|| map.get("action"))
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)?
                .to_string(),
            _ => return None,
        };
        actions.push(action);
    }

    if actions.is_empty() {
        None
    } else {
        Some(actions)
    }
}

#[async_trait]
impl Scorer for PlanAdherenceScorer {
    fn name(&self) -> &str {
        "plan_adherence"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let trace = require_trace(ctx, self.name())?;
        let spans = trace.flatten();

        let Some(plan) = spans.iter().find(|s| s.kind == SpanKind::Planning) else {
            return Ok(ScoreResult::new(1.0, "No planning spans"));
        };

        let executed: Vec<&str> = trace.tool_spans().iter().map(|s| s.tool()).collect();
        if executed.is_empty() {
            return Ok(ScoreResult::new(
                0.0,
                "Plan declared but no tool steps executed",
            ));
        }

        let Some(planned) = Self::extract_actions(plan) else {
            // Deliberate fallback, not an error: the plan exists but its
            // actions are not machine-extractable.
            return Ok(ScoreResult::new(
                UNPARSEABLE_PLAN_SCORE,
                "Plan present but actions could not be extracted",
            ));
        };

        let followed = planned
            .iter()
            .filter(|action| executed.contains(&action.as_str()))
            .count();
        let value = followed as f64 / planned.len() as f64;
        Ok(ScoreResult::new(
            value,
            format!("Executed {followed} of {} planned actions", planned.len()),
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(id: &str, name: &str) -> Span {
        Span::new(id, name, SpanKind::Tool).with_tool(name)
    }

    fn ctx(spans: Vec<Span>) -> ScoreContext {
        ScoreContext {
            trace: Some(Trace::new("t", spans)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_path_optimality_half() {
        let spans = vec![
            tool("1", "a"),
            tool("2", "b"),
            tool("3", "c"),
            tool("4", "d"),
        ];
        let scorer = PathOptimalityScorer::with_min_steps(2);
        let score = scorer.evaluate(&ctx(spans)).await.unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_path_optimality_caps_at_one() {
        let scorer = PathOptimalityScorer::with_min_steps(5);
        let score = scorer.evaluate(&ctx(vec![tool("1", "a")])).await.unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_path_optimality_vacuous_without_tools() {
        let spans = vec![Span::new("g", "answer", SpanKind::Generation)];
        let scorer = PathOptimalityScorer::default();
        let score = scorer.evaluate(&ctx(spans)).await.unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_path_optimality_unset_min_defaults_to_actual() {
        let scorer = PathOptimalityScorer::default();
        let score = scorer
            .evaluate(&ctx(vec![tool("1", "a"), tool("2", "b")]))
            .await
            .unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_step_consistency_penalizes_exact_repeat() {
        let spans = vec![
            tool("1", "search").with_input(json!({"q": "rust"})),
            tool("2", "fetch").with_input(json!({"url": "a"})),
            tool("3", "search").with_input(json!({"q": "rust"})),
        ];
        let score = StepConsistencyScorer.evaluate(&ctx(spans)).await.unwrap();
        // 1 contradiction over (3 - 1) steps.
        assert!((score.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_step_consistency_penalizes_undo() {
        let spans = vec![
            tool("1", "create_file").with_input(json!({"path": "/tmp/x"})),
            tool("2", "delete_file").with_input(json!({"path": "/tmp/x"})),
        ];
        let score = StepConsistencyScorer.evaluate(&ctx(spans)).await.unwrap();
        assert!((score.value - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_step_consistency_single_step_is_perfect() {
        let score = StepConsistencyScorer
            .evaluate(&ctx(vec![tool("1", "a")]))
            .await
            .unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_recovery_no_errors() {
        let score = RecoveryEfficiencyScorer
            .evaluate(&ctx(vec![tool("1", "a"), tool("2", "b")]))
            .await
            .unwrap();
        assert_eq!(score.value, 1.0);
        assert_eq!(score.reason, "No errors encountered");
    }

    #[tokio::test]
    async fn test_recovery_half_recovered() {
        let spans = vec![
            tool("1", "fetch").with_status(SpanStatus::Error),
            tool("2", "fetch"),
            tool("3", "parse").with_status(SpanStatus::Error),
            tool("4", "other"),
        ];
        let score = RecoveryEfficiencyScorer
            .evaluate(&ctx(spans))
            .await
            .unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_plan_adherence_no_plan() {
        let score = PlanAdherenceScorer
            .evaluate(&ctx(vec![tool("1", "a")]))
            .await
            .unwrap();
        assert_eq!(score.value, 1.0);
        assert_eq!(score.reason, "No planning spans");
    }

    #[tokio::test]
    async fn test_plan_adherence_plan_without_execution() {
        let plan = Span::new("p", "plan", SpanKind::Planning)
            .with_output(json!({"actions": ["search", "summarize"]}));
        let score = PlanAdherenceScorer.evaluate(&ctx(vec![plan])).await.unwrap();
        assert_eq!(score.value, 0.0);
    }

    #[tokio::test]
    async fn test_plan_adherence_partial_overlap() {
        let plan = Span::new("p", "plan", SpanKind::Planning)
            .with_output(json!({"actions": ["search", "fetch", "summarize"]}));
        let spans = vec![plan, tool("1", "search"), tool("2", "fetch")];
        let score = PlanAdherenceScorer.evaluate(&ctx(spans)).await.unwrap();
        assert!((score.value - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_plan_adherence_unparseable_fallback() {
        let plan = Span::new("p", "plan", SpanKind::Planning)
            .with_output(json!("First I will search, then summarize."));
        let spans = vec![plan, tool("1", "search")];
        let score = PlanAdherenceScorer.evaluate(&ctx(spans)).await.unwrap();
        assert!((score.value - UNPARSEABLE_PLAN_SCORE).abs() < 1e-9);
        assert!(score.reason.contains("could not be extracted"));
    }

    #[test]
    fn test_parse_action_list_variants() {
        assert_eq!(
            parse_action_list(&json!(["a", "b"])),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            parse_action_list(&json!({"steps": [{"tool": "search"}]})),
            Some(vec!["search".to_string()])
        );
        assert_eq!(parse_action_list(&json!(42)), None);
        assert_eq!(parse_action_list(&json!({"actions": []})), None);
    }
}
