//! LLM-as-judge scoring over an injected generation capability.
//!
//! The engine never talks to a provider directly: callers hand in a
//! [`Generator`] (a remote API, a local model, or a deterministic stub in
//! tests) and the judge builds the prompt, parses the structured response,
//! and clamps the score.

use crate::error::{EvalError, Result};
use crate::scorer::{value_as_text, ScoreContext, ScoreResult, Scorer};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Text-generation capability injected by the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a completion for the prompt.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Embedding capability injected by the caller, used only for similarity
/// computation during deduplication.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a dense vector.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f64>>;
}

/// Expected shape of a judge response.
#[derive(Debug, Deserialize)]
struct JudgePayload {
    score: f64,
    reason: String,
}

/// Scores output quality by delegating the judgment to an LLM.
pub struct LlmJudgeScorer {
    generator: Arc<dyn Generator>,
    criteria: String,
}

impl LlmJudgeScorer {
    /// Judge with the default criteria (overall response quality).
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self::with_criteria(
            generator,
            "overall quality: correctness, relevance and coherence of the response",
        )
    }

    /// Judge with custom scoring criteria.
    #[must_use]
    pub fn with_criteria(generator: Arc<dyn Generator>, criteria: impl Into<String>) -> Self {
        Self {
            generator,
            criteria: criteria.into(),
        }
    }

    fn build_prompt(&self, ctx: &ScoreContext) -> String {
        let input = serde_json::to_string(&ctx.input).unwrap_or_default();
        let output = ctx.output_text().unwrap_or_default();
        let expected_section = ctx
            .expected_output
            .as_ref()
            .map(|e| format!("EXPECTED/REFERENCE OUTPUT:\n{}\n\n", value_as_text(e)))
            .unwrap_or_default();

        format!(
            r#"You are an expert evaluator assessing the quality of an AI agent's output.

CRITERIA: {criteria}

INPUT:
{input}

OUTPUT TO EVALUATE:
{output}

{expected_section}INSTRUCTIONS:
Respond with ONLY a valid JSON object (no markdown, no explanations outside JSON):

{{
  "score": <number between 0.0 and 1.0>,
  "reason": "<2-3 sentence explanation of the score>"
}}

Provide your evaluation now:"#,
            criteria = self.criteria,
        )
    }

    /// Parse the judge's response, stripping markdown fences if present.
    fn parse_response(&self, response: &str) -> Result<ScoreResult> {
        let cleaned = response
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let payload: JudgePayload = serde_json::from_str(cleaned).map_err(|e| {
            EvalError::scorer(
                self.name(),
                format!("judge response is not valid JSON: {e}"),
            )
        })?;

        if !payload.score.is_finite() {
            return Err(EvalError::scorer(
                self.name(),
                "judge returned a non-finite score",
            ));
        }
        if payload.reason.trim().is_empty() {
            return Err(EvalError::scorer(
                self.name(),
                "judge returned an empty reason",
            ));
        }

        Ok(ScoreResult::new(payload.score, payload.reason))
    }
}

#[async_trait]
impl Scorer for LlmJudgeScorer {
    fn name(&self) -> &str {
        "output_quality"
    }

    async fn evaluate(&self, ctx: &ScoreContext) -> Result<ScoreResult> {
        let prompt = self.build_prompt(ctx);
        let response = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| EvalError::scorer(self.name(), format!("generation failed: {e:#}")))?;
        self.parse_response(&response)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Deterministic generator stub returning a fixed response.
    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn ctx() -> ScoreContext {
        ScoreContext {
            output: Some(json!("Rust is a systems language.")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_judge_parses_valid_response() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(
            r#"{"score": 0.85, "reason": "Accurate and concise."}"#.to_string(),
        )));
        let score = judge.evaluate(&ctx()).await.unwrap();
        assert!((score.value - 0.85).abs() < 1e-9);
        assert_eq!(score.reason, "Accurate and concise.");
    }

    #[tokio::test]
    async fn test_judge_strips_markdown_fences() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(
            "```json\n{\"score\": 0.5, \"reason\": \"Mediocre.\"}\n```".to_string(),
        )));
        let score = judge.evaluate(&ctx()).await.unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_judge_clamps_out_of_range_score() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(
            r#"{"score": 7.0, "reason": "Enthusiastic."}"#.to_string(),
        )));
        let score = judge.evaluate(&ctx()).await.unwrap();
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_judge_rejects_non_json() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(
            "I would rate this a solid B+".to_string(),
        )));
        let err = judge.evaluate(&ctx()).await.unwrap_err();
        assert!(matches!(err, EvalError::Scorer { .. }));
    }

    #[tokio::test]
    async fn test_judge_rejects_missing_reason() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(
            r#"{"score": 0.9, "reason": "  "}"#.to_string(),
        )));
        assert!(judge.evaluate(&ctx()).await.is_err());
    }

    #[test]
    fn test_prompt_includes_expected_section_only_when_present() {
        let judge = LlmJudgeScorer::new(Arc::new(FixedGenerator(String::new())));
        let without = judge.build_prompt(&ctx());
        assert!(!without.contains("EXPECTED/REFERENCE OUTPUT"));

        let mut with_expected = ctx();
        with_expected.expected_output = Some(json!("Rust is a safe systems language."));
        let with = judge.build_prompt(&with_expected);
        assert!(with.contains("EXPECTED/REFERENCE OUTPUT"));
    }
}
