//! Test-case generation: mines failed production traces into candidate
//! regression cases through a four-stage pipeline of extraction,
//! adversarial synthesis, deduplication and priority ranking.
//!
//! The LLM and embedding capabilities are optional: without a
//! [`Generator`] the synthesis stage is skipped, and without an
//! [`Embedder`] deduplication falls back to token-overlap similarity.
//! Given fixed inputs the pipeline is deterministic.

use crate::error::Result;
use crate::judge::{Embedder, Generator};
use crate::suite::Suite;
use crate::trace::{FailedTrace, Span, SpanKind, SpanStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// How a candidate case came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Derived directly from a failed span
    Extraction,
    /// Synthesized from historical patterns
    Synthesis,
    /// Adversarial variant of an extracted case
    Adversarial,
}

/// Review state of a generated case. Everything starts pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    PendingReview,
    Approved,
    Rejected,
}

/// Provenance of a generated case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
    /// Traces this case was mined from; never empty for extraction
    pub source_trace_ids: Vec<String>,

    /// Failure pattern of the source trace, if known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_pattern: Option<String>,

    pub generation_method: GenerationMethod,

    pub generated_at: DateTime<Utc>,
}

/// A candidate regression test awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTestCase {
    pub id: String,

    pub input: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_output: Option<Value>,

    /// Scorers inferred from the source span's shape
    pub scorers: Vec<String>,

    /// Composite ranking score in `[0, 1]`
    pub priority: f64,

    pub lineage: Lineage,

    pub status: ReviewStatus,

    /// Maximum similarity to any case in the existing suite, in `[0, 1]`
    pub similarity_to_existing: f64,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Candidates at least this similar to an existing case are dropped
    /// (default: 0.85)
    pub dedup_threshold: f64,

    /// Cap on the number of cases returned (default: 20)
    pub max_test_cases: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.85,
            max_test_cases: 20,
        }
    }
}

/// Output of one pipeline run: ranked survivors plus the candidates
/// dedup excluded (with their similarity recorded, for audit).
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub cases: Vec<GeneratedTestCase>,

    pub excluded: Vec<GeneratedTestCase>,
}

/// Shape the synthesis stage expects back from the LLM.
#[derive(Debug, Deserialize)]
struct SynthesizedCase {
    input: Map<String, Value>,
    #[serde(default)]
    expected_output: Option<Value>,
}

/// The four-stage generation pipeline.
pub struct TestCaseGenerator {
    config: GeneratorConfig,
    generator: Option<Arc<dyn Generator>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl TestCaseGenerator {
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            generator: None,
            embedder: None,
        }
    }

    /// Enable adversarial synthesis through the given generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use embedding cosine similarity for deduplication instead of the
    /// token-overlap fallback.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run the pipeline: extract from failures, synthesize adversarial
    /// variants, dedupe against the existing suite, rank and truncate.
    pub async fn generate(
        &self,
        failures: &[FailedTrace],
        existing: &Suite,
    ) -> Result<GenerationReport> {
        let mut candidates: Vec<GeneratedTestCase> =
            failures.iter().filter_map(extract_case).collect();
        tracing::info!(
            failures = failures.len(),
            extracted = candidates.len(),
            "extraction complete"
        );

        if let Some(generator) = &self.generator {
            let adversarial = self.synthesize(generator.as_ref(), &candidates).await;
            tracing::info!(synthesized = adversarial.len(), "synthesis complete");
            candidates.extend(adversarial);
        }

        let (mut survivors, excluded) = self.dedupe(candidates, existing).await;
        tracing::info!(
            kept = survivors.len(),
            excluded = excluded.len(),
            "deduplication complete"
        );

        self.prioritize(&mut survivors, failures);
        survivors.truncate(self.config.max_test_cases);

        Ok(GenerationReport {
            cases: survivors,
            excluded,
        })
    }

    /// Ask the LLM for one adversarial variant per extracted case.
    /// Unparseable responses drop that variant only.
    async fn synthesize(
        &self,
        generator: &dyn Generator,
        extracted: &[GeneratedTestCase],
    ) -> Vec<GeneratedTestCase> {
        let mut out = Vec::new();
        for case in extracted {
            let prompt = build_adversarial_prompt(case);
            let response = match generator.generate(&prompt).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(case_id = %case.id, error = %e, "synthesis call failed, skipping");
                    continue;
                }
            };
            match parse_synthesized(&response) {
                Some(parsed) => out.push(GeneratedTestCase {
                    id: Uuid::new_v4().to_string(),
                    input: parsed.input,
                    expected_output: parsed.expected_output,
                    scorers: case.scorers.clone(),
                    priority: 0.0,
                    lineage: Lineage {
                        source_trace_ids: case.lineage.source_trace_ids.clone(),
                        source_pattern: case.lineage.source_pattern.clone(),
                        generation_method: GenerationMethod::Adversarial,
                        generated_at: Utc::now(),
                    },
                    status: ReviewStatus::PendingReview,
                    similarity_to_existing: 0.0,
                }),
                None => {
                    tracing::debug!(case_id = %case.id, "synthesis response unparseable, skipping");
                }
            }
        }
        out
    }

    /// Drop candidates too similar to the existing suite; record the
    /// similarity on every candidate either way.
    async fn dedupe(
        &self,
        candidates: Vec<GeneratedTestCase>,
        existing: &Suite,
    ) -> (Vec<GeneratedTestCase>, Vec<GeneratedTestCase>) {
        let existing_fingerprints: Vec<String> = existing
            .cases
            .iter()
            .map(|c| {
                fingerprint(
                    &c.input,
                    c.expected_output.as_ref(),
                )
            })
            .collect();

        let existing_embeddings = match &self.embedder {
            Some(embedder) => {
                let mut vectors = Vec::with_capacity(existing_fingerprints.len());
                for fp in &existing_fingerprints {
                    match embedder.embed(fp).await {
                        Ok(v) => vectors.push(v),
                        Err(e) => {
                            tracing::warn!(error = %e, "embedding failed, falling back to token similarity");
                            vectors.clear();
                            break;
                        }
                    }
                }
                if vectors.len() == existing_fingerprints.len() {
                    Some(vectors)
                } else {
                    None
                }
            }
            None => None,
        };

        let mut kept = Vec::new();
        let mut excluded = Vec::new();
        for mut candidate in candidates {
            let fp = fingerprint(&candidate.input, candidate.expected_output.as_ref());
            let similarity = match (&self.embedder, &existing_embeddings) {
                (Some(embedder), Some(vectors)) => match embedder.embed(&fp).await {
                    Ok(candidate_vec) => vectors
                        .iter()
                        .map(|v| cosine_similarity(&candidate_vec, v))
                        .fold(0.0_f64, f64::max),
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding failed, falling back to token similarity");
                        max_token_similarity(&fp, &existing_fingerprints)
                    }
                },
                _ => max_token_similarity(&fp, &existing_fingerprints),
            };
            candidate.similarity_to_existing = similarity.clamp(0.0, 1.0);
            if candidate.similarity_to_existing < self.config.dedup_threshold {
                kept.push(candidate);
            } else {
                excluded.push(candidate);
            }
        }
        (kept, excluded)
    }

    /// Composite priority:
    /// 0.30 x frequency + 0.25 x severity + 0.25 x novelty + 0.20 x coverage gap.
    fn prioritize(&self, candidates: &mut [GeneratedTestCase], failures: &[FailedTrace]) {
        // Pattern frequency, normalized by the most frequent pattern.
        let mut pattern_counts: HashMap<&str, usize> = HashMap::new();
        for failure in failures {
            *pattern_counts.entry(failure.pattern()).or_default() += 1;
        }
        let max_pattern = pattern_counts.values().copied().max().unwrap_or(1) as f64;

        let traces_by_id: HashMap<&str, &FailedTrace> = failures
            .iter()
            .map(|f| (f.trace_id.as_str(), f))
            .collect();

        // Coverage gap favors underrepresented generation methods.
        let mut method_counts: HashMap<GenerationMethod, usize> = HashMap::new();
        for candidate in candidates.iter() {
            *method_counts
                .entry(candidate.lineage.generation_method)
                .or_default() += 1;
        }
        let max_method = method_counts.values().copied().max().unwrap_or(1) as f64;

        for candidate in candidates.iter_mut() {
            let frequency = candidate
                .lineage
                .source_pattern
                .as_deref()
                .and_then(|p| pattern_counts.get(p))
                .map_or(0.0, |&count| count as f64 / max_pattern);

            let severity = candidate
                .lineage
                .source_trace_ids
                .first()
                .and_then(|id| traces_by_id.get(id.as_str()))
                .map_or(0.0, |trace| trace_severity(trace));

            let novelty = 1.0 - candidate.similarity_to_existing;

            let method_count = method_counts
                .get(&candidate.lineage.generation_method)
                .copied()
                .unwrap_or(0) as f64;
            let coverage_gap = 1.0 - method_count / max_method;

            candidate.priority = (0.30 * frequency
                + 0.25 * severity
                + 0.25 * novelty
                + 0.20 * coverage_gap)
                .clamp(0.0, 1.0);
        }

        candidates.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

/// Error rate within the trace, blended 50/50 with `1 - score` when the
/// trace was scored.
fn trace_severity(trace: &FailedTrace) -> f64 {
    let spans = trace.flatten();
    let error_rate = if spans.is_empty() {
        0.0
    } else {
        spans
            .iter()
            .filter(|s| s.status == SpanStatus::Error)
            .count() as f64
            / spans.len() as f64
    };
    match trace.score {
        Some(score) => 0.5 * error_rate + 0.5 * (1.0 - score.clamp(0.0, 1.0)),
        None => error_rate,
    }
}

/// Derive one candidate case from a failed trace: the first error span,
/// falling back to the first span. Traces with no spans yield nothing.
fn extract_case(failure: &FailedTrace) -> Option<GeneratedTestCase> {
    let spans = failure.flatten();
    let span = spans
        .iter()
        .find(|s| s.status == SpanStatus::Error)
        .or_else(|| spans.first())?;

    let input = case_input(span);
    let scorers = infer_scorers(span);

    Some(GeneratedTestCase {
        id: Uuid::new_v4().to_string(),
        input,
        expected_output: span.output.clone(),
        scorers,
        priority: 0.0,
        lineage: Lineage {
            source_trace_ids: vec![failure.trace_id.clone()],
            source_pattern: Some(failure.pattern().to_string()),
            generation_method: GenerationMethod::Extraction,
            generated_at: Utc::now(),
        },
        status: ReviewStatus::PendingReview,
        similarity_to_existing: 0.0,
    })
}

fn case_input(span: &Span) -> Map<String, Value> {
    let mut input = Map::new();
    match span.kind {
        SpanKind::Tool => {
            input.insert("tool".to_string(), json!(span.tool()));
            input.insert(
                "tool_input".to_string(),
                span.input.clone().unwrap_or(Value::Null),
            );
        }
        SpanKind::Generation => {
            input.insert(
                "prompt".to_string(),
                span.input.clone().unwrap_or(Value::Null),
            );
        }
        SpanKind::Planning | SpanKind::Other => {
            input.insert("task".to_string(), json!(span.name));
        }
    }
    input
}

fn infer_scorers(span: &Span) -> Vec<String> {
    let mut scorers = Vec::new();
    if span.status == SpanStatus::Error {
        scorers.push("error_detection".to_string());
    }
    match span.kind {
        SpanKind::Tool => scorers.push("tool_selection".to_string()),
        SpanKind::Generation => scorers.push("output_quality".to_string()),
        SpanKind::Planning | SpanKind::Other => {}
    }
    if scorers.is_empty() {
        scorers.push("success".to_string());
    }
    scorers
}

fn build_adversarial_prompt(case: &GeneratedTestCase) -> String {
    let input = serde_json::to_string_pretty(&case.input).unwrap_or_default();
    format!(
        r#"You are generating an adversarial variant of a test case for an AI agent.

ORIGINAL TEST INPUT:
{input}

Produce a structurally similar but harder variant: same shape, edge-case
values (empty strings, boundary numbers, unusual but valid content).

Respond with ONLY a valid JSON object (no markdown):

{{
  "input": {{ ... same keys as the original ... }},
  "expected_output": <optional expected output or null>
}}"#
    )
}

/// Strict parse of a synthesis response; any deviation drops the variant.
fn parse_synthesized(response: &str) -> Option<SynthesizedCase> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let parsed: SynthesizedCase = serde_json::from_str(cleaned).ok()?;
    if parsed.input.is_empty() {
        return None;
    }
    Some(parsed)
}

/// Text fingerprint used for similarity: serialized input plus expected
/// output.
fn fingerprint(input: &Map<String, Value>, expected: Option<&Value>) -> String {
    let input_json = serde_json::to_string(input).unwrap_or_default();
    match expected {
        Some(Value::String(s)) => format!("{input_json} {s}"),
        Some(other) => format!("{input_json} {other}"),
        None => input_json,
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Jaccard similarity over whitespace tokens, the no-embedder fallback.
fn token_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn max_token_similarity(fp: &str, existing: &[String]) -> f64 {
    existing
        .iter()
        .map(|e| token_similarity(fp, e))
        .fold(0.0_f64, f64::max)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestCase;
    use async_trait::async_trait;

    fn failed_tool_trace(trace_id: &str, category: &str, tool: &str) -> FailedTrace {
        let span = Span::new("s1", tool, SpanKind::Tool)
            .with_tool(tool)
            .with_status(SpanStatus::Error)
            .with_input(json!({"query": format!("lookup via {tool}")}))
            .with_output(json!("partial result"));
        FailedTrace {
            trace_id: trace_id.to_string(),
            spans: vec![span],
            failure_reason: None,
            error_category: Some(category.to_string()),
            score: Some(0.2),
        }
    }

    fn empty_suite() -> Suite {
        Suite::validated(
            "existing",
            vec![TestCase::new(
                "seed",
                Map::new(),
                vec!["success".to_string()],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_extraction_picks_first_error_span() {
        let ok = Span::new("ok", "search", SpanKind::Tool).with_tool("search");
        let err = Span::new("err", "write_file", SpanKind::Tool)
            .with_tool("write_file")
            .with_status(SpanStatus::Error)
            .with_input(json!({"path": "/tmp/x"}));
        let failure = FailedTrace {
            trace_id: "t1".to_string(),
            spans: vec![ok, err],
            failure_reason: Some("write failed".to_string()),
            error_category: None,
            score: None,
        };

        let case = extract_case(&failure).unwrap();
        assert_eq!(case.input.get("tool"), Some(&json!("write_file")));
        assert!(case.scorers.contains(&"error_detection".to_string()));
        assert!(case.scorers.contains(&"tool_selection".to_string()));
        assert_eq!(case.lineage.source_trace_ids, vec!["t1".to_string()]);
        assert_eq!(
            case.lineage.generation_method,
            GenerationMethod::Extraction
        );
    }

    #[test]
    fn test_extraction_falls_back_to_first_span() {
        let span = Span::new("g", "answer", SpanKind::Generation)
            .with_input(json!("summarize the report"));
        let failure = FailedTrace {
            trace_id: "t2".to_string(),
            spans: vec![span],
            failure_reason: Some("low quality".to_string()),
            error_category: None,
            score: Some(0.3),
        };
        let case = extract_case(&failure).unwrap();
        assert!(case.input.contains_key("prompt"));
        assert_eq!(case.scorers, vec!["output_quality".to_string()]);
    }

    #[test]
    fn test_extraction_of_empty_trace_yields_nothing() {
        let failure = FailedTrace {
            trace_id: "t3".to_string(),
            spans: vec![],
            failure_reason: None,
            error_category: None,
            score: None,
        };
        assert!(extract_case(&failure).is_none());
    }

    #[tokio::test]
    async fn test_dedup_excludes_near_duplicate_keeps_distinct() {
        let mut existing_input = Map::new();
        existing_input.insert("tool".to_string(), json!("search"));
        existing_input.insert("tool_input".to_string(), json!({"query": "lookup via search"}));
        let existing = Suite::validated(
            "existing",
            vec![TestCase::new(
                "seed",
                existing_input,
                vec!["tool_selection".to_string()],
            )
            .with_expected_output(json!("partial result"))],
        )
        .unwrap();

        let duplicate = failed_tool_trace("dup", "timeout", "search");
        let distinct = failed_tool_trace("new", "timeout", "translate_document");

        let generator = TestCaseGenerator::new(GeneratorConfig::default());
        let report = generator
            .generate(&[duplicate, distinct], &existing)
            .await
            .unwrap();

        assert_eq!(report.excluded.len(), 1);
        assert!(report.excluded[0].similarity_to_existing >= 0.85);
        assert_eq!(report.cases.len(), 1);
        assert_eq!(
            report.cases[0].input.get("tool"),
            Some(&json!("translate_document"))
        );
        assert!(report.cases[0].similarity_to_existing < 0.85);
    }

    #[tokio::test]
    async fn test_frequent_pattern_outranks_rare_pattern() {
        let failures = vec![
            failed_tool_trace("a", "timeout", "fetch_a"),
            failed_tool_trace("b", "timeout", "fetch_b"),
            failed_tool_trace("c", "timeout", "fetch_c"),
            failed_tool_trace("d", "validation", "parse_d"),
        ];
        let generator = TestCaseGenerator::new(GeneratorConfig::default());
        let report = generator.generate(&failures, &empty_suite()).await.unwrap();
        assert_eq!(report.cases.len(), 4);

        let avg = |pattern: &str| {
            let (sum, n) = report
                .cases
                .iter()
                .filter(|c| c.lineage.source_pattern.as_deref() == Some(pattern))
                .fold((0.0, 0usize), |(s, n), c| (s + c.priority, n + 1));
            sum / n as f64
        };
        assert!(avg("timeout") >= avg("validation"));
        // Ranked output is sorted by priority.
        for pair in report.cases.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[tokio::test]
    async fn test_truncates_to_max_test_cases() {
        let failures: Vec<FailedTrace> = (0..30)
            .map(|i| failed_tool_trace(&format!("t{i}"), "timeout", &format!("tool_{i}")))
            .collect();
        let generator = TestCaseGenerator::new(GeneratorConfig {
            max_test_cases: 5,
            ..Default::default()
        });
        let report = generator.generate(&failures, &empty_suite()).await.unwrap();
        assert_eq!(report.cases.len(), 5);
    }

    /// Generator returning a canned synthesis payload.
    struct CannedGenerator(String);

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_synthesis_adds_adversarial_variants() {
        let failures = vec![failed_tool_trace("t1", "timeout", "search")];
        let generator = TestCaseGenerator::new(GeneratorConfig::default()).with_generator(
            Arc::new(CannedGenerator(
                r#"{"input": {"tool": "search", "tool_input": {"query": ""}}, "expected_output": null}"#
                    .to_string(),
            )),
        );
        let report = generator.generate(&failures, &empty_suite()).await.unwrap();
        assert_eq!(report.cases.len(), 2);
        assert!(report
            .cases
            .iter()
            .any(|c| c.lineage.generation_method == GenerationMethod::Adversarial));
    }

    #[tokio::test]
    async fn test_unparseable_synthesis_drops_only_that_variant() {
        let failures = vec![failed_tool_trace("t1", "timeout", "search")];
        let generator = TestCaseGenerator::new(GeneratorConfig::default())
            .with_generator(Arc::new(CannedGenerator("not json at all".to_string())));
        let report = generator.generate(&failures, &empty_suite()).await.unwrap();
        // The extracted case survives; the failed synthesis is silent.
        assert_eq!(report.cases.len(), 1);
        assert_eq!(
            report.cases[0].lineage.generation_method,
            GenerationMethod::Extraction
        );
    }

    /// Embedder mapping known fingerprints to fixed vectors.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f64>> {
            if text.contains("search") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    #[tokio::test]
    async fn test_embedder_drives_similarity_when_present() {
        let mut existing_input = Map::new();
        existing_input.insert("tool".to_string(), json!("search"));
        let existing = Suite::validated(
            "existing",
            vec![TestCase::new(
                "seed",
                existing_input,
                vec!["tool_selection".to_string()],
            )],
        )
        .unwrap();

        let same_direction = failed_tool_trace("dup", "timeout", "search");
        let orthogonal = failed_tool_trace("new", "timeout", "translate");
        let generator = TestCaseGenerator::new(GeneratorConfig::default())
            .with_embedder(Arc::new(KeywordEmbedder));
        let report = generator
            .generate(&[same_direction, orthogonal], &existing)
            .await
            .unwrap();

        assert_eq!(report.excluded.len(), 1);
        assert!((report.excluded[0].similarity_to_existing - 1.0).abs() < 1e-9);
        assert_eq!(report.cases.len(), 1);
        assert!(report.cases[0].similarity_to_existing < 1e-9);
    }

    #[test]
    fn test_token_similarity_bounds() {
        assert!((token_similarity("a b c", "a b c") - 1.0).abs() < 1e-12);
        assert_eq!(token_similarity("a b", "c d"), 0.0);
        let partial = token_similarity("a b c d", "a b x y");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
