//! Test runner: executes a suite of cases against scorers with bounded
//! concurrency, per-case timeouts and error isolation.
//!
//! The runner knows nothing about rendering: progress goes to an injected
//! [`Reporter`] sink (console/JSON/cloud-sync reporters are collaborator
//! concerns). Results are collected in suite order, so re-running an
//! unchanged suite with deterministic scorers reproduces the exact
//! `SuiteResult`.

use crate::error::{EvalError, Result};
use crate::scorer::{ScoreContext, ScoreResult, ScorerRegistry};
use crate::suite::{Suite, TestCase};
use crate::trace::Trace;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How multiple scorer values aggregate into one per-case score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean of all scorer values (default)
    #[default]
    Mean,
    /// Worst scorer value
    Min,
    /// Best scorer value
    Max,
}

impl Aggregation {
    /// Aggregate a slice of score values. Empty input yields 0.0.
    #[must_use]
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Configuration for suite execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of concurrently executing cases (default: 5)
    pub max_concurrency: usize,

    /// Suite-wide minimum aggregate score for a case to pass (default: 0.5)
    pub min_score: f64,

    /// Only run cases whose id contains this substring
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filter: Option<String>,

    /// Scorer aggregation (default: mean)
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Default per-case timeout (default: 30s); cases may override
    #[serde(with = "duration_millis")]
    pub case_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            min_score: 0.5,
            filter: None,
            aggregation: Aggregation::Mean,
            case_timeout: Duration::from_secs(30),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// What an agent run produced for one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// The agent's output
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<Value>,

    /// Tools the agent called, in order
    #[serde(default)]
    pub tool_calls: Vec<String>,

    /// Execution trace, if the executor captured one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace: Option<Trace>,

    /// Free-form executor metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Agent execution capability, injected per run. Its failures are caught
/// and recorded on the affected case, never propagated.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run the agent on one case input under the given variant config.
    async fn run(&self, input: &Map<String, Value>, config: &Value)
        -> anyhow::Result<AgentOutcome>;
}

/// Observer for run progress. All methods default to no-ops.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// A case is about to execute.
    async fn case_started(&self, _suite_id: &str, _case: &TestCase) {}

    /// A case finished (passed, failed or timed out).
    async fn case_finished(&self, _suite_id: &str, _result: &TestResult) {}

    /// The whole suite finished.
    async fn suite_finished(&self, _result: &SuiteResult) {}
}

/// Reporter that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

#[async_trait]
impl Reporter for NoopReporter {}

/// Reporter that emits structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn case_started(&self, suite_id: &str, case: &TestCase) {
        tracing::debug!(suite_id, case_id = %case.id, "case started");
    }

    async fn case_finished(&self, suite_id: &str, result: &TestResult) {
        tracing::debug!(
            suite_id,
            case_id = %result.case_id,
            passed = result.passed,
            duration_ms = result.duration_ms,
            "case finished"
        );
    }

    async fn suite_finished(&self, result: &SuiteResult) {
        tracing::info!(
            suite_id = %result.suite_id,
            passed = result.passed_count,
            failed = result.failed_count,
            avg_score = result.avg_score,
            "suite finished"
        );
    }
}

/// Result of executing a single case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Case identifier
    pub case_id: String,

    /// One score per scorer that completed
    pub scores: Vec<ScoreResult>,

    /// Whether the case passed (no errors and aggregate >= minimum)
    pub passed: bool,

    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,

    /// Error recorded for this case, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl TestResult {
    /// Aggregate this case's scorer values.
    #[must_use]
    pub fn aggregate_score(&self, aggregation: Aggregation) -> f64 {
        let values: Vec<f64> = self.scores.iter().map(|s| s.value).collect();
        aggregation.apply(&values)
    }
}

/// Aggregated result of one suite run. Derived whole, never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    /// Suite identifier
    pub suite_id: String,

    /// Per-case results, in suite order
    pub results: Vec<TestResult>,

    /// Number of passed cases
    pub passed_count: usize,

    /// Number of failed cases
    pub failed_count: usize,

    /// Mean of per-case aggregate scores
    pub avg_score: f64,
}

impl SuiteResult {
    /// Compute the aggregates from a set of case results.
    #[must_use]
    pub fn from_results(
        suite_id: impl Into<String>,
        results: Vec<TestResult>,
        aggregation: Aggregation,
    ) -> Self {
        let passed_count = results.iter().filter(|r| r.passed).count();
        let failed_count = results.len() - passed_count;
        let avg_score = if results.is_empty() {
            0.0
        } else {
            results
                .iter()
                .map(|r| r.aggregate_score(aggregation))
                .sum::<f64>()
                / results.len() as f64
        };
        Self {
            suite_id: suite_id.into(),
            results,
            passed_count,
            failed_count,
            avg_score,
        }
    }

    /// Pass rate in `[0, 1]`.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.passed_count as f64 / self.results.len() as f64
    }

    /// Per-case aggregate scores, in suite order. These are the sample
    /// vectors the statistical comparator consumes.
    #[must_use]
    pub fn case_scores(&self, aggregation: Aggregation) -> Vec<f64> {
        self.results
            .iter()
            .map(|r| r.aggregate_score(aggregation))
            .collect()
    }

    /// Per-case durations in milliseconds, in suite order.
    #[must_use]
    pub fn case_durations(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.duration_ms as f64).collect()
    }
}

/// Result of running a batch of suites: failed suites are dropped with
/// their error recorded, the rest still run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Results for the suites that ran
    pub suites: Vec<SuiteResult>,

    /// Errors for the suites that did not
    pub errors: Vec<String>,
}

/// Executes suites against a scorer registry.
pub struct TestRunner {
    config: RunnerConfig,
    reporter: Arc<dyn Reporter>,
}

impl TestRunner {
    /// Runner with the given configuration and a no-op reporter.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Attach a reporter sink.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a suite without an agent: scorers see only the case definition.
    pub async fn run(&self, suite: &Suite, registry: &ScorerRegistry) -> Result<SuiteResult> {
        self.run_inner(suite, registry, None, &Value::Null).await
    }

    /// Run a suite, producing each case's output and trace through the
    /// given executor under the given config (e.g. a variant's config).
    pub async fn run_with_executor(
        &self,
        suite: &Suite,
        registry: &ScorerRegistry,
        executor: &dyn AgentExecutor,
        exec_config: &Value,
    ) -> Result<SuiteResult> {
        self.run_inner(suite, registry, Some(executor), exec_config)
            .await
    }

    /// Run several suites, isolating per-suite failures.
    pub async fn run_batch(&self, suites: &[Suite], registry: &ScorerRegistry) -> BatchReport {
        let mut report = BatchReport::default();
        for suite in suites {
            match self.run(suite, registry).await {
                Ok(result) => report.suites.push(result),
                Err(e) => {
                    tracing::warn!(suite_id = %suite.id, error = %e, "suite failed to run");
                    report.errors.push(format!("suite '{}': {e}", suite.id));
                }
            }
        }
        report
    }

    async fn run_inner(
        &self,
        suite: &Suite,
        registry: &ScorerRegistry,
        executor: Option<&dyn AgentExecutor>,
        exec_config: &Value,
    ) -> Result<SuiteResult> {
        if suite.cases.is_empty() {
            return Err(EvalError::Execution(format!(
                "suite '{}' has no cases",
                suite.id
            )));
        }

        let selected: Vec<&TestCase> = suite
            .cases
            .iter()
            .filter(|c| {
                self.config
                    .filter
                    .as_deref()
                    .map_or(true, |f| c.id.contains(f))
            })
            .collect();

        tracing::info!(
            suite_id = %suite.id,
            selected = selected.len(),
            total = suite.cases.len(),
            max_concurrency = self.config.max_concurrency,
            "running suite"
        );

        let futures = selected.into_iter().map(|case| {
            let reporter = Arc::clone(&self.reporter);
            async move {
                reporter.case_started(&suite.id, case).await;
                let result = self
                    .run_case(case, registry, executor, exec_config)
                    .await;
                reporter.case_finished(&suite.id, &result).await;
                result
            }
        });

        // `buffered` (not `buffer_unordered`) keeps results in suite order,
        // which makes repeated runs byte-identical.
        let results: Vec<TestResult> = stream::iter(futures)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let suite_result =
            SuiteResult::from_results(&suite.id, results, self.config.aggregation);
        self.reporter.suite_finished(&suite_result).await;
        Ok(suite_result)
    }

    /// Execute one case under its timeout. A timeout aborts only this case.
    async fn run_case(
        &self,
        case: &TestCase,
        registry: &ScorerRegistry,
        executor: Option<&dyn AgentExecutor>,
        exec_config: &Value,
    ) -> TestResult {
        let timeout = case
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.case_timeout);
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.run_case_inner(case, registry, executor, exec_config))
            .await
        {
            Ok(result) => result,
            Err(_) => TestResult {
                case_id: case.id.clone(),
                scores: vec![],
                passed: false,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(format!("case timed out after {}ms", timeout.as_millis())),
            },
        }
    }

    async fn run_case_inner(
        &self,
        case: &TestCase,
        registry: &ScorerRegistry,
        executor: Option<&dyn AgentExecutor>,
        exec_config: &Value,
    ) -> TestResult {
        let start = Instant::now();
        let mut ctx = ScoreContext::from_case(case.input.clone(), case.expected_output.clone());
        let mut errors: Vec<String> = Vec::new();

        if let Some(executor) = executor {
            match executor.run(&case.input, exec_config).await {
                Ok(outcome) => {
                    ctx.output = outcome.output;
                    ctx.trace = outcome.trace;
                }
                Err(e) => errors.push(format!("agent execution failed: {e:#}")),
            }
        }

        let mut scores = Vec::with_capacity(case.scorers.len());
        if errors.is_empty() {
            for scorer_name in &case.scorers {
                let Some(scorer) = registry.get(scorer_name) else {
                    errors.push(format!("scorer '{scorer_name}' is not registered"));
                    continue;
                };
                // A failing scorer is isolated to this (case, scorer) pair;
                // remaining scorers still run.
                match scorer.evaluate(&ctx).await {
                    Ok(score) => scores.push(score),
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }

        let min_score = case.min_score.unwrap_or(self.config.min_score);
        let values: Vec<f64> = scores.iter().map(|s| s.value).collect();
        let aggregate = self.config.aggregation.apply(&values);
        let passed = errors.is_empty() && aggregate >= min_score;

        TestResult {
            case_id: case.id.clone(),
            scores,
            passed,
            duration_ms: start.elapsed().as_millis() as u64,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{ContainsScorer, ErrorDetectionScorer, ScoreResult, Scorer, SuccessScorer};
    use serde_json::json;

    /// Scorer that always fails, for isolation tests.
    struct BrokenScorer;

    #[async_trait]
    impl Scorer for BrokenScorer {
        fn name(&self) -> &str {
            "broken"
        }

        async fn evaluate(&self, _ctx: &ScoreContext) -> Result<ScoreResult> {
            Err(EvalError::scorer("broken", "always fails"))
        }
    }

    /// Executor echoing the query back as output.
    struct EchoExecutor;

    #[async_trait]
    impl AgentExecutor for EchoExecutor {
        async fn run(
            &self,
            input: &Map<String, Value>,
            _config: &Value,
        ) -> anyhow::Result<AgentOutcome> {
            let query = input.get("query").and_then(Value::as_str).unwrap_or("");
            Ok(AgentOutcome {
                output: Some(json!(format!("echo: {query}"))),
                ..Default::default()
            })
        }
    }

    /// Executor that never finishes, for timeout tests.
    struct HangingExecutor;

    #[async_trait]
    impl AgentExecutor for HangingExecutor {
        async fn run(
            &self,
            _input: &Map<String, Value>,
            _config: &Value,
        ) -> anyhow::Result<AgentOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AgentOutcome::default())
        }
    }

    fn registry() -> ScorerRegistry {
        ScorerRegistry::new()
            .with(Arc::new(SuccessScorer))
            .with(Arc::new(ErrorDetectionScorer))
            .with(Arc::new(ContainsScorer::new()))
            .with(Arc::new(BrokenScorer))
    }

    fn case(id: &str, scorers: &[&str]) -> TestCase {
        let mut input = Map::new();
        input.insert("query".to_string(), json!("hello"));
        TestCase::new(
            id,
            input,
            scorers.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    fn suite(cases: Vec<TestCase>) -> Suite {
        Suite::validated("unit", cases).unwrap()
    }

    #[tokio::test]
    async fn test_run_with_executor_passes_contains_case() {
        let suite = suite(vec![
            case("c1", &["contains"]).with_expected_output(json!("echo: hello"))
        ]);
        let runner = TestRunner::new(RunnerConfig::default());
        let result = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();
        assert_eq!(result.passed_count, 1);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.avg_score, 1.0);
    }

    #[tokio::test]
    async fn test_scorer_error_isolated_to_one_pair() {
        let suite = suite(vec![
            case("bad", &["broken", "success"]),
            case("good", &["success"]).with_expected_output(json!("x")),
        ]);
        let runner = TestRunner::new(RunnerConfig::default());
        let result = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();

        let bad = &result.results[0];
        assert!(!bad.passed);
        assert!(bad.error.as_ref().unwrap().contains("broken"));
        // The sibling scorer on the same case still ran.
        assert_eq!(bad.scores.len(), 1);

        let good = &result.results[1];
        assert!(good.passed);
        assert_eq!(result.passed_count + result.failed_count, result.results.len());
    }

    #[tokio::test]
    async fn test_case_timeout_does_not_fail_suite() {
        let suite = suite(vec![
            case("slow", &["success"]).with_timeout_ms(20),
            case("also_slow", &["success"]).with_timeout_ms(20),
        ]);
        let runner = TestRunner::new(RunnerConfig::default());
        let result = runner
            .run_with_executor(&suite, &registry(), &HangingExecutor, &Value::Null)
            .await
            .unwrap();
        assert_eq!(result.results.len(), 2);
        for r in &result.results {
            assert!(!r.passed);
            assert!(r.error.as_ref().unwrap().contains("timed out"));
        }
    }

    #[tokio::test]
    async fn test_filter_selects_substring_matches() {
        let suite = suite(vec![
            case("login_ok", &["success"]),
            case("search_ok", &["success"]),
        ]);
        let config = RunnerConfig {
            filter: Some("search".to_string()),
            ..Default::default()
        };
        let runner = TestRunner::new(config);
        let result = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].case_id, "search_ok");
    }

    #[tokio::test]
    async fn test_missing_scorer_fails_case_only() {
        let suite = suite(vec![
            case("ghost", &["does_not_exist"]),
            case("real", &["success"]),
        ]);
        let runner = TestRunner::new(RunnerConfig::default());
        let result = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();
        assert!(!result.results[0].passed);
        assert!(result.results[0]
            .error
            .as_ref()
            .unwrap()
            .contains("not registered"));
        assert!(result.results[1].passed);
    }

    #[tokio::test]
    async fn test_rerun_is_identical_for_deterministic_scorers() {
        let suite = suite(vec![
            case("a", &["success"]),
            case("b", &["success", "error_detection"]),
            case("c", &["error_detection"]),
        ]);
        let runner = TestRunner::new(RunnerConfig {
            max_concurrency: 3,
            ..Default::default()
        });

        let first = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();
        let second = runner
            .run_with_executor(&suite, &registry(), &EchoExecutor, &Value::Null)
            .await
            .unwrap();

        // Durations vary run to run; everything the aggregates derive from
        // must not.
        assert_eq!(first.passed_count, second.passed_count);
        assert_eq!(first.failed_count, second.failed_count);
        assert_eq!(first.avg_score, second.avg_score);
        let ids1: Vec<_> = first.results.iter().map(|r| &r.case_id).collect();
        let ids2: Vec<_> = second.results.iter().map(|r| &r.case_id).collect();
        assert_eq!(ids1, ids2);
        for (r1, r2) in first.results.iter().zip(&second.results) {
            assert_eq!(r1.scores, r2.scores);
            assert_eq!(r1.passed, r2.passed);
        }
    }

    #[tokio::test]
    async fn test_empty_suite_is_execution_error() {
        let suite = Suite {
            id: "empty".to_string(),
            cases: vec![],
        };
        let runner = TestRunner::new(RunnerConfig::default());
        let err = runner.run(&suite, &registry()).await.unwrap_err();
        assert!(matches!(err, EvalError::Execution(_)));
    }

    #[tokio::test]
    async fn test_run_batch_isolates_bad_suite() {
        let good = suite(vec![case("a", &["success"])]);
        let bad = Suite {
            id: "empty".to_string(),
            cases: vec![],
        };
        let runner = TestRunner::new(RunnerConfig::default());
        let report = runner.run_batch(&[bad, good], &registry()).await;
        assert_eq!(report.suites.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("empty"));
    }

    #[test]
    fn test_aggregation_modes() {
        let values = [0.2, 0.8, 0.5];
        assert!((Aggregation::Mean.apply(&values) - 0.5).abs() < 1e-9);
        assert!((Aggregation::Min.apply(&values) - 0.2).abs() < 1e-9);
        assert!((Aggregation::Max.apply(&values) - 0.8).abs() < 1e-9);
        assert_eq!(Aggregation::Mean.apply(&[]), 0.0);
    }

    #[test]
    fn test_suite_result_invariant() {
        let results = vec![
            TestResult {
                case_id: "a".to_string(),
                scores: vec![ScoreResult::new(1.0, "ok")],
                passed: true,
                duration_ms: 10,
                error: None,
            },
            TestResult {
                case_id: "b".to_string(),
                scores: vec![ScoreResult::new(0.0, "bad")],
                passed: false,
                duration_ms: 12,
                error: None,
            },
        ];
        let suite_result = SuiteResult::from_results("s", results, Aggregation::Mean);
        assert_eq!(
            suite_result.passed_count + suite_result.failed_count,
            suite_result.results.len()
        );
        assert!((suite_result.avg_score - 0.5).abs() < 1e-9);
        assert!((suite_result.pass_rate() - 0.5).abs() < 1e-9);
    }
}
