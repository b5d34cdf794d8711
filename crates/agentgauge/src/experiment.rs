//! A/B experiment comparison: metric summaries, significance tests,
//! effect sizes, hypothesis evaluation and the final conclusion.
//!
//! The comparator is pure: given the same samples and `StatisticalConfig`
//! (including the bootstrap seed) it always produces the same
//! `ComparisonResult`. Experiment execution lives in [`ExperimentRunner`],
//! which drives the test runner once per variant through an injected
//! [`AgentExecutor`].

use crate::error::{EvalError, Result};
use crate::runner::{AgentExecutor, SuiteResult, TestRunner};
use crate::scorer::ScorerRegistry;
use crate::stats::{
    self, EffectMagnitude, MultipleTestingCorrection, TestOutcome,
};
use crate::suite::Suite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Role of a variant in an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Control,
    Treatment,
}

/// One configuration under comparison. Immutable experiment input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Variant identifier
    pub id: String,

    /// Control or treatment
    pub kind: VariantKind,

    /// Opaque configuration handed to the agent executor
    pub config: Value,
}

impl Variant {
    /// Control variant with the given config.
    #[must_use]
    pub fn control(id: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            kind: VariantKind::Control,
            config,
        }
    }

    /// Treatment variant with the given config.
    #[must_use]
    pub fn treatment(id: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            kind: VariantKind::Treatment,
            config,
        }
    }
}

/// Which significance test to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticalTest {
    /// Welch's unequal-variance t-test (default)
    #[default]
    Welch,
    /// Pooled-variance Student's t-test
    Student,
    /// Mann-Whitney U (non-parametric)
    MannWhitney,
    /// Seeded bootstrap on the difference of means
    Bootstrap,
}

/// Statistical parameters for a comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalConfig {
    /// Two-tailed significance level (default: 0.05)
    pub alpha: f64,

    /// Target power for sample-size planning (default: 0.8)
    pub power: f64,

    /// Significance test to run
    #[serde(default)]
    pub test: StatisticalTest,

    /// Correction applied when several metrics are compared at once
    #[serde(default)]
    pub correction: MultipleTestingCorrection,

    /// Minimum per-variant sample size for a conclusive result (default: 10)
    pub min_sample_size: usize,

    /// Bootstrap resampling iterations (default: 1000)
    pub bootstrap_iterations: usize,

    /// Seed for the bootstrap RNG; reruns with the same seed reproduce
    /// identical results
    pub seed: u64,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            power: 0.8,
            test: StatisticalTest::Welch,
            correction: MultipleTestingCorrection::Holm,
            min_sample_size: 10,
            bootstrap_iterations: 1000,
            seed: 0,
        }
    }
}

impl StatisticalConfig {
    /// Reject nonsensical parameters before anything runs.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.alpha) || self.alpha <= 0.0 {
            return Err(EvalError::Validation(format!(
                "alpha {} outside (0, 1)",
                self.alpha
            )));
        }
        if !(0.0..1.0).contains(&self.power) || self.power <= 0.0 {
            return Err(EvalError::Validation(format!(
                "power {} outside (0, 1)",
                self.power
            )));
        }
        if self.test == StatisticalTest::Bootstrap && self.bootstrap_iterations == 0 {
            return Err(EvalError::Validation(
                "bootstrap test requires at least one iteration".into(),
            ));
        }
        Ok(())
    }
}

/// Selected percentiles of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Per-variant aggregate for one metric, computed fresh from a fixed
/// sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    /// `1 - alpha` confidence interval for the mean
    pub confidence_interval: (f64, f64),
    pub percentiles: Percentiles,
}

impl MetricSummary {
    /// Summarize a sample. The interval uses the normal approximation
    /// unless the configured test is bootstrap, in which case it is the
    /// seeded bootstrap percentile interval.
    #[must_use]
    pub fn from_samples(samples: &[f64], config: &StatisticalConfig) -> Self {
        let mean = stats::mean(samples);
        let std_dev = stats::sample_std_dev(samples);
        let confidence_interval = if samples.is_empty() {
            (0.0, 0.0)
        } else if config.test == StatisticalTest::Bootstrap {
            stats::bootstrap_mean_ci(samples, config.bootstrap_iterations, config.alpha, config.seed)
        } else {
            let z = stats::z_from_p(config.alpha / 2.0);
            let std_err = std_dev / (samples.len() as f64).sqrt();
            (mean - z * std_err, mean + z * std_err)
        };
        // An empty fold would leave +/- infinity, which serde_json turns
        // into null.
        let (min, max) = if samples.is_empty() {
            (0.0, 0.0)
        } else {
            samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
        };
        Self {
            mean,
            std_dev,
            median: stats::median(samples),
            min,
            max,
            count: samples.len(),
            confidence_interval,
            percentiles: Percentiles {
                p5: stats::percentile(samples, 5.0),
                p25: stats::percentile(samples, 25.0),
                p75: stats::percentile(samples, 75.0),
                p95: stats::percentile(samples, 95.0),
            },
        }
    }
}

/// Outcome of the significance test on one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSignificance {
    /// Corrected p-value (equals the raw p-value when no correction applies)
    pub p_value: f64,

    pub is_significant: bool,

    /// Threshold the (corrected) p-value was compared against. The
    /// correction is applied to the p-value, so this is always the
    /// configured alpha.
    pub alpha: f64,

    pub test_used: StatisticalTest,

    pub test_statistic: f64,
}

/// Standardized effect size for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    pub cohens_d: f64,

    pub magnitude: EffectMagnitude,

    /// Computed only for the non-parametric test
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cliffs_delta: Option<f64>,
}

/// Full comparison of one metric between control and treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    /// Metric name
    pub metric: String,

    /// Whether larger values of this metric are better (false for
    /// latency-style metrics)
    #[serde(default = "default_higher_is_better")]
    pub higher_is_better: bool,

    pub control: MetricSummary,

    pub treatment: MetricSummary,

    /// treatment mean - control mean
    pub absolute_diff: f64,

    /// Absolute diff relative to the control mean (0 when control is 0)
    pub relative_diff: f64,

    pub significance: StatisticalSignificance,

    pub effect_size: EffectSize,

    /// Normal-approximation interval for the difference of means
    pub diff_confidence_interval: (f64, f64),
}

/// Expected direction of a metric under the treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// A declared expectation about one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub metric: String,

    pub direction: Direction,

    /// Minimum absolute difference for the hypothesis to count as supported
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub minimum_effect: Option<f64>,
}

/// A hypothesis together with its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisOutcome {
    pub hypothesis: Hypothesis,

    pub supported: bool,
}

/// Confidence in the experiment's conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Inconclusive,
}

/// What to do next. Closed set, chosen by a deterministic decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ShipTreatment,
    KeepControl,
    ContinueExperiment,
    Redesign,
}

/// Derived verdict. Never authored directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConclusion {
    /// Winning variant id, if the primary metric supports one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner: Option<String>,

    pub confidence: ConfidenceLevel,

    pub recommendation: Recommendation,

    /// Human-readable reasons behind the verdict
    pub rationale: Vec<String>,
}

/// Result of comparing exactly one control against one treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub control: Variant,

    pub treatment: Variant,

    /// The comparison the conclusion is decided on
    pub primary: MetricComparison,

    pub secondary: Vec<MetricComparison>,

    pub hypotheses: Vec<HypothesisOutcome>,

    pub conclusion: ExperimentConclusion,
}

/// Named per-variant sample sets for one metric.
#[derive(Debug, Clone)]
pub struct MetricSamples {
    /// Metric name
    pub metric: String,

    /// Whether larger values are better; decides which variant wins when
    /// this is the primary metric
    pub higher_is_better: bool,

    /// Per-case values for the control variant
    pub control: Vec<f64>,

    /// Per-case values for the treatment variant
    pub treatment: Vec<f64>,
}

/// Pure statistical comparator.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    config: StatisticalConfig,
}

impl Comparator {
    #[must_use]
    pub fn new(config: StatisticalConfig) -> Self {
        Self { config }
    }

    /// Compare a control and a treatment on a primary metric plus any
    /// secondary metrics, evaluate hypotheses, and derive the conclusion.
    ///
    /// The first entry of `metrics` is the primary metric; the rest are
    /// secondary. When more than one metric is present, the configured
    /// multiple-testing correction is applied across the whole family.
    pub fn compare(
        &self,
        control: &Variant,
        treatment: &Variant,
        metrics: &[MetricSamples],
        hypotheses: &[Hypothesis],
    ) -> Result<ComparisonResult> {
        self.config.validate()?;
        if control.id == treatment.id {
            return Err(EvalError::Validation(format!(
                "comparison requires two distinct variants, got '{}' twice",
                control.id
            )));
        }
        let Some(primary_samples) = metrics.first() else {
            return Err(EvalError::Validation(
                "comparison requires at least a primary metric".into(),
            ));
        };

        // Raw tests first, then one correction pass over the family.
        let mut raw: Vec<(String, TestOutcome, MetricComparisonParts)> = metrics
            .iter()
            .map(|m| {
                let outcome = self.run_test(&m.control, &m.treatment);
                let parts = self.comparison_parts(m);
                (m.metric.clone(), outcome, parts)
            })
            .collect();

        let correction = if raw.len() > 1 {
            self.config.correction
        } else {
            MultipleTestingCorrection::None
        };
        let p_values: Vec<f64> = raw.iter().map(|(_, o, _)| o.p_value).collect();
        let adjusted = stats::adjust_p_values(&p_values, correction);

        let mut comparisons: Vec<MetricComparison> = Vec::with_capacity(raw.len());
        for ((metric, outcome, parts), p_adj) in raw.drain(..).zip(adjusted) {
            comparisons.push(MetricComparison {
                metric,
                higher_is_better: parts.higher_is_better,
                absolute_diff: parts.absolute_diff,
                relative_diff: parts.relative_diff,
                significance: StatisticalSignificance {
                    p_value: p_adj,
                    is_significant: p_adj < self.config.alpha,
                    alpha: self.config.alpha,
                    test_used: self.config.test,
                    test_statistic: outcome.statistic,
                },
                effect_size: parts.effect_size,
                diff_confidence_interval: parts.diff_confidence_interval,
                control: parts.control,
                treatment: parts.treatment,
            });
        }

        let hypothesis_outcomes = hypotheses
            .iter()
            .map(|h| {
                let supported = comparisons
                    .iter()
                    .find(|c| c.metric == h.metric)
                    .is_some_and(|c| Self::hypothesis_supported(h, c));
                HypothesisOutcome {
                    hypothesis: h.clone(),
                    supported,
                }
            })
            .collect();

        let sample_size = primary_samples
            .control
            .len()
            .min(primary_samples.treatment.len());
        let conclusion =
            self.conclude(control, treatment, &comparisons[0], sample_size);

        Ok(ComparisonResult {
            control: control.clone(),
            treatment: treatment.clone(),
            primary: comparisons.remove(0),
            secondary: comparisons,
            hypotheses: hypothesis_outcomes,
            conclusion,
        })
    }

    fn run_test(&self, control: &[f64], treatment: &[f64]) -> TestOutcome {
        match self.config.test {
            StatisticalTest::Welch => stats::welch_t_test(treatment, control),
            StatisticalTest::Student => stats::student_t_test(treatment, control),
            StatisticalTest::MannWhitney => stats::mann_whitney_u_test(treatment, control),
            StatisticalTest::Bootstrap => stats::bootstrap_mean_diff_test(
                treatment,
                control,
                self.config.bootstrap_iterations,
                self.config.seed,
            ),
        }
    }

    fn comparison_parts(&self, samples: &MetricSamples) -> MetricComparisonParts {
        let control = MetricSummary::from_samples(&samples.control, &self.config);
        let treatment = MetricSummary::from_samples(&samples.treatment, &self.config);
        let absolute_diff = treatment.mean - control.mean;
        let relative_diff = if control.mean.abs() > f64::EPSILON {
            absolute_diff / control.mean
        } else {
            0.0
        };

        let cohens_d = stats::cohens_d(&samples.treatment, &samples.control);
        let cliffs_delta = (self.config.test == StatisticalTest::MannWhitney)
            .then(|| stats::cliffs_delta(&samples.treatment, &samples.control));

        let z = stats::z_from_p(self.config.alpha / 2.0);
        let se_c = if samples.control.is_empty() {
            0.0
        } else {
            control.std_dev / (samples.control.len() as f64).sqrt()
        };
        let se_t = if samples.treatment.is_empty() {
            0.0
        } else {
            treatment.std_dev / (samples.treatment.len() as f64).sqrt()
        };
        let se_diff = (se_c * se_c + se_t * se_t).sqrt();

        MetricComparisonParts {
            higher_is_better: samples.higher_is_better,
            control,
            treatment,
            absolute_diff,
            relative_diff,
            effect_size: EffectSize {
                cohens_d,
                magnitude: EffectMagnitude::from_cohens_d(cohens_d),
                cliffs_delta,
            },
            diff_confidence_interval: (absolute_diff - z * se_diff, absolute_diff + z * se_diff),
        }
    }

    fn hypothesis_supported(h: &Hypothesis, c: &MetricComparison) -> bool {
        if !c.significance.is_significant {
            return false;
        }
        let direction_matches = match h.direction {
            Direction::Increase => c.absolute_diff > 0.0,
            Direction::Decrease => c.absolute_diff < 0.0,
        };
        let meets_minimum = h
            .minimum_effect
            .map_or(true, |min| c.absolute_diff.abs() >= min);
        direction_matches && meets_minimum
    }

    /// Decision table over (significance, effect magnitude, sample size).
    fn conclude(
        &self,
        control: &Variant,
        treatment: &Variant,
        primary: &MetricComparison,
        sample_size: usize,
    ) -> ExperimentConclusion {
        let mut rationale = Vec::new();

        // Insufficient data overrides everything, including a small p-value.
        if sample_size < self.config.min_sample_size {
            rationale.push(format!(
                "sample size {sample_size} below minimum {}",
                self.config.min_sample_size
            ));
            return ExperimentConclusion {
                winner: None,
                confidence: ConfidenceLevel::Inconclusive,
                recommendation: Recommendation::ContinueExperiment,
                rationale,
            };
        }

        let significant = primary.significance.is_significant;
        let magnitude = primary.effect_size.magnitude;
        rationale.push(format!(
            "primary metric '{}': p = {:.4}, Cohen's d = {:.3} ({:?})",
            primary.metric, primary.significance.p_value, primary.effect_size.cohens_d, magnitude
        ));

        if !significant || magnitude < EffectMagnitude::Small {
            if !significant {
                rationale.push(format!(
                    "not significant at alpha = {}",
                    self.config.alpha
                ));
            } else {
                rationale.push("effect size is negligible".to_string());
            }
            // Plenty of data and still no detectable effect: more of the
            // same experiment will not help.
            let recommendation = if sample_size >= 4 * self.config.min_sample_size {
                rationale.push(format!(
                    "no effect detected after {sample_size} samples per variant"
                ));
                Recommendation::Redesign
            } else {
                Recommendation::ContinueExperiment
            };
            return ExperimentConclusion {
                winner: None,
                confidence: ConfidenceLevel::Inconclusive,
                recommendation,
                rationale,
            };
        }

        // "Better" depends on the metric's orientation: a significant
        // increase in duration_ms means the treatment lost.
        let treatment_wins = if primary.higher_is_better {
            primary.absolute_diff > 0.0
        } else {
            primary.absolute_diff < 0.0
        };
        let winner = if treatment_wins { treatment } else { control };
        rationale.push(format!("variant '{}' has the better mean", winner.id));

        let confidence = if primary.significance.p_value < 0.01
            && magnitude == EffectMagnitude::Large
        {
            ConfidenceLevel::High
        } else if magnitude >= EffectMagnitude::Medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        let recommendation = match (treatment_wins, confidence) {
            (true, ConfidenceLevel::High | ConfidenceLevel::Medium) => {
                Recommendation::ShipTreatment
            }
            (false, ConfidenceLevel::High | ConfidenceLevel::Medium) => {
                Recommendation::KeepControl
            }
            _ => Recommendation::ContinueExperiment,
        };

        ExperimentConclusion {
            winner: Some(winner.id.clone()),
            confidence,
            recommendation,
            rationale,
        }
    }
}

fn default_higher_is_better() -> bool {
    true
}

struct MetricComparisonParts {
    higher_is_better: bool,
    control: MetricSummary,
    treatment: MetricSummary,
    absolute_diff: f64,
    relative_diff: f64,
    effect_size: EffectSize,
    diff_confidence_interval: (f64, f64),
}

/// An experiment definition: a suite run once per variant, compared on a
/// primary metric.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub variants: Vec<Variant>,

    pub suite: Suite,

    /// Primary metric name ("score" or "duration_ms")
    pub primary_metric: String,

    pub secondary_metrics: Vec<String>,

    pub hypotheses: Vec<Hypothesis>,

    pub statistical_config: StatisticalConfig,
}

/// Execution bookkeeping for one experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentExecutionMetadata {
    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Agent-executor and per-suite failures, caught rather than propagated
    pub errors: Vec<String>,
}

/// Everything an experiment run produced.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    /// Control vs each treatment, in declaration order
    pub comparisons: Vec<ComparisonResult>,

    /// Raw per-variant suite results, keyed by variant id
    pub suite_results: HashMap<String, SuiteResult>,

    pub metadata: ExperimentExecutionMetadata,
}

/// Runs an experiment end to end: one suite pass per variant through the
/// injected executor, then one comparison per treatment.
pub struct ExperimentRunner {
    runner: TestRunner,
}

impl ExperimentRunner {
    #[must_use]
    pub fn new(runner: TestRunner) -> Self {
        Self { runner }
    }

    pub async fn run(
        &self,
        experiment: &Experiment,
        registry: &ScorerRegistry,
        executor: &dyn AgentExecutor,
    ) -> Result<ExperimentResult> {
        experiment.statistical_config.validate()?;
        let control = experiment
            .variants
            .iter()
            .find(|v| v.kind == VariantKind::Control)
            .ok_or_else(|| EvalError::Validation("experiment has no control variant".into()))?;
        let treatments: Vec<&Variant> = experiment
            .variants
            .iter()
            .filter(|v| v.kind == VariantKind::Treatment)
            .collect();
        if treatments.is_empty() {
            return Err(EvalError::Validation(
                "experiment has no treatment variant".into(),
            ));
        }
        // A typo in a metric name must not cost a full suite pass per
        // variant first.
        validate_metric_name(&experiment.primary_metric)?;
        for name in &experiment.secondary_metrics {
            validate_metric_name(name)?;
        }

        let started_at = Utc::now();
        let mut errors = Vec::new();
        let mut suite_results: HashMap<String, SuiteResult> = HashMap::new();

        for variant in &experiment.variants {
            tracing::info!(variant_id = %variant.id, kind = ?variant.kind, "running variant");
            match self
                .runner
                .run_with_executor(&experiment.suite, registry, executor, &variant.config)
                .await
            {
                Ok(result) => {
                    for case in &result.results {
                        if let Some(error) = &case.error {
                            errors.push(format!(
                                "variant '{}', case '{}': {error}",
                                variant.id, case.case_id
                            ));
                        }
                    }
                    suite_results.insert(variant.id.clone(), result);
                }
                Err(e) => {
                    errors.push(format!("variant '{}': {e}", variant.id));
                }
            }
        }

        let comparator = Comparator::new(experiment.statistical_config.clone());
        let aggregation = self.runner.config().aggregation;
        let mut comparisons = Vec::with_capacity(treatments.len());
        for treatment in treatments {
            let (Some(control_result), Some(treatment_result)) = (
                suite_results.get(&control.id),
                suite_results.get(&treatment.id),
            ) else {
                continue;
            };

            let mut metric_names = vec![experiment.primary_metric.clone()];
            metric_names.extend(experiment.secondary_metrics.iter().cloned());
            let metrics: Vec<MetricSamples> = metric_names
                .iter()
                .map(|name| {
                    Ok(MetricSamples {
                        metric: name.clone(),
                        higher_is_better: metric_is_higher_better(name),
                        control: metric_samples(control_result, name, aggregation)?,
                        treatment: metric_samples(treatment_result, name, aggregation)?,
                    })
                })
                .collect::<Result<_>>()?;

            comparisons.push(comparator.compare(
                control,
                treatment,
                &metrics,
                &experiment.hypotheses,
            )?);
        }

        Ok(ExperimentResult {
            comparisons,
            suite_results,
            metadata: ExperimentExecutionMetadata {
                started_at,
                finished_at: Utc::now(),
                errors,
            },
        })
    }
}

/// Reject metric names the runner cannot extract.
fn validate_metric_name(metric: &str) -> Result<()> {
    match metric {
        "score" | "duration_ms" => Ok(()),
        other => Err(EvalError::Validation(format!(
            "unknown metric '{other}' (expected 'score' or 'duration_ms')"
        ))),
    }
}

/// Whether larger values of a built-in metric are better.
fn metric_is_higher_better(metric: &str) -> bool {
    metric != "duration_ms"
}

/// Extract one named metric's per-case sample vector from a suite result.
fn metric_samples(
    result: &SuiteResult,
    metric: &str,
    aggregation: crate::runner::Aggregation,
) -> Result<Vec<f64>> {
    validate_metric_name(metric)?;
    if metric == "duration_ms" {
        Ok(result.case_durations())
    } else {
        Ok(result.case_scores(aggregation))
    }
}
