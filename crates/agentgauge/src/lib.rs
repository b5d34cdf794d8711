//! # AgentGauge
//!
//! Evaluation and experimentation engine for AI agents:
//!
//! - **Scorers**: rule-based, trajectory and LLM-judge quality judgments
//!   over agent outputs and execution traces
//! - **Test runner**: concurrent suite execution with per-case timeouts,
//!   pluggable reporters and a CI threshold gate
//! - **Statistical comparator**: A/B variant comparison with significance
//!   tests, effect sizes, multiple-testing correction and a deterministic
//!   conclusion
//! - **Test generation**: mines failed production traces into prioritized
//!   regression candidates
//! - **Training export**: reward-annotated episode batches for offline RL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentgauge::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = ScorerRegistry::new()
//!     .with(Arc::new(ContainsScorer::new()))
//!     .with(Arc::new(ErrorDetectionScorer));
//!
//! let suite = Suite::validated("smoke", cases)?;
//! let runner = TestRunner::new(RunnerConfig::default());
//! let result = runner.run(&suite, &registry).await?;
//! ```
//!
//! External capabilities (LLM generation, embeddings, agent execution)
//! are injected through the [`Generator`], [`Embedder`] and
//! [`AgentExecutor`] traits; nothing in the engine talks to a provider
//! or holds global mutable state.

pub mod error;
pub mod experiment;
pub mod export;
pub mod gate;
pub mod judge;
pub mod rewards;
pub mod runner;
pub mod scorer;
pub mod stats;
pub mod suite;
pub mod testgen;
pub mod trace;
pub mod trajectory;

pub use error::{EvalError, Result};
pub use experiment::{
    Comparator, ComparisonResult, ConfidenceLevel, Direction, Experiment, ExperimentConclusion,
    ExperimentResult, ExperimentRunner, Hypothesis, MetricComparison, MetricSamples,
    MetricSummary, Recommendation, StatisticalConfig, StatisticalTest, Variant, VariantKind,
};
pub use export::{
    export_batch_to_agent_lightning, export_batch_to_dspy, stream_export_to_agent_lightning,
    stream_export_to_dspy, validate_agent_lightning_batch, validate_dspy_batch,
    AgentLightningBatch, DspyBatch, ExportContext, ValidationReport,
};
pub use gate::{GateConfig, GateOutcome, GateVerdict, ThresholdGate};
pub use judge::{Embedder, Generator, LlmJudgeScorer};
pub use rewards::{assign_rewards, CreditStrategy, Episode, Transition};
pub use runner::{
    AgentExecutor, AgentOutcome, Aggregation, BatchReport, NoopReporter, Reporter, RunnerConfig,
    SuiteResult, TestResult, TestRunner, TracingReporter,
};
pub use scorer::{
    ContainsScorer, ErrorDetectionScorer, ScoreContext, ScoreResult, Scorer, ScorerRegistry,
    SuccessScorer, ToolSelectionScorer,
};
pub use stats::{EffectMagnitude, MultipleTestingCorrection};
pub use suite::{Suite, TestCase};
pub use testgen::{
    GeneratedTestCase, GenerationMethod, GenerationReport, GeneratorConfig, Lineage,
    ReviewStatus, TestCaseGenerator,
};
pub use trace::{FailedTrace, Span, SpanKind, SpanStatus, Trace};
pub use trajectory::{
    PathOptimalityScorer, PlanAdherenceScorer, RecoveryEfficiencyScorer, StepConsistencyScorer,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{EvalError, Result};
    pub use crate::experiment::{
        Comparator, Experiment, ExperimentRunner, Hypothesis, StatisticalConfig, Variant,
    };
    pub use crate::gate::{GateConfig, ThresholdGate};
    pub use crate::judge::{Embedder, Generator, LlmJudgeScorer};
    pub use crate::runner::{
        AgentExecutor, Reporter, RunnerConfig, SuiteResult, TestRunner,
    };
    pub use crate::scorer::{
        ContainsScorer, ErrorDetectionScorer, ScoreContext, ScoreResult, Scorer, ScorerRegistry,
        SuccessScorer, ToolSelectionScorer,
    };
    pub use crate::suite::{Suite, TestCase};
    pub use crate::testgen::{GeneratorConfig, TestCaseGenerator};
    pub use crate::trace::{FailedTrace, Span, SpanKind, SpanStatus, Trace};
    pub use crate::trajectory::{
        PathOptimalityScorer, PlanAdherenceScorer, RecoveryEfficiencyScorer,
        StepConsistencyScorer,
    };
}
