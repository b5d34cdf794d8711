//! Batch export of reward-annotated traces for offline training, plus
//! round-trip validators for the produced formats.
//!
//! Exporters take [`ExportContext`] values (a trace with its terminal
//! outcome and any external scores) and produce tagged batch structures.
//! The streaming variants are lazy iterators holding one trace at a time,
//! so large corpora export in bounded memory.

use crate::rewards::{assign_rewards, CreditStrategy, Episode};
use crate::trace::{SpanKind, Trace};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format tag of Agent Lightning batches.
pub const AGENT_LIGHTNING_FORMAT: &str = "agent-lightning";

/// Format tag of DSPy batches.
pub const DSPY_FORMAT: &str = "dspy";

/// Schema version stamped on every exported batch.
pub const EXPORT_VERSION: &str = "1.0";

/// One trace plus its terminal outcome, ready for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportContext {
    pub trace: Trace,

    /// Whether the run succeeded
    pub success: bool,

    /// External scores blended into the terminal reward
    #[serde(default)]
    pub external_scores: Vec<f64>,
}

/// Aggregate counts over an exported batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportStats {
    pub episode_count: usize,

    pub transition_count: usize,

    /// Sum of all transition rewards across the batch
    pub total_reward: f64,
}

/// Reward-annotated episode batch for Agent Lightning training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLightningBatch {
    /// Always [`AGENT_LIGHTNING_FORMAT`]
    pub format: String,

    pub version: String,

    pub episodes: Vec<Episode>,

    pub stats: ExportStats,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One input/output pair for DSPy optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspyExample {
    pub inputs: Value,

    pub outputs: Value,

    /// Trace the pair was mined from
    pub trace_id: String,
}

/// Input/output example batch for DSPy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspyBatch {
    /// Always [`DSPY_FORMAT`]
    pub format: String,

    pub version: String,

    pub examples: Vec<DspyExample>,

    pub stats: ExportStats,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Export a batch of contexts as Agent Lightning episodes. Traces with
/// no exportable transitions are skipped.
#[must_use]
pub fn export_batch_to_agent_lightning(
    contexts: &[ExportContext],
    strategy: CreditStrategy,
) -> AgentLightningBatch {
    let episodes: Vec<Episode> = stream_export_to_agent_lightning(contexts.iter().cloned(), strategy)
        .collect();
    let stats = ExportStats {
        episode_count: episodes.len(),
        transition_count: episodes.iter().map(|e| e.transitions.len()).sum(),
        total_reward: episodes.iter().map(Episode::total_reward).sum(),
    };
    AgentLightningBatch {
        format: AGENT_LIGHTNING_FORMAT.to_string(),
        version: EXPORT_VERSION.to_string(),
        episodes,
        stats,
        metadata: Map::new(),
    }
}

/// Lazy episode stream: one trace resident at a time.
pub fn stream_export_to_agent_lightning(
    contexts: impl IntoIterator<Item = ExportContext>,
    strategy: CreditStrategy,
) -> impl Iterator<Item = Episode> {
    contexts.into_iter().filter_map(move |ctx| {
        assign_rewards(&ctx.trace, ctx.success, &ctx.external_scores, strategy)
    })
}

/// Export a batch of contexts as DSPy input/output examples: one example
/// per generation span carrying both an input and an output.
#[must_use]
pub fn export_batch_to_dspy(contexts: &[ExportContext]) -> DspyBatch {
    let examples: Vec<DspyExample> = stream_export_to_dspy(contexts.iter().cloned()).collect();
    let stats = ExportStats {
        episode_count: examples.len(),
        transition_count: examples.len(),
        total_reward: 0.0,
    };
    DspyBatch {
        format: DSPY_FORMAT.to_string(),
        version: EXPORT_VERSION.to_string(),
        examples,
        stats,
        metadata: Map::new(),
    }
}

/// Lazy DSPy example stream.
pub fn stream_export_to_dspy(
    contexts: impl IntoIterator<Item = ExportContext>,
) -> impl Iterator<Item = DspyExample> {
    contexts.into_iter().flat_map(|ctx| {
        let trace_id = ctx.trace.trace_id.clone();
        ctx.trace
            .flatten()
            .into_iter()
            .filter(|s| s.kind == SpanKind::Generation)
            .filter_map(|span| {
                Some(DspyExample {
                    inputs: span.input.clone()?,
                    outputs: span.output.clone()?,
                    trace_id: trace_id.clone(),
                })
            })
            .collect::<Vec<_>>()
    })
}

/// Outcome of structural validation of an exported batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,

    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Structural validation of an Agent Lightning batch. Accepts anything
/// the exporter produces; rejects missing fields, a wrong format tag and
/// non-numeric rewards.
#[must_use]
pub fn validate_agent_lightning_batch(batch: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let Some(obj) = batch.as_object() else {
        return ValidationReport::from_errors(vec!["batch is not an object".to_string()]);
    };

    match obj.get("format").and_then(Value::as_str) {
        Some(AGENT_LIGHTNING_FORMAT) => {}
        Some(other) => errors.push(format!(
            "Invalid format: expected '{AGENT_LIGHTNING_FORMAT}', got '{other}'"
        )),
        None => errors.push("missing 'format' field".to_string()),
    }
    if obj.get("version").and_then(Value::as_str).is_none() {
        errors.push("missing 'version' field".to_string());
    }

    match obj.get("episodes").and_then(Value::as_array) {
        Some(episodes) => {
            for (i, episode) in episodes.iter().enumerate() {
                validate_episode(i, episode, &mut errors);
            }
        }
        None => errors.push("missing 'episodes' array".to_string()),
    }
    if obj.get("stats").and_then(Value::as_object).is_none() {
        errors.push("missing 'stats' object".to_string());
    }

    ValidationReport::from_errors(errors)
}

fn validate_episode(index: usize, episode: &Value, errors: &mut Vec<String>) {
    let Some(obj) = episode.as_object() else {
        errors.push(format!("episode {index} is not an object"));
        return;
    };
    if obj.get("trace_id").and_then(Value::as_str).is_none() {
        errors.push(format!("episode {index} is missing 'trace_id'"));
    }
    let Some(transitions) = obj.get("transitions").and_then(Value::as_array) else {
        errors.push(format!("episode {index} is missing 'transitions'"));
        return;
    };
    for (j, transition) in transitions.iter().enumerate() {
        let reward = transition.get("reward").and_then(Value::as_f64);
        match reward {
            Some(r) if r.is_finite() => {}
            _ => errors.push(format!(
                "episode {index} transition {j} has a non-numeric reward"
            )),
        }
    }
}

/// Structural validation of a DSPy batch.
#[must_use]
pub fn validate_dspy_batch(batch: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let Some(obj) = batch.as_object() else {
        return ValidationReport::from_errors(vec!["batch is not an object".to_string()]);
    };

    match obj.get("format").and_then(Value::as_str) {
        Some(DSPY_FORMAT) => {}
        Some(other) => errors.push(format!(
            "Invalid format: expected '{DSPY_FORMAT}', got '{other}'"
        )),
        None => errors.push("missing 'format' field".to_string()),
    }
    if obj.get("version").and_then(Value::as_str).is_none() {
        errors.push("missing 'version' field".to_string());
    }

    match obj.get("examples").and_then(Value::as_array) {
        Some(examples) => {
            for (i, example) in examples.iter().enumerate() {
                let Some(ex) = example.as_object() else {
                    errors.push(format!("example {i} is not an object"));
                    continue;
                };
                if !ex.contains_key("inputs") {
                    errors.push(format!("example {i} is missing 'inputs'"));
                }
                if !ex.contains_key("outputs") {
                    errors.push(format!("example {i} is missing 'outputs'"));
                }
            }
        }
        None => errors.push("missing 'examples' array".to_string()),
    }

    ValidationReport::from_errors(errors)
}
