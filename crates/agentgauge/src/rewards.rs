//! Per-step reward assignment for offline RL training export.
//!
//! A trace's trajectory (tool and generation spans, in order) becomes an
//! episode of transitions. The terminal outcome is turned into a scalar
//! reward and distributed across the transitions by a
//! [`CreditStrategy`], chosen once at configuration time.

use crate::stats;
use crate::trace::{SpanKind, SpanStatus, Trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the terminal reward is distributed across transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CreditStrategy {
    /// Terminal reward split equally across all transitions
    Uniform,
    /// Everything on the final transition, zero elsewhere
    Terminal,
    /// Reward decays geometrically away from the end; the final
    /// transition gets the full terminal reward
    Decay { discount_factor: f64 },
    /// Reward grows linearly with step index
    Proportional,
}

/// One exportable step of an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Position in the trajectory, starting at 0
    pub step_index: usize,

    /// Tool name for tool steps, span name otherwise
    pub action: String,

    pub kind: SpanKind,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<Value>,

    /// Whether this step itself errored
    pub errored: bool,

    /// Assigned reward
    pub reward: f64,
}

/// A complete reward-annotated trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub trace_id: String,

    pub transitions: Vec<Transition>,

    /// The scalar the strategy distributed
    pub terminal_reward: f64,

    pub strategy: CreditStrategy,
}

impl Episode {
    /// Sum of all transition rewards.
    #[must_use]
    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }
}

/// Terminal reward: 1.0 on success, 0.0 on failure, blended 50/50 with
/// the mean external score when external scores exist.
#[must_use]
pub fn terminal_reward(success: bool, external_scores: &[f64]) -> f64 {
    let base = if success { 1.0 } else { 0.0 };
    if external_scores.is_empty() {
        base
    } else {
        0.5 * base + 0.5 * stats::mean(external_scores)
    }
}

/// Build an episode from a trace. A trace with no tool or generation
/// spans yields no episode.
#[must_use]
pub fn assign_rewards(
    trace: &Trace,
    success: bool,
    external_scores: &[f64],
    strategy: CreditStrategy,
) -> Option<Episode> {
    let steps = trace.trajectory();
    if steps.is_empty() {
        return None;
    }

    let terminal = terminal_reward(success, external_scores);
    let n = steps.len();
    let transitions = steps
        .iter()
        .enumerate()
        .map(|(i, span)| Transition {
            step_index: i,
            action: span.tool().to_string(),
            kind: span.kind,
            input: span.input.clone(),
            output: span.output.clone(),
            errored: span.status == SpanStatus::Error,
            reward: step_reward(strategy, terminal, i, n),
        })
        .collect();

    Some(Episode {
        trace_id: trace.trace_id.clone(),
        transitions,
        terminal_reward: terminal,
        strategy,
    })
}

fn step_reward(strategy: CreditStrategy, terminal: f64, index: usize, total: usize) -> f64 {
    match strategy {
        CreditStrategy::Uniform => terminal / total as f64,
        CreditStrategy::Terminal => {
            if index + 1 == total {
                terminal
            } else {
                0.0
            }
        }
        CreditStrategy::Decay { discount_factor } => {
            let steps_from_end = (total - 1 - index) as f64;
            terminal * discount_factor.powf(steps_from_end)
        }
        CreditStrategy::Proportional => terminal * (index + 1) as f64 / total as f64,
    }
}
