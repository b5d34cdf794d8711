//! CI threshold gate: turns batch results into a pass/fail verdict with
//! a documented exit-code mapping for CLI callers.
//!
//! Exit codes: 0 when every threshold is met, 1 when tests ran but a
//! threshold failed, 2 when nothing ran (setup or execution error).
//! Non-fatal per-case errors never change the exit code by themselves.

use crate::error::{EvalError, Result};
use crate::runner::BatchReport;
use serde::{Deserialize, Serialize};

/// Thresholds a batch must meet. Unset thresholds are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum average score per suite
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_avg_score: Option<f64>,

    /// Minimum fraction of passing cases per suite
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_pass_rate: Option<f64>,
}

impl GateConfig {
    /// Reject thresholds outside `[0, 1]` before anything runs.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_avg_score", self.min_avg_score),
            ("min_pass_rate", self.min_pass_rate),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(EvalError::Validation(format!(
                        "{name} {v} outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Gate verdict, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    /// All thresholds met
    Pass,
    /// Tests ran, at least one threshold failed
    ThresholdFailure,
    /// No suite produced results
    ExecutionError,
}

impl GateVerdict {
    /// The process exit code CLI collaborators must map this to.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::ThresholdFailure => 1,
            Self::ExecutionError => 2,
        }
    }
}

/// Full gate outcome: the verdict plus the reasons behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub verdict: GateVerdict,

    /// One entry per threshold violation
    pub failures: Vec<String>,

    /// Suite-level execution errors carried over from the batch
    pub errors: Vec<String>,
}

/// Evaluates batch results against configured thresholds.
#[derive(Debug, Clone, Default)]
pub struct ThresholdGate {
    config: GateConfig,
}

impl ThresholdGate {
    pub fn new(config: GateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Judge a batch. Execution errors only dominate when no suite ran
    /// at all; otherwise the surviving suites decide.
    #[must_use]
    pub fn evaluate(&self, report: &BatchReport) -> GateOutcome {
        if report.suites.is_empty() {
            return GateOutcome {
                verdict: GateVerdict::ExecutionError,
                failures: vec![],
                errors: report.errors.clone(),
            };
        }

        let mut failures = Vec::new();
        for suite in &report.suites {
            if let Some(min) = self.config.min_avg_score {
                if suite.avg_score < min {
                    failures.push(format!(
                        "suite '{}': avg score {:.3} below threshold {min}",
                        suite.suite_id, suite.avg_score
                    ));
                }
            }
            if let Some(min) = self.config.min_pass_rate {
                let rate = suite.pass_rate();
                if rate < min {
                    failures.push(format!(
                        "suite '{}': pass rate {:.3} below threshold {min}",
                        suite.suite_id, rate
                    ));
                }
            }
        }

        let verdict = if failures.is_empty() {
            GateVerdict::Pass
        } else {
            GateVerdict::ThresholdFailure
        };
        GateOutcome {
            verdict,
            failures,
            errors: report.errors.clone(),
        }
    }
}
