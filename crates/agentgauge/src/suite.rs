//! Test cases and suites.
//!
//! A suite owns an ordered list of immutable cases; scorers are shared,
//! stateless, and referenced by name out of a per-run
//! [`crate::scorer::ScorerRegistry`]. Suites are registered through the
//! schema-validated [`Suite::validated`] constructor - callers supply typed
//! values, the engine never sniffs module shapes at runtime.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One test case. Immutable once defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Case identifier, unique within its suite
    pub id: String,

    /// Input handed to the agent / scorers
    pub input: Map<String, Value>,

    /// Expected output, if one is known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_output: Option<Value>,

    /// Names of the scorers to run for this case
    pub scorers: Vec<String>,

    /// Per-case timeout override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_ms: Option<u64>,

    /// Per-case minimum aggregate score override
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_score: Option<f64>,
}

impl TestCase {
    /// Minimal case with an id, input and scorer list.
    #[must_use]
    pub fn new(id: impl Into<String>, input: Map<String, Value>, scorers: Vec<String>) -> Self {
        Self {
            id: id.into(),
            input,
            expected_output: None,
            scorers,
            timeout_ms: None,
            min_score: None,
        }
    }

    /// Builder-style expected output setter.
    #[must_use]
    pub fn with_expected_output(mut self, expected: Value) -> Self {
        self.expected_output = Some(expected);
        self
    }

    /// Builder-style timeout setter.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Builder-style minimum score setter.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// An ordered, validated collection of test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Suite identifier
    pub id: String,

    /// Cases, in execution order
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Construct a suite, validating its schema up front: a non-empty id,
    /// unique case ids, and at least one named scorer per case. A malformed
    /// suite is rejected here, before anything runs.
    pub fn validated(id: impl Into<String>, cases: Vec<TestCase>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EvalError::Validation("suite id must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for case in &cases {
            if case.id.trim().is_empty() {
                return Err(EvalError::Validation(format!(
                    "suite '{id}' contains a case with an empty id"
                )));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(EvalError::Validation(format!(
                    "suite '{id}' contains duplicate case id '{}'",
                    case.id
                )));
            }
            if case.scorers.is_empty() {
                return Err(EvalError::Validation(format!(
                    "case '{}' names no scorers",
                    case.id
                )));
            }
            if case.scorers.iter().any(|s| s.trim().is_empty()) {
                return Err(EvalError::Validation(format!(
                    "case '{}' names an empty scorer",
                    case.id
                )));
            }
            if let Some(min) = case.min_score {
                if !(0.0..=1.0).contains(&min) {
                    return Err(EvalError::Validation(format!(
                        "case '{}' min_score {min} outside [0, 1]",
                        case.id
                    )));
                }
            }
        }

        Ok(Self { id, cases })
    }

    /// Look a case up by id.
    #[must_use]
    pub fn get_by_id(&self, case_id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == case_id)
    }

    /// Number of cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the suite has no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(id: &str) -> TestCase {
        let mut input = Map::new();
        input.insert("query".to_string(), json!("what is rust"));
        TestCase::new(id, input, vec!["success".to_string()])
    }

    #[test]
    fn test_validated_accepts_well_formed_suite() {
        let suite = Suite::validated("smoke", vec![case("a"), case("b")]).unwrap();
        assert_eq!(suite.len(), 2);
        assert!(suite.get_by_id("a").is_some());
        assert!(suite.get_by_id("z").is_none());
    }

    #[test]
    fn test_validated_rejects_duplicate_case_ids() {
        let err = Suite::validated("smoke", vec![case("a"), case("a")]).unwrap_err();
        assert!(matches!(err, EvalError::Validation(_)));
        assert!(err.to_string().contains("duplicate case id"));
    }

    #[test]
    fn test_validated_rejects_empty_suite_id() {
        assert!(Suite::validated("  ", vec![case("a")]).is_err());
    }

    #[test]
    fn test_validated_rejects_case_without_scorers() {
        let mut bad = case("a");
        bad.scorers.clear();
        assert!(Suite::validated("smoke", vec![bad]).is_err());
    }

    #[test]
    fn test_validated_rejects_out_of_range_min_score() {
        let bad = case("a").with_min_score(1.5);
        assert!(Suite::validated("smoke", vec![bad]).is_err());
    }

    #[test]
    fn test_case_builder_round_trips_through_json() {
        let case = case("a")
            .with_expected_output(json!("rust is a language"))
            .with_timeout_ms(500)
            .with_min_score(0.7);
        let serialized = serde_json::to_string(&case).unwrap();
        let back: TestCase = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.id, "a");
        assert_eq!(back.timeout_ms, Some(500));
        assert_eq!(back.min_score, Some(0.7));
    }
}
