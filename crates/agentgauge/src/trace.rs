//! Execution trace model: span trees and the failed traces mined for
//! regression tests.
//!
//! Spans form a tree (an agent step may nest sub-steps). Trajectory scorers
//! and the test generator operate over the flattened, parent-before-children
//! sequence, so the flattening order is part of the contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of work a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A tool invocation
    Tool,
    /// An LLM generation
    Generation,
    /// A planning step (declared action list)
    Planning,
    /// Anything else (retrieval, glue, ...)
    Other,
}

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Completed normally
    Ok,
    /// Completed with an error
    Error,
}

/// One node in an execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Span identifier (unique within its trace)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Kind of work this span represents
    pub kind: SpanKind,

    /// Terminal status
    pub status: SpanStatus,

    /// Tool name, for `SpanKind::Tool` spans
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,

    /// Input payload
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input: Option<Value>,

    /// Output payload
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<Value>,

    /// Nested child spans
    #[serde(default)]
    pub children: Vec<Span>,
}

impl Span {
    /// Create a leaf span with the given kind and status.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: SpanStatus::Ok,
            tool_name: None,
            input: None,
            output: None,
            children: Vec::new(),
        }
    }

    /// Builder-style status setter.
    #[must_use]
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style tool name setter.
    #[must_use]
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Builder-style input setter.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Builder-style output setter.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Builder-style child appender.
    #[must_use]
    pub fn with_child(mut self, child: Span) -> Self {
        self.children.push(child);
        self
    }

    /// Effective tool name: the explicit `tool_name` if set, else the span name.
    #[must_use]
    pub fn tool(&self) -> &str {
        self.tool_name.as_deref().unwrap_or(&self.name)
    }
}

/// Flatten a forest of spans into preorder (each parent before its children).
#[must_use]
pub fn flatten_spans(spans: &[Span]) -> Vec<&Span> {
    let mut out = Vec::new();
    for span in spans {
        push_preorder(span, &mut out);
    }
    out
}

fn push_preorder<'a>(span: &'a Span, out: &mut Vec<&'a Span>) {
    out.push(span);
    for child in &span.children {
        push_preorder(child, out);
    }
}

/// A complete execution trace for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Trace identifier
    pub trace_id: String,

    /// Root spans (tree-shaped)
    pub spans: Vec<Span>,
}

impl Trace {
    /// Create a trace from root spans.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, spans: Vec<Span>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans,
        }
    }

    /// All spans in preorder.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Span> {
        flatten_spans(&self.spans)
    }

    /// Tool and generation spans in preorder - the agent's trajectory.
    #[must_use]
    pub fn trajectory(&self) -> Vec<&Span> {
        self.flatten()
            .into_iter()
            .filter(|s| matches!(s.kind, SpanKind::Tool | SpanKind::Generation))
            .collect()
    }

    /// Tool spans only, in preorder.
    #[must_use]
    pub fn tool_spans(&self) -> Vec<&Span> {
        self.flatten()
            .into_iter()
            .filter(|s| s.kind == SpanKind::Tool)
            .collect()
    }
}

/// A production failure handed to the test generator. Read-only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTrace {
    /// Trace identifier
    pub trace_id: String,

    /// Root spans (tree-shaped)
    pub spans: Vec<Span>,

    /// Why the run was considered a failure
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,

    /// Coarse error bucket (e.g. "timeout", "validation")
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_category: Option<String>,

    /// Score the run received, if it was scored
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub score: Option<f64>,
}

impl FailedTrace {
    /// All spans in preorder.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Span> {
        flatten_spans(&self.spans)
    }

    /// The failure pattern this trace belongs to, used for frequency-based
    /// prioritization: the error category if present, else the failure
    /// reason, else "unknown".
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.error_category
            .as_deref()
            .or(self.failure_reason.as_deref())
            .unwrap_or("unknown")
    }

    /// View the failure as a plain trace (for trajectory scoring or export).
    #[must_use]
    pub fn as_trace(&self) -> Trace {
        Trace {
            trace_id: self.trace_id.clone(),
            spans: self.spans.clone(),
        }
    }
}
