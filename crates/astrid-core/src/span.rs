//! Telemetry span data model (C4).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One structured span, produced by any component and buffered by the
/// telemetry sink before a batched flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Groups spans belonging to the same run; monotonically ordered
    /// within a trace by the producer's start-time assignment.
    pub trace_id: String,
    /// Unique identifier of this span.
    pub span_id: String,
    /// Parent span, when this span was produced inside another.
    pub parent_id: Option<String>,
    /// Span name, e.g. `"llm.request"`, `"tool.bash"`.
    pub name: String,
    /// Start time in nanoseconds since the Unix epoch.
    pub start_ns: u64,
    /// End time in nanoseconds since the Unix epoch.
    pub end_ns: u64,
    /// Arbitrary key-value attributes, serialised as a single JSON blob.
    pub attributes: BTreeMap<String, String>,
    /// Outcome status, e.g. `"ok"`, `"error"`.
    pub status: String,
}

impl SpanRecord {
    /// Duration of the span in whole milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns) / 1_000_000
    }
}
