//! Discounting of log entries the instrumentation emits about itself.
//!
//! When the logger stringifies a call result, the stringification performs
//! property accesses that are logged again under the same call name. Those
//! echoes sit on the edges leading up to the call, every other sequence
//! number, each produced by a `JsonStringify` node.

use crate::error::{AnalysisError, Result};
use replaylens_graph::{EdgeKind, EdgeSeq, ProvenanceGraph};
use serde_json::Value;
use tracing::trace;

const STRINGIFY_METHOD: &str = "JsonStringify";

/// Rewrites a serialized `[object X]` prefix to `X`.
pub fn normalize_property(property: &str) -> String {
    if let Some(rest) = property.strip_prefix("[object ") {
        if let Some((name, tail)) = rest.split_once(']') {
            return format!("{}{}", name, tail);
        }
    }
    property.to_string()
}

/// True when a logged `property`/`event` pair names `method`.
pub fn names_method(property: &str, event: &str, method: &str) -> bool {
    let property = normalize_property(property);
    if property == method {
        return true;
    }
    let qualified = format!("{}.{}", property, event);
    if qualified == method {
        return true;
    }
    qualified.strip_prefix("Window.") == Some(method)
}

pub struct RedundantLogDetector<'g> {
    graph: &'g ProvenanceGraph,
}

impl<'g> RedundantLogDetector<'g> {
    pub fn new(graph: &'g ProvenanceGraph) -> Self {
        Self { graph }
    }

    /// Duplicate log values attributable to the `js call` edge at `call`.
    pub fn duplicates(&self, call: EdgeSeq) -> Result<Vec<String>> {
        let Some(edge) = self.graph.edge(call) else {
            return Err(AnalysisError::NotACall { seq: call });
        };
        if !matches!(edge.kind(), EdgeKind::JsCall { .. }) {
            return Err(AnalysisError::NotACall { seq: call });
        }
        let Some(method) = edge.target.kind.method() else {
            return Ok(Vec::new());
        };

        let Some(result) = self.preceding_result(call.0) else {
            return Ok(Vec::new());
        };

        let mut collected = Vec::new();
        let mut cursor = Some(result);
        while let Some(seq) = cursor {
            let Some(step) = self.graph.edge(EdgeSeq(seq)) else {
                cursor = seq.checked_sub(1);
                continue;
            };
            let Some(value) = step.kind().carried_value().filter(|v| !v.is_empty()) else {
                break;
            };
            let Ok(Value::Object(logged)) = serde_json::from_str::<Value>(value) else {
                break;
            };
            let (Some(property), Some(event)) = (
                logged.get("property").and_then(Value::as_str),
                logged.get("event").and_then(Value::as_str),
            ) else {
                break;
            };
            if !names_method(property, event, method) {
                break;
            }
            if step.source.kind.method() != Some(STRINGIFY_METHOD) {
                break;
            }
            trace!("Edge {} echoes call {}", step.seq(), call);
            collected.push(value.to_string());
            cursor = seq.checked_sub(2);
        }

        // The first hit is the result edge itself, not a duplicate.
        Ok(collected.into_iter().skip(1).collect())
    }

    fn preceding_result(&self, from: u64) -> Option<u64> {
        (0..from).rev().find(|seq| {
            self.graph
                .edge(EdgeSeq(*seq))
                .is_some_and(|e| matches!(e.kind(), EdgeKind::JsResult { .. }))
        })
    }
}
