//! Original-versus-replay comparisons: JS API call counts and inline event
//! handler counts.

use crate::capture::{CaptureDir, ReplayKind};
use crate::console::{api_call_counts, handler_tag_counts, read_log, HandlerTagCounts};
use crate::error::Result;
use crate::listeners::ListenerClassifier;
use crate::redundant::RedundantLogDetector;
use replaylens_graph::{load_graphml, EdgeKind, NodeKind, ProvenanceGraph};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Interfaces whose calls the graph records in the form the log does.
pub const DEFAULT_TRACKED_INTERFACES: [&str; 20] = [
    "MessageChannel",
    "MessagePort",
    "MediaList",
    "StyleSheet",
    "CSSStyleSheet",
    "StyleSheetList",
    "ProcessingInstruction",
    "CSSRuleList",
    "CSSRule",
    "CSSStyleRule",
    "CSSImportRule",
    "CSSGroupingRule",
    "CSSPageRule",
    "CSSNamespaceRule",
    "CSSStyleDeclaration",
    "HTMLElement",
    "SVGElement",
    "MathMLElement",
    "CSS",
    "Window",
];

/// `Window` is tracked for these methods only.
pub const DEFAULT_WINDOW_METHODS: [&str; 2] = ["getComputedStyle", "setTimeout"];

#[derive(Debug, Clone)]
pub struct ApiFilter {
    pub interfaces: Vec<String>,
    pub window_methods: Vec<String>,
}

impl Default for ApiFilter {
    fn default() -> Self {
        Self {
            interfaces: DEFAULT_TRACKED_INTERFACES.iter().map(|s| s.to_string()).collect(),
            window_methods: DEFAULT_WINDOW_METHODS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ApiFilter {
    pub fn allows(&self, method: &str) -> bool {
        let interface = method.split('.').next().unwrap_or_default();
        if !self.interfaces.iter().any(|i| i == interface) {
            return false;
        }
        if interface == "Window" && !self.window_methods.iter().any(|m| method.contains(m.as_str())) {
            return false;
        }
        method != "CSSStyleDeclaration."
    }
}

/// Folds the aliases the page-side hooks produce onto one spelling.
pub fn normalize_call_name(name: &str) -> String {
    match name {
        "Window.CSSStyleSheet.constructor" => "CSSStyleSheet.constructor",
        "Window.MessageChannel.constructor" | "[object Window].MessageChannel.constructor" => {
            "MessageChannel.constructor"
        }
        "[object Window].getComputedStyle" | ".getComputedStyle" => "Window.getComputedStyle",
        "[object CSS].escape" => "CSS.escape",
        other => other,
    }
    .to_string()
}

/// Calls per method recorded in the graph: one per `js call` edge into a
/// tracked web API, plus the duplicates the logger emitted for it.
pub fn graph_api_counts(graph: &ProvenanceGraph, filter: &ApiFilter) -> Result<BTreeMap<String, u64>> {
    let detector = RedundantLogDetector::new(graph);
    let mut counts = BTreeMap::new();
    for node in graph.nodes() {
        let NodeKind::WebApi { method } = &node.kind else {
            continue;
        };
        if !filter.allows(method) {
            continue;
        }
        for edge in graph.incoming(node.id) {
            if !matches!(edge.kind(), EdgeKind::JsCall { .. }) {
                continue;
            }
            let duplicates = detector.duplicates(edge.seq())?.len() as u64;
            *counts.entry(method.clone()).or_insert(0) += 1 + duplicates;
        }
    }
    Ok(counts)
}

fn log_api_counts(path: &Path) -> Result<BTreeMap<String, u64>> {
    let text = read_log(path)?;
    let mut counts = BTreeMap::new();
    for (name, n) in api_call_counts(&text) {
        *counts.entry(normalize_call_name(&name)).or_insert(0) += n;
    }
    Ok(counts)
}

fn replay_log_api_counts(dir: &CaptureDir, kind: ReplayKind) -> Result<BTreeMap<String, u64>> {
    let path = dir.replay_log_path(kind);
    if !path.is_file() {
        warn!("No {} console log in {}", kind.dir_name(), dir.root.display());
        return Ok(BTreeMap::new());
    }
    log_api_counts(&path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsComparisonRow {
    pub origin: String,
    pub call: String,
    pub js: u64,
    pub graph: u64,
    pub har_js: u64,
    pub warc_js: u64,
}

/// Per-call counts from the original log, the graph and both replay logs,
/// sorted by call name.
pub fn compare_js_api(
    dir: &CaptureDir,
    filter: &ApiFilter,
    include_replays: bool,
) -> Result<Vec<JsComparisonRow>> {
    let original = log_api_counts(&dir.log_path())?;
    let graph = load_graphml(&dir.graph_path)?;
    let from_graph = graph_api_counts(&graph, filter)?;
    let (har, warc) = if include_replays {
        (
            replay_log_api_counts(dir, ReplayKind::Har)?,
            replay_log_api_counts(dir, ReplayKind::Warc)?,
        )
    } else {
        (BTreeMap::new(), BTreeMap::new())
    };

    let calls: BTreeSet<&String> = original
        .keys()
        .chain(from_graph.keys())
        .chain(har.keys())
        .chain(warc.keys())
        .collect();
    let origin = dir.name();
    let count = |m: &BTreeMap<String, u64>, k: &String| m.get(k).copied().unwrap_or(0);

    let rows: Vec<JsComparisonRow> = calls
        .into_iter()
        .map(|call| JsComparisonRow {
            origin: origin.clone(),
            call: call.clone(),
            js: count(&original, call),
            graph: count(&from_graph, call),
            har_js: count(&har, call),
            warc_js: count(&warc, call),
        })
        .collect();
    debug!("{}: {} compared calls", origin, rows.len());
    Ok(rows)
}

/// Inline handler counts for one capture: what the graph attributes versus
/// what the handler hooks logged live and under each replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerSummary {
    pub origin: String,
    pub graph_handlers: u64,
    pub logged_inline: u64,
    pub logged_programmatic: u64,
    pub logged_on_attribute: u64,
    pub har_inline: u64,
    pub warc_inline: u64,
}

/// Inline handlers installed by script on elements that were live, or that
/// load resources while detached.
pub fn count_studied_handlers(graph: &ProvenanceGraph) -> Result<u64> {
    let classified = ListenerClassifier::new(graph).classify()?;
    Ok(classified
        .iter()
        .filter(|l| l.is_studied_inline_handler())
        .count() as u64)
}

pub fn summarize_listeners(dir: &CaptureDir, include_replays: bool) -> Result<ListenerSummary> {
    let graph = load_graphml(&dir.graph_path)?;
    let graph_handlers = count_studied_handlers(&graph)?;
    let live: HandlerTagCounts = handler_tag_counts(&read_log(&dir.log_path())?);

    let replay_inline = |kind: ReplayKind| -> Result<u64> {
        if !include_replays {
            return Ok(0);
        }
        let path = dir.replay_log_path(kind);
        if !path.is_file() {
            warn!("No {} console log in {}", kind.dir_name(), dir.root.display());
            return Ok(0);
        }
        Ok(handler_tag_counts(&read_log(&path)?).inline_handler)
    };

    Ok(ListenerSummary {
        origin: dir.name(),
        graph_handlers,
        logged_inline: live.inline_handler,
        logged_programmatic: live.prog_handler,
        logged_on_attribute: live.on_attr_handler,
        har_inline: replay_inline(ReplayKind::Har)?,
        warc_inline: replay_inline(ReplayKind::Warc)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_filter_default() {
        let filter = ApiFilter::default();
        assert!(filter.allows("CSSStyleSheet.insertRule"));
        assert!(filter.allows("Window.getComputedStyle"));
        assert!(filter.allows("Window.setTimeout"));
        assert!(!filter.allows("Window.fetch"));
        assert!(!filter.allows("Document.createElement"));
        assert!(!filter.allows("CSSStyleDeclaration."));
    }

    #[test]
    fn test_normalize_call_name() {
        assert_eq!(normalize_call_name("[object CSS].escape"), "CSS.escape");
        assert_eq!(
            normalize_call_name("[object Window].MessageChannel.constructor"),
            "MessageChannel.constructor"
        );
        assert_eq!(normalize_call_name(".getComputedStyle"), "Window.getComputedStyle");
        assert_eq!(normalize_call_name("CSSRule.type.get"), "CSSRule.type.get");
    }
}
