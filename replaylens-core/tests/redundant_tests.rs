// Tests for redundant log detection and graph-side call counting

use replaylens_core::compare::{graph_api_counts, ApiFilter};
use replaylens_core::{AnalysisError, RedundantLogDetector};
use replaylens_graph::{EdgeKind, EdgeSeq, GraphBuilder, NodeId, NodeKind, ProvenanceGraph, ScriptType};

const METHOD: &str = "CSSStyleSheet.insertRule";

fn logged(property: &str, event: &str) -> EdgeKind {
    EdgeKind::JsResult {
        value: Some(format!(
            r#"{{"type":"log","property":"{}","event":"{}"}}"#,
            property, event
        )),
    }
}

struct Fixture {
    builder: GraphBuilder,
    script: NodeId,
    api: NodeId,
    stringify: NodeId,
}

fn fixture() -> Fixture {
    let mut builder = GraphBuilder::new();
    let script = builder.script(ScriptType::External, "sheet.insertRule('a{}')");
    let api = builder.web_api(METHOD);
    let stringify = builder.node(NodeKind::JsBuiltin {
        method: "JsonStringify".to_string(),
    });
    Fixture {
        builder,
        script,
        api,
        stringify,
    }
}

/// Three echoes at seqs 2, 4 and 6, then the call at 7.
fn three_echoes() -> ProvenanceGraph {
    let mut f = fixture();
    for seq in [2, 4, 6] {
        f.builder.edge_at(seq, f.stringify, f.script, logged(METHOD, "call"));
    }
    f.builder.edge_at(7, f.script, f.api, EdgeKind::JsCall { args: None });
    f.builder.build().unwrap()
}

// ============================================================================
// Detector Tests
// ============================================================================

#[test]
fn test_result_edge_itself_is_not_a_duplicate() {
    let graph = three_echoes();
    let duplicates = RedundantLogDetector::new(&graph).duplicates(EdgeSeq(7)).unwrap();
    assert_eq!(duplicates.len(), 2);
    assert!(duplicates.iter().all(|d| d.contains(METHOD)));
}

#[test]
fn test_scan_stops_at_non_stringify_source() {
    let mut f = fixture();
    f.builder.edge_at(2, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(4, f.api, f.script, logged(METHOD, "call"));
    f.builder.edge_at(6, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(7, f.script, f.api, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    // Only seq 6 is collected, and it is the result edge.
    let duplicates = RedundantLogDetector::new(&graph).duplicates(EdgeSeq(7)).unwrap();
    assert!(duplicates.is_empty());
}

#[test]
fn test_scan_stops_at_other_method() {
    let mut f = fixture();
    f.builder.edge_at(2, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(4, f.stringify, f.script, logged("MediaList", "get"));
    f.builder.edge_at(6, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(7, f.script, f.api, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    assert!(RedundantLogDetector::new(&graph).duplicates(EdgeSeq(7)).unwrap().is_empty());
}

#[test]
fn test_missing_sequence_number_steps_back_by_one() {
    let mut f = fixture();
    f.builder.edge_at(3, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(6, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(7, f.script, f.api, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    // 6 is the result, 4 is absent, 3 is an echo.
    let duplicates = RedundantLogDetector::new(&graph).duplicates(EdgeSeq(7)).unwrap();
    assert_eq!(duplicates.len(), 1);
}

#[test]
fn test_no_preceding_result_has_no_duplicates() {
    let mut f = fixture();
    f.builder.edge_at(1, f.script, f.api, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    assert!(RedundantLogDetector::new(&graph).duplicates(EdgeSeq(1)).unwrap().is_empty());
}

#[test]
fn test_missing_event_field_stops_scan() {
    let mut f = fixture();
    f.builder.edge_at(
        4,
        f.stringify,
        f.script,
        EdgeKind::JsResult {
            value: Some(format!(r#"{{"type":"log","property":"{}"}}"#, METHOD)),
        },
    );
    f.builder.edge_at(6, f.stringify, f.script, logged(METHOD, "call"));
    f.builder.edge_at(7, f.script, f.api, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    assert!(RedundantLogDetector::new(&graph).duplicates(EdgeSeq(7)).unwrap().is_empty());
}

#[test]
fn test_object_prefixed_property_matches() {
    let mut f = fixture();
    let escape = f.builder.web_api("CSS.escape");
    f.builder.edge_at(2, f.stringify, f.script, logged("[object CSS]", "escape"));
    f.builder.edge_at(4, f.stringify, f.script, logged("[object CSS]", "escape"));
    f.builder.edge_at(5, f.script, escape, EdgeKind::JsCall { args: None });
    let graph = f.builder.build().unwrap();

    assert_eq!(
        RedundantLogDetector::new(&graph).duplicates(EdgeSeq(5)).unwrap().len(),
        1
    );
}

#[test]
fn test_non_call_edge_is_rejected() {
    let graph = three_echoes();
    let detector = RedundantLogDetector::new(&graph);
    assert!(matches!(
        detector.duplicates(EdgeSeq(6)),
        Err(AnalysisError::NotACall { .. })
    ));
    assert!(matches!(
        detector.duplicates(EdgeSeq(99)),
        Err(AnalysisError::NotACall { .. })
    ));
}

// ============================================================================
// Graph Count Tests
// ============================================================================

#[test]
fn test_graph_count_includes_duplicates() {
    let graph = three_echoes();
    let counts = graph_api_counts(&graph, &ApiFilter::default()).unwrap();
    assert_eq!(counts.get(METHOD), Some(&3));
}

#[test]
fn test_graph_count_skips_untracked_interfaces() {
    let mut b = GraphBuilder::new();
    let script = b.script(ScriptType::External, "fetch('/x')");
    let fetch = b.web_api("Window.fetch");
    let timer = b.web_api("Window.setTimeout");
    let storage = b.web_api("Storage.getItem");
    b.edge(script, fetch, EdgeKind::JsCall { args: None });
    b.edge(script, timer, EdgeKind::JsCall { args: None });
    b.edge(script, storage, EdgeKind::JsCall { args: None });
    let graph = b.build().unwrap();

    let counts = graph_api_counts(&graph, &ApiFilter::default()).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get("Window.setTimeout"), Some(&1));
}
