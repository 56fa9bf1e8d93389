// Tests for event listener classification

use replaylens_core::compare::count_studied_handlers;
use replaylens_core::{AnalysisError, ListenerClassifier};
use replaylens_graph::{EdgeKind, GraphBuilder, NodeId, ProvenanceGraph, ScriptType};

fn listener_edge(id: i64, event: &str) -> EdgeKind {
    EdgeKind::EventListener {
        listener_id: id,
        event: event.to_string(),
    }
}

fn onclick(listener_id: i64) -> EdgeKind {
    EdgeKind::SetAttribute {
        key: "onclick".to_string(),
        value: Some("go()".to_string()),
        listener_id: Some(listener_id),
    }
}

/// A parser-built div carrying an inline `onclick`, plus a click listener
/// attached from an external script.
fn two_listener_page() -> (ProvenanceGraph, NodeId, NodeId) {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    let root = b.dom_root("https://www.example.com/", 1);
    let div = b.element("DIV", 2);
    let handler = b.script(ScriptType::Unknown, "go()");
    let external = b.script(ScriptType::External, "document.querySelector('div').addEventListener('click', f)");

    b.edge(parser, div, EdgeKind::CreateNode);
    b.edge(root, div, EdgeKind::Structure);
    b.edge(parser, div, onclick(1));
    b.edge(div, handler, listener_edge(1, "click"));
    b.edge(div, handler, EdgeKind::ExecuteFromAttribute { listener_id: Some(1) });
    b.edge(parser, external, EdgeKind::Execute);
    b.edge(external, div, EdgeKind::EventListenerAdd { listener_id: 2 });
    b.edge(div, external, listener_edge(2, "click"));

    (b.build().unwrap(), parser, external)
}

/// An IMG created by script, never inserted, that starts a request.
fn detached_image(event: &str) -> ProvenanceGraph {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    let script = b.script(ScriptType::Inline, "var i = new Image(); i.src = 'x.png'");
    let img = b.element("IMG", 5);
    let resource = b.resource("https://www.example.com/x.png");

    b.edge(parser, script, EdgeKind::Execute);
    b.edge(script, img, EdgeKind::CreateNode);
    b.edge(
        img,
        resource,
        EdgeKind::RequestStart {
            request_id: Some(1),
            resource_type: Some("Image".to_string()),
        },
    );
    b.edge(script, img, EdgeKind::EventListenerAdd { listener_id: 3 });
    b.edge(img, script, listener_edge(3, event));
    b.build().unwrap()
}

// ============================================================================
// Discovery Tests
// ============================================================================

#[test]
fn test_two_listener_scenario() {
    let (graph, parser, external) = two_listener_page();
    let classified = ListenerClassifier::new(&graph).classify().unwrap();

    assert_eq!(classified.len(), 2);

    let inline: Vec<bool> = classified.iter().map(|l| l.is_inline_handler).collect();
    assert_eq!(inline, vec![true, false]);

    let creators: Vec<Option<&str>> = classified.iter().map(|l| l.creator_type.as_deref()).collect();
    assert_eq!(creators, vec![Some("parser"), Some("script")]);

    assert_eq!(classified[0].listener.creator, Some(parser));
    assert_eq!(classified[1].listener.creator, Some(external));
    assert!(classified.iter().all(|l| l.was_ever_in_dom));
    assert!(classified.iter().all(|l| l.element_tag.as_deref() == Some("DIV")));
}

#[test]
fn test_listeners_ordered_by_edge_seq() {
    let (graph, _, _) = two_listener_page();
    let listeners = ListenerClassifier::new(&graph).listeners().unwrap();
    assert!(listeners.windows(2).all(|w| w[0].edge < w[1].edge));
    assert_eq!(listeners[0].listener_id, 1);
    assert_eq!(listeners[1].listener_id, 2);
}

#[test]
fn test_programmatic_when_creator_is_listener() {
    let (graph, _, _) = two_listener_page();
    let classified = ListenerClassifier::new(&graph).classify().unwrap();
    assert!(!classified[0].is_programmatically_added);
    assert!(classified[1].is_programmatically_added);
}

#[test]
fn test_contradictory_creator_is_reported() {
    let mut b = GraphBuilder::new();
    let root = b.dom_root("https://www.example.com/", 1);
    let div = b.element("DIV", 2);
    let first = b.script(ScriptType::External, "a()");
    let second = b.script(ScriptType::External, "b()");
    b.edge(root, div, EdgeKind::Structure);
    b.edge(first, div, EdgeKind::EventListenerAdd { listener_id: 9 });
    b.edge(second, div, EdgeKind::EventListenerAdd { listener_id: 9 });
    b.edge(div, first, listener_edge(9, "click"));
    let graph = b.build().unwrap();

    let err = ListenerClassifier::new(&graph).listeners().unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::ContradictoryCreator { listener_id: 9, .. }
    ));
}

#[test]
fn test_listener_without_installer_has_no_creator() {
    let mut b = GraphBuilder::new();
    let div = b.element("DIV", 2);
    let script = b.script(ScriptType::Unknown, "x()");
    b.edge(div, script, listener_edge(4, "click"));
    let graph = b.build().unwrap();

    let listeners = ListenerClassifier::new(&graph).listeners().unwrap();
    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].creator, None);
}

// ============================================================================
// Detached Element Policy Tests
// ============================================================================

#[test]
fn test_detached_image_load_listener_retained() {
    let graph = detached_image("load");
    let classified = ListenerClassifier::new(&graph).classify().unwrap();
    assert_eq!(classified.len(), 1);
    assert!(!classified[0].was_ever_in_dom);
    assert_eq!(classified[0].listener.event, "load");
}

#[test]
fn test_detached_image_click_listener_discarded() {
    let graph = detached_image("click");
    assert!(ListenerClassifier::new(&graph).classify().unwrap().is_empty());
    // Still discovered, only dropped by the policy.
    assert_eq!(ListenerClassifier::new(&graph).listeners().unwrap().len(), 1);
}

#[test]
fn test_detached_div_load_listener_discarded() {
    let mut b = GraphBuilder::new();
    let script = b.script(ScriptType::Inline, "d()");
    let div = b.element("DIV", 8);
    let resource = b.resource("https://www.example.com/bg.png");
    b.edge(div, resource, EdgeKind::RequestStart { request_id: None, resource_type: None });
    b.edge(script, div, EdgeKind::EventListenerAdd { listener_id: 1 });
    b.edge(div, script, listener_edge(1, "load"));
    let graph = b.build().unwrap();

    assert!(ListenerClassifier::new(&graph).classify().unwrap().is_empty());
}

#[test]
fn test_inline_flag_independent_of_dom_attachment() {
    let mut b = GraphBuilder::new();
    let script = b.script(ScriptType::Inline, "build()");
    let span = b.element("SPAN", 3);
    let handler = b.script(ScriptType::Unknown, "h()");
    b.edge(script, span, EdgeKind::CreateNode);
    b.edge(script, span, onclick(6));
    b.edge(span, handler, listener_edge(6, "click"));
    b.edge(span, handler, EdgeKind::ExecuteFromAttribute { listener_id: Some(6) });
    let graph = b.build().unwrap();

    let classifier = ListenerClassifier::new(&graph);
    let listeners = classifier.listeners().unwrap();
    assert!(!classifier.was_ever_in_dom(span));
    assert!(classifier.is_inline_handler(&listeners[0]));
}

#[test]
fn test_element_removed_after_insertion_was_in_dom() {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    b.dom_root("https://www.example.com/", 100);
    let div = b.element("DIV", 101);
    let script = b.script(ScriptType::External, "x()");
    b.edge(parser, div, EdgeKind::InsertNode { parent_blink_id: Some(100) });
    b.edge(parser, div, EdgeKind::RemoveNode);
    b.edge(script, div, EdgeKind::EventListenerAdd { listener_id: 1 });
    b.edge(div, script, listener_edge(1, "click"));
    let graph = b.build().unwrap();

    let classified = ListenerClassifier::new(&graph).classify().unwrap();
    assert_eq!(classified.len(), 1);
    assert!(classified[0].was_ever_in_dom);
}

// ============================================================================
// Studied Handler Count Tests
// ============================================================================

#[test]
fn test_parser_created_inline_handlers_not_studied() {
    let (graph, _, _) = two_listener_page();
    assert_eq!(count_studied_handlers(&graph).unwrap(), 0);
}

#[test]
fn test_script_created_inline_handler_studied() {
    let mut b = GraphBuilder::new();
    let root = b.dom_root("https://www.example.com/", 1);
    let div = b.element("DIV", 2);
    let script = b.script(ScriptType::External, "div.setAttribute('onclick', 'go()')");
    let handler = b.script(ScriptType::Unknown, "go()");
    b.edge(root, div, EdgeKind::Structure);
    b.edge(script, div, onclick(4));
    b.edge(div, handler, listener_edge(4, "click"));
    b.edge(div, handler, EdgeKind::ExecuteFromAttribute { listener_id: Some(4) });
    let graph = b.build().unwrap();

    assert_eq!(count_studied_handlers(&graph).unwrap(), 1);
}
