//! Event listener discovery and classification.
//!
//! Every `event listener` edge yields one [`EventListener`]: the edge source is
//! the element, the destination is the listening script. The creator is found
//! on the element's own incoming installation edges.

use crate::error::{AnalysisError, Result};
use replaylens_graph::{
    EdgeKind, EdgeSeq, ListenerId, NodeId, NodeKind, ProvenanceGraph, ScriptType,
};
use serde::Serialize;
use tracing::debug;

/// Element tags that can start a request without ever joining the document.
pub const RESOURCE_LOADING_TAGS: [&str; 4] = ["VIDEO", "AUDIO", "IMG", "INPUT"];

/// Events such elements can fire purely from being constructed.
pub const RESOURCE_LIFECYCLE_EVENTS: [&str; 10] = [
    "load",
    "loadstart",
    "progress",
    "suspend",
    "durationchange",
    "loadedmetadata",
    "loadeddata",
    "error",
    "canplay",
    "canplaythrough",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListener {
    pub listener_id: ListenerId,
    pub event: String,
    /// Sequence number of the `event listener` edge.
    pub edge: EdgeSeq,
    pub listener: NodeId,
    pub element: NodeId,
    pub creator: Option<NodeId>,
}

/// A listener with its derived predicates evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedListener {
    pub listener: EventListener,
    pub element_tag: Option<String>,
    pub creator_type: Option<String>,
    pub is_inline_handler: bool,
    pub is_programmatically_added: bool,
    pub was_ever_in_dom: bool,
}

impl ClassifiedListener {
    pub fn creator_is_parser(&self) -> bool {
        self.creator_type.as_deref() == Some("parser")
    }

    /// Inline handlers installed by script rather than by the parser.
    pub fn is_studied_inline_handler(&self) -> bool {
        self.is_inline_handler && !self.creator_is_parser()
    }
}

pub struct ListenerClassifier<'g> {
    graph: &'g ProvenanceGraph,
}

impl<'g> ListenerClassifier<'g> {
    pub fn new(graph: &'g ProvenanceGraph) -> Self {
        Self { graph }
    }

    /// Every listener in the graph, ascending by edge sequence number.
    pub fn listeners(&self) -> Result<Vec<EventListener>> {
        let mut listeners = Vec::new();
        for edge in self.graph.edges() {
            let EdgeKind::EventListener { listener_id, event } = edge.kind() else {
                continue;
            };
            let element = edge.source.id;
            let creator = self.find_creator(element, *listener_id)?;
            listeners.push(EventListener {
                listener_id: *listener_id,
                event: event.clone(),
                edge: edge.seq(),
                listener: edge.target.id,
                element,
                creator,
            });
        }
        debug!("Found {} event listeners", listeners.len());
        Ok(listeners)
    }

    /// Listeners retained by the never-attached policy, with predicates.
    pub fn classify(&self) -> Result<Vec<ClassifiedListener>> {
        let mut classified = Vec::new();
        for listener in self.listeners()? {
            let was_ever_in_dom = self.was_ever_in_dom(listener.element);
            if !was_ever_in_dom && !self.is_resource_lifecycle_listener(&listener) {
                debug!(
                    "Discarding listener {} on detached {}",
                    listener.listener_id, listener.element
                );
                continue;
            }
            classified.push(ClassifiedListener {
                element_tag: self.tag_of(listener.element),
                creator_type: listener
                    .creator
                    .and_then(|c| self.graph.node(c))
                    .map(|n| n.kind.type_name().to_string()),
                is_inline_handler: self.is_inline_handler(&listener),
                is_programmatically_added: self.is_programmatically_added(&listener),
                was_ever_in_dom,
                listener,
            });
        }
        Ok(classified)
    }

    /// Source of the element's `add event listener` or `set attribute` edge
    /// carrying `listener_id`. Two different sources are contradictory.
    pub fn find_creator(&self, element: NodeId, listener_id: ListenerId) -> Result<Option<NodeId>> {
        let mut creator: Option<NodeId> = None;
        for edge in self.graph.incoming(element) {
            let installs = matches!(
                edge.kind(),
                EdgeKind::EventListenerAdd { .. } | EdgeKind::SetAttribute { .. }
            );
            if !installs || edge.kind().listener_id() != Some(listener_id) {
                continue;
            }
            match creator {
                Some(first) if first != edge.source.id => {
                    return Err(AnalysisError::ContradictoryCreator {
                        listener_id,
                        element,
                        first,
                        second: edge.source.id,
                    });
                }
                _ => creator = Some(edge.source.id),
            }
        }
        Ok(creator)
    }

    pub fn is_inline_handler(&self, listener: &EventListener) -> bool {
        self.graph
            .incoming(listener.listener)
            .iter()
            .any(|e| matches!(e.kind(), EdgeKind::ExecuteFromAttribute { .. }))
    }

    pub fn is_programmatically_added(&self, listener: &EventListener) -> bool {
        if listener.creator == Some(listener.listener) {
            return true;
        }
        self.graph
            .node(listener.listener)
            .map(|n| n.kind.script_type() != Some(ScriptType::Unknown))
            .unwrap_or(false)
    }

    pub fn was_ever_in_dom(&self, element: NodeId) -> bool {
        self.graph.serialization_root(element).is_some()
            || self.graph.first_insertion_root(element).is_some()
    }

    /// A resource-loading element that started a request, listening for one
    /// of its own lifecycle events.
    pub fn is_resource_lifecycle_listener(&self, listener: &EventListener) -> bool {
        let Some(node) = self.graph.node(listener.element) else {
            return false;
        };
        let NodeKind::HtmlElement { tag_name, .. } = &node.kind else {
            return false;
        };
        RESOURCE_LOADING_TAGS.contains(&tag_name.to_uppercase().as_str())
            && RESOURCE_LIFECYCLE_EVENTS.contains(&listener.event.as_str())
            && self
                .graph
                .outgoing(listener.element)
                .iter()
                .any(|e| matches!(e.kind(), EdgeKind::RequestStart { .. }))
    }

    fn tag_of(&self, id: NodeId) -> Option<String> {
        self.graph
            .node(id)
            .and_then(|n| n.kind.tag_name())
            .map(str::to_string)
    }
}
