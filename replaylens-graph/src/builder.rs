use crate::error::Result;
use crate::graph::ProvenanceGraph;
use crate::model::{BlinkId, Edge, EdgeKind, EdgeSeq, Node, NodeId, NodeKind, ScriptType};

/// Assembles a graph in memory, assigning ids and sequence numbers in
/// call order. Used by fixtures and by tools that synthesize graphs.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    next_node: u64,
    next_seq: u64,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            next_node: 1,
            next_seq: 1,
        }
    }

    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.push(Node::new(id, kind));
        id
    }

    pub fn edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) -> EdgeSeq {
        let seq = self.next_seq;
        self.edge_at(seq, source, target, kind)
    }

    /// Adds an edge with an explicit sequence number, leaving gaps possible.
    pub fn edge_at(&mut self, seq: u64, source: NodeId, target: NodeId, kind: EdgeKind) -> EdgeSeq {
        let seq = EdgeSeq(seq);
        self.next_seq = self.next_seq.max(seq.0 + 1);
        self.edges.push(Edge::new(seq, source, target, kind));
        seq
    }

    pub fn parser(&mut self) -> NodeId {
        self.node(NodeKind::Parser)
    }

    pub fn script(&mut self, script_type: ScriptType, source: &str) -> NodeId {
        self.node(NodeKind::Script {
            script_type,
            source: source.to_string(),
        })
    }

    pub fn element(&mut self, tag_name: &str, blink_id: BlinkId) -> NodeId {
        self.node(NodeKind::HtmlElement {
            tag_name: tag_name.to_string(),
            blink_id: Some(blink_id),
        })
    }

    pub fn dom_root(&mut self, url: &str, blink_id: BlinkId) -> NodeId {
        self.node(NodeKind::DomRoot {
            url: Some(url.to_string()),
            blink_id: Some(blink_id),
        })
    }

    pub fn resource(&mut self, url: &str) -> NodeId {
        self.node(NodeKind::Resource {
            url: url.to_string(),
        })
    }

    pub fn web_api(&mut self, method: &str) -> NodeId {
        self.node(NodeKind::WebApi {
            method: method.to_string(),
        })
    }

    pub fn build(self) -> Result<ProvenanceGraph> {
        ProvenanceGraph::new(self.nodes, self.edges)
    }
}
