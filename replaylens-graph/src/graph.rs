use crate::error::{GraphError, Result};
use crate::model::{BlinkId, Edge, EdgeKind, EdgeSeq, Node, NodeId, NodeKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// One edge together with both of its endpoints.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'g> {
    pub edge: &'g Edge,
    pub source: &'g Node,
    pub target: &'g Node,
}

impl<'g> EdgeView<'g> {
    pub fn seq(&self) -> EdgeSeq {
        self.edge.seq
    }

    pub fn kind(&self) -> &'g EdgeKind {
        &self.edge.kind
    }
}

/// In-memory provenance graph for one page load. Immutable once built.
pub struct ProvenanceGraph {
    graph: DiGraph<Node, Edge>,
    nodes_by_id: HashMap<NodeId, NodeIndex>,
    edges_by_seq: BTreeMap<EdgeSeq, EdgeIndex>,
    nodes_by_blink_id: HashMap<BlinkId, NodeId>,
    has_document_edges: bool,
}

impl ProvenanceGraph {
    pub fn new(mut nodes: Vec<Node>, mut edges: Vec<Edge>) -> Result<Self> {
        nodes.sort_by_key(|n| n.id);
        edges.sort_by_key(|e| e.seq);

        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut nodes_by_id = HashMap::with_capacity(nodes.len());
        let mut nodes_by_blink_id = HashMap::new();

        for node in nodes {
            let id = node.id;
            if let Some(blink_id) = node.kind.blink_id() {
                nodes_by_blink_id.insert(blink_id, id);
            }
            let idx = graph.add_node(node);
            if nodes_by_id.insert(id, idx).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        let mut edges_by_seq = BTreeMap::new();
        let mut has_document_edges = false;
        for edge in edges {
            let seq = edge.seq;
            let source = *nodes_by_id.get(&edge.source).ok_or(GraphError::DanglingEdge {
                seq,
                node: edge.source,
            })?;
            let target = *nodes_by_id.get(&edge.target).ok_or(GraphError::DanglingEdge {
                seq,
                node: edge.target,
            })?;
            has_document_edges |= matches!(edge.kind, EdgeKind::Document);
            let idx = graph.add_edge(source, target, edge);
            if edges_by_seq.insert(seq, idx).is_some() {
                return Err(GraphError::DuplicateEdge(seq));
            }
        }

        debug!(
            "Built provenance graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            nodes_by_id,
            edges_by_seq,
            nodes_by_blink_id,
            has_document_edges,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes_by_id.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn require_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(GraphError::UnknownNode(id))
    }

    /// All nodes, ascending by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// All edges, ascending by sequence number.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> {
        self.edges_by_seq.values().filter_map(|idx| self.view(*idx))
    }

    pub fn edge(&self, seq: EdgeSeq) -> Option<EdgeView<'_>> {
        self.edges_by_seq.get(&seq).and_then(|idx| self.view(*idx))
    }

    /// Highest sequence number in the graph, if it has any edges.
    pub fn last_seq(&self) -> Option<EdgeSeq> {
        self.edges_by_seq.keys().next_back().copied()
    }

    /// Incoming edges of `id`, ascending by sequence number.
    pub fn incoming(&self, id: NodeId) -> Vec<EdgeView<'_>> {
        self.adjacent(id, Direction::Incoming)
    }

    /// Outgoing edges of `id`, ascending by sequence number.
    pub fn outgoing(&self, id: NodeId) -> Vec<EdgeView<'_>> {
        self.adjacent(id, Direction::Outgoing)
    }

    pub fn node_for_blink_id(&self, blink_id: BlinkId) -> Option<&Node> {
        self.nodes_by_blink_id
            .get(&blink_id)
            .and_then(|id| self.node(*id))
    }

    /// The DOM root this node hangs below at serialization time, following
    /// document edges when the graph records them and structure edges
    /// otherwise.
    pub fn serialization_root(&self, id: NodeId) -> Option<NodeId> {
        self.walk_to_root(id, |g, n| g.parent_at_serialization(n))
    }

    /// The DOM root reached by following each node's first insertion parent.
    /// Catches elements that were attached and later detached.
    pub fn first_insertion_root(&self, id: NodeId) -> Option<NodeId> {
        self.walk_to_root(id, |g, n| g.first_insertion_parent(n))
    }

    fn parent_at_serialization(&self, id: NodeId) -> Option<NodeId> {
        self.incoming(id)
            .into_iter()
            .find(|e| {
                if self.has_document_edges {
                    matches!(e.kind(), EdgeKind::Document)
                } else {
                    matches!(e.kind(), EdgeKind::Structure)
                }
            })
            .map(|e| e.source.id)
    }

    /// Only the earliest insertion counts; a parent blink id that resolves to
    /// no node ends the walk there.
    fn first_insertion_parent(&self, id: NodeId) -> Option<NodeId> {
        self.incoming(id)
            .into_iter()
            .find(|e| matches!(e.kind(), EdgeKind::InsertNode { .. }))
            .and_then(|e| match e.kind() {
                EdgeKind::InsertNode {
                    parent_blink_id: Some(parent),
                } => self.node_for_blink_id(*parent).map(|n| n.id),
                _ => None,
            })
    }

    fn walk_to_root<F>(&self, start: NodeId, parent_of: F) -> Option<NodeId>
    where
        F: Fn(&Self, NodeId) -> Option<NodeId>,
    {
        let mut seen = HashSet::new();
        let mut current = parent_of(self, start);
        while let Some(id) = current {
            if !seen.insert(id) {
                debug!("Parent chain of {} loops at {}", start, id);
                return None;
            }
            let node = self.node(id)?;
            if matches!(node.kind, NodeKind::DomRoot { .. }) {
                return Some(id);
            }
            current = parent_of(self, id);
        }
        None
    }

    fn adjacent(&self, id: NodeId, direction: Direction) -> Vec<EdgeView<'_>> {
        let Some(idx) = self.nodes_by_id.get(&id) else {
            return Vec::new();
        };
        let mut views: Vec<EdgeView<'_>> = self
            .graph
            .edges_directed(*idx, direction)
            .filter_map(|e| self.view(e.id()))
            .collect();
        views.sort_by_key(|v| v.seq());
        views
    }

    fn view(&self, idx: EdgeIndex) -> Option<EdgeView<'_>> {
        let (source, target) = self.graph.edge_endpoints(idx)?;
        Some(EdgeView {
            edge: self.graph.edge_weight(idx)?,
            source: self.graph.node_weight(source)?,
            target: self.graph.node_weight(target)?,
        })
    }
}
