//! Zero-or-one predecessor lookups shared by the resolver and the tracer.

use crate::error::{AnalysisError, Result};
use replaylens_graph::{EdgeKind, EdgeView, NodeId, ProvenanceGraph};

/// The single incoming edge of `node` accepted by `accept`, if any. More than
/// one match means the graph broke its single-parent shape.
pub fn sole_predecessor<'g, F>(
    graph: &'g ProvenanceGraph,
    node: NodeId,
    edge_type: &'static str,
    accept: F,
) -> Result<Option<EdgeView<'g>>>
where
    F: Fn(&EdgeKind) -> bool,
{
    let mut matches = graph.incoming(node).into_iter().filter(|e| accept(e.kind()));
    let first = matches.next();
    let extra = matches.count();
    if extra > 0 {
        return Err(AnalysisError::AmbiguousPredecessor {
            node,
            edge_type,
            count: extra + 1,
        });
    }
    Ok(first)
}

/// Like [`sole_predecessor`], but a missing edge is a structural error.
pub fn require_predecessor<'g, F>(
    graph: &'g ProvenanceGraph,
    node: NodeId,
    edge_type: &'static str,
    accept: F,
) -> Result<EdgeView<'g>>
where
    F: Fn(&EdgeKind) -> bool,
{
    sole_predecessor(graph, node, edge_type, accept)?
        .ok_or(AnalysisError::MissingPredecessor { node, edge_type })
}
