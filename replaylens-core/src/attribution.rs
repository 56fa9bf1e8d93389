use crate::capture::CaptureDir;
use crate::error::Result;
use crate::resolver::{ContentHashIndex, ScriptResourceResolver};
use crate::trace::{CausalChain, CausalTracer};
use replaylens_graph::{NodeKind, ProvenanceGraph, load_graphml};
use serde::Serialize;
use tracing::{debug, warn};

/// Who asked for a matching URL, and the causal chain behind the asker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionRow {
    pub origin: String,
    pub url: String,
    pub edge_type: String,
    /// Node type of the requester, `HTML element--<TAG>` for elements.
    pub requester: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<CausalChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Attributes every request start or redirect whose URL contains `needle`.
/// A chain that cannot be built is reported on its row.
pub fn attribute_requests(
    graph: &ProvenanceGraph,
    origin: &str,
    page_origin: &str,
    needle: &str,
) -> Vec<AttributionRow> {
    let resolver = ScriptResourceResolver::new(graph, ContentHashIndex::build(graph));
    let tracer = CausalTracer::new(&resolver, page_origin);

    let mut rows = Vec::new();
    for edge in graph.edges() {
        if !edge.kind().is_request_initiation() {
            continue;
        }
        let Some(url) = edge.target.kind.url() else {
            continue;
        };
        if !url.contains(needle) {
            continue;
        }

        let requester = match &edge.source.kind {
            NodeKind::HtmlElement { tag_name, .. } => format!("HTML element--{}", tag_name),
            other => other.type_name().to_string(),
        };
        debug!("{} requested {} via {}", requester, url, edge.kind().type_name());

        let (chain, error) = match tracer.trace(edge.source.id) {
            Ok(chain) => (Some(chain), None),
            Err(e) => {
                warn!("Could not trace requester of {}: {}", url, e);
                (None, Some(e.to_string()))
            }
        };
        rows.push(AttributionRow {
            origin: origin.to_string(),
            url: url.to_string(),
            edge_type: edge.kind().type_name().to_string(),
            requester,
            chain,
            error,
        });
    }
    rows
}

pub fn attribute_capture(dir: &CaptureDir, needle: &str) -> Result<Vec<AttributionRow>> {
    let identity = dir.identity()?;
    let graph = load_graphml(&dir.graph_path)?;
    Ok(attribute_requests(&graph, &dir.name(), &identity.page_origin, needle))
}
