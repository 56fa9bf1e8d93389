use crate::error::{AnalysisError, Result};
use crate::lookup::require_predecessor;
use crate::resolver::ScriptResourceResolver;
use replaylens_graph::{EdgeKind, NodeId, NodeKind};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Origins that explain why a node exists, nearest first. The last entry is
/// the page origin or a resource URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CausalChain(Vec<String>);

impl CausalChain {
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn nearest(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn terminal(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CausalChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" <- "))
    }
}

/// Walks a node back to whatever produced it: scripts to their executor,
/// elements to their creator, until a resource or the parser is reached.
pub struct CausalTracer<'r, 'g> {
    resolver: &'r ScriptResourceResolver<'g>,
    page_origin: String,
}

impl<'r, 'g> CausalTracer<'r, 'g> {
    pub fn new(resolver: &'r ScriptResourceResolver<'g>, page_origin: impl Into<String>) -> Self {
        Self {
            resolver,
            page_origin: page_origin.into(),
        }
    }

    pub fn trace(&self, start: NodeId) -> Result<CausalChain> {
        let graph = self.resolver.graph();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;

        loop {
            if !visited.insert(current) || visited.len() > graph.node_count() {
                return Err(AnalysisError::CycleDetected { node: current });
            }
            let node = graph.require_node(current)?;
            match &node.kind {
                NodeKind::Script { .. } => {
                    if let Some(url) = self.resolver.resolve(current)? {
                        chain.push(url);
                    }
                    current = require_predecessor(graph, current, "execute", |k| {
                        matches!(k, EdgeKind::Execute)
                    })?
                    .source
                    .id;
                }
                NodeKind::HtmlElement { .. } => {
                    current = require_predecessor(graph, current, "create node", |k| {
                        matches!(k, EdgeKind::CreateNode)
                    })?
                    .source
                    .id;
                }
                NodeKind::Resource { url } => {
                    chain.push(url.clone());
                    break;
                }
                NodeKind::Parser => {
                    chain.push(self.page_origin.clone());
                    break;
                }
                other => {
                    return Err(AnalysisError::UnexpectedNodeType {
                        node: current,
                        type_name: other.type_name().to_string(),
                    });
                }
            }
        }

        Ok(CausalChain(chain))
    }
}
