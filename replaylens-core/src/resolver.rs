//! Script-to-resource attribution.

use crate::error::{AnalysisError, Result};
use crate::lookup::require_predecessor;
use base64::Engine;
use replaylens_graph::{EdgeKind, NodeId, NodeKind, ProvenanceGraph, ScriptType};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Base64 SHA-256 of a script body, the same encoding the graph uses for
/// `response hash`.
pub fn content_digest(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Response digest to the URLs of every resource that returned that body.
/// Built once per graph before any script is resolved.
#[derive(Debug, Default, Clone)]
pub struct ContentHashIndex {
    urls_by_digest: HashMap<String, Vec<String>>,
}

impl ContentHashIndex {
    pub fn build(graph: &ProvenanceGraph) -> Self {
        let mut index = Self::default();
        for edge in graph.edges() {
            let EdgeKind::RequestComplete {
                response_hash: Some(hash),
                ..
            } = edge.kind()
            else {
                continue;
            };
            if let Some(url) = edge.source.kind.url() {
                index.insert(hash.clone(), url.to_string());
            }
        }
        debug!("Indexed {} response digests", index.urls_by_digest.len());
        index
    }

    pub fn insert(&mut self, digest: String, url: String) {
        self.urls_by_digest.entry(digest).or_default().push(url);
    }

    pub fn urls(&self, digest: &str) -> &[String] {
        self.urls_by_digest
            .get(digest)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.urls_by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls_by_digest.is_empty()
    }
}

/// Which fallback produced a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    ConnectedResource,
    SrcAttribute,
    ContentHash,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::ConnectedResource => "connected resource",
            ResolutionTier::SrcAttribute => "src attribute",
            ResolutionTier::ContentHash => "content hash",
        }
    }
}

pub struct ScriptResourceResolver<'g> {
    graph: &'g ProvenanceGraph,
    index: ContentHashIndex,
}

impl<'g> ScriptResourceResolver<'g> {
    pub fn new(graph: &'g ProvenanceGraph, index: ContentHashIndex) -> Self {
        Self { graph, index }
    }

    pub fn graph(&self) -> &'g ProvenanceGraph {
        self.graph
    }

    /// URL of the resource that delivered `script`, or `None` for scripts
    /// with no network origin of their own.
    pub fn resolve(&self, script: NodeId) -> Result<Option<String>> {
        let node = self.graph.require_node(script)?;
        let NodeKind::Script {
            script_type,
            source,
        } = &node.kind
        else {
            return Err(AnalysisError::UnexpectedNodeType {
                node: script,
                type_name: node.kind.type_name().to_string(),
            });
        };
        let script_type = *script_type;

        let executor = require_predecessor(self.graph, script, "execute", |k| {
            matches!(k, EdgeKind::Execute)
        })?
        .source
        .id;

        let found = match self.connected_resource(executor) {
            Some(url) => Some((url, ResolutionTier::ConnectedResource)),
            None => match self.src_attribute(script, script_type, executor)? {
                Some(url) => Some((url, ResolutionTier::SrcAttribute)),
                None => self
                    .content_hash(script, source)?
                    .map(|url| (url, ResolutionTier::ContentHash)),
            },
        };

        self.check(script, script_type, found)
    }

    /// Earliest-requested script resource delivered to the executor.
    fn connected_resource(&self, executor: NodeId) -> Option<String> {
        self.graph
            .incoming(executor)
            .into_iter()
            .filter(|e| match e.kind() {
                EdgeKind::RequestComplete { resource_type, .. } => {
                    resource_type.eq_ignore_ascii_case("script")
                }
                _ => false,
            })
            .filter_map(|e| e.source.kind.url().map(|url| (e.source.id, url)))
            .min_by_key(|(id, _)| *id)
            .map(|(_, url)| url.to_string())
    }

    fn src_attribute(
        &self,
        script: NodeId,
        script_type: ScriptType,
        executor: NodeId,
    ) -> Result<Option<String>> {
        // The last write is the value the element loaded from.
        let src = self
            .graph
            .incoming(executor)
            .into_iter()
            .filter_map(|e| match e.kind() {
                EdgeKind::SetAttribute {
                    key,
                    value: Some(value),
                    ..
                } if key.eq_ignore_ascii_case("src") => Some(value.clone()),
                _ => None,
            })
            .last();
        match src {
            Some(url) if !matches!(script_type, ScriptType::External | ScriptType::Module) => {
                Err(AnalysisError::InconsistentResolution {
                    script,
                    script_type,
                    url,
                    tier: ResolutionTier::SrcAttribute.as_str(),
                })
            }
            other => Ok(other),
        }
    }

    fn content_hash(&self, script: NodeId, source: &str) -> Result<Option<String>> {
        let digest = content_digest(source);
        let urls = self.index.urls(&digest);
        let Some(first) = urls.first() else {
            return Ok(None);
        };
        if urls.iter().any(|u| u != first) {
            let mut distinct = urls.to_vec();
            distinct.sort();
            distinct.dedup();
            return Err(AnalysisError::AmbiguousHash {
                script,
                digest,
                urls: distinct,
            });
        }
        Ok(Some(first.clone()))
    }

    fn check(
        &self,
        script: NodeId,
        script_type: ScriptType,
        found: Option<(String, ResolutionTier)>,
    ) -> Result<Option<String>> {
        match (script_type, found) {
            (ScriptType::External, None) => Err(AnalysisError::UnresolvedExternalScript { script }),
            (ScriptType::Eval, Some((url, tier))) => {
                debug!("Discarding {} match {} for eval script {}", tier.as_str(), url, script);
                Ok(None)
            }
            (
                ScriptType::Inline | ScriptType::InlineDocumentWrite,
                Some((url, ResolutionTier::ContentHash)),
            ) => {
                debug!("Discarding coincidental digest match {} for inline script {}", url, script);
                Ok(None)
            }
            (ScriptType::Inline | ScriptType::InlineDocumentWrite, Some((url, tier))) => {
                warn!("Inline script {} was delivered as {}", script, url);
                Err(AnalysisError::InconsistentResolution {
                    script,
                    script_type,
                    url,
                    tier: tier.as_str(),
                })
            }
            (_, found) => Ok(found.map(|(url, _)| url)),
        }
    }
}
