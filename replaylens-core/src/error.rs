use replaylens_graph::{EdgeSeq, GraphError, ListenerId, NodeId, ScriptType};
use std::path::PathBuf;
use thiserror::Error;

/// Broad category of an analysis failure. Decides whether a failure costs one
/// node, one record or a whole capture directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The graph violates an invariant it is assumed to hold.
    Structural,
    /// An item that had to be classifiable did not match any known shape.
    UnexpectedShape,
    /// A required file is absent or could not be parsed.
    MissingArtifact,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Structural => "structural",
            ErrorClass::UnexpectedShape => "unexpected-shape",
            ErrorClass::MissingArtifact => "missing-artifact",
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("{node} has no incoming '{edge_type}' edge")]
    MissingPredecessor { node: NodeId, edge_type: &'static str },

    #[error("{node} has {count} incoming '{edge_type}' edges, expected at most one")]
    AmbiguousPredecessor {
        node: NodeId,
        edge_type: &'static str,
        count: usize,
    },

    #[error("Listener {listener_id} on {element} has contradictory creators {first} and {second}")]
    ContradictoryCreator {
        listener_id: ListenerId,
        element: NodeId,
        first: NodeId,
        second: NodeId,
    },

    #[error("Script {script} source digest {digest} matches several resources: {}", urls.join(", "))]
    AmbiguousHash {
        script: NodeId,
        digest: String,
        urls: Vec<String>,
    },

    #[error("Walk revisited {node}")]
    CycleDetected { node: NodeId },

    #[error("External script {script} did not resolve to a resource")]
    UnresolvedExternalScript { script: NodeId },

    #[error("Script {script} of type '{script_type}' resolved to {url} through {tier}")]
    InconsistentResolution {
        script: NodeId,
        script_type: ScriptType,
        url: String,
        tier: &'static str,
    },

    #[error("{node} is a '{type_name}' node, which this walk cannot cross")]
    UnexpectedNodeType { node: NodeId, type_name: String },

    #[error("Edge {seq} is not a 'js call' edge")]
    NotACall { seq: EdgeSeq },

    #[error("Invalid capture directory {}: {reason}", dir.display())]
    InvalidCapture { dir: PathBuf, reason: String },

    #[error("Failed to parse {}: {reason}", path.display())]
    ArchiveParse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl AnalysisError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AnalysisError::Graph(inner) => match inner {
                GraphError::IoError(_)
                | GraphError::XmlError(_)
                | GraphError::MissingAttribute { .. }
                | GraphError::InvalidAttribute { .. } => ErrorClass::MissingArtifact,
                _ => ErrorClass::Structural,
            },
            AnalysisError::MissingPredecessor { .. }
            | AnalysisError::AmbiguousPredecessor { .. }
            | AnalysisError::ContradictoryCreator { .. }
            | AnalysisError::AmbiguousHash { .. }
            | AnalysisError::CycleDetected { .. }
            | AnalysisError::UnresolvedExternalScript { .. }
            | AnalysisError::InconsistentResolution { .. }
            | AnalysisError::JoinError(_) => ErrorClass::Structural,
            AnalysisError::UnexpectedNodeType { .. }
            | AnalysisError::NotACall { .. }
            | AnalysisError::JsonError(_) => ErrorClass::UnexpectedShape,
            AnalysisError::InvalidCapture { .. }
            | AnalysisError::ArchiveParse { .. }
            | AnalysisError::IoError(_) => ErrorClass::MissingArtifact,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
