use crate::model::{EdgeSeq, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("GraphML parse error: {0}")]
    XmlError(String),

    #[error("{element} is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("{element} has invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Edge {seq} references unknown node {node}")]
    DanglingEdge { seq: EdgeSeq, node: NodeId },

    #[error("Duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("Duplicate edge sequence number {0}")]
    DuplicateEdge(EdgeSeq),
}

impl From<quick_xml::Error> for GraphError {
    fn from(err: quick_xml::Error) -> Self {
        GraphError::XmlError(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for GraphError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        GraphError::XmlError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
