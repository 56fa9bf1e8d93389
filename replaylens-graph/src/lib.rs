pub mod builder;
pub mod error;
pub mod graph;
pub mod graphml;
pub mod model;

pub use builder::GraphBuilder;
pub use error::GraphError;
pub use graph::{EdgeView, ProvenanceGraph};
pub use graphml::{load_graphml, parse_graphml};
pub use model::{BlinkId, Edge, EdgeKind, EdgeSeq, ListenerId, Node, NodeId, NodeKind, ScriptType};
