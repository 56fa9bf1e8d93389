use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable node identifier within one graph (`n<id>` in GraphML).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Edge sequence number. Totally orders every edge of a graph in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeSeq(pub u64);

impl fmt::Display for EdgeSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Browser-assigned id of a DOM node, referenced by insertion edges.
pub type BlinkId = i64;

/// Correlates a listener installation with its attachment edges.
pub type ListenerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    External,
    Inline,
    InlineDocumentWrite,
    InlineGeneratedElement,
    Module,
    Eval,
    EvalScheduled,
    JavascriptUrl,
    Inspector,
    Internal,
    Unknown,
}

impl ScriptType {
    /// Unrecognized spellings map to `Unknown`, as the browser does for
    /// scripts it could not attribute.
    pub fn parse(s: &str) -> Self {
        match s {
            "external file" => ScriptType::External,
            "inline" => ScriptType::Inline,
            "inline inside document write" => ScriptType::InlineDocumentWrite,
            "inline inside generated element" => ScriptType::InlineGeneratedElement,
            "module" => ScriptType::Module,
            "eval" => ScriptType::Eval,
            "eval for scheduled action" => ScriptType::EvalScheduled,
            "javascript url" => ScriptType::JavascriptUrl,
            "inspector" => ScriptType::Inspector,
            "internal" => ScriptType::Internal,
            _ => ScriptType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::External => "external file",
            ScriptType::Inline => "inline",
            ScriptType::InlineDocumentWrite => "inline inside document write",
            ScriptType::InlineGeneratedElement => "inline inside generated element",
            ScriptType::Module => "module",
            ScriptType::Eval => "eval",
            ScriptType::EvalScheduled => "eval for scheduled action",
            ScriptType::JavascriptUrl => "javascript url",
            ScriptType::Inspector => "inspector",
            ScriptType::Internal => "internal",
            ScriptType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Parser,
    Script {
        script_type: ScriptType,
        source: String,
    },
    HtmlElement {
        tag_name: String,
        blink_id: Option<BlinkId>,
    },
    TextNode {
        blink_id: Option<BlinkId>,
    },
    FrameOwner {
        tag_name: String,
        blink_id: Option<BlinkId>,
    },
    DomRoot {
        url: Option<String>,
        blink_id: Option<BlinkId>,
    },
    Resource {
        url: String,
    },
    WebApi {
        method: String,
    },
    JsBuiltin {
        method: String,
    },
    /// Storage areas, shields, extensions and anything newer than this model.
    Other {
        type_name: String,
    },
}

impl NodeKind {
    /// The `node type` spelling used by the serialized graph.
    pub fn type_name(&self) -> &str {
        match self {
            NodeKind::Parser => "parser",
            NodeKind::Script { .. } => "script",
            NodeKind::HtmlElement { .. } => "HTML element",
            NodeKind::TextNode { .. } => "text node",
            NodeKind::FrameOwner { .. } => "frame owner",
            NodeKind::DomRoot { .. } => "DOM root",
            NodeKind::Resource { .. } => "resource",
            NodeKind::WebApi { .. } => "web API",
            NodeKind::JsBuiltin { .. } => "JS builtin",
            NodeKind::Other { type_name } => type_name,
        }
    }

    pub fn blink_id(&self) -> Option<BlinkId> {
        match self {
            NodeKind::HtmlElement { blink_id, .. }
            | NodeKind::TextNode { blink_id }
            | NodeKind::FrameOwner { blink_id, .. }
            | NodeKind::DomRoot { blink_id, .. } => *blink_id,
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            NodeKind::WebApi { method } | NodeKind::JsBuiltin { method } => Some(method),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            NodeKind::Resource { url } => Some(url),
            NodeKind::DomRoot { url, .. } => url.as_deref(),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        match self {
            NodeKind::HtmlElement { tag_name, .. } | NodeKind::FrameOwner { tag_name, .. } => {
                Some(tag_name)
            }
            _ => None,
        }
    }

    pub fn script_type(&self) -> Option<ScriptType> {
        match self {
            NodeKind::Script { script_type, .. } => Some(*script_type),
            _ => None,
        }
    }

    pub fn is_parser(&self) -> bool {
        matches!(self, NodeKind::Parser)
    }

    pub fn is_dom_root(&self) -> bool {
        matches!(self, NodeKind::DomRoot { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self { id, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    RequestStart {
        request_id: Option<i64>,
        resource_type: Option<String>,
    },
    RequestRedirect {
        request_id: Option<i64>,
    },
    RequestComplete {
        request_id: Option<i64>,
        resource_type: String,
        response_hash: Option<String>,
    },
    RequestError {
        request_id: Option<i64>,
    },
    Execute,
    ExecuteFromAttribute {
        listener_id: Option<ListenerId>,
    },
    /// Serialized as either "create node" or the older "create".
    CreateNode,
    Structure,
    InsertNode {
        parent_blink_id: Option<BlinkId>,
    },
    RemoveNode,
    Document,
    CrossDom,
    SetAttribute {
        key: String,
        value: Option<String>,
        listener_id: Option<ListenerId>,
    },
    DeleteAttribute {
        key: String,
    },
    EventListener {
        listener_id: ListenerId,
        event: String,
    },
    EventListenerAdd {
        listener_id: ListenerId,
    },
    EventListenerRemove {
        listener_id: ListenerId,
    },
    JsCall {
        args: Option<String>,
    },
    JsResult {
        value: Option<String>,
    },
    Other {
        type_name: String,
        value: Option<String>,
    },
}

impl EdgeKind {
    /// The `edge type` spelling used by the serialized graph.
    pub fn type_name(&self) -> &str {
        match self {
            EdgeKind::RequestStart { .. } => "request start",
            EdgeKind::RequestRedirect { .. } => "request redirect",
            EdgeKind::RequestComplete { .. } => "request complete",
            EdgeKind::RequestError { .. } => "request error",
            EdgeKind::Execute => "execute",
            EdgeKind::ExecuteFromAttribute { .. } => "execute from attribute",
            EdgeKind::CreateNode => "create node",
            EdgeKind::Structure => "structure",
            EdgeKind::InsertNode { .. } => "insert node",
            EdgeKind::RemoveNode => "remove node",
            EdgeKind::Document => "document",
            EdgeKind::CrossDom => "cross DOM",
            EdgeKind::SetAttribute { .. } => "set attribute",
            EdgeKind::DeleteAttribute { .. } => "delete attribute",
            EdgeKind::EventListener { .. } => "event listener",
            EdgeKind::EventListenerAdd { .. } => "add event listener",
            EdgeKind::EventListenerRemove { .. } => "remove event listener",
            EdgeKind::JsCall { .. } => "js call",
            EdgeKind::JsResult { .. } => "js result",
            EdgeKind::Other { type_name, .. } => type_name,
        }
    }

    pub fn listener_id(&self) -> Option<ListenerId> {
        match self {
            EdgeKind::EventListener { listener_id, .. }
            | EdgeKind::EventListenerAdd { listener_id }
            | EdgeKind::EventListenerRemove { listener_id } => Some(*listener_id),
            EdgeKind::ExecuteFromAttribute { listener_id }
            | EdgeKind::SetAttribute { listener_id, .. } => *listener_id,
            _ => None,
        }
    }

    /// The `value` payload, for the edge kinds that carry one.
    pub fn carried_value(&self) -> Option<&str> {
        match self {
            EdgeKind::SetAttribute { value, .. }
            | EdgeKind::JsResult { value }
            | EdgeKind::Other { value, .. } => value.as_deref(),
            _ => None,
        }
    }

    pub fn is_request_initiation(&self) -> bool {
        matches!(
            self,
            EdgeKind::RequestStart { .. } | EdgeKind::RequestRedirect { .. }
        )
    }

    /// Edges that carry a request past its start: redirect, complete or error.
    pub fn is_request_continuation(&self) -> bool {
        matches!(
            self,
            EdgeKind::RequestRedirect { .. }
                | EdgeKind::RequestComplete { .. }
                | EdgeKind::RequestError { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub seq: EdgeSeq,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(seq: EdgeSeq, source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self {
            seq,
            source,
            target,
            kind,
        }
    }
}
