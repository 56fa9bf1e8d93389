//! Streaming GraphML reader for serialized provenance graphs.
//!
//! Only the subset the browser serializer emits is understood: `<key>`
//! declarations, then `<node>` and `<edge>` elements whose `<data>`
//! children carry the typed attributes.

use crate::error::{GraphError, Result};
use crate::graph::ProvenanceGraph;
use crate::model::{Edge, EdgeKind, EdgeSeq, Node, NodeId, NodeKind, ScriptType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

type Attrs = HashMap<String, String>;

enum Pending {
    Node { xml_id: String, attrs: Attrs },
    Edge {
        xml_id: String,
        source: String,
        target: String,
        attrs: Attrs,
    },
}

impl Pending {
    fn attrs_mut(&mut self) -> &mut Attrs {
        match self {
            Pending::Node { attrs, .. } | Pending::Edge { attrs, .. } => attrs,
        }
    }
}

pub fn load_graphml(path: &Path) -> Result<ProvenanceGraph> {
    info!("Loading provenance graph from {}", path.display());
    let xml = fs::read_to_string(path)?;
    parse_graphml(&xml)
}

pub fn parse_graphml(xml: &str) -> Result<ProvenanceGraph> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut keys: HashMap<String, String> = HashMap::new();
    let mut raw_nodes: Vec<(String, Attrs)> = Vec::new();
    let mut raw_edges: Vec<(String, String, String, Attrs)> = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut data_key: Option<String> = None;
    let mut data_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"key" => register_key(&e, &mut keys)?,
                b"node" => {
                    pending = Some(Pending::Node {
                        xml_id: required_attr(&e, "node", "id")?,
                        attrs: Attrs::new(),
                    })
                }
                b"edge" => {
                    pending = Some(Pending::Edge {
                        xml_id: optional_attr(&e, "id")?.unwrap_or_default(),
                        source: required_attr(&e, "edge", "source")?,
                        target: required_attr(&e, "edge", "target")?,
                        attrs: Attrs::new(),
                    })
                }
                b"data" => {
                    data_key = Some(required_attr(&e, "data", "key")?);
                    data_text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"key" => register_key(&e, &mut keys)?,
                b"node" => raw_nodes.push((required_attr(&e, "node", "id")?, Attrs::new())),
                b"edge" => raw_edges.push((
                    optional_attr(&e, "id")?.unwrap_or_default(),
                    required_attr(&e, "edge", "source")?,
                    required_attr(&e, "edge", "target")?,
                    Attrs::new(),
                )),
                _ => {}
            },
            Event::Text(t) => {
                if data_key.is_some() {
                    data_text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if data_key.is_some() {
                    data_text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"data" => {
                    if let (Some(key), Some(p)) = (data_key.take(), pending.as_mut()) {
                        let name = keys.get(&key).cloned().unwrap_or(key);
                        p.attrs_mut().insert(name, std::mem::take(&mut data_text));
                    }
                }
                b"node" | b"edge" => match pending.take() {
                    Some(Pending::Node { xml_id, attrs }) => raw_nodes.push((xml_id, attrs)),
                    Some(Pending::Edge {
                        xml_id,
                        source,
                        target,
                        attrs,
                    }) => raw_edges.push((xml_id, source, target, attrs)),
                    None => {}
                },
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(
        "GraphML contained {} keys, {} nodes, {} edges",
        keys.len(),
        raw_nodes.len(),
        raw_edges.len()
    );

    let mut xml_ids: HashMap<String, NodeId> = HashMap::with_capacity(raw_nodes.len());
    let mut nodes = Vec::with_capacity(raw_nodes.len());
    for (xml_id, attrs) in raw_nodes {
        let element = format!("node {}", xml_id);
        let id = match attrs.get("id") {
            Some(raw) => NodeId(parse_int(&element, "id", raw)?),
            None => NodeId(parse_prefixed(&element, &xml_id, 'n')?),
        };
        let type_name = require(&element, &attrs, "node type")?;
        let kind = node_kind_from_attrs(&element, type_name, &attrs)?;
        xml_ids.insert(xml_id, id);
        nodes.push(Node::new(id, kind));
    }

    let mut edges = Vec::with_capacity(raw_edges.len());
    for (xml_id, source, target, attrs) in raw_edges {
        let element = format!("edge {}", xml_id);
        let seq = match attrs.get("id") {
            Some(raw) => EdgeSeq(parse_int(&element, "id", raw)?),
            None => EdgeSeq(parse_prefixed(&element, &xml_id, 'e')?),
        };
        let source = resolve_endpoint(&element, &xml_ids, &source)?;
        let target = resolve_endpoint(&element, &xml_ids, &target)?;
        let type_name = require(&element, &attrs, "edge type")?;
        let kind = edge_kind_from_attrs(&element, type_name, &attrs)?;
        edges.push(Edge::new(seq, source, target, kind));
    }

    ProvenanceGraph::new(nodes, edges)
}

/// Maps a serialized `node type` and its data attributes onto a typed kind.
pub fn node_kind_from_attrs(element: &str, type_name: &str, attrs: &Attrs) -> Result<NodeKind> {
    let blink_id = optional_int(element, attrs, "node id")?;
    let kind = match type_name {
        "parser" => NodeKind::Parser,
        "script" => NodeKind::Script {
            script_type: attrs
                .get("script type")
                .map(|s| ScriptType::parse(s))
                .unwrap_or(ScriptType::Unknown),
            source: attrs.get("source").cloned().unwrap_or_default(),
        },
        "HTML element" => NodeKind::HtmlElement {
            tag_name: require(element, attrs, "tag name")?.to_string(),
            blink_id,
        },
        "text node" => NodeKind::TextNode { blink_id },
        "frame owner" => NodeKind::FrameOwner {
            tag_name: require(element, attrs, "tag name")?.to_string(),
            blink_id,
        },
        "DOM root" => NodeKind::DomRoot {
            url: attrs.get("url").cloned(),
            blink_id,
        },
        "resource" => NodeKind::Resource {
            url: require(element, attrs, "url")?.to_string(),
        },
        "web API" => NodeKind::WebApi {
            method: require(element, attrs, "method")?.to_string(),
        },
        "JS builtin" => NodeKind::JsBuiltin {
            method: require(element, attrs, "method")?.to_string(),
        },
        other => NodeKind::Other {
            type_name: other.to_string(),
        },
    };
    Ok(kind)
}

/// Maps a serialized `edge type` and its data attributes onto a typed kind.
pub fn edge_kind_from_attrs(element: &str, type_name: &str, attrs: &Attrs) -> Result<EdgeKind> {
    let request_id = optional_int(element, attrs, "request id")?;
    let kind = match type_name {
        "request start" => EdgeKind::RequestStart {
            request_id,
            resource_type: attrs.get("resource type").cloned(),
        },
        "request redirect" => EdgeKind::RequestRedirect { request_id },
        "request complete" => EdgeKind::RequestComplete {
            request_id,
            resource_type: require(element, attrs, "resource type")?.to_string(),
            response_hash: attrs.get("response hash").cloned(),
        },
        "request error" => EdgeKind::RequestError { request_id },
        "execute" => EdgeKind::Execute,
        "execute from attribute" => EdgeKind::ExecuteFromAttribute {
            listener_id: optional_int(element, attrs, "event listener id")?,
        },
        "create node" | "create" => EdgeKind::CreateNode,
        "structure" => EdgeKind::Structure,
        "insert node" => EdgeKind::InsertNode {
            parent_blink_id: optional_int(element, attrs, "parent")?,
        },
        "remove node" => EdgeKind::RemoveNode,
        "document" => EdgeKind::Document,
        "cross DOM" => EdgeKind::CrossDom,
        "set attribute" => EdgeKind::SetAttribute {
            key: require(element, attrs, "key")?.to_string(),
            value: attrs.get("value").cloned(),
            listener_id: optional_int(element, attrs, "event listener id")?,
        },
        "delete attribute" => EdgeKind::DeleteAttribute {
            key: require(element, attrs, "key")?.to_string(),
        },
        "event listener" => EdgeKind::EventListener {
            listener_id: required_int(element, attrs, "event listener id")?,
            event: require(element, attrs, "key")?.to_string(),
        },
        "add event listener" => EdgeKind::EventListenerAdd {
            listener_id: required_int(element, attrs, "event listener id")?,
        },
        "remove event listener" => EdgeKind::EventListenerRemove {
            listener_id: required_int(element, attrs, "event listener id")?,
        },
        "js call" => EdgeKind::JsCall {
            args: attrs.get("args").cloned(),
        },
        "js result" => EdgeKind::JsResult {
            value: attrs.get("value").cloned(),
        },
        other => EdgeKind::Other {
            type_name: other.to_string(),
            value: attrs.get("value").cloned(),
        },
    };
    Ok(kind)
}

fn register_key(e: &BytesStart<'_>, keys: &mut HashMap<String, String>) -> Result<()> {
    let id = required_attr(e, "key", "id")?;
    let name = optional_attr(e, "attr.name")?.unwrap_or_else(|| id.clone());
    keys.insert(id, name);
    Ok(())
}

fn optional_attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(e: &BytesStart<'_>, element: &str, name: &str) -> Result<String> {
    optional_attr(e, name)?.ok_or_else(|| GraphError::MissingAttribute {
        element: element.to_string(),
        attribute: name.to_string(),
    })
}

fn require<'a>(element: &str, attrs: &'a Attrs, name: &str) -> Result<&'a str> {
    attrs
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| GraphError::MissingAttribute {
            element: element.to_string(),
            attribute: name.to_string(),
        })
}

fn optional_int(element: &str, attrs: &Attrs, name: &str) -> Result<Option<i64>> {
    attrs
        .get(name)
        .map(|raw| parse_int::<i64>(element, name, raw))
        .transpose()
}

fn required_int(element: &str, attrs: &Attrs, name: &str) -> Result<i64> {
    parse_int(element, name, require(element, attrs, name)?)
}

fn parse_int<T: std::str::FromStr>(element: &str, attribute: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| GraphError::InvalidAttribute {
        element: element.to_string(),
        attribute: attribute.to_string(),
        value: raw.to_string(),
    })
}

fn parse_prefixed(element: &str, xml_id: &str, prefix: char) -> Result<u64> {
    parse_int(element, "id", xml_id.strip_prefix(prefix).unwrap_or(xml_id))
}

fn resolve_endpoint(element: &str, xml_ids: &HashMap<String, NodeId>, xml_id: &str) -> Result<NodeId> {
    match xml_ids.get(xml_id) {
        Some(id) => Ok(*id),
        None => Err(GraphError::InvalidAttribute {
            element: element.to_string(),
            attribute: "source/target".to_string(),
            value: xml_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="id" attr.type="long"/>
  <key id="d1" for="node" attr.name="node type" attr.type="string"/>
  <key id="d2" for="node" attr.name="tag name" attr.type="string"/>
  <key id="d3" for="node" attr.name="script type" attr.type="string"/>
  <key id="d4" for="node" attr.name="source" attr.type="string"/>
  <key id="d5" for="node" attr.name="node id" attr.type="long"/>
  <key id="d10" for="edge" attr.name="id" attr.type="long"/>
  <key id="d11" for="edge" attr.name="edge type" attr.type="string"/>
  <key id="d12" for="edge" attr.name="event listener id" attr.type="long"/>
  <key id="d13" for="edge" attr.name="key" attr.type="string"/>
  <graph id="G" edgedefault="directed">
    <node id="n1"><data key="d0">1</data><data key="d1">parser</data></node>
    <node id="n2"><data key="d0">2</data><data key="d1">HTML element</data><data key="d2">DIV</data><data key="d5">14</data></node>
    <node id="n3"><data key="d0">3</data><data key="d1">script</data><data key="d3">unknown</data><data key="d4">go(&lt;1&gt;)</data></node>
    <node id="n4"><data key="d0">4</data><data key="d1">storage</data></node>
    <edge id="e7" source="n1" target="n2"><data key="d10">7</data><data key="d11">create node</data></edge>
    <edge id="e9" source="n2" target="n3"><data key="d10">9</data><data key="d11">event listener</data><data key="d12">5</data><data key="d13">click</data></edge>
  </graph>
</graphml>"#;

    #[test]
    fn test_parse_graphml_typed_nodes() {
        let graph = parse_graphml(SAMPLE).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 2);

        let div = graph.node(NodeId(2)).unwrap();
        assert_eq!(div.kind.tag_name(), Some("DIV"));
        assert_eq!(div.kind.blink_id(), Some(14));

        match &graph.node(NodeId(3)).unwrap().kind {
            NodeKind::Script { script_type, source } => {
                assert_eq!(*script_type, ScriptType::Unknown);
                assert_eq!(source, "go(<1>)");
            }
            other => panic!("expected script, got {:?}", other),
        }

        assert_eq!(graph.node(NodeId(4)).unwrap().kind.type_name(), "storage");
    }

    #[test]
    fn test_parse_graphml_typed_edges() {
        let graph = parse_graphml(SAMPLE).unwrap();
        let listener = graph.edge(EdgeSeq(9)).unwrap();
        assert_eq!(
            listener.kind(),
            &EdgeKind::EventListener {
                listener_id: 5,
                event: "click".to_string()
            }
        );
        assert_eq!(listener.source.id, NodeId(2));
        assert_eq!(listener.target.id, NodeId(3));
        assert!(matches!(graph.edge(EdgeSeq(7)).unwrap().kind(), EdgeKind::CreateNode));
    }

    #[test]
    fn test_missing_required_attribute_is_reported() {
        let xml = r#"<graphml>
          <key id="d1" for="node" attr.name="node type"/>
          <graph><node id="n1"><data key="d1">resource</data></node></graph>
        </graphml>"#;
        let err = parse_graphml(xml).err().unwrap();
        assert!(matches!(err, GraphError::MissingAttribute { ref attribute, .. } if attribute == "url"));
    }

    #[test]
    fn test_edge_to_unknown_node_is_rejected() {
        let xml = r#"<graphml>
          <key id="d1" for="node" attr.name="node type"/>
          <key id="d2" for="edge" attr.name="edge type"/>
          <graph>
            <node id="n1"><data key="d1">parser</data></node>
            <edge id="e1" source="n1" target="n99"><data key="d2">execute</data></edge>
          </graph>
        </graphml>"#;
        assert!(parse_graphml(xml).is_err());
    }

    #[test]
    fn test_load_graphml_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let graph = load_graphml(file.path()).unwrap();
        assert_eq!(graph.edges().count(), 2);
    }
}
