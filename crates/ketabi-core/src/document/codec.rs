//! Structural encoding and lenient decoding of node trees

use serde_json::{Map, Value};

use super::embed::EmbedNode;
use super::{
    Alignment, CorruptNode, ElementNode, HeadingLevel, HeadingNode, LineBreakNode, ListKind,
    ListNode, Node, NodeTree, TextFormat, TextNode,
};

/// Keys used in the node wire format
mod keys {
    pub const ROOT: &str = "root";
    pub const TYPE: &str = "type";
    pub const CHILDREN: &str = "children";
    pub const FORMAT: &str = "format";
    pub const TAG: &str = "tag";
    pub const LIST_TYPE: &str = "listType";
    pub const START: &str = "start";
    pub const TEXT: &str = "text";
    pub const URL: &str = "url";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
}

/// A decoded tree plus one diagnostic per dropped node
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub tree: NodeTree,
    pub diagnostics: Vec<CorruptNode>,
}

/// Where a list of children lives, which decides what may appear in it
#[derive(Debug, Clone, Copy)]
enum Container {
    Root,
    /// paragraph, heading, quote
    Inline,
    List,
    ListItem,
}

impl Container {
    fn allows(self, node: &Node) -> bool {
        match self {
            Container::Root => matches!(
                node,
                Node::Paragraph(_) | Node::Heading(_) | Node::List(_) | Node::Quote(_) | Node::Embed(_)
            ),
            Container::Inline => matches!(node, Node::Text(_) | Node::LineBreak(_)),
            Container::List => matches!(node, Node::ListItem(_)),
            Container::ListItem => {
                matches!(node, Node::Text(_) | Node::LineBreak(_) | Node::List(_))
            }
        }
    }
}

pub(super) fn decode_tree(value: &Value) -> Decoded {
    let mut decoder = Decoder::default();
    let tree = decoder.tree(value);
    Decoded {
        tree,
        diagnostics: decoder.diagnostics,
    }
}

#[derive(Default)]
struct Decoder {
    diagnostics: Vec<CorruptNode>,
}

impl Decoder {
    fn report(&mut self, path: &str, reason: impl Into<String>) {
        self.diagnostics.push(CorruptNode {
            path: path.to_string(),
            reason: reason.into(),
        });
    }

    fn tree(&mut self, value: &Value) -> NodeTree {
        let Some(obj) = value.as_object() else {
            self.report("", "content is not an object");
            return NodeTree::default();
        };

        let mut extra = obj.clone();
        let root = extra.remove(keys::ROOT);

        let Some(Value::Object(root)) = root else {
            self.report("/root", "missing root node");
            return NodeTree {
                extra,
                ..NodeTree::default()
            };
        };

        let mut root_extra = root;
        match root_extra.remove(keys::TYPE) {
            Some(Value::String(tag)) if tag == keys::ROOT => {}
            _ => {
                self.report("/root", "root node must have type 'root'");
                return NodeTree {
                    extra,
                    ..NodeTree::default()
                };
            }
        }

        let children = root_extra.remove(keys::CHILDREN);
        let children = self.children(children.as_ref(), "/root", keys::ROOT, Container::Root);

        NodeTree {
            children,
            root_extra,
            extra,
        }
    }

    fn children(
        &mut self,
        value: Option<&Value>,
        path: &str,
        parent: &str,
        container: Container,
    ) -> Vec<Node> {
        let items = match value {
            None => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.report(&format!("{}/children", path), "'children' is not an array");
                return Vec::new();
            }
        };

        let mut nodes = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let child_path = format!("{}/children/{}", path, i);
            match self.node(item, &child_path) {
                Ok(node) if container.allows(&node) => nodes.push(node),
                Ok(node) => self.report(
                    &child_path,
                    format!("'{}' node is not allowed inside '{}'", node.type_tag(), parent),
                ),
                Err(reason) => self.report(&child_path, reason),
            }
        }
        nodes
    }

    /// Decode one node. Own fields are checked before children so a node
    /// that is about to be dropped never reports diagnostics for its subtree.
    fn node(&mut self, value: &Value, path: &str) -> Result<Node, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "node is not an object".to_string())?;

        let tag = match obj.get(keys::TYPE) {
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => return Err("field 'type' is not a string".to_string()),
            None => return Err("missing required field 'type'".to_string()),
        };

        let mut fields = obj.clone();
        fields.remove(keys::TYPE);

        match tag.as_str() {
            "paragraph" => Ok(Node::Paragraph(self.element(fields, path, &tag, Container::Inline))),
            "quote" => Ok(Node::Quote(self.element(fields, path, &tag, Container::Inline))),
            "listitem" => Ok(Node::ListItem(self.element(fields, path, &tag, Container::ListItem))),
            "heading" => {
                let level_tag = take_string(&mut fields, keys::TAG)?;
                let level = HeadingLevel::from_tag(&level_tag)
                    .ok_or_else(|| format!("unsupported heading tag '{}'", level_tag))?;
                let el = self.element(fields, path, &tag, Container::Inline);
                Ok(Node::Heading(HeadingNode {
                    level,
                    align: el.align,
                    children: el.children,
                    extra: el.extra,
                }))
            }
            "list" => {
                let list_type = take_string(&mut fields, keys::LIST_TYPE)?;
                let kind = ListKind::from_wire(&list_type)
                    .ok_or_else(|| format!("unsupported list type '{}'", list_type))?;
                let start = match fields.remove(keys::START) {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(
                        v.as_u64()
                            .and_then(|n| u32::try_from(n).ok())
                            .ok_or_else(|| "field 'start' is not a positive integer".to_string())?,
                    ),
                };
                let el = self.element(fields, path, &tag, Container::List);
                Ok(Node::List(ListNode {
                    kind,
                    start,
                    align: el.align,
                    children: el.children,
                    extra: el.extra,
                }))
            }
            "text" => {
                let text = take_string(&mut fields, keys::TEXT)?;
                let format = match fields.remove(keys::FORMAT) {
                    None => TextFormat::empty(),
                    Some(v) => v
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .map(TextFormat::from_bits)
                        .ok_or_else(|| "field 'format' is not a format bitmask".to_string())?,
                };
                Ok(Node::Text(TextNode {
                    text,
                    format,
                    extra: fields,
                }))
            }
            "linebreak" => Ok(Node::LineBreak(LineBreakNode { extra: fields })),
            "embed" => {
                let url = take_string(&mut fields, keys::URL)?;
                let width = take_dimension(&mut fields, keys::WIDTH)?;
                let height = take_dimension(&mut fields, keys::HEIGHT)?;
                let align = take_alignment(&mut fields);
                let embed = EmbedNode::new(&url, &width, &height).map_err(|e| e.to_string())?;
                Ok(Node::Embed(EmbedNode {
                    align,
                    extra: fields,
                    ..embed
                }))
            }
            "root" => Err("'root' node may only appear at the top of the tree".to_string()),
            other => Err(format!("unknown node type '{}'", other)),
        }
    }

    fn element(
        &mut self,
        mut fields: Map<String, Value>,
        path: &str,
        tag: &str,
        container: Container,
    ) -> ElementNode {
        let align = take_alignment(&mut fields);
        let children = fields.remove(keys::CHILDREN);
        let children = self.children(children.as_ref(), path, tag, container);
        ElementNode {
            align,
            children,
            extra: fields,
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(format!("field '{}' is not a string", key)),
        None => Err(format!("missing required field '{}'", key)),
    }
}

/// Width/height may arrive as strings or bare numbers; absent means default
fn take_dimension(fields: &mut Map<String, Value>, key: &str) -> Result<String, String> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(format!("field '{}' is not a pixel size", key)),
    }
}

/// An alignment we don't recognise stays in the extra keys untouched
fn take_alignment(fields: &mut Map<String, Value>) -> Alignment {
    let parsed = match fields.get(keys::FORMAT) {
        Some(Value::String(s)) => Alignment::parse(s),
        _ => None,
    };
    match parsed {
        Some(align) => {
            fields.remove(keys::FORMAT);
            align
        }
        None => Alignment::None,
    }
}

pub(super) fn encode_tree(tree: &NodeTree) -> Value {
    let mut root = Map::new();
    root.insert(keys::TYPE.into(), Value::from(keys::ROOT));
    root.insert(keys::CHILDREN.into(), encode_children(&tree.children));
    merge_extra(&mut root, &tree.root_extra);

    let mut top = Map::new();
    top.insert(keys::ROOT.into(), Value::Object(root));
    merge_extra(&mut top, &tree.extra);
    Value::Object(top)
}

fn encode_children(children: &[Node]) -> Value {
    Value::Array(children.iter().map(encode_node).collect())
}

fn encode_node(node: &Node) -> Value {
    let mut obj = Map::new();
    obj.insert(keys::TYPE.into(), Value::from(node.type_tag()));

    match node {
        Node::Paragraph(el) | Node::ListItem(el) | Node::Quote(el) => {
            encode_element(&mut obj, el.align, &el.children, &el.extra);
        }
        Node::Heading(h) => {
            obj.insert(keys::TAG.into(), Value::from(h.level.as_tag()));
            encode_element(&mut obj, h.align, &h.children, &h.extra);
        }
        Node::List(l) => {
            obj.insert(keys::LIST_TYPE.into(), Value::from(l.kind.as_wire()));
            if let Some(start) = l.start {
                obj.insert(keys::START.into(), Value::from(start));
            }
            encode_element(&mut obj, l.align, &l.children, &l.extra);
        }
        Node::Text(t) => {
            obj.insert(keys::TEXT.into(), Value::from(t.text.clone()));
            obj.insert(keys::FORMAT.into(), Value::from(t.format.bits()));
            merge_extra(&mut obj, &t.extra);
        }
        Node::LineBreak(lb) => merge_extra(&mut obj, &lb.extra),
        Node::Embed(e) => {
            obj.insert(keys::URL.into(), Value::from(e.url.clone()));
            obj.insert(keys::WIDTH.into(), Value::from(e.width.clone()));
            obj.insert(keys::HEIGHT.into(), Value::from(e.height.clone()));
            if e.align != Alignment::None {
                obj.insert(keys::FORMAT.into(), Value::from(e.align.as_str()));
            }
            merge_extra(&mut obj, &e.extra);
        }
    }

    Value::Object(obj)
}

fn encode_element(
    obj: &mut Map<String, Value>,
    align: Alignment,
    children: &[Node],
    extra: &Map<String, Value>,
) {
    if align != Alignment::None {
        obj.insert(keys::FORMAT.into(), Value::from(align.as_str()));
    }
    obj.insert(keys::CHILDREN.into(), encode_children(children));
    merge_extra(obj, extra);
}

/// Known fields win over extra keys of the same name
fn merge_extra(obj: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (key, value) in extra {
        if !obj.contains_key(key) {
            obj.insert(key.clone(), value.clone());
        }
    }
}
