//! Node tree model
//!
//! A page's content is a rooted tree of nodes. The tree is a closed tagged
//! union discriminated by `type`, serialized structurally (nested JSON
//! objects and arrays) and decoded leniently: a node that fails its schema
//! is dropped on its own and reported as a [`CorruptNode`], while its
//! siblings and the rest of the tree load normally.
//!
//! Wire shape:
//!
//! ```text
//! { "root": { "type": "root", "children": [
//!     { "type": "paragraph", "format": "center", "children": [
//!         { "type": "text", "text": "Hello", "format": 1 } ] },
//!     { "type": "embed", "url": "https://example.com/v", "width": "560", "height": "315" } ] } }
//! ```

mod codec;
pub mod embed;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

pub use codec::Decoded;
pub use embed::{normalize_url, EmbedNode};

/// A node that was dropped while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptNode {
    /// Location in the tree, e.g. `/root/children/2/children/0`
    pub path: String,
    /// What was wrong with it
    pub reason: String,
}

impl fmt::Display for CorruptNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// The content of one page
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeTree {
    /// Block-level children of the root, in document order
    pub children: Vec<Node>,
    /// Unknown keys on the root node
    pub root_extra: Map<String, Value>,
    /// Unknown keys next to `root`
    pub extra: Map<String, Value>,
}

impl NodeTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree from block children
    pub fn with_children(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    /// Append a block at the root (where new embeds are inserted)
    pub fn push_block(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Whether the root has no children
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Structural form of the tree
    pub fn to_value(&self) -> Value {
        codec::encode_tree(self)
    }

    /// Decode a tree, collecting a diagnostic for every dropped node
    pub fn decode(value: &Value) -> Decoded {
        codec::decode_tree(value)
    }
}

impl Serialize for NodeTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let decoded = NodeTree::decode(&value);
        for corrupt in &decoded.diagnostics {
            warn!(path = %corrupt.path, reason = %corrupt.reason, "Dropped corrupt node");
        }
        Ok(decoded.tree)
    }
}

/// Broad role of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Block,
    Inline,
    Decorator,
}

/// A node below the root
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Paragraph(ElementNode),
    Heading(HeadingNode),
    List(ListNode),
    ListItem(ElementNode),
    Quote(ElementNode),
    Text(TextNode),
    LineBreak(LineBreakNode),
    Embed(EmbedNode),
}

impl Node {
    /// The `type` tag written to the wire
    pub fn type_tag(&self) -> &'static str {
        match self {
            Node::Paragraph(_) => "paragraph",
            Node::Heading(_) => "heading",
            Node::List(_) => "list",
            Node::ListItem(_) => "listitem",
            Node::Quote(_) => "quote",
            Node::Text(_) => "text",
            Node::LineBreak(_) => "linebreak",
            Node::Embed(_) => "embed",
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            Node::Paragraph(_)
            | Node::Heading(_)
            | Node::List(_)
            | Node::ListItem(_)
            | Node::Quote(_) => NodeCategory::Block,
            Node::Text(_) | Node::LineBreak(_) => NodeCategory::Inline,
            Node::Embed(_) => NodeCategory::Decorator,
        }
    }

    /// A paragraph holding a single plain text run
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Paragraph(ElementNode::new(vec![Node::text(text)]))
    }

    /// A plain text run
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode::new(text))
    }

    /// Child nodes, if this node can have any
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Paragraph(el) | Node::ListItem(el) | Node::Quote(el) => &el.children,
            Node::Heading(h) => &h.children,
            Node::List(l) => &l.children,
            Node::Text(_) | Node::LineBreak(_) | Node::Embed(_) => &[],
        }
    }
}

/// Paragraph, list item and quote share this shape
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementNode {
    pub align: Alignment,
    pub children: Vec<Node>,
    pub extra: Map<String, Value>,
}

impl ElementNode {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }
}

/// Heading level; only `h1` to `h3` are part of the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
}

impl HeadingLevel {
    pub fn as_tag(&self) -> &'static str {
        match self {
            HeadingLevel::H1 => "h1",
            HeadingLevel::H2 => "h2",
            HeadingLevel::H3 => "h3",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "h1" => Some(HeadingLevel::H1),
            "h2" => Some(HeadingLevel::H2),
            "h3" => Some(HeadingLevel::H3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadingNode {
    pub level: HeadingLevel,
    pub align: Alignment,
    pub children: Vec<Node>,
    pub extra: Map<String, Value>,
}

impl HeadingNode {
    pub fn new(level: HeadingLevel, children: Vec<Node>) -> Self {
        Self {
            level,
            align: Alignment::None,
            children,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `listType: "bullet"`
    Unordered,
    /// `listType: "number"`
    Ordered,
}

impl ListKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ListKind::Unordered => "bullet",
            ListKind::Ordered => "number",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "bullet" => Some(ListKind::Unordered),
            "number" => Some(ListKind::Ordered),
            _ => None,
        }
    }
}

/// A list; its children are always `listitem` nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub kind: ListKind,
    /// First number of an ordered list
    pub start: Option<u32>,
    pub align: Alignment,
    pub children: Vec<Node>,
    pub extra: Map<String, Value>,
}

impl ListNode {
    pub fn new(kind: ListKind, items: Vec<ElementNode>) -> Self {
        Self {
            kind,
            start: None,
            align: Alignment::None,
            children: items.into_iter().map(Node::ListItem).collect(),
            extra: Map::new(),
        }
    }
}

/// A run of text with one set of formats
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub format: TextFormat,
    pub extra: Map<String, Value>,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::empty(),
            extra: Map::new(),
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineBreakNode {
    pub extra: Map<String, Value>,
}

/// Text format bitmask
///
/// Bits not listed here are kept so they survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextFormat(u32);

impl TextFormat {
    pub const BOLD: TextFormat = TextFormat(1);
    pub const ITALIC: TextFormat = TextFormat(1 << 1);
    pub const STRIKETHROUGH: TextFormat = TextFormat(1 << 2);
    pub const UNDERLINE: TextFormat = TextFormat(1 << 3);
    pub const CODE: TextFormat = TextFormat(1 << 4);
    pub const SUBSCRIPT: TextFormat = TextFormat(1 << 5);
    pub const SUPERSCRIPT: TextFormat = TextFormat(1 << 6);

    pub const fn empty() -> Self {
        TextFormat(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        TextFormat(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: TextFormat) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TextFormat {
    type Output = TextFormat;

    fn bitor(self, rhs: TextFormat) -> TextFormat {
        TextFormat(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for TextFormat {
    fn bitor_assign(&mut self, rhs: TextFormat) {
        self.0 |= rhs.0;
    }
}

/// Block alignment, stored as the element's string `format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Center,
    Right,
    Justify,
    Start,
    End,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::None => "",
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
            Alignment::Start => "start",
            Alignment::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(Alignment::None),
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            "start" => Some(Alignment::Start),
            "end" => Some(Alignment::End),
            _ => None,
        }
    }
}
