//! Node tree to markup
//!
//! Rendering is pure: the same tree always gives the same string. Output is
//! well-formed XHTML fragments (void elements self-close, every attribute
//! has a quoted value) so chapters can be dropped into an XHTML document.

use tracing::warn;

use crate::document::embed::{parse_dimension, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::document::{normalize_url, Alignment, EmbedNode, ListKind, Node, NodeTree, TextFormat};
use crate::models::Page;

/// Style wrappers in canonical order, outermost first
const WRAPPERS: [(TextFormat, &str); 7] = [
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::UNDERLINE, "u"),
    (TextFormat::STRIKETHROUGH, "s"),
    (TextFormat::CODE, "code"),
    (TextFormat::SUBSCRIPT, "sub"),
    (TextFormat::SUPERSCRIPT, "sup"),
];

/// Render a page's content; a page without content renders as ""
pub fn render_page(page: &Page) -> String {
    page.content.as_ref().map(render_tree).unwrap_or_default()
}

/// Render a whole tree
pub fn render_tree(tree: &NodeTree) -> String {
    let mut out = String::new();
    render_nodes(&tree.children, &mut out);
    out
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        render_node(node, out);
    }
}

fn render_node(node: &Node, out: &mut String) {
    match node {
        Node::Paragraph(el) => {
            open_tag(out, "p", el.align);
            if el.children.is_empty() {
                out.push_str("<br />");
            } else {
                render_nodes(&el.children, out);
            }
            close_tag(out, "p");
        }
        Node::Heading(h) => {
            let tag = h.level.as_tag();
            open_tag(out, tag, h.align);
            render_nodes(&h.children, out);
            close_tag(out, tag);
        }
        Node::List(list) => {
            let tag = match list.kind {
                ListKind::Unordered => "ul",
                ListKind::Ordered => "ol",
            };
            out.push('<');
            out.push_str(tag);
            if list.kind == ListKind::Ordered {
                if let Some(start) = list.start.filter(|s| *s != 1) {
                    out.push_str(&format!(" start=\"{}\"", start));
                }
            }
            push_align_style(out, list.align);
            out.push('>');
            render_nodes(&list.children, out);
            close_tag(out, tag);
        }
        Node::ListItem(el) => {
            open_tag(out, "li", el.align);
            render_nodes(&el.children, out);
            close_tag(out, "li");
        }
        Node::Quote(el) => {
            open_tag(out, "blockquote", el.align);
            render_nodes(&el.children, out);
            close_tag(out, "blockquote");
        }
        Node::Text(text) => render_text(&text.text, text.format, out),
        Node::LineBreak(_) => out.push_str("<br />"),
        Node::Embed(embed) => render_embed(embed, out),
    }
}

fn render_text(text: &str, format: TextFormat, out: &mut String) {
    let active: Vec<&str> = WRAPPERS
        .iter()
        .filter(|(flag, _)| format.contains(*flag))
        .map(|(_, tag)| *tag)
        .collect();

    for tag in &active {
        out.push('<');
        out.push_str(tag);
        out.push('>');
    }
    out.push_str(&escape(text));
    for tag in active.iter().rev() {
        close_tag(out, tag);
    }
}

/// An embed renders as an iframe, or as an empty sized box when its URL no
/// longer validates. A bad dimension falls back to the default size.
fn render_embed(embed: &EmbedNode, out: &mut String) {
    let width = parse_dimension("width", &embed.width, DEFAULT_WIDTH)
        .unwrap_or_else(|_| DEFAULT_WIDTH.to_string());
    let height = parse_dimension("height", &embed.height, DEFAULT_HEIGHT)
        .unwrap_or_else(|_| DEFAULT_HEIGHT.to_string());

    let aligned = embed.align != Alignment::None;
    if aligned {
        out.push_str(&format!(
            "<div style=\"text-align: {};\">",
            embed.align.as_str()
        ));
    }

    match normalize_url(&embed.url) {
        Ok(url) => {
            out.push_str(&format!(
                "<iframe width=\"{}\" height=\"{}\" src=\"{}\" title=\"Iframe\" frameborder=\"0\" \
                 referrerpolicy=\"strict-origin-when-cross-origin\" allowfullscreen=\"true\"></iframe>",
                width,
                height,
                escape(url.as_str())
            ));
        }
        Err(e) => {
            warn!(url = %embed.url, error = %e, "Embed URL rejected at export, using placeholder");
            out.push_str(&format!(
                "<div class=\"embed-placeholder\" style=\"width: {}px; height: {}px;\"></div>",
                width, height
            ));
        }
    }

    if aligned {
        close_tag(out, "div");
    }
}

fn open_tag(out: &mut String, tag: &str, align: Alignment) {
    out.push('<');
    out.push_str(tag);
    push_align_style(out, align);
    out.push('>');
}

fn push_align_style(out: &mut String, align: Alignment) {
    if align != Alignment::None {
        out.push_str(" style=\"text-align: ");
        out.push_str(align.as_str());
        out.push_str(";\"");
    }
}

fn close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Escape text for use in XML content and attribute values
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
