//! Rich-text document model for assistant answers.
//!
//! Answers arrive as HTML-like markup. This module parses them (leniently,
//! via html5ever through `scraper`) into an owned element/text node tree the
//! reveal renderer can walk with an explicit cursor, serializes trees back to
//! markup, and extracts narration-ready plain text. It also strips the
//! code-fence wrapper some inference responses arrive in.

use scraper::{Html, Node as HtmlNode};

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements that imply a word boundary around their content when markup is
/// flattened to plain text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "ul", "ol", "li", "br", "h1", "h2", "h3", "h4", "h5", "h6", "table", "thead",
    "tbody", "tr", "blockquote", "pre", "section", "article",
];

/// One node in a parsed rich-text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with its attributes and children, structure preserved
    /// exactly as parsed.
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
    /// A text leaf.
    Text(String),
}

/// A parsed rich-text fragment: an ordered forest of top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse markup into a document.
    ///
    /// Parsing is lenient: malformed markup is repaired the way a browser
    /// would, and plain text with no tags at all becomes a single text leaf.
    #[must_use]
    pub fn parse(markup: &str) -> Self {
        let fragment = Html::parse_fragment(markup);
        let mut nodes = Vec::new();
        for child in fragment.root_element().children() {
            if let Some(node) = convert(child) {
                push_merged(&mut nodes, node);
            }
        }
        Self { nodes }
    }

    /// Serialize the document back to markup.
    #[must_use]
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            write_node(&mut out, node);
        }
        out
    }

    /// Flatten the document to plain text: markup stripped, block boundaries
    /// turned into word boundaries, whitespace collapsed.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut raw = String::new();
        for node in &self.nodes {
            collect_text(&mut raw, node);
        }
        collapse_whitespace(&raw)
    }

    /// Total number of characters across all text leaves.
    #[must_use]
    pub fn text_len(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Text(text) => text.chars().count(),
                Node::Element { children, .. } => children.iter().map(count).sum(),
            }
        }
        self.nodes.iter().map(count).sum()
    }
}

/// Convert a parsed `scraper` node into an owned [`Node`].
///
/// Comments, doctypes, and processing instructions are dropped.
fn convert(node_ref: ego_tree::NodeRef<'_, HtmlNode>) -> Option<Node> {
    match node_ref.value() {
        HtmlNode::Text(text) => {
            let text: &str = &text;
            Some(Node::Text(text.to_owned()))
        }
        HtmlNode::Element(element) => {
            let attrs = element
                .attrs()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect();
            let mut children = Vec::new();
            for child in node_ref.children() {
                if let Some(node) = convert(child) {
                    push_merged(&mut children, node);
                }
            }
            Some(Node::Element {
                tag: element.name().to_owned(),
                attrs,
                children,
            })
        }
        _ => None,
    }
}

/// Append a node, merging adjacent text leaves so the reveal cursor sees one
/// leaf per run of text.
fn push_merged(nodes: &mut Vec<Node>, node: Node) {
    if let (Some(Node::Text(prev)), Node::Text(text)) = (nodes.last_mut(), &node) {
        prev.push_str(text);
        return;
    }
    nodes.push(node);
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in children {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn collect_text(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Element { tag, children, .. } => {
            let block = BLOCK_ELEMENTS.contains(&tag.as_str());
            if block {
                out.push(' ');
            }
            for child in children {
                collect_text(out, child);
            }
            if block {
                out.push(' ');
            }
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Strip a code-fence wrapper from an inference response body.
///
/// Responses sometimes arrive as ```` ```html<p>…</p>``` ```` (with or
/// without newlines around the fences). Returns the inner content trimmed;
/// unfenced input is returned trimmed and otherwise untouched.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_owned();
    };

    // Skip an optional language tag glued to the opening fence.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.trim_start();
    let inner = rest.strip_suffix("```").unwrap_or(rest);
    inner.trim().to_owned()
}
