use std::sync::LazyLock;

use regex::Regex;

use crate::node::{ElementKind, ElementNode, Marks, MediaType, Node, TextNode, attr};
use crate::table::table_cell_node;

static PARTIAL_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^!\[([^\]]*)\]?(?:\(([^)\s]*)\)?)?$").expect("partial image pattern must compile")
});

static BARE_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!(\S+)$").expect("bare image pattern must compile"));

static PARTIAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]+)\]\(([^)\s]*)\)?$").expect("partial link pattern must compile")
});

/// Turns leftover `**` runs in text into bold leaves. A run still open at
/// the end of a leaf becomes bold with the `unfinished` mark.
pub fn fix_strong(blocks: &mut [Node]) {
    for node in blocks {
        let Node::Element(el) = node else {
            continue;
        };
        if el.kind.is_literal() {
            continue;
        }
        if el.kind.holds_inline() {
            split_leaves(&mut el.children);
        } else {
            fix_strong(&mut el.children);
        }
    }
}

fn split_leaves(children: &mut Vec<Node>) {
    let mut out = Vec::with_capacity(children.len());
    for node in children.drain(..) {
        let parts = match &node {
            Node::Text(leaf) if !leaf.marks.code && leaf.text.contains("**") => split_strong(leaf),
            _ => None,
        };
        match parts {
            Some(parts) => out.extend(parts),
            None => out.push(node),
        }
    }
    *children = out;
}

fn split_strong(leaf: &TextNode) -> Option<Vec<Node>> {
    let segments: Vec<&str> = leaf.text.split("**").collect();
    let closed = segments.len() % 2 == 1;
    let mut parts = Vec::with_capacity(segments.len());
    for (ix, segment) in segments.iter().enumerate() {
        let bold = ix % 2 == 1;
        if bold && segment.trim().is_empty() {
            return None;
        }
        if segment.is_empty() {
            continue;
        }
        let mut marks = leaf.marks.clone();
        if bold {
            marks.bold = true;
            marks.unfinished = !closed && ix == segments.len() - 1;
        }
        parts.push(Node::marked(*segment, marks));
    }
    tracing::trace!("split {} strong segments out of a text leaf", segments.len() / 2);
    Some(parts)
}

/// Rewrites the last top-level paragraph when it looks like the first part
/// of a table row, an image or a link still being typed.
pub fn reinterpret_tail(blocks: &mut [Node]) {
    if blocks.len() < 2 {
        return;
    }
    let Some(last) = blocks.last_mut() else {
        return;
    };
    let Some(el) = last.as_element().filter(|el| el.kind == ElementKind::Paragraph) else {
        return;
    };
    let has_link = el
        .children
        .iter()
        .any(|node| node.as_text().is_some_and(|leaf| leaf.marks.link.is_some()));
    let text = el.string();
    let text = text.trim();
    let replacement = if text.starts_with('|') {
        Some(partial_table(text))
    } else if let Some(media) = partial_image(text) {
        Some(media)
    } else if has_link {
        None
    } else {
        partial_link(text)
    };
    if let Some(node) = replacement {
        tracing::debug!("reinterpreted trailing paragraph as {:?}", node.kind());
        *last = node;
    }
}

fn partial_table(text: &str) -> Node {
    let inner = text.strip_prefix('|').unwrap_or(text);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    let cells = inner.split('|').map(|cell| table_cell_node(cell.trim())).collect();
    Node::Element(
        ElementNode::new(ElementKind::Table)
            .with_attr(attr::FINISHED, false)
            .with_children(vec![Node::element(ElementKind::TableRow, cells)]),
    )
}

fn partial_image(text: &str) -> Option<Node> {
    let (alt, url) = if let Some(caps) = PARTIAL_IMAGE.captures(text) {
        (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
        )
    } else {
        let caps = BARE_IMAGE.captures(text)?;
        (String::new(), caps[1].to_string())
    };
    let Node::Element(mut media) = Node::media(MediaType::Image, url) else {
        return None;
    };
    if !alt.is_empty() {
        media.set_attr(attr::ALT, alt);
    }
    media.set_attr(attr::FINISHED, false);
    Some(Node::Element(media))
}

fn partial_link(text: &str) -> Option<Node> {
    let caps = PARTIAL_LINK.captures(text)?;
    let marks = Marks {
        link: Some(caps[2].to_string()),
        ..Marks::default()
    };
    Some(Node::element(
        ElementKind::Paragraph,
        vec![Node::marked(&caps[1], marks)],
    ))
}
