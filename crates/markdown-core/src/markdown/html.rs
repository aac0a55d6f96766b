//! Block-level HTML inside markdown: media tags, JSON comments, aligned
//! paragraphs and a small fragment converter for container tags. Nothing
//! here fails; bad input degrades to plain content and a log line.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::RecoverableParseError;
use crate::node::{ElementKind, ElementNode, ListKind, Marks, MediaType, Node, attr};
use crate::table::Align;

use super::inline_html::layer_for;

pub const CHART_DISCRIMINATOR: &str = "chartType";

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][\w:.-]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern must compile")
});

static FIRST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<([A-Za-z][A-Za-z0-9-]*)").expect("tag name pattern must compile"));

static ALIGNED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^<(p|h[1-6])\s[^>]*?\balign\s*=\s*["']?([a-z]+)["']?[^>]*>(.*)</(?:p|h[1-6])>$"#)
        .expect("aligned block pattern must compile")
});

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^<>]*>|[^<]+|<").expect("token pattern must compile")
});

static ONLY_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:<br\s*/?>\s*)+$").expect("break pattern must compile"));

const CONTAINER_TAGS: &[&str] = &[
    "table", "div", "ul", "ol", "section", "blockquote", "article", "figure", "details", "p",
    "h1", "h2", "h3", "h4", "h5", "h6", "img", "video", "audio", "iframe", "pre", "hr",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "source", "input", "wbr", "col", "meta", "link"];

/// What one raw HTML block contributes to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlBlock {
    Nodes(Vec<Node>),
    /// Properties for the next sibling block.
    ContextProps(Value),
    Ignored,
}

pub fn convert_block(raw: &str) -> HtmlBlock {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return HtmlBlock::Ignored;
    }
    if trimmed.starts_with("<!--") {
        return convert_comment(trimmed);
    }
    if ONLY_BREAKS.is_match(trimmed) {
        return HtmlBlock::Nodes(vec![Node::paragraph("")]);
    }
    if let Some(nodes) = aligned_block(trimmed) {
        return HtmlBlock::Nodes(nodes);
    }
    let Some(name) = FIRST_TAG
        .captures(trimmed)
        .map(|caps| caps[1].to_ascii_lowercase())
    else {
        // A stray closing tag or text the block scanner picked up.
        return HtmlBlock::Ignored;
    };
    if CONTAINER_TAGS.contains(&name.as_str()) {
        let nodes = convert_fragment(trimmed);
        if !nodes.is_empty() {
            return HtmlBlock::Nodes(nodes);
        }
    }
    tracing::debug!("{}", RecoverableParseError::UnsupportedHtml(name));
    HtmlBlock::Nodes(vec![raw_html_block(trimmed)])
}

/// A code block that renderers show as live HTML.
pub fn raw_html_block(html: &str) -> Node {
    let mut node = Node::code_block(Some("html"), html);
    if let Node::Element(el) = &mut node {
        el.set_attr(attr::RENDER, true);
    }
    node
}

fn convert_comment(comment: &str) -> HtmlBlock {
    let body = comment
        .trim_start_matches("<!--")
        .split("-->")
        .next()
        .unwrap_or_default()
        .trim();
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            if body.starts_with('{') || body.starts_with('[') {
                tracing::warn!("{}", RecoverableParseError::InvalidCommentJson(err.to_string()));
            }
            return HtmlBlock::Ignored;
        }
    };
    match value {
        Value::Array(items) if items.iter().any(is_chart_config) => HtmlBlock::Nodes(vec![chart(items)]),
        Value::Object(map) if map.contains_key(CHART_DISCRIMINATOR) => {
            HtmlBlock::Nodes(vec![chart(vec![Value::Object(map)])])
        }
        Value::Object(map) => HtmlBlock::ContextProps(Value::Object(map)),
        _ => HtmlBlock::Ignored,
    }
}

fn is_chart_config(value: &Value) -> bool {
    value.get(CHART_DISCRIMINATOR).is_some()
}

fn chart(configs: Vec<Value>) -> Node {
    Node::Element(
        ElementNode::new(ElementKind::Chart)
            .with_attr(attr::CONFIG, Value::Array(configs))
            .with_children(vec![Node::text("")]),
    )
}

// `<p align>` and `<hN align>` hold markdown; parse it and tag the result.
fn aligned_block(html: &str) -> Option<Vec<Node>> {
    let caps = ALIGNED_BLOCK.captures(html)?;
    let tag = caps[1].to_ascii_lowercase();
    let align = Align::parse(&caps[2])?;
    let (blocks, _) = super::parse::parse_blocks(caps[3].trim(), false);
    let level = tag
        .strip_prefix('h')
        .and_then(|n| n.parse::<u8>().ok())
        .map(|n| n.clamp(1, 4));
    Some(
        blocks
            .into_iter()
            .map(|node| match node {
                Node::Element(mut el) => {
                    if let (Some(level), ElementKind::Paragraph) = (level, el.kind) {
                        el.kind = ElementKind::Heading;
                        el.set_attr(attr::LEVEL, level);
                    }
                    el.set_attr(attr::ALIGN, align.as_str());
                    Node::Element(el)
                }
                other => other,
            })
            .collect(),
    )
}

/// Decodes `%XX` escapes. A malformed escape or invalid UTF-8 returns the
/// input unchanged.
pub fn decode_url(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if bytes[ix] != b'%' {
            out.push(bytes[ix]);
            ix += 1;
            continue;
        }
        let hex = bytes
            .get(ix + 1..ix + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        let Some(byte) = hex else {
            tracing::warn!("{}", RecoverableParseError::MalformedPercentEscape(raw.to_string()));
            return raw.to_string();
        };
        out.push(byte);
        ix += 3;
    }
    String::from_utf8(out).unwrap_or_else(|_| {
        tracing::warn!("{}", RecoverableParseError::MalformedPercentEscape(raw.to_string()));
        raw.to_string()
    })
}

/// Attribute list of a tag, keys lowercased, entities decoded.
pub fn parse_attrs(source: &str) -> Vec<(String, String)> {
    ATTR.captures_iter(source)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or(String::new(), |m| decode_entities(m.as_str()));
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Dom {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Dom>,
    },
    Text(String),
}

impl Dom {
    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Dom::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            Dom::Text(_) => None,
        }
    }

    fn text(&self) -> String {
        match self {
            Dom::Text(text) => text.clone(),
            Dom::Element { children, .. } => children.iter().map(Dom::text).collect(),
        }
    }
}

fn parse_dom(html: &str) -> Vec<Dom> {
    struct Open {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Dom>,
    }

    fn close_top(stack: &mut Vec<Open>) {
        if stack.len() < 2 {
            return;
        }
        if let Some(open) = stack.pop() {
            let node = Dom::Element {
                name: open.name,
                attrs: open.attrs,
                children: open.children,
            };
            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            }
        }
    }

    let mut stack = vec![Open {
        name: String::new(),
        attrs: Vec::new(),
        children: Vec::new(),
    }];

    for token in TOKEN.find_iter(html) {
        let token = token.as_str();
        if token.starts_with("<!--") {
            continue;
        }
        if let Some(rest) = token.strip_prefix("</") {
            let name = rest.trim_end_matches('>').trim().to_ascii_lowercase();
            if let Some(depth) = stack.iter().rposition(|open| open.name == name) {
                while stack.len() > depth.max(1) {
                    close_top(&mut stack);
                }
            }
            continue;
        }
        if token.len() > 1 && token.starts_with('<') {
            let Some(caps) = FIRST_TAG.captures(token) else {
                continue;
            };
            let name = caps[1].to_ascii_lowercase();
            let body = token[caps[0].len()..].trim_end_matches('>');
            let self_closing = body.trim_end().ends_with('/');
            let attrs = parse_attrs(body.trim_end().trim_end_matches('/'));
            if self_closing || VOID_TAGS.contains(&name.as_str()) {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Dom::Element {
                        name,
                        attrs,
                        children: Vec::new(),
                    });
                }
            } else {
                stack.push(Open {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            continue;
        }
        if let Some(parent) = stack.last_mut() {
            parent.children.push(Dom::Text(decode_entities(token)));
        }
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

/// Converts an HTML fragment into blocks.
pub fn convert_fragment(html: &str) -> Vec<Node> {
    let dom = parse_dom(html);
    let mut out = Vec::new();
    collect_blocks(&dom, &ElementNode::new(ElementKind::Paragraph), &mut out);
    out
}

fn is_block(node: &Dom) -> bool {
    match node {
        Dom::Element { name, .. } => matches!(
            name.as_str(),
            "p" | "div"
                | "section"
                | "article"
                | "figure"
                | "details"
                | "h1"
                | "h2"
                | "h3"
                | "h4"
                | "h5"
                | "h6"
                | "ul"
                | "ol"
                | "table"
                | "blockquote"
                | "pre"
                | "hr"
                | "img"
                | "video"
                | "audio"
                | "iframe"
        ),
        Dom::Text(_) => false,
    }
}

// Inline runs between blocks are wrapped in a copy of `run_wrapper`.
fn collect_blocks(nodes: &[Dom], run_wrapper: &ElementNode, out: &mut Vec<Node>) {
    let mut run: Vec<Node> = Vec::new();
    let flush = |run: &mut Vec<Node>, out: &mut Vec<Node>| {
        let blank = run
            .iter()
            .all(|n| n.as_text().is_some_and(|t| t.text.trim().is_empty()));
        if !blank {
            let mut el = run_wrapper.clone();
            el.children = std::mem::take(run);
            out.push(Node::Element(el));
        }
        run.clear();
    };
    for node in nodes {
        if is_block(node) {
            flush(&mut run, out);
            convert_block_dom(node, out);
        } else {
            collect_inline(node, &Marks::default(), &mut run);
        }
    }
    flush(&mut run, out);
}

fn convert_block_dom(node: &Dom, out: &mut Vec<Node>) {
    let Dom::Element { name, children, .. } = node else {
        return;
    };
    match name.as_str() {
        "p" => {
            let mut wrapper = ElementNode::new(ElementKind::Paragraph);
            if let Some(align) = node.attr("align").and_then(Align::parse) {
                wrapper.set_attr(attr::ALIGN, align.as_str());
            }
            collect_blocks(children, &wrapper, out);
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<u8>().unwrap_or(1).clamp(1, 4);
            let wrapper = ElementNode::new(ElementKind::Heading).with_attr(attr::LEVEL, level);
            collect_blocks(children, &wrapper, out);
        }
        "ul" | "ol" => {
            let kind = if name == "ol" {
                ListKind::Ordered
            } else {
                ListKind::Unordered
            };
            let mut list = ElementNode::list(kind);
            if let Some(start) = node.attr("start").and_then(|s| s.parse::<u64>().ok()) {
                if kind == ListKind::Ordered && start != 1 {
                    list.set_attr(attr::START, start);
                }
            }
            for item in children {
                let Dom::Element {
                    name,
                    children: item_children,
                    ..
                } = item
                else {
                    continue;
                };
                if name != "li" {
                    continue;
                }
                let mut blocks = Vec::new();
                collect_blocks(item_children, &ElementNode::new(ElementKind::Paragraph), &mut blocks);
                list.children.push(Node::list_item(blocks));
            }
            out.push(Node::Element(list));
        }
        "table" => out.push(convert_table(children)),
        "blockquote" => {
            let mut blocks = Vec::new();
            collect_blocks(children, &ElementNode::new(ElementKind::Paragraph), &mut blocks);
            out.push(Node::blockquote(blocks));
        }
        "pre" => {
            let language = children.iter().find_map(|c| {
                c.attr("class")
                    .and_then(|class| class.split_whitespace().find_map(|c| c.strip_prefix("language-")))
                    .map(str::to_string)
            });
            let code = node.text();
            out.push(Node::code_block(language.as_deref(), code.trim_end_matches('\n')));
        }
        "hr" => out.push(Node::horizontal_rule()),
        "img" | "video" | "audio" | "iframe" => {
            if let Some(media) = media_from_dom(node) {
                out.push(media);
            }
        }
        _ => collect_blocks(children, &ElementNode::new(ElementKind::Paragraph), out),
    }
}

fn collect_inline(node: &Dom, marks: &Marks, run: &mut Vec<Node>) {
    match node {
        Dom::Text(text) => run.push(Node::marked(text.clone(), marks.clone())),
        Dom::Element {
            name,
            attrs,
            children,
        } => {
            if name == "br" {
                run.push(Node::element(ElementKind::Break, vec![Node::text("")]));
                return;
            }
            let mut marks = marks.clone();
            if let Some(layer) = layer_for(name, attrs) {
                layer.apply(&mut marks);
            }
            for child in children {
                collect_inline(child, &marks, run);
            }
        }
    }
}

fn convert_table(children: &[Dom]) -> Node {
    fn rows<'a>(nodes: &'a [Dom], out: &mut Vec<&'a Dom>) {
        for node in nodes {
            if let Dom::Element { name, children, .. } = node {
                match name.as_str() {
                    "tr" => out.push(node),
                    "thead" | "tbody" | "tfoot" => rows(children, out),
                    _ => {}
                }
            }
        }
    }

    let mut found = Vec::new();
    rows(children, &mut found);
    let rows = found
        .into_iter()
        .enumerate()
        .map(|(row_ix, row)| {
            let Dom::Element { children, .. } = row else {
                return Node::element(ElementKind::TableRow, Vec::new());
            };
            let cells = children
                .iter()
                .filter(|c| matches!(c, Dom::Element { name, .. } if name == "td" || name == "th"))
                .map(|cell| {
                    let mut inline = Vec::new();
                    if let Dom::Element { children, .. } = cell {
                        for child in children {
                            collect_inline(child, &Marks::default(), &mut inline);
                        }
                    }
                    let mut el = ElementNode::new(ElementKind::TableCell).with_children(vec![
                        Node::element(ElementKind::Paragraph, inline),
                    ]);
                    if row_ix == 0 {
                        let align = cell
                            .attr("align")
                            .map(str::to_string)
                            .or_else(|| cell.attr("style").and_then(text_align));
                        if let Some(align) = align.as_deref().and_then(Align::parse) {
                            el.set_attr(attr::ALIGN, align.as_str());
                        }
                    }
                    Node::Element(el)
                })
                .collect();
            Node::element(ElementKind::TableRow, cells)
        })
        .collect();
    Node::element(ElementKind::Table, rows)
}

fn text_align(style: &str) -> Option<String> {
    style.split(';').find_map(|decl| {
        let (key, value) = decl.split_once(':')?;
        (key.trim().eq_ignore_ascii_case("text-align")).then(|| value.trim().to_string())
    })
}

fn media_from_dom(node: &Dom) -> Option<Node> {
    let Dom::Element {
        name,
        attrs,
        children,
    } = node
    else {
        return None;
    };
    let media_type = MediaType::from_tag(name)?;
    let src = node.attr("src").map(str::to_string).or_else(|| {
        children
            .iter()
            .find(|c| matches!(c, Dom::Element { name, .. } if name == "source"))
            .and_then(|c| c.attr("src"))
            .map(str::to_string)
    })?;
    Some(media_node(media_type, &src, attrs))
}

/// A media element from a tag's attributes.
pub fn media_node(media_type: MediaType, src: &str, attrs: &[(String, String)]) -> Node {
    let mut el = ElementNode::new(ElementKind::Media)
        .with_attr(attr::MEDIA_TYPE, media_type.as_str())
        .with_attr(attr::URL, decode_url(src))
        .with_children(vec![Node::text("")]);
    for (key, value) in attrs {
        match key.as_str() {
            "alt" if !value.is_empty() => el.set_attr(attr::ALT, value.as_str()),
            "width" | "height" => {
                let name = if key == "width" { attr::WIDTH } else { attr::HEIGHT };
                match value.parse::<u64>() {
                    Ok(n) => el.set_attr(name, n),
                    Err(_) => el.set_attr(name, value.as_str()),
                }
            }
            "data-align" | "align" => {
                if let Some(align) = Align::parse(value) {
                    el.set_attr(attr::ALIGN, align.as_str());
                }
            }
            "controls" => el.set_attr(attr::CONTROLS, true),
            "autoplay" => el.set_attr(attr::AUTOPLAY, true),
            "loop" => el.set_attr(attr::LOOP, true),
            "muted" => el.set_attr(attr::MUTED, true),
            _ => {}
        }
    }
    Node::Element(el)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn malformed_escape_returns_raw_input() {
        assert_eq!(decode_url("a%20b"), "a b");
        assert_eq!(decode_url("100%"), "100%");
        assert_eq!(decode_url("%zz"), "%zz");
        assert_eq!(decode_url("%ff"), "%ff");
    }

    #[test]
    fn json_comments_become_props_charts_or_nothing() {
        assert_eq!(
            convert_block(r#"<!-- {"align":"center"} -->"#),
            HtmlBlock::ContextProps(serde_json::json!({"align": "center"}))
        );
        let HtmlBlock::Nodes(nodes) = convert_block(r#"<!-- {"chartType":"bar"} -->"#) else {
            panic!("expected a chart");
        };
        let chart = nodes[0].as_element().unwrap();
        assert_eq!(chart.kind, ElementKind::Chart);
        assert_eq!(chart.attrs[attr::CONFIG], serde_json::json!([{"chartType": "bar"}]));
        assert_eq!(convert_block("<!-- {not json -->"), HtmlBlock::Ignored);
        assert_eq!(convert_block("<!-- just a note -->"), HtmlBlock::Ignored);
    }

    #[test]
    fn media_tags_keep_size_and_flags() {
        let HtmlBlock::Nodes(nodes) =
            convert_block(r#"<video src="a%20b.mp4" width="320" controls data-align="center"></video>"#)
        else {
            panic!("expected media");
        };
        let media = nodes[0].as_element().unwrap();
        assert_eq!(media.media_type(), Some(MediaType::Video));
        assert_eq!(media.attr_str(attr::URL), Some("a b.mp4"));
        assert_eq!(media.attr_u64(attr::WIDTH), Some(320));
        assert!(media.attr_bool(attr::CONTROLS));
        assert_eq!(media.attr_str(attr::ALIGN), Some("center"));
    }

    #[test]
    fn fragment_tables_and_lists_convert() {
        let nodes = convert_fragment(
            "<table><thead><tr><th align=\"right\">a</th><th>b</th></tr></thead>\
             <tbody><tr><td><b>1</b></td><td>2</td></tr></tbody></table>",
        );
        let table = nodes[0].as_element().unwrap();
        assert_eq!(table.kind, ElementKind::Table);
        assert_eq!(
            crate::table::table_strings(table),
            vec![vec!["a".to_string(), "b".into()], vec!["1".into(), "2".into()]]
        );
        assert_eq!(crate::table::column_aligns(table)[0], Some(Align::Right));

        let nodes = convert_fragment("<ol start=\"3\"><li>x</li><li>y</li></ol>");
        let list = nodes[0].as_element().unwrap();
        assert_eq!(list.list_kind(), Some(ListKind::Ordered));
        assert_eq!(list.attr_u64(attr::START), Some(3));
        assert_eq!(list.children.len(), 2);
    }

    #[test]
    fn unknown_standard_tag_is_kept_as_rendered_html() {
        let HtmlBlock::Nodes(nodes) = convert_block("<details><summary>s</summary>body</details>") else {
            panic!("expected nodes");
        };
        // details is a container: its text becomes a paragraph.
        assert_eq!(nodes[0].kind(), Some(ElementKind::Paragraph));
        let HtmlBlock::Nodes(nodes) = convert_block("<center>x</center>") else {
            panic!("expected nodes");
        };
        let code = nodes[0].as_element().unwrap();
        assert_eq!(code.attr_str(attr::LANGUAGE), Some("html"));
        assert!(code.attr_bool(attr::RENDER));
    }
}
