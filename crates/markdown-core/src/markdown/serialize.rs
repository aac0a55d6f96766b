use crate::node::{
    Document, ElementKind, ElementNode, ListKind, Marks, MediaType, Node, TextNode, attr,
};
use crate::table::{Align, column_aligns};

use super::preprocess::WRAPPER_LANGUAGES;

/// Keeps two adjacent lists from merging when the output is parsed again.
const LIST_SEPARATOR: &str = "<!-- -->";

/// Writes a document back to markdown. Parsing the result gives the same
/// tree, apart from `finished` flags on streamed content.
pub fn serialize(doc: &Document) -> String {
    if let [only] = doc.children.as_slice() {
        if only.is_kind(ElementKind::Paragraph) && only.children().iter().all(is_empty_leaf) {
            return String::new();
        }
    }
    let mut out = blocks(&doc.children);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn is_empty_leaf(node: &Node) -> bool {
    node.as_text().is_some_and(|leaf| leaf.text.is_empty())
}

fn blocks(nodes: &[Node]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(nodes.len());
    let mut previous: Option<&Node> = None;
    for node in nodes {
        if previous.is_some_and(|p| p.is_kind(ElementKind::List)) && node.is_kind(ElementKind::List) {
            parts.push(LIST_SEPARATOR.to_string());
        }
        parts.push(block(node));
        previous = Some(node);
    }
    parts.join("\n\n")
}

fn block(node: &Node) -> String {
    let el = match node {
        Node::Element(el) => el,
        Node::Text(_) => return inline(std::slice::from_ref(node)),
    };
    let body = match el.kind {
        ElementKind::Paragraph => paragraph(el),
        ElementKind::Heading => heading(el),
        ElementKind::List => list(el),
        ElementKind::ListItem | ElementKind::TableRow | ElementKind::TableCell => blocks(&el.children),
        ElementKind::Blockquote => prefix_lines(&blocks(&el.children), "> ", "> "),
        ElementKind::CodeBlock => code_block(el),
        ElementKind::Table => table(el),
        ElementKind::Media => media(el),
        ElementKind::Break => "<br/>".to_string(),
        ElementKind::HorizontalRule => "***".to_string(),
        ElementKind::Frontmatter => format!("---\n{}\n---", el.string()),
        ElementKind::Chart => chart(el),
    };
    match el.attrs.get(attr::CONTEXT_PROPS) {
        Some(props) => format!("<!-- {props} -->\n{body}"),
        None => body,
    }
}

fn paragraph(el: &ElementNode) -> String {
    let text = inline(&el.children);
    if let Some(align) = el.attr_str(attr::ALIGN) {
        return format!("<p align=\"{align}\">{text}</p>");
    }
    if text.is_empty() { "<br/>".to_string() } else { text }
}

fn heading(el: &ElementNode) -> String {
    let level = el.heading_level().unwrap_or(1);
    let text = inline(&el.children);
    match el.attr_str(attr::ALIGN) {
        Some(align) => format!("<h{level} align=\"{align}\">{text}</h{level}>"),
        None => format!("{} {}", "#".repeat(level as usize), text),
    }
}

fn code_block(el: &ElementNode) -> String {
    let code = el.string();
    match el.attr_str(attr::LANGUAGE) {
        Some("math") => format!("$$\n{code}\n$$"),
        Some(language) if WRAPPER_LANGUAGES.contains(&language) => {
            format!("<{language}>\n{code}\n</{language}>")
        }
        Some("html") if el.attr_bool(attr::RENDER) => code,
        language => {
            let fence = "`".repeat(longest_run(&code, '`').max(2) + 1);
            format!("{fence}{}\n{code}\n{fence}", language.unwrap_or_default())
        }
    }
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    text.split('\n')
        .enumerate()
        .map(|(ix, line)| {
            let prefix = if ix == 0 { first } else { rest };
            if line.is_empty() {
                prefix.trim_end().to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn list(el: &ElementNode) -> String {
    let kind = el.list_kind().unwrap_or(ListKind::Unordered);
    let start = el.attr_u64(attr::START).unwrap_or(1);
    let mut loose = false;
    let items: Vec<String> = el
        .children
        .iter()
        .enumerate()
        .map(|(ix, item)| {
            let checked = item.as_element().is_some_and(|it| it.attr_bool(attr::CHECKED));
            let marker = match kind {
                ListKind::Unordered => "-".to_string(),
                ListKind::Ordered => format!("{}.", start + ix as u64),
                ListKind::Task => format!("- [{}]", if checked { "x" } else { " " }),
            };
            let indent = match kind {
                ListKind::Task => 2,
                _ => marker.len() + 1,
            };
            let (body, item_loose) = item_body(item.children());
            loose |= item_loose;
            let first = format!("{marker} ");
            prefix_lines(&body, &first, &" ".repeat(indent))
        })
        .collect();
    items.join(if loose { "\n\n" } else { "\n" })
}

// Nested lists follow their paragraph on the next line. Any other second
// block makes the whole list loose.
fn item_body(children: &[Node]) -> (String, bool) {
    let mut out = String::new();
    let mut loose = false;
    for (ix, child) in children.iter().enumerate() {
        if ix > 0 {
            if child.is_kind(ElementKind::List) {
                out.push('\n');
            } else {
                loose = true;
                out.push_str("\n\n");
            }
        }
        out.push_str(&block(child));
    }
    (out, loose)
}

fn table(el: &ElementNode) -> String {
    let cols = el
        .children
        .iter()
        .map(|row| row.children().len())
        .max()
        .unwrap_or(0)
        .max(1);
    let mut aligns = column_aligns(el);
    aligns.resize(cols, None);
    let row_line = |row: &Node| {
        let mut cells: Vec<String> = row.children().iter().map(cell).collect();
        cells.resize(cols, String::new());
        format!("| {} |", cells.join(" | "))
    };
    let mut lines = Vec::with_capacity(el.children.len() + 1);
    if let Some(header) = el.children.first() {
        lines.push(row_line(header));
    }
    let delimiter: Vec<&str> = aligns
        .iter()
        .map(|align| match align {
            None => "---",
            Some(Align::Left) => ":---",
            Some(Align::Center) => ":---:",
            Some(Align::Right) => "---:",
        })
        .collect();
    lines.push(format!("| {} |", delimiter.join(" | ")));
    lines.extend(el.children.iter().skip(1).map(row_line));
    lines.join("\n")
}

fn cell(node: &Node) -> String {
    node.children()
        .iter()
        .map(|block| match block {
            Node::Element(el) if el.kind.holds_inline() && !el.kind.is_literal() => inline(&el.children),
            other => other.string(),
        })
        .collect::<Vec<_>>()
        .join("<br/>")
        .replace('|', "\\|")
        .replace('\n', "<br/>")
}

fn media(el: &ElementNode) -> String {
    let media_type = el.media_type().unwrap_or(MediaType::Image);
    let url = el.attr_str(attr::URL).unwrap_or_default();
    let alt = el.attr_str(attr::ALT).unwrap_or_default();
    let sized = [attr::WIDTH, attr::HEIGHT, attr::ALIGN]
        .iter()
        .any(|key| el.attrs.contains_key(*key));
    if media_type == MediaType::Image && !sized {
        return format!("![{}]({})", escape_inline(alt), link_destination(url));
    }
    let mut tag = format!("src=\"{}\"", escape_attr(url));
    if !alt.is_empty() {
        tag.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
    }
    for (key, name) in [(attr::WIDTH, "width"), (attr::HEIGHT, "height"), (attr::ALIGN, "align")] {
        if let Some(value) = el.attrs.get(key) {
            let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            tag.push_str(&format!(" {name}=\"{}\"", escape_attr(&value)));
        }
    }
    for flag in [attr::CONTROLS, attr::AUTOPLAY, attr::LOOP, attr::MUTED] {
        if el.attr_bool(flag) {
            tag.push(' ');
            tag.push_str(flag);
        }
    }
    match media_type {
        MediaType::Image => format!("<img {tag} />"),
        MediaType::Video => format!("<video {tag}>\n</video>"),
        MediaType::Audio => format!("<audio {tag}>\n</audio>"),
        MediaType::Iframe => format!("<iframe {tag}>\n</iframe>"),
    }
}

fn chart(el: &ElementNode) -> String {
    let config = el
        .attrs
        .get(attr::CONFIG)
        .cloned()
        .unwrap_or(serde_json::Value::Array(Vec::new()));
    format!("<!-- {config} -->")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn link_destination(url: &str) -> String {
    if url.contains([' ', '(', ')', '<', '>']) {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

fn inline(children: &[Node]) -> String {
    let mut out = String::new();
    let mut ix = 0;
    while ix < children.len() {
        match &children[ix] {
            Node::Text(leaf) => {
                let Some(url) = leaf.marks.link.as_deref() else {
                    out.push_str(&leaf_markdown(leaf, ix == 0));
                    ix += 1;
                    continue;
                };
                // One link spans every adjacent leaf pointing at the same url.
                let mut label = String::new();
                while let Some(Node::Text(next)) = children.get(ix) {
                    if next.marks.link.as_deref() != Some(url) {
                        break;
                    }
                    label.push_str(&leaf_markdown(&unlinked(next), false));
                    ix += 1;
                }
                if !label.is_empty() {
                    out.push_str(&format!("[{label}]({})", link_destination(url)));
                }
            }
            Node::Element(el) => {
                if el.kind == ElementKind::Break {
                    out.push_str("<br/>");
                } else {
                    out.push_str(&escape_inline(&el.string()));
                }
                ix += 1;
            }
        }
    }
    out
}

fn unlinked(leaf: &TextNode) -> TextNode {
    TextNode {
        text: leaf.text.clone(),
        marks: Marks {
            link: None,
            ..leaf.marks.clone()
        },
    }
}

fn leaf_markdown(leaf: &TextNode, at_line_start: bool) -> String {
    let marks = &leaf.marks;
    if leaf.text.is_empty() {
        return String::new();
    }
    if marks.code {
        return wrap_marks(code_span(&leaf.text), leaf);
    }
    let text = escape_text(&leaf.text, at_line_start);
    if marks.is_empty() || text.trim().is_empty() {
        return text;
    }
    // Emphasis delimiters may not sit next to whitespace on the inside.
    let body = text.trim();
    let start = text.len() - text.trim_start().len();
    let lead = &text[..start];
    let trail = &text[start + body.len()..];
    format!("{lead}{}{trail}", wrap_marks(body.to_string(), leaf))
}

fn wrap_marks(mut s: String, leaf: &TextNode) -> String {
    let marks = &leaf.marks;
    if marks.bold && marks.italic {
        s = format!("***{s}***");
    } else if marks.bold {
        s = format!("**{s}**");
    } else if marks.italic {
        s = format!("*{s}*");
    }
    if marks.strikethrough {
        s = format!("~~{s}~~");
    }
    if marks.underline {
        s = format!("<u>{s}</u>");
    }
    if let Some(color) = &marks.text_color {
        s = format!("<span style=\"color: {}\">{s}</span>", escape_attr(color));
    }
    s
}

fn code_span(code: &str) -> String {
    let ticks = "`".repeat(longest_run(code, '`') + 1);
    if code.starts_with(['`', ' ']) || code.ends_with(['`', ' ']) {
        format!("{ticks} {code} {ticks}")
    } else {
        format!("{ticks}{code}{ticks}")
    }
}

fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '&' | '~') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn escape_text(text: &str, at_line_start: bool) -> String {
    text.split('\n')
        .enumerate()
        .map(|(ix, line)| {
            if at_line_start || ix > 0 {
                escape_line_start(line)
            } else {
                escape_inline(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// Characters that would open a block construct at the start of a line.
fn escape_line_start(line: &str) -> String {
    let content = line.trim_start();
    let indent = &line[..line.len() - content.len()];
    let digits = content.chars().take_while(char::is_ascii_digit).count();
    let mut out = String::from(indent);
    if digits > 0 && content[digits..].starts_with(['.', ')']) {
        out.push_str(&content[..digits]);
        out.push('\\');
        out.push_str(&escape_inline(&content[digits..]));
        return out;
    }
    if content.starts_with(['#', '>', '|', '!', '+', '-', '=', '$']) {
        out.push('\\');
    }
    out.push_str(&escape_inline(content));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn emphasis_keeps_whitespace_outside_delimiters() {
        let leaf = TextNode {
            text: " bold ".into(),
            marks: Marks::bold(),
        };
        assert_eq!(leaf_markdown(&leaf, false), " **bold** ");
    }

    #[test]
    fn adjacent_linked_leaves_share_one_link() {
        let linked = |text: &str, italic: bool| {
            Node::marked(
                text,
                Marks {
                    italic,
                    link: Some("u".into()),
                    ..Marks::default()
                },
            )
        };
        let children = vec![
            Node::text("a "),
            linked("link ", false),
            linked("it", true),
            Node::text(" b"),
        ];
        assert_eq!(inline(&children), "a [link *it*](u) b");
    }

    #[test]
    fn block_markers_are_escaped_at_line_start() {
        assert_eq!(escape_text("# not a heading", true), "\\# not a heading");
        assert_eq!(escape_text("2024. a year", true), "2024\\. a year");
        assert_eq!(escape_text("a *b*", false), "a \\*b\\*");
    }

    #[test]
    fn fences_outgrow_backticks_in_the_code() {
        let node = Node::code_block(Some("md"), "```\nx\n```");
        let Node::Element(el) = node else { unreachable!() };
        assert_eq!(code_block(&el), "````md\n```\nx\n```\n````");
    }

    #[test]
    fn adjacent_lists_are_kept_apart() {
        let item = |t: &str| Node::list_item(vec![Node::paragraph(t)]);
        let doc = Document::new(vec![
            Node::list(ListKind::Unordered, vec![item("a")]),
            Node::list(ListKind::Unordered, vec![item("b")]),
        ]);
        assert_eq!(serialize(&doc), "- a\n\n<!-- -->\n\n- b\n");
    }
}
