use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EditorError;
use crate::ops::Path;

pub type Attrs = BTreeMap<String, Value>;

pub mod attr {
    pub const LEVEL: &str = "level";
    pub const ORDERED: &str = "ordered";
    pub const TASK: &str = "task";
    pub const START: &str = "start";
    pub const CHECKED: &str = "checked";
    pub const LANGUAGE: &str = "language";
    pub const FINISHED: &str = "finished";
    pub const RENDER: &str = "render";
    pub const URL: &str = "url";
    pub const ALT: &str = "alt";
    pub const MEDIA_TYPE: &str = "media_type";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const ALIGN: &str = "align";
    pub const CONTROLS: &str = "controls";
    pub const AUTOPLAY: &str = "autoplay";
    pub const LOOP: &str = "loop";
    pub const MUTED: &str = "muted";
    pub const CONFIG: &str = "config";
    pub const CONTEXT_PROPS: &str = "context_props";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph,
    Heading,
    List,
    ListItem,
    Blockquote,
    CodeBlock,
    Table,
    TableRow,
    TableCell,
    Media,
    Break,
    HorizontalRule,
    Frontmatter,
    Chart,
}

impl ElementKind {
    pub fn is_void(self) -> bool {
        matches!(
            self,
            ElementKind::Media | ElementKind::Break | ElementKind::HorizontalRule | ElementKind::Chart
        )
    }

    pub fn is_inline(self) -> bool {
        matches!(self, ElementKind::Break)
    }

    /// Elements whose children are text leaves and inline elements.
    pub fn holds_inline(self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading
                | ElementKind::CodeBlock
                | ElementKind::Frontmatter
        )
    }

    /// Elements whose text is stored verbatim in a single leaf.
    pub fn is_literal(self) -> bool {
        matches!(self, ElementKind::CodeBlock | ElementKind::Frontmatter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Unordered,
    Ordered,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Iframe,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Iframe => "iframe",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "img" | "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            "audio" => Some(MediaType::Audio),
            "iframe" => Some(MediaType::Iframe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Set on a bold span whose closing delimiter has not arrived yet.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unfinished: bool,
}

impl Marks {
    pub fn is_empty(&self) -> bool {
        self == &Marks::default()
    }

    /// Formatting that autoformat rules refuse to stack on top of.
    pub fn is_dirty(&self) -> bool {
        self.bold
            || self.italic
            || self.strikethrough
            || self.code
            || self.text_color.is_some()
            || self.link.is_some()
    }

    pub fn bold() -> Self {
        Marks {
            bold: true,
            ..Marks::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

impl MarkKind {
    pub fn is_set(self, marks: &Marks) -> bool {
        match self {
            MarkKind::Bold => marks.bold,
            MarkKind::Italic => marks.italic,
            MarkKind::Underline => marks.underline,
            MarkKind::Strikethrough => marks.strikethrough,
            MarkKind::Code => marks.code,
        }
    }

    pub fn set(self, marks: &mut Marks, on: bool) {
        match self {
            MarkKind::Bold => marks.bold = on,
            MarkKind::Italic => marks.italic = on,
            MarkKind::Underline => marks.underline = on,
            MarkKind::Strikethrough => marks.strikethrough = on,
            MarkKind::Code => marks.code = on,
        }
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    pub fn element(kind: ElementKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode::new(kind).with_children(children))
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element(ElementKind::Paragraph, vec![Node::text(text)])
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Node::Element(
            ElementNode::new(ElementKind::Heading)
                .with_attr(attr::LEVEL, level)
                .with_children(vec![Node::text(text)]),
        )
    }

    pub fn void(kind: ElementKind) -> Self {
        Node::element(kind, vec![Node::text("")])
    }

    pub fn horizontal_rule() -> Self {
        Node::void(ElementKind::HorizontalRule)
    }

    pub fn code_block(language: Option<&str>, code: impl Into<String>) -> Self {
        let mut el = ElementNode::new(ElementKind::CodeBlock).with_children(vec![Node::text(code)]);
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            el.set_attr(attr::LANGUAGE, language);
        }
        Node::Element(el)
    }

    pub fn media(media_type: MediaType, url: impl Into<String>) -> Self {
        Node::Element(
            ElementNode::new(ElementKind::Media)
                .with_attr(attr::MEDIA_TYPE, media_type.as_str())
                .with_attr(attr::URL, url.into())
                .with_children(vec![Node::text("")]),
        )
    }

    pub fn list(kind: ListKind, items: Vec<Node>) -> Self {
        Node::Element(ElementNode::list(kind).with_children(items))
    }

    pub fn list_item(blocks: Vec<Node>) -> Self {
        Node::element(ElementKind::ListItem, blocks)
    }

    pub fn blockquote(blocks: Vec<Node>) -> Self {
        Node::element(ElementKind::Blockquote, blocks)
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    pub fn kind(&self) -> Option<ElementKind> {
        self.as_element().map(|el| el.kind)
    }

    pub fn is_kind(&self, kind: ElementKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.children,
            Node::Text(_) => &[],
        }
    }

    /// Concatenated text of every leaf below this node.
    pub fn string(&self) -> String {
        let mut out = String::new();
        self.collect_string(&mut out);
        out
    }

    fn collect_string(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_string(out);
                }
            }
        }
    }
}

impl ElementNode {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            attrs: Attrs::default(),
            children: Vec::new(),
        }
    }

    pub fn list(kind: ListKind) -> Self {
        let mut el = ElementNode::new(ElementKind::List);
        match kind {
            ListKind::Unordered => {}
            ListKind::Ordered => el.set_attr(attr::ORDERED, true),
            ListKind::Task => el.set_attr(attr::TASK, true),
        }
        el
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn attr_bool(&self, key: &str) -> bool {
        self.attrs.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attrs.get(key).and_then(Value::as_u64)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn heading_level(&self) -> Option<u8> {
        if self.kind != ElementKind::Heading {
            return None;
        }
        Some(self.attr_u64(attr::LEVEL).unwrap_or(1).clamp(1, 4) as u8)
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        if self.kind != ElementKind::List {
            return None;
        }
        Some(if self.attr_bool(attr::TASK) {
            ListKind::Task
        } else if self.attr_bool(attr::ORDERED) {
            ListKind::Ordered
        } else {
            ListKind::Unordered
        })
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.attr_str(attr::MEDIA_TYPE).and_then(MediaType::from_tag)
    }

    pub fn string(&self) -> String {
        self.children.iter().map(Node::string).collect()
    }
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn get(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for &ix in rest {
            node = node.as_element()?.children.get(ix)?;
        }
        Some(node)
    }

    pub fn node(&self, path: &[usize]) -> Result<&Node, EditorError> {
        self.get(path)
            .ok_or_else(|| EditorError::PathNotFound(path.to_vec()))
    }

    pub fn element(&self, path: &[usize]) -> Result<&ElementNode, EditorError> {
        self.node(path)?
            .as_element()
            .ok_or_else(|| EditorError::invalid(format!("node at {path:?} is not an element")))
    }

    pub fn leaf(&self, path: &[usize]) -> Option<&TextNode> {
        self.get(path)?.as_text()
    }

    pub fn has_path(&self, path: &[usize]) -> bool {
        self.get(path).is_some()
    }

    pub fn get_mut(&mut self, path: &[usize]) -> Result<&mut Node, EditorError> {
        let not_found = || EditorError::PathNotFound(path.to_vec());
        let (first, rest) = path.split_first().ok_or_else(not_found)?;
        let mut node = self.children.get_mut(*first).ok_or_else(not_found)?;
        for &ix in rest {
            node = match node {
                Node::Element(el) => el.children.get_mut(ix).ok_or_else(not_found)?,
                Node::Text(_) => return Err(not_found()),
            };
        }
        Ok(node)
    }

    pub fn children_at(&self, parent: &[usize]) -> Option<&[Node]> {
        if parent.is_empty() {
            return Some(&self.children);
        }
        match self.get(parent)? {
            Node::Element(el) => Some(&el.children),
            Node::Text(_) => None,
        }
    }

    pub fn children_mut(&mut self, parent: &[usize]) -> Result<&mut Vec<Node>, EditorError> {
        if parent.is_empty() {
            return Ok(&mut self.children);
        }
        match self.get_mut(parent)? {
            Node::Element(el) => Ok(&mut el.children),
            Node::Text(_) => Err(EditorError::invalid(format!(
                "text node at {parent:?} has no children"
            ))),
        }
    }

    /// The parent element of `path`, `None` when the parent is the document root.
    pub fn parent(&self, path: &[usize]) -> Result<(Option<&ElementNode>, Path), EditorError> {
        let (_, parent) = path
            .split_last()
            .ok_or_else(|| EditorError::PathNotFound(path.to_vec()))?;
        if parent.is_empty() {
            return Ok((None, Vec::new()));
        }
        Ok((Some(self.element(parent)?), parent.to_vec()))
    }

    pub fn next(&self, path: &[usize]) -> Option<Path> {
        let next = crate::path::next(path)?;
        self.has_path(&next).then_some(next)
    }

    pub fn previous(&self, path: &[usize]) -> Option<Path> {
        let prev = crate::path::previous(path)?;
        self.has_path(&prev).then_some(prev)
    }

    pub fn string(&self, path: &[usize]) -> String {
        self.get(path).map(Node::string).unwrap_or_default()
    }

    /// Deepest ancestor of `path` (inclusive) that is an element of `kind`.
    pub fn ancestor_of_kind(&self, path: &[usize], kind: ElementKind) -> Option<Path> {
        let mut current = path.to_vec();
        while !current.is_empty() {
            if self.get(&current).is_some_and(|n| n.is_kind(kind)) {
                return Some(current);
            }
            current.pop();
        }
        None
    }

    /// The element directly holding the leaf at `path`.
    pub fn text_block_of(&self, leaf_path: &[usize]) -> Option<Path> {
        let mut current = leaf_path.to_vec();
        while !current.is_empty() {
            if let Some(Node::Element(el)) = self.get(&current) {
                if el.kind.holds_inline() || el.kind.is_void() && !el.kind.is_inline() {
                    return Some(current);
                }
            }
            current.pop();
        }
        None
    }

    pub fn texts(&self) -> Vec<(Path, &TextNode)> {
        let mut out = Vec::new();
        collect_texts(&self.children, &mut Vec::new(), &mut out);
        out
    }

    pub fn texts_under(&self, path: &[usize]) -> Vec<(Path, &TextNode)> {
        let mut out = Vec::new();
        match self.get(path) {
            Some(Node::Text(t)) => out.push((path.to_vec(), t)),
            Some(Node::Element(el)) => collect_texts(&el.children, &mut path.to_vec(), &mut out),
            None => {}
        }
        out
    }

    pub fn first_text_point(&self, path: &[usize]) -> Option<crate::selection::Point> {
        let (path, _) = self.texts_under(path).into_iter().next()?;
        Some(crate::selection::Point::new(path, 0))
    }

    pub fn last_text_point(&self, path: &[usize]) -> Option<crate::selection::Point> {
        let (path, leaf) = self.texts_under(path).into_iter().last()?;
        Some(crate::selection::Point::new(path, leaf.text.len()))
    }

    pub fn start_point(&self) -> Option<crate::selection::Point> {
        let (path, _) = self.texts().into_iter().next()?;
        Some(crate::selection::Point::new(path, 0))
    }

    pub fn end_point(&self) -> Option<crate::selection::Point> {
        let (path, leaf) = self.texts().into_iter().last()?;
        Some(crate::selection::Point::new(path, leaf.text.len()))
    }

    /// Last text position strictly before the subtree rooted at `path`.
    pub fn point_before(&self, path: &[usize]) -> Option<crate::selection::Point> {
        let mut current = path.to_vec();
        while let Some(last) = current.last().copied() {
            if last > 0 {
                let len = current.len();
                current[len - 1] = last - 1;
                if let Some(point) = self.last_text_point(&current) {
                    return Some(point);
                }
                continue;
            }
            current.pop();
        }
        None
    }

    /// First text position at or after `path` in document order.
    pub fn point_from(&self, path: &[usize]) -> Option<crate::selection::Point> {
        let mut current = path.to_vec();
        while !current.is_empty() {
            if self.has_path(&current) {
                if let Some(point) = self.first_text_point(&current) {
                    return Some(point);
                }
                let len = current.len();
                current[len - 1] += 1;
                continue;
            }
            current.pop();
            if let Some(last) = current.last_mut() {
                *last += 1;
            }
        }
        None
    }
}

fn collect_texts<'a>(children: &'a [Node], path: &mut Path, out: &mut Vec<(Path, &'a TextNode)>) {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        match node {
            Node::Text(t) => out.push((path.clone(), t)),
            Node::Element(el) => collect_texts(&el.children, path, out),
        }
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Node::paragraph("a"),
            Node::list(
                ListKind::Unordered,
                vec![
                    Node::list_item(vec![Node::paragraph("b")]),
                    Node::list_item(vec![Node::paragraph("c")]),
                ],
            ),
            Node::horizontal_rule(),
        ])
    }

    #[test]
    fn navigates_by_path() {
        let doc = sample();
        assert_eq!(doc.string(&[1, 1]), "c");
        assert!(doc.has_path(&[1, 0, 0, 0]));
        assert!(!doc.has_path(&[1, 2]));
        assert_eq!(doc.next(&[1, 0]), Some(vec![1, 1]));
        assert_eq!(doc.next(&[1, 1]), None);
        assert_eq!(doc.previous(&[1, 0]), None);
        let (parent, parent_path) = doc.parent(&[1, 0, 0]).unwrap();
        assert_eq!(parent.map(|el| el.kind), Some(ElementKind::ListItem));
        assert_eq!(parent_path, vec![1, 0]);
        assert!(doc.parent(&[0]).unwrap().0.is_none());
    }

    #[test]
    fn finds_neighbouring_text_points() {
        let doc = sample();
        let before = doc.point_before(&[1, 1]).unwrap();
        assert_eq!(before.path, vec![1, 0, 0, 0]);
        assert_eq!(before.offset, 1);
        let from = doc.point_from(&[1, 2]).unwrap();
        assert_eq!(from.path, vec![2, 0]);
        assert!(doc.point_before(&[0]).is_none());
    }

    #[test]
    fn list_kind_follows_attrs() {
        let el = ElementNode::list(ListKind::Task);
        assert_eq!(el.list_kind(), Some(ListKind::Task));
        assert_eq!(ElementNode::list(ListKind::Ordered).list_kind(), Some(ListKind::Ordered));
        assert_eq!(ElementNode::new(ElementKind::Paragraph).list_kind(), None);
    }

    #[test]
    fn node_json_shape_is_tagged() {
        let json = serde_json::to_value(Node::paragraph("x")).unwrap();
        assert_eq!(json["node"], "element");
        assert_eq!(json["kind"], "paragraph");
        assert_eq!(json["children"][0]["text"], "x");
    }
}
