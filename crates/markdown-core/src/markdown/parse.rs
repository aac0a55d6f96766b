use std::ops::Range;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag};
use serde_json::Value;

use crate::node::{ElementKind, ElementNode, ListKind, Marks, MediaType, Node, attr};
use crate::table::Align;

use super::html::{self, HtmlBlock};
use super::inline_html::{InlineHtml, Layer, TagStack};
use super::preprocess::{WRAPPER_LANGUAGES, restore_fences};

pub fn options(at_document_start: bool) -> Options {
    let mut options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_MATH;
    if at_document_start {
        options |= Options::ENABLE_YAML_STYLE_METADATA_BLOCKS;
    }
    options
}

/// Parses preprocessed markdown into blocks that still need normalizing.
/// The second value carries properties from a trailing JSON comment that
/// had no block after it.
pub fn parse_blocks(text: &str, at_document_start: bool) -> (Vec<Node>, Option<Value>) {
    parse_blocks_with_props(text, at_document_start, None)
}

/// Like [`parse_blocks`], with properties left over from a previous slice
/// applied to the first block.
pub fn parse_blocks_with_props(
    text: &str,
    at_document_start: bool,
    carried: Option<Value>,
) -> (Vec<Node>, Option<Value>) {
    let mut builder = Builder::new(text, carried);
    for (event, range) in Parser::new_ext(text, options(at_document_start)).into_offset_iter() {
        builder.event(event, range);
    }
    builder.finish()
}

#[derive(Debug, Default)]
struct BlockFrame {
    /// `None` for the root and for containers that pass their children up.
    el: Option<ElementNode>,
    children: Vec<Node>,
    props: Option<Value>,
    aligns: Vec<Option<Align>>,
}

impl BlockFrame {
    fn element(el: ElementNode) -> Self {
        Self {
            el: Some(el),
            ..Self::default()
        }
    }

    fn push(&mut self, mut node: Node) {
        if let (Some(props), Node::Element(el)) = (self.props.take(), &mut node) {
            el.set_attr(attr::CONTEXT_PROPS, props);
        }
        self.children.push(node);
    }

    fn finish(self) -> Vec<Node> {
        match self.el {
            Some(mut el) => {
                el.children = self.children;
                if el.kind == ElementKind::ListItem && el.children.is_empty() {
                    el.children.push(Node::paragraph(""));
                }
                vec![Node::Element(el)]
            }
            None => self.children,
        }
    }
}

#[derive(Debug)]
enum Open {
    Layer(Layer),
    Image { url: String, alt: String },
}

#[derive(Debug)]
struct InlineFrame {
    el: ElementNode,
    /// Set for table cells: the paragraph gets wrapped in this.
    cell: Option<ElementNode>,
    /// Opened for bare inline content in a tight list item.
    implicit: bool,
    nodes: Vec<Node>,
    /// Blocks split out of the running text, in order.
    blocks: Vec<Node>,
    open: Vec<Open>,
    html: TagStack,
}

impl InlineFrame {
    fn new(el: ElementNode, implicit: bool) -> Self {
        Self {
            el,
            cell: None,
            implicit,
            nodes: Vec::new(),
            blocks: Vec::new(),
            open: Vec::new(),
            html: TagStack::default(),
        }
    }

    fn marks(&self) -> Marks {
        let mut marks = Marks::default();
        for open in &self.open {
            if let Open::Layer(layer) = open {
                layer.apply(&mut marks);
            }
        }
        self.html.apply(&mut marks);
        marks
    }

    fn alt_capture(&mut self) -> Option<&mut String> {
        self.open.iter_mut().rev().find_map(|open| match open {
            Open::Image { alt, .. } => Some(alt),
            Open::Layer(_) => None,
        })
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(alt) = self.alt_capture() {
            alt.push_str(text);
            return;
        }
        let marks = self.marks();
        if let Some(Node::Text(last)) = self.nodes.last_mut() {
            if last.marks == marks {
                last.text.push_str(text);
                return;
            }
        }
        self.nodes.push(Node::marked(text, marks));
    }

    fn push_node(&mut self, node: Node) {
        if self.alt_capture().is_none() {
            self.nodes.push(node);
        }
    }

    fn close_layer(&mut self) {
        if let Some(Open::Image { url, alt }) = self.open.pop() {
            let mut media = ElementNode::new(ElementKind::Media)
                .with_attr(attr::MEDIA_TYPE, MediaType::Image.as_str())
                .with_attr(attr::URL, url)
                .with_children(vec![Node::text("")]);
            if !alt.is_empty() {
                media.set_attr(attr::ALT, alt);
            }
            self.split_off(Node::Element(media));
        }
    }

    // Ends the running text here and places `block` after it.
    fn split_off(&mut self, block: Node) {
        let nodes = trim_run(std::mem::take(&mut self.nodes));
        if !is_blank(&nodes) {
            let mut el = self.el.clone();
            el.children = nodes;
            self.blocks.push(Node::Element(el));
        }
        self.blocks.push(block);
    }

    fn finish(self) -> Vec<Node> {
        let InlineFrame {
            mut el,
            cell,
            nodes,
            mut blocks,
            ..
        } = self;
        let nodes = if blocks.is_empty() { nodes } else { trim_run(nodes) };
        if !is_blank(&nodes) || blocks.is_empty() {
            el.children = nodes;
            blocks.push(Node::Element(el));
        }
        match cell {
            Some(mut cell) => {
                cell.children = blocks;
                vec![Node::Element(cell)]
            }
            None => blocks,
        }
    }
}

fn is_blank(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .all(|node| node.as_text().is_some_and(|t| t.text.trim().is_empty()))
}

// Drops the whitespace left at the edges of a run that was split.
fn trim_run(mut nodes: Vec<Node>) -> Vec<Node> {
    if let Some(Node::Text(first)) = nodes.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    nodes
}

fn break_node() -> Node {
    Node::element(ElementKind::Break, vec![Node::text("")])
}

fn align_of(alignment: &Alignment) -> Option<Align> {
    match alignment {
        Alignment::None => None,
        Alignment::Left => Some(Align::Left),
        Alignment::Center => Some(Align::Center),
        Alignment::Right => Some(Align::Right),
    }
}

/// Whether a fenced block's source ends with a closing fence.
fn fence_closed(source: &str) -> bool {
    let strip = |line: &str| {
        line.trim_start_matches(|c: char| c == '>' || c.is_whitespace())
            .trim_end()
            .to_string()
    };
    let mut lines = source.trim_end().lines();
    let Some(first) = lines.next().map(strip) else {
        return false;
    };
    let Some(fence_char) = first.chars().next() else {
        return false;
    };
    let fence_len = first.chars().take_while(|c| *c == fence_char).count();
    let Some(last) = lines.last().map(strip) else {
        return false;
    };
    last.chars().count() >= fence_len && last.chars().all(|c| c == fence_char)
}

#[derive(Debug)]
enum Frame {
    Blocks(BlockFrame),
    Inline(InlineFrame),
    Literal { el: ElementNode, text: String },
    Html(String),
}

struct Builder<'a> {
    source: &'a str,
    stack: Vec<Frame>,
}

impl<'a> Builder<'a> {
    fn new(source: &'a str, carried: Option<Value>) -> Self {
        Self {
            source,
            stack: vec![Frame::Blocks(BlockFrame {
                props: carried,
                ..BlockFrame::default()
            })],
        }
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.with_inline(|frame| {
                frame.open.push(Open::Layer(Layer::Code));
                frame.push_text(&code);
                frame.open.pop();
            }),
            Event::InlineMath(math) => self.text(&format!("${math}$")),
            Event::DisplayMath(math) => {
                let block = Node::code_block(Some("math"), math.trim_matches('\n'));
                self.with_inline(|frame| frame.split_off(block));
            }
            Event::Html(raw) => {
                if let Some(Frame::Html(buf)) = self.stack.last_mut() {
                    buf.push_str(&raw);
                } else {
                    self.inline_html(&raw);
                }
            }
            Event::InlineHtml(raw) => self.inline_html(&raw),
            Event::SoftBreak => self.text("\n"),
            Event::HardBreak => self.with_inline(|frame| frame.push_node(break_node())),
            Event::Rule => self.push_block(Node::horizontal_rule()),
            Event::TaskListMarker(checked) => self.task_marker(checked),
            _ => {}
        }
    }

    fn with_inline(&mut self, f: impl FnOnce(&mut InlineFrame)) {
        if let Some(Frame::Inline(frame)) = self.stack.last_mut() {
            f(frame);
            return;
        }
        let mut frame = InlineFrame::new(ElementNode::new(ElementKind::Paragraph), true);
        f(&mut frame);
        self.stack.push(Frame::Inline(frame));
    }

    fn text(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(Frame::Literal { text: buf, .. }) | Some(Frame::Html(buf)) => buf.push_str(text),
            _ => self.with_inline(|frame| frame.push_text(text)),
        }
    }

    fn inline_html(&mut self, raw: &str) {
        self.with_inline(|frame| match frame.html.feed(raw) {
            InlineHtml::Consumed => {}
            InlineHtml::Break => frame.push_node(break_node()),
            InlineHtml::Literal(text) => frame.push_text(&text),
        });
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        let layer = match tag {
            Tag::Emphasis => Layer::Italic,
            Tag::Strong => Layer::Bold,
            Tag::Strikethrough => Layer::Strikethrough,
            Tag::Link { dest_url, .. } => Layer::Link(dest_url.to_string()),
            Tag::Image { dest_url, .. } => {
                let url = dest_url.to_string();
                self.with_inline(|frame| {
                    frame.open.push(Open::Image {
                        url,
                        alt: String::new(),
                    })
                });
                return;
            }
            tag => {
                self.close_implicit();
                self.start_block(tag, range);
                return;
            }
        };
        self.with_inline(|frame| frame.open.push(Open::Layer(layer)));
    }

    fn start_block(&mut self, tag: Tag<'_>, range: Range<usize>) {
        let frame = match tag {
            Tag::Paragraph => Frame::Inline(InlineFrame::new(ElementNode::new(ElementKind::Paragraph), false)),
            Tag::Heading { level, .. } => {
                let level = (level as u8).clamp(1, 4);
                Frame::Inline(InlineFrame::new(
                    ElementNode::new(ElementKind::Heading).with_attr(attr::LEVEL, level),
                    false,
                ))
            }
            Tag::BlockQuote { .. } => Frame::Blocks(BlockFrame::element(ElementNode::new(ElementKind::Blockquote))),
            Tag::CodeBlock(kind) => {
                let mut el = ElementNode::new(ElementKind::CodeBlock);
                if let CodeBlockKind::Fenced(info) = kind {
                    if let Some(language) = info.split_whitespace().next() {
                        el.set_attr(attr::LANGUAGE, language);
                    }
                    let source = self.source.get(range).unwrap_or_default();
                    if !fence_closed(source) {
                        el.set_attr(attr::FINISHED, false);
                    }
                }
                Frame::Literal {
                    el,
                    text: String::new(),
                }
            }
            Tag::HtmlBlock => Frame::Html(String::new()),
            Tag::List(start) => {
                let kind = if start.is_some() {
                    ListKind::Ordered
                } else {
                    ListKind::Unordered
                };
                let mut el = ElementNode::list(kind);
                if let Some(start) = start.filter(|n| *n != 1) {
                    el.set_attr(attr::START, start);
                }
                Frame::Blocks(BlockFrame::element(el))
            }
            Tag::Item => Frame::Blocks(BlockFrame::element(ElementNode::new(ElementKind::ListItem))),
            Tag::Table(alignments) => Frame::Blocks(BlockFrame {
                aligns: alignments.iter().map(align_of).collect(),
                ..BlockFrame::element(ElementNode::new(ElementKind::Table))
            }),
            Tag::TableHead | Tag::TableRow => {
                Frame::Blocks(BlockFrame::element(ElementNode::new(ElementKind::TableRow)))
            }
            Tag::TableCell => {
                let mut cell = ElementNode::new(ElementKind::TableCell);
                if let Some(align) = self.header_cell_align() {
                    cell.set_attr(attr::ALIGN, align.as_str());
                }
                let mut frame = InlineFrame::new(ElementNode::new(ElementKind::Paragraph), false);
                frame.cell = Some(cell);
                Frame::Inline(frame)
            }
            Tag::MetadataBlock(_) => Frame::Literal {
                el: ElementNode::new(ElementKind::Frontmatter),
                text: String::new(),
            },
            _ => Frame::Blocks(BlockFrame::default()),
        };
        self.stack.push(frame);
    }

    // Alignment for a cell opening in the first row of the enclosing table.
    fn header_cell_align(&self) -> Option<Align> {
        let depth = self.stack.len();
        let table = depth.checked_sub(2).and_then(|ix| self.stack.get(ix));
        match (table, self.stack.last()) {
            (Some(Frame::Blocks(table)), Some(Frame::Blocks(row))) if table.children.is_empty() => {
                table.aligns.get(row.children.len()).copied().flatten()
            }
            _ => None,
        }
    }

    fn end(&mut self) {
        loop {
            let depth = self.stack.len();
            match self.stack.last_mut() {
                Some(Frame::Inline(frame)) if !frame.open.is_empty() => {
                    frame.close_layer();
                    return;
                }
                Some(Frame::Inline(frame)) if frame.implicit => self.close_top(),
                Some(_) if depth > 1 => {
                    self.close_top();
                    return;
                }
                _ => return,
            }
        }
    }

    fn close_implicit(&mut self) {
        if matches!(self.stack.last(), Some(Frame::Inline(frame)) if frame.implicit) {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let nodes = match frame {
            Frame::Blocks(block) => block.finish(),
            Frame::Inline(inline) => inline.finish(),
            Frame::Literal { el, text } => vec![literal_node(el, text)],
            Frame::Html(raw) => match html::convert_block(&raw) {
                HtmlBlock::Nodes(nodes) => nodes,
                HtmlBlock::ContextProps(props) => {
                    self.set_props(props);
                    Vec::new()
                }
                HtmlBlock::Ignored => Vec::new(),
            },
        };
        for node in nodes {
            self.push_block(node);
        }
    }

    fn push_block(&mut self, node: Node) {
        self.close_implicit();
        match self.stack.last_mut() {
            Some(Frame::Blocks(frame)) => frame.push(node),
            Some(Frame::Inline(frame)) => frame.split_off(node),
            _ => tracing::warn!("dropping block with no container to hold it"),
        }
    }

    fn set_props(&mut self, props: Value) {
        let target = self.stack.iter_mut().rev().find_map(|frame| match frame {
            Frame::Blocks(block) => Some(block),
            _ => None,
        });
        if let Some(block) = target {
            block.props = Some(props);
        }
    }

    fn task_marker(&mut self, checked: bool) {
        let is_kind = |frame: &Frame, kind: ElementKind| {
            matches!(frame, Frame::Blocks(BlockFrame { el: Some(el), .. }) if el.kind == kind)
        };
        let Some(item_ix) = self
            .stack
            .iter()
            .rposition(|frame| is_kind(frame, ElementKind::ListItem))
        else {
            return;
        };
        if let Some(Frame::Blocks(BlockFrame { el: Some(item), .. })) = self.stack.get_mut(item_ix) {
            item.set_attr(attr::CHECKED, checked);
        }
        let list = item_ix.checked_sub(1).and_then(|ix| self.stack.get_mut(ix));
        if let Some(Frame::Blocks(BlockFrame { el: Some(list), .. })) = list {
            if list.kind == ElementKind::List {
                list.set_attr(attr::TASK, true);
            }
        }
    }

    fn finish(mut self) -> (Vec<Node>, Option<Value>) {
        while self.stack.len() > 1 {
            self.close_top();
        }
        match self.stack.pop() {
            Some(Frame::Blocks(root)) => (root.children, root.props),
            _ => (Vec::new(), None),
        }
    }
}

fn literal_node(mut el: ElementNode, mut text: String) -> Node {
    if el.kind == ElementKind::Frontmatter {
        text = text.trim_end_matches('\n').to_string();
    } else if text.ends_with('\n') {
        text.pop();
    }
    let wrapper = el
        .attr_str(attr::LANGUAGE)
        .is_some_and(|language| WRAPPER_LANGUAGES.contains(&language));
    if wrapper {
        text = restore_fences(&text);
    }
    el.children = vec![Node::text(text)];
    Node::Element(el)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blocks(text: &str) -> Vec<Node> {
        parse_blocks(text, true).0
    }

    #[test]
    fn open_fence_is_unfinished() {
        assert!(fence_closed("```js\nx\n```"));
        assert!(fence_closed("> ```\n> x\n> ```"));
        assert!(!fence_closed("```js\nx"));
        assert!(!fence_closed("```"));
    }

    #[test]
    fn tight_items_get_paragraphs() {
        let nodes = blocks("- a *b*\n- c");
        let list = nodes[0].as_element().unwrap();
        let item = list.children[0].as_element().unwrap();
        let para = item.children[0].as_element().unwrap();
        assert_eq!(para.kind, ElementKind::Paragraph);
        assert_eq!(para.string(), "a b");
        assert!(para.children[1].as_text().unwrap().marks.italic);
    }

    #[test]
    fn image_inside_text_splits_the_paragraph() {
        let nodes = blocks("before ![pic](a.png) after");
        let kinds: Vec<_> = nodes.iter().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Some(ElementKind::Paragraph),
                Some(ElementKind::Media),
                Some(ElementKind::Paragraph)
            ]
        );
        let media = nodes[1].as_element().unwrap();
        assert_eq!(media.attr_str(attr::ALT), Some("pic"));
        assert_eq!(nodes[0].string(), "before");
        assert_eq!(nodes[2].string(), "after");
    }

    #[test]
    fn comment_props_land_on_next_block() {
        let nodes = blocks("<!-- {\"id\":7} -->\nhello");
        assert_eq!(nodes.len(), 1);
        let para = nodes[0].as_element().unwrap();
        assert_eq!(para.attrs[attr::CONTEXT_PROPS], serde_json::json!({"id": 7}));
    }

    #[test]
    fn task_markers_mark_the_list() {
        let nodes = blocks("- [x] done\n- [ ] todo");
        let list = nodes[0].as_element().unwrap();
        assert_eq!(list.list_kind(), Some(ListKind::Task));
        let first = list.children[0].as_element().unwrap();
        assert!(first.attr_bool(attr::CHECKED));
    }
}
