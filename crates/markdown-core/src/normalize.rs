use crate::core::apply_op_to;
use crate::error::EditorError;
use crate::node::{Document, ElementKind, ElementNode, Marks, Node, attr};
use crate::ops::{NodePatch, Op, Path};
use crate::path::child;
use crate::selection::{Point, Selection};

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

pub struct Schema {
    passes: Vec<Box<dyn NormalizePass>>,
}

impl Schema {
    pub fn core() -> Self {
        Self {
            passes: vec![
                Box::new(EnsureNonEmptyDocument),
                Box::new(NormalizeBlockChildren),
                Box::new(NormalizeListItemShape),
                Box::new(NormalizeInlineChildren),
                Box::new(MergeAdjacentTextLeaves),
                Box::new(NormalizeTableShape),
                Box::new(NormalizeHeadingLevels),
                Box::new(NormalizeListAttrs),
            ],
        }
    }

    pub fn with_pass(mut self, pass: Box<dyn NormalizePass>) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.passes
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::core()
    }
}

/// Runs every pass until none of them emits an op. The inverse of each
/// applied op is appended to `inverse`, including on failure.
pub(crate) fn run(
    doc: &mut Document,
    selection: &mut Selection,
    schema: &Schema,
    max_iterations: usize,
    inverse: &mut Vec<Op>,
) -> Result<(), EditorError> {
    for _ in 0..max_iterations {
        let mut changed = false;
        for pass in schema.passes() {
            let ops = pass.run(doc);
            if ops.is_empty() {
                continue;
            }
            tracing::trace!("normalize pass {} emitted {} ops", pass.id(), ops.len());
            changed = true;
            for op in ops {
                inverse.push(apply_op_to(doc, selection, op)?);
            }
        }
        if !changed {
            return Ok(());
        }
    }
    Err(EditorError::InvariantViolation {
        iterations: max_iterations,
    })
}

/// Normalizes a detached document with the core schema.
pub fn normalize_document(doc: &mut Document) -> Result<(), EditorError> {
    let mut selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    let mut inverse = Vec::new();
    run(
        doc,
        &mut selection,
        &Schema::core(),
        crate::config::EditorConfig::default().max_normalize_iterations,
        &mut inverse,
    )
}

/// Calls `f` for every element and finally for the root (`None`), children
/// before parents and later siblings before earlier ones. Ops that only touch
/// the visited parent's children, emitted in descending index order, stay
/// valid when applied in sequence.
fn walk_parents(
    doc: &Document,
    mut f: impl FnMut(&[usize], Option<&ElementNode>, &[Node], &mut Vec<Op>),
) -> Vec<Op> {
    fn visit(
        children: &[Node],
        path: &mut Path,
        f: &mut dyn FnMut(&[usize], Option<&ElementNode>, &[Node], &mut Vec<Op>),
        ops: &mut Vec<Op>,
    ) {
        for ix in (0..children.len()).rev() {
            let Node::Element(el) = &children[ix] else {
                continue;
            };
            path.push(ix);
            visit(&el.children, path, f, ops);
            f(path, Some(el), &el.children, ops);
            path.pop();
        }
    }

    let mut ops = Vec::new();
    visit(&doc.children, &mut Vec::new(), &mut f, &mut ops);
    f(&[], None, &doc.children, &mut ops);
    ops
}

fn wrap_run(parent: &[usize], start: usize, len: usize, wrapper: ElementNode, ops: &mut Vec<Op>) {
    let wrapper_path = child(parent, start);
    ops.push(Op::InsertNode {
        path: wrapper_path.clone(),
        node: Node::Element(wrapper),
    });
    for k in 0..len {
        ops.push(Op::MoveNode {
            path: child(parent, start + 1),
            new_path: child(&wrapper_path, k),
        });
    }
}

fn is_inline_node(node: &Node) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Element(el) => el.kind.is_inline(),
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Block containers hold blocks of the right kind: lists hold items, tables
/// hold rows, rows hold cells, and stray inline content gets a paragraph.
struct NormalizeBlockChildren;

impl NormalizeBlockChildren {
    fn required_child(parent: Option<ElementKind>) -> Option<ElementKind> {
        match parent {
            Some(ElementKind::List) => Some(ElementKind::ListItem),
            Some(ElementKind::Table) => Some(ElementKind::TableRow),
            Some(ElementKind::TableRow) => Some(ElementKind::TableCell),
            _ => None,
        }
    }

    fn wrapper_for(node: &Node, parent: Option<ElementKind>) -> Option<ElementKind> {
        if let Some(required) = Self::required_child(parent) {
            return (node.kind() != Some(required)).then_some(required);
        }
        match node {
            Node::Text(_) => Some(ElementKind::Paragraph),
            Node::Element(el) => match el.kind {
                kind if kind.is_inline() => Some(ElementKind::Paragraph),
                ElementKind::ListItem => Some(ElementKind::List),
                ElementKind::TableRow => Some(ElementKind::Table),
                ElementKind::TableCell => Some(ElementKind::TableRow),
                _ => None,
            },
        }
    }
}

impl NormalizePass for NormalizeBlockChildren {
    fn id(&self) -> &'static str {
        "core.normalize_block_children"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            let parent_kind = parent.map(|el| el.kind);
            if parent_kind.is_some_and(|k| k.holds_inline() || k.is_void()) {
                return;
            }

            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                let node = &children[ix];

                if let Some(wrapper) = Self::wrapper_for(node, parent_kind) {
                    // Group a run of inline siblings into one wrapper.
                    let mut start = ix;
                    if is_inline_node(node) {
                        while start > 0
                            && is_inline_node(&children[start - 1])
                            && Self::wrapper_for(&children[start - 1], parent_kind)
                                == Some(wrapper)
                        {
                            start -= 1;
                        }
                    }
                    wrap_run(path, start, ix - start + 1, ElementNode::new(wrapper), ops);
                    ix = start;
                    continue;
                }

                let Node::Element(el) = node else {
                    continue;
                };
                let child_path = child(path, ix);
                match el.kind {
                    ElementKind::List
                    | ElementKind::Blockquote
                    | ElementKind::Table
                    | ElementKind::TableRow
                        if el.children.is_empty() =>
                    {
                        ops.push(Op::RemoveNode { path: child_path });
                    }
                    ElementKind::ListItem | ElementKind::TableCell if el.children.is_empty() => {
                        ops.push(Op::InsertNode {
                            path: child(&child_path, 0),
                            node: Node::paragraph(""),
                        });
                    }
                    ElementKind::ListItem
                        if el.children.first().is_some_and(|n| n.is_kind(ElementKind::List)) =>
                    {
                        ops.push(Op::InsertNode {
                            path: child(&child_path, 0),
                            node: Node::paragraph(""),
                        });
                    }
                    _ => {}
                }
            }
        })
    }
}

/// A list item holds blocks followed by at most one nested list. Nested lists
/// that are not last are merged into the first one, and blocks trailing a
/// nested list start a new sibling item.
struct NormalizeListItemShape;

impl NormalizeListItemShape {
    fn is_well_formed(children: &[Node]) -> bool {
        match children.iter().position(|n| n.is_kind(ElementKind::List)) {
            Some(ix) => ix + 1 == children.len(),
            None => true,
        }
    }

    /// Splits an item's children into the child lists of one or more items.
    fn regroup(children: &[Node]) -> Vec<Vec<Node>> {
        let mut groups = Vec::new();
        let mut blocks: Vec<Node> = Vec::new();
        let mut nested: Option<ElementNode> = None;
        for node in children {
            match node {
                Node::Element(list) if list.kind == ElementKind::List => match nested.as_mut() {
                    Some(open) => open.children.extend(list.children.iter().cloned()),
                    None => nested = Some(list.clone()),
                },
                _ => {
                    if let Some(list) = nested.take() {
                        blocks.push(Node::Element(list));
                        groups.push(std::mem::take(&mut blocks));
                    }
                    blocks.push(node.clone());
                }
            }
        }
        if let Some(list) = nested {
            blocks.push(Node::Element(list));
        }
        if !blocks.is_empty() {
            groups.push(blocks);
        }
        groups
    }
}

impl NormalizePass for NormalizeListItemShape {
    fn id(&self) -> &'static str {
        "list.normalize_item_shape"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            if !parent.is_some_and(|el| el.kind == ElementKind::List) {
                return;
            }
            for (ix, node) in children.iter().enumerate().rev() {
                let Node::Element(item) = node else {
                    continue;
                };
                if item.kind != ElementKind::ListItem || Self::is_well_formed(&item.children) {
                    continue;
                }
                let item_path = child(path, ix);
                ops.push(Op::RemoveNode {
                    path: item_path.clone(),
                });
                for (k, blocks) in Self::regroup(&item.children).into_iter().enumerate() {
                    let node = if k == 0 {
                        Node::Element(item.clone().with_children(blocks))
                    } else {
                        Node::list_item(blocks)
                    };
                    ops.push(Op::InsertNode {
                        path: child(path, ix + k),
                        node,
                    });
                }
            }
        })
    }
}

/// Inline-holding blocks contain text leaves and inline elements only, always
/// at least one leaf, with a leaf on both sides of every inline element.
/// Void elements hold exactly one empty leaf.
struct NormalizeInlineChildren;

impl NormalizeInlineChildren {
    // An empty leaf can go when its neighbours are leaves (or nothing) and
    // its run of adjacent leaves keeps at least one other member.
    fn empty_leaf_is_redundant(children: &[Node], ix: usize) -> bool {
        let prev_ok = ix == 0 || children[ix - 1].is_text();
        let next_ok = ix + 1 == children.len() || children[ix + 1].is_text();
        if !prev_ok || !next_ok || children.len() < 2 {
            return false;
        }
        let mut start = ix;
        while start > 0 && children[start - 1].is_text() {
            start -= 1;
        }
        let mut end = ix;
        while end + 1 < children.len() && children[end + 1].is_text() {
            end += 1;
        }
        if start == end {
            return false;
        }
        let all_empty = children[start..=end]
            .iter()
            .all(|n| n.as_text().is_some_and(|t| t.text.is_empty()));
        !all_empty || ix != start
    }
}

impl NormalizePass for NormalizeInlineChildren {
    fn id(&self) -> &'static str {
        "core.normalize_inline_children"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            let Some(parent) = parent else {
                return;
            };

            if parent.kind.is_void() {
                let ok = matches!(children, [Node::Text(t)] if t.text.is_empty());
                if !ok {
                    for ix in (0..children.len()).rev() {
                        ops.push(Op::RemoveNode {
                            path: child(path, ix),
                        });
                    }
                    ops.push(Op::InsertNode {
                        path: child(path, 0),
                        node: Node::text(""),
                    });
                }
                return;
            }

            if !parent.kind.holds_inline() {
                return;
            }

            if children.is_empty() {
                ops.push(Op::InsertNode {
                    path: child(path, 0),
                    node: Node::text(""),
                });
                return;
            }

            let literal = parent.kind.is_literal();
            let last = children.len() - 1;
            for ix in (0..children.len()).rev() {
                let child_path = child(path, ix);
                match &children[ix] {
                    Node::Element(el) if literal || !el.kind.is_inline() => {
                        // Flatten to text.
                        let text = if el.kind == ElementKind::Break {
                            "\n".to_string()
                        } else {
                            el.string()
                        };
                        ops.push(Op::RemoveNode {
                            path: child_path.clone(),
                        });
                        ops.push(Op::InsertNode {
                            path: child_path,
                            node: Node::text(text),
                        });
                    }
                    Node::Element(_) => {
                        if ix == last || !children[ix + 1].is_text() {
                            ops.push(Op::InsertNode {
                                path: child(path, ix + 1),
                                node: Node::text(""),
                            });
                        }
                        if ix == 0 {
                            ops.push(Op::InsertNode {
                                path: child(path, 0),
                                node: Node::text(""),
                            });
                        }
                    }
                    Node::Text(t) => {
                        if literal && !t.marks.is_empty() {
                            ops.push(Op::SetTextMarks {
                                path: child_path.clone(),
                                marks: Marks::default(),
                            });
                        }
                        if t.text.is_empty() && Self::empty_leaf_is_redundant(children, ix) {
                            ops.push(Op::RemoveNode { path: child_path });
                        }
                    }
                }
            }
        })
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            if !parent.is_some_and(|el| el.kind.holds_inline()) {
                return;
            }
            for ix in (1..children.len()).rev() {
                let (Node::Text(left), Node::Text(right)) = (&children[ix - 1], &children[ix])
                else {
                    continue;
                };
                if left.marks == right.marks {
                    ops.push(Op::MergeNode {
                        path: child(path, ix),
                        position: left.text.len(),
                    });
                }
            }
        })
    }
}

/// Every row of a table has as many cells as the widest row.
struct NormalizeTableShape;

impl NormalizePass for NormalizeTableShape {
    fn id(&self) -> &'static str {
        "table.normalize_shape"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            if !parent.is_some_and(|el| el.kind == ElementKind::Table) {
                return;
            }
            let rows_ok = children.iter().all(|n| n.is_kind(ElementKind::TableRow));
            if !rows_ok {
                return;
            }
            let width = children.iter().map(|r| r.children().len()).max().unwrap_or(0);
            for (row_ix, row) in children.iter().enumerate().rev() {
                let row_path = child(path, row_ix);
                let len = row.children().len();
                if len == 0 {
                    continue;
                }
                for _ in len..width {
                    ops.push(Op::InsertNode {
                        path: child(&row_path, len),
                        node: crate::table::table_cell_node(""),
                    });
                }
            }
        })
    }
}

struct NormalizeHeadingLevels;

impl NormalizePass for NormalizeHeadingLevels {
    fn id(&self) -> &'static str {
        "heading.normalize_levels"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, _parent, children, ops| {
            for (ix, node) in children.iter().enumerate().rev() {
                let Node::Element(el) = node else {
                    continue;
                };
                let Some(level) = el.heading_level() else {
                    continue;
                };
                if el.attr_u64(attr::LEVEL) != Some(u64::from(level)) {
                    ops.push(Op::SetNode {
                        path: child(path, ix),
                        patch: NodePatch::default().set(attr::LEVEL, level),
                    });
                }
            }
        })
    }
}

/// `start` only lives on ordered lists and only when it is not 1; `checked`
/// only lives on items of task lists, where it is always present.
struct NormalizeListAttrs;

impl NormalizePass for NormalizeListAttrs {
    fn id(&self) -> &'static str {
        "list.normalize_attrs"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        walk_parents(doc, |path, parent, children, ops| {
            let Some(list) = parent.filter(|el| el.kind == ElementKind::List) else {
                return;
            };
            let task = list.attr_bool(attr::TASK);
            for (ix, item) in children.iter().enumerate().rev() {
                let Node::Element(item) = item else {
                    continue;
                };
                let has_checked = item.attrs.contains_key(attr::CHECKED);
                if task && !has_checked {
                    ops.push(Op::SetNode {
                        path: child(path, ix),
                        patch: NodePatch::default().set(attr::CHECKED, false),
                    });
                } else if !task && has_checked {
                    ops.push(Op::SetNode {
                        path: child(path, ix),
                        patch: NodePatch::default().remove(attr::CHECKED),
                    });
                }
            }

            if list.attrs.contains_key(attr::START) {
                let ordered = list.attr_bool(attr::ORDERED);
                if !ordered || list.attr_u64(attr::START) == Some(1) {
                    ops.push(Op::SetNode {
                        path: path.to_vec(),
                        patch: NodePatch::default().remove(attr::START),
                    });
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ListKind;

    fn normalized(children: Vec<Node>) -> Document {
        let mut doc = Document::new(children);
        normalize_document(&mut doc).unwrap();
        doc
    }

    #[test]
    fn empty_document_gets_a_paragraph() {
        assert_eq!(normalized(vec![]).children, vec![Node::paragraph("")]);
    }

    #[test]
    fn stray_text_at_root_is_wrapped_once() {
        let doc = normalized(vec![
            Node::text("a"),
            Node::void(ElementKind::Break),
            Node::text("b"),
        ]);
        assert_eq!(doc.children.len(), 1);
        let Node::Element(p) = &doc.children[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.kind, ElementKind::Paragraph);
        assert_eq!(p.children.len(), 3);
    }

    #[test]
    fn break_gets_surrounding_leaves() {
        let doc = normalized(vec![Node::element(
            ElementKind::Paragraph,
            vec![Node::void(ElementKind::Break)],
        )]);
        let children = doc.children[0].children();
        assert_eq!(children.len(), 3);
        assert!(children[0].is_text() && children[2].is_text());
    }

    #[test]
    fn empty_containers_are_removed_and_items_refilled() {
        let doc = normalized(vec![
            Node::paragraph("keep"),
            Node::element(ElementKind::Blockquote, vec![]),
            Node::list(ListKind::Unordered, vec![Node::list_item(vec![])]),
        ]);
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.string(&[1, 0]), "");
        assert!(doc.get(&[1, 0, 0]).is_some_and(|n| n.is_kind(ElementKind::Paragraph)));
    }

    #[test]
    fn list_item_starting_with_list_gets_a_paragraph() {
        let nested = Node::list(
            ListKind::Unordered,
            vec![Node::list_item(vec![Node::paragraph("inner")])],
        );
        let doc = normalized(vec![Node::list(
            ListKind::Unordered,
            vec![Node::list_item(vec![nested])],
        )]);
        assert!(doc.get(&[0, 0, 0]).is_some_and(|n| n.is_kind(ElementKind::Paragraph)));
        assert!(doc.get(&[0, 0, 1]).is_some_and(|n| n.is_kind(ElementKind::List)));
    }

    #[test]
    fn list_item_keeps_one_trailing_nested_list() {
        let nested = |t: &str| {
            Node::list(
                ListKind::Unordered,
                vec![Node::list_item(vec![Node::paragraph(t)])],
            )
        };
        let mut doc = normalized(vec![Node::list(
            ListKind::Unordered,
            vec![Node::list_item(vec![
                Node::paragraph("p"),
                nested("n1"),
                nested("n2"),
                Node::paragraph("after"),
            ])],
        )]);

        let list = doc.children[0].as_element().unwrap();
        assert_eq!(list.children.len(), 2);
        let first = list.children[0].children();
        assert_eq!(
            first.iter().map(Node::kind).collect::<Vec<_>>(),
            vec![Some(ElementKind::Paragraph), Some(ElementKind::List)]
        );
        assert_eq!(first[1].children().len(), 2);
        assert_eq!(doc.string(&[0, 0, 1, 1]), "n2");
        assert_eq!(doc.string(&[0, 1]), "after");

        let once = doc.clone();
        normalize_document(&mut doc).unwrap();
        assert_eq!(doc, once);
    }

    #[test]
    fn heading_levels_are_clamped() {
        let doc = normalized(vec![Node::heading(6, "deep")]);
        let Node::Element(h) = &doc.children[0] else {
            panic!("expected heading");
        };
        assert_eq!(h.attr_u64(attr::LEVEL), Some(4));
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut doc = normalized(vec![
            Node::text("x"),
            Node::element(
                ElementKind::Paragraph,
                vec![Node::text("a"), Node::text("b"), Node::text("")],
            ),
            Node::element(
                ElementKind::List,
                vec![Node::paragraph("loose"), Node::list_item(vec![])],
            ),
        ]);
        let once = doc.clone();
        normalize_document(&mut doc).unwrap();
        assert_eq!(doc, once);
        assert_eq!(doc.string(&[1]), "ab");
        assert_eq!(doc.children[1].children().len(), 1);
    }

    #[test]
    fn non_converging_pass_reports_invariant_violation() {
        struct Flip;
        impl NormalizePass for Flip {
            fn id(&self) -> &'static str {
                "test.flip"
            }
            fn run(&self, _doc: &Document) -> Vec<Op> {
                vec![Op::InsertText {
                    path: vec![0, 0],
                    offset: 0,
                    text: "x".into(),
                }]
            }
        }
        let schema = Schema::core().with_pass(Box::new(Flip));
        let mut doc = Document::new(vec![Node::paragraph("")]);
        let mut selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        let mut inverse = Vec::new();
        let err = run(&mut doc, &mut selection, &schema, 5, &mut inverse).unwrap_err();
        assert_eq!(err, EditorError::InvariantViolation { iterations: 5 });
        assert_eq!(inverse.len(), 5);
    }
}
