use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::node::{Document, Node, TextNode};
use crate::normalize::{self, Schema};
use crate::ops::{
    NodePatch, Op, SplitProps, Transaction, shift_for_insert, transform_path, transform_point,
};
use crate::selection::{Point, Selection, clamp_to_char_boundary, normalize_selection};
use crate::transforms::Batch;

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    schema: Schema,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection) -> Self {
        Self::with_config(doc, selection, EditorConfig::default())
    }

    pub fn with_config(doc: Document, selection: Selection, config: EditorConfig) -> Self {
        let mut editor = Self {
            doc,
            selection,
            schema: Schema::core(),
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        };
        editor.normalize_in_place();
        editor
    }

    pub fn empty() -> Self {
        let doc = Document::new(vec![Node::paragraph("")]);
        Self::new(doc, Selection::collapsed(Point::new(vec![0, 0], 0)))
    }

    pub fn from_markdown(markdown: &str) -> Self {
        let doc = crate::markdown::parse(markdown);
        let start = doc.start_point().unwrap_or_else(|| Point::new(vec![0, 0], 0));
        Self::new(doc, Selection::collapsed(start))
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = normalize_selection(&self.doc, &selection);
    }

    pub fn into_parts(self) -> (Document, Selection) {
        (self.doc, self.selection)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };
        let record = self.replay(record, false);
        self.redo_stack.push(record);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };
        let record = self.replay(record, true);
        self.undo_stack.push(record);
        true
    }

    fn replay(&mut self, record: UndoRecord, forward: bool) -> UndoRecord {
        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let mut reverse_ops: Vec<Op> = Vec::new();
        for op in inverse_ops {
            match apply_op_to(&mut self.doc, &mut self.selection, op) {
                Ok(inv) => reverse_ops.push(inv),
                Err(err) => {
                    tracing::warn!("history replay stopped early: {}", err);
                    break;
                }
            }
        }
        reverse_ops.reverse();

        self.selection = if forward {
            selection_after.clone()
        } else {
            selection_before.clone()
        };
        self.normalize_in_place();

        UndoRecord {
            inverse_ops: reverse_ops,
            selection_before,
            selection_after,
        }
    }

    /// Runs `f` against a batch of primitive transforms. On success the
    /// document is normalized once and a single undo record is pushed; on
    /// failure every op already applied is rolled back.
    pub fn transact<T, E>(
        &mut self,
        source: &str,
        f: impl FnOnce(&mut Batch<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<EditorError>,
    {
        let selection_before = self.selection.clone();
        let mut batch = Batch::new(&mut self.doc, &mut self.selection);
        let result = f(&mut batch);
        let mut inverse_ops = batch.into_inverse();

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.rollback(inverse_ops, selection_before);
                return Err(err);
            }
        };

        if let Err(err) = normalize::run(
            &mut self.doc,
            &mut self.selection,
            &self.schema,
            self.config.max_normalize_iterations,
            &mut inverse_ops,
        ) {
            tracing::error!("{} left the document unnormalized: {}", source, err);
            self.rollback(inverse_ops, selection_before);
            return Err(err.into());
        }
        self.selection = normalize_selection(&self.doc, &self.selection);

        if !inverse_ops.is_empty() {
            tracing::debug!("{} applied {} ops", source, inverse_ops.len());
            inverse_ops.reverse();
            self.undo_stack.push(UndoRecord {
                inverse_ops,
                selection_before,
                selection_after: self.selection.clone(),
            });
            self.redo_stack.clear();
            if self.undo_stack.len() > self.config.max_undo {
                self.undo_stack.remove(0);
            }
        }

        Ok(value)
    }

    fn rollback(&mut self, inverse_ops: Vec<Op>, selection_before: Selection) {
        for op in inverse_ops.into_iter().rev() {
            if let Err(err) = apply_op_to(&mut self.doc, &mut self.selection, op) {
                tracing::error!("rollback failed: {}", err);
                break;
            }
        }
        self.selection = selection_before;
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), EditorError> {
        let source = tx.meta.source.clone().unwrap_or_else(|| "transaction".into());
        self.transact(&source, |batch| {
            for op in tx.ops {
                batch.apply_op(op)?;
            }
            if let Some(selection) = tx.selection_after {
                batch.select(selection);
            }
            Ok(())
        })
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, EditorError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        for op in tx.ops.iter().cloned() {
            apply_op_to(&mut doc, &mut selection, op)?;
        }
        if let Some(sel) = &tx.selection_after {
            selection = sel.clone();
        }

        let mut inverse = Vec::new();
        normalize::run(
            &mut doc,
            &mut selection,
            &self.schema,
            self.config.max_normalize_iterations,
            &mut inverse,
        )?;
        let selection = normalize_selection(&doc, &selection);

        Ok(TransactionPreview { doc, selection })
    }

    /// Replaces the whole document. The change is undoable.
    pub fn set_document(&mut self, doc: Document) -> Result<(), EditorError> {
        self.transact("editor:set_document", |batch| batch.replace_document(doc))
    }

    pub fn normalize(&mut self) -> Result<(), EditorError> {
        self.transact("editor:normalize", |_| Ok(()))
    }

    fn normalize_in_place(&mut self) {
        let mut inverse = Vec::new();
        if let Err(err) = normalize::run(
            &mut self.doc,
            &mut self.selection,
            &self.schema,
            self.config.max_normalize_iterations,
            &mut inverse,
        ) {
            tracing::error!("initial normalization failed: {}", err);
        }
        self.selection = normalize_selection(&self.doc, &self.selection);
    }
}

/// Applies one op, keeping `selection` attached to the content it pointed at.
/// Returns the op that undoes it.
pub(crate) fn apply_op_to(
    doc: &mut Document,
    selection: &mut Selection,
    op: Op,
) -> Result<Op, EditorError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let leaf = leaf_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&leaf.text, offset);
            leaf.text.insert_str(offset, &text);
            let range = offset..offset + text.len();
            transform_points(
                selection,
                &Op::InsertText {
                    path: path.clone(),
                    offset,
                    text,
                },
            );
            Ok(Op::RemoveText { path, range })
        }
        Op::RemoveText { path, range } => {
            let leaf = leaf_mut(doc, &path)?;
            let start = clamp_to_char_boundary(&leaf.text, range.start);
            let end = clamp_to_char_boundary(&leaf.text, range.end);
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = leaf.text[start..end].to_string();
            leaf.text.replace_range(start..end, "");
            let applied = Op::RemoveText {
                path: path.clone(),
                range: start..end,
            };
            transform_points(selection, &applied);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            let (parent, ix) = split_path(&path)?;
            let children = doc.children_mut(parent)?;
            if ix > children.len() {
                return Err(EditorError::PathNotFound(path));
            }
            children.insert(ix, node);
            for point in selection.points_mut() {
                point.path = shift_for_insert(&point.path, &path);
            }
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = take_node(doc, &path)?;
            let applied = Op::RemoveNode { path: path.clone() };
            for point in selection.points_mut() {
                match transform_point(point, &applied) {
                    Some(moved) => *point = moved,
                    None => {
                        let fallback = doc.point_before(&path).or_else(|| doc.point_from(&path));
                        if let Some(fallback) = fallback {
                            *point = fallback;
                        }
                    }
                }
            }
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNode { path, patch } => {
            let Node::Element(el) = doc.get_mut(&path)? else {
                return Err(EditorError::invalid(format!(
                    "cannot set properties on text at {path:?}"
                )));
            };
            let mut old = NodePatch::default();
            if let Some(kind) = patch.kind {
                if kind != el.kind {
                    old.kind = Some(el.kind);
                    el.kind = kind;
                }
            }
            for (key, value) in patch.set {
                match el.attrs.insert(key.clone(), value) {
                    Some(prev) => {
                        old.set.insert(key, prev);
                    }
                    None => old.remove.push(key),
                }
            }
            for key in patch.remove {
                if let Some(prev) = el.attrs.remove(&key) {
                    old.set.insert(key, prev);
                }
            }
            Ok(Op::SetNode { path, patch: old })
        }
        Op::SetTextMarks { path, marks } => {
            let leaf = leaf_mut(doc, &path)?;
            let old = std::mem::replace(&mut leaf.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
        Op::MoveNode { path, new_path } => {
            if new_path.starts_with(&path) && new_path.len() > path.len() {
                return Err(EditorError::invalid(format!(
                    "cannot move {path:?} into its own subtree"
                )));
            }
            let (new_parent, new_ix) = split_path(&new_path)?;
            let node = take_node(doc, &path)?;
            let children = match doc.children_mut(new_parent) {
                Ok(children) if new_ix <= children.len() => children,
                _ => {
                    // Put it back before reporting.
                    let (parent, ix) = split_path(&path)?;
                    doc.children_mut(parent)?.insert(ix, node);
                    return Err(EditorError::PathNotFound(new_path));
                }
            };
            children.insert(new_ix, node);
            transform_points(
                selection,
                &Op::MoveNode {
                    path: path.clone(),
                    new_path: new_path.clone(),
                },
            );
            Ok(Op::MoveNode {
                path: new_path,
                new_path: path,
            })
        }
        Op::SplitNode {
            path,
            position,
            properties,
        } => {
            let (parent, ix) = split_path(&path)?;
            let (sibling, position) = match doc.get_mut(&path)? {
                Node::Text(leaf) => {
                    let position = clamp_to_char_boundary(&leaf.text, position);
                    let tail = leaf.text.split_off(position);
                    let marks = match &properties {
                        Some(SplitProps::Text { marks }) => marks.clone(),
                        _ => leaf.marks.clone(),
                    };
                    (Node::Text(TextNode { text: tail, marks }), position)
                }
                Node::Element(el) => {
                    let position = position.min(el.children.len());
                    let tail = el.children.split_off(position);
                    let mut sibling = el.clone();
                    sibling.children = tail;
                    if let Some(SplitProps::Element { kind, attrs }) = &properties {
                        sibling.kind = *kind;
                        sibling.attrs = attrs.clone();
                    }
                    (Node::Element(sibling), position)
                }
            };
            doc.children_mut(parent)?.insert(ix + 1, sibling);
            let applied = Op::SplitNode {
                path,
                position,
                properties: None,
            };
            transform_points(selection, &applied);
            let next = crate::path::next(applied.path())
                .ok_or_else(|| EditorError::invalid("split of the document root"))?;
            Ok(Op::MergeNode { path: next, position })
        }
        Op::MergeNode { path, .. } => {
            let prev_path = crate::path::previous(&path)
                .ok_or_else(|| EditorError::invalid(format!("nothing to merge {path:?} into")))?;
            let compatible = matches!(
                (doc.node(&prev_path)?, doc.node(&path)?),
                (Node::Text(_), Node::Text(_)) | (Node::Element(_), Node::Element(_))
            );
            if !compatible {
                return Err(EditorError::invalid(format!(
                    "cannot merge {path:?} into a node of another type"
                )));
            }
            let removed = take_node(doc, &path)?;
            let (position, properties) = match (doc.get_mut(&prev_path)?, removed) {
                (Node::Text(prev), Node::Text(leaf)) => {
                    let position = prev.text.len();
                    prev.text.push_str(&leaf.text);
                    (position, SplitProps::Text { marks: leaf.marks })
                }
                (Node::Element(prev), Node::Element(el)) => {
                    let position = prev.children.len();
                    prev.children.extend(el.children);
                    (
                        position,
                        SplitProps::Element {
                            kind: el.kind,
                            attrs: el.attrs,
                        },
                    )
                }
                _ => return Err(EditorError::invalid("merge type mismatch")),
            };
            let applied = Op::MergeNode { path, position };
            transform_points(selection, &applied);
            Ok(Op::SplitNode {
                path: prev_path,
                position,
                properties: Some(properties),
            })
        }
    }
}

fn transform_points(selection: &mut Selection, op: &Op) {
    for point in selection.points_mut() {
        if let Some(moved) = transform_point(point, op) {
            *point = moved;
        }
    }
}

fn split_path(path: &[usize]) -> Result<(&[usize], usize), EditorError> {
    let (ix, parent) = path
        .split_last()
        .ok_or_else(|| EditorError::invalid("empty path"))?;
    Ok((parent, *ix))
}

fn leaf_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, EditorError> {
    match doc.get_mut(path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(EditorError::invalid(format!(
            "expected a text leaf at {path:?}"
        ))),
    }
}

fn take_node(doc: &mut Document, path: &[usize]) -> Result<Node, EditorError> {
    let (parent, ix) = split_path(path)?;
    let children = doc.children_mut(parent)?;
    if ix >= children.len() {
        return Err(EditorError::PathNotFound(path.to_vec()));
    }
    Ok(children.remove(ix))
}

/// Path of a node after a sequence of ops, used to keep references stable
/// across a batch.
pub fn follow_path(path: &[usize], ops: &[Op]) -> Option<Vec<usize>> {
    let mut current = path.to_vec();
    for op in ops {
        current = transform_path(&current, op)?;
    }
    Some(current)
}
