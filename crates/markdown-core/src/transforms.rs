use crate::core::apply_op_to;
use crate::error::EditorError;
use crate::node::{Document, ElementNode, Marks, Node};
use crate::ops::{NodePatch, Op, Path, transform_path};
use crate::path::{child, common_ancestor};
use crate::selection::{Point, Selection};

/// Mutable view handed to [`crate::Editor::transact`]. Every method applies
/// its ops right away, so later calls see the updated tree.
pub struct Batch<'a> {
    doc: &'a mut Document,
    selection: &'a mut Selection,
    inverse: Vec<Op>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(doc: &'a mut Document, selection: &'a mut Selection) -> Self {
        Self {
            doc,
            selection,
            inverse: Vec::new(),
        }
    }

    pub(crate) fn into_inverse(self) -> Vec<Op> {
        self.inverse
    }

    pub fn doc(&self) -> &Document {
        self.doc
    }

    pub fn selection(&self) -> &Selection {
        self.selection
    }

    pub fn apply_op(&mut self, op: Op) -> Result<(), EditorError> {
        let inverse = apply_op_to(self.doc, self.selection, op)?;
        self.inverse.push(inverse);
        Ok(())
    }

    pub fn select(&mut self, selection: Selection) {
        *self.selection = selection;
    }

    pub fn collapse_to(&mut self, point: Point) {
        self.select(Selection::collapsed(point));
    }

    /// Puts the cursor at the first text position inside `path`.
    pub fn select_start_of(&mut self, path: &[usize]) -> Result<(), EditorError> {
        let point = self
            .doc
            .first_text_point(path)
            .ok_or_else(|| EditorError::PathNotFound(path.to_vec()))?;
        self.collapse_to(point);
        Ok(())
    }

    pub fn select_end_of(&mut self, path: &[usize]) -> Result<(), EditorError> {
        let point = self
            .doc
            .last_text_point(path)
            .ok_or_else(|| EditorError::PathNotFound(path.to_vec()))?;
        self.collapse_to(point);
        Ok(())
    }

    pub fn insert_nodes(&mut self, at: &[usize], nodes: Vec<Node>) -> Result<(), EditorError> {
        let (parent, first) = split(at)?;
        for (k, node) in nodes.into_iter().enumerate() {
            self.apply_op(Op::InsertNode {
                path: child(&parent, first + k),
                node,
            })?;
        }
        Ok(())
    }

    pub fn remove_nodes(&mut self, at: &[usize]) -> Result<(), EditorError> {
        self.apply_op(Op::RemoveNode { path: at.to_vec() })
    }

    pub fn set_nodes(&mut self, at: &[usize], patch: NodePatch) -> Result<(), EditorError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.apply_op(Op::SetNode {
            path: at.to_vec(),
            patch,
        })
    }

    pub fn unset_attr(&mut self, at: &[usize], name: &str) -> Result<(), EditorError> {
        let present = self.doc.element(at)?.attrs.contains_key(name);
        if !present {
            return Ok(());
        }
        self.set_nodes(at, NodePatch::default().remove(name))
    }

    /// `to` addresses the tree after the node has been taken out.
    pub fn move_nodes(&mut self, from: &[usize], to: &[usize]) -> Result<(), EditorError> {
        if from == to {
            return Ok(());
        }
        self.apply_op(Op::MoveNode {
            path: from.to_vec(),
            new_path: to.to_vec(),
        })
    }

    /// Wraps `count` siblings starting at `at` in `wrapper`, which must have
    /// no children of its own. Returns the wrapper's path.
    pub fn wrap_nodes(
        &mut self,
        wrapper: ElementNode,
        at: &[usize],
        count: usize,
    ) -> Result<Path, EditorError> {
        let (parent, start) = split(at)?;
        let available = self
            .doc
            .children_at(&parent)
            .map(<[Node]>::len)
            .ok_or_else(|| EditorError::PathNotFound(parent.clone()))?;
        if count == 0 || start + count > available {
            return Err(EditorError::invalid(format!(
                "cannot wrap {count} nodes at {at:?}"
            )));
        }
        let wrapper_path = at.to_vec();
        self.apply_op(Op::InsertNode {
            path: wrapper_path.clone(),
            node: Node::Element(ElementNode {
                children: Vec::new(),
                ..wrapper
            }),
        })?;
        for k in 0..count {
            self.apply_op(Op::MoveNode {
                path: child(&parent, start + 1),
                new_path: child(&wrapper_path, k),
            })?;
        }
        Ok(wrapper_path)
    }

    /// Replaces the element at `at` by its children.
    pub fn unwrap_nodes(&mut self, at: &[usize]) -> Result<(), EditorError> {
        let (parent, ix) = split(at)?;
        let count = self.doc.element(at)?.children.len();
        for k in 0..count {
            self.apply_op(Op::MoveNode {
                path: child(&child(&parent, ix + k), 0),
                new_path: child(&parent, ix + k),
            })?;
        }
        self.apply_op(Op::RemoveNode {
            path: child(&parent, ix + count),
        })
    }

    /// Moves the node at `at` one level up, splitting its parent when the
    /// node sits in the middle. Returns the node's new path.
    pub fn lift_nodes(&mut self, at: &[usize]) -> Result<Path, EditorError> {
        let (parent, ix) = split(at)?;
        if parent.is_empty() {
            return Err(EditorError::invalid(format!(
                "cannot lift top-level node {at:?}"
            )));
        }
        let siblings = self.doc.element(&parent)?.children.len();
        let parent_next =
            crate::path::next(&parent).ok_or_else(|| EditorError::invalid("no parent"))?;

        if siblings == 1 {
            self.move_nodes(at, &parent)?;
            self.remove_nodes(&parent_next)?;
            return Ok(parent);
        }
        if ix == 0 {
            self.move_nodes(at, &parent)?;
            return Ok(parent);
        }
        if ix + 1 < siblings {
            self.apply_op(Op::SplitNode {
                path: parent.clone(),
                position: ix + 1,
                properties: None,
            })?;
        }
        self.move_nodes(at, &parent_next)?;
        Ok(parent_next)
    }

    pub fn insert_text(&mut self, text: &str, at: Option<Point>) -> Result<(), EditorError> {
        let point = match at {
            Some(point) => point,
            None => {
                let selection = self.selection.clone();
                if selection.is_collapsed() {
                    selection.focus
                } else {
                    self.delete_range(&selection)?
                }
            }
        };
        if text.is_empty() {
            return Ok(());
        }
        self.apply_op(Op::InsertText {
            path: point.path,
            offset: point.offset,
            text: text.to_string(),
        })
    }

    pub fn set_marks(&mut self, at: &[usize], marks: Marks) -> Result<(), EditorError> {
        let current = self
            .doc
            .leaf(at)
            .ok_or_else(|| EditorError::PathNotFound(at.to_vec()))?;
        if current.marks == marks {
            return Ok(());
        }
        self.apply_op(Op::SetTextMarks {
            path: at.to_vec(),
            marks,
        })
    }

    pub fn split_node(&mut self, at: &[usize], position: usize) -> Result<Path, EditorError> {
        self.apply_op(Op::SplitNode {
            path: at.to_vec(),
            position,
            properties: None,
        })?;
        crate::path::next(at).ok_or_else(|| EditorError::invalid("cannot split the root"))
    }

    /// Splits the text leaf at `point` and its block, leaving the cursor at
    /// the start of the new block. Returns the new block's path.
    pub fn split_block(&mut self, point: &Point) -> Result<Path, EditorError> {
        let block = self
            .doc
            .text_block_of(&point.path)
            .ok_or_else(|| EditorError::invalid("point is not inside a text block"))?;
        let leaf_ix = *point
            .path
            .get(block.len())
            .ok_or_else(|| EditorError::PathNotFound(point.path.clone()))?;
        let leaf_path = child(&block, leaf_ix);
        let leaf_len = self.doc.string(&leaf_path).len();

        let position = if point.offset == 0 {
            leaf_ix
        } else if point.offset >= leaf_len || point.path != leaf_path {
            leaf_ix + 1
        } else {
            self.split_node(&leaf_path, point.offset)?;
            leaf_ix + 1
        };

        let new_block = self.split_node(&block, position)?;
        if self.doc.children_at(&new_block).is_some_and(<[Node]>::is_empty) {
            self.insert_nodes(&child(&new_block, 0), vec![Node::text("")])?;
        }
        if self.doc.children_at(&block).is_some_and(<[Node]>::is_empty) {
            self.insert_nodes(&child(&block, 0), vec![Node::text("")])?;
        }
        self.select_start_of(&new_block)?;
        Ok(new_block)
    }

    /// Merges the node at `at` into its previous sibling.
    pub fn merge_nodes(&mut self, at: &[usize]) -> Result<(), EditorError> {
        let prev = crate::path::previous(at)
            .ok_or_else(|| EditorError::invalid(format!("nothing before {at:?}")))?;
        let position = match self.doc.node(&prev)? {
            Node::Text(t) => t.text.len(),
            Node::Element(el) => el.children.len(),
        };
        self.apply_op(Op::MergeNode {
            path: at.to_vec(),
            position,
        })
    }

    /// Deletes everything between the edges of `range`, joining the block at
    /// the end into the block at the start. Returns the collapsed point.
    pub fn delete_range(&mut self, range: &Selection) -> Result<Point, EditorError> {
        let (start, end) = range.edges();
        let (start, end) = (start.clone(), end.clone());
        if start == end {
            return Ok(start);
        }

        let start_len = self
            .doc
            .leaf(&start.path)
            .map(|t| t.text.len())
            .ok_or_else(|| EditorError::PathNotFound(start.path.clone()))?;
        if self.doc.leaf(&end.path).is_none() {
            return Err(EditorError::PathNotFound(end.path.clone()));
        }

        if start.path == end.path {
            self.apply_op(Op::RemoveText {
                path: start.path.clone(),
                range: start.offset..end.offset,
            })?;
            self.collapse_to(start.clone());
            return Ok(start);
        }

        let start_block = self.doc.text_block_of(&start.path);
        let end_block = self.doc.text_block_of(&end.path);

        self.apply_op(Op::RemoveText {
            path: end.path.clone(),
            range: 0..end.offset,
        })?;
        self.apply_op(Op::RemoveText {
            path: start.path.clone(),
            range: start.offset..start_len,
        })?;

        let mut doomed = self.nodes_between(&start.path, &end.path);
        doomed.sort();
        let mut end_block = end_block;
        for path in doomed.into_iter().rev() {
            let op = Op::RemoveNode { path };
            end_block = end_block.and_then(|p| transform_path(&p, &op));
            self.apply_op(op)?;
        }

        if let (Some(start_block), Some(end_block)) = (start_block, end_block) {
            if start_block != end_block {
                self.join_blocks(&start_block, &end_block)?;
            }
        }

        self.collapse_to(start.clone());
        Ok(start)
    }

    // Roots of the subtrees lying strictly between two leaves.
    fn nodes_between(&self, start: &[usize], end: &[usize]) -> Vec<Path> {
        let common = common_ancestor(start, end);
        let c = common.len();
        let mut out = Vec::new();
        for depth in c + 1..start.len() {
            let parent = &start[..depth];
            let count = self.doc.children_at(parent).map_or(0, <[Node]>::len);
            for ix in start[depth] + 1..count {
                out.push(child(parent, ix));
            }
        }
        if c < start.len() && c < end.len() {
            for ix in start[c] + 1..end[c] {
                out.push(child(&common, ix));
            }
        }
        for depth in c + 1..end.len() {
            let parent = &end[..depth];
            for ix in 0..end[depth] {
                out.push(child(parent, ix));
            }
        }
        out
    }

    // Moves the children of `tail` to the end of `head`, then drops `tail`
    // and any ancestors it leaves empty.
    fn join_blocks(&mut self, head: &[usize], tail: &[usize]) -> Result<(), EditorError> {
        let head_len = self.doc.element(head)?.children.len();
        let tail_len = self.doc.element(tail)?.children.len();
        for k in 0..tail_len {
            self.move_nodes(&child(tail, 0), &child(head, head_len + k))?;
        }
        let mut doomed = tail.to_vec();
        loop {
            self.remove_nodes(&doomed)?;
            let Some(parent) = crate::path::parent(&doomed) else {
                break;
            };
            if parent.is_empty() || !self.doc.children_at(&parent).is_some_and(<[Node]>::is_empty) {
                break;
            }
            doomed = parent;
        }
        Ok(())
    }

    /// Swaps every top-level block for `doc`'s and puts the cursor at the
    /// start of the new content.
    pub fn replace_document(&mut self, doc: Document) -> Result<(), EditorError> {
        for ix in (0..self.doc.children.len()).rev() {
            self.apply_op(Op::RemoveNode { path: vec![ix] })?;
        }
        for (ix, node) in doc.children.into_iter().enumerate() {
            self.apply_op(Op::InsertNode {
                path: vec![ix],
                node,
            })?;
        }
        let start = self
            .doc
            .start_point()
            .unwrap_or_else(|| Point::new(vec![0, 0], 0));
        self.collapse_to(start);
        Ok(())
    }
}

fn split(at: &[usize]) -> Result<(Path, usize), EditorError> {
    let (ix, parent) = at
        .split_last()
        .ok_or_else(|| EditorError::invalid("empty path"))?;
    Ok((parent.to_vec(), *ix))
}
