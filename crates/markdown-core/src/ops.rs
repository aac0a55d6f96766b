use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::node::{Attrs, ElementKind, Marks, Node};
use crate::selection::{Point, Selection};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl NodePatch {
    pub fn kind(kind: ElementKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn set(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.set.insert(key.to_string(), value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.remove.push(key.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.set.is_empty() && self.remove.is_empty()
    }
}

/// Properties given to the node created by a split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SplitProps {
    Text { marks: Marks },
    Element { kind: ElementKind, attrs: Attrs },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetNode {
        #[serde(default)]
        path: Path,
        patch: NodePatch,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
    /// `new_path` addresses the tree after the node has been taken out.
    MoveNode {
        #[serde(default)]
        path: Path,
        new_path: Path,
    },
    /// Splits the node at `path`; everything from `position` on (a byte
    /// offset for text, a child index for elements) moves into a new sibling.
    SplitNode {
        #[serde(default)]
        path: Path,
        position: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        properties: Option<SplitProps>,
    },
    /// Merges the node at `path` into its previous sibling, whose length
    /// before the merge is `position`.
    MergeNode {
        #[serde(default)]
        path: Path,
        position: usize,
    },
}

impl Op {
    pub fn path(&self) -> &[usize] {
        match self {
            Op::InsertText { path, .. }
            | Op::RemoveText { path, .. }
            | Op::InsertNode { path, .. }
            | Op::RemoveNode { path }
            | Op::SetNode { path, .. }
            | Op::SetTextMarks { path, .. }
            | Op::MoveNode { path, .. }
            | Op::SplitNode { path, .. }
            | Op::MergeNode { path, .. } => path,
        }
    }
}

/// Where `path` ends up after `op`. `None` when the node was removed.
pub fn transform_path(path: &[usize], op: &Op) -> Option<Path> {
    match op {
        Op::InsertText { .. } | Op::RemoveText { .. } | Op::SetNode { .. } | Op::SetTextMarks { .. } => {
            Some(path.to_vec())
        }
        Op::InsertNode { path: at, .. } => Some(shift_for_insert(path, at)),
        Op::RemoveNode { path: at } => {
            if path.starts_with(at) {
                return None;
            }
            Some(shift_for_remove(path, at))
        }
        Op::MoveNode { path: from, new_path } => {
            if path.starts_with(from) {
                let mut moved = new_path.clone();
                moved.extend_from_slice(&path[from.len()..]);
                return Some(moved);
            }
            Some(shift_for_insert(&shift_for_remove(path, from), new_path))
        }
        Op::SplitNode { path: at, position, .. } => {
            let depth = at.len();
            if path.len() > depth && path.starts_with(at) && path[depth] >= *position {
                let mut moved = crate::path::next(at)?;
                moved.push(path[depth] - position);
                moved.extend_from_slice(&path[depth + 1..]);
                return Some(moved);
            }
            if path == at.as_slice() {
                return Some(path.to_vec());
            }
            Some(shift_for_insert(path, &crate::path::next(at)?))
        }
        Op::MergeNode { path: at, position } => {
            let prev = crate::path::previous(at)?;
            if path.starts_with(at) {
                let depth = at.len();
                let mut moved = prev;
                if path.len() > depth {
                    moved.push(path[depth] + position);
                    moved.extend_from_slice(&path[depth + 1..]);
                }
                return Some(moved);
            }
            Some(shift_for_remove(path, at))
        }
    }
}

/// Point mapping for ops that keep the point's node alive. Removed nodes are
/// handled by the caller, which can look at the tree.
pub fn transform_point(point: &Point, op: &Op) -> Option<Point> {
    match op {
        Op::InsertText { path, offset, text } => {
            let mut point = point.clone();
            if &point.path == path && point.offset >= *offset {
                point.offset += text.len();
            }
            Some(point)
        }
        Op::RemoveText { path, range } => {
            let mut point = point.clone();
            if &point.path == path && point.offset > range.start {
                if point.offset >= range.end {
                    point.offset -= range.end - range.start;
                } else {
                    point.offset = range.start;
                }
            }
            Some(point)
        }
        Op::SplitNode { path, position, .. } if point.path == *path => {
            // A text split: the point follows the text it sits in.
            if point.offset >= *position {
                Some(Point::new(crate::path::next(path)?, point.offset - position))
            } else {
                Some(point.clone())
            }
        }
        Op::MergeNode { path, position } if point.path == *path => {
            Some(Point::new(crate::path::previous(path)?, point.offset + position))
        }
        _ => Some(Point::new(transform_path(&point.path, op)?, point.offset)),
    }
}

pub fn transform_selection(selection: &Selection, op: &Op) -> Option<Selection> {
    Some(Selection {
        anchor: transform_point(&selection.anchor, op)?,
        focus: transform_point(&selection.focus, op)?,
    })
}

pub(crate) fn shift_for_insert(path: &[usize], at: &[usize]) -> Path {
    let mut out = path.to_vec();
    let Some((&ix, parent)) = at.split_last() else {
        return out;
    };
    let depth = parent.len();
    if out.len() > depth && out.starts_with(parent) && out[depth] >= ix {
        out[depth] += 1;
    }
    out
}

fn shift_for_remove(path: &[usize], at: &[usize]) -> Path {
    let mut out = path.to_vec();
    let Some((&ix, parent)) = at.split_last() else {
        return out;
    };
    let depth = parent.len();
    if out.len() > depth && out.starts_with(parent) && out[depth] > ix {
        out[depth] -= 1;
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_shift_later_siblings() {
        let insert = Op::InsertNode {
            path: vec![1],
            node: Node::paragraph(""),
        };
        assert_eq!(transform_path(&[1, 0], &insert), Some(vec![2, 0]));
        assert_eq!(transform_path(&[0, 3], &insert), Some(vec![0, 3]));

        let remove = Op::RemoveNode { path: vec![1] };
        assert_eq!(transform_path(&[1, 0], &remove), None);
        assert_eq!(transform_path(&[2, 0], &remove), Some(vec![1, 0]));
    }

    #[test]
    fn move_carries_descendants() {
        let op = Op::MoveNode {
            path: vec![0],
            new_path: vec![1, 0],
        };
        assert_eq!(transform_path(&[0, 2], &op), Some(vec![1, 0, 2]));
        // [2] becomes [1] once [0] is gone; the node lands inside it.
        assert_eq!(transform_path(&[2], &op), Some(vec![1]));
        assert_eq!(transform_path(&[1, 0], &op), Some(vec![0, 0]));
        assert_eq!(transform_path(&[2, 0], &op), Some(vec![1, 1]));
    }

    #[test]
    fn split_and_merge_move_points() {
        let split = Op::SplitNode {
            path: vec![0, 0],
            position: 3,
            properties: None,
        };
        let p = transform_point(&Point::new(vec![0, 0], 5), &split).unwrap();
        assert_eq!(p, Point::new(vec![0, 1], 2));
        let q = transform_point(&Point::new(vec![0, 1], 1), &split).unwrap();
        assert_eq!(q, Point::new(vec![0, 2], 1));

        let merge = Op::MergeNode {
            path: vec![0, 1],
            position: 3,
        };
        let back = transform_point(&p, &merge).unwrap();
        assert_eq!(back, Point::new(vec![0, 0], 5));

        let block_split = Op::SplitNode {
            path: vec![1],
            position: 1,
            properties: None,
        };
        assert_eq!(transform_path(&[1, 2, 0], &block_split), Some(vec![2, 1, 0]));
        assert_eq!(transform_path(&[1, 0, 0], &block_split), Some(vec![1, 0, 0]));
        assert_eq!(transform_path(&[2, 0], &block_split), Some(vec![3, 0]));
    }
}
