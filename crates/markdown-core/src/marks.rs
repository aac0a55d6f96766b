use crate::error::{CommandError, EditorError};
use crate::node::{Document, MarkKind};
use crate::ops::{Op, Path, transform_path};
use crate::path::compare;
use crate::selection::{Point, Selection};
use crate::transforms::Batch;

fn leaf_len(doc: &Document, path: &[usize]) -> Result<usize, EditorError> {
    doc.leaf(path)
        .map(|t| t.text.len())
        .ok_or_else(|| EditorError::PathNotFound(path.to_vec()))
}

// Placeholder leaves of voids and the verbatim text of code blocks never
// carry marks.
fn accepts_marks(doc: &Document, leaf: &[usize]) -> bool {
    let Some((_, parent)) = leaf.split_last() else {
        return false;
    };
    doc.get(parent)
        .and_then(|n| n.kind())
        .is_some_and(|kind| !kind.is_void() && !kind.is_literal())
}

/// Sets `mark` on every leaf of the selection, or clears it when every leaf
/// already has it. Leaves are split at the selection edges.
pub fn toggle_mark(batch: &mut Batch<'_>, mark: MarkKind) -> Result<(), CommandError> {
    let selection = batch.selection().clone();
    if selection.is_collapsed() {
        return Ok(());
    }
    let backward = selection.is_backward();
    let (start, end) = selection.edges();
    let (start, end) = (start.clone(), end.clone());

    let end_len = leaf_len(batch.doc(), &end.path)?;
    if end.offset > 0 && end.offset < end_len {
        batch.split_node(&end.path, end.offset)?;
    }

    let mut first: Path = start.path.clone();
    let mut last: Path = end.path.clone();
    let start_len = leaf_len(batch.doc(), &start.path)?;
    let mut skip_first = start.offset >= start_len && start.path != end.path;
    if start.offset > 0 && start.offset < start_len {
        let op = Op::SplitNode {
            path: start.path.clone(),
            position: start.offset,
            properties: None,
        };
        first = crate::path::next(&start.path)
            .ok_or_else(|| EditorError::invalid("cannot split the root"))?;
        last = if start.path == end.path {
            first.clone()
        } else {
            transform_path(&last, &op).unwrap_or(last)
        };
        batch.apply_op(op)?;
        skip_first = false;
    }
    let skip_last = end.offset == 0 && first != last;

    let doc = batch.doc();
    let leaves: Vec<Path> = doc
        .texts()
        .into_iter()
        .filter(|(path, leaf)| {
            compare(path, &first).is_ge()
                && compare(path, &last).is_le()
                && !leaf.text.is_empty()
                && !(skip_first && *path == first)
                && !(skip_last && *path == last)
                && accepts_marks(doc, path)
        })
        .map(|(path, _)| path)
        .collect();
    let (Some(head), Some(tail)) = (leaves.first().cloned(), leaves.last().cloned()) else {
        return Ok(());
    };

    let on = !leaves.iter().all(|path| {
        doc.leaf(path)
            .is_some_and(|leaf| mark.is_set(&leaf.marks))
    });
    tracing::trace!("toggle {:?} -> {} over {} leaves", mark, on, leaves.len());
    for path in &leaves {
        let mut marks = batch
            .doc()
            .leaf(path)
            .map(|leaf| leaf.marks.clone())
            .unwrap_or_default();
        mark.set(&mut marks, on);
        batch.set_marks(path, marks)?;
    }

    let head = Point::new(head, 0);
    let tail_len = leaf_len(batch.doc(), &tail)?;
    let tail = Point::new(tail, tail_len);
    batch.select(if backward {
        Selection::new(tail, head)
    } else {
        Selection::new(head, tail)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Editor;
    use crate::node::Node;

    #[test]
    fn toggles_bold_over_part_of_a_leaf() {
        let doc = Document::new(vec![Node::paragraph("hello world")]);
        let selection = Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 5));
        let mut editor = Editor::new(doc, selection);

        editor
            .transact("test:bold", |batch| toggle_mark(batch, MarkKind::Bold))
            .unwrap();
        let first = editor.doc().leaf(&[0, 0]).unwrap();
        assert_eq!(first.text, "hello");
        assert!(first.marks.bold);
        assert!(!editor.doc().leaf(&[0, 1]).unwrap().marks.bold);

        editor
            .transact("test:bold", |batch| toggle_mark(batch, MarkKind::Bold))
            .unwrap();
        let paragraph = editor.doc().element(&[0]).unwrap();
        assert_eq!(paragraph.children.len(), 1);
        assert_eq!(editor.doc().leaf(&[0, 0]).unwrap().text, "hello world");
    }

    #[test]
    fn middle_of_leaf_is_split_twice() {
        let doc = Document::new(vec![Node::paragraph("abcdef")]);
        let selection = Selection::new(Point::new(vec![0, 0], 2), Point::new(vec![0, 0], 4));
        let mut editor = Editor::new(doc, selection);
        editor
            .transact("test:italic", |batch| toggle_mark(batch, MarkKind::Italic))
            .unwrap();
        let texts: Vec<_> = editor
            .doc()
            .texts()
            .into_iter()
            .map(|(_, leaf)| (leaf.text.clone(), leaf.marks.italic))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("ab".to_string(), false),
                ("cd".to_string(), true),
                ("ef".to_string(), false),
            ]
        );
    }
}
