use crate::error::EditorError;
use crate::list::{ItemContext, outdent_item};
use crate::node::{Document, ElementKind, ElementNode, Marks, Node, attr};
use crate::ops::{NodePatch, Op, Path};
use crate::path::child;
use crate::selection::Selection;
use crate::table::CellPosition;
use crate::transforms::Batch;

/// Backspace decision table. Rules are tried top to bottom and the first
/// one that applies wins; `false` hands the key back to the default delete.
pub(super) fn handle(batch: &mut Batch<'_>) -> Result<bool, EditorError> {
    let selection = batch.selection().clone();
    if !selection.is_collapsed() {
        return clear_whole_document(batch, &selection);
    }
    let point = selection.focus;
    let Some(leaf) = batch.doc().leaf(&point.path).cloned() else {
        return Ok(false);
    };
    let Some(block) = batch.doc().text_block_of(&point.path) else {
        return Ok(false);
    };
    let block_el = batch.doc().element(&block)?.clone();

    if point.offset != 0 {
        return clear_dirty_leaf(batch, &point.path, point.offset, &leaf.marks, &leaf.text, &block_el);
    }
    let empty = block_el.string().is_empty();

    if block_el.kind == ElementKind::Heading && empty {
        tracing::trace!("backspace: empty heading to paragraph");
        batch.set_nodes(&block, NodePatch::kind(ElementKind::Paragraph).remove(attr::LEVEL))?;
        return Ok(true);
    }

    if block_el.kind.is_void() {
        tracing::trace!("backspace: cursor inside a void block");
        replace_with_paragraph(batch, &block)?;
        return Ok(true);
    }

    if block_el.kind == ElementKind::Paragraph && empty {
        if remove_empty_item(batch, &block)? {
            return Ok(true);
        }
    }

    if let Some(prev) = previous_inline(batch.doc(), &point.path) {
        if batch.doc().get(&prev).is_some_and(|n| n.is_kind(ElementKind::Break)) {
            tracing::trace!("backspace: removing break");
            batch.remove_nodes(&prev)?;
            return Ok(true);
        }
    }

    if let Some(cell) = CellPosition::of(batch.doc(), &block) {
        let cell_start = batch.doc().first_text_point(&cell.cell_path());
        if cell_start.as_ref() == Some(&point) {
            return Ok(true);
        }
    }

    if block_el.kind == ElementKind::Paragraph {
        if let Some(prev) = batch.doc().previous(&block) {
            let prev_el = batch.doc().element(&prev)?;
            let prev_empty = prev_el.string().is_empty();
            match prev_el.kind {
                ElementKind::Table | ElementKind::CodeBlock if prev_empty => {
                    let Some(target) = batch.doc().last_text_point(&prev) else {
                        return Ok(false);
                    };
                    let Some(target_block) = batch.doc().text_block_of(&target.path) else {
                        return Ok(false);
                    };
                    tracing::trace!("backspace: merging into empty {:?}", prev_el.kind);
                    join_blocks(batch, &target_block, &block)?;
                    return Ok(true);
                }
                ElementKind::Media | ElementKind::Chart => {
                    tracing::trace!("backspace: removing preceding media");
                    batch.remove_nodes(&prev)?;
                    return Ok(true);
                }
                _ => {}
            }
        }
    }

    if let Some((quote, ix)) = quoted_block(batch.doc(), &block) {
        if ix == 0 {
            tracing::trace!("backspace: lifting out of blockquote");
            batch.lift_nodes(&block)?;
            return Ok(true);
        }
        let prev = child(&quote, ix - 1);
        let Some(target) = batch.doc().last_text_point(&prev) else {
            return Ok(false);
        };
        let Some(target_block) = batch.doc().text_block_of(&target.path) else {
            return Ok(false);
        };
        if batch.doc().element(&target_block)?.kind.is_void() {
            return Ok(false);
        }
        join_blocks(batch, &target_block, &block)?;
        return Ok(true);
    }

    if block == [0] {
        let Some(next) = batch.doc().next(&block) else {
            return Ok(false);
        };
        if batch.doc().node(&next)?.is_kind(ElementKind::HorizontalRule) {
            return Ok(false);
        }
        if empty {
            tracing::trace!("backspace: dropping empty first block");
            batch.remove_nodes(&block)?;
            batch.select_start_of(&[0])?;
        } else if block_el.kind == ElementKind::Heading {
            batch.set_nodes(&block, NodePatch::kind(ElementKind::Paragraph).remove(attr::LEVEL))?;
        } else if block_el.kind == ElementKind::Paragraph {
            let next_el = batch.doc().element(&next)?;
            if next_el.kind.holds_inline() && !next_el.kind.is_literal() {
                tracing::trace!("backspace: merging first block forward");
                merge_forward(batch, &block, &next)?;
            }
        }
        return Ok(true);
    }

    if let Some(ctx) = ItemContext::of(batch.doc(), &block) {
        let at_item_start = block == child(&ctx.item, 0);
        if at_item_start && ctx.is_nested(batch.doc()) {
            tracing::trace!("backspace: lifting nested item");
            return outdent_item(batch, &ctx.item);
        }
    }

    clear_dirty_leaf(batch, &point.path, 0, &leaf.marks, &leaf.text, &block_el)
}

fn clear_whole_document(batch: &mut Batch<'_>, selection: &Selection) -> Result<bool, EditorError> {
    let Some(whole) = Selection::whole(batch.doc()) else {
        return Ok(false);
    };
    let (start, end) = selection.edges();
    let (doc_start, doc_end) = whole.edges();
    if start != doc_start || end != doc_end {
        return Ok(false);
    }
    tracing::trace!("backspace: clearing the whole document");
    batch.replace_document(Document::new(vec![Node::paragraph("")]))?;
    Ok(true)
}

// A one-character leaf carrying formatting, outside a plain paragraph, loses
// its formatting rather than its character.
fn clear_dirty_leaf(
    batch: &mut Batch<'_>,
    leaf_path: &[usize],
    offset: usize,
    marks: &Marks,
    text: &str,
    block: &ElementNode,
) -> Result<bool, EditorError> {
    let single = text.chars().count() == 1;
    if !single || offset > text.len() || !marks.is_dirty() || block.kind == ElementKind::Paragraph {
        return Ok(false);
    }
    tracing::trace!("backspace: clearing marks on a single dirty character");
    batch.set_marks(leaf_path, Marks::default())?;
    Ok(true)
}

fn replace_with_paragraph(batch: &mut Batch<'_>, at: &[usize]) -> Result<(), EditorError> {
    batch.remove_nodes(at)?;
    batch.insert_nodes(at, vec![Node::paragraph("")])?;
    batch.select_start_of(at)
}

// The node right before the leaf inside its block, if any.
fn previous_inline(doc: &Document, leaf: &[usize]) -> Option<Path> {
    let prev = crate::path::previous(leaf)?;
    doc.has_path(&prev).then_some(prev)
}

fn quoted_block(doc: &Document, block: &[usize]) -> Option<(Path, usize)> {
    let (&ix, parent) = block.split_last()?;
    doc.get(parent)
        .filter(|n| n.is_kind(ElementKind::Blockquote))
        .map(|_| (parent.to_vec(), ix))
}

// Cursor in the empty, only paragraph of a list item.
fn remove_empty_item(batch: &mut Batch<'_>, block: &[usize]) -> Result<bool, EditorError> {
    let Some(ctx) = ItemContext::of(batch.doc(), block) else {
        return Ok(false);
    };
    let item_children = batch.doc().element(&ctx.item)?.children.len();
    if block != child(&ctx.item, 0).as_slice() || item_children != 1 {
        return Ok(false);
    }
    let list_next = crate::path::next(&ctx.list)
        .ok_or_else(|| EditorError::invalid("list without a parent"))?;

    let paragraph_at = if ctx.count == 1 || (ctx.index == 0 && ctx.count == 2) {
        tracing::trace!("backspace: removing the whole list");
        batch.remove_nodes(&ctx.list)?;
        ctx.list.clone()
    } else if ctx.index + 1 == ctx.count {
        tracing::trace!("backspace: removing last empty item");
        batch.remove_nodes(&ctx.item)?;
        list_next
    } else {
        tracing::trace!("backspace: removing empty item and the items after it");
        for ix in (ctx.index..ctx.count).rev() {
            batch.remove_nodes(&child(&ctx.list, ix))?;
        }
        if ctx.index == 0 {
            batch.remove_nodes(&ctx.list)?;
            ctx.list.clone()
        } else {
            list_next
        }
    };
    batch.insert_nodes(&paragraph_at, vec![Node::paragraph("")])?;
    batch.select_start_of(&paragraph_at)?;
    Ok(true)
}

// Moves the inline content of `tail` to the end of `head` and drops `tail`.
fn join_blocks(batch: &mut Batch<'_>, head: &[usize], tail: &[usize]) -> Result<(), EditorError> {
    let head_len = batch.doc().element(head)?.children.len();
    let tail_len = batch.doc().element(tail)?.children.len();
    for k in 0..tail_len {
        batch.move_nodes(&child(tail, 0), &child(head, head_len + k))?;
    }
    let end = batch
        .doc()
        .last_text_point(head)
        .ok_or_else(|| EditorError::PathNotFound(head.to_vec()))?;
    let cursor = batch.selection().focus.clone();
    batch.remove_nodes(tail)?;
    if batch.doc().leaf(&cursor.path).is_none() {
        batch.collapse_to(end);
    }
    Ok(())
}

// Moves the inline content of `head` to the start of `tail` and drops `head`.
fn merge_forward(batch: &mut Batch<'_>, head: &[usize], tail: &[usize]) -> Result<(), EditorError> {
    let head_len = batch.doc().element(head)?.children.len();
    for k in (0..head_len).rev() {
        batch.move_nodes(&child(head, k), &child(tail, 0))?;
    }
    batch.remove_nodes(head)?;
    batch.select_start_of(head)
}

/// The default backward delete used when no rule consumed the key.
pub(super) fn delete_backward(batch: &mut Batch<'_>) -> Result<(), EditorError> {
    let selection = batch.selection().clone();
    if !selection.is_collapsed() {
        batch.delete_range(&selection)?;
        return Ok(());
    }
    let point = selection.focus;
    let text = batch
        .doc()
        .leaf(&point.path)
        .map(|leaf| leaf.text.clone())
        .ok_or_else(|| EditorError::PathNotFound(point.path.clone()))?;

    if point.offset > 0 {
        let start = text[..point.offset]
            .char_indices()
            .next_back()
            .map_or(0, |(ix, _)| ix);
        return batch.apply_op(Op::RemoveText {
            path: point.path,
            range: start..point.offset,
        });
    }

    let Some(prev) = batch.doc().point_before(&point.path) else {
        return Ok(());
    };
    let prev_block = batch.doc().text_block_of(&prev.path);
    let block = batch.doc().text_block_of(&point.path);
    if prev_block == block {
        if prev.offset == 0 {
            return Ok(());
        }
        let prev_text = batch.doc().leaf(&prev.path).map(|l| l.text.clone()).unwrap_or_default();
        let start = prev_text[..prev.offset]
            .char_indices()
            .next_back()
            .map_or(0, |(ix, _)| ix);
        return batch.apply_op(Op::RemoveText {
            path: prev.path,
            range: start..prev.offset,
        });
    }
    if let Some(prev_block) = prev_block {
        if batch.doc().element(&prev_block)?.kind.is_void() {
            return batch.remove_nodes(&prev_block);
        }
    }
    batch.delete_range(&Selection::new(prev, point))?;
    Ok(())
}
