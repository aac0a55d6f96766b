use crate::error::EditorError;
use crate::list::{ItemContext, indent_item, outdent_item};
use crate::node::{Document, ElementKind};
use crate::ops::{Op, Path};
use crate::path::{child, compare};
use crate::selection::{Point, Selection};
use crate::table::CellPosition;
use crate::transforms::Batch;

const TAB: &str = "\t";

/// Tab always consumes the key; the rules only decide what it does.
pub(super) fn handle(batch: &mut Batch<'_>, shift: bool) -> Result<bool, EditorError> {
    let selection = batch.selection().clone();
    if !selection.is_collapsed() {
        return handle_range(batch, &selection, shift);
    }
    let focus = selection.focus;

    if let Some(cell) = CellPosition::of(batch.doc(), &focus.path) {
        return move_between_cells(batch, &cell, &focus, shift);
    }

    if let Some(ctx) = ItemContext::of(batch.doc(), &focus.path) {
        if shift {
            if !outdent_item(batch, &ctx.item)? {
                remove_leading_tab(batch, &focus.path)?;
            }
        } else if !indent_item(batch, &ctx.item)? {
            batch.insert_text(TAB, None)?;
        }
        return Ok(true);
    }

    if shift {
        remove_leading_tab(batch, &focus.path)?;
    } else {
        batch.insert_text(TAB, None)?;
    }
    Ok(true)
}

fn move_between_cells(
    batch: &mut Batch<'_>,
    cell: &CellPosition,
    focus: &Point,
    shift: bool,
) -> Result<bool, EditorError> {
    if shift {
        if let Some(prev) = cell.previous(batch.doc()) {
            batch.select_end_of(&prev.cell_path())?;
        }
        return Ok(true);
    }
    let cell_end = batch.doc().last_text_point(&cell.cell_path());
    if cell_end.as_ref() != Some(focus) {
        batch.insert_text(TAB, None)?;
        return Ok(true);
    }
    if let Some(next) = cell.next(batch.doc()) {
        batch.select_start_of(&next.cell_path())?;
    }
    Ok(true)
}

fn handle_range(batch: &mut Batch<'_>, selection: &Selection, shift: bool) -> Result<bool, EditorError> {
    let (start, end) = selection.edges();
    let (start, end) = (start.clone(), end.clone());
    let doc = batch.doc();

    let start_block = doc.text_block_of(&start.path);
    let in_code = start_block.is_some()
        && start_block == doc.text_block_of(&end.path)
        && start_block
            .as_ref()
            .and_then(|b| doc.get(b))
            .is_some_and(|n| n.is_kind(ElementKind::CodeBlock));
    if in_code && start.path == end.path {
        indent_lines(batch, &start, &end, shift)?;
        return Ok(true);
    }

    if shift {
        let items = items_between(doc, &start.path, &end.path);
        if !items.is_empty() {
            for item in items.into_iter().rev() {
                if batch.doc().has_path(&item) {
                    outdent_item(batch, &item)?;
                }
            }
            return Ok(true);
        }
        if let Some(quote) = doc.ancestor_of_kind(&start.path, ElementKind::Blockquote) {
            if let Some(&ix) = start.path.get(quote.len()) {
                batch.lift_nodes(&child(&quote, ix))?;
                return Ok(true);
            }
        }
        for block in blocks_between(batch.doc(), &start.path, &end.path).into_iter().rev() {
            if let Some(point) = batch.doc().first_text_point(&block) {
                remove_leading_tab(batch, &point.path)?;
            }
        }
        return Ok(true);
    }

    batch.collapse_to(end);
    batch.insert_text(TAB, None)?;
    Ok(true)
}

// Inserts or strips a tab at the start of every line the range touches.
fn indent_lines(batch: &mut Batch<'_>, start: &Point, end: &Point, shift: bool) -> Result<(), EditorError> {
    let text = batch
        .doc()
        .leaf(&start.path)
        .map(|leaf| leaf.text.clone())
        .ok_or_else(|| EditorError::PathNotFound(start.path.clone()))?;
    let first_line = text[..start.offset].rfind('\n').map_or(0, |ix| ix + 1);
    let mut line_starts = vec![first_line];
    line_starts.extend(
        text[first_line..end.offset]
            .match_indices('\n')
            .map(|(ix, _)| first_line + ix + 1),
    );
    for at in line_starts.into_iter().rev() {
        if shift {
            if text[at..].starts_with(TAB) {
                batch.apply_op(Op::RemoveText {
                    path: start.path.clone(),
                    range: at..at + TAB.len(),
                })?;
            }
        } else {
            batch.apply_op(Op::InsertText {
                path: start.path.clone(),
                offset: at,
                text: TAB.to_string(),
            })?;
        }
    }
    Ok(())
}

fn remove_leading_tab(batch: &mut Batch<'_>, leaf: &[usize]) -> Result<(), EditorError> {
    let Some(block) = batch.doc().text_block_of(leaf) else {
        return Ok(());
    };
    let Some(first) = batch.doc().first_text_point(&block) else {
        return Ok(());
    };
    let starts_with_tab = batch
        .doc()
        .leaf(&first.path)
        .is_some_and(|leaf| leaf.text.starts_with(TAB));
    if starts_with_tab {
        batch.apply_op(Op::RemoveText {
            path: first.path,
            range: 0..TAB.len(),
        })?;
    }
    Ok(())
}

fn in_range(path: &[usize], start: &[usize], end: &[usize]) -> bool {
    compare(path, start).is_ge() && compare(path, end).is_le()
}

fn items_between(doc: &Document, start: &[usize], end: &[usize]) -> Vec<Path> {
    let mut items: Vec<Path> = Vec::new();
    for (path, _) in doc.texts() {
        if !in_range(&path, start, end) {
            continue;
        }
        if let Some(ctx) = ItemContext::of(doc, &path) {
            if !items.contains(&ctx.item) {
                items.push(ctx.item);
            }
        }
    }
    items
}

fn blocks_between(doc: &Document, start: &[usize], end: &[usize]) -> Vec<Path> {
    let mut blocks: Vec<Path> = Vec::new();
    for (path, _) in doc.texts() {
        if !in_range(&path, start, end) {
            continue;
        }
        if let Some(block) = doc.text_block_of(&path) {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
    }
    blocks
}
