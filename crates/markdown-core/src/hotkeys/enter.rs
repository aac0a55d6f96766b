use crate::error::EditorError;
use crate::list::{ItemContext, outdent_item};
use crate::node::{ElementKind, ListKind, Node, attr};
use crate::ops::{NodePatch, Path};
use crate::path::child;
use crate::selection::Point;
use crate::table::{CellPosition, insert_row};
use crate::transforms::Batch;

use super::autoformat;

/// Enter decision table. Shift+Enter is always left to the host, which
/// inserts a soft break.
pub(super) fn handle(batch: &mut Batch<'_>, shift: bool, ctrl: bool) -> Result<bool, EditorError> {
    if shift {
        return Ok(false);
    }
    let selection = batch.selection().clone();
    let point = if selection.is_collapsed() {
        selection.focus
    } else {
        let point = batch.delete_range(&selection)?;
        batch.collapse_to(point.clone());
        point
    };
    if batch.doc().leaf(&point.path).is_none() {
        return Ok(false);
    }
    let Some(block) = batch.doc().text_block_of(&point.path) else {
        return Ok(false);
    };
    let block_el = batch.doc().element(&block)?;
    let kind = block_el.kind;
    let empty = block_el.string().is_empty();

    if kind.is_literal() {
        batch.insert_text("\n", Some(point))?;
        return Ok(true);
    }

    if kind.is_void() {
        tracing::trace!("enter: paragraph after a void block");
        let next = crate::path::next(&block).ok_or_else(|| EditorError::invalid("void block at the root"))?;
        batch.insert_nodes(&next, vec![Node::paragraph("")])?;
        batch.select_start_of(&next)?;
        return Ok(true);
    }

    if CellPosition::of(batch.doc(), &block).is_some() {
        if !ctrl {
            return Ok(false);
        }
        tracing::trace!("enter: new table row");
        insert_row(batch, false).map_err(autoformat::into_editor_error)?;
        return Ok(true);
    }

    if kind == ElementKind::Paragraph && autoformat::fence_on_enter(batch)? {
        return Ok(true);
    }

    if let Some(ctx) = ItemContext::of(batch.doc(), &block) {
        if block == child(&ctx.item, 0) {
            return list_item(batch, &ctx, &block, &point, empty, ctrl);
        }
    }

    let at_start = batch.doc().first_text_point(&block).as_ref() == Some(&point);

    if kind == ElementKind::Paragraph && empty {
        if let Some(quote) = crate::path::parent(&block) {
            let last_in_quote = !quote.is_empty()
                && batch.doc().get(&quote).is_some_and(|n| n.is_kind(ElementKind::Blockquote))
                && batch.doc().next(&block).is_none();
            if last_in_quote {
                tracing::trace!("enter: leaving blockquote");
                let lifted = batch.lift_nodes(&block)?;
                batch.select_start_of(&lifted)?;
                return Ok(true);
            }
        }
    }

    if kind == ElementKind::Heading {
        if at_start && !empty {
            batch.insert_nodes(&block, vec![Node::paragraph("")])?;
            return Ok(true);
        }
        let new_block = batch.split_block(&point)?;
        batch.set_nodes(
            &new_block,
            NodePatch::kind(ElementKind::Paragraph).remove(attr::LEVEL),
        )?;
        return Ok(true);
    }

    batch.split_block(&point)?;
    Ok(true)
}

fn list_item(
    batch: &mut Batch<'_>,
    ctx: &ItemContext,
    block: &[usize],
    point: &Point,
    empty: bool,
    ctrl: bool,
) -> Result<bool, EditorError> {
    let item_next = crate::path::next(&ctx.item).ok_or_else(|| EditorError::invalid("item at the root"))?;

    if ctrl {
        tracing::trace!("enter: new item below");
        batch.insert_nodes(&item_next, vec![Node::list_item(vec![Node::paragraph("")])])?;
        batch.select_start_of(&item_next)?;
        return Ok(true);
    }

    let only_child = batch.doc().element(&ctx.item)?.children.len() == 1;
    if empty && only_child {
        if ctx.is_nested(batch.doc()) {
            tracing::trace!("enter: outdenting empty nested item");
            return outdent_item(batch, &ctx.item);
        }
        exit_list(batch, ctx)?;
        return Ok(true);
    }

    let at_start = batch.doc().first_text_point(block).as_ref() == Some(point);
    if at_start && !empty {
        tracing::trace!("enter: new item above");
        batch.insert_nodes(&ctx.item, vec![Node::list_item(vec![Node::paragraph("")])])?;
        return Ok(true);
    }

    tracing::trace!("enter: splitting item");
    batch.split_block(point)?;
    batch.split_node(&ctx.item, 1)?;
    if ctx.kind == ListKind::Task {
        batch.set_nodes(&item_next, NodePatch::default().set(attr::CHECKED, false))?;
    }
    batch.select_start_of(&item_next)?;
    Ok(true)
}

// Turns the empty top-level item into a paragraph, splitting the list in two
// when the item sits in the middle.
fn exit_list(batch: &mut Batch<'_>, ctx: &ItemContext) -> Result<(), EditorError> {
    let list_next: Path =
        crate::path::next(&ctx.list).ok_or_else(|| EditorError::invalid("list without a parent"))?;
    let paragraph_at = if ctx.count == 1 {
        batch.remove_nodes(&ctx.list)?;
        ctx.list.clone()
    } else if ctx.index == 0 {
        batch.remove_nodes(&ctx.item)?;
        ctx.list.clone()
    } else {
        if ctx.index + 1 < ctx.count {
            batch.split_node(&ctx.list, ctx.index + 1)?;
        }
        batch.remove_nodes(&ctx.item)?;
        list_next
    };
    tracing::trace!("enter: leaving the list at {:?}", paragraph_at);
    batch.insert_nodes(&paragraph_at, vec![Node::paragraph("")])?;
    batch.select_start_of(&paragraph_at)?;
    Ok(())
}
