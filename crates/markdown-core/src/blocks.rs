use crate::error::CommandError;
use crate::node::{ElementKind, ElementNode, Node, attr};
use crate::ops::{NodePatch, Path};
use crate::path::child;
use crate::transforms::Batch;

fn focus_block(batch: &Batch<'_>) -> Result<Path, CommandError> {
    batch
        .doc()
        .text_block_of(&batch.selection().focus.path)
        .ok_or_else(|| CommandError::unsupported("selection is not inside a text block"))
}

/// Turns the focused paragraph or heading into a heading of `level`,
/// clamped to 1..=4.
pub fn set_heading(batch: &mut Batch<'_>, level: u8) -> Result<(), CommandError> {
    let block = focus_block(batch)?;
    let kind = batch.doc().node(&block)?.kind();
    if !matches!(kind, Some(ElementKind::Paragraph | ElementKind::Heading)) {
        return Err(CommandError::unsupported(format!(
            "cannot turn {kind:?} into a heading"
        )));
    }
    let level = level.clamp(1, 4);
    batch.set_nodes(
        &block,
        NodePatch::kind(ElementKind::Heading).set(attr::LEVEL, level),
    )?;
    Ok(())
}

pub fn unset_heading(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let block = focus_block(batch)?;
    if !batch.doc().node(&block)?.is_kind(ElementKind::Heading) {
        return Ok(());
    }
    batch.set_nodes(
        &block,
        NodePatch::kind(ElementKind::Paragraph).remove(attr::LEVEL),
    )?;
    Ok(())
}

/// Lifts the focused block out of its blockquote, or wraps the focused
/// top-level block in a new one.
pub fn toggle_blockquote(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let focus = batch.selection().focus.path.clone();
    if let Some(quote) = batch.doc().ancestor_of_kind(&focus, ElementKind::Blockquote) {
        let Some(&ix) = focus.get(quote.len()) else {
            return Err(CommandError::unsupported("selection is on the blockquote itself"));
        };
        batch.lift_nodes(&child(&quote, ix))?;
        return Ok(());
    }
    let Some(&top) = focus.first() else {
        return Err(CommandError::unsupported("empty selection path"));
    };
    batch.wrap_nodes(ElementNode::new(ElementKind::Blockquote), &[top], 1)?;
    Ok(())
}

/// An empty paragraph under the cursor stays below the new rule; otherwise
/// the rule and a fresh paragraph follow the focused block.
pub fn insert_horizontal_rule(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let block = focus_block(batch)?;
    let empty_paragraph = batch
        .doc()
        .get(&block)
        .is_some_and(|n| n.is_kind(ElementKind::Paragraph) && n.string().is_empty());
    if empty_paragraph {
        batch.insert_nodes(&block, vec![Node::horizontal_rule()])?;
        let paragraph = crate::path::next(&block)
            .ok_or_else(|| CommandError::unsupported("cannot insert at the document root"))?;
        batch.select_start_of(&paragraph)?;
        return Ok(());
    }
    let next = crate::path::next(&block)
        .ok_or_else(|| CommandError::unsupported("cannot insert at the document root"))?;
    batch.insert_nodes(&next, vec![Node::horizontal_rule(), Node::paragraph("")])?;
    let paragraph = crate::path::next(&next)
        .ok_or_else(|| CommandError::unsupported("cannot insert at the document root"))?;
    batch.select_start_of(&paragraph)?;
    Ok(())
}
