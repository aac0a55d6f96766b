use crate::error::{CommandError, EditorError};
use crate::node::{Document, ElementKind, ElementNode, ListKind, Node, attr};
use crate::ops::{NodePatch, Path};
use crate::path::child;
use crate::transforms::Batch;

/// A list item together with the list holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContext {
    pub item: Path,
    pub list: Path,
    pub index: usize,
    pub count: usize,
    pub kind: ListKind,
}

impl ItemContext {
    /// Nearest list item enclosing `path`.
    pub fn of(doc: &Document, path: &[usize]) -> Option<Self> {
        let item = doc.ancestor_of_kind(path, ElementKind::ListItem)?;
        let (&index, list) = item.split_last()?;
        let list_el = doc.get(list)?.as_element()?;
        let kind = list_el.list_kind()?;
        Some(Self {
            list: list.to_vec(),
            count: list_el.children.len(),
            index,
            kind,
            item,
        })
    }

    /// Whether the list itself sits inside another list item.
    pub fn is_nested(&self, doc: &Document) -> bool {
        crate::path::parent(&self.list)
            .filter(|p| !p.is_empty())
            .and_then(|p| doc.get(&p).map(|n| n.is_kind(ElementKind::ListItem)))
            .unwrap_or(false)
    }
}

fn nested_list_like(list: &ElementNode) -> ElementNode {
    ElementNode::list(list.list_kind().unwrap_or(ListKind::Unordered))
}

/// Turns the selected blocks into a list of `kind`.
///
/// Inside a single list item the enclosing list is unwrapped when it already
/// has `kind` and retyped otherwise; task lists are only ever retyped. Any
/// other selection wraps each spanned top-level block in its own item and
/// joins the result with adjacent lists of the same kind.
pub fn create_list(batch: &mut Batch<'_>, kind: ListKind) -> Result<(), CommandError> {
    let selection = batch.selection().clone();
    let (start, end) = selection.edges();
    let (start, end) = (start.clone(), end.clone());

    headings_to_paragraphs(batch, &start.path, &end.path)?;

    let start_item = ItemContext::of(batch.doc(), &start.path);
    let end_item = ItemContext::of(batch.doc(), &end.path);
    if let (Some(ctx), Some(end_ctx)) = (&start_item, &end_item) {
        if ctx.item == end_ctx.item {
            tracing::trace!("create_list {:?} inside a {:?} list", kind, ctx.kind);
            if ctx.kind == kind {
                if kind != ListKind::Task {
                    unwrap_list(batch, &ctx.list)?;
                }
            } else {
                retype_list(batch, &ctx.list, kind)?;
            }
            return Ok(());
        }
    }

    let (Some(&first), Some(&last)) = (start.path.first(), end.path.first()) else {
        return Err(CommandError::unsupported("empty selection path"));
    };
    for ix in (first..=last).rev() {
        let block = batch.doc().node(&[ix])?;
        if let Some(list) = block.as_element().filter(|el| el.kind == ElementKind::List) {
            if list.list_kind() != Some(kind) {
                retype_list(batch, &[ix], kind)?;
            }
            continue;
        }
        batch.wrap_nodes(ElementNode::new(ElementKind::ListItem), &[ix], 1)?;
        batch.wrap_nodes(ElementNode::list(kind), &[ix], 1)?;
    }
    join_adjacent_lists(batch, &[], first.saturating_sub(1), last + 1)?;
    Ok(())
}

fn headings_to_paragraphs(
    batch: &mut Batch<'_>,
    start: &[usize],
    end: &[usize],
) -> Result<(), EditorError> {
    let mut blocks: Vec<Path> = Vec::new();
    for (path, _) in batch.doc().texts() {
        let before_start = crate::path::compare(&path, start).is_lt();
        let after_end = crate::path::compare(&path, end).is_gt();
        if before_start || after_end {
            continue;
        }
        if let Some(block) = batch.doc().text_block_of(&path) {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
    }
    for block in blocks {
        if batch.doc().get(&block).is_some_and(|n| n.is_kind(ElementKind::Heading)) {
            batch.set_nodes(
                &block,
                NodePatch::kind(ElementKind::Paragraph).remove(attr::LEVEL),
            )?;
        }
    }
    Ok(())
}

/// Merges neighbouring lists of the same kind among `parent`'s children
/// `from..=to`.
pub fn join_adjacent_lists(
    batch: &mut Batch<'_>,
    parent: &[usize],
    from: usize,
    to: usize,
) -> Result<(), EditorError> {
    let len = batch.doc().children_at(parent).map_or(0, <[Node]>::len);
    if len < 2 {
        return Ok(());
    }
    let to = to.min(len - 1);
    let from = from.max(1);
    for ix in (from..=to).rev() {
        let children = batch.doc().children_at(parent).unwrap_or(&[]);
        let (Some(Node::Element(left)), Some(Node::Element(right))) =
            (children.get(ix - 1), children.get(ix))
        else {
            continue;
        };
        let same = left.kind == ElementKind::List
            && right.kind == ElementKind::List
            && left.list_kind() == right.list_kind();
        if same {
            batch.merge_nodes(&child(parent, ix))?;
        }
    }
    Ok(())
}

pub fn retype_list(batch: &mut Batch<'_>, list: &[usize], kind: ListKind) -> Result<(), EditorError> {
    let patch = match kind {
        ListKind::Unordered => NodePatch::default()
            .remove(attr::ORDERED)
            .remove(attr::TASK)
            .remove(attr::START),
        ListKind::Ordered => NodePatch::default()
            .set(attr::ORDERED, true)
            .remove(attr::TASK),
        ListKind::Task => NodePatch::default()
            .set(attr::TASK, true)
            .remove(attr::ORDERED)
            .remove(attr::START),
    };
    batch.set_nodes(list, patch)
}

/// Replaces a list by the blocks of its items.
pub fn unwrap_list(batch: &mut Batch<'_>, list: &[usize]) -> Result<(), EditorError> {
    let count = batch.doc().element(list)?.children.len();
    batch.unwrap_nodes(list)?;
    let (&first, parent) = list
        .split_last()
        .ok_or_else(|| EditorError::invalid("list at the root path"))?;
    for k in (0..count).rev() {
        batch.unwrap_nodes(&child(parent, first + k))?;
    }
    Ok(())
}

/// Nests the item under its previous sibling. Returns false for the first
/// item of a list, which has nothing to nest under.
pub fn indent_item(batch: &mut Batch<'_>, item: &[usize]) -> Result<bool, EditorError> {
    let Some(ctx) = ItemContext::of(batch.doc(), item) else {
        return Ok(false);
    };
    if ctx.index == 0 {
        return Ok(false);
    }
    let prev = child(&ctx.list, ctx.index - 1);
    let prev_el = batch.doc().element(&prev)?;
    let prev_len = prev_el.children.len();

    let target = match prev_el.children.last() {
        Some(Node::Element(last)) if last.kind == ElementKind::List => child(&prev, prev_len - 1),
        _ => {
            let list_el = batch.doc().element(&ctx.list)?;
            let nested = nested_list_like(list_el);
            let path = child(&prev, prev_len);
            batch.insert_nodes(&path, vec![Node::Element(nested)])?;
            path
        }
    };
    let target_len = batch.doc().element(&target)?.children.len();
    tracing::trace!("indent {:?} into {:?}", ctx.item, target);
    batch.move_nodes(&ctx.item, &child(&target, target_len))?;
    Ok(true)
}

/// Moves a nested item out to its parent list, right after its parent item.
/// The item's following siblings come along as its own children. Returns
/// false for items of a top-level list.
pub fn outdent_item(batch: &mut Batch<'_>, item: &[usize]) -> Result<bool, EditorError> {
    let Some(ctx) = ItemContext::of(batch.doc(), item) else {
        return Ok(false);
    };
    if !ctx.is_nested(batch.doc()) {
        return Ok(false);
    }
    let Some(parent_item) = crate::path::parent(&ctx.list) else {
        return Ok(false);
    };

    let following = ctx.count - ctx.index - 1;
    if following > 0 {
        let item_el = batch.doc().element(&ctx.item)?;
        let item_len = item_el.children.len();
        let target = match item_el.children.last() {
            Some(Node::Element(last)) if last.kind == ElementKind::List => {
                child(&ctx.item, item_len - 1)
            }
            _ => {
                let nested = nested_list_like(batch.doc().element(&ctx.list)?);
                let path = child(&ctx.item, item_len);
                batch.insert_nodes(&path, vec![Node::Element(nested)])?;
                path
            }
        };
        let target_len = batch.doc().element(&target)?.children.len();
        for k in 0..following {
            batch.move_nodes(&child(&ctx.list, ctx.index + 1), &child(&target, target_len + k))?;
        }
    }

    let destination = crate::path::next(&parent_item)
        .ok_or_else(|| EditorError::invalid("list item without a parent"))?;
    batch.move_nodes(&ctx.item, &destination)?;
    if ctx.index == 0 {
        batch.remove_nodes(&ctx.list)?;
    }
    Ok(true)
}
