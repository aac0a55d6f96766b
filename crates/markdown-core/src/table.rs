use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::node::{Document, ElementKind, ElementNode, Node, attr};
use crate::ops::{NodePatch, Path};
use crate::path::child;
use crate::transforms::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" => Some(Align::Right),
            _ => None,
        }
    }
}

pub fn table_cell_node(text: &str) -> Node {
    Node::element(ElementKind::TableCell, vec![Node::paragraph(text)])
}

pub fn table_row_node(cols: usize) -> Node {
    let cols = cols.max(1);
    Node::element(
        ElementKind::TableRow,
        (0..cols).map(|_| table_cell_node("")).collect(),
    )
}

pub fn table_node(rows: usize, cols: usize) -> Node {
    let rows = rows.max(1);
    Node::element(
        ElementKind::Table,
        (0..rows).map(|_| table_row_node(cols)).collect(),
    )
}

/// Position of a leaf inside the nearest enclosing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPosition {
    pub table: Path,
    pub row: usize,
    pub col: usize,
}

impl CellPosition {
    pub fn of(doc: &Document, path: &[usize]) -> Option<Self> {
        let cell = doc.ancestor_of_kind(path, ElementKind::TableCell)?;
        let (&col, row_path) = cell.split_last()?;
        let (&row, table) = row_path.split_last()?;
        if !doc.get(table)?.is_kind(ElementKind::Table) {
            return None;
        }
        Some(Self {
            table: table.to_vec(),
            row,
            col,
        })
    }

    pub fn row_path(&self) -> Path {
        child(&self.table, self.row)
    }

    pub fn cell_path(&self) -> Path {
        child(&self.row_path(), self.col)
    }

    fn table<'a>(&self, doc: &'a Document) -> Option<&'a ElementNode> {
        doc.get(&self.table)?.as_element()
    }

    fn row_len(&self, doc: &Document, row: usize) -> usize {
        self.table(doc)
            .and_then(|t| t.children.get(row))
            .map_or(0, |r| r.children().len())
    }

    /// The next cell in reading order, wrapping to the next row.
    pub fn next(&self, doc: &Document) -> Option<Self> {
        let rows = self.table(doc)?.children.len();
        if self.col + 1 < self.row_len(doc, self.row) {
            return Some(Self {
                col: self.col + 1,
                ..self.clone()
            });
        }
        (self.row + 1 < rows).then(|| Self {
            table: self.table.clone(),
            row: self.row + 1,
            col: 0,
        })
    }

    pub fn previous(&self, doc: &Document) -> Option<Self> {
        if self.col > 0 {
            return Some(Self {
                col: self.col - 1,
                ..self.clone()
            });
        }
        let row = self.row.checked_sub(1)?;
        let len = self.row_len(doc, row);
        Some(Self {
            table: self.table.clone(),
            row,
            col: len.checked_sub(1)?,
        })
    }
}

fn focus_cell(batch: &Batch<'_>) -> Result<CellPosition, CommandError> {
    CellPosition::of(batch.doc(), &batch.selection().focus.path)
        .ok_or_else(|| CommandError::unsupported("selection is not inside a table"))
}

/// Inserts a `rows` x `cols` table after the focused block, or in place of
/// it when the block is an empty paragraph. Inside a table cell the new
/// table is nested in that cell.
pub fn insert_table(batch: &mut Batch<'_>, rows: usize, cols: usize) -> Result<(), CommandError> {
    let focus = batch.selection().focus.clone();
    let block = batch
        .doc()
        .text_block_of(&focus.path)
        .ok_or_else(|| CommandError::unsupported("selection is not inside a block"))?;
    let table = table_node(rows, cols);

    let replace = batch.doc().get(&block).is_some_and(|n| {
        n.is_kind(ElementKind::Paragraph) && n.string().is_empty()
    });
    let in_cell = CellPosition::of(batch.doc(), &block).is_some();

    let table_path = if replace && !in_cell {
        batch.remove_nodes(&block)?;
        batch.insert_nodes(&block, vec![table])?;
        block
    } else {
        let next = crate::path::next(&block)
            .ok_or_else(|| CommandError::unsupported("cannot insert at the document root"))?;
        batch.insert_nodes(&next, vec![table])?;
        next
    };
    batch.select_start_of(&table_path)?;
    Ok(())
}

pub fn insert_row(batch: &mut Batch<'_>, above: bool) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    let cols = cell.row_len(batch.doc(), cell.row);
    let at = if above { cell.row } else { cell.row + 1 };
    let row_path = child(&cell.table, at);
    batch.insert_nodes(&row_path, vec![table_row_node(cols)])?;
    batch.select_start_of(&child(&row_path, cell.col.min(cols.saturating_sub(1))))?;
    Ok(())
}

pub fn insert_column(batch: &mut Batch<'_>, left: bool) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    let rows = cell.table(batch.doc()).map_or(0, |t| t.children.len());
    let at = if left { cell.col } else { cell.col + 1 };
    for row in 0..rows {
        let len = cell.row_len(batch.doc(), row);
        let path = child(&child(&cell.table, row), at.min(len));
        batch.insert_nodes(&path, vec![table_cell_node("")])?;
    }
    let target = child(&child(&cell.table, cell.row), at);
    batch.select_start_of(&target)?;
    Ok(())
}

pub fn delete_row(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    let rows = cell.table(batch.doc()).map_or(0, |t| t.children.len());
    if rows <= 1 {
        return delete_table(batch);
    }
    batch.remove_nodes(&cell.row_path())?;
    let target_row = cell.row.min(rows - 2);
    let len = cell.row_len(batch.doc(), target_row);
    let target = child(&child(&cell.table, target_row), cell.col.min(len.saturating_sub(1)));
    batch.select_start_of(&target)?;
    Ok(())
}

pub fn delete_column(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    let width = cell.row_len(batch.doc(), cell.row);
    if width <= 1 {
        return delete_table(batch);
    }
    let rows = cell.table(batch.doc()).map_or(0, |t| t.children.len());
    for row in (0..rows).rev() {
        if cell.col < cell.row_len(batch.doc(), row) {
            batch.remove_nodes(&child(&child(&cell.table, row), cell.col))?;
        }
    }
    let target = child(&cell.row_path(), cell.col.min(width - 2));
    batch.select_start_of(&target)?;
    Ok(())
}

/// Removes the table, leaving an empty paragraph in its place.
pub fn delete_table(batch: &mut Batch<'_>) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    batch.remove_nodes(&cell.table)?;
    batch.insert_nodes(&cell.table, vec![Node::paragraph("")])?;
    batch.select_start_of(&cell.table)?;
    Ok(())
}

/// Markdown aligns whole columns, so the focused cell's column is updated.
pub fn set_column_align(batch: &mut Batch<'_>, align: Option<Align>) -> Result<(), CommandError> {
    let cell = focus_cell(batch)?;
    let rows = cell.table(batch.doc()).map_or(0, |t| t.children.len());
    for row in 0..rows {
        if cell.col >= cell.row_len(batch.doc(), row) {
            continue;
        }
        let path = child(&child(&cell.table, row), cell.col);
        match align {
            Some(align) => {
                batch.set_nodes(&path, NodePatch::default().set(attr::ALIGN, align.as_str()))?
            }
            None => batch.unset_attr(&path, attr::ALIGN)?,
        }
    }
    Ok(())
}

/// Column alignment as stored on the header row.
pub fn column_aligns(table: &ElementNode) -> Vec<Option<Align>> {
    let Some(Node::Element(header)) = table.children.first() else {
        return Vec::new();
    };
    header
        .children
        .iter()
        .map(|cell| {
            cell.as_element()
                .and_then(|c| c.attr_str(attr::ALIGN))
                .and_then(Align::parse)
        })
        .collect()
}

/// Grid of plain cell strings, row by row.
pub fn table_strings(table: &ElementNode) -> Vec<Vec<String>> {
    table
        .children
        .iter()
        .map(|row| row.children().iter().map(Node::string).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_cells_in_reading_order() {
        let doc = Document::new(vec![table_node(2, 2)]);
        let first = CellPosition::of(&doc, &[0, 0, 0, 0, 0]).unwrap();
        assert_eq!((first.row, first.col), (0, 0));
        let second = first.next(&doc).unwrap();
        assert_eq!((second.row, second.col), (0, 1));
        let wrapped = second.next(&doc).unwrap();
        assert_eq!((wrapped.row, wrapped.col), (1, 0));
        assert_eq!(wrapped.previous(&doc).unwrap(), second);
        assert!(first.previous(&doc).is_none());
        let last = CellPosition::of(&doc, &[0, 1, 1, 0, 0]).unwrap();
        assert!(last.next(&doc).is_none());
    }

    #[test]
    fn table_node_has_requested_shape() {
        let Node::Element(table) = table_node(3, 2) else {
            panic!("expected table element");
        };
        let grid = table_strings(&table);
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|row| row.len() == 2));
        assert_eq!(column_aligns(&table), vec![None, None]);
    }
}
