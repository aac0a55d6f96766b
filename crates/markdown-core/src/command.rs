use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::error::CommandError;
use crate::list::ItemContext;
use crate::node::{Document, ElementNode, ListKind, MarkKind, Node};
use crate::ops::{NodePatch, Path};
use crate::selection::{Point, Selection};
use crate::table::Align;
use crate::transforms::Batch;

fn one() -> usize {
    1
}

/// Everything a host can ask the engine to do, as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    InsertNodes {
        at: Path,
        nodes: Vec<Node>,
    },
    RemoveNodes {
        at: Path,
    },
    SetNodes {
        at: Path,
        patch: NodePatch,
    },
    UnsetAttr {
        at: Path,
        name: String,
    },
    MoveNodes {
        from: Path,
        to: Path,
    },
    WrapNodes {
        at: Path,
        #[serde(default = "one")]
        count: usize,
        wrapper: ElementNode,
    },
    UnwrapNodes {
        at: Path,
    },
    Select {
        selection: Selection,
    },
    InsertText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<Point>,
    },
    DeleteRange {
        range: Selection,
    },
    CreateList {
        kind: ListKind,
    },
    IndentListItem,
    OutdentListItem,
    InsertTable {
        rows: usize,
        cols: usize,
    },
    InsertTableRowAbove,
    InsertTableRowBelow,
    InsertTableColumnLeft,
    InsertTableColumnRight,
    DeleteTableRow,
    DeleteTableColumn,
    DeleteTable,
    SetTableAlign {
        #[serde(default)]
        align: Option<Align>,
    },
    SetHeading {
        level: u8,
    },
    UnsetHeading,
    ToggleBlockquote,
    ToggleMark {
        mark: MarkKind,
    },
    InsertHorizontalRule,
    SetContent {
        markdown: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertNodes { .. } => "insert_nodes",
            Command::RemoveNodes { .. } => "remove_nodes",
            Command::SetNodes { .. } => "set_nodes",
            Command::UnsetAttr { .. } => "unset_attr",
            Command::MoveNodes { .. } => "move_nodes",
            Command::WrapNodes { .. } => "wrap_nodes",
            Command::UnwrapNodes { .. } => "unwrap_nodes",
            Command::Select { .. } => "select",
            Command::InsertText { .. } => "insert_text",
            Command::DeleteRange { .. } => "delete_range",
            Command::CreateList { .. } => "create_list",
            Command::IndentListItem => "indent_list_item",
            Command::OutdentListItem => "outdent_list_item",
            Command::InsertTable { .. } => "insert_table",
            Command::InsertTableRowAbove => "insert_table_row_above",
            Command::InsertTableRowBelow => "insert_table_row_below",
            Command::InsertTableColumnLeft => "insert_table_column_left",
            Command::InsertTableColumnRight => "insert_table_column_right",
            Command::DeleteTableRow => "delete_table_row",
            Command::DeleteTableColumn => "delete_table_column",
            Command::DeleteTable => "delete_table",
            Command::SetTableAlign { .. } => "set_table_align",
            Command::SetHeading { .. } => "set_heading",
            Command::UnsetHeading => "unset_heading",
            Command::ToggleBlockquote => "toggle_blockquote",
            Command::ToggleMark { .. } => "toggle_mark",
            Command::InsertHorizontalRule => "insert_horizontal_rule",
            Command::SetContent { .. } => "set_content",
        }
    }
}

fn focused_item(batch: &Batch<'_>) -> Result<Path, CommandError> {
    ItemContext::of(batch.doc(), &batch.selection().focus.path)
        .map(|ctx| ctx.item)
        .ok_or_else(|| CommandError::unsupported("selection is not inside a list item"))
}

fn run_in_batch(batch: &mut Batch<'_>, command: Command) -> Result<(), CommandError> {
    match command {
        Command::InsertNodes { at, nodes } => batch.insert_nodes(&at, nodes)?,
        Command::RemoveNodes { at } => batch.remove_nodes(&at)?,
        Command::SetNodes { at, patch } => batch.set_nodes(&at, patch)?,
        Command::UnsetAttr { at, name } => batch.unset_attr(&at, &name)?,
        Command::MoveNodes { from, to } => batch.move_nodes(&from, &to)?,
        Command::WrapNodes { at, count, wrapper } => {
            batch.wrap_nodes(wrapper, &at, count)?;
        }
        Command::UnwrapNodes { at } => batch.unwrap_nodes(&at)?,
        Command::Select { selection } => {
            for point in [&selection.anchor, &selection.focus] {
                if batch.doc().leaf(&point.path).is_none() {
                    return Err(crate::error::EditorError::PathNotFound(point.path.clone()).into());
                }
            }
            batch.select(selection);
        }
        Command::InsertText { text, at } => batch.insert_text(&text, at)?,
        Command::DeleteRange { range } => {
            batch.delete_range(&range)?;
        }
        Command::CreateList { kind } => crate::list::create_list(batch, kind)?,
        Command::IndentListItem => {
            let item = focused_item(batch)?;
            if !crate::list::indent_item(batch, &item)? {
                return Err(CommandError::unsupported("the first item of a list cannot be indented"));
            }
        }
        Command::OutdentListItem => {
            let item = focused_item(batch)?;
            if !crate::list::outdent_item(batch, &item)? {
                return Err(CommandError::unsupported("a top-level item cannot be outdented"));
            }
        }
        Command::InsertTable { rows, cols } => crate::table::insert_table(batch, rows, cols)?,
        Command::InsertTableRowAbove => crate::table::insert_row(batch, true)?,
        Command::InsertTableRowBelow => crate::table::insert_row(batch, false)?,
        Command::InsertTableColumnLeft => crate::table::insert_column(batch, true)?,
        Command::InsertTableColumnRight => crate::table::insert_column(batch, false)?,
        Command::DeleteTableRow => crate::table::delete_row(batch)?,
        Command::DeleteTableColumn => crate::table::delete_column(batch)?,
        Command::DeleteTable => crate::table::delete_table(batch)?,
        Command::SetTableAlign { align } => crate::table::set_column_align(batch, align)?,
        Command::SetHeading { level } => crate::blocks::set_heading(batch, level)?,
        Command::UnsetHeading => crate::blocks::unset_heading(batch)?,
        Command::ToggleBlockquote => crate::blocks::toggle_blockquote(batch)?,
        Command::ToggleMark { mark } => crate::marks::toggle_mark(batch, mark)?,
        Command::InsertHorizontalRule => crate::blocks::insert_horizontal_rule(batch)?,
        Command::SetContent { markdown } => {
            batch.replace_document(crate::markdown::parse(&markdown))?;
        }
    }
    Ok(())
}

impl Editor {
    /// Runs `command` as one undoable transaction.
    pub fn run(&mut self, command: Command) -> Result<(), CommandError> {
        let name = command.name();
        tracing::debug!("running command {}", name);
        let result = self.transact(name, |batch| run_in_batch(batch, command));
        if let Err(err) = &result {
            tracing::debug!("command {} failed: {}", name, err);
        }
        result
    }
}

/// Pure form of [`Editor::run`]: takes a tree and selection, returns the
/// updated pair.
pub fn apply_command(
    doc: Document,
    selection: Selection,
    command: Command,
) -> Result<(Document, Selection), CommandError> {
    let mut editor = Editor::new(doc, selection);
    editor.run(command)?;
    Ok(editor.into_parts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_through_json() {
        let command = Command::CreateList {
            kind: ListKind::Task,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["command"], "create_list");
        assert_eq!(json["kind"], "task");
        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);

        let wrap: Command = serde_json::from_str(
            r#"{"command":"wrap_nodes","at":[0],"wrapper":{"kind":"blockquote"}}"#,
        )
        .unwrap();
        assert!(matches!(wrap, Command::WrapNodes { count: 1, .. }));
    }

    #[test]
    fn failed_command_leaves_tree_untouched() {
        let doc = Document::new(vec![Node::paragraph("plain")]);
        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        let mut editor = Editor::new(doc.clone(), selection);
        let err = editor.run(Command::DeleteTableRow).unwrap_err();
        assert!(matches!(err, CommandError::Unsupported(_)));
        assert_eq!(editor.doc(), &doc);
        assert!(!editor.can_undo());
    }
}
