use manos_markdown_core::{
    Align, Command, CommandError, Document, Editor, EditorError, ElementKind, MarkKind, Node,
    Point, Selection, apply_command, column_aligns, serialize, table_node, table_strings,
};
use pretty_assertions::assert_eq;

fn table_at(editor: &Editor, ix: usize) -> manos_markdown_core::ElementNode {
    editor.doc().children[ix].as_element().cloned().unwrap()
}

#[test]
fn insert_table_replaces_an_empty_paragraph() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![Node::paragraph("a"), Node::paragraph("")]),
        Selection::collapsed(Point::new(vec![1, 0], 0)),
    );
    editor.run(Command::InsertTable { rows: 2, cols: 3 })?;
    assert_eq!(editor.doc().children.len(), 2);
    let table = table_at(&editor, 1);
    assert_eq!(table.kind, ElementKind::Table);
    assert_eq!(table_strings(&table), vec![vec![String::new(); 3]; 2]);
    assert_eq!(editor.selection().focus.path, vec![1, 0, 0, 0, 0]);
    Ok(())
}

#[test]
fn insert_table_after_text_keeps_the_text() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![Node::paragraph("a")]),
        Selection::collapsed(Point::new(vec![0, 0], 1)),
    );
    editor.run(Command::InsertTable { rows: 1, cols: 1 })?;
    assert_eq!(editor.doc().children[0], Node::paragraph("a"));
    assert!(editor.doc().children[1].is_kind(ElementKind::Table));
    Ok(())
}

#[test]
fn rows_and_columns_grow_and_shrink() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![table_node(2, 2)]),
        Selection::collapsed(Point::new(vec![0, 0, 0, 0, 0], 0)),
    );
    editor.run(Command::InsertTableRowBelow)?;
    assert_eq!(table_at(&editor, 0).children.len(), 3);
    assert_eq!(editor.selection().focus.path, vec![0, 1, 0, 0, 0]);

    editor.run(Command::InsertTableColumnRight)?;
    let table = table_at(&editor, 0);
    assert!(table.children.iter().all(|row| row.children().len() == 3));
    assert_eq!(editor.selection().focus.path, vec![0, 1, 1, 0, 0]);

    editor.run(Command::DeleteTableColumn)?;
    editor.run(Command::DeleteTableRow)?;
    let table = table_at(&editor, 0);
    assert_eq!(table.children.len(), 2);
    assert!(table.children.iter().all(|row| row.children().len() == 2));
    Ok(())
}

#[test]
fn column_alignment_applies_to_the_whole_column() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![table_node(2, 2)]),
        Selection::collapsed(Point::new(vec![0, 1, 1, 0, 0], 0)),
    );
    editor.run(Command::SetTableAlign {
        align: Some(Align::Center),
    })?;
    let table = table_at(&editor, 0);
    assert_eq!(column_aligns(&table), vec![None, Some(Align::Center)]);
    assert!(serialize(editor.doc()).contains("| --- | :---: |"));

    editor.run(Command::SetTableAlign { align: None })?;
    assert_eq!(column_aligns(&table_at(&editor, 0)), vec![None, None]);
    Ok(())
}

#[test]
fn deleting_a_table_leaves_a_paragraph() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![Node::paragraph("a"), table_node(2, 2)]),
        Selection::collapsed(Point::new(vec![1, 1, 1, 0, 0], 0)),
    );
    editor.run(Command::DeleteTable)?;
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("a"), Node::paragraph("")]
    );
    assert_eq!(editor.selection().focus.path, vec![1, 0]);
    Ok(())
}

#[test]
fn table_commands_outside_a_table_are_unsupported() {
    let mut editor = Editor::from_markdown("plain");
    let result = editor.run(Command::InsertTableColumnLeft);
    assert!(matches!(result, Err(CommandError::Unsupported(_))));
}

#[test]
fn headings_are_set_from_json_commands() -> anyhow::Result<()> {
    let mut editor = Editor::from_markdown("title");
    let command: Command = serde_json::from_str(r#"{"command":"set_heading","level":2}"#)?;
    editor.run(command)?;
    assert_eq!(editor.doc().children, vec![Node::heading(2, "title")]);
    editor.run(Command::UnsetHeading)?;
    assert_eq!(editor.doc().children, vec![Node::paragraph("title")]);
    Ok(())
}

#[test]
fn toggle_mark_bolds_the_selection() -> anyhow::Result<()> {
    let mut editor = Editor::new(
        Document::new(vec![Node::paragraph("hello world")]),
        Selection::new(Point::new(vec![0, 0], 6), Point::new(vec![0, 0], 11)),
    );
    editor.run(Command::ToggleMark {
        mark: MarkKind::Bold,
    })?;
    assert_eq!(editor.to_markdown(), "hello **world**\n");
    Ok(())
}

#[test]
fn select_rejects_missing_paths() {
    let mut editor = Editor::from_markdown("only");
    let before = editor.selection().clone();
    let result = editor.run(Command::Select {
        selection: Selection::collapsed(Point::new(vec![5, 0], 0)),
    });
    assert_eq!(
        result,
        Err(CommandError::Editor(EditorError::PathNotFound(vec![5, 0])))
    );
    assert_eq!(editor.selection(), &before);
    assert!(!editor.can_undo());
}

#[test]
fn set_content_replaces_everything() -> anyhow::Result<()> {
    let mut editor = Editor::from_markdown("old");
    editor.run(Command::SetContent {
        markdown: "# new\n\nbody".into(),
    })?;
    assert_eq!(editor.to_markdown(), "# new\n\nbody\n");
    Ok(())
}

#[test]
fn pure_apply_returns_the_new_pair() -> anyhow::Result<()> {
    let doc = Document::new(vec![Node::paragraph("a")]);
    let selection = Selection::collapsed(Point::new(vec![0, 0], 1));
    let (doc, selection) = apply_command(
        doc,
        selection,
        Command::InsertText {
            text: "b".into(),
            at: None,
        },
    )?;
    assert_eq!(doc.children, vec![Node::paragraph("ab")]);
    assert_eq!(selection.focus.offset, 2);
    Ok(())
}
