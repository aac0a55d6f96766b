use manos_markdown_core::{
    Command, Document, Editor, ElementKind, ElementNode, ListKind, Node, Point, Selection, attr,
};
use pretty_assertions::assert_eq;

fn item(text: &str) -> Node {
    Node::list_item(vec![Node::paragraph(text)])
}

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    Editor::new(Document::new(children), selection)
}

#[test]
fn create_list_merges_into_following_list() -> anyhow::Result<()> {
    let mut editor = editor_with(
        vec![
            Node::paragraph("a"),
            Node::paragraph("b"),
            Node::list(ListKind::Unordered, vec![item("c")]),
        ],
        Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 1)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Unordered,
    })?;
    assert_eq!(
        editor.doc().children,
        vec![Node::list(
            ListKind::Unordered,
            vec![item("a"), item("b"), item("c")]
        )]
    );
    Ok(())
}

#[test]
fn create_list_merges_into_preceding_list() -> anyhow::Result<()> {
    let mut editor = editor_with(
        vec![
            Node::list(ListKind::Ordered, vec![item("a")]),
            Node::paragraph("b"),
        ],
        Selection::collapsed(Point::new(vec![1, 0], 0)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Ordered,
    })?;
    assert_eq!(editor.doc().children.len(), 1);
    assert_eq!(editor.doc().children[0].children().len(), 2);
    Ok(())
}

#[test]
fn same_kind_unwraps_the_item() -> anyhow::Result<()> {
    let mut editor = editor_with(
        vec![Node::list(ListKind::Unordered, vec![item("a")])],
        Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Unordered,
    })?;
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
    Ok(())
}

#[test]
fn other_kind_retypes_in_place_and_drops_start() -> anyhow::Result<()> {
    let mut list = ElementNode::list(ListKind::Ordered)
        .with_children(vec![item("a"), item("b")]);
    list.set_attr(attr::START, 4);
    let mut editor = editor_with(
        vec![Node::Element(list)],
        Selection::collapsed(Point::new(vec![0, 1, 0, 0], 0)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Unordered,
    })?;
    let list = editor.doc().children[0].as_element().unwrap();
    assert_eq!(list.list_kind(), Some(ListKind::Unordered));
    assert_eq!(list.children.len(), 2);
    assert!(!list.attrs.contains_key(attr::START));
    Ok(())
}

#[test]
fn task_kind_never_unwraps() -> anyhow::Result<()> {
    let mut editor = editor_with(
        vec![Node::list(ListKind::Task, vec![item("a")])],
        Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Task,
    })?;
    let list = editor.doc().children[0].as_element().unwrap();
    assert_eq!(list.kind, ElementKind::List);
    assert_eq!(list.list_kind(), Some(ListKind::Task));
    let item = list.children[0].as_element().unwrap();
    assert_eq!(item.attrs.get(attr::CHECKED).and_then(|v| v.as_bool()), Some(false));
    Ok(())
}

#[test]
fn heading_becomes_a_plain_item() -> anyhow::Result<()> {
    let mut editor = editor_with(
        vec![Node::heading(2, "title")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );
    editor.run(Command::CreateList {
        kind: ListKind::Unordered,
    })?;
    assert_eq!(
        editor.doc().children,
        vec![Node::list(ListKind::Unordered, vec![item("title")])]
    );
    Ok(())
}

#[test]
fn outdent_of_top_level_item_is_unsupported() {
    let mut editor = editor_with(
        vec![Node::list(ListKind::Unordered, vec![item("a")])],
        Selection::collapsed(Point::new(vec![0, 0, 0, 0], 0)),
    );
    let before = editor.doc().clone();
    assert!(editor.run(Command::OutdentListItem).is_err());
    assert_eq!(editor.doc(), &before);
}
