use manos_markdown_core::{
    Document, Editor, ElementKind, KeyEvent, ListKind, Node, Point, Selection, table_node,
};
use pretty_assertions::assert_eq;

fn item(text: &str) -> Node {
    Node::list_item(vec![Node::paragraph(text)])
}

fn editor_at(children: Vec<Node>, path: Vec<usize>, offset: usize) -> Editor {
    Editor::new(
        Document::new(children),
        Selection::collapsed(Point::new(path, offset)),
    )
}

#[test]
fn tab_in_single_item_list_inserts_a_tab() {
    let mut editor = editor_at(
        vec![Node::list(ListKind::Unordered, vec![item("a")])],
        vec![0, 0, 0, 0],
        1,
    );
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert_eq!(
        editor.doc().children,
        vec![Node::list(ListKind::Unordered, vec![item("a\t")])]
    );
}

#[test]
fn tab_nests_an_item_under_its_previous_sibling() {
    let mut editor = editor_at(
        vec![Node::list(ListKind::Ordered, vec![item("a"), item("b")])],
        vec![0, 1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::tab()));
    let expected = Node::list(
        ListKind::Ordered,
        vec![Node::list_item(vec![
            Node::paragraph("a"),
            Node::list(ListKind::Ordered, vec![item("b")]),
        ])],
    );
    assert_eq!(editor.doc().children, vec![expected]);
    assert_eq!(editor.selection().focus.path, vec![0, 0, 1, 0, 0, 0]);

    assert!(editor.handle_key(&KeyEvent::shift_tab()));
    assert_eq!(
        editor.doc().children,
        vec![Node::list(ListKind::Ordered, vec![item("a"), item("b")])]
    );
}

#[test]
fn tab_joins_an_existing_nested_list() {
    let mut editor = editor_at(
        vec![Node::list(
            ListKind::Unordered,
            vec![
                Node::list_item(vec![
                    Node::paragraph("a"),
                    Node::list(ListKind::Unordered, vec![item("a1")]),
                ]),
                item("b"),
            ],
        )],
        vec![0, 1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::tab()));
    let list = editor.doc().children[0].as_element().unwrap();
    assert_eq!(list.children.len(), 1);
    let nested = list.children[0].children()[1].as_element().unwrap();
    assert_eq!(nested.children.len(), 2);
    assert_eq!(nested.children[1].string(), "b");
}

#[test]
fn tab_at_cell_end_moves_to_next_cell() {
    let mut editor = editor_at(vec![table_node(2, 2)], vec![0, 0, 1, 0, 0], 0);
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert_eq!(editor.selection().focus.path, vec![0, 1, 0, 0, 0]);

    assert!(editor.handle_key(&KeyEvent::shift_tab()));
    assert_eq!(editor.selection().focus.path, vec![0, 0, 1, 0, 0]);
}

#[test]
fn tab_in_last_cell_stays_put() {
    let mut editor = editor_at(vec![table_node(1, 1)], vec![0, 0, 0, 0, 0], 0);
    let before = editor.doc().clone();
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert_eq!(editor.doc(), &before);
    assert_eq!(editor.selection().focus.path, vec![0, 0, 0, 0, 0]);
}

#[test]
fn tab_in_paragraph_inserts_and_shift_tab_removes() {
    let mut editor = editor_at(vec![Node::paragraph("x")], vec![0, 0], 0);
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert_eq!(editor.doc().children, vec![Node::paragraph("\tx")]);
    assert!(editor.handle_key(&KeyEvent::shift_tab()));
    assert_eq!(editor.doc().children, vec![Node::paragraph("x")]);
}

#[test]
fn tab_over_code_lines_indents_each_line() {
    let doc = Document::new(vec![Node::code_block(Some("rust"), "a\nb")]);
    let selection = Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![0, 0], 3));
    let mut editor = Editor::new(doc, selection);
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert_eq!(editor.doc().children[0].string(), "\ta\n\tb");
    assert!(editor.handle_key(&KeyEvent::shift_tab()));
    assert_eq!(editor.doc().children[0].string(), "a\nb");
}

#[test]
fn tab_is_one_undo_step() {
    let mut editor = editor_at(vec![Node::paragraph("x")], vec![0, 0], 1);
    assert!(editor.handle_key(&KeyEvent::tab()));
    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("x")]);
    assert_eq!(editor.selection().focus.offset, 1);
}

#[test]
fn nested_list_takes_the_parent_kind() {
    let mut editor = editor_at(
        vec![Node::list(ListKind::Task, vec![item("a"), item("b")])],
        vec![0, 1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::tab()));
    let nested = editor.doc().children[0].children()[0].children()[1].as_element().unwrap();
    assert_eq!(nested.kind, ElementKind::List);
    assert_eq!(nested.list_kind(), Some(ListKind::Task));
}
