use manos_markdown_core::{
    Document, Editor, EditorError, ElementKind, ElementNode, KeyEvent, ListKind, Marks, MediaType,
    Node, Point, Selection, attr, handle_key, table_node,
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
fn backspace_in_only_empty_item_removes_the_list() {
    let mut editor = editor_at(
        vec![Node::list(ListKind::Unordered, vec![item("")])],
        vec![0, 0, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus.path, vec![0, 0]);
}

#[test]
fn backspace_in_middle_empty_item_drops_the_rest_of_the_list() {
    let mut editor = editor_at(
        vec![Node::list(
            ListKind::Unordered,
            vec![item("Item1"), item(""), item("Item3")],
        )],
        vec![0, 1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    let markdown = editor.to_markdown();
    assert!(markdown.contains("Item1"));
    assert!(!markdown.contains("Item3"));
    assert_eq!(editor.doc().children.len(), 2);
    assert!(editor.doc().children[1].is_kind(ElementKind::Paragraph));
}

#[test]
fn backspace_in_last_empty_item_leaves_paragraph_after_list() {
    let mut editor = editor_at(
        vec![Node::list(ListKind::Ordered, vec![item("a"), item("")])],
        vec![0, 1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    let list = editor.doc().children[0].as_element().unwrap();
    assert_eq!(list.children.len(), 1);
    assert_eq!(editor.doc().children[1], Node::paragraph(""));
    assert_eq!(editor.selection().focus.path, vec![1, 0]);
}

#[test]
fn backspace_in_empty_heading_makes_a_paragraph() {
    let mut editor = editor_at(
        vec![Node::paragraph("x"), Node::heading(2, "")],
        vec![1, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children[1], Node::paragraph(""));
}

#[test]
fn backspace_over_whole_document_leaves_one_empty_paragraph() {
    let doc = Document::new(vec![Node::paragraph("ab"), Node::paragraph("cd")]);
    let selection = Selection::new(Point::new(vec![0, 0], 0), Point::new(vec![1, 0], 2));
    let (handled, doc, _) = handle_key(&KeyEvent::backspace(), doc, selection);
    assert!(handled);
    assert_eq!(doc.children, vec![Node::paragraph("")]);
}

#[test]
fn backspace_at_table_cell_start_is_swallowed() {
    let mut editor = editor_at(
        vec![Node::paragraph("x"), table_node(2, 2)],
        vec![1, 0, 1, 0, 0],
        0,
    );
    let before = editor.doc().clone();
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc(), &before);
}

#[test]
fn backspace_after_media_removes_the_media() {
    let mut editor = editor_at(
        vec![
            Node::paragraph("a"),
            Node::media(MediaType::Image, "https://x.dev/a.png"),
            Node::paragraph("b"),
        ],
        vec![2, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("a"), Node::paragraph("b")]
    );
}

#[test]
fn backspace_at_start_of_quote_lifts_the_paragraph() {
    let mut editor = editor_at(
        vec![
            Node::paragraph("a"),
            Node::blockquote(vec![Node::paragraph("q")]),
        ],
        vec![1, 0, 0],
        0,
    );
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("a"), Node::paragraph("q")]
    );
}

#[test]
fn backspace_in_empty_first_block_removes_it() {
    let mut editor = editor_at(vec![Node::paragraph(""), Node::paragraph("b")], vec![0, 0], 0);
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children, vec![Node::paragraph("b")]);
}

#[test]
fn backspace_at_start_of_first_paragraph_merges_it_forward() {
    let mut editor = editor_at(vec![Node::paragraph("a"), Node::heading(2, "b")], vec![0, 0], 0);
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children, vec![Node::heading(2, "ab")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));
}

#[test]
fn first_paragraph_before_a_list_swallows_backspace() {
    let list = Node::list(ListKind::Unordered, vec![Node::list_item(vec![Node::paragraph("b")])]);
    let mut editor = editor_at(vec![Node::paragraph("a"), list.clone()], vec![0, 0], 0);
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children, vec![Node::paragraph("a"), list]);
}

#[test]
fn backspace_after_single_bold_char_in_heading_clears_marks() {
    let heading = Node::Element(
        ElementNode::new(ElementKind::Heading)
            .with_attr(attr::LEVEL, 1)
            .with_children(vec![Node::marked("x", Marks::bold())]),
    );
    let mut editor = editor_at(vec![Node::paragraph("a"), heading], vec![1, 0], 1);
    assert!(editor.handle_key(&KeyEvent::backspace()));
    assert_eq!(editor.doc().children[1], Node::heading(1, "x"));
}

#[test]
fn plain_text_backspace_is_declined_and_falls_back() -> Result<(), EditorError> {
    let mut editor = editor_at(vec![Node::paragraph("a"), Node::paragraph("bc")], vec![1, 0], 1);
    assert!(!editor.handle_key(&KeyEvent::backspace()));
    editor.delete_backward()?;
    assert_eq!(editor.doc().children[1], Node::paragraph("c"));
    Ok(())
}
