use manos_markdown_core::{
    Document, Editor, ElementKind, ListKind, MediaType, Node, ParserConfig, attr, normalize_document,
    parse, parse_with, serialize, TextNode,
};
use pretty_assertions::assert_eq;

mod common;

const FIXTURE: &str = r#"---
title: notes
---

# Title

Some **bold** and *soft* text with `code` and a [link](https://x.dev).

- one
- two
  - nested

3. three
4. four

- [x] done
- [ ] open

> quoted

```rust
fn main() {}
```

| a | b |
| :--- | ---: |
| 1 | 2 |

***

![logo](https://x.dev/logo.png)

<!-- {"id":1} -->
tagged paragraph
"#;

fn kinds(doc: &Document) -> Vec<Option<ElementKind>> {
    doc.children.iter().map(Node::kind).collect()
}

#[test]
fn fixture_parses_into_expected_blocks() {
    let doc = parse(FIXTURE);
    assert_eq!(
        kinds(&doc),
        vec![
            Some(ElementKind::Frontmatter),
            Some(ElementKind::Heading),
            Some(ElementKind::Paragraph),
            Some(ElementKind::List),
            Some(ElementKind::List),
            Some(ElementKind::List),
            Some(ElementKind::Blockquote),
            Some(ElementKind::CodeBlock),
            Some(ElementKind::Table),
            Some(ElementKind::HorizontalRule),
            Some(ElementKind::Media),
            Some(ElementKind::Paragraph),
        ]
    );

    let ordered = doc.children[4].as_element().unwrap();
    assert_eq!(ordered.list_kind(), Some(ListKind::Ordered));
    assert_eq!(ordered.attr_u64(attr::START), Some(3));

    let tasks = doc.children[5].as_element().unwrap();
    assert_eq!(tasks.list_kind(), Some(ListKind::Task));
    let done = tasks.children[0].as_element().unwrap();
    assert!(done.attr_bool(attr::CHECKED));

    let code = doc.children[7].as_element().unwrap();
    assert_eq!(code.attr_str(attr::LANGUAGE), Some("rust"));
    assert_eq!(code.string(), "fn main() {}");

    let media = doc.children[10].as_element().unwrap();
    assert_eq!(media.media_type(), Some(MediaType::Image));
    assert_eq!(media.attr_str(attr::URL), Some("https://x.dev/logo.png"));

    let tagged = doc.children[11].as_element().unwrap();
    assert_eq!(tagged.attrs[attr::CONTEXT_PROPS], serde_json::json!({"id": 1}));
}

#[test]
fn serialized_fixture_parses_to_the_same_tree() {
    common::init_tracing();
    let doc = common::assert_round_trip(FIXTURE);
    let text = serialize(&doc);
    common::assert_markdown_eq(&text, &serialize(&parse(&text)));
}

#[test]
fn varied_documents_survive_a_round_trip() {
    use ElementKind::*;
    let cases: &[(&str, &[ElementKind])] = &[
        ("a [link *it*](u) b", &[Paragraph]),
        ("[ **bold** tail ](https://x.dev) after", &[Paragraph]),
        ("[`code` and text](https://x.dev)", &[Paragraph]),
        ("1. one\n   - a\n   - b\n2. two", &[List]),
        ("> quote\n>\n> - x\n> - y", &[Blockquote]),
        ("| a | b |\n| --- | --- |\n| x \\| y | z |", &[Table]),
        (
            "<img src=\"a.png\" alt=\"pic\" width=\"120\" />\n\n<video src=\"v.mp4\" width=\"320\" controls>\n</video>",
            &[Media, Media],
        ),
        ("<!-- [{\"chartType\":\"bar\",\"x\":\"a\"}] -->", &[Chart]),
        ("$$\nx^2\n$$", &[CodeBlock]),
        ("<think>\nplan\n</think>\n\nanswer text", &[CodeBlock, Paragraph]),
    ];
    for (markdown, expected) in cases {
        let doc = common::assert_round_trip(markdown);
        let actual: Vec<_> = doc.children.iter().filter_map(Node::kind).collect();
        assert_eq!(actual, expected.to_vec(), "block kinds of {markdown:?}");
    }
}

#[test]
fn one_link_keeps_its_marks_and_spacing() {
    let doc = common::assert_round_trip("a [link *it*](u) b");
    let paragraph = doc.children[0].as_element().unwrap();
    let linked: Vec<_> = paragraph
        .children
        .iter()
        .filter_map(Node::as_text)
        .filter(|leaf| leaf.marks.link.as_deref() == Some("u"))
        .map(|leaf| (leaf.text.as_str(), leaf.marks.italic))
        .collect();
    assert_eq!(linked, vec![("link ", false), ("it", true)]);
    assert_eq!(serialize(&doc), "a [link *it*](u) b\n");
}

#[test]
fn text_after_an_inline_image_serializes_stably() {
    let doc = common::assert_round_trip("![a](b.png) tail");
    assert_eq!(doc.children[1].as_element().unwrap().string(), "tail");
    assert_eq!(serialize(&doc), "![a](b.png)\n\ntail\n");
}

#[test]
fn inline_marks_survive_serialization() {
    let doc = parse("Some **bold** and *soft* text with `code` and a [link](https://x.dev).");
    let paragraph = doc.children[0].as_element().unwrap();
    let leaves: Vec<_> = paragraph.children.iter().filter_map(Node::as_text).collect();
    assert!(leaves.iter().any(|leaf| leaf.text == "bold" && leaf.marks.bold));
    assert!(leaves.iter().any(|leaf| leaf.text == "soft" && leaf.marks.italic));
    assert!(leaves.iter().any(|leaf| leaf.text == "code" && leaf.marks.code));
    assert!(
        leaves
            .iter()
            .any(|leaf| leaf.text == "link" && leaf.marks.link.as_deref() == Some("https://x.dev"))
    );
    common::assert_markdown_eq(
        "Some **bold** and *soft* text with `code` and a [link](https://x.dev).\n",
        &serialize(&doc),
    );
}

#[test]
fn empty_document_serializes_to_nothing() {
    assert_eq!(serialize(&Document::default()), "");
    assert_eq!(serialize(&parse("")), "");
}

#[test]
fn literal_markers_are_escaped() {
    let doc = Document::new(vec![Node::paragraph("# not a heading *really*")]);
    let text = serialize(&doc);
    assert_eq!(text, "\\# not a heading \\*really\\*\n");
    assert_eq!(parse(&text), doc);
}

#[test]
fn unclosed_bold_is_repaired() {
    let doc = parse("a **bold");
    let paragraph = doc.children[0].as_element().unwrap();
    let bold = paragraph.children.iter().filter_map(Node::as_text).find(|leaf| leaf.marks.bold);
    assert_eq!(bold.map(|leaf| leaf.text.as_str()), Some("bold"));
}

#[test]
fn unclosed_fence_is_unfinished() {
    let doc = parse("```rust\nfn main() {");
    let code = doc.children[0].as_element().unwrap();
    assert_eq!(code.kind, ElementKind::CodeBlock);
    assert_eq!(code.attrs.get(attr::FINISHED), Some(&serde_json::Value::Bool(false)));
    assert_eq!(parse("```\nx\n```").children[0].as_element().unwrap().attrs.get(attr::FINISHED), None);
}

#[test]
fn trailing_partial_image_becomes_unfinished_media() {
    let doc = parse("first\n\n![alt](https://x.dev/a.pn");
    let media = doc.children[1].as_element().unwrap();
    assert_eq!(media.kind, ElementKind::Media);
    assert_eq!(media.attrs.get(attr::FINISHED), Some(&serde_json::Value::Bool(false)));
}

#[test]
fn streaming_heuristics_skip_a_lone_paragraph() {
    let doc = parse("| row");
    assert_eq!(doc.children[0].kind(), Some(ElementKind::Paragraph));
}

#[test]
fn heuristics_off_keeps_the_row_as_text() {
    let config = ParserConfig {
        streaming_heuristics: false,
        ..ParserConfig::default()
    };
    let doc = parse_with("first\n\n| row", &config);
    assert_eq!(doc.children[1].kind(), Some(ElementKind::Paragraph));
}

#[test]
fn aligned_paragraph_round_trips_through_html() {
    let doc = parse("<p align=\"center\">hi</p>");
    let paragraph = doc.children[0].as_element().unwrap();
    assert_eq!(paragraph.kind, ElementKind::Paragraph);
    assert_eq!(paragraph.attr_str(attr::ALIGN), Some("center"));
    assert_eq!(serialize(&doc), "<p align=\"center\">hi</p>\n");
}

#[test]
fn adjacent_lists_stay_apart_after_a_round_trip() {
    let item = |t: &str| Node::list_item(vec![Node::paragraph(t)]);
    let doc = Document::new(vec![
        Node::list(ListKind::Unordered, vec![item("a")]),
        Node::list(ListKind::Unordered, vec![item("b")]),
    ]);
    let again = parse(&serialize(&doc));
    assert_eq!(kinds(&again), vec![Some(ElementKind::List), Some(ElementKind::List)]);
}

#[test]
fn normalizing_twice_changes_nothing() -> anyhow::Result<()> {
    let mut doc = Document::new(vec![
        Node::Text(TextNode {
            text: "stray".into(),
            marks: Default::default(),
        }),
        Node::list(ListKind::Unordered, vec![Node::paragraph("loose")]),
        Node::paragraph(""),
    ]);
    normalize_document(&mut doc)?;
    let once = doc.clone();
    normalize_document(&mut doc)?;
    assert_eq!(doc, once);
    Ok(())
}

#[test]
fn editor_reads_and_writes_markdown() -> anyhow::Result<()> {
    let mut editor = Editor::empty();
    editor.set_markdown("# Hi\n\nthere")?;
    common::assert_markdown_eq("# Hi\n\nthere\n", &editor.to_markdown());
    assert!(editor.undo());
    assert_eq!(editor.to_markdown(), "");
    Ok(())
}
