use manos_markdown_core::{
    CancellationToken, Editor, LoadError, ParseCancelled, ParserConfig, Progress, parse_chunked,
    parse_with,
};
use pretty_assertions::assert_eq;

const SOURCE: &str = "# A\n\npara one\n\n- x\n- y\n\n> quoted\n\n```\ncode\n```\n";

fn one_block_per_chunk() -> ParserConfig {
    ParserConfig {
        chunk_blocks: 1,
        ..ParserConfig::default()
    }
}

#[test]
fn chunked_parse_matches_single_pass() -> anyhow::Result<()> {
    let config = one_block_per_chunk();
    let doc = parse_chunked(SOURCE, &config, |_| {}, &CancellationToken::new())?;
    assert_eq!(doc, parse_with(SOURCE, &config));
    Ok(())
}

#[test]
fn progress_reaches_the_total() -> anyhow::Result<()> {
    let mut seen: Vec<Progress> = Vec::new();
    parse_chunked(
        SOURCE,
        &one_block_per_chunk(),
        |p| seen.push(p),
        &CancellationToken::new(),
    )?;
    assert_eq!(seen.len(), 5);
    let last = seen.last().copied().unwrap();
    assert_eq!(last.processed, last.total);
    assert!(seen.windows(2).all(|w| w[0].processed < w[1].processed));
    Ok(())
}

#[test]
fn cancelling_between_chunks_stops_the_parse() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let result = parse_chunked(
        SOURCE,
        &one_block_per_chunk(),
        move |_| canceller.cancel(),
        &token,
    );
    assert_eq!(result, Err(ParseCancelled { processed: 1, total: 5 }));
}

#[test]
fn cancelled_load_leaves_the_editor_alone() {
    let mut editor = Editor::from_markdown("keep me");
    let before = editor.doc().clone();
    let token = CancellationToken::new();
    token.cancel();
    let result = editor.set_markdown_chunked(SOURCE, &ParserConfig::default(), |_| {}, &token);
    assert!(matches!(result, Err(LoadError::Cancelled(_))));
    assert_eq!(editor.doc(), &before);
    assert!(!editor.can_undo());
}

#[test]
fn completed_load_is_undoable() -> anyhow::Result<()> {
    let mut editor = Editor::from_markdown("keep me");
    editor.set_markdown_chunked(SOURCE, &one_block_per_chunk(), |_| {}, &CancellationToken::new())?;
    assert_eq!(editor.doc().children.len(), 5);
    assert!(editor.undo());
    assert_eq!(editor.to_markdown(), "keep me\n");
    Ok(())
}
