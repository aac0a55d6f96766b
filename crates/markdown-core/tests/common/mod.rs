#![allow(dead_code)]

/// Routes engine logs to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[track_caller]
pub fn assert_markdown_eq(expected: &str, actual: &str) {
    if expected != actual {
        let diff = similar::TextDiff::from_lines(expected, actual)
            .unified_diff()
            .header("expected", "actual")
            .to_string();
        panic!("markdown differs:\n{diff}");
    }
}

/// Parses `markdown`, writes it back and parses the output again. Both trees
/// must match; the first one is returned.
#[track_caller]
pub fn assert_round_trip(markdown: &str) -> manos_markdown_core::Document {
    let doc = manos_markdown_core::parse(markdown);
    let written = manos_markdown_core::serialize(&doc);
    let again = manos_markdown_core::parse(&written);
    pretty_assertions::assert_eq!(again, doc, "round trip of {markdown:?} through {written:?}");
    doc
}
