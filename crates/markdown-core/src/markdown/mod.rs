//! Markdown in and out of the document tree.
//!
//! Parsing runs in three stages: tag preprocessing on the raw text,
//! pulldown-cmark events folded into blocks, then fixups for streamed
//! content and a normalization pass.

mod chunked;
pub mod html;
pub mod inline_html;
mod parse;
pub mod preprocess;
mod serialize;
mod streaming;

pub use chunked::{CancellationToken, Progress, parse_chunked};
pub use serialize::serialize;

use crate::config::ParserConfig;
use crate::core::Editor;
use crate::error::{EditorError, LoadError};
use crate::node::{Document, Node};
use crate::normalize::normalize_document;

/// Parses with the default [`ParserConfig`].
pub fn parse(markdown: &str) -> Document {
    parse_with(markdown, &ParserConfig::default())
}

pub fn parse_with(markdown: &str, config: &ParserConfig) -> Document {
    let text = preprocess::preprocess(markdown);
    let (blocks, trailing) = parse::parse_blocks(&text, true);
    if trailing.is_some() {
        tracing::trace!("dropping context props with no block to attach to");
    }
    finish(blocks, config)
}

fn finish(mut blocks: Vec<Node>, config: &ParserConfig) -> Document {
    if config.fix_strong_spans {
        streaming::fix_strong(&mut blocks);
    }
    if config.streaming_heuristics {
        streaming::reinterpret_tail(&mut blocks);
    }
    let mut doc = Document::new(blocks);
    if let Err(err) = normalize_document(&mut doc) {
        tracing::error!("parsed document failed to normalize: {}", err);
    }
    doc
}

impl Editor {
    /// Replaces the document with parsed markdown as one undoable change.
    pub fn set_markdown(&mut self, markdown: &str) -> Result<(), EditorError> {
        self.set_document(parse(markdown))
    }

    pub fn to_markdown(&self) -> String {
        serialize(self.doc())
    }

    /// Chunked variant of [`Editor::set_markdown`]. The document is only
    /// swapped once parsing completes; a cancelled parse leaves it untouched.
    pub fn set_markdown_chunked(
        &mut self,
        markdown: &str,
        config: &ParserConfig,
        progress: impl FnMut(Progress),
        token: &CancellationToken,
    ) -> Result<(), LoadError> {
        let doc = parse_chunked(markdown, config, progress, token)?;
        self.set_document(doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ElementKind, attr};

    #[test]
    fn trailing_table_row_is_unfinished() {
        let doc = parse("first\n\n| row");
        let table = doc.children[1].as_element().unwrap();
        assert_eq!(table.kind, ElementKind::Table);
        assert!(table.attrs.get(attr::FINISHED).is_some_and(|v| v.as_bool() == Some(false)));
        assert_eq!(table.children.len(), 1);
    }

    #[test]
    fn heuristics_can_be_turned_off() {
        let config = ParserConfig {
            streaming_heuristics: false,
            ..ParserConfig::default()
        };
        let doc = parse_with("first\n\n| row", &config);
        assert!(doc.children[1].is_kind(ElementKind::Paragraph));
    }
}
