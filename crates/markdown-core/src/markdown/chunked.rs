use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pulldown_cmark::{Event, Parser};

use crate::config::ParserConfig;
use crate::error::ParseCancelled;
use crate::node::Document;

use super::parse::{options, parse_blocks_with_props};
use super::preprocess::preprocess;

/// Shared flag checked between chunks. Clones observe the same flag, so a
/// caller can keep one and hand another to a worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Top-level blocks parsed so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Parses `markdown` a few top-level blocks at a time, reporting progress
/// after each chunk and stopping as soon as `token` is cancelled. The
/// finished document matches [`super::parse_with`] for the same input.
///
/// Reference-style link definitions only resolve within their own chunk.
pub fn parse_chunked(
    markdown: &str,
    config: &ParserConfig,
    mut progress: impl FnMut(Progress),
    token: &CancellationToken,
) -> Result<Document, ParseCancelled> {
    let text = preprocess(markdown);
    let starts = block_starts(&text);
    let total = starts.len();
    let per_chunk = config.chunk_blocks.max(1);

    let mut blocks = Vec::new();
    let mut props = None;
    let mut processed = 0;
    for (chunk_ix, group) in starts.chunks(per_chunk).enumerate() {
        if token.is_cancelled() {
            tracing::debug!("chunked parse cancelled at {}/{}", processed, total);
            return Err(ParseCancelled { processed, total });
        }
        let start = if chunk_ix == 0 { 0 } else { group[0] };
        let end = starts
            .get(processed + group.len())
            .copied()
            .unwrap_or(text.len());
        let (mut nodes, rest) = parse_blocks_with_props(&text[start..end], chunk_ix == 0, props.take());
        blocks.append(&mut nodes);
        props = rest;
        processed += group.len();
        progress(Progress { processed, total });
    }
    if token.is_cancelled() {
        return Err(ParseCancelled { processed, total });
    }
    Ok(super::finish(blocks, config))
}

/// Byte offsets of the lines where top-level blocks begin.
fn block_starts(text: &str) -> Vec<usize> {
    let line_start = |offset: usize| text[..offset].rfind('\n').map_or(0, |ix| ix + 1);
    let mut depth = 0usize;
    let mut starts: Vec<usize> = Vec::new();
    let push = |offset: usize, starts: &mut Vec<usize>| {
        let offset = line_start(offset);
        if starts.last() != Some(&offset) {
            starts.push(offset);
        }
    };
    for (event, range) in Parser::new_ext(text, options(true)).into_offset_iter() {
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    push(range.start, &mut starts);
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Rule if depth == 0 => push(range.start, &mut starts),
            _ => {}
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_snap_to_line_beginnings() {
        let text = "# a\n\n    code\n\n***\n- x\n- y\n";
        let starts = block_starts(text);
        assert_eq!(starts.len(), 4);
        assert_eq!(&text[starts[1]..starts[1] + 4], "    ");
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
