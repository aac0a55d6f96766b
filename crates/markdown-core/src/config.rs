use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: 200,
            max_normalize_iterations: 100,
        }
    }
}

impl EditorConfig {
    pub(crate) fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_undo == 0 {
            self.max_undo = defaults.max_undo;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = defaults.max_normalize_iterations;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Reinterpret a trailing paragraph that looks like a half-written image,
    /// table row or link. Meant for text that is still being streamed in.
    pub streaming_heuristics: bool,
    pub fix_strong_spans: bool,
    /// Top-level blocks per chunk in [`crate::parse_chunked`].
    pub chunk_blocks: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            streaming_heuristics: true,
            fix_strong_spans: true,
            chunk_blocks: 64,
        }
    }
}
