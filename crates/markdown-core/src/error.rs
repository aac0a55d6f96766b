use thiserror::Error;

use crate::ops::Path;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("no node at path {0:?}")]
    PathNotFound(Path),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("normalization did not converge after {iterations} iterations")]
    InvariantViolation { iterations: usize },
}

impl EditorError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EditorError::InvalidOperation(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("command is not applicable here: {0}")]
    Unsupported(String),
}

impl CommandError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        CommandError::Unsupported(message.into())
    }
}

/// Input problems the markdown pipeline recovers from. They are logged and
/// never surfaced to callers; the offending input degrades to plain content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoverableParseError {
    #[error("malformed percent escape in {0:?}")]
    MalformedPercentEscape(String),
    #[error("html comment is not valid json: {0}")]
    InvalidCommentJson(String),
    #[error("unsupported html block <{0}>")]
    UnsupportedHtml(String),
}

/// Returned when a chunked parse sees its cancellation token set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parse cancelled after {processed} of {total} blocks")]
pub struct ParseCancelled {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Cancelled(#[from] ParseCancelled),
    #[error(transparent)]
    Editor(#[from] EditorError),
}
