//! Keystroke handlers. Each one either consumes the key, leaving one undo
//! record behind, or declines it and leaves the tree exactly as it was.

mod autoformat;
mod backspace;
mod enter;
mod tab;

use serde::{Deserialize, Serialize};

use crate::core::Editor;
use crate::error::EditorError;
use crate::node::Document;
use crate::selection::Selection;
use crate::transforms::Batch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "text", rename_all = "snake_case")]
pub enum Key {
    Backspace,
    Enter,
    Tab,
    /// Printable input about to be inserted at the cursor.
    Char(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    #[serde(default)]
    pub shift: bool,
    /// Ctrl on most platforms, Cmd on macOS.
    #[serde(default)]
    pub ctrl: bool,
}

impl KeyEvent {
    pub fn backspace() -> Self {
        Self {
            key: Key::Backspace,
            shift: false,
            ctrl: false,
        }
    }

    pub fn enter() -> Self {
        Self {
            key: Key::Enter,
            shift: false,
            ctrl: false,
        }
    }

    pub fn ctrl_enter() -> Self {
        Self {
            key: Key::Enter,
            shift: false,
            ctrl: true,
        }
    }

    pub fn shift_enter() -> Self {
        Self {
            key: Key::Enter,
            shift: true,
            ctrl: false,
        }
    }

    pub fn tab() -> Self {
        Self {
            key: Key::Tab,
            shift: false,
            ctrl: false,
        }
    }

    pub fn shift_tab() -> Self {
        Self {
            key: Key::Tab,
            shift: true,
            ctrl: false,
        }
    }

    pub fn char(text: impl Into<String>) -> Self {
        Self {
            key: Key::Char(text.into()),
            shift: false,
            ctrl: false,
        }
    }
}

#[derive(Debug)]
enum Declined {
    NotHandled,
    Failed(EditorError),
}

impl From<EditorError> for Declined {
    fn from(err: EditorError) -> Self {
        Declined::Failed(err)
    }
}

fn dispatch(batch: &mut Batch<'_>, event: &KeyEvent) -> Result<bool, EditorError> {
    match &event.key {
        Key::Backspace => backspace::handle(batch),
        Key::Enter => enter::handle(batch, event.shift, event.ctrl),
        Key::Tab => tab::handle(batch, event.shift),
        Key::Char(text) => autoformat::handle(batch, text),
    }
}

impl Editor {
    /// Returns whether the key was consumed. A declined key, or one whose
    /// handler hit a stale path, leaves document and selection untouched.
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        let source = match event.key {
            Key::Backspace => "hotkey:backspace",
            Key::Enter => "hotkey:enter",
            Key::Tab => "hotkey:tab",
            Key::Char(_) => "hotkey:autoformat",
        };
        let result = self.transact(source, |batch| {
            if dispatch(batch, event)? {
                Ok(())
            } else {
                Err(Declined::NotHandled)
            }
        });
        match result {
            Ok(()) => true,
            Err(Declined::NotHandled) => false,
            Err(Declined::Failed(err)) => {
                tracing::debug!("{} declined after error: {}", source, err);
                false
            }
        }
    }

    /// Backspace with the default behaviour a host would otherwise supply:
    /// the state machine first, then a plain backward delete.
    pub fn delete_backward(&mut self) -> Result<(), EditorError> {
        if self.handle_key(&KeyEvent::backspace()) {
            return Ok(());
        }
        self.transact("editor:delete_backward", backspace::delete_backward)
    }

    /// Feeds `text` one character at a time, inserting each character the
    /// autoformat rules do not consume.
    pub fn type_text(&mut self, text: &str) -> Result<(), EditorError> {
        for ch in text.chars() {
            let ch = ch.to_string();
            if self.handle_key(&KeyEvent::char(ch.as_str())) {
                continue;
            }
            self.transact("editor:insert_text", |batch| batch.insert_text(&ch, None))?;
        }
        Ok(())
    }
}

/// Pure form of [`Editor::handle_key`].
pub fn handle_key(event: &KeyEvent, doc: Document, selection: Selection) -> (bool, Document, Selection) {
    let mut editor = Editor::new(doc, selection);
    let handled = editor.handle_key(event);
    let (doc, selection) = editor.into_parts();
    (handled, doc, selection)
}
