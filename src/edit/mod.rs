//! In-place editing of margin notes.
//!
//! One note at a time can be open for editing. Its live text lives in an
//! [`EditBuffer`]; leaving the note writes the text back through the
//! [`SourceSynchronizer`](crate::sync::SourceSynchronizer) or discards it.

mod buffer;
mod session;

use std::ops::Range;

pub use buffer::{Cursor, Direction, EditBuffer};
pub use session::{EditManager, EditSession};

use crate::sync::CommitReport;

/// Placeholder URL inserted by the link shortcut.
pub const LINK_PLACEHOLDER: &str = "url";

/// Where an edit session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Editing,
    Committing,
    Cancelling,
}

/// Inline formatting shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Link,
}

impl FormatCommand {
    /// Markdown delimiters placed around the selection.
    pub const fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            Self::Bold => ("**", "**"),
            Self::Italic => ("*", "*"),
            Self::Link => ("[", "]"),
        }
    }
}

/// Keyboard input delivered to an open note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    /// Shift+Enter: a literal line break inside the note
    SoftBreak,
    Escape,
    Arrow(Direction),
    Home,
    End,
    Char(char),
    Backspace,
    Delete,
    SelectAll,
    Format(FormatCommand),
}

/// What the host should do with a key after the editor saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// No note is open; let the host handle the key
    Ignored,
    /// The buffer consumed the key; re-render the note's live text
    Handled,
    /// The key would leave the note's text; swallow it
    Suppressed,
    /// The session ended on this key
    Closed(EditOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditEnd {
    Committed,
    Cancelled,
}

/// Result of closing an edit session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Position of the edited marker in the index at activation time
    pub position: usize,
    pub end: EditEnd,
    /// Text the note shows after closing
    pub final_text: String,
    /// True when the source holds `final_text`
    pub persisted: bool,
    pub report: Option<CommitReport>,
}

/// Part of the document touched by a commit, refreshed by other views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyRegion {
    /// Byte range of the replacement in the updated source
    pub range: Range<usize>,
    /// Heading section that owns the marker
    pub section: Option<String>,
}
