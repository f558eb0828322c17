use super::{
    DirtyRegion, EditBuffer, EditEnd, EditOutcome, EditState, FormatCommand, Key, KeyOutcome,
    LINK_PLACEHOLDER,
};
use crate::host::HostDocument;
use crate::sync::{MarkerRef, SourceSynchronizer};

/// One note open for editing.
#[derive(Debug)]
pub struct EditSession {
    /// Position of the marker in the index as of the last rescan
    pub position: usize,
    pub target: MarkerRef,
    pub section: Option<String>,
    /// Authoritative text captured when the session opened
    pub original_text: String,
    pub buffer: EditBuffer,
    /// The marker could not be found in the last rescan
    pub detached: bool,
}

impl EditSession {
    /// The text the note currently shows.
    pub fn live_text(&self) -> String {
        self.buffer.text()
    }

    pub fn is_modified(&self) -> bool {
        self.buffer.text() != self.original_text
    }
}

/// Owns the single open edit session and drives its state machine.
#[derive(Debug, Default)]
pub struct EditManager {
    state: EditState,
    session: Option<EditSession>,
    dirty: Vec<DirtyRegion>,
}

impl EditManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn state(&self) -> EditState {
        self.state
    }

    pub const fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    /// Position of the note being edited, if any and still in the source.
    pub fn editing_position(&self) -> Option<usize> {
        self.session
            .as_ref()
            .filter(|s| !s.detached)
            .map(|s| s.position)
    }

    /// Follow the open note to its marker's position in the current index.
    ///
    /// Markers inserted or removed before the note shift its position; the
    /// session tracks the marker itself, not the slot it was opened at.
    pub fn relocate(&mut self, sync: &SourceSynchronizer) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(position) = sync.locate(&session.target) else {
            if !session.detached {
                tracing::debug!(position = session.position, "open note no longer in source");
            }
            session.detached = true;
            return;
        };
        session.detached = false;
        if position != session.position {
            tracing::debug!(from = session.position, to = position, "open note moved");
            session.position = position;
        }
        if let Some(marker) = sync.index().get(position) {
            session.target.ordinal = marker.ordinal;
            session.target.source_start = marker.source_range.start;
            session.section.clone_from(&marker.section);
        }
    }

    pub const fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    /// Open the note at `position` for editing.
    ///
    /// Activating the note already open is a no-op. Activating another note
    /// commits the open one first; its outcome is returned. Returns the
    /// previous outcome and whether a session is now open on `position`.
    pub fn activate(
        &mut self,
        position: usize,
        sync: &mut SourceSynchronizer,
        host: &mut dyn HostDocument,
    ) -> (Option<EditOutcome>, bool) {
        sync.refresh(host);
        self.relocate(sync);
        if self.editing_position() == Some(position) {
            return (None, true);
        }
        let previous = self.commit(sync, host);

        sync.refresh(host);
        let Some(marker) = sync.index().get(position) else {
            tracing::debug!(position, "activation ignored, no marker at position");
            return (previous, false);
        };
        let original_text = marker.content.clone();
        let mut buffer = EditBuffer::from_text(&original_text);
        buffer.select_all();
        self.session = Some(EditSession {
            position,
            target: MarkerRef::from(marker),
            section: marker.section.clone(),
            original_text,
            buffer,
            detached: false,
        });
        self.state = EditState::Editing;
        tracing::debug!(position, "edit session opened");
        (previous, true)
    }

    /// Feed one key to the open note.
    pub fn handle_key(
        &mut self,
        key: Key,
        sync: &mut SourceSynchronizer,
        host: &mut dyn HostDocument,
    ) -> KeyOutcome {
        match key {
            Key::Enter => self
                .commit(sync, host)
                .map_or(KeyOutcome::Ignored, KeyOutcome::Closed),
            Key::Escape => self.cancel().map_or(KeyOutcome::Ignored, KeyOutcome::Closed),
            _ => self
                .session
                .as_mut()
                .map_or(KeyOutcome::Ignored, |session| apply_key(&mut session.buffer, key)),
        }
    }

    /// Focus left the note.
    pub fn blur(
        &mut self,
        sync: &mut SourceSynchronizer,
        host: &mut dyn HostDocument,
    ) -> Option<EditOutcome> {
        self.commit(sync, host)
    }

    /// A click landed outside the open note.
    pub fn outside_click(
        &mut self,
        sync: &mut SourceSynchronizer,
        host: &mut dyn HostDocument,
    ) -> Option<EditOutcome> {
        self.commit(sync, host)
    }

    /// Close the open note, writing its live text back to the source.
    ///
    /// A commit that cannot locate its marker leaves the source untouched and
    /// reports `persisted: false`.
    pub fn commit(
        &mut self,
        sync: &mut SourceSynchronizer,
        host: &mut dyn HostDocument,
    ) -> Option<EditOutcome> {
        let session = self.session.take()?;
        self.state = EditState::Committing;
        let final_text = session.live_text();

        let outcome = if session.is_modified() {
            match sync.commit(&session.target, &final_text, host) {
                Ok(report) => {
                    if report.mutated {
                        self.dirty.push(DirtyRegion {
                            range: report.range.start..report.range.start + report.replacement.len(),
                            section: session.section.clone(),
                        });
                    }
                    EditOutcome {
                        position: session.position,
                        end: EditEnd::Committed,
                        final_text,
                        persisted: true,
                        report: Some(report),
                    }
                }
                Err(err) => {
                    tracing::warn!(position = session.position, "sidenote edit not saved: {err}");
                    EditOutcome {
                        position: session.position,
                        end: EditEnd::Committed,
                        final_text,
                        persisted: false,
                        report: None,
                    }
                }
            }
        } else {
            EditOutcome {
                position: session.position,
                end: EditEnd::Committed,
                final_text,
                persisted: true,
                report: None,
            }
        };

        self.state = EditState::Idle;
        Some(outcome)
    }

    /// Close the open note, discarding its live text.
    pub fn cancel(&mut self) -> Option<EditOutcome> {
        let session = self.session.take()?;
        self.state = EditState::Cancelling;
        let outcome = EditOutcome {
            position: session.position,
            end: EditEnd::Cancelled,
            final_text: session.original_text,
            persisted: true,
            report: None,
        };
        self.state = EditState::Idle;
        Some(outcome)
    }

    /// Drop the open session without touching the source.
    pub fn reset(&mut self) {
        self.session = None;
        self.state = EditState::Idle;
        self.dirty.clear();
    }

    /// Regions changed by commits since the last call.
    pub fn take_dirty_regions(&mut self) -> Vec<DirtyRegion> {
        std::mem::take(&mut self.dirty)
    }
}

/// Apply an editing key to the live buffer.
fn apply_key(buffer: &mut EditBuffer, key: Key) -> KeyOutcome {
    match key {
        Key::Enter | Key::Escape => return KeyOutcome::Ignored,
        Key::Arrow(direction) => {
            if buffer.selection().is_none() && buffer.at_boundary(direction) {
                return KeyOutcome::Suppressed;
            }
            buffer.move_cursor(direction);
        }
        Key::Home => buffer.move_home(),
        Key::End => buffer.move_end(),
        Key::Char(ch) => buffer.insert_char(ch),
        Key::SoftBreak => buffer.split_line(),
        Key::Backspace => {
            buffer.delete_back();
        }
        Key::Delete => {
            buffer.delete_forward();
        }
        Key::SelectAll => buffer.select_all(),
        Key::Format(FormatCommand::Link) => buffer.insert_link(LINK_PLACEHOLDER),
        Key::Format(command) => {
            let (prefix, suffix) = command.delimiters();
            buffer.wrap_selection(prefix, suffix);
        }
    }
    KeyOutcome::Handled
}
