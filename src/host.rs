//! The host document the engine reads from and writes back to.
//!
//! The engine never owns document text. It reads snapshots through
//! [`HostDocument::text`] and mutates through single
//! [`HostDocument::replace_range`] calls. [`TextDocument`] is a rope-backed
//! host used by the binary and by tests.

use std::ops::Range;

use ropey::Rope;

/// A line/column position. `ch` is a byte offset within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub const fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// A point in screen coordinates, relative to the editor's content origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

/// Operations the engine needs from the host editor.
pub trait HostDocument {
    /// A full snapshot of the current text.
    fn text(&self) -> String;

    /// Replace the byte range `from..to` with `text`.
    fn replace_range(&mut self, text: &str, from: usize, to: usize);

    fn offset_to_position(&self, offset: usize) -> Position;

    fn position_to_offset(&self, position: Position) -> usize;

    /// The document offset nearest to a screen coordinate, if the point maps
    /// onto rendered text at all.
    fn offset_at_coords(&self, point: ScreenPoint) -> Option<usize>;

    /// Monotonic counter bumped on every mutation.
    fn version(&self) -> u64;
}

/// One recorded mutation of a [`TextDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub range: Range<usize>,
    pub inserted: String,
    pub version: u64,
}

/// An in-memory host document backed by a rope.
///
/// Screen coordinates map onto a fixed monospace grid of `char_width` by
/// `line_height` pixels, which is enough to exercise position-based anchor
/// resolution without a real renderer.
#[derive(Debug, Clone)]
pub struct TextDocument {
    rope: Rope,
    version: u64,
    char_width: f32,
    line_height: f32,
    changes: Vec<ChangeEvent>,
}

impl TextDocument {
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
            char_width: 8.0,
            line_height: 24.0,
            changes: Vec::new(),
        }
    }

    pub const fn with_metrics(mut self, char_width: f32, line_height: f32) -> Self {
        self.char_width = char_width;
        self.line_height = line_height;
        self
    }

    pub const fn line_height(&self) -> f32 {
        self.line_height
    }

    pub const fn char_width(&self) -> f32 {
        self.char_width
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Drain change notifications recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.changes)
    }

    /// Screen coordinate of the start of a byte offset.
    pub fn coords_at_offset(&self, offset: usize) -> ScreenPoint {
        let pos = self.offset_to_position(offset);
        let line_start = self.rope.line_to_byte(pos.line);
        let prefix = self.rope.byte_slice(line_start..line_start + pos.ch);
        ScreenPoint {
            x: prefix.len_chars() as f32 * self.char_width,
            y: pos.line as f32 * self.line_height,
        }
    }

    /// Clamp a byte offset into the document and back onto a char boundary.
    fn clamp_offset(&self, offset: usize) -> usize {
        let offset = offset.min(self.rope.len_bytes());
        let char_idx = self.rope.byte_to_char(offset);
        self.rope.char_to_byte(char_idx)
    }

    /// Byte length of a line without its line break.
    fn line_len_bytes(&self, line: usize) -> usize {
        let text = self.rope.line(line).to_string();
        text.trim_end_matches(['\n', '\r']).len()
    }
}

impl HostDocument for TextDocument {
    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn replace_range(&mut self, text: &str, from: usize, to: usize) {
        let from = self.clamp_offset(from);
        let to = self.clamp_offset(to.max(from));
        let start_char = self.rope.byte_to_char(from);
        let end_char = self.rope.byte_to_char(to);
        self.rope.remove(start_char..end_char);
        self.rope.insert(start_char, text);
        self.version += 1;
        self.changes.push(ChangeEvent {
            range: from..to,
            inserted: text.to_string(),
            version: self.version,
        });
    }

    fn offset_to_position(&self, offset: usize) -> Position {
        let offset = self.clamp_offset(offset);
        let line = self.rope.byte_to_line(offset);
        Position {
            line,
            ch: offset - self.rope.line_to_byte(line),
        }
    }

    fn position_to_offset(&self, position: Position) -> usize {
        let last_line = self.rope.len_lines().saturating_sub(1);
        let line = position.line.min(last_line);
        let start = self.rope.line_to_byte(line);
        self.clamp_offset(start + position.ch.min(self.line_len_bytes(line)))
    }

    fn offset_at_coords(&self, point: ScreenPoint) -> Option<usize> {
        if point.y < 0.0 || self.line_height <= 0.0 || self.char_width <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let line = (point.y / self.line_height).floor() as usize;
        if line >= self.rope.len_lines() {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let column = (point.x.max(0.0) / self.char_width).round() as usize;
        let line_start_char = self.rope.line_to_char(line);
        let line_start = self.rope.line_to_byte(line);
        let line_chars = self
            .rope
            .byte_slice(line_start..line_start + self.line_len_bytes(line))
            .len_chars();
        Some(self.rope.char_to_byte(line_start_char + column.min(line_chars)))
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_range_splices_bytes_and_bumps_version() {
        let mut doc = TextDocument::from_text("hello world");
        doc.replace_range("there", 6, 11);
        assert_eq!(doc.text(), "hello there");
        assert_eq!(doc.version(), 1);
        let changes = doc.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].range, 6..11);
        assert!(doc.take_changes().is_empty());
    }

    #[test]
    fn test_replace_range_handles_multibyte_text() {
        let mut doc = TextDocument::from_text("café au lait");
        // "au" starts after the two-byte é
        doc.replace_range("et", 6, 8);
        assert_eq!(doc.text(), "café et lait");
    }

    #[test]
    fn test_offset_position_round_trip() {
        let doc = TextDocument::from_text("one\ntwo\nthree");
        let pos = doc.offset_to_position(9);
        assert_eq!(pos, Position::new(2, 1));
        assert_eq!(doc.position_to_offset(pos), 9);
    }

    #[test]
    fn test_position_to_offset_clamps_column_to_line() {
        let doc = TextDocument::from_text("ab\ncd\n");
        assert_eq!(doc.position_to_offset(Position::new(0, 50)), 2);
        assert_eq!(doc.position_to_offset(Position::new(99, 0)), 6);
    }

    #[test]
    fn test_offset_at_coords_uses_monospace_grid() {
        let doc = TextDocument::from_text("first line\nsecond line").with_metrics(10.0, 20.0);
        assert_eq!(doc.offset_at_coords(ScreenPoint { x: 30.0, y: 25.0 }), Some(14));
        // Past the end of the line clamps to the line end
        assert_eq!(doc.offset_at_coords(ScreenPoint { x: 900.0, y: 5.0 }), Some(10));
        assert_eq!(doc.offset_at_coords(ScreenPoint { x: 0.0, y: 400.0 }), None);
    }

    #[test]
    fn test_coords_at_offset_inverts_offset_at_coords() {
        let doc = TextDocument::from_text("abc\ndefgh").with_metrics(10.0, 20.0);
        let point = doc.coords_at_offset(7);
        assert_eq!(point, ScreenPoint { x: 30.0, y: 20.0 });
        assert_eq!(doc.offset_at_coords(point), Some(7));
    }
}
