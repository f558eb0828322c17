use ropey::Rope;

/// Cursor position in the edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Zero-based line index.
    pub line: usize,
    /// Zero-based column (byte offset within the line).
    pub col: usize,
    /// Remembered column for vertical movement (sticky column).
    col_memory: usize,
}

impl Cursor {
    /// Create a cursor at line 0, column 0.
    pub const fn new() -> Self {
        Self {
            line: 0,
            col: 0,
            col_memory: 0,
        }
    }

    /// Create a cursor at a specific position.
    pub const fn at(line: usize, col: usize) -> Self {
        Self {
            line,
            col,
            col_memory: col,
        }
    }

    /// Update column and reset column memory to match.
    const fn set_col(&mut self, col: usize) {
        self.col = col;
        self.col_memory = col;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Direction for cursor movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// The live text of one margin note being edited.
///
/// Rope-backed, with a cursor and an optional selection anchor. Movement
/// reports whether the cursor actually moved so the session can tell a
/// keypress at the text boundary apart from one inside the text.
pub struct EditBuffer {
    rope: Rope,
    cursor: Cursor,
    /// Other end of the selection, if any
    anchor: Option<Cursor>,
}

impl EditBuffer {
    /// Create a buffer with the cursor at the end of `text`.
    pub fn from_text(text: &str) -> Self {
        let mut buf = Self {
            rope: Rope::from_str(text),
            cursor: Cursor::new(),
            anchor: None,
        };
        buf.move_to_end();
        buf
    }

    /// The current cursor position.
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the content of a line (without trailing newline).
    pub fn line_at(&self, line_idx: usize) -> Option<String> {
        if line_idx >= self.rope.len_lines() {
            return None;
        }
        let s = self.rope.line(line_idx).to_string();
        Some(s.trim_end_matches('\n').trim_end_matches('\r').to_string())
    }

    /// Length of a line in bytes (without trailing newline).
    pub fn line_len(&self, line_idx: usize) -> usize {
        self.line_at(line_idx).map_or(0, |s| s.len())
    }

    /// The full text content of the buffer.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Selected byte range, ordered, if a non-empty selection exists.
    pub fn selection(&self) -> Option<std::ops::Range<usize>> {
        let anchor = self.offset_of(self.anchor?);
        let head = self.offset_of(self.cursor);
        match anchor.cmp(&head) {
            std::cmp::Ordering::Less => Some(anchor..head),
            std::cmp::Ordering::Greater => Some(head..anchor),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn selected_text(&self) -> String {
        self.selection()
            .map(|r| self.rope.byte_slice(r).to_string())
            .unwrap_or_default()
    }

    /// Select byte range `start..end`, leaving the cursor at `end`.
    pub fn select(&mut self, start: usize, end: usize) {
        self.anchor = Some(self.cursor_at(start));
        self.cursor = self.cursor_at(end);
    }

    pub fn select_all(&mut self) {
        self.select(0, self.rope.len_bytes());
    }

    pub const fn clear_selection(&mut self) {
        self.anchor = None;
    }

    /// Insert a character, replacing any selection.
    pub fn insert_char(&mut self, ch: char) {
        let mut tmp = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut tmp));
    }

    /// Insert a string at the cursor, replacing any selection.
    pub fn insert_str(&mut self, s: &str) {
        let at = self.take_selection();
        if s.is_empty() {
            return;
        }
        let char_idx = self.rope.byte_to_char(at);
        self.rope.insert(char_idx, s);
        self.cursor = self.cursor_at(at + s.len());
    }

    /// Split the current line at the cursor.
    pub fn split_line(&mut self) {
        self.insert_str("\n");
    }

    /// Delete the selection, or the character before the cursor (Backspace).
    ///
    /// Returns `true` if anything was deleted.
    pub fn delete_back(&mut self) -> bool {
        if self.selection().is_some() {
            self.take_selection();
            return true;
        }
        self.anchor = None;
        let at = self.offset_of(self.cursor);
        if at == 0 {
            return false;
        }
        let char_idx = self.rope.byte_to_char(at);
        self.rope.remove(char_idx - 1..char_idx);
        self.cursor = self.cursor_at(self.rope.char_to_byte(char_idx - 1));
        true
    }

    /// Delete the selection, or the character at the cursor (Delete key).
    ///
    /// Returns `true` if anything was deleted.
    pub fn delete_forward(&mut self) -> bool {
        if self.selection().is_some() {
            self.take_selection();
            return true;
        }
        self.anchor = None;
        let at = self.offset_of(self.cursor);
        if at >= self.rope.len_bytes() {
            return false;
        }
        let char_idx = self.rope.byte_to_char(at);
        self.rope.remove(char_idx..=char_idx);
        true
    }

    /// Surround the selection with `prefix` and `suffix`.
    ///
    /// With no selection the markers are inserted at the cursor and the
    /// cursor is left between them. The wrapped text stays selected.
    pub fn wrap_selection(&mut self, prefix: &str, suffix: &str) {
        let selected = self.selected_text();
        let start = self.take_selection();
        self.insert_str(&format!("{prefix}{selected}{suffix}"));
        let inner_start = start + prefix.len();
        let inner_end = inner_start + selected.len();
        if selected.is_empty() {
            self.cursor = self.cursor_at(inner_start);
        } else {
            self.select(inner_start, inner_end);
        }
    }

    /// Turn the selection into a markdown link and select the URL slot.
    pub fn insert_link(&mut self, placeholder_url: &str) {
        let selected = self.selected_text();
        let start = self.take_selection();
        self.insert_str(&format!("[{selected}]({placeholder_url})"));
        let url_start = start + selected.len() + 3;
        self.select(url_start, url_start + placeholder_url.len());
    }

    /// Move the cursor in the given direction, collapsing any selection.
    ///
    /// Returns `false` when the cursor was already at the text boundary in
    /// that direction and did not move.
    pub fn move_cursor(&mut self, direction: Direction) -> bool {
        self.anchor = None;
        let before = self.cursor;
        match direction {
            Direction::Left => self.move_left(),
            Direction::Right => self.move_right(),
            Direction::Up => self.move_up(),
            Direction::Down => self.move_down(),
        }
        self.cursor != before
    }

    /// Whether moving in `direction` would leave the text.
    pub fn at_boundary(&self, direction: Direction) -> bool {
        let last_line = self.line_count().saturating_sub(1);
        match direction {
            Direction::Left => self.cursor.line == 0 && self.cursor.col == 0,
            Direction::Right => {
                self.cursor.line == last_line && self.cursor.col >= self.line_len(last_line)
            }
            Direction::Up => self.cursor.line == 0,
            Direction::Down => self.cursor.line == last_line,
        }
    }

    /// Move cursor to the beginning of the line (Home).
    pub const fn move_home(&mut self) {
        self.anchor = None;
        self.cursor.set_col(0);
    }

    /// Move cursor to the end of the line (End).
    pub fn move_end(&mut self) {
        self.anchor = None;
        let len = self.line_len(self.cursor.line);
        self.cursor.set_col(len);
    }

    /// Move cursor to the end of the buffer.
    pub fn move_to_end(&mut self) {
        let last_line = self.line_count().saturating_sub(1);
        self.cursor.line = last_line;
        self.cursor.set_col(self.line_len(last_line));
    }

    // --- Private helpers ---

    /// Delete the selected text, if any, and return the byte offset where
    /// insertion should happen.
    fn take_selection(&mut self) -> usize {
        let range = self.selection();
        self.anchor = None;
        let Some(range) = range else {
            return self.offset_of(self.cursor);
        };
        let start = self.rope.byte_to_char(range.start);
        let end = self.rope.byte_to_char(range.end);
        self.rope.remove(start..end);
        self.cursor = self.cursor_at(range.start);
        range.start
    }

    fn offset_of(&self, cursor: Cursor) -> usize {
        let line = cursor.line.min(self.line_count().saturating_sub(1));
        self.rope.line_to_byte(line) + cursor.col.min(self.line_len(line))
    }

    fn cursor_at(&self, offset: usize) -> Cursor {
        let offset = offset.min(self.rope.len_bytes());
        let line = self.rope.byte_to_line(offset);
        Cursor::at(line, offset - self.rope.line_to_byte(line))
    }

    fn move_left(&mut self) {
        if self.cursor.col > 0 {
            let line = self.line_at(self.cursor.line).unwrap_or_default();
            let before = &line[..self.cursor.col];
            let prev_char_len = before.chars().next_back().map_or(1, char::len_utf8);
            self.cursor.set_col(self.cursor.col - prev_char_len);
        } else if self.cursor.line > 0 {
            self.cursor.line -= 1;
            self.cursor.set_col(self.line_len(self.cursor.line));
        }
    }

    fn move_right(&mut self) {
        let line_len = self.line_len(self.cursor.line);
        if self.cursor.col < line_len {
            let line = self.line_at(self.cursor.line).unwrap_or_default();
            let next_char_len = line[self.cursor.col..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            self.cursor.set_col(self.cursor.col + next_char_len);
        } else if self.cursor.line + 1 < self.line_count() {
            self.cursor.line += 1;
            self.cursor.set_col(0);
        }
    }

    fn move_up(&mut self) {
        if self.cursor.line > 0 {
            self.cursor.line -= 1;
            let max_col = self.line_len(self.cursor.line);
            self.cursor.col = self.cursor.col_memory.min(max_col);
        }
    }

    fn move_down(&mut self) {
        if self.cursor.line + 1 < self.line_count() {
            self.cursor.line += 1;
            let max_col = self.line_len(self.cursor.line);
            self.cursor.col = self.cursor.col_memory.min(max_col);
        }
    }
}

impl std::fmt::Debug for EditBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditBuffer")
            .field("text", &self.rope.to_string())
            .field("cursor", &self.cursor)
            .field("anchor", &self.anchor)
            .finish()
    }
}
