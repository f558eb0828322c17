//! Headless note measurement.
//!
//! A real host measures rendered notes; without one, note heights are
//! estimated by greedy word wrapping on a monospace grid.

use unicode_width::UnicodeWidthStr;

/// Monospace text metrics used for estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub char_width: f32,
    pub line_height: f32,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            line_height: 24.0,
        }
    }
}

/// Number of wrapped rows `text` occupies within `columns` cells.
pub fn wrapped_rows(text: &str, columns: usize) -> usize {
    let columns = columns.max(1);
    text.split('\n')
        .map(|line| {
            let mut rows = 1;
            let mut used = 0;
            for word in line.split_whitespace() {
                let width = word.width();
                let needed = if used == 0 { width } else { used + 1 + width };
                if needed <= columns {
                    used = needed;
                } else if width > columns {
                    // Hard-break long words across rows
                    if used > 0 {
                        rows += 1;
                    }
                    rows += (width - 1) / columns;
                    used = width % columns;
                    if used == 0 {
                        used = columns;
                    }
                } else {
                    rows += 1;
                    used = width;
                }
            }
            rows
        })
        .sum()
}

/// Estimated rendered height of a note: the label row prefix counts as part
/// of the first line.
pub fn estimate_height(label: &str, content: &str, margin_width: f32, metrics: TextMetrics) -> f32 {
    if margin_width <= 0.0 || metrics.char_width <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let columns = (margin_width / metrics.char_width).floor() as usize;
    let text = format!("{label}. {content}");
    wrapped_rows(&text, columns) as f32 * metrics.line_height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_row() {
        assert_eq!(wrapped_rows("hello world", 20), 1);
    }

    #[test]
    fn test_wraps_at_word_boundaries() {
        assert_eq!(wrapped_rows("aaaa bbbb cccc", 9), 2);
        assert_eq!(wrapped_rows("aaaa bbbb cccc", 4), 3);
    }

    #[test]
    fn test_explicit_newlines_add_rows() {
        assert_eq!(wrapped_rows("one\ntwo\n\nfour", 40), 4);
    }

    #[test]
    fn test_long_word_is_hard_broken() {
        assert_eq!(wrapped_rows("abcdefghij", 4), 3);
        assert_eq!(wrapped_rows("ab abcdefgh", 4), 3);
    }

    #[test]
    fn test_wide_characters_count_double() {
        // Each CJK character is two cells wide
        assert_eq!(wrapped_rows("日本語", 4), 2);
    }

    #[test]
    fn test_estimate_height_scales_with_line_height() {
        let metrics = TextMetrics {
            char_width: 10.0,
            line_height: 20.0,
        };
        assert_eq!(estimate_height("1", "short", 200.0, metrics), 20.0);
        assert_eq!(estimate_height("1", "short", 0.0, metrics), 0.0);
    }
}
