//! Offset/position conversion at the editor-protocol boundary
//!
//! Spans inside the match tree are byte offsets into the document text.
//! The editor protocol this engine serves counts positions as a zero-based
//! line plus a character measured in UTF-16 code units, so every query
//! entry point converts through [`SourceMap`].
//!
//! - Line starts are collected once per document; offset-to-line lookup is
//!   a binary search.
//! - Character columns are re-measured per lookup by walking the one line
//!   involved, so multi-byte and surrogate-pair content maps correctly.

use lsp_types::Position;
use std::sync::Arc;

/// Converts between byte offsets and protocol positions for one document.
pub struct SourceMap {
    text: Arc<str>,
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(text: Arc<str>) -> Self {
        let mut line_starts = vec![0];
        for (byte_pos, ch) in text.char_indices() {
            if ch == '\n' {
                line_starts.push(byte_pos + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where the given line starts, if the line exists.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Convert a byte offset into a protocol position.
    ///
    /// Offsets past the end of the document clamp to the final position.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self
            .line_starts
            .binary_search(&offset)
            .unwrap_or_else(|i| i - 1);
        let character = self.text[self.line_starts[line]..offset]
            .chars()
            .map(char::len_utf16)
            .sum::<usize>();
        Position {
            line: line as u32,
            character: character as u32,
        }
    }

    /// Convert a protocol position into a byte offset.
    ///
    /// Positions beyond the end of a line clamp to the line end; lines
    /// beyond the document clamp to the document end.
    pub fn offset_at(&self, position: Position) -> usize {
        let line = position.line as usize;
        let Some(&start) = self.line_starts.get(line) else {
            return self.text.len();
        };
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let mut units = 0usize;
        for (idx, ch) in self.text[start..end].char_indices() {
            if units >= position.character as usize {
                return start + idx;
            }
            units += ch.len_utf16();
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(text: &str) -> SourceMap {
        SourceMap::new(Arc::from(text))
    }

    #[test]
    fn round_trips_ascii_offsets() {
        let map = map("Dim x As Integer\nx = 1\n");
        let pos = map.position_at(17);
        assert_eq!((pos.line, pos.character), (1, 0));
        assert_eq!(map.offset_at(pos), 17);
    }

    #[test]
    fn counts_characters_in_utf16_units() {
        // '𝕏' is one char, two UTF-16 units, four UTF-8 bytes.
        let map = map("a = \"𝕏\"\nb = 2");
        let quote_after = map.position_at(4 + 1 + 4);
        assert_eq!((quote_after.line, quote_after.character), (0, 7));
        assert_eq!(map.offset_at(quote_after), 9);
    }

    #[test]
    fn clamps_past_the_end() {
        let map = map("Do\nLoop");
        assert_eq!(
            map.offset_at(Position {
                line: 9,
                character: 0
            }),
            7
        );
        assert_eq!(
            map.offset_at(Position {
                line: 1,
                character: 99
            }),
            7
        );
        let end = map.position_at(999);
        assert_eq!((end.line, end.character), (1, 4));
    }

    #[test]
    fn line_starts_cover_every_line() {
        let map = map("If a Then\n  b = 1\nEnd If");
        assert_eq!(map.line_count(), 3);
        assert_eq!(map.line_start(0), Some(0));
        assert_eq!(map.line_start(1), Some(10));
        assert_eq!(map.line_start(2), Some(18));
        assert_eq!(map.line_start(3), None);
    }
}
