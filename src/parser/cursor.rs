//! Byte cursor over decoded parser input.
//!
//! A [`Cursor`] is a read-only view over UTF-8 text with a position, the
//! remaining length, and line/column tracking. The parser stacks cursors to
//! splice entity replacement text into the input without copying it into
//! the document buffer.

use std::borrow::Cow;

use crate::error::SourceLocation;

/// Longest source line fragment attached to an error.
const CONTEXT_WIDTH: usize = 80;

/// Read position over an immutable UTF-8 buffer.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    buf: Cow<'a, str>,
    index: usize,
    remain: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: impl Into<Cow<'a, str>>) -> Self {
        let buf = buf.into();
        let remain = buf.len();
        Self {
            buf,
            index: 0,
            remain,
            line: 1,
            column: 1,
        }
    }

    // -- Position queries --

    /// Current byte offset.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_eof(&self) -> bool {
        self.remain == 0
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_offset: self.index,
        }
    }

    /// The unread bytes.
    pub fn rest(&self) -> &[u8] {
        &self.buf.as_bytes()[self.index..]
    }

    /// The unread text. The position is always on a character boundary.
    pub fn rest_str(&self) -> &str {
        &self.buf[self.index..]
    }

    // -- Lookahead --

    /// The byte at offset `i` from the current position, 0 past the end.
    pub fn peek_at(&self, i: usize) -> u8 {
        self.rest().get(i).copied().unwrap_or(0)
    }

    /// Decodes the character starting at byte offset `i`, with its width.
    pub fn peek_rune_at(&self, i: usize) -> Option<(char, usize)> {
        let start = self.index + i;
        let c = self.buf.get(start..)?.chars().next()?;
        Some((c, c.len_utf8()))
    }

    /// The character at the current position, with its width.
    pub fn cur_rune(&self) -> Option<(char, usize)> {
        self.peek_rune_at(0)
    }

    pub fn has_prefix(&self, s: &[u8]) -> bool {
        self.rest().starts_with(s)
    }

    /// Consumes `s` if the input starts with it.
    pub fn consume_prefix(&mut self, s: &[u8]) -> bool {
        if self.has_prefix(s) {
            self.advance(s.len());
            true
        } else {
            false
        }
    }

    // -- Consumption --

    /// Consumes `n` bytes, tracking lines on LF and columns per character.
    /// Callers never split a multi-byte character.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.remain);
        for &b in &self.buf.as_bytes()[self.index..self.index + n] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column += 1;
            }
        }
        self.index += n;
        self.remain -= n;
    }

    /// Consumes space, tab, CR and LF. Returns how many bytes were skipped.
    pub fn skip_blanks(&mut self) -> usize {
        let n = self
            .rest()
            .iter()
            .take_while(|&&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        self.advance(n);
        n
    }

    /// A slice of the underlying buffer between two byte offsets.
    pub fn get_region(&self, start: usize, end: usize) -> &str {
        &self.buf[start..end]
    }

    /// The source line around the current position, at most
    /// `CONTEXT_WIDTH` bytes, cut on character boundaries.
    pub fn line_fragment(&self) -> String {
        let bytes = self.buf.as_bytes();
        let pos = self.index.min(bytes.len());
        let line_start = memchr::memrchr(b'\n', &bytes[..pos]).map_or(0, |p| p + 1);
        let line_end = memchr::memchr(b'\n', &bytes[pos..]).map_or(bytes.len(), |p| pos + p);

        let mut start = line_start.max(pos.saturating_sub(CONTEXT_WIDTH / 2));
        let mut end = line_end.min(start + CONTEXT_WIDTH);
        while !self.buf.is_char_boundary(start) {
            start += 1;
        }
        while end > start && !self.buf.is_char_boundary(end) {
            end -= 1;
        }
        self.buf[start..end].trim_end_matches('\r').to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_and_advance() {
        let mut cur = Cursor::new("<root/>");
        assert_eq!(cur.peek_at(1), b'r');
        assert_eq!(cur.peek_at(100), 0);
        cur.advance(5);
        assert_eq!(cur.index(), 5);
        assert_eq!(cur.rest(), b"/>");
        cur.advance(10);
        assert!(cur.is_eof());
        assert_eq!(cur.peek_at(0), 0);
    }

    #[test]
    fn test_runes() {
        let cur = Cursor::new("a\u{E9}\u{1F600}");
        assert_eq!(cur.cur_rune(), Some(('a', 1)));
        assert_eq!(cur.peek_rune_at(1), Some(('\u{E9}', 2)));
        assert_eq!(cur.peek_rune_at(3), Some(('\u{1F600}', 4)));
        assert_eq!(cur.peek_rune_at(7), None);
    }

    #[test]
    fn test_prefix() {
        let mut cur = Cursor::new("<!--x-->");
        assert!(cur.has_prefix(b"<!"));
        assert!(!cur.consume_prefix(b"<?"));
        assert!(cur.consume_prefix(b"<!--"));
        assert_eq!(cur.rest(), b"x-->");
    }

    #[test]
    fn test_line_and_column_tracking() {
        let mut cur = Cursor::new("ab\n\u{E9}c");
        cur.advance(3);
        assert_eq!(cur.location().line, 2);
        assert_eq!(cur.location().column, 1);
        cur.advance(2);
        assert_eq!(cur.location().column, 2);
        assert_eq!(cur.location().byte_offset, 5);
    }

    #[test]
    fn test_skip_blanks() {
        let mut cur = Cursor::new(" \t\r\n x");
        assert_eq!(cur.skip_blanks(), 5);
        assert_eq!(cur.location().line, 2);
        assert_eq!(cur.peek_at(0), b'x');
        assert_eq!(cur.skip_blanks(), 0);
    }

    #[test]
    fn test_get_region() {
        let mut cur = Cursor::new("hello world");
        let start = cur.index();
        cur.advance(5);
        assert_eq!(cur.get_region(start, cur.index()), "hello");
    }

    #[test]
    fn test_line_fragment() {
        let mut cur = Cursor::new("<a>\n<root>a</rot>\n</a>");
        cur.advance(11);
        assert_eq!(cur.line_fragment(), "<root>a</rot>");
    }

    #[test]
    fn test_line_fragment_is_bounded() {
        let long = "x".repeat(500);
        let mut cur = Cursor::new(long.as_str());
        cur.advance(250);
        assert_eq!(cur.line_fragment().len(), CONTEXT_WIDTH);
    }
}
