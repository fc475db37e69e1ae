//! XML serialization.
//!
//! Writes a `Document`, or any subtree of one, back to XML text. Output is
//! produced as UTF-8 and then encoded into the document's declared
//! encoding.

pub mod xml;

use std::fmt;
use std::io;

use crate::encoding::EncodingError;
use crate::parser::chars::is_xml_char;

pub use xml::{serialize, serialize_node, serialize_with_options, write_document};

/// Options controlling serialization output.
///
/// ```
/// use helium::serial::SerializeOptions;
///
/// let opts = SerializeOptions::default().format(true);
/// assert!(opts.format);
/// assert!(!opts.escape_newlines);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Write `\n` in text as `&#10;` (default: false).
    pub escape_newlines: bool,
    /// Indent element-only content with two spaces per level
    /// (default: false).
    pub format: bool,
}

impl SerializeOptions {
    #[must_use]
    pub fn escape_newlines(mut self, yes: bool) -> Self {
        self.escape_newlines = yes;
        self
    }

    #[must_use]
    pub fn format(mut self, yes: bool) -> Self {
        self.format = yes;
        self
    }
}

/// The error type returned when writing a document fails.
#[derive(Debug)]
pub enum SerializeError {
    /// The writer failed.
    Io(io::Error),
    /// The output contains characters the target encoding cannot express,
    /// or the encoding is unknown.
    Encoding(EncodingError),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "write failed: {err}"),
            Self::Encoding(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encoding(err) => Some(err),
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<EncodingError> for SerializeError {
    fn from(err: EncodingError) -> Self {
        Self::Encoding(err)
    }
}

// --- Escaping ---

/// Writes a hexadecimal character reference (`&#xHH;`).
fn push_hex_char_ref(out: &mut String, ch: char) {
    use std::fmt::Write;
    let _ = write!(out, "&#x{:X};", u32::from(ch));
}

/// Shared tail of both escape tables: characters outside the `Char`
/// production become U+FFFD, two-byte UTF-8 sequences become hex
/// references, everything else is copied.
fn push_plain(out: &mut String, ch: char) {
    if !is_xml_char(ch) {
        out.push('\u{FFFD}');
    } else if ch.len_utf8() == 2 {
        push_hex_char_ref(out, ch);
    } else {
        out.push(ch);
    }
}

/// Escapes an attribute value for use inside double quotes.
///
/// ```
/// use helium::serial::escape_attr_value;
///
/// assert_eq!(escape_attr_value("a<\"b\"\t"), "a&lt;&#34;b&#34;&#9;");
/// ```
#[must_use]
pub fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => push_plain(&mut out, ch),
        }
    }
    out
}

/// Escapes character data. `\n` is escaped only when `escape_newlines` is
/// set; `\r` always is, so it survives the reader's line-end handling.
///
/// ```
/// use helium::serial::escape_text;
///
/// assert_eq!(escape_text("1 < 2\r\n", false), "1 &lt; 2&#13;\n");
/// assert_eq!(escape_text("a\nb", true), "a&#10;b");
/// ```
#[must_use]
pub fn escape_text(text: &str, escape_newlines: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '\n' if escape_newlines => out.push_str("&#10;"),
            '\t' | '\n' => out.push(ch),
            _ => push_plain(&mut out, ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text_table() {
        assert_eq!(escape_text("a&b<c>d", false), "a&amp;b&lt;c&gt;d");
        assert_eq!(escape_text("\"quoted\" 'x'", false), "\"quoted\" 'x'");
        assert_eq!(escape_text("tab\there", false), "tab\there");
        assert_eq!(escape_text("\u{1}", false), "\u{FFFD}");
        assert_eq!(escape_text("\u{FFFE}", false), "\u{FFFD}");
    }

    #[test]
    fn test_escape_attr_table() {
        assert_eq!(escape_attr_value("&<>"), "&amp;&lt;&gt;");
        assert_eq!(escape_attr_value("\n\r"), "&#10;&#13;");
        assert_eq!(escape_attr_value("'"), "'");
    }

    #[test]
    fn test_non_ascii_escaping() {
        // two-byte UTF-8 sequences become references
        assert_eq!(escape_text("caf\u{E9}", false), "caf&#xE9;");
        assert_eq!(escape_attr_value("\u{3B1}"), "&#x3B1;");
        // three- and four-byte sequences are written as is
        assert_eq!(escape_text("\u{65E5}\u{672C}", false), "\u{65E5}\u{672C}");
        assert_eq!(escape_attr_value("\u{1F600}"), "\u{1F600}");
    }

    #[test]
    fn test_options_builder() {
        let opts = SerializeOptions::default().escape_newlines(true).format(true);
        assert!(opts.escape_newlines);
        assert!(opts.format);
    }
}
