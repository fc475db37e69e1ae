//! Character classes of XML 1.0 §2.2 and §2.3.

use std::borrow::Cow;

/// Returns `true` if `c` matches `[2] Char`:
/// `#x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
pub(crate) fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x0001_0000..=0x0010_FFFF
    )
}

/// Returns `true` if `c` matches `[4] NameStartChar`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphabetic() || c == '_' || c == ':';
    }
    matches!(c,
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` matches `[4a] NameChar`.
pub(crate) fn is_name_char(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-' | '.');
    }
    is_name_start_char(c)
        || matches!(c, '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Returns `true` if `c` matches `[13] PubidChar`.
pub(crate) fn is_pubid_char(c: char) -> bool {
    matches!(c,
        ' ' | '\r' | '\n' |
        'a'..='z' | 'A'..='Z' | '0'..='9' |
        '-' | '\'' | '(' | ')' | '+' | ',' | '.' | '/' | ':' |
        '=' | '?' | ';' | '!' | '*' | '#' | '@' | '$' | '_' | '%'
    )
}

/// `[3] S`
pub(crate) fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Byte length of the `Name` at the start of `s`, 0 if there is none.
pub(crate) fn name_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if is_name_start_char(c) => {}
        _ => return 0,
    }
    s.char_indices()
        .skip(1)
        .find(|&(_, c)| !is_name_char(c))
        .map_or(s.len(), |(i, _)| i)
}

/// Byte length of the `Nmtoken` at the start of `s`.
pub(crate) fn nmtoken_len(s: &str) -> usize {
    s.char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map_or(s.len(), |(i, _)| i)
}

/// Accept table for the character data fast path: tab, LF, CR and
/// printable ASCII except `&`, `<` and `]`.
pub(crate) static CHAR_DATA: [bool; 256] = {
    let mut table = [false; 256];
    table[0x09] = true;
    table[0x0A] = true;
    table[0x0D] = true;
    let mut b = 0x20;
    while b <= 0x7F {
        table[b] = !matches!(b as u8, b'&' | b'<' | b']');
        b += 1;
    }
    table
};

/// Normalizes line endings per XML 1.0 §2.11: `\r\n` and a lone `\r`
/// both become `\n`.
pub(crate) fn normalize_newlines(s: &str) -> Cow<'_, str> {
    if memchr::memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_char() {
        assert!(is_xml_char('\t'));
        assert!(is_xml_char('\u{10FFFF}'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{FFFE}'));
    }

    #[test]
    fn test_name_len() {
        assert_eq!(name_len("root attr"), 4);
        assert_eq!(name_len("h:child>"), 7);
        assert_eq!(name_len("\u{E9}t\u{E9};"), 5);
        assert_eq!(name_len("1abc"), 0);
        assert_eq!(name_len(""), 0);
        assert_eq!(nmtoken_len("1abc|x"), 4);
    }

    #[test]
    fn test_pubid() {
        assert!("-//W3C//DTD XHTML 1.0//EN".chars().all(is_pubid_char));
        assert!(!is_pubid_char('"'));
        assert!(!is_pubid_char('\t'));
    }

    #[test]
    fn test_char_data_table() {
        assert!(CHAR_DATA[b'a' as usize]);
        assert!(CHAR_DATA[b'\n' as usize]);
        assert!(!CHAR_DATA[b'&' as usize]);
        assert!(!CHAR_DATA[b'<' as usize]);
        assert!(!CHAR_DATA[b']' as usize]);
        assert!(!CHAR_DATA[0x00]);
        assert!(!CHAR_DATA[0xC3]);
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
        assert!(matches!(normalize_newlines("plain"), Cow::Borrowed(_)));
    }
}
