//! Qualified names per Namespaces in XML 1.0 §4.
//!
//! `QName ::= (Prefix ':')? LocalPart`, where both parts are `NCName`s.

use crate::parser::chars::{is_name_char, is_name_start_char};

/// Splits a `QName` on its first colon.
///
/// A name whose colon is leading or trailing is not a `QName`; it is
/// returned whole as an unprefixed local name.
///
/// ```
/// use helium::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// assert_eq!(split_qname(":odd"), (None, ":odd"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) if pos > 0 && pos + 1 < qname.len() => (Some(&qname[..pos]), &qname[pos + 1..]),
        _ => (None, qname),
    }
}

/// Joins a prefix and local name back into a `QName`.
#[must_use]
pub fn qualified_name(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{local}"),
        _ => local.to_string(),
    }
}

/// Returns `true` if `name` is an `NCName` (a `Name` without colons).
#[must_use]
pub fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c != ':' && is_name_start_char(c))
        && chars.all(|c| c != ':' && is_name_char(c))
}

/// Returns `true` if `name` is a well-formed `QName`.
#[must_use]
pub fn is_qname(name: &str) -> bool {
    match split_qname(name) {
        (Some(prefix), local) => is_ncname(prefix) && is_ncname(local),
        (None, local) => is_ncname(local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_with_prefix() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
    }

    #[test]
    fn test_split_degenerate_colons() {
        assert_eq!(split_qname(""), (None, ""));
        assert_eq!(split_qname("prefix:"), (None, "prefix:"));
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name(Some("h"), "root"), "h:root");
        assert_eq!(qualified_name(Some(""), "root"), "root");
        assert_eq!(qualified_name(None, "root"), "root");
    }

    #[test]
    fn test_ncname_and_qname() {
        assert!(is_ncname("local"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname("1a"));
        assert!(is_qname("a:b"));
        assert!(is_qname("b"));
        assert!(!is_qname("a:b:c"));
        assert!(!is_qname(":b"));
    }
}
