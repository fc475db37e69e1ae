//! Namespace scoping for the parser.
//!
//! [`NamespaceStack`] is a flat LIFO of `(prefix, uri)` bindings, each tagged
//! with the element depth that introduced it. The element stack remembers
//! how many bindings each start tag pushed and pops exactly that many on the
//! matching end tag.

/// The XML namespace, pre-bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace of `xmlns` attributes.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Capacity above which [`NamespaceStack::pop`] considers shrinking.
const SHRINK_THRESHOLD: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    prefix: String,
    uri: String,
    depth: usize,
}

/// In-scope namespace bindings during a parse.
#[derive(Debug)]
pub(crate) struct NamespaceStack {
    bindings: Vec<Binding>,
}

impl NamespaceStack {
    /// Creates a stack with `xml` pre-bound at depth 0.
    pub fn new() -> Self {
        Self {
            bindings: vec![Binding {
                prefix: "xml".to_string(),
                uri: XML_NAMESPACE.to_string(),
                depth: 0,
            }],
        }
    }

    /// Binds `prefix` (empty for the default namespace) at `depth`.
    ///
    /// Returns `false` without pushing if the prefix is already bound at the
    /// same depth.
    pub fn push(&mut self, depth: usize, prefix: &str, uri: &str) -> bool {
        let duplicate = self
            .bindings
            .iter()
            .rev()
            .take_while(|b| b.depth == depth)
            .any(|b| b.prefix == prefix);
        if duplicate {
            return false;
        }
        self.bindings.push(Binding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            depth,
        });
        true
    }

    /// Releases the top `n` bindings.
    pub fn pop(&mut self, n: usize) {
        let keep = self.bindings.len().saturating_sub(n).max(1);
        self.bindings.truncate(keep);
        if self.bindings.capacity() > SHRINK_THRESHOLD
            && self.bindings.capacity() > 2 * self.bindings.len()
        {
            self.bindings.shrink_to(2 * self.bindings.len());
        }
    }

    /// Resolves a prefix, most recent binding first. Unknown prefixes and
    /// an undeclared default namespace resolve to `""`.
    pub fn lookup(&self, prefix: &str) -> &str {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map_or("", |b| b.uri.as_str())
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.bindings.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_prefix_predefined() {
        let ns = NamespaceStack::new();
        assert_eq!(ns.lookup("xml"), XML_NAMESPACE);
        assert_eq!(ns.lookup("nope"), "");
        assert_eq!(ns.lookup(""), "");
    }

    #[test]
    fn test_most_recent_wins() {
        let mut ns = NamespaceStack::new();
        assert!(ns.push(1, "a", "urn:outer"));
        assert!(ns.push(2, "a", "urn:inner"));
        assert_eq!(ns.lookup("a"), "urn:inner");
        ns.pop(1);
        assert_eq!(ns.lookup("a"), "urn:outer");
    }

    #[test]
    fn test_duplicate_in_same_scope_rejected() {
        let mut ns = NamespaceStack::new();
        assert!(ns.push(1, "a", "urn:1"));
        assert!(ns.push(1, "", "urn:default"));
        assert!(!ns.push(1, "a", "urn:2"));
        assert_eq!(ns.lookup("a"), "urn:1");
        assert_eq!(ns.bindings.len(), 3);
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let mut ns = NamespaceStack::new();
        ns.push(1, "", "urn:d");
        ns.push(2, "", "");
        assert_eq!(ns.lookup(""), "");
    }

    #[test]
    fn test_pop_never_drops_xml() {
        let mut ns = NamespaceStack::new();
        ns.push(1, "a", "urn:a");
        ns.pop(10);
        assert_eq!(ns.bindings.len(), 1);
        assert_eq!(ns.lookup("xml"), XML_NAMESPACE);
    }

    #[test]
    fn test_pop_shrinks() {
        let mut ns = NamespaceStack::new();
        for i in 0..100 {
            ns.push(i + 1, "p", "urn:p");
        }
        ns.pop(98);
        assert_eq!(ns.bindings.len(), 3);
        assert!(ns.capacity() <= SHRINK_THRESHOLD.max(6));
    }
}
