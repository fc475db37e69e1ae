//! Open-element bookkeeping.
//!
//! The parser pushes a [`ParsedElement`] for every start tag and pops it at
//! the matching end tag. The same structure is what `start_element` and
//! `end_element` events carry to the sink.

use crate::util::qname::qualified_name;

/// One piece of an attribute value: literal text or an entity reference
/// that was left unexpanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValuePart {
    Text(String),
    EntityRef(String),
}

/// An attribute as read from a start tag (or supplied from an ATTLIST
/// default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttribute {
    pub local: String,
    pub prefix: Option<String>,
    /// Namespace URI the prefix resolved to, if any.
    pub namespace: Option<String>,
    pub value: Vec<AttrValuePart>,
    /// `true` when the attribute came from a DTD default rather than the
    /// start tag.
    pub is_default: bool,
}

impl ParsedAttribute {
    /// The qualified name as written.
    #[must_use]
    pub fn name(&self) -> String {
        qualified_name(self.prefix.as_deref(), &self.local)
    }

    /// The value with unexpanded references written back as `&name;`.
    #[must_use]
    pub fn value_string(&self) -> String {
        let mut out = String::new();
        for part in &self.value {
            match part {
                AttrValuePart::Text(t) => out.push_str(t),
                AttrValuePart::EntityRef(name) => {
                    out.push('&');
                    out.push_str(name);
                    out.push(';');
                }
            }
        }
        out
    }
}

/// An element in flight between its start and end tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedElement {
    pub local: String,
    pub prefix: Option<String>,
    /// Namespace URI of the element, if its prefix (or the default
    /// namespace) is bound.
    pub namespace: Option<String>,
    pub attributes: Vec<ParsedAttribute>,
    /// `xmlns` declarations on this start tag as `(prefix, uri)`; the
    /// default namespace has an empty prefix.
    pub namespaces: Vec<(String, String)>,
    /// Bindings this element pushed onto the namespace stack.
    pub(crate) ns_pushed: usize,
}

impl ParsedElement {
    /// The qualified name as written.
    #[must_use]
    pub fn name(&self) -> String {
        qualified_name(self.prefix.as_deref(), &self.local)
    }

    /// Looks up an attribute by qualified name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ParsedAttribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }
}

/// LIFO of open elements.
#[derive(Debug, Default)]
pub(crate) struct ElementStack {
    open: Vec<ParsedElement>,
}

impl ElementStack {
    pub fn push(&mut self, element: ParsedElement) {
        self.open.push(element);
    }

    pub fn pop(&mut self) -> Option<ParsedElement> {
        self.open.pop()
    }

    pub fn peek(&self) -> Option<&ParsedElement> {
        self.open.last()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Whether an end tag with this prefix and local name closes the
    /// innermost open element.
    pub fn matches_end(&self, prefix: Option<&str>, local: &str) -> bool {
        self.peek()
            .is_some_and(|e| e.local == local && e.prefix.as_deref() == prefix)
    }
}
