//! Node type definitions.
//!
//! `NodeKind` carries the payload of each node variant. Navigation links
//! (parent, children, siblings) live in `NodeData`, not here.

use std::collections::HashMap;

use super::NodeId;
use crate::dtd::{AttributeDecl, ElementDecl, Entity, Notation};

/// The kind of a node and its data.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document node. There is exactly one per `Document`.
    Document,

    /// An element, e.g. `<h:div class="x">`.
    Element {
        /// Local part of the name.
        name: String,
        prefix: Option<String>,
        /// The `Namespace` node the element is in, if any.
        namespace: Option<NodeId>,
        /// `Attribute` nodes in document order. Attributes are not part of
        /// the child list.
        attributes: Vec<NodeId>,
        /// `Namespace` nodes declared on this element.
        ns_decls: Vec<NodeId>,
    },

    /// An attribute. Its value is the chain of `Text` and `EntityRef`
    /// children.
    Attribute {
        name: String,
        prefix: Option<String>,
        namespace: Option<NodeId>,
        /// Supplied from an ATTLIST default rather than written in the tag.
        is_default: bool,
    },

    Text {
        content: String,
    },

    /// `<![CDATA[...]]>`
    CData {
        content: String,
    },

    Comment {
        content: String,
    },

    /// `<?target data?>`
    ProcessingInstruction {
        target: String,
        data: String,
    },

    /// An unexpanded `&name;`.
    EntityRef {
        name: String,
    },

    /// An `<!ENTITY>` declaration inside a DTD.
    Entity(Entity),

    /// A document type declaration: the internal or external subset.
    ///
    /// See XML 1.0 §2.8: `[28]` doctypedecl
    Dtd {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
        tables: Box<DtdTables>,
    },

    /// An `<!ELEMENT>` declaration inside a DTD.
    ElementDecl(ElementDecl),

    /// One attribute definition of an `<!ATTLIST>` inside a DTD.
    AttributeDecl(AttributeDecl),

    /// A namespace binding. Shared by every element and attribute in scope
    /// that uses it; never part of a child list.
    Namespace {
        /// Empty for the default namespace.
        prefix: String,
        uri: String,
    },
}

/// Node type tag, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    Element,
    Attribute,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
    EntityRef,
    Entity,
    Dtd,
    ElementDecl,
    AttributeDecl,
    Namespace,
}

impl NodeKind {
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Document => NodeType::Document,
            Self::Element { .. } => NodeType::Element,
            Self::Attribute { .. } => NodeType::Attribute,
            Self::Text { .. } => NodeType::Text,
            Self::CData { .. } => NodeType::CData,
            Self::Comment { .. } => NodeType::Comment,
            Self::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            Self::EntityRef { .. } => NodeType::EntityRef,
            Self::Entity(_) => NodeType::Entity,
            Self::Dtd { .. } => NodeType::Dtd,
            Self::ElementDecl(_) => NodeType::ElementDecl,
            Self::AttributeDecl(_) => NodeType::AttributeDecl,
            Self::Namespace { .. } => NodeType::Namespace,
        }
    }
}

/// Lookup tables of a DTD node. The declarations themselves are the DTD's
/// children, in document order; these map names to them.
#[derive(Debug, Clone, Default)]
pub struct DtdTables {
    pub elements: HashMap<String, NodeId>,
    /// Keyed by `(element, attribute)`.
    pub attributes: HashMap<(String, String), NodeId>,
    pub entities: HashMap<String, NodeId>,
    pub parameter_entities: HashMap<String, NodeId>,
    pub notations: Vec<Notation>,
}
