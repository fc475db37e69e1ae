//! Arena-based document tree.
//!
//! All nodes live in a `Vec<NodeData>` owned by the [`Document`] and are
//! referenced by [`NodeId`], a newtype over `NonZeroU32`. Parent, child and
//! sibling links are indices, so the cyclic parent/child structure needs no
//! reference counting and dropping the `Document` frees everything at once.
//!
//! Mutation goes through a handful of checked operations ([`add_child`],
//! [`add_content`], [`add_sibling`], [`replace`]) that keep the tree
//! invariants: sibling lists are doubly linked, adjacent text nodes are
//! merged, attribute values hold only text and entity references, and a
//! document has at most one root element.
//!
//! [`add_child`]: Document::add_child
//! [`add_content`]: Document::add_content
//! [`add_sibling`]: Document::add_sibling
//! [`replace`]: Document::replace

mod builder;
mod node;

pub use builder::TreeBuilder;
pub use node::{DtdTables, NodeKind, NodeType};

use std::num::NonZeroU32;

use log::trace;

use crate::dtd::{predefined_entity, AttributeDecl, ElementDecl, Entity, Notation};
use crate::error::{ErrorKind, ParseError, TreeError};
use crate::parser::{ParseOptions, XML_NAMESPACE};
use crate::sax::Standalone;
use crate::util::qname::{qualified_name, split_qname};

/// A typed index into the document's node arena.
///
/// `Option<NodeId>` has the same size as `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Arena slot `index` is id `index + 1`.
    fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index).unwrap_or(u32::MAX - 1);
        Self(NonZeroU32::MIN.saturating_add(raw))
    }

    fn as_index(self) -> usize {
        self.0.get() as usize - 1
    }

    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.0.get()
    }

    /// Returns `None` for 0.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

/// Storage for a single node in the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    /// Parent node. For attributes and namespace nodes, the element that
    /// owns them.
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    /// Last child, for O(1) append.
    pub last_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// Settings for a new [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Default `"1.0"`.
    pub version: String,
    /// Empty means unspecified.
    pub encoding: String,
    pub standalone: Standalone,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: String::new(),
            standalone: Standalone::NoDecl,
        }
    }
}

impl CreateOptions {
    #[must_use]
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: &str) -> Self {
        self.encoding = encoding.to_string();
        self
    }

    #[must_use]
    pub fn standalone(mut self, standalone: Standalone) -> Self {
        self.standalone = standalone;
        self
    }
}

/// An XML document.
///
/// Owns all of its nodes. Navigation goes through `&Document`, mutation
/// through `&mut Document`.
///
/// # Examples
///
/// ```
/// use helium::Document;
///
/// let mut doc = Document::new();
/// let root = doc.create_element("greeting");
/// doc.set_document_element(root).unwrap();
/// doc.add_content(root, "Hello").unwrap();
/// assert_eq!(doc.text_content(root), "Hello");
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    /// The implicit `xml` namespace binding.
    xml_ns: NodeId,
    pub version: String,
    /// Declared encoding; empty when unspecified.
    pub encoding: String,
    pub standalone: Standalone,
    /// The DOCTYPE node, which is also a child of the document node.
    pub int_subset: Option<NodeId>,
    /// The external subset, if the DOCTYPE names one. Not part of the tree.
    pub ext_subset: Option<NodeId>,
}

impl Document {
    /// Creates an empty document with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(&CreateOptions::default())
    }

    #[must_use]
    pub fn with_options(options: &CreateOptions) -> Self {
        let nodes = vec![
            NodeData::new(NodeKind::Document),
            NodeData::new(NodeKind::Namespace {
                prefix: "xml".to_string(),
                uri: XML_NAMESPACE.to_string(),
            }),
        ];
        Self {
            nodes,
            root: NodeId::from_index(0),
            xml_ns: NodeId::from_index(1),
            version: options.version.clone(),
            encoding: options.encoding.clone(),
            standalone: options.standalone,
            int_subset: None,
            ext_subset: None,
        }
    }

    /// Parses a string with default options.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the input is not well-formed.
    ///
    /// ```
    /// use helium::Document;
    ///
    /// let doc = Document::parse_str("<root><child/></root>").unwrap();
    /// let root = doc.root_element().unwrap();
    /// assert_eq!(doc.children(root).count(), 1);
    /// ```
    pub fn parse_str(input: &str) -> Result<Self, ParseError> {
        crate::parser::parse_str(input, &ParseOptions::default())
    }

    // --- Node access ---

    /// The document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The single top-level element, if any.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| self.node_type(id) == NodeType::Element)
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Number of nodes in the arena, detached ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.node(id).kind.node_type()
    }

    /// The short name of a node: the local part for elements and
    /// attributes, the target of a PI, the declared name of entities,
    /// declarations and DTDs, the prefix of a namespace, or one of
    /// `#document`, `#text`, `#cdata-section`, `#comment`.
    #[must_use]
    pub fn local_name(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Document => "#document",
            NodeKind::Text { .. } => "#text",
            NodeKind::CData { .. } => "#cdata-section",
            NodeKind::Comment { .. } => "#comment",
            NodeKind::Element { name, .. }
            | NodeKind::Attribute { name, .. }
            | NodeKind::EntityRef { name }
            | NodeKind::Dtd { name, .. } => name,
            NodeKind::ProcessingInstruction { target, .. } => target,
            NodeKind::Entity(entity) => &entity.name,
            NodeKind::ElementDecl(decl) => &decl.name,
            NodeKind::AttributeDecl(decl) => &decl.name,
            NodeKind::Namespace { prefix, .. } => prefix,
        }
    }

    /// The qualified name of an element or attribute; `local_name` for
    /// everything else.
    #[must_use]
    pub fn name(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Element { name, prefix, .. } | NodeKind::Attribute { name, prefix, .. } => {
                qualified_name(prefix.as_deref(), name)
            }
            _ => self.local_name(id).to_string(),
        }
    }

    #[must_use]
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { prefix, .. } | NodeKind::Attribute { prefix, .. } => prefix.as_deref(),
            _ => None,
        }
    }

    /// The namespace node of an element or attribute.
    #[must_use]
    pub fn namespace(&self, id: NodeId) -> Option<NodeId> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } | NodeKind::Attribute { namespace, .. } => *namespace,
            _ => None,
        }
    }

    /// The namespace URI of an element or attribute, or the URI a
    /// namespace node binds.
    #[must_use]
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let ns = match &self.node(id).kind {
            NodeKind::Namespace { uri, .. } => return Some(uri),
            _ => self.namespace(id)?,
        };
        match &self.node(ns).kind {
            NodeKind::Namespace { uri, .. } => Some(uri),
            _ => None,
        }
    }

    /// The content of a node: the text of character nodes, the data of a
    /// PI, the replacement text of an entity, the value of an attribute,
    /// the text of all descendants for elements and documents.
    #[must_use]
    pub fn content(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Text { content } | NodeKind::CData { content } | NodeKind::Comment { content } => {
                content.clone()
            }
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
            NodeKind::Entity(entity) => entity.content.clone(),
            NodeKind::Namespace { uri, .. } => uri.clone(),
            NodeKind::Attribute { .. } => self.attr_value_of(id),
            NodeKind::EntityRef { name } => self.entity_text(name).unwrap_or_default(),
            NodeKind::Element { .. } | NodeKind::Document => self.text_content(id),
            NodeKind::Dtd { .. } | NodeKind::ElementDecl(_) | NodeKind::AttributeDecl(_) => String::new(),
        }
    }

    /// Concatenated text of all text and CDATA descendants. Entity
    /// references contribute their replacement text when it is known.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut result = String::new();
        self.collect_text(id, &mut result);
        result
    }

    fn collect_text(&self, id: NodeId, buf: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text { content } | NodeKind::CData { content } => buf.push_str(content),
            NodeKind::EntityRef { name } => {
                if let Some(text) = self.entity_text(name) {
                    buf.push_str(&text);
                }
            }
            NodeKind::Comment { .. } | NodeKind::ProcessingInstruction { .. } => {}
            _ => {
                for child in self.children(id) {
                    self.collect_text(child, buf);
                }
            }
        }
    }

    fn entity_text(&self, name: &str) -> Option<String> {
        if let Some(entity) = predefined_entity(name) {
            return Some(entity.content);
        }
        self.get_entity(name)
            .filter(|e| e.entity_type.is_internal())
            .map(|e| e.content.clone())
    }

    // --- Navigation ---

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// The node itself, then each ancestor up to the document node.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// All descendants in document order, not including `id`.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.first_child(id),
        }
    }

    // --- Node creation ---

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(NodeData::new(kind));
        id
    }

    /// Creates a detached element. A prefixed name keeps its prefix; the
    /// namespace is bound when one is set or the element is attached
    /// under a declaration of it.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let (prefix, local) = split_qname(name);
        self.alloc(NodeKind::Element {
            name: local.to_string(),
            prefix: prefix.map(str::to_string),
            namespace: None,
            attributes: Vec::new(),
            ns_decls: Vec::new(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.alloc(NodeKind::Text {
            content: content.to_string(),
        })
    }

    pub fn create_cdata(&mut self, content: &str) -> NodeId {
        self.alloc(NodeKind::CData {
            content: content.to_string(),
        })
    }

    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.alloc(NodeKind::Comment {
            content: content.to_string(),
        })
    }

    pub fn create_pi(&mut self, target: &str, data: &str) -> NodeId {
        self.alloc(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    pub fn create_entity_ref(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::EntityRef {
            name: name.to_string(),
        })
    }

    /// Creates a detached attribute whose value is `value` taken literally.
    pub fn create_attribute(&mut self, name: &str, value: &str) -> NodeId {
        let (prefix, local) = split_qname(name);
        let attr = self.alloc(NodeKind::Attribute {
            name: local.to_string(),
            prefix: prefix.map(str::to_string),
            namespace: None,
            is_default: false,
        });
        if !value.is_empty() {
            let text = self.create_text(value);
            self.link_last(attr, text);
        }
        attr
    }

    /// Creates a detached entity declaration node.
    pub fn create_entity(&mut self, entity: Entity) -> NodeId {
        self.alloc(NodeKind::Entity(entity))
    }

    pub fn create_element_decl(&mut self, decl: ElementDecl) -> NodeId {
        self.alloc(NodeKind::ElementDecl(decl))
    }

    pub fn create_attribute_decl(&mut self, decl: AttributeDecl) -> NodeId {
        self.alloc(NodeKind::AttributeDecl(decl))
    }

    /// Creates an unattached namespace binding.
    pub fn create_namespace(&mut self, prefix: &str, uri: &str) -> NodeId {
        self.alloc(NodeKind::Namespace {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }

    pub fn create_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) -> NodeId {
        self.alloc(NodeKind::Dtd {
            name: name.to_string(),
            public_id: public_id.map(str::to_string),
            system_id: system_id.map(str::to_string),
            tables: Box::default(),
        })
    }

    // --- Linking ---

    fn link_last(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
        } else {
            self.node_mut(parent).first_child = Some(child);
        }
        self.node_mut(parent).last_child = Some(child);
    }

    fn link_before(&mut self, reference: NodeId, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        match self.node(reference).prev_sibling {
            Some(prev) => {
                self.node_mut(prev).next_sibling = Some(child);
                self.node_mut(child).prev_sibling = Some(prev);
            }
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(child).next_sibling = Some(reference);
        self.node_mut(reference).prev_sibling = Some(child);
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    fn is_text(&self, id: Option<NodeId>) -> bool {
        id.is_some_and(|id| self.node_type(id) == NodeType::Text)
    }

    fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match &mut self.node_mut(id).kind {
            NodeKind::Text { content } => Some(content),
            _ => None,
        }
    }

    fn take_text(&mut self, id: NodeId) -> String {
        self.text_mut(id).map(std::mem::take).unwrap_or_default()
    }

    /// Folds the text siblings on both sides of `id` into one node and
    /// returns the survivor.
    fn merge_text_neighbors(&mut self, id: NodeId) -> NodeId {
        let mut keep = id;
        if let Some(prev) = self.prev_sibling(id).filter(|&p| self.is_text(Some(p))) {
            let text = self.take_text(id);
            if let Some(content) = self.text_mut(prev) {
                content.push_str(&text);
            }
            self.unlink(id);
            keep = prev;
        }
        if let Some(next) = self.next_sibling(keep).filter(|&n| self.is_text(Some(n))) {
            let text = self.take_text(next);
            if let Some(content) = self.text_mut(keep) {
                content.push_str(&text);
            }
            self.unlink(next);
        }
        keep
    }

    /// Checks that `child` may go under `parent`. `replacing` is a child of
    /// `parent` that is about to leave.
    fn check_child(&self, parent: NodeId, child: NodeId, replacing: Option<NodeId>) -> Result<(), TreeError> {
        if child == self.root {
            return Err(TreeError::new(ErrorKind::InvalidOperation, "the document node cannot be a child"));
        }
        if self.node(child).parent.is_some() {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "node already has a parent; detach it first",
            ));
        }
        if self.ancestors(parent).any(|a| a == child) {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "a node cannot be added below itself",
            ));
        }
        let child_type = self.node_type(child);
        let allowed = match self.node_type(parent) {
            NodeType::Document => {
                if child_type == NodeType::Element {
                    let existing = self.root_element();
                    if existing.is_some() && existing != replacing {
                        return Err(TreeError::new(
                            ErrorKind::InvalidDocument,
                            "document already has a root element",
                        ));
                    }
                    true
                } else if matches!(child_type, NodeType::Text | NodeType::CData | NodeType::EntityRef) {
                    return Err(TreeError::new(ErrorKind::InvalidDocument, "text in wrong location"));
                } else {
                    matches!(
                        child_type,
                        NodeType::Comment | NodeType::ProcessingInstruction | NodeType::Dtd
                    )
                }
            }
            NodeType::Element => matches!(
                child_type,
                NodeType::Element
                    | NodeType::Text
                    | NodeType::CData
                    | NodeType::Comment
                    | NodeType::ProcessingInstruction
                    | NodeType::EntityRef
            ),
            NodeType::Attribute => matches!(child_type, NodeType::Text | NodeType::EntityRef),
            NodeType::Dtd => matches!(
                child_type,
                NodeType::Entity
                    | NodeType::ElementDecl
                    | NodeType::AttributeDecl
                    | NodeType::Comment
                    | NodeType::ProcessingInstruction
            ),
            NodeType::Text => child_type == NodeType::Text,
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(TreeError::new(
                ErrorKind::InvalidOperation,
                format!(
                    "{child_type:?} node cannot be added to {:?} node",
                    self.node_type(parent)
                ),
            ))
        }
    }

    // --- Mutation ---

    /// Appends `child` as the last child of `parent` and returns the node
    /// that now holds it.
    ///
    /// Text is merged: a text child joins a trailing text node of
    /// `parent`, and a text child added to a text node extends it. In both
    /// cases the returned id is the surviving node and `child` is left
    /// unused. An attribute added to an element goes to its attribute list.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `child` is attached, is an ancestor of
    /// `parent`, or is of a kind `parent` cannot hold. `InvalidDocument`
    /// for a second root element or text directly under the document.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, TreeError> {
        if self.node_type(child) == NodeType::Attribute && self.node_type(parent) == NodeType::Element {
            return self.add_attribute(parent, child);
        }
        self.check_child(parent, child, None)?;
        if self.node_type(parent) == NodeType::Text {
            let text = self.take_text(child);
            if let Some(content) = self.text_mut(parent) {
                content.push_str(&text);
            }
            return Ok(parent);
        }
        if self.node_type(child) == NodeType::Text {
            if let Some(last) = self.last_child(parent).filter(|&l| self.is_text(Some(l))) {
                let text = self.take_text(child);
                if let Some(content) = self.text_mut(last) {
                    content.push_str(&text);
                }
                return Ok(last);
            }
        }
        self.link_last(parent, child);
        Ok(child)
    }

    /// Appends text to a node: character nodes grow in place, PIs extend
    /// their data, and elements and attributes get it as (merged) text
    /// content.
    ///
    /// # Errors
    ///
    /// `InvalidDocument` on the document node, `InvalidOperation` on nodes
    /// without content.
    pub fn add_content(&mut self, id: NodeId, text: &str) -> Result<(), TreeError> {
        match &mut self.node_mut(id).kind {
            NodeKind::Text { content } | NodeKind::CData { content } | NodeKind::Comment { content } => {
                content.push_str(text);
                return Ok(());
            }
            NodeKind::ProcessingInstruction { data, .. } => {
                data.push_str(text);
                return Ok(());
            }
            NodeKind::Element { .. } | NodeKind::Attribute { .. } => {}
            NodeKind::Document => {
                return Err(TreeError::new(ErrorKind::InvalidDocument, "text in wrong location"))
            }
            other => {
                return Err(TreeError::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot add content to {:?} node", other.node_type()),
                ))
            }
        }
        if let Some(last) = self.last_child(id) {
            if let Some(content) = self.text_mut(last) {
                content.push_str(text);
                return Ok(());
            }
        }
        let node = self.create_text(text);
        self.link_last(id, node);
        Ok(())
    }

    /// Adds `new` as the last sibling of `node`. Returns the node that now
    /// holds it, as for [`add_child`](Self::add_child).
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `node` has no parent, otherwise as for
    /// `add_child`.
    pub fn add_sibling(&mut self, node: NodeId, new: NodeId) -> Result<NodeId, TreeError> {
        let parent = self
            .parent(node)
            .ok_or_else(|| TreeError::new(ErrorKind::InvalidOperation, "node has no parent"))?;
        self.add_child(parent, new)
    }

    /// Inserts `new` right before `reference`. Returns the node that now
    /// holds it.
    ///
    /// # Errors
    ///
    /// As for [`add_sibling`](Self::add_sibling).
    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) -> Result<NodeId, TreeError> {
        let parent = self
            .parent(reference)
            .ok_or_else(|| TreeError::new(ErrorKind::InvalidOperation, "reference node has no parent"))?;
        if self.node_type(reference) == NodeType::Attribute {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "attributes have no sibling order; use set_attribute",
            ));
        }
        self.check_child(parent, new, None)?;
        self.link_before(reference, parent, new);
        Ok(self.merge_text_neighbors(new))
    }

    /// Puts `new` where `old` is and detaches `old`.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `old` is unattached or `new` cannot take its
    /// place.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        if old == new {
            return Ok(());
        }
        let parent = self
            .parent(old)
            .ok_or_else(|| TreeError::new(ErrorKind::InvalidOperation, "replaced node has no parent"))?;
        if self.node_type(old) == NodeType::Attribute {
            return self.replace_attribute(parent, old, new);
        }
        self.check_child(parent, new, Some(old))?;
        self.link_before(old, parent, new);
        self.unlink(old);
        self.merge_text_neighbors(new);
        Ok(())
    }

    fn replace_attribute(&mut self, element: NodeId, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        if self.node_type(new) != NodeType::Attribute || self.parent(new).is_some() {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "an attribute can only be replaced by a detached attribute",
            ));
        }
        let name = self.name(new);
        let clash = self
            .attributes(element)
            .iter()
            .any(|&a| a != old && self.name(a) == name);
        if clash {
            return Err(TreeError::new(
                ErrorKind::DuplicateAttribute,
                format!("Attribute {name} redefined"),
            ));
        }
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(element).kind {
            if let Some(slot) = attributes.iter_mut().find(|a| **a == old) {
                *slot = new;
            }
        }
        self.node_mut(new).parent = Some(element);
        self.node_mut(old).parent = None;
        Ok(())
    }

    /// Detaches a node from its parent. The node stays in the arena and
    /// can be attached again. Text left adjacent by the removal is merged.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if self.node_type(id) == NodeType::Attribute {
            if let NodeKind::Element { attributes, .. } = &mut self.node_mut(parent).kind {
                attributes.retain(|&a| a != id);
            }
            self.node_mut(id).parent = None;
            return;
        }
        let prev = self.prev_sibling(id);
        self.unlink(id);
        if let Some(prev) = prev.filter(|&p| self.is_text(Some(p))) {
            self.merge_text_neighbors(prev);
        }
        if Some(id) == self.int_subset {
            self.int_subset = None;
        }
    }

    /// Makes `element` the root element, replacing and returning the
    /// previous one.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `element` is not a detached element.
    pub fn set_document_element(&mut self, element: NodeId) -> Result<Option<NodeId>, TreeError> {
        if self.node_type(element) != NodeType::Element {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "the document element must be an element",
            ));
        }
        match self.root_element() {
            Some(old) if old == element => Ok(None),
            Some(old) => {
                self.replace(old, element)?;
                Ok(Some(old))
            }
            None => {
                self.add_child(self.root, element)?;
                Ok(None)
            }
        }
    }

    // --- Attributes ---

    /// Attribute nodes of an element in document order. Empty for other
    /// nodes.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Looks up an attribute node by qualified name.
    #[must_use]
    pub fn attribute(&self, element: NodeId, name: &str) -> Option<NodeId> {
        self.attributes(element)
            .iter()
            .copied()
            .find(|&a| self.name(a) == name)
    }

    /// The value of an attribute, with entity references replaced by their
    /// text when known and written as `&name;` otherwise.
    #[must_use]
    pub fn attribute_value(&self, element: NodeId, name: &str) -> Option<String> {
        self.attribute(element, name).map(|a| self.attr_value_of(a))
    }

    fn attr_value_of(&self, attr: NodeId) -> String {
        let mut value = String::new();
        for child in self.children(attr) {
            match &self.node(child).kind {
                NodeKind::Text { content } => value.push_str(content),
                NodeKind::EntityRef { name } => match self.entity_text(name) {
                    Some(text) => value.push_str(&text),
                    None => {
                        value.push('&');
                        value.push_str(name);
                        value.push(';');
                    }
                },
                _ => {}
            }
        }
        value
    }

    /// Whether an attribute came from an ATTLIST default.
    #[must_use]
    pub fn is_default_attribute(&self, attr: NodeId) -> bool {
        matches!(self.node(attr).kind, NodeKind::Attribute { is_default: true, .. })
    }

    /// Adds a new attribute to an element. A prefixed name is bound to the
    /// namespace declared for the prefix in scope.
    ///
    /// # Errors
    ///
    /// `DuplicateAttribute` if the element already has an attribute of
    /// that name, in which case nothing is changed. `InvalidOperation` if
    /// `element` is not an element.
    ///
    /// ```
    /// use helium::{Document, ErrorKind};
    ///
    /// let mut doc = Document::new();
    /// let e = doc.create_element("e");
    /// doc.set_attribute(e, "k", "v").unwrap();
    /// let err = doc.set_attribute(e, "k", "w").unwrap_err();
    /// assert_eq!(err.kind, ErrorKind::DuplicateAttribute);
    /// assert_eq!(doc.attribute_value(e, "k").as_deref(), Some("v"));
    /// ```
    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<NodeId, TreeError> {
        if self.node_type(element) != NodeType::Element {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "attributes can only be set on elements",
            ));
        }
        if self.attribute(element, name).is_some() {
            return Err(TreeError::new(
                ErrorKind::DuplicateAttribute,
                format!("Attribute {name} redefined"),
            ));
        }
        let attr = self.create_attribute(name, value);
        self.add_attribute(element, attr)
    }

    /// Attaches a detached attribute node to an element.
    ///
    /// # Errors
    ///
    /// As for [`set_attribute`](Self::set_attribute).
    pub fn add_attribute(&mut self, element: NodeId, attr: NodeId) -> Result<NodeId, TreeError> {
        if self.node_type(attr) != NodeType::Attribute || self.parent(attr).is_some() {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "expected a detached attribute node",
            ));
        }
        let name = self.name(attr);
        if self.attribute(element, &name).is_some() {
            return Err(TreeError::new(
                ErrorKind::DuplicateAttribute,
                format!("Attribute {name} redefined"),
            ));
        }
        let NodeKind::Element { attributes, .. } = &mut self.node_mut(element).kind else {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "attributes can only be set on elements",
            ));
        };
        attributes.push(attr);
        self.node_mut(attr).parent = Some(element);
        if self.namespace(attr).is_none() {
            if let Some(prefix) = self.prefix(attr).map(str::to_string) {
                let ns = self.search_namespace(element, &prefix);
                self.set_namespace(attr, ns)?;
            }
        }
        Ok(attr)
    }

    /// Removes an attribute by qualified name and returns the detached
    /// node.
    pub fn remove_attribute(&mut self, element: NodeId, name: &str) -> Option<NodeId> {
        let attr = self.attribute(element, name)?;
        self.detach(attr);
        Some(attr)
    }

    pub(crate) fn set_default_flag(&mut self, attr: NodeId, value: bool) {
        if let NodeKind::Attribute { is_default, .. } = &mut self.node_mut(attr).kind {
            *is_default = value;
        }
    }

    // --- Namespaces ---

    /// Declares `xmlns:prefix="uri"` (or `xmlns="uri"` for an empty
    /// prefix) on an element and returns the namespace node.
    ///
    /// # Errors
    ///
    /// `DuplicateAttribute` if the element already declares the prefix.
    pub fn declare_namespace(&mut self, element: NodeId, prefix: &str, uri: &str) -> Result<NodeId, TreeError> {
        let declared = self
            .namespace_declarations(element)
            .iter()
            .any(|&ns| self.local_name(ns) == prefix);
        if declared {
            return Err(TreeError::new(
                ErrorKind::DuplicateAttribute,
                format!("namespace prefix '{prefix}' declared twice"),
            ));
        }
        let ns = self.create_namespace(prefix, uri);
        let NodeKind::Element { ns_decls, .. } = &mut self.node_mut(element).kind else {
            return Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "namespaces can only be declared on elements",
            ));
        };
        ns_decls.push(ns);
        self.node_mut(ns).parent = Some(element);
        Ok(ns)
    }

    /// Namespace nodes declared on an element.
    #[must_use]
    pub fn namespace_declarations(&self, element: NodeId) -> &[NodeId] {
        match &self.node(element).kind {
            NodeKind::Element { ns_decls, .. } => ns_decls,
            _ => &[],
        }
    }

    /// Sets the namespace of an element or attribute.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `node` is neither, or `ns` is not a namespace
    /// node.
    pub fn set_namespace(&mut self, node: NodeId, ns: Option<NodeId>) -> Result<(), TreeError> {
        if ns.is_some_and(|ns| self.node_type(ns) != NodeType::Namespace) {
            return Err(TreeError::new(ErrorKind::InvalidOperation, "not a namespace node"));
        }
        match &mut self.node_mut(node).kind {
            NodeKind::Element { namespace, .. } | NodeKind::Attribute { namespace, .. } => {
                *namespace = ns;
                Ok(())
            }
            _ => Err(TreeError::new(
                ErrorKind::InvalidOperation,
                "only elements and attributes have a namespace",
            )),
        }
    }

    /// Finds the namespace bound to `prefix` at `node`, looking at the
    /// declarations of the node and each ancestor. The empty prefix finds
    /// the default namespace; `xml` is always bound.
    #[must_use]
    pub fn search_namespace(&self, node: NodeId, prefix: &str) -> Option<NodeId> {
        if prefix == "xml" {
            return Some(self.xml_ns);
        }
        self.ancestors(node).find_map(|a| {
            self.namespace_declarations(a)
                .iter()
                .copied()
                .find(|&ns| self.local_name(ns) == prefix)
        })
    }

    // --- DTD ---

    /// Creates the DOCTYPE node and links it before the root element.
    ///
    /// # Errors
    ///
    /// `InvalidDocument` if the document already has one.
    pub fn create_internal_subset(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        if self.int_subset.is_some() {
            return Err(TreeError::new(ErrorKind::InvalidDocument, "document already has a DOCTYPE"));
        }
        let dtd = self.create_dtd(name, public_id, system_id);
        match self.root_element() {
            Some(root) => self.link_before(root, self.root, dtd),
            None => self.link_last(self.root, dtd),
        }
        self.int_subset = Some(dtd);
        Ok(dtd)
    }

    /// Creates the external subset node. It is not linked into the tree.
    pub fn create_external_subset(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> NodeId {
        let dtd = self.create_dtd(name, public_id, system_id);
        self.ext_subset = Some(dtd);
        dtd
    }

    #[must_use]
    pub fn dtd_tables(&self, dtd: NodeId) -> Option<&DtdTables> {
        match &self.node(dtd).kind {
            NodeKind::Dtd { tables, .. } => Some(tables),
            _ => None,
        }
    }

    fn dtd_tables_mut(&mut self, dtd: NodeId) -> Result<&mut DtdTables, TreeError> {
        match &mut self.node_mut(dtd).kind {
            NodeKind::Dtd { tables, .. } => Ok(tables),
            _ => Err(TreeError::new(ErrorKind::InvalidOperation, "not a DTD node")),
        }
    }

    /// Registers an entity declaration on a DTD. The first declaration of a
    /// name wins; later ones return `None` and change nothing.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `dtd` is not a DTD node.
    pub fn add_entity_decl(&mut self, dtd: NodeId, entity: Entity) -> Result<Option<NodeId>, TreeError> {
        let name = entity.name.clone();
        let parameter = entity.entity_type.is_parameter();
        let tables = self.dtd_tables_mut(dtd)?;
        let table = if parameter {
            &tables.parameter_entities
        } else {
            &tables.entities
        };
        if table.contains_key(&name) {
            trace!(target: "helium::tree", "entity {name} already declared");
            return Ok(None);
        }
        let node = self.create_entity(entity);
        self.link_last(dtd, node);
        let tables = self.dtd_tables_mut(dtd)?;
        if parameter {
            tables.parameter_entities.insert(name, node);
        } else {
            tables.entities.insert(name, node);
        }
        Ok(Some(node))
    }

    /// Registers an element declaration. A later declaration of the same
    /// element returns `None`.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `dtd` is not a DTD node.
    pub fn add_element_decl(&mut self, dtd: NodeId, decl: ElementDecl) -> Result<Option<NodeId>, TreeError> {
        let name = decl.name.clone();
        if self.dtd_tables_mut(dtd)?.elements.contains_key(&name) {
            return Ok(None);
        }
        let node = self.create_element_decl(decl);
        self.link_last(dtd, node);
        self.dtd_tables_mut(dtd)?.elements.insert(name, node);
        Ok(Some(node))
    }

    /// Registers an attribute declaration. The first definition of an
    /// attribute for an element wins.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `dtd` is not a DTD node.
    pub fn add_attribute_decl(&mut self, dtd: NodeId, decl: AttributeDecl) -> Result<Option<NodeId>, TreeError> {
        let key = (decl.element.clone(), decl.name.clone());
        if self.dtd_tables_mut(dtd)?.attributes.contains_key(&key) {
            return Ok(None);
        }
        let node = self.create_attribute_decl(decl);
        self.link_last(dtd, node);
        self.dtd_tables_mut(dtd)?.attributes.insert(key, node);
        Ok(Some(node))
    }

    /// Registers a notation declaration.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `dtd` is not a DTD node.
    pub fn add_notation(&mut self, dtd: NodeId, notation: Notation) -> Result<(), TreeError> {
        let tables = self.dtd_tables_mut(dtd)?;
        if !tables.notations.iter().any(|n| n.name == notation.name) {
            tables.notations.push(notation);
        }
        Ok(())
    }

    fn find_entity_node(&self, name: &str, parameter: bool) -> Option<NodeId> {
        [self.int_subset, self.ext_subset]
            .into_iter()
            .flatten()
            .find_map(|dtd| {
                let tables = self.dtd_tables(dtd)?;
                let table = if parameter {
                    &tables.parameter_entities
                } else {
                    &tables.entities
                };
                table.get(name).copied()
            })
    }

    /// Looks up a general entity in the internal subset, then the external
    /// one.
    #[must_use]
    pub fn get_entity(&self, name: &str) -> Option<&Entity> {
        let node = self.find_entity_node(name, false)?;
        match &self.node(node).kind {
            NodeKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_parameter_entity(&self, name: &str) -> Option<&Entity> {
        let node = self.find_entity_node(name, true)?;
        match &self.node(node).kind {
            NodeKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub(crate) fn entity_mut(&mut self, name: &str, parameter: bool) -> Option<&mut Entity> {
        let node = self.find_entity_node(name, parameter)?;
        match &mut self.node_mut(node).kind {
            NodeKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over the descendants of a node.
pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if let Some(child) = self.doc.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }
        let mut node = current;
        loop {
            if node == self.root {
                self.next = None;
                break;
            }
            if let Some(sibling) = self.doc.next_sibling(node) {
                self.next = Some(sibling);
                break;
            }
            match self.doc.parent(node) {
                Some(parent) => node = parent,
                None => {
                    self.next = None;
                    break;
                }
            }
        }
        Some(current)
    }
}
