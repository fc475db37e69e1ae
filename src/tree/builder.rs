//! The default event sink: builds a [`Document`] from parse events.

use log::{debug, trace};

use super::{Document, NodeId, NodeType};
use crate::dtd::{AttributeDecl, ElementDecl, Entity, Notation};
use crate::error::ErrorKind;
use crate::parser::element::{AttrValuePart, ParsedAttribute, ParsedElement};
use crate::parser::{EntityResolver, ExternalEntityRequest};
use crate::sax::{EventSink, ParserContext, SinkError, SinkResult, Standalone, SubsetState};
use crate::tree::CreateOptions;

/// Builds a tree while the parser runs.
///
/// `current` is the node new content is appended to: the document node
/// before the root element, then the innermost open element.
pub struct TreeBuilder {
    doc: Option<Document>,
    current: Option<NodeId>,
    resolver: Option<EntityResolver>,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            doc: None,
            current: None,
            resolver: None,
        }
    }

    /// Loads external resources through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: EntityResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The finished document, or `None` if `start_document` never came.
    #[must_use]
    pub fn into_document(self) -> Option<Document> {
        self.doc
    }

    fn doc_mut(&mut self) -> SinkResult<&mut Document> {
        self.doc
            .as_mut()
            .ok_or_else(|| SinkError::abort("event before start of document"))
    }

    /// Where content goes: the open element, or an error when the parser
    /// is outside the root element.
    fn content_parent(&self) -> SinkResult<NodeId> {
        match (self.current, &self.doc) {
            (Some(id), Some(doc)) if doc.node_type(id) != NodeType::Document => Ok(id),
            _ => Err(SinkError::Abort {
                kind: ErrorKind::InvalidDocument,
                message: "text in wrong location".to_string(),
            }),
        }
    }

    /// The DTD node declarations go to for the subset being read.
    fn target_dtd(&self, ctx: &ParserContext) -> SinkResult<NodeId> {
        let doc = self
            .doc
            .as_ref()
            .ok_or_else(|| SinkError::abort("declaration before start of document"))?;
        let dtd = match ctx.subset {
            SubsetState::External => doc.ext_subset.or(doc.int_subset),
            _ => doc.int_subset,
        };
        dtd.ok_or_else(|| SinkError::abort("declaration outside a DOCTYPE"))
    }

    /// Where a comment or PI goes: the DTD when inside one, else the
    /// current node.
    fn misc_parent(&self, ctx: &ParserContext) -> SinkResult<NodeId> {
        if ctx.subset != SubsetState::None {
            return self.target_dtd(ctx);
        }
        self.current
            .ok_or_else(|| SinkError::abort("event before start of document"))
    }

    fn build_attribute(doc: &mut Document, attr: &ParsedAttribute) -> SinkResult<NodeId> {
        let node = doc.create_attribute(&attr.name(), "");
        for part in &attr.value {
            let child = match part {
                AttrValuePart::Text(text) => doc.create_text(text),
                AttrValuePart::EntityRef(name) => doc.create_entity_ref(name),
            };
            doc.add_child(node, child)?;
        }
        doc.set_default_flag(node, attr.is_default);
        Ok(node)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TreeBuilder {
    fn start_document(&mut self, ctx: &ParserContext) -> SinkResult {
        let standalone = match ctx.standalone {
            Standalone::Invalid => Standalone::NoDecl,
            other => other,
        };
        let options = CreateOptions::default()
            .version(ctx.version.as_deref().unwrap_or("1.0"))
            .encoding(ctx.encoding.as_deref().unwrap_or(""))
            .standalone(standalone);
        let doc = Document::with_options(&options);
        self.current = Some(doc.root());
        self.doc = Some(doc);
        Ok(())
    }

    fn end_document(&mut self, _ctx: &ParserContext) -> SinkResult {
        if let Some(doc) = &self.doc {
            debug!(target: "helium::tree", "built document with {} nodes", doc.node_count());
        }
        self.current = None;
        Ok(())
    }

    fn start_element(&mut self, _ctx: &ParserContext, element: &ParsedElement) -> SinkResult {
        let parent = self
            .current
            .ok_or_else(|| SinkError::abort("element before start of document"))?;
        let doc = self.doc_mut()?;
        let node = doc.create_element(&element.name());
        doc.add_child(parent, node)?;
        for (prefix, uri) in &element.namespaces {
            doc.declare_namespace(node, prefix, uri)?;
        }
        if element.namespace.is_some() {
            let ns = doc.search_namespace(node, element.prefix.as_deref().unwrap_or(""));
            doc.set_namespace(node, ns)?;
        }
        for attr in &element.attributes {
            let attr_node = Self::build_attribute(doc, attr)?;
            doc.add_attribute(node, attr_node)?;
        }
        trace!(target: "helium::tree", "open {}", element.name());
        self.current = Some(node);
        Ok(())
    }

    fn end_element(&mut self, _ctx: &ParserContext, _element: &ParsedElement) -> SinkResult {
        let current = self
            .current
            .ok_or_else(|| SinkError::abort("end tag outside any element"))?;
        let parent = self.doc_mut()?.parent(current);
        self.current = parent;
        Ok(())
    }

    fn characters(&mut self, _ctx: &ParserContext, text: &str) -> SinkResult {
        let parent = self.content_parent()?;
        self.doc_mut()?.add_content(parent, text)?;
        Ok(())
    }

    fn ignorable_whitespace(&mut self, _ctx: &ParserContext, _text: &str) -> SinkResult {
        Ok(())
    }

    fn cdata_block(&mut self, _ctx: &ParserContext, text: &str) -> SinkResult {
        let parent = self.content_parent()?;
        let doc = self.doc_mut()?;
        let node = doc.create_cdata(text);
        doc.add_child(parent, node)?;
        Ok(())
    }

    fn comment(&mut self, ctx: &ParserContext, text: &str) -> SinkResult {
        let parent = self.misc_parent(ctx)?;
        let doc = self.doc_mut()?;
        let node = doc.create_comment(text);
        doc.add_child(parent, node)?;
        Ok(())
    }

    fn processing_instruction(&mut self, ctx: &ParserContext, target: &str, data: &str) -> SinkResult {
        let parent = self.misc_parent(ctx)?;
        let doc = self.doc_mut()?;
        let node = doc.create_pi(target, data);
        doc.add_child(parent, node)?;
        Ok(())
    }

    fn reference(&mut self, _ctx: &ParserContext, name: &str) -> SinkResult {
        let parent = self.content_parent()?;
        let doc = self.doc_mut()?;
        let node = doc.create_entity_ref(name);
        doc.add_child(parent, node)?;
        Ok(())
    }

    fn internal_subset(
        &mut self,
        _ctx: &ParserContext,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult {
        self.doc_mut()?.create_internal_subset(name, public_id, system_id)?;
        Ok(())
    }

    fn external_subset(
        &mut self,
        _ctx: &ParserContext,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult {
        self.doc_mut()?.create_external_subset(name, public_id, system_id);
        Ok(())
    }

    fn element_decl(&mut self, ctx: &ParserContext, decl: &ElementDecl) -> SinkResult {
        let dtd = self.target_dtd(ctx)?;
        self.doc_mut()?.add_element_decl(dtd, decl.clone())?;
        Ok(())
    }

    fn attribute_decl(&mut self, ctx: &ParserContext, decl: &AttributeDecl) -> SinkResult {
        let dtd = self.target_dtd(ctx)?;
        self.doc_mut()?.add_attribute_decl(dtd, decl.clone())?;
        Ok(())
    }

    fn entity_decl(&mut self, ctx: &ParserContext, entity: &Entity) -> SinkResult {
        let dtd = self.target_dtd(ctx)?;
        if self.doc_mut()?.add_entity_decl(dtd, entity.clone())?.is_none() {
            trace!(target: "helium::tree", "ignoring redeclaration of {}", entity.name);
        }
        Ok(())
    }

    fn notation_decl(&mut self, ctx: &ParserContext, notation: &Notation) -> SinkResult {
        let dtd = self.target_dtd(ctx)?;
        self.doc_mut()?.add_notation(dtd, notation.clone())?;
        Ok(())
    }

    fn get_entity(&mut self, _ctx: &ParserContext, name: &str) -> SinkResult<Option<Entity>> {
        let Some(doc) = self.doc.as_mut() else {
            return Err(SinkError::Unhandled);
        };
        Ok(doc.entity_mut(name, false).map(|entity| {
            entity.checked = true;
            entity.clone()
        }))
    }

    fn get_parameter_entity(&mut self, _ctx: &ParserContext, name: &str) -> SinkResult<Option<Entity>> {
        let Some(doc) = self.doc.as_mut() else {
            return Err(SinkError::Unhandled);
        };
        Ok(doc.entity_mut(name, true).map(|entity| {
            entity.checked = true;
            entity.clone()
        }))
    }

    fn resolve_entity(
        &mut self,
        _ctx: &ParserContext,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult<Vec<u8>> {
        let resolver = self.resolver.as_ref().ok_or(SinkError::Unhandled)?;
        debug!(
            target: "helium::tree",
            "resolving external entity {}",
            system_id.unwrap_or("<no system id>")
        );
        resolver(ExternalEntityRequest { public_id, system_id }).ok_or(SinkError::Unhandled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::{parse_str, parse_with_sink, ParseOptions};
    use crate::tree::NodeKind;

    #[test]
    fn test_builds_nested_elements() {
        let doc = parse_str("<a x='1'><b>text</b><!--c--><?p d?></a>", &ParseOptions::default()).unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.attribute_value(a, "x").as_deref(), Some("1"));
        let kinds: Vec<NodeType> = doc.children(a).map(|n| doc.node_type(n)).collect();
        assert_eq!(
            kinds,
            vec![NodeType::Element, NodeType::Comment, NodeType::ProcessingInstruction]
        );
        assert_eq!(doc.text_content(a), "text");
    }

    #[test]
    fn test_document_properties_from_declaration() {
        let doc = parse_str(
            "<?xml version='1.0' encoding='UTF-8' standalone='yes'?><r/>",
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(doc.version, "1.0");
        assert_eq!(doc.encoding, "UTF-8");
        assert_eq!(doc.standalone, Standalone::ExplicitYes);

        let doc = parse_str("<r/>", &ParseOptions::default()).unwrap();
        assert_eq!(doc.encoding, "");
        assert_eq!(doc.standalone, Standalone::NoDecl);
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = parse_str(
            "<h:r xmlns:h='urn:h' xmlns='urn:d'><c h:a='1' b='2'/></h:r>",
            &ParseOptions::default(),
        )
        .unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.namespace_uri(r), Some("urn:h"));
        assert_eq!(doc.namespace_declarations(r).len(), 2);
        let c = doc.first_child(r).unwrap();
        assert_eq!(doc.namespace_uri(c), Some("urn:d"));
        let a = doc.attribute(c, "h:a").unwrap();
        assert_eq!(doc.namespace_uri(a), Some("urn:h"));
        let b = doc.attribute(c, "b").unwrap();
        assert_eq!(doc.namespace_uri(b), None);
    }

    #[test]
    fn test_dtd_nodes() {
        let input = "<!DOCTYPE r [<!ELEMENT r (#PCDATA)><!ATTLIST r a CDATA 'd'>\
                     <!ENTITY e 'v'><!-- in dtd --><!NOTATION n SYSTEM 'n'>]><r>&e;</r>";
        let doc = parse_str(input, &ParseOptions::default()).unwrap();
        let dtd = doc.int_subset.unwrap();
        assert_eq!(doc.first_child(doc.root()), Some(dtd));
        let kinds: Vec<NodeType> = doc.children(dtd).map(|n| doc.node_type(n)).collect();
        assert_eq!(
            kinds,
            vec![
                NodeType::ElementDecl,
                NodeType::AttributeDecl,
                NodeType::Entity,
                NodeType::Comment
            ]
        );
        let tables = doc.dtd_tables(dtd).unwrap();
        assert_eq!(tables.notations.len(), 1);
        assert!(doc.get_entity("e").unwrap().checked);
        assert_eq!(doc.text_content(doc.root_element().unwrap()), "v");
    }

    #[test]
    fn test_unexpanded_reference_becomes_node() {
        let input = "<!DOCTYPE r [<!ENTITY e 'v'>]><r>a&e;b</r>";
        let opts = ParseOptions::default().expand_entities(false);
        let doc = parse_str(input, &opts).unwrap();
        let r = doc.root_element().unwrap();
        let kinds: Vec<NodeType> = doc.children(r).map(|n| doc.node_type(n)).collect();
        assert_eq!(kinds, vec![NodeType::Text, NodeType::EntityRef, NodeType::Text]);
        assert_eq!(doc.text_content(r), "avb");
    }

    #[test]
    fn test_ignorable_whitespace_dropped() {
        let opts = ParseOptions::default().preserve_blanks(false);
        let doc = parse_str("<r>\n  <a/>\n</r>", &opts).unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(doc.children(r).count(), 1);
    }

    #[test]
    fn test_default_attribute_flag() {
        let input = "<!DOCTYPE r [<!ATTLIST r a CDATA 'd'>]><r/>";
        let opts = ParseOptions::default().default_attributes(true);
        let doc = parse_str(input, &opts).unwrap();
        let r = doc.root_element().unwrap();
        let a = doc.attribute(r, "a").unwrap();
        assert!(doc.is_default_attribute(a));
        assert_eq!(doc.attribute_value(r, "a").as_deref(), Some("d"));
    }

    #[test]
    fn test_resolver_supplies_external_subset() {
        let opts = ParseOptions::default().entity_resolver(|req| {
            (req.system_id == Some("r.dtd")).then(|| b"<!ENTITY ext 'from outside'>".to_vec())
        });
        let doc = parse_str("<!DOCTYPE r SYSTEM 'r.dtd'><r>&ext;</r>", &opts).unwrap();
        let ext = doc.ext_subset.unwrap();
        assert!(matches!(doc.node(ext).kind, NodeKind::Dtd { .. }));
        assert_eq!(doc.children(ext).count(), 1);
        assert_eq!(doc.text_content(doc.root_element().unwrap()), "from outside");
    }

    #[test]
    fn test_characters_outside_root_abort() {
        let mut builder = TreeBuilder::new();
        let ctx = ParserContext::default();
        builder.start_document(&ctx).unwrap();
        let err = builder.characters(&ctx, "x").unwrap_err();
        assert_eq!(
            err,
            SinkError::Abort {
                kind: ErrorKind::InvalidDocument,
                message: "text in wrong location".to_string(),
            }
        );
    }

    #[test]
    fn test_builder_reusable_through_sink_api() {
        let mut builder = TreeBuilder::default();
        parse_with_sink(b"<r><a/></r>", &mut builder, &ParseOptions::default()).unwrap();
        let doc = builder.into_document().unwrap();
        assert_eq!(doc.descendants(doc.root()).count(), 2);
    }
}
