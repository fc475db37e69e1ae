//! XML serializer.
//!
//! Serializes a `Document` tree into well-formed XML.

use std::io::Write;

use log::debug;

use super::{escape_attr_value, escape_text, SerializeError, SerializeOptions};
use crate::dtd::{Entity, EntityType};
use crate::encoding::EncodingRegistry;
use crate::sax::Standalone;
use crate::tree::{Document, NodeId, NodeKind};

const INDENT: &str = "  ";

/// Serializes a document to an XML string with default options.
///
/// The string is UTF-8 whatever the declared encoding; use
/// [`write_document`] for encoded output.
///
/// # Examples
///
/// ```
/// use helium::Document;
/// use helium::serial::serialize;
///
/// let doc = Document::parse_str("<root>Hello, World!</root>").unwrap();
/// assert_eq!(serialize(&doc), "<root>Hello, World!</root>");
/// ```
#[must_use]
pub fn serialize(doc: &Document) -> String {
    serialize_with_options(doc, &SerializeOptions::default())
}

/// Serializes a document to an XML string.
///
/// The XML declaration is written only when the document has an encoding
/// or an explicit `standalone` value. Top-level nodes are separated by
/// newlines.
///
/// ```
/// use helium::Document;
/// use helium::serial::{serialize_with_options, SerializeOptions};
///
/// let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
/// let xml = serialize_with_options(&doc, &SerializeOptions::default().format(true));
/// assert_eq!(xml, "<root>\n  <child>Hello</child>\n</root>");
/// ```
#[must_use]
pub fn serialize_with_options(doc: &Document, options: &SerializeOptions) -> String {
    let mut out = String::new();
    if !doc.encoding.is_empty() || doc.standalone.is_explicit() {
        write_declaration(doc, &mut out);
        out.push('\n');
    }
    let mut writer = Writer {
        doc,
        options,
        out: &mut out,
    };
    for (i, child) in doc.children(doc.root()).enumerate() {
        if i > 0 {
            writer.out.push('\n');
        }
        writer.node(child, 0, false);
    }
    out
}

/// Serializes one node and its subtree.
///
/// ```
/// use helium::Document;
/// use helium::serial::{serialize_node, SerializeOptions};
///
/// let doc = Document::parse_str("<a><b x='1'>t</b></a>").unwrap();
/// let b = doc.first_child(doc.root_element().unwrap()).unwrap();
/// assert_eq!(serialize_node(&doc, b, &SerializeOptions::default()), "<b x=\"1\">t</b>");
/// ```
#[must_use]
pub fn serialize_node(doc: &Document, id: NodeId, options: &SerializeOptions) -> String {
    if id == doc.root() {
        return serialize_with_options(doc, options);
    }
    let mut out = String::new();
    Writer {
        doc,
        options,
        out: &mut out,
    }
    .node(id, 0, false);
    out
}

/// Serializes a document and writes it to `writer` in the document's
/// declared encoding (UTF-8 when none is declared).
///
/// # Errors
///
/// Returns `SerializeError::Encoding` if the encoding is unknown or cannot
/// represent the output, `SerializeError::Io` if the writer fails.
pub fn write_document<W: Write + ?Sized>(
    doc: &Document,
    writer: &mut W,
    options: &SerializeOptions,
) -> Result<(), SerializeError> {
    let text = serialize_with_options(doc, options);
    let bytes = EncodingRegistry::encode(&doc.encoding, &text)?;
    debug!(
        target: "helium::serial",
        "writing {} bytes as {}",
        bytes.len(),
        if doc.encoding.is_empty() { "UTF-8" } else { &doc.encoding }
    );
    writer.write_all(&bytes)?;
    Ok(())
}

impl Document {
    /// Writes the document to `writer`. See [`write_document`].
    ///
    /// # Errors
    ///
    /// As for [`write_document`].
    ///
    /// ```
    /// use helium::Document;
    /// use helium::serial::SerializeOptions;
    ///
    /// let doc = Document::parse_str("<?xml version='1.0' encoding='euc-jp'?><root/>").unwrap();
    /// let mut buf = Vec::new();
    /// doc.serialize(&mut buf, &SerializeOptions::default()).unwrap();
    /// assert_eq!(buf, b"<?xml version=\"1.0\" encoding=\"euc-jp\"?>\n<root/>");
    /// ```
    pub fn serialize<W: Write + ?Sized>(&self, writer: &mut W, options: &SerializeOptions) -> Result<(), SerializeError> {
        write_document(self, writer, options)
    }
}

fn write_declaration(doc: &Document, out: &mut String) {
    let version = if doc.version.is_empty() { "1.0" } else { &doc.version };
    out.push_str("<?xml version=\"");
    out.push_str(version);
    out.push('"');
    if !doc.encoding.is_empty() {
        out.push_str(" encoding=\"");
        out.push_str(&doc.encoding);
        out.push('"');
    }
    match doc.standalone {
        Standalone::ExplicitYes => out.push_str(" standalone=\"yes\""),
        Standalone::ExplicitNo => out.push_str(" standalone=\"no\""),
        _ => {}
    }
    out.push_str("?>");
}

/// Writes `value` in double quotes if it has none, else in single quotes
/// if it has none of those, else double-quoted with `"` and `%` escaped.
fn push_entity_value(out: &mut String, value: &str) {
    if !value.contains('"') {
        out.push('"');
        out.push_str(value);
        out.push('"');
    } else if !value.contains('\'') {
        out.push('\'');
        out.push_str(value);
        out.push('\'');
    } else {
        out.push('"');
        for ch in value.chars() {
            match ch {
                '"' => out.push_str("&quot;"),
                '%' => out.push_str("&#x25;"),
                _ => out.push(ch),
            }
        }
        out.push('"');
    }
}

fn push_external_id(out: &mut String, public_id: Option<&str>, system_id: Option<&str>) {
    match (public_id, system_id) {
        (Some(p), Some(s)) => {
            out.push_str(" PUBLIC \"");
            out.push_str(p);
            out.push_str("\" \"");
            out.push_str(s);
            out.push('"');
        }
        (Some(p), None) => {
            out.push_str(" PUBLIC \"");
            out.push_str(p);
            out.push('"');
        }
        (None, Some(s)) => {
            out.push_str(" SYSTEM \"");
            out.push_str(s);
            out.push('"');
        }
        (None, None) => {}
    }
}

/// See XML 1.0 §4.2: `[70] EntityDecl ::= GEDecl | PEDecl`
fn write_entity_decl(out: &mut String, entity: &Entity) {
    out.push_str("<!ENTITY ");
    if entity.entity_type.is_parameter() {
        out.push_str("% ");
    }
    out.push_str(&entity.name);
    if entity.entity_type.is_internal() {
        out.push(' ');
        push_entity_value(out, entity.orig.as_deref().unwrap_or(&entity.content));
    } else {
        push_external_id(out, entity.public_id.as_deref(), entity.system_id.as_deref());
        if entity.entity_type == EntityType::ExternalGeneralUnparsed {
            if let Some(notation) = &entity.notation {
                out.push_str(" NDATA ");
                out.push_str(notation);
            }
        }
    }
    out.push('>');
}

/// Returns `true` if the element holds elements and nothing but
/// whitespace-only text, so indentation cannot change its content.
fn is_element_only(doc: &Document, id: NodeId) -> bool {
    let mut has_element_child = false;
    for child in doc.children(id) {
        match &doc.node(child).kind {
            NodeKind::Element { .. } => has_element_child = true,
            NodeKind::Text { content } => {
                if !content.trim().is_empty() {
                    return false;
                }
            }
            NodeKind::CData { .. } | NodeKind::EntityRef { .. } => return false,
            _ => {}
        }
    }
    has_element_child
}

struct Writer<'d, 'o> {
    doc: &'d Document,
    options: &'o SerializeOptions,
    out: &'o mut String,
}

impl Writer<'_, '_> {
    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    /// `indented` is set when the parent is element-only and formatting is
    /// on: the node gets its own line.
    fn node(&mut self, id: NodeId, depth: usize, indented: bool) {
        let doc = self.doc;
        if indented {
            self.indent(depth);
        }
        match &doc.node(id).kind {
            NodeKind::Element { .. } => self.element(id, depth),
            NodeKind::Attribute { .. } => {
                let name = doc.name(id);
                self.attribute(&name, id);
            }
            NodeKind::Text { content } => {
                let escaped = escape_text(content, self.options.escape_newlines);
                self.out.push_str(&escaped);
            }
            NodeKind::CData { content } => {
                self.out.push_str("<![CDATA[");
                self.out.push_str(content);
                self.out.push_str("]]>");
            }
            NodeKind::Comment { content } => {
                self.out.push_str("<!--");
                self.out.push_str(content);
                self.out.push_str("-->");
            }
            NodeKind::ProcessingInstruction { target, data } => {
                self.out.push_str("<?");
                self.out.push_str(target);
                if !data.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(data);
                }
                self.out.push_str("?>");
            }
            NodeKind::EntityRef { name } => {
                self.out.push('&');
                self.out.push_str(name);
                self.out.push(';');
            }
            NodeKind::Entity(entity) => write_entity_decl(self.out, entity),
            NodeKind::ElementDecl(decl) => self.out.push_str(&decl.to_string()),
            NodeKind::AttributeDecl(decl) => self.out.push_str(&decl.to_string()),
            NodeKind::Dtd { .. } => self.dtd(id),
            NodeKind::Namespace { prefix, uri } => self.namespace_decl(prefix, uri),
            NodeKind::Document => {
                for (i, child) in doc.children(id).enumerate() {
                    if i > 0 {
                        self.out.push('\n');
                    }
                    self.node(child, 0, false);
                }
            }
        }
        if indented {
            self.out.push('\n');
        }
    }

    fn element(&mut self, id: NodeId, depth: usize) {
        let doc = self.doc;
        let name = doc.name(id);
        self.out.push('<');
        self.out.push_str(&name);
        for &ns in doc.namespace_declarations(id) {
            if let NodeKind::Namespace { prefix, uri } = &doc.node(ns).kind {
                self.out.push(' ');
                self.namespace_decl(prefix, uri);
            }
        }
        for &attr in doc.attributes(id) {
            self.out.push(' ');
            self.attribute(&doc.name(attr), attr);
        }

        if doc.first_child(id).is_none() {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');
        let element_only = self.options.format && is_element_only(doc, id);
        if element_only {
            self.out.push('\n');
        }
        for child in doc.children(id) {
            if element_only {
                if let NodeKind::Text { content } = &doc.node(child).kind {
                    if content.trim().is_empty() {
                        continue;
                    }
                }
            }
            self.node(child, depth + 1, element_only);
        }
        if element_only {
            self.indent(depth);
        }
        self.out.push_str("</");
        self.out.push_str(&name);
        self.out.push('>');
    }

    /// Writes `name="value"`. Text children are escaped, entity reference
    /// children written back as references.
    fn attribute(&mut self, name: &str, attr: NodeId) {
        let doc = self.doc;
        self.out.push_str(name);
        self.out.push_str("=\"");
        for child in doc.children(attr) {
            match &doc.node(child).kind {
                NodeKind::Text { content } => {
                    let escaped = escape_attr_value(content);
                    self.out.push_str(&escaped);
                }
                NodeKind::EntityRef { name } => {
                    self.out.push('&');
                    self.out.push_str(name);
                    self.out.push(';');
                }
                _ => {}
            }
        }
        self.out.push('"');
    }

    fn namespace_decl(&mut self, prefix: &str, uri: &str) {
        self.out.push_str("xmlns");
        if !prefix.is_empty() {
            self.out.push(':');
            self.out.push_str(prefix);
        }
        self.out.push_str("=\"");
        self.out.push_str(&escape_attr_value(uri));
        self.out.push('"');
    }

    /// See XML 1.0 §2.8: `[28] doctypedecl`
    fn dtd(&mut self, id: NodeId) {
        let doc = self.doc;
        let NodeKind::Dtd {
            name,
            public_id,
            system_id,
            tables,
        } = &doc.node(id).kind
        else {
            return;
        };
        self.out.push_str("<!DOCTYPE ");
        self.out.push_str(name);
        push_external_id(self.out, public_id.as_deref(), system_id.as_deref());
        if doc.first_child(id).is_none() && tables.notations.is_empty() {
            self.out.push('>');
            return;
        }
        self.out.push_str(" [\n");
        for child in doc.children(id) {
            self.node(child, 0, false);
            self.out.push('\n');
        }
        for notation in &tables.notations {
            self.out.push_str(&notation.to_string());
            self.out.push('\n');
        }
        self.out.push_str("]>");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::{parse, parse_str, ParseOptions};
    use crate::tree::CreateOptions;

    fn roundtrip(input: &str) -> String {
        let doc = parse_str(input, &ParseOptions::default()).unwrap();
        serialize(&doc)
    }

    #[test]
    fn test_exact_roundtrip() {
        for input in [
            "<root>Hello, World!</root>",
            "<root/>",
            "<a x=\"1\" y=\"2\"><b/><!--c--><?pi data?><![CDATA[<raw>]]></a>",
            "<!--before-->\n<root/>\n<?after?>",
        ] {
            assert_eq!(roundtrip(input), input);
        }
    }

    #[test]
    fn test_declaration_rules() {
        assert_eq!(roundtrip("<?xml version=\"1.0\"?><r/>"), "<r/>");
        assert_eq!(
            roundtrip("<?xml version=\"1.0\" encoding=\"euc-jp\"?><r/>"),
            "<?xml version=\"1.0\" encoding=\"euc-jp\"?>\n<r/>"
        );
        assert_eq!(
            roundtrip("<?xml version=\"1.0\" standalone=\"no\"?><r/>"),
            "<?xml version=\"1.0\" standalone=\"no\"?>\n<r/>"
        );

        let mut doc = Document::with_options(&CreateOptions::default().standalone(Standalone::ExplicitYes));
        let r = doc.create_element("r");
        doc.set_document_element(r).unwrap();
        assert_eq!(serialize(&doc), "<?xml version=\"1.0\" standalone=\"yes\"?>\n<r/>");
    }

    #[test]
    fn test_attribute_quoting_normalized() {
        assert_eq!(roundtrip("<r a='x\"y' b='&lt;'/>"), "<r a=\"x&#34;y\" b=\"&lt;\"/>");
    }

    #[test]
    fn test_namespaces_written_first() {
        assert_eq!(
            roundtrip("<h:r a='1' xmlns:h='urn:h'><h:c/></h:r>"),
            "<h:r xmlns:h=\"urn:h\" a=\"1\"><h:c/></h:r>"
        );
        assert_eq!(roundtrip("<r xmlns='urn:d'/>"), "<r xmlns=\"urn:d\"/>");
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(roundtrip("<r>a &amp; b &lt; c &gt; d</r>"), "<r>a &amp; b &lt; c &gt; d</r>");
        assert_eq!(roundtrip("<r>&#13;</r>"), "<r>&#13;</r>");

        let doc = parse_str("<r>a\nb</r>", &ParseOptions::default()).unwrap();
        let opts = SerializeOptions::default().escape_newlines(true);
        assert_eq!(serialize_with_options(&doc, &opts), "<r>a&#10;b</r>");
    }

    #[test]
    fn test_entity_reference_kept() {
        let input = "<!DOCTYPE r [\n<!ENTITY e \"v\">\n]>\n<r a=\"&e;\">&e;</r>";
        let opts = ParseOptions::default().expand_entities(false);
        let doc = parse_str(input, &opts).unwrap();
        assert_eq!(serialize(&doc), input);
    }

    #[test]
    fn test_doctype_roundtrip() {
        let input = "<!DOCTYPE doc PUBLIC \"-//X//EN\" \"doc.dtd\">\n<doc/>";
        assert_eq!(roundtrip(input), input);

        let input = "<!DOCTYPE doc [\n\
                     <!ELEMENT doc (a | b)*>\n\
                     <!ATTLIST doc id ID #IMPLIED>\n\
                     <!ENTITY % p \"x\">\n\
                     <!ENTITY img SYSTEM \"i.png\" NDATA png>\n\
                     <!--note-->\n\
                     <!NOTATION png SYSTEM \"image/png\">\n\
                     ]>\n<doc/>";
        assert_eq!(roundtrip(input), input);
    }

    #[test]
    fn test_entity_value_quoting() {
        let mut out = String::new();
        push_entity_value(&mut out, "plain");
        assert_eq!(out, "\"plain\"");
        out.clear();
        push_entity_value(&mut out, "say \"hi\"");
        assert_eq!(out, "'say \"hi\"'");
        out.clear();
        push_entity_value(&mut out, "it's \"50%\"");
        assert_eq!(out, "\"it's &quot;50&#x25;&quot;\"");
    }

    #[test]
    fn test_format_indents_element_only_content() {
        let doc = parse_str("<a><b><c/></b><d>text</d><e>mixed<f/></e></a>", &ParseOptions::default()).unwrap();
        let xml = serialize_with_options(&doc, &SerializeOptions::default().format(true));
        assert_eq!(
            xml,
            "<a>\n  <b>\n    <c/>\n  </b>\n  <d>text</d>\n  <e>mixed<f/></e>\n</a>"
        );
    }

    #[test]
    fn test_write_document_encodes() {
        let doc = parse(
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>caf\xE9</r>",
            &ParseOptions::default(),
        )
        .unwrap();
        let mut buf = Vec::new();
        write_document(&doc, &mut buf, &SerializeOptions::default()).unwrap();
        assert_eq!(
            buf,
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<r>caf&#xE9;</r>".to_vec()
        );

        let mut doc = Document::with_options(&CreateOptions::default().encoding("no-such-charset"));
        let r = doc.create_element("r");
        doc.set_document_element(r).unwrap();
        let err = doc.serialize(&mut Vec::new(), &SerializeOptions::default()).unwrap_err();
        assert!(matches!(err, SerializeError::Encoding(_)));
    }

    #[test]
    fn test_serialize_built_tree() {
        let mut doc = Document::new();
        let root = doc.create_element("root");
        doc.set_document_element(root).unwrap();
        doc.set_attribute(root, "k", "a\tb").unwrap();
        let child = doc.create_element("child");
        doc.add_child(root, child).unwrap();
        doc.add_content(child, "x < y").unwrap();
        assert_eq!(
            serialize(&doc),
            "<root k=\"a&#9;b\"><child>x &lt; y</child></root>"
        );
        assert_eq!(serialize_node(&doc, child, &SerializeOptions::default()), "<child>x &lt; y</child>");
    }
}
