//! Integration tests parsing real-world XML formats.
//!
//! Smoke tests for the shapes found in property lists, DocBook, XSLT, GPX,
//! SOAP, and Ant build files. Every document must survive a serialize and
//! re-parse unchanged.

#![allow(clippy::unwrap_used)]

use helium::parser::{parse, ParseOptions};
use helium::serial::serialize;
use helium::{Document, NodeId, NodeType};

fn parse_and_roundtrip(input: &str) -> Document {
    let doc = Document::parse_str(input).unwrap_or_else(|e| panic!("parse failed: {e}"));
    let output = serialize(&doc);
    let doc2 =
        Document::parse_str(&output).unwrap_or_else(|e| panic!("roundtrip parse failed: {e}"));
    assert_eq!(serialize(&doc2), output, "second serialization differs");
    assert_eq!(
        doc.text_content(doc.root()),
        doc2.text_content(doc2.root()),
        "character data changed in roundtrip"
    );
    doc
}

fn element_children(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.children(id)
        .filter(|&c| doc.node_type(c) == NodeType::Element)
        .collect()
}

fn find(doc: &Document, local: &str) -> NodeId {
    doc.descendants(doc.root())
        .find(|&n| doc.node_type(n) == NodeType::Element && doc.local_name(n) == local)
        .unwrap_or_else(|| panic!("no <{local}> element"))
}

// --- Property list (external DTD, not loaded) ---

#[test]
fn test_property_list() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>org.example.helium</string>
	<key>LSMinimumSystemVersion</key>
	<string>11.0</string>
	<key>NSHighResolutionCapable</key>
	<true/>
</dict>
</plist>"#;

    let doc = parse_and_roundtrip(xml);
    let dtd = doc.int_subset.unwrap();
    assert_eq!(doc.local_name(dtd), "plist");
    assert!(doc.ext_subset.is_some());

    let dict = find(&doc, "dict");
    let names: Vec<&str> = element_children(&doc, dict)
        .into_iter()
        .map(|n| doc.local_name(n))
        .collect();
    assert_eq!(names, ["key", "string", "key", "string", "key", "true"]);
    assert!(serialize(&doc).contains("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\""));
}

// --- DocBook with an internal subset ---

#[test]
fn test_docbook_article_with_entities() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE article [
<!ENTITY product "helium">
<!ENTITY version "0.1">
<!ENTITY release "&product; &version;">
]>
<article xml:lang="en">
  <title>Release notes for &release;</title>
  <para>&product; reads <literal>&lt;!DOCTYPE&gt;</literal> declarations.</para>
</article>"#;

    let doc = parse_and_roundtrip(xml);
    let title = find(&doc, "title");
    assert_eq!(doc.text_content(title), "Release notes for helium 0.1");
    let article = doc.root_element().unwrap();
    assert_eq!(doc.attribute_value(article, "xml:lang").as_deref(), Some("en"));

    let dtd = doc.int_subset.unwrap();
    let entities = doc
        .children(dtd)
        .filter(|&n| doc.node_type(n) == NodeType::Entity)
        .count();
    assert_eq!(entities, 3);
    assert!(serialize(&doc).contains("<!ENTITY release \"&product; &version;\">"));
}

// --- XSLT (prefixed elements, unprefixed output) ---

#[test]
fn test_xslt_stylesheet() {
    let xml = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="html" indent="yes"/>
  <xsl:template match="/catalog">
    <ul>
      <xsl:for-each select="book[price &gt; 10]">
        <li><xsl:value-of select="title"/></li>
      </xsl:for-each>
    </ul>
  </xsl:template>
</xsl:stylesheet>"#;

    let doc = parse_and_roundtrip(xml);
    let root = doc.root_element().unwrap();
    assert_eq!(doc.prefix(root), Some("xsl"));
    assert_eq!(doc.namespace_uri(root), Some("http://www.w3.org/1999/XSL/Transform"));

    let each = find(&doc, "for-each");
    assert_eq!(doc.attribute_value(each, "select").as_deref(), Some("book[price > 10]"));
    let ul = find(&doc, "ul");
    assert_eq!(doc.namespace_uri(ul), None);
}

// --- GPX (default namespace, numeric attributes) ---

#[test]
fn test_gpx_track() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<gpx version="1.1" creator="helium" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning loop</name>
    <trkseg>
      <trkpt lat="47.6062" lon="-122.3321"><ele>56.2</ele></trkpt>
      <trkpt lat="47.6070" lon="-122.3305"><ele>58.9</ele></trkpt>
      <trkpt lat="47.6081" lon="-122.3290"><ele>61.4</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    let doc = parse_and_roundtrip(xml);
    assert_eq!(doc.standalone, helium::Standalone::ExplicitNo);
    let seg = find(&doc, "trkseg");
    let points = element_children(&doc, seg);
    assert_eq!(points.len(), 3);
    for &pt in &points {
        assert_eq!(doc.namespace_uri(pt), Some("http://www.topografix.com/GPX/1/1"));
    }
    assert_eq!(doc.attribute_value(points[2], "lon").as_deref(), Some("-122.3290"));
    assert!(serialize(&doc).starts_with(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n<gpx"
    ));
}

// --- SOAP fault (nested default namespace overrides) ---

#[test]
fn test_soap_fault() {
    let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <env:Fault>
      <env:Code><env:Value>env:Sender</env:Value></env:Code>
      <env:Reason><env:Text xml:lang="en">Missing order id</env:Text></env:Reason>
      <env:Detail>
        <err xmlns="urn:example:orders"><field>id</field></err>
      </env:Detail>
    </env:Fault>
  </env:Body>
</env:Envelope>"#;

    let doc = parse_and_roundtrip(xml);
    let root = doc.root_element().unwrap();
    assert_eq!(doc.local_name(root), "Envelope");
    assert_eq!(doc.name(root), "env:Envelope");

    let field = find(&doc, "field");
    assert_eq!(doc.namespace_uri(field), Some("urn:example:orders"));
    let text = find(&doc, "Text");
    assert_eq!(doc.text_content(text), "Missing order id");
}

// --- Ant build file (comments, PIs, CDATA scripts) ---

#[test]
fn test_ant_build_file() {
    let xml = r#"<?xml version="1.0"?>
<!-- build file for the sample project -->
<?xml-stylesheet type="text/xsl" href="ant2html.xsl"?>
<project name="sample" default="dist" basedir=".">
  <property name="src" location="src"/>
  <target name="init">
    <mkdir dir="build"/>
  </target>
  <target name="check" depends="init">
    <script language="javascript"><![CDATA[
      if (project.getProperty("src") == null && true) { fail("<src> missing"); }
    ]]></script>
  </target>
</project>"#;

    let doc = parse_and_roundtrip(xml);
    let top: Vec<NodeType> = doc.children(doc.root()).map(|n| doc.node_type(n)).collect();
    assert_eq!(
        top,
        vec![NodeType::Comment, NodeType::ProcessingInstruction, NodeType::Element]
    );

    let script = find(&doc, "script");
    let cdata = doc.first_child(script).unwrap();
    assert_eq!(doc.node_type(cdata), NodeType::CData);
    assert!(doc.content(cdata).contains("&& true"));

    let targets: Vec<NodeId> = element_children(&doc, doc.root_element().unwrap())
        .into_iter()
        .filter(|&n| doc.local_name(n) == "target")
        .collect();
    assert_eq!(targets.len(), 2);
    assert_eq!(doc.attribute_value(targets[1], "depends").as_deref(), Some("init"));
}

// --- Edge cases ---

#[test]
fn test_unicode_content() {
    let xml = "<words>\n  <ja>\u{6587}\u{5B57}</ja>\n  <el>\u{3B1}\u{3B2}\u{3B3}</el>\n  \
               <emoji>\u{1F680}</emoji>\n</words>";

    let doc = parse_and_roundtrip(xml);
    let root = doc.root_element().unwrap();
    let elements = element_children(&doc, root);
    assert_eq!(elements.len(), 3);
    assert_eq!(doc.text_content(elements[0]), "\u{6587}\u{5B57}");
    assert_eq!(doc.text_content(elements[2]), "\u{1F680}");
    // two-byte characters go out as references, wider ones verbatim
    let out = serialize(&doc);
    assert!(out.contains("<el>&#x3B1;&#x3B2;&#x3B3;</el>"), "{out}");
    assert!(out.contains("<emoji>\u{1F680}</emoji>"), "{out}");
}

#[test]
fn test_windows_line_endings() {
    let xml = "<?xml version=\"1.0\"?>\r\n<config>\r\n  <path>C:\\data</path>\r\n</config>\r\n";
    let doc = parse_and_roundtrip(xml);
    let root = doc.root_element().unwrap();
    assert_eq!(doc.text_content(root), "\n  C:\\data\n");
}

#[test]
fn test_xml_with_byte_order_mark() {
    let mut bytes = vec![0xEF, 0xBB, 0xBF];
    bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><note>hi</note>");

    let doc = parse(&bytes, &ParseOptions::default()).unwrap_or_else(|e| panic!("parse failed: {e}"));
    let root = doc.root_element().unwrap();
    assert_eq!(doc.text_content(root), "hi");
    assert_eq!(doc.encoding, "UTF-8");
}

#[test]
fn test_empty_elements_and_self_closing() {
    let xml = "<row><cell/><cell></cell><cell> </cell></row>";

    let doc = Document::parse_str(xml).unwrap();
    let root = doc.root_element().unwrap();
    let cells = element_children(&doc, root);
    assert_eq!(cells.len(), 3);
    assert_eq!(doc.first_child(cells[0]), None);
    assert_eq!(doc.first_child(cells[1]), None);
    assert_eq!(doc.text_content(cells[2]), " ");
    assert_eq!(serialize(&doc), "<row><cell/><cell/><cell> </cell></row>");
}
