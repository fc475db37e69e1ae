//! Structural invariants of parsed and edited trees.

#![allow(clippy::unwrap_used)]

use helium::serial::serialize;
use helium::{Document, ErrorKind, NodeId, NodeType};

/// Walks the whole tree checking parent links, sibling links and text
/// merging.
fn check_tree(doc: &Document, id: NodeId) {
    let kids: Vec<NodeId> = doc.children(id).collect();
    assert_eq!(doc.first_child(id), kids.first().copied());
    assert_eq!(doc.last_child(id), kids.last().copied());
    for (i, &kid) in kids.iter().enumerate() {
        assert_eq!(doc.parent(kid), Some(id), "parent link of {kid:?}");
        let prev = if i == 0 { None } else { Some(kids[i - 1]) };
        assert_eq!(doc.prev_sibling(kid), prev);
        assert_eq!(doc.next_sibling(kid), kids.get(i + 1).copied());
        if let Some(prev) = prev {
            assert!(
                doc.node_type(prev) != NodeType::Text || doc.node_type(kid) != NodeType::Text,
                "adjacent text nodes under {id:?}"
            );
        }
        check_tree(doc, kid);
    }
    for &attr in doc.attributes(id) {
        assert_eq!(doc.parent(attr), Some(id));
        check_tree(doc, attr);
    }
}

const SAMPLES: &[&str] = &[
    "<r/>",
    "<r>text</r>",
    "<r>a<b/>c<!--d-->e<?f g?>h<![CDATA[i]]>j</r>",
    "<r>a&amp;b&#x41;c</r>",
    "<!DOCTYPE r [<!ENTITY e 'one<x/>two'>]><r>a&e;b</r>",
    "<!DOCTYPE r [<!ENTITY e 'v'>]><r a='x&e;y&lt;'/>",
    "<!--a--><?b?><r xmlns='urn:x' xmlns:p='urn:p'><p:c p:d='1'/></r><!--z-->",
];

#[test]
fn test_parsed_trees_are_well_linked() {
    for sample in SAMPLES {
        let doc = Document::parse_str(sample).unwrap_or_else(|e| panic!("{sample}: {e}"));
        check_tree(&doc, doc.root());
    }
}

#[test]
fn test_character_data_survives_roundtrip() {
    for sample in SAMPLES {
        let doc = Document::parse_str(sample).unwrap();
        let again = Document::parse_str(&serialize(&doc)).unwrap();
        let texts = |d: &Document| -> Vec<String> {
            d.descendants(d.root())
                .filter(|&n| {
                    matches!(
                        d.node_type(n),
                        NodeType::Text | NodeType::CData | NodeType::Comment
                    )
                })
                .map(|n| d.content(n))
                .collect()
        };
        assert_eq!(texts(&doc), texts(&again), "{sample}");
    }
}

#[test]
fn test_edits_keep_tree_well_linked() {
    let mut doc = Document::parse_str("<r><a/>x<b/>y<c/></r>").unwrap();
    let r = doc.root_element().unwrap();
    let b = doc.children(r).nth(2).unwrap();
    doc.detach(b);
    check_tree(&doc, doc.root());
    assert_eq!(doc.children(r).count(), 3);
    assert_eq!(doc.text_content(r), "xy");

    let a = doc.first_child(r).unwrap();
    let t = doc.create_text("before");
    doc.insert_before(a, t).unwrap();
    let z = doc.create_element("z");
    doc.replace(a, z).unwrap();
    doc.add_child(r, b).unwrap();
    check_tree(&doc, doc.root());
    assert_eq!(serialize(&doc), "<r>before<z/>xy<c/><b/></r>");
}

#[test]
fn test_set_attribute_twice_leaves_no_trace() {
    let mut doc = Document::parse_str("<r/>").unwrap();
    let r = doc.root_element().unwrap();
    doc.set_attribute(r, "k", "v").unwrap();
    let before = serialize(&doc);
    let err = doc.set_attribute(r, "k", "v").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateAttribute);
    assert_eq!(serialize(&doc), before);
    assert_eq!(doc.attributes(r).len(), 1);
}

#[test]
fn test_invalid_structure_rejected() {
    let mut doc = Document::parse_str("<r>t</r>").unwrap();
    let r = doc.root_element().unwrap();
    let text = doc.first_child(r).unwrap();
    let e = doc.create_element("e");
    assert_eq!(doc.add_child(text, e).unwrap_err().kind, ErrorKind::InvalidOperation);

    let second = doc.create_element("second");
    assert_eq!(
        doc.add_child(doc.root(), second).unwrap_err().kind,
        ErrorKind::InvalidDocument
    );
    assert_eq!(
        doc.add_content(doc.root(), "loose").unwrap_err().kind,
        ErrorKind::InvalidDocument
    );
    check_tree(&doc, doc.root());
}
