//! Security-focused tests for helium.
//!
//! These tests verify that the parser rejects malicious or pathological
//! inputs that could cause denial of service (`DoS`) via excessive resource
//! consumption, and that nothing external is loaded unless asked for.

#![allow(clippy::unwrap_used)]

use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helium::parser::{parse_str, ParseOptions};
use helium::{Document, ErrorKind};

// ---------------------------------------------------------------------------
// Entity expansion limit tests
// ---------------------------------------------------------------------------

/// Classic "billion laughs": ten levels, each referencing the previous one
/// ten times.
fn billion_laughs() -> String {
    let mut xml = String::from("<!DOCTYPE lolz [\n<!ENTITY lol0 \"lol\">\n");
    for i in 1..10 {
        let refs: String = (0..10).map(|_| format!("&lol{};", i - 1)).collect();
        writeln!(xml, "<!ENTITY lol{i} \"{refs}\">").unwrap();
    }
    xml.push_str("]>\n<lolz>&lol9;</lolz>");
    xml
}

#[test]
fn test_billion_laughs_rejected() {
    let err = Document::parse_str(&billion_laughs()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
    assert!(
        err.message.contains("entity expansions"),
        "error should mention expansions: {}",
        err.message
    );
}

#[test]
fn test_billion_laughs_in_attribute_rejected() {
    let xml = billion_laughs().replace("<lolz>&lol9;</lolz>", "<lolz a=\"&lol9;\"/>");
    let err = Document::parse_str(&xml).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
}

#[test]
fn test_entity_expansion_limit_configurable() {
    let xml = "<!DOCTYPE r [<!ENTITY e \"x\">]><r>&e;&e;&e;</r>";
    let opts = ParseOptions::default().max_entity_expansions(3);
    assert!(parse_str(xml, &opts).is_ok());
    let opts = ParseOptions::default().max_entity_expansions(2);
    let err = parse_str(xml, &opts).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
}

#[test]
fn test_predefined_entities_do_not_count() {
    let entities: String = (0..20_000).map(|_| "&amp;").collect();
    let xml = format!("<root>{entities}</root>");
    let doc = Document::parse_str(&xml).unwrap();
    assert_eq!(doc.text_content(doc.root_element().unwrap()).len(), 20_000);
}

#[test]
fn test_recursion_limit_bounds_nesting() {
    // e0 -> e1 -> ... -> e9, ten levels of nesting
    let mut xml = String::from("<!DOCTYPE r [\n<!ENTITY e9 \"end\">\n");
    for i in (0..9).rev() {
        writeln!(xml, "<!ENTITY e{i} \"&e{};\">", i + 1).unwrap();
    }
    xml.push_str("]><r>&e0;</r>");

    let doc = parse_str(&xml, &ParseOptions::default().recursion_limit(10)).unwrap();
    assert_eq!(doc.text_content(doc.root_element().unwrap()), "end");

    let err = parse_str(&xml, &ParseOptions::default().recursion_limit(9)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
}

#[test]
fn test_self_referencing_entity_rejected() {
    let xml = "<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]><r>&a;</r>";
    let err = Document::parse_str(xml).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
}

#[test]
fn test_parameter_entity_in_internal_entity_value_rejected() {
    let xml = "<!DOCTYPE r [\n\
               <!ENTITY % a \"xxxxxxxxxx\">\n\
               <!ENTITY % b \"%a;%a;%a;%a;%a;%a;%a;%a;%a;%a;\">\n\
               ]><r/>";
    let err = Document::parse_str(xml).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PEReferenceInInternalSubset);
}

/// Each level inlines the previous one ten times, so the replacement text
/// grows tenfold per level while only a handful of expansions happen.
fn parameter_entity_chain(levels: usize) -> Vec<u8> {
    let mut dtd = format!("<!ENTITY % p0 \"{}\">\n", "x".repeat(100));
    for i in 1..levels {
        let refs: String = (0..10).map(|_| format!("%p{};", i - 1)).collect();
        writeln!(dtd, "<!ENTITY % p{i} \"{refs}\">").unwrap();
    }
    dtd.into_bytes()
}

#[test]
fn test_parameter_entity_amplification_bounded() {
    let opts = ParseOptions::default().entity_resolver(|req| match req.system_id {
        Some("chain.dtd") => Some(parameter_entity_chain(8)),
        _ => None,
    });
    let err = parse_str("<!DOCTYPE r SYSTEM \"chain.dtd\"><r/>", &opts).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
    assert!(err.message.contains("bytes"), "error should mention bytes: {}", err.message);
}

#[test]
fn test_entity_text_budget_configurable() {
    let xml = "<!DOCTYPE r [<!ENTITY e \"0123456789\">]><r>&e;&e;&e;</r>";
    let opts = ParseOptions::default().max_entity_text(30);
    let doc = parse_str(xml, &opts).unwrap();
    assert_eq!(doc.text_content(doc.root_element().unwrap()).len(), 30);
    let opts = ParseOptions::default().max_entity_text(29);
    let err = parse_str(xml, &opts).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EntityLoopTooDeep);
}

// ---------------------------------------------------------------------------
// Name length limit tests
// ---------------------------------------------------------------------------

#[test]
fn test_huge_element_name_rejected() {
    let name = "a".repeat(100_000);
    let xml = format!("<{name}/>");
    let err = Document::parse_str(&xml).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameTooLong);
}

#[test]
fn test_name_length_limit_configurable() {
    let name = "a".repeat(100);
    let xml = format!("<{name}/>");
    assert!(parse_str(&xml, &ParseOptions::default().max_name_length(200)).is_ok());
    let err = parse_str(&xml, &ParseOptions::default().max_name_length(50)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameTooLong);
}

// ---------------------------------------------------------------------------
// External resources
// ---------------------------------------------------------------------------

#[test]
fn test_no_resolver_loads_nothing() {
    let xml = "<!DOCTYPE r SYSTEM \"file:///etc/passwd\"><r>&undeclared;</r>";
    let doc = Document::parse_str(xml).unwrap();
    let root = doc.root_element().unwrap();
    assert_eq!(doc.text_content(root), "");
    assert!(doc.ext_subset.is_some());
    assert_eq!(doc.children(doc.ext_subset.unwrap()).count(), 0);
}

#[test]
fn test_external_general_entity_not_fetched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let opts = ParseOptions::default().entity_resolver(move |_req| {
        seen.fetch_add(1, Ordering::SeqCst);
        Some(b"secret".to_vec())
    });
    let xml = "<!DOCTYPE r [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]><r>&xxe;</r>";
    let doc = parse_str(xml, &opts).unwrap();
    assert_eq!(doc.text_content(doc.root_element().unwrap()), "");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Default limits are permissive enough for normal documents
// ---------------------------------------------------------------------------

#[test]
fn test_default_limits_allow_normal_documents() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
    <catalog>
        <book id="1">
            <title>Rust Programming</title>
            <author>Jane &amp; John Doe</author>
            <price>29.99</price>
            <description><![CDATA[A great book about <Rust>]]></description>
        </book>
        <book id="2">
            <title>XML &amp; &lt;HTML&gt; Parsing</title>
            <author>Alice O&apos;Brien</author>
            <price>19.99</price>
            <!-- A comment about this book -->
            <?note review-pending?>
        </book>
    </catalog>"#;

    let result = Document::parse_str(xml);
    assert!(
        result.is_ok(),
        "normal document should parse with default limits"
    );
}

#[test]
fn test_deep_element_nesting() {
    // The parser keeps no call stack per element, so depth is bounded only
    // by memory.
    let open = (0..10_000).fold(String::new(), |mut s, i| {
        write!(s, "<e{i}>").unwrap();
        s
    });
    let close = (0..10_000).rev().fold(String::new(), |mut s, i| {
        write!(s, "</e{i}>").unwrap();
        s
    });
    let xml = format!("{open}{close}");

    let doc = Document::parse_str(&xml).unwrap();
    assert_eq!(doc.descendants(doc.root()).count(), 10_000);
}

#[test]
fn test_default_limits_allow_many_attributes() {
    let attrs = (0..100).fold(String::new(), |mut s, i| {
        write!(s, " attr{i}=\"value{i}\"").unwrap();
        s
    });
    let xml = format!("<root{attrs}/>");

    let doc = Document::parse_str(&xml).unwrap();
    assert_eq!(doc.attributes(doc.root_element().unwrap()).len(), 100);
}
