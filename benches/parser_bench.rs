#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use helium::parser::{parse, parse_str, parse_with_sink, ParseOptions};
use helium::sax::{EventSink, NullSink, ParserContext, SinkResult};
use helium::serial::{serialize, SerializeOptions};
use helium::{Document, ParsedElement};
use std::fmt::Write;

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// An order ledger with `count` entries of four elements each.
fn make_ledger(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ledger>\n");
    for i in 0..count {
        let _ = writeln!(
            xml,
            "  <order id=\"o{i}\" state=\"open\"><sku>SKU-{:05}</sku>\
             <qty>{}</qty><note>deliver before noon &amp; call ahead</note></order>",
            i * 7,
            i % 9 + 1
        );
    }
    xml.push_str("</ledger>\n");
    xml
}

/// A chain of `depth` nested sections around a single paragraph.
fn make_nested(depth: usize) -> String {
    let mut xml = String::new();
    for _ in 0..depth {
        xml.push_str("<section>");
    }
    xml.push_str("<para>bottom</para>");
    for _ in 0..depth {
        xml.push_str("</section>");
    }
    xml
}

/// Rows of `width` attributes each, the shape of spreadsheet exports.
fn make_wide_rows(width: usize) -> String {
    let mut xml = String::from("<table>\n");
    for row in 0..20 {
        xml.push_str("  <row");
        for col in 0..width {
            let _ = write!(xml, " c{col}=\"r{row}c{col}\"");
        }
        xml.push_str("/>\n");
    }
    xml.push_str("</table>\n");
    xml
}

/// Prefixed elements and attributes drawn from a dozen bound namespaces.
fn make_prefixed(count: usize) -> String {
    let mut xml = String::from("<bundle");
    for ns in 0..12 {
        let _ = write!(xml, " xmlns:m{ns}=\"urn:example:module:{ns}\"");
    }
    xml.push_str(">\n");
    for i in 0..count {
        let ns = i % 12;
        let _ = writeln!(xml, "  <m{ns}:part m{ns}:ref=\"p{i}\">part {i}</m{ns}:part>");
    }
    xml.push_str("</bundle>\n");
    xml
}

/// Content dominated by references to internal-subset entities.
fn make_entity_heavy(count: usize) -> String {
    let mut xml = String::from(
        "<!DOCTYPE letters [\n\
         <!ENTITY org \"Example Corporation\">\n\
         <!ENTITY sig \"Regards, &org;\">\n\
         ]>\n<letters>\n",
    );
    for i in 0..count {
        let _ = writeln!(xml, "  <letter n=\"{i}\">Dear customer &#x263A; &sig;</letter>");
    }
    xml.push_str("</letters>\n");
    xml
}

/// Re-encodes a document as UTF-16LE with a byte order mark.
fn to_utf16le(xml: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in xml.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tree parsing
// ---------------------------------------------------------------------------

fn bench_parse_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_ledger");
    for count in [10, 100, 1000] {
        let xml = make_ledger(count);
        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &xml, |b, xml| {
            b.iter(|| Document::parse_str(black_box(xml)));
        });
    }
    group.finish();
}

fn bench_parse_shapes(c: &mut Criterion) {
    let shapes = [
        ("nested", make_nested(200)),
        ("wide_rows", make_wide_rows(50)),
        ("prefixed", make_prefixed(200)),
        ("entities", make_entity_heavy(200)),
    ];
    let mut group = c.benchmark_group("parse_shape");
    for (name, xml) in &shapes {
        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), xml, |b, xml| {
            b.iter(|| Document::parse_str(black_box(xml)));
        });
    }
    group.finish();
}

fn bench_parse_options(c: &mut Criterion) {
    let xml = make_entity_heavy(200);
    let unexpanded = ParseOptions::default()
        .expand_entities(false)
        .replace_entities(false);
    c.bench_function("parse_entities_unexpanded", |b| {
        b.iter(|| parse_str(black_box(&xml), &unexpanded));
    });

    let pretty = make_ledger(100).replace("><", ">\n    <");
    let no_blanks = ParseOptions::default().preserve_blanks(false);
    c.bench_function("parse_drop_blanks", |b| {
        b.iter(|| parse_str(black_box(&pretty), &no_blanks));
    });
}

fn bench_parse_utf16(c: &mut Criterion) {
    let bytes = to_utf16le(&make_ledger(100));
    let options = ParseOptions::default();
    c.bench_function("parse_utf16", |b| {
        b.iter(|| parse(black_box(&bytes), &options));
    });
}

// ---------------------------------------------------------------------------
// Event sinks
// ---------------------------------------------------------------------------

/// Counts events without keeping anything, to measure the parser alone.
#[derive(Default)]
struct CountingSink {
    elements: u64,
    text_runs: u64,
}

impl EventSink for CountingSink {
    fn start_element(&mut self, _ctx: &ParserContext, _element: &ParsedElement) -> SinkResult {
        self.elements += 1;
        Ok(())
    }

    fn characters(&mut self, _ctx: &ParserContext, _text: &str) -> SinkResult {
        self.text_runs += 1;
        Ok(())
    }
}

fn bench_sinks(c: &mut Criterion) {
    let xml = make_ledger(1000);
    let options = ParseOptions::default();
    c.bench_function("sink_counting", |b| {
        b.iter(|| {
            let mut sink = CountingSink::default();
            parse_with_sink(black_box(xml.as_bytes()), &mut sink, &options)
                .expect("sink parse failed");
            black_box((sink.elements, sink.text_runs));
        });
    });
    c.bench_function("sink_null", |b| {
        b.iter(|| parse_with_sink(black_box(xml.as_bytes()), &mut NullSink, &options));
    });
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn bench_serialize(c: &mut Criterion) {
    let doc = Document::parse_str(&make_ledger(1000)).expect("failed to parse ledger");
    c.bench_function("serialize_string", |b| {
        b.iter(|| serialize(black_box(&doc)));
    });

    let formatted = SerializeOptions::default().format(true);
    c.bench_function("serialize_formatted", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            black_box(&doc)
                .serialize(&mut out, &formatted)
                .expect("serialize failed");
            out
        });
    });

    let latin = Document::parse_str(
        &make_ledger(1000).replace("encoding=\"UTF-8\"", "encoding=\"ISO-8859-1\""),
    )
    .expect("failed to parse latin-1 ledger");
    c.bench_function("serialize_legacy_encoding", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            black_box(&latin)
                .serialize(&mut out, &SerializeOptions::default())
                .expect("serialize failed");
            out
        });
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let xml = make_ledger(100);
    c.bench_function("roundtrip", |b| {
        b.iter(|| {
            let doc = Document::parse_str(black_box(&xml)).expect("parse failed");
            let again = Document::parse_str(&serialize(&doc)).expect("re-parse failed");
            black_box(again);
        });
    });
}

criterion_group!(
    parsing,
    bench_parse_sizes,
    bench_parse_shapes,
    bench_parse_options,
    bench_parse_utf16,
);
criterion_group!(sinks, bench_sinks);
criterion_group!(serialization, bench_serialize, bench_roundtrip);
criterion_main!(parsing, sinks, serialization);
