//! # helium
//!
//! An XML 1.0 processor: a pull parser that reports SAX-style events, an
//! arena-backed document tree built from those events, and a serializer
//! that writes the tree back out in its original encoding.
//!
//! ## Quick Start
//!
//! ```
//! use helium::Document;
//!
//! let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
//! let root = doc.root_element().unwrap();
//! assert_eq!(doc.local_name(root), "root");
//! assert_eq!(doc.text_content(root), "Hello");
//! ```
//!
//! Streaming consumers implement [`sax::EventSink`] and call
//! [`parse_with_sink`] instead; nothing is built unless the sink builds it.

pub mod dtd;
pub mod encoding;
pub mod error;
pub mod parser;
pub mod sax;
pub mod serial;
pub mod tree;
pub mod util;

// Re-export primary types at the crate root for convenience.
pub use error::{ErrorKind, ParseError, SourceLocation, TreeError};
pub use parser::element::{ParsedAttribute, ParsedElement};
pub use parser::{parse, parse_str, parse_with_sink, ParseOptions};
pub use sax::{EventSink, Standalone};
pub use serial::{SerializeError, SerializeOptions};
pub use tree::{CreateOptions, Document, NodeId, NodeKind, NodeType, TreeBuilder};
