//! XML 1.0 pull parser.
//!
//! A hand-rolled state machine over a stack of [`Cursor`](cursor::Cursor)s.
//! The bottom cursor reads the document; entity replacement text and the
//! external subset are spliced in by pushing further cursors, so expansion
//! never copies into the document buffer and nesting is bounded by the
//! stack height.
//!
//! The parser does not know about trees. It drives an
//! [`EventSink`](crate::sax::EventSink); [`parse`] simply pairs it with a
//! [`TreeBuilder`](crate::tree::TreeBuilder).

pub(crate) mod chars;
pub(crate) mod cursor;
mod dtd;
pub mod element;
pub(crate) mod namespace;
mod xml;

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::encoding::prepare_input;
use crate::error::ParseError;
use crate::sax::EventSink;
use crate::tree::{Document, TreeBuilder};

pub use namespace::{XMLNS_NAMESPACE, XML_NAMESPACE};

/// Default maximum depth of nested entity expansion.
pub const DEFAULT_RECURSION_LIMIT: usize = 64;

/// Default maximum number of entity expansions per document.
pub const DEFAULT_MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Default budget, in bytes, for text produced by entity expansion over a
/// whole document.
pub const DEFAULT_MAX_ENTITY_TEXT: usize = 10_000_000;

/// Default maximum length of a name, in bytes.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 50_000;

/// A request to load an external entity or the external DTD subset.
#[derive(Debug, Clone, Copy)]
pub struct ExternalEntityRequest<'a> {
    /// The PUBLIC identifier, if any.
    pub public_id: Option<&'a str>,
    /// The SYSTEM identifier (URI), if any.
    pub system_id: Option<&'a str>,
}

/// A callback that loads external resources for the [`TreeBuilder`].
///
/// Returns the raw bytes of the resource, or `None` to leave it unloaded.
///
/// # Security
///
/// Loading external resources named by untrusted documents exposes the
/// caller to XXE attacks. Restrict what the resolver is willing to fetch.
pub type EntityResolver = Arc<dyn Fn(ExternalEntityRequest<'_>) -> Option<Vec<u8>> + Send + Sync>;

/// Options controlling parser behavior and limits.
///
/// ```
/// use helium::parser::ParseOptions;
///
/// let opts = ParseOptions::default()
///     .preserve_blanks(false)
///     .recursion_limit(16);
/// assert_eq!(opts.recursion_limit, 16);
/// ```
#[derive(Clone)]
pub struct ParseOptions {
    /// Report whitespace-only text as `characters` (default: true).
    /// When false it goes to `ignorable_whitespace` instead.
    pub preserve_blanks: bool,
    /// Inline internal entity replacement text (default: true). When false
    /// every general entity reference becomes a `reference` event.
    pub expand_entities: bool,
    /// Substitute the predefined entities (default: true).
    pub replace_entities: bool,
    /// Maximum depth of nested entity expansion (default: 64).
    pub recursion_limit: usize,
    /// Maximum number of entity expansions per document (default: 10,000).
    pub max_entity_expansions: u32,
    /// Maximum total bytes of replacement text inlined by entity expansion,
    /// summed over the document (default: 10,000,000).
    pub max_entity_text: usize,
    /// Maximum length of a name in bytes (default: 50,000).
    pub max_name_length: usize,
    /// Add ATTLIST default values missing from start tags (default: false).
    pub default_attributes: bool,
    /// Loader for the external subset and external entities, used by the
    /// tree builder's `resolve_entity`.
    pub entity_resolver: Option<EntityResolver>,
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("preserve_blanks", &self.preserve_blanks)
            .field("expand_entities", &self.expand_entities)
            .field("replace_entities", &self.replace_entities)
            .field("recursion_limit", &self.recursion_limit)
            .field("max_entity_expansions", &self.max_entity_expansions)
            .field("max_entity_text", &self.max_entity_text)
            .field("max_name_length", &self.max_name_length)
            .field("default_attributes", &self.default_attributes)
            .field("entity_resolver", &self.entity_resolver.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            preserve_blanks: true,
            expand_entities: true,
            replace_entities: true,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
            max_entity_text: DEFAULT_MAX_ENTITY_TEXT,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            default_attributes: false,
            entity_resolver: None,
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub fn preserve_blanks(mut self, yes: bool) -> Self {
        self.preserve_blanks = yes;
        self
    }

    #[must_use]
    pub fn expand_entities(mut self, yes: bool) -> Self {
        self.expand_entities = yes;
        self
    }

    #[must_use]
    pub fn replace_entities(mut self, yes: bool) -> Self {
        self.replace_entities = yes;
        self
    }

    #[must_use]
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    #[must_use]
    pub fn max_entity_expansions(mut self, max: u32) -> Self {
        self.max_entity_expansions = max;
        self
    }

    #[must_use]
    pub fn max_entity_text(mut self, max: usize) -> Self {
        self.max_entity_text = max;
        self
    }

    #[must_use]
    pub fn max_name_length(mut self, max: usize) -> Self {
        self.max_name_length = max;
        self
    }

    #[must_use]
    pub fn default_attributes(mut self, yes: bool) -> Self {
        self.default_attributes = yes;
        self
    }

    /// Sets the external resource loader. See [`EntityResolver`] for the
    /// security implications.
    #[must_use]
    pub fn entity_resolver(
        mut self,
        resolver: impl Fn(ExternalEntityRequest<'_>) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.entity_resolver = Some(Arc::new(resolver));
        self
    }
}

/// Parses a document into a tree.
///
/// # Errors
///
/// Returns `ParseError` at the first well-formedness violation.
///
/// # Examples
///
/// ```
/// use helium::parser::{parse, ParseOptions};
///
/// let doc = parse(b"<root>Hello, World!</root>", &ParseOptions::default()).unwrap();
/// let root = doc.root_element().unwrap();
/// assert_eq!(doc.local_name(root), "root");
/// ```
pub fn parse(input: &[u8], options: &ParseOptions) -> Result<Document, ParseError> {
    let mut builder = TreeBuilder::new();
    if let Some(resolver) = &options.entity_resolver {
        builder = builder.with_resolver(Arc::clone(resolver));
    }
    parse_with_sink(input, &mut builder, options)?;
    builder
        .into_document()
        .ok_or_else(|| ParseError::new(crate::error::ErrorKind::InvalidDocument, "no document was built"))
}

/// Parses a string slice into a tree.
///
/// # Errors
///
/// Returns `ParseError` at the first well-formedness violation.
pub fn parse_str(input: &str, options: &ParseOptions) -> Result<Document, ParseError> {
    parse(input.as_bytes(), options)
}

/// Parses a document, reporting events to `sink`.
///
/// # Errors
///
/// Returns `ParseError` at the first well-formedness violation, or when a
/// sink callback aborts.
pub fn parse_with_sink(
    input: &[u8],
    sink: &mut dyn EventSink,
    options: &ParseOptions,
) -> Result<(), ParseError> {
    let prepared = prepare_input(input)?;
    debug!(
        target: "helium::parser",
        "parsing {} bytes as {}",
        prepared.text.len(),
        prepared.codec.name()
    );
    xml::XmlParser::new(prepared.text, sink, options).run()
}
