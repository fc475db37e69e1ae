//! SAX-style event interface.
//!
//! The parser never builds a tree itself. It reports what it reads to an
//! [`EventSink`], and the [`TreeBuilder`](crate::tree::TreeBuilder) is just
//! the default sink. Every callback is fallible: returning
//! [`SinkError::Abort`] stops the parse and the error comes back out of
//! [`parse_with_sink`](crate::parser::parse_with_sink) with the current
//! position attached. [`SinkError::Unhandled`], which every default method
//! returns, tells the parser the sink has no opinion; the parser carries on
//! as if the callback were a no-op.
//!
//! # Examples
//!
//! ```
//! use helium::parser::{parse_with_sink, ParseOptions};
//! use helium::sax::{EventSink, ParserContext, SinkResult};
//! use helium::ParsedElement;
//!
//! struct Counter {
//!     elements: usize,
//! }
//!
//! impl EventSink for Counter {
//!     fn start_element(&mut self, _ctx: &ParserContext, _element: &ParsedElement) -> SinkResult {
//!         self.elements += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut counter = Counter { elements: 0 };
//! parse_with_sink(b"<root><a/><b/></root>", &mut counter, &ParseOptions::default()).unwrap();
//! assert_eq!(counter.elements, 3);
//! ```

use std::fmt;

use crate::dtd::{AttributeDecl, ElementDecl, Entity, Notation};
use crate::error::{ErrorKind, SourceLocation, TreeError};
use crate::parser::element::ParsedElement;

/// Why a sink callback did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink does not implement this callback. Never fatal.
    Unhandled,
    /// The sink wants the parse stopped.
    Abort { kind: ErrorKind, message: String },
}

impl SinkError {
    /// An abort with the generic `Handler` kind.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            kind: ErrorKind::Handler,
            message: message.into(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unhandled => write!(f, "unspecified handler"),
            Self::Abort { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<TreeError> for SinkError {
    fn from(err: TreeError) -> Self {
        Self::Abort {
            kind: err.kind,
            message: err.message,
        }
    }
}

/// Result type of every sink callback.
pub type SinkResult<T = ()> = Result<T, SinkError>;

/// The `standalone` status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standalone {
    /// `standalone="yes"`
    ExplicitYes,
    /// `standalone="no"`
    ExplicitNo,
    /// No XML declaration at all.
    #[default]
    NoDecl,
    /// An XML declaration without a `standalone` pseudo-attribute.
    ImplicitNo,
    /// Not yet determined.
    Invalid,
}

impl Standalone {
    /// Whether the value was written out in the declaration.
    #[must_use]
    pub fn is_explicit(self) -> bool {
        matches!(self, Self::ExplicitYes | Self::ExplicitNo)
    }
}

/// Which part of the DTD, if any, the parser is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsetState {
    #[default]
    None,
    Internal,
    External,
}

/// Parser state visible to sink callbacks.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    /// `version` from the XML declaration.
    pub version: Option<String>,
    /// `encoding` from the XML declaration.
    pub encoding: Option<String>,
    pub standalone: Standalone,
    /// Position of the construct being reported.
    pub location: SourceLocation,
    pub subset: SubsetState,
}

/// Consumer of parse events.
///
/// All methods default to returning [`SinkError::Unhandled`].
#[allow(unused_variables)]
pub trait EventSink {
    /// Called once, before `start_document`, with the initial position.
    fn set_document_locator(&mut self, ctx: &ParserContext, locator: SourceLocation) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// Called after the XML declaration has been read.
    fn start_document(&mut self, ctx: &ParserContext) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn end_document(&mut self, ctx: &ParserContext) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn start_element(&mut self, ctx: &ParserContext, element: &ParsedElement) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn end_element(&mut self, ctx: &ParserContext, element: &ParsedElement) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// A run of character data. Adjacent runs are always coalesced, so two
    /// `characters` calls never arrive back to back.
    fn characters(&mut self, ctx: &ParserContext, text: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// Whitespace-only text in element content when blanks are not
    /// preserved.
    fn ignorable_whitespace(&mut self, ctx: &ParserContext, text: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn cdata_block(&mut self, ctx: &ParserContext, text: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn comment(&mut self, ctx: &ParserContext, text: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn processing_instruction(&mut self, ctx: &ParserContext, target: &str, data: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// The DOCTYPE declaration was read; its internal subset follows.
    fn internal_subset(
        &mut self,
        ctx: &ParserContext,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// The DOCTYPE names an external subset; its declarations, if the sink
    /// resolves it, follow.
    fn external_subset(
        &mut self,
        ctx: &ParserContext,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn element_decl(&mut self, ctx: &ParserContext, decl: &ElementDecl) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn attribute_decl(&mut self, ctx: &ParserContext, decl: &AttributeDecl) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// A general or parameter entity declaration. Only the first
    /// declaration of a name is reported.
    fn entity_decl(&mut self, ctx: &ParserContext, entity: &Entity) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    fn notation_decl(&mut self, ctx: &ParserContext, notation: &Notation) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// Looks up a general entity. `Ok(None)` means not declared; an
    /// unhandled lookup falls back to the parser's own declarations.
    fn get_entity(&mut self, ctx: &ParserContext, name: &str) -> SinkResult<Option<Entity>> {
        Err(SinkError::Unhandled)
    }

    fn get_parameter_entity(&mut self, ctx: &ParserContext, name: &str) -> SinkResult<Option<Entity>> {
        Err(SinkError::Unhandled)
    }

    /// An entity reference that was not expanded in place.
    fn reference(&mut self, ctx: &ParserContext, name: &str) -> SinkResult {
        Err(SinkError::Unhandled)
    }

    /// Loads an external entity or subset. Unhandled means the resource is
    /// skipped.
    fn resolve_entity(
        &mut self,
        ctx: &ParserContext,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> SinkResult<Vec<u8>> {
        Err(SinkError::Unhandled)
    }
}

/// A sink that ignores every event. Parsing with it checks
/// well-formedness only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unhandled() {
        let mut sink = NullSink;
        let ctx = ParserContext::default();
        assert_eq!(sink.start_document(&ctx), Err(SinkError::Unhandled));
        assert_eq!(sink.get_entity(&ctx, "x"), Err(SinkError::Unhandled));
        assert_eq!(sink.resolve_entity(&ctx, None, Some("a.dtd")), Err(SinkError::Unhandled));
    }

    #[test]
    fn test_tree_error_becomes_abort() {
        let err: SinkError = TreeError::new(ErrorKind::InvalidDocument, "text in wrong location").into();
        assert_eq!(
            err,
            SinkError::Abort {
                kind: ErrorKind::InvalidDocument,
                message: "text in wrong location".to_string(),
            }
        );
    }

    #[test]
    fn test_standalone_explicit() {
        assert!(Standalone::ExplicitYes.is_explicit());
        assert!(Standalone::ExplicitNo.is_explicit());
        assert!(!Standalone::ImplicitNo.is_explicit());
        assert!(!Standalone::NoDecl.is_explicit());
        assert_eq!(Standalone::default(), Standalone::NoDecl);
    }
}
