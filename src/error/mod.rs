//! Error types and diagnostics.
//!
//! Every parse failure is fatal: the parser stops at the first violation and
//! returns a [`ParseError`] carrying a closed [`ErrorKind`], the source
//! location (line, column, byte offset) and the fragment of the source line
//! around the failure. Tree mutations that break a document invariant return
//! a [`TreeError`] instead.
//!
//! Warnings are not modeled: a condition is either fatal or silent.

use std::fmt;

/// The closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // -- Lexical --
    /// A byte or character outside the XML `Char` production.
    InvalidChar,
    /// Unknown or unsupported character encoding.
    InvalidEncoding,
    /// A name does not match the `Name`/`NCName` production.
    InvalidName,
    /// A name longer than the configured limit.
    NameTooLong,
    /// Input ended inside a construct.
    PrematureEOF,
    /// `--` inside a comment.
    HyphenInComment,
    /// `]]>` in character data.
    MisplacedCDATAEnd,
    /// A quoted literal was not closed.
    UnterminatedString,
    /// A character reference does not denote a legal character.
    InvalidCharRef,
    /// A public identifier contains a character outside `PubidChar`.
    InvalidPubid,
    /// A reference is missing its terminating `;`.
    SemicolonRequired,
    /// `=` expected between a name and its value.
    EqualRequired,
    /// A quoted literal expected.
    QuoteRequired,
    /// Whitespace required by the grammar is missing.
    SpaceRequired,

    // -- Structural --
    /// No root element where one is required.
    StartTagRequired,
    /// An end tag does not match the open start tag.
    EndTagMismatch,
    /// `>` expected.
    GtRequired,
    /// `</` expected.
    LtSlashRequired,
    /// An attribute appears twice on one element.
    DuplicateAttribute,
    /// Content follows the root element.
    ExtraContentAtEnd,
    /// The input holds nothing but an encoding signature or whitespace.
    EmptyDocument,

    // -- Declaration --
    /// `version` missing or not `1.x`.
    InvalidVersion,
    /// `standalone` not `yes` or `no`.
    InvalidStandalone,
    /// Malformed XML or text declaration.
    InvalidXMLDecl,
    /// The DOCTYPE declaration is not closed.
    DocTypeNotFinished,
    /// Malformed `<!ELEMENT` declaration.
    InvalidElementDecl,
    /// Malformed start of `<!ATTLIST`.
    AttrListNotStarted,
    /// Malformed end of `<!ATTLIST`.
    AttrListNotFinished,
    /// Malformed start of `<!NOTATION`.
    NotationNotStarted,
    /// Malformed end of `<!NOTATION`.
    NotationNotFinished,
    /// A token repeated where it must be unique.
    DupToken,
    /// Malformed `<![INCLUDE[` / `<![IGNORE[` section.
    ConditionalSection,

    // -- Entity --
    /// Reference to an entity that was never declared.
    UndeclaredEntity,
    /// Entity expansion nested too deeply, or looped.
    EntityLoopTooDeep,
    /// `%` must be followed by whitespace in a parameter entity declaration.
    PEMarkerRequired,
    /// Parameter entity reference inside a markup declaration of the
    /// internal subset.
    PEReferenceInInternalSubset,
    /// A markup declaration does not end in the entity it started in.
    PENesting,

    // -- Semantic --
    /// A tree operation that is not allowed for the node kind.
    InvalidOperation,
    /// A tree operation that would break a document invariant.
    InvalidDocument,
    /// An event sink aborted the parse.
    Handler,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input being read.
    pub byte_offset: usize,
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            byte_offset: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error type returned when parsing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Where in the source the error occurred.
    pub location: SourceLocation,
    /// The source line fragment around the error.
    pub context: String,
}

impl ParseError {
    /// Creates an error with no position information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: SourceLocation::default(),
            context: String::new(),
        }
    }

    /// Attaches a source position and line fragment.
    #[must_use]
    pub fn at(mut self, location: SourceLocation, context: impl Into<String>) -> Self {
        self.location = location;
        self.context = context.into();
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {}",
            self.kind, self.location, self.message
        )?;
        if !self.context.is_empty() {
            write!(f, "\n  {}", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// The error type returned by document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeError {
    /// One of `InvalidOperation`, `DuplicateAttribute` or `InvalidDocument`.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl TreeError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TreeError {}

impl From<TreeError> for ParseError {
    fn from(err: TreeError) -> Self {
        ParseError::new(err.kind, err.message)
    }
}
