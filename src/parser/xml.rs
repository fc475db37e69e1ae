//! The document state machine: XML declaration, prolog, content and
//! epilogue. DTD declarations live in the sibling `dtd` module.

use std::borrow::Cow;
use std::collections::HashMap;

use log::{debug, trace, warn};

use super::chars::{
    is_blank, is_name_start_char, is_xml_char, name_len, normalize_newlines, CHAR_DATA,
};
use super::cursor::Cursor;
use super::element::{AttrValuePart, ElementStack, ParsedAttribute, ParsedElement};
use super::namespace::NamespaceStack;
use super::ParseOptions;
use crate::dtd::{predefined_entity, AttributeDecl, Entity, EntityType};
use crate::encoding::EncodingRegistry;
use crate::error::{ErrorKind, ParseError, SourceLocation};
use crate::sax::{EventSink, ParserContext, SinkError, SinkResult, Standalone};
use crate::util::qname::split_qname;

/// Production the parser is inside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ParseState {
    Start,
    Prologue,
    Dtd,
    EntityDecl,
    Content,
    AttributeValue,
    Pi,
    Comment,
    Cdata,
    Epilogue,
    Eof,
}

/// What an input frame is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameKind {
    Document,
    GeneralEntity,
    ParameterEntity,
    ExternalSubset,
}

/// One level of the input stack.
pub(super) struct Frame<'a> {
    pub cursor: Cursor<'a>,
    pub kind: FrameKind,
    /// Open-element depth when the frame was pushed.
    pub depth: usize,
    /// Distinguishes this frame from every other one pushed in the run.
    pub id: u32,
    /// Text that came from outside the document entity: the external
    /// subset or an external parameter entity.
    pub external: bool,
}

impl<'a> Frame<'a> {
    pub fn new(cursor: Cursor<'a>, kind: FrameKind, depth: usize) -> Self {
        Self {
            cursor,
            kind,
            depth,
            id: 0,
            external: false,
        }
    }

    #[must_use]
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }
}

/// The parser. One instance runs one document.
pub(crate) struct XmlParser<'a, 's> {
    /// The frame being read; `frames` holds the ones below it.
    pub(super) top: Frame<'a>,
    pub(super) frames: Vec<Frame<'a>>,
    pub(super) sink: &'s mut dyn EventSink,
    pub(super) options: &'s ParseOptions,
    pub(super) ctx: ParserContext,
    states: Vec<ParseState>,
    elements: ElementStack,
    ns: NamespaceStack,
    /// Character data not yet reported, and where it started.
    text: String,
    text_loc: SourceLocation,
    /// Entities being expanded, innermost last. Parameter entities carry a
    /// leading `%`.
    expanding: Vec<String>,
    expansions: u32,
    /// Bytes of replacement text inlined so far.
    expanded_bytes: usize,
    frames_pushed: u32,
    /// Declarations seen so far, used when the sink does not answer
    /// entity lookups itself.
    pub(super) entities: HashMap<String, Entity>,
    pub(super) pentities: HashMap<String, Entity>,
    /// ATTLIST definitions keyed by element name.
    pub(super) attr_decls: HashMap<String, Vec<AttributeDecl>>,
    pub(super) has_external_subset: bool,
    pub(super) external_loaded: bool,
    pub(super) has_pe_refs: bool,
}

impl<'a, 's> XmlParser<'a, 's> {
    pub fn new(text: Cow<'a, str>, sink: &'s mut dyn EventSink, options: &'s ParseOptions) -> Self {
        Self {
            top: Frame::new(Cursor::new(text), FrameKind::Document, 0),
            frames: Vec::new(),
            sink,
            options,
            ctx: ParserContext::default(),
            states: vec![ParseState::Start],
            elements: ElementStack::default(),
            ns: NamespaceStack::new(),
            text: String::new(),
            text_loc: SourceLocation::default(),
            expanding: Vec::new(),
            expansions: 0,
            expanded_bytes: 0,
            frames_pushed: 0,
            entities: HashMap::new(),
            pentities: HashMap::new(),
            attr_decls: HashMap::new(),
            has_external_subset: false,
            external_loaded: false,
            has_pe_refs: false,
        }
    }

    // --- Document ---

    /// Parses the whole document.
    ///
    /// See XML 1.0 §2.1: `[1] document ::= prolog element Misc*`
    pub fn run(mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let r = self.sink.set_document_locator(&self.ctx, loc);
        self.check(r)?;

        if self.cur().rest().iter().all(|&b| is_blank(b)) {
            return Err(self.fatal(ErrorKind::EmptyDocument, "document is empty"));
        }

        if self.cur().has_prefix(b"<?xml") && is_blank(self.cur().peek_at(5)) {
            self.parse_xml_decl()?;
        } else {
            self.ctx.standalone = Standalone::NoDecl;
        }
        let r = self.sink.start_document(&self.ctx);
        self.check(r)?;

        self.enter(ParseState::Prologue);
        self.parse_misc()?;
        if self.cur().has_prefix(b"<!DOCTYPE") {
            self.parse_doctype()?;
            self.parse_misc()?;
        }
        if self.cur().peek_at(0) != b'<' || !self.at_name_start(1) {
            return Err(self.fatal(
                ErrorKind::StartTagRequired,
                "Start tag expected, '<' not found",
            ));
        }
        self.leave();

        self.enter(ParseState::Content);
        if !self.parse_start_tag()? {
            self.parse_content()?;
        }
        self.leave();

        self.enter(ParseState::Epilogue);
        self.parse_misc()?;
        if !self.cur().is_eof() {
            return Err(self.fatal(
                ErrorKind::ExtraContentAtEnd,
                "Extra content at the end of the document",
            ));
        }
        self.leave();

        self.enter(ParseState::Eof);
        self.ctx.location = self.location();
        let r = self.sink.end_document(&self.ctx);
        self.check(r)?;
        debug!(
            target: "helium::parser",
            "document finished at line {} after {} entity expansions",
            self.ctx.location.line,
            self.expansions
        );
        Ok(())
    }

    // --- Input stack ---

    pub(super) fn cur(&self) -> &Cursor<'a> {
        &self.top.cursor
    }

    pub(super) fn cur_mut(&mut self) -> &mut Cursor<'a> {
        &mut self.top.cursor
    }

    pub(super) fn push_frame(&mut self, mut frame: Frame<'a>) {
        self.frames_pushed += 1;
        frame.id = self.frames_pushed;
        let below = std::mem::replace(&mut self.top, frame);
        self.frames.push(below);
    }

    /// Drops the top frame. The document frame is never popped.
    pub(super) fn pop_frame(&mut self) -> Option<FrameKind> {
        let below = self.frames.pop()?;
        let done = std::mem::replace(&mut self.top, below);
        if matches!(done.kind, FrameKind::GeneralEntity | FrameKind::ParameterEntity) {
            self.end_expansion();
        }
        Some(done.kind)
    }

    // --- Parse states ---

    pub(super) fn enter(&mut self, state: ParseState) {
        self.states.push(state);
    }

    pub(super) fn leave(&mut self) {
        self.states.pop();
    }

    pub(super) fn state(&self) -> ParseState {
        self.states.last().copied().unwrap_or(ParseState::Eof)
    }

    // --- Errors and sink plumbing ---

    pub(super) fn location(&self) -> SourceLocation {
        self.cur().location()
    }

    pub(super) fn fatal(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        self.fatal_at(kind, message, self.location())
    }

    pub(super) fn fatal_at(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> ParseError {
        trace!(target: "helium::parser", "{kind} while in {:?}", self.state());
        ParseError::new(kind, message).at(location, self.cur().line_fragment())
    }

    /// Maps a sink result: unhandled is a no-op, an abort is fatal.
    pub(super) fn check(&self, result: SinkResult) -> Result<(), ParseError> {
        self.check_value(result).map(|_| ())
    }

    /// Like `check`, returning `None` when the sink did not handle the call.
    pub(super) fn check_value<T>(&self, result: SinkResult<T>) -> Result<Option<T>, ParseError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(SinkError::Unhandled) => Ok(None),
            Err(SinkError::Abort { kind, message }) => Err(self.fatal_at(kind, message, self.ctx.location)),
        }
    }

    pub(super) fn at_name_start(&self, offset: usize) -> bool {
        self.cur()
            .peek_rune_at(offset)
            .is_some_and(|(c, _)| is_name_start_char(c))
    }

    // --- Lexical helpers ---

    /// Parses a `Name` at the cursor.
    ///
    /// See XML 1.0 §2.3: `[5] Name ::= NameStartChar (NameChar)*`
    pub(super) fn parse_name(&mut self) -> Result<String, ParseError> {
        if self.cur().is_eof() {
            return Err(self.fatal(ErrorKind::PrematureEOF, "name expected"));
        }
        let len = name_len(self.cur().rest_str());
        if len == 0 {
            return Err(self.fatal(ErrorKind::InvalidName, "name expected"));
        }
        if len > self.options.max_name_length {
            return Err(self.fatal(
                ErrorKind::NameTooLong,
                format!("name longer than {} bytes", self.options.max_name_length),
            ));
        }
        let start = self.cur().index();
        let name = self.cur().get_region(start, start + len).to_string();
        self.cur_mut().advance(len);
        Ok(name)
    }

    /// Reads up to `end`, checks every character against `Char`, consumes
    /// the terminator and returns the newline-normalized text.
    pub(super) fn scan_until(&mut self, end: &[u8], what: &str) -> Result<String, ParseError> {
        let Some(len) = memchr::memmem::find(self.cur().rest(), end) else {
            return Err(self.fatal(ErrorKind::PrematureEOF, format!("{what} not terminated")));
        };
        let start = self.cur().index();
        let raw = self.cur().get_region(start, start + len).to_string();
        if let Some((i, c)) = raw.char_indices().find(|&(_, c)| !is_xml_char(c)) {
            self.cur_mut().advance(i);
            return Err(self.fatal(
                ErrorKind::InvalidChar,
                format!("invalid char U+{:04X} in {what}", u32::from(c)),
            ));
        }
        self.cur_mut().advance(len + end.len());
        Ok(normalize_newlines(&raw).into_owned())
    }

    /// Reads `name S? '=' S? quoted-value` as used by the XML and text
    /// declarations. The name has already been matched by the caller.
    pub(super) fn parse_pseudo_attr(&mut self, name: &str) -> Result<String, ParseError> {
        self.cur_mut().advance(name.len());
        self.cur_mut().skip_blanks();
        if !self.cur_mut().consume_prefix(b"=") {
            return Err(self.fatal(ErrorKind::EqualRequired, format!("'=' expected after {name}")));
        }
        self.cur_mut().skip_blanks();
        let quote = self.cur().peek_at(0);
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal(ErrorKind::QuoteRequired, format!("quote expected for {name}")));
        }
        self.cur_mut().advance(1);
        let Some(len) = memchr::memchr(quote, self.cur().rest()) else {
            return Err(self.fatal(ErrorKind::UnterminatedString, format!("{name} value not closed")));
        };
        let start = self.cur().index();
        let value = self.cur().get_region(start, start + len).to_string();
        self.cur_mut().advance(len + 1);
        Ok(value)
    }

    // --- XML declaration ---

    /// See XML 1.0 §2.8: `[23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'`
    fn parse_xml_decl(&mut self) -> Result<(), ParseError> {
        self.cur_mut().advance(5);
        self.cur_mut().skip_blanks();
        if !self.cur().has_prefix(b"version") {
            return Err(self.fatal(
                ErrorKind::InvalidVersion,
                "Malformed declaration expecting version",
            ));
        }
        let version = self.parse_version_info()?;
        self.ctx.version = Some(version);

        let mut blank = self.cur_mut().skip_blanks() > 0;
        if self.cur().has_prefix(b"encoding") {
            if !blank {
                return Err(self.fatal(ErrorKind::SpaceRequired, "Blank needed here"));
            }
            let encoding = self.parse_encoding_decl()?;
            self.ctx.encoding = Some(encoding);
            blank = self.cur_mut().skip_blanks() > 0;
        }
        self.ctx.standalone = Standalone::ImplicitNo;
        if self.cur().has_prefix(b"standalone") {
            if !blank {
                return Err(self.fatal(ErrorKind::SpaceRequired, "Blank needed here"));
            }
            let value = self.parse_pseudo_attr("standalone")?;
            self.ctx.standalone = match value.as_str() {
                "yes" => Standalone::ExplicitYes,
                "no" => Standalone::ExplicitNo,
                _ => {
                    return Err(self.fatal(
                        ErrorKind::InvalidStandalone,
                        format!("standalone accepts only 'yes' or 'no', not '{value}'"),
                    ))
                }
            };
            self.cur_mut().skip_blanks();
        }
        if !self.cur_mut().consume_prefix(b"?>") {
            return Err(self.fatal(
                ErrorKind::InvalidXMLDecl,
                "parsing XML declaration: '?>' expected",
            ));
        }
        debug!(
            target: "helium::parser",
            "XML declaration: version {:?}, encoding {:?}, standalone {:?}",
            self.ctx.version,
            self.ctx.encoding,
            self.ctx.standalone
        );
        Ok(())
    }

    /// `[24] VersionInfo`, value `1.[0-9]+`.
    pub(super) fn parse_version_info(&mut self) -> Result<String, ParseError> {
        let version = self.parse_pseudo_attr("version")?;
        let valid = version
            .strip_prefix("1.")
            .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(self.fatal(
                ErrorKind::InvalidVersion,
                format!("unsupported version '{version}'"),
            ));
        }
        Ok(version)
    }

    /// `[80] EncodingDecl`, value `[A-Za-z] ([A-Za-z0-9._] | '-')*`, which
    /// must also name an encoding the registry knows.
    pub(super) fn parse_encoding_decl(&mut self) -> Result<String, ParseError> {
        let encoding = self.parse_pseudo_attr("encoding")?;
        let mut bytes = encoding.bytes();
        let well_formed = bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
            && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        if !well_formed {
            return Err(self.fatal(
                ErrorKind::InvalidEncoding,
                format!("invalid encoding name '{encoding}'"),
            ));
        }
        if EncodingRegistry::lookup(&encoding).is_none() {
            return Err(self.fatal(
                ErrorKind::InvalidEncoding,
                format!("unsupported encoding {encoding}"),
            ));
        }
        Ok(encoding)
    }

    // --- Misc ---

    /// Comments, PIs and whitespace before or after the root element.
    fn parse_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.cur_mut().skip_blanks();
            if self.cur().has_prefix(b"<?") {
                self.parse_pi()?;
            } else if self.cur().has_prefix(b"<!--") {
                self.parse_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    /// See XML 1.0 §2.6: `[16] PI ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'`
    pub(super) fn parse_pi(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.enter(ParseState::Pi);
        self.cur_mut().advance(2);
        let target = self.parse_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.fatal_at(
                ErrorKind::InvalidXMLDecl,
                "XML declaration allowed only at the start of the document",
                loc,
            ));
        }
        let data = if self.cur_mut().consume_prefix(b"?>") {
            String::new()
        } else {
            if self.cur_mut().skip_blanks() == 0 {
                return Err(self.fatal(
                    ErrorKind::SpaceRequired,
                    format!("ParsePI: PI {target} space expected"),
                ));
            }
            self.scan_until(b"?>", "processing instruction")?
        };
        self.leave();

        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.processing_instruction(&self.ctx, &target, &data);
        self.check(r)
    }

    /// See XML 1.0 §2.5: `[15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'`
    pub(super) fn parse_comment(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.enter(ParseState::Comment);
        self.cur_mut().advance(4);
        let rest = self.cur().rest();
        let Some(pos) = memchr::memmem::find(rest, b"--") else {
            return Err(self.fatal_at(ErrorKind::PrematureEOF, "Comment not terminated", loc));
        };
        if rest.get(pos + 2) != Some(&b'>') {
            self.cur_mut().advance(pos);
            return Err(self.fatal(
                ErrorKind::HyphenInComment,
                "Double hyphen within comment",
            ));
        }
        let text = self.scan_until(b"-->", "comment")?;
        self.leave();

        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.comment(&self.ctx, &text);
        self.check(r)
    }

    // --- Content ---

    /// Runs the content loop until the element open when it was called
    /// (and everything opened inside it) is closed.
    ///
    /// See XML 1.0 §3.1: `[43] content`
    fn parse_content(&mut self) -> Result<(), ParseError> {
        while !self.elements.is_empty() {
            if self.cur().is_eof() {
                if self.top.kind == FrameKind::GeneralEntity {
                    self.end_entity_frame()?;
                    continue;
                }
                let name = self.elements.peek().map(ParsedElement::name).unwrap_or_default();
                return Err(self.fatal(
                    ErrorKind::PrematureEOF,
                    format!("Premature end of data in tag {name}"),
                ));
            }
            match (self.cur().peek_at(0), self.cur().peek_at(1)) {
                (b'<', b'/') => self.parse_end_tag()?,
                (b'<', b'?') => self.parse_pi()?,
                (b'<', b'!') => {
                    if self.cur().has_prefix(b"<![CDATA[") {
                        self.parse_cdata()?;
                    } else if self.cur().has_prefix(b"<!--") {
                        self.parse_comment()?;
                    } else {
                        return Err(self.fatal(ErrorKind::InvalidName, "invalid markup in content"));
                    }
                }
                (b'<', _) => {
                    self.parse_start_tag()?;
                }
                (b'&', _) => self.parse_reference()?,
                _ => self.parse_char_data()?,
            }
        }
        Ok(())
    }

    /// Leaves an exhausted entity frame, which must not have left elements
    /// open.
    fn end_entity_frame(&mut self) -> Result<(), ParseError> {
        if self.elements.depth() != self.top.depth {
            let name = self.elements.peek().map(ParsedElement::name).unwrap_or_default();
            return Err(self.fatal(
                ErrorKind::LtSlashRequired,
                format!("element {name} not closed before the end of the entity"),
            ));
        }
        self.pop_frame();
        Ok(())
    }

    /// See XML 1.0 §2.4: `[14] CharData ::= [^<&]* - ([^<&]* ']]>' [^<&]*)`
    fn parse_char_data(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let start = self.cur().index();
        loop {
            let run = self
                .cur()
                .rest()
                .iter()
                .take_while(|&&b| CHAR_DATA[usize::from(b)])
                .count();
            self.cur_mut().advance(run);
            match self.cur().rest().first().copied() {
                None | Some(b'<' | b'&') => break,
                Some(b']') => {
                    if self.cur().has_prefix(b"]]>") {
                        return Err(self.fatal(
                            ErrorKind::MisplacedCDATAEnd,
                            "Sequence ']]>' not allowed in content",
                        ));
                    }
                    self.cur_mut().advance(1);
                }
                Some(b) if b >= 0x80 => match self.cur().cur_rune() {
                    Some((c, width)) if is_xml_char(c) => self.cur_mut().advance(width),
                    Some((c, _)) => {
                        return Err(self.fatal(
                            ErrorKind::InvalidChar,
                            format!("invalid char U+{:04X} in content", u32::from(c)),
                        ))
                    }
                    None => break,
                },
                Some(b) => {
                    return Err(self.fatal(
                        ErrorKind::InvalidChar,
                        format!("invalid char 0x{b:02X} in content"),
                    ))
                }
            }
        }
        let end = self.cur().index();
        if end > start {
            let text = normalize_newlines(self.cur().get_region(start, end)).into_owned();
            self.push_text(loc, &text);
        }
        Ok(())
    }

    /// See XML 1.0 §2.7: `[18] CDSect`
    fn parse_cdata(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.enter(ParseState::Cdata);
        self.cur_mut().advance(9);
        let text = self.scan_until(b"]]>", "CDATA section")?;
        self.leave();

        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.cdata_block(&self.ctx, &text);
        self.check(r)
    }

    fn push_text(&mut self, loc: SourceLocation, text: &str) {
        if self.text.is_empty() {
            self.text_loc = loc;
        }
        self.text.push_str(text);
    }

    /// Reports pending character data as a single event.
    pub(super) fn flush_text(&mut self) -> Result<(), ParseError> {
        if self.text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text);
        self.ctx.location = self.text_loc;
        let r = if !self.options.preserve_blanks && text.bytes().all(is_blank) {
            self.sink.ignorable_whitespace(&self.ctx, &text)
        } else {
            self.sink.characters(&self.ctx, &text)
        };
        self.check(r)
    }

    // --- Tags ---

    /// Parses a start tag and reports it. Returns `true` for an empty
    /// element tag, which is also closed before returning.
    ///
    /// See XML 1.0 §3.1: `[40] STag`, `[44] EmptyElemTag`
    fn parse_start_tag(&mut self) -> Result<bool, ParseError> {
        let loc = self.location();
        self.cur_mut().advance(1);
        let qname = self.parse_name()?;
        let depth = self.elements.depth() + 1;

        // (name, value, from a default, location)
        let mut raw: Vec<(String, Vec<AttrValuePart>, bool, SourceLocation)> = Vec::new();
        let empty = loop {
            let blanks = self.cur_mut().skip_blanks();
            if self.cur_mut().consume_prefix(b"/>") {
                break true;
            }
            if self.cur_mut().consume_prefix(b">") {
                break false;
            }
            if self.cur().is_eof() {
                return Err(self.fatal(
                    ErrorKind::PrematureEOF,
                    format!("Couldn't find end of Start Tag {qname}"),
                ));
            }
            if !self.at_name_start(0) {
                return Err(self.fatal(
                    ErrorKind::GtRequired,
                    format!("Couldn't find end of Start Tag {qname}"),
                ));
            }
            if blanks == 0 {
                return Err(self.fatal(ErrorKind::SpaceRequired, "attributes construct error"));
            }
            let attr_loc = self.location();
            let name = self.parse_name()?;
            self.cur_mut().skip_blanks();
            if !self.cur_mut().consume_prefix(b"=") {
                return Err(self.fatal(
                    ErrorKind::EqualRequired,
                    format!("Specification mandates value for attribute {name}"),
                ));
            }
            self.cur_mut().skip_blanks();
            let tokenized = self.declared_tokenized(&qname, &name);
            let value = self.parse_att_value(tokenized)?;
            if raw.iter().any(|(n, ..)| *n == name) {
                return Err(self.fatal_at(
                    ErrorKind::DuplicateAttribute,
                    format!("Attribute {name} redefined"),
                    attr_loc,
                ));
            }
            raw.push((name, value, false, attr_loc));
        };

        if self.options.default_attributes {
            if let Some(decls) = self.attr_decls.get(&qname) {
                for decl in decls {
                    let Some(value) = &decl.default_value else { continue };
                    if raw.iter().any(|(n, ..)| *n == decl.name) {
                        continue;
                    }
                    let parts = if value.is_empty() {
                        Vec::new()
                    } else {
                        vec![AttrValuePart::Text(value.clone())]
                    };
                    raw.push((decl.name.clone(), parts, true, loc));
                }
            }
        }

        let (prefix, local) = split_qname(&qname);
        let mut element = ParsedElement {
            local: local.to_string(),
            prefix: prefix.map(str::to_string),
            ..ParsedElement::default()
        };

        // Namespace declarations first, so attributes on the same tag see them.
        let mut plain = Vec::with_capacity(raw.len());
        for (name, value, is_default, attr_loc) in raw {
            let declared = if name == "xmlns" {
                Some(String::new())
            } else {
                name.strip_prefix("xmlns:").map(str::to_string)
            };
            match declared {
                Some(ns_prefix) => {
                    let uri = value_text(&value);
                    if self.ns.push(depth, &ns_prefix, &uri) {
                        element.ns_pushed += 1;
                        element.namespaces.push((ns_prefix, uri));
                    }
                }
                None => plain.push((name, value, is_default, attr_loc)),
            }
        }

        element.namespace = self.resolve_prefix(prefix.unwrap_or(""), &qname);
        for (name, value, is_default, attr_loc) in plain {
            let (attr_prefix, attr_local) = split_qname(&name);
            let namespace = attr_prefix.and_then(|p| self.resolve_prefix(p, &name));
            if let Some(uri) = &namespace {
                let clash = element
                    .attributes
                    .iter()
                    .any(|a| a.local == attr_local && a.namespace.as_ref() == Some(uri));
                if clash {
                    return Err(self.fatal_at(
                        ErrorKind::DuplicateAttribute,
                        format!("Namespaced Attribute {attr_local} in '{uri}' redefined"),
                        attr_loc,
                    ));
                }
            }
            element.attributes.push(ParsedAttribute {
                local: attr_local.to_string(),
                prefix: attr_prefix.map(str::to_string),
                namespace,
                value,
                is_default,
            });
        }

        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.start_element(&self.ctx, &element);
        self.check(r)?;

        if empty {
            let r = self.sink.end_element(&self.ctx, &element);
            self.check(r)?;
            self.ns.pop(element.ns_pushed);
        } else {
            self.elements.push(element);
        }
        Ok(empty)
    }

    /// Resolves a prefix to a namespace URI. Unbound prefixes leave the
    /// name without a namespace.
    fn resolve_prefix(&self, prefix: &str, qname: &str) -> Option<String> {
        let uri = self.ns.lookup(prefix);
        if uri.is_empty() {
            if !prefix.is_empty() {
                warn!(target: "helium::parser", "Namespace prefix {prefix} on {qname} is not defined");
            }
            None
        } else {
            Some(uri.to_string())
        }
    }

    /// See XML 1.0 §3.1: `[42] ETag ::= '</' Name S? '>'`
    fn parse_end_tag(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.cur_mut().advance(2);
        let qname = self.parse_name()?;
        self.cur_mut().skip_blanks();
        let (prefix, local) = split_qname(&qname);
        if !self.elements.matches_end(prefix, local) {
            let open = self.elements.peek().map(ParsedElement::name).unwrap_or_default();
            return Err(self.fatal_at(
                ErrorKind::EndTagMismatch,
                format!("Opening and ending tag mismatch: {open} and {qname}"),
                loc,
            ));
        }
        if self.top.kind == FrameKind::GeneralEntity && self.elements.depth() <= self.top.depth {
            return Err(self.fatal_at(
                ErrorKind::EndTagMismatch,
                format!("end tag {qname} closes an element opened outside the entity"),
                loc,
            ));
        }
        if !self.cur_mut().consume_prefix(b">") {
            return Err(self.fatal(ErrorKind::GtRequired, "expected '>'"));
        }
        let Some(element) = self.elements.pop() else {
            return Err(self.fatal_at(ErrorKind::EndTagMismatch, "no element is open", loc));
        };

        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.end_element(&self.ctx, &element);
        self.check(r)?;
        self.ns.pop(element.ns_pushed);
        Ok(())
    }

    // --- Attribute values ---

    /// Whether the ATTLIST type of `attr` on `elem` collapses whitespace.
    fn declared_tokenized(&self, elem: &str, attr: &str) -> bool {
        self.attr_decls
            .get(elem)
            .and_then(|decls| decls.iter().find(|d| d.name == attr))
            .is_some_and(|d| d.attr_type.is_tokenized())
    }

    /// Parses a quoted attribute value, expanding references.
    ///
    /// See XML 1.0 §2.3 `[10] AttValue` and §3.3.3 for normalization.
    pub(super) fn parse_att_value(&mut self, tokenized: bool) -> Result<Vec<AttrValuePart>, ParseError> {
        self.enter(ParseState::AttributeValue);
        let loc = self.location();
        let quote = self.cur().peek_at(0);
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal(ErrorKind::QuoteRequired, "AttValue: \" or ' expected"));
        }
        self.cur_mut().advance(1);
        let rest = self.cur().rest();
        let Some(len) = memchr::memchr(quote, rest) else {
            return Err(self.fatal_at(ErrorKind::UnterminatedString, "AttValue: ' expected", loc));
        };
        if let Some(lt) = memchr::memchr(b'<', &rest[..len]) {
            self.cur_mut().advance(lt);
            return Err(self.fatal(
                ErrorKind::InvalidChar,
                "Unescaped '<' not allowed in attributes values",
            ));
        }
        let start = self.cur().index();
        let raw = self.cur().get_region(start, start + len).to_string();
        self.cur_mut().advance(len + 1);

        let mut parts = Vec::new();
        let mut buf = String::new();
        self.expand_att_text(&raw, &mut buf, &mut parts, loc)?;
        if !buf.is_empty() {
            parts.push(AttrValuePart::Text(buf));
        }
        if tokenized {
            collapse_spaces(&mut parts);
        }
        self.leave();
        Ok(parts)
    }

    /// Normalizes `raw` into `buf`, expanding character references and
    /// internal entities. Unexpanded references are split out as parts.
    fn expand_att_text(
        &mut self,
        raw: &str,
        buf: &mut String,
        parts: &mut Vec<AttrValuePart>,
        loc: SourceLocation,
    ) -> Result<(), ParseError> {
        let mut rest = raw;
        while let Some(c) = rest.chars().next() {
            match c {
                '&' if rest.starts_with("&#") => {
                    let (ch, len) = char_ref(rest).map_err(|(k, m)| self.fatal_at(k, m, loc))?;
                    buf.push(ch);
                    rest = &rest[len..];
                }
                '&' => {
                    let (name, len) = entity_ref(rest).map_err(|(k, m)| self.fatal_at(k, m, loc))?;
                    rest = &rest[len..];
                    self.att_entity_ref(name, buf, parts, loc)?;
                }
                '<' => {
                    return Err(self.fatal_at(
                        ErrorKind::InvalidChar,
                        "'<' in entity referenced in an attribute value",
                        loc,
                    ))
                }
                '\r' => {
                    buf.push(' ');
                    rest = rest.strip_prefix("\r\n").unwrap_or(&rest[1..]);
                }
                '\t' | '\n' => {
                    buf.push(' ');
                    rest = &rest[1..];
                }
                c if !is_xml_char(c) => {
                    return Err(self.fatal_at(
                        ErrorKind::InvalidChar,
                        format!("invalid char U+{:04X} in attribute value", u32::from(c)),
                        loc,
                    ))
                }
                c => {
                    buf.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        Ok(())
    }

    fn att_entity_ref(
        &mut self,
        name: &str,
        buf: &mut String,
        parts: &mut Vec<AttrValuePart>,
        loc: SourceLocation,
    ) -> Result<(), ParseError> {
        let keep_ref = |buf: &mut String, parts: &mut Vec<AttrValuePart>| {
            if !buf.is_empty() {
                parts.push(AttrValuePart::Text(std::mem::take(buf)));
            }
            parts.push(AttrValuePart::EntityRef(name.to_string()));
        };

        if let Some(predefined) = predefined_entity(name) {
            if self.options.replace_entities {
                buf.push_str(&predefined.content);
            } else {
                keep_ref(buf, parts);
            }
            return Ok(());
        }
        match self.lookup_entity(name)? {
            Some(entity) if entity.entity_type == EntityType::InternalGeneralParsed => {
                if !self.options.expand_entities {
                    keep_ref(buf, parts);
                    return Ok(());
                }
                self.begin_expansion(name, entity.content.len(), loc)?;
                let result = self.expand_att_text(&entity.content, buf, parts, loc);
                self.end_expansion();
                result
            }
            Some(_) => Err(self.fatal_at(
                ErrorKind::UndeclaredEntity,
                format!("Attribute references external entity '{name}'"),
                loc,
            )),
            None => {
                self.undeclared_entity(name, loc)?;
                keep_ref(buf, parts);
                Ok(())
            }
        }
    }

    // --- References ---

    /// See XML 1.0 §4.1: `[67] Reference ::= EntityRef | CharRef`
    fn parse_reference(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        if self.cur().has_prefix(b"&#") {
            let (c, len) = char_ref(self.cur().rest_str()).map_err(|(k, m)| self.fatal(k, m))?;
            self.cur_mut().advance(len);
            let mut utf8 = [0u8; 4];
            self.push_text(loc, c.encode_utf8(&mut utf8));
            return Ok(());
        }
        let (name, len) = entity_ref(self.cur().rest_str()).map_err(|(k, m)| self.fatal(k, m))?;
        let name = name.to_string();
        if name.len() > self.options.max_name_length {
            return Err(self.fatal(ErrorKind::NameTooLong, "entity name too long"));
        }
        self.cur_mut().advance(len);

        if let Some(predefined) = predefined_entity(&name) {
            if self.options.replace_entities {
                self.push_text(loc, &predefined.content);
                return Ok(());
            }
            return self.emit_reference(loc, &name);
        }
        match self.lookup_entity(&name)? {
            Some(entity)
                if entity.entity_type == EntityType::InternalGeneralParsed
                    && self.options.expand_entities =>
            {
                self.begin_expansion(&name, entity.content.len(), loc)?;
                trace!(target: "helium::parser", "expanding entity '{name}'");
                let depth = self.elements.depth();
                self.push_frame(Frame::new(
                    Cursor::new(entity.content),
                    FrameKind::GeneralEntity,
                    depth,
                ));
                Ok(())
            }
            Some(_) => self.emit_reference(loc, &name),
            None => {
                self.undeclared_entity(&name, loc)?;
                self.emit_reference(loc, &name)
            }
        }
    }

    fn emit_reference(&mut self, loc: SourceLocation, name: &str) -> Result<(), ParseError> {
        self.flush_text()?;
        self.ctx.location = loc;
        let r = self.sink.reference(&self.ctx, name);
        self.check(r)
    }

    /// Looks up a general entity, asking the sink first.
    pub(super) fn lookup_entity(&mut self, name: &str) -> Result<Option<Entity>, ParseError> {
        let r = self.sink.get_entity(&self.ctx, name);
        let from_sink = self.check_value(r)?.flatten();
        Ok(from_sink.or_else(|| self.entities.get(name).cloned()))
    }

    /// Looks up a parameter entity, asking the sink first.
    pub(super) fn lookup_parameter_entity(&mut self, name: &str) -> Result<Option<Entity>, ParseError> {
        let r = self.sink.get_parameter_entity(&self.ctx, name);
        let from_sink = self.check_value(r)?.flatten();
        Ok(from_sink.or_else(|| self.pentities.get(name).cloned()))
    }

    /// Decides what an undeclared entity means. It is only an error when
    /// every declaration could have been seen.
    ///
    /// See XML 1.0 §4.1, WFC: Entity Declared.
    pub(super) fn undeclared_entity(&self, name: &str, loc: SourceLocation) -> Result<(), ParseError> {
        let unseen_declarations =
            (self.has_external_subset && !self.external_loaded) || self.has_pe_refs;
        if unseen_declarations && self.ctx.standalone != Standalone::ExplicitYes {
            warn!(target: "helium::parser", "Entity '{name}' not defined");
            return Ok(());
        }
        Err(self.fatal_at(
            ErrorKind::UndeclaredEntity,
            format!("Entity '{name}' not defined"),
            loc,
        ))
    }

    /// Records the start of an entity expansion, enforcing the loop, depth
    /// and amplification limits.
    pub(super) fn begin_expansion(
        &mut self,
        name: &str,
        text_len: usize,
        loc: SourceLocation,
    ) -> Result<(), ParseError> {
        if self.expanding.iter().any(|n| n == name) {
            return Err(self.fatal_at(
                ErrorKind::EntityLoopTooDeep,
                format!("Detected an entity reference loop on '{name}'"),
                loc,
            ));
        }
        if self.expanding.len() >= self.options.recursion_limit {
            return Err(self.fatal_at(
                ErrorKind::EntityLoopTooDeep,
                format!(
                    "entity nesting deeper than {} expanding '{name}'",
                    self.options.recursion_limit
                ),
                loc,
            ));
        }
        self.expansions += 1;
        if self.expansions > self.options.max_entity_expansions {
            return Err(self.fatal_at(
                ErrorKind::EntityLoopTooDeep,
                format!(
                    "more than {} entity expansions",
                    self.options.max_entity_expansions
                ),
                loc,
            ));
        }
        self.expanded_bytes = self.expanded_bytes.saturating_add(text_len);
        if self.expanded_bytes > self.options.max_entity_text {
            return Err(self.fatal_at(
                ErrorKind::EntityLoopTooDeep,
                format!(
                    "entity expansion produced more than {} bytes of text",
                    self.options.max_entity_text
                ),
                loc,
            ));
        }
        self.expanding.push(name.to_string());
        Ok(())
    }

    pub(super) fn end_expansion(&mut self) {
        self.expanding.pop();
    }

    /// Whether the text being read comes from the external subset or an
    /// external parameter entity, directly or through entities they
    /// reference.
    pub(super) fn in_external_markup(&self) -> bool {
        self.top.external || self.frames.iter().any(|f| f.external)
    }
}

/// The concatenated text of an attribute value.
pub(super) fn value_text(parts: &[AttrValuePart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            AttrValuePart::Text(t) => out.push_str(t),
            AttrValuePart::EntityRef(name) => {
                out.push('&');
                out.push_str(name);
                out.push(';');
            }
        }
    }
    out
}

/// Collapses space runs in the text of a tokenized attribute value and
/// trims both ends. Entity references left unexpanded stay in place.
///
/// See XML 1.0 §3.3.3.
fn collapse_spaces(parts: &mut Vec<AttrValuePart>) {
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter_mut().enumerate() {
        let AttrValuePart::Text(text) = part else {
            continue;
        };
        let mut collapsed = String::with_capacity(text.len());
        let mut after_space = i == 0;
        for c in text.chars() {
            if c != ' ' {
                collapsed.push(c);
                after_space = false;
            } else if !after_space {
                collapsed.push(' ');
                after_space = true;
            }
        }
        if i == last && collapsed.ends_with(' ') {
            collapsed.pop();
        }
        *text = collapsed;
    }
    parts.retain(|p| !matches!(p, AttrValuePart::Text(t) if t.is_empty()));
}

/// Decodes the character reference at the start of `s` (which begins
/// with `&#`). Returns the character and the reference length.
///
/// See XML 1.0 §4.1: `[66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'`
pub(super) fn char_ref(s: &str) -> Result<(char, usize), (ErrorKind, String)> {
    let bytes = s.as_bytes();
    let (radix, start) = if bytes.get(2) == Some(&b'x') { (16, 3) } else { (10, 2) };
    let digits = bytes
        .get(start..)
        .unwrap_or_default()
        .iter()
        .take_while(|b| if radix == 16 { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
        .count();
    if digits == 0 {
        return Err((ErrorKind::InvalidCharRef, "invalid character reference".to_string()));
    }
    let end = start + digits;
    if bytes.get(end) != Some(&b';') {
        return Err((
            ErrorKind::SemicolonRequired,
            "CharRef: ';' expected".to_string(),
        ));
    }
    u32::from_str_radix(&s[start..end], radix)
        .ok()
        .and_then(char::from_u32)
        .filter(|&c| is_xml_char(c))
        .map(|c| (c, end + 1))
        .ok_or_else(|| {
            (
                ErrorKind::InvalidCharRef,
                format!("xmlParseCharRef: invalid xmlChar value {}", &s[..end]),
            )
        })
}

/// Splits the entity reference at the start of `s` (which begins with
/// `&` or `%`). Returns the name and the reference length.
///
/// See XML 1.0 §4.1: `[68] EntityRef ::= '&' Name ';'`
pub(super) fn entity_ref(s: &str) -> Result<(&str, usize), (ErrorKind, String)> {
    let len = name_len(s.get(1..).unwrap_or_default());
    if len == 0 {
        return Err((ErrorKind::InvalidName, "EntityRef: no name".to_string()));
    }
    if s.as_bytes().get(1 + len) != Some(&b';') {
        return Err((
            ErrorKind::SemicolonRequired,
            "EntityRef: expecting ';'".to_string(),
        ));
    }
    Ok((&s[1..=len], len + 2))
}
