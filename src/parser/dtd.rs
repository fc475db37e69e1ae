//! Document type declaration: the DOCTYPE itself, the internal subset, the
//! external subset and parameter entities.
//!
//! Declarations are reported to the sink and also kept by the parser, which
//! needs entities for expansion and ATTLIST types for attribute
//! normalization and defaulting. No validity checking is done.

use log::{debug, trace, warn};

use super::chars::{is_blank, is_pubid_char, is_xml_char, nmtoken_len};
use super::cursor::Cursor;
use super::xml::{char_ref, entity_ref, value_text, Frame, FrameKind, ParseState, XmlParser};
use crate::dtd::{
    AttributeDecl, AttributeDefault, AttributeType, ElementContent, ElementDecl, ElementTypeVal,
    Entity, EntityType, Notation, Occurrence,
};
use crate::encoding::prepare_input;
use crate::error::{ErrorKind, ParseError, SourceLocation};
use crate::sax::{Standalone, SubsetState};

impl XmlParser<'_, '_> {
    // --- DOCTYPE ---

    /// See XML 1.0 §2.8:
    /// `[28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'`
    pub(super) fn parse_doctype(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.enter(ParseState::Dtd);
        self.cur_mut().advance(9);
        if self.cur_mut().skip_blanks() == 0 {
            return Err(self.fatal(ErrorKind::SpaceRequired, "Space required after 'DOCTYPE'"));
        }
        let name = self.parse_name()?;
        self.cur_mut().skip_blanks();
        let (public_id, system_id) = self.parse_external_id(true)?;
        self.cur_mut().skip_blanks();

        self.ctx.location = loc;
        let r = self
            .sink
            .internal_subset(&self.ctx, &name, public_id.as_deref(), system_id.as_deref());
        self.check(r)?;

        if self.cur_mut().consume_prefix(b"[") {
            self.ctx.subset = SubsetState::Internal;
            self.parse_subset(false)?;
            self.cur_mut().advance(1);
            self.cur_mut().skip_blanks();
        }
        if !self.cur_mut().consume_prefix(b">") {
            return Err(self.fatal(ErrorKind::DocTypeNotFinished, "DOCTYPE improperly terminated"));
        }

        if let Some(system) = &system_id {
            self.load_external_subset(&name, public_id.as_deref(), system)?;
        }
        self.ctx.subset = SubsetState::None;
        self.leave();
        debug!(
            target: "helium::parser",
            "DOCTYPE {name}: {} entities, {} parameter entities, external subset {}",
            self.entities.len(),
            self.pentities.len(),
            if self.external_loaded { "loaded" } else { "not loaded" }
        );
        Ok(())
    }

    /// Reports the external subset and reads it if the sink resolves it.
    fn load_external_subset(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<(), ParseError> {
        self.has_external_subset = true;
        self.ctx.subset = SubsetState::External;
        let r = self.sink.external_subset(&self.ctx, name, public_id, Some(system_id));
        self.check(r)?;

        let r = self.sink.resolve_entity(&self.ctx, public_id, Some(system_id));
        let Some(bytes) = self.check_value(r)? else {
            warn!(target: "helium::parser", "external subset {system_id} not loaded");
            return Ok(());
        };
        let prepared = prepare_input(&bytes)?;
        debug!(
            target: "helium::parser",
            "reading external subset {system_id} ({} bytes, {})",
            prepared.text.len(),
            prepared.codec.name()
        );
        let text = prepared.text.into_owned();
        self.push_frame(Frame::new(Cursor::new(text), FrameKind::ExternalSubset, 0).external());
        if self.cur().has_prefix(b"<?xml") && is_blank(self.cur().peek_at(5)) {
            self.parse_text_decl()?;
        }
        self.parse_subset(true)?;
        self.external_loaded = true;
        Ok(())
    }

    /// See XML 1.0 §4.3.1: `[77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'`
    fn parse_text_decl(&mut self) -> Result<(), ParseError> {
        self.cur_mut().advance(5);
        self.cur_mut().skip_blanks();
        if self.cur().has_prefix(b"version") {
            self.parse_version_info()?;
            if self.cur_mut().skip_blanks() == 0 {
                return Err(self.fatal(ErrorKind::SpaceRequired, "Blank needed here"));
            }
        }
        if !self.cur().has_prefix(b"encoding") {
            return Err(self.fatal(ErrorKind::InvalidXMLDecl, "Missing encoding in text declaration"));
        }
        self.parse_encoding_decl()?;
        self.cur_mut().skip_blanks();
        if !self.cur_mut().consume_prefix(b"?>") {
            return Err(self.fatal(ErrorKind::InvalidXMLDecl, "parsing text declaration: '?>' expected"));
        }
        Ok(())
    }

    // --- Subsets ---

    /// Reads markup declarations until `]` (internal subset, left
    /// unconsumed) or the end of the external subset frame.
    ///
    /// See XML 1.0 §2.8: `[28b] intSubset`, `[31] extSubsetDecl`
    fn parse_subset(&mut self, external: bool) -> Result<(), ParseError> {
        let mut open_sections = 0usize;
        loop {
            self.cur_mut().skip_blanks();
            if self.cur().is_eof() {
                match self.top.kind {
                    FrameKind::ParameterEntity => {
                        self.pop_frame();
                        continue;
                    }
                    FrameKind::ExternalSubset if external => {
                        if open_sections > 0 {
                            return Err(self.fatal(
                                ErrorKind::ConditionalSection,
                                "conditional section not closed",
                            ));
                        }
                        self.pop_frame();
                        return Ok(());
                    }
                    _ => {
                        return Err(self.fatal(
                            ErrorKind::DocTypeNotFinished,
                            "DOCTYPE internal subset not finished",
                        ))
                    }
                }
            }
            if !external && self.top.kind == FrameKind::Document && self.cur().peek_at(0) == b']' {
                return Ok(());
            }
            if open_sections > 0 && self.cur_mut().consume_prefix(b"]]>") {
                open_sections -= 1;
                continue;
            }

            let rest = self.cur().rest();
            if rest.starts_with(b"<!ELEMENT") {
                self.parse_element_decl()?;
            } else if rest.starts_with(b"<!ATTLIST") {
                self.parse_attlist_decl()?;
            } else if rest.starts_with(b"<!ENTITY") {
                self.parse_entity_decl()?;
            } else if rest.starts_with(b"<!NOTATION") {
                self.parse_notation_decl()?;
            } else if rest.starts_with(b"<!--") {
                self.parse_comment()?;
            } else if rest.starts_with(b"<?") {
                self.parse_pi()?;
            } else if rest.starts_with(b"<![") {
                if self.parse_conditional_section()? {
                    open_sections += 1;
                }
            } else if rest.starts_with(b"%") {
                self.parse_pe_reference()?;
            } else {
                let what = if external { "external" } else { "internal" };
                return Err(self.fatal(
                    ErrorKind::DocTypeNotFinished,
                    format!("error in markup declaration of the {what} subset"),
                ));
            }
        }
    }

    /// Skips blanks inside a declaration. In external markup parameter
    /// entity references are expanded in place and an exhausted parameter
    /// entity counts as a blank.
    fn skip_decl_blanks(&mut self) -> Result<usize, ParseError> {
        let mut skipped = 0;
        loop {
            skipped += self.cur_mut().skip_blanks();
            if !self.in_external_markup() {
                return Ok(skipped);
            }
            if self.cur().is_eof() && self.top.kind == FrameKind::ParameterEntity {
                self.pop_frame();
                skipped += 1;
                continue;
            }
            if self.cur().peek_at(0) == b'%' && self.at_name_start(1) {
                self.parse_pe_reference()?;
                skipped += 1;
                continue;
            }
            return Ok(skipped);
        }
    }

    /// Consumes the `>` of a declaration that began in frame `start`.
    /// Returns `false`, consuming nothing, when no `>` follows.
    ///
    /// See XML 1.0 §2.8, VC: Proper Declaration/PE Nesting.
    fn close_decl(&mut self, start: u32, what: &str) -> Result<bool, ParseError> {
        if self.cur().peek_at(0) != b'>' {
            return Ok(false);
        }
        if self.top.id != start {
            return Err(self.fatal(
                ErrorKind::PENesting,
                format!("{what} declaration doesn't start and stop in the same entity"),
            ));
        }
        self.cur_mut().advance(1);
        Ok(true)
    }

    fn require_decl_blank(&mut self, after: &str) -> Result<(), ParseError> {
        if self.skip_decl_blanks()? == 0 {
            return Err(self.fatal(ErrorKind::SpaceRequired, format!("Space required after {after}")));
        }
        Ok(())
    }

    /// Starts a conditional section. Returns `true` for `INCLUDE`, whose
    /// body the subset loop then reads; `IGNORE` sections are skipped here.
    ///
    /// See XML 1.0 §3.4: `[61] conditionalSect`
    fn parse_conditional_section(&mut self) -> Result<bool, ParseError> {
        if self.ctx.subset != SubsetState::External {
            return Err(self.fatal(
                ErrorKind::ConditionalSection,
                "conditional sections are only allowed in the external subset",
            ));
        }
        self.cur_mut().advance(3);
        self.skip_decl_blanks()?;
        let include = if self.cur_mut().consume_prefix(b"INCLUDE") {
            true
        } else if self.cur_mut().consume_prefix(b"IGNORE") {
            false
        } else {
            return Err(self.fatal(
                ErrorKind::ConditionalSection,
                "conditional section INCLUDE or IGNORE keyword expected",
            ));
        };
        self.skip_decl_blanks()?;
        if !self.cur_mut().consume_prefix(b"[") {
            return Err(self.fatal(ErrorKind::ConditionalSection, "'[' expected in conditional section"));
        }
        if include {
            return Ok(true);
        }

        let mut depth = 1usize;
        while depth > 0 {
            let rest = self.cur().rest();
            let open = memchr::memmem::find(rest, b"<![");
            let close = memchr::memmem::find(rest, b"]]>");
            match (open, close) {
                (Some(o), Some(c)) if o < c => {
                    self.cur_mut().advance(o + 3);
                    depth += 1;
                }
                (_, Some(c)) => {
                    self.cur_mut().advance(c + 3);
                    depth -= 1;
                }
                (_, None) => {
                    return Err(self.fatal(ErrorKind::ConditionalSection, "IGNORE section not closed"))
                }
            }
        }
        Ok(false)
    }

    // --- Parameter entities ---

    /// `%name;` between declarations, or inside one in the external subset.
    ///
    /// See XML 1.0 §4.1: `[69] PEReference ::= '%' Name ';'`
    fn parse_pe_reference(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        self.cur_mut().advance(1);
        let name = self.parse_name()?;
        if !self.cur_mut().consume_prefix(b";") {
            return Err(self.fatal(
                ErrorKind::SemicolonRequired,
                format!("PEReference: expecting ';' after %{name}"),
            ));
        }
        self.has_pe_refs = true;

        let Some(entity) = self.lookup_parameter_entity(&name)? else {
            return self.undeclared_parameter_entity(&name, loc);
        };
        let text = if entity.entity_type == EntityType::InternalParameter {
            format!(" {} ", entity.content)
        } else {
            match self.fetch_external(&entity)? {
                Some(text) => text,
                None => return Ok(()),
            }
        };
        self.begin_expansion(&format!("%{name}"), text.len(), loc)?;
        trace!(target: "helium::parser", "expanding parameter entity '{name}'");
        let frame = Frame::new(Cursor::new(text), FrameKind::ParameterEntity, 0);
        if entity.entity_type == EntityType::InternalParameter {
            self.push_frame(frame);
        } else {
            self.push_frame(frame.external());
        }
        Ok(())
    }

    fn undeclared_parameter_entity(&self, name: &str, loc: SourceLocation) -> Result<(), ParseError> {
        if self.ctx.standalone == Standalone::ExplicitYes {
            return Err(self.fatal_at(
                ErrorKind::UndeclaredEntity,
                format!("PEReference: %{name}; not found"),
                loc,
            ));
        }
        warn!(target: "helium::parser", "PEReference: %{name}; not found");
        Ok(())
    }

    /// Loads the replacement text of an external parameter entity through
    /// the sink, without its text declaration.
    fn fetch_external(&mut self, entity: &Entity) -> Result<Option<String>, ParseError> {
        let r = self.sink.resolve_entity(
            &self.ctx,
            entity.public_id.as_deref(),
            entity.system_id.as_deref(),
        );
        let Some(bytes) = self.check_value(r)? else {
            warn!(
                target: "helium::parser",
                "external parameter entity %{}; not loaded",
                entity.name
            );
            return Ok(None);
        };
        let prepared = prepare_input(&bytes)?;
        let text = prepared.text;
        let body = match text.strip_prefix("<?xml") {
            Some(decl) if decl.bytes().next().is_some_and(is_blank) => decl
                .find("?>")
                .map_or("", |end| &decl[end + 2..]),
            _ => &*text,
        };
        Ok(Some(body.to_string()))
    }

    // --- Literals and external IDs ---

    /// Reads a quoted literal without interpreting its content.
    fn parse_quoted_literal(&mut self, what: &str) -> Result<String, ParseError> {
        let quote = self.cur().peek_at(0);
        if quote != b'"' && quote != b'\'' {
            return Err(self.fatal(ErrorKind::QuoteRequired, format!("{what}: \" or ' expected")));
        }
        let loc = self.location();
        self.cur_mut().advance(1);
        let Some(len) = memchr::memchr(quote, self.cur().rest()) else {
            return Err(self.fatal_at(ErrorKind::UnterminatedString, format!("{what} not closed"), loc));
        };
        let start = self.cur().index();
        let value = self.cur().get_region(start, start + len).to_string();
        self.cur_mut().advance(len + 1);
        Ok(value)
    }

    /// Parses `SYSTEM SystemLiteral` or `PUBLIC PubidLiteral SystemLiteral`.
    /// With `strict` unset (notations) the system literal after a public
    /// identifier is optional.
    ///
    /// See XML 1.0 §4.2.2: `[75] ExternalID`, and §4.7 `[83] PublicID`
    fn parse_external_id(
        &mut self,
        strict: bool,
    ) -> Result<(Option<String>, Option<String>), ParseError> {
        if self.cur_mut().consume_prefix(b"SYSTEM") {
            self.require_decl_blank("'SYSTEM'")?;
            let system = self.parse_quoted_literal("SystemLiteral")?;
            return Ok((None, Some(system)));
        }
        if !self.cur_mut().consume_prefix(b"PUBLIC") {
            return Ok((None, None));
        }
        self.require_decl_blank("'PUBLIC'")?;
        let public = self.parse_quoted_literal("PubidLiteral")?;
        if let Some(bad) = public.chars().find(|&c| !is_pubid_char(c)) {
            return Err(self.fatal(
                ErrorKind::InvalidPubid,
                format!("invalid char {bad:?} in PubidLiteral"),
            ));
        }
        let blanks = self.skip_decl_blanks()?;
        let quoted = matches!(self.cur().peek_at(0), b'"' | b'\'');
        if !strict && !quoted {
            return Ok((Some(public), None));
        }
        if blanks == 0 {
            return Err(self.fatal(
                ErrorKind::SpaceRequired,
                "Space required after the Public Identifier",
            ));
        }
        let system = self.parse_quoted_literal("SystemLiteral")?;
        Ok((Some(public), Some(system)))
    }

    // --- ELEMENT ---

    /// See XML 1.0 §3.2: `[45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'`
    fn parse_element_decl(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let start = self.top.id;
        self.cur_mut().advance(9);
        self.require_decl_blank("'<!ELEMENT'")?;
        let name = self.parse_name()?;
        self.require_decl_blank("the element type name")?;

        let (type_val, content) = if self.cur_mut().consume_prefix(b"EMPTY") {
            (ElementTypeVal::Empty, None)
        } else if self.cur_mut().consume_prefix(b"ANY") {
            (ElementTypeVal::Any, None)
        } else if self.cur_mut().consume_prefix(b"(") {
            self.skip_decl_blanks()?;
            if self.cur_mut().consume_prefix(b"#PCDATA") {
                (ElementTypeVal::Mixed, Some(self.parse_mixed_content()?))
            } else {
                (ElementTypeVal::Element, Some(self.parse_children_content(1)?))
            }
        } else {
            return Err(self.fatal(
                ErrorKind::InvalidElementDecl,
                "xmlParseElementDecl: 'EMPTY', 'ANY' or '(' expected",
            ));
        };
        self.skip_decl_blanks()?;
        if !self.close_decl(start, "Element")? {
            return Err(self.fatal(
                ErrorKind::GtRequired,
                "expected '>' at the end of the element declaration",
            ));
        }

        let decl = ElementDecl {
            name,
            type_val,
            content,
        };
        self.ctx.location = loc;
        let r = self.sink.element_decl(&self.ctx, &decl);
        self.check(r)
    }

    /// The rest of `(#PCDATA ...)` after the keyword.
    ///
    /// See XML 1.0 §3.2.2: `[51] Mixed`
    fn parse_mixed_content(&mut self) -> Result<ElementContent, ParseError> {
        self.skip_decl_blanks()?;
        if self.cur_mut().consume_prefix(b")") {
            let occurrence = if self.cur_mut().consume_prefix(b"*") {
                Occurrence::ZeroOrMore
            } else {
                Occurrence::Once
            };
            return Ok(ElementContent::pcdata().with_occurrence(occurrence));
        }

        let mut names: Vec<String> = Vec::new();
        while self.cur_mut().consume_prefix(b"|") {
            self.skip_decl_blanks()?;
            let name = self.parse_name()?;
            if names.contains(&name) {
                return Err(self.fatal(
                    ErrorKind::DupToken,
                    format!("Element {name} is repeated in mixed content"),
                ));
            }
            names.push(name);
            self.skip_decl_blanks()?;
        }
        if !self.cur_mut().consume_prefix(b")*") {
            return Err(self.fatal(
                ErrorKind::InvalidElementDecl,
                "xmlParseElementMixedContentDecl : '|' or ')*' expected",
            ));
        }
        let items = std::iter::once(ElementContent::pcdata())
            .chain(names.iter().map(|n| ElementContent::element(n)))
            .collect();
        Ok(ElementContent::chain(items, false)
            .unwrap_or_else(ElementContent::pcdata)
            .with_occurrence(Occurrence::ZeroOrMore))
    }

    /// A `choice` or `seq` group, after its opening parenthesis.
    ///
    /// See XML 1.0 §3.2.1: `[47] children`, `[48] cp`, `[49] choice`, `[50] seq`
    fn parse_children_content(&mut self, depth: usize) -> Result<ElementContent, ParseError> {
        if depth > self.options.recursion_limit {
            return Err(self.fatal(
                ErrorKind::InvalidElementDecl,
                format!("element content declaration nested deeper than {depth}"),
            ));
        }
        let mut items = vec![self.parse_content_particle(depth)?];
        let mut separator = None;
        loop {
            self.skip_decl_blanks()?;
            let c = self.cur().peek_at(0);
            match c {
                b')' => break,
                b',' | b'|' => {
                    if separator.is_some_and(|s| s != c) {
                        return Err(self.fatal(
                            ErrorKind::InvalidElementDecl,
                            "',' and '|' mixed in one content group",
                        ));
                    }
                    separator = Some(c);
                    self.cur_mut().advance(1);
                    self.skip_decl_blanks()?;
                    items.push(self.parse_content_particle(depth)?);
                }
                _ => {
                    return Err(self.fatal(
                        ErrorKind::InvalidElementDecl,
                        "xmlParseElementChildrenContentDecl : ',' '|' or ')' expected",
                    ))
                }
            }
        }
        self.cur_mut().advance(1);
        let occurrence = self.parse_occurrence();

        if items.len() == 1 {
            let mut item = items.remove(0);
            item.occurrence = match (item.occurrence, occurrence) {
                (inner, Occurrence::Once) => inner,
                (Occurrence::Once, outer) => outer,
                (Occurrence::OneOrMore, Occurrence::OneOrMore) => Occurrence::OneOrMore,
                _ => Occurrence::ZeroOrMore,
            };
            return Ok(item);
        }
        let group = ElementContent::chain(items, separator == Some(b','))
            .ok_or_else(|| self.fatal(ErrorKind::InvalidElementDecl, "empty content group"))?;
        Ok(group.with_occurrence(occurrence))
    }

    fn parse_content_particle(&mut self, depth: usize) -> Result<ElementContent, ParseError> {
        if self.cur_mut().consume_prefix(b"(") {
            self.skip_decl_blanks()?;
            return self.parse_children_content(depth + 1);
        }
        let name = self.parse_name()?;
        let occurrence = self.parse_occurrence();
        Ok(ElementContent::element(&name).with_occurrence(occurrence))
    }

    fn parse_occurrence(&mut self) -> Occurrence {
        let occurrence = match self.cur().peek_at(0) {
            b'?' => Occurrence::Optional,
            b'*' => Occurrence::ZeroOrMore,
            b'+' => Occurrence::OneOrMore,
            _ => return Occurrence::Once,
        };
        self.cur_mut().advance(1);
        occurrence
    }

    // --- ATTLIST ---

    /// See XML 1.0 §3.3: `[52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'`
    fn parse_attlist_decl(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let start = self.top.id;
        self.cur_mut().advance(9);
        self.require_decl_blank("'<!ATTLIST'")?;
        let element = self.parse_name().map_err(|e| {
            ParseError::new(ErrorKind::AttrListNotStarted, "ATTLIST: no name for Element")
                .at(e.location, e.context)
        })?;

        loop {
            let blanks = self.skip_decl_blanks()?;
            if self.close_decl(start, "Attribute list")? {
                break;
            }
            if self.cur().is_eof() || !self.at_name_start(0) {
                return Err(self.fatal(
                    ErrorKind::AttrListNotFinished,
                    format!("ATTLIST for {element} not finished"),
                ));
            }
            if blanks == 0 {
                return Err(self.fatal(ErrorKind::SpaceRequired, "Space required before an attribute definition"));
            }
            let name = self.parse_name()?;
            self.require_decl_blank("the attribute name")?;
            let attr_type = self.parse_attribute_type()?;
            self.require_decl_blank("the attribute type")?;
            let (default, default_value) = self.parse_default_decl(attr_type.is_tokenized())?;

            let decl = AttributeDecl {
                element: element.clone(),
                name,
                attr_type,
                default,
                default_value,
            };
            let decls = self.attr_decls.entry(element.clone()).or_default();
            if decls.iter().any(|d| d.name == decl.name) {
                trace!(
                    target: "helium::parser",
                    "attribute {} of {element} already declared",
                    decl.name
                );
                continue;
            }
            decls.push(decl.clone());
            self.ctx.location = loc;
            let r = self.sink.attribute_decl(&self.ctx, &decl);
            self.check(r)?;
        }
        Ok(())
    }

    /// See XML 1.0 §3.3.1: `[54] AttType`. Longer keywords are tried before
    /// their prefixes.
    fn parse_attribute_type(&mut self) -> Result<AttributeType, ParseError> {
        const KEYWORDS: [(&[u8], AttributeType); 8] = [
            (b"CDATA", AttributeType::CData),
            (b"IDREFS", AttributeType::IdRefs),
            (b"IDREF", AttributeType::IdRef),
            (b"ID", AttributeType::Id),
            (b"ENTITIES", AttributeType::Entities),
            (b"ENTITY", AttributeType::Entity),
            (b"NMTOKENS", AttributeType::NmTokens),
            (b"NMTOKEN", AttributeType::NmToken),
        ];
        for (keyword, attr_type) in KEYWORDS {
            if self.cur_mut().consume_prefix(keyword) {
                return Ok(attr_type);
            }
        }
        if self.cur_mut().consume_prefix(b"NOTATION") {
            self.require_decl_blank("'NOTATION'")?;
            if !self.cur_mut().consume_prefix(b"(") {
                return Err(self.fatal(ErrorKind::NotationNotStarted, "'(' required to start 'NOTATION'"));
            }
            let names = self.parse_enumeration(true)?;
            return Ok(AttributeType::Notation(names));
        }
        if self.cur_mut().consume_prefix(b"(") {
            return Ok(AttributeType::Enumeration(self.parse_enumeration(false)?));
        }
        Err(self.fatal(ErrorKind::AttrListNotFinished, "attribute type expected"))
    }

    /// The `a | b | c)` part of an enumerated type. Notation types take
    /// names, plain enumerations take name tokens.
    ///
    /// See XML 1.0 §3.3.1: `[58] NotationType`, `[59] Enumeration`
    fn parse_enumeration(&mut self, notation: bool) -> Result<Vec<String>, ParseError> {
        let mut values: Vec<String> = Vec::new();
        loop {
            self.skip_decl_blanks()?;
            let value = if notation {
                self.parse_name()?
            } else {
                let len = nmtoken_len(self.cur().rest_str());
                if len == 0 {
                    return Err(self.fatal(ErrorKind::InvalidName, "NmToken expected in enumeration"));
                }
                let start = self.cur().index();
                let token = self.cur().get_region(start, start + len).to_string();
                self.cur_mut().advance(len);
                token
            };
            if values.contains(&value) {
                return Err(self.fatal(
                    ErrorKind::DupToken,
                    format!("standalone: attribute enumeration value token {value} duplicated"),
                ));
            }
            values.push(value);
            self.skip_decl_blanks()?;
            if self.cur_mut().consume_prefix(b")") {
                return Ok(values);
            }
            if !self.cur_mut().consume_prefix(b"|") {
                let kind = if notation {
                    ErrorKind::NotationNotFinished
                } else {
                    ErrorKind::AttrListNotFinished
                };
                return Err(self.fatal(kind, "'|' or ')' expected in enumeration"));
            }
        }
    }

    /// See XML 1.0 §3.3.2: `[60] DefaultDecl`
    fn parse_default_decl(
        &mut self,
        tokenized: bool,
    ) -> Result<(AttributeDefault, Option<String>), ParseError> {
        if self.cur_mut().consume_prefix(b"#REQUIRED") {
            return Ok((AttributeDefault::Required, None));
        }
        if self.cur_mut().consume_prefix(b"#IMPLIED") {
            return Ok((AttributeDefault::Implied, None));
        }
        let default = if self.cur_mut().consume_prefix(b"#FIXED") {
            self.require_decl_blank("'#FIXED'")?;
            AttributeDefault::Fixed
        } else {
            AttributeDefault::None
        };
        let parts = self.parse_att_value(tokenized)?;
        Ok((default, Some(value_text(&parts))))
    }

    // --- ENTITY ---

    /// See XML 1.0 §4.2: `[71] GEDecl`, `[72] PEDecl`
    fn parse_entity_decl(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let start = self.top.id;
        self.enter(ParseState::EntityDecl);
        self.cur_mut().advance(8);
        self.require_decl_blank("'<!ENTITY'")?;
        let is_parameter = self.cur().peek_at(0) == b'%';
        if is_parameter {
            self.cur_mut().advance(1);
            if self.skip_decl_blanks()? == 0 {
                return Err(self.fatal(ErrorKind::PEMarkerRequired, "Space required after '%'"));
            }
        }
        let name = self.parse_name()?;
        self.require_decl_blank("the entity name")?;

        let mut entity = if matches!(self.cur().peek_at(0), b'"' | b'\'') {
            let orig = self.parse_quoted_literal("EntityValue")?;
            let content = self.expand_entity_value(&orig, loc)?;
            let entity_type = if is_parameter {
                EntityType::InternalParameter
            } else {
                EntityType::InternalGeneralParsed
            };
            let mut entity = Entity::internal(&name, entity_type, &content);
            entity.orig = Some(orig);
            entity
        } else {
            let (public_id, system_id) = self.parse_external_id(true)?;
            if system_id.is_none() {
                return Err(self.fatal(ErrorKind::QuoteRequired, "Entity value required"));
            }
            let entity_type = if is_parameter {
                EntityType::ExternalParameter
            } else {
                EntityType::ExternalGeneralParsed
            };
            Entity::external(&name, entity_type, public_id.as_deref(), system_id.as_deref())
        };

        let blanks = self.skip_decl_blanks()?;
        if self.cur().has_prefix(b"NDATA") {
            if is_parameter || entity.entity_type.is_internal() {
                return Err(self.fatal(ErrorKind::GtRequired, "NDATA is only allowed on external general entities"));
            }
            if blanks == 0 {
                return Err(self.fatal(ErrorKind::SpaceRequired, "Space required before 'NDATA'"));
            }
            self.cur_mut().advance(5);
            self.require_decl_blank("'NDATA'")?;
            entity.notation = Some(self.parse_name()?);
            entity.entity_type = EntityType::ExternalGeneralUnparsed;
            self.skip_decl_blanks()?;
        }
        if !self.close_decl(start, "Entity")? {
            return Err(self.fatal(
                ErrorKind::GtRequired,
                format!("EntityDecl: entity {name} not terminated"),
            ));
        }
        self.leave();

        let table = if is_parameter {
            &mut self.pentities
        } else {
            &mut self.entities
        };
        if table.contains_key(&name) {
            trace!(target: "helium::parser", "entity {name} already declared, keeping the first");
            return Ok(());
        }
        table.insert(name, entity.clone());
        self.ctx.location = loc;
        let r = self.sink.entity_decl(&self.ctx, &entity);
        self.check(r)
    }

    /// Builds the replacement text of an internal entity: character
    /// references and parameter entities are replaced, general entity
    /// references are kept for expansion at the point of use.
    ///
    /// See XML 1.0 §4.5.
    fn expand_entity_value(&mut self, raw: &str, loc: SourceLocation) -> Result<String, ParseError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(c) = rest.chars().next() {
            match c {
                '&' if rest.starts_with("&#") => {
                    let (ch, len) = char_ref(rest).map_err(|(k, m)| self.fatal_at(k, m, loc))?;
                    out.push(ch);
                    rest = &rest[len..];
                }
                '&' => {
                    let (_, len) = entity_ref(rest).map_err(|(k, m)| self.fatal_at(k, m, loc))?;
                    out.push_str(&rest[..len]);
                    rest = &rest[len..];
                }
                '%' => {
                    if !self.in_external_markup() {
                        return Err(self.fatal_at(
                            ErrorKind::PEReferenceInInternalSubset,
                            "PEReferences forbidden in internal subset",
                            loc,
                        ));
                    }
                    let (name, len) = entity_ref(rest).map_err(|(k, m)| self.fatal_at(k, m, loc))?;
                    let name = name.to_string();
                    rest = &rest[len..];
                    self.has_pe_refs = true;
                    let Some(entity) = self.lookup_parameter_entity(&name)? else {
                        self.undeclared_parameter_entity(&name, loc)?;
                        continue;
                    };
                    let text = if entity.entity_type == EntityType::InternalParameter {
                        Some(entity.content.clone())
                    } else {
                        self.fetch_external(&entity)?
                    };
                    if let Some(text) = text {
                        let key = format!("%{name}");
                        self.begin_expansion(&key, text.len(), loc)?;
                        out.push_str(&text);
                        self.end_expansion();
                    }
                }
                c if !is_xml_char(c) => {
                    return Err(self.fatal_at(
                        ErrorKind::InvalidChar,
                        format!("invalid char U+{:04X} in entity value", u32::from(c)),
                        loc,
                    ))
                }
                c => {
                    out.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        Ok(out)
    }

    // --- NOTATION ---

    /// See XML 1.0 §4.7: `[82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'`
    fn parse_notation_decl(&mut self) -> Result<(), ParseError> {
        let loc = self.location();
        let start = self.top.id;
        self.cur_mut().advance(10);
        self.require_decl_blank("'<!NOTATION'")?;
        let name = self.parse_name().map_err(|e| {
            ParseError::new(ErrorKind::NotationNotStarted, "Name expected in NOTATION declaration")
                .at(e.location, e.context)
        })?;
        self.require_decl_blank("the notation name")?;
        let (public_id, system_id) = self.parse_external_id(false)?;
        if public_id.is_none() && system_id.is_none() {
            return Err(self.fatal(
                ErrorKind::NotationNotStarted,
                "SYSTEM or PUBLIC expected in NOTATION declaration",
            ));
        }
        self.skip_decl_blanks()?;
        if !self.close_decl(start, "Notation")? {
            return Err(self.fatal(
                ErrorKind::NotationNotFinished,
                format!("'>' required to close NOTATION declaration {name}"),
            ));
        }

        let notation = Notation {
            name,
            public_id,
            system_id,
        };
        self.ctx.location = loc;
        let r = self.sink.notation_decl(&self.ctx, &notation);
        self.check(r)
    }
}
