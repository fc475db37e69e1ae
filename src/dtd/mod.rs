//! DTD data model shared by the parser, the event interface and the tree.
//!
//! These types describe declarations as read from an internal or external
//! subset: entities, element content models, attribute lists and
//! notations. No validity checking is done against them; the parser uses
//! them for entity expansion, attribute normalization and defaulting.
//!
//! See XML 1.0 §3.2, §3.3, §4.2 and §4.7.

use std::fmt;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The kind of an entity declaration (XML 1.0 §4.1 to §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// `<!ENTITY name "value">`
    InternalGeneralParsed,
    /// `<!ENTITY name SYSTEM "uri">`
    ExternalGeneralParsed,
    /// `<!ENTITY name SYSTEM "uri" NDATA notation>`
    ExternalGeneralUnparsed,
    /// `<!ENTITY % name "value">`
    InternalParameter,
    /// `<!ENTITY % name SYSTEM "uri">`
    ExternalParameter,
    /// One of `lt`, `gt`, `amp`, `apos`, `quot`.
    InternalPredefined,
}

impl EntityType {
    /// Returns `true` for entities whose replacement text is in the
    /// declaration itself.
    #[must_use]
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            Self::InternalGeneralParsed | Self::InternalParameter | Self::InternalPredefined
        )
    }

    #[must_use]
    pub fn is_parameter(self) -> bool {
        matches!(self, Self::InternalParameter | Self::ExternalParameter)
    }
}

/// An entity declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Replacement text: character references expanded, parameter-entity
    /// references expanded, general-entity references kept.
    pub content: String,
    /// The literal value exactly as written in the declaration.
    pub orig: Option<String>,
    /// The `NDATA` notation of an unparsed entity.
    pub notation: Option<String>,
    /// Set once a reference to this entity has been expanded and its
    /// replacement text found well-formed.
    pub checked: bool,
}

impl Entity {
    /// Creates an internal entity of the given type.
    #[must_use]
    pub fn internal(name: &str, entity_type: EntityType, content: &str) -> Self {
        Self {
            name: name.to_string(),
            entity_type,
            public_id: None,
            system_id: None,
            content: content.to_string(),
            orig: None,
            notation: None,
            checked: false,
        }
    }

    /// Creates an external entity of the given type.
    #[must_use]
    pub fn external(
        name: &str,
        entity_type: EntityType,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            entity_type,
            public_id: public_id.map(str::to_string),
            system_id: system_id.map(str::to_string),
            content: String::new(),
            orig: None,
            notation: None,
            checked: false,
        }
    }
}

/// Returns the predefined entity `name` refers to, if any.
///
/// ```
/// use helium::dtd::predefined_entity;
///
/// assert_eq!(predefined_entity("lt").map(|e| e.content), Some("<".to_string()));
/// assert!(predefined_entity("nbsp").is_none());
/// ```
#[must_use]
pub fn predefined_entity(name: &str) -> Option<Entity> {
    let content = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        _ => return None,
    };
    let mut entity = Entity::internal(name, EntityType::InternalPredefined, content);
    entity.checked = true;
    Some(entity)
}

// ---------------------------------------------------------------------------
// Element declarations
// ---------------------------------------------------------------------------

/// The declared content category of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementTypeVal {
    Undefined,
    Empty,
    Any,
    Mixed,
    Element,
}

/// Occurrence indicator of a content particle, XML 1.0 §3.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Occurrence {
    fn suffix(self) -> &'static str {
        match self {
            Self::Once => "",
            Self::Optional => "?",
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
        }
    }
}

/// Node kind of a content model tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementContentKind {
    /// `#PCDATA`
    PcData,
    /// A named child element.
    Element { name: String, prefix: Option<String> },
    /// `(a , b)`, right-nested for longer sequences.
    Seq(Box<ElementContent>, Box<ElementContent>),
    /// `(a | b)`, right-nested for longer choices.
    Or(Box<ElementContent>, Box<ElementContent>),
}

/// A content model as a binary tree of particles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementContent {
    pub kind: ElementContentKind,
    pub occurrence: Occurrence,
}

impl ElementContent {
    #[must_use]
    pub fn pcdata() -> Self {
        Self {
            kind: ElementContentKind::PcData,
            occurrence: Occurrence::Once,
        }
    }

    #[must_use]
    pub fn element(name: &str) -> Self {
        let (prefix, local) = crate::util::qname::split_qname(name);
        Self {
            kind: ElementContentKind::Element {
                name: local.to_string(),
                prefix: prefix.map(str::to_string),
            },
            occurrence: Occurrence::Once,
        }
    }

    #[must_use]
    pub fn seq(first: Self, second: Self) -> Self {
        Self {
            kind: ElementContentKind::Seq(Box::new(first), Box::new(second)),
            occurrence: Occurrence::Once,
        }
    }

    #[must_use]
    pub fn or(first: Self, second: Self) -> Self {
        Self {
            kind: ElementContentKind::Or(Box::new(first), Box::new(second)),
            occurrence: Occurrence::Once,
        }
    }

    #[must_use]
    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Builds a right-nested `Seq` or `Or` chain from a list of particles.
    pub(crate) fn chain(mut items: Vec<Self>, is_seq: bool) -> Option<Self> {
        let mut acc = items.pop()?;
        while let Some(item) = items.pop() {
            acc = if is_seq {
                Self::seq(item, acc)
            } else {
                Self::or(item, acc)
            };
        }
        Some(acc)
    }

    /// Writes the members of a group, flattening the right-nested chain of
    /// the same operator.
    fn fmt_members(&self, f: &mut fmt::Formatter<'_>, seq: bool) -> fmt::Result {
        let (sep, first, second) = match &self.kind {
            ElementContentKind::Seq(a, b) if seq => (" , ", a, b),
            ElementContentKind::Or(a, b) if !seq => (" | ", a, b),
            _ => return write!(f, "{self}"),
        };
        write!(f, "{first}{sep}")?;
        let same_op = matches!(
            (&second.kind, seq),
            (ElementContentKind::Seq(..), true) | (ElementContentKind::Or(..), false)
        );
        if same_op && second.occurrence == Occurrence::Once {
            second.fmt_members(f, seq)
        } else {
            write!(f, "{second}")
        }
    }
}

impl fmt::Display for ElementContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ElementContentKind::PcData => write!(f, "#PCDATA")?,
            ElementContentKind::Element { name, prefix } => match prefix {
                Some(p) => write!(f, "{p}:{name}")?,
                None => write!(f, "{name}")?,
            },
            ElementContentKind::Seq(..) => {
                write!(f, "(")?;
                self.fmt_members(f, true)?;
                write!(f, ")")?;
            }
            ElementContentKind::Or(..) => {
                write!(f, "(")?;
                self.fmt_members(f, false)?;
                write!(f, ")")?;
            }
        }
        write!(f, "{}", self.occurrence.suffix())
    }
}

/// An `<!ELEMENT>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: String,
    pub type_val: ElementTypeVal,
    /// The content model for `Mixed` and `Element` declarations.
    pub content: Option<ElementContent>,
}

impl fmt::Display for ElementDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!ELEMENT {} ", self.name)?;
        match (self.type_val, &self.content) {
            (ElementTypeVal::Empty, _) => write!(f, "EMPTY")?,
            (ElementTypeVal::Any, _) => write!(f, "ANY")?,
            (ElementTypeVal::Mixed, Some(c)) if c.kind == ElementContentKind::PcData => {
                // (#PCDATA) with no alternatives keeps its parentheses
                write!(f, "(#PCDATA){}", c.occurrence.suffix())?;
            }
            (_, Some(c)) if matches!(c.kind, ElementContentKind::Element { .. }) => {
                let bare = ElementContent {
                    kind: c.kind.clone(),
                    occurrence: Occurrence::Once,
                };
                write!(f, "({bare}){}", c.occurrence.suffix())?;
            }
            (_, Some(c)) => write!(f, "{c}")?,
            (_, None) => write!(f, "ANY")?,
        }
        write!(f, ">")
    }
}

// ---------------------------------------------------------------------------
// Attribute-list declarations
// ---------------------------------------------------------------------------

/// Declared type of an attribute, XML 1.0 §3.3.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    /// `NOTATION (a | b)`
    Notation(Vec<String>),
    /// `(a | b)`
    Enumeration(Vec<String>),
}

impl AttributeType {
    /// Whether values of this type are whitespace-collapsed
    /// (XML 1.0 §3.3.3).
    #[must_use]
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, Self::CData)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CData => write!(f, "CDATA"),
            Self::Id => write!(f, "ID"),
            Self::IdRef => write!(f, "IDREF"),
            Self::IdRefs => write!(f, "IDREFS"),
            Self::Entity => write!(f, "ENTITY"),
            Self::Entities => write!(f, "ENTITIES"),
            Self::NmToken => write!(f, "NMTOKEN"),
            Self::NmTokens => write!(f, "NMTOKENS"),
            Self::Notation(names) => write!(f, "NOTATION ({})", names.join(" | ")),
            Self::Enumeration(names) => write!(f, "({})", names.join(" | ")),
        }
    }
}

/// Default declaration kind of an attribute, XML 1.0 §3.3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeDefault {
    /// A literal default value.
    None,
    Required,
    Implied,
    Fixed,
}

/// One attribute definition from an `<!ATTLIST>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub element: String,
    pub name: String,
    pub attr_type: AttributeType,
    pub default: AttributeDefault,
    /// The default value for `None` and `Fixed` defaults.
    pub default_value: Option<String>,
}

impl fmt::Display for AttributeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!ATTLIST {} {} {}", self.element, self.name, self.attr_type)?;
        match self.default {
            AttributeDefault::Required => write!(f, " #REQUIRED")?,
            AttributeDefault::Implied => write!(f, " #IMPLIED")?,
            AttributeDefault::Fixed => write!(f, " #FIXED")?,
            AttributeDefault::None => {}
        }
        if let Some(value) = &self.default_value {
            write!(f, " \"{}\"", crate::serial::escape_attr_value(value))?;
        }
        write!(f, ">")
    }
}

// ---------------------------------------------------------------------------
// Notations
// ---------------------------------------------------------------------------

/// A `<!NOTATION>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!NOTATION {}", self.name)?;
        match (&self.public_id, &self.system_id) {
            (Some(p), Some(s)) => write!(f, " PUBLIC \"{p}\" \"{s}\"")?,
            (Some(p), None) => write!(f, " PUBLIC \"{p}\"")?,
            (None, Some(s)) => write!(f, " SYSTEM \"{s}\"")?,
            (None, None) => {}
        }
        write!(f, ">")
    }
}
