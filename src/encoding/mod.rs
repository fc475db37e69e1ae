//! Encoding detection and transcoding.
//!
//! Implements signature sniffing per XML 1.0 Appendix F and a registry of
//! named codecs. The parser only ever sees UTF-8: input in any other
//! encoding is decoded up front by [`prepare_input`], and the serializer
//! encodes its UTF-8 output back through [`EncodingRegistry::encode`].
//!
//! # Detection Strategy
//!
//! 1. Inspect the first four bytes for a byte order mark or one of the
//!    `<?xml` patterns of Appendix F ([`detect_encoding`]).
//! 2. Decode the input with the detected codec (UTF-8 when nothing matched).
//! 3. Read the `encoding=` pseudo-attribute of the XML declaration. When
//!    detection found no signature, the declared encoding wins and the raw
//!    bytes are decoded again with it.
//!
//! Legacy single- and multi-byte encodings are backed by `encoding_rs`;
//! ISO-8859-1, US-ASCII, UCS-4 and UTF-16 output are handled here because
//! `encoding_rs` either maps them to a different WHATWG encoding or cannot
//! encode them.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use log::debug;

use crate::error::{ErrorKind, ParseError, SourceLocation};

/// An error that occurs during encoding detection or transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    /// A human-readable description of the encoding error.
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error: {}", self.message)
    }
}

impl std::error::Error for EncodingError {}

// --- Signature detection ---

/// Name reported for UCS-4 big-endian (1234) input.
pub const UCS4_BE: &str = "UCS-4BE";
/// Name reported for UCS-4 little-endian (4321) input.
pub const UCS4_LE: &str = "UCS-4LE";
/// Name reported for UCS-4 in unusual 2143 order.
pub const UCS4_2143: &str = "UCS-4-2143";
/// Name reported for UCS-4 in unusual 3412 order.
pub const UCS4_3412: &str = "UCS-4-3412";
/// Name reported for EBCDIC-family input.
pub const EBCDIC: &str = "EBCDIC";
/// Name reported for UTF-8 input.
pub const UTF8: &str = "UTF-8";
/// Name reported for UTF-16 little-endian input.
pub const UTF16_LE: &str = "UTF-16LE";
/// Name reported for UTF-16 big-endian input.
pub const UTF16_BE: &str = "UTF-16BE";

/// Detects the encoding of an XML byte stream from its first bytes.
///
/// Returns the encoding name and the number of signature bytes the caller
/// should treat as consumed. Byte order marks report their own length;
/// the four-byte UCS-4 and EBCDIC patterns report 4; the bare `<?xm` and
/// UTF-16 `<?` patterns report 0 since those bytes are markup.
///
/// # Errors
///
/// Returns `EncodingError` when none of the Appendix F patterns match. The
/// parser treats that as plain UTF-8 without a declaration.
///
/// # Examples
///
/// ```
/// use helium::encoding::detect_encoding;
///
/// assert_eq!(detect_encoding(b"\xEF\xBB\xBF<a/>").unwrap(), ("UTF-8", 3));
/// assert_eq!(detect_encoding(b"\x00\x00\x00\x3C").unwrap(), ("UCS-4BE", 4));
/// assert!(detect_encoding(b"<a/>").is_err());
/// ```
pub fn detect_encoding(bytes: &[u8]) -> Result<(&'static str, usize), EncodingError> {
    if let [b0, b1, b2, b3, ..] = *bytes {
        match [b0, b1, b2, b3] {
            [0x00, 0x00, 0x00, 0x3C] => return Ok((UCS4_BE, 4)),
            [0x3C, 0x00, 0x00, 0x00] => return Ok((UCS4_LE, 4)),
            [0x00, 0x00, 0x3C, 0x00] => return Ok((UCS4_2143, 4)),
            [0x00, 0x3C, 0x00, 0x00] => return Ok((UCS4_3412, 4)),
            [0x4C, 0x6F, 0xA7, 0x94] => return Ok((EBCDIC, 4)),
            [0x3C, 0x3F, 0x78, 0x6D] => return Ok((UTF8, 0)),
            [0x3C, 0x00, 0x3F, 0x00] => return Ok((UTF16_LE, 0)),
            [0x00, 0x3C, 0x00, 0x3F] => return Ok((UTF16_BE, 0)),
            _ => {}
        }
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Ok((UTF8, 3));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Ok((UTF16_BE, 2));
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Ok((UTF16_LE, 2));
    }
    Err(EncodingError::new("no encoding signature"))
}

// --- Codecs ---

/// Byte order of a UCS-4 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ucs4Order {
    /// 1234
    BigEndian,
    /// 4321
    LittleEndian,
    /// 2143
    Unusual2143,
    /// 3412
    Unusual3412,
}

impl Ucs4Order {
    /// Reorders one code unit into big-endian order. The permutations are
    /// their own inverses, so the same mapping serves the encoder.
    fn to_be(self, unit: [u8; 4]) -> [u8; 4] {
        let [a, b, c, d] = unit;
        match self {
            Self::BigEndian => [a, b, c, d],
            Self::LittleEndian => [d, c, b, a],
            Self::Unusual2143 => [b, a, d, c],
            Self::Unusual3412 => [c, d, a, b],
        }
    }
}

/// A named character encoding that can decode input and encode output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    Utf16Le,
    Utf16Be,
    Ucs4(Ucs4Order),
    /// Exact ISO-8859-1 (`encoding_rs` maps this label to windows-1252).
    Latin1,
    Ascii,
    /// Any other encoding known to `encoding_rs`.
    Legacy(&'static Encoding),
}

impl Codec {
    /// The canonical name of the codec.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => UTF8,
            Self::Utf16Le => UTF16_LE,
            Self::Utf16Be => UTF16_BE,
            Self::Ucs4(Ucs4Order::BigEndian) => UCS4_BE,
            Self::Ucs4(Ucs4Order::LittleEndian) => UCS4_LE,
            Self::Ucs4(Ucs4Order::Unusual2143) => UCS4_2143,
            Self::Ucs4(Ucs4Order::Unusual3412) => UCS4_3412,
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
            Self::Legacy(enc) => enc.name(),
        }
    }

    /// Returns `true` for codecs whose decoded form is the input itself.
    #[must_use]
    pub fn is_utf8(self) -> bool {
        self == Self::Utf8
    }

    /// Decodes `bytes` into UTF-8. Malformed input is an error, never
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` for byte sequences that are not valid in
    /// this encoding.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Result<Cow<'a, str>, EncodingError> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|e| {
                EncodingError::new(format!(
                    "invalid UTF-8 sequence at byte {}",
                    e.valid_up_to()
                ))
            }),
            Self::Utf16Le => decode_with(encoding_rs::UTF_16LE, bytes),
            Self::Utf16Be => decode_with(encoding_rs::UTF_16BE, bytes),
            Self::Ucs4(order) => decode_ucs4(order, bytes).map(Cow::Owned),
            Self::Latin1 => Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())),
            Self::Ascii => {
                if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(EncodingError::new(format!(
                        "non-ASCII byte 0x{:02X} at {pos}",
                        bytes[pos]
                    )));
                }
                Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()))
            }
            Self::Legacy(enc) => decode_with(enc, bytes),
        }
    }

    /// Encodes UTF-8 text into this encoding. No byte order mark is written.
    ///
    /// Characters the target cannot represent become numeric character
    /// references, which keeps the output well-formed XML.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the encoding has no encoder.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Self::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Self::Ucs4(order) => Ok(text
                .chars()
                .flat_map(|c| order.to_be(u32::from(c).to_be_bytes()))
                .collect()),
            Self::Latin1 => Ok(encode_single_byte(text, 0xFF)),
            Self::Ascii => Ok(encode_single_byte(text, 0x7F)),
            Self::Legacy(enc) => {
                if enc.output_encoding() != enc {
                    return Err(EncodingError::new(format!(
                        "no encoder for {}",
                        enc.name()
                    )));
                }
                let (bytes, _, unmappable) = enc.encode(text);
                if unmappable {
                    debug!(
                        target: "helium::encoding",
                        "unmappable characters written as references for {}",
                        enc.name()
                    );
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

fn decode_with<'a>(enc: &'static Encoding, bytes: &'a [u8]) -> Result<Cow<'a, str>, EncodingError> {
    enc.decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| EncodingError::new(format!("malformed byte sequence for {}", enc.name())))
}

fn decode_ucs4(order: Ucs4Order, bytes: &[u8]) -> Result<String, EncodingError> {
    if bytes.len() % 4 != 0 {
        return Err(EncodingError::new("truncated UCS-4 code unit"));
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let unit = order.to_be([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let cp = u32::from_be_bytes(unit);
        let c = char::from_u32(cp)
            .ok_or_else(|| EncodingError::new(format!("invalid UCS-4 code point 0x{cp:X}")))?;
        out.push(c);
    }
    Ok(out)
}

fn encode_single_byte(text: &str, max: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let cp = u32::from(c);
        if cp <= max {
            // cp fits in a byte here
            #[allow(clippy::cast_possible_truncation)]
            out.push(cp as u8);
        } else {
            out.extend_from_slice(format!("&#{cp};").as_bytes());
        }
    }
    out
}

// --- Registry ---

/// Case-insensitive lookup from encoding names to codecs.
///
/// The parser consults it for the `encoding=` pseudo-attribute, the
/// serializer for the document's encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingRegistry;

impl EncodingRegistry {
    /// Looks up a codec by name. Returns `None` for unknown or unsupported
    /// encodings.
    ///
    /// ```
    /// use helium::encoding::{Codec, EncodingRegistry};
    ///
    /// assert_eq!(EncodingRegistry::lookup("utf-8"), Some(Codec::Utf8));
    /// assert!(EncodingRegistry::lookup("EUC-JP").is_some());
    /// assert!(EncodingRegistry::lookup("x-no-such").is_none());
    /// ```
    #[must_use]
    pub fn lookup(name: &str) -> Option<Codec> {
        let lower = name.trim().to_ascii_lowercase();
        let codec = match lower.as_str() {
            "utf-8" | "utf8" => Codec::Utf8,
            // Without a byte order mark UTF-16 is big-endian.
            "utf-16" | "utf16" | "utf-16be" | "unicodefffe" => Codec::Utf16Be,
            "utf-16le" | "unicode" => Codec::Utf16Le,
            "ucs-4" | "ucs4" | "iso-10646-ucs-4" | "utf-32" | "utf-32be" | "ucs-4be" => {
                Codec::Ucs4(Ucs4Order::BigEndian)
            }
            "utf-32le" | "ucs-4le" => Codec::Ucs4(Ucs4Order::LittleEndian),
            "ucs-4-2143" => Codec::Ucs4(Ucs4Order::Unusual2143),
            "ucs-4-3412" => Codec::Ucs4(Ucs4Order::Unusual3412),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" => Codec::Latin1,
            "us-ascii" | "ascii" => Codec::Ascii,
            _ => {
                let enc = Encoding::for_label_no_replacement(lower.as_bytes())?;
                if enc == encoding_rs::UTF_8 {
                    Codec::Utf8
                } else if enc == encoding_rs::UTF_16LE {
                    Codec::Utf16Le
                } else if enc == encoding_rs::UTF_16BE {
                    Codec::Utf16Be
                } else {
                    Codec::Legacy(enc)
                }
            }
        };
        Some(codec)
    }

    /// Decodes `bytes` with the named encoding.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the name is unknown or the bytes are
    /// malformed for that encoding.
    pub fn decode<'a>(name: &str, bytes: &'a [u8]) -> Result<Cow<'a, str>, EncodingError> {
        Self::lookup(name)
            .ok_or_else(|| EncodingError::new(format!("unsupported encoding: {name}")))?
            .decode(bytes)
    }

    /// Encodes UTF-8 text into the named encoding. An empty name means
    /// UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the name is unknown or has no encoder.
    pub fn encode(name: &str, text: &str) -> Result<Vec<u8>, EncodingError> {
        if name.is_empty() {
            return Ok(text.as_bytes().to_vec());
        }
        Self::lookup(name)
            .ok_or_else(|| EncodingError::new(format!("unsupported encoding: {name}")))?
            .encode(text)
    }
}

// --- Input preparation ---

/// Parser input after signature detection and decoding.
#[derive(Debug)]
pub(crate) struct PreparedInput<'a> {
    /// The document as UTF-8, signature removed.
    pub text: Cow<'a, str>,
    /// The codec the input was decoded with.
    pub codec: Codec,
}

/// Detects the input encoding and decodes the whole document to UTF-8.
pub(crate) fn prepare_input(bytes: &[u8]) -> Result<PreparedInput<'_>, ParseError> {
    let (name, consumed) = detect_encoding(bytes).unwrap_or((UTF8, 0));
    if bytes.len() <= consumed {
        return Err(ParseError::new(
            ErrorKind::EmptyDocument,
            "document is empty",
        ));
    }

    let (codec, body) = match name {
        EBCDIC => {
            return Err(ParseError::new(
                ErrorKind::InvalidEncoding,
                "EBCDIC input is not supported",
            ))
        }
        // The sniffed UCS-4 bytes are the first '<', so decoding starts at 0.
        UCS4_BE => (Codec::Ucs4(Ucs4Order::BigEndian), bytes),
        UCS4_LE => (Codec::Ucs4(Ucs4Order::LittleEndian), bytes),
        UCS4_2143 => (Codec::Ucs4(Ucs4Order::Unusual2143), bytes),
        UCS4_3412 => (Codec::Ucs4(Ucs4Order::Unusual3412), bytes),
        UTF16_LE => (Codec::Utf16Le, &bytes[consumed..]),
        UTF16_BE => (Codec::Utf16Be, &bytes[consumed..]),
        _ => (Codec::Utf8, &bytes[consumed..]),
    };
    let had_signature = consumed > 0 || codec != Codec::Utf8;

    // Without a signature the declaration is the only source of truth, and
    // it is readable as ASCII whatever the real encoding is.
    if !had_signature {
        if let Some(declared) = sniff_declared_encoding(body) {
            let declared_codec = EncodingRegistry::lookup(&declared).ok_or_else(|| {
                ParseError::new(
                    ErrorKind::InvalidEncoding,
                    format!("unsupported encoding {declared}"),
                )
            })?;
            if !declared_codec.is_utf8() {
                debug!(target: "helium::encoding", "switching to declared encoding {declared}");
                let text = declared_codec
                    .decode(body)
                    .map_err(|e| ParseError::new(ErrorKind::InvalidEncoding, e.message))?;
                return Ok(PreparedInput {
                    text,
                    codec: declared_codec,
                });
            }
        }
    }

    debug!(target: "helium::encoding", "input encoding {}", codec.name());
    let text = match codec.decode(body) {
        Ok(text) => text,
        Err(e) if codec.is_utf8() => {
            let offset = std::str::from_utf8(body).err().map_or(0, |u| u.valid_up_to());
            return Err(invalid_utf8_at(body, offset, &e));
        }
        Err(e) => return Err(ParseError::new(ErrorKind::InvalidEncoding, e.message)),
    };
    Ok(PreparedInput { text, codec })
}

/// Builds an `InvalidChar` error positioned at the first bad UTF-8 byte.
fn invalid_utf8_at(body: &[u8], offset: usize, err: &EncodingError) -> ParseError {
    let prefix = String::from_utf8_lossy(&body[..offset]);
    let line_start = prefix.rfind('\n').map_or(0, |p| p + 1);
    let line = u32::try_from(prefix.matches('\n').count() + 1).unwrap_or(u32::MAX);
    let column =
        u32::try_from(prefix[line_start..].chars().count() + 1).unwrap_or(u32::MAX);
    let context: String = prefix[line_start..].chars().rev().take(80).collect();
    let context: String = context.chars().rev().collect();
    ParseError::new(ErrorKind::InvalidChar, err.message.clone()).at(
        SourceLocation {
            line,
            column,
            byte_offset: offset,
        },
        context,
    )
}

/// Reads the `encoding` pseudo-attribute of a leading XML declaration from
/// raw bytes treated as ASCII.
fn sniff_declared_encoding(bytes: &[u8]) -> Option<String> {
    let scan = &bytes[..bytes.len().min(256)];
    if !scan.starts_with(b"<?xml") {
        return None;
    }
    let decl_end = memchr::memmem::find(scan, b"?>")?;
    let decl = &scan[..decl_end];
    let pos = memchr::memmem::find(decl, b"encoding")?;
    let rest = trim_ascii_start(&decl[pos + b"encoding".len()..]);
    let rest = trim_ascii_start(rest.strip_prefix(b"=")?);
    let (&quote, rest) = rest.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let end = memchr::memchr(quote, rest)?;
    std::str::from_utf8(&rest[..end]).ok().map(str::to_string)
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
