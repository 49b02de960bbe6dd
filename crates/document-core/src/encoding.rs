//! Encoding pipeline.
//!
//! Converts raw file bytes to and from the internal UTF-8 representation:
//!
//! - byte-order-mark scanning (UTF-32 marks before UTF-16, since `FF FE` is a prefix of the
//!   UTF-32LE mark)
//! - charset detection: BOM, then plain UTF-8 validation, then a statistical fallback
//! - forced-charset loading, including the "None" passthrough sentinel
//! - save-time re-conversion with byte-accurate diagnostics for unencodable characters
//!
//! The supported charset set is closed and small, so the converters live here rather than
//! behind an external transcoding dependency.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::DocumentError;

/// A named character encoding the pipeline can read and write.
///
/// `None` is the "no encoding" sentinel: bytes pass through unconverted and no BOM handling is
/// performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    /// UTF-8.
    Utf8,
    /// UTF-16 little endian.
    Utf16Le,
    /// UTF-16 big endian.
    Utf16Be,
    /// UTF-32 little endian.
    Utf32Le,
    /// UTF-32 big endian.
    Utf32Be,
    /// ISO-8859-1.
    Latin1,
    /// Treat bytes as opaque, no conversion.
    None,
}

impl Charset {
    /// The user-facing charset name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf32Le => "UTF-32LE",
            Self::Utf32Be => "UTF-32BE",
            Self::Latin1 => "ISO-8859-1",
            Self::None => "None",
        }
    }

    /// Parse a user-facing charset name.
    pub fn from_name(name: &str) -> Option<Self> {
        let all = [
            Self::Utf8,
            Self::Utf16Le,
            Self::Utf16Be,
            Self::Utf32Le,
            Self::Utf32Be,
            Self::Latin1,
            Self::None,
        ];
        all.into_iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Whether this is a Unicode charset (the only kind a byte-order mark is written for).
    pub fn is_unicode(self) -> bool {
        matches!(
            self,
            Self::Utf8 | Self::Utf16Le | Self::Utf16Be | Self::Utf32Le | Self::Utf32Be
        )
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of charset detection on loaded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    /// The detected charset.
    pub charset: Charset,
    /// Whether a byte-order mark was found (and stripped from `text`).
    pub has_bom: bool,
    /// The content converted to UTF-8.
    pub text: String,
}

/// Scan for a recognized Unicode byte-order mark.
///
/// Returns the charset the mark announces and the mark's byte length.
pub fn scan_bom(bytes: &[u8]) -> Option<(Charset, usize)> {
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        Some((Charset::Utf32Be, 4))
    } else if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        Some((Charset::Utf32Le, 4))
    } else if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some((Charset::Utf8, 3))
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some((Charset::Utf16Be, 2))
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some((Charset::Utf16Le, 2))
    } else {
        None
    }
}

/// The byte-order mark `charset` writes at the start of a file.
pub fn bom_bytes(charset: Charset) -> &'static [u8] {
    match charset {
        Charset::Utf8 => &[0xEF, 0xBB, 0xBF],
        Charset::Utf16Le => &[0xFF, 0xFE],
        Charset::Utf16Be => &[0xFE, 0xFF],
        Charset::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
        Charset::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
        Charset::Latin1 | Charset::None => &[],
    }
}

/// Decode `bytes` from `charset` into UTF-8.
///
/// On failure, returns the byte offset of the first undecodable sequence.
fn decode(bytes: &[u8], charset: Charset) -> Result<String, usize> {
    match charset {
        Charset::Utf8 | Charset::None => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| e.valid_up_to()),
        Charset::Utf16Le | Charset::Utf16Be => decode_utf16(bytes, charset == Charset::Utf16Le),
        Charset::Utf32Le | Charset::Utf32Be => decode_utf32(bytes, charset == Charset::Utf32Le),
        Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

fn decode_utf16(bytes: &[u8], little_endian: bool) -> Result<String, usize> {
    if bytes.len() % 2 != 0 {
        return Err(bytes.len() - 1);
    }
    let units = bytes.chunks_exact(2).map(|c| {
        if little_endian {
            u16::from_le_bytes([c[0], c[1]])
        } else {
            u16::from_be_bytes([c[0], c[1]])
        }
    });

    let mut out = String::with_capacity(bytes.len() / 2);
    let mut consumed_units = 0usize;
    for result in char::decode_utf16(units) {
        match result {
            Ok(ch) => {
                consumed_units += ch.len_utf16();
                out.push(ch);
            }
            Err(_) => return Err(consumed_units * 2),
        }
    }
    Ok(out)
}

fn decode_utf32(bytes: &[u8], little_endian: bool) -> Result<String, usize> {
    if bytes.len() % 4 != 0 {
        return Err(bytes.len() - bytes.len() % 4);
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let value = if little_endian {
            u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        } else {
            u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        };
        match char::from_u32(value) {
            Some(ch) => out.push(ch),
            None => return Err(i * 4),
        }
    }
    Ok(out)
}

/// Encode UTF-8 `text` into `charset`.
fn encode(text: &str, charset: Charset) -> Result<Vec<u8>, DocumentError> {
    match charset {
        Charset::Utf8 | Charset::None => Ok(text.as_bytes().to_vec()),
        Charset::Utf16Le => Ok(text
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect()),
        Charset::Utf16Be => Ok(text
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect()),
        Charset::Utf32Le => Ok(text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect()),
        Charset::Utf32Be => Ok(text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect()),
        Charset::Latin1 => {
            let mut out = Vec::with_capacity(text.len());
            for (offset, ch) in text.char_indices() {
                let code = ch as u32;
                if code > 0xFF {
                    return Err(DocumentError::ConversionFailed {
                        offset,
                        context: context_snippet(text, offset),
                    });
                }
                out.push(code as u8);
            }
            Ok(out)
        }
    }
}

/// Take one grapheme of decoded context at `offset`, for user-facing diagnostics.
fn context_snippet(text: &str, offset: usize) -> String {
    text[offset..]
        .graphemes(true)
        .next()
        .unwrap_or_default()
        .to_owned()
}

fn raw_context_snippet(bytes: &[u8], offset: usize) -> String {
    let end = (offset + 4).min(bytes.len());
    String::from_utf8_lossy(&bytes[offset..end]).into_owned()
}

/// If `text` starts with a BOM character, strip it and report its presence.
fn strip_bom_char(text: String) -> (bool, String) {
    match text.strip_prefix('\u{FEFF}') {
        Some(rest) => (true, rest.to_owned()),
        None => (false, text),
    }
}

/// Detect the charset of `bytes` and convert them to UTF-8.
///
/// `valid_len` is the validated string length (up to the first NUL byte); NUL-free encodings are
/// decoded from that prefix only, which is how embedded-NUL truncation takes effect.
///
/// The algorithm, in order:
/// 1. empty input is UTF-8 without BOM
/// 2. a recognized BOM fixes the charset; if the remainder fails to convert, the BOM finding is
///    discarded and detection continues
/// 3. plain UTF-8 validation (the common case)
/// 4. statistical detection: NUL-distribution for BOM-less UTF-16, Latin-1 for other texty
///    bytes, otherwise [`DocumentError::EncodingUndetected`]
pub fn detect(bytes: &[u8], valid_len: usize) -> Result<Detected, DocumentError> {
    if bytes.is_empty() {
        return Ok(Detected {
            charset: Charset::Utf8,
            has_bom: false,
            text: String::new(),
        });
    }

    let valid_len = valid_len.min(bytes.len());

    if let Some((charset, bom_len)) = scan_bom(bytes) {
        let decoded = if charset == Charset::Utf8 {
            let end = valid_len.max(bom_len);
            decode(&bytes[bom_len..end], Charset::Utf8).ok()
        } else {
            decode(&bytes[bom_len..], charset).ok()
        };
        if let Some(text) = decoded {
            return Ok(Detected {
                charset,
                has_bom: true,
                text,
            });
        }
        // The BOM lied (or the remainder is corrupt): fall through to plain detection.
    }

    // Embedded NUL bytes can hide BOM-less UTF-16 behind a trivially valid truncated UTF-8
    // prefix, so the NUL-distribution check runs before the truncated view is trusted.
    if valid_len < bytes.len()
        && let Some(found) = detect_bomless_utf16(bytes)
    {
        return Ok(found);
    }

    if let Ok(text) = decode(&bytes[..valid_len], Charset::Utf8) {
        return Ok(Detected {
            charset: Charset::Utf8,
            has_bom: false,
            text,
        });
    }

    detect_latin1(bytes, valid_len).ok_or(DocumentError::EncodingUndetected)
}

/// BOM-less UTF-16: for mostly-Latin text one byte of every pair is NUL, and the parity of the
/// NUL bytes gives away the endianness.
fn detect_bomless_utf16(bytes: &[u8]) -> Option<Detected> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }
    let even_nuls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_nuls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let pairs = bytes.len() / 2;

    let charset = if even_nuls * 2 > pairs && odd_nuls == 0 {
        Charset::Utf16Be
    } else if odd_nuls * 2 > pairs && even_nuls == 0 {
        Charset::Utf16Le
    } else {
        return None;
    };
    let text = decode(bytes, charset).ok()?;
    Some(Detected {
        charset,
        has_bom: false,
        text,
    })
}

/// Latin-1 fallback, but only when the data still looks like text.
fn detect_latin1(bytes: &[u8], valid_len: usize) -> Option<Detected> {
    let slice = &bytes[..valid_len];
    let control = slice
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C))
        .count();
    if control * 10 <= slice.len() {
        if let Ok(text) = decode(slice, Charset::Latin1) {
            return Some(Detected {
                charset: Charset::Latin1,
                has_bom: false,
                text,
            });
        }
    }

    None
}

/// Convert `bytes` to UTF-8 using a caller-forced charset.
///
/// - the `None` sentinel passes bytes through unconverted (lossily where they are not UTF-8)
///   with `has_bom = false`
/// - `Utf8` validates in place and reports [`DocumentError::InvalidUtf8`]
/// - anything else is converted, reporting [`DocumentError::ConversionFailed`]
///
/// A BOM is re-detected in the converted text for bookkeeping and stripped.
pub fn detect_forced(
    bytes: &[u8],
    valid_len: usize,
    forced: Charset,
) -> Result<(bool, String), DocumentError> {
    let valid_len = valid_len.min(bytes.len());
    match forced {
        Charset::None => Ok((
            false,
            String::from_utf8_lossy(&bytes[..valid_len]).into_owned(),
        )),
        Charset::Utf8 => {
            let text = decode(&bytes[..valid_len], Charset::Utf8)
                .map_err(|_| DocumentError::InvalidUtf8)?;
            Ok(strip_bom_char(text))
        }
        charset => {
            let input = if matches!(charset, Charset::Latin1) {
                &bytes[..valid_len]
            } else {
                bytes
            };
            let text = decode(input, charset).map_err(|offset| DocumentError::ConversionFailed {
                offset,
                context: raw_context_snippet(input, offset),
            })?;
            Ok(strip_bom_char(text))
        }
    }
}

/// Encode UTF-8 `text` into the bytes to write for `charset`.
///
/// If `has_bom` is set and the charset is Unicode, the appropriate byte-order mark is written
/// first. Conversion failures report the byte offset (into `text`) and a one-grapheme decoded
/// context snippet of the first unencodable character.
pub fn encode_for_save(
    text: &str,
    charset: Charset,
    has_bom: bool,
) -> Result<Vec<u8>, DocumentError> {
    let mut out = if has_bom && charset.is_unicode() {
        bom_bytes(charset).to_vec()
    } else {
        Vec::new()
    };
    out.extend(encode(text, charset)?);
    Ok(out)
}
