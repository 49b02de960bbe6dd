//! Line ending helpers.
//!
//! Documents keep their on-disk line endings in the buffer; the mode detected at load time is
//! recorded on the buffer so new lines and save-time normalizations use the same sequence.

use serde::{Deserialize, Serialize};

/// The newline convention of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EolMode {
    /// Unix-style LF (`'\n'`).
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
    /// Classic Mac CR (`'\r'`).
    Cr,
}

impl EolMode {
    /// Detect the dominant line ending in `text`, falling back to `default` when the text
    /// contains no line breaks at all.
    ///
    /// Each convention is counted separately; CRLF wins ties over the single-character modes.
    pub fn detect_in_text(text: &str, default: EolMode) -> Self {
        let mut crlf = 0usize;
        let mut cr = 0usize;
        let mut lf = 0usize;

        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        crlf += 1;
                        i += 1;
                    } else {
                        cr += 1;
                    }
                }
                b'\n' => lf += 1,
                _ => {}
            }
            i += 1;
        }

        if crlf == 0 && cr == 0 && lf == 0 {
            default
        } else if crlf >= cr && crlf >= lf {
            Self::Crlf
        } else if cr > lf {
            Self::Cr
        } else {
            Self::Lf
        }
    }

    /// The byte sequence for this mode.
    pub fn sequence(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// The length of the newline sequence in bytes.
    pub fn char_len(self) -> usize {
        self.sequence().len()
    }

    /// Human-readable mode name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "LF",
            Self::Crlf => "CRLF",
            Self::Cr => "CR",
        }
    }

    /// Convert all line endings in `text` to this mode.
    pub fn convert(self, text: &str) -> String {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        match self {
            Self::Lf => normalized,
            Self::Crlf => normalized.replace('\n', "\r\n"),
            Self::Cr => normalized.replace('\n', "\r"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dominant() {
        assert_eq!(EolMode::detect_in_text("a\nb\nc\r\n", EolMode::Lf), EolMode::Lf);
        assert_eq!(EolMode::detect_in_text("a\r\nb\r\nc\n", EolMode::Lf), EolMode::Crlf);
        assert_eq!(EolMode::detect_in_text("a\rb\rc", EolMode::Lf), EolMode::Cr);
        assert_eq!(EolMode::detect_in_text("plain", EolMode::Crlf), EolMode::Crlf);
    }

    #[test]
    fn test_crlf_wins_ties() {
        assert_eq!(EolMode::detect_in_text("a\r\nb\n", EolMode::Lf), EolMode::Crlf);
    }

    #[test]
    fn test_convert() {
        assert_eq!(EolMode::Crlf.convert("a\nb\rc\r\nd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(EolMode::Lf.convert("a\r\nb\r"), "a\nb\n");
    }
}
