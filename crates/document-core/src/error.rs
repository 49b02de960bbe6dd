//! Error taxonomy for the document core.
//!
//! Every failure in this crate is recoverable from the caller's point of view: load and save
//! failures leave the document untouched, and a user-visible message is emitted alongside the
//! returned error. Only broken internal invariants (e.g. force-closing a still-dirty document)
//! are treated as programming faults and assert.

use thiserror::Error;

/// Errors returned by the load/save pipelines and the encoding converters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The file's character encoding could not be determined.
    #[error("the file does not look like a text file or the file encoding is not supported")]
    EncodingUndetected,

    /// The data is not valid UTF-8 although UTF-8 was requested.
    #[error("the file is not valid UTF-8")]
    InvalidUtf8,

    /// Converting between UTF-8 and the document charset failed.
    ///
    /// `offset` is the byte offset (into the UTF-8 text, or the raw input when decoding) of the
    /// first offending sequence; `context` is a short decoded snippet for diagnostics.
    #[error("conversion failed at byte {offset} (near {context:?})")]
    ConversionFailed {
        /// Byte offset of the first bad sequence.
        offset: usize,
        /// A short decoded snippet around the bad sequence.
        context: String,
    },

    /// The file could not be opened or stat'ed. Carries the OS error text.
    #[error("could not access file: {0}")]
    FileNotAccessible(String),

    /// Writing the file failed. Carries the OS error text.
    #[error("i/o error: {0}")]
    Io(String),

    /// A save was requested for a document that has no filename yet.
    #[error("the document has no filename")]
    NoFilename,
}
