//! Configuration for the document core.
//!
//! One flat struct covering file handling defaults, save-time normalizations, indentation
//! policy, and the staleness/search prompting knobs. Hosts typically deserialize this from
//! their settings store and hand it to [`crate::DocumentManager`].

use serde::{Deserialize, Serialize};

use crate::encoding::Charset;
use crate::line_ending::EolMode;

/// Behavior knobs for document loading, saving, and searching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Line ending used for new files and when a loaded file contains no line breaks.
    pub default_eol: EolMode,
    /// Charset assigned to newly created documents.
    pub default_new_encoding: Charset,
    /// When set, every open uses this charset instead of auto-detection (an explicit
    /// per-open charset still wins).
    pub default_open_encoding: Option<Charset>,

    /// Replace tabs with spaces before saving (skipped for tab-mandatory filetypes).
    pub replace_tabs: bool,
    /// Strip trailing spaces and tabs from every line before saving.
    pub strip_trailing_spaces: bool,
    /// Make sure saved files end with a newline.
    pub final_new_line: bool,

    /// Width of one tab stop, in spaces.
    pub tab_width: usize,
    /// Default indentation mode: tabs when `true`, spaces otherwise.
    pub use_tabs: bool,
    /// Auto-detect tabs-vs-spaces from file content on open.
    pub detect_indent: bool,

    /// Minimum seconds between on-disk staleness checks per document; `0` disables checking.
    pub disk_check_timeout_secs: u64,

    /// Wrap around on a failed search without asking the confirmation policy.
    pub always_wrap_search: bool,
    /// Compare document paths case-insensitively (for case-insensitive filesystems).
    pub case_insensitive_paths: bool,
    /// Save through a temporary file renamed over the target, instead of writing in place.
    pub atomic_save: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            default_eol: EolMode::Lf,
            default_new_encoding: Charset::Utf8,
            default_open_encoding: None,
            replace_tabs: false,
            strip_trailing_spaces: false,
            final_new_line: false,
            tab_width: 4,
            use_tabs: true,
            detect_indent: true,
            disk_check_timeout_secs: 30,
            always_wrap_search: false,
            case_insensitive_paths: false,
            atomic_save: true,
        }
    }
}
