//! Filetype descriptors.
//!
//! A filetype is a shared, immutable descriptor (`Arc<FileType>`): documents reference one but
//! never own it. The core only cares about two traits of a filetype — whether it mandates tab
//! indentation (make-like files) and whether its syntax uses the shared type-keyword list
//! (which decides restyling after a batch open). Everything else about filetypes (lexers,
//! tag parsers) belongs to collaborators.

use std::path::Path;
use std::sync::Arc;

/// A shared filetype descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    /// Display name, e.g. `"Rust"` or `"Make"`.
    pub name: String,
    /// File extensions (without the dot) mapped to this type.
    pub extensions: Vec<String>,
    /// Exact basenames mapped to this type, e.g. `"Makefile"`.
    pub filenames: Vec<String>,
    /// This filetype always indents with tabs, regardless of detection.
    pub forces_tabs: bool,
    /// This filetype's styling uses the shared type-keyword list.
    pub uses_type_keywords: bool,
}

impl FileType {
    /// Create a filetype with the given display name and no detection rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            filenames: Vec::new(),
            forces_tabs: false,
            uses_type_keywords: false,
        }
    }

    /// Add extensions (without dots) this filetype claims.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions
            .extend(extensions.iter().map(|e| (*e).to_owned()));
        self
    }

    /// Add exact basenames this filetype claims.
    pub fn with_filenames(mut self, filenames: &[&str]) -> Self {
        self.filenames
            .extend(filenames.iter().map(|f| (*f).to_owned()));
        self
    }

    /// Mark this filetype as tab-mandatory.
    pub fn with_forced_tabs(mut self) -> Self {
        self.forces_tabs = true;
        self
    }

    /// Mark this filetype's styling as type-keyword dependent.
    pub fn with_type_keywords(mut self) -> Self {
        self.uses_type_keywords = true;
        self
    }

    /// Pick the filetype for `path`: exact basenames win over extensions.
    pub fn detect_from_path(types: &[Arc<FileType>], path: &str) -> Option<Arc<FileType>> {
        let path = Path::new(path);
        if let Some(name) = path.file_name().map(|n| n.to_string_lossy()) {
            for ft in types {
                if ft.filenames.iter().any(|f| f == name.as_ref()) {
                    return Some(ft.clone());
                }
            }
        }
        if let Some(ext) = path.extension().map(|e| e.to_string_lossy()) {
            for ft in types {
                if ft.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                    return Some(ft.clone());
                }
            }
        }
        None
    }
}
