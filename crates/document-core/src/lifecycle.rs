//! Document lifecycle: create, open, reload, save, close, and staleness polling.
//!
//! [`DocumentManager`] owns the registry, the configuration, the event notifier, and the
//! injected confirmation policy, and drives every state transition:
//!
//! ```text
//! Unopened -> Loading -> Open -> (Reloading -> Open) -> Closing -> Closed (slot freed)
//! ```
//!
//! Load and save failures never leave a document half-updated: on any failure the previously
//! valid fields (encoding, content, mtime) stay untouched and freshly allocated documents are
//! not registered with content. All operations run to completion on the calling thread; the
//! only suspension points are the policy prompts.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::warn;

use crate::buffer::{SearchFlags, TextBuffer};
use crate::config::DocumentConfig;
use crate::document::{Document, UndoAction};
use crate::encoding::{self, Charset};
use crate::error::DocumentError;
use crate::events::{CloseDecision, ConfirmPolicy, DocumentEvent, Notifier};
use crate::filetype::FileType;
use crate::line_ending::EolMode;
use crate::registry::{self, DocumentId, DocumentRegistry};
use crate::search;

/// Transient per-load state: the converted text plus everything the loader learned about the
/// on-disk bytes. Consumed by the time the open operation returns.
struct FileData {
    text: String,
    charset: Charset,
    has_bom: bool,
    mtime: Option<SystemTime>,
    forced_readonly: bool,
}

/// Reads and converts a file, handling BOM, forced encodings, and embedded-NUL truncation.
fn load_text_file(path: &Path, forced: Option<Charset>) -> Result<FileData, DocumentError> {
    let meta = fs::metadata(path).map_err(|e| DocumentError::FileNotAccessible(e.to_string()))?;
    let mtime = meta.modified().ok();
    let bytes = fs::read(path).map_err(|e| DocumentError::FileNotAccessible(e.to_string()))?;

    let size = meta.len() as usize;
    let valid_len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

    // A validated length short of the file size means an embedded NUL. That only matters for
    // encodings that never contain NUL bytes; wide encodings are full of them. A zero size is
    // tolerated for /proc-style files that stat as empty.
    let bom_kind = encoding::scan_bom(&bytes).map(|(charset, _)| charset);
    let nul_free_kind = matches!(bom_kind, None | Some(Charset::Utf8));
    let forced_readonly = valid_len != size && size != 0 && nul_free_kind;

    let (charset, has_bom, text) = match forced {
        Some(charset) => {
            let (has_bom, text) = encoding::detect_forced(&bytes, valid_len, charset)?;
            (charset, has_bom, text)
        }
        None => {
            let detected = encoding::detect(&bytes, valid_len)?;
            (detected.charset, detected.has_bom, detected.text)
        }
    };

    Ok(FileData {
        text,
        charset,
        has_bom,
        mtime,
        forced_readonly,
    })
}

/// Write `data` to `path`, either in place or through a temporary file in the same directory
/// that is renamed over the target once fully written.
fn write_data_to_disk(path: &Path, data: &[u8], atomic: bool) -> Result<(), String> {
    if atomic {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
        tmp.write_all(data).map_err(|e| e.to_string())?;
        tmp.persist(path).map_err(|e| e.to_string())?;
        Ok(())
    } else {
        fs::write(path, data).map_err(|e| e.to_string())
    }
}

/// Scan every line's first one or two characters and pick tabs-vs-spaces with a 2:1 hysteresis
/// biased toward the configured default, so a handful of stray indentation characters cannot
/// flip the mode.
fn detect_use_tabs<B: TextBuffer>(buffer: &B, default_use_tabs: bool) -> bool {
    let mut tabs = 0usize;
    let mut spaces = 0usize;

    for line in 0..buffer.line_count() {
        let pos = buffer.position_from_line(line);
        let one = buffer.position_after(pos);
        let two = buffer.position_after(one);
        let head = buffer.get_text_range(pos, two);
        let mut chars = head.chars();
        match chars.next() {
            Some('\t') => tabs += 1,
            // Require at least two spaces so a single alignment space doesn't count.
            Some(' ') if chars.next() == Some(' ') => spaces += 1,
            _ => {}
        }
    }

    if tabs == 0 && spaces == 0 {
        return default_use_tabs;
    }
    if default_use_tabs {
        !(spaces > tabs * 2)
    } else {
        tabs > spaces * 2
    }
}

/// Owns all open documents and drives their lifecycle.
pub struct DocumentManager<B: TextBuffer> {
    registry: DocumentRegistry<B>,
    config: DocumentConfig,
    notifier: Notifier,
    policy: Box<dyn ConfirmPolicy>,
    filetypes: Vec<Arc<FileType>>,
    buffer_factory: Box<dyn FnMut() -> B>,
    keyword_check: Option<Box<dyn FnMut() -> bool>>,
    batch_snapshot: Option<HashSet<DocumentId>>,
    closing_all: bool,
}

impl<B: TextBuffer> std::fmt::Debug for DocumentManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("document_count", &self.registry.len())
            .field("filetype_count", &self.filetypes.len())
            .field("batch_active", &self.batch_snapshot.is_some())
            .finish()
    }
}

impl<B: TextBuffer> DocumentManager<B> {
    /// Create a manager with the given configuration, confirmation policy, and a factory for
    /// fresh buffer instances.
    pub fn new<F>(config: DocumentConfig, policy: Box<dyn ConfirmPolicy>, buffer_factory: F) -> Self
    where
        F: FnMut() -> B + 'static,
    {
        let registry = DocumentRegistry::new(config.case_insensitive_paths);
        Self {
            registry,
            config,
            notifier: Notifier::new(),
            policy,
            filetypes: Vec::new(),
            buffer_factory: Box::new(buffer_factory),
            keyword_check: None,
            batch_snapshot: None,
            closing_all: false,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&DocumentEvent) + 'static,
    {
        self.notifier.subscribe(callback);
    }

    /// Install the host's type-keyword verdict hook, consulted when a restyle batch ends.
    pub fn set_type_keyword_check<F>(&mut self, check: F)
    where
        F: FnMut() -> bool + 'static,
    {
        self.keyword_check = Some(Box::new(check));
    }

    /// Register a shared filetype descriptor.
    pub fn register_filetype(&mut self, file_type: FileType) -> Arc<FileType> {
        let shared = Arc::new(file_type);
        self.filetypes.push(shared.clone());
        shared
    }

    /// The registered filetypes.
    pub fn filetypes(&self) -> &[Arc<FileType>] {
        &self.filetypes
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if no documents are open.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Resolve a document handle.
    pub fn document(&self, id: DocumentId) -> Option<&Document<B>> {
        self.registry.get(id)
    }

    /// Resolve a document handle mutably.
    pub fn document_mut(&mut self, id: DocumentId) -> Option<&mut Document<B>> {
        self.registry.get_mut(id)
    }

    /// Live document ids in tab order.
    pub fn documents_in_tab_order(&self) -> Vec<DocumentId> {
        self.registry.ids_in_tab_order()
    }

    /// Two-phase path lookup (display path, then canonicalized real path).
    pub fn find_by_path(&self, path: &str) -> Option<DocumentId> {
        self.registry.find_by_path(path)
    }

    /// Find the document owning a buffer.
    pub fn find_by_buffer(&self, buffer: crate::buffer::BufferId) -> Option<DocumentId> {
        self.registry.find_by_buffer(buffer)
    }

    /// The document at a UI tab position.
    pub fn find_by_position(&self, position: usize) -> Option<DocumentId> {
        self.registry.find_by_position(position)
    }

    /// The UI tab position of a document.
    pub fn position_of(&self, id: DocumentId) -> Option<usize> {
        self.registry.position_of(id)
    }

    /// Allocate a document slot with a fresh buffer. The new record is valid (and observable)
    /// only once fully initialized.
    fn create(&mut self, display_path: Option<String>) -> DocumentId {
        // Opening over a single pristine untitled document replaces it.
        if self.registry.len() == 1
            && let Some(only) = self.registry.find_by_position(0)
            && self
                .registry
                .get(only)
                .is_some_and(|d| d.display_path().is_none() && !d.is_changed())
        {
            self.close(only);
        }

        let buffer = (self.buffer_factory)();
        let config = self.config.clone();
        let id = self
            .registry
            .allocate(|id| Document::new(id, buffer, display_path, &config));
        self.notifier.emit(DocumentEvent::Created(id));
        id
    }

    /// Create a new empty (or template-seeded) document.
    ///
    /// Initial text is seeded with undo recording disabled and its line endings converted to
    /// the configured default, so a pristine new file carries no undo history and is unchanged.
    pub fn new_file(
        &mut self,
        path: Option<&str>,
        file_type: Option<Arc<FileType>>,
        text: Option<&str>,
    ) -> DocumentId {
        let id = self.create(path.map(str::to_owned));

        {
            let doc = self
                .registry
                .get_mut(id)
                .expect("freshly created document");
            let default_eol = self.config.default_eol;
            let buffer = doc.buffer_mut();
            buffer.set_undo_collection(false);
            match text {
                Some(t) => buffer.set_text(t),
                None => buffer.clear(),
            }
            buffer.set_eol_mode(default_eol);
            if text.is_some() {
                buffer.convert_eols(default_eol);
            }
            buffer.set_undo_collection(true);
            buffer.empty_undo_buffer();
            buffer.set_save_point();
            buffer.goto_pos(0);

            doc.set_use_tabs(self.config.use_tabs);
            doc.set_mtime(Some(SystemTime::now()));
            doc.set_encoding_raw(self.config.default_new_encoding);
            doc.set_bom_raw(false);
            doc.store_saved_encoding();
            doc.update_changed_state();
        }

        let use_ft =
            file_type.or_else(|| path.and_then(|p| FileType::detect_from_path(&self.filetypes, p)));
        self.set_filetype(id, use_ft);
        self.notifier.emit(DocumentEvent::TextChangedState(id, false));
        self.notifier.emit(DocumentEvent::Opened(id));

        let name = self
            .registry
            .get(id)
            .map(|d| d.display_name())
            .unwrap_or_default();
        self.notifier.status(format!("New file \"{name}\" opened."));
        id
    }

    /// Create a new empty document only when nothing is open.
    pub fn new_file_if_non_open(&mut self) -> Option<DocumentId> {
        if self.registry.is_empty() {
            Some(self.new_file(None, None, None))
        } else {
            None
        }
    }

    /// Open a file from disk.
    ///
    /// Re-opening an already-open path surfaces the existing document instead of creating a
    /// duplicate. `cursor_pos` places the caret after loading (0 leaves it at the start).
    /// `forced_enc` skips auto-detection; the configured default open encoding applies when
    /// neither is given.
    pub fn open_file(
        &mut self,
        path: &str,
        cursor_pos: usize,
        readonly: bool,
        file_type: Option<Arc<FileType>>,
        forced_enc: Option<Charset>,
    ) -> Result<DocumentId, DocumentError> {
        self.open_impl(None, Some(path), cursor_pos, readonly, file_type, forced_enc)
    }

    /// Open several files inside one restyle batch.
    pub fn open_files(
        &mut self,
        paths: &[&str],
        readonly: bool,
        file_type: Option<Arc<FileType>>,
        forced_enc: Option<Charset>,
    ) -> Vec<DocumentId> {
        self.begin_batch();
        let mut opened = Vec::new();
        for path in paths {
            if let Ok(id) = self.open_file(path, 0, readonly, file_type.clone(), forced_enc) {
                opened.push(id);
            }
        }
        self.end_batch();
        opened
    }

    /// Reload a document from disk, restoring the caret position. The undo ledger is cleared;
    /// the previously chosen indentation mode is kept.
    pub fn reload_file(
        &mut self,
        id: DocumentId,
        forced_enc: Option<Charset>,
    ) -> Result<DocumentId, DocumentError> {
        let (pos, readonly, file_type) = {
            let Some(doc) = self.registry.get(id) else {
                return Err(DocumentError::NoFilename);
            };
            (
                doc.buffer().selection_start(),
                doc.readonly(),
                doc.file_type().cloned(),
            )
        };
        self.open_impl(Some(id), None, pos, readonly, file_type, forced_enc)
    }

    fn open_impl(
        &mut self,
        existing: Option<DocumentId>,
        path: Option<&str>,
        cursor_pos: usize,
        readonly: bool,
        file_type: Option<Arc<FileType>>,
        forced_enc: Option<Charset>,
    ) -> Result<DocumentId, DocumentError> {
        let reload = existing.is_some();

        let display: String = match existing {
            Some(id) => {
                let Some(doc) = self.registry.get(id) else {
                    return Err(DocumentError::NoFilename);
                };
                let Some(display) = doc.display_path() else {
                    return Err(DocumentError::NoFilename);
                };
                display.to_owned()
            }
            None => {
                let path = path.expect("opening a fresh document requires a path");
                // Already open? Surface the existing document, never duplicate.
                if let Some(found) = self.registry.find_by_path(path) {
                    self.notifier
                        .emit(DocumentEvent::RecentFileAdded(path.to_owned()));
                    self.notifier.emit(DocumentEvent::Focused(found));
                    self.check_disk_status(found, true);
                    if let Some(doc) = self.registry.get_mut(found) {
                        Self::set_cursor_position(doc, cursor_pos);
                    }
                    return Ok(found);
                }
                path.to_owned()
            }
        };

        let forced = forced_enc.or(self.config.default_open_encoding);
        let filedata = match load_text_file(Path::new(&display), forced) {
            Ok(filedata) => filedata,
            Err(err) => {
                match &err {
                    DocumentError::FileNotAccessible(os) => {
                        self.notifier
                            .status(format!("Could not open file {display} ({os})"));
                    }
                    DocumentError::InvalidUtf8 | DocumentError::ConversionFailed { .. } => {
                        let charset = forced.map_or("UTF-8", Charset::name);
                        self.notifier
                            .status(format!("The file \"{display}\" is not valid {charset}."));
                        self.notifier.bell();
                    }
                    DocumentError::EncodingUndetected => {
                        self.notifier.status(format!(
                            "The file \"{display}\" does not look like a text file or the file \
                             encoding is not supported."
                        ));
                        self.notifier.bell();
                    }
                    _ => self.notifier.error(err.to_string()),
                }
                return Err(err);
            }
        };

        if filedata.forced_readonly {
            self.notifier.error(format!(
                "The file \"{display}\" could not be opened properly and has been truncated. \
                 This can occur if the file contains a NULL byte. Be aware that saving it can \
                 cause data loss.\nThe file was set to read-only."
            ));
        }

        let id = match existing {
            Some(id) => id,
            None => self.create(Some(display.clone())),
        };

        {
            let doc = self
                .registry
                .get_mut(id)
                .expect("document slot vanished during open");
            let default_eol = self.config.default_eol;
            let buffer = doc.buffer_mut();
            buffer.set_undo_collection(false);
            buffer.empty_undo_buffer();
            buffer.set_read_only(false);
            buffer.set_text(&filedata.text);
            let eol = EolMode::detect_in_text(&filedata.text, default_eol);
            buffer.set_eol_mode(eol);
            buffer.set_undo_collection(true);

            doc.set_mtime(filedata.mtime);
            doc.set_encoding_raw(filedata.charset);
            doc.set_bom_raw(filedata.has_bom);
            doc.store_saved_encoding();
            doc.set_readonly(readonly || filedata.forced_readonly);

            Self::set_cursor_position(doc, cursor_pos);

            if reload {
                doc.clear_undo_history();
                // Force re-styling even when the filetype name is unchanged; content differs.
                doc.set_file_type(None);
            } else {
                doc.set_real_path(registry::real_path_of(&display));
            }
        }

        let use_ft = if reload {
            file_type
        } else {
            file_type
                .or_else(|| FileType::detect_from_path(&self.filetypes, &display))
        };
        self.set_filetype(id, use_ft);

        if !reload {
            self.set_indentation(id);
        }

        {
            let doc = self.registry.get_mut(id).expect("document open in progress");
            doc.buffer_mut().set_save_point();
            doc.update_changed_state();
        }
        self.notifier.emit(DocumentEvent::TextChangedState(id, false));

        if reload {
            self.notifier.status(format!("File {display} reloaded."));
        } else {
            self.notifier
                .emit(DocumentEvent::RecentFileAdded(display.clone()));
            self.notifier.emit(DocumentEvent::Opened(id));
            let position = self.registry.position_of(id).map_or(0, |p| p + 1);
            let readonly_note = if readonly { ", read-only" } else { "" };
            self.notifier.status(format!(
                "File {display} opened ({position}{readonly_note})."
            ));
        }

        Ok(id)
    }

    fn set_cursor_position(doc: &mut Document<B>, pos: usize) {
        if pos == 0 {
            return;
        }
        let line = doc.buffer().line_from_position(pos);
        doc.buffer_mut().goto_pos(pos);
        doc.buffer_mut().scroll_to_line(line, 0.5);
    }

    /// Apply indentation auto-detection to a freshly opened document.
    fn set_indentation(&mut self, id: DocumentId) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        let forces_tabs = doc.file_type().is_some_and(|ft| ft.forces_tabs);
        let use_tabs = if forces_tabs {
            true
        } else if !self.config.detect_indent {
            self.config.use_tabs
        } else {
            detect_use_tabs(doc.buffer(), self.config.use_tabs)
        };
        let announce =
            !forces_tabs && self.config.detect_indent && use_tabs != self.config.use_tabs;
        doc.set_use_tabs(use_tabs);

        if announce {
            let mode = if use_tabs { "Tabs" } else { "Spaces" };
            self.notifier.status(format!("Setting {mode} indentation mode."));
        }
    }

    /// Change a document's filetype, triggering re-tagging/re-styling notifications. During a
    /// restyle batch the styling notification is deferred to [`DocumentManager::end_batch`].
    pub fn set_filetype(&mut self, id: DocumentId, file_type: Option<Arc<FileType>>) {
        let batching = self.batch_snapshot.is_some();
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        doc.set_file_type(file_type);
        self.notifier.emit(DocumentEvent::FiletypeChanged(id));
        if !batching {
            self.notifier.emit(DocumentEvent::RestyleRequested(id));
        }
    }

    /// Change a document's charset. Pure bookkeeping (no text conversion); the change is
    /// recorded in the undo ledger and flips the composite changed flag.
    pub fn set_encoding(&mut self, id: DocumentId, charset: Charset) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        if doc.encoding() == charset {
            return;
        }
        doc.push_undo(UndoAction::EncodingChange(doc.encoding()));
        doc.set_encoding_raw(charset);
        doc.update_changed_state();
        let changed = doc.is_changed();
        self.notifier.emit(DocumentEvent::TextChangedState(id, changed));
    }

    /// Toggle the document's byte-order mark, recorded in the undo ledger.
    pub fn set_use_bom(&mut self, id: DocumentId, has_bom: bool) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        if doc.has_bom() == has_bom {
            return;
        }
        doc.push_undo(UndoAction::BomToggle(doc.has_bom()));
        doc.set_bom_raw(has_bom);
        doc.update_changed_state();
        let changed = doc.is_changed();
        self.notifier.emit(DocumentEvent::TextChangedState(id, changed));
    }

    /// Record that the buffer performed an undoable edit, so a later undo walks through the
    /// ledger in recency order. Does not clear the redo ledger (the buffer already cleared its
    /// native redo).
    pub fn record_buffer_edit(&mut self, id: DocumentId) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        doc.push_undo(UndoAction::BufferEdit);
        doc.update_changed_state();
        let changed = doc.is_changed();
        self.notifier.emit(DocumentEvent::TextChangedState(id, changed));
    }

    /// Undo one step of the interleaved (ledger + buffer) history.
    pub fn undo(&mut self, id: DocumentId) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        doc.undo();
        let changed = doc.is_changed();
        self.notifier.emit(DocumentEvent::TextChangedState(id, changed));
    }

    /// Redo one step of the interleaved (ledger + buffer) history.
    pub fn redo(&mut self, id: DocumentId) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        doc.redo();
        let changed = doc.is_changed();
        self.notifier.emit(DocumentEvent::TextChangedState(id, changed));
    }

    /// Whether an undo step exists for the document.
    pub fn can_undo(&self, id: DocumentId) -> bool {
        self.registry.get(id).is_some_and(|d| d.can_undo())
    }

    /// Whether a redo step exists for the document.
    pub fn can_redo(&self, id: DocumentId) -> bool {
        self.registry.get(id).is_some_and(|d| d.can_redo())
    }

    fn replace_tabs_with_spaces(doc: &mut Document<B>, tab_width: usize) {
        let len = doc.buffer().len();
        let spaces = " ".repeat(tab_width.max(1));
        search::replace_range(doc, "\t", &spaces, SearchFlags::default(), 0, len, false);
    }

    fn strip_trailing_spaces(doc: &mut Document<B>) {
        let buffer = doc.buffer_mut();
        buffer.start_undo_action();
        // Walk lines backward so earlier deletions don't shift pending positions.
        for line in (0..buffer.line_count()).rev() {
            let start = buffer.position_from_line(line);
            let text = buffer.get_text_range(start, start + buffer.line_length(line));
            let content_len = text.trim_end_matches(['\r', '\n']).len();
            let kept_len = text[..content_len].trim_end_matches([' ', '\t']).len();
            if kept_len < content_len {
                buffer.set_target_range(start + kept_len, start + content_len);
                buffer.replace_target("", false);
            }
        }
        buffer.end_undo_action();
    }

    fn ensure_final_newline(doc: &mut Document<B>) {
        let buffer = doc.buffer_mut();
        let line_count = buffer.line_count();
        if buffer.is_empty() || line_count == 0 {
            return;
        }
        if buffer.line_length(line_count - 1) > 0 {
            let len = buffer.len();
            let eol = buffer.eol_mode().sequence().to_owned();
            buffer.start_undo_action();
            buffer.set_target_range(len, len);
            buffer.replace_target(&eol, false);
            buffer.end_undo_action();
        }
    }

    /// Save a document.
    ///
    /// Without `force`, unchanged or read-only documents are left alone (`Ok(false)`, no I/O).
    /// The configured pre-save normalizations run first, each as one undoable unit. Encoding
    /// conversion happens before any byte is written; on conversion or write failure nothing is
    /// mutated and the document stays dirty.
    pub fn save_file(&mut self, id: DocumentId, force: bool) -> Result<bool, DocumentError> {
        let Some(doc) = self.registry.get(id) else {
            return Ok(false);
        };
        if !force && (!doc.is_changed() || doc.readonly()) {
            return Ok(false);
        }
        let Some(display) = doc.display_path().map(str::to_owned) else {
            self.notifier.status("Error saving file.");
            self.notifier.bell();
            return Err(DocumentError::NoFilename);
        };

        {
            let doc = self
                .registry
                .get_mut(id)
                .expect("document vanished during save");
            let forces_tabs = doc.file_type().is_some_and(|ft| ft.forces_tabs);
            if self.config.replace_tabs && !forces_tabs {
                Self::replace_tabs_with_spaces(doc, self.config.tab_width);
            }
            if self.config.strip_trailing_spaces {
                Self::strip_trailing_spaces(doc);
            }
            if self.config.final_new_line {
                Self::ensure_final_newline(doc);
            }
        }

        let (text, charset, has_bom) = {
            let doc = self.registry.get(id).expect("document vanished during save");
            (doc.buffer().get_text(), doc.encoding(), doc.has_bom())
        };

        let bytes = match encoding::encode_for_save(&text, charset, has_bom) {
            Ok(bytes) => bytes,
            Err(err) => {
                if let DocumentError::ConversionFailed { offset, context } = &err {
                    let doc = self.registry.get(id).expect("document vanished during save");
                    let line = doc.buffer().line_from_position(*offset);
                    let line_start = doc.buffer().position_from_line(line);
                    let column = doc
                        .buffer()
                        .get_text_range(line_start, *offset)
                        .chars()
                        .count();
                    self.notifier.error(format!(
                        "An error occurred while converting the file from UTF-8 to {charset}. \
                         The file remains unsaved.\nThe error occurred at {context:?} \
                         (line: {}, column: {column}).",
                        line + 1
                    ));
                } else {
                    self.notifier.error(err.to_string());
                }
                self.notifier.bell();
                return Err(err);
            }
        };

        if let Err(os) = write_data_to_disk(Path::new(&display), &bytes, self.config.atomic_save) {
            self.notifier.status(format!("Error saving file ({os})."));
            self.notifier.error(format!("Error saving file ({os})."));
            self.notifier.bell();
            return Err(DocumentError::Io(os));
        }

        {
            let doc = self.registry.get_mut(id).expect("document vanished during save");
            doc.set_real_path(registry::real_path_of(&display));
            doc.store_saved_encoding();
            doc.buffer_mut().set_save_point();
            // Re-stat rather than trusting the clock; the filesystem's timestamp granularity
            // can differ from ours.
            doc.set_mtime(fs::metadata(&display).ok().and_then(|m| m.modified().ok()));
            doc.update_changed_state();
        }

        let file_type = self.registry.get(id).and_then(|d| d.file_type().cloned());
        self.set_filetype(id, file_type);
        self.notifier.emit(DocumentEvent::TextChangedState(id, false));
        self.notifier.status(format!("File {display} saved."));
        self.notifier.emit(DocumentEvent::Saved(id));
        Ok(true)
    }

    /// Save under a new name: updates the display path, re-detects the filetype when none was
    /// assigned, then force-saves.
    pub fn save_file_as(
        &mut self,
        id: DocumentId,
        new_path: Option<&str>,
    ) -> Result<bool, DocumentError> {
        {
            let Some(doc) = self.registry.get_mut(id) else {
                return Ok(false);
            };
            if let Some(path) = new_path {
                doc.set_display_path(Some(path.to_owned()));
            }
        }

        if self.registry.get(id).is_some_and(|d| d.file_type().is_none())
            && let Some(path) = self
                .registry
                .get(id)
                .and_then(|d| d.display_path().map(str::to_owned))
        {
            let detected = FileType::detect_from_path(&self.filetypes, &path);
            if detected.is_some() {
                self.set_filetype(id, detected);
            }
        }

        let result = self.save_file(id, true);
        if matches!(result, Ok(true))
            && let Some(path) = self
                .registry
                .get(id)
                .and_then(|d| d.display_path().map(str::to_owned))
        {
            self.notifier.emit(DocumentEvent::RecentFileAdded(path));
        }
        result
    }

    /// Close a document, prompting through the policy when it has unsaved changes. Returns
    /// `false` when the close was cancelled (or saving failed).
    pub fn close(&mut self, id: DocumentId) -> bool {
        let Some(doc) = self.registry.get(id) else {
            return false;
        };
        let name = doc.display_name();
        if doc.is_changed() {
            match self.policy.close_unsaved(&name) {
                CloseDecision::Save => {
                    if !matches!(self.save_file(id, false), Ok(true)) {
                        return false;
                    }
                }
                CloseDecision::Discard => {}
                CloseDecision::Cancel => return false,
            }
        }

        let Some(doc) = self.registry.get(id) else {
            return false;
        };
        let display = doc.display_path().map(str::to_owned);
        let has_real_path = doc.real_path().is_some();

        // Only files that exist on disk belong in the recent list, and bulk closes (quit,
        // close-all) should not reorder it.
        if !self.closing_all
            && has_real_path
            && let Some(path) = display.clone()
        {
            self.notifier.emit(DocumentEvent::RecentFileAdded(path));
        }

        self.notifier.emit(DocumentEvent::Closing(id));
        self.notifier.status(format!(
            "File {} closed.",
            display.unwrap_or_else(|| "untitled".to_owned())
        ));
        self.registry.free(id);
        true
    }

    /// Close every document: a first pass confirms or discards each dirty document (any cancel
    /// aborts the whole operation with all documents untouched), then a second pass closes
    /// everything without re-prompting.
    pub fn close_all(&mut self) -> bool {
        for id in self.registry.ids_in_tab_order() {
            let Some(doc) = self.registry.get(id) else {
                continue;
            };
            if !doc.is_changed() {
                continue;
            }
            let name = doc.display_name();
            match self.policy.close_unsaved(&name) {
                CloseDecision::Save => {
                    if !matches!(self.save_file(id, false), Ok(true)) {
                        return false;
                    }
                }
                CloseDecision::Discard => {}
                CloseDecision::Cancel => return false,
            }
        }

        // Every document is accounted for; discard remaining changed flags.
        for id in self.registry.ids() {
            if let Some(doc) = self.registry.get_mut(id) {
                doc.set_changed_flag(false);
            }
        }

        for id in self.registry.ids() {
            let still_dirty = self.registry.get(id).is_some_and(|d| d.is_changed());
            assert!(!still_dirty, "force-closing a still-dirty document");
        }

        self.closing_all = true;
        while let Some(id) = self.registry.find_by_position(0) {
            if !self.close(id) {
                self.closing_all = false;
                return false;
            }
        }
        self.closing_all = false;
        true
    }

    /// Throttled staleness poll against the on-disk file. Returns `true` when the file changed
    /// on disk.
    ///
    /// A missing file marks the document dirty and asks the policy about re-saving. A newer
    /// on-disk mtime asks the policy about reloading; the new mtime is adopted either way so
    /// the same external change never re-prompts. Timestamps in the future are logged, not
    /// acted on.
    pub fn check_disk_status(&mut self, id: DocumentId, force: bool) -> bool {
        if self.config.disk_check_timeout_secs == 0 {
            return false;
        }
        let now = SystemTime::now();
        let (display, name, doc_mtime) = {
            let Some(doc) = self.registry.get_mut(id) else {
                return false;
            };
            // Documents never saved to disk have nothing to be stale against.
            if doc.real_path().is_none() {
                return false;
            }
            if !force {
                let elapsed = now.duration_since(doc.last_check()).unwrap_or_default();
                if elapsed < Duration::from_secs(self.config.disk_check_timeout_secs) {
                    return false;
                }
            }
            doc.set_last_check(now);
            let Some(display) = doc.display_path().map(str::to_owned) else {
                return false;
            };
            (display, doc.display_name(), doc.mtime())
        };

        match fs::metadata(&display) {
            Err(_) => {
                if let Some(doc) = self.registry.get_mut(id) {
                    doc.set_changed_flag(true);
                }
                self.notifier.emit(DocumentEvent::TextChangedState(id, true));
                self.notifier
                    .status(format!("File \"{display}\" was not found on disk!"));
                if self.policy.resave_missing_file(&name) {
                    self.notifier.emit(DocumentEvent::ResaveRequested(id));
                }
                false
            }
            Ok(meta) => {
                let disk_mtime = meta.modified().ok();
                if doc_mtime.is_some_and(|t| t > now) || disk_mtime.is_some_and(|t| t > now) {
                    warn!("timestamps for {display} are in the future; ignoring disk state");
                    return false;
                }
                let (Some(ours), Some(theirs)) = (doc_mtime, disk_mtime) else {
                    return false;
                };
                if ours >= theirs {
                    return false;
                }
                if self.policy.reload_changed_file(&name) {
                    let _ = self.reload_file(id, None);
                }
                if let Some(doc) = self.registry.get_mut(id) {
                    doc.set_mtime(Some(theirs));
                }
                true
            }
        }
    }

    /// Create a new document with another document's content and properties.
    pub fn clone_document(&mut self, id: DocumentId, new_path: Option<&str>) -> Option<DocumentId> {
        let (text, file_type, readonly, has_bom, charset) = {
            let doc = self.registry.get(id)?;
            (
                doc.buffer().get_text(),
                doc.file_type().cloned(),
                doc.readonly(),
                doc.has_bom(),
                doc.encoding(),
            )
        };
        let new_id = self.new_file(new_path, file_type, Some(&text));
        let doc = self.registry.get_mut(new_id)?;
        doc.set_readonly(readonly);
        doc.set_bom_raw(has_bom);
        doc.set_encoding_raw(charset);
        Some(new_id)
    }

    /// Snapshot the set of open documents and defer styling notifications until
    /// [`DocumentManager::end_batch`]. Batches cannot nest.
    pub fn begin_batch(&mut self) {
        assert!(
            self.batch_snapshot.is_none(),
            "restyle batches cannot be nested"
        );
        self.batch_snapshot = Some(self.registry.ids().into_iter().collect());
    }

    /// End a restyle batch: every document opened during the batch is restyled
    /// unconditionally; pre-existing documents are restyled only when the host's type-keyword
    /// list changed and their syntax actually uses those keywords.
    pub fn end_batch(&mut self) {
        let snapshot = self
            .batch_snapshot
            .take()
            .expect("end_batch without a matching begin_batch");
        let keywords_changed = match self.keyword_check.as_mut() {
            Some(check) => check(),
            None => false,
        };
        for id in self.registry.ids() {
            let is_new = !snapshot.contains(&id);
            let uses_keywords = self
                .registry
                .get(id)
                .and_then(|d| d.file_type().cloned())
                .is_some_and(|ft| ft.uses_type_keywords);
            if is_new || (keywords_changed && uses_keywords) {
                self.notifier.emit(DocumentEvent::RestyleRequested(id));
            }
        }
    }

    /// Toolbar-style incremental search. See [`search::search_bar_find`].
    pub fn search_bar_find(
        &mut self,
        id: DocumentId,
        text: &str,
        flags: SearchFlags,
        incremental: bool,
    ) -> bool {
        let Some(doc) = self.registry.get_mut(id) else {
            return false;
        };
        search::search_bar_find(doc, &mut self.notifier, text, flags, incremental)
    }

    /// Dialog-style find with a single policy-confirmed wraparound. See [`search::find_text`].
    pub fn find_text(
        &mut self,
        id: DocumentId,
        text: &str,
        flags: SearchFlags,
        backwards: bool,
        scroll: bool,
    ) -> Option<usize> {
        let Some(doc) = self.registry.get_mut(id) else {
            return None;
        };
        search::find_text(
            doc,
            &mut self.notifier,
            &mut *self.policy,
            &self.config,
            text,
            flags,
            backwards,
            scroll,
        )
    }

    /// Selection-guarded single replace. See [`search::replace_text`].
    pub fn replace_text(
        &mut self,
        id: DocumentId,
        find: &str,
        replace: &str,
        flags: SearchFlags,
        backwards: bool,
    ) -> Option<usize> {
        let Some(doc) = self.registry.get_mut(id) else {
            return None;
        };
        search::replace_text(
            doc,
            &mut self.notifier,
            &mut *self.policy,
            &self.config,
            find,
            replace,
            flags,
            backwards,
        )
    }

    /// Replace inside the current (stream or rectangular) selection. See
    /// [`search::replace_in_selection`].
    pub fn replace_in_selection(
        &mut self,
        id: DocumentId,
        find: &str,
        replace: &str,
        flags: SearchFlags,
    ) {
        let Some(doc) = self.registry.get_mut(id) else {
            return;
        };
        search::replace_in_selection(doc, &mut self.notifier, find, replace, flags);
    }

    /// Replace across the whole document. See [`search::replace_all`].
    pub fn replace_all(
        &mut self,
        id: DocumentId,
        find: &str,
        replace: &str,
        flags: SearchFlags,
    ) -> bool {
        let Some(doc) = self.registry.get_mut(id) else {
            return false;
        };
        search::replace_all(doc, &mut self.notifier, find, replace, flags)
    }
}
