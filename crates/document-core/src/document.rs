//! The document record and its auxiliary undo/redo ledger.
//!
//! A [`Document`] owns exactly one buffer for its lifetime and layers document-level metadata
//! on top of it: paths, encoding state, the saved-encoding snapshot, timestamps, and the
//! filetype reference.
//!
//! The buffer's native undo only tracks content edits. Encoding and byte-order-mark changes are
//! document metadata the buffer is unaware of, yet users expect a single Undo gesture to walk
//! back an accidental encoding switch exactly like a text edit. The ledger here is a second
//! pair of LIFO stacks interleaved with the buffer's own history by recency: a
//! [`UndoAction::BufferEdit`] marker means "this step belongs to the buffer, defer to its
//! native undo". The ledger never reaches into the buffer's internal undo state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use crate::buffer::TextBuffer;
use crate::config::DocumentConfig;
use crate::encoding::Charset;
use crate::filetype::FileType;
use crate::registry::DocumentId;

/// Upper bound on each ledger stack; the oldest entry is dropped on overflow.
pub const MAX_UNDO_ACTIONS: usize = 1024;

/// One entry in the auxiliary undo/redo ledger.
///
/// Pushing an action never clears the opposite stack by itself: buffer-intrinsic edits already
/// clear native redo inside the buffer, while encoding/BOM toggles are meant to coexist with
/// buffer redo history. Callers decide redo-stack semantics explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Defer this step to the buffer's native undo/redo.
    BufferEdit,
    /// Restore the recorded byte-order-mark flag.
    BomToggle(bool),
    /// Restore the recorded charset (pure bookkeeping, no text conversion).
    EncodingChange(Charset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SavedEncoding {
    charset: Charset,
    has_bom: bool,
}

/// One open file or untitled buffer.
pub struct Document<B: TextBuffer> {
    id: DocumentId,
    buffer: B,

    display_path: Option<String>,
    real_path: Option<PathBuf>,
    readonly: bool,

    encoding: Charset,
    has_bom: bool,
    saved_encoding: SavedEncoding,
    changed: bool,

    mtime: Option<SystemTime>,
    last_check: SystemTime,

    file_type: Option<Arc<FileType>>,
    use_tabs: bool,

    undo_actions: Vec<UndoAction>,
    redo_actions: Vec<UndoAction>,
}

impl<B: TextBuffer> std::fmt::Debug for Document<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("display_path", &self.display_path)
            .field("encoding", &self.encoding)
            .field("has_bom", &self.has_bom)
            .field("changed", &self.changed)
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl<B: TextBuffer> Document<B> {
    pub(crate) fn new(
        id: DocumentId,
        buffer: B,
        display_path: Option<String>,
        config: &DocumentConfig,
    ) -> Self {
        let charset = config.default_new_encoding;
        Self {
            id,
            buffer,
            display_path,
            real_path: None,
            readonly: false,
            encoding: charset,
            has_bom: false,
            saved_encoding: SavedEncoding {
                charset,
                has_bom: false,
            },
            changed: false,
            mtime: None,
            last_check: SystemTime::now(),
            file_type: None,
            use_tabs: config.use_tabs,
            undo_actions: Vec::new(),
            redo_actions: Vec::new(),
        }
    }

    /// This document's registry handle.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// The owned buffer.
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// The owned buffer, mutably.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// The display path, unset for untitled documents.
    pub fn display_path(&self) -> Option<&str> {
        self.display_path.as_deref()
    }

    /// The canonicalized on-disk path, set only once the file is known to exist.
    pub fn real_path(&self) -> Option<&Path> {
        self.real_path.as_deref()
    }

    /// Basename of the display path, or `"untitled"`.
    pub fn display_name(&self) -> String {
        match self.display_path.as_deref() {
            Some(p) => Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.to_owned()),
            None => "untitled".to_owned(),
        }
    }

    /// Whether the document is read-only.
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// The current charset.
    pub fn encoding(&self) -> Charset {
        self.encoding
    }

    /// Whether the document carries a byte-order mark.
    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    /// The composite changed flag: buffer-intrinsic dirty OR encoding/BOM differs from the
    /// saved snapshot.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Last known on-disk modification time.
    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// When the on-disk state was last polled.
    pub fn last_check(&self) -> SystemTime {
        self.last_check
    }

    /// The filetype reference, if any.
    pub fn file_type(&self) -> Option<&Arc<FileType>> {
        self.file_type.as_ref()
    }

    /// The document's indentation mode (tabs when `true`).
    pub fn use_tabs(&self) -> bool {
        self.use_tabs
    }

    pub(crate) fn set_display_path(&mut self, path: Option<String>) {
        self.display_path = path;
    }

    pub(crate) fn set_real_path(&mut self, path: Option<PathBuf>) {
        self.real_path = path;
    }

    pub(crate) fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
        self.buffer.set_read_only(readonly);
    }

    pub(crate) fn set_encoding_raw(&mut self, charset: Charset) {
        self.encoding = charset;
    }

    pub(crate) fn set_bom_raw(&mut self, has_bom: bool) {
        self.has_bom = has_bom;
    }

    pub(crate) fn set_mtime(&mut self, mtime: Option<SystemTime>) {
        self.mtime = mtime;
    }

    pub(crate) fn set_last_check(&mut self, at: SystemTime) {
        self.last_check = at;
    }

    pub(crate) fn set_file_type(&mut self, file_type: Option<Arc<FileType>>) {
        self.file_type = file_type;
    }

    pub(crate) fn set_use_tabs(&mut self, use_tabs: bool) {
        self.use_tabs = use_tabs;
    }

    pub(crate) fn set_changed_flag(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Snapshot the current charset and BOM flag as the on-disk state.
    ///
    /// Called exactly on successful load and successful save; the snapshot is what makes
    /// encoding-only dirtiness detectable.
    pub(crate) fn store_saved_encoding(&mut self) {
        self.saved_encoding = SavedEncoding {
            charset: self.encoding,
            has_bom: self.has_bom,
        };
    }

    /// Recompute the composite changed flag from scratch.
    pub(crate) fn update_changed_state(&mut self) -> bool {
        self.changed = self.buffer.is_modified()
            || self.has_bom != self.saved_encoding.has_bom
            || self.encoding != self.saved_encoding.charset;
        self.changed
    }

    /// Push onto the undo ledger. Does **not** clear the redo ledger.
    pub(crate) fn push_undo(&mut self, action: UndoAction) {
        if self.undo_actions.len() >= MAX_UNDO_ACTIONS {
            self.undo_actions.remove(0);
        }
        self.undo_actions.push(action);
    }

    /// Push onto the redo ledger. Does **not** clear the undo ledger.
    pub(crate) fn push_redo(&mut self, action: UndoAction) {
        if self.redo_actions.len() >= MAX_UNDO_ACTIONS {
            self.redo_actions.remove(0);
        }
        self.redo_actions.push(action);
    }

    /// Drop both ledger stacks (reload and close paths).
    pub(crate) fn clear_undo_history(&mut self) {
        self.undo_actions.clear();
        self.redo_actions.clear();
    }

    /// Whether an undo step exists in the ledger or the buffer.
    pub fn can_undo(&self) -> bool {
        !self.undo_actions.is_empty() || self.buffer.can_undo()
    }

    /// Whether a redo step exists in the ledger or the buffer.
    pub fn can_redo(&self) -> bool {
        !self.redo_actions.is_empty() || self.buffer.can_redo()
    }

    /// Depth of the undo ledger (buffer-native history not included).
    pub fn undo_ledger_depth(&self) -> usize {
        self.undo_actions.len()
    }

    /// Depth of the redo ledger (buffer-native history not included).
    pub fn redo_ledger_depth(&self) -> usize {
        self.redo_actions.len()
    }

    /// Walk one step back through the interleaved history.
    ///
    /// An empty ledger falls back to the buffer's native undo, which covers the common case of
    /// purely content-edit history.
    pub fn undo(&mut self) {
        match self.undo_actions.pop() {
            None => {
                debug!("undo ledger empty, deferring to the buffer");
                self.buffer.undo();
            }
            Some(UndoAction::BufferEdit) => {
                self.push_redo(UndoAction::BufferEdit);
                self.buffer.undo();
            }
            Some(UndoAction::BomToggle(old)) => {
                self.push_redo(UndoAction::BomToggle(self.has_bom));
                self.has_bom = old;
            }
            Some(UndoAction::EncodingChange(old)) => {
                self.push_redo(UndoAction::EncodingChange(self.encoding));
                self.encoding = old;
            }
        }
        self.update_changed_state();
    }

    /// Walk one step forward through the interleaved history.
    pub fn redo(&mut self) {
        match self.redo_actions.pop() {
            None => {
                debug!("redo ledger empty, deferring to the buffer");
                self.buffer.redo();
            }
            Some(UndoAction::BufferEdit) => {
                self.push_undo(UndoAction::BufferEdit);
                self.buffer.redo();
            }
            Some(UndoAction::BomToggle(old)) => {
                self.push_undo(UndoAction::BomToggle(self.has_bom));
                self.has_bom = old;
            }
            Some(UndoAction::EncodingChange(old)) => {
                self.push_undo(UndoAction::EncodingChange(self.encoding));
                self.encoding = old;
            }
        }
        self.update_changed_state();
    }
}
