//! The document registry.
//!
//! An arena of document slots addressed by generation-checked handles. Slots are reused after a
//! close — but only the exact freed slot, never re-sorted, so indices stay stable across
//! mutation of other slots. A stale [`DocumentId`] (its slot was freed, possibly reallocated)
//! simply fails to resolve.
//!
//! Lookup paths:
//! - display path first, so documents with a name but no disk presence are found;
//! - then the canonicalized real path, which is unique per on-disk file;
//! - by buffer identity, for routing widget notifications back to their document;
//! - by tab position, mirroring the order documents were opened in.

use std::path::{Path, PathBuf};

use crate::buffer::{BufferId, TextBuffer};
use crate::document::Document;

/// Generation-checked handle to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId {
    index: u32,
    generation: u32,
}

impl DocumentId {
    /// The slot index this handle points at.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

struct Slot<B: TextBuffer> {
    generation: u32,
    doc: Option<Document<B>>,
}

/// Holds every open document in a stable, reusable slot array.
pub struct DocumentRegistry<B: TextBuffer> {
    slots: Vec<Slot<B>>,
    tab_order: Vec<DocumentId>,
    case_insensitive_paths: bool,
}

impl<B: TextBuffer> std::fmt::Debug for DocumentRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRegistry")
            .field("slot_count", &self.slots.len())
            .field("document_count", &self.len())
            .finish()
    }
}

impl<B: TextBuffer> DocumentRegistry<B> {
    /// Create an empty registry with the given path comparison policy.
    pub fn new(case_insensitive_paths: bool) -> Self {
        Self {
            slots: Vec::new(),
            tab_order: Vec::new(),
            case_insensitive_paths,
        }
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.doc.is_some()).count()
    }

    /// Returns `true` if no documents are open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a handle, failing on stale generations.
    pub fn get(&self, id: DocumentId) -> Option<&Document<B>> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.doc.as_ref()
    }

    /// Resolve a handle mutably, failing on stale generations.
    pub fn get_mut(&mut self, id: DocumentId) -> Option<&mut Document<B>> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.doc.as_mut()
    }

    /// Iterate over live documents in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Document<B>> {
        self.slots.iter().filter_map(|s| s.doc.as_ref())
    }

    /// Live document ids in slot order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.iter().map(|d| d.id()).collect()
    }

    /// Live document ids in tab order.
    pub fn ids_in_tab_order(&self) -> Vec<DocumentId> {
        self.tab_order.clone()
    }

    /// Allocate a slot — reusing a freed one when available, appending otherwise — and build
    /// the document into it. The slot only becomes observable once `make` returns, so
    /// partially-constructed documents are never visible.
    pub(crate) fn allocate(
        &mut self,
        make: impl FnOnce(DocumentId) -> Document<B>,
    ) -> DocumentId {
        let index = match self.slots.iter().position(|s| s.doc.is_none()) {
            Some(i) => i,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    doc: None,
                });
                self.slots.len() - 1
            }
        };
        let id = DocumentId {
            index: index as u32,
            generation: self.slots[index].generation,
        };
        self.slots[index].doc = Some(make(id));
        self.tab_order.push(id);
        id
    }

    /// Free a slot: the document (and its buffer) are dropped, the generation is bumped so the
    /// handle goes stale, and the slot becomes eligible for reuse.
    pub(crate) fn free(&mut self, id: DocumentId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return false;
        };
        if slot.generation != id.generation || slot.doc.is_none() {
            return false;
        }
        slot.doc = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.tab_order.retain(|t| *t != id);
        true
    }

    fn paths_equal(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive_paths {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    /// Find a document by its display path.
    pub fn find_by_display_path(&self, path: &str) -> Option<DocumentId> {
        self.iter()
            .find(|d| d.display_path().is_some_and(|p| self.paths_equal(p, path)))
            .map(|d| d.id())
    }

    /// Find a document by its canonicalized real path.
    pub fn find_by_real_path(&self, real: &Path) -> Option<DocumentId> {
        let needle = real.to_string_lossy();
        self.iter()
            .find(|d| {
                d.real_path()
                    .is_some_and(|p| self.paths_equal(&p.to_string_lossy(), &needle))
            })
            .map(|d| d.id())
    }

    /// Two-phase lookup: display path first (catches named-but-unsaved documents), then the
    /// canonicalized real path (unique per on-disk file).
    pub fn find_by_path(&self, path: &str) -> Option<DocumentId> {
        if let Some(id) = self.find_by_display_path(path) {
            return Some(id);
        }
        let real = std::fs::canonicalize(path).ok()?;
        self.find_by_real_path(&real)
    }

    /// Find the document owning the buffer with this id.
    pub fn find_by_buffer(&self, buffer: BufferId) -> Option<DocumentId> {
        self.iter()
            .find(|d| d.buffer().id() == buffer)
            .map(|d| d.id())
    }

    /// The document at UI tab position `position`.
    pub fn find_by_position(&self, position: usize) -> Option<DocumentId> {
        self.tab_order.get(position).copied()
    }

    /// The UI tab position of a document.
    pub fn position_of(&self, id: DocumentId) -> Option<usize> {
        self.tab_order.iter().position(|t| *t == id)
    }
}

/// Canonicalize a display path: symlinks resolved, `..` segments collapsed. `None` while the
/// file does not exist on disk.
pub(crate) fn real_path_of(display_path: &str) -> Option<PathBuf> {
    std::fs::canonicalize(display_path).ok()
}
