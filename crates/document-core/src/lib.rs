#![warn(missing_docs)]
//! Document Core - Headless Document Management for Text Editors
//!
//! # Overview
//!
//! `document-core` owns every open file's in-memory state and mediates between on-disk bytes
//! and an internal UTF-8 text buffer. It is UI-agnostic: the editing widget is abstracted
//! behind a buffer contract, user prompts behind an injected policy, and all outward
//! communication happens through fire-and-forget events.
//!
//! # Core Features
//!
//! - **Document Registry**: stable, reusable slot arena with generation-checked handles;
//!   lookup by display path, canonicalized real path, buffer identity, or tab position
//! - **Load Pipeline**: BOM handling, charset detection and conversion, line-ending
//!   detection, embedded-NUL truncation safety
//! - **Save Pipeline**: encoding re-conversion with byte-accurate diagnostics, optional
//!   atomic-rename writes, tab/space and whitespace normalization hooks
//! - **Search & Replace**: incremental find, wraparound whole-document search, targeted
//!   range replace, rectangular-selection-aware multi-line replace
//! - **Undo/Redo Ledger**: a second action stack for encoding and BOM changes, interleaved
//!   with the buffer's native undo from the user's point of view
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  DocumentManager (lifecycle + batch)        │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Search & Replace Engine                    │  ← Buffer-level operations
//! ├─────────────────────────────────────────────┤
//! │  DocumentRegistry (slot arena)              │  ← Document resolution
//! ├─────────────────────────────────────────────┤
//! │  Document + Undo Ledger                     │  ← Per-document state
//! ├─────────────────────────────────────────────┤
//! │  Encoding Pipeline                          │  ← Bytes ↔ UTF-8
//! ├─────────────────────────────────────────────┤
//! │  TextBuffer contract                        │  ← Editing-widget seam
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use document_core::{AutoConfirm, DocumentConfig, DocumentManager};
//!
//! let mut manager = DocumentManager::new(
//!     DocumentConfig::default(),
//!     Box::new(AutoConfirm::default()),
//!     MyBuffer::new, // any TextBuffer implementation
//! );
//!
//! manager.subscribe(|event| println!("event: {event:?}"));
//!
//! let id = manager.open_file("src/main.rs", 0, false, None, None)?;
//! manager.replace_all(id, "foo", "bar", Default::default());
//! manager.save_file(id, false)?;
//! # Ok::<(), document_core::DocumentError>(())
//! ```
//!
//! # Module Description
//!
//! - [`buffer`] - the text buffer adapter contract
//! - [`encoding`] - charset detection, BOM handling, conversion
//! - [`line_ending`] - EOL detection and conversion
//! - [`document`] - the document record and auxiliary undo ledger
//! - [`registry`] - the slot arena and lookup paths
//! - [`lifecycle`] - open/save/close state machine and batch coordination
//! - [`search`] - the search & replace engine
//! - [`events`] - notification points and confirmation policies
//! - [`config`] - behavior knobs
//!
//! # Concurrency
//!
//! Single-threaded and synchronous: every operation runs to completion on the calling thread.
//! The only suspension points are the policy prompts, which an embedded host answers without
//! user interaction via [`AutoConfirm`].

pub mod buffer;
pub mod config;
pub mod document;
pub mod encoding;
pub mod error;
pub mod events;
pub mod filetype;
pub mod lifecycle;
pub mod line_ending;
pub mod registry;
pub mod search;

pub use buffer::{BufferId, SearchFlags, SelectionMode, TextBuffer};
pub use config::DocumentConfig;
pub use document::{Document, MAX_UNDO_ACTIONS, UndoAction};
pub use encoding::{Charset, Detected};
pub use error::DocumentError;
pub use events::{
    AutoConfirm, CloseDecision, ConfirmPolicy, DocumentEvent, EventCallback, Notifier,
};
pub use filetype::FileType;
pub use lifecycle::DocumentManager;
pub use line_ending::EolMode;
pub use registry::{DocumentId, DocumentRegistry};
