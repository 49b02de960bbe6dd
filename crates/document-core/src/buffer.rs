//! Text buffer adapter contract.
//!
//! The core never talks to a concrete editing widget. Everything it needs from the text
//! component is expressed by the [`TextBuffer`] trait: text access, line/position translation,
//! selections (stream and rectangular), search primitives, a native undo stack with grouping,
//! and a handful of visibility hooks. Positions are **byte offsets** into the buffer's UTF-8
//! text, half-open ranges throughout; implementations must keep positions on `char` boundaries.
//!
//! A rope-backed reference implementation lives in the `document-core-buffer` crate.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::line_ending::EolMode;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a buffer instance.
///
/// Buffers are owned by their document; the id is the stable key the registry uses to resolve a
/// document from a buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(u64);

impl BufferId {
    /// Allocate a fresh id. Implementations call this once at construction.
    pub fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Options that control how buffer search is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFlags {
    /// If `true`, performs a case-sensitive search.
    pub case_sensitive: bool,
    /// If `true`, matches only whole words (ASCII-alphanumeric and `_`).
    pub whole_word: bool,
    /// If `true`, matches must start at a word boundary (the end may fall mid-word).
    pub word_start: bool,
    /// If `true`, treats the query as a regex pattern. Backward regex search is unsupported;
    /// the engine forces forward-only search when this is set.
    pub regex: bool,
}

impl Default for SearchFlags {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            word_start: false,
            regex: false,
        }
    }
}

/// How a selection spans lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// An ordinary linear selection.
    Stream,
    /// A column-aligned block spanning multiple lines.
    Rectangular,
}

/// The contract the core requires from the editing-widget collaborator.
///
/// Mutating calls that would modify a read-only buffer are expected to be no-ops, mirroring how
/// editing widgets silently reject modification of read-only documents.
pub trait TextBuffer {
    /// Stable identity of this buffer instance.
    fn id(&self) -> BufferId;

    /// The whole buffer text.
    fn get_text(&self) -> String;
    /// The text in `[start, end)`, clamped to the buffer and to `char` boundaries.
    fn get_text_range(&self, start: usize, end: usize) -> String;
    /// Replace the entire buffer content.
    fn set_text(&mut self, text: &str);
    /// Remove all text.
    fn clear(&mut self);
    /// Buffer length in bytes.
    fn len(&self) -> usize;
    /// Returns `true` if the buffer holds no text.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The line containing `pos`.
    fn line_from_position(&self, pos: usize) -> usize;
    /// The position of the first byte of `line` (buffer length for lines past the end).
    fn position_from_line(&self, line: usize) -> usize;
    /// Number of lines (a trailing newline opens a final empty line).
    fn line_count(&self) -> usize;
    /// Length of `line` in bytes, including its line ending.
    fn line_length(&self, line: usize) -> usize;
    /// The next `char` boundary after `pos` (buffer length when already at the end).
    fn position_after(&self, pos: usize) -> usize;

    /// Start of the selection (min of anchor and caret).
    fn selection_start(&self) -> usize;
    /// End of the selection (max of anchor and caret).
    fn selection_end(&self) -> usize;
    /// Move the selection anchor.
    fn set_selection_start(&mut self, pos: usize);
    /// Move the selection caret.
    fn set_selection_end(&mut self, pos: usize);
    /// Collapse the selection and move the caret to `pos`, scrolling it into view.
    fn goto_pos(&mut self, pos: usize);
    /// Current selection shape.
    fn selection_mode(&self) -> SelectionMode;
    /// Change the selection shape without moving it.
    fn set_selection_mode(&mut self, mode: SelectionMode);
    /// Number of lines the selection touches (1 for an empty selection).
    fn selected_line_count(&self) -> usize;
    /// Start of the selected sub-span on `line`, or `None` if the selection misses the line.
    fn line_sel_start(&self, line: usize) -> Option<usize>;
    /// End of the selected sub-span on `line`, or `None` if the selection misses the line.
    fn line_sel_end(&self, line: usize) -> Option<usize>;

    /// Find the first match of `pattern` within `range`, searching forward.
    ///
    /// Zero-length matches (empty-width regex anchors) are returned, including one anchored
    /// exactly at `range.end`; callers are responsible for stepping past them.
    fn find_next(&self, range: Range<usize>, pattern: &str, flags: SearchFlags)
    -> Option<Range<usize>>;
    /// Find the last match of `pattern` within `range`, searching backward.
    fn find_prev(&self, range: Range<usize>, pattern: &str, flags: SearchFlags)
    -> Option<Range<usize>>;
    /// Stage `[start, end)` as the target for the next [`TextBuffer::replace_target`].
    fn set_target_range(&mut self, start: usize, end: usize);
    /// Replace the staged target with `text`, returning the replacement's byte length.
    ///
    /// When `is_regex` is set, `$1`-style capture references in `text` are expanded against the
    /// most recent search pattern.
    fn replace_target(&mut self, text: &str, is_regex: bool) -> usize;

    /// Enable or disable recording of edits into the native undo stack.
    fn set_undo_collection(&mut self, enabled: bool);
    /// Discard all native undo/redo history.
    fn empty_undo_buffer(&mut self);
    /// Undo the most recent native edit (or edit group).
    fn undo(&mut self);
    /// Redo the most recently undone native edit (or edit group).
    fn redo(&mut self);
    /// Whether native undo history exists.
    fn can_undo(&self) -> bool;
    /// Whether native redo history exists.
    fn can_redo(&self) -> bool;
    /// Open an undo group; edits until the matching end collapse into one undo step.
    /// Groups may nest.
    fn start_undo_action(&mut self);
    /// Close the innermost undo group.
    fn end_undo_action(&mut self);

    /// Mark the buffer read-only (edits become no-ops).
    fn set_read_only(&mut self, readonly: bool);
    /// Record the preferred newline mode for new line breaks.
    fn set_eol_mode(&mut self, mode: EolMode);
    /// The recorded newline mode.
    fn eol_mode(&self) -> EolMode;
    /// Convert every line ending in the buffer to `mode`.
    fn convert_eols(&mut self, mode: EolMode);
    /// Whether the buffer content differs from the last save point.
    fn is_modified(&self) -> bool;
    /// Declare the current content as saved.
    fn set_save_point(&mut self);

    /// Make `line` visible (unfold it if the widget supports folding).
    fn ensure_line_visible(&mut self, line: usize);
    /// Scroll so `line` sits `percent_of_view` from the top of the view.
    fn scroll_to_line(&mut self, line: usize, percent_of_view: f32);
    /// Whether `line` is currently inside the visible area.
    fn is_line_in_view(&self, line: usize) -> bool;
}
