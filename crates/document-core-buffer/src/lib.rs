#![warn(missing_docs)]
//! Reference in-memory implementation of the `document-core` buffer contract.
//!
//! [`MemoryBuffer`] is a headless stand-in for an editing widget:
//!
//! - rope-backed text storage with byte-offset line translation
//! - regex-based search (plain queries are escaped), with whole-word and word-start filtering
//! - target-range replace with `$1`-style capture expansion against the last search pattern
//! - a native undo/redo stack with nestable grouping, undo-collection toggling, and save-point
//!   tracking
//! - stream and rectangular selections, including per-line rectangular sub-spans
//! - a small scroll model (top line + view height) backing the visibility hooks
//!
//! Embedders wire their real widget to the same trait; this implementation exists so the core
//! can be driven and tested without a UI.

use std::cell::RefCell;
use std::ops::Range;

use regex::{Regex, RegexBuilder};
use ropey::Rope;

use document_core::{BufferId, EolMode, SearchFlags, SelectionMode, TextBuffer};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    pos: usize,
    deleted: String,
    inserted: String,
}

/// A rope-backed [`TextBuffer`] with native undo and regex search.
pub struct MemoryBuffer {
    id: BufferId,
    text: Rope,

    sel_anchor: usize,
    sel_caret: usize,
    sel_mode: SelectionMode,
    target: Range<usize>,
    last_search: RefCell<Option<Regex>>,

    undo_stack: Vec<Vec<Edit>>,
    redo_stack: Vec<Vec<Edit>>,
    pending: Vec<Edit>,
    group_depth: usize,
    collect_undo: bool,

    readonly: bool,
    eol_mode: EolMode,
    edit_counter: i64,
    save_counter: i64,

    scroll_top: usize,
    view_lines: usize,
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("id", &self.id)
            .field("len", &self.text.len_bytes())
            .field("readonly", &self.readonly)
            .finish()
    }
}

fn compile_search_regex(query: &str, flags: SearchFlags) -> Option<Regex> {
    let pattern = if flags.regex {
        query.to_owned()
    } else {
        regex::escape(query)
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!flags.case_sensitive)
        .multi_line(true)
        .build()
        .ok()
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn word_edges_ok(full: &str, start: usize, end: usize, flags: SearchFlags) -> bool {
    let start_ok = !full[..start].chars().next_back().is_some_and(is_word_char);
    if flags.whole_word {
        start_ok && !full[end..].chars().next().is_some_and(is_word_char)
    } else {
        start_ok
    }
}

/// Shift a position through a `[start, start + del_len) -> ins_len` edit. Positions inside the
/// replaced region land at the end of the inserted text.
fn shift_pos(pos: usize, start: usize, del_len: usize, ins_len: usize) -> usize {
    if pos <= start {
        pos
    } else if pos <= start + del_len {
        start + ins_len
    } else {
        pos - del_len + ins_len
    }
}

/// The next `char` boundary after `i`, or a past-the-end sentinel at the end of the text.
fn next_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len() + 1;
    }
    let mut j = i + 1;
    while j < s.len() && !s.is_char_boundary(j) {
        j += 1;
    }
    j
}

impl MemoryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            id: BufferId::next(),
            text: Rope::new(),
            sel_anchor: 0,
            sel_caret: 0,
            sel_mode: SelectionMode::Stream,
            target: 0..0,
            last_search: RefCell::new(None),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            pending: Vec::new(),
            group_depth: 0,
            collect_undo: true,
            readonly: false,
            eol_mode: EolMode::Lf,
            edit_counter: 0,
            save_counter: 0,
            scroll_top: 0,
            view_lines: 24,
        }
    }

    /// Create a buffer holding `text`.
    pub fn from_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.text = Rope::from_str(text);
        buffer
    }

    /// Set the number of visible lines backing the scroll model.
    pub fn set_view_lines(&mut self, lines: usize) {
        self.view_lines = lines.max(1);
    }

    /// The current top visible line.
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    fn clamp_boundary(&self, pos: usize) -> usize {
        let pos = pos.min(self.text.len_bytes());
        let ch = self.text.byte_to_char(pos);
        self.text.char_to_byte(ch)
    }

    fn slice_to_string(&self, start: usize, end: usize) -> String {
        let start = self.clamp_boundary(start);
        let end = self.clamp_boundary(end.max(start));
        let cs = self.text.byte_to_char(start);
        let ce = self.text.byte_to_char(end);
        self.text.slice(cs..ce).to_string()
    }

    fn clamp_selection(&mut self) {
        self.sel_anchor = self.clamp_boundary(self.sel_anchor);
        self.sel_caret = self.clamp_boundary(self.sel_caret);
    }

    fn splice(&mut self, start: usize, end: usize, insert: &str) {
        let cs = self.text.byte_to_char(start);
        let ce = self.text.byte_to_char(end);
        self.text.remove(cs..ce);
        self.text.insert(cs, insert);
    }

    /// The one mutation path: replaces `[start, end)` with `insert`, recording undo state.
    /// Returns the inserted byte length (0 when the buffer is read-only).
    fn apply_edit(&mut self, start: usize, end: usize, insert: &str) -> usize {
        if self.readonly {
            return 0;
        }
        let start = self.clamp_boundary(start);
        let end = self.clamp_boundary(end.max(start));
        let deleted = self.slice_to_string(start, end);
        if deleted.is_empty() && insert.is_empty() {
            return 0;
        }

        self.splice(start, end, insert);

        if self.collect_undo {
            let edit = Edit {
                pos: start,
                deleted,
                inserted: insert.to_owned(),
            };
            if self.group_depth > 0 {
                self.pending.push(edit);
            } else {
                self.undo_stack.push(vec![edit]);
                self.edit_counter += 1;
            }
            self.redo_stack.clear();
        }

        let del_len = end - start;
        self.sel_anchor = shift_pos(self.sel_anchor, start, del_len, insert.len());
        self.sel_caret = shift_pos(self.sel_caret, start, del_len, insert.len());
        self.clamp_selection();
        insert.len()
    }

    fn line_content_len(&self, line: usize) -> usize {
        let start = self.position_from_line(line);
        let text = self.slice_to_string(start, start + self.line_length(line));
        text.trim_end_matches(['\r', '\n']).len()
    }

    fn scroll_line_into_view(&mut self, line: usize) {
        if line < self.scroll_top {
            self.scroll_top = line;
        } else if line >= self.scroll_top + self.view_lines {
            self.scroll_top = line + 1 - self.view_lines;
        }
    }

    fn rect_line_bounds(&self, line: usize) -> Option<(usize, usize)> {
        let sel_start = self.selection_start();
        let sel_end = self.selection_end();
        let first = self.line_from_position(sel_start);
        let last = self.line_from_position(sel_end);
        if line < first || line > last {
            return None;
        }
        let col_a = sel_start - self.position_from_line(first);
        let col_b = sel_end - self.position_from_line(last);
        let (lo, hi) = (col_a.min(col_b), col_a.max(col_b));
        let line_start = self.position_from_line(line);
        let content = self.line_content_len(line);
        let a = self.clamp_boundary(line_start + lo.min(content));
        let b = self.clamp_boundary(line_start + hi.min(content));
        Some((a, b))
    }

    fn stream_line_bounds(&self, line: usize) -> Option<(usize, usize)> {
        let sel_start = self.selection_start();
        let sel_end = self.selection_end();
        let line_start = self.position_from_line(line);
        let line_end = line_start + self.line_length(line);
        if sel_end <= line_start || sel_start >= line_end {
            return None;
        }
        Some((sel_start.max(line_start), sel_end.min(line_end)))
    }

    fn line_bounds(&self, line: usize) -> Option<(usize, usize)> {
        if self.selection_start() == self.selection_end() {
            return None;
        }
        match self.sel_mode {
            SelectionMode::Stream => self.stream_line_bounds(line),
            SelectionMode::Rectangular => self.rect_line_bounds(line),
        }
    }
}

impl TextBuffer for MemoryBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn get_text(&self) -> String {
        self.text.to_string()
    }

    fn get_text_range(&self, start: usize, end: usize) -> String {
        self.slice_to_string(start, end)
    }

    fn set_text(&mut self, text: &str) {
        let len = self.text.len_bytes();
        self.apply_edit(0, len, text);
    }

    fn clear(&mut self) {
        let len = self.text.len_bytes();
        self.apply_edit(0, len, "");
    }

    fn len(&self) -> usize {
        self.text.len_bytes()
    }

    fn line_from_position(&self, pos: usize) -> usize {
        self.text.byte_to_line(pos.min(self.text.len_bytes()))
    }

    fn position_from_line(&self, line: usize) -> usize {
        if line >= self.text.len_lines() {
            self.text.len_bytes()
        } else {
            self.text.line_to_byte(line)
        }
    }

    fn line_count(&self) -> usize {
        self.text.len_lines()
    }

    fn line_length(&self, line: usize) -> usize {
        self.position_from_line(line + 1) - self.position_from_line(line)
    }

    fn position_after(&self, pos: usize) -> usize {
        let len = self.text.len_bytes();
        if pos >= len {
            return len;
        }
        let ch = self.text.byte_to_char(pos);
        self.text.char_to_byte(ch + 1)
    }

    fn selection_start(&self) -> usize {
        self.sel_anchor.min(self.sel_caret)
    }

    fn selection_end(&self) -> usize {
        self.sel_anchor.max(self.sel_caret)
    }

    fn set_selection_start(&mut self, pos: usize) {
        self.sel_anchor = self.clamp_boundary(pos);
    }

    fn set_selection_end(&mut self, pos: usize) {
        self.sel_caret = self.clamp_boundary(pos);
    }

    fn goto_pos(&mut self, pos: usize) {
        let pos = self.clamp_boundary(pos);
        self.sel_anchor = pos;
        self.sel_caret = pos;
        self.sel_mode = SelectionMode::Stream;
        let line = self.line_from_position(pos);
        self.scroll_line_into_view(line);
    }

    fn selection_mode(&self) -> SelectionMode {
        self.sel_mode
    }

    fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.sel_mode = mode;
    }

    fn selected_line_count(&self) -> usize {
        let first = self.line_from_position(self.selection_start());
        let last = self.line_from_position(self.selection_end());
        last - first + 1
    }

    fn line_sel_start(&self, line: usize) -> Option<usize> {
        self.line_bounds(line).map(|(start, _)| start)
    }

    fn line_sel_end(&self, line: usize) -> Option<usize> {
        self.line_bounds(line).map(|(_, end)| end)
    }

    fn find_next(
        &self,
        range: Range<usize>,
        pattern: &str,
        flags: SearchFlags,
    ) -> Option<Range<usize>> {
        if pattern.is_empty() {
            return None;
        }
        let re = compile_search_regex(pattern, flags)?;
        let full = self.text.to_string();
        let len = full.len();
        let start = self.clamp_boundary(range.start.min(len));
        let end = self.clamp_boundary(range.end.min(len));

        let mut pos = start;
        let found = loop {
            if pos > len || pos > end {
                break None;
            }
            let Some(m) = re.find_at(&full, pos) else {
                break None;
            };
            if m.start() > end {
                break None;
            }
            if m.end() > end {
                // Partial match at the window edge; try again from the next boundary.
                let next = next_char_boundary(&full, m.start());
                if next <= pos {
                    break None;
                }
                pos = next;
                continue;
            }
            if (flags.whole_word || flags.word_start)
                && !(m.end() > m.start() && word_edges_ok(&full, m.start(), m.end(), flags))
            {
                let next = if m.end() > m.start() {
                    m.end()
                } else {
                    next_char_boundary(&full, m.start())
                };
                if next <= pos {
                    break None;
                }
                pos = next;
                continue;
            }
            break Some(m.start()..m.end());
        };

        *self.last_search.borrow_mut() = Some(re);
        found
    }

    fn find_prev(
        &self,
        range: Range<usize>,
        pattern: &str,
        flags: SearchFlags,
    ) -> Option<Range<usize>> {
        if pattern.is_empty() {
            return None;
        }
        let re = compile_search_regex(pattern, flags)?;
        let full = self.text.to_string();
        let len = full.len();
        let start = self.clamp_boundary(range.start.min(len));
        let end = self.clamp_boundary(range.end.min(len));

        let mut last = None;
        for m in re.find_iter(&full) {
            if m.start() >= end {
                break;
            }
            if m.start() < start || m.end() > end || m.start() == m.end() {
                continue;
            }
            if (flags.whole_word || flags.word_start)
                && !word_edges_ok(&full, m.start(), m.end(), flags)
            {
                continue;
            }
            last = Some(m.start()..m.end());
        }

        *self.last_search.borrow_mut() = Some(re);
        last
    }

    fn set_target_range(&mut self, start: usize, end: usize) {
        let start = self.clamp_boundary(start);
        let end = self.clamp_boundary(end.max(start));
        self.target = start..end;
    }

    fn replace_target(&mut self, text: &str, is_regex: bool) -> usize {
        let target = self.target.clone();
        let replacement = if is_regex {
            let re = self.last_search.borrow().clone();
            match re {
                Some(re) => {
                    let slice = self.slice_to_string(target.start, target.end);
                    match re.captures(&slice) {
                        Some(caps) => {
                            let mut out = String::new();
                            caps.expand(text, &mut out);
                            out
                        }
                        None => text.to_owned(),
                    }
                }
                None => text.to_owned(),
            }
        } else {
            text.to_owned()
        };

        let inserted = self.apply_edit(target.start, target.end, &replacement);
        self.target = target.start..target.start + inserted;
        inserted
    }

    fn set_undo_collection(&mut self, enabled: bool) {
        self.collect_undo = enabled;
    }

    fn empty_undo_buffer(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.pending.clear();
        self.group_depth = 0;
        self.edit_counter = 0;
        self.save_counter = 0;
    }

    fn undo(&mut self) {
        let Some(group) = self.undo_stack.pop() else {
            return;
        };
        for edit in group.iter().rev() {
            let end = edit.pos + edit.inserted.len();
            self.splice(edit.pos, end, &edit.deleted);
        }
        self.redo_stack.push(group);
        self.edit_counter -= 1;
        self.clamp_selection();
    }

    fn redo(&mut self) {
        let Some(group) = self.redo_stack.pop() else {
            return;
        };
        for edit in &group {
            let end = edit.pos + edit.deleted.len();
            self.splice(edit.pos, end, &edit.inserted);
        }
        self.undo_stack.push(group);
        self.edit_counter += 1;
        self.clamp_selection();
    }

    fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn start_undo_action(&mut self) {
        if self.group_depth == 0 {
            self.pending.clear();
        }
        self.group_depth += 1;
    }

    fn end_undo_action(&mut self) {
        self.group_depth = self.group_depth.saturating_sub(1);
        if self.group_depth == 0 && !self.pending.is_empty() {
            let group = std::mem::take(&mut self.pending);
            self.undo_stack.push(group);
            self.edit_counter += 1;
        }
    }

    fn set_read_only(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    fn set_eol_mode(&mut self, mode: EolMode) {
        self.eol_mode = mode;
    }

    fn eol_mode(&self) -> EolMode {
        self.eol_mode
    }

    fn convert_eols(&mut self, mode: EolMode) {
        let current = self.text.to_string();
        let converted = mode.convert(&current);
        if converted != current {
            let len = self.text.len_bytes();
            self.apply_edit(0, len, &converted);
        }
        self.eol_mode = mode;
    }

    fn is_modified(&self) -> bool {
        self.edit_counter != self.save_counter
    }

    fn set_save_point(&mut self) {
        self.save_counter = self.edit_counter;
    }

    fn ensure_line_visible(&mut self, line: usize) {
        self.scroll_line_into_view(line);
    }

    fn scroll_to_line(&mut self, line: usize, percent_of_view: f32) {
        let offset = (self.view_lines as f32 * percent_of_view) as usize;
        self.scroll_top = line.saturating_sub(offset);
    }

    fn is_line_in_view(&self, line: usize) -> bool {
        line >= self.scroll_top && line < self.scroll_top + self.view_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edit_and_lines() {
        let mut buffer = MemoryBuffer::from_text("one\ntwo\nthree\n");
        assert_eq!(buffer.line_count(), 4);
        assert_eq!(buffer.position_from_line(1), 4);
        assert_eq!(buffer.line_length(1), 4);
        assert_eq!(buffer.line_from_position(9), 2);

        buffer.set_target_range(4, 7);
        buffer.replace_target("2", false);
        assert_eq!(buffer.get_text(), "one\n2\nthree\n");
    }

    #[test]
    fn test_undo_redo_single_edits() {
        let mut buffer = MemoryBuffer::new();
        buffer.set_text("hello");
        buffer.set_target_range(5, 5);
        buffer.replace_target(" world", false);
        assert_eq!(buffer.get_text(), "hello world");

        buffer.undo();
        assert_eq!(buffer.get_text(), "hello");
        buffer.undo();
        assert_eq!(buffer.get_text(), "");
        buffer.redo();
        buffer.redo();
        assert_eq!(buffer.get_text(), "hello world");
    }

    #[test]
    fn test_undo_group_is_one_step() {
        let mut buffer = MemoryBuffer::from_text("abc");
        buffer.start_undo_action();
        buffer.set_target_range(0, 1);
        buffer.replace_target("x", false);
        buffer.set_target_range(2, 3);
        buffer.replace_target("y", false);
        buffer.end_undo_action();
        assert_eq!(buffer.get_text(), "xby");

        buffer.undo();
        assert_eq!(buffer.get_text(), "abc");
        buffer.redo();
        assert_eq!(buffer.get_text(), "xby");
    }

    #[test]
    fn test_modified_tracks_save_point_through_undo() {
        let mut buffer = MemoryBuffer::from_text("a");
        assert!(!buffer.is_modified());
        buffer.set_target_range(1, 1);
        buffer.replace_target("b", false);
        assert!(buffer.is_modified());
        buffer.undo();
        assert!(!buffer.is_modified());
        buffer.redo();
        assert!(buffer.is_modified());
        buffer.set_save_point();
        assert!(!buffer.is_modified());
    }

    #[test]
    fn test_undo_collection_toggle() {
        let mut buffer = MemoryBuffer::new();
        buffer.set_undo_collection(false);
        buffer.set_text("seeded");
        buffer.set_undo_collection(true);
        buffer.empty_undo_buffer();
        assert!(!buffer.can_undo());
        assert!(!buffer.is_modified());
    }

    #[test]
    fn test_find_whole_word() {
        let buffer = MemoryBuffer::from_text("foobar foo barfoo foo");
        let flags = SearchFlags {
            whole_word: true,
            ..Default::default()
        };
        let len = buffer.len();
        let m = buffer.find_next(0..len, "foo", flags).unwrap();
        assert_eq!((m.start, m.end), (7, 10));
        let m = buffer.find_next(m.end..len, "foo", flags).unwrap();
        assert_eq!((m.start, m.end), (18, 21));
    }

    #[test]
    fn test_find_word_start() {
        let buffer = MemoryBuffer::from_text("foobar barfoo");
        let flags = SearchFlags {
            word_start: true,
            ..Default::default()
        };
        let m = buffer.find_next(0..buffer.len(), "foo", flags).unwrap();
        assert_eq!((m.start, m.end), (0, 3));
        assert!(buffer.find_next(1..buffer.len(), "foo", flags).is_none());
    }

    #[test]
    fn test_find_case_insensitive() {
        let buffer = MemoryBuffer::from_text("Hello HELLO hello");
        let flags = SearchFlags {
            case_sensitive: false,
            ..Default::default()
        };
        let m = buffer.find_next(1..buffer.len(), "hello", flags).unwrap();
        assert_eq!((m.start, m.end), (6, 11));
        let m = buffer.find_prev(0..buffer.len(), "HELLO", flags).unwrap();
        assert_eq!((m.start, m.end), (12, 17));
    }

    #[test]
    fn test_regex_capture_replacement() {
        let mut buffer = MemoryBuffer::from_text("item42");
        let flags = SearchFlags {
            regex: true,
            ..Default::default()
        };
        let m = buffer
            .find_next(0..buffer.len(), r"item(\d+)", flags)
            .unwrap();
        buffer.set_target_range(m.start, m.end);
        let new_len = buffer.replace_target("№$1", true);
        assert_eq!(buffer.get_text(), "№42");
        assert_eq!(new_len, "№42".len());
    }

    #[test]
    fn test_empty_regex_match_at_range_end() {
        let buffer = MemoryBuffer::from_text("ab");
        let flags = SearchFlags {
            regex: true,
            ..Default::default()
        };
        let m = buffer.find_next(0..2, "$", flags).unwrap();
        assert_eq!((m.start, m.end), (2, 2));
    }

    #[test]
    fn test_rectangular_line_bounds() {
        let mut buffer = MemoryBuffer::from_text("alpha\nbe\ngamma\n");
        // Columns 1..4 across the three lines.
        buffer.set_selection_start(1);
        buffer.set_selection_end(buffer.position_from_line(2) + 4);
        buffer.set_selection_mode(SelectionMode::Rectangular);

        assert_eq!(buffer.line_sel_start(0), Some(1));
        assert_eq!(buffer.line_sel_end(0), Some(4));
        // "be" is shorter than the block: clamped to its content.
        assert_eq!(buffer.line_sel_start(1), Some(buffer.position_from_line(1) + 1));
        assert_eq!(buffer.line_sel_end(1), Some(buffer.position_from_line(1) + 2));
        assert_eq!(buffer.line_sel_end(2), Some(buffer.position_from_line(2) + 4));
        assert_eq!(buffer.line_sel_start(3), None);
    }

    #[test]
    fn test_convert_eols_is_undoable() {
        let mut buffer = MemoryBuffer::from_text("a\r\nb\r\n");
        buffer.convert_eols(EolMode::Lf);
        assert_eq!(buffer.get_text(), "a\nb\n");
        assert_eq!(buffer.eol_mode(), EolMode::Lf);
        buffer.undo();
        assert_eq!(buffer.get_text(), "a\r\nb\r\n");
    }

    #[test]
    fn test_readonly_blocks_edits() {
        let mut buffer = MemoryBuffer::from_text("keep");
        buffer.set_read_only(true);
        buffer.set_target_range(0, 4);
        assert_eq!(buffer.replace_target("drop", false), 0);
        assert_eq!(buffer.get_text(), "keep");
    }

    #[test]
    fn test_scroll_model() {
        let text = "line\n".repeat(100);
        let mut buffer = MemoryBuffer::from_text(&text);
        buffer.set_view_lines(10);
        assert!(buffer.is_line_in_view(5));
        assert!(!buffer.is_line_in_view(50));
        buffer.scroll_to_line(50, 0.3);
        assert_eq!(buffer.scroll_top(), 47);
        assert!(buffer.is_line_in_view(50));
    }
}
