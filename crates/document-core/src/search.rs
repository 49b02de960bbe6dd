//! Search & replace engine.
//!
//! Operates purely through the [`TextBuffer`] adapter's primitives. Four layers:
//!
//! - [`search_bar_find`] — incremental toolbar search with a single silent wraparound
//! - [`find_text`] — dialog-style find, prompting (once) before wrapping
//! - [`replace_text`] — selection-guarded single replace
//! - [`replace_range`] / [`replace_in_selection`] / [`replace_all`] — the windowed bulk
//!   replace loop and its selection-aware wrappers
//!
//! Positions are byte offsets. The bulk loop is wrapped in one buffer-level undo group so a
//! whole replace-all is a single undo step.

use crate::buffer::{SearchFlags, SelectionMode, TextBuffer};
use crate::config::DocumentConfig;
use crate::document::Document;
use crate::events::{ConfirmPolicy, Notifier};

/// Incremental/toolbar search.
///
/// Anchors at the selection end (or the selection start when `incremental`, so that typing
/// grows the current match instead of skipping it), searches to the end of the buffer, and on
/// a miss wraps once over `[0, anchor + pattern length)`. An empty pattern is trivially found.
///
/// On a hit the match is selected, unfolded, and scrolled into view; on a miss the caret
/// returns to the anchor with the selection cleared.
pub fn search_bar_find<B: TextBuffer>(
    doc: &mut Document<B>,
    notifier: &mut Notifier,
    text: &str,
    flags: SearchFlags,
    incremental: bool,
) -> bool {
    if text.is_empty() {
        return true;
    }

    let start_pos = if incremental {
        doc.buffer().selection_start()
    } else {
        doc.buffer().selection_end()
    };
    let len = doc.buffer().len();

    let mut found = doc.buffer().find_next(start_pos..len, text, flags);
    if found.is_none() {
        let wrap_end = (start_pos + text.len()).min(len);
        found = doc.buffer().find_next(0..wrap_end, text, flags);
    }

    match found {
        Some(m) => {
            let line = doc.buffer().line_from_position(m.start);
            doc.buffer_mut().ensure_line_visible(line);
            doc.buffer_mut().set_selection_start(m.start);
            doc.buffer_mut().set_selection_end(m.end);
            if !doc.buffer().is_line_in_view(line) {
                doc.buffer_mut().scroll_to_line(line, 0.3);
            }
            true
        }
        None => {
            if !incremental {
                notifier.status(format!("\"{text}\" was not found."));
            }
            notifier.bell();
            doc.buffer_mut().goto_pos(start_pos);
            false
        }
    }
}

/// Dialog-style find. Returns the match start, or `None`.
///
/// Backward regex search is unsupported: the `regex` flag forces a forward search. An existing
/// selection is skipped past (the anchor moves to its near or far edge depending on direction)
/// so the current match is never trivially re-found.
///
/// On a miss over a sub-range of the buffer, the confirmation policy decides whether to wrap;
/// the wrap happens at most once. A miss over the entire buffer gives up immediately.
pub fn find_text<B: TextBuffer>(
    doc: &mut Document<B>,
    notifier: &mut Notifier,
    policy: &mut dyn ConfirmPolicy,
    config: &DocumentConfig,
    text: &str,
    flags: SearchFlags,
    backwards: bool,
    scroll: bool,
) -> Option<usize> {
    if text.is_empty() {
        return None;
    }
    let backwards = backwards && !flags.regex;

    let sel_start = doc.buffer().selection_start();
    let sel_end = doc.buffer().selection_end();
    if sel_end > sel_start {
        let skip_to = if backwards { sel_start } else { sel_end };
        doc.buffer_mut().goto_pos(skip_to);
    }

    let len = doc.buffer().len();
    let mut wrapped = false;
    loop {
        let caret = doc.buffer().selection_start();
        let found = if backwards {
            doc.buffer().find_prev(0..caret, text, flags)
        } else {
            doc.buffer().find_next(caret..len, text, flags)
        };

        if let Some(m) = found {
            let line = doc.buffer().line_from_position(m.start);
            doc.buffer_mut().ensure_line_visible(line);
            doc.buffer_mut().set_selection_start(m.start);
            doc.buffer_mut().set_selection_end(m.end);
            if scroll {
                doc.buffer_mut().scroll_to_line(line, 0.3);
            }
            return Some(m.start);
        }

        // If the miss covered the whole buffer (or we already wrapped once), give up.
        let searched_all =
            wrapped || (!backwards && sel_end == 0) || (backwards && sel_end == len);
        if searched_all {
            notifier.status(format!("\"{text}\" was not found."));
            notifier.bell();
            if wrapped {
                doc.buffer_mut().goto_pos(sel_start);
            }
            return None;
        }

        if config.always_wrap_search || policy.wrap_search(text) {
            doc.buffer_mut().goto_pos(if backwards { len } else { 0 });
            wrapped = true;
        } else {
            return None;
        }
    }
}

/// Replace the selection if it still matches, otherwise just prime the next find.
///
/// Returns the start of the replaced text, or `None` when no replacement was made. The
/// replacement only happens when re-searching from the selection finds the match exactly at the
/// selection start — this keeps a stale selection from swallowing unrelated text.
pub fn replace_text<B: TextBuffer>(
    doc: &mut Document<B>,
    notifier: &mut Notifier,
    policy: &mut dyn ConfirmPolicy,
    config: &DocumentConfig,
    find: &str,
    replace: &str,
    flags: SearchFlags,
    backwards: bool,
) -> Option<usize> {
    if find.is_empty() {
        return None;
    }
    let backwards = backwards && !flags.regex;

    let sel_start = doc.buffer().selection_start();
    let sel_end = doc.buffer().selection_end();
    if sel_end == sel_start {
        // No selection: find the next match so an interactive replace can follow up.
        find_text(doc, notifier, policy, config, find, flags, backwards, true);
        return None;
    }

    // Re-anchor so the search runs through the selection and can re-find it.
    let rewind_to = if backwards { sel_end } else { sel_start };
    doc.buffer_mut().goto_pos(rewind_to);

    let search_pos = find_text(doc, notifier, policy, config, find, flags, backwards, true);
    if search_pos != Some(sel_start) {
        return None;
    }

    let match_end = doc.buffer().selection_end();
    doc.buffer_mut().set_target_range(sel_start, match_end);
    let replace_len = doc.buffer_mut().replace_target(replace, flags.regex);
    doc.buffer_mut().set_selection_start(sel_start);
    doc.buffer_mut().set_selection_end(sel_start + replace_len);
    Some(sel_start)
}

/// Replace every match of `find` within `[start, end)`, tracking the window as the text shifts.
///
/// The whole loop is one buffer-level undo step. Termination guards:
/// - no further match in the window;
/// - a zero-length match paired with an empty replacement (nothing to do);
/// - a match extending past `end` (partial matches at the boundary are not replaced);
/// - a match starting exactly at `end` is replaced, then stops the loop (end-of-text regex
///   anchors would otherwise re-match forever).
///
/// Zero-length matches step one position forward after replacing so an empty-width pattern
/// cannot re-match the spot it just produced.
///
/// Returns the replacement count and the final window end (`None` when nothing matched), which
/// callers use to keep selections in sync with moved text.
pub fn replace_range<B: TextBuffer>(
    doc: &mut Document<B>,
    find: &str,
    replace: &str,
    flags: SearchFlags,
    start: usize,
    end: usize,
    scroll_to_match: bool,
) -> (usize, Option<usize>) {
    if find.is_empty() || doc.readonly() {
        return (0, None);
    }

    let buf = doc.buffer_mut();
    let mut start = start;
    let mut end = end;
    let mut count = 0usize;

    buf.start_undo_action();
    loop {
        let Some(m) = buf.find_next(start..end, find, flags) else {
            break;
        };
        let find_len = m.end - m.start;
        if find_len == 0 && replace.is_empty() {
            break;
        }
        if m.start + find_len > end {
            break;
        }

        let mut move_past_eol = 0usize;
        buf.set_target_range(m.start, m.end);
        if find_len == 0 {
            let next = buf.get_text_range(m.end, buf.position_after(m.end));
            if next == "\r" || next == "\n" {
                move_past_eol = 1;
            }
        }
        let replace_len = buf.replace_target(replace, flags.regex);
        count += 1;
        if m.start == end {
            break;
        }

        // Continue just past the replacement; the window end shifts with the length delta.
        start = m.start + replace_len + move_past_eol;
        if find_len == 0 {
            start = buf.position_after(start);
        }
        end = end - find_len + replace_len;
    }
    buf.end_undo_action();

    if count > 0 {
        if scroll_to_match {
            let pos = start.min(buf.len());
            let line = buf.line_from_position(pos);
            buf.goto_pos(pos);
            buf.ensure_line_visible(line);
        }
        (count, Some(end))
    } else {
        (0, None)
    }
}

/// Replace within the current selection.
///
/// A rectangular selection spanning multiple lines is replaced independently per line, then a
/// single rectangular selection is rebuilt from the original start to the widest replaced
/// column on the last affected line. When that column does not fit the last line's new length,
/// the rebuild is skipped entirely rather than producing a wrapped selection.
///
/// A stream selection delegates to [`replace_range`] over its span and re-selects the result.
/// Zero replacements raise an alert; a summary always goes to the status callback.
pub fn replace_in_selection<B: TextBuffer>(
    doc: &mut Document<B>,
    notifier: &mut Notifier,
    find: &str,
    replace: &str,
    flags: SearchFlags,
) {
    if find.is_empty() {
        return;
    }

    let sel_start = doc.buffer().selection_start();
    let mut sel_end = doc.buffer().selection_end();
    if sel_end == sel_start {
        notifier.bell();
        return;
    }

    let selected_lines = doc.buffer().selected_line_count();
    let rectangular =
        doc.buffer().selection_mode() == SelectionMode::Rectangular && selected_lines > 1;

    let mut count = 0usize;
    let mut replaced = false;
    let mut max_column = 0usize;
    let mut last_line = 0usize;

    if rectangular {
        doc.buffer_mut().start_undo_action();
        let first_line = doc.buffer().line_from_position(sel_start);
        let eol_len = doc.buffer().eol_mode().char_len();
        last_line = doc
            .buffer()
            .line_from_position(sel_end.saturating_sub(eol_len))
            .max(first_line);

        for line in first_line..first_line + selected_lines {
            let (Some(line_start), Some(line_end)) =
                (doc.buffer().line_sel_start(line), doc.buffer().line_sel_end(line))
            else {
                continue;
            };
            // Don't scroll per line; the selection is rebuilt below.
            let (line_count, new_end) =
                replace_range(doc, find, replace, flags, line_start, line_end, false);
            count += line_count;
            if let Some(new_end) = new_end {
                replaced = true;
                let line_pos = doc.buffer().position_from_line(line);
                max_column = max_column.max(new_end - line_pos);
            }
        }
        doc.buffer_mut().end_undo_action();
    } else {
        let (range_count, new_end) =
            replace_range(doc, find, replace, flags, sel_start, sel_end, true);
        count += range_count;
        if let Some(new_end) = new_end {
            replaced = true;
            sel_end = new_end;
        }
    }

    if replaced {
        if rectangular {
            // The rebuilt selection would wrap to the next line if the widest column overruns
            // the last line; skip the rebuild entirely in that case.
            let last_len = doc.buffer().line_length(last_line);
            if last_len.saturating_sub(1) >= max_column {
                let end_pos = doc.buffer().position_from_line(last_line) + max_column;
                doc.buffer_mut().set_selection_start(sel_start);
                doc.buffer_mut().set_selection_end(end_pos);
                doc.buffer_mut().set_selection_mode(SelectionMode::Rectangular);
            }
        } else {
            doc.buffer_mut().set_selection_start(sel_start);
            doc.buffer_mut().set_selection_end(sel_end);
        }
    } else {
        notifier.bell();
    }

    show_replace_summary(doc, notifier, count, find, replace);
}

/// Replace every match in the document. Returns whether anything was replaced.
pub fn replace_all<B: TextBuffer>(
    doc: &mut Document<B>,
    notifier: &mut Notifier,
    find: &str,
    replace: &str,
    flags: SearchFlags,
) -> bool {
    if find.is_empty() {
        return false;
    }
    let len = doc.buffer().len();
    let (count, _) = replace_range(doc, find, replace, flags, 0, len, true);
    show_replace_summary(doc, notifier, count, find, replace);
    count > 0
}

fn show_replace_summary<B: TextBuffer>(
    doc: &Document<B>,
    notifier: &mut Notifier,
    count: usize,
    find: &str,
    replace: &str,
) {
    if count == 0 {
        notifier.status(format!("No matches found for \"{find}\"."));
        return;
    }
    let name = doc.display_name();
    let noun = if count == 1 { "occurrence" } else { "occurrences" };
    notifier.status(format!(
        "{name}: replaced {count} {noun} of \"{find}\" with \"{replace}\"."
    ));
}
