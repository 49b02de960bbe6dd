use std::cell::RefCell;
use std::rc::Rc;

use document_core::{
    AutoConfirm, DocumentConfig, DocumentEvent, DocumentId, DocumentManager, SearchFlags,
    SelectionMode, TextBuffer,
};
use document_core_buffer::MemoryBuffer;
use pretty_assertions::assert_eq;

fn manager() -> DocumentManager<MemoryBuffer> {
    DocumentManager::new(
        DocumentConfig::default(),
        Box::new(AutoConfirm::default()),
        MemoryBuffer::new,
    )
}

fn open_with_text(m: &mut DocumentManager<MemoryBuffer>, text: &str) -> DocumentId {
    m.new_file(None, None, Some(text))
}

fn record_events(m: &mut DocumentManager<MemoryBuffer>) -> Rc<RefCell<Vec<DocumentEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    m.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    events
}

fn select_rect(
    m: &mut DocumentManager<MemoryBuffer>,
    id: DocumentId,
    start: usize,
    end: usize,
) {
    let buf = m.document_mut(id).unwrap().buffer_mut();
    buf.set_selection_start(start);
    buf.set_selection_end(end);
    buf.set_selection_mode(SelectionMode::Rectangular);
}

#[test]
fn test_rectangular_replace_works_per_line() {
    let mut m = manager();
    let id = open_with_text(&mut m, "xx aa xx\nxx aa xx\nxx aa xx");

    // Columns 3..5 on all three lines: the "aa" blocks.
    let line2 = m.document(id).unwrap().buffer().position_from_line(2);
    select_rect(&mut m, id, 3, line2 + 5);

    m.replace_in_selection(id, "a", "b", SearchFlags::default());

    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "xx bb xx\nxx bb xx\nxx bb xx");
    // The rectangular selection is rebuilt over the replaced block.
    assert_eq!(doc.buffer().selection_mode(), SelectionMode::Rectangular);
    assert_eq!(doc.buffer().selection_start(), 3);
    assert_eq!(doc.buffer().selection_end(), line2 + 5);
}

#[test]
fn test_rectangular_replace_only_touches_selected_columns() {
    let mut m = manager();
    let id = open_with_text(&mut m, "aa aa\naa aa\n");

    // Columns 0..2 on the two content lines: only the first "aa" of each line.
    let line1 = m.document(id).unwrap().buffer().position_from_line(1);
    select_rect(&mut m, id, 0, line1 + 2);

    m.replace_in_selection(id, "aa", "zz", SearchFlags::default());
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "zz aa\nzz aa\n");
}

#[test]
fn test_rectangular_replace_skips_rebuild_when_column_overflows() {
    let mut m = manager();
    let id = open_with_text(&mut m, "aa\nba x");

    // Block over columns 0..2 of both lines; the replacement widens line 0 well past the
    // length of the last line.
    let line1 = m.document(id).unwrap().buffer().position_from_line(1);
    select_rect(&mut m, id, 0, line1 + 2);

    m.replace_in_selection(id, "aa", "aaaaaa", SearchFlags::default());

    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "aaaaaa\nba x");
    // max column 6 does not fit "ba x": the selection rebuild is skipped, leaving the
    // edit-shifted selection in place instead of a wrapped one.
    assert_eq!(doc.buffer().selection_end(), 9);
}

#[test]
fn test_rectangular_replace_skips_lines_without_selection() {
    let mut m = manager();
    let id = open_with_text(&mut m, "xx aa\nx\nxx aa");

    // Columns 3..5: line 1 is too short to reach the block.
    let line2 = m.document(id).unwrap().buffer().position_from_line(2);
    select_rect(&mut m, id, 3, line2 + 5);

    m.replace_in_selection(id, "aa", "bb", SearchFlags::default());
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "xx bb\nx\nxx bb");
}

#[test]
fn test_stream_selection_replace_reselects_result() {
    let mut m = manager();
    let id = open_with_text(&mut m, "foo foo foo");

    {
        let buf = m.document_mut(id).unwrap().buffer_mut();
        buf.set_selection_start(4);
        buf.set_selection_end(11);
    }
    m.replace_in_selection(id, "foo", "ba", SearchFlags::default());

    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "foo ba ba");
    assert_eq!(doc.buffer().selection_start(), 4);
    assert_eq!(doc.buffer().selection_end(), 9);
}

#[test]
fn test_replace_in_selection_without_selection_alerts() {
    let mut m = manager();
    let events = record_events(&mut m);
    let id = open_with_text(&mut m, "text");

    m.document_mut(id).unwrap().buffer_mut().goto_pos(2);
    m.replace_in_selection(id, "t", "u", SearchFlags::default());

    assert_eq!(m.document(id).unwrap().buffer().get_text(), "text");
    assert!(events.borrow().iter().any(|e| matches!(e, DocumentEvent::Bell)));
}

#[test]
fn test_replace_in_selection_zero_matches_alerts_and_reports() {
    let mut m = manager();
    let events = record_events(&mut m);
    let id = open_with_text(&mut m, "abc def");

    {
        let buf = m.document_mut(id).unwrap().buffer_mut();
        buf.set_selection_start(0);
        buf.set_selection_end(7);
    }
    m.replace_in_selection(id, "zzz", "!", SearchFlags::default());

    assert_eq!(m.document(id).unwrap().buffer().get_text(), "abc def");
    assert!(events.borrow().iter().any(|e| matches!(e, DocumentEvent::Bell)));
    assert!(events.borrow().iter().any(
        |e| matches!(e, DocumentEvent::StatusMessage(s) if s.contains("No matches found"))
    ));
}

#[test]
fn test_rectangular_replace_is_one_undo_step() {
    let mut m = manager();
    let id = open_with_text(&mut m, "aa\naa\naa");

    let line2 = m.document(id).unwrap().buffer().position_from_line(2);
    select_rect(&mut m, id, 0, line2 + 2);
    m.replace_in_selection(id, "a", "b", SearchFlags::default());
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "bb\nbb\nbb");

    m.document_mut(id).unwrap().buffer_mut().undo();
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "aa\naa\naa");
}
