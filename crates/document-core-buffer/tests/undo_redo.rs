use document_core::{
    AutoConfirm, Charset, DocumentConfig, DocumentId, DocumentManager, TextBuffer,
};
use document_core_buffer::MemoryBuffer;

fn manager() -> DocumentManager<MemoryBuffer> {
    DocumentManager::new(
        DocumentConfig::default(),
        Box::new(AutoConfirm::default()),
        MemoryBuffer::new,
    )
}

fn append_text(m: &mut DocumentManager<MemoryBuffer>, id: DocumentId, text: &str) {
    let buf = m.document_mut(id).unwrap().buffer_mut();
    let len = buf.len();
    buf.set_target_range(len, len);
    buf.replace_target(text, false);
    m.record_buffer_edit(id);
}

#[test]
fn test_undo_redo_interleaves_buffer_edit_and_bom_toggle() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("hello"));

    append_text(&mut m, id, " world");
    m.set_use_bom(id, true);

    let doc = m.document(id).unwrap();
    let before = (
        doc.buffer().get_text(),
        doc.encoding(),
        doc.has_bom(),
        doc.is_changed(),
    );
    assert_eq!(before.0, "hello world");
    assert!(before.2);
    assert!(before.3);

    // First undo takes back the BOM toggle, second the buffer edit.
    m.undo(id);
    let doc = m.document(id).unwrap();
    assert!(!doc.has_bom());
    assert_eq!(doc.buffer().get_text(), "hello world");
    assert!(doc.is_changed());

    m.undo(id);
    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "hello");
    assert!(!doc.is_changed());

    m.redo(id);
    m.redo(id);
    let doc = m.document(id).unwrap();
    let after = (
        doc.buffer().get_text(),
        doc.encoding(),
        doc.has_bom(),
        doc.is_changed(),
    );
    assert_eq!(before, after);
}

#[test]
fn test_undo_falls_back_to_native_buffer_history() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("abc"));

    // Edit the buffer without recording a ledger marker.
    {
        let buf = m.document_mut(id).unwrap().buffer_mut();
        buf.set_target_range(3, 3);
        buf.replace_target("def", false);
    }
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "abcdef");
    assert!(m.can_undo(id));

    m.undo(id);
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "abc");
}

#[test]
fn test_encoding_change_is_undoable_bookkeeping() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("text"));
    assert_eq!(m.document(id).unwrap().encoding(), Charset::Utf8);
    assert!(!m.document(id).unwrap().is_changed());

    m.set_encoding(id, Charset::Latin1);
    let doc = m.document(id).unwrap();
    assert_eq!(doc.encoding(), Charset::Latin1);
    // The buffer itself is untouched; only metadata differs from the saved snapshot.
    assert!(doc.is_changed());
    assert!(!doc.buffer().is_modified());

    m.undo(id);
    let doc = m.document(id).unwrap();
    assert_eq!(doc.encoding(), Charset::Utf8);
    assert!(!doc.is_changed());

    m.redo(id);
    assert_eq!(m.document(id).unwrap().encoding(), Charset::Latin1);
}

#[test]
fn test_metadata_push_preserves_redo_ledger() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("text"));

    m.set_use_bom(id, true);
    m.undo(id);
    assert_eq!(m.document(id).unwrap().redo_ledger_depth(), 1);

    // A metadata change must not clear the redo ledger.
    m.set_encoding(id, Charset::Latin1);
    assert_eq!(m.document(id).unwrap().redo_ledger_depth(), 1);

    m.redo(id);
    let doc = m.document(id).unwrap();
    assert!(doc.has_bom());
    assert_eq!(doc.encoding(), Charset::Latin1);
}

#[test]
fn test_set_same_value_pushes_nothing() {
    let mut m = manager();
    let id = m.new_file(None, None, None);

    m.set_use_bom(id, false);
    m.set_encoding(id, Charset::Utf8);
    let doc = m.document(id).unwrap();
    assert_eq!(doc.undo_ledger_depth(), 0);
    assert!(!doc.is_changed());
}

#[test]
fn test_can_undo_combines_ledger_and_buffer() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("x"));
    assert!(!m.can_undo(id));
    assert!(!m.can_redo(id));

    m.set_use_bom(id, true);
    assert!(m.can_undo(id));

    m.undo(id);
    assert!(!m.can_undo(id));
    assert!(m.can_redo(id));
}

#[test]
fn test_undo_recomputes_changed_from_scratch() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("stable"));

    m.set_use_bom(id, true);
    m.set_use_bom(id, false);
    // Two toggles later the BOM equals the saved snapshot again, but both steps are in the
    // ledger; walking one back makes the document dirty again.
    assert!(!m.document(id).unwrap().is_changed());
    m.undo(id);
    let doc = m.document(id).unwrap();
    assert!(doc.has_bom());
    assert!(doc.is_changed());
}
