use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;
use std::thread::sleep;
use std::time::Duration;

use document_core::{
    AutoConfirm, Charset, CloseDecision, ConfirmPolicy, DocumentConfig, DocumentEvent,
    DocumentManager, FileType, TextBuffer,
};
use document_core_buffer::MemoryBuffer;

fn manager_with(config: DocumentConfig) -> DocumentManager<MemoryBuffer> {
    DocumentManager::new(config, Box::new(AutoConfirm::default()), MemoryBuffer::new)
}

fn manager() -> DocumentManager<MemoryBuffer> {
    manager_with(DocumentConfig::default())
}

fn record_events(m: &mut DocumentManager<MemoryBuffer>) -> Rc<RefCell<Vec<DocumentEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    m.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    events
}

/// Answers close prompts from a queue, for scripting multi-document flows.
struct QueuePolicy {
    close_decisions: VecDeque<CloseDecision>,
}

impl ConfirmPolicy for QueuePolicy {
    fn close_unsaved(&mut self, _name: &str) -> CloseDecision {
        self.close_decisions
            .pop_front()
            .unwrap_or(CloseDecision::Discard)
    }
    fn reload_changed_file(&mut self, _name: &str) -> bool {
        false
    }
    fn wrap_search(&mut self, _query: &str) -> bool {
        false
    }
    fn resave_missing_file(&mut self, _name: &str) -> bool {
        false
    }
}

fn dirty_untitled(m: &mut DocumentManager<MemoryBuffer>) -> document_core::DocumentId {
    let id = m.new_file(None, None, None);
    {
        let buf = m.document_mut(id).unwrap().buffer_mut();
        buf.set_target_range(0, 0);
        buf.replace_target("draft", false);
    }
    m.record_buffer_edit(id);
    id
}

#[test]
fn test_indent_detection_prefers_dominant_tabs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tabs.txt");
    let mut content = "\tindented\n".repeat(8);
    content.push_str(&"  spaced\n".repeat(2));
    fs::write(&path, &content).unwrap();

    // Default is spaces; 8 tab lines vs 2 space lines satisfies tabs > 2 * spaces.
    let config = DocumentConfig {
        use_tabs: false,
        ..Default::default()
    };
    let mut m = manager_with(config);
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(m.document(id).unwrap().use_tabs());
}

#[test]
fn test_indent_detection_hysteresis_favours_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.txt");
    // 2 tab lines vs 3 space lines: not enough skew to leave the tabs default
    // (3 > 2 * 2 is false).
    let mut content = "\tindented\n".repeat(2);
    content.push_str(&"  spaced\n".repeat(3));
    fs::write(&path, &content).unwrap();

    let config = DocumentConfig {
        use_tabs: true,
        ..Default::default()
    };
    let mut m = manager_with(config);
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(m.document(id).unwrap().use_tabs());

    // 5 space lines vs 2 tab lines crosses the 2:1 threshold (5 > 4).
    let path2 = dir.path().join("spacier.txt");
    let mut content = "\tindented\n".repeat(2);
    content.push_str(&"  spaced\n".repeat(5));
    fs::write(&path2, &content).unwrap();
    let id2 = m.open_file(&path2.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(!m.document(id2).unwrap().use_tabs());
}

#[test]
fn test_indent_detection_keeps_default_without_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.txt");
    fs::write(&path, "no\nindentation\nanywhere\n").unwrap();

    let config = DocumentConfig {
        use_tabs: true,
        ..Default::default()
    };
    let mut m = manager_with(config);
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(m.document(id).unwrap().use_tabs());
}

#[test]
fn test_makefile_always_forces_tabs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Makefile");
    fs::write(&path, "  spaced\n".repeat(10)).unwrap();

    let config = DocumentConfig {
        use_tabs: false,
        ..Default::default()
    };
    let mut m = manager_with(config);
    m.register_filetype(
        FileType::new("Make")
            .with_filenames(&["Makefile", "makefile", "GNUmakefile"])
            .with_forced_tabs(),
    );
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(m.document(id).unwrap().use_tabs());
}

#[test]
fn test_new_file_converts_seed_text_line_endings() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("a\r\nb\rc"));
    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "a\nb\nc");
    assert!(!doc.is_changed());
    assert!(!doc.buffer().can_undo());
}

#[test]
fn test_new_file_if_non_open() {
    let mut m = manager();
    assert!(m.new_file_if_non_open().is_some());
    assert!(m.new_file_if_non_open().is_none());
    assert_eq!(m.len(), 1);
}

#[test]
fn test_close_prompts_and_cancel_keeps_document() {
    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(QueuePolicy {
            close_decisions: VecDeque::from([CloseDecision::Cancel]),
        }),
        MemoryBuffer::new,
    );
    let id = dirty_untitled(&mut m);
    assert!(!m.close(id));
    assert!(m.document(id).is_some());
}

#[test]
fn test_close_discard() {
    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(QueuePolicy {
            close_decisions: VecDeque::from([CloseDecision::Discard]),
        }),
        MemoryBuffer::new,
    );
    let events = record_events(&mut m);
    let id = dirty_untitled(&mut m);
    assert!(m.close(id));
    assert!(m.document(id).is_none());
    assert!(m.is_empty());
    assert!(events.borrow().iter().any(|e| matches!(e, DocumentEvent::Closing(i) if *i == id)));
}

#[test]
fn test_close_save_decision_saves_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kept.txt");

    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(QueuePolicy {
            close_decisions: VecDeque::from([CloseDecision::Save]),
        }),
        MemoryBuffer::new,
    );
    let id = m.new_file(Some(&path.to_string_lossy()), None, Some("keep me"));
    {
        let buf = m.document_mut(id).unwrap().buffer_mut();
        buf.set_target_range(0, 0);
        buf.replace_target("!", false);
    }
    m.record_buffer_edit(id);

    assert!(m.close(id));
    assert_eq!(fs::read_to_string(&path).unwrap(), "!keep me");
    assert!(m.is_empty());
}

#[test]
fn test_close_all_aborts_on_any_cancel() {
    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(QueuePolicy {
            close_decisions: VecDeque::from([CloseDecision::Discard, CloseDecision::Cancel]),
        }),
        MemoryBuffer::new,
    );
    let a = dirty_untitled(&mut m);
    let b = dirty_untitled(&mut m);

    assert!(!m.close_all());
    // The whole operation aborted; both documents are untouched and still dirty.
    assert!(m.document(a).is_some_and(|d| d.is_changed()));
    assert!(m.document(b).is_some_and(|d| d.is_changed()));
}

#[test]
fn test_close_all_discards_everything() {
    let mut m = manager();
    dirty_untitled(&mut m);
    dirty_untitled(&mut m);
    let clean = m.new_file(None, None, None);

    assert!(m.close_all());
    assert!(m.is_empty());
    assert!(m.document(clean).is_none());
}

#[test]
fn test_close_all_skips_recent_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recent.txt");
    fs::write(&path, "x").unwrap();

    let mut m = manager();
    m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    let events = record_events(&mut m);

    assert!(m.close_all());
    // Bulk closes do not touch the recent-files list.
    assert!(!events.borrow().iter().any(|e| matches!(e, DocumentEvent::RecentFileAdded(_))));
}

#[test]
fn test_check_disk_status_reloads_newer_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched.txt");
    fs::write(&path, "before").unwrap();

    let mut m = manager();
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();

    sleep(Duration::from_millis(50));
    fs::write(&path, "after").unwrap();

    assert!(m.check_disk_status(id, true));
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "after");
    // The adopted mtime stops the same change from re-prompting.
    assert!(!m.check_disk_status(id, true));
}

#[test]
fn test_check_disk_status_adopts_mtime_when_reload_declined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("declined.txt");
    fs::write(&path, "before").unwrap();

    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(AutoConfirm {
            reload: false,
            ..Default::default()
        }),
        MemoryBuffer::new,
    );
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();

    sleep(Duration::from_millis(50));
    fs::write(&path, "after").unwrap();

    assert!(m.check_disk_status(id, true));
    assert_eq!(m.document(id).unwrap().buffer().get_text(), "before");
    assert!(!m.check_disk_status(id, true));
}

#[test]
fn test_check_disk_status_missing_file_marks_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.txt");
    fs::write(&path, "x").unwrap();

    let mut m = DocumentManager::new(
        DocumentConfig::default(),
        Box::new(AutoConfirm {
            resave: true,
            ..Default::default()
        }),
        MemoryBuffer::new,
    );
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    let events = record_events(&mut m);

    fs::remove_file(&path).unwrap();
    assert!(!m.check_disk_status(id, true));
    assert!(m.document(id).unwrap().is_changed());
    assert!(events.borrow().iter().any(|e| matches!(e, DocumentEvent::ResaveRequested(i) if *i == id)));
}

#[test]
fn test_check_disk_status_throttles_and_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calm.txt");
    fs::write(&path, "x").unwrap();

    let mut m = manager();
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    // Within the poll interval and not forced: no check happens.
    assert!(!m.check_disk_status(id, false));

    let config = DocumentConfig {
        disk_check_timeout_secs: 0,
        ..Default::default()
    };
    let mut m = manager_with(config);
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(!m.check_disk_status(id, true));
}

#[test]
fn test_check_disk_status_skips_unsaved_documents() {
    let mut m = manager();
    let id = m.new_file(None, None, Some("never saved"));
    assert!(!m.check_disk_status(id, true));
}

#[test]
fn test_reload_clears_ledger_and_keeps_indent_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reloaded.txt");
    fs::write(&path, "\tone\n\ttwo\n\tthree\n").unwrap();

    let config = DocumentConfig {
        use_tabs: false,
        ..Default::default()
    };
    let mut m = manager_with(config);
    let id = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert!(m.document(id).unwrap().use_tabs());

    m.set_use_bom(id, true);
    assert_eq!(m.document(id).unwrap().undo_ledger_depth(), 1);

    fs::write(&path, "  one\n  two\n  three\n").unwrap();
    let reloaded = m.reload_file(id, None).unwrap();
    assert_eq!(reloaded, id);

    let doc = m.document(id).unwrap();
    assert_eq!(doc.buffer().get_text(), "  one\n  two\n  three\n");
    assert_eq!(doc.undo_ledger_depth(), 0);
    assert!(!doc.has_bom());
    assert!(!doc.is_changed());
    // Indentation is not re-detected on reload.
    assert!(doc.use_tabs());
}

#[test]
fn test_clone_document_copies_content_and_properties() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("origin.txt");
    fs::write(&path, "clone me").unwrap();

    let mut m = manager();
    let id = m
        .open_file(&path.to_string_lossy(), 0, true, None, Some(Charset::Latin1))
        .unwrap();
    let copy = m.clone_document(id, None).unwrap();
    assert_ne!(copy, id);

    let doc = m.document(copy).unwrap();
    assert_eq!(doc.buffer().get_text(), "clone me");
    assert_eq!(doc.encoding(), Charset::Latin1);
    assert!(doc.readonly());
    assert!(doc.display_path().is_none());
}

#[test]
fn test_registry_positions_and_slot_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = manager();
    let mut ids = Vec::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        let path = dir.path().join(name);
        fs::write(&path, name).unwrap();
        ids.push(m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap());
    }

    assert_eq!(m.find_by_position(1), Some(ids[1]));
    assert_eq!(m.position_of(ids[2]), Some(2));
    let buffer_id = m.document(ids[0]).unwrap().buffer().id();
    assert_eq!(m.find_by_buffer(buffer_id), Some(ids[0]));

    assert!(m.close(ids[1]));
    // The stale handle no longer resolves, even though the slot is reused.
    assert!(m.document(ids[1]).is_none());

    let path = dir.path().join("d.txt");
    fs::write(&path, "d").unwrap();
    let d = m.open_file(&path.to_string_lossy(), 0, false, None, None).unwrap();
    assert_eq!(d.index(), ids[1].index());
    assert!(m.document(ids[1]).is_none());
    // Tab order: a, c, d.
    assert_eq!(m.find_by_position(0), Some(ids[0]));
    assert_eq!(m.find_by_position(1), Some(ids[2]));
    assert_eq!(m.find_by_position(2), Some(d));
}

#[test]
fn test_batch_restyles_new_and_keyword_documents() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["pre.c", "a.c", "b.txt"] {
        fs::write(dir.path().join(name), "content\n").unwrap();
    }

    let mut m = manager();
    m.set_type_keyword_check(|| true);
    m.register_filetype(
        FileType::new("C")
            .with_extensions(&["c", "h"])
            .with_type_keywords(),
    );

    let pre = m
        .open_file(&dir.path().join("pre.c").to_string_lossy(), 0, false, None, None)
        .unwrap();

    let events = record_events(&mut m);
    m.begin_batch();
    let a = m
        .open_file(&dir.path().join("a.c").to_string_lossy(), 0, false, None, None)
        .unwrap();
    let b = m
        .open_file(&dir.path().join("b.txt").to_string_lossy(), 0, false, None, None)
        .unwrap();

    // Styling is suppressed while the batch is active.
    assert!(!events.borrow().iter().any(|e| matches!(e, DocumentEvent::RestyleRequested(_))));

    m.end_batch();
    let restyled: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            DocumentEvent::RestyleRequested(i) => Some(*i),
            _ => None,
        })
        .collect();
    // Batch-new documents unconditionally, plus the keyword-using pre-existing one.
    assert!(restyled.contains(&a));
    assert!(restyled.contains(&b));
    assert!(restyled.contains(&pre));
}

#[test]
fn test_batch_without_keyword_change_skips_old_documents() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["pre.c", "a.c"] {
        fs::write(dir.path().join(name), "content\n").unwrap();
    }

    let mut m = manager();
    m.set_type_keyword_check(|| false);
    m.register_filetype(
        FileType::new("C")
            .with_extensions(&["c"])
            .with_type_keywords(),
    );

    m.open_file(&dir.path().join("pre.c").to_string_lossy(), 0, false, None, None)
        .unwrap();

    let events = record_events(&mut m);
    m.begin_batch();
    let a = m
        .open_file(&dir.path().join("a.c").to_string_lossy(), 0, false, None, None)
        .unwrap();
    m.end_batch();

    let restyled: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            DocumentEvent::RestyleRequested(i) => Some(*i),
            _ => None,
        })
        .collect();
    assert_eq!(restyled, vec![a]);
}

#[test]
#[should_panic(expected = "restyle batches cannot be nested")]
fn test_batch_nesting_is_a_programming_fault() {
    let mut m = manager();
    m.begin_batch();
    m.begin_batch();
}

#[test]
fn test_open_files_uses_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = ["x.txt", "y.txt"]
        .iter()
        .map(|n| {
            let p = dir.path().join(n);
            fs::write(&p, "t").unwrap();
            p.to_string_lossy().into_owned()
        })
        .collect();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    let mut m = manager();
    let opened = m.open_files(&path_refs, false, None, None);
    assert_eq!(opened.len(), 2);
    assert_eq!(m.len(), 2);
}
