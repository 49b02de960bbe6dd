//! Notification points and injected decision policies.
//!
//! The core never imports UI logic. Collaborators (tab bar, tagger, status bar, recent-files
//! menu) subscribe to [`DocumentEvent`]s, which are fire-and-forget: the core does not depend
//! on any return value. Decisions the original design asked the user for through modal dialogs
//! (save before close? reload? wrap the search?) are routed through the [`ConfirmPolicy`]
//! trait instead, so the core runs headlessly under an [`AutoConfirm`] policy.

use crate::registry::DocumentId;

/// A notification emitted by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A document record was created (before its content is loaded).
    Created(DocumentId),
    /// A document finished loading from disk.
    Opened(DocumentId),
    /// A document was written to disk.
    Saved(DocumentId),
    /// A document is about to be torn down; collaborators should detach.
    Closing(DocumentId),
    /// An already-open document was surfaced again (e.g. re-opening its path).
    Focused(DocumentId),
    /// The document's filetype reference changed.
    FiletypeChanged(DocumentId),
    /// The composite changed-state flag was recomputed.
    TextChangedState(DocumentId, bool),
    /// The document should be re-styled by the highlighting collaborator.
    RestyleRequested(DocumentId),
    /// The file vanished from disk and the user asked to save it again.
    ResaveRequested(DocumentId),
    /// A path should be recorded in the host's recent-files list.
    RecentFileAdded(String),
    /// A transient status line.
    StatusMessage(String),
    /// A user-visible error.
    ErrorMessage(String),
    /// An audible/visual alert (failed search, nothing replaced).
    Bell,
}

/// Callback type for [`Notifier::subscribe`].
pub type EventCallback = Box<dyn FnMut(&DocumentEvent)>;

/// Fans events out to subscribers.
#[derive(Default)]
pub struct Notifier {
    callbacks: Vec<EventCallback>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriber_count", &self.callbacks.len())
            .finish()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers cannot be removed; they live as long as the notifier.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&DocumentEvent) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Deliver `event` to every subscriber.
    pub fn emit(&mut self, event: DocumentEvent) {
        for cb in &mut self.callbacks {
            cb(&event);
        }
    }

    /// Emit a status message.
    pub fn status(&mut self, message: impl Into<String>) {
        self.emit(DocumentEvent::StatusMessage(message.into()));
    }

    /// Emit a user-visible error message.
    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(DocumentEvent::ErrorMessage(message.into()));
    }

    /// Emit an alert.
    pub fn bell(&mut self) {
        self.emit(DocumentEvent::Bell);
    }
}

/// The user's answer to a save-before-close prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Save the document, then close it.
    Save,
    /// Close without saving.
    Discard,
    /// Abort the close.
    Cancel,
}

/// Injected decision-maker for the prompts that block an operation.
///
/// An interactive host shows a dialog; a headless host answers from configuration.
pub trait ConfirmPolicy {
    /// The document `display_name` has unsaved changes and is about to close.
    fn close_unsaved(&mut self, display_name: &str) -> CloseDecision;
    /// The file on disk is newer than the buffer; reload it?
    fn reload_changed_file(&mut self, display_name: &str) -> bool;
    /// `query` was not found in the searched part of the document; wrap around?
    fn wrap_search(&mut self, query: &str) -> bool;
    /// The file vanished from disk; try to save it again?
    fn resave_missing_file(&mut self, display_name: &str) -> bool;
}

/// A non-interactive policy with fixed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConfirm {
    /// Answer for [`ConfirmPolicy::close_unsaved`].
    pub close: CloseDecision,
    /// Answer for [`ConfirmPolicy::reload_changed_file`].
    pub reload: bool,
    /// Answer for [`ConfirmPolicy::wrap_search`].
    pub wrap: bool,
    /// Answer for [`ConfirmPolicy::resave_missing_file`].
    pub resave: bool,
}

impl Default for AutoConfirm {
    fn default() -> Self {
        Self {
            close: CloseDecision::Discard,
            reload: true,
            wrap: true,
            resave: false,
        }
    }
}

impl ConfirmPolicy for AutoConfirm {
    fn close_unsaved(&mut self, _display_name: &str) -> CloseDecision {
        self.close
    }

    fn reload_changed_file(&mut self, _display_name: &str) -> bool {
        self.reload
    }

    fn wrap_search(&mut self, _query: &str) -> bool {
        self.wrap
    }

    fn resave_missing_file(&mut self, _display_name: &str) -> bool {
        self.resave
    }
}
