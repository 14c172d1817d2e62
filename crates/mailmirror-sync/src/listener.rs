//! Observer interface between the engine and its embedder.

use crate::state::SyncState;

/// Callbacks the engine invokes as it mutates the message list and reaches
/// sync milestones.
///
/// All methods default to no-ops; implement what you need. Row-count deltas
/// are always announced before the corresponding cache write, so a UI can
/// mirror the list without ever observing a torn state.
pub trait MailboxListener {
    /// Rows `first..=last` (0-based) are about to appear.
    fn rows_about_to_be_inserted(&mut self, path: &str, first: usize, last: usize) {
        let _ = (path, first, last);
    }

    /// Rows `first..=last` have appeared.
    fn rows_inserted(&mut self, path: &str, first: usize, last: usize) {
        let _ = (path, first, last);
    }

    /// Rows `first..=last` are about to disappear.
    fn rows_about_to_be_removed(&mut self, path: &str, first: usize, last: usize) {
        let _ = (path, first, last);
    }

    /// Rows `first..=last` have disappeared.
    fn rows_removed(&mut self, path: &str, first: usize, last: usize) {
        let _ = (path, first, last);
    }

    /// The flags shown at `row` changed.
    fn flags_updated(&mut self, path: &str, row: usize) {
        let _ = (path, row);
    }

    /// A synchronization of `path` is starting.
    fn about_to_sync(&mut self, path: &str) {
        let _ = path;
    }

    /// `path` reached a committed, synchronized state.
    fn synced(&mut self, path: &str, state: &SyncState) {
        let _ = (path, state);
    }

    /// The committed flags of `uid` changed.
    fn flags_changed(&mut self, path: &str, uid: u32) {
        let _ = (path, uid);
    }

    /// A task error or a non-fatal protocol violation. The task keeps
    /// running after a violation; fatal errors leave it in the failed
    /// phase with the committed cache untouched.
    fn error_occurred(&mut self, path: &str, message: &str) {
        let _ = (path, message);
    }
}

/// A listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl MailboxListener for NoopListener {}

/// A listener that records every callback for later assertions.
#[derive(Debug, Default, Clone)]
pub struct CollectingListener {
    /// Recorded events, in callback order.
    pub events: Vec<ListenerEvent>,
}

impl CollectingListener {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the recorded events, leaving the collector empty.
    pub fn take(&mut self) -> Vec<ListenerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Recorded error/warning messages.
    #[must_use]
    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ListenerEvent::ErrorOccurred { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    /// `rows_inserted`
    RowsInserted {
        /// Mailbox path.
        path: String,
        /// First affected row.
        first: usize,
        /// Last affected row.
        last: usize,
    },
    /// `rows_removed`
    RowsRemoved {
        /// Mailbox path.
        path: String,
        /// First affected row.
        first: usize,
        /// Last affected row.
        last: usize,
    },
    /// `flags_updated`
    FlagsUpdated {
        /// Mailbox path.
        path: String,
        /// Affected row.
        row: usize,
    },
    /// `about_to_sync`
    AboutToSync {
        /// Mailbox path.
        path: String,
    },
    /// `synced`
    Synced {
        /// Mailbox path.
        path: String,
        /// Committed state.
        state: SyncState,
    },
    /// `flags_changed`
    FlagsChanged {
        /// Mailbox path.
        path: String,
        /// Affected UID.
        uid: u32,
    },
    /// `error_occurred`
    ErrorOccurred {
        /// Mailbox path.
        path: String,
        /// Error or warning text.
        message: String,
    },
}

impl MailboxListener for CollectingListener {
    fn rows_inserted(&mut self, path: &str, first: usize, last: usize) {
        self.events.push(ListenerEvent::RowsInserted {
            path: path.to_string(),
            first,
            last,
        });
    }

    fn rows_removed(&mut self, path: &str, first: usize, last: usize) {
        self.events.push(ListenerEvent::RowsRemoved {
            path: path.to_string(),
            first,
            last,
        });
    }

    fn flags_updated(&mut self, path: &str, row: usize) {
        self.events.push(ListenerEvent::FlagsUpdated {
            path: path.to_string(),
            row,
        });
    }

    fn about_to_sync(&mut self, path: &str) {
        self.events.push(ListenerEvent::AboutToSync {
            path: path.to_string(),
        });
    }

    fn synced(&mut self, path: &str, state: &SyncState) {
        self.events.push(ListenerEvent::Synced {
            path: path.to_string(),
            state: state.clone(),
        });
    }

    fn flags_changed(&mut self, path: &str, uid: u32) {
        self.events.push(ListenerEvent::FlagsChanged {
            path: path.to_string(),
            uid,
        });
    }

    fn error_occurred(&mut self, path: &str, message: &str) {
        self.events.push(ListenerEvent::ErrorOccurred {
            path: path.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_listener_ignores_everything() {
        let mut listener = NoopListener;
        listener.rows_inserted("a", 0, 2);
        listener.error_occurred("a", "boom");
    }

    #[test]
    fn collecting_listener_records_in_order() {
        let mut listener = CollectingListener::new();
        listener.about_to_sync("a");
        listener.rows_inserted("a", 0, 2);
        listener.flags_changed("a", 9);

        assert_eq!(listener.events.len(), 3);
        assert_eq!(
            listener.events[0],
            ListenerEvent::AboutToSync {
                path: "a".to_string()
            }
        );
        let taken = listener.take();
        assert_eq!(taken.len(), 3);
        assert!(listener.events.is_empty());
    }

    #[test]
    fn errors_filter() {
        let mut listener = CollectingListener::new();
        listener.error_occurred("a", "warning one");
        listener.synced("a", &SyncState::new());
        listener.error_occurred("a", "warning two");
        assert_eq!(listener.errors(), vec!["warning one", "warning two"]);
    }
}
