//! Observable row mirror of the mailbox being synchronized.

use crate::listener::MailboxListener;
use crate::uidmap::UidMap;

/// One message row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRow {
    /// Message UID; 0 while not yet known. The row is valid either way.
    pub uid: u32,
    /// Current flags, sorted atoms.
    pub flags: Vec<String>,
}

/// Row-indexed view of the staged UID map, with listener announcements for
/// every structural change.
///
/// Row `i` mirrors sequence number `i + 1`. Insertions and removals are
/// announced through the listener before and after the mutation; flag
/// updates are announced per row.
#[derive(Debug, Clone, Default)]
pub struct MailboxModel {
    path: String,
    rows: Vec<MessageRow>,
}

impl MailboxModel {
    /// Creates an empty model for a mailbox path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
        }
    }

    /// The mailbox path this model mirrors.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row at an index.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&MessageRow> {
        self.rows.get(index)
    }

    /// UID shown at a row, 0 when not yet known.
    #[must_use]
    pub fn uid_at(&self, index: usize) -> u32 {
        self.rows.get(index).map_or(0, |r| r.uid)
    }

    /// Assigns the UID of a row without an announcement; learning a UID is
    /// not a structural change.
    pub fn set_uid_at(&mut self, index: usize, uid: u32) {
        if let Some(row) = self.rows.get_mut(index) {
            row.uid = uid;
        }
    }

    /// Replaces the flags of a row and announces the change.
    pub fn set_flags_at(
        &mut self,
        index: usize,
        flags: Vec<String>,
        listener: &mut dyn MailboxListener,
    ) {
        if let Some(row) = self.rows.get_mut(index) {
            if row.flags != flags {
                row.flags = flags;
                listener.flags_updated(&self.path, index);
            }
        }
    }

    /// Appends `count` placeholder rows, announcing the insertion.
    pub fn append_placeholders(&mut self, count: usize, listener: &mut dyn MailboxListener) {
        if count == 0 {
            return;
        }
        let first = self.rows.len();
        let last = first + count - 1;
        listener.rows_about_to_be_inserted(&self.path, first, last);
        self.rows
            .extend(std::iter::repeat_with(MessageRow::default).take(count));
        listener.rows_inserted(&self.path, first, last);
    }

    /// Removes one row, announcing the removal. Later rows shift down.
    pub fn remove_row(&mut self, index: usize, listener: &mut dyn MailboxListener) {
        if index >= self.rows.len() {
            return;
        }
        listener.rows_about_to_be_removed(&self.path, index, index);
        self.rows.remove(index);
        listener.rows_removed(&self.path, index, index);
    }

    /// Clears all rows, announcing the removal.
    pub fn clear(&mut self, listener: &mut dyn MailboxListener) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        listener.rows_about_to_be_removed(&self.path, 0, last);
        self.rows.clear();
        listener.rows_removed(&self.path, 0, last);
    }

    /// Rebuilds the rows from a UID map and cached flags, announcing the
    /// replacement as a clear plus an insertion.
    pub fn reset_from_map<F>(
        &mut self,
        map: &UidMap,
        mut flags_for: F,
        listener: &mut dyn MailboxListener,
    ) where
        F: FnMut(u32) -> Vec<String>,
    {
        self.clear(listener);
        if map.is_empty() {
            return;
        }
        let last = map.len() - 1;
        listener.rows_about_to_be_inserted(&self.path, 0, last);
        self.rows = map
            .iter()
            .map(|uid| MessageRow {
                uid,
                flags: if uid == 0 { Vec::new() } else { flags_for(uid) },
            })
            .collect();
        listener.rows_inserted(&self.path, 0, last);
    }

    /// Extracts the current rows as a UID map (sequence order).
    #[must_use]
    pub fn to_uid_map(&self) -> UidMap {
        UidMap::from_uids(self.rows.iter().map(|r| r.uid).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::listener::{CollectingListener, ListenerEvent, NoopListener};

    #[test]
    fn append_and_remove_announce() {
        let mut model = MailboxModel::new("a");
        let mut listener = CollectingListener::new();

        model.append_placeholders(3, &mut listener);
        model.remove_row(1, &mut listener);

        assert_eq!(model.row_count(), 2);
        assert_eq!(
            listener.events,
            vec![
                ListenerEvent::RowsInserted {
                    path: "a".to_string(),
                    first: 0,
                    last: 2
                },
                ListenerEvent::RowsRemoved {
                    path: "a".to_string(),
                    first: 1,
                    last: 1
                },
            ]
        );
    }

    #[test]
    fn placeholder_rows_are_valid_with_uid_zero() {
        let mut model = MailboxModel::new("a");
        model.append_placeholders(2, &mut NoopListener);
        assert_eq!(model.uid_at(0), 0);
        model.set_uid_at(0, 42);
        assert_eq!(model.uid_at(0), 42);
        assert_eq!(model.uid_at(1), 0);
    }

    #[test]
    fn set_flags_announces_only_real_changes() {
        let mut model = MailboxModel::new("a");
        model.append_placeholders(1, &mut NoopListener);
        let mut listener = CollectingListener::new();

        model.set_flags_at(0, vec!["x".to_string()], &mut listener);
        model.set_flags_at(0, vec!["x".to_string()], &mut listener);

        assert_eq!(listener.events.len(), 1);
    }

    #[test]
    fn reset_from_map_pulls_cached_flags() {
        let mut model = MailboxModel::new("a");
        model.reset_from_map(
            &UidMap::from_uids(vec![6, 9]),
            |uid| vec![format!("f{uid}")],
            &mut NoopListener,
        );
        assert_eq!(model.row_count(), 2);
        assert_eq!(model.row(1).unwrap().flags, vec!["f9".to_string()]);
    }

    #[test]
    fn to_uid_map_round_trip() {
        let mut model = MailboxModel::new("a");
        model.reset_from_map(
            &UidMap::from_uids(vec![6, 9, 10]),
            |_| Vec::new(),
            &mut NoopListener,
        );
        assert_eq!(model.to_uid_map().as_slice(), &[6, 9, 10]);
    }

    #[test]
    fn remove_out_of_range_is_ignored() {
        let mut model = MailboxModel::new("a");
        let mut listener = CollectingListener::new();
        model.remove_row(3, &mut listener);
        assert!(listener.events.is_empty());
    }
}
