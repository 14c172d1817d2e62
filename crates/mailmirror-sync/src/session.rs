//! Byte-level session: framing, parsing, and event routing.
//!
//! The session owns one IMAP connection's worth of engine state: the
//! cache, the listener, the capability set, the tag generator, and the
//! active synchronizer task. Bytes go in through [`Session::handle_input`],
//! command bytes come out through [`Session::poll_transmit`]; everything in
//! between runs to quiescence on the caller's thread.

use std::collections::VecDeque;

use bytes::BytesMut;
use mailmirror_imap::{Capability, Response, ResponseParser, TagGenerator, UntaggedResponse};
use tracing::{debug, info, trace, warn};

use crate::cache::Cache;
use crate::demux::classify;
use crate::listener::MailboxListener;
use crate::sync::{Phase, SyncContext, Synchronizer};

/// One connection's engine state.
pub struct Session<C: Cache, L: MailboxListener> {
    cache: C,
    listener: L,
    caps: Vec<Capability>,
    tags: TagGenerator,
    inbound: BytesMut,
    outbound: VecDeque<Vec<u8>>,
    task: Option<Synchronizer>,
}

impl<C: Cache, L: MailboxListener> Session<C, L> {
    /// Creates a session over a cache and listener, with no capabilities
    /// known yet.
    pub fn new(cache: C, listener: L) -> Self {
        Self {
            cache,
            listener,
            caps: Vec::new(),
            tags: TagGenerator::default(),
            inbound: BytesMut::new(),
            outbound: VecDeque::new(),
            task: None,
        }
    }

    /// Replaces the advertised capability set (e.g. from the greeting).
    pub fn set_capabilities(&mut self, caps: Vec<Capability>) {
        self.caps = caps;
    }

    /// The currently known capability set.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.caps
    }

    /// The cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Mutable access to the cache (e.g. for seeding in tests or hydration
    /// from a persistent store).
    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    /// The listener.
    #[must_use]
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access to the listener.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// The active synchronizer task, if any.
    #[must_use]
    pub fn task(&self) -> Option<&Synchronizer> {
        self.task.as_ref()
    }

    /// Starts synchronizing `path`.
    ///
    /// Any task already on the connection is demoted: its staged state is
    /// discarded and late responses to its tags are dropped. The committed
    /// cache keeps whatever that task last committed.
    pub fn synchronize(&mut self, path: &str) {
        if let Some(old) = self.task.take() {
            debug!(old = %old.path(), new = %path, "superseding synchronizer");
        }

        let committed = self.cache.sync_state(path).unwrap_or_default();
        let committed_map = self.cache.uid_map(path).unwrap_or_default();
        let mut task = Synchronizer::new(path, committed, committed_map, &self.caps);

        let mut ctx = SyncContext {
            cache: &mut self.cache,
            listener: &mut self.listener,
            outbound: &mut self.outbound,
            tags: &self.tags,
        };
        task.start(&mut ctx);
        self.task = Some(task);
    }

    /// Drops the active task without touching the committed cache. Used on
    /// connection loss; no error is surfaced by this layer.
    pub fn connection_lost(&mut self) {
        if let Some(task) = self.task.take() {
            info!(path = %task.path(), phase = ?task.phase(), "connection lost, staged state dropped");
        }
        self.inbound.clear();
        self.outbound.clear();
    }

    /// Next outbound command bytes, if any.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    /// Feeds raw bytes from the server.
    ///
    /// Complete responses are parsed and routed; a partial response stays
    /// buffered until the rest arrives.
    pub fn handle_input(&mut self, data: &[u8]) {
        self.inbound.extend_from_slice(data);

        while let Some(end) = find_complete_response(&self.inbound) {
            let frame = self.inbound.split_to(end + 1);
            self.process_frame(&frame);
        }
    }

    fn process_frame(&mut self, frame: &[u8]) {
        let response = match ResponseParser::parse(frame) {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "discarding unparseable response");
                if let Some(task) = &self.task {
                    self.listener
                        .error_occurred(task.path(), &format!("unparseable response: {error}"));
                }
                return;
            }
        };

        match response {
            Response::Tagged {
                tag, status, text, ..
            } => {
                let Some(task) = self.task.as_mut() else {
                    debug!(tag = %tag, "tagged response with no active task");
                    return;
                };
                if !task.owns_tag(tag.as_str()) {
                    // A demoted task's command completing late.
                    debug!(tag = %tag, "dropping tagged response for a demoted task");
                    return;
                }
                let mut ctx = SyncContext {
                    cache: &mut self.cache,
                    listener: &mut self.listener,
                    outbound: &mut self.outbound,
                    tags: &self.tags,
                };
                task.handle_tagged(tag.as_str(), status, &text, &mut ctx);
            }
            Response::Untagged(untagged) => self.process_untagged(&untagged),
            Response::Continuation { .. } => {
                trace!("ignoring continuation request");
            }
        }
    }

    fn process_untagged(&mut self, untagged: &UntaggedResponse) {
        match untagged {
            UntaggedResponse::Capability(caps) => {
                self.caps.clone_from(caps);
                return;
            }
            UntaggedResponse::Bye { text, .. } => {
                info!(text = %text, "server is closing the connection");
                return;
            }
            _ => {}
        }

        let Some(event) = classify(untagged) else {
            trace!(?untagged, "untagged response without mailbox scope");
            return;
        };

        let Some(task) = self.task.as_mut() else {
            debug!(?event, "mailbox event with no active task");
            return;
        };
        if task.phase() == Phase::Failed {
            return;
        }
        let mut ctx = SyncContext {
            cache: &mut self.cache,
            listener: &mut self.listener,
            outbound: &mut self.outbound,
            tags: &self.tags,
        };
        task.handle_event(event, &mut ctx);
    }
}

/// Finds the final byte index of the first complete response in `buf`,
/// accounting for IMAP literals: a line ending in `{n}` (or `{n+}`) is
/// followed by `n` raw bytes and continues on the next CRLF after them.
fn find_complete_response(buf: &[u8]) -> Option<usize> {
    let mut start = 0usize;
    loop {
        let rel = buf[start..]
            .windows(2)
            .position(|w| w == b"\r\n")?;
        let line_end = start + rel + 1;

        match literal_length(&buf[start..=line_end]) {
            Some(len) => {
                let literal_end = line_end + 1 + len;
                if literal_end >= buf.len() {
                    // Literal bytes not all here yet.
                    return None;
                }
                start = literal_end;
            }
            None => return Some(line_end),
        }
    }
}

/// Parses a trailing `{n}` or `{n+}` literal marker from one CRLF-terminated
/// line.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = std::str::from_utf8(&line[open + 1..]).ok()?;
    let digits = digits.strip_suffix('+').unwrap_or(digits);
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::listener::CollectingListener;

    fn session() -> Session<MemoryCache, CollectingListener> {
        Session::new(MemoryCache::new(), CollectingListener::new())
    }

    #[test]
    fn framing_plain_lines() {
        assert_eq!(find_complete_response(b"* 3 EXISTS\r\n"), Some(11));
        assert_eq!(find_complete_response(b"* 3 EXIS"), None);
        assert_eq!(find_complete_response(b"* 3 EXISTS\r\n* 1 RECENT\r\n"), Some(11));
    }

    #[test]
    fn framing_with_literal() {
        let buf = b"* 1 FETCH (BODY[] {5}\r\nhello)\r\nrest";
        assert_eq!(find_complete_response(buf), Some(30));
    }

    #[test]
    fn framing_waits_for_literal_bytes() {
        let buf = b"* 1 FETCH (BODY[] {5}\r\nhel";
        assert_eq!(find_complete_response(buf), None);
    }

    #[test]
    fn literal_length_parsing() {
        assert_eq!(literal_length(b"a {5}\r\n"), Some(5));
        assert_eq!(literal_length(b"a {12+}\r\n"), Some(12));
        assert_eq!(literal_length(b"a (b)\r\n"), None);
    }

    #[test]
    fn capability_updates_session() {
        let mut session = session();
        session.handle_input(b"* CAPABILITY IMAP4rev1 CONDSTORE QRESYNC\r\n");
        assert!(session.capabilities().contains(&Capability::CondStore));
        assert!(session.capabilities().contains(&Capability::QResync));
    }

    #[test]
    fn synchronize_emits_select() {
        let mut session = session();
        session.synchronize("a");
        let bytes = session.poll_transmit().unwrap();
        assert_eq!(bytes, b"A0000 SELECT a\r\n");
        assert!(session.poll_transmit().is_none());
    }

    #[test]
    fn split_input_reassembles() {
        let mut session = session();
        session.synchronize("a");
        let _ = session.poll_transmit();

        session.handle_input(b"* 0 EXI");
        session.handle_input(b"STS\r\nA0000 OK done\r\n");
        assert_eq!(session.task().unwrap().phase(), Phase::Done);
    }

    #[test]
    fn connection_lost_drops_task_silently() {
        let mut session = session();
        session.synchronize("a");
        let _ = session.poll_transmit();
        session.connection_lost();
        assert!(session.task().is_none());
        assert!(session.listener().errors().is_empty());
    }

    #[test]
    fn tagged_response_for_demoted_task_is_dropped() {
        let mut session = session();
        session.synchronize("a");
        let _ = session.poll_transmit();
        session.synchronize("b");
        let _ = session.poll_transmit();

        // The old SELECT completing must not disturb the new task.
        session.handle_input(b"A0000 OK completed\r\n");
        let task = session.task().unwrap();
        assert_eq!(task.path(), "b");
        assert_eq!(task.phase(), Phase::Selecting);
    }
}
