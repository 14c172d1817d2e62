//! The mailbox synchronizer task.
//!
//! One `Synchronizer` drives one mailbox from whatever the cache remembers
//! to a state consistent with the server, choosing the cheapest dialog the
//! advertised capabilities allow: QRESYNC folds deletions and flag changes
//! into the SELECT response, CONDSTORE limits flag refetches to
//! `CHANGEDSINCE` deltas, and the plain path re-derives UIDs with
//! `UID SEARCH`. Untagged traffic may interleave with any in-flight command
//! and is absorbed as it arrives; the committed cache only ever moves from
//! one consistent snapshot to the next.

use std::collections::{BTreeSet, VecDeque};

use mailmirror_imap::{
    Capability, Command, Mailbox, ModSeq, QresyncParams, SelectParam, SeqUidMatch, SequenceSet,
    Status, TagGenerator, Uid, UidSearchQuery, UidSet,
};
use tracing::{debug, trace, warn};

use crate::cache::Cache;
use crate::demux::MailboxEvent;
use crate::listener::MailboxListener;
use crate::model::MailboxModel;
use crate::state::SyncState;
use crate::uidmap::UidMap;

/// Resynchronization strategy, fixed at task start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain SELECT; UIDs re-derived as needed.
    Plain,
    /// SELECT (CONDSTORE); flag deltas via CHANGEDSINCE.
    CondStore,
    /// SELECT (QRESYNC ...); deletions and flag deltas in the SELECT.
    QResync,
    /// SELECT (QRESYNC-ARRIVED ...); QRESYNC plus ARRIVED announcements.
    QResyncArrived,
}

/// Phase of the task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, SELECT not yet sent.
    Init,
    /// SELECT in flight.
    Selecting,
    /// UID discovery (UID SEARCH) in flight.
    SyncingUids,
    /// Flag fetches in flight.
    SyncingFlags,
    /// Cache committed; absorbing unsolicited events.
    Done,
    /// Fatal error; committed cache untouched.
    Failed,
}

/// What an in-flight tag was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Select,
    UidSearch,
    FetchFlags,
    /// `UID FETCH n:*`-style discovery of late arrivals.
    TailFetch,
}

/// Mutable surroundings of the task, borrowed per call from the session.
pub struct SyncContext<'a> {
    /// The per-mailbox cache.
    pub cache: &'a mut dyn Cache,
    /// Listener for model and lifecycle callbacks.
    pub listener: &'a mut dyn MailboxListener,
    /// Outbound wire bytes, drained by the session.
    pub outbound: &'a mut VecDeque<Vec<u8>>,
    /// Connection-wide tag generator.
    pub tags: &'a TagGenerator,
}

/// One mailbox synchronization task.
///
/// Owns the staged `SyncState` and row model from the moment SELECT is
/// issued until the terminal command's tagged OK commits them. Dropping the
/// task at any earlier point discards the staged state and leaves the
/// committed cache exactly as it was.
pub struct Synchronizer {
    path: String,
    strategy: Strategy,
    phase: Phase,
    esearch: bool,

    /// Last committed values, loaded at task start.
    committed: SyncState,
    committed_map: UidMap,

    /// Staged values, server truth in progress.
    staged: SyncState,
    model: MailboxModel,

    pending: Vec<(String, PendingKind)>,
    /// UIDs whose cache entries must be reaped at commit.
    purged: BTreeSet<u32>,
    /// Result of an in-flight UID SEARCH, kept until its tagged OK.
    search_result: Option<Vec<u32>>,
    /// Arrivals discovered mid-FETCH need a tail UID FETCH afterwards.
    tail_needed: bool,
    /// The current UID discovery re-derives the whole map.
    full_rederive: bool,
    /// A protocol violation demands a full resync at the next boundary.
    force_full: bool,
    saw_nomodseq: bool,
    vanished_unrequested: bool,
    retried: bool,
}

impl Synchronizer {
    /// Creates a task for `path` from the committed cache contents and the
    /// advertised capability set. Does not touch the wire yet.
    #[must_use]
    pub fn new(
        path: &str,
        committed: SyncState,
        committed_map: UidMap,
        caps: &[Capability],
    ) -> Self {
        let qresync_cap = if caps.contains(&Capability::QResyncArrived) {
            Some(Strategy::QResyncArrived)
        } else if caps.contains(&Capability::QResync) {
            Some(Strategy::QResync)
        } else {
            None
        };

        let strategy = match qresync_cap {
            Some(q) if committed.is_usable_for_syncing() && committed.highest_mod_seq() > 0 => q,
            _ if caps.contains(&Capability::CondStore) && committed.is_usable_for_syncing() => {
                Strategy::CondStore
            }
            _ => Strategy::Plain,
        };

        Self {
            path: path.to_string(),
            strategy,
            phase: Phase::Init,
            esearch: caps.contains(&Capability::ESearch),
            committed,
            committed_map,
            staged: SyncState::new(),
            model: MailboxModel::new(path),
            pending: Vec::new(),
            purged: BTreeSet::new(),
            search_result: None,
            tail_needed: false,
            full_rederive: false,
            force_full: false,
            saw_nomodseq: false,
            vanished_unrequested: false,
            retried: false,
        }
    }

    /// The mailbox path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The chosen strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The staged row model.
    #[must_use]
    pub fn model(&self) -> &MailboxModel {
        &self.model
    }

    /// Whether the given tag belongs to this task.
    #[must_use]
    pub fn owns_tag(&self, tag: &str) -> bool {
        self.pending.iter().any(|(t, _)| t == tag)
    }

    /// Seeds the model from the committed map and issues SELECT.
    pub fn start(&mut self, ctx: &mut SyncContext<'_>) {
        ctx.listener.about_to_sync(&self.path);

        let map = self.committed_map.clone();
        self.model.reset_from_map(
            &map,
            |uid| ctx.cache.msg_flags(&self.path, uid).unwrap_or_default(),
            ctx.listener,
        );

        let param = self.select_param();
        debug!(path = %self.path, strategy = ?self.strategy, "starting synchronization");
        self.emit(
            ctx,
            Command::Select {
                mailbox: Mailbox::new(self.path.clone()),
                param,
            },
            PendingKind::Select,
        );
        self.phase = Phase::Selecting;
    }

    fn select_param(&self) -> SelectParam {
        match self.strategy {
            Strategy::Plain => SelectParam::Plain,
            Strategy::CondStore => SelectParam::CondStore,
            Strategy::QResync | Strategy::QResyncArrived => {
                // Strategy selection guarantees both values are nonzero.
                let uv = mailmirror_imap::UidValidity::new(self.committed.uid_validity());
                let hms = ModSeq::from_u64(self.committed.highest_mod_seq());
                let (Some(uv), Some(hms)) = (uv, hms) else {
                    return SelectParam::Plain;
                };
                let mut params = QresyncParams::new(uv, hms);
                if let Some(sample) = SeqUidMatch::from_uid_map(self.committed_map.as_slice()) {
                    params = params.with_sample(sample);
                }
                if self.strategy == Strategy::QResync {
                    SelectParam::QResync(params)
                } else {
                    SelectParam::QResyncArrived(params)
                }
            }
        }
    }

    fn emit(&mut self, ctx: &mut SyncContext<'_>, command: Command, kind: PendingKind) {
        let tag = ctx.tags.next();
        trace!(path = %self.path, %tag, ?kind, "issuing command");
        ctx.outbound.push_back(command.serialize(&tag));
        self.pending.push((tag, kind));
    }

    // === Untagged event intake ===

    /// Absorbs one mailbox-scoped event, in arrival order.
    #[allow(clippy::too_many_lines)]
    pub fn handle_event(&mut self, event: MailboxEvent, ctx: &mut SyncContext<'_>) {
        if self.phase == Phase::Failed {
            return;
        }
        match event {
            MailboxEvent::Exists(n) => self.on_exists(n, ctx),
            MailboxEvent::Recent(n) => self.staged.set_recent(n),
            MailboxEvent::Unseen(n) => self.staged.set_unseen_offset(n.saturating_sub(1)),
            MailboxEvent::Flags(flags) => self.staged.set_flags(flags),
            MailboxEvent::PermanentFlags(flags) => self.staged.set_permanent_flags(flags),
            MailboxEvent::UidValidity(n) => self.staged.set_uid_validity(n),
            MailboxEvent::UidNext(n) => self.staged.set_uid_next(n),
            MailboxEvent::HighestModSeq(n) => self.staged.set_highest_mod_seq(n),
            MailboxEvent::NoModSeq => {
                self.saw_nomodseq = true;
                self.staged.set_highest_mod_seq(0);
            }
            MailboxEvent::ReadOnly | MailboxEvent::ReadWrite => {}
            MailboxEvent::Expunge(seq) => self.on_expunge(seq, ctx),
            MailboxEvent::Fetch {
                seq, flags, uid, ..
            } => self.on_fetch(seq, flags, uid, ctx),
            MailboxEvent::Search(uids) => {
                if self.phase == Phase::SyncingUids {
                    self.search_result = Some(uids);
                } else {
                    debug!(path = %self.path, "ignoring SEARCH outside UID discovery");
                }
            }
            MailboxEvent::ESearch { tag, uids } => {
                let ours = tag.is_none_or(|t| self.owns_tag(&t));
                if self.phase == Phase::SyncingUids && ours {
                    self.search_result = Some(uids);
                } else {
                    debug!(path = %self.path, "ignoring ESEARCH outside UID discovery");
                }
            }
            MailboxEvent::Vanished { earlier, uids } => self.on_vanished(earlier, &uids, ctx),
            MailboxEvent::Arrived(uids) => self.on_arrived(&uids, ctx),
        }
    }

    fn on_exists(&mut self, n: u32, ctx: &mut SyncContext<'_>) {
        let rows = self.model.row_count();
        self.staged.set_exists(n);

        let n = n as usize;
        if n > rows {
            self.model.append_placeholders(n - rows, ctx.listener);
            match self.phase {
                Phase::SyncingFlags => self.tail_needed = true,
                Phase::Done => {
                    let tail_in_flight = self
                        .pending
                        .iter()
                        .any(|(_, k)| *k == PendingKind::TailFetch);
                    if tail_in_flight {
                        self.tail_needed = true;
                    } else {
                        let from = self.model.to_uid_map().max_uid().saturating_add(1);
                        self.tail_fetch_from(ctx, from);
                    }
                }
                _ => {}
            }
        } else if n < rows && self.phase != Phase::Selecting {
            // EXISTS never shrinks a mailbox; only EXPUNGE/VANISHED do.
            self.violation(ctx, &format!("EXISTS {n} below the known count {rows}"));
            self.force_full = true;
        }
    }

    fn on_expunge(&mut self, seq: u32, ctx: &mut SyncContext<'_>) {
        if self.phase == Phase::SyncingUids && self.full_rederive {
            // The whole map is being re-derived, so the rows on display are
            // the stale pre-select view; the sequence number refers to the
            // server's live numbering, which the pending SEARCH result
            // mirrors.
            let live = self.staged.exists();
            if seq == 0 || seq > live {
                self.violation(ctx, &format!("EXPUNGE {seq} beyond EXISTS {live}"));
                return;
            }
            if let Some(result) = &mut self.search_result {
                let index = (seq - 1) as usize;
                if index < result.len() {
                    let uid = result.remove(index);
                    self.purged.insert(uid);
                }
            }
            self.staged.set_exists(live - 1);
            let index = (seq - 1) as usize;
            if index < self.model.row_count() {
                self.model.remove_row(index, ctx.listener);
            }
            return;
        }

        let rows = self.model.row_count();
        if seq == 0 || seq as usize > rows {
            self.violation(ctx, &format!("EXPUNGE {seq} beyond EXISTS {rows}"));
            if self.phase != Phase::Done {
                self.force_full = true;
            }
            return;
        }
        let index = (seq - 1) as usize;
        let uid = self.model.uid_at(index);
        if uid != 0 {
            self.purged.insert(uid);
        }
        self.model.remove_row(index, ctx.listener);
        // Track the server's live count, which during SELECT may differ
        // from the not-yet-reconciled rows.
        let live = if self.staged.has_exists() {
            self.staged.exists()
        } else {
            u32::try_from(rows).unwrap_or(u32::MAX)
        };
        self.staged.set_exists(live.saturating_sub(1));

        if self.phase == Phase::Done {
            self.commit(ctx);
        }
    }

    fn on_fetch(
        &mut self,
        seq: u32,
        flags: Option<Vec<String>>,
        uid: Option<u32>,
        ctx: &mut SyncContext<'_>,
    ) {
        if seq == 0 {
            return;
        }
        let index = (seq - 1) as usize;
        if index >= self.model.row_count() {
            // Data for a message we have not been told about; treat it as
            // an EXISTS we are yet to see.
            self.model
                .append_placeholders(index + 1 - self.model.row_count(), ctx.listener);
            self.staged
                .set_exists(u32::try_from(self.model.row_count()).unwrap_or(u32::MAX));
            if matches!(self.phase, Phase::SyncingFlags | Phase::Done) {
                self.tail_needed = true;
            }
        }

        if let Some(uid) = uid {
            let current = self.model.uid_at(index);
            if current == 0 {
                self.model.set_uid_at(index, uid);
            } else if current != uid {
                self.violation(
                    ctx,
                    &format!("FETCH reports UID {uid} at sequence {seq}, expected {current}"),
                );
                self.model.set_uid_at(index, uid);
            }
        }

        if let Some(flags) = flags {
            self.model.set_flags_at(index, flags, ctx.listener);
            if self.phase == Phase::Done {
                let uid = self.model.uid_at(index);
                if uid != 0 {
                    let flags = self
                        .model
                        .row(index)
                        .map(|r| r.flags.clone())
                        .unwrap_or_default();
                    self.write_flags(ctx, uid, flags);
                }
            }
        }
    }

    fn on_vanished(&mut self, earlier: bool, uids: &[u32], ctx: &mut SyncContext<'_>) {
        if earlier
            && !matches!(self.strategy, Strategy::QResync | Strategy::QResyncArrived)
        {
            self.vanished_unrequested = true;
            self.violation(ctx, "VANISHED (EARLIER) without QRESYNC having been requested");
            return;
        }

        let mut removed = 0u32;
        for &uid in uids {
            if let Some(index) = self.model.to_uid_map().position_of(uid) {
                self.model.remove_row(index, ctx.listener);
                self.purged.insert(uid);
                removed += 1;
            }
        }
        if removed > 0 && !earlier {
            // Plain VANISHED replaces EXPUNGE; the reported EXISTS did not
            // yet account for these messages.
            let live = if self.staged.has_exists() {
                self.staged.exists()
            } else {
                u32::try_from(self.model.row_count()).unwrap_or(u32::MAX)
            };
            self.staged.set_exists(live.saturating_sub(removed));
        }
        if earlier {
            // VANISHED (EARLIER) describes history; the SELECT EXISTS
            // already excludes these messages.
            for &uid in uids {
                self.purged.insert(uid);
            }
        }

        if self.phase == Phase::Done && removed > 0 {
            self.commit(ctx);
        }
    }

    fn on_arrived(&mut self, uids: &[u32], ctx: &mut SyncContext<'_>) {
        let known = self.model.to_uid_map();
        let uids: Vec<u32> = uids
            .iter()
            .copied()
            .filter(|&uid| uid != 0 && !known.contains(uid))
            .collect();
        if uids.is_empty() {
            return;
        }
        let first = self.model.row_count();
        self.model.append_placeholders(uids.len(), ctx.listener);
        for (offset, &uid) in uids.iter().enumerate() {
            self.model.set_uid_at(first + offset, uid);
        }
        self.staged
            .set_exists(u32::try_from(self.model.row_count()).unwrap_or(u32::MAX));

        let (lo, hi) = (uids[0], uids[uids.len() - 1]);
        if let (Some(lo), Some(hi)) = (Uid::new(lo), Uid::new(hi)) {
            self.emit(
                ctx,
                Command::UidFetchFlags {
                    uids: UidSet::range(lo, hi),
                },
                PendingKind::TailFetch,
            );
        }
    }

    // === Tagged completions ===

    /// Handles the tagged completion of one of this task's commands.
    pub fn handle_tagged(
        &mut self,
        tag: &str,
        status: Status,
        text: &str,
        ctx: &mut SyncContext<'_>,
    ) {
        let Some(position) = self.pending.iter().position(|(t, _)| t == tag) else {
            debug!(path = %self.path, tag, "tagged response for a tag we do not own");
            return;
        };
        let (_, kind) = self.pending.remove(position);

        match status {
            Status::Ok => self.on_command_ok(kind, ctx),
            Status::No => self.on_command_no(kind, text, ctx),
            Status::Bad | Status::Bye => {
                self.fail(ctx, &format!("server rejected command: {text}"));
            }
            Status::PreAuth => {}
        }
    }

    fn on_command_ok(&mut self, kind: PendingKind, ctx: &mut SyncContext<'_>) {
        match kind {
            PendingKind::Select => self.reconcile(ctx),
            PendingKind::UidSearch => self.on_search_complete(ctx),
            PendingKind::FetchFlags | PendingKind::TailFetch => self.on_fetch_complete(ctx),
        }
    }

    fn on_command_no(&mut self, kind: PendingKind, text: &str, ctx: &mut SyncContext<'_>) {
        match kind {
            PendingKind::Select => {
                self.fail(ctx, &format!("SELECT {} failed: {text}", self.path));
            }
            _ if !self.retried => {
                // Downgrade and retry once: restart as a plain SELECT of the
                // same mailbox.
                warn!(path = %self.path, text, "command failed, retrying with a plain SELECT");
                self.retried = true;
                self.strategy = Strategy::Plain;
                self.pending.clear();
                self.staged = SyncState::new();
                self.purged.clear();
                self.search_result = None;
                self.tail_needed = false;
                self.full_rederive = false;
                self.force_full = false;
                self.saw_nomodseq = false;
                self.vanished_unrequested = false;
                self.start(ctx);
            }
            _ => self.fail(ctx, &format!("command failed after retry: {text}")),
        }
    }

    // === Reconciliation on the SELECT tagged OK ===

    fn reconcile(&mut self, ctx: &mut SyncContext<'_>) {
        let committed_uv = self.committed.uid_validity();
        if committed_uv != 0 && self.staged.uid_validity() != committed_uv {
            debug!(path = %self.path, old = committed_uv, new = self.staged.uid_validity(),
                "UIDVALIDITY changed, discarding every UID-keyed artifact");
            self.log_cache_err(ctx.cache.clear_uid_space(&self.path));
            self.committed_map = UidMap::new();
            self.purged.clear();
            self.model.clear(ctx.listener);
            self.full_resync(ctx);
            return;
        }

        if self.committed.uid_next() != 0
            && self.staged.uid_next() != 0
            && self.staged.uid_next() < self.committed.uid_next()
        {
            self.violation(
                ctx,
                &format!(
                    "UIDNEXT decreased from {} to {} without a UIDVALIDITY change",
                    self.committed.uid_next(),
                    self.staged.uid_next()
                ),
            );
            self.full_resync(ctx);
            return;
        }

        if self.vanished_unrequested || self.force_full {
            self.force_full = false;
            self.full_resync(ctx);
            return;
        }

        let prior_usable = self.committed.is_usable_for_numbers()
            && self.committed_map.len() == self.committed.exists() as usize;
        if !prior_usable {
            self.full_resync(ctx);
            return;
        }

        match self.strategy {
            Strategy::QResync | Strategy::QResyncArrived => self.reconcile_qresync(ctx),
            Strategy::CondStore => self.reconcile_condstore(ctx),
            Strategy::Plain => self.reconcile_plain(ctx),
        }
    }

    fn reconcile_qresync(&mut self, ctx: &mut SyncContext<'_>) {
        let n = self.staged.exists();
        let u = self.staged.uid_next();
        let h = self.staged.highest_mod_seq();
        let rows = u32::try_from(self.model.row_count()).unwrap_or(u32::MAX);
        let placeholders =
            u32::try_from(self.model.to_uid_map().placeholder_count()).unwrap_or(u32::MAX);
        // Rows whose UID the QRESYNC data actually described; placeholder
        // rows only exist because EXISTS grew past the described set.
        let described = rows - placeholders;

        if !self.saw_nomodseq
            && h == self.committed.highest_mod_seq()
            && (placeholders > 0 || n != described || u != self.committed.uid_next())
        {
            // The server claims nothing changed yet the numbers moved;
            // the QRESYNC data cannot be trusted.
            self.violation(
                ctx,
                "QRESYNC reported an unchanged HIGHESTMODSEQ alongside changed numbers",
            );
            self.staged.set_highest_mod_seq(0);
            self.reconcile_plain(ctx);
            return;
        }
        let placeholders = placeholders as usize;

        if n == rows && placeholders == 0 {
            if self.saw_nomodseq {
                // Flags cannot be trusted without mod-sequences, but the
                // stable numbers say the UIDs still hold.
                self.start_flag_fetch(ctx, None);
            } else {
                self.commit(ctx);
            }
            return;
        }

        if n > rows || placeholders > 0 {
            // Arrivals the server did not describe; learn their UIDs and
            // flags in one go.
            if n > rows {
                self.model
                    .append_placeholders((n - rows) as usize, ctx.listener);
            }
            self.tail_fetch_from(ctx, self.committed.uid_next());
            self.phase = Phase::SyncingFlags;
            return;
        }

        self.violation(
            ctx,
            &format!("EXISTS {n} below the {rows} messages QRESYNC left us with"),
        );
        self.full_resync(ctx);
    }

    fn reconcile_condstore(&mut self, ctx: &mut SyncContext<'_>) {
        let n = self.staged.exists();
        let u = self.staged.uid_next();
        let h = self.staged.highest_mod_seq();
        let rows = u32::try_from(self.model.row_count()).unwrap_or(u32::MAX);
        let placeholders = self.model.to_uid_map().placeholder_count();

        let numbers_stable = n == self.committed.exists()
            && u == self.committed.uid_next()
            && rows == n
            && placeholders == 0;

        if !numbers_stable {
            self.reconcile_plain(ctx);
            return;
        }

        if self.saw_nomodseq {
            self.start_flag_fetch(ctx, None);
        } else if h == self.committed.highest_mod_seq() {
            // Nothing moved at all; the cached flags still hold.
            self.commit(ctx);
        } else if h > self.committed.highest_mod_seq() {
            self.start_flag_fetch(ctx, Some(self.committed.highest_mod_seq()));
        } else {
            self.violation(
                ctx,
                &format!(
                    "HIGHESTMODSEQ decreased from {} to {h}",
                    self.committed.highest_mod_seq()
                ),
            );
            self.start_flag_fetch(ctx, None);
        }
    }

    fn reconcile_plain(&mut self, ctx: &mut SyncContext<'_>) {
        let n = self.staged.exists();
        let u = self.staged.uid_next();
        let rows = u32::try_from(self.model.row_count()).unwrap_or(u32::MAX);
        let placeholders = self.model.to_uid_map().placeholder_count();

        if n == 0 {
            for uid in self.committed_map.iter() {
                self.purged.insert(uid);
            }
            self.model.clear(ctx.listener);
            self.commit(ctx);
            return;
        }

        if n == self.committed.exists()
            && u == self.committed.uid_next()
            && !self.committed_map.is_empty()
            && rows == n
            && placeholders == 0
        {
            // No arrivals, no deletions; only flags may have moved.
            self.start_flag_fetch(ctx, None);
            return;
        }

        if n > self.committed.exists()
            && u > self.committed.uid_next()
            && !self.committed_map.is_empty()
            && rows == n
        {
            self.arrivals_only(ctx);
            return;
        }

        self.full_resync(ctx);
    }

    // === Branch actions ===

    fn arrivals_only(&mut self, ctx: &mut SyncContext<'_>) {
        // Prior usability guarantees a nonzero committed UIDNEXT.
        let Some(first) = Uid::new(self.committed.uid_next()) else {
            self.full_resync(ctx);
            return;
        };
        self.phase = Phase::SyncingUids;
        self.full_rederive = false;
        self.search_result = None;

        self.emit(
            ctx,
            Command::UidSearch {
                query: UidSearchQuery::Since(first),
                esearch: self.esearch,
            },
            PendingKind::UidSearch,
        );
    }

    fn full_resync(&mut self, ctx: &mut SyncContext<'_>) {
        if self.staged.exists() == 0 {
            // Empty mailbox; nothing to derive, nothing to fetch.
            for uid in self.committed_map.iter() {
                self.purged.insert(uid);
            }
            self.model.clear(ctx.listener);
            self.commit(ctx);
            return;
        }

        self.phase = Phase::SyncingUids;
        self.full_rederive = true;
        self.search_result = None;

        self.emit(
            ctx,
            Command::UidSearch {
                query: UidSearchQuery::All,
                esearch: self.esearch,
            },
            PendingKind::UidSearch,
        );
    }

    fn start_flag_fetch(&mut self, ctx: &mut SyncContext<'_>, changed_since: Option<u64>) {
        let n = self.staged.exists();
        if n == 0 {
            self.commit(ctx);
            return;
        }
        self.phase = Phase::SyncingFlags;
        let range = SequenceSet::range(1, n).unwrap_or(SequenceSet::All);
        self.emit(
            ctx,
            Command::FetchFlags {
                range,
                changed_since: changed_since.filter(|&m| m > 0),
            },
            PendingKind::FetchFlags,
        );
    }

    fn tail_fetch_from(&mut self, ctx: &mut SyncContext<'_>, first_uid: u32) {
        let Some(first) = Uid::new(first_uid.max(1)) else {
            return;
        };
        self.emit(
            ctx,
            Command::UidFetchFlags {
                uids: UidSet::RangeFrom(first),
            },
            PendingKind::TailFetch,
        );
    }

    // === UID discovery completion ===

    fn on_search_complete(&mut self, ctx: &mut SyncContext<'_>) {
        let mut found = self.search_result.take().unwrap_or_default();
        found.sort_unstable();
        found.dedup();

        if self.full_rederive {
            self.finish_full_rederive(ctx, &found);
        } else {
            self.finish_arrival_discovery(ctx, &found);
        }
    }

    fn finish_full_rederive(&mut self, ctx: &mut SyncContext<'_>, found: &[u32]) {
        for uid in self.committed_map.iter() {
            if !found.contains(&uid) {
                self.purged.insert(uid);
            }
        }

        let map = UidMap::from_uids(found.to_vec());
        self.model
            .reset_from_map(&map, |_| Vec::new(), ctx.listener);

        let n = self.staged.exists() as usize;
        if found.len() > n {
            self.violation(
                ctx,
                &format!("UID SEARCH returned {} UIDs for EXISTS {n}", found.len()),
            );
            self.staged
                .set_exists(u32::try_from(found.len()).unwrap_or(u32::MAX));
        } else if found.len() < n {
            // Arrivals raced the search; their UIDs are still unknown.
            self.model
                .append_placeholders(n - found.len(), ctx.listener);
        }

        self.bump_uid_next();
        self.dispatch_flag_fetches(ctx);
    }

    fn finish_arrival_discovery(&mut self, ctx: &mut SyncContext<'_>, found: &[u32]) {
        // The result lists every UID at or above the prior UIDNEXT that
        // still exists; fill placeholders in order.
        let mut next_slot = 0usize;
        for &uid in found {
            if self.model.to_uid_map().contains(uid) {
                continue;
            }
            let slot = (next_slot..self.model.row_count())
                .find(|&i| self.model.uid_at(i) == 0);
            match slot {
                Some(index) => {
                    self.model.set_uid_at(index, uid);
                    next_slot = index + 1;
                }
                None => {
                    // Only grow past the known rows while the server-stated
                    // EXISTS says there is room; a result entry past that
                    // was expunged while the search ran.
                    if self.model.row_count() >= self.staged.exists() as usize {
                        continue;
                    }
                    let index = self.model.row_count();
                    self.model.append_placeholders(1, ctx.listener);
                    self.model.set_uid_at(index, uid);
                    next_slot = index + 1;
                }
            }
        }

        self.bump_uid_next();
        self.dispatch_flag_fetches(ctx);
    }

    /// After UID discovery, issues the flag fetch over the known range and,
    /// when placeholder rows remain, a tail UID FETCH pipelined ahead of it.
    fn dispatch_flag_fetches(&mut self, ctx: &mut SyncContext<'_>) {
        self.phase = Phase::SyncingFlags;

        let placeholders = self.model.to_uid_map().placeholder_count();
        if placeholders > 0 {
            let from = self.model.to_uid_map().max_uid().saturating_add(1);
            self.tail_fetch_from(ctx, from);
        }

        let n = self.staged.exists();
        if n == 0 {
            let fetches_outstanding = self
                .pending
                .iter()
                .any(|(_, k)| matches!(k, PendingKind::FetchFlags | PendingKind::TailFetch));
            if !fetches_outstanding {
                self.commit(ctx);
            }
            return;
        }
        let range = SequenceSet::range(1, n).unwrap_or(SequenceSet::All);
        self.emit(
            ctx,
            Command::FetchFlags {
                range,
                changed_since: None,
            },
            PendingKind::FetchFlags,
        );
    }

    // === Flag fetch completion ===

    fn on_fetch_complete(&mut self, ctx: &mut SyncContext<'_>) {
        let fetches_outstanding = self
            .pending
            .iter()
            .any(|(_, k)| matches!(k, PendingKind::FetchFlags | PendingKind::TailFetch));
        if fetches_outstanding {
            return;
        }

        if self.force_full {
            self.force_full = false;
            self.full_resync(ctx);
            return;
        }

        if self.tail_needed {
            self.tail_needed = false;
            let from = self.model.to_uid_map().max_uid().saturating_add(1);
            self.tail_fetch_from(ctx, from);
            return;
        }

        self.commit(ctx);
    }

    fn bump_uid_next(&mut self) {
        let max_uid = self.model.to_uid_map().max_uid();
        if max_uid != 0 && self.staged.uid_next() <= max_uid {
            self.staged.set_uid_next(max_uid + 1);
        }
    }

    // === Commit ===

    #[allow(clippy::cast_possible_truncation)]
    fn commit(&mut self, ctx: &mut SyncContext<'_>) {
        // Placeholder rows left at a commit boundary were arrivals that
        // disappeared before we learned their UIDs; they never existed as
        // far as the cache is concerned.
        loop {
            let placeholder = (0..self.model.row_count())
                .find(|&i| self.model.uid_at(i) == 0);
            match placeholder {
                Some(index) => self.model.remove_row(index, ctx.listener),
                None => break,
            }
        }

        let map = self.model.to_uid_map();
        self.staged.set_exists(map.len() as u32);
        self.bump_uid_next();

        let unseen = (0..self.model.row_count())
            .filter(|&i| {
                self.model
                    .row(i)
                    .is_some_and(|r| !r.flags.iter().any(|f| f == "\\Seen"))
            })
            .count() as u32;
        self.staged.set_unseen_count(unseen);

        if let Err(violation) = map.check_against(self.staged.exists(), self.staged.uid_next()) {
            // A committed checkpoint must never carry a broken map.
            self.fail(ctx, &format!("refusing to commit an inconsistent map: {violation}"));
            return;
        }

        // Flags first, then the map, then the state: readers of the cache
        // see either the old snapshot or the new one, never a blend.
        for index in 0..self.model.row_count() {
            let Some(row) = self.model.row(index) else {
                continue;
            };
            let (uid, flags) = (row.uid, row.flags.clone());
            self.write_flags(ctx, uid, flags);
        }
        let purged: Vec<u32> = self
            .purged
            .iter()
            .copied()
            .filter(|uid| !map.contains(*uid))
            .collect();
        for uid in purged {
            self.write_flags(ctx, uid, Vec::new());
        }
        self.purged.clear();

        self.log_cache_err(ctx.cache.set_uid_map(&self.path, map));
        self.log_cache_err(ctx.cache.set_sync_state(&self.path, self.staged.clone()));

        self.committed = self.staged.clone();
        self.committed_map = self.model.to_uid_map();
        self.phase = Phase::Done;
        debug!(path = %self.path, exists = self.staged.exists(), "mailbox synchronized");
        ctx.listener.synced(&self.path, &self.staged);
    }

    fn write_flags(&mut self, ctx: &mut SyncContext<'_>, uid: u32, flags: Vec<String>) {
        if uid == 0 {
            return;
        }
        let previous = ctx.cache.msg_flags(&self.path, uid).unwrap_or_default();
        if previous == flags {
            return;
        }
        self.log_cache_err(ctx.cache.set_msg_flags(&self.path, uid, flags));
        ctx.listener.flags_changed(&self.path, uid);
    }

    // === Errors ===

    /// Non-fatal protocol violation: surfaced, logged, the task continues.
    /// Recovery is the caller's decision.
    fn violation(&mut self, ctx: &mut SyncContext<'_>, message: &str) {
        warn!(path = %self.path, message, "protocol violation");
        ctx.listener.error_occurred(&self.path, message);
    }

    fn fail(&mut self, ctx: &mut SyncContext<'_>, message: &str) {
        warn!(path = %self.path, message, "synchronization failed");
        self.phase = Phase::Failed;
        self.pending.clear();
        ctx.listener.error_occurred(&self.path, message);
    }

    fn log_cache_err<T>(&self, result: Result<T, crate::cache::CacheError>) {
        if let Err(error) = result {
            // The in-memory view stays authoritative for this session.
            warn!(path = %self.path, %error, "cache write failed, continuing");
        }
    }
}
