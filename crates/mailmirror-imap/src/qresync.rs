//! QRESYNC and CONDSTORE support (RFC 7162).
//!
//! Parameter types for the QRESYNC SELECT variants. CONDSTORE needs no
//! parameters beyond the `(CONDSTORE)` select argument; QRESYNC carries the
//! cached UIDVALIDITY, HIGHESTMODSEQ, and a small sequence/UID sample the
//! server can use to detect renumbering.

use std::num::NonZeroU64;

use crate::types::UidValidity;

/// Modification sequence number (MODSEQ).
///
/// Each message has a MODSEQ value that increases whenever the message's
/// metadata changes; the server maintains a per-mailbox HIGHESTMODSEQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModSeq(NonZeroU64);

impl ModSeq {
    /// Creates a new `ModSeq` from a u64, returning `None` if zero.
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Returns the raw value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ModSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for ModSeq {
    type Error = &'static str;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        Self::from_u64(value).ok_or("ModSeq cannot be zero")
    }
}

/// Parameters for the QRESYNC SELECT variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QresyncParams {
    /// The last known UIDVALIDITY.
    pub uid_validity: UidValidity,
    /// The last known HIGHESTMODSEQ.
    pub mod_seq: ModSeq,
    /// Sequence/UID sample of the known messages, if any are known.
    pub sample: Option<SeqUidMatch>,
}

impl QresyncParams {
    /// Creates QRESYNC parameters.
    #[must_use]
    pub const fn new(uid_validity: UidValidity, mod_seq: ModSeq) -> Self {
        Self {
            uid_validity,
            mod_seq,
            sample: None,
        }
    }

    /// Attaches a sequence/UID sample.
    #[must_use]
    pub fn with_sample(mut self, sample: SeqUidMatch) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Serializes the parameter list, e.g. `(666 33 (2 9))`.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = format!("({} {}", self.uid_validity.get(), self.mod_seq.get());
        if let Some(sample) = &self.sample {
            out.push_str(" (");
            out.push_str(&sample.serialize());
            out.push(')');
        }
        out.push(')');
        out
    }
}

/// Sequence-to-UID sample for QRESYNC.
///
/// A handful of (sequence number, UID) reference points from the cached
/// map; the server uses them to decide how much renumbering to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqUidMatch {
    pairs: Vec<(u32, u32)>,
}

impl SeqUidMatch {
    /// Samples a cached UID map: the midpoint position, plus the final
    /// position when the map holds at least four messages.
    ///
    /// Positions are 1-based sequence numbers. Returns `None` for an empty
    /// map or one containing placeholder (zero) UIDs at the sampled spots.
    #[must_use]
    pub fn from_uid_map(uids: &[u32]) -> Option<Self> {
        if uids.is_empty() {
            return None;
        }
        let len = uids.len();
        let mid = len.div_ceil(2);
        let mut pairs = vec![(u32::try_from(mid).ok()?, *uids.get(mid - 1)?)];
        if len >= 4 {
            pairs.push((u32::try_from(len).ok()?, *uids.last()?));
        }
        if pairs.iter().any(|&(_, uid)| uid == 0) {
            return None;
        }
        Some(Self { pairs })
    }

    /// Serializes as `<seqs> <uids>`, e.g. `3,5 3,5`.
    #[must_use]
    pub fn serialize(&self) -> String {
        let seqs: Vec<String> = self.pairs.iter().map(|(s, _)| s.to_string()).collect();
        let uids: Vec<String> = self.pairs.iter().map(|(_, u)| u.to_string()).collect();
        format!("{} {}", seqs.join(","), uids.join(","))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uv(n: u32) -> UidValidity {
        UidValidity::new(n).unwrap()
    }

    #[test]
    fn modseq_rejects_zero() {
        assert!(ModSeq::from_u64(0).is_none());
        assert_eq!(ModSeq::from_u64(33).unwrap().get(), 33);
    }

    #[test]
    fn modseq_try_from() {
        let ok: std::result::Result<ModSeq, _> = 100u64.try_into();
        assert!(ok.is_ok());
        let err: std::result::Result<ModSeq, _> = 0u64.try_into();
        assert!(err.is_err());
    }

    #[test]
    fn sample_small_map_uses_midpoint() {
        let sample = SeqUidMatch::from_uid_map(&[6, 9, 10]).unwrap();
        assert_eq!(sample.serialize(), "2 9");
    }

    #[test]
    fn sample_larger_map_adds_final_position() {
        let sample = SeqUidMatch::from_uid_map(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(sample.serialize(), "3,5 3,5");
    }

    #[test]
    fn sample_empty_map() {
        assert!(SeqUidMatch::from_uid_map(&[]).is_none());
    }

    #[test]
    fn sample_rejects_placeholder_uids() {
        assert!(SeqUidMatch::from_uid_map(&[6, 0, 10]).is_none());
    }

    #[test]
    fn params_serialize_without_sample() {
        let params = QresyncParams::new(uv(666), ModSeq::from_u64(33).unwrap());
        assert_eq!(params.serialize(), "(666 33)");
    }

    #[test]
    fn params_serialize_with_sample() {
        let params = QresyncParams::new(uv(666), ModSeq::from_u64(33).unwrap())
            .with_sample(SeqUidMatch::from_uid_map(&[6, 9, 10]).unwrap());
        assert_eq!(params.serialize(), "(666 33 (2 9))");
    }
}
