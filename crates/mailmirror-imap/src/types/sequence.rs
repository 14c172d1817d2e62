//! Sequence sets for message ranges.

use super::{SeqNum, Uid};

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Range from start to end of mailbox.
    RangeFrom(SeqNum),
    /// All messages (*).
    All,
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

/// UID-based sequence set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Single UID.
    Single(Uid),
    /// Range of UIDs (inclusive).
    Range(Uid, Uid),
    /// Range from start to highest UID.
    RangeFrom(Uid),
    /// All messages.
    All,
    /// Multiple UID specifications.
    Set(Vec<Self>),
}

impl UidSet {
    /// Creates a UID set from a single UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self::Single(uid)
    }

    /// Creates a UID set from a range.
    #[must_use]
    pub fn range(start: Uid, end: Uid) -> Self {
        Self::Range(start, end)
    }

    /// Builds the compact set form from a list of raw UIDs.
    ///
    /// The input is sorted and deduplicated; adjacent UIDs collapse into
    /// ranges, so `[1,2,3,5,9,11,12,13]` serializes as `1:3,5,9,11:13`.
    /// Returns `None` when no strictly positive UID remains.
    #[must_use]
    pub fn from_uids(uids: &[u32]) -> Option<Self> {
        let mut sorted: Vec<u32> = uids.iter().copied().filter(|&u| u > 0).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut items = Vec::new();
        let mut run: Option<(u32, u32)> = None;
        for &uid in &sorted {
            match run {
                Some((start, end)) if uid == end + 1 => run = Some((start, uid)),
                Some((start, end)) => {
                    items.push(Self::run(start, end)?);
                    run = Some((uid, uid));
                }
                None => run = Some((uid, uid)),
            }
        }
        let (start, end) = run?;
        items.push(Self::run(start, end)?);

        if items.len() == 1 {
            items.pop()
        } else {
            Some(Self::Set(items))
        }
    }

    fn run(start: u32, end: u32) -> Option<Self> {
        if start == end {
            Uid::new(start).map(Self::Single)
        } else {
            Some(Self::Range(Uid::new(start)?, Uid::new(end)?))
        }
    }

    /// Converts this UID set to a sequence set for use in UID commands.
    ///
    /// Command serialization expects a `SequenceSet` even when the values
    /// are UIDs (UID FETCH, UID SEARCH).
    #[must_use]
    pub fn as_sequence_set(&self) -> SequenceSet {
        match self {
            // Both Uid and SeqNum wrap NonZeroU32, so this conversion is infallible
            Self::Single(uid) => SequenceSet::Single(SeqNum(uid.0)),
            Self::Range(start, end) => SequenceSet::Range(SeqNum(start.0), SeqNum(end.0)),
            Self::RangeFrom(start) => SequenceSet::RangeFrom(SeqNum(start.0)),
            Self::All => SequenceSet::All,
            Self::Set(items) => SequenceSet::Set(items.iter().map(Self::as_sequence_set).collect()),
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::All => write!(f, "*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

/// Expands a wire-format number set (`1:5,9,11:13`) into an ascending list.
///
/// `*` is not meaningful without mailbox context and is rejected. Ranges
/// may be listed high:low; they expand ascending either way.
///
/// # Errors
///
/// Returns a message describing the malformed portion.
pub fn expand_number_set(s: &str) -> std::result::Result<Vec<u32>, String> {
    let mut out = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once(':') {
            let lo: u32 = lo.parse().map_err(|_| format!("bad set element {part:?}"))?;
            let hi: u32 = hi.parse().map_err(|_| format!("bad set element {part:?}"))?;
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if lo == 0 {
                return Err(format!("zero UID in set element {part:?}"));
            }
            out.extend(lo..=hi);
        } else {
            let n: u32 = part.parse().map_err(|_| format!("bad set element {part:?}"))?;
            if n == 0 {
                return Err(format!("zero UID in set element {part:?}"));
            }
            out.push(n);
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod sequence_set_tests {
        use super::*;

        #[test]
        fn display_single() {
            assert_eq!(format!("{}", SequenceSet::single(42).unwrap()), "42");
        }

        #[test]
        fn display_range() {
            assert_eq!(format!("{}", SequenceSet::range(1, 100).unwrap()), "1:100");
        }

        #[test]
        fn display_range_from() {
            let seq = SequenceSet::RangeFrom(SeqNum::new(50).unwrap());
            assert_eq!(format!("{seq}"), "50:*");
        }

        #[test]
        fn range_zero_returns_none() {
            assert!(SequenceSet::range(0, 10).is_none());
            assert!(SequenceSet::single(0).is_none());
        }
    }

    mod uid_set_tests {
        use super::*;

        #[test]
        fn from_uids_collapses_runs() {
            let set = UidSet::from_uids(&[1, 2, 3, 5, 9, 11, 12, 13]).unwrap();
            assert_eq!(format!("{set}"), "1:3,5,9,11:13");
        }

        #[test]
        fn from_uids_single() {
            let set = UidSet::from_uids(&[9]).unwrap();
            assert_eq!(format!("{set}"), "9");
        }

        #[test]
        fn from_uids_unsorted_input() {
            let set = UidSet::from_uids(&[10, 6, 9]).unwrap();
            assert_eq!(format!("{set}"), "6,9:10");
        }

        #[test]
        fn from_uids_empty() {
            assert!(UidSet::from_uids(&[]).is_none());
            assert!(UidSet::from_uids(&[0]).is_none());
        }

        #[test]
        fn display_range_from() {
            let set = UidSet::RangeFrom(Uid::new(100).unwrap());
            assert_eq!(format!("{set}"), "100:*");
        }

        #[test]
        fn as_sequence_set_round_trip() {
            let set = UidSet::range(Uid::new(1).unwrap(), Uid::new(50).unwrap());
            assert_eq!(format!("{}", set.as_sequence_set()), "1:50");
        }
    }

    mod expand_tests {
        use super::*;

        #[test]
        fn expands_mixed_set() {
            assert_eq!(
                expand_number_set("1:5,9,11:13").unwrap(),
                vec![1, 2, 3, 4, 5, 9, 11, 12, 13]
            );
        }

        #[test]
        fn expands_reversed_range() {
            assert_eq!(expand_number_set("16:15").unwrap(), vec![15, 16]);
        }

        #[test]
        fn rejects_zero() {
            assert!(expand_number_set("0:3").is_err());
        }

        #[test]
        fn rejects_wildcard() {
            assert!(expand_number_set("1:*").is_err());
        }
    }

    proptest! {
        #[test]
        fn from_uids_round_trips_through_expand(mut uids in proptest::collection::vec(1u32..10_000, 1..50)) {
            let set = UidSet::from_uids(&uids).unwrap();
            let expanded = expand_number_set(&set.to_string()).unwrap();
            uids.sort_unstable();
            uids.dedup();
            prop_assert_eq!(expanded, uids);
        }
    }
}
