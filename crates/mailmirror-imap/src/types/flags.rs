//! Message flags.

/// Message flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message is recent (first session to see it).
    Recent,
    /// The `\*` token from a PERMANENTFLAGS list (client keywords allowed).
    Wildcard,
    /// Custom keyword flag.
    Keyword(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            "\\*" => Self::Wildcard,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP atom.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Wildcard => "\\*",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collection of message flags, preserving server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flags collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates flags from a vector.
    #[must_use]
    pub fn from_vec(flags: Vec<Flag>) -> Self {
        Self { flags }
    }

    /// Adds a flag, ignoring duplicates.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns the atoms in server order.
    #[must_use]
    pub fn to_atoms(&self) -> Vec<String> {
        self.flags.iter().map(|f| f.as_str().to_string()).collect()
    }

    /// Returns the atoms sorted and deduplicated.
    ///
    /// This is the canonical per-message form kept in the cache, so that
    /// flag lists compare equal regardless of the order a server lists them.
    #[must_use]
    pub fn to_sorted_atoms(&self) -> Vec<String> {
        let mut atoms = self.to_atoms();
        atoms.sort();
        atoms.dedup();
        atoms
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_system_flags() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\Answered"), Flag::Answered);
            assert_eq!(Flag::parse("\\Flagged"), Flag::Flagged);
            assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
            assert_eq!(Flag::parse("\\Draft"), Flag::Draft);
            assert_eq!(Flag::parse("\\Recent"), Flag::Recent);
        }

        #[test]
        fn parse_wildcard() {
            assert_eq!(Flag::parse("\\*"), Flag::Wildcard);
        }

        #[test]
        fn parse_keyword() {
            assert_eq!(
                Flag::parse("$Important"),
                Flag::Keyword("$Important".to_string())
            );
        }

        #[test]
        fn as_str_round_trip() {
            assert_eq!(Flag::Seen.as_str(), "\\Seen");
            assert_eq!(Flag::Wildcard.as_str(), "\\*");
            assert_eq!(Flag::Keyword("blah".to_string()).as_str(), "blah");
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn insert_unique() {
            let mut flags = Flags::new();
            flags.insert(Flag::Seen);
            flags.insert(Flag::Seen);
            assert_eq!(flags.len(), 1);
        }

        #[test]
        fn preserves_server_order() {
            let flags = Flags::from_vec(vec![
                Flag::Answered,
                Flag::Flagged,
                Flag::Deleted,
                Flag::Seen,
                Flag::Draft,
            ]);
            assert_eq!(
                flags.to_atoms(),
                vec!["\\Answered", "\\Flagged", "\\Deleted", "\\Seen", "\\Draft"]
            );
        }

        #[test]
        fn sorted_atoms_normalize_order() {
            let flags =
                Flags::from_vec(vec![Flag::Keyword("x2".to_string()), Flag::Seen]);
            assert_eq!(flags.to_sorted_atoms(), vec!["\\Seen", "x2"]);
        }

        #[test]
        fn remove() {
            let mut flags = Flags::from_vec(vec![Flag::Seen, Flag::Answered]);
            flags.remove(&Flag::Seen);
            assert!(!flags.contains(&Flag::Seen));
            assert!(flags.contains(&Flag::Answered));
        }

        #[test]
        fn is_seen() {
            assert!(Flags::from_vec(vec![Flag::Seen]).is_seen());
            assert!(!Flags::new().is_seen());
        }
    }
}
