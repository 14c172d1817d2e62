//! Core IMAP identifiers.
//!
//! Types for tags, sequence numbers, UIDs, and UIDVALIDITY.

use std::num::NonZeroU32;

/// IMAP command tag.
///
/// Tags are alphanumeric prefixes that identify commands and their responses.
/// Each command sent by the client has a unique tag, and the server's response
/// includes the same tag to correlate request and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message sequence number.
///
/// Sequence numbers are assigned to messages in a mailbox starting from 1.
/// They are ephemeral and change when messages are expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// UIDs are persistent identifiers that don't change when messages are
/// expunged. Combined with `UIDVALIDITY`, they uniquely identify a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value for a mailbox.
///
/// If this value changes, all cached UIDs are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a new UIDVALIDITY.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod tag_tests {
        use super::*;

        #[test]
        fn new_from_str() {
            let tag = Tag::new("A0001");
            assert_eq!(tag.as_str(), "A0001");
        }

        #[test]
        fn display() {
            let tag = Tag::new("CMD123");
            assert_eq!(format!("{tag}"), "CMD123");
        }

        #[test]
        fn equality() {
            assert_eq!(Tag::new("A001"), Tag::new("A001"));
            assert_ne!(Tag::new("A001"), Tag::new("A002"));
        }
    }

    mod seq_num_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(SeqNum::new(1).unwrap().get(), 1);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(SeqNum::new(0).is_none());
        }

        #[test]
        fn ordering() {
            assert!(SeqNum::new(1).unwrap() < SeqNum::new(2).unwrap());
        }
    }

    mod uid_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(Uid::new(100).unwrap().get(), 100);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(Uid::new(0).is_none());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", Uid::new(12345).unwrap()), "12345");
        }
    }

    mod uid_validity_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(UidValidity::new(666).unwrap().get(), 666);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(UidValidity::new(0).is_none());
        }
    }
}
