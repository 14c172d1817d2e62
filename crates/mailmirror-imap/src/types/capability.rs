//! Server capabilities and response status.

/// Response status from a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }

    /// Parses a status word, case-insensitively. `None` when the word is
    /// not a status condition.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// The `X-DRAFT-I01-QRESYNC-ARRIVED` draft extension.
    QResyncArrived,
    /// ESEARCH (RFC 4731)
    ESearch,
    /// ENABLE command (RFC 5161)
    Enable,
    /// IDLE command support (RFC 2177)
    Idle,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "X-DRAFT-I01-QRESYNC-ARRIVED" => Self::QResyncArrived,
            "ESEARCH" => Self::ESearch,
            "ENABLE" => Self::Enable,
            "IDLE" => Self::Idle,
            "UIDPLUS" => Self::UidPlus,
            "LITERAL+" => Self::LiteralPlus,
            _ if upper.starts_with("AUTH=") => Self::Auth(s[5..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::QResyncArrived => write!(f, "X-DRAFT-I01-QRESYNC-ARRIVED"),
            Self::ESearch => write!(f, "ESEARCH"),
            Self::Enable => write!(f, "ENABLE"),
            Self::Idle => write!(f, "IDLE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}
