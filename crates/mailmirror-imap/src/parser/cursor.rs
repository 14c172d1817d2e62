//! Byte cursor over one framed response.
//!
//! The parser walks the raw bytes directly with a handful of grammar-level
//! readers; there is no separate token stream. Each reader either consumes
//! what it names or reports where it got stuck.

use crate::{Error, Result};

/// Whether a byte may appear in an atom.
///
/// Derived negatively from the RFC 3501 `atom-specials`: anything printable
/// except SP, the delimiters `( ) { } [ ]`, the wildcards `% *`, and the
/// double quote. One concession on top of the RFC: `\` stays in, so system
/// flags (`\Seen`) read as one word; the wildcard flag `\*` is handled by
/// [`Cursor::word`] itself.
pub(crate) const fn atom_byte(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(
            b,
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b'%' | b'*' | b'"'
        )
}

/// Read position over one framed response.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.at.min(self.buf.len())..]
    }

    /// The byte under the cursor.
    pub(crate) fn first(&self) -> Option<u8> {
        self.buf.get(self.at).copied()
    }

    /// Consumes and returns one byte.
    pub(crate) fn bump(&mut self) -> Option<u8> {
        let b = self.first()?;
        self.at += 1;
        Some(b)
    }

    /// Moves forward `n` bytes, clamped to the end.
    pub(crate) fn advance(&mut self, n: usize) {
        self.at = (self.at + n).min(self.buf.len());
    }

    /// Consumes `b` if it is next. Returns whether it was.
    pub(crate) fn eat(&mut self, b: u8) -> bool {
        if self.first() == Some(b) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    /// Consumes a CRLF pair if one is next.
    pub(crate) fn eat_crlf(&mut self) -> bool {
        if self.rest().starts_with(b"\r\n") {
            self.at += 2;
            true
        } else {
            false
        }
    }

    /// Demands `b` next.
    pub(crate) fn require(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.fail(format!("expected {:?}", char::from(b))))
        }
    }

    /// Demands a single SP.
    pub(crate) fn space(&mut self) -> Result<()> {
        self.require(b' ')
    }

    /// Consumes any run of SP.
    pub(crate) fn skip_spaces(&mut self) {
        while self.eat(b' ') {}
    }

    /// Consumes the longest prefix satisfying `pred` and returns it.
    pub(crate) fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.at;
        while self.first().is_some_and(&pred) {
            self.at += 1;
        }
        &self.buf[start..self.at]
    }

    /// Reads one atom, including the `\*` wildcard-flag form.
    pub(crate) fn word(&mut self) -> Result<&'a str> {
        let start = self.at;
        loop {
            match self.first() {
                Some(b) if atom_byte(b) => self.at += 1,
                // `\*` from a PERMANENTFLAGS list is one word.
                Some(b'*') if self.at > start && self.buf[self.at - 1] == b'\\' => self.at += 1,
                _ => break,
            }
        }
        if self.at == start {
            return Err(self.fail("expected a word"));
        }
        std::str::from_utf8(&self.buf[start..self.at])
            .map_err(|_| self.fail("word is not UTF-8"))
    }

    /// Reads a run of digits as a number. Mod-sequences need the full
    /// 63-bit range, so this is wide.
    pub(crate) fn number(&mut self) -> Result<u64> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.fail("expected a number"));
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.fail("number does not fit in 64 bits"))
    }

    /// Reads a number that must fit UIDs, sequence numbers, and counts.
    pub(crate) fn number32(&mut self) -> Result<u32> {
        let n = self.number()?;
        u32::try_from(n).map_err(|_| self.fail("number does not fit in 32 bits"))
    }

    /// Reads a quoted string, undoing `\"` and `\\` escapes.
    pub(crate) fn quoted(&mut self) -> Result<String> {
        self.require(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b @ (b'"' | b'\\')) => out.push(b),
                    _ => return Err(self.fail("bad escape in quoted string")),
                },
                Some(b'\r') | None => return Err(self.fail("quoted string never closes")),
                Some(b) => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.fail("quoted string is not UTF-8"))
    }

    /// Reads a `{n}` (or `{n+}`) literal and its payload bytes.
    pub(crate) fn literal(&mut self) -> Result<Vec<u8>> {
        self.require(b'{')?;
        let len = self.number()?;
        let len = usize::try_from(len).map_err(|_| self.fail("literal size overflows"))?;
        self.eat(b'+');
        self.require(b'}')?;
        if !self.eat_crlf() {
            return Err(self.fail("literal size must be followed by CRLF"));
        }
        if self.buf.len() - self.at < len {
            return Err(self.fail("literal runs past the end of the response"));
        }
        let data = self.buf[self.at..self.at + len].to_vec();
        self.at += len;
        Ok(data)
    }

    /// Reads an astring: a word, a quoted string, or a literal.
    pub(crate) fn astring(&mut self) -> Result<String> {
        match self.first() {
            Some(b'"') => self.quoted(),
            Some(b'{') => {
                let data = self.literal()?;
                String::from_utf8(data).map_err(|_| self.fail("literal is not UTF-8"))
            }
            _ => self.word().map(str::to_string),
        }
    }

    /// Consumes and returns the rest of the line, minus its CRLF.
    pub(crate) fn line(&mut self) -> String {
        let rest = self.rest();
        let end = rest.iter().position(|&b| b == b'\r').unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.at += end;
        self.eat_crlf();
        text
    }

    /// Builds an error at the current position.
    pub(crate) fn fail(&self, detail: impl Into<String>) -> Error {
        Error {
            offset: self.at,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn word_stops_at_specials() {
        let mut cur = Cursor::new(b"UIDNEXT 15]");
        assert_eq!(cur.word().unwrap(), "UIDNEXT");
        cur.space().unwrap();
        assert_eq!(cur.number().unwrap(), 15);
        assert_eq!(cur.first(), Some(b']'));
    }

    #[test]
    fn word_keeps_backslash_flags_whole() {
        let mut cur = Cursor::new(b"\\Seen \\* rest");
        assert_eq!(cur.word().unwrap(), "\\Seen");
        cur.space().unwrap();
        assert_eq!(cur.word().unwrap(), "\\*");
    }

    #[test]
    fn bare_wildcard_is_not_a_word() {
        assert!(Cursor::new(b"*").word().is_err());
    }

    #[test]
    fn numbers_are_wide_but_checked() {
        let mut cur = Cursor::new(b"18446744073709551615");
        assert_eq!(cur.number().unwrap(), u64::MAX);
        assert!(Cursor::new(b"4294967296").number32().is_err());
        assert!(Cursor::new(b"x").number().is_err());
    }

    #[test]
    fn quoted_strings_unescape() {
        let mut cur = Cursor::new(b"\"a \\\"b\\\" c\" tail");
        assert_eq!(cur.quoted().unwrap(), "a \"b\" c");
        assert_eq!(cur.first(), Some(b' '));
    }

    #[test]
    fn quoted_string_must_close_on_the_line() {
        assert!(Cursor::new(b"\"open\r\n").quoted().is_err());
    }

    #[test]
    fn literal_reads_payload() {
        let mut cur = Cursor::new(b"{5}\r\nhello tail");
        assert_eq!(cur.literal().unwrap(), b"hello");
        assert_eq!(cur.first(), Some(b' '));
    }

    #[test]
    fn literal_plus_marker_is_accepted() {
        let mut cur = Cursor::new(b"{3+}\r\nabc");
        assert_eq!(cur.literal().unwrap(), b"abc");
    }

    #[test]
    fn truncated_literal_is_an_error() {
        assert!(Cursor::new(b"{9}\r\nshort").literal().is_err());
    }

    #[test]
    fn astring_accepts_all_three_forms() {
        assert_eq!(Cursor::new(b"plain").astring().unwrap(), "plain");
        assert_eq!(Cursor::new(b"\"two words\"").astring().unwrap(), "two words");
        assert_eq!(Cursor::new(b"{2}\r\nok").astring().unwrap(), "ok");
    }

    #[test]
    fn line_strips_crlf_and_stops_there() {
        let mut cur = Cursor::new(b"the text\r\n");
        assert_eq!(cur.line(), "the text");
        assert!(cur.rest().is_empty());
    }

    #[test]
    fn atom_byte_follows_the_grammar() {
        for good in [b'A', b'z', b'0', b':', b'.', b'+', b'\\', b'=', b'-'] {
            assert!(atom_byte(good), "{good:#04x} should be an atom byte");
        }
        for bad in [b' ', b'(', b')', b'{', b'}', b'[', b']', b'%', b'*', b'"', b'\r', 0x1f] {
            assert!(!atom_byte(bad), "{bad:#04x} should not be an atom byte");
        }
    }

    #[test]
    fn errors_carry_the_offset() {
        let mut cur = Cursor::new(b"ab (");
        let _ = cur.word();
        cur.space().unwrap();
        let err = cur.word().unwrap_err();
        assert_eq!(err.offset, 3);
    }
}
