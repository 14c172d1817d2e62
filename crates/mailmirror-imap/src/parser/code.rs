//! Response-code decoding.

use super::cursor::Cursor;
use super::{capability_list, flag_list};
use crate::types::{ResponseCode, SeqNum, Uid, UidValidity};
use crate::Result;

/// Parses a bracketed response code.
///
/// The bracket body is located first and decoded through its own cursor,
/// so a code this module does not model simply passes through as
/// [`ResponseCode::Unknown`] with its payload left unread; there is no
/// skip bookkeeping.
pub(super) fn parse(cur: &mut Cursor<'_>) -> Result<ResponseCode> {
    cur.require(b'[')?;
    let close = cur
        .rest()
        .iter()
        .position(|&b| b == b']')
        .ok_or_else(|| cur.fail("response code never closes"))?;
    let mut body = Cursor::new(&cur.rest()[..close]);
    let code = decode(&mut body)?;
    cur.advance(close + 1);
    Ok(code)
}

fn decode(cur: &mut Cursor<'_>) -> Result<ResponseCode> {
    let word = cur.word()?;
    let code = match word.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "CLOSED" => ResponseCode::Closed,
        "HIGHESTMODSEQ" => {
            cur.space()?;
            ResponseCode::HighestModSeq(cur.number()?)
        }
        "UIDVALIDITY" => {
            cur.space()?;
            let uv = UidValidity::new(cur.number32()?)
                .ok_or_else(|| cur.fail("UIDVALIDITY of zero"))?;
            ResponseCode::UidValidity(uv)
        }
        "UIDNEXT" => {
            cur.space()?;
            let uid =
                Uid::new(cur.number32()?).ok_or_else(|| cur.fail("UIDNEXT of zero"))?;
            ResponseCode::UidNext(uid)
        }
        "UNSEEN" => {
            cur.space()?;
            let seq = SeqNum::new(cur.number32()?)
                .ok_or_else(|| cur.fail("UNSEEN names message zero"))?;
            ResponseCode::Unseen(seq)
        }
        "PERMANENTFLAGS" => {
            cur.space()?;
            ResponseCode::PermanentFlags(flag_list(cur)?.into_iter().collect())
        }
        "CAPABILITY" => ResponseCode::Capability(capability_list(cur)),
        _ => ResponseCode::Unknown(word.to_string()),
    };
    Ok(code)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn parse_code(input: &[u8]) -> ResponseCode {
        let mut cur = Cursor::new(input);
        parse(&mut cur).unwrap()
    }

    #[test]
    fn bare_codes() {
        assert_eq!(parse_code(b"[READ-WRITE] x"), ResponseCode::ReadWrite);
        assert_eq!(parse_code(b"[NOMODSEQ] x"), ResponseCode::NoModSeq);
        assert_eq!(parse_code(b"[CLOSED] x"), ResponseCode::Closed);
    }

    #[test]
    fn numeric_codes() {
        assert!(matches!(
            parse_code(b"[UIDVALIDITY 666] x"),
            ResponseCode::UidValidity(v) if v.get() == 666
        ));
        assert!(matches!(
            parse_code(b"[UIDNEXT 15] x"),
            ResponseCode::UidNext(u) if u.get() == 15
        ));
        assert_eq!(
            parse_code(b"[HIGHESTMODSEQ 715194045007] x"),
            ResponseCode::HighestModSeq(715_194_045_007)
        );
    }

    #[test]
    fn zero_uidvalidity_is_rejected() {
        let mut cur = Cursor::new(b"[UIDVALIDITY 0] x");
        assert!(parse(&mut cur).is_err());
    }

    #[test]
    fn permanent_flags_with_wildcard() {
        match parse_code(b"[PERMANENTFLAGS (\\Answered \\Seen \\*)] x") {
            ResponseCode::PermanentFlags(flags) => {
                assert_eq!(flags.len(), 3);
                assert!(flags.contains(&Flag::Wildcard));
            }
            other => panic!("expected PERMANENTFLAGS, got {other:?}"),
        }
    }

    #[test]
    fn unknown_code_keeps_its_word_and_drops_its_payload() {
        let mut cur = Cursor::new(b"[URLMECH INTERNAL] rest");
        assert_eq!(
            parse(&mut cur).unwrap(),
            ResponseCode::Unknown("URLMECH".to_string())
        );
        // The outer cursor resumes right after the bracket.
        assert_eq!(cur.first(), Some(b' '));
    }

    #[test]
    fn unterminated_code_is_an_error() {
        let mut cur = Cursor::new(b"[ALERT no close\r\n");
        assert!(parse(&mut cur).is_err());
    }
}
