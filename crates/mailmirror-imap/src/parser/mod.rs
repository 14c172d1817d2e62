//! IMAP response parser.
//!
//! A recursive-descent reader over the raw bytes of one framed response:
//! the RFC 3501 grammar plus the RFC 7162 (VANISHED) and RFC 4731
//! (ESEARCH) productions the synchronizer consumes, and the ARRIVED
//! announcement from the QRESYNC-ARRIVED draft. There is no token stream;
//! each production pulls exactly what it needs off a byte [`cursor`].

mod code;
pub(crate) mod cursor;
mod fetch;
mod types;

pub use types::{FetchItem, UntaggedResponse};

use cursor::Cursor;

use crate::types::{
    expand_number_set, Capability, Flag, Flags, ResponseCode, SeqNum, Status, Tag,
};
use crate::Result;

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete framed response.
    ///
    /// # Errors
    ///
    /// Returns a syntax error with the byte offset where decoding gave up.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut cur = Cursor::new(input);

        if cur.eat(b'+') {
            cur.eat(b' ');
            let text = cur.line();
            return Ok(Response::Continuation {
                text: (!text.is_empty()).then_some(text),
            });
        }
        if cur.eat(b'*') {
            cur.space()?;
            return untagged(&mut cur).map(Response::Untagged);
        }
        tagged(&mut cur)
    }
}

fn tagged(cur: &mut Cursor<'_>) -> Result<Response> {
    let tag = Tag::new(cur.word()?);
    cur.space()?;
    let word = cur.word()?;
    let status =
        Status::parse(word).ok_or_else(|| cur.fail(format!("{word} is not a response status")))?;
    cur.space()?;
    let (code, text) = status_tail(cur)?;
    Ok(Response::Tagged {
        tag,
        status,
        code,
        text,
    })
}

fn untagged(cur: &mut Cursor<'_>) -> Result<UntaggedResponse> {
    // Message data leads with its number: `* 12 EXISTS`, `* 4 EXPUNGE`, ...
    if cur.first().is_some_and(|b| b.is_ascii_digit()) {
        let n = cur.number32()?;
        cur.space()?;
        return message_data(cur, n);
    }

    let word = cur.word()?.to_ascii_uppercase();
    match word.as_str() {
        "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
            cur.space()?;
            let (code, text) = status_tail(cur)?;
            Ok(condition(&word, code, text))
        }
        "CAPABILITY" => Ok(UntaggedResponse::Capability(capability_list(cur))),
        "FLAGS" => {
            cur.space()?;
            Ok(UntaggedResponse::Flags(flag_list(cur)?))
        }
        "SEARCH" => Ok(UntaggedResponse::Search(search_hits(cur)?)),
        "ESEARCH" => esearch(cur),
        "VANISHED" => vanished(cur),
        "ARRIVED" => {
            cur.space()?;
            Ok(UntaggedResponse::Arrived(number_set(cur)?))
        }
        _ => Err(cur.fail(format!("no such data response: {word}"))),
    }
}

/// Builds the status-condition variant named by `kind`.
fn condition(kind: &str, code: Option<ResponseCode>, text: String) -> UntaggedResponse {
    match kind {
        "OK" => UntaggedResponse::Ok { code, text },
        "NO" => UntaggedResponse::No { code, text },
        "BAD" => UntaggedResponse::Bad { code, text },
        "PREAUTH" => UntaggedResponse::PreAuth { code, text },
        _ => UntaggedResponse::Bye { code, text },
    }
}

fn message_data(cur: &mut Cursor<'_>, n: u32) -> Result<UntaggedResponse> {
    let word = cur.word()?.to_ascii_uppercase();
    match word.as_str() {
        "EXISTS" => Ok(UntaggedResponse::Exists(n)),
        "RECENT" => Ok(UntaggedResponse::Recent(n)),
        "EXPUNGE" => Ok(UntaggedResponse::Expunge(seq_number(cur, n)?)),
        "FETCH" => {
            let seq = seq_number(cur, n)?;
            cur.space()?;
            Ok(UntaggedResponse::Fetch {
                seq,
                items: fetch::items(cur)?,
            })
        }
        _ => Err(cur.fail(format!("no such message data: {word}"))),
    }
}

fn seq_number(cur: &Cursor<'_>, n: u32) -> Result<SeqNum> {
    SeqNum::new(n).ok_or_else(|| cur.fail("message numbers start at 1"))
}

/// Optional bracketed code, then the free text up to the CRLF.
fn status_tail(cur: &mut Cursor<'_>) -> Result<(Option<ResponseCode>, String)> {
    let code = if cur.first() == Some(b'[') {
        Some(code::parse(cur)?)
    } else {
        None
    };
    cur.eat(b' ');
    Ok((code, cur.line()))
}

/// Parenthesized flag list, e.g. `(\Seen \Answered custom)`.
fn flag_list(cur: &mut Cursor<'_>) -> Result<Flags> {
    cur.require(b'(')?;
    let mut flags = Flags::new();
    loop {
        cur.skip_spaces();
        if cur.eat(b')') {
            break;
        }
        flags.insert(Flag::parse(cur.word()?));
    }
    Ok(flags)
}

/// Space-led capability words until the line or code body runs out.
fn capability_list(cur: &mut Cursor<'_>) -> Vec<Capability> {
    let mut caps = Vec::new();
    while cur.eat(b' ') {
        match cur.word() {
            Ok(word) => caps.push(Capability::parse(word)),
            Err(_) => break,
        }
    }
    caps
}

/// Zero or more space-separated numbers after SEARCH.
fn search_hits(cur: &mut Cursor<'_>) -> Result<Vec<u32>> {
    let mut hits = Vec::new();
    loop {
        cur.skip_spaces();
        if !cur.first().is_some_and(|b| b.is_ascii_digit()) {
            break;
        }
        let n = cur.number32()?;
        if n > 0 {
            hits.push(n);
        }
    }
    Ok(hits)
}

/// A wire message set (`1:5,9,11:13`), expanded ascending.
fn number_set(cur: &mut Cursor<'_>) -> Result<Vec<u32>> {
    let raw = cur.take_while(|b| b.is_ascii_digit() || b == b':' || b == b',');
    if raw.is_empty() {
        return Err(cur.fail("expected a message set"));
    }
    let raw = std::str::from_utf8(raw).map_err(|_| cur.fail("message set is not UTF-8"))?;
    expand_number_set(raw).map_err(|detail| cur.fail(detail))
}

/// ESEARCH: optional `(TAG "t")` correlator, the UID indicator, and
/// result pairs of which only ALL matters here. MIN/MAX/COUNT/MODSEQ are
/// tolerated and dropped.
fn esearch(cur: &mut Cursor<'_>) -> Result<UntaggedResponse> {
    let mut tag = None;
    let mut uid = false;
    let mut all = Vec::new();

    cur.skip_spaces();
    if cur.eat(b'(') {
        let label = cur.word()?;
        if !label.eq_ignore_ascii_case("TAG") {
            return Err(cur.fail(format!("unknown ESEARCH correlator {label}")));
        }
        cur.space()?;
        tag = Some(cur.astring()?);
        cur.require(b')')?;
    }

    loop {
        cur.skip_spaces();
        if matches!(cur.first(), None | Some(b'\r')) {
            break;
        }
        let item = cur.word()?.to_ascii_uppercase();
        match item.as_str() {
            "UID" => uid = true,
            "ALL" => {
                cur.space()?;
                all = number_set(cur)?;
            }
            _ => {
                cur.space()?;
                let _ = cur.number()?;
            }
        }
    }

    Ok(UntaggedResponse::ESearch { tag, uid, all })
}

/// VANISHED: optional `(EARLIER)` modifier, then the UID set.
fn vanished(cur: &mut Cursor<'_>) -> Result<UntaggedResponse> {
    cur.skip_spaces();
    let earlier = if cur.eat(b'(') {
        let word = cur.word()?;
        if !word.eq_ignore_ascii_case("EARLIER") {
            return Err(cur.fail(format!("unknown VANISHED modifier {word}")));
        }
        cur.require(b')')?;
        cur.skip_spaces();
        true
    } else {
        false
    };
    Ok(UntaggedResponse::Vanished {
        earlier,
        uids: number_set(cur)?,
    })
}
