//! FETCH response parsing.

use super::cursor::{atom_byte, Cursor};
use super::flag_list;
use super::types::FetchItem;
use crate::types::Uid;
use crate::Result;

/// Parses the parenthesized data list of a FETCH response.
///
/// FLAGS, UID, and MODSEQ are kept; any other item is skipped together
/// with its value, so richer unsolicited FETCHes do not trip the
/// synchronizer.
pub(super) fn items(cur: &mut Cursor<'_>) -> Result<Vec<FetchItem>> {
    cur.require(b'(')?;
    let mut items = Vec::new();
    loop {
        cur.skip_spaces();
        if cur.eat(b')') {
            break;
        }
        let name = cur.word()?.to_ascii_uppercase();
        cur.space()?;
        match name.as_str() {
            "FLAGS" => items.push(FetchItem::Flags(flag_list(cur)?)),
            "UID" => {
                let uid = Uid::new(cur.number32()?).ok_or_else(|| cur.fail("UID of zero"))?;
                items.push(FetchItem::Uid(uid));
            }
            "MODSEQ" => {
                // The value arrives parenthesized in FETCH.
                cur.require(b'(')?;
                items.push(FetchItem::ModSeq(cur.number()?));
                cur.require(b')')?;
            }
            _ => skip_value(cur)?,
        }
    }
    Ok(items)
}

/// Skips one data value: a parenthesized list (with any strings or
/// literals it contains), a quoted string, a literal, or a bare word.
fn skip_value(cur: &mut Cursor<'_>) -> Result<()> {
    match cur.first() {
        Some(b'(') => {
            let mut depth = 0usize;
            loop {
                match cur.first() {
                    Some(b'(') => {
                        cur.bump();
                        depth += 1;
                    }
                    Some(b')') => {
                        cur.bump();
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                    Some(b'"') => {
                        cur.quoted()?;
                    }
                    Some(b'{') => {
                        cur.literal()?;
                    }
                    Some(b'\r') | None => {
                        return Err(cur.fail("unbalanced list in FETCH data"));
                    }
                    Some(_) => {
                        cur.bump();
                    }
                }
            }
        }
        Some(b'"') => cur.quoted().map(drop),
        Some(b'{') => cur.literal().map(drop),
        Some(b) if atom_byte(b) => {
            let _ = cur.take_while(atom_byte);
            Ok(())
        }
        _ => Err(cur.fail("expected a FETCH value")),
    }
}
