//! The RESP grammar as a pure positional parser.
//!
//! Every function takes the whole unparsed region and an offset into it,
//! and reports one of three outcomes: `Ok(Some((next_offset, value)))` for
//! a complete value, `Ok(None)` when the slice holds only a prefix of a
//! value, and `Err` for input no future bytes can repair. The `Ok(None)`
//! discipline is what makes the parser composable with fragmented reads:
//! the caller appends more bytes and retries from the same offset.

use crate::config::ParserLimits;
use crate::value::{RespValue, Tag};

use super::{Error, Result};

/// Outcome of one positional parse attempt: `None` means the buffer holds
/// an incomplete value and nothing was decided.
pub(crate) type Step<T> = Option<(usize, T)>;

/// Aggregate children are usually small; claimed counts are not trusted
/// for pre-allocation beyond this.
const PREALLOC_LIMIT: usize = 1024;

/// Parses one complete RESP value starting at `pos`.
///
/// `depth` is the current aggregate nesting level; the top-level caller
/// passes 0.
pub(crate) fn value(
    buf: &[u8],
    pos: usize,
    limits: &ParserLimits,
    depth: usize,
) -> Result<Step<RespValue>> {
    if depth > limits.max_depth {
        return Err(Error::DepthLimit);
    }
    let Some(&tag_byte) = buf.get(pos) else {
        return Ok(None);
    };
    let Some(tag) = Tag::from_byte(tag_byte) else {
        return Err(Error::UnknownType(tag_byte));
    };
    let Some((after_header, header)) = line(buf, pos + 1) else {
        return Ok(None);
    };

    match tag {
        Tag::SimpleString => Ok(Some((after_header, RespValue::SimpleString(text(header)?)))),
        Tag::Error => Ok(Some((after_header, RespValue::Error(text(header)?)))),
        Tag::Integer => Ok(Some((after_header, RespValue::Integer(integer(header)?)))),
        Tag::Double => Ok(Some((after_header, RespValue::Double(double(header)?)))),
        Tag::Boolean => Ok(Some((after_header, RespValue::Boolean(boolean(header)?)))),
        Tag::BigNumber => Ok(Some((after_header, RespValue::BigNumber(big_number(header)?)))),
        Tag::BulkString => Ok(blob(buf, after_header, header, limits)?
            .map(|(next, payload)| (next, payload.map_or(RespValue::Null, RespValue::BulkString)))),
        Tag::BlobError => Ok(blob(buf, after_header, header, limits)?
            .map(|(next, payload)| (next, payload.map_or(RespValue::Null, RespValue::BlobError)))),
        Tag::VerbatimString => match blob(buf, after_header, header, limits)? {
            None => Ok(None),
            Some((_, None)) => Ok(Some((after_header, RespValue::Null))),
            Some((next, Some(payload))) => {
                if payload.len() < 4 || payload[3] != b':' {
                    return Err(Error::BadVerbatim);
                }
                Ok(Some((next, RespValue::VerbatimString(payload))))
            }
        },
        Tag::Array => sequence(buf, after_header, header, limits, depth, RespValue::Array),
        Tag::Set => sequence(buf, after_header, header, limits, depth, RespValue::Set),
        Tag::Push => sequence(buf, after_header, header, limits, depth, RespValue::Push),
        Tag::Map => keyed(buf, after_header, header, limits, depth, RespValue::Map),
        Tag::Attribute => keyed(buf, after_header, header, limits, depth, RespValue::Attribute),
    }
}

/// Finds the first CRLF at or after `start` and splits off the line before
/// it. Returns the offset just past the CRLF together with the line bytes.
fn line(buf: &[u8], start: usize) -> Step<&[u8]> {
    let haystack = buf.get(start..)?;
    haystack
        .windows(2)
        .position(|pair| pair == b"\r\n")
        .map(|at| (start + at + 2, &haystack[..at]))
}

/// Decodes a `+`/`-` line. The CRLF scan cannot leave a CRLF inside the
/// line, but a bare CR or LF is still possible and forbidden.
fn text(header: &[u8]) -> Result<String> {
    if header.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(Error::StrayNewline);
    }
    String::from_utf8(header.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Strict signed 64-bit decimal: optional `-`, then digits only.
fn integer(header: &[u8]) -> Result<i64> {
    let digits = match header.split_first() {
        Some((b'-', rest)) => rest,
        _ => header,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadInteger);
    }
    std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::BadInteger)
}

fn double(header: &[u8]) -> Result<f64> {
    std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::BadDouble)
}

fn boolean(header: &[u8]) -> Result<bool> {
    match header {
        b"t" => Ok(true),
        b"f" => Ok(false),
        _ => Err(Error::BadBoolean),
    }
}

/// Optionally-signed digit run, kept textually. No numeric range check.
fn big_number(header: &[u8]) -> Result<String> {
    let digits = match header.split_first() {
        Some((b'+' | b'-', rest)) => rest,
        _ => header,
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadBigNumber);
    }
    String::from_utf8(header.to_vec()).map_err(|_| Error::BadBigNumber)
}

/// Length/count header: strict decimal digits (leading zeros tolerated),
/// or exactly `-1` for the null sentinel, reported as `None`.
fn length(header: &[u8]) -> Result<Option<u64>> {
    if header == b"-1" {
        return Ok(None);
    }
    if header.is_empty() || !header.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadLength);
    }
    std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or(Error::BadLength)
}

/// Shared framing of `$`, `!` and `=`: a length header already consumed,
/// then exactly that many payload bytes and a trailing CRLF.
///
/// The inner `Option` is the null sentinel; the payload is copied verbatim.
fn blob(
    buf: &[u8],
    pos: usize,
    header: &[u8],
    limits: &ParserLimits,
) -> Result<Step<Option<Vec<u8>>>> {
    let Some(len) = length(header)? else {
        return Ok(Some((pos, None)));
    };
    if len > limits.max_bulk_len as u64 {
        return Err(Error::PayloadTooLarge);
    }
    let len = len as usize;
    let end = pos.checked_add(len).ok_or(Error::PayloadTooLarge)?;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(Error::MissingTerminator);
    }
    Ok(Some((end + 2, Some(buf[pos..end].to_vec()))))
}

/// Count header for aggregates, checked against the element limit.
fn count(header: &[u8], limits: &ParserLimits) -> Result<Option<usize>> {
    match length(header)? {
        None => Ok(None),
        Some(n) if n > limits.max_aggregate_len as u64 => Err(Error::ElementLimit),
        Some(n) => Ok(Some(n as usize)),
    }
}

/// `*`, `~`, `>`: N nested values. A `-1` count is Null.
fn sequence(
    buf: &[u8],
    pos: usize,
    header: &[u8],
    limits: &ParserLimits,
    depth: usize,
    build: fn(Vec<RespValue>) -> RespValue,
) -> Result<Step<RespValue>> {
    let Some(n) = count(header, limits)? else {
        return Ok(Some((pos, RespValue::Null)));
    };
    Ok(elements(buf, pos, n, limits, depth)?.map(|(next, items)| (next, build(items))))
}

/// `%`, `|`: N key/value pairs, so 2·N nested values. No null form.
fn keyed(
    buf: &[u8],
    pos: usize,
    header: &[u8],
    limits: &ParserLimits,
    depth: usize,
    build: fn(Vec<(RespValue, RespValue)>) -> RespValue,
) -> Result<Step<RespValue>> {
    let Some(n) = count(header, limits)? else {
        return Err(Error::BadLength);
    };
    let total = n.checked_mul(2).ok_or(Error::ElementLimit)?;
    let Some((next, flat)) = elements(buf, pos, total, limits, depth)? else {
        return Ok(None);
    };
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(key), Some(val)) = (items.next(), items.next()) {
        pairs.push((key, val));
    }
    Ok(Some((next, build(pairs))))
}

/// Parses exactly `n` nested values, threading the offset through.
fn elements(
    buf: &[u8],
    mut pos: usize,
    n: usize,
    limits: &ParserLimits,
    depth: usize,
) -> Result<Step<Vec<RespValue>>> {
    let mut items = Vec::with_capacity(n.min(PREALLOC_LIMIT));
    for _ in 0..n {
        match value(buf, pos, limits, depth + 1)? {
            Some((next, item)) => {
                pos = next;
                items.push(item);
            }
            None => return Ok(None),
        }
    }
    Ok(Some((pos, items)))
}
