//! Deserialize data from the bytecode protocol.
//!
//! Parsers are plain nom functions over [`NomBytes`]. [`decode`] runs one over
//! a full response body and turns nom's failures into crate errors: running
//! off the end of the buffer becomes [`Error::TruncatedMessage`], anything
//! else becomes [`Error::ParsingError`].
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    error::ErrorKind,
    number::complete::{be_i16, be_i32, be_i8, be_u8},
    IResult,
};
use nombytes::NomBytes;

use crate::error::{Error, Result};

// Upper bound on the capacity reserved up front for a decoded array,
// whatever count the peer claims.
const MAX_PREALLOCATED_ITEMS: usize = 1024;

/// Run `parser` over an entire response body.
pub fn decode<O, F>(s: Bytes, mut parser: F) -> Result<O>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    match parser(NomBytes::new(s.clone())) {
        Ok((rest, output)) => {
            if !rest.to_bytes().is_empty() {
                tracing::trace!("Ignoring {} trailing bytes", rest.to_bytes().len());
            }
            Ok(output)
        }
        Err(nom::Err::Incomplete(_)) => Err(Error::TruncatedMessage),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) if err.code == ErrorKind::Eof => {
            Err(Error::TruncatedMessage)
        }
        Err(err) => {
            tracing::error!("ERROR: Failed parsing {:?}", err);
            Err(Error::ParsingError(s))
        }
    }
}

fn fail<O>(s: NomBytes, kind: ErrorKind) -> IResult<NomBytes, O> {
    Err(nom::Err::Error(nom::error::Error::new(s, kind)))
}

fn to_string(s: NomBytes, bytes: NomBytes) -> IResult<NomBytes, String> {
    match String::from_utf8(bytes.to_bytes().to_vec()) {
        Ok(string) => Ok((s, string)),
        Err(_) => fail(s, ErrorKind::Char),
    }
}

pub fn parse_bool(s: NomBytes) -> IResult<NomBytes, bool> {
    let (s, b) = be_i8(s)?;
    Ok((s, b != 0))
}

pub fn parse_unsigned_varint(s: NomBytes) -> IResult<NomBytes, u32> {
    let mut value: u32 = 0;
    let mut s = s;
    for i in 0..5 {
        let (rest, byte) = be_u8(s)?;
        if i == 4 && byte > 0x0f {
            return fail(rest, ErrorKind::TooLarge);
        }
        value |= ((byte & 0x7f) as u32) << (7 * i);
        s = rest;
        if byte & 0x80 == 0 {
            return Ok((s, value));
        }
    }
    fail(s, ErrorKind::TooLarge)
}

fn parse_unsigned_varlong(s: NomBytes) -> IResult<NomBytes, u64> {
    let mut value: u64 = 0;
    let mut s = s;
    for i in 0..10 {
        let (rest, byte) = be_u8(s)?;
        if i == 9 && byte > 0x01 {
            return fail(rest, ErrorKind::TooLarge);
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
        s = rest;
        if byte & 0x80 == 0 {
            return Ok((s, value));
        }
    }
    fail(s, ErrorKind::TooLarge)
}

/// Zigzag encoded signed varint.
pub fn parse_varint(s: NomBytes) -> IResult<NomBytes, i32> {
    let (s, n) = parse_unsigned_varint(s)?;
    Ok((s, ((n >> 1) as i32) ^ -((n & 1) as i32)))
}

pub fn parse_varlong(s: NomBytes) -> IResult<NomBytes, i64> {
    let (s, n) = parse_unsigned_varlong(s)?;
    Ok((s, ((n >> 1) as i64) ^ -((n & 1) as i64)))
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, String> {
    let (s, length) = be_i16(s)?;
    parse_string_body(s, length)
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<String>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    let (s, string) = parse_string_body(s, length)?;
    Ok((s, Some(string)))
}

fn parse_string_body(s: NomBytes, length: i16) -> IResult<NomBytes, String> {
    if length < 0 {
        return fail(s, ErrorKind::LengthValue);
    }
    let (s, string) = take(length as u16)(s)?;
    to_string(s, string)
}

pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i32(s)?;
    if length < 0 {
        return fail(s, ErrorKind::LengthValue);
    }
    let (s, bytes) = take(length as u32)(s)?;
    Ok((s, bytes.into_bytes()))
}

/// Classic array, `i32` count. A null array (`-1`) parses as empty.
pub fn parse_array<O, F>(mut f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    move |input: NomBytes| {
        let (mut s, length) = be_i32(input)?;
        if length < 0 {
            return Ok((s, vec![]));
        }
        let mut items = Vec::with_capacity((length as usize).min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..length {
            let (rest, item) = f(s)?;
            items.push(item);
            s = rest;
        }
        Ok((s, items))
    }
}

pub fn parse_compact_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<String>> {
    let (s, length) = parse_unsigned_varint(s)?;
    if length == 0 {
        return Ok((s, None));
    }
    let (s, string) = take(length - 1)(s)?;
    let (s, string) = to_string(s, string)?;
    Ok((s, Some(string)))
}

/// Compact string that must not be null.
pub fn parse_compact_string(s: NomBytes) -> IResult<NomBytes, String> {
    let (rest, string) = parse_compact_nullable_string(s.clone())?;
    match string {
        Some(string) => Ok((rest, string)),
        None => fail(s, ErrorKind::Verify),
    }
}

pub fn parse_compact_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = parse_unsigned_varint(s)?;
    if length == 0 {
        return Ok((s, None));
    }
    let (s, bytes) = take(length - 1)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

/// Compact bytes, a null value parses as empty.
pub fn parse_compact_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, bytes) = parse_compact_nullable_bytes(s)?;
    Ok((s, bytes.unwrap_or_default()))
}

/// Compact array, `None` when the array is null.
pub fn parse_compact_nullable_array<O, F>(
    mut f: F,
) -> impl FnMut(NomBytes) -> IResult<NomBytes, Option<Vec<O>>>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    move |input: NomBytes| {
        let (mut s, length) = parse_unsigned_varint(input)?;
        if length == 0 {
            return Ok((s, None));
        }
        let count = (length - 1) as usize;
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..count {
            let (rest, item) = f(s)?;
            items.push(item);
            s = rest;
        }
        Ok((s, Some(items)))
    }
}

/// Compact array, a null array parses as empty.
pub fn parse_compact_array<O, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    let mut inner = parse_compact_nullable_array(f);
    move |input: NomBytes| {
        let (s, items) = inner(input)?;
        Ok((s, items.unwrap_or_default()))
    }
}

/// Reads a tag buffer and skips every tagged field in it.
///
/// None of the API versions defined here declare tagged fields, so their
/// content is never interpreted; each one is `tag, size, size bytes`.
pub fn parse_tag_buffer(s: NomBytes) -> IResult<NomBytes, ()> {
    let (mut s, count) = parse_unsigned_varint(s)?;
    for _ in 0..count {
        let (rest, tag) = parse_unsigned_varint(s)?;
        let (rest, size) = parse_unsigned_varint(rest)?;
        let (rest, _) = take(size)(rest)?;
        tracing::trace!("Skipping tagged field {} ({} bytes)", tag, size);
        s = rest;
    }
    Ok((s, ()))
}

pub fn parse_uuid(s: NomBytes) -> IResult<NomBytes, [u8; 16]> {
    let (s, raw) = take(16_usize)(s)?;
    let mut uuid = [0_u8; 16];
    uuid.copy_from_slice(&raw.to_bytes());
    Ok((s, uuid))
}
