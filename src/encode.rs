//! Serialize data into the bytecode protocol.
//!
//! Two families of encodings live side by side. The classic one prefixes
//! strings with an `i16` length and arrays with an `i32` count. The compact
//! one used by flexible API versions prefixes with an unsigned varint of
//! `length + 1`, reserving `0` for null, and ends every structure with a
//! tag buffer.
use bytes::{BufMut, Bytes};

use crate::error::{Error, Result};

// Helper macro to safely convert an usize expression into a signed
// integer.  If the conversion is not possible the macro issues a
// `EncodingError`, otherwise returns the expression
// in the requested target type.
macro_rules! try_usize_to_int {
    // ~ $ttype should actually be a 'ty' ... but rust complains for
    // some reason :/
    ($value:expr, $ttype:ident) => {{
        let maxv = $ttype::MAX;
        let x: usize = $value;
        if (x as u64) <= (maxv as u64) {
            x as $ttype
        } else {
            return Err(Error::EncodingError);
        }
    }};
}

pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for bool {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self as i8);
        Ok(())
    }
}

impl ToByte for i8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl ToByte for str {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let l = try_usize_to_int!(self.len(), i16);
        buffer.put_i16(l);
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl ToByte for String {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

impl ToByte for [u8] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let l = try_usize_to_int!(self.len(), i32);
        buffer.put_i32(l);
        buffer.put(self);
        Ok(())
    }
}

impl ToByte for Bytes {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_ref().encode(buffer)
    }
}

impl<'a> ToByte for Option<&'a str> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(xs) => xs.encode(buffer),
            None => (-1i16).encode(buffer),
        }
    }
}

impl<'a> ToByte for Option<&'a [u8]> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(xs) => xs.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

/// ~ Renders the length of `xs` to `buffer` as the start of a
/// protocol array and then for each element of `xs` invokes `f`
/// assuming that function will render the element to the buffer.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    let l = try_usize_to_int!(xs.len(), i32);
    buffer.put_i32(l);
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

/// Unsigned LEB128 style varint, 7 bits per byte, low bits first.
pub fn encode_unsigned_varint<W: BufMut>(buffer: &mut W, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buffer.put_u8(byte);
            break;
        }
        buffer.put_u8(byte | 0x80);
    }
}

fn encode_unsigned_varlong<W: BufMut>(buffer: &mut W, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buffer.put_u8(byte);
            break;
        }
        buffer.put_u8(byte | 0x80);
    }
}

/// Signed varint using zigzag encoding, so small negatives stay short.
pub fn encode_varint<W: BufMut>(buffer: &mut W, value: i32) {
    encode_unsigned_varint(buffer, ((value << 1) ^ (value >> 31)) as u32);
}

pub fn encode_varlong<W: BufMut>(buffer: &mut W, value: i64) {
    encode_unsigned_varlong(buffer, ((value << 1) ^ (value >> 63)) as u64);
}

/// Writes `len + 1` as an unsigned varint, the compact length prefix.
fn encode_compact_length<W: BufMut>(buffer: &mut W, len: usize) -> Result<()> {
    let l = try_usize_to_int!(len, u32);
    let l = l.checked_add(1).ok_or(Error::EncodingError)?;
    encode_unsigned_varint(buffer, l);
    Ok(())
}

/// Compact nullable string. `None` is written as length `0`.
pub fn encode_compact_string<W: BufMut>(buffer: &mut W, value: Option<&str>) -> Result<()> {
    encode_compact_bytes(buffer, value.map(str::as_bytes))
}

/// Compact nullable bytes. `None` is written as length `0`.
pub fn encode_compact_bytes<W: BufMut>(buffer: &mut W, value: Option<&[u8]>) -> Result<()> {
    match value {
        Some(bytes) => {
            encode_compact_length(buffer, bytes.len())?;
            buffer.put(bytes);
        }
        None => encode_unsigned_varint(buffer, 0),
    }
    Ok(())
}

/// Compact array: `count + 1` followed by each element rendered by `f`.
pub fn encode_compact_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    encode_compact_length(buffer, xs.len())?;
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

/// Compact array where `None` is the null array (count `0`).
pub fn encode_nullable_compact_array<T, F, W>(buffer: &mut W, xs: Option<&[T]>, f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    match xs {
        Some(xs) => encode_compact_array(buffer, xs, f),
        None => {
            encode_unsigned_varint(buffer, 0);
            Ok(())
        }
    }
}

/// A tag buffer with no tagged fields.
pub fn encode_empty_tag_buffer<W: BufMut>(buffer: &mut W) {
    encode_unsigned_varint(buffer, 0);
}
