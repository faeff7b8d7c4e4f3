//! Typed byte-level I/O: fixed-width integers, GUIDs, length-prefixed
//! strings, and the packed bit-field types used throughout the wire format.
//!
//! Nothing above this module touches a `Read`/`Write` handle directly.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{Error, Result};

/// A type that can be read from a little-endian byte stream.
pub trait Readable: Sized {
    fn read<R: Read>(reader: &mut R) -> Result<Self>;
}

/// A type that can be written to a little-endian byte stream.
pub trait Writable {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()>;
}

impl Readable for u8 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u8()?)
    }
}
impl Writable for u8 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_u8(*self)?)
    }
}

impl Readable for u32 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u32::<LE>()?)
    }
}
impl Writable for u32 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_u32::<LE>(*self)?)
    }
}

impl Readable for i32 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_i32::<LE>()?)
    }
}
impl Writable for i32 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_i32::<LE>(*self)?)
    }
}

impl Readable for u64 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u64::<LE>()?)
    }
}
impl Writable for u64 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_u64::<LE>(*self)?)
    }
}

impl Readable for i64 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_i64::<LE>()?)
    }
}
impl Writable for i64 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_i64::<LE>(*self)?)
    }
}

impl Readable for u16 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u16::<LE>()?)
    }
}
impl Writable for u16 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_u16::<LE>(*self)?)
    }
}

/// A 4-byte boolean: any nonzero value reads as `true`; always writes `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bool32(pub bool);

impl Readable for Bool32 {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Bool32(reader.read_u32::<LE>()? != 0))
    }
}
impl Writable for Bool32 {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_u32::<LE>(self.0 as u32)?)
    }
}

/// Four `u32`s, in the order the engine's `FGuid` serializes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Guid(pub [u32; 4]);

impl Readable for Guid {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut parts = [0u32; 4];
        for p in &mut parts {
            *p = reader.read_u32::<LE>()?;
        }
        Ok(Guid(parts))
    }
}
impl Writable for Guid {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        for p in self.0 {
            writer.write_u32::<LE>(p)?;
        }
        Ok(())
    }
}

const MAX_STRING_CHARS: usize = 1023;

/// Reads a length-prefixed string: a signed `i32` character count whose sign
/// is the wide-flag (negative means UTF-16), followed by that many
/// characters plus a trailing NUL, with no byte-order-mark.
pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let raw_len = reader.read_i32::<LE>()?;
    if raw_len == 0 {
        return Ok(String::new());
    }
    let wide = raw_len < 0;
    let chars = raw_len.unsigned_abs() as usize;
    if chars > MAX_STRING_CHARS {
        return Err(Error::string_too_long(chars, MAX_STRING_CHARS));
    }
    if wide {
        let mut units = vec![0u16; chars];
        reader.read_u16_into::<LE>(&mut units)?;
        // drop the trailing NUL unit
        let units = &units[..units.len().saturating_sub(1)];
        Ok(String::from_utf16_lossy(units))
    } else {
        let mut bytes = vec![0u8; chars];
        reader.read_exact(&mut bytes)?;
        // drop the trailing NUL byte
        bytes.pop();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Writes a length-prefixed string. Narrow strings are encoded as-is plus a
/// NUL; wide strings are encoded as UTF-16 plus a NUL code unit, with the
/// character count negated to signal the wide flag. Any leading BOM is
/// stripped before encoding.
pub fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let s = s.strip_prefix('\u{feff}').unwrap_or(s);
    if s.is_empty() {
        writer.write_i32::<LE>(0)?;
        return Ok(());
    }
    if s.is_ascii() {
        writer.write_i32::<LE>((s.len() + 1) as i32)?;
        writer.write_all(s.as_bytes())?;
        writer.write_u8(0)?;
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        writer.write_i32::<LE>(-((units.len() + 1) as i32))?;
        for u in &units {
            writer.write_u16::<LE>(*u)?;
        }
        writer.write_u16::<LE>(0)?;
    }
    Ok(())
}

/// Reads an `i32`-prefixed array of `T`.
pub fn read_array<R: Read, T: Readable>(reader: &mut R) -> Result<Vec<T>> {
    let count = reader.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::negative_count("array count", count as i64));
    }
    (0..count).map(|_| T::read(reader)).collect()
}

/// Writes an `i32`-prefixed array of `T`.
pub fn write_array<W: Write, T: Writable>(writer: &mut W, items: &[T]) -> Result<()> {
    writer.write_i32::<LE>(items.len() as i32)?;
    for item in items {
        item.write(writer)?;
    }
    Ok(())
}

/// The 3-bit type tag plus 29-bit table index packed into a `u32` value id.
pub const VALUE_ID_TYPE_BITS: u32 = 3;
pub const VALUE_ID_INDEX_BITS: u32 = 29;

pub fn pack_value_id(value_type: u8, index: u32) -> u32 {
    debug_assert!(value_type < (1 << VALUE_ID_TYPE_BITS));
    debug_assert!(index < (1 << VALUE_ID_INDEX_BITS));
    (value_type as u32) | (index << VALUE_ID_TYPE_BITS)
}

pub fn unpack_value_id(packed: u32) -> (u8, u32) {
    let value_type = (packed & ((1 << VALUE_ID_TYPE_BITS) - 1)) as u8;
    let index = packed >> VALUE_ID_TYPE_BITS;
    (value_type, index)
}

/// `{ has_numberless_keys: bit 63, count: bits 32-47, begin: bits 0-31 }`.
pub fn pack_tag_map_handle(has_numberless_keys: bool, count: u16, begin: u32) -> u64 {
    let mut packed = begin as u64;
    packed |= (count as u64) << 32;
    if has_numberless_keys {
        packed |= 1u64 << 63;
    }
    packed
}

pub fn unpack_tag_map_handle(packed: u64) -> (bool, u16, u32) {
    let has_numberless_keys = packed & (1u64 << 63) != 0;
    let count = ((packed >> 32) & 0xFFFF) as u16;
    let begin = (packed & 0xFFFF_FFFF) as u32;
    (has_numberless_keys, count, begin)
}

/// Number of bytes occupied by a dependency flag blob: `bits_per_flag * count`
/// bits, rounded up to whole 32-bit words, reported in bytes.
///
/// Centralized per the word-aligned interpretation pinned down for the
/// ambiguous source formula: words are computed first, then multiplied by 4.
pub fn flag_blob_byte_len(bits_per_flag: u32, count: usize) -> usize {
    if bits_per_flag == 0 {
        return 0;
    }
    let total_bits = bits_per_flag as u64 * count as u64;
    let words = total_bits.div_ceil(32);
    (words * 4) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_id_round_trips() {
        for (t, i) in [(0u8, 0u32), (6, (1 << VALUE_ID_INDEX_BITS) - 1), (3, 12345)] {
            let packed = pack_value_id(t, i);
            assert_eq!(unpack_value_id(packed), (t, i));
        }
    }

    #[test]
    fn tag_map_handle_round_trips() {
        for (flag, count, begin) in [(false, 0u16, 0u32), (true, 0xFFFF, 0xFFFF_FFFF), (true, 7, 99)]
        {
            let packed = pack_tag_map_handle(flag, count, begin);
            assert_eq!(unpack_tag_map_handle(packed), (flag, count, begin));
        }
    }

    #[test]
    fn flag_blob_sizing_rounds_up_to_whole_words() {
        assert_eq!(flag_blob_byte_len(5, 0), 0);
        assert_eq!(flag_blob_byte_len(5, 1), 4); // 5 bits -> 1 word -> 4 bytes
        assert_eq!(flag_blob_byte_len(5, 7), 8); // 35 bits -> 2 words -> 8 bytes
        assert_eq!(flag_blob_byte_len(1, 32), 4);
        assert_eq!(flag_blob_byte_len(1, 33), 8);
    }

    #[test]
    fn string_round_trips_ascii_and_wide() {
        for s in ["", "Foo", "héllo"] {
            let mut buf = Vec::new();
            write_string(&mut buf, s).unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let read_back = read_string(&mut cursor).unwrap();
            assert_eq!(read_back, s);
        }
    }
}
