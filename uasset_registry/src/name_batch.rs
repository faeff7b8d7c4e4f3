//! On-disk layout of the name pool: the "name batch".
//!
//! `num_strings: u32, num_string_bytes: u32, hash_version: u64,
//! hashes[num_strings]: u64, headers[num_strings]: u16,
//! payload[num_string_bytes]: bytes`.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE, LE};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::name_pool::{hash_display, NamePool};

/// The only hash-version value this codec writes. A mismatch on read is
/// advisory (the stored hashes are discarded either way).
pub const HASH_VERSION: u64 = 0xC164_0000;

const MAX_CHARS: u16 = 1024;
const WIDE_FLAG_BIT: u16 = 1 << 15;
const CHAR_COUNT_MASK: u16 = WIDE_FLAG_BIT - 1;

// Unlike the rest of the format, each per-name header is big-endian: the
// wide flag lives in the high bit of the first byte on the wire.

pub fn read_name_batch<R: Read>(reader: &mut R) -> Result<NamePool> {
    let num_strings = reader.read_u32::<LE>()?;
    let num_string_bytes = reader.read_u32::<LE>()?;
    let hash_version = reader.read_u64::<LE>()?;
    if hash_version != HASH_VERSION {
        warn!(
            "name batch hash_version {hash_version:#x} does not match expected {HASH_VERSION:#x}; continuing anyway"
        );
    }

    // Stored hashes are advisory; recomputed on every intern, never trusted.
    for _ in 0..num_strings {
        let _hash = reader.read_u64::<LE>()?;
    }

    let mut headers = Vec::with_capacity(num_strings as usize);
    for _ in 0..num_strings {
        headers.push(reader.read_u16::<BE>()?);
    }

    let mut payload = vec![0u8; num_string_bytes as usize];
    reader.read_exact(&mut payload)?;

    let mut pool = NamePool::new();
    let mut offset = 0usize;
    for header in headers {
        let wide = header & WIDE_FLAG_BIT != 0;
        let chars = (header & CHAR_COUNT_MASK) as usize;
        let byte_len = chars * if wide { 2 } else { 1 };
        let slice = payload
            .get(offset..offset + byte_len)
            .ok_or_else(|| Error::size_mismatch("name batch payload", num_string_bytes as u64, offset as u64))?;
        offset += byte_len;
        let text = if wide {
            let units: Vec<u16> = slice
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::from_utf8_lossy(slice).into_owned()
        };
        pool.intern_base(&text);
    }

    if offset as u32 != num_string_bytes {
        return Err(Error::size_mismatch(
            "name batch payload",
            num_string_bytes as u64,
            offset as u64,
        ));
    }

    debug!("read name batch: {num_strings} strings, {num_string_bytes} bytes");
    Ok(pool)
}

pub fn write_name_batch<W: Write + Seek>(writer: &mut W, pool: &NamePool) -> Result<()> {
    writer.write_u32::<LE>(pool.len() as u32)?;
    let byte_count_pos = writer.stream_position()?;
    writer.write_u32::<LE>(0)?; // back-patched below
    writer.write_u64::<LE>(HASH_VERSION)?;

    let entries: Vec<&str> = pool.entries().collect();

    for entry in &entries {
        writer.write_u64::<LE>(hash_display(entry))?;
    }

    let mut headers = Vec::with_capacity(entries.len());
    for entry in &entries {
        let wide = !entry.is_ascii();
        let chars = if wide {
            entry.encode_utf16().count()
        } else {
            entry.len()
        };
        if chars >= MAX_CHARS as usize {
            return Err(Error::string_too_long(chars, MAX_CHARS as usize - 1));
        }
        let mut header = chars as u16;
        if wide {
            header |= WIDE_FLAG_BIT;
        }
        headers.push(header);
    }
    for header in &headers {
        writer.write_u16::<BE>(*header)?;
    }

    let payload_start = writer.stream_position()?;
    for entry in &entries {
        if entry.is_ascii() {
            writer.write_all(entry.as_bytes())?;
        } else {
            for unit in entry.encode_utf16() {
                writer.write_u16::<LE>(unit)?;
            }
        }
    }
    let payload_end = writer.stream_position()?;

    let end_pos = writer.stream_position()?;
    writer.seek(SeekFrom::Start(byte_count_pos))?;
    writer.write_u32::<LE>((payload_end - payload_start) as u32)?;
    writer.seek(SeekFrom::Start(end_pos))?;

    debug!("wrote name batch: {} strings", entries.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_empty_pool() {
        let pool = NamePool::new();
        let mut buf = Cursor::new(Vec::new());
        write_name_batch(&mut buf, &pool).unwrap();
        buf.set_position(0);
        let read_back = read_name_batch(&mut buf).unwrap();
        assert!(read_back.is_empty());
    }

    #[test]
    fn single_ascii_name_matches_literal_wire_layout() {
        let mut pool = NamePool::new();
        pool.intern("Foo");

        let mut buf = Cursor::new(Vec::new());
        write_name_batch(&mut buf, &pool).unwrap();
        let bytes = buf.into_inner();

        assert_eq!(&bytes[0..4], &1u32.to_le_bytes()); // num_strings
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes()); // num_string_bytes
        assert_eq!(&bytes[8..16], &HASH_VERSION.to_le_bytes());
        assert_eq!(&bytes[16..24], &hash_display("foo").to_le_bytes());
        assert_eq!(&bytes[24..26], &0x0003u16.to_be_bytes());
        assert_eq!(&bytes[26..29], b"Foo");
    }

    #[test]
    fn round_trips_mixed_ascii_and_wide_names() {
        let mut pool = NamePool::new();
        pool.intern_base("Alpha");
        pool.intern_base("héllo");
        pool.intern_base("Bar"); // the name batch stores bases only; suffix splitting is the name pool's job

        let mut buf = Cursor::new(Vec::new());
        write_name_batch(&mut buf, &pool).unwrap();
        buf.set_position(0);
        let read_back = read_name_batch(&mut buf).unwrap();
        let entries: Vec<&str> = read_back.entries().collect();
        assert_eq!(entries, vec!["Alpha", "héllo", "Bar"]);
    }
}
