//! The tag value store: seven typed, deduplicated value tables plus two pair
//! arrays mapping tag keys to typed value references.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};
use crate::identifiers::ArchiveType;
use crate::name_pool::Name;
use crate::primitives::{pack_tag_map_handle, pack_value_id, unpack_tag_map_handle, unpack_value_id};

pub const START_MARKER_TEXT_FIRST: u32 = 0x1234_5679;
pub const START_MARKER_TEXT_LAST: u32 = 0x1234_5678;
pub const END_MARKER: u32 = 0x8765_4321;

/// Tag for one of the seven typed value tables. Packed into the low 3 bits
/// of a [`ValueId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ValueType {
    AnsiString = 0,
    WideString = 1,
    NumberlessName = 2,
    Name = 3,
    NumberlessExportPath = 4,
    ExportPath = 5,
    LocalizedText = 6,
}

/// A packed `(type, index)` reference into one of the seven value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueId {
    pub value_type: ValueType,
    pub index: u32,
}

impl ValueId {
    pub fn pack(self) -> u32 {
        pack_value_id(self.value_type.into(), self.index)
    }

    pub fn unpack(packed: u32) -> Result<Self> {
        let (raw_type, index) = unpack_value_id(packed);
        let value_type = ValueType::try_from_primitive(raw_type)
            .map_err(|_| Error::value_id_out_of_range("unknown value type", raw_type as u32, 7))?;
        Ok(ValueId { value_type, index })
    }
}

/// A packed reference into `begin..begin+count` of one of the two pair
/// arrays, selected by `has_numberless_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagMapHandle {
    pub has_numberless_keys: bool,
    pub count: u16,
    pub begin: u32,
}

impl TagMapHandle {
    pub fn pack(self) -> u64 {
        pack_tag_map_handle(self.has_numberless_keys, self.count, self.begin)
    }

    pub fn unpack(packed: u64) -> Self {
        let (has_numberless_keys, count, begin) = unpack_tag_map_handle(packed);
        TagMapHandle {
            has_numberless_keys,
            count,
            begin,
        }
    }

    pub fn range(self) -> std::ops::Range<usize> {
        self.begin as usize..(self.begin as usize + self.count as usize)
    }
}

/// A numberless name: just a pool index, no numeric suffix.
pub type NumberlessName = u32;

/// `{ class_path: (package, asset), package_name, object_name }` in the
/// same numberless representation, same wire field order as [`ExportPath`]
/// in `crate::identifiers` (class_path, object_name, package_name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberlessExportPath {
    pub class_path_package: NumberlessName,
    pub class_path_asset: NumberlessName,
    pub package_name: NumberlessName,
    pub object_name: NumberlessName,
}

/// `{ class_path: TopLevelAssetPath, package_name: Name, object_name: Name }`,
/// each component using the same flagged, variable-width `Name` dialect as
/// everywhere else in the format ([`ArchiveType::AssetRegistry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportPath {
    pub class_path_package: Name,
    pub class_path_asset: Name,
    pub package_name: Name,
    pub object_name: Name,
}

fn read_export_path<R: Read>(reader: &mut R) -> Result<ExportPath> {
    let class_path_package = ArchiveType::AssetRegistry.read_name(reader)?;
    let class_path_asset = ArchiveType::AssetRegistry.read_name(reader)?;
    let object_name = ArchiveType::AssetRegistry.read_name(reader)?;
    let package_name = ArchiveType::AssetRegistry.read_name(reader)?;
    Ok(ExportPath {
        class_path_package,
        class_path_asset,
        package_name,
        object_name,
    })
}

fn write_export_path<W: Write>(writer: &mut W, path: &ExportPath) -> Result<()> {
    ArchiveType::AssetRegistry.write_name(writer, path.class_path_package)?;
    ArchiveType::AssetRegistry.write_name(writer, path.class_path_asset)?;
    ArchiveType::AssetRegistry.write_name(writer, path.object_name)?;
    ArchiveType::AssetRegistry.write_name(writer, path.package_name)?;
    Ok(())
}

fn read_numberless_export_path<R: Read>(reader: &mut R) -> Result<NumberlessExportPath> {
    let class_path_package = reader.read_u32::<LE>()?;
    let class_path_asset = reader.read_u32::<LE>()?;
    let object_name = reader.read_u32::<LE>()?;
    let package_name = reader.read_u32::<LE>()?;
    Ok(NumberlessExportPath {
        class_path_package,
        class_path_asset,
        package_name,
        object_name,
    })
}

fn write_numberless_export_path<W: Write>(writer: &mut W, path: &NumberlessExportPath) -> Result<()> {
    writer.write_u32::<LE>(path.class_path_package)?;
    writer.write_u32::<LE>(path.class_path_asset)?;
    writer.write_u32::<LE>(path.object_name)?;
    writer.write_u32::<LE>(path.package_name)?;
    Ok(())
}

/// A tagged union over the seven typed values, used internally to look up
/// and insert regardless of which table a [`ValueId`] points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    AnsiString(String),
    WideString(String),
    NumberlessName(NumberlessName),
    Name(Name),
    NumberlessExportPath(NumberlessExportPath),
    ExportPath(ExportPath),
    LocalizedText(String),
}

/// An append-only, order-preserving table with dedup keyed by a 64-bit hash
/// of a caller-supplied canonical key. One collision-tolerant bucket per
/// hash: in the vanishingly unlikely event two distinct canonical keys hash
/// identically, the first inserted value wins the slot and is returned for
/// both, matching "insert returns the existing id when the hash matches."
#[derive(Debug, Clone, Default)]
struct DedupTable<T> {
    items: Vec<T>,
    by_hash: HashMap<u64, u32>,
}

impl<T: Clone> DedupTable<T> {
    fn insert(&mut self, canonical_key: &[u8], value: T) -> u32 {
        let hash = cityhasher::hash(canonical_key);
        if let Some(&index) = self.by_hash.get(&hash) {
            return index;
        }
        let index = self.items.len() as u32;
        self.by_hash.insert(hash, index);
        self.items.push(value);
        index
    }

    fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

fn name_key(name: Name) -> String {
    format!("{}-{}", name.index, name.number)
}

fn export_path_key(p: &ExportPath) -> String {
    format!(
        "{}-{}-{}-{}",
        name_key(p.class_path_package),
        name_key(p.class_path_asset),
        name_key(p.package_name),
        name_key(p.object_name)
    )
}

fn numberless_name_key(n: NumberlessName) -> String {
    format!("{n}-0")
}

fn numberless_export_path_key(p: &NumberlessExportPath) -> String {
    format!(
        "{}-{}-{}-{}",
        numberless_name_key(p.class_path_package),
        numberless_name_key(p.class_path_asset),
        numberless_name_key(p.package_name),
        numberless_name_key(p.object_name)
    )
}

/// The full typed, deduplicated value pool plus the two pair arrays that
/// reference it.
#[derive(Debug, Clone, Default)]
pub struct Store {
    ansi_strings: DedupTable<String>,
    wide_strings: DedupTable<String>,
    numberless_names: DedupTable<NumberlessName>,
    names: DedupTable<Name>,
    numberless_export_paths: DedupTable<NumberlessExportPath>,
    export_paths: DedupTable<ExportPath>,
    texts: DedupTable<String>,

    pub numbered_pairs: Vec<(Name, ValueId)>,
    pub numberless_pairs: Vec<(Name, ValueId)>,

    /// Whether the localized-text table appeared before (new format) or
    /// after (old format) the name/export tables, as observed on read.
    pub text_first: bool,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ansi_string(&mut self, s: impl Into<String>) -> ValueId {
        let s = s.into();
        let index = self.ansi_strings.insert(s.as_bytes(), s);
        ValueId {
            value_type: ValueType::AnsiString,
            index,
        }
    }

    pub fn insert_wide_string(&mut self, s: impl Into<String>) -> ValueId {
        let s = s.into();
        let index = self.wide_strings.insert(s.as_bytes(), s);
        ValueId {
            value_type: ValueType::WideString,
            index,
        }
    }

    pub fn insert_text(&mut self, s: impl Into<String>) -> ValueId {
        let s = s.into();
        let index = self.texts.insert(s.as_bytes(), s);
        ValueId {
            value_type: ValueType::LocalizedText,
            index,
        }
    }

    pub fn insert_name(&mut self, name: Name) -> ValueId {
        let index = self.names.insert(name_key(name).as_bytes(), name);
        ValueId {
            value_type: ValueType::Name,
            index,
        }
    }

    pub fn insert_numberless_name(&mut self, name: NumberlessName) -> ValueId {
        let index = self
            .numberless_names
            .insert(numberless_name_key(name).as_bytes(), name);
        ValueId {
            value_type: ValueType::NumberlessName,
            index,
        }
    }

    pub fn insert_export_path(&mut self, path: ExportPath) -> ValueId {
        let index = self.export_paths.insert(export_path_key(&path).as_bytes(), path);
        ValueId {
            value_type: ValueType::ExportPath,
            index,
        }
    }

    pub fn insert_numberless_export_path(&mut self, path: NumberlessExportPath) -> ValueId {
        let index = self
            .numberless_export_paths
            .insert(numberless_export_path_key(&path).as_bytes(), path);
        ValueId {
            value_type: ValueType::NumberlessExportPath,
            index,
        }
    }

    pub fn resolve(&self, id: ValueId) -> Result<Value> {
        let len_for = |t: ValueType| match t {
            ValueType::AnsiString => self.ansi_strings.len(),
            ValueType::WideString => self.wide_strings.len(),
            ValueType::NumberlessName => self.numberless_names.len(),
            ValueType::Name => self.names.len(),
            ValueType::NumberlessExportPath => self.numberless_export_paths.len(),
            ValueType::ExportPath => self.export_paths.len(),
            ValueType::LocalizedText => self.texts.len(),
        };
        macro_rules! get_or_err {
            ($table:expr, $variant:ident) => {
                $table
                    .get(id.index)
                    .cloned()
                    .map(Value::$variant)
                    .ok_or_else(|| {
                        Error::value_id_out_of_range(stringify!($variant), id.index, len_for(id.value_type))
                    })
            };
        }
        match id.value_type {
            ValueType::AnsiString => get_or_err!(self.ansi_strings, AnsiString),
            ValueType::WideString => get_or_err!(self.wide_strings, WideString),
            ValueType::NumberlessName => get_or_err!(self.numberless_names, NumberlessName),
            ValueType::Name => get_or_err!(self.names, Name),
            ValueType::NumberlessExportPath => get_or_err!(self.numberless_export_paths, NumberlessExportPath),
            ValueType::ExportPath => get_or_err!(self.export_paths, ExportPath),
            ValueType::LocalizedText => get_or_err!(self.texts, LocalizedText),
        }
    }

    /// Appends `pairs` to the selected pair array and returns a handle
    /// covering the appended range.
    pub fn register_pairs(&mut self, pairs: Vec<(Name, ValueId)>, has_numberless_keys: bool) -> TagMapHandle {
        let array = if has_numberless_keys {
            &mut self.numberless_pairs
        } else {
            &mut self.numbered_pairs
        };
        let begin = array.len() as u32;
        let count = pairs.len() as u16;
        array.extend(pairs);
        TagMapHandle {
            has_numberless_keys,
            count,
            begin,
        }
    }

    pub fn pairs_for(&self, handle: TagMapHandle) -> Result<&[(Name, ValueId)]> {
        let array = if handle.has_numberless_keys {
            &self.numberless_pairs
        } else {
            &self.numbered_pairs
        };
        array.get(handle.range()).ok_or_else(|| {
            Error::tag_map_handle_out_of_range(handle.begin, handle.count, array.len())
        })
    }
}

pub fn read_store<R: Read>(reader: &mut R) -> Result<Store> {
    let start_marker = reader.read_u32::<LE>()?;
    let text_first = match start_marker {
        START_MARKER_TEXT_FIRST => true,
        START_MARKER_TEXT_LAST => false,
        other => return Err(Error::invalid_start_marker(other)),
    };

    let n_numberless_names = reader.read_u32::<LE>()?;
    let n_names = reader.read_u32::<LE>()?;
    let n_numberless_export_paths = reader.read_u32::<LE>()?;
    let n_export_paths = reader.read_u32::<LE>()?;
    let n_texts = reader.read_u32::<LE>()?;
    let _n_ansi_offsets = reader.read_u32::<LE>()?;
    let _n_wide_offsets = reader.read_u32::<LE>()?;
    let n_ansi_bytes = reader.read_u32::<LE>()?;
    let n_wide_chars = reader.read_u32::<LE>()?;
    let n_numberless_pairs = reader.read_u32::<LE>()?;
    let n_pairs = reader.read_u32::<LE>()?;

    let mut store = Store::new();
    store.text_first = text_first;

    let read_texts = |reader: &mut R| -> Result<Vec<String>> {
        let section_len = reader.read_u32::<LE>()? as u64;
        let mut taken = (&mut *reader).take(section_len);
        let mut texts = Vec::with_capacity(n_texts as usize);
        let mut consumed = 0u64;
        for _ in 0..n_texts {
            let before = section_len - taken.limit();
            texts.push(crate::primitives::read_string(&mut taken)?);
            let after = section_len - taken.limit();
            consumed += after - before;
        }
        if consumed != section_len {
            return Err(Error::size_mismatch("tag store text section", section_len, consumed));
        }
        Ok(texts)
    };

    let mut texts = Vec::new();
    if text_first {
        texts = read_texts(reader)?;
    }

    for _ in 0..n_numberless_names {
        store.numberless_names.items.push(reader.read_u32::<LE>()?);
    }
    for _ in 0..n_names {
        store.names.items.push(ArchiveType::AssetRegistry.read_name(reader)?);
    }
    for _ in 0..n_numberless_export_paths {
        store
            .numberless_export_paths
            .items
            .push(read_numberless_export_path(reader)?);
    }
    for _ in 0..n_export_paths {
        store.export_paths.items.push(read_export_path(reader)?);
    }

    if !text_first {
        texts = read_texts(reader)?;
    }
    store.texts.items = texts;

    // offsets are recomputed on write; read and discard here.
    for _ in 0.._n_ansi_offsets {
        reader.read_u32::<LE>()?;
    }
    for _ in 0.._n_wide_offsets {
        reader.read_u32::<LE>()?;
    }

    let mut ansi_bytes = vec![0u8; n_ansi_bytes as usize];
    reader.read_exact(&mut ansi_bytes)?;
    for part in ansi_bytes.split(|b| *b == 0) {
        if !part.is_empty() {
            store.ansi_strings.items.push(String::from_utf8_lossy(part).into_owned());
        }
    }

    let mut wide_units = vec![0u16; n_wide_chars as usize];
    reader.read_u16_into::<LE>(&mut wide_units)?;
    let mut current = Vec::new();
    let mut wide_strings = Vec::new();
    for unit in wide_units {
        if unit == 0 {
            if !current.is_empty() {
                wide_strings.push(String::from_utf16_lossy(&current));
                current.clear();
            }
        } else {
            current.push(unit);
        }
    }
    store.wide_strings.items = wide_strings;

    for _ in 0..n_numberless_pairs {
        let name = ArchiveType::AssetRegistry.read_name(reader)?;
        let value_id = ValueId::unpack(reader.read_u32::<LE>()?)?;
        store.numberless_pairs.push((name, value_id));
    }
    for _ in 0..n_pairs {
        let name = ArchiveType::AssetRegistry.read_name(reader)?;
        let value_id = ValueId::unpack(reader.read_u32::<LE>()?)?;
        store.numbered_pairs.push((name, value_id));
    }

    let end_marker = reader.read_u32::<LE>()?;
    if end_marker != END_MARKER {
        return Err(Error::invalid_end_marker(end_marker));
    }

    Ok(store)
}

pub fn write_store<W: Write + Seek>(writer: &mut W, store: &Store) -> Result<()> {
    writer.write_u32::<LE>(if store.text_first {
        START_MARKER_TEXT_FIRST
    } else {
        START_MARKER_TEXT_LAST
    })?;

    writer.write_u32::<LE>(store.numberless_names.len() as u32)?;
    writer.write_u32::<LE>(store.names.len() as u32)?;
    writer.write_u32::<LE>(store.numberless_export_paths.len() as u32)?;
    writer.write_u32::<LE>(store.export_paths.len() as u32)?;
    writer.write_u32::<LE>(store.texts.len() as u32)?;

    let ansi_count = store.ansi_strings.len() as u32;
    let wide_count = store.wide_strings.len() as u32;
    writer.write_u32::<LE>(ansi_count)?;
    writer.write_u32::<LE>(wide_count)?;

    let ansi_byte_count: u32 = store.ansi_strings.iter().map(|s| s.len() as u32 + 1).sum();
    let wide_char_count: u32 = store
        .wide_strings
        .iter()
        .map(|s| s.encode_utf16().count() as u32 + 1)
        .sum();
    writer.write_u32::<LE>(ansi_byte_count)?;
    writer.write_u32::<LE>(wide_char_count)?;

    writer.write_u32::<LE>(store.numberless_pairs.len() as u32)?;
    writer.write_u32::<LE>(store.numbered_pairs.len() as u32)?;

    let write_texts = |writer: &mut W| -> Result<()> {
        let len_pos = writer.stream_position()?;
        writer.write_u32::<LE>(0)?;
        let start = writer.stream_position()?;
        for text in store.texts.iter() {
            crate::primitives::write_string(writer, text)?;
        }
        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(len_pos))?;
        writer.write_u32::<LE>((end - start) as u32)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    };

    if store.text_first {
        write_texts(writer)?;
    }

    for name in store.numberless_names.iter() {
        writer.write_u32::<LE>(*name)?;
    }
    for name in store.names.iter() {
        ArchiveType::AssetRegistry.write_name(writer, *name)?;
    }
    for path in store.numberless_export_paths.iter() {
        write_numberless_export_path(writer, path)?;
    }
    for path in store.export_paths.iter() {
        write_export_path(writer, path)?;
    }

    if !store.text_first {
        write_texts(writer)?;
    }

    // offsets are recomputed from current string lengths, not cached.
    let mut ansi_offset = 0u32;
    for s in store.ansi_strings.iter() {
        writer.write_u32::<LE>(ansi_offset)?;
        ansi_offset += s.len() as u32 + 1;
    }
    let mut wide_offset = 0u32;
    for s in store.wide_strings.iter() {
        writer.write_u32::<LE>(wide_offset)?;
        wide_offset += s.encode_utf16().count() as u32 + 1;
    }

    for s in store.ansi_strings.iter() {
        writer.write_all(s.as_bytes())?;
        writer.write_u8(0)?;
    }

    for s in store.wide_strings.iter() {
        for unit in s.encode_utf16() {
            writer.write_u16::<LE>(unit)?;
        }
        writer.write_u16::<LE>(0)?;
    }

    for (name, value_id) in &store.numberless_pairs {
        ArchiveType::AssetRegistry.write_name(writer, *name)?;
        writer.write_u32::<LE>(value_id.pack())?;
    }
    for (name, value_id) in &store.numbered_pairs {
        ArchiveType::AssetRegistry.write_name(writer, *name)?;
        writer.write_u32::<LE>(value_id.pack())?;
    }

    writer.write_u32::<LE>(END_MARKER)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn invalid_start_marker_is_rejected() {
        let bytes = 0u32.to_le_bytes();
        let mut cursor = Cursor::new(bytes.to_vec());
        let err = read_store(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn empty_store_round_trips() {
        let store = Store::new();
        let mut buf = Cursor::new(Vec::new());
        write_store(&mut buf, &store).unwrap();
        buf.set_position(0);
        let read_back = read_store(&mut buf).unwrap();
        assert_eq!(read_back.numbered_pairs.len(), 0);
        assert_eq!(read_back.numberless_pairs.len(), 0);
    }

    #[test]
    fn duplicate_ansi_string_inserts_dedup_to_same_id() {
        let mut store = Store::new();
        let a = store.insert_ansi_string("hello");
        let b = store.insert_ansi_string("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn store_round_trips_with_values_and_pairs() {
        let mut store = Store::new();
        store.text_first = true;
        let value = store.insert_ansi_string("hello");
        let name = Name::new(0, 0);
        store.register_pairs(vec![(name, value)], false);

        let mut buf = Cursor::new(Vec::new());
        write_store(&mut buf, &store).unwrap();
        buf.set_position(0);
        let read_back = read_store(&mut buf).unwrap();

        assert_eq!(read_back.numbered_pairs.len(), 1);
        let (read_name, read_value) = read_back.numbered_pairs[0];
        assert_eq!(read_name, name);
        match read_back.resolve(read_value).unwrap() {
            Value::AnsiString(s) => assert_eq!(s, "hello"),
            other => panic!("unexpected value {other:?}"),
        }
    }
}
