//! Name-dependent composite identifiers and the two wire dialects used to
//! read/write a bare [`Name`].
//!
//! Two `Name` wire dialects exist, selected by a per-decode archive-type
//! flag. Rather than branching at every call site, [`ArchiveType`] is a
//! closed, two-variant dispatch point; every composite shape below calls
//! through it, so it (and only it) knows which dialect is in play.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use log::error;

use crate::error::{Error, Result};
use crate::name_pool::{Name, StoredIdentifier};
use crate::primitives::{read_string, write_string};

const HAS_NUMBER_BIT: u32 = 1 << 31;
const INDEX_MASK: u32 = !HAS_NUMBER_BIT;

/// Selects which `Name` wire dialect a decoder/encoder uses.
///
/// All composite shapes that embed a `Name` inherit their dialect from the
/// enclosing decoder by being handed the same `ArchiveType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// `Name` is a `u32` index with an optional `u32` number, the presence
    /// of the latter signalled by the index's high bit.
    AssetRegistry,
    /// Legacy dialect: a pair of hashes plus an inline fixed-size string
    /// buffer recorded into a file-scoped name table. Not reachable past
    /// `FixedTags`; this implementation does not support it.
    TableArchive,
}

impl ArchiveType {
    pub fn read_name<R: Read>(self, reader: &mut R) -> Result<Name> {
        match self {
            ArchiveType::AssetRegistry => {
                let raw_index = reader.read_u32::<LE>()?;
                let has_number = raw_index & HAS_NUMBER_BIT != 0;
                let index = raw_index & INDEX_MASK;
                let number = if has_number {
                    reader.read_u32::<LE>()?
                } else {
                    0
                };
                Ok(Name::new(index, number))
            }
            ArchiveType::TableArchive => {
                error!("attempted to read a Name in the unsupported table-archive dialect");
                Err(Error::not_implemented(
                    "table-archive Name dialect (version < FixedTags)",
                ))
            }
        }
    }

    pub fn write_name<W: Write>(self, writer: &mut W, name: Name) -> Result<()> {
        match self {
            ArchiveType::AssetRegistry => {
                let mut raw_index = name.index & INDEX_MASK;
                if name.number != 0 {
                    raw_index |= HAS_NUMBER_BIT;
                }
                writer.write_u32::<LE>(raw_index)?;
                if name.number != 0 {
                    writer.write_u32::<LE>(name.number)?;
                }
                Ok(())
            }
            ArchiveType::TableArchive => {
                error!("attempted to write a Name in the unsupported table-archive dialect");
                Err(Error::not_implemented(
                    "table-archive Name dialect (version < FixedTags)",
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TopLevelAssetPath {
    pub package: Name,
    pub asset: Name,
}

impl TopLevelAssetPath {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType) -> Result<Self> {
        let package = archive.read_name(reader)?;
        let asset = archive.read_name(reader)?;
        Ok(TopLevelAssetPath { package, asset })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType) -> Result<()> {
        archive.write_name(writer, self.package)?;
        archive.write_name(writer, self.asset)?;
        Ok(())
    }
}

/// `class_path.package_name'object_name'` in logical field order. On the
/// wire, fields are read/written in the order `class_path, object_name,
/// package_name` — object before package — which this type's read/write
/// methods preserve even though the struct exposes the fields in the order
/// documented above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExportPath {
    pub class_path: TopLevelAssetPath,
    pub package_name: Name,
    pub object_name: Name,
}

impl ExportPath {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType) -> Result<Self> {
        let class_path = TopLevelAssetPath::read(reader, archive)?;
        let object_name = archive.read_name(reader)?;
        let package_name = archive.read_name(reader)?;
        Ok(ExportPath {
            class_path,
            package_name,
            object_name,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType) -> Result<()> {
        self.class_path.write(writer, archive)?;
        archive.write_name(writer, self.object_name)?;
        archive.write_name(writer, self.package_name)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoftObjectPath {
    pub asset_path: TopLevelAssetPath,
    pub sub_path: StoredIdentifier,
}

impl SoftObjectPath {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType) -> Result<Self> {
        let asset_path = TopLevelAssetPath::read(reader, archive)?;
        let payload = read_string(reader)?;
        let is_wide = !payload.is_ascii();
        Ok(SoftObjectPath {
            asset_path,
            sub_path: StoredIdentifier { payload, is_wide },
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType) -> Result<()> {
        self.asset_path.write(writer, archive)?;
        write_string(writer, &self.sub_path.payload)?;
        Ok(())
    }
}

const ASSET_IDENTIFIER_HAS_PACKAGE: u8 = 1 << 0;
const ASSET_IDENTIFIER_HAS_TYPE: u8 = 1 << 1;
const ASSET_IDENTIFIER_HAS_OBJECT: u8 = 1 << 2;
const ASSET_IDENTIFIER_HAS_VALUE: u8 = 1 << 3;

/// Identifies an asset, a class, an object within an asset, or a named
/// value, depending on which of `flags`'s four bits are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetIdentifier {
    pub package: Option<Name>,
    pub r#type: Option<Name>,
    pub object: Option<Name>,
    pub value: Option<Name>,
}

impl AssetIdentifier {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType) -> Result<Self> {
        let flags = reader.read_u8()?;
        let package = read_if(reader, archive, flags & ASSET_IDENTIFIER_HAS_PACKAGE != 0)?;
        let r#type = read_if(reader, archive, flags & ASSET_IDENTIFIER_HAS_TYPE != 0)?;
        let object = read_if(reader, archive, flags & ASSET_IDENTIFIER_HAS_OBJECT != 0)?;
        let value = read_if(reader, archive, flags & ASSET_IDENTIFIER_HAS_VALUE != 0)?;
        Ok(AssetIdentifier {
            package,
            r#type,
            object,
            value,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType) -> Result<()> {
        let mut flags = 0u8;
        if self.package.is_some() {
            flags |= ASSET_IDENTIFIER_HAS_PACKAGE;
        }
        if self.r#type.is_some() {
            flags |= ASSET_IDENTIFIER_HAS_TYPE;
        }
        if self.object.is_some() {
            flags |= ASSET_IDENTIFIER_HAS_OBJECT;
        }
        if self.value.is_some() {
            flags |= ASSET_IDENTIFIER_HAS_VALUE;
        }
        writer.write_u8(flags)?;
        for field in [self.package, self.r#type, self.object, self.value] {
            if let Some(name) = field {
                archive.write_name(writer, name)?;
            }
        }
        Ok(())
    }
}

fn read_if<R: Read>(reader: &mut R, archive: ArchiveType, present: bool) -> Result<Option<Name>> {
    if present {
        Ok(Some(archive.read_name(reader)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn name_round_trips_with_and_without_number() {
        for name in [Name::new(5, 0), Name::new(5, 42)] {
            let mut buf = Cursor::new(Vec::new());
            ArchiveType::AssetRegistry.write_name(&mut buf, name).unwrap();
            buf.set_position(0);
            let read_back = ArchiveType::AssetRegistry.read_name(&mut buf).unwrap();
            assert_eq!(read_back, name);
        }
    }

    #[test]
    fn soft_object_path_round_trips_bundle_reference() {
        // §8 scenario 5: /Game/Foo.Foo_C::Inst1
        let path = SoftObjectPath {
            asset_path: TopLevelAssetPath {
                package: Name::new(0, 0), // "/Game/Foo"
                asset: Name::new(1, 0),   // "Foo_C"
            },
            sub_path: StoredIdentifier {
                payload: "Inst1".into(),
                is_wide: false,
            },
        };
        let mut buf = Cursor::new(Vec::new());
        path.write(&mut buf, ArchiveType::AssetRegistry).unwrap();
        buf.set_position(0);
        let read_back = SoftObjectPath::read(&mut buf, ArchiveType::AssetRegistry).unwrap();
        assert_eq!(read_back, path);
    }

    #[test]
    fn table_archive_dialect_is_not_implemented() {
        let mut buf = Cursor::new(vec![0u8; 16]);
        assert!(ArchiveType::TableArchive.read_name(&mut buf).is_err());
    }

    #[test]
    fn export_path_round_trips_with_wire_field_order() {
        let path = ExportPath {
            class_path: TopLevelAssetPath {
                package: Name::new(1, 0),
                asset: Name::new(2, 0),
            },
            package_name: Name::new(3, 0),
            object_name: Name::new(4, 0),
        };
        let mut buf = Cursor::new(Vec::new());
        path.write(&mut buf, ArchiveType::AssetRegistry).unwrap();
        buf.set_position(0);
        let read_back = ExportPath::read(&mut buf, ArchiveType::AssetRegistry).unwrap();
        assert_eq!(read_back, path);
    }

    #[test]
    fn asset_identifier_round_trips_all_flag_combinations() {
        let ids = [
            AssetIdentifier::default(),
            AssetIdentifier {
                package: Some(Name::new(1, 0)),
                ..Default::default()
            },
            AssetIdentifier {
                package: Some(Name::new(1, 0)),
                r#type: Some(Name::new(2, 0)),
                object: Some(Name::new(3, 0)),
                value: Some(Name::new(4, 0)),
            },
        ];
        for id in ids {
            let mut buf = Cursor::new(Vec::new());
            id.write(&mut buf, ArchiveType::AssetRegistry).unwrap();
            buf.set_position(0);
            let read_back = AssetIdentifier::read(&mut buf, ArchiveType::AssetRegistry).unwrap();
            assert_eq!(read_back, id);
        }
    }
}
