//! Top-level binary codec: orchestrates the header, name batch, tag store,
//! and the three record sections, and enforces the end-of-file invariant.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use log::debug;

use crate::error::{Error, Result};
use crate::identifiers::ArchiveType;
use crate::name_pool::NamePool;
use crate::primitives::{Guid, Readable, Writable};
use crate::records::{self, AssetData, DependencyRecord, PackageData};
use crate::tag_store::{self, Store};
use crate::version::AssetRegistryVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub guid: Guid,
    pub version: AssetRegistryVersion,
    /// Only present on the wire when `version >= AddedHeader`; absent reads
    /// as `false`.
    pub filter_editor_only: bool,
}

impl Header {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let guid = Guid::read(reader)?;
        let raw_version = reader.read_u32::<LE>()?;
        let version = AssetRegistryVersion::from_u32(raw_version);
        let filter_editor_only = if version >= AssetRegistryVersion::AddedHeader {
            reader.read_u8()? != 0
        } else {
            false
        };
        Ok(Header {
            guid,
            version,
            filter_editor_only,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.guid.write(writer)?;
        writer.write_u32::<LE>(self.version.as_u32())?;
        if self.version >= AssetRegistryVersion::AddedHeader {
            writer.write_u8(self.filter_editor_only as u8)?;
        }
        Ok(())
    }
}

/// The fully decoded in-memory model of an asset registry file.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    pub header: Header,
    pub archive: ArchiveType,
    pub pool: NamePool,
    pub store: Store,
    pub assets: Vec<AssetData>,
    pub dependencies: Vec<DependencyRecord>,
    pub packages: Vec<PackageData>,
}

impl AssetRegistry {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header = Header::read(reader)?;
        debug!("read header: version={}, guid={:?}", header.version, header.guid);

        if header.version < AssetRegistryVersion::MINIMUM_SUPPORTED {
            return Err(Error::version_too_old(
                AssetRegistryVersion::MINIMUM_SUPPORTED,
                header.version,
            ));
        }

        if header.version < AssetRegistryVersion::FixedTags {
            return Err(Error::not_implemented(format!(
                "legacy registry reader for version {} (< FixedTags)",
                header.version
            )));
        }

        let archive = ArchiveType::AssetRegistry;

        let pool = crate::name_batch::read_name_batch(reader)?;
        debug!("read name batch: {} names", pool.len());

        let store = tag_store::read_store(reader)?;
        debug!(
            "read tag store: {} numbered pairs, {} numberless pairs",
            store.numbered_pairs.len(),
            store.numberless_pairs.len()
        );

        let assets = records::read_assets(reader, archive, header.version, header.filter_editor_only)?;
        let dependencies = records::read_dependencies(reader, archive, header.version)?;
        let packages = records::read_packages(reader, archive, header.version)?;

        let position = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        if position != end {
            return Err(Error::trailing_bytes(end - position));
        }

        Ok(AssetRegistry {
            header,
            archive,
            pool,
            store,
            assets,
            dependencies,
            packages,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;

        if self.header.version < AssetRegistryVersion::FixedTags {
            return Err(Error::not_implemented(format!(
                "legacy registry writer for version {} (< FixedTags)",
                self.header.version
            )));
        }

        crate::name_batch::write_name_batch(writer, &self.pool)?;
        tag_store::write_store(writer, &self.store)?;

        records::write_assets(
            writer,
            self.archive,
            self.header.version,
            self.header.filter_editor_only,
            &self.assets,
            &self.pool,
        )?;
        records::write_dependencies(writer, self.archive, self.header.version, &self.dependencies)?;
        records::write_packages(writer, self.archive, self.header.version, &self.packages)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn empty_registry(version: AssetRegistryVersion) -> AssetRegistry {
        let mut store = Store::new();
        store.text_first = true; // new format default
        AssetRegistry {
            header: Header {
                guid: Guid::default(),
                version,
                filter_editor_only: false,
            },
            archive: ArchiveType::AssetRegistry,
            pool: NamePool::new(),
            store,
            assets: vec![],
            dependencies: vec![],
            packages: vec![],
        }
    }

    #[test]
    fn empty_registry_round_trips_exactly() {
        let registry = empty_registry(AssetRegistryVersion::LATEST);
        let mut buf = Cursor::new(Vec::new());
        registry.write(&mut buf).unwrap();
        let bytes = buf.into_inner();

        let mut cursor = Cursor::new(bytes);
        let read_back = AssetRegistry::read(&mut cursor).unwrap();
        assert_eq!(read_back.header.version, AssetRegistryVersion::LATEST);
        assert_eq!(read_back.assets.len(), 0);
        assert_eq!(read_back.dependencies.len(), 0);
        assert_eq!(read_back.packages.len(), 0);
    }

    #[test]
    fn empty_registry_matches_literal_byte_layout() {
        // §8 scenario 1: empty registry, latest version, filter_editor_only=false.
        let registry = empty_registry(AssetRegistryVersion::LATEST);
        let mut buf = Cursor::new(Vec::new());
        registry.write(&mut buf).unwrap();
        let bytes = buf.into_inner();

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0u8; 16]); // guid
        expected.extend_from_slice(&AssetRegistryVersion::LATEST.as_u32().to_le_bytes());
        expected.push(0); // filter_editor_only
        expected.extend_from_slice(&0u32.to_le_bytes()); // num_strings
        expected.extend_from_slice(&0u32.to_le_bytes()); // num_string_bytes
        expected.extend_from_slice(&crate::name_batch::HASH_VERSION.to_le_bytes());
        expected.extend_from_slice(&tag_store::START_MARKER_TEXT_FIRST.to_le_bytes());
        for _ in 0..10 {
            expected.extend_from_slice(&0u32.to_le_bytes());
        }
        expected.extend_from_slice(&0u32.to_le_bytes()); // inner text section size
        expected.extend_from_slice(&tag_store::END_MARKER.to_le_bytes());
        expected.extend_from_slice(&0i32.to_le_bytes()); // asset count
        expected.extend_from_slice(&8i64.to_le_bytes()); // dependency section size
        expected.extend_from_slice(&0i32.to_le_bytes()); // dependency count
        expected.extend_from_slice(&0i32.to_le_bytes()); // package count

        assert_eq!(bytes, expected);
    }

    #[test]
    fn pre_removed_md5_hash_version_is_rejected() {
        let registry = empty_registry(AssetRegistryVersion::PreVersioning);
        let mut buf = Cursor::new(Vec::new());
        // Bypass the writer's own version gate to construct a file claiming
        // an unsupported version, as if read from disk.
        registry.header.guid.write(&mut buf).unwrap();
        buf.write_u32::<LE>(AssetRegistryVersion::PreVersioning.as_u32()).unwrap();

        buf.set_position(0);
        let err = AssetRegistry::read(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Version { .. }));
    }
}
