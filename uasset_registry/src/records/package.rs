//! Package records: one per cooked package, carrying disk size, hashes, and
//! per-package engine/version metadata, each field gated by a minimum
//! version threshold.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::Result;
use crate::identifiers::ArchiveType;
use crate::name_pool::{Name, StoredIdentifier};
use crate::primitives::{read_array, read_string, write_array, write_string, Guid, Readable, Writable};
use crate::version::AssetRegistryVersion;

/// `(12-byte key, 20-byte hash)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHash {
    pub key: [u8; 12],
    pub hash: [u8; 20],
}

impl Readable for ChunkHash {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut key = [0u8; 12];
        reader.read_exact(&mut key)?;
        let mut hash = [0u8; 20];
        reader.read_exact(&mut hash)?;
        Ok(ChunkHash { key, hash })
    }
}
impl Writable for ChunkHash {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.key)?;
        writer.write_all(&self.hash)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomVersion {
    pub key: Guid,
    pub version: i32,
}

impl Readable for CustomVersion {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let key = Guid::read(reader)?;
        let version = reader.read_i32::<LE>()?;
        Ok(CustomVersion { key, version })
    }
}
impl Writable for CustomVersion {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.key.write(writer)?;
        writer.write_i32::<LE>(self.version)?;
        Ok(())
    }
}

/// `ue4_ver`, optionally `ue5_ver` (from `PackageFileSummaryVersionChange`),
/// `version_licensee`, `flags`, and custom versions — all introduced
/// together at `WorkspaceDomain`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceDomainData {
    pub ue4_version: i32,
    pub ue5_version: Option<i32>,
    pub version_licensee: i32,
    pub flags: i32,
    pub custom_versions: Vec<CustomVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageData {
    pub key: Name,
    pub disk_size: i64,
    pub guid: Guid,
    pub cooked_hash: Option<[u8; 16]>,
    pub chunk_hashes: Option<Vec<ChunkHash>>,
    pub workspace_domain: Option<WorkspaceDomainData>,
    pub imported_classes: Option<Vec<Name>>,
    pub extension_path: Option<StoredIdentifier>,
}

impl PackageData {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType, version: AssetRegistryVersion) -> Result<Self> {
        let key = archive.read_name(reader)?;
        let disk_size = reader.read_i64::<LE>()?;
        let guid = Guid::read(reader)?;

        let cooked_hash = if version >= AssetRegistryVersion::AddedCookedMd5Hash {
            let mut buf = [0u8; 16];
            reader.read_exact(&mut buf)?;
            Some(buf)
        } else {
            None
        };

        let chunk_hashes = if version >= AssetRegistryVersion::AddedChunkHashes {
            Some(read_array(reader)?)
        } else {
            None
        };

        let workspace_domain = if version >= AssetRegistryVersion::WorkspaceDomain {
            let ue4_version = reader.read_i32::<LE>()?;
            let ue5_version = if version >= AssetRegistryVersion::PackageFileSummaryVersionChange {
                Some(reader.read_i32::<LE>()?)
            } else {
                None
            };
            let version_licensee = reader.read_i32::<LE>()?;
            let flags = reader.read_i32::<LE>()?;
            let custom_versions = read_array(reader)?;
            Some(WorkspaceDomainData {
                ue4_version,
                ue5_version,
                version_licensee,
                flags,
                custom_versions,
            })
        } else {
            None
        };

        let imported_classes = if version >= AssetRegistryVersion::PackageImportedClasses {
            let count = reader.read_i32::<LE>()?;
            let mut names = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                names.push(archive.read_name(reader)?);
            }
            Some(names)
        } else {
            None
        };

        let extension_path = if version >= AssetRegistryVersion::AssetPackageDataHasExtension {
            let payload = read_string(reader)?;
            let is_wide = !payload.is_ascii();
            Some(StoredIdentifier { payload, is_wide })
        } else {
            None
        };

        Ok(PackageData {
            key,
            disk_size,
            guid,
            cooked_hash,
            chunk_hashes,
            workspace_domain,
            imported_classes,
            extension_path,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType, version: AssetRegistryVersion) -> Result<()> {
        archive.write_name(writer, self.key)?;
        writer.write_i64::<LE>(self.disk_size)?;
        self.guid.write(writer)?;

        if version >= AssetRegistryVersion::AddedCookedMd5Hash {
            writer.write_all(&self.cooked_hash.unwrap_or([0u8; 16]))?;
        }

        if version >= AssetRegistryVersion::AddedChunkHashes {
            write_array(writer, self.chunk_hashes.as_deref().unwrap_or(&[]))?;
        }

        if version >= AssetRegistryVersion::WorkspaceDomain {
            let domain = self.workspace_domain.clone().unwrap_or_default();
            writer.write_i32::<LE>(domain.ue4_version)?;
            if version >= AssetRegistryVersion::PackageFileSummaryVersionChange {
                writer.write_i32::<LE>(domain.ue5_version.unwrap_or(0))?;
            }
            writer.write_i32::<LE>(domain.version_licensee)?;
            writer.write_i32::<LE>(domain.flags)?;
            write_array(writer, &domain.custom_versions)?;
        }

        if version >= AssetRegistryVersion::PackageImportedClasses {
            let names = self.imported_classes.clone().unwrap_or_default();
            writer.write_i32::<LE>(names.len() as i32)?;
            for name in names {
                archive.write_name(writer, name)?;
            }
        }

        if version >= AssetRegistryVersion::AssetPackageDataHasExtension {
            let payload = self
                .extension_path
                .as_ref()
                .map(|s| s.payload.clone())
                .unwrap_or_default();
            write_string(writer, &payload)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_full_latest_version_record() {
        let package = PackageData {
            key: Name::new(0, 0),
            disk_size: 12345,
            guid: Guid([1, 2, 3, 4]),
            cooked_hash: Some([7u8; 16]),
            chunk_hashes: Some(vec![ChunkHash {
                key: [1u8; 12],
                hash: [2u8; 20],
            }]),
            workspace_domain: Some(WorkspaceDomainData {
                ue4_version: 522,
                ue5_version: Some(1004),
                version_licensee: 0,
                flags: 0,
                custom_versions: vec![CustomVersion {
                    key: Guid([9, 9, 9, 9]),
                    version: 3,
                }],
            }),
            imported_classes: Some(vec![Name::new(1, 0)]),
            extension_path: Some(StoredIdentifier {
                payload: "uasset".into(),
                is_wide: false,
            }),
        };

        let version = AssetRegistryVersion::LATEST;
        let mut buf = Cursor::new(Vec::new());
        package.write(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        buf.set_position(0);
        let read_back = PackageData::read(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        assert_eq!(read_back, package);
    }

    #[test]
    fn older_version_omits_fields_introduced_later() {
        let package = PackageData {
            key: Name::new(0, 0),
            disk_size: 1,
            guid: Guid::default(),
            cooked_hash: None,
            chunk_hashes: None,
            workspace_domain: None,
            imported_classes: None,
            extension_path: None,
        };

        let version = AssetRegistryVersion::RemovedMd5Hash; // before AddedCookedMd5Hash
        let mut buf = Cursor::new(Vec::new());
        package.write(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        buf.set_position(0);
        let read_back = PackageData::read(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        assert_eq!(read_back, package);
    }
}
