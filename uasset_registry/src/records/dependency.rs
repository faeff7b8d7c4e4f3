//! Dependency records: an asset identifier plus four categorized lists of
//! dependency-graph node indices, each with a parallel packed flag blob.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::Result;
use crate::identifiers::{ArchiveType, AssetIdentifier};
use crate::primitives::flag_blob_byte_len;
use crate::version::AssetRegistryVersion;

const PACKAGE_FLAG_BITS: u32 = 5;
const MANAGE_FLAG_BITS: u32 = 1;

/// One of the four dependency categories: a list of node indices and the
/// packed per-entry flag bits that travel alongside it (empty when the
/// category carries no flags).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyList {
    pub indices: Vec<i32>,
    pub flags: Vec<u8>,
}

impl DependencyList {
    fn read<R: Read>(reader: &mut R, bits_per_flag: u32, has_flags: bool) -> Result<Self> {
        let count = reader.read_i32::<LE>()?;
        let mut indices = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            indices.push(reader.read_i32::<LE>()?);
        }
        let flags = if has_flags {
            let len = flag_blob_byte_len(bits_per_flag, indices.len());
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            buf
        } else {
            Vec::new()
        };
        Ok(DependencyList { indices, flags })
    }

    fn write<W: Write>(&self, writer: &mut W, bits_per_flag: u32, has_flags: bool) -> Result<()> {
        writer.write_i32::<LE>(self.indices.len() as i32)?;
        for i in &self.indices {
            writer.write_i32::<LE>(*i)?;
        }
        if has_flags {
            let expected_len = flag_blob_byte_len(bits_per_flag, self.indices.len());
            debug_assert_eq!(self.flags.len(), expected_len);
            writer.write_all(&self.flags)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub identifier: AssetIdentifier,
    pub package: DependencyList,
    pub name: DependencyList,
    /// Absent entirely on versions before `AddedHardManage`.
    pub manage: Option<DependencyList>,
    pub referencer: DependencyList,
}

impl DependencyRecord {
    pub fn read<R: Read>(reader: &mut R, archive: ArchiveType, version: AssetRegistryVersion) -> Result<Self> {
        let identifier = AssetIdentifier::read(reader, archive)?;

        let package_has_flags = version >= AssetRegistryVersion::AddedDependencyFlags;
        let package = DependencyList::read(reader, PACKAGE_FLAG_BITS, package_has_flags)?;
        let name = DependencyList::read(reader, 0, false)?;
        let manage = if version >= AssetRegistryVersion::AddedHardManage {
            Some(DependencyList::read(reader, MANAGE_FLAG_BITS, true)?)
        } else {
            None
        };
        let referencer = DependencyList::read(reader, 0, false)?;

        Ok(DependencyRecord {
            identifier,
            package,
            name,
            manage,
            referencer,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType, version: AssetRegistryVersion) -> Result<()> {
        self.identifier.write(writer, archive)?;

        let package_has_flags = version >= AssetRegistryVersion::AddedDependencyFlags;
        self.package.write(writer, PACKAGE_FLAG_BITS, package_has_flags)?;
        self.name.write(writer, 0, false)?;
        if version >= AssetRegistryVersion::AddedHardManage {
            let manage = self.manage.clone().unwrap_or_default();
            manage.write(writer, MANAGE_FLAG_BITS, true)?;
        }
        self.referencer.write(writer, 0, false)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_latest_version_with_all_categories() {
        let record = DependencyRecord {
            identifier: AssetIdentifier {
                package: Some(crate::name_pool::Name::new(0, 0)),
                ..Default::default()
            },
            package: DependencyList {
                indices: vec![1, 2],
                flags: vec![0u8; flag_blob_byte_len(PACKAGE_FLAG_BITS, 2)],
            },
            name: DependencyList {
                indices: vec![3],
                flags: vec![],
            },
            manage: Some(DependencyList {
                indices: vec![4, 5, 6],
                flags: vec![0u8; flag_blob_byte_len(MANAGE_FLAG_BITS, 3)],
            }),
            referencer: DependencyList {
                indices: vec![],
                flags: vec![],
            },
        };

        let version = AssetRegistryVersion::LATEST;
        let mut buf = Cursor::new(Vec::new());
        record.write(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        buf.set_position(0);
        let read_back = DependencyRecord::read(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        assert_eq!(read_back, record);
    }

    #[test]
    fn legacy_version_before_added_hard_manage_has_no_manage_list() {
        let record = DependencyRecord {
            identifier: AssetIdentifier::default(),
            package: DependencyList {
                indices: vec![],
                flags: vec![],
            },
            name: DependencyList::default(),
            manage: None,
            referencer: DependencyList::default(),
        };

        let version = AssetRegistryVersion::ChangedAssetData; // before AddedHardManage
        let mut buf = Cursor::new(Vec::new());
        record.write(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        buf.set_position(0);
        let read_back = DependencyRecord::read(&mut buf, ArchiveType::AssetRegistry, version).unwrap();
        assert_eq!(read_back.manage, None);
    }
}
