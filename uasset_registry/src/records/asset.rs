//! Asset records: one per cooked asset, carrying identity, class, tags, soft
//! bundle references, chunk membership, and package flags.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::Result;
use crate::identifiers::{ArchiveType, SoftObjectPath, TopLevelAssetPath};
use crate::name_pool::Name;
use crate::primitives::{read_array, write_array};
use crate::tag_store::TagMapHandle;
use crate::version::AssetRegistryVersion;

/// A named bundle of soft object paths attached to an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub name: Name,
    pub paths: Vec<SoftObjectPath>,
}

impl Bundle {
    fn read<R: Read>(reader: &mut R, archive: ArchiveType) -> Result<Self> {
        let name = archive.read_name(reader)?;
        let count = reader.read_i32::<LE>()?;
        let mut paths = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            paths.push(SoftObjectPath::read(reader, archive)?);
        }
        Ok(Bundle { name, paths })
    }

    fn write<W: Write>(&self, writer: &mut W, archive: ArchiveType) -> Result<()> {
        archive.write_name(writer, self.name)?;
        writer.write_i32::<LE>(self.paths.len() as i32)?;
        for path in &self.paths {
            path.write(writer, archive)?;
        }
        Ok(())
    }
}

/// The asset's class, stored either as a bare `Name` (pre-`ClassPaths`
/// versions) or a full `TopLevelAssetPath` (`ClassPaths` and later).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Legacy(Name),
    Path(TopLevelAssetPath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    pub old_object_path: Option<Name>,
    pub package_path: Name,
    pub asset_class: AssetClass,
    pub package_name: Name,
    pub asset_name: Name,
    pub optional_outer_path: Option<Name>,
    pub tags: TagMapHandle,
    pub bundles: Vec<Bundle>,
    pub chunk_ids: Vec<i32>,
    pub package_flags: u32,
}

impl AssetData {
    pub fn read<R: Read>(
        reader: &mut R,
        archive: ArchiveType,
        version: AssetRegistryVersion,
        filter_editor_only: bool,
    ) -> Result<Self> {
        let old_object_path = if version < AssetRegistryVersion::RemoveAssetPathFnames {
            Some(archive.read_name(reader)?)
        } else {
            None
        };

        let package_path = archive.read_name(reader)?;

        let asset_class = if version >= AssetRegistryVersion::ClassPaths {
            AssetClass::Path(TopLevelAssetPath::read(reader, archive)?)
        } else {
            AssetClass::Legacy(archive.read_name(reader)?)
        };

        let package_name = archive.read_name(reader)?;
        let asset_name = archive.read_name(reader)?;

        let optional_outer_path =
            if version >= AssetRegistryVersion::AddedHeader && !filter_editor_only {
                Some(archive.read_name(reader)?)
            } else {
                None
            };

        let tags = TagMapHandle::unpack(reader.read_u64::<LE>()?);

        let bundle_count = reader.read_i32::<LE>()?;
        let mut bundles = Vec::with_capacity(bundle_count.max(0) as usize);
        for _ in 0..bundle_count {
            bundles.push(Bundle::read(reader, archive)?);
        }

        let chunk_ids: Vec<i32> = read_array(reader)?;
        let package_flags = reader.read_u32::<LE>()?;

        Ok(AssetData {
            old_object_path,
            package_path,
            asset_class,
            package_name,
            asset_name,
            optional_outer_path,
            tags,
            bundles,
            chunk_ids,
            package_flags,
        })
    }

    pub fn write<W: Write>(
        &self,
        writer: &mut W,
        archive: ArchiveType,
        version: AssetRegistryVersion,
        filter_editor_only: bool,
    ) -> Result<()> {
        if version < AssetRegistryVersion::RemoveAssetPathFnames {
            let name = self.old_object_path.unwrap_or_default();
            archive.write_name(writer, name)?;
        }

        archive.write_name(writer, self.package_path)?;

        match self.asset_class {
            AssetClass::Path(path) if version >= AssetRegistryVersion::ClassPaths => {
                path.write(writer, archive)?;
            }
            AssetClass::Legacy(name) if version < AssetRegistryVersion::ClassPaths => {
                archive.write_name(writer, name)?;
            }
            AssetClass::Path(path) => {
                // writing an older version than this model was read at: fall
                // back to the path's asset name, mirroring how the legacy
                // field only ever carried the class's leaf name.
                archive.write_name(writer, path.asset)?;
            }
            AssetClass::Legacy(name) => {
                TopLevelAssetPath {
                    package: Name::default(),
                    asset: name,
                }
                .write(writer, archive)?;
            }
        }

        archive.write_name(writer, self.package_name)?;
        archive.write_name(writer, self.asset_name)?;

        if version >= AssetRegistryVersion::AddedHeader && !filter_editor_only {
            let name = self.optional_outer_path.unwrap_or_default();
            archive.write_name(writer, name)?;
        }

        writer.write_u64::<LE>(self.tags.pack())?;

        writer.write_i32::<LE>(self.bundles.len() as i32)?;
        for bundle in &self.bundles {
            bundle.write(writer, archive)?;
        }

        write_array(writer, &self.chunk_ids)?;
        writer.write_u32::<LE>(self.package_flags)?;

        Ok(())
    }

    /// The lexical sort key write order uses: `outer + sep + assetName` when
    /// `optionalOuterPath` is set (`sep` is `":"` if `outer` already
    /// contains a `.`, else `"."`); otherwise `packageName + "." +
    /// assetName`.
    pub fn lexical_path_key(&self, pool: &crate::name_pool::NamePool) -> Result<String> {
        let asset_name = pool.resolve(self.asset_name)?;
        if let Some(outer) = self.optional_outer_path {
            let outer = pool.resolve(outer)?;
            let sep = if outer.contains('.') { ":" } else { "." };
            Ok(format!("{outer}{sep}{asset_name}"))
        } else {
            let package_name = pool.resolve(self.package_name)?;
            Ok(format!("{package_name}.{asset_name}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_minimal_latest_version_asset() {
        let asset = AssetData {
            old_object_path: None,
            package_path: Name::new(0, 0),
            asset_class: AssetClass::Path(TopLevelAssetPath {
                package: Name::new(1, 0),
                asset: Name::new(2, 0),
            }),
            package_name: Name::new(3, 0),
            asset_name: Name::new(4, 0),
            optional_outer_path: None,
            tags: TagMapHandle::default(),
            bundles: vec![],
            chunk_ids: vec![],
            package_flags: 0,
        };

        let version = AssetRegistryVersion::LATEST;
        let mut buf = Cursor::new(Vec::new());
        asset
            .write(&mut buf, ArchiveType::AssetRegistry, version, false)
            .unwrap();
        buf.set_position(0);
        let read_back =
            AssetData::read(&mut buf, ArchiveType::AssetRegistry, version, false).unwrap();
        assert_eq!(read_back, asset);
    }
}
