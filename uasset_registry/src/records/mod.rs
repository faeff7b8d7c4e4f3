//! Version-gated codecs for the three record kinds that make up a
//! registry's state: assets, dependencies, and packages.

pub mod asset;
pub mod dependency;
pub mod package;

pub use asset::{AssetClass, AssetData, Bundle};
pub use dependency::{DependencyList, DependencyRecord};
pub use package::{ChunkHash, CustomVersion, PackageData, WorkspaceDomainData};

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use log::debug;

use crate::error::{Error, Result};
use crate::identifiers::ArchiveType;
use crate::name_pool::NamePool;
use crate::version::AssetRegistryVersion;

pub fn read_assets<R: Read>(
    reader: &mut R,
    archive: ArchiveType,
    version: AssetRegistryVersion,
    filter_editor_only: bool,
) -> Result<Vec<AssetData>> {
    let count = reader.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::negative_count("asset count", count as i64));
    }
    let mut assets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        assets.push(AssetData::read(reader, archive, version, filter_editor_only)?);
    }
    debug!("read {count} asset records");
    Ok(assets)
}

/// Writes assets sorted by their lexical path key, per the source's write
/// ordering (distinct from ingest order).
pub fn write_assets<W: Write>(
    writer: &mut W,
    archive: ArchiveType,
    version: AssetRegistryVersion,
    filter_editor_only: bool,
    assets: &[AssetData],
    pool: &NamePool,
) -> Result<()> {
    let mut keyed: Vec<(String, &AssetData)> = assets
        .iter()
        .map(|a| Ok((a.lexical_path_key(pool)?, a)))
        .collect::<Result<_>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    writer.write_i32::<LE>(keyed.len() as i32)?;
    for (_, asset) in keyed {
        asset.write(writer, archive, version, filter_editor_only)?;
    }
    Ok(())
}

pub fn read_dependencies<R: Read>(
    reader: &mut R,
    archive: ArchiveType,
    version: AssetRegistryVersion,
) -> Result<Vec<DependencyRecord>> {
    let section_size = reader.read_i64::<LE>()?;
    if section_size < 0 {
        return Err(Error::negative_count("dependency section size", section_size));
    }
    let mut taken = reader.take(section_size as u64);

    let count = taken.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::negative_count("dependency count", count as i64));
    }
    let mut dependencies = Vec::with_capacity(count as usize);
    for _ in 0..count {
        dependencies.push(DependencyRecord::read(&mut taken, archive, version)?);
    }

    if taken.limit() != 0 {
        return Err(Error::size_mismatch(
            "dependency section",
            section_size as u64,
            section_size as u64 - taken.limit(),
        ));
    }

    debug!("read {count} dependency records");
    Ok(dependencies)
}

pub fn write_dependencies<W: Write + Seek>(
    writer: &mut W,
    archive: ArchiveType,
    version: AssetRegistryVersion,
    dependencies: &[DependencyRecord],
) -> Result<()> {
    let size_pos = writer.stream_position()?;
    writer.write_i64::<LE>(0)?; // back-patched below
    let body_start = writer.stream_position()?;

    writer.write_i32::<LE>(dependencies.len() as i32)?;
    for dep in dependencies {
        dep.write(writer, archive, version)?;
    }

    let body_end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_i64::<LE>((body_end - body_start) as i64)?;
    writer.seek(SeekFrom::Start(body_end))?;
    Ok(())
}

pub fn read_packages<R: Read>(
    reader: &mut R,
    archive: ArchiveType,
    version: AssetRegistryVersion,
) -> Result<Vec<PackageData>> {
    let count = reader.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::negative_count("package count", count as i64));
    }
    let mut packages = Vec::with_capacity(count as usize);
    for _ in 0..count {
        packages.push(PackageData::read(reader, archive, version)?);
    }
    debug!("read {count} package records");
    Ok(packages)
}

pub fn write_packages<W: Write>(
    writer: &mut W,
    archive: ArchiveType,
    version: AssetRegistryVersion,
    packages: &[PackageData],
) -> Result<()> {
    writer.write_i32::<LE>(packages.len() as i32)?;
    for package in packages {
        package.write(writer, archive, version)?;
    }
    Ok(())
}
