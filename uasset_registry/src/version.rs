use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Named milestones in the asset registry's on-disk format.
///
/// The file carries a single `u32` version number; every version-gated field
/// in the record codec is expressed as a comparison against one of these
/// variants rather than a raw integer, so field presence reads the same way
/// the wire format documents it.
///
/// Ordering matters: derives `PartialOrd`/`Ord` off the discriminant, which
/// is monotonically increasing in release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AssetRegistryVersion {
    PreVersioning = 0,
    HardSoftDependencies,
    AddAssetRegistryState,
    ChangedAssetData,
    RemovedMd5Hash,
    AddedHardManage,
    AddedCookedMd5Hash,
    AddedDependencyFlags,
    FixedTags,
    WorkspaceDomain,
    PackageImportedClasses,
    PackageFileSummaryVersionChange,
    ObjectResourceOptionalVersionChange,
    AddedChunkHashes,
    ClassPaths,
    RemoveAssetPathFnames,
    AddedHeader,
    AssetPackageDataHasExtension,
}

impl AssetRegistryVersion {
    pub const LATEST: AssetRegistryVersion = AssetRegistryVersion::AssetPackageDataHasExtension;

    /// The oldest version this codec will read. Anything older uses a
    /// legacy table-archive name dialect this implementation does not
    /// support; see [`AssetRegistryVersion::FixedTags`].
    pub const MINIMUM_SUPPORTED: AssetRegistryVersion = AssetRegistryVersion::RemovedMd5Hash;

    pub fn from_u32(value: u32) -> Self {
        // Versions newer than anything this codec knows about are treated as
        // the latest known version, mirroring how the source falls back to
        // `LatestVersion` on an unrecognized version GUID.
        Self::try_from(value).unwrap_or(Self::LATEST)
    }

    pub fn as_u32(self) -> u32 {
        self.into()
    }
}

impl std::fmt::Display for AssetRegistryVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({})", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_declaration_order() {
        assert!(AssetRegistryVersion::PreVersioning < AssetRegistryVersion::FixedTags);
        assert!(AssetRegistryVersion::FixedTags < AssetRegistryVersion::ClassPaths);
        assert!(AssetRegistryVersion::ClassPaths < AssetRegistryVersion::LATEST);
    }

    #[test]
    fn unknown_future_version_falls_back_to_latest() {
        assert_eq!(AssetRegistryVersion::from_u32(9999), AssetRegistryVersion::LATEST);
    }
}
