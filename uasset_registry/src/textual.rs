//! The textual (editable) projection: a lossless mapping between a decoded
//! [`AssetRegistry`] and a `serde_json::Value` document, in both
//! directions.
//!
//! Egress resolves every interned reference into a human-readable string.
//! Ingress re-interns names and re-inserts values through the deduplicating
//! store, so value indices may come back renumbered relative to the
//! original file — only the resolved values are guaranteed to compare
//! equal (see the textual round-trip invariant).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value as Json};

use crate::error::{Error, Result};
use crate::identifiers::{ArchiveType, AssetIdentifier, SoftObjectPath, TopLevelAssetPath};
use crate::name_pool::{Name, NamePool};
use crate::records::dependency::DependencyList;
use crate::records::{AssetClass, AssetData, Bundle, DependencyRecord, PackageData};
use crate::registry::{AssetRegistry, Header};
use crate::tag_store::{self, Store, TagMapHandle, Value as TagValue, ValueId};
use crate::version::AssetRegistryVersion;

lazy_static! {
    static ref MARKER: Regex = Regex::new(r"(?s)^([A-Z_]+)\((.*)\)$").unwrap();
}

fn resolve(pool: &NamePool, name: Name) -> Result<String> {
    pool.resolve(name)
}

fn format_top_level_asset_path(pool: &NamePool, p: TopLevelAssetPath) -> Result<String> {
    Ok(format!("{}.{}", resolve(pool, p.package)?, resolve(pool, p.asset)?))
}

fn parse_top_level_asset_path(s: &str) -> Result<(&str, &str)> {
    let mut parts = s.rsplitn(2, '.');
    let asset = parts.next().unwrap_or("");
    let package = parts.next().ok_or_else(|| {
        Error::not_implemented(format!("malformed top-level asset path '{s}'"))
    })?;
    Ok((package, asset))
}

fn format_soft_object_path(pool: &NamePool, p: &SoftObjectPath) -> Result<String> {
    Ok(format!(
        "{}::{}",
        format_top_level_asset_path(pool, p.asset_path)?,
        p.sub_path.payload
    ))
}

fn parse_soft_object_path(pool: &mut NamePool, s: &str) -> Result<SoftObjectPath> {
    let mut parts = s.splitn(2, "::");
    let top = parts.next().unwrap_or("");
    let sub_path = parts.next().unwrap_or("").to_string();
    let (package, asset) = parse_top_level_asset_path(top)?;
    let asset_path = TopLevelAssetPath {
        package: pool.intern(package),
        asset: pool.intern(asset),
    };
    let is_wide = !sub_path.is_ascii();
    Ok(SoftObjectPath {
        asset_path,
        sub_path: crate::name_pool::StoredIdentifier {
            payload: sub_path,
            is_wide,
        },
    })
}

fn format_export_path(pool: &NamePool, class_pkg: Name, class_asset: Name, pkg: Name, obj: Name) -> Result<String> {
    Ok(format!(
        "{}.{}'{}.{}'",
        resolve(pool, class_pkg)?,
        resolve(pool, class_asset)?,
        resolve(pool, pkg)?,
        resolve(pool, obj)?
    ))
}

fn parse_export_path(s: &str) -> Result<(&str, &str, &str, &str)> {
    let mut parts = s.splitn(2, '\'');
    let top = parts.next().unwrap_or("");
    let rest = parts
        .next()
        .ok_or_else(|| Error::not_implemented(format!("malformed export path '{s}'")))?;
    let rest = rest.strip_suffix('\'').unwrap_or(rest);
    let (class_pkg, class_asset) = parse_top_level_asset_path(top)?;
    let mut inner = rest.rsplitn(2, '.');
    let obj_name = inner.next().unwrap_or("");
    let pkg_name = inner.next().unwrap_or("");
    Ok((class_pkg, class_asset, pkg_name, obj_name))
}

fn value_to_marked_string(store: &Store, pool: &NamePool, id: ValueId) -> Result<String> {
    Ok(match store.resolve(id)? {
        TagValue::AnsiString(s) => format!("ANSI({s})"),
        TagValue::WideString(s) => format!("WIDE({s})"),
        TagValue::LocalizedText(s) => format!("TEXT({s})"),
        TagValue::NumberlessName(idx) => format!("NAME__NO_NUM({})", resolve(pool, Name::new(idx, 0))?),
        TagValue::Name(n) => format!("NAME({})", resolve(pool, n)?),
        TagValue::NumberlessExportPath(p) => format!(
            "PATH__NO_NUM({})",
            format_export_path(
                pool,
                Name::new(p.class_path_package, 0),
                Name::new(p.class_path_asset, 0),
                Name::new(p.package_name, 0),
                Name::new(p.object_name, 0),
            )?
        ),
        TagValue::ExportPath(p) => format!(
            "PATH({})",
            format_export_path(pool, p.class_path_package, p.class_path_asset, p.package_name, p.object_name)?
        ),
    })
}

fn insert_marked_string(store: &mut Store, pool: &mut NamePool, marked: &str) -> Result<ValueId> {
    let caps = MARKER
        .captures(marked)
        .ok_or_else(|| Error::not_implemented(format!("malformed tag value '{marked}'")))?;
    let marker = &caps[1];
    let inner = &caps[2];
    Ok(match marker {
        "ANSI" => store.insert_ansi_string(inner),
        "WIDE" => store.insert_wide_string(inner),
        "TEXT" => store.insert_text(inner),
        "NAME__NO_NUM" => {
            let name = pool.intern(inner);
            store.insert_numberless_name(name.index)
        }
        "NAME" => {
            let name = pool.intern(inner);
            store.insert_name(name)
        }
        "PATH__NO_NUM" => {
            let (class_pkg, class_asset, pkg, obj) = parse_export_path(inner)?;
            let path = tag_store::NumberlessExportPath {
                class_path_package: pool.intern(class_pkg).index,
                class_path_asset: pool.intern(class_asset).index,
                package_name: pool.intern(pkg).index,
                object_name: pool.intern(obj).index,
            };
            store.insert_numberless_export_path(path)
        }
        "PATH" => {
            let (class_pkg, class_asset, pkg, obj) = parse_export_path(inner)?;
            let path = tag_store::ExportPath {
                class_path_package: pool.intern(class_pkg),
                class_path_asset: pool.intern(class_asset),
                package_name: pool.intern(pkg),
                object_name: pool.intern(obj),
            };
            store.insert_export_path(path)
        }
        other => return Err(Error::not_implemented(format!("unknown tag value marker '{other}'"))),
    })
}

fn encode_tags(store: &Store, pool: &NamePool, handle: TagMapHandle) -> Result<Json> {
    let pairs = store.pairs_for(handle)?;
    let mut obj = serde_json::Map::new();
    for (name, value_id) in pairs {
        let key = resolve(pool, *name)?;
        let value = value_to_marked_string(store, pool, *value_id)?;
        obj.insert(key, Json::String(value));
    }
    Ok(Json::Object(obj))
}

fn decode_tags(store: &mut Store, pool: &mut NamePool, doc: &Json, has_numberless_keys: bool) -> Result<TagMapHandle> {
    let obj = doc
        .as_object()
        .ok_or_else(|| Error::not_implemented("TagsAndValues must be an object"))?;
    let mut pairs = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let marked = value
            .as_str()
            .ok_or_else(|| Error::not_implemented("tag value must be a string"))?;
        let name = pool.intern(key);
        let value_id = insert_marked_string(store, pool, marked)?;
        pairs.push((name, value_id));
    }
    Ok(store.register_pairs(pairs, has_numberless_keys))
}

fn encode_bundle(pool: &NamePool, bundle: &Bundle) -> Result<Json> {
    let paths: Result<Vec<Json>> = bundle
        .paths
        .iter()
        .map(|p| Ok(Json::String(format_soft_object_path(pool, p)?)))
        .collect();
    Ok(json!({
        "BundleName": resolve(pool, bundle.name)?,
        "AssetPaths": paths?,
    }))
}

fn decode_bundle(pool: &mut NamePool, doc: &Json) -> Result<Bundle> {
    let name = pool.intern(doc["BundleName"].as_str().unwrap_or_default());
    let paths = doc["AssetPaths"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|p| parse_soft_object_path(pool, p.as_str().unwrap_or_default()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Bundle { name, paths })
}

fn hex_indices(indices: &[i32]) -> Vec<Json> {
    indices.iter().map(|i| Json::String(format!("{i:#x}"))).collect()
}

fn unhex_indices(doc: &Json) -> Vec<i32> {
    doc.as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| i32::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .collect()
}

fn encode_dependency_list(list: &DependencyList) -> Json {
    json!({
        "Indices": hex_indices(&list.indices),
        "Flags": list.flags,
    })
}

fn decode_dependency_list(doc: &Json) -> DependencyList {
    let indices = unhex_indices(&doc["Indices"]);
    let flags = doc["Flags"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_u64())
        .map(|v| v as u8)
        .collect();
    DependencyList { indices, flags }
}

fn encode_identifier(pool: &NamePool, id: &AssetIdentifier) -> Result<Json> {
    let field = |n: Option<Name>| -> Result<Json> {
        Ok(match n {
            Some(n) => Json::String(resolve(pool, n)?),
            None => Json::Null,
        })
    };
    Ok(json!({
        "Package": field(id.package)?,
        "Type": field(id.r#type)?,
        "Object": field(id.object)?,
        "Value": field(id.value)?,
    }))
}

fn decode_identifier(pool: &mut NamePool, doc: &Json) -> AssetIdentifier {
    let field = |key: &str| -> Option<Name> { doc[key].as_str().map(|s| pool.intern(s)) };
    AssetIdentifier {
        package: field("Package"),
        r#type: field("Type"),
        object: field("Object"),
        value: field("Value"),
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex_bytes<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    for i in 0..N {
        out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

fn encode_package(pool: &NamePool, package: &PackageData) -> Result<Json> {
    let mut obj = serde_json::Map::new();
    obj.insert("Key".into(), Json::String(resolve(pool, package.key)?));
    obj.insert("DiskSize".into(), json!(package.disk_size));
    obj.insert("Guid".into(), json!(package.guid.0));

    if let Some(cooked_hash) = package.cooked_hash {
        obj.insert("CookedHash".into(), Json::String(hex_bytes(&cooked_hash)));
    }
    if let Some(chunk_hashes) = &package.chunk_hashes {
        let arr: Vec<Json> = chunk_hashes
            .iter()
            .map(|c| json!({ "Key": hex_bytes(&c.key), "Hash": hex_bytes(&c.hash) }))
            .collect();
        obj.insert("ChunkHashes".into(), Json::Array(arr));
    }
    if let Some(domain) = &package.workspace_domain {
        obj.insert("Ue4Version".into(), json!(domain.ue4_version));
        if let Some(ue5) = domain.ue5_version {
            obj.insert("Ue5Version".into(), json!(ue5));
        }
        obj.insert("VersionLicensee".into(), json!(domain.version_licensee));
        obj.insert("Flags".into(), json!(domain.flags));
        let custom: Vec<Json> = domain
            .custom_versions
            .iter()
            .map(|c| json!({ "Key": c.key.0, "Version": c.version }))
            .collect();
        obj.insert("CustomVersions".into(), Json::Array(custom));
    }
    if let Some(imported) = &package.imported_classes {
        let names: Result<Vec<Json>> = imported.iter().map(|n| Ok(Json::String(resolve(pool, *n)?))).collect();
        obj.insert("ImportedClasses".into(), Json::Array(names?));
    }
    if let Some(ext) = &package.extension_path {
        obj.insert("ExtensionPath".into(), Json::String(ext.payload.clone()));
    }

    Ok(Json::Object(obj))
}

fn decode_package(pool: &mut NamePool, doc: &Json, version: AssetRegistryVersion) -> PackageData {
    let key = pool.intern(doc["Key"].as_str().unwrap_or_default());
    let disk_size = doc["DiskSize"].as_i64().unwrap_or(0);
    let guid_parts: Vec<u32> = doc["Guid"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_u64())
        .map(|v| v as u32)
        .collect();
    let guid = crate::primitives::Guid([
        *guid_parts.first().unwrap_or(&0),
        *guid_parts.get(1).unwrap_or(&0),
        *guid_parts.get(2).unwrap_or(&0),
        *guid_parts.get(3).unwrap_or(&0),
    ]);

    let cooked_hash = doc
        .get("CookedHash")
        .and_then(Json::as_str)
        .and_then(unhex_bytes::<16>);
    let chunk_hashes = doc.get("ChunkHashes").and_then(Json::as_array).map(|arr| {
        arr.iter()
            .filter_map(|c| {
                let key = unhex_bytes::<12>(c.get("Key")?.as_str()?)?;
                let hash = unhex_bytes::<20>(c.get("Hash")?.as_str()?)?;
                Some(crate::records::ChunkHash { key, hash })
            })
            .collect()
    });
    let workspace_domain = if version >= AssetRegistryVersion::WorkspaceDomain {
        Some(crate::records::WorkspaceDomainData {
            ue4_version: doc["Ue4Version"].as_i64().unwrap_or(0) as i32,
            ue5_version: doc.get("Ue5Version").and_then(Json::as_i64).map(|v| v as i32),
            version_licensee: doc["VersionLicensee"].as_i64().unwrap_or(0) as i32,
            flags: doc["Flags"].as_i64().unwrap_or(0) as i32,
            custom_versions: doc
                .get("CustomVersions")
                .and_then(Json::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| {
                            let parts: Vec<u32> = c
                                .get("Key")?
                                .as_array()?
                                .iter()
                                .filter_map(|v| v.as_u64())
                                .map(|v| v as u32)
                                .collect();
                            Some(crate::records::CustomVersion {
                                key: crate::primitives::Guid([
                                    *parts.first()?,
                                    *parts.get(1)?,
                                    *parts.get(2)?,
                                    *parts.get(3)?,
                                ]),
                                version: c.get("Version")?.as_i64()? as i32,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    } else {
        None
    };
    let imported_classes = doc.get("ImportedClasses").and_then(Json::as_array).map(|arr| {
        arr.iter()
            .filter_map(Json::as_str)
            .map(|s| pool.intern(s))
            .collect()
    });
    let extension_path = doc.get("ExtensionPath").and_then(Json::as_str).map(|s| {
        let is_wide = !s.is_ascii();
        crate::name_pool::StoredIdentifier {
            payload: s.to_string(),
            is_wide,
        }
    });

    PackageData {
        key,
        disk_size,
        guid,
        cooked_hash,
        chunk_hashes,
        workspace_domain,
        imported_classes,
        extension_path,
    }
}

fn encode_asset(pool: &NamePool, store: &Store, asset: &AssetData) -> Result<Json> {
    let asset_class = match asset.asset_class {
        AssetClass::Path(p) => format_top_level_asset_path(pool, p)?,
        AssetClass::Legacy(n) => resolve(pool, n)?,
    };
    let bundles: Result<Vec<Json>> = asset.bundles.iter().map(|b| encode_bundle(pool, b)).collect();
    Ok(json!({
        "PackageName": resolve(pool, asset.package_name)?,
        "PackagePath": resolve(pool, asset.package_path)?,
        "AssetName": resolve(pool, asset.asset_name)?,
        "AssetClass": asset_class,
        "HasNumberlessTags": asset.tags.has_numberless_keys,
        "TagsAndValues": encode_tags(store, pool, asset.tags)?,
        "Bundles": bundles?,
        "PackageFlags": asset.package_flags,
        "ChunkIds": asset.chunk_ids,
        "OldObjectPath": match asset.old_object_path { Some(n) => Json::String(resolve(pool, n)?), None => Json::Null },
        "OptionalOuterPath": match asset.optional_outer_path { Some(n) => Json::String(resolve(pool, n)?), None => Json::Null },
    }))
}

fn decode_asset(pool: &mut NamePool, store: &mut Store, doc: &Json, version: AssetRegistryVersion) -> Result<AssetData> {
    let package_name = pool.intern(doc["PackageName"].as_str().unwrap_or_default());
    let package_path = pool.intern(doc["PackagePath"].as_str().unwrap_or_default());
    let asset_name = pool.intern(doc["AssetName"].as_str().unwrap_or_default());
    let asset_class_str = doc["AssetClass"].as_str().unwrap_or_default();
    let asset_class = if version >= AssetRegistryVersion::ClassPaths {
        let (package, asset) = parse_top_level_asset_path(asset_class_str)?;
        AssetClass::Path(TopLevelAssetPath {
            package: pool.intern(package),
            asset: pool.intern(asset),
        })
    } else {
        AssetClass::Legacy(pool.intern(asset_class_str))
    };
    let has_numberless_keys = doc["HasNumberlessTags"].as_bool().unwrap_or(false);
    let tags = decode_tags(store, pool, &doc["TagsAndValues"], has_numberless_keys)?;
    let bundles = doc["Bundles"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|b| decode_bundle(pool, b))
        .collect::<Result<Vec<_>>>()?;
    let chunk_ids = doc["ChunkIds"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(Json::as_i64)
        .map(|v| v as i32)
        .collect();
    let package_flags = doc["PackageFlags"].as_u64().unwrap_or(0) as u32;
    let old_object_path = doc.get("OldObjectPath").and_then(Json::as_str).map(|s| pool.intern(s));
    let optional_outer_path = doc
        .get("OptionalOuterPath")
        .and_then(Json::as_str)
        .map(|s| pool.intern(s));

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

pub fn encode(registry: &AssetRegistry) -> Result<Json> {
    let assets: Result<Vec<Json>> = registry
        .assets
        .iter()
        .map(|a| encode_asset(&registry.pool, &registry.store, a))
        .collect();
    let dependencies: Result<Vec<Json>> = registry
        .dependencies
        .iter()
        .map(|d| {
            Ok(json!({
                "Identifier": encode_identifier(&registry.pool, &d.identifier)?,
                "Package": encode_dependency_list(&d.package),
                "Name": encode_dependency_list(&d.name),
                "Manage": d.manage.as_ref().map(encode_dependency_list),
                "Referencer": encode_dependency_list(&d.referencer),
            }))
        })
        .collect();
    let packages: Result<Vec<Json>> = registry
        .packages
        .iter()
        .map(|p| encode_package(&registry.pool, p))
        .collect();

    Ok(json!({
        "Header": {
            "VersionGUID": registry.header.guid.0,
            "VersionNumber": registry.header.version.as_u32(),
            "FilterEditorOnly": registry.header.filter_editor_only,
        },
        "State": {
            "Assets": assets?,
            "Dependencies": dependencies?,
            "Packages": packages?,
            "Options": {
                "TextTagsFirst": registry.store.text_first,
            },
        },
    }))
}

pub fn decode(doc: &Json, archive: ArchiveType) -> Result<AssetRegistry> {
    let header_doc = &doc["Header"];
    let guid_parts: Vec<u32> = header_doc["VersionGUID"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(Json::as_u64)
        .map(|v| v as u32)
        .collect();
    let guid = crate::primitives::Guid([
        *guid_parts.first().unwrap_or(&0),
        *guid_parts.get(1).unwrap_or(&0),
        *guid_parts.get(2).unwrap_or(&0),
        *guid_parts.get(3).unwrap_or(&0),
    ]);
    let version = AssetRegistryVersion::from_u32(header_doc["VersionNumber"].as_u64().unwrap_or(0) as u32);
    let filter_editor_only = header_doc["FilterEditorOnly"].as_bool().unwrap_or(false);

    let state = &doc["State"];
    let text_first = state["Options"]["TextTagsFirst"].as_bool().unwrap_or(true);

    let mut pool = NamePool::new();
    let mut store = Store::new();
    store.text_first = text_first;

    let assets = state["Assets"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|a| decode_asset(&mut pool, &mut store, a, version))
        .collect::<Result<Vec<_>>>()?;

    let dependencies = state["Dependencies"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|d| {
            Ok(DependencyRecord {
                identifier: decode_identifier(&mut pool, &d["Identifier"]),
                package: decode_dependency_list(&d["Package"]),
                name: decode_dependency_list(&d["Name"]),
                manage: d.get("Manage").filter(|m| !m.is_null()).map(decode_dependency_list),
                referencer: decode_dependency_list(&d["Referencer"]),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let packages = state["Packages"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|p| decode_package(&mut pool, p, version))
        .collect();

    Ok(AssetRegistry {
        header: Header {
            guid,
            version,
            filter_editor_only,
        },
        archive,
        pool,
        store,
        assets,
        dependencies,
        packages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::TagMapHandle;

    #[test]
    fn tag_dedup_survives_textual_round_trip() {
        let mut registry = AssetRegistry {
            header: Header {
                guid: crate::primitives::Guid::default(),
                version: AssetRegistryVersion::LATEST,
                filter_editor_only: false,
            },
            archive: ArchiveType::AssetRegistry,
            pool: NamePool::new(),
            store: Store::new(),
            assets: vec![],
            dependencies: vec![],
            packages: vec![],
        };
        registry.store.text_first = true;

        let value = registry.store.insert_ansi_string("hello");
        let tag_key = registry.pool.intern("K");
        let tags_a = registry.store.register_pairs(vec![(tag_key, value)], false);
        let tags_b = registry.store.register_pairs(vec![(tag_key, value)], false);

        let mk_asset = |tags: TagMapHandle, pool: &mut NamePool| AssetData {
            old_object_path: None,
            package_path: pool.intern("/Game/Foo"),
            asset_class: AssetClass::Path(TopLevelAssetPath {
                package: pool.intern("/Script/Engine"),
                asset: pool.intern("StaticMesh"),
            }),
            package_name: pool.intern("/Game/Foo"),
            asset_name: pool.intern("Foo"),
            optional_outer_path: None,
            tags,
            bundles: vec![],
            chunk_ids: vec![],
            package_flags: 0,
        };
        registry.assets.push(mk_asset(tags_a, &mut registry.pool));
        registry.assets.push(mk_asset(tags_b, &mut registry.pool));

        let doc = encode(&registry).unwrap();
        let decoded = decode(&doc, ArchiveType::AssetRegistry).unwrap();

        assert_eq!(decoded.assets.len(), 2);
        let pairs_a = decoded.store.pairs_for(decoded.assets[0].tags).unwrap();
        let pairs_b = decoded.store.pairs_for(decoded.assets[1].tags).unwrap();
        assert_eq!(pairs_a[0].1, pairs_b[0].1); // re-inserted to the same value id
        match decoded.store.resolve(pairs_a[0].1).unwrap() {
            TagValue::AnsiString(s) => assert_eq!(s, "hello"),
            other => panic!("unexpected value {other:?}"),
        }
    }
}
