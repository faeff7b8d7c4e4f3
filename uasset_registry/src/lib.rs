//! Bidirectional binary/textual codec for a game engine's asset registry
//! file format.
//!
//! [`registry::AssetRegistry`] is the entry point: [`registry::AssetRegistry::read`]
//! and [`registry::AssetRegistry::write`] handle the binary wire format,
//! while [`textual::encode`] and [`textual::decode`] project the same model
//! to and from a `serde_json::Value` document.

pub mod error;
pub mod identifiers;
pub mod name_batch;
pub mod name_pool;
pub mod primitives;
pub mod records;
pub mod registry;
pub mod tag_store;
pub mod textual;
pub mod version;

pub use error::{Error, Result};
pub use registry::AssetRegistry;
pub use version::AssetRegistryVersion;
