//! Deduplicating store of interned identifiers ("names").
//!
//! Every identifier appears exactly once here; everywhere else in the model
//! it is referenced by a dense [`Name`] index plus an optional numeric
//! suffix. The pool never shrinks and never rewrites an existing entry.

use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    /// Splits a trailing `___<digits>` suffix off a display string. The base
    /// is matched non-greedily so `"foo___1___2"` splits as base `"foo___1"`,
    /// suffix `2` — only the final `___<digits>` is a suffix.
    static ref SUFFIX: Regex = Regex::new(r"^(.*?)___(\d+)$").unwrap();
}

/// An interned identifier: a dense index into a [`NamePool`] plus an
/// optional numeric suffix. `number == 0` means "no suffix"; otherwise the
/// display form appends `"___{number - 1}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Name {
    pub index: u32,
    pub number: u32,
}

impl Name {
    pub fn new(index: u32, number: u32) -> Self {
        Name { index, number }
    }
}

/// One entry in the pool: the base identifier text and whether it must be
/// encoded as wide (UTF-16) text on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIdentifier {
    pub payload: String,
    pub is_wide: bool,
}

impl StoredIdentifier {
    fn new(payload: String) -> Self {
        let is_wide = !payload.is_ascii();
        StoredIdentifier { payload, is_wide }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamePool {
    entries: IndexSet<String>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn stored(&self, index: u32) -> Result<StoredIdentifier> {
        let base = self
            .entries
            .get_index(index as usize)
            .ok_or_else(|| Error::offset_out_of_range("name pool index", index as u64, self.entries.len() as u64))?;
        Ok(StoredIdentifier::new(base.clone()))
    }

    /// Appends a base identifier (no suffix) if not already present and
    /// returns its dense index.
    pub fn intern_base(&mut self, base: &str) -> u32 {
        if let Some(i) = self.entries.get_index_of(base) {
            return i as u32;
        }
        let (i, _) = self.entries.insert_full(base.to_string());
        i as u32
    }

    /// Splits off a trailing `___<digits>` suffix, interns the base, and
    /// returns the full [`Name`].
    pub fn intern(&mut self, display: &str) -> Name {
        let (base, number) = split_suffix(display);
        let index = self.intern_base(base);
        Name::new(index, number)
    }

    /// Resolves a [`Name`] back to its display string, re-appending the
    /// numeric suffix if present.
    pub fn resolve(&self, name: Name) -> Result<String> {
        let stored = self.stored(name.index)?;
        Ok(with_suffix(&stored.payload, name.number))
    }
}

/// 64-bit content hash used for the name-pool hash index and the name batch
/// wire format's advisory per-entry hashes. Hashing is always performed on
/// the lowercased base text.
pub fn hash_display(base: &str) -> u64 {
    cityhasher::hash(base.to_lowercase().as_bytes())
}

fn split_suffix(display: &str) -> (&str, u32) {
    if let Some(caps) = SUFFIX.captures(display) {
        let base = caps.get(1).unwrap().as_str();
        let digits = caps.get(2).unwrap().as_str();
        if let Ok(n) = digits.parse::<u32>() {
            return (base, n + 1);
        }
    }
    (display, 0)
}

fn with_suffix(base: &str, number: u32) -> String {
    if number == 0 {
        base.to_string()
    } else {
        format!("{base}___{}", number - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = NamePool::new();
        let a = pool.intern("Foo");
        let b = pool.intern("Foo");
        assert_eq!(a, b);
        assert_eq!(pool.resolve(a).unwrap(), "Foo");
    }

    #[test]
    fn suffix_round_trips() {
        let mut pool = NamePool::new();
        let name = pool.intern("Bar___2");
        assert_eq!(name.number, 3);
        assert_eq!(pool.resolve(name).unwrap(), "Bar___2");
        let (base, _) = split_suffix("Bar___2");
        assert_eq!(base, "Bar");
    }

    #[test]
    fn plain_name_has_no_number() {
        let mut pool = NamePool::new();
        let name = pool.intern("NoSuffixHere");
        assert_eq!(name.number, 0);
        assert_eq!(pool.resolve(name).unwrap(), "NoSuffixHere");
    }

    #[test]
    fn resolving_out_of_range_index_is_an_error() {
        let pool = NamePool::new();
        assert!(pool.resolve(Name::new(0, 0)).is_err());
    }
}
