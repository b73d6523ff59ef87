//! Process-level, thread-safe string interner (spec §4.2).
//!
//! Ids are dense, assigned in first-seen order; insertion order is part of
//! the contract because the table engine sorts name columns by it rather
//! than lexicographically (spec §4.7, testable property 10).

use std::collections::HashMap;
use std::sync::RwLock;

use dashmap::DashMap;
use traceview_common::StringId;

#[derive(Default)]
struct InternerInner {
    strings: Vec<String>,
    ids: HashMap<String, StringId>,
}

/// Many-readers, rare-writers string table. Matches the teacher's choice of
/// `std::sync::RwLock` for shared state rather than a third-party lock crate.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(InternerInner::default()),
        }
    }

    /// Interns `s`, returning its dense id. Returns the existing id if `s`
    /// was seen before.
    pub fn intern(&self, s: &str) -> StringId {
        if let Some(id) = self.inner.read().unwrap().ids.get(s) {
            return *id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(id) = inner.ids.get(s) {
            return *id;
        }
        let id = StringId::new(inner.strings.len() as u64);
        inner.strings.push(s.to_string());
        inner.ids.insert(s.to_string(), id);
        id
    }

    pub fn resolve(&self, id: StringId) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .strings
            .get(id.get() as usize)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Which store-side schema variant produced a string id, so the correct
/// remap path is picked per column instead of runtime string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    Rocpd,
    LegacyRocprof,
}

/// Remaps source-store string ids, which may be duplicated per agent, to
/// canonical interner ids. Backed by `DashMap` rather than a `Mutex`-guarded
/// `HashMap` so several per-category metadata-load tasks can remap
/// concurrently without serializing on one lock.
#[derive(Default)]
pub struct DbStringIdMap {
    map: DashMap<(SchemaVariant, u32), StringId>,
}

impl DbStringIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, variant: SchemaVariant, source_id: u32, canonical: StringId) {
        self.map.insert((variant, source_id), canonical);
    }

    pub fn remap(&self, variant: SchemaVariant, source_id: u32) -> Option<StringId> {
        self.map.get(&(variant, source_id)).map(|entry| *entry)
    }

    /// Resolve-or-intern: the common call-site pattern during metadata load
    /// — remap if we've seen `(variant, source_id)` before, otherwise intern
    /// `raw` fresh and remember the mapping.
    pub fn resolve_or_intern(
        &self,
        interner: &StringInterner,
        variant: SchemaVariant,
        source_id: u32,
        raw: &str,
    ) -> StringId {
        if let Some(id) = self.remap(variant, source_id) {
            return id;
        }
        let id = interner.intern(raw);
        self.insert(variant, source_id, id);
        id
    }
}
