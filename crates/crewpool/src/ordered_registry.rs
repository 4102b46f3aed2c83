//! A small ordered key/value registry.
//!
//! This is the Rust shape of the sorted map in `examples/original_source/map.h`:
//! insert-by-key, find-with-an-operator-that-may-remove-the-entry, and a
//! remove-all sweep. `BTreeMap` already gives us ordered iteration and O(log n)
//! lookup, so there is no need to hand-roll the original's tree; the registry
//! here is a thin, purpose-built wrapper rather than a general map adapter.

use std::collections::BTreeMap;

/// The decision an operator callback makes about the entry it was handed.
/// The callback receives the entry by value, so `Keep` must hand it back.
pub(crate) enum Disposition<R, V> {
    /// Put `V` back into the registry, return `R` to the caller.
    Keep(R, V),
    /// Drop `V`, return `R` to the caller.
    Remove(R),
}

/// An ordered registry of `K -> V`, keyed for deterministic (lowest-key-first)
/// traversal. Every method takes `&mut self`; callers are expected to hold
/// whatever outer lock protects concurrent access (the pool mutex, in every
/// caller of this type).
pub(crate) struct OrderedRegistry<K: Ord + Copy, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord + Copy, V> OrderedRegistry<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Inserts `value` under `key`. Panics (in debug builds, via `debug_assert`)
    /// if `key` is already present: callers are expected to generate keys that
    /// cannot collide (see `ContinuationUid`, `TaskId`).
    pub(crate) fn insert(&mut self, key: K, value: V) {
        let previous = self.entries.insert(key, value);
        debug_assert!(previous.is_none(), "registry key collision");
    }

    /// Looks up `key` and hands the entry to `op` by value, which decides
    /// whether the entry survives. Returns `None` if `key` was absent.
    pub(crate) fn find_and<R>(
        &mut self,
        key: K,
        op: impl FnOnce(V) -> Disposition<R, V>,
    ) -> Option<R> {
        let value = self.entries.remove(&key)?;
        match op(value) {
            Disposition::Keep(r, v) => {
                self.entries.insert(key, v);
                Some(r)
            }
            Disposition::Remove(r) => Some(r),
        }
    }

    /// Removes every entry, in ascending key order, handing each to `f`.
    pub(crate) fn drain_all(&mut self, mut f: impl FnMut(K, V)) {
        while let Some((&key, _)) = self.entries.iter().next() {
            let value = self.entries.remove(&key).expect("key just observed");
            f(key, value);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
