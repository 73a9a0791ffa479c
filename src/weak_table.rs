//! WeakTable: identity-keyed storage behind every WeakMap and WeakSet.
//!
//! Entries live in a generational `SlotMap`; a `HashTable` index maps the
//! precomputed bucket of each entry's identity hash to its slot. Probing
//! compares identities only, never values, and never calls user code.
//!
//! The table does not know about reachability. The heap's reclamation pass
//! traces live entries through [`WeakTable::iter`] and purges dead ones with
//! [`WeakTable::retain_live`]. Between passes a dead entry may still occupy a
//! slot, but it cannot be observed: a probe needs the key's identity, a key
//! can only be presented while rooted, and identities are never reissued.

use crate::heap::ObjectId;
use crate::identity_hash::IdentityHash;
use crate::reentrancy::{DebugReentrancy, Section};
use hashbrown::hash_table::Entry as IndexEntry;
use hashbrown::HashTable;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    struct EntryKey;
}

#[derive(Debug)]
struct Entry<V> {
    key: ObjectId,
    value: V,
    hash: IdentityHash,
}

pub struct WeakTable<V> {
    index: HashTable<EntryKey>,
    slots: SlotMap<EntryKey, Entry<V>>,
    reentrancy: DebugReentrancy,
}

impl<V> Default for WeakTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: core::fmt::Debug> core::fmt::Debug for WeakTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.slots.values().map(|e| (e.key, &e.value)))
            .finish()
    }
}

impl<V> WeakTable<V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
            reentrancy: DebugReentrancy::new(Section::WeakTable),
        }
    }

    /// Number of entries, including dead ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn probe(&self, key: ObjectId, hash: IdentityHash) -> Option<EntryKey> {
        self.index
            .find(hash.bucket(), |&k| {
                self.slots.get(k).map(|e| e.key == key).unwrap_or(false)
            })
            .copied()
    }

    /// Upsert. Returns the replaced value if `key` was already present.
    pub fn insert(&mut self, key: ObjectId, hash: IdentityHash, value: V) -> Option<V> {
        let _g = self.reentrancy.enter();
        match self.index.entry(
            hash.bucket(),
            |&k| self.slots.get(k).map(|e| e.key == key).unwrap_or(false),
            |&k| self.slots.get(k).map(|e| e.hash.bucket()).unwrap_or(0),
        ) {
            IndexEntry::Occupied(o) => {
                let entry = self
                    .slots
                    .get_mut(*o.get())
                    .expect("index points at a live slot");
                debug_assert_eq!(entry.hash, hash, "identity hash changed for a live key");
                Some(core::mem::replace(&mut entry.value, value))
            }
            IndexEntry::Vacant(v) => {
                let k = self.slots.insert(Entry { key, value, hash });
                let _ = v.insert(k);
                None
            }
        }
    }

    pub fn lookup(&self, key: ObjectId, hash: IdentityHash) -> Option<&V> {
        let _g = self.reentrancy.enter();
        let k = self.probe(key, hash)?;
        self.slots.get(k).map(|e| &e.value)
    }

    pub fn contains(&self, key: ObjectId, hash: IdentityHash) -> bool {
        let _g = self.reentrancy.enter();
        self.probe(key, hash).is_some()
    }

    /// Returns true iff an entry existed and was removed.
    pub fn remove(&mut self, key: ObjectId, hash: IdentityHash) -> bool {
        let _g = self.reentrancy.enter();
        let slots = &self.slots;
        match self.index.find_entry(hash.bucket(), |&k| {
            slots.get(k).map(|e| e.key == key).unwrap_or(false)
        }) {
            Ok(occupied) => {
                let (k, _) = occupied.remove();
                self.slots.remove(k);
                true
            }
            Err(_) => false,
        }
    }

    /// All entries as `(key, value)`, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &V)> + '_ {
        self.slots.values().map(|e| (e.key, &e.value))
    }

    /// Drop every entry whose key fails `is_live`. Returns the number purged.
    pub(crate) fn retain_live<F>(&mut self, mut is_live: F) -> usize
    where
        F: FnMut(ObjectId) -> bool,
    {
        let _g = self.reentrancy.enter();
        let before = self.slots.len();
        self.slots.retain(|_, e| is_live(e.key));
        let slots = &self.slots;
        self.index.retain(|k| slots.contains_key(*k));
        before - self.slots.len()
    }
}
