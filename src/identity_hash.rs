//! IdentityHasher: lazily assigned, per-object identity hashes.
//!
//! Objects carry no hash field. The hasher keeps a side table keyed by the
//! object's generational [`ObjectId`], so tagging an object never touches
//! the object itself and a reclaimed identity can never inherit the hash of
//! a previous occupant of its slot.

use crate::heap::ObjectId;
use slotmap::SecondaryMap;

/// Per-object identity hash. Stable for the lifetime of the identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct IdentityHash(u32);

impl IdentityHash {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Spread into the 64-bit form the index table probes with.
    #[inline]
    pub(crate) fn bucket(self) -> u64 {
        u64::from(self.0).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        IdentityHash(raw)
    }
}

/// Owns the hash counter and the identity → hash side table.
#[derive(Debug)]
pub struct IdentityHasher {
    seed: u32,
    next: u32,
    hashes: SecondaryMap<ObjectId, IdentityHash>,
}

impl IdentityHasher {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            next: 0,
            hashes: SecondaryMap::new(),
        }
    }

    /// Return the hash of `id`, assigning one on first use.
    ///
    /// Assignment is permanent for the identity, so only write paths call
    /// this.
    pub fn get_hash(&mut self, id: ObjectId) -> IdentityHash {
        if let Some(&h) = self.hashes.get(id) {
            return h;
        }
        let h = IdentityHash(mix(self.seed.wrapping_add(self.next)));
        self.next = self.next.wrapping_add(1);
        self.hashes.insert(id, h);
        tracing::trace!(?id, hash = h.0, "assigned identity hash");
        h
    }

    /// Return the hash of `id` if one was ever assigned. Never assigns.
    pub fn get_existing_hash(&self, id: ObjectId) -> Option<IdentityHash> {
        self.hashes.get(id).copied()
    }

    /// Drop the record for a reclaimed identity.
    pub(crate) fn forget(&mut self, id: ObjectId) {
        self.hashes.remove(id);
    }

    /// Number of identities currently carrying a hash.
    pub fn tagged(&self) -> usize {
        self.hashes.len()
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(0)
    }
}

// Bijective on u32: distinct counter values give distinct hashes.
#[inline]
fn mix(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}
