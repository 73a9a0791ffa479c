//! ephemeron-map: identity-keyed WeakMap/WeakSet tables whose entries
//! disappear once their key object is reclaimed.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep ordinary hash-table guarantees (O(1) lookup, deterministic
//!   upsert/delete) while keys are reclaimed out from under the table by a
//!   collector the table does not control.
//! - Layers:
//!   - IdentityHasher: lazily assigns a stable `IdentityHash` per object in
//!     a side table keyed by the generational `ObjectId`.
//!   - WeakTable<V>: `SlotMap` storage plus a `HashTable` index; probes by
//!     identity only. Knows nothing about reachability.
//!   - Heap: object arena, per-object root counts, and the mark/sweep
//!     reclamation pass with ephemeron marking.
//!   - WeakMap/WeakSet: receiver and key validation, read paths that never
//!     assign hashes, write paths that do.
//!   - construct: drains a single-pass source through an explicitly passed
//!     insertion routine.
//!   - Realm: installs built-ins through `PropertyInstaller` and dispatches
//!     methods via prototypes, which is what makes `set`/`add` overridable
//!     during construction.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` throughout (`Rc`, `RefCell`, `Cell`).
//! - An `ObjectRef` is a root; values stored inside the heap are not.
//! - Identities are never reissued, so a dead entry that has not been
//!   purged yet can never match a probe.
//! - Errors are raised before a table is mutated.
//!
//! Reclamation
//! - Runs on `Heap::collect`, or every `HeapConfig::gc_interval`
//!   allocations. Without a tracing collector in the host, this explicit
//!   pass stands in for asynchronous collection: entries for dead keys are
//!   purged at the next pass, never resurrected.
//! - A weak-map value is traced only through a marked key, so a value that
//!   refers back to its own key does not keep that key alive.
//!
//! Notes and non-goals
//! - Not a general-purpose GC: there are no finalizers and no object
//!   properties beyond what the built-ins need.
//! - Subclassing of weak collections is not modeled; prototype-level
//!   redefinition is the only dispatch hook.

pub mod array_buffer;
pub mod construct;
mod error;
mod heap;
pub mod identity_hash;
mod realm;
mod reentrancy;
mod tokens;
mod value;
mod weak_collection;
pub mod weak_table;

// Public surface
pub use error::{Error, Result};
pub use heap::{ArrayIter, CollectStats, Heap, HeapConfig, Kind, ObjectId};
pub use identity_hash::{IdentityHash, IdentityHasher};
pub use realm::{
    native, Attributes, Intrinsic, Invocation, NativeFn, Property, PropertyInstaller, PropertySlot,
    Realm, Target, TO_STRING_TAG,
};
pub use value::{ObjectRef, Value};
pub use weak_collection::{
    weak_map_delete, weak_map_get, weak_map_has, weak_map_set, weak_set_add, weak_set_delete,
    weak_set_has, WeakMap, WeakSet,
};
pub use weak_table::WeakTable;
