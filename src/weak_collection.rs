//! WeakMap and WeakSet facades over [`WeakTable`].
//!
//! Read paths (`get`, `has`, `delete`) only ever probe for an existing
//! identity hash, so looking up an object never tags it. Write paths (`set`,
//! `add`) assign the hash and reject non-object keys before touching the
//! table.
//!
//! The `weak_map_*` / `weak_set_*` functions are the installed methods: they
//! take an arbitrary receiver and check its kind. [`WeakMap`] and
//! [`WeakSet`] are typed handles whose receiver is known to be right.

use crate::construct;
use crate::error::{Error, Result};
use crate::heap::{Body, Heap, Kind};
use crate::realm::{arg, native, Attributes, Intrinsic, PropertyInstaller, Target, TO_STRING_TAG};
use crate::value::{ObjectRef, Stored, Value};
use crate::weak_table::WeakTable;

fn with_map<R>(heap: &Heap, map: &ObjectRef, f: impl FnOnce(&WeakTable<Stored>) -> R) -> R {
    heap.with_body(map, |b| match b {
        Body::WeakMap(t) => f(t),
        other => panic!("receiver checked as WeakMap, found {other:?}"),
    })
}

fn with_map_mut<R>(heap: &Heap, map: &ObjectRef, f: impl FnOnce(&mut WeakTable<Stored>) -> R) -> R {
    heap.with_body_mut(map, |b| match b {
        Body::WeakMap(t) => f(t),
        other => panic!("receiver checked as WeakMap, found {other:?}"),
    })
}

fn with_set<R>(heap: &Heap, set: &ObjectRef, f: impl FnOnce(&WeakTable<()>) -> R) -> R {
    heap.with_body(set, |b| match b {
        Body::WeakSet(t) => f(t),
        other => panic!("receiver checked as WeakSet, found {other:?}"),
    })
}

fn with_set_mut<R>(heap: &Heap, set: &ObjectRef, f: impl FnOnce(&mut WeakTable<()>) -> R) -> R {
    heap.with_body_mut(set, |b| match b {
        Body::WeakSet(t) => f(t),
        other => panic!("receiver checked as WeakSet, found {other:?}"),
    })
}

/// Key object of a read path, if it can possibly be in a table of `heap`.
fn probe_key<'v>(heap: &Heap, key: &'v Value) -> Option<&'v ObjectRef> {
    key.as_object().filter(|k| heap.owns(k))
}

fn map_get(heap: &Heap, map: &ObjectRef, key: &Value) -> Value {
    let Some(key) = probe_key(heap, key) else {
        return Value::Undefined;
    };
    let Some(hash) = heap.get_existing_hash(key) else {
        return Value::Undefined;
    };
    match with_map(heap, map, |t| t.lookup(key.id(), hash).cloned()) {
        Some(stored) => heap.load(&stored),
        None => Value::Undefined,
    }
}

fn map_set(heap: &Heap, map: &ObjectRef, key: &Value, value: &Value) -> Result<()> {
    let Some(key) = key.as_object() else {
        return Err(Error::InvalidKey {
            usage: "as weak map key",
        });
    };
    let hash = heap.get_hash(key);
    let stored = heap.store(value);
    let replaced = with_map_mut(heap, map, |t| t.insert(key.id(), hash, stored));
    tracing::trace!(key = ?key.id(), replaced = replaced.is_some(), "weak map set");
    Ok(())
}

fn map_has(heap: &Heap, map: &ObjectRef, key: &Value) -> bool {
    let Some(key) = probe_key(heap, key) else {
        return false;
    };
    match heap.get_existing_hash(key) {
        Some(hash) => with_map(heap, map, |t| t.contains(key.id(), hash)),
        None => false,
    }
}

fn map_delete(heap: &Heap, map: &ObjectRef, key: &Value) -> bool {
    let Some(key) = probe_key(heap, key) else {
        return false;
    };
    match heap.get_existing_hash(key) {
        Some(hash) => with_map_mut(heap, map, |t| t.remove(key.id(), hash)),
        None => false,
    }
}

fn set_add(heap: &Heap, set: &ObjectRef, value: &Value) -> Result<()> {
    let Some(key) = value.as_object() else {
        return Err(Error::InvalidKey {
            usage: "in weak set",
        });
    };
    let hash = heap.get_hash(key);
    with_set_mut(heap, set, |t| t.insert(key.id(), hash, ()));
    tracing::trace!(key = ?key.id(), "weak set add");
    Ok(())
}

fn set_has(heap: &Heap, set: &ObjectRef, value: &Value) -> bool {
    let Some(key) = probe_key(heap, value) else {
        return false;
    };
    match heap.get_existing_hash(key) {
        Some(hash) => with_set(heap, set, |t| t.contains(key.id(), hash)),
        None => false,
    }
}

fn set_delete(heap: &Heap, set: &ObjectRef, value: &Value) -> bool {
    let Some(key) = probe_key(heap, value) else {
        return false;
    };
    match heap.get_existing_hash(key) {
        Some(hash) => with_set_mut(heap, set, |t| t.remove(key.id(), hash)),
        None => false,
    }
}

/// `WeakMap.prototype.get`.
pub fn weak_map_get(heap: &Heap, this: &Value, key: &Value) -> Result<Value> {
    let map = heap.receiver(this, Kind::WeakMap, "WeakMap.prototype.get")?;
    Ok(map_get(heap, map, key))
}

/// `WeakMap.prototype.set`. Returns the receiver.
pub fn weak_map_set(heap: &Heap, this: &Value, key: &Value, value: &Value) -> Result<Value> {
    let map = heap.receiver(this, Kind::WeakMap, "WeakMap.prototype.set")?;
    map_set(heap, map, key, value)?;
    Ok(this.clone())
}

/// `WeakMap.prototype.has`.
pub fn weak_map_has(heap: &Heap, this: &Value, key: &Value) -> Result<bool> {
    let map = heap.receiver(this, Kind::WeakMap, "WeakMap.prototype.has")?;
    Ok(map_has(heap, map, key))
}

/// `WeakMap.prototype.delete`.
pub fn weak_map_delete(heap: &Heap, this: &Value, key: &Value) -> Result<bool> {
    let map = heap.receiver(this, Kind::WeakMap, "WeakMap.prototype.delete")?;
    Ok(map_delete(heap, map, key))
}

/// `WeakSet.prototype.add`. Returns the receiver.
pub fn weak_set_add(heap: &Heap, this: &Value, value: &Value) -> Result<Value> {
    let set = heap.receiver(this, Kind::WeakSet, "WeakSet.prototype.add")?;
    set_add(heap, set, value)?;
    Ok(this.clone())
}

/// `WeakSet.prototype.has`.
pub fn weak_set_has(heap: &Heap, this: &Value, value: &Value) -> Result<bool> {
    let set = heap.receiver(this, Kind::WeakSet, "WeakSet.prototype.has")?;
    Ok(set_has(heap, set, value))
}

/// `WeakSet.prototype.delete`.
pub fn weak_set_delete(heap: &Heap, this: &Value, value: &Value) -> Result<bool> {
    let set = heap.receiver(this, Kind::WeakSet, "WeakSet.prototype.delete")?;
    Ok(set_delete(heap, set, value))
}

/// Install both prototypes' methods and tags.
pub fn install<I: PropertyInstaller + ?Sized>(installer: &mut I) {
    let tag_attrs = Attributes::DONT_ENUM | Attributes::READ_ONLY;

    let proto = Target::Prototype(Intrinsic::WeakMap);
    installer.add_named_property(proto, TO_STRING_TAG, Value::string("WeakMap"), tag_attrs);
    installer.install_functions(
        proto,
        Attributes::DONT_ENUM,
        vec![
            ("get", native(|heap, this, args| weak_map_get(heap, this, &arg(args, 0)))),
            (
                "set",
                native(|heap, this, args| weak_map_set(heap, this, &arg(args, 0), &arg(args, 1))),
            ),
            (
                "has",
                native(|heap, this, args| weak_map_has(heap, this, &arg(args, 0)).map(Value::Bool)),
            ),
            (
                "delete",
                native(|heap, this, args| {
                    weak_map_delete(heap, this, &arg(args, 0)).map(Value::Bool)
                }),
            ),
        ],
    );

    let proto = Target::Prototype(Intrinsic::WeakSet);
    installer.add_named_property(proto, TO_STRING_TAG, Value::string("WeakSet"), tag_attrs);
    installer.install_functions(
        proto,
        Attributes::DONT_ENUM,
        vec![
            ("add", native(|heap, this, args| weak_set_add(heap, this, &arg(args, 0)))),
            (
                "has",
                native(|heap, this, args| weak_set_has(heap, this, &arg(args, 0)).map(Value::Bool)),
            ),
            (
                "delete",
                native(|heap, this, args| {
                    weak_set_delete(heap, this, &arg(args, 0)).map(Value::Bool)
                }),
            ),
        ],
    );
}

/// Typed handle to a WeakMap object.
#[derive(Clone, Debug)]
pub struct WeakMap {
    heap: Heap,
    map: ObjectRef,
}

impl WeakMap {
    pub fn new(heap: &Heap) -> Self {
        Self {
            heap: heap.clone(),
            map: heap.alloc_weak_map(),
        }
    }

    /// Build from `(key, value)` pair arrays using the built-in `set`.
    pub fn from_entries<I>(heap: &Heap, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let map = Self::new(heap);
        let this = map.to_value();
        construct::populate_map(heap, &this, entries, |heap, this, key, value| {
            weak_map_set(heap, this, &key, &value).map(drop)
        })?;
        Ok(map)
    }

    /// Wrap `v` if it is a WeakMap of `heap`.
    pub fn from_value(heap: &Heap, v: &Value) -> Option<Self> {
        let map = v.as_object().filter(|o| heap.owns(o))?;
        (heap.kind(v) == Some(Kind::WeakMap)).then(|| Self {
            heap: heap.clone(),
            map: map.clone(),
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.map.clone())
    }

    /// Stored value, or `Value::Undefined` when absent.
    pub fn get(&self, key: &Value) -> Value {
        map_get(&self.heap, &self.map, key)
    }

    pub fn set(&self, key: &Value, value: &Value) -> Result<()> {
        map_set(&self.heap, &self.map, key, value)
    }

    pub fn has(&self, key: &Value) -> bool {
        map_has(&self.heap, &self.map, key)
    }

    pub fn delete(&self, key: &Value) -> bool {
        map_delete(&self.heap, &self.map, key)
    }

    /// Physical entry count, see [`Heap::weak_entry_count`].
    pub fn entry_count(&self) -> usize {
        with_map(&self.heap, &self.map, WeakTable::len)
    }
}

/// Typed handle to a WeakSet object.
#[derive(Clone, Debug)]
pub struct WeakSet {
    heap: Heap,
    set: ObjectRef,
}

impl WeakSet {
    pub fn new(heap: &Heap) -> Self {
        Self {
            heap: heap.clone(),
            set: heap.alloc_weak_set(),
        }
    }

    /// Build from values using the built-in `add`.
    pub fn from_values<I>(heap: &Heap, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let set = Self::new(heap);
        let this = set.to_value();
        construct::populate_set(heap, &this, values, |heap, this, value| {
            weak_set_add(heap, this, &value).map(drop)
        })?;
        Ok(set)
    }

    pub fn from_value(heap: &Heap, v: &Value) -> Option<Self> {
        let set = v.as_object().filter(|o| heap.owns(o))?;
        (heap.kind(v) == Some(Kind::WeakSet)).then(|| Self {
            heap: heap.clone(),
            set: set.clone(),
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.set.clone())
    }

    pub fn add(&self, value: &Value) -> Result<()> {
        set_add(&self.heap, &self.set, value)
    }

    pub fn has(&self, value: &Value) -> bool {
        set_has(&self.heap, &self.set, value)
    }

    pub fn delete(&self, value: &Value) -> bool {
        set_delete(&self.heap, &self.set, value)
    }

    pub fn entry_count(&self) -> usize {
        with_set(&self.heap, &self.set, WeakTable::len)
    }
}
