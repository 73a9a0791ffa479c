//! Bulk population of weak collections from a single-pass source.
//!
//! The insertion routine is an explicit parameter. The `WeakMap` and
//! `WeakSet` constructors resolve it from the receiver's prototype once,
//! before the first item is consumed, so an overridden `set`/`add` sees
//! every item.

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::realm::{Invocation, Realm};
use crate::value::Value;

/// Key and value of one WeakMap construction item.
fn entry_pair(heap: &Heap, item: &Value) -> Result<(Value, Value)> {
    match (heap.element(item, 0), heap.element(item, 1)) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(Error::TypeMismatch {
            item: heap.describe(item),
        }),
    }
}

/// Feed each `[key, value]` item of `items` to `adder`.
///
/// Stops at the first error; items after it are not consumed.
pub fn populate_map<I, F>(heap: &Heap, this: &Value, items: I, mut adder: F) -> Result<()>
where
    I: IntoIterator<Item = Value>,
    F: FnMut(&Heap, &Value, Value, Value) -> Result<()>,
{
    for item in items {
        let (key, value) = entry_pair(heap, &item)?;
        adder(heap, this, key, value)?;
    }
    Ok(())
}

/// Feed each item of `items` to `adder`.
pub fn populate_set<I, F>(heap: &Heap, this: &Value, items: I, mut adder: F) -> Result<()>
where
    I: IntoIterator<Item = Value>,
    F: FnMut(&Heap, &Value, Value) -> Result<()>,
{
    for item in items {
        adder(heap, this, item)?;
    }
    Ok(())
}

/// `new WeakMap(iterable)`.
pub(crate) fn weak_map(realm: &Realm, invocation: Invocation, iterable: &Value) -> Result<Value> {
    invocation.require_construct("WeakMap")?;
    let heap = realm.heap();
    let this = Value::Object(heap.alloc_weak_map());
    if iterable.is_nullish() {
        return Ok(this);
    }
    let adder = realm.bound_method(&this, "set")?;
    let items = heap.iterate(iterable)?;
    populate_map(heap, &this, items, |heap, this, key, value| {
        adder(heap, this, &[key, value]).map(drop)
    })?;
    Ok(this)
}

/// `new WeakSet(iterable)`.
pub(crate) fn weak_set(realm: &Realm, invocation: Invocation, iterable: &Value) -> Result<Value> {
    invocation.require_construct("WeakSet")?;
    let heap = realm.heap();
    let this = Value::Object(heap.alloc_weak_set());
    if iterable.is_nullish() {
        return Ok(this);
    }
    let adder = realm.bound_method(&this, "add")?;
    let items = heap.iterate(iterable)?;
    populate_set(heap, &this, items, |heap, this, value| {
        adder(heap, this, &[value]).map(drop)
    })?;
    Ok(this)
}
