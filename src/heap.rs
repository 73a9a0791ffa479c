//! Heap: object arena, root counting and the reclamation pass.
//!
//! Objects live in a generational `SlotMap`, so an [`ObjectId`] is never
//! handed out twice. Each object has a `RootCount` in a side map; Rust code
//! roots an object by holding an [`ObjectRef`]. Everything an object points
//! at is stored in the non-rooting `Stored` form and is only followed by
//! [`Heap::collect`].
//!
//! Reclamation is mark/sweep with ephemeron semantics: a weak-map value is
//! marked only once its key is marked, and marking repeats until no table
//! yields anything new. Sweep frees unmarked objects, purges weak entries
//! whose keys were freed and forgets their identity hashes. Collection runs
//! when the caller asks for it or, with [`HeapConfig::gc_interval`], at
//! allocation time, which is always between two program-visible operations.
//!
//! Borrow discipline: `objects` is only mutably borrowed for short,
//! self-contained steps that never create or drop an `ObjectRef`. Root
//! counts live in a separate cell so `ObjectRef` clone/drop never contends
//! with an object borrow.

use crate::error::{Error, Result};
use crate::identity_hash::{IdentityHash, IdentityHasher};
use crate::reentrancy::{DebugReentrancy, Section};
use crate::tokens::RootCount;
use crate::value::{ObjectRef, Stored, Value};
use crate::weak_table::WeakTable;
use core::cell::{Cell, RefCell};
use core::num::NonZeroUsize;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use std::rc::Rc;

new_key_type! {
    /// Opaque, stable identity of a heap object.
    pub struct ObjectId;
}

/// Internal kind of a heap object, used for receiver checks and dispatch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    Ordinary,
    Array,
    WeakMap,
    WeakSet,
    ArrayBuffer,
    /// A typed view over an `ArrayBuffer`.
    View,
}

impl Kind {
    pub fn class_name(self) -> &'static str {
        match self {
            Kind::Ordinary => "Object",
            Kind::Array => "Array",
            Kind::WeakMap => "WeakMap",
            Kind::WeakSet => "WeakSet",
            Kind::ArrayBuffer => "ArrayBuffer",
            Kind::View => "Uint8Array",
        }
    }
}

#[derive(Debug)]
pub(crate) enum Body {
    Ordinary,
    Array(Vec<Stored>),
    WeakMap(WeakTable<Stored>),
    WeakSet(WeakTable<()>),
    ArrayBuffer(Vec<u8>),
    View {
        buffer: ObjectId,
        offset: usize,
        length: usize,
    },
}

impl Body {
    fn kind(&self) -> Kind {
        match self {
            Body::Ordinary => Kind::Ordinary,
            Body::Array(_) => Kind::Array,
            Body::WeakMap(_) => Kind::WeakMap,
            Body::WeakSet(_) => Kind::WeakSet,
            Body::ArrayBuffer(_) => Kind::ArrayBuffer,
            Body::View { .. } => Kind::View,
        }
    }
}

/// Heap configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HeapConfig {
    /// Seed mixed into every identity hash.
    pub hash_seed: u32,
    /// Run a reclamation pass every this many allocations. `None` means
    /// only explicit [`Heap::collect`] calls reclaim.
    pub gc_interval: Option<NonZeroUsize>,
}

/// Counts reported by one reclamation pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CollectStats {
    pub marked: usize,
    pub swept: usize,
    /// Weak entries dropped because their key was swept.
    pub purged: usize,
}

pub(crate) struct HeapInner {
    objects: RefCell<SlotMap<ObjectId, Body>>,
    roots: RefCell<SecondaryMap<ObjectId, RootCount>>,
    hasher: RefCell<IdentityHasher>,
    config: HeapConfig,
    allocs_since_collect: Cell<usize>,
    collecting: DebugReentrancy,
}

impl HeapInner {
    pub(crate) fn root_count<R>(&self, id: ObjectId, f: impl FnOnce(&RootCount) -> R) -> R {
        let roots = self.roots.borrow();
        f(roots.get(id).expect("rooted object is never reclaimed"))
    }
}

/// Shared handle to one heap. Cloning shares the heap.
#[derive(Clone)]
pub struct Heap {
    inner: Rc<HeapInner>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Heap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("live_objects", &self.live_objects())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            inner: Rc::new(HeapInner {
                objects: RefCell::new(SlotMap::with_key()),
                roots: RefCell::new(SecondaryMap::new()),
                hasher: RefCell::new(IdentityHasher::new(config.hash_seed)),
                config,
                allocs_since_collect: Cell::new(0),
                collecting: DebugReentrancy::new(Section::Reclamation),
            }),
        }
    }

    pub fn config(&self) -> HeapConfig {
        self.inner.config
    }

    /// Objects currently in the arena, reachable or not.
    pub fn live_objects(&self) -> usize {
        self.inner.objects.borrow().len()
    }

    fn alloc(&self, body: Body) -> ObjectRef {
        self.inner.collecting.assert_outside("allocation");
        if let Some(interval) = self.inner.config.gc_interval {
            let n = self.inner.allocs_since_collect.get() + 1;
            if n >= interval.get() {
                self.collect();
            } else {
                self.inner.allocs_since_collect.set(n);
            }
        }
        let id = self.inner.objects.borrow_mut().insert(body);
        self.inner.roots.borrow_mut().insert(id, RootCount::new());
        ObjectRef::mint(self.inner.clone(), id)
    }

    pub fn alloc_object(&self) -> Value {
        Value::Object(self.alloc(Body::Ordinary))
    }

    /// Allocate an array holding `items`.
    pub fn alloc_array<I>(&self, items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
    {
        // `items` keeps every element rooted until the array exists.
        let items: Vec<Value> = items.into_iter().collect();
        let stored = items.iter().map(|v| self.store(v)).collect();
        let array = self.alloc(Body::Array(stored));
        drop(items);
        Value::Object(array)
    }

    /// Allocate an `ArrayBuffer` that takes ownership of `bytes`.
    pub fn alloc_buffer(&self, bytes: Vec<u8>) -> Value {
        Value::Object(self.alloc(Body::ArrayBuffer(bytes)))
    }

    /// Allocate a byte view over `buffer[offset..offset + length]`.
    pub fn alloc_view(&self, buffer: &Value, offset: usize, length: usize) -> Result<Value> {
        let buf = self.receiver(buffer, Kind::ArrayBuffer, "Uint8Array")?;
        let len = self.with_body(buf, |b| match b {
            Body::ArrayBuffer(bytes) => bytes.len(),
            _ => 0,
        });
        let end = offset.checked_add(length).ok_or(Error::InvalidBufferLength)?;
        if end > len {
            return Err(Error::InvalidBufferLength);
        }
        let view = self.alloc(Body::View {
            buffer: buf.id(),
            offset,
            length,
        });
        Ok(Value::Object(view))
    }

    pub(crate) fn alloc_weak_map(&self) -> ObjectRef {
        self.alloc(Body::WeakMap(WeakTable::new()))
    }

    pub(crate) fn alloc_weak_set(&self) -> ObjectRef {
        self.alloc(Body::WeakSet(WeakTable::new()))
    }

    /// True if `obj` was allocated by this heap.
    pub(crate) fn owns(&self, obj: &ObjectRef) -> bool {
        obj.belongs_to(&self.inner)
    }

    /// Internal kind of `v`, or `None` for primitives and objects of another heap.
    pub fn kind(&self, v: &Value) -> Option<Kind> {
        let obj = v.as_object().filter(|o| self.owns(o))?;
        Some(self.with_body(obj, Body::kind))
    }

    /// Short description used in error messages, e.g. `#<WeakMap>`.
    pub fn describe(&self, v: &Value) -> String {
        match self.kind(v) {
            Some(kind) => format!("#<{}>", kind.class_name()),
            None => v.to_string(),
        }
    }

    /// Check that `this` is an object of `kind` allocated by this heap.
    pub(crate) fn receiver<'v>(
        &self,
        this: &'v Value,
        kind: Kind,
        method: &'static str,
    ) -> Result<&'v ObjectRef> {
        match this.as_object() {
            Some(obj) if self.owns(obj) && self.with_body(obj, Body::kind) == kind => Ok(obj),
            _ => Err(Error::ReceiverMismatch {
                method,
                receiver: self.describe(this),
            }),
        }
    }

    pub(crate) fn with_body<R>(&self, obj: &ObjectRef, f: impl FnOnce(&Body) -> R) -> R {
        assert!(obj.belongs_to(&self.inner), "object belongs to a different heap");
        let objects = self.inner.objects.borrow();
        f(objects.get(obj.id()).expect("rooted object is never reclaimed"))
    }

    pub(crate) fn with_body_mut<R>(&self, obj: &ObjectRef, f: impl FnOnce(&mut Body) -> R) -> R {
        assert!(obj.belongs_to(&self.inner), "object belongs to a different heap");
        let mut objects = self.inner.objects.borrow_mut();
        f(objects
            .get_mut(obj.id())
            .expect("rooted object is never reclaimed"))
    }

    pub(crate) fn store(&self, v: &Value) -> Stored {
        match v {
            Value::Undefined => Stored::Undefined,
            Value::Null => Stored::Null,
            Value::Bool(b) => Stored::Bool(*b),
            Value::Number(n) => Stored::Number(*n),
            Value::String(s) => Stored::String(s.clone()),
            Value::Object(o) => {
                assert!(o.belongs_to(&self.inner), "object belongs to a different heap");
                Stored::Object(o.id())
            }
        }
    }

    /// Turn a stored value back into a rooted one. The caller must know the
    /// stored object is still reachable (it was just read from a live object).
    pub(crate) fn load(&self, s: &Stored) -> Value {
        match s {
            Stored::Undefined => Value::Undefined,
            Stored::Null => Value::Null,
            Stored::Bool(b) => Value::Bool(*b),
            Stored::Number(n) => Value::Number(*n),
            Stored::String(s) => Value::String(s.clone()),
            Stored::Object(id) => Value::Object(ObjectRef::mint(self.inner.clone(), *id)),
        }
    }

    /// `GetHash`: assign on first use. Write paths only.
    pub fn get_hash(&self, obj: &ObjectRef) -> IdentityHash {
        assert!(obj.belongs_to(&self.inner), "object belongs to a different heap");
        self.inner.hasher.borrow_mut().get_hash(obj.id())
    }

    /// `GetExistingHash`: pure probe. Read paths only.
    pub fn get_existing_hash(&self, obj: &ObjectRef) -> Option<IdentityHash> {
        if !obj.belongs_to(&self.inner) {
            return None;
        }
        self.inner.hasher.borrow().get_existing_hash(obj.id())
    }

    /// Number of objects that carry an identity hash.
    pub fn hashed_objects(&self) -> usize {
        self.inner.hasher.borrow().tagged()
    }

    /// Element `index` of an array; `Some(Undefined)` past the end, `None`
    /// if `array` is not an array.
    pub fn element(&self, array: &Value, index: usize) -> Option<Value> {
        let obj = array.as_object().filter(|o| self.owns(o))?;
        let stored = self.with_body(obj, |b| match b {
            Body::Array(items) => Some(items.get(index).cloned().unwrap_or(Stored::Undefined)),
            _ => None,
        })?;
        Some(self.load(&stored))
    }

    /// Lazy, single-pass iterator over an array's elements.
    pub fn iterate(&self, source: &Value) -> Result<ArrayIter> {
        match (source.as_object(), self.kind(source)) {
            (Some(obj), Some(Kind::Array)) => Ok(ArrayIter {
                heap: self.clone(),
                array: obj.clone(),
                next: 0,
            }),
            _ => Err(Error::NotIterable {
                value: self.describe(source),
            }),
        }
    }

    /// Copy of a buffer's bytes, or of the bytes a view covers.
    pub fn bytes(&self, v: &Value) -> Option<Vec<u8>> {
        let obj = v.as_object().filter(|o| self.owns(o))?;
        let objects = self.inner.objects.borrow();
        match objects.get(obj.id())? {
            Body::ArrayBuffer(bytes) => Some(bytes.clone()),
            Body::View {
                buffer,
                offset,
                length,
            } => match objects.get(*buffer)? {
                Body::ArrayBuffer(bytes) => Some(bytes[*offset..*offset + *length].to_vec()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Overwrite one byte of a buffer. Returns false if `v` is not a buffer of
    /// this heap, or `index` is out of range.
    pub fn write_byte(&self, v: &Value, index: usize, byte: u8) -> bool {
        let Some(obj) = v.as_object().filter(|o| self.owns(o)) else {
            return false;
        };
        self.with_body_mut(obj, |b| match b {
            Body::ArrayBuffer(bytes) => match bytes.get_mut(index) {
                Some(slot) => {
                    *slot = byte;
                    true
                }
                None => false,
            },
            _ => false,
        })
    }

    /// Physical entry count of a weak collection's table, dead entries
    /// included until the next reclamation pass.
    pub fn weak_entry_count(&self, v: &Value) -> Option<usize> {
        let obj = v.as_object().filter(|o| self.owns(o))?;
        self.with_body(obj, |b| match b {
            Body::WeakMap(t) => Some(t.len()),
            Body::WeakSet(t) => Some(t.len()),
            _ => None,
        })
    }

    /// Run a reclamation pass.
    pub fn collect(&self) -> CollectStats {
        let inner = &*self.inner;
        let _g = inner.collecting.enter();
        let mut objects = inner.objects.borrow_mut();

        let mut marked: SecondaryMap<ObjectId, ()> = SecondaryMap::new();
        let mut stack: Vec<ObjectId> = inner
            .roots
            .borrow()
            .iter()
            .filter(|(_, c)| c.is_rooted())
            .map(|(id, _)| id)
            .collect();
        let mut tables: Vec<ObjectId> = Vec::new();

        loop {
            while let Some(id) = stack.pop() {
                if marked.insert(id, ()).is_some() {
                    continue;
                }
                match objects.get(id) {
                    Some(Body::Array(items)) => {
                        stack.extend(items.iter().filter_map(Stored::object));
                    }
                    Some(Body::View { buffer, .. }) => stack.push(*buffer),
                    Some(Body::WeakMap(_)) => tables.push(id),
                    _ => {}
                }
            }
            // Ephemeron step: a value is reachable once its key is.
            for &t in &tables {
                if let Some(Body::WeakMap(table)) = objects.get(t) {
                    for (key, value) in table.iter() {
                        if !marked.contains_key(key) {
                            continue;
                        }
                        if let Some(v) = value.object() {
                            if !marked.contains_key(v) {
                                stack.push(v);
                            }
                        }
                    }
                }
            }
            if stack.is_empty() {
                break;
            }
        }

        let dead: Vec<ObjectId> = objects
            .keys()
            .filter(|id| !marked.contains_key(*id))
            .collect();
        for &id in &dead {
            objects.remove(id);
        }

        let mut purged = 0;
        for body in objects.values_mut() {
            match body {
                Body::WeakMap(t) => purged += t.retain_live(|k| marked.contains_key(k)),
                Body::WeakSet(t) => purged += t.retain_live(|k| marked.contains_key(k)),
                _ => {}
            }
        }
        drop(objects);

        let mut roots = inner.roots.borrow_mut();
        let mut hasher = inner.hasher.borrow_mut();
        for &id in &dead {
            roots.remove(id);
            hasher.forget(id);
        }
        inner.allocs_since_collect.set(0);

        let stats = CollectStats {
            marked: marked.len(),
            swept: dead.len(),
            purged,
        };
        tracing::debug!(
            marked = stats.marked,
            swept = stats.swept,
            purged = stats.purged,
            "reclamation pass complete"
        );
        stats
    }
}

/// Single-pass iterator over an array object. Reads the heap at each step,
/// so it observes elements as they are when stepped, not when created.
pub struct ArrayIter {
    heap: Heap,
    array: ObjectRef,
    next: usize,
}

impl Iterator for ArrayIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let stored = self.heap.with_body(&self.array, |b| match b {
            Body::Array(items) => items.get(self.next).cloned(),
            _ => None,
        })?;
        self.next += 1;
        Some(self.heap.load(&stored))
    }
}
