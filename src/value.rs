//! Program values and rooted object references.
//!
//! A [`Value`] held by Rust code keeps its object alive: the `Object` variant
//! wraps an [`ObjectRef`], which owns one root token on the object's
//! `RootCount`. Values stored inside the heap (array elements, weak-map
//! values) use the crate-private `Stored` form, which names objects by
//! [`ObjectId`] and is only followed by the reclamation pass's tracer.

use crate::heap::{HeapInner, ObjectId};
use crate::tokens::{Count, RootCount, Token};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::mem::ManuallyDrop;
use std::rc::Rc;

/// A strong, counted reference to a heap object.
///
/// Clone takes another root; drop returns it. An object with no roots is
/// not freed immediately; it becomes a candidate for the next
/// [`Heap::collect`](crate::Heap::collect).
pub struct ObjectRef {
    heap: Rc<HeapInner>,
    id: ObjectId,
    token: ManuallyDrop<Token<'static, RootCount>>,
}

impl ObjectRef {
    pub(crate) fn mint(heap: Rc<HeapInner>, id: ObjectId) -> Self {
        let token = heap.root_count(id, |c| c.get());
        Self {
            heap,
            id,
            token: ManuallyDrop::new(token),
        }
    }

    /// The object's identity. Stable while any root or traced path exists.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn belongs_to(&self, heap: &Rc<HeapInner>) -> bool {
        Rc::ptr_eq(&self.heap, heap)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        ObjectRef::mint(self.heap.clone(), self.id)
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        // SAFETY: the token is taken exactly once, here, and never touched again.
        let token = unsafe { ManuallyDrop::take(&mut self.token) };
        self.heap.root_count(self.id, |c| {
            c.put(token);
        });
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.heap, &other.heap) && self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.heap) as usize).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.id).finish()
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Only object-typed values may be weakly keyed.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// ToNumber, without ToPrimitive: objects convert to NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => f64::NAN,
        }
    }

    /// ToInteger: NaN becomes 0, infinities are kept, fractions truncate.
    pub fn to_integer(&self) -> f64 {
        let n = self.to_number();
        if n.is_nan() {
            0.0
        } else if n.is_infinite() {
            n
        } else {
            n.trunc() + 0.0
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    if !t.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e18 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("#<Object>"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

/// Non-rooting form of a [`Value`], used for everything stored in the heap.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Stored {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectId),
}

impl Stored {
    pub(crate) fn object(&self) -> Option<ObjectId> {
        match self {
            Stored::Object(id) => Some(*id),
            _ => None,
        }
    }
}
