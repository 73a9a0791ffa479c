//! ArrayBuffer: fixed-length byte buffers with `slice`, `byteLength` and
//! the static `isView`.

use crate::error::{Error, Result};
use crate::heap::{Body, Heap, Kind};
use crate::realm::{
    arg, native, Attributes, Intrinsic, Invocation, PropertyInstaller, Target, TO_STRING_TAG,
};
use crate::value::Value;
use core::ops::Range;

/// Largest byte length a constructor accepts.
pub const MAX_BYTE_LENGTH: usize = i32::MAX as usize;

/// ToPositiveInteger for byte lengths.
fn to_byte_length(v: &Value) -> Result<usize> {
    let n = v.to_integer();
    if n < 0.0 || !n.is_finite() || n > MAX_BYTE_LENGTH as f64 {
        return Err(Error::InvalidBufferLength);
    }
    Ok(n as usize)
}

/// One end of a slice range, already converted with ToInteger.
fn clamp_offset(relative: f64, len: usize) -> usize {
    let len_f = len as f64;
    if relative < 0.0 {
        (len_f + relative).max(0.0) as usize
    } else {
        relative.min(len_f) as usize
    }
}

/// Absolute byte range selected by `slice(start, end)` on a buffer of `len`
/// bytes. `end == None` means "to the end". A reversed range is empty.
pub fn slice_range(len: usize, start: f64, end: Option<f64>) -> Range<usize> {
    let first = clamp_offset(start, len);
    let fin = end.map_or(len, |e| clamp_offset(e, len));
    first..fin.max(first)
}

/// `new ArrayBuffer(length)`.
pub(crate) fn construct(heap: &Heap, invocation: Invocation, length: &Value) -> Result<Value> {
    invocation.require_construct("ArrayBuffer")?;
    let len = to_byte_length(length)?;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| Error::InvalidBufferLength)?;
    bytes.resize(len, 0);
    Ok(heap.alloc_buffer(bytes))
}

/// `ArrayBuffer.prototype.byteLength` getter.
pub fn byte_length(heap: &Heap, this: &Value) -> Result<usize> {
    let buf = heap.receiver(this, Kind::ArrayBuffer, "ArrayBuffer.prototype.byteLength")?;
    Ok(heap.with_body(buf, |b| match b {
        Body::ArrayBuffer(bytes) => bytes.len(),
        _ => 0,
    }))
}

/// `ArrayBuffer.prototype.slice`. Returns a new buffer holding a copy.
pub fn slice(heap: &Heap, this: &Value, start: &Value, end: &Value) -> Result<Value> {
    let buf = heap.receiver(this, Kind::ArrayBuffer, "ArrayBuffer.prototype.slice")?;
    let start = start.to_integer();
    let end = (!end.is_undefined()).then(|| end.to_integer());
    let copy = heap.with_body(buf, |b| match b {
        Body::ArrayBuffer(bytes) => bytes[slice_range(bytes.len(), start, end)].to_vec(),
        _ => Vec::new(),
    });
    Ok(heap.alloc_buffer(copy))
}

/// `ArrayBuffer.isView`.
pub fn is_view(heap: &Heap, v: &Value) -> bool {
    heap.kind(v) == Some(Kind::View)
}

pub fn install<I: PropertyInstaller + ?Sized>(installer: &mut I) {
    let proto = Target::Prototype(Intrinsic::ArrayBuffer);
    installer.add_named_property(
        proto,
        TO_STRING_TAG,
        Value::string("ArrayBuffer"),
        Attributes::DONT_ENUM | Attributes::READ_ONLY,
    );
    installer.install_getter(
        proto,
        "byteLength",
        native(|heap, this, _| byte_length(heap, this).map(|n| Value::Number(n as f64))),
    );
    installer.install_functions(
        proto,
        Attributes::DONT_ENUM,
        vec![(
            "slice",
            native(|heap, this, args| slice(heap, this, &arg(args, 0), &arg(args, 1))),
        )],
    );
    installer.install_functions(
        Target::Constructor(Intrinsic::ArrayBuffer),
        Attributes::DONT_ENUM,
        vec![(
            "isView",
            native(|heap, _, args| Ok(Value::Bool(is_view(heap, &arg(args, 0))))),
        )],
    );
}
