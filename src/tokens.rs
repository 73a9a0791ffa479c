//! Linear root tokens and the per-object root counter.
//!
//! Every [`ObjectRef`](crate::ObjectRef) carries one `Token` minted by the
//! `RootCount` of the object it names. Dropping a token on the floor panics;
//! the only valid way to dispose of it is to hand it back with
//! [`Count::put`], which is what `ObjectRef::drop` does.

use core::cell::Cell;
use core::marker::PhantomData;

/// Zero-sized, linear proof that one root was taken on a counter.
pub struct Token<'a, C: ?Sized> {
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<C: ?Sized> Token<'_, C> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<C: ?Sized> Drop for Token<'_, C> {
    fn drop(&mut self) {
        panic!("root token dropped without Count::put");
    }
}

/// A source of counted roots, enforced by linear token flow.
pub trait Count {
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Take one root and return the token that proves it.
    fn get(&self) -> Self::Token<'static>;

    /// Return a previously taken root. Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;
}

/// Number of live `ObjectRef`s naming one heap object.
///
/// A zero count does not free anything by itself; it only removes the
/// object from the root set of the next reclamation pass.
#[derive(Debug, Default)]
pub struct RootCount {
    count: Cell<usize>,
}

impl RootCount {
    pub fn new() -> Self {
        Self {
            count: Cell::new(0),
        }
    }

    #[inline]
    pub fn is_rooted(&self) -> bool {
        self.count.get() > 0
    }
}

impl Count for RootCount {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Same policy as Rc: overflow aborts.
            std::process::abort();
        }
        Token::new()
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        let c = self.count.get();
        assert!(c > 0, "RootCount underflow");
        self.count.set(c - 1);
        core::mem::forget(t);
        c == 1
    }
}
