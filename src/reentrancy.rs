//! Debug-only guard against reentering the weak table or the reclamation
//! pass.
//!
//! A `WeakTable` is mid-update while its index and slots disagree, and the
//! heap's object arena is mutably borrowed for the whole mark/sweep. Neither
//! may be entered again from inside itself: a table call that reached back
//! into the same table, or an allocation made while `Heap::collect` runs,
//! would observe half-done state. Debug builds track the depth per instance
//! and panic with the name of the section; release builds carry nothing.

use core::cell::Cell;
use core::marker::PhantomData;

/// Which structure a [`DebugReentrancy`] protects. Only used in messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Section {
    WeakTable,
    Reclamation,
}

impl Section {
    #[cfg(debug_assertions)]
    fn name(self) -> &'static str {
        match self {
            Section::WeakTable => "weak table",
            Section::Reclamation => "reclamation pass",
        }
    }
}

#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    depth: Cell<u32>,
    #[cfg(debug_assertions)]
    section: Section,
    // !Send + !Sync, same as the heap it protects.
    _nosend: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub const fn new(section: Section) -> Self {
        #[cfg(not(debug_assertions))]
        let _ = section;
        Self {
            #[cfg(debug_assertions)]
            depth: Cell::new(0),
            #[cfg(debug_assertions)]
            section,
            _nosend: PhantomData,
        }
    }

    /// Enter the section. Debug builds panic if it is already entered.
    #[inline]
    pub fn enter(&self) -> SectionGuard<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.depth.get() == 0,
                "reentrant call into the {}",
                self.section.name()
            );
            self.depth.set(1);
            SectionGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            SectionGuard { _z: PhantomData }
        }
    }

    /// Panic in debug builds if the section is currently entered; `action`
    /// names what the caller was about to do.
    #[inline]
    pub fn assert_outside(&self, action: &str) {
        #[cfg(debug_assertions)]
        assert!(
            self.depth.get() == 0,
            "{action} during the {}",
            self.section.name()
        );
        #[cfg(not(debug_assertions))]
        let _ = action;
    }
}

/// Held while a section is entered; leaving scope exits it.
pub struct SectionGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.depth.set(0);
    }
}
