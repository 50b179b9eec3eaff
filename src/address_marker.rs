//! Tomb tags on entry links.
//!
//! A link (a bucket head or the `next` link of an entry) whose least
//! significant bit is set has been logically severed: the entry that owns the
//! link is being deleted, or the whole bucket array has been detached by a
//! clear. A marked link must never be dereferenced; strip it first.
//!
//! Because every CAS on a link expects an *unmarked* current value, setting
//! the mark also blocks every concurrent attempt to link a new entry after
//! that position, or to unlink the entry that follows it.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Shared};

/// The tomb tag.
pub const MARK: usize = 0b1;

/// Bit operations on anything that encodes an entry address.
pub trait AddressMark: Copy {
    /// Returns the marked version of this address.
    fn set_mark(self) -> Self;

    /// Returns this address with the mark removed.
    fn strip_mark(self) -> Self;

    /// Returns `true` if the mark is set.
    fn is_marked(self) -> bool;
}

impl AddressMark for usize {
    #[inline]
    fn set_mark(self) -> Self {
        self | MARK
    }

    #[inline]
    fn strip_mark(self) -> Self {
        self & !MARK
    }

    #[inline]
    fn is_marked(self) -> bool {
        self & MARK != 0
    }
}

impl<T> AddressMark for *mut T {
    #[inline]
    fn set_mark(self) -> Self {
        (self as usize).set_mark() as *mut T
    }

    #[inline]
    fn strip_mark(self) -> Self {
        (self as usize).strip_mark() as *mut T
    }

    #[inline]
    fn is_marked(self) -> bool {
        (self as usize).is_marked()
    }
}

impl<T> AddressMark for Shared<'_, T> {
    #[inline]
    fn set_mark(self) -> Self {
        self.with_tag(self.tag() | MARK)
    }

    #[inline]
    fn strip_mark(self) -> Self {
        self.with_tag(self.tag() & !MARK)
    }

    #[inline]
    fn is_marked(self) -> bool {
        self.tag() & MARK != 0
    }
}

/// Reads a link that may be concurrently marked and returns its stripped value
/// as of that read.
#[inline]
pub fn atomic_strip_mark<'g, T>(link: &Atomic<T>, guard: &'g Guard) -> Shared<'g, T> {
    link.load(Ordering::Acquire, guard).strip_mark()
}

#[cfg(test)]
mod tests {
    use super::{atomic_strip_mark, AddressMark};

    use crossbeam_epoch::{Atomic, Owned, Shared};
    use std::sync::atomic::Ordering;

    #[test]
    fn integer_marks() {
        let addr = 0x1000_usize;
        assert!(!addr.is_marked());
        assert!(addr.set_mark().is_marked());
        assert_eq!(addr.set_mark().strip_mark(), addr);
        assert_eq!(addr.set_mark().set_mark(), addr | 1);
        assert_eq!(addr.strip_mark(), addr);

        // A marked null is not a null, but strips to one.
        assert_eq!(0_usize.set_mark(), 1);
        assert_eq!(1_usize.strip_mark(), 0);
    }

    #[test]
    fn raw_pointer_marks() {
        let mut value = 42_u64;
        let p: *mut u64 = &mut value;

        let marked = p.set_mark();
        assert!(marked.is_marked());
        assert_ne!(marked, p);
        assert_eq!(marked.strip_mark(), p);
        assert_eq!(unsafe { *marked.strip_mark() }, 42);

        let null = std::ptr::null_mut::<u64>();
        assert!(null.set_mark().is_marked());
        assert!(null.set_mark().strip_mark().is_null());
    }

    #[test]
    fn shared_marks_survive_a_link() {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let link = Atomic::new(7_u64);

        let p = link.load(Ordering::Relaxed, guard);
        assert!(!p.is_marked());

        link.compare_exchange(p, p.set_mark(), Ordering::AcqRel, Ordering::Relaxed, guard)
            .ok()
            .unwrap();

        let marked = link.load(Ordering::Relaxed, guard);
        assert!(marked.is_marked());
        assert_eq!(marked.strip_mark(), p);
        assert_eq!(atomic_strip_mark(&link, guard), p);
        assert_eq!(unsafe { *atomic_strip_mark(&link, guard).deref() }, 7);

        // A CAS expecting the unmarked value fails once the mark is set.
        assert!(link
            .compare_exchange(p, Shared::null(), Ordering::AcqRel, Ordering::Relaxed, guard)
            .is_err());

        unsafe { drop(p.into_owned()) };
    }

    #[test]
    fn marked_null_blocks_insertion() {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let head: Atomic<u64> = Atomic::null();
        head.store(Shared::null().set_mark(), Ordering::Relaxed);

        assert!(atomic_strip_mark(&head, guard).is_null());

        let new = Owned::new(1_u64);
        let result = head.compare_exchange(
            Shared::null(),
            new,
            Ordering::AcqRel,
            Ordering::Relaxed,
            guard,
        );
        assert!(result.is_err());
    }
}
