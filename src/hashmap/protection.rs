//! How an entry handed out by a [`HashMap`](super::HashMap) is protected
//! while the caller uses it.

use parking_lot::lock_api::RawMutex as _;

mod sealed {
    pub trait Sealed {}
}

/// The protection discipline of a [`HashMap`](super::HashMap), chosen by its
/// type parameter.
///
/// This trait is sealed. It is implemented by [`EpochProtected`] and
/// [`MutexProtected`] only.
pub trait Protection: sealed::Sealed + Send + Sync + 'static {
    /// The lock embedded in every entry.
    type Lock: Send + Sync;

    /// `true` if entries are handed out locked.
    const USES_MUTEX: bool;

    #[doc(hidden)]
    fn new_lock() -> Self::Lock;

    #[doc(hidden)]
    fn lock(lock: &Self::Lock);

    /// # Safety
    ///
    /// The lock must be held by the current context.
    #[doc(hidden)]
    unsafe fn unlock(lock: &Self::Lock);
}

/// Entries are protected by the caller's open transaction only.
///
/// An entry returned by `find` or the insert family stays valid until it is
/// released, which also ends the transaction. Concurrent readers may observe
/// the same entry at the same time, so it is read-only.
#[derive(Debug)]
pub enum EpochProtected {}

impl sealed::Sealed for EpochProtected {}

impl Protection for EpochProtected {
    type Lock = ();

    const USES_MUTEX: bool = false;

    #[inline]
    fn new_lock() -> Self::Lock {}

    #[inline]
    fn lock(_lock: &Self::Lock) {}

    #[inline]
    unsafe fn unlock(_lock: &Self::Lock) {}
}

/// Every entry embeds a mutex that is held for as long as the caller uses
/// the entry.
///
/// The transaction ends as soon as the mutex is acquired, so an entry can be
/// held for a long time without delaying the reuse of other entries.
#[derive(Debug)]
pub enum MutexProtected {}

impl sealed::Sealed for MutexProtected {}

impl Protection for MutexProtected {
    type Lock = parking_lot::RawMutex;

    const USES_MUTEX: bool = true;

    #[inline]
    fn new_lock() -> Self::Lock {
        parking_lot::RawMutex::INIT
    }

    #[inline]
    fn lock(lock: &Self::Lock) {
        lock.lock();
    }

    #[inline]
    unsafe fn unlock(lock: &Self::Lock) {
        lock.unlock();
    }
}
