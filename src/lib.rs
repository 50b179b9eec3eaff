#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A lock-free concurrent hash map whose entries are reclaimed through
//! transactions.
//!
//! Many worker threads can find, insert and erase entries without blocking
//! each other, while the memory of erased entries is reused safely. The crate
//! is made of three layers:
//!
//! - [`tran`]: a [`System`](tran::System) of transaction indices, one per
//!   worker thread, and per-structure transaction tables. A thread inside a
//!   transaction may read shared entries; nothing it can see is reused until
//!   the transaction ends.
//! - [`freelist`]: a pool of entries allocated in blocks. Retired entries are
//!   handed out again only after the transactions that could observe them
//!   have ended.
//! - [`HashMap`]: a fixed-size array of buckets, each a CAS-linked list of
//!   entries taken from the map's freelist. The caller supplies the hashing,
//!   comparison and copy policies through an [`EntryDescriptor`].
//!
//! Entries handed out by the map are protected either by the caller's open
//! transaction ([`EpochProtected`]) or by a mutex embedded in every entry
//! ([`MutexProtected`]).
//!
//! # Logging
//!
//! Enable the `logging` feature to report block allocations, allocation
//! failures, clears and callback failures through the `log` crate.

pub mod address_marker;
pub mod freelist;
pub mod hashmap;
pub mod tran;

pub(crate) mod common;

pub use common::error::{BoxError, Error, Result};
pub use hashmap::{
    ClaimedNode, Duplicate, EntryDescriptor, EntryRef, EpochProtected, HashMap, HashMapBuilder,
    InsertResult, Iter, MutexProtected, Protection, TranDescriptor,
};
