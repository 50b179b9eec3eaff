//! Transactions that scope the lifetime of shared entries.
//!
//! A transaction is a bounded interval, bracketed by
//! [`Descriptor::start_tran`] and [`Descriptor::end_tran`], during which a
//! thread may dereference entries it reached through shared links. Entries
//! retired while a transaction is open are not reused until that transaction
//! has ended.
//!
//! The pieces are layered:
//!
//! - A [`System`] is a process-wide allocator of transaction indices. Every
//!   worker thread takes one [`Index`] and keeps it for as long as it works
//!   on lock-free structures.
//! - A [`Table`] is one reclamation domain, owned by a freelist. It is sized
//!   from the system, so every index has one slot in every table.
//! - A [`Descriptor`] is the per-thread handle on one table, registered for
//!   one index. It tracks whether a transaction is open and can stash one
//!   reclaimable node that its owner may reuse on its next operation.
//!
//! Under the hood a table is a `crossbeam_epoch::Collector`, a descriptor is a
//! registered `LocalHandle`, and an open transaction is a pinned `Guard`.

mod system;
mod table;

pub use system::{Index, System};
pub use table::{Descriptor, Reclaimable, Table};
