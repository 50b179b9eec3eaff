/// A boxed error returned by the callbacks of an
/// [`EntryDescriptor`](crate::EntryDescriptor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for the hash map, its freelist and the transaction system.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A freelist could not allocate a new block of entries.
    #[error("out of memory while allocating a freelist block of {block_size} entries")]
    OutOfMemory {
        /// The number of entries in the block that could not be allocated.
        block_size: usize,
    },

    /// Every transaction index of a [`System`](crate::tran::System) is
    /// assigned to a live [`Index`](crate::tran::Index).
    #[error("all {max_transactions} transaction indices are assigned")]
    TransactionSlotsExhausted {
        /// The capacity of the transaction system.
        max_transactions: usize,
    },

    /// The transaction index does not fit into the transaction table. This
    /// happens when an index of one transaction system is used with a table
    /// created from a smaller one.
    #[error("transaction index {index} is out of range for a table of {len} descriptors")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The number of descriptors of the table.
        len: usize,
    },

    /// A transaction table already has a live descriptor for this index.
    #[error("transaction index {0} already has a live descriptor in this table")]
    DescriptorInUse(usize),

    /// A claimed node was handed to a map or freelist other than the one it
    /// was claimed from. The node goes back to its own freelist.
    #[error("the node was claimed from another freelist")]
    ForeignNode,

    /// A builder was given a configuration that cannot be built.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A callback of the entry descriptor failed.
    #[error("entry descriptor callback failed: {0}")]
    Callback(#[source] BoxError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn messages() {
        let e = Error::OutOfMemory { block_size: 64 };
        assert_eq!(
            e.to_string(),
            "out of memory while allocating a freelist block of 64 entries"
        );

        let e = Error::DescriptorInUse(3);
        assert_eq!(
            e.to_string(),
            "transaction index 3 already has a live descriptor in this table"
        );

        let e = Error::Callback("session id space exhausted".into());
        assert_eq!(
            e.to_string(),
            "entry descriptor callback failed: session id space exhausted"
        );
        assert!(std::error::Error::source(&e).is_some());

        assert_eq!(
            Error::ForeignNode.to_string(),
            "the node was claimed from another freelist"
        );
    }
}
