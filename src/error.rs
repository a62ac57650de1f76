use thiserror::Error;

use crate::rwlock::LockTimeout;

/// The error type of table operations.
///
/// Every variant except [`Error::AllocationFailure`] means the operation had
/// no effect on the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The key is already present. The stored value is left as it was.
    #[error("key {key:?} is already present")]
    DuplicateKey {
        /// The rejected key.
        key: String,
    },
    /// The configured lock timeout elapsed before the bucket's stripe was granted.
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
    /// Growing the bucket array failed.
    ///
    /// When returned from [`Table::insert`](crate::Table::insert), the entry
    /// itself was stored and the table kept its previous size.
    #[error("failed to allocate a bucket array of {buckets} buckets")]
    AllocationFailure {
        /// The requested number of buckets.
        buckets: usize,
    },
    /// Keys must be non-empty.
    #[error("keys must not be empty")]
    EmptyKey,
}
