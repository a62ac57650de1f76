use crate::builder::{Builder, Config};
use crate::error::Error;
use crate::raw::RawTable;

use std::fmt;

/// A hash table with string keys, guarded by a fixed set of striped
/// reader-writer locks.
///
/// Lookups of keys guarded by the same stripe run in parallel, inserts into
/// a stripe are serialized, and operations on different stripes do not
/// interact at all, except while the table grows.
///
/// Values are opaque handles (an `Arc`, an index, an id) that the table
/// stores and hands back clones of. Entries cannot be removed; they live as
/// long as the table.
pub struct Table<V> {
    raw: RawTable<V>,
}

impl<V> Table<V> {
    /// Creates a table with at least `capacity + 1` buckets.
    ///
    /// If `allow_resize` is `true`, the table grows whenever an insert finds a
    /// chain at the collision threshold. Otherwise its size never changes
    /// unless [`reserve`](Table::reserve) is called.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_htable::Table;
    ///
    /// let table: Table<u64> = Table::new(10, true);
    /// assert_eq!(table.size(), 11);
    /// ```
    pub fn new(capacity: usize, allow_resize: bool) -> Self {
        Builder::new()
            .capacity(capacity)
            .allow_resize(allow_resize)
            .build()
    }

    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            raw: RawTable::new(config),
        }
    }

    /// Returns the number of buckets, which is always prime.
    ///
    /// This is the length of the bucket array, not the number of entries.
    pub fn size(&self) -> usize {
        self.raw.size()
    }

    /// Returns the number of entries in the table.
    ///
    /// Concurrent inserts may or may not be counted.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the table contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of lock stripes.
    pub fn stripe_count(&self) -> usize {
        self.raw.stripe_count()
    }

    /// Returns `true` if the table grows on its own.
    pub fn allows_resize(&self) -> bool {
        self.raw.allows_resize()
    }

    /// Returns the number of threads currently blocked on one of the table's
    /// stripes. Meant for diagnostics only.
    pub fn waiter_count(&self) -> usize {
        self.raw.waiter_count()
    }

    /// Inserts a key-value pair.
    ///
    /// Fails with [`Error::DuplicateKey`] if the key is present, leaving the
    /// stored value untouched, and with [`Error::EmptyKey`] for an empty key.
    /// With a lock timeout configured, fails with [`Error::LockTimeout`] if the
    /// key's stripe was not granted in time.
    ///
    /// If the insert triggers a resize and the larger bucket array cannot be
    /// allocated, [`Error::AllocationFailure`] is returned even though the
    /// entry itself was stored.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_htable::{Error, Table};
    ///
    /// let table = Table::new(10, true);
    /// table.insert("a", 1).unwrap();
    ///
    /// assert_eq!(
    ///     table.insert("a", 2),
    ///     Err(Error::DuplicateKey { key: "a".into() })
    /// );
    /// assert_eq!(table.lookup("a"), Some(1));
    /// ```
    pub fn insert(&self, key: impl Into<String>, value: V) -> Result<(), Error> {
        self.raw.insert(key.into(), value, self.raw.deadline())
    }

    /// Makes sure the table has room for at least `additional` more entries
    /// without lengthening chains, growing it if needed.
    ///
    /// This works even if the table does not grow on its own.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_htable::Table;
    ///
    /// let table: Table<()> = Table::new(0, false);
    /// table.reserve(100).unwrap();
    /// assert!(table.size() > 100);
    /// ```
    pub fn reserve(&self, additional: usize) -> Result<(), Error> {
        let min = self
            .len()
            .checked_add(additional)
            .and_then(|n| n.checked_add(1))
            .ok_or(Error::AllocationFailure {
                buckets: usize::MAX,
            })?;

        self.raw.reserve(min)
    }

    /// Returns `true` if the table contains the key.
    pub fn contains_key(&self, key: &str) -> bool {
        match self.raw.find(key, None, |_| ()) {
            Ok(found) => found.is_some(),
            Err(_) => unreachable!("acquisition without a deadline cannot time out"),
        }
    }
}

impl Table<()> {
    /// Returns a [`Builder`] for configuring a table.
    ///
    /// The value type is picked by [`Builder::build`], so
    /// `Table::builder().build::<V>()` creates a `Table<V>`.
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<V: Clone> Table<V> {
    /// Returns a clone of the value stored under `key`.
    ///
    /// This waits for the key's stripe however long it takes, regardless of
    /// the configured lock timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use striped_htable::Table;
    ///
    /// let table = Table::new(10, true);
    /// let value = Arc::new(String::from("value"));
    /// table.insert("key", Arc::clone(&value)).unwrap();
    ///
    /// assert!(Arc::ptr_eq(&table.lookup("key").unwrap(), &value));
    /// assert_eq!(table.lookup("missing"), None);
    /// ```
    pub fn lookup(&self, key: &str) -> Option<V> {
        match self.raw.find(key, None, V::clone) {
            Ok(value) => value,
            Err(_) => unreachable!("acquisition without a deadline cannot time out"),
        }
    }

    /// Like [`lookup`](Table::lookup), but gives up with
    /// [`Error::LockTimeout`] once the configured lock timeout elapses.
    pub fn try_lookup(&self, key: &str) -> Result<Option<V>, Error> {
        Ok(self.raw.find(key, self.raw.deadline(), V::clone)?)
    }
}

impl<V> fmt::Debug for Table<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("size", &self.size())
            .field("len", &self.len())
            .field("stripes", &self.stripe_count())
            .field("allow_resize", &self.allows_resize())
            .finish()
    }
}
