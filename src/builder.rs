use crate::resize;
use crate::Table;

use std::time::Duration;

/// Configures and creates a [`Table`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use striped_htable::Table;
///
/// let table: Table<u32> = Table::builder()
///     .capacity(100)
///     .stripes(16)
///     .collision_threshold(4)
///     .lock_timeout(Some(Duration::from_millis(50)))
///     .build();
///
/// assert_eq!(table.size(), 101);
/// assert_eq!(table.stripe_count(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    config: Config,
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub capacity: usize,
    pub allow_resize: bool,
    pub stripes: usize,
    pub collision_threshold: usize,
    pub lock_timeout: Option<Duration>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            config: Config {
                capacity: 0,
                allow_resize: true,
                stripes: resize::default_stripes(),
                collision_threshold: resize::DEFAULT_COLLISION_THRESHOLD,
                lock_timeout: None,
            },
        }
    }
}

impl Builder {
    /// Returns a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// The minimum number of buckets. The table starts with the smallest prime
    /// greater than `capacity`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Whether long chains make the table grow. Defaults to `true`.
    pub fn allow_resize(mut self, allow_resize: bool) -> Self {
        self.config.allow_resize = allow_resize;
        self
    }

    /// The number of lock stripes, fixed for the table's lifetime.
    ///
    /// Defaults to four per CPU, rounded up to a power of two. Zero is treated
    /// as one.
    pub fn stripes(mut self, stripes: usize) -> Self {
        self.config.stripes = stripes;
        self
    }

    /// An insert that walks past this many entries before appending grows the
    /// table. Defaults to 10. Zero is treated as one.
    pub fn collision_threshold(mut self, threshold: usize) -> Self {
        self.config.collision_threshold = threshold;
        self
    }

    /// How long [`Table::insert`] and [`Table::try_lookup`] wait for a stripe
    /// before failing with [`Error::LockTimeout`](crate::Error::LockTimeout).
    /// `None`, the default, waits indefinitely.
    pub fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Creates the table.
    ///
    /// # Panics
    ///
    /// Panics if no prime above the capacity fits in a `usize`.
    pub fn build<V>(self) -> Table<V> {
        Table::from_config(&self.config)
    }
}
