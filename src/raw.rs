use crate::builder::Config;
use crate::error::Error;
use crate::hash::hashcode;
use crate::resize;
use crate::rwlock::{LockTimeout, RwLock, RwLockReadGuard, RwLockWriteGuard};

use std::cell::UnsafeCell;
use std::iter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use lock_api::RawRwLock as _;
use parking_lot::Mutex;

pub(crate) struct RawTable<V> {
    // The bucket array.
    //
    // The array itself is only replaced while every stripe is held exclusively.
    // A bucket's chain is read under its stripe in either mode and modified
    // under its stripe in exclusive mode.
    buckets: UnsafeCell<Box<[Bucket<V>]>>,
    // The length of `buckets`. Written only while every stripe is held, so it
    // can be read before acquiring one and validated after.
    size: AtomicUsize,
    // A fixed set of locks. Bucket `i` is guarded by stripe `i % stripes.len()`.
    stripes: Box<[RwLock<()>]>,
    // The number of entries in the buckets guarded by each stripe.
    counts: Box<[AtomicUsize]>,
    // The lock held for the whole of a resize.
    resize: Mutex<()>,
    // Set while a resize holds `resize`. Operations that observe it queue
    // behind the resize instead of racing it for stripes.
    resizing: AtomicBool,
    allow_resize: bool,
    collision_threshold: usize,
    lock_timeout: Option<Duration>,
}

// Buckets are only ever accessed under their stripe lock.
unsafe impl<V: Send + Sync> Sync for RawTable<V> {}

struct Bucket<V> {
    head: UnsafeCell<Option<Box<Node<V>>>>,
}

// A singly-linked list node holding one entry.
struct Node<V> {
    // The hashcode of `key`.
    hash: u32,
    key: String,
    value: V,
    next: Option<Box<Self>>,
}

impl<V> Default for Bucket<V> {
    fn default() -> Self {
        Self {
            head: UnsafeCell::new(None),
        }
    }
}

impl<V> Drop for Bucket<V> {
    fn drop(&mut self) {
        // Unlink iteratively, a long chain would overflow the stack otherwise.
        let mut next = self.head.get_mut().take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

impl<V> RawTable<V> {
    pub fn new(config: &Config) -> Self {
        let size = resize::initial_size(config.capacity);
        let stripes = config.stripes.max(1);

        tracing::debug!(
            size,
            stripes,
            allow_resize = config.allow_resize,
            "creating table"
        );

        Self {
            buckets: UnsafeCell::new(iter::repeat_with(Bucket::default).take(size).collect()),
            size: AtomicUsize::new(size),
            stripes: iter::repeat_with(RwLock::default).take(stripes).collect(),
            counts: iter::repeat_with(AtomicUsize::default)
                .take(stripes)
                .collect(),
            resize: Mutex::new(()),
            resizing: AtomicBool::new(false),
            allow_resize: config.allow_resize,
            collision_threshold: config.collision_threshold.max(1),
            lock_timeout: config.lock_timeout,
        }
    }

    // Returns the current number of buckets.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    // Returns the number of lock stripes.
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    // Returns the number of entries.
    pub fn len(&self) -> usize {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    pub fn allows_resize(&self) -> bool {
        self.allow_resize
    }

    // Returns the number of threads blocked on any stripe.
    pub fn waiter_count(&self) -> usize {
        self.stripes
            .iter()
            .map(|stripe| unsafe { stripe.raw() }.waiter_count())
            .sum()
    }

    // Returns the absolute deadline for an acquisition starting now.
    pub fn deadline(&self) -> Option<Instant> {
        self.lock_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout))
    }

    // Returns the bucket at `index`.
    //
    // # Safety
    //
    // The caller must hold the stripe guarding `index` in either mode, which
    // also guarantees that `index` is in bounds of the current array.
    unsafe fn bucket(&self, index: usize) -> &Bucket<V> {
        unsafe { &(&*self.buckets.get())[index] }
    }

    // Runs `acquire`, first queueing behind the resize lock if a resize is in
    // progress. The resize lock is released as soon as `acquire` returns.
    fn coordinate<T>(&self, acquire: impl FnOnce() -> T) -> T {
        if self.resizing.load(Ordering::Acquire) {
            let _resizing = self.resize.lock();
            return acquire();
        }

        acquire()
    }

    // Locks the stripe guarding the bucket of `hash` in shared mode, returning
    // the bucket's index along with the guard.
    fn read_bucket(
        &self,
        hash: u32,
        deadline: Option<Instant>,
    ) -> Result<(usize, RwLockReadGuard<'_, ()>), LockTimeout> {
        loop {
            let (size, bucket, guard) = self.coordinate(|| {
                let size = self.size.load(Ordering::Acquire);
                let bucket = bucket_index(hash, size);
                let stripe = &self.stripes[stripe_index(bucket, self.stripes.len())];

                let guard = match deadline {
                    Some(deadline) => stripe.try_read_until(deadline).ok_or(LockTimeout),
                    None => Ok(stripe.read()),
                };

                guard.map(|guard| (size, bucket, guard))
            })?;

            // If the table was resized before we got the stripe, the stripe may
            // not guard the bucket anymore.
            if self.size.load(Ordering::Acquire) == size {
                return Ok((bucket, guard));
            }
        }
    }

    // Locks the stripe guarding the bucket of `hash` in exclusive mode,
    // returning the table size and the bucket's index along with the guard.
    fn write_bucket(
        &self,
        hash: u32,
        deadline: Option<Instant>,
    ) -> Result<(usize, usize, RwLockWriteGuard<'_, ()>), LockTimeout> {
        loop {
            let (size, bucket, guard) = self.coordinate(|| {
                let size = self.size.load(Ordering::Acquire);
                let bucket = bucket_index(hash, size);
                let stripe = &self.stripes[stripe_index(bucket, self.stripes.len())];

                let guard = match deadline {
                    Some(deadline) => stripe.try_write_until(deadline).ok_or(LockTimeout),
                    None => Ok(stripe.write()),
                };

                guard.map(|guard| (size, bucket, guard))
            })?;

            if self.size.load(Ordering::Acquire) == size {
                return Ok((size, bucket, guard));
            }
        }
    }

    // Acquires every stripe in exclusive mode, in ascending order.
    //
    // Resize is the only path that holds more than one stripe at a time, and
    // the fixed order is what keeps two of them from deadlocking.
    fn lock_all(&self) -> impl Drop + '_ {
        for stripe in self.stripes.iter() {
            unsafe { stripe.raw().lock_exclusive() }
        }

        struct Unlock<'a>(&'a [RwLock<()>]);

        impl Drop for Unlock<'_> {
            fn drop(&mut self) {
                for stripe in self.0.iter() {
                    unsafe { stripe.raw().unlock_exclusive() }
                }
            }
        }

        Unlock(&self.stripes)
    }

    // Calls `f` on the value stored under `key`.
    pub fn find<R>(
        &self,
        key: &str,
        deadline: Option<Instant>,
        f: impl FnOnce(&V) -> R,
    ) -> Result<Option<R>, LockTimeout> {
        let hash = hashcode(key);
        let (bucket, _guard) = self.read_bucket(hash, deadline).map_err(|timeout| {
            tracing::trace!(key = %key, "timed out acquiring a stripe for lookup");
            timeout
        })?;

        let mut node = unsafe { (*self.bucket(bucket).head.get()).as_deref() };
        while let Some(n) = node {
            if n.hash == hash && n.key == key {
                return Ok(Some(f(&n.value)));
            }

            node = n.next.as_deref();
        }

        Ok(None)
    }

    // Inserts a new entry, failing if the key is already present.
    pub fn insert(&self, key: String, value: V, deadline: Option<Instant>) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let hash = hashcode(&key);

        let (size, collisions) = {
            let (size, bucket, _guard) = self.write_bucket(hash, deadline).map_err(|timeout| {
                tracing::trace!(key = %key, "timed out acquiring a stripe for insert");
                timeout
            })?;

            // Walk to the end of the chain, counting the entries passed on the way.
            let mut collisions = 0;
            let mut tail = unsafe { &mut *self.bucket(bucket).head.get() };
            while let Some(node) = tail {
                if node.hash == hash && node.key == key {
                    return Err(Error::DuplicateKey { key });
                }

                collisions += 1;
                tail = &mut node.next;
            }

            *tail = Some(Box::new(Node {
                hash,
                key,
                value,
                next: None,
            }));

            self.counts[stripe_index(bucket, self.stripes.len())].fetch_add(1, Ordering::Relaxed);

            (size, collisions)
        };

        // The stripe is released by now. Resizing needs every stripe, so it
        // must not start while this thread holds one.
        if self.allow_resize && collisions >= self.collision_threshold {
            self.resize(size, 0).map_err(|err| {
                tracing::warn!(hash, size, "entry stored, but the table could not grow");
                err
            })?;
        }

        Ok(())
    }

    // Grows the table until it has at least `min` buckets, regardless of
    // whether automatic resizing is enabled.
    pub fn reserve(&self, min: usize) -> Result<(), Error> {
        loop {
            let size = self.size();
            if size >= min {
                return Ok(());
            }

            self.resize(size, min)?;
        }
    }

    // Replaces the bucket array with one of at least twice the size.
    //
    // `observed` is the size seen by the caller when it decided the table was
    // too small. If the size changed by the time we hold the resize lock,
    // another thread already grew the table and there is nothing to do.
    fn resize(&self, observed: usize, min: usize) -> Result<(), Error> {
        let _resizing = self.resize.lock();
        self.resizing.store(true, Ordering::Release);
        let result = self.grow(observed, min);
        self.resizing.store(false, Ordering::Release);
        result
    }

    // The body of `resize`, run with the resize lock held.
    fn grow(&self, observed: usize, min: usize) -> Result<(), Error> {
        let size = self.size.load(Ordering::Acquire);
        if size != observed {
            tracing::trace!(observed, size, "table already resized");
            return Ok(());
        }

        // Allocate before touching any lock or entry, so that a failure leaves
        // the table as it was.
        let new_size = resize::grown_size(size, min).ok_or(Error::AllocationFailure {
            buckets: usize::MAX,
        })?;

        let mut new_buckets = Vec::new();
        if new_buckets.try_reserve_exact(new_size).is_err() {
            tracing::warn!(size, new_size, "failed to allocate a larger bucket array");
            return Err(Error::AllocationFailure { buckets: new_size });
        }
        new_buckets.extend(iter::repeat_with(Bucket::default).take(new_size));

        let stripes = self.stripes.len();
        let mut new_counts = vec![0; stripes];

        // Every stripe must be held, not just the ones guarding old buckets:
        // after the swap, each stripe guards a different set of buckets.
        let _stripes = self.lock_all();

        // Safety: we hold every stripe exclusively.
        let buckets = unsafe { &mut *self.buckets.get() };

        // Move every node to the head of its new bucket.
        for bucket in buckets.iter_mut() {
            let mut next = bucket.head.get_mut().take();
            while let Some(mut node) = next {
                next = node.next.take();

                let index = bucket_index(node.hash, new_size);
                let head = new_buckets[index].head.get_mut();
                node.next = head.take();
                *head = Some(node);

                new_counts[stripe_index(index, stripes)] += 1;
            }
        }

        *buckets = new_buckets.into_boxed_slice();
        self.size.store(new_size, Ordering::Release);

        for (count, new) in self.counts.iter().zip(new_counts) {
            count.store(new, Ordering::Relaxed);
        }

        tracing::debug!(size, new_size, len = self.len(), "resized table");

        Ok(())
    }
}

/// Computes the bucket index for a particular hash.
fn bucket_index(hash: u32, size: usize) -> usize {
    let bucket_index = hash as usize % size;
    debug_assert!(bucket_index < size);

    bucket_index
}

/// Computes the stripe index for a particular bucket.
fn stripe_index(bucket_index: usize, stripe_count: usize) -> usize {
    let stripe_index = bucket_index % stripe_count;
    debug_assert!(stripe_index < stripe_count);

    stripe_index
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    fn config(capacity: usize, stripes: usize, threshold: usize) -> Config {
        Config {
            capacity,
            allow_resize: true,
            stripes,
            collision_threshold: threshold,
            lock_timeout: None,
        }
    }

    // Returns `n` keys not in `exclude` that all land in `bucket` for a table of `size`.
    fn colliding(size: usize, bucket: usize, n: usize, exclude: &[String]) -> Vec<String> {
        (0..)
            .map(|i| format!("key-{i}"))
            .filter(|key| bucket_index(hashcode(key), size) == bucket)
            .filter(|key| !exclude.contains(key))
            .take(n)
            .collect()
    }

    fn chain_lengths<V>(table: &RawTable<V>) -> Vec<usize> {
        let _stripes = table.lock_all();
        let buckets = unsafe { &*table.buckets.get() };
        buckets
            .iter()
            .enumerate()
            .map(|(index, bucket)| {
                let mut len = 0;
                let mut node = unsafe { (*bucket.head.get()).as_deref() };
                while let Some(n) = node {
                    assert_eq!(n.hash, hashcode(&n.key));
                    assert_eq!(bucket_index(n.hash, buckets.len()), index);
                    len += 1;
                    node = n.next.as_deref();
                }
                len
            })
            .collect()
    }

    #[test]
    fn colliding_inserts_resize_twice() {
        let table = RawTable::new(&config(4, 4, 2));
        assert_eq!(table.size(), 5);

        let mut inserted: Vec<String> = Vec::new();
        let mut sizes = vec![table.size()];

        for _ in 0..2 {
            let size = table.size();

            // Pick a bucket nothing has landed in yet, so that exactly the third
            // key pushes its chain to the threshold.
            let bucket = (0..size)
                .find(|&b| inserted.iter().all(|k| bucket_index(hashcode(k), size) != b))
                .unwrap();

            for key in colliding(size, bucket, 3, &inserted) {
                table.insert(key.clone(), key.len(), None).unwrap();
                inserted.push(key);
            }

            assert!(table.size() > size);
            assert!(resize::is_prime(table.size()));
            sizes.push(table.size());

            for key in &inserted {
                assert_eq!(table.find(key, None, |v| *v).unwrap(), Some(key.len()));
            }
        }

        assert_eq!(sizes, [5, 11, 23]);
        assert_eq!(table.len(), inserted.len());

        let lengths = chain_lengths(&table);
        assert_eq!(lengths.len(), 23);
        assert_eq!(lengths.iter().sum::<usize>(), inserted.len());
    }

    #[test]
    fn resize_disabled_keeps_size() {
        let mut config = config(4, 4, 2);
        config.allow_resize = false;
        let table = RawTable::new(&config);

        for key in colliding(5, 3, 20, &[]) {
            table.insert(key, (), None).unwrap();
        }

        assert_eq!(table.size(), 5);
        assert_eq!(chain_lengths(&table)[3], 20);
    }

    #[test]
    fn counts_follow_stripes_across_resize() {
        let table = RawTable::new(&config(0, 3, 4));
        for i in 0..500 {
            table.insert(format!("{i}"), i, None).unwrap();
        }

        assert!(table.size() > 2);
        assert_eq!(table.len(), 500);

        let lengths = chain_lengths(&table);
        for (stripe, count) in table.counts.iter().enumerate() {
            let expected: usize = lengths
                .iter()
                .enumerate()
                .filter(|(bucket, _)| stripe_index(*bucket, 3) == stripe)
                .map(|(_, len)| len)
                .sum();
            assert_eq!(count.load(Ordering::Relaxed), expected);
        }
    }

    #[test]
    fn insert_times_out_on_held_stripe() {
        let mut config = config(10, 4, 10);
        config.lock_timeout = Some(Duration::from_millis(10));
        let table = RawTable::new(&config);

        let bucket = bucket_index(hashcode("held"), table.size());
        let _held = table.stripes[stripe_index(bucket, 4)].read();

        let result = table.insert("held".into(), 1, table.deadline());
        assert_eq!(result, Err(Error::LockTimeout(LockTimeout)));
        assert_eq!(table.len(), 0);

        // Shared access is still granted alongside another reader.
        assert_eq!(table.find("held", table.deadline(), |v| *v), Ok(None));
    }

    #[test]
    fn resize_waits_for_every_stripe() {
        let table = RawTable::new(&config(4, 4, 2));
        let keys = colliding(5, 0, 3, &[]);

        // Bucket 0 is guarded by stripe 0; hold the last one instead.
        let held = table.stripes[3].read();

        thread::scope(|s| {
            let inserter = s.spawn(|| {
                for key in &keys {
                    table.insert(key.clone(), (), None).unwrap();
                }
            });

            let start = Instant::now();
            while unsafe { table.stripes[3].raw() }.state().waiting_writers == 0 {
                assert!(start.elapsed() < Duration::from_secs(10));
                thread::sleep(Duration::from_millis(1));
            }

            assert_eq!(table.size(), 5);
            assert!(table.resizing.load(Ordering::Acquire));
            assert!(table.waiter_count() >= 1);

            drop(held);
            inserter.join().unwrap();
        });

        assert_eq!(table.size(), 11);
        assert!(!table.resizing.load(Ordering::Acquire));
        for key in &keys {
            assert_eq!(table.find(key, None, |_| ()), Ok(Some(())));
        }
    }

    #[test]
    fn zero_threshold_acts_as_one() {
        let table = RawTable::new(&config(4, 2, 0));
        assert_eq!(table.collision_threshold, 1);

        // The first key of a bucket walks past nothing, so it never grows the table.
        let keys = colliding(5, 1, 1, &[]);
        table.insert(keys[0].clone(), (), None).unwrap();
        assert_eq!(table.size(), 5);

        // The second key of the same bucket does.
        let keys = colliding(5, 1, 2, &[]);
        table.insert(keys[1].clone(), (), None).unwrap();
        assert_eq!(table.size(), 11);
    }

    #[test]
    fn stale_resize_is_skipped() {
        let table = RawTable::<()>::new(&config(4, 2, 10));
        table.resize(5, 0).unwrap();
        assert_eq!(table.size(), 11);

        // A second trigger based on the old size must not grow again.
        table.resize(5, 0).unwrap();
        assert_eq!(table.size(), 11);
    }

    #[test]
    fn reserve_grows_past_minimum() {
        let mut config = config(4, 2, 10);
        config.allow_resize = false;
        let table = RawTable::<()>::new(&config);

        table.reserve(100).unwrap();
        assert!(table.size() >= 100);
        assert!(resize::is_prime(table.size()));

        let size = table.size();
        table.reserve(10).unwrap();
        assert_eq!(table.size(), size);
    }
}
