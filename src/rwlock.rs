//! A reader-writer lock with writer priority and deadline-bounded acquisition.
//!
//! The lock is built from a single mutex protecting four counters and two
//! condition variables, one per role. A reader is admitted only when no writer
//! holds the lock *and* no writer is waiting for it, so a steady stream of
//! readers can never starve a writer. The converse does not hold: a steady
//! stream of writers can starve readers.
//!
//! [`RawRwLock`] implements [`lock_api::RawRwLock`] and
//! [`lock_api::RawRwLockTimed`], so [`RwLock`] offers the usual RAII guards on
//! top of it.
//!
//! The lock is not reentrant. A thread that holds it in shared mode and asks
//! for it again will block behind any waiting writer.

use std::fmt;
use std::time::{Duration, Instant};

use lock_api::GuardSend;
use parking_lot::{Condvar, Mutex, MutexGuard};

/// A reader-writer lock guarding a value of type `T`.
pub type RwLock<T> = lock_api::RwLock<RawRwLock, T>;

/// A guard granting shared access to the value of a [`RwLock`].
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwLock, T>;

/// A guard granting exclusive access to the value of a [`RwLock`].
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwLock, T>;

/// The deadline passed to an acquisition elapsed before the lock was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("lock acquisition deadline elapsed")]
pub struct LockTimeout;

/// A snapshot of the bookkeeping of a [`RawRwLock`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    /// Threads currently holding the lock in shared mode.
    pub readers: usize,
    /// Threads currently holding the lock in exclusive mode, 0 or 1.
    pub writers: usize,
    /// Threads blocked in a shared acquisition.
    pub waiting_readers: usize,
    /// Threads blocked in an exclusive acquisition.
    pub waiting_writers: usize,
}

impl LockState {
    const UNLOCKED: LockState = LockState {
        readers: 0,
        writers: 0,
        waiting_readers: 0,
        waiting_writers: 0,
    };

    fn admits_reader(&self) -> bool {
        self.writers == 0 && self.waiting_writers == 0
    }

    fn admits_writer(&self) -> bool {
        self.writers == 0 && self.readers == 0
    }
}

/// The raw lock. Acquisition and release are not tied to a guard, so every
/// successful `acquire_*` must be paired with the matching `release_*`.
pub struct RawRwLock {
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
}

impl RawRwLock {
    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LockState::UNLOCKED),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    /// Acquires the lock in shared mode, blocking while a writer holds the lock
    /// or is waiting for it.
    ///
    /// If `deadline` passes first, the call returns [`LockTimeout`] and leaves
    /// the lock exactly as if it had never been made.
    pub fn acquire_shared(&self, deadline: Option<Instant>) -> Result<(), LockTimeout> {
        let mut state = self.state.lock();
        state.waiting_readers += 1;

        while !state.admits_reader() {
            if wait(&self.readers, &mut state, deadline) && !state.admits_reader() {
                state.waiting_readers -= 1;
                return Err(LockTimeout);
            }
        }

        state.waiting_readers -= 1;
        state.readers += 1;
        Ok(())
    }

    /// Acquires the lock in shared mode if that is possible without blocking.
    pub fn try_acquire_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.admits_reader() {
            state.readers += 1;
            true
        } else {
            false
        }
    }

    /// Releases a shared acquisition. The last reader out hands the lock to a
    /// waiting writer, if there is one.
    pub fn release_shared(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0, "release_shared without a reader");
        state.readers -= 1;

        if state.readers == 0 && state.waiting_writers > 0 {
            self.writers.notify_one();
        }
    }

    /// Acquires the lock in exclusive mode, blocking while any reader or
    /// writer holds it.
    ///
    /// If `deadline` passes first, the call returns [`LockTimeout`] and leaves
    /// the lock exactly as if it had never been made.
    pub fn acquire_exclusive(&self, deadline: Option<Instant>) -> Result<(), LockTimeout> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;

        while !state.admits_writer() {
            if wait(&self.writers, &mut state, deadline) && !state.admits_writer() {
                state.waiting_writers -= 1;

                // Readers parked only because this writer was queued may go now.
                if state.admits_reader() && state.waiting_readers > 0 {
                    self.readers.notify_all();
                }

                return Err(LockTimeout);
            }
        }

        state.waiting_writers -= 1;
        state.writers = 1;
        Ok(())
    }

    /// Acquires the lock in exclusive mode if that is possible without blocking.
    pub fn try_acquire_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if state.admits_writer() {
            state.writers = 1;
            true
        } else {
            false
        }
    }

    /// Releases an exclusive acquisition.
    ///
    /// A waiting writer is preferred. Otherwise every waiting reader is woken
    /// at once, since they can all share the lock.
    pub fn release_exclusive(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.writers, 1, "release_exclusive without a writer");
        state.writers = 0;

        if state.waiting_writers > 0 {
            self.writers.notify_one();
        } else if state.waiting_readers > 0 {
            self.readers.notify_all();
        }
    }

    /// The number of threads blocked waiting for the lock, in either mode.
    ///
    /// Threads that already hold the lock are not counted. The value is stale
    /// as soon as it is returned and is meant for diagnostics only.
    pub fn waiter_count(&self) -> usize {
        let state = self.state.lock();
        state.waiting_readers + state.waiting_writers
    }

    /// Returns a snapshot of the lock's counters.
    pub fn state(&self) -> LockState {
        *self.state.lock()
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawRwLock").field(&self.state()).finish()
    }
}

// Blocks on `cond` until notified or until `deadline`. Returns `true` on timeout.
fn wait(cond: &Condvar, state: &mut MutexGuard<'_, LockState>, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => cond.wait_until(state, deadline).timed_out(),
        None => {
            cond.wait(state);
            false
        }
    }
}

unsafe impl lock_api::RawRwLock for RawRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawRwLock = RawRwLock::new();

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        let acquired = self.acquire_shared(None);
        debug_assert!(acquired.is_ok());
    }

    fn try_lock_shared(&self) -> bool {
        self.try_acquire_shared()
    }

    unsafe fn unlock_shared(&self) {
        self.release_shared();
    }

    fn lock_exclusive(&self) {
        let acquired = self.acquire_exclusive(None);
        debug_assert!(acquired.is_ok());
    }

    fn try_lock_exclusive(&self) -> bool {
        self.try_acquire_exclusive()
    }

    unsafe fn unlock_exclusive(&self) {
        self.release_exclusive();
    }
}

unsafe impl lock_api::RawRwLockTimed for RawRwLock {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_shared_for(&self, timeout: Duration) -> bool {
        // An unrepresentable deadline is as good as no deadline.
        self.acquire_shared(Instant::now().checked_add(timeout))
            .is_ok()
    }

    fn try_lock_shared_until(&self, timeout: Instant) -> bool {
        self.acquire_shared(Some(timeout)).is_ok()
    }

    fn try_lock_exclusive_for(&self, timeout: Duration) -> bool {
        self.acquire_exclusive(Instant::now().checked_add(timeout))
            .is_ok()
    }

    fn try_lock_exclusive_until(&self, timeout: Instant) -> bool {
        self.acquire_exclusive(Some(timeout)).is_ok()
    }
}
