//! A resizable hash table guarded by a fixed set of striped reader-writer locks.
//!
//! Keys are strings and values are opaque handles. Each bucket is a chain of
//! entries, and bucket `i` is guarded by stripe `i % stripes`, a
//! [writer-priority reader-writer lock](rwlock::RawRwLock). Lookups hold their
//! stripe in shared mode, inserts in exclusive mode.
//!
//! When an insert finds a chain at the collision threshold, the table grows to
//! the next prime at least twice its size. Growing takes every stripe in
//! ascending order and relinks the existing entries into the new bucket array,
//! so it appears atomic to every other operation.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use striped_htable::Table;
//!
//! let table = Arc::new(Table::new(16, true));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let table = Arc::clone(&table);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 table.insert(format!("{t}:{i}"), i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(table.len(), 400);
//! assert_eq!(table.lookup("3:99"), Some(99));
//! ```

#![deny(rust_2018_idioms, clippy::all)]

mod builder;
pub use builder::Builder;

mod error;
pub use error::Error;

mod hash;
pub use hash::{hashcode, BIG_PRIME};

mod map;
pub use map::Table;

mod raw;
mod resize;

pub mod rwlock;
