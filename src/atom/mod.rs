//! Lock-free atomic state built on persistent snapshots.
//!
//! This module provides [`AtomHashMap`], a mutable cell holding the current
//! [`crate::persistent::TrieMap`] snapshot. Every mutator is an optimistic
//! read-modify-write transaction: read the snapshot, compute a new map with
//! a pure persistent operation, and publish it with a compare-and-swap,
//! retrying on contention. No locks are taken and readers never block.
//!
//! # Idempotence contract
//!
//! Because a transaction retries when another thread commits first, any
//! closure passed to a mutator may run more than once for a single logical
//! call. Closures must therefore be pure and idempotent: no I/O, no
//! captured mutable state, and as little work as possible to keep the retry
//! window short. The map's own state stays correct regardless, but repeated
//! side effects inside a closure are a caller bug the library cannot
//! detect.
//!
//! # Examples
//!
//! ```rust
//! use atomap::atom::AtomHashMap;
//!
//! let map: AtomHashMap<String, i32> = AtomHashMap::new();
//! map.insert("hits".to_string(), 0);
//! map.set_with("hits", |hits| hits + 1).unwrap();
//!
//! assert_eq!(map.get("hits"), Some(1));
//! ```

mod hashmap;

pub use hashmap::AtomHashMap;
