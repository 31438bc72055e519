//! # atomap
//!
//! A lock-free atomic hash map built on a persistent hash array mapped trie.
//!
//! ## Overview
//!
//! This library provides two layered components:
//!
//! - [`persistent::TrieMap`]: an immutable hash map based on a Hash Array
//!   Mapped Trie (HAMT). Every operation returns a new map and shares
//!   unmodified substructure with the original, so snapshots are cheap and
//!   safe to read from any number of threads.
//! - [`atom::AtomHashMap`]: a mutable cell holding the current `TrieMap`
//!   snapshot. Every mutator is an atomic, lock-free read-modify-write
//!   transaction over that cell, retried with compare-and-swap until it
//!   commits. No locks are taken at any point.
//!
//! ## Example
//!
//! ```rust
//! use atomap::prelude::*;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map: Arc<AtomHashMap<String, i32>> = Arc::new(AtomHashMap::new());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|index| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || map.insert(format!("key-{index}"), index))
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(map.len(), 4);
//! assert_eq!(map.get("key-2"), Some(2));
//! ```
//!
//! ## Idempotence contract
//!
//! Because mutators retry on contention, any closure passed to an
//! [`atom::AtomHashMap`] mutator may run more than once for a single
//! logical call. Such closures must be pure and idempotent: no I/O, no
//! captured mutable state. See the [`atom`] module documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types.
///
/// # Usage
///
/// ```rust
/// use atomap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::atom::AtomHashMap;
    pub use crate::error::MapError;
    pub use crate::persistent::{TrieMap, TrieMapView};
}

pub mod atom;
pub mod error;
pub mod persistent;
