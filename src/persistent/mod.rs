//! Persistent (immutable) associative storage.
//!
//! This module provides [`TrieMap`], an immutable hash map based on a hash
//! array mapped trie, and [`TrieMapView`], a zero-allocation read-only
//! borrow of one.
//!
//! # Structural sharing
//!
//! Every operation returns a new map without modifying the original;
//! unmodified subtrees are shared by reference between versions. A snapshot
//! held by one thread is never invalidated by operations performed on
//! another version of the same map, which is what makes
//! [`crate::atom::AtomHashMap`]'s lock-free swap loop sound.
//!
//! # Examples
//!
//! ```rust
//! use atomap::persistent::TrieMap;
//!
//! let map = TrieMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```

mod triemap;

pub use triemap::TrieMap;
pub use triemap::TrieMapIntoIterator;
pub use triemap::TrieMapIterator;
pub use triemap::TrieMapView;
