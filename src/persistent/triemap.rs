//! Persistent (immutable) hash map based on a hash array mapped trie.
//!
//! This module provides [`TrieMap`], an immutable hash map with structural
//! sharing, and [`TrieMapView`], a zero-allocation read-only borrow of one.
//!
//! # Overview
//!
//! `TrieMap` is a Hash Array Mapped Trie (HAMT): a 32-way branching trie
//! navigated by successive 5-bit chunks of each key's hash. Every operation
//! returns a new map and leaves the receiver untouched; unmodified subtrees
//! are shared by reference between the old and new versions.
//!
//! - O(log32 N) get (effectively O(1) for practical sizes)
//! - O(log32 N) insert
//! - O(log32 N) remove
//! - O(1) len, `is_empty` and clone
//!
//! Nodes are shared via [`Arc`], so snapshots may be read concurrently from
//! any number of threads without synchronization. This is what allows
//! [`crate::atom::AtomHashMap`] to swap whole snapshots atomically.
//!
//! # Examples
//!
//! ```rust
//! use atomap::persistent::TrieMap;
//!
//! let map = TrieMap::new()
//!     .insert("one".to_string(), 1)
//!     .insert("two".to_string(), 2);
//!
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert("one".to_string(), 100);
//! assert_eq!(map.get("one"), Some(&1));       // Original unchanged
//! assert_eq!(updated.get("one"), Some(&100)); // New version
//! ```
//!
//! # Key equality
//!
//! Hashing is pluggable through the `S: BuildHasher` type parameter,
//! supplied with [`TrieMap::with_hasher`]. Key equality comes from `K: Eq`;
//! custom equality semantics (for example case-insensitive strings) are
//! expressed with a newtype key whose `Hash` and `Eq` implementations agree.
//! The hasher is stored in the map and inherited by every derived map, so
//! all versions of one lineage hash keys identically.
//!
//! # Internal structure
//!
//! - 32-way branching, 5 bits of hash per level
//! - bitmap-compressed child arrays (occupied slots only)
//! - collision chains for keys whose full 64-bit hashes are equal
//! - structural sharing via `Arc`

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::iter::FromIterator;
use std::ops::Index;
use std::sync::Arc;

use crate::error::MapError;

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^5 = 32).
const BRANCHING_FACTOR: usize = 32;

/// Bits of hash consumed per trie level.
const BITS_PER_LEVEL: usize = 5;

/// Mask for extracting a child index from a hash.
const MASK: u64 = (BRANCHING_FACTOR - 1) as u64;

/// Extracts the child index at a given depth from a hash.
#[inline]
const fn hash_index(hash: u64, depth: usize) -> usize {
    ((hash >> (depth * BITS_PER_LEVEL)) & MASK) as usize
}

// =============================================================================
// Node Definition
// =============================================================================

/// Internal trie node.
#[derive(Clone)]
enum Node<K, V> {
    /// No entries. Only ever the root of an empty map or a transient
    /// product of removal, never stored inside a branch.
    Empty,
    /// A single key-value pair.
    Leaf { hash: u64, key: K, value: V },
    /// Bitmap-indexed branch with compressed child slots.
    Branch {
        bitmap: u32,
        children: Arc<[Slot<K, V>]>,
    },
    /// Entries whose full hashes are equal.
    Collision { hash: u64, entries: Arc<[(K, V)]> },
}

/// A slot in a branch node: either an inline pair or a subtree.
#[derive(Clone)]
enum Slot<K, V> {
    Leaf { hash: u64, key: K, value: V },
    Branch(Arc<Node<K, V>>),
}

// =============================================================================
// Lookup
// =============================================================================

fn lookup<'a, K, V, Q>(
    node: &'a Node<K, V>,
    key: &Q,
    hash: u64,
    depth: usize,
) -> Option<(&'a K, &'a V)>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    match node {
        Node::Empty => None,
        Node::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            value,
        } => {
            if *leaf_hash == hash && leaf_key.borrow() == key {
                Some((leaf_key, value))
            } else {
                None
            }
        }
        Node::Branch { bitmap, children } => {
            let bit = 1u32 << hash_index(hash, depth);
            if bitmap & bit == 0 {
                return None;
            }
            let position = (bitmap & (bit - 1)).count_ones() as usize;
            match &children[position] {
                Slot::Leaf {
                    hash: leaf_hash,
                    key: leaf_key,
                    value,
                } => {
                    if *leaf_hash == hash && leaf_key.borrow() == key {
                        Some((leaf_key, value))
                    } else {
                        None
                    }
                }
                Slot::Branch(subnode) => lookup(subnode, key, hash, depth + 1),
            }
        }
        Node::Collision {
            hash: collision_hash,
            entries,
        } => {
            if *collision_hash != hash {
                return None;
            }
            entries
                .iter()
                .find(|(entry_key, _)| entry_key.borrow() == key)
                .map(|(entry_key, value)| (entry_key, value))
        }
    }
}

// =============================================================================
// Insertion
// =============================================================================

/// Inserts a pair into a node, replacing on key match.
/// Returns the new node and whether the entry count grew.
fn insert_at<K, V>(node: &Node<K, V>, hash: u64, key: K, value: V, depth: usize) -> (Node<K, V>, bool)
where
    K: Clone + Eq,
    V: Clone,
{
    match node {
        Node::Empty => (Node::Leaf { hash, key, value }, true),
        Node::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            value: leaf_value,
        } => {
            if *leaf_hash == hash && *leaf_key == key {
                (Node::Leaf { hash, key, value }, false)
            } else if *leaf_hash == hash {
                let entries = Arc::from(vec![(leaf_key.clone(), leaf_value.clone()), (key, value)]);
                (Node::Collision { hash, entries }, true)
            } else {
                let split = split_leaves(
                    *leaf_hash,
                    leaf_key.clone(),
                    leaf_value.clone(),
                    hash,
                    key,
                    value,
                    depth,
                );
                (split, true)
            }
        }
        Node::Branch { bitmap, children } => {
            insert_into_branch(*bitmap, children, hash, key, value, depth)
        }
        Node::Collision {
            hash: collision_hash,
            entries,
        } => {
            if hash == *collision_hash {
                insert_into_collision(hash, entries, key, value)
            } else {
                lift_collision(*collision_hash, entries, hash, key, value, depth)
            }
        }
    }
}

/// Builds a branch holding two leaves with distinct hashes, recursing while
/// they still share a child index. Distinct 64-bit hashes diverge within the
/// trie's maximum depth, so the recursion terminates.
fn split_leaves<K, V>(
    existing_hash: u64,
    existing_key: K,
    existing_value: V,
    hash: u64,
    key: K,
    value: V,
    depth: usize,
) -> Node<K, V>
where
    K: Clone + Eq,
    V: Clone,
{
    let existing_index = hash_index(existing_hash, depth);
    let new_index = hash_index(hash, depth);

    if existing_index == new_index {
        let subnode = split_leaves(
            existing_hash,
            existing_key,
            existing_value,
            hash,
            key,
            value,
            depth + 1,
        );
        Node::Branch {
            bitmap: 1u32 << existing_index,
            children: Arc::from(vec![Slot::Branch(Arc::new(subnode))]),
        }
    } else {
        let bitmap = (1u32 << existing_index) | (1u32 << new_index);
        let existing_slot = Slot::Leaf {
            hash: existing_hash,
            key: existing_key,
            value: existing_value,
        };
        let new_slot = Slot::Leaf { hash, key, value };
        let slots = if existing_index < new_index {
            vec![existing_slot, new_slot]
        } else {
            vec![new_slot, existing_slot]
        };
        Node::Branch {
            bitmap,
            children: Arc::from(slots),
        }
    }
}

fn insert_into_branch<K, V>(
    bitmap: u32,
    children: &Arc<[Slot<K, V>]>,
    hash: u64,
    key: K,
    value: V,
    depth: usize,
) -> (Node<K, V>, bool)
where
    K: Clone + Eq,
    V: Clone,
{
    let bit = 1u32 << hash_index(hash, depth);
    let position = (bitmap & (bit - 1)).count_ones() as usize;

    if bitmap & bit == 0 {
        let mut slots = children.to_vec();
        slots.insert(position, Slot::Leaf { hash, key, value });
        return (
            Node::Branch {
                bitmap: bitmap | bit,
                children: Arc::from(slots),
            },
            true,
        );
    }

    let (new_slot, added) = match &children[position] {
        Slot::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            value: leaf_value,
        } => {
            if *leaf_hash == hash && *leaf_key == key {
                (Slot::Leaf { hash, key, value }, false)
            } else if *leaf_hash == hash {
                let entries = Arc::from(vec![(leaf_key.clone(), leaf_value.clone()), (key, value)]);
                let collision = Node::Collision { hash, entries };
                (Slot::Branch(Arc::new(collision)), true)
            } else {
                let split = split_leaves(
                    *leaf_hash,
                    leaf_key.clone(),
                    leaf_value.clone(),
                    hash,
                    key,
                    value,
                    depth + 1,
                );
                (Slot::Branch(Arc::new(split)), true)
            }
        }
        Slot::Branch(subnode) => {
            let (new_subnode, added) = insert_at(subnode, hash, key, value, depth + 1);
            (Slot::Branch(Arc::new(new_subnode)), added)
        }
    };

    let mut slots = children.to_vec();
    slots[position] = new_slot;
    (
        Node::Branch {
            bitmap,
            children: Arc::from(slots),
        },
        added,
    )
}

fn insert_into_collision<K, V>(
    hash: u64,
    entries: &Arc<[(K, V)]>,
    key: K,
    value: V,
) -> (Node<K, V>, bool)
where
    K: Clone + Eq,
    V: Clone,
{
    let mut new_entries = entries.to_vec();
    if let Some(slot) = new_entries.iter_mut().find(|(entry_key, _)| *entry_key == key) {
        slot.1 = value;
        (
            Node::Collision {
                hash,
                entries: Arc::from(new_entries),
            },
            false,
        )
    } else {
        new_entries.push((key, value));
        (
            Node::Collision {
                hash,
                entries: Arc::from(new_entries),
            },
            true,
        )
    }
}

/// Pushes a collision node one level down to make room for a pair whose
/// hash differs from the collision hash.
fn lift_collision<K, V>(
    collision_hash: u64,
    entries: &Arc<[(K, V)]>,
    hash: u64,
    key: K,
    value: V,
    depth: usize,
) -> (Node<K, V>, bool)
where
    K: Clone + Eq,
    V: Clone,
{
    let collision_index = hash_index(collision_hash, depth);
    let new_index = hash_index(hash, depth);
    let collision = Node::Collision {
        hash: collision_hash,
        entries: Arc::clone(entries),
    };

    if collision_index == new_index {
        let (subnode, added) = insert_at(&collision, hash, key, value, depth + 1);
        (
            Node::Branch {
                bitmap: 1u32 << collision_index,
                children: Arc::from(vec![Slot::Branch(Arc::new(subnode))]),
            },
            added,
        )
    } else {
        let bitmap = (1u32 << collision_index) | (1u32 << new_index);
        let collision_slot = Slot::Branch(Arc::new(collision));
        let new_slot = Slot::Leaf { hash, key, value };
        let slots = if collision_index < new_index {
            vec![collision_slot, new_slot]
        } else {
            vec![new_slot, collision_slot]
        };
        (
            Node::Branch {
                bitmap,
                children: Arc::from(slots),
            },
            true,
        )
    }
}

// =============================================================================
// Removal
// =============================================================================

/// Removes a key from a node. Returns `Some(new_node)` when the key was
/// present, `None` when nothing changed.
fn remove_at<K, V, Q>(node: &Node<K, V>, key: &Q, hash: u64, depth: usize) -> Option<Node<K, V>>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    match node {
        Node::Empty => None,
        Node::Leaf {
            hash: leaf_hash,
            key: leaf_key,
            ..
        } => {
            if *leaf_hash == hash && leaf_key.borrow() == key {
                Some(Node::Empty)
            } else {
                None
            }
        }
        Node::Branch { bitmap, children } => {
            remove_from_branch(*bitmap, children, key, hash, depth)
        }
        Node::Collision {
            hash: collision_hash,
            entries,
        } => remove_from_collision(*collision_hash, entries, key, hash),
    }
}

fn remove_from_branch<K, V, Q>(
    bitmap: u32,
    children: &Arc<[Slot<K, V>]>,
    key: &Q,
    hash: u64,
    depth: usize,
) -> Option<Node<K, V>>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    let bit = 1u32 << hash_index(hash, depth);
    if bitmap & bit == 0 {
        return None;
    }
    let position = (bitmap & (bit - 1)).count_ones() as usize;

    match &children[position] {
        Slot::Leaf {
            key: leaf_key,
            ..
        } => {
            if leaf_key.borrow() == key {
                Some(drop_slot(bitmap, children, position, bit))
            } else {
                None
            }
        }
        Slot::Branch(subnode) => {
            let new_subnode = remove_at(subnode, key, hash, depth + 1)?;
            match new_subnode {
                Node::Empty => Some(drop_slot(bitmap, children, position, bit)),
                Node::Leaf {
                    hash: leaf_hash,
                    key: leaf_key,
                    value,
                } => {
                    let mut slots = children.to_vec();
                    slots[position] = Slot::Leaf {
                        hash: leaf_hash,
                        key: leaf_key,
                        value,
                    };
                    Some(collapse_branch(bitmap, slots))
                }
                other => {
                    let mut slots = children.to_vec();
                    slots[position] = Slot::Branch(Arc::new(other));
                    Some(Node::Branch {
                        bitmap,
                        children: Arc::from(slots),
                    })
                }
            }
        }
    }
}

/// Removes one slot from a branch, collapsing as far as possible.
fn drop_slot<K, V>(
    bitmap: u32,
    children: &Arc<[Slot<K, V>]>,
    position: usize,
    bit: u32,
) -> Node<K, V>
where
    K: Clone,
    V: Clone,
{
    let new_bitmap = bitmap & !bit;
    if new_bitmap == 0 {
        return Node::Empty;
    }
    let mut slots = children.to_vec();
    slots.remove(position);
    collapse_branch(new_bitmap, slots)
}

/// A branch left holding a single inline pair becomes a leaf; a branch
/// holding a single subtree must stay a branch to keep depths consistent.
fn collapse_branch<K, V>(bitmap: u32, slots: Vec<Slot<K, V>>) -> Node<K, V>
where
    K: Clone,
    V: Clone,
{
    if slots.len() == 1
        && let Slot::Leaf { hash, key, value } = &slots[0]
    {
        return Node::Leaf {
            hash: *hash,
            key: key.clone(),
            value: value.clone(),
        };
    }
    Node::Branch {
        bitmap,
        children: Arc::from(slots),
    }
}

fn remove_from_collision<K, V, Q>(
    collision_hash: u64,
    entries: &Arc<[(K, V)]>,
    key: &Q,
    hash: u64,
) -> Option<Node<K, V>>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Eq + ?Sized,
{
    if hash != collision_hash {
        return None;
    }
    let found = entries
        .iter()
        .position(|(entry_key, _)| entry_key.borrow() == key)?;

    let mut new_entries = entries.to_vec();
    new_entries.remove(found);

    if new_entries.len() == 1 {
        let (remaining_key, remaining_value) = new_entries.remove(0);
        Some(Node::Leaf {
            hash: collision_hash,
            key: remaining_key,
            value: remaining_value,
        })
    } else {
        Some(Node::Collision {
            hash: collision_hash,
            entries: Arc::from(new_entries),
        })
    }
}

// =============================================================================
// TrieMap Definition
// =============================================================================

/// A persistent (immutable) hash map based on a hash array mapped trie.
///
/// Every operation returns a new map; the receiver is never modified.
/// Unmodified subtrees are shared by reference between versions, so updates
/// cost O(log32 N) allocation rather than a full copy, and cloning a map is
/// O(1).
///
/// # Time Complexity
///
/// | Operation      | Complexity |
/// |----------------|------------|
/// | `get`          | O(log32 N) |
/// | `insert`       | O(log32 N) |
/// | `remove`       | O(log32 N) |
/// | `len`          | O(1)       |
/// | `clone`        | O(1)       |
///
/// # Examples
///
/// ```rust
/// use atomap::persistent::TrieMap;
///
/// let map = TrieMap::singleton("key".to_string(), 42);
/// assert_eq!(map.get("key"), Some(&42));
/// ```
pub struct TrieMap<K, V, S = RandomState> {
    /// Root node of the trie.
    root: Arc<Node<K, V>>,
    /// Number of entries, maintained incrementally.
    length: usize,
    /// Hasher shared by every map derived from this one.
    hash_builder: S,
}

impl<K, V, S: Clone> Clone for TrieMap<K, V, S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            length: self.length,
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V> TrieMap<K, V, RandomState> {
    /// Creates a new empty map with the default hasher.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map: TrieMap<String, i32> = TrieMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Creates a map containing a single key-value pair.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::singleton("key".to_string(), 42);
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self
    where
        K: Clone + Hash + Eq,
        V: Clone,
    {
        Self::new().insert(key, value)
    }
}

impl<K, V, S> TrieMap<K, V, S> {
    /// Creates a new empty map that hashes keys with `hash_builder`.
    ///
    /// The hasher is inherited by every map derived from this one, so all
    /// versions of the lineage place keys identically.
    #[inline]
    #[must_use]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            root: Arc::new(Node::Empty),
            length: 0,
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns a reference to the map's hasher.
    #[inline]
    pub const fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns a zero-allocation read-only view of the map.
    ///
    /// The view borrows the map; no entries are copied.
    #[inline]
    #[must_use]
    pub const fn as_view(&self) -> TrieMapView<'_, K, V, S> {
        TrieMapView { map: self }
    }

    /// Returns an iterator over key-value pairs in structural order.
    ///
    /// The order is a pre-order walk of the hash-branch arrays: stable and
    /// restartable for a given map, deterministic for a given hasher, but
    /// unrelated to insertion order.
    #[must_use]
    pub fn iter(&self) -> TrieMapIterator<'_, K, V> {
        TrieMapIterator {
            stack: vec![IterFrame::Node(self.root.as_ref())],
            remaining: self.length,
        }
    }

    /// Returns an iterator over keys in structural order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values in structural order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

// =============================================================================
// Read Operations
// =============================================================================

impl<K, V, S: BuildHasher> TrieMap<K, V, S> {
    #[inline]
    fn hash_of<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new().insert("hello".to_string(), 42);
    ///
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key-value pair matching the given key.
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_of(key);
        lookup(&self.root, key, hash, 0)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns `true` if `predicate` holds for every entry.
    ///
    /// Vacuously `true` on an empty map.
    pub fn for_all<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.iter().all(|(key, value)| predicate(key, value))
    }

    /// Returns `true` if `predicate` holds for at least one entry.
    pub fn exists<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.iter().any(|(key, value)| predicate(key, value))
    }

    /// Folds every entry into an accumulator, in structural order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    ///
    /// let sum = map.fold(0, |accumulator, _, value| accumulator + value);
    /// assert_eq!(sum, 3);
    /// ```
    pub fn fold<B, F>(&self, init: B, mut function: F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        self.iter()
            .fold(init, |accumulator, (key, value)| {
                function(accumulator, key, value)
            })
    }

    /// Returns `true` if both maps contain exactly the same keys,
    /// ignoring values.
    #[must_use]
    pub fn eq_keys(&self, other: &Self) -> bool
    where
        K: Hash + Eq,
    {
        self.length == other.length && self.iter().all(|(key, _)| other.contains_key(key))
    }
}

// =============================================================================
// Write Operations
// =============================================================================

impl<K, V, S> TrieMap<K, V, S>
where
    K: Clone + Hash + Eq,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Inserts a key-value pair, replacing any existing value.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let first = TrieMap::new().insert("key".to_string(), 1);
    /// let second = first.insert("key".to_string(), 2);
    ///
    /// assert_eq!(first.get("key"), Some(&1));  // Original unchanged
    /// assert_eq!(second.get("key"), Some(&2)); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = self.hash_of(&key);
        let (new_root, added) = insert_at(&self.root, hash, key, value, 0);
        Self {
            root: Arc::new(new_root),
            length: if added { self.length + 1 } else { self.length },
            hash_builder: self.hash_builder.clone(),
        }
    }

    /// Inserts a key-value pair, failing if the key is already present.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyAlreadyExists`] if the key is present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::error::MapError;
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new().add("key".to_string(), 1).unwrap();
    /// assert_eq!(
    ///     map.add("key".to_string(), 2).unwrap_err(),
    ///     MapError::KeyAlreadyExists,
    /// );
    /// ```
    pub fn add(&self, key: K, value: V) -> Result<Self, MapError> {
        if self.contains_key(&key) {
            Err(MapError::KeyAlreadyExists)
        } else {
            Ok(self.insert(key, value))
        }
    }

    /// Inserts a key-value pair, returning the map unchanged if the key is
    /// already present.
    #[must_use]
    pub fn try_add(&self, key: K, value: V) -> Self {
        if self.contains_key(&key) {
            self.clone()
        } else {
            self.insert(key, value)
        }
    }

    /// Updates an existing value with `update`, or inserts the result of
    /// `fallback` if the key is absent. `fallback` is only evaluated when
    /// needed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map: TrieMap<String, i32> = TrieMap::new();
    /// let map = map.insert_or_update_with("count".to_string(), |count| count + 1, || 1);
    /// let map = map.insert_or_update_with("count".to_string(), |count| count + 1, || 1);
    ///
    /// assert_eq!(map.get("count"), Some(&2));
    /// ```
    #[must_use]
    pub fn insert_or_update_with<F, G>(&self, key: K, update: F, fallback: G) -> Self
    where
        F: FnOnce(&V) -> V,
        G: FnOnce() -> V,
    {
        match self.get(&key) {
            Some(existing) => {
                let new_value = update(existing);
                self.insert(key, new_value)
            }
            None => self.insert(key, fallback()),
        }
    }

    /// Replaces the value for an existing key.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    pub fn set(&self, key: K, value: V) -> Result<Self, MapError> {
        if self.contains_key(&key) {
            Ok(self.insert(key, value))
        } else {
            Err(MapError::KeyNotFound)
        }
    }

    /// Replaces the value for an existing key with `update(existing)`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new().insert("count".to_string(), 10);
    /// let updated = map.set_with("count", |count| count + 1).unwrap();
    ///
    /// assert_eq!(updated.get("count"), Some(&11));
    /// ```
    pub fn set_with<Q, F>(&self, key: &Q, update: F) -> Result<Self, MapError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> V,
    {
        let (stored_key, value) = self.get_key_value(key).ok_or(MapError::KeyNotFound)?;
        let new_value = update(value);
        Ok(self.insert(stored_key.clone(), new_value))
    }

    /// Replaces the value for a key, returning the map unchanged if the key
    /// is absent.
    #[must_use]
    pub fn try_set(&self, key: K, value: V) -> Self {
        if self.contains_key(&key) {
            self.insert(key, value)
        } else {
            self.clone()
        }
    }

    /// Updates the value for a key with `update(existing)`, returning the
    /// map unchanged if the key is absent.
    #[must_use]
    pub fn try_set_with<Q, F>(&self, key: &Q, update: F) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> V,
    {
        match self.get_key_value(key) {
            Some((stored_key, value)) => {
                let new_value = update(value);
                self.insert(stored_key.clone(), new_value)
            }
            None => self.clone(),
        }
    }

    /// Removes a key, returning the map unchanged if the key is absent.
    ///
    /// # Complexity
    ///
    /// O(log32 N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let removed = map.remove("a");
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get("a"), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_of(key);
        match remove_at(&self.root, key, hash, 0) {
            Some(new_root) => Self {
                root: Arc::new(new_root),
                length: self.length.saturating_sub(1),
                hash_builder: self.hash_builder.clone(),
            },
            None => self.clone(),
        }
    }

    /// Returns the value for `key`, inserting `value` first if the key is
    /// absent.
    ///
    /// The returned map and the returned value always agree: the value is
    /// the one reachable under `key` in the returned map.
    #[must_use]
    pub fn get_or_insert(&self, key: K, value: V) -> (Self, V) {
        self.get_or_insert_with(key, || value)
    }

    /// Returns the value for `key`, inserting `factory()` first if the key
    /// is absent. `factory` is only evaluated when needed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map: TrieMap<String, i32> = TrieMap::new();
    /// let (map, value) = map.get_or_insert_with("k".to_string(), || 7);
    /// assert_eq!(value, 7);
    ///
    /// let (map, value) = map.get_or_insert_with("k".to_string(), || 99);
    /// assert_eq!(value, 7); // Existing value wins
    /// assert_eq!(map.len(), 1);
    /// ```
    #[must_use]
    pub fn get_or_insert_with<F>(&self, key: K, factory: F) -> (Self, V)
    where
        F: FnOnce() -> V,
    {
        match self.get(&key) {
            Some(existing) => (self.clone(), existing.clone()),
            None => {
                let value = factory();
                (self.insert(key, value.clone()), value)
            }
        }
    }

    /// Returns a map containing only the entries matching `predicate`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let map = TrieMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2)
    ///     .insert("c".to_string(), 3);
    ///
    /// let odd = map.filter(|_, value| value % 2 == 1);
    /// assert_eq!(odd.len(), 2);
    /// assert!(!odd.contains_key("b"));
    /// ```
    #[must_use]
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        let mut result = Self::with_hasher(self.hash_builder.clone());
        for (key, value) in self {
            if predicate(key, value) {
                result = result.insert(key.clone(), value.clone());
            }
        }
        result
    }

    /// Returns a map with every value transformed by `function`.
    #[must_use]
    pub fn map_values<U, F>(&self, mut function: F) -> TrieMap<K, U, S>
    where
        U: Clone,
        F: FnMut(&V) -> U,
    {
        let mut result = TrieMap::with_hasher(self.hash_builder.clone());
        for (key, value) in self {
            result = result.insert(key.clone(), function(value));
        }
        result
    }

    /// Returns the canonical empty map, keeping the hasher.
    #[must_use]
    pub fn clear(&self) -> Self {
        Self::with_hasher(self.hash_builder.clone())
    }

    /// Adds every pair from `range`, failing on the first key that is
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyAlreadyExists`] on the first duplicate key.
    pub fn add_range<I>(&self, range: I) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut result = self.clone();
        for (key, value) in range {
            result = result.add(key, value)?;
        }
        Ok(result)
    }

    /// Adds every pair from `range`, skipping keys that are already present.
    #[must_use]
    pub fn try_add_range<I>(&self, range: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut result = self.clone();
        for (key, value) in range {
            result = result.try_add(key, value);
        }
        result
    }

    /// Inserts every pair from `range`, overwriting on conflicts. The
    /// rightmost occurrence of a key wins.
    #[must_use]
    pub fn insert_range<I>(&self, range: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut result = self.clone();
        for (key, value) in range {
            result = result.insert(key, value);
        }
        result
    }

    /// Replaces the values of existing keys, failing on the first key that
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] on the first missing key.
    pub fn set_range<I>(&self, range: I) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut result = self.clone();
        for (key, value) in range {
            result = result.set(key, value)?;
        }
        Ok(result)
    }

    /// Removes every key in `keys`, ignoring keys that are absent.
    #[must_use]
    pub fn remove_range<'a, Q, I>(&self, keys: I) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let mut result = self.clone();
        for key in keys {
            result = result.remove(key);
        }
        result
    }

    /// Returns the union of two maps. On key conflicts the value from
    /// `other` wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::persistent::TrieMap;
    ///
    /// let left = TrieMap::new()
    ///     .insert("a".to_string(), 1)
    ///     .insert("b".to_string(), 2);
    /// let right = TrieMap::new()
    ///     .insert("b".to_string(), 20)
    ///     .insert("c".to_string(), 3);
    ///
    /// let union = left.union(&right);
    /// assert_eq!(union.get("a"), Some(&1));
    /// assert_eq!(union.get("b"), Some(&20)); // From `right`
    /// assert_eq!(union.get("c"), Some(&3));
    /// ```
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (key, value) in other {
            result = result.insert(key.clone(), value.clone());
        }
        result
    }

    /// Returns the entries of `self` whose keys are also in `other`.
    /// Values come from `self`.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.filter(|key, _| other.contains_key(key))
    }

    /// Returns the entries of `self` whose keys are not in `other`.
    #[must_use]
    pub fn except(&self, other: &Self) -> Self {
        self.filter(|key, _| !other.contains_key(key))
    }

    /// Returns the entries present in exactly one of the two maps.
    #[must_use]
    pub fn symmetric_except(&self, other: &Self) -> Self {
        let mut result = self.except(other);
        for (key, value) in other {
            if !self.contains_key(key) {
                result = result.insert(key.clone(), value.clone());
            }
        }
        result
    }

    /// Returns `true` if every key of `self` is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.length <= other.length && self.iter().all(|(key, _)| other.contains_key(key))
    }

    /// Returns `true` if `self` is a subset of `other` and the maps differ.
    #[must_use]
    pub fn is_proper_subset_of(&self, other: &Self) -> bool {
        self.length < other.length && self.is_subset_of(other)
    }

    /// Returns `true` if every key of `other` is in `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        other.is_subset_of(self)
    }

    /// Returns `true` if `other` is a proper subset of `self`.
    #[must_use]
    pub fn is_proper_superset_of(&self, other: &Self) -> bool {
        other.is_proper_subset_of(self)
    }

    /// Returns `true` if the maps share at least one key.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let (smaller, larger) = if self.length <= other.length {
            (self, other)
        } else {
            (other, self)
        };
        smaller.iter().any(|(key, _)| larger.contains_key(key))
    }
}

// =============================================================================
// Iterator Implementations
// =============================================================================

enum IterFrame<'a, K, V> {
    Node(&'a Node<K, V>),
    Children(&'a [Slot<K, V>], usize),
    Collision(&'a [(K, V)], usize),
}

/// A borrowing iterator over the key-value pairs of a [`TrieMap`], in
/// structural (hash-branch pre-order) order.
pub struct TrieMapIterator<'a, K, V> {
    stack: Vec<IterFrame<'a, K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for TrieMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                IterFrame::Node(node) => match node {
                    Node::Empty => {}
                    Node::Leaf { key, value, .. } => {
                        self.remaining -= 1;
                        return Some((key, value));
                    }
                    Node::Branch { children, .. } => {
                        self.stack.push(IterFrame::Children(children.as_ref(), 0));
                    }
                    Node::Collision { entries, .. } => {
                        self.stack.push(IterFrame::Collision(entries.as_ref(), 0));
                    }
                },
                IterFrame::Children(children, index) => {
                    if let Some(slot) = children.get(index) {
                        self.stack.push(IterFrame::Children(children, index + 1));
                        match slot {
                            Slot::Leaf { key, value, .. } => {
                                self.remaining -= 1;
                                return Some((key, value));
                            }
                            Slot::Branch(subnode) => {
                                self.stack.push(IterFrame::Node(subnode.as_ref()));
                            }
                        }
                    }
                }
                IterFrame::Collision(entries, index) => {
                    if let Some((key, value)) = entries.get(index) {
                        self.stack.push(IterFrame::Collision(entries, index + 1));
                        self.remaining -= 1;
                        return Some((key, value));
                    }
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for TrieMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over the key-value pairs of a [`TrieMap`].
pub struct TrieMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for TrieMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for TrieMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Clone, V: Clone, S> IntoIterator for TrieMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = TrieMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        TrieMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a TrieMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = TrieMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, S: Default> Default for TrieMap<K, V, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> FromIterator<(K, V)> for TrieMap<K, V, S>
where
    K: Clone + Hash + Eq,
    V: Clone,
    S: BuildHasher + Clone + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::with_hasher(S::default()).insert_range(iter)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for TrieMap<K, V, RandomState>
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    fn from(entries: [(K, V); N]) -> Self {
        Self::new().insert_range(entries)
    }
}

impl<K, V, S> PartialEq for TrieMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && self.iter().all(|(key, value)| {
                other
                    .get(key)
                    .is_some_and(|other_value| other_value == value)
            })
    }
}

impl<K, V, S> Eq for TrieMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> fmt::Debug for TrieMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, Q> Index<&Q> for TrieMap<K, V, S>
where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// Returns a reference to the value for the given key.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present. Use [`TrieMap::get`] for a
    /// non-panicking lookup.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in map")
    }
}

// =============================================================================
// TrieMapView Definition
// =============================================================================

/// A zero-allocation read-only view of a [`TrieMap`].
///
/// The view borrows the map and copies nothing: it is the dictionary-style
/// read surface without conversion cost.
///
/// # Examples
///
/// ```rust
/// use atomap::persistent::TrieMap;
///
/// let map = TrieMap::new().insert("key".to_string(), 42);
/// let view = map.as_view();
///
/// assert_eq!(view.len(), 1);
/// assert_eq!(view.get("key"), Some(&42));
/// assert_eq!(view["key"], 42);
/// ```
pub struct TrieMapView<'a, K, V, S = RandomState> {
    map: &'a TrieMap<K, V, S>,
}

impl<K, V, S> Clone for TrieMapView<'_, K, V, S> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, S> Copy for TrieMapView<'_, K, V, S> {}

impl<'a, K, V, S> TrieMapView<'a, K, V, S> {
    /// Returns the number of entries in the underlying map.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the underlying map is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns an iterator over the underlying map's entries.
    #[must_use]
    pub fn iter(&self) -> TrieMapIterator<'a, K, V> {
        self.map.iter()
    }
}

impl<'a, K, V, S: BuildHasher> TrieMapView<'a, K, V, S> {
    /// Returns a reference to the value corresponding to the key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&'a V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    /// Returns `true` if the underlying map contains the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }
}

impl<'a, K, V, S> IntoIterator for TrieMapView<'a, K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = TrieMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl<K, V, S, Q> Index<&Q> for TrieMapView<'_, K, V, S>
where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        &self.map[key]
    }
}

impl<K, V, S> fmt::Debug for TrieMapView<'_, K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.map, formatter)
    }
}

// =============================================================================
// Tests
// =============================================================================
