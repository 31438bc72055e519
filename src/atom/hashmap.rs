//! Atomic, lock-free wrapper around [`TrieMap`].

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::hint;
use std::iter::FromIterator;
use std::ptr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::MapError;
use crate::persistent::{TrieMap, TrieMapIntoIterator};

/// A thread-safe hash map with lock-free, atomic operations.
///
/// `AtomHashMap` holds exactly one piece of mutable state: a reference to
/// the current [`TrieMap`] snapshot. Every mutator reads the snapshot,
/// computes a new map with a pure persistent operation, and attempts to
/// publish it with a compare-and-swap; if another thread committed in the
/// meantime the whole read-compute-publish cycle is retried. Committed
/// mutations are linearizable: there is a total order of successful swaps,
/// and every observer sees either the pre-update or the post-update
/// snapshot, never an intermediate state.
///
/// Readers never retry and never block: they read the snapshot reference
/// once and operate on an immutable value.
///
/// # Idempotence contract
///
/// Any closure passed to a mutator may be invoked more than once for a
/// single logical call (once per retry). Closures must be pure and
/// idempotent; see the [module documentation](crate::atom).
///
/// # Examples
///
/// ```rust
/// use atomap::atom::AtomHashMap;
/// use std::sync::Arc;
/// use std::thread;
///
/// let map: Arc<AtomHashMap<String, i32>> = Arc::new(AtomHashMap::new());
///
/// let writers: Vec<_> = (0..4)
///     .map(|index| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || map.insert(format!("key-{index}"), index))
///     })
///     .collect();
///
/// for writer in writers {
///     writer.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 4);
/// ```
pub struct AtomHashMap<K, V, S = RandomState> {
    /// The current snapshot. Always a valid, fully-formed map.
    items: ArcSwap<TrieMap<K, V, S>>,
}

impl<K, V> AtomHashMap<K, V, RandomState> {
    /// Creates a new empty map with the default hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::from_map(TrieMap::new())
    }
}

impl<K, V, S> AtomHashMap<K, V, S> {
    /// Creates a new empty map that hashes keys with `hash_builder`.
    #[must_use]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::from_map(TrieMap::with_hasher(hash_builder))
    }

    /// Creates a map seeded with an existing snapshot.
    #[must_use]
    pub fn from_map(items: TrieMap<K, V, S>) -> Self {
        Self {
            items: ArcSwap::from_pointee(items),
        }
    }

    /// Returns the number of entries in the current snapshot.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.load().len()
    }

    /// Returns `true` if the current snapshot contains no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.load().is_empty()
    }
}

impl<K, V, S: Clone> AtomHashMap<K, V, S> {
    /// Returns the current snapshot as a standalone persistent map.
    ///
    /// The snapshot is immutable: later mutations of the `AtomHashMap` are
    /// not reflected in it. Taking a snapshot is O(1).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::atom::AtomHashMap;
    ///
    /// let map: AtomHashMap<String, i32> = AtomHashMap::new();
    /// map.insert("a".to_string(), 1);
    ///
    /// let snapshot = map.snapshot();
    /// map.insert("b".to_string(), 2);
    ///
    /// assert_eq!(snapshot.len(), 1); // Unaffected by the later insert
    /// assert_eq!(map.len(), 2);
    /// ```
    #[must_use]
    pub fn snapshot(&self) -> TrieMap<K, V, S> {
        self.items.load().as_ref().clone()
    }
}

// =============================================================================
// Read Operations
// =============================================================================

impl<K, V, S: BuildHasher> AtomHashMap<K, V, S> {
    /// Returns the value for the given key in the current snapshot.
    ///
    /// The value is returned by clone: the snapshot it came from may be
    /// replaced at any moment, so references cannot be handed out.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.items.load().get(key).cloned()
    }

    /// Returns `true` if the current snapshot contains the key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.load().contains_key(key)
    }

    /// Returns `true` if `predicate` holds for every entry of the current
    /// snapshot.
    pub fn for_all<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.items.load().for_all(predicate)
    }

    /// Returns `true` if `predicate` holds for at least one entry of the
    /// current snapshot.
    pub fn exists<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.items.load().exists(predicate)
    }

    /// Folds every entry of the current snapshot into an accumulator.
    pub fn fold<B, F>(&self, init: B, function: F) -> B
    where
        F: FnMut(B, &K, &V) -> B,
    {
        self.items.load().fold(init, function)
    }

    /// Returns `true` if both maps currently contain exactly the same
    /// keys, ignoring values.
    #[must_use]
    pub fn eq_keys(&self, other: &Self) -> bool
    where
        K: Hash + Eq,
    {
        self.items.load().eq_keys(&other.items.load())
    }

    /// Returns `true` if every key of the current snapshot is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &TrieMap<K, V, S>) -> bool
    where
        K: Clone + Hash + Eq,
        V: Clone,
        S: Clone,
    {
        self.items.load().is_subset_of(other)
    }

    /// Returns `true` if every key of `other` is in the current snapshot.
    #[must_use]
    pub fn is_superset_of(&self, other: &TrieMap<K, V, S>) -> bool
    where
        K: Clone + Hash + Eq,
        V: Clone,
        S: Clone,
    {
        self.items.load().is_superset_of(other)
    }

    /// Returns `true` if the current snapshot shares at least one key with
    /// `other`.
    #[must_use]
    pub fn overlaps(&self, other: &TrieMap<K, V, S>) -> bool
    where
        K: Clone + Hash + Eq,
        V: Clone,
        S: Clone,
    {
        self.items.load().overlaps(other)
    }
}

impl<K: Clone, V: Clone, S: Clone> AtomHashMap<K, V, S> {
    /// Returns an owning iterator over the entries of the current snapshot.
    ///
    /// The iteration is over an immutable snapshot: concurrent mutations do
    /// not affect it.
    #[must_use]
    pub fn iter(&self) -> TrieMapIntoIterator<K, V> {
        self.snapshot().into_iter()
    }
}

// =============================================================================
// CAS Retry Loops
// =============================================================================

impl<K, V, S> AtomHashMap<K, V, S> {
    /// Publishes `operation(current)` with a compare-and-swap, retrying
    /// until the swap commits against an unchanged snapshot.
    fn swap_snapshot<F>(&self, mut operation: F)
    where
        F: FnMut(&TrieMap<K, V, S>) -> TrieMap<K, V, S>,
    {
        let mut current = self.items.load();
        loop {
            let next = Arc::new(operation(&current));
            let previous = self.items.compare_and_swap(&*current, next);
            if ptr::eq(Arc::as_ptr(&*current), Arc::as_ptr(&*previous)) {
                return;
            }
            current = previous;
            hint::spin_loop();
        }
    }

    /// Like [`Self::swap_snapshot`] for fallible operations. A structural
    /// error aborts the transaction without publishing anything; CAS
    /// contention is retried and never surfaces.
    fn try_swap_snapshot<F>(&self, mut operation: F) -> Result<(), MapError>
    where
        F: FnMut(&TrieMap<K, V, S>) -> Result<TrieMap<K, V, S>, MapError>,
    {
        let mut current = self.items.load();
        loop {
            let next = Arc::new(operation(&current)?);
            let previous = self.items.compare_and_swap(&*current, next);
            if ptr::eq(Arc::as_ptr(&*current), Arc::as_ptr(&*previous)) {
                return Ok(());
            }
            current = previous;
            hint::spin_loop();
        }
    }
}

// =============================================================================
// Write Operations
// =============================================================================

impl<K, V, S> AtomHashMap<K, V, S>
where
    K: Clone + Hash + Eq,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Atomically replaces the whole snapshot with `swap(current)`.
    ///
    /// This is the escape hatch for multi-step transactions: any number of
    /// persistent operations can be composed inside `swap` and they commit
    /// as a single atomic unit.
    ///
    /// `swap` may be invoked more than once and must be idempotent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::atom::AtomHashMap;
    ///
    /// let map: AtomHashMap<String, i32> = AtomHashMap::new();
    /// map.swap(|items| {
    ///     items
    ///         .insert("a".to_string(), 1)
    ///         .insert("b".to_string(), 2)
    ///         .remove("a")
    /// });
    ///
    /// assert_eq!(map.len(), 1);
    /// assert_eq!(map.get("b"), Some(2));
    /// ```
    pub fn swap<F>(&self, swap: F)
    where
        F: FnMut(&TrieMap<K, V, S>) -> TrieMap<K, V, S>,
    {
        self.swap_snapshot(swap);
    }

    /// Atomically inserts a key-value pair, replacing any existing value.
    pub fn insert(&self, key: K, value: V) {
        self.swap_snapshot(|items| items.insert(key.clone(), value.clone()));
    }

    /// Atomically inserts a key-value pair, failing if the key is present.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyAlreadyExists`] if the key is present.
    pub fn add(&self, key: K, value: V) -> Result<(), MapError> {
        self.try_swap_snapshot(|items| items.add(key.clone(), value.clone()))
    }

    /// Atomically inserts a key-value pair, doing nothing if the key is
    /// present.
    pub fn try_add(&self, key: K, value: V) {
        self.swap_snapshot(|items| items.try_add(key.clone(), value.clone()));
    }

    /// Atomically updates an existing value with `update`, or inserts the
    /// result of `fallback` if the key is absent.
    ///
    /// Both closures may be invoked more than once and must be idempotent.
    pub fn insert_or_update_with<F, G>(&self, key: K, mut update: F, mut fallback: G)
    where
        F: FnMut(&V) -> V,
        G: FnMut() -> V,
    {
        self.swap_snapshot(|items| {
            items.insert_or_update_with(key.clone(), &mut update, &mut fallback)
        });
    }

    /// Atomically replaces the value for an existing key.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    pub fn set(&self, key: K, value: V) -> Result<(), MapError> {
        self.try_swap_snapshot(|items| items.set(key.clone(), value.clone()))
    }

    /// Atomically replaces the value for an existing key with
    /// `update(existing)`.
    ///
    /// `update` may be invoked more than once and must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] if the key is absent.
    pub fn set_with<Q, F>(&self, key: &Q, mut update: F) -> Result<(), MapError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnMut(&V) -> V,
    {
        self.try_swap_snapshot(|items| items.set_with(key, &mut update))
    }

    /// Atomically replaces the value for a key, doing nothing if the key is
    /// absent.
    pub fn try_set(&self, key: K, value: V) {
        self.swap_snapshot(|items| items.try_set(key.clone(), value.clone()));
    }

    /// Atomically updates the value for a key with `update(existing)`,
    /// doing nothing if the key is absent.
    ///
    /// `update` may be invoked more than once and must be idempotent.
    pub fn try_set_with<Q, F>(&self, key: &Q, mut update: F)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnMut(&V) -> V,
    {
        self.swap_snapshot(|items| items.try_set_with(key, &mut update));
    }

    /// Atomically removes a key, doing nothing if the key is absent.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.swap_snapshot(|items| items.remove(key));
    }

    /// Returns the value for `key`, atomically inserting `value` first if
    /// the key is absent.
    ///
    /// The returned value is always the one in the committed snapshot.
    pub fn get_or_insert(&self, key: K, value: V) -> V {
        self.get_or_insert_with(key, move || value.clone())
    }

    /// Returns the value for `key`, atomically inserting `factory()` first
    /// if the key is absent.
    ///
    /// `factory` may be invoked more than once (once per failed CAS
    /// attempt) and must be idempotent. Whatever happens, the returned
    /// value and the committed snapshot always agree: every concurrent
    /// caller observes the single value that was durably stored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use atomap::atom::AtomHashMap;
    ///
    /// let map: AtomHashMap<String, i32> = AtomHashMap::new();
    ///
    /// let first = map.get_or_insert_with("k".to_string(), || 7);
    /// let second = map.get_or_insert_with("k".to_string(), || 99);
    ///
    /// assert_eq!(first, 7);
    /// assert_eq!(second, 7); // The stored value wins
    /// ```
    pub fn get_or_insert_with<F>(&self, key: K, mut factory: F) -> V
    where
        F: FnMut() -> V,
    {
        let mut current = self.items.load();
        loop {
            if let Some(existing) = current.get(&key) {
                return existing.clone();
            }
            let value = factory();
            let next = Arc::new(current.insert(key.clone(), value.clone()));
            let previous = self.items.compare_and_swap(&*current, next);
            if ptr::eq(Arc::as_ptr(&*current), Arc::as_ptr(&*previous)) {
                return value;
            }
            current = previous;
            hint::spin_loop();
        }
    }

    /// Atomically drops every entry that does not match `predicate`.
    ///
    /// `predicate` may be invoked more than once per entry and must be
    /// idempotent.
    pub fn filter_in_place<P>(&self, mut predicate: P)
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.swap_snapshot(|items| items.filter(&mut predicate));
    }

    /// Atomically transforms every value with `function`.
    ///
    /// `function` may be invoked more than once per entry and must be
    /// idempotent.
    pub fn map_values_in_place<F>(&self, mut function: F)
    where
        F: FnMut(&V) -> V,
    {
        self.swap_snapshot(|items| items.map_values(&mut function));
    }

    /// Atomically adds every pair from `range`, failing on the first key
    /// that is already present. On error nothing is committed.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyAlreadyExists`] on the first duplicate key.
    pub fn add_range<I>(&self, range: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = range.into_iter().collect();
        self.try_swap_snapshot(|items| items.add_range(entries.iter().cloned()))
    }

    /// Atomically adds every pair from `range`, skipping keys that are
    /// already present.
    pub fn try_add_range<I>(&self, range: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = range.into_iter().collect();
        self.swap_snapshot(|items| items.try_add_range(entries.iter().cloned()));
    }

    /// Atomically inserts every pair from `range`, overwriting on
    /// conflicts.
    pub fn insert_range<I>(&self, range: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = range.into_iter().collect();
        self.swap_snapshot(|items| items.insert_range(entries.iter().cloned()));
    }

    /// Atomically replaces the values of existing keys, failing on the
    /// first key that is absent. On error nothing is committed.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::KeyNotFound`] on the first missing key.
    pub fn set_range<I>(&self, range: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = range.into_iter().collect();
        self.try_swap_snapshot(|items| items.set_range(entries.iter().cloned()))
    }

    /// Atomically removes every key in `keys`, ignoring absent keys.
    pub fn remove_range<'a, Q, I>(&self, keys: I)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let keys: Vec<&Q> = keys.into_iter().collect();
        self.swap_snapshot(|items| items.remove_range(keys.iter().copied()));
    }

    /// Atomically clears all entries, keeping the hasher.
    pub fn clear(&self) {
        self.swap_snapshot(|items| items.clear());
    }

    /// Atomically merges `other` into the map. On key conflicts the value
    /// from `other` wins.
    pub fn union_with(&self, other: &TrieMap<K, V, S>) {
        self.swap_snapshot(|items| items.union(other));
    }

    /// Atomically drops every entry whose key is not in `other`.
    pub fn intersect_with(&self, other: &TrieMap<K, V, S>) {
        self.swap_snapshot(|items| items.intersect(other));
    }

    /// Atomically drops every entry whose key is in `other`.
    pub fn except_with(&self, other: &TrieMap<K, V, S>) {
        self.swap_snapshot(|items| items.except(other));
    }

    /// Atomically replaces the snapshot with the entries present in exactly
    /// one of the snapshot and `other`.
    pub fn symmetric_except_with(&self, other: &TrieMap<K, V, S>) {
        self.swap_snapshot(|items| items.symmetric_except(other));
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for AtomHashMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> From<TrieMap<K, V, S>> for AtomHashMap<K, V, S> {
    fn from(items: TrieMap<K, V, S>) -> Self {
        Self::from_map(items)
    }
}

impl<K, V, S> FromIterator<(K, V)> for AtomHashMap<K, V, S>
where
    K: Clone + Hash + Eq,
    V: Clone,
    S: BuildHasher + Clone + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(TrieMap::from_iter(iter))
    }
}

impl<K, V, S> PartialEq for AtomHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        *self.items.load().as_ref() == *other.items.load().as_ref()
    }
}

impl<K, V, S> PartialEq<TrieMap<K, V, S>> for AtomHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &TrieMap<K, V, S>) -> bool {
        *self.items.load().as_ref() == *other
    }
}

impl<K, V, S> fmt::Debug for AtomHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.items.load().as_ref(), formatter)
    }
}

// =============================================================================
// Tests
// =============================================================================
