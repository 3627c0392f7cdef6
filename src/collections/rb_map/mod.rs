//! [`RbMap`], an ordered map with O(1) stepping between neighbouring entries.
//!
//! # Overview
//!
//! Entries are kept in a red-black tree (used for lookup, insertion and removal in O(log n))
//! whose nodes are also threaded on a doubly-linked list in key order. Iteration only follows
//! the list, so each step is O(1) whatever the shape of the tree.
//!
//! Keys are ordered by a [`Compare`] value held by the map, [`NaturalOrder`] by default.
//!
//! # Positions
//!
//! A [`Position`] is a small `Copy` handle to an entry (or to the end of the map). It does not
//! borrow the map, so it can be kept across mutations and used later with [`RbMap::get_at`],
//! [`RbMap::next`], [`RbMap::prev`] and [`RbMap::erase`].
//!
//! A position stays valid until the entry it refers to is removed. Removing any *other* entry
//! never disturbs it, even when the removal moves nodes around inside the tree. Using a position
//! that has been invalidated, or one taken from a different map, gives
//! [`ContainerError::InvalidPosition`] rather than touching some other entry.
//!
//! # Example
//!
//! ```
//!     use rbmap::collections::{ContainerError, RbMap};
//!     let mut map = RbMap::new();
//!     for k in [5, 3, 8, 1, 4, 7, 9] {
//!         map.insert(k, k * 10);
//!     }
//!     let pos = map.find(&5);
//!     assert_eq!(map.erase(pos), Ok((5, 50)));
//!     assert_eq!(map.len(), 6);
//!     assert_eq!(map.at(&5), Err(ContainerError::KeyNotFound));
//!     let v: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
//!     assert_eq!(v, [(1, 10), (3, 30), (4, 40), (7, 70), (8, 80), (9, 90)]);
//! ```
//!
//!# Features
//!
//! This crate supports the following cargo features:
//! - `serde` : enables serialisation of [`RbMap`] via serde crate.
//! - `unsafe-optim` : uses unsafe code for extra optimisation.

use std::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    fmt::Debug,
    hash::{Hash, Hasher},
    iter::FusedIterator,
    marker::PhantomData,
    ops::{Bound, RangeBounds},
    sync::atomic::{self, AtomicU64},
};

use log::{debug, trace};

use super::ContainerError;

mod arena;
use arena::{Arena, Node, HEAD, TAIL};

mod compare;
pub use compare::{Compare, NaturalOrder, ReverseOrder};

mod tree;
use tree::RawTree;

/// Source of map identities, so positions from one map are rejected by another.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, atomic::Ordering::Relaxed)
}

/// Ordered map based on a red-black tree threaded with a doubly-linked list.
///
/// General guide to implementation:
///
/// Nodes live in an arena addressed by slot index, slots 0 and 1 being the head and tail
/// sentinels of the list. Each node has tree links (parent, two children, color, side) and
/// list links (prev, next). Every mutating method updates both before returning.
///
/// When a node with two children is removed it first trades places in the tree with its
/// successor. Entries never move between slots, which is what keeps [`Position`]s to other
/// entries valid.
pub struct RbMap<K, V, C = NaturalOrder> {
    id: u64,
    tree: RawTree<K, V>,
    cmp: C,
}

/// Handle to an entry of an [`RbMap`], or to its end.
///
/// Obtained from [`RbMap::begin`], [`RbMap::end`], [`RbMap::find`], [`RbMap::insert`] and
/// similar. See the module documentation for when a position is valid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Position {
    owner: u64,
    node: usize,
    generation: u32,
}

impl Position {
    /// Is this the end position (one past the last entry)?
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.node == TAIL
    }
}

impl<K, V, C: Default> Default for RbMap<K, V, C> {
    /// Creates an empty RbMap.
    fn default() -> Self {
        Self::with_compare(C::default())
    }
}

impl<K: Clone, V: Clone, C: Clone> Clone for RbMap<K, V, C> {
    fn clone(&self) -> Self {
        trace!("cloning map of {} entries", self.len());
        Self {
            id: next_id(),
            tree: self.tree.aclone(),
            cmp: self.cmp.clone(),
        }
    }

    /// Replaces the contents with a copy of `source`.
    ///
    /// Positions previously obtained from `self`, including its end position, are no longer valid.
    fn clone_from(&mut self, source: &Self) {
        trace!("cloning map of {} entries into existing map", source.len());
        self.tree = source.tree.aclone();
        self.cmp = source.cmp.clone();
        self.id = next_id();
    }
}

impl<K, V> RbMap<K, V> {
    /// Returns a new, empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::with_compare(NaturalOrder)
    }

    /// Returns a new, empty map with room for `n` entries.
    #[must_use]
    pub fn with_capacity(n: usize) -> Self {
        Self::with_capacity_and_compare(n, NaturalOrder)
    }
}

impl<K, V, C> RbMap<K, V, C> {
    #[cfg(test)]
    pub(crate) fn check(&self)
    where
        C: Compare<K>,
    {
        self.tree.check(&self.cmp);
    }

    /// Returns a new, empty map ordered by `cmp`.
    ///
    /// # Example
    ///
    /// ```
    ///     use rbmap::collections::rb_map::{RbMap, ReverseOrder};
    ///     let mut mymap = RbMap::with_compare(ReverseOrder);
    ///     mymap.insert("England", "London");
    ///     mymap.insert("France", "Paris");
    ///     assert_eq!(mymap.first_key_value(), Some((&"France", &"Paris")));
    /// ```
    #[must_use]
    pub fn with_compare(cmp: C) -> Self {
        Self::with_capacity_and_compare(0, cmp)
    }

    /// Returns a new, empty map ordered by `cmp` with room for `n` entries.
    #[must_use]
    pub fn with_capacity_and_compare(n: usize, cmp: C) -> Self {
        Self {
            id: next_id(),
            tree: RawTree::with_capacity(n),
            cmp,
        }
    }

    /// Get reference to the ordering.
    pub fn compare(&self) -> &C {
        &self.cmp
    }

    /// Get number of key-value pairs in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len
    }

    /// Is the map empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.len == 0
    }

    /// Number of entries the map can hold without allocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tree.a.capacity()
    }

    /// Reserve room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.tree.a.reserve(additional);
    }

    /// Release spare memory.
    pub fn shrink_to_fit(&mut self) {
        self.tree.a.shrink_to_fit();
    }

    /// Clear the map.
    ///
    /// All positions except the end position become invalid.
    pub fn clear(&mut self) {
        trace!("clearing map of {} entries", self.len());
        self.tree.clear();
    }

    fn position(&self, x: usize) -> Position {
        Position {
            owner: self.id,
            node: x,
            generation: self.tree.a[x].generation,
        }
    }

    /// Slot of a position that is valid for this map (possibly the end).
    fn slot(&self, pos: Position) -> Result<usize, ContainerError> {
        if pos.owner == self.id && self.tree.a.is_current(pos.node, pos.generation) {
            Ok(pos.node)
        } else {
            debug!("rejecting position {pos:?}: foreign or no longer valid");
            Err(ContainerError::InvalidPosition)
        }
    }

    /// Slot of a position that refers to an entry of this map.
    fn entry_slot(&self, pos: Position) -> Result<usize, ContainerError> {
        let x = self.slot(pos)?;
        if x == TAIL {
            debug!("rejecting end position where an entry is required");
            return Err(ContainerError::InvalidPosition);
        }
        Ok(x)
    }

    /// Position of the first entry, or the end position if the map is empty.
    #[must_use]
    pub fn begin(&self) -> Position {
        self.position(self.tree.first())
    }

    /// Position one past the last entry.
    #[must_use]
    pub fn end(&self) -> Position {
        self.position(TAIL)
    }

    /// Position following `pos`.
    ///
    /// Fails if `pos` is the end position or is not valid for this map.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self, pos: Position) -> Result<Position, ContainerError> {
        let x = self.entry_slot(pos)?;
        Ok(self.position(self.tree.a[x].links.next))
    }

    /// Position preceding `pos`.
    ///
    /// Fails if `pos` is the first position ([`RbMap::begin`]) or is not valid for this map.
    pub fn prev(&self, pos: Position) -> Result<Position, ContainerError> {
        let x = self.slot(pos)?;
        let p = self.tree.a[x].links.prev;
        if p == HEAD {
            debug!("rejecting step back from the first position");
            return Err(ContainerError::InvalidPosition);
        }
        Ok(self.position(p))
    }

    /// Get references to the key and value at `pos`.
    pub fn get_at(&self, pos: Position) -> Result<(&K, &V), ContainerError> {
        let x = self.entry_slot(pos)?;
        Ok(self.tree.a.kv(x))
    }

    /// Get reference to the key and mutable reference to the value at `pos`.
    pub fn get_at_mut(&mut self, pos: Position) -> Result<(&K, &mut V), ContainerError> {
        let x = self.entry_slot(pos)?;
        Ok(self.tree.a.kv_mut(x))
    }

    /// Remove the entry at `pos`, returning it.
    ///
    /// Fails without changing the map if `pos` is the end position or is not valid for this map.
    /// Only positions to the removed entry are invalidated.
    pub fn erase(&mut self, pos: Position) -> Result<(K, V), ContainerError> {
        let x = self.entry_slot(pos)?;
        Ok(self.tree.remove(x))
    }

    /// Get references to first key and value.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    /// Gets references to last key and value.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next_back()
    }

    /// Remove first key-value pair from map.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        if self.is_empty() {
            None
        } else {
            let x = self.tree.first();
            Some(self.tree.remove(x))
        }
    }

    /// Remove last key-value pair from map.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        if self.is_empty() {
            None
        } else {
            let x = self.tree.last();
            Some(self.tree.remove(x))
        }
    }

    /// Remove all key-value pairs, visited in ascending order, for which f returns false.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut x = self.tree.first();
        while x != TAIL {
            let next = self.tree.a[x].links.next;
            let (k, v) = self.tree.a.kv_mut(x);
            if !f(k, v) {
                self.tree.remove(x);
            }
            x = next;
        }
    }

    /// Get iterator of references to key-value pairs.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            a: &self.tree.a,
            front: self.tree.first(),
            back: self.tree.last(),
            len: self.tree.len,
        }
    }

    /// Get iterator of mutable references to key-value pairs.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            front: self.tree.first(),
            back: self.tree.last(),
            len: self.tree.len,
            nodes: self.tree.a.as_mut_ptr(),
            _pd: PhantomData,
        }
    }

    /// Get iterator over the entries from `pos` to the end of the map.
    pub fn iter_from(&self, pos: Position) -> Result<Range<'_, K, V>, ContainerError> {
        let front = self.slot(pos)?;
        Ok(Range {
            a: &self.tree.a,
            front,
            back: TAIL,
        })
    }

    /// Get iterator of references to keys.
    #[must_use]
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    /// Get iterator of references to values.
    #[must_use]
    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    /// Get iterator of mutable references to values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut(self.iter_mut())
    }

    /// Get consuming iterator that returns all the keys, in sorted order.
    #[must_use]
    pub fn into_keys(self) -> IntoKeys<K, V> {
        IntoKeys(self.into_iter())
    }

    /// Get consuming iterator that returns all the values, in sorted order.
    #[must_use]
    pub fn into_values(self) -> IntoValues<K, V> {
        IntoValues(self.into_iter())
    }

    /// Get position of the entry with the specified key, or the end position if there is none.
    pub fn find<Q>(&self, key: &Q) -> Position
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        match self.tree.find(key, &self.cmp) {
            Some(x) => self.position(x),
            None => self.end(),
        }
    }

    /// Number of entries with the specified key, which is 0 or 1.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Does the map have an entry for the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find(key, &self.cmp).is_some()
    }

    /// Get reference to the value corresponding to the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Get a mutable reference to the value corresponding to the key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let x = self.tree.find(key, &self.cmp)?;
        Some(self.tree.a.kv_mut(x).1)
    }

    /// Get references to the corresponding key and value.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let x = self.tree.find(key, &self.cmp)?;
        Some(self.tree.a.kv(x))
    }

    /// Get reference to the value corresponding to the key, failing with
    /// [`ContainerError::KeyNotFound`] if there is none.
    ///
    /// # Example
    ///
    /// ```
    ///     use rbmap::collections::{ContainerError, RbMap};
    ///     let mut map = RbMap::new();
    ///     map.insert("England", "London");
    ///     assert_eq!(map.at("England"), Ok(&"London"));
    ///     assert_eq!(map.at("France"), Err(ContainerError::KeyNotFound));
    /// ```
    pub fn at<Q>(&self, key: &Q) -> Result<&V, ContainerError>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.get(key).ok_or(ContainerError::KeyNotFound)
    }

    /// Get mutable reference to the value corresponding to the key, failing with
    /// [`ContainerError::KeyNotFound`] if there is none.
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, ContainerError>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.get_mut(key).ok_or(ContainerError::KeyNotFound)
    }

    /// Position of the first entry whose key is not less than `key`.
    pub fn lower_bound<Q>(&self, key: &Q) -> Position
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.position(self.tree.bound(key, false, &self.cmp))
    }

    /// Position of the first entry whose key is greater than `key`.
    pub fn upper_bound<Q>(&self, key: &Q) -> Position
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.position(self.tree.bound(key, true, &self.cmp))
    }

    /// Get iterator for range of references to key-value pairs.
    ///
    /// Panics if the start of the range is after its end.
    pub fn range<Q, R>(&self, range: R) -> Range<'_, K, V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
        R: RangeBounds<Q>,
    {
        check_range(&range, &self.cmp);
        let t = &self.tree;
        let front = match range.start_bound() {
            Bound::Included(k) => t.bound(k, false, &self.cmp),
            Bound::Excluded(k) => t.bound(k, true, &self.cmp),
            Bound::Unbounded => t.first(),
        };
        let back = match range.end_bound() {
            Bound::Included(k) => t.bound(k, true, &self.cmp),
            Bound::Excluded(k) => t.bound(k, false, &self.cmp),
            Bound::Unbounded => TAIL,
        };
        Range {
            a: &t.a,
            front,
            back,
        }
    }

    /// Remove key-value pair from map, returning just the value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.remove_entry(key).map(|(_k, v)| v)
    }

    /// Remove key-value pair from map.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let x = self.tree.find(key, &self.cmp)?;
        Some(self.tree.remove(x))
    }

    /// Insert key-value pair into map.
    ///
    /// If the key is already present nothing changes (`value` is dropped) and the position
    /// of the existing entry is returned with `false`.
    ///
    /// # Example
    ///
    /// ```
    ///     use rbmap::collections::RbMap;
    ///     let mut map = RbMap::new();
    ///     let (pos, inserted) = map.insert(1, "a");
    ///     assert!(inserted);
    ///     assert_eq!(map.insert(1, "b"), (pos, false));
    ///     assert_eq!(map[&1], "a");
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> (Position, bool)
    where
        C: Compare<K>,
    {
        let (x, inserted) = self.tree.insert(key, || value, &self.cmp);
        (self.position(x), inserted)
    }

    /// Get mutable reference to the value for `key`, inserting the result of `f` if the key is absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, f: F) -> &mut V
    where
        C: Compare<K>,
        F: FnOnce() -> V,
    {
        let (x, _) = self.tree.insert(key, f, &self.cmp);
        self.tree.a.kv_mut(x).1
    }

    /// Get mutable reference to the value for `key`, inserting the default value if the key is absent.
    ///
    /// # Example
    ///
    /// ```
    ///     use rbmap::collections::RbMap;
    ///     let mut counts: RbMap<&str, u32> = RbMap::new();
    ///     for w in ["a", "b", "a"] {
    ///         *counts.get_or_insert_default(w) += 1;
    ///     }
    ///     assert_eq!(counts[&"a"], 2);
    /// ```
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        C: Compare<K>,
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }
} // End impl RbMap

fn check_range<Q, C, R>(range: &R, cmp: &C)
where
    Q: ?Sized,
    C: Compare<Q>,
    R: RangeBounds<Q>,
{
    use Bound::{Excluded, Included};
    match (range.start_bound(), range.end_bound()) {
        (Included(s) | Excluded(s), Included(e)) | (Included(s), Excluded(e)) => {
            assert!(!cmp.less(e, s), "range start is greater than range end in RbMap");
        }
        (Excluded(s), Excluded(e)) => {
            assert!(
                cmp.less(e, s) || cmp.less(s, e),
                "range start and end are equal and excluded in RbMap"
            );
            assert!(!cmp.less(e, s), "range start is greater than range end in RbMap");
        }
        _ => {}
    }
}

impl<K: Hash, V: Hash, C> Hash for RbMap<K, V, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for elt in self {
            elt.hash(state);
        }
    }
}
impl<K: PartialEq, V: PartialEq, C> PartialEq for RbMap<K, V, C> {
    fn eq(&self, other: &RbMap<K, V, C>) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}
impl<K: Eq, V: Eq, C> Eq for RbMap<K, V, C> {}

impl<K: PartialOrd, V: PartialOrd, C> PartialOrd for RbMap<K, V, C> {
    fn partial_cmp(&self, other: &RbMap<K, V, C>) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}
impl<K: Ord, V: Ord, C> Ord for RbMap<K, V, C> {
    fn cmp(&self, other: &RbMap<K, V, C>) -> Ordering {
        self.iter().cmp(other.iter())
    }
}
impl<K, V, C> IntoIterator for RbMap<K, V, C> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    /// Convert `RbMap` to [`IntoIter`].
    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            front: self.tree.first(),
            back: self.tree.last(),
            len: self.tree.len,
            tree: self.tree,
        }
    }
}
impl<'a, K, V, C> IntoIterator for &'a RbMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
impl<'a, K, V, C> IntoIterator for &'a mut RbMap<K, V, C> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;
    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}
impl<K, V, C: Compare<K> + Default> FromIterator<(K, V)> for RbMap<K, V, C> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> RbMap<K, V, C> {
        let mut map = RbMap::default();
        map.extend(iter);
        map
    }
}
impl<K: Ord, V, const N: usize> From<[(K, V); N]> for RbMap<K, V> {
    fn from(arr: [(K, V); N]) -> RbMap<K, V> {
        let mut map = RbMap::with_capacity(N);
        map.extend(arr);
        map
    }
}
impl<K, V, C: Compare<K>> Extend<(K, V)> for RbMap<K, V, C> {
    fn extend<T>(&mut self, iter: T)
    where
        T: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}
impl<'a, K: Copy, V: Copy, C: Compare<K>> Extend<(&'a K, &'a V)> for RbMap<K, V, C> {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (&'a K, &'a V)>,
    {
        for (&k, &v) in iter {
            self.insert(k, v);
        }
    }
}
impl<K, Q, V, C> std::ops::Index<&Q> for RbMap<K, V, C>
where
    K: Borrow<Q>,
    C: Compare<Q>,
    Q: ?Sized,
{
    type Output = V;

    /// Returns a reference to the value corresponding to the supplied key.
    ///
    /// Panics if the key is not present in the `RbMap`.
    #[inline]
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}
impl<K: Debug, V: Debug, C> Debug for RbMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(feature = "serde")]
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

#[cfg(feature = "serde")]
impl<K: Serialize, V: Serialize, C> Serialize for RbMap<K, V, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct RbMapVisitor<K, V, C> {
    marker: PhantomData<fn() -> RbMap<K, V, C>>,
}

#[cfg(feature = "serde")]
impl<K, V, C> RbMapVisitor<K, V, C> {
    fn new() -> Self {
        RbMapVisitor {
            marker: PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, C> Visitor<'de> for RbMapVisitor<K, V, C>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
    C: Compare<K> + Default,
{
    type Value = RbMap<K, V, C>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("RbMap")
    }

    /// Keys that arrive in ascending order are appended without a search.
    /// For a repeated key the first value is kept, as with [`RbMap::insert`].
    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let hint = access.size_hint().unwrap_or(0).min(4096);
        let mut map = RbMap::with_capacity_and_compare(hint, C::default());
        while let Some((k, v)) = access.next_entry()? {
            let ascending = match map.last_key_value() {
                Some((pk, _)) => map.cmp.less(pk, &k),
                None => true,
            };
            if ascending {
                map.tree.push_back(k, v);
            } else {
                map.insert(k, v);
            }
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, C> Deserialize<'de> for RbMap<K, V, C>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
    C: Compare<K> + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RbMapVisitor::new())
    }
}

// Iteration.

/// Iterator returned by [`RbMap::iter`].
pub struct Iter<'a, K, V> {
    a: &'a Arena<K, V>,
    front: usize,
    back: usize,
    len: usize,
}
impl<'a, K, V> Clone for Iter<'a, K, V> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}
impl<'a, K: Debug, V: Debug> Debug for Iter<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}
impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.front;
            self.front = self.a[x].links.next;
            Some(self.a.kv(x))
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}
impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {
    fn len(&self) -> usize {
        self.len
    }
}
impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.back;
            self.back = self.a[x].links.prev;
            Some(self.a.kv(x))
        }
    }
}
impl<'a, K, V> FusedIterator for Iter<'a, K, V> {}

/// Iterator returned by [`RbMap::iter_mut`].
pub struct IterMut<'a, K, V> {
    nodes: *mut Node<K, V>,
    front: usize,
    back: usize,
    len: usize,
    _pd: PhantomData<&'a mut Node<K, V>>,
}

unsafe impl<'a, K: Send, V: Send> Send for IterMut<'a, K, V> {}
unsafe impl<'a, K: Sync, V: Sync> Sync for IterMut<'a, K, V> {}

impl<'a, K, V> IterMut<'a, K, V> {
    /// # Safety
    ///
    /// `x` must be a live slot of the borrowed arena not yet returned by this iterator.
    unsafe fn take(&mut self, x: usize) -> (&'a K, &'a mut V) {
        let node = &mut *self.nodes.add(x);
        match &mut node.entry {
            Some((k, v)) => (&*k, v),
            None => unreachable!("slot {x} holds no entry"),
        }
    }
}
impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.front;
            unsafe {
                self.front = (*self.nodes.add(x)).links.next;
                Some(self.take(x))
            }
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}
impl<'a, K, V> ExactSizeIterator for IterMut<'a, K, V> {
    fn len(&self) -> usize {
        self.len
    }
}
impl<'a, K, V> DoubleEndedIterator for IterMut<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.back;
            unsafe {
                self.back = (*self.nodes.add(x)).links.prev;
                Some(self.take(x))
            }
        }
    }
}
impl<'a, K, V> FusedIterator for IterMut<'a, K, V> {}

/// Consuming iterator returned by [`RbMap::into_iter`].
pub struct IntoIter<K, V> {
    tree: RawTree<K, V>,
    front: usize,
    back: usize,
    len: usize,
}
impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);
    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.front;
            self.front = self.tree.a[x].links.next;
            Some(self.tree.a.release(x))
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}
impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            let x = self.back;
            self.back = self.tree.a[x].links.prev;
            Some(self.tree.a.release(x))
        }
    }
}
impl<K, V> ExactSizeIterator for IntoIter<K, V> {
    fn len(&self) -> usize {
        self.len
    }
}
impl<K, V> FusedIterator for IntoIter<K, V> {}

/// Iterator returned by [`RbMap::range`] and [`RbMap::iter_from`].
pub struct Range<'a, K, V> {
    a: &'a Arena<K, V>,
    front: usize,
    /// One past the last entry to visit.
    back: usize,
}
impl<'a, K, V> Clone for Range<'a, K, V> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}
impl<'a, K: Debug, V: Debug> Debug for Range<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}
impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            None
        } else {
            let x = self.front;
            self.front = self.a[x].links.next;
            Some(self.a.kv(x))
        }
    }
}
impl<'a, K, V> DoubleEndedIterator for Range<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            None
        } else {
            self.back = self.a[self.back].links.prev;
            Some(self.a.kv(self.back))
        }
    }
}
impl<'a, K, V> FusedIterator for Range<'a, K, V> {}

/// Consuming iterator returned by [`RbMap::into_keys`].
pub struct IntoKeys<K, V>(IntoIter<K, V>);
impl<K, V> Iterator for IntoKeys<K, V> {
    type Item = K;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.0)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<K, V> DoubleEndedIterator for IntoKeys<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        Some(self.0.next_back()?.0)
    }
}
impl<K, V> ExactSizeIterator for IntoKeys<K, V> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<K, V> FusedIterator for IntoKeys<K, V> {}

/// Consuming iterator returned by [`RbMap::into_values`].
pub struct IntoValues<K, V>(IntoIter<K, V>);
impl<K, V> Iterator for IntoValues<K, V> {
    type Item = V;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.0.next()?.1)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<K, V> DoubleEndedIterator for IntoValues<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        Some(self.0.next_back()?.1)
    }
}
impl<K, V> ExactSizeIterator for IntoValues<K, V> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<K, V> FusedIterator for IntoValues<K, V> {}

/// Iterator returned by [`RbMap::values_mut`].
pub struct ValuesMut<'a, K, V>(IterMut<'a, K, V>);
impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<'a, K, V> DoubleEndedIterator for ValuesMut<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(_, v)| v)
    }
}
impl<'a, K, V> ExactSizeIterator for ValuesMut<'a, K, V> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<'a, K, V> FusedIterator for ValuesMut<'a, K, V> {}

/// Iterator returned by [`RbMap::values`].
#[derive(Clone)]
pub struct Values<'a, K, V>(Iter<'a, K, V>);
impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<'a, K, V> DoubleEndedIterator for Values<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(_, v)| v)
    }
}
impl<'a, K, V> ExactSizeIterator for Values<'a, K, V> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<'a, K, V> FusedIterator for Values<'a, K, V> {}

/// Iterator returned by [`RbMap::keys`].
#[derive(Clone)]
pub struct Keys<'a, K, V>(Iter<'a, K, V>);
impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
impl<'a, K, V> DoubleEndedIterator for Keys<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(k, _)| k)
    }
}
impl<'a, K, V> ExactSizeIterator for Keys<'a, K, V> {
    fn len(&self) -> usize {
        self.0.len()
    }
}
impl<'a, K, V> FusedIterator for Keys<'a, K, V> {}

// Tests.

#[cfg(all(test, not(miri), feature = "cap"))]
#[global_allocator]
static ALLOCATOR: cap::Cap<std::alloc::System> =
    cap::Cap::new(std::alloc::System, usize::max_value());

#[cfg(test)]
fn print_memory() {
    #[cfg(all(test, not(miri), feature = "cap"))]
    println!("Memory allocated: {} bytes", ALLOCATOR.allocated());
}

/* mimalloc cannot be used with miri */
#[cfg(all(test, not(miri), not(feature = "cap")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(test)]
mod mytests;
