//! An insertion-ordered hash set.
//!
//! Elements live in a node pool and are threaded into a doubly linked list in
//! insertion order. The hash table underneath stores only [`NodeId`]
//! handles into the pool, so rehashing moves four-byte handles and never
//! disturbs the list. Equality on handles goes through the pool, which makes
//! the handles unsafe to compare against the table's sentinels.
//!
//! The pool keeps its first `N` nodes inline and spills to the heap once
//! exhausted. Freed nodes are recycled most-recently-freed first.

use core::borrow::Borrow;
use core::fmt::{self, Debug};
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::mem::MaybeUninit;

use smallvec::SmallVec;

use crate::DefaultHashBuilder;
use crate::hash_table::{Entry, HashTable};
use crate::hash_traits::{EmptyValue, HashTraits};
use crate::translator::{BorrowTranslator, HashTranslator};

/// Handle to a node in the pool: slot index plus one. `0` marks an empty
/// table slot and `u32::MAX` a deleted one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeId(u32);

impl NodeId {
    #[inline(always)]
    fn from_index(index: usize) -> Self {
        match u32::try_from(index + 1) {
            Ok(raw) if raw != u32::MAX => NodeId(raw),
            _ => panic!("linked hash set node pool overflow"),
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        debug_assert!(self.0 != 0 && self.0 != u32::MAX, "sentinel node id");
        (self.0 - 1) as usize
    }
}

impl EmptyValue for NodeId {
    const EMPTY_VALUE_IS_ZERO: bool = true;
    const NEEDS_DESTRUCTION: bool = false;

    #[inline(always)]
    fn empty_value() -> Self {
        NodeId(0)
    }
}

impl HashTraits for NodeId {
    #[inline(always)]
    fn is_empty_value(value: &Self) -> bool {
        value.0 == 0
    }

    #[inline(always)]
    fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
        slot.write(NodeId(u32::MAX));
    }

    #[inline(always)]
    fn is_deleted_value(value: &Self) -> bool {
        value.0 == u32::MAX
    }
}

#[derive(Clone)]
struct Node<T> {
    value: T,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Clone)]
enum Slot<T> {
    Occupied(Node<T>),
    Vacant { next_free: Option<usize> },
}

/// Index arena for list nodes with an intrusive free list.
#[derive(Clone)]
struct NodePool<T, const N: usize> {
    slots: SmallVec<[Slot<T>; N]>,
    free: Option<usize>,
    len: usize,
}

impl<T, const N: usize> NodePool<T, N> {
    fn new() -> Self {
        Self {
            slots: SmallVec::new(),
            free: None,
            len: 0,
        }
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SmallVec::with_capacity(capacity),
            free: None,
            len: 0,
        }
    }

    fn alloc(&mut self, node: Node<T>) -> NodeId {
        self.len += 1;
        match self.free {
            Some(index) => {
                let slot = core::mem::replace(&mut self.slots[index], Slot::Occupied(node));
                match slot {
                    Slot::Vacant { next_free } => self.free = next_free,
                    Slot::Occupied(_) => unreachable!("free list points at a live node"),
                }
                NodeId::from_index(index)
            }
            None => {
                let id = NodeId::from_index(self.slots.len());
                self.slots.push(Slot::Occupied(node));
                id
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Node<T> {
        let index = id.index();
        let vacant = Slot::Vacant {
            next_free: self.free,
        };
        match core::mem::replace(&mut self.slots[index], vacant) {
            Slot::Occupied(node) => {
                self.free = Some(index);
                self.len -= 1;
                node
            }
            Slot::Vacant { .. } => unreachable!("released a vacant node"),
        }
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node<T> {
        match &self.slots[id.index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("dangling node id"),
        }
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        match &mut self.slots[id.index()] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("dangling node id"),
        }
    }

    fn clear(&mut self) {
        self.slots = SmallVec::new();
        self.free = None;
        self.len = 0;
    }
}

/// A hash set that remembers insertion order.
///
/// New elements are appended to the end of the order, or spliced in front
/// of an existing element with [`insert_before`](Self::insert_before).
/// Iteration follows the order in both directions. `N` is the number of
/// nodes kept inline before the pool moves to the heap.
///
/// # Examples
///
/// ```rust
/// # use tomb_hash::LinkedHashSet;
/// #
/// let mut set: LinkedHashSet<&str> = LinkedHashSet::new();
/// set.add("b");
/// set.add("d");
/// set.insert_before(&"d", "c");
/// set.insert_before(&"b", "a");
///
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), ["a", "b", "c", "d"]);
/// assert_eq!(set.iter().rev().next(), Some(&"d"));
///
/// assert_eq!(set.remove_first(), Some("a"));
/// assert_eq!(set.first(), Some(&"b"));
/// ```
pub struct LinkedHashSet<T, S = DefaultHashBuilder, const N: usize = 16> {
    table: HashTable<NodeId>,
    pool: NodePool<T, N>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    hash_builder: S,
}

impl<T, S, const N: usize> LinkedHashSet<T, S, N>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty set with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            pool: NodePool::new(),
            head: None,
            tail: None,
            hash_builder,
        }
    }

    /// Creates an empty set with room for `capacity` elements.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            pool: NodePool::with_capacity(capacity),
            head: None,
            tail: None,
            hash_builder,
        }
    }

    /// Returns a reference to the set's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set has no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of slots in the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns `true` once the node pool has outgrown its `N` inline nodes.
    pub fn pool_spilled(&self) -> bool {
        self.pool.slots.spilled()
    }

    /// Removes every element and releases the table and any spilled pool
    /// storage.
    pub fn clear(&mut self) {
        self.table.clear();
        self.pool.clear();
        self.head = None;
        self.tail = None;
    }

    fn find_id<H, Q>(&self, key: &Q) -> Option<NodeId>
    where
        H: HashTranslator<T, Q>,
        Q: ?Sized,
    {
        let hash = H::hash(&self.hash_builder, key);
        let pool = &self.pool;
        self.table
            .find(hash, |id| H::equal(&pool.node(*id).value, key))
            .copied()
    }

    /// Links a detached node in front of `before`, or at the tail.
    fn link(&mut self, id: NodeId, before: Option<NodeId>) {
        let prev = match before {
            Some(next) => self.pool.node(next).prev,
            None => self.tail,
        };
        {
            let node = self.pool.node_mut(id);
            node.prev = prev;
            node.next = before;
        }
        match prev {
            Some(prev) => self.pool.node_mut(prev).next = Some(id),
            None => self.head = Some(id),
        }
        match before {
            Some(next) => self.pool.node_mut(next).prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    fn unlink(&mut self, id: NodeId) {
        let (prev, next) = {
            let node = self.pool.node(id);
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.pool.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.pool.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    /// Inserts `value` unless it is present and links it in front of
    /// `before`, or at the tail when `before` is `None`.
    fn insert_linked(&mut self, value: T, before: Option<NodeId>) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        let hash_builder = &self.hash_builder;
        let pool = &mut self.pool;
        let entry = self.table.entry(hash, |id| pool.node(*id).value == value);
        let Entry::Vacant(entry) = entry else {
            return false;
        };

        let id = pool.alloc(Node {
            value,
            prev: None,
            next: None,
        });
        let pool = &*pool;
        entry.insert(id, |id| hash_builder.hash_one(&pool.node(*id).value));
        self.link(id, before);
        true
    }

    /// Appends `value` unless an equal element is present. Returns `true` if
    /// it was added.
    pub fn add(&mut self, value: T) -> bool {
        self.insert_linked(value, None)
    }

    /// Inserts `value` immediately before the element equal to `before`, or
    /// appends it when `before` is not in the set. Returns `false`, leaving
    /// the order untouched, if `value` is already present.
    pub fn insert_before<Q>(&mut self, before: &Q, value: T) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let anchor = self.find_id::<BorrowTranslator, Q>(before);
        self.insert_linked(value, anchor)
    }

    fn remove_id(&mut self, id: NodeId) -> T {
        let hash = self.hash_builder.hash_one(&self.pool.node(id).value);
        let pool = &self.pool;
        let hash_builder = &self.hash_builder;
        let removed = self.table.remove(
            hash,
            |candidate| *candidate == id,
            |id| hash_builder.hash_one(&pool.node(*id).value),
        );
        debug_assert_eq!(removed, Some(id), "node missing from the table");

        self.unlink(id);
        self.pool.release(id).value
    }

    /// Removes and returns the element equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        let pool = &self.pool;
        let hash_builder = &self.hash_builder;
        let id = self.table.remove(
            hash,
            |id| pool.node(*id).value.borrow() == value,
            |id| hash_builder.hash_one(&pool.node(*id).value),
        )?;

        self.unlink(id);
        Some(self.pool.release(id).value)
    }

    /// Removes the element equal to `value`. Returns `false` if it was
    /// absent.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the oldest element.
    pub fn remove_first(&mut self) -> Option<T> {
        let id = self.head?;
        Some(self.remove_id(id))
    }

    /// Removes and returns the newest element.
    pub fn remove_last(&mut self) -> Option<T> {
        let id = self.tail?;
        Some(self.remove_id(id))
    }

    /// Returns the stored element equal to `value`.
    pub fn find<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_with::<BorrowTranslator, Q>(value)
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(value).is_some()
    }

    /// Returns the stored element the translator `H` finds for `key`.
    pub fn find_with<H, Q>(&self, key: &Q) -> Option<&T>
    where
        H: HashTranslator<T, Q>,
        Q: ?Sized,
    {
        let id = self.find_id::<H, Q>(key)?;
        Some(&self.pool.node(id).value)
    }

    /// Returns `true` if the translator `H` finds `key`.
    pub fn contains_with<H, Q>(&self, key: &Q) -> bool
    where
        H: HashTranslator<T, Q>,
        Q: ?Sized,
    {
        self.find_id::<H, Q>(key).is_some()
    }

    /// Verifies the table and that the list and the table hold the same
    /// nodes.
    ///
    /// # Panics
    ///
    /// Panics on the first violated invariant.
    pub fn check_consistency(&self) {
        let pool = &self.pool;
        let hash_builder = &self.hash_builder;
        self.table
            .check_consistency(|id| hash_builder.hash_one(&pool.node(*id).value));

        assert_eq!(pool.len, self.len(), "pool and table disagree on length");

        let mut count = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = pool.node(id);
            assert_eq!(node.prev, prev, "broken back link at element {count}");
            let hash = hash_builder.hash_one(&node.value);
            assert!(
                self.table.contains(hash, |candidate| *candidate == id),
                "listed element {count} is not in the table"
            );
            count += 1;
            assert!(count <= self.len(), "list is longer than the table");
            prev = Some(id);
            cursor = node.next;
        }
        assert_eq!(count, self.len(), "list is shorter than the table");
        assert_eq!(self.tail, prev, "tail does not end the list");
    }
}

impl<T, S, const N: usize> LinkedHashSet<T, S, N>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty set with the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty set with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S, const N: usize> LinkedHashSet<T, S, N> {
    /// The oldest element.
    pub fn first(&self) -> Option<&T> {
        self.head.map(|id| &self.pool.node(id).value)
    }

    /// The newest element.
    pub fn last(&self) -> Option<&T> {
        self.tail.map(|id| &self.pool.node(id).value)
    }

    /// Iterates in order, oldest first. Use `.rev()` for newest first.
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            pool: &self.pool,
            front: self.head,
            back: self.tail,
            remaining: self.pool.len,
        }
    }

    /// Removes every element, yielding them in order. Storage is released
    /// up front.
    pub fn drain(&mut self) -> Drain<'_, T, N> {
        self.table.clear();
        let inner = IntoIter {
            pool: core::mem::replace(&mut self.pool, NodePool::new()),
            front: self.head.take(),
            back: self.tail.take(),
        };
        Drain {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S, const N: usize> Default for LinkedHashSet<T, S, N>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, const N: usize> Clone for LinkedHashSet<T, S, N>
where
    T: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        // Node ids are pool indices, so a pool clone keeps the table valid.
        Self {
            table: self.table.clone(),
            pool: self.pool.clone(),
            head: self.head,
            tail: self.tail,
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<T: Debug, S, const N: usize> Debug for LinkedHashSet<T, S, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S, const N: usize> Extend<T> for LinkedHashSet<T, S, N>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

impl<T, S, const N: usize> FromIterator<T> for LinkedHashSet<T, S, N>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T, S, const N: usize> IntoIterator for LinkedHashSet<T, S, N> {
    type Item = T;
    type IntoIter = IntoIter<T, N>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            pool: self.pool,
            front: self.head,
            back: self.tail,
        }
    }
}

impl<'a, T, S, const N: usize> IntoIterator for &'a LinkedHashSet<T, S, N> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over a [`LinkedHashSet`] in insertion order.
pub struct Iter<'a, T, const N: usize> {
    pool: &'a NodePool<T, N>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<T, const N: usize> Clone for Iter<'_, T, N> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.pool.node(self.front?);
        self.front = node.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T, const N: usize> DoubleEndedIterator for Iter<'a, T, N> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.pool.node(self.back?);
        self.back = node.prev;
        self.remaining -= 1;
        Some(&node.value)
    }
}

impl<T, const N: usize> ExactSizeIterator for Iter<'_, T, N> {}

impl<T, const N: usize> core::iter::FusedIterator for Iter<'_, T, N> {}

/// An owning iterator over a [`LinkedHashSet`] in insertion order.
pub struct IntoIter<T, const N: usize> {
    pool: NodePool<T, N>,
    front: Option<NodeId>,
    back: Option<NodeId>,
}

impl<T, const N: usize> Iterator for IntoIter<T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let id = self.front?;
        let node = self.pool.release(id);
        if self.pool.len == 0 {
            self.front = None;
            self.back = None;
        } else {
            self.front = node.next;
        }
        Some(node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pool.len, Some(self.pool.len))
    }
}

impl<T, const N: usize> DoubleEndedIterator for IntoIter<T, N> {
    fn next_back(&mut self) -> Option<T> {
        let id = self.back?;
        let node = self.pool.release(id);
        if self.pool.len == 0 {
            self.front = None;
            self.back = None;
        } else {
            self.back = node.prev;
        }
        Some(node.value)
    }
}

impl<T, const N: usize> ExactSizeIterator for IntoIter<T, N> {}

/// A draining iterator over a [`LinkedHashSet`] in insertion order.
pub struct Drain<'a, T, const N: usize> {
    inner: IntoIter<T, N>,
    _marker: PhantomData<&'a mut T>,
}

impl<T, const N: usize> Iterator for Drain<'_, T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, const N: usize> DoubleEndedIterator for Drain<'_, T, N> {
    fn next_back(&mut self) -> Option<T> {
        self.inner.next_back()
    }
}

impl<T, const N: usize> ExactSizeIterator for Drain<'_, T, N> {}
