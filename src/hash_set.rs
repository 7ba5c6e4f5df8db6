//! A hash set over a [`HashTable`], with the usual set algebra.

use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::DefaultHashBuilder;
use crate::error::TryReserveError;
use crate::hash_table;
use crate::hash_table::Entry;
use crate::hash_table::HashTable;
use crate::hash_traits::HashTraits;
use crate::translator::{BorrowTranslator, HashTranslator, IdentityTranslator, InsertTranslator};

/// A hash set backed by a [`HashTable`].
///
/// `HashSet<T, S>` stores values of type `T` where `T` implements
/// `Hash + Eq + HashTraits`, and hashes them with the builder `S`. The
/// sentinel values of `T` (for integers `MAX` and `MAX - 1`) cannot be
/// stored.
///
/// # Examples
///
/// ```rust
/// # use tomb_hash::HashSet;
/// #
/// let mut set: HashSet<u32> = HashSet::new();
/// let (value, is_new) = set.add(7);
/// assert_eq!((*value, is_new), (7, true));
/// assert!(!set.add(7).1);
///
/// assert!(set.remove(&7));
/// assert!(!set.remove(&7));
/// ```
pub struct HashSet<T: HashTraits, S = DefaultHashBuilder> {
    table: HashTable<T>,
    hash_builder: S,
}

impl<T, S> Clone for HashSet<T, S>
where
    T: HashTraits + Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Debug for HashSet<T, S>
where
    T: HashTraits + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new hash set with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "std")]
    /// # {
    /// use std::hash::RandomState;
    ///
    /// use tomb_hash::hash_set::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_hasher(RandomState::new());
    /// assert!(set.is_empty());
    /// # }
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a new hash set that holds at least `capacity` values without
    /// rehashing.
    ///
    /// The slot count is rounded up to a power of two that keeps `capacity`
    /// values under half the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "std")]
    /// # {
    /// use std::hash::RandomState;
    ///
    /// use tomb_hash::hash_set::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_capacity_and_hasher(100, RandomState::new());
    /// assert_eq!(set.capacity(), 256);
    /// # }
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the set's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements and releases the table's memory.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Shrinks the table as far as the load bounds allow and purges
    /// tombstones.
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(|v| self.hash_builder.hash_one(v));
    }

    /// Reserves room for at least `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, |v| self.hash_builder.hash_one(v));
    }

    /// Fallible counterpart of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, |v| self.hash_builder.hash_one(v))
    }

    /// Adds `value` to the set unless an equal value is present.
    ///
    /// Returns the stored value and `true` if it was newly inserted. An
    /// existing value is kept and `value` is dropped.
    pub fn add(&mut self, value: T) -> (&T, bool) {
        self.add_with::<IdentityTranslator, T>(value)
    }

    /// Like [`add`](Self::add), but looks `key` up through the translator
    /// `H` and only converts it into a stored value when it is absent.
    pub fn add_with<H, Q>(&mut self, key: Q) -> (&T, bool)
    where
        H: InsertTranslator<T, Q>,
    {
        let hash = H::hash(&self.hash_builder, &key);
        let hash_builder = &self.hash_builder;
        match self.table.entry(hash, |stored| H::equal(stored, &key)) {
            Entry::Occupied(entry) => (&*entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let value = entry.insert(H::translate(key), |v| hash_builder.hash_one(v));
                (&*value, true)
            }
        }
    }

    /// Returns the stored value the translator `H` finds for `key`.
    pub fn find_with<H, Q>(&self, key: &Q) -> Option<&T>
    where
        H: HashTranslator<T, Q>,
        Q: ?Sized,
    {
        let hash = H::hash(&self.hash_builder, key);
        self.table.find(hash, |stored| H::equal(stored, key))
    }

    /// Returns `true` if the translator `H` finds `key`.
    pub fn contains_with<H, Q>(&self, key: &Q) -> bool
    where
        H: HashTranslator<T, Q>,
        Q: ?Sized,
    {
        self.find_with::<H, Q>(key).is_some()
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`.
    pub fn find<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_with::<BorrowTranslator, Q>(value)
    }

    /// Removes `value` from the set. Returns `false` if it was absent.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(
            hash,
            |stored| stored.borrow() == value,
            |v| self.hash_builder.hash_one(v),
        )
    }

    /// Returns `true` if `self` has no elements in common with `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashSet;
    /// #
    /// let a: HashSet<i32> = [1, 2].into_iter().collect();
    /// let b: HashSet<i32> = [3, 4].into_iter().collect();
    /// assert!(a.is_disjoint(&b));
    /// ```
    pub fn is_disjoint(&self, other: &HashSet<T, S>) -> bool {
        if self.len() <= other.len() {
            self.iter().all(|v| !other.contains(v))
        } else {
            other.iter().all(|v| !self.contains(v))
        }
    }

    /// Returns `true` if `other` contains every element of `self`.
    pub fn is_subset(&self, other: &HashSet<T, S>) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if `self` contains every element of `other`.
    pub fn is_superset(&self, other: &HashSet<T, S>) -> bool {
        other.is_subset(self)
    }

    /// Iterates over the elements of `self`, then the elements of `other`
    /// that are not in `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashSet;
    /// #
    /// let a: HashSet<i32> = [1, 2].into_iter().collect();
    /// let b: HashSet<i32> = [2, 3].into_iter().collect();
    ///
    /// let mut union: Vec<_> = a.union(&b).copied().collect();
    /// union.sort();
    /// assert_eq!(union, [1, 2, 3]);
    /// ```
    pub fn union<'a>(&'a self, other: &'a HashSet<T, S>) -> Union<'a, T, S> {
        Union {
            iter: self.iter(),
            other: other.difference(self),
        }
    }

    /// Iterates over the elements present in both sets. The smaller set is
    /// walked.
    pub fn intersection<'a>(&'a self, other: &'a HashSet<T, S>) -> Intersection<'a, T, S> {
        let (iter, other) = if self.len() <= other.len() {
            (self.iter(), other)
        } else {
            (other.iter(), self)
        };
        Intersection { iter, other }
    }

    /// Iterates over the elements of `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a HashSet<T, S>) -> Difference<'a, T, S> {
        Difference {
            iter: self.iter(),
            other,
        }
    }

    /// Keeps only the elements for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashSet;
    /// #
    /// let mut set: HashSet<i32> = (1..=4).collect();
    /// set.retain(|&x| x % 2 == 0);
    /// assert_eq!(set.len(), 2);
    /// assert!(set.contains(&2) && set.contains(&4));
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table
            .retain(|v| f(v), |v| self.hash_builder.hash_one(v));
    }

    /// Verifies the invariants of the underlying table.
    ///
    /// # Panics
    ///
    /// Panics if the table is inconsistent.
    pub fn check_consistency(&self) {
        self.table
            .check_consistency(|v| self.hash_builder.hash_one(v));
    }

    /// Returns the probe counters of the underlying table.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> crate::stats::TableStats {
        self.table.stats()
    }

    /// Computes the current probe length of every element.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> crate::stats::ProbeHistogram {
        self.table
            .probe_histogram(|v| self.hash_builder.hash_one(v))
    }
}

impl<T, S> HashSet<T, S>
where
    T: HashTraits,
{
    /// An iterator over the elements in arbitrary order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes every element, yielding them. The table's memory is released
    /// when the iterator is dropped.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S> HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new hash set using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new hash set with room for `capacity` elements using the
    /// default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S> Default for HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator over the values of a `HashSet`.
pub struct Iter<'a, T: HashTraits> {
    inner: hash_table::Iter<'a, T>,
}

impl<T: HashTraits> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, T: HashTraits> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T: HashTraits> ExactSizeIterator for Iter<'_, T> {}

/// A draining iterator over the values of a `HashSet`.
pub struct Drain<'a, T: HashTraits> {
    inner: hash_table::Drain<'a, T>,
}

impl<T: HashTraits> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A consuming iterator over the values of a `HashSet`.
pub struct IntoIter<T: HashTraits> {
    inner: hash_table::IntoIter<T>,
}

impl<T: HashTraits> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T: HashTraits> ExactSizeIterator for IntoIter<T> {}

impl<T, S> IntoIterator for HashSet<T, S>
where
    T: HashTraits,
{
    type IntoIter = IntoIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S>
where
    T: HashTraits,
{
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = HashSet::new();
        set.extend(iter);
        set
    }
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

/// An iterator over the union of two sets.
pub struct Union<'a, T: HashTraits, S> {
    iter: Iter<'a, T>,
    other: Difference<'a, T, S>,
}

impl<'a, T, S> Iterator for Union<'a, T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().or_else(|| self.other.next())
    }
}

/// An iterator over the intersection of two sets.
pub struct Intersection<'a, T: HashTraits, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Intersection<'a, T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let other = self.other;
        self.iter.by_ref().find(|v| other.contains(*v))
    }
}

/// An iterator over the difference of two sets.
pub struct Difference<'a, T: HashTraits, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Difference<'a, T, S>
where
    T: HashTraits + Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let other = self.other;
        self.iter.by_ref().find(|v| !other.contains(*v))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            Self {
                k1: OsRng.try_next_u64().unwrap_or(0),
                k2: OsRng.try_next_u64().unwrap_or(0),
            }
        }
    }

    type Set<T> = HashSet<T, SipHashBuilder>;

    #[test]
    fn test_new_and_with_capacity() {
        let set: Set<i32> = HashSet::new();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 0);

        let set: Set<i32> = HashSet::with_capacity(100);
        assert_eq!(set.capacity(), 256);
        set.check_consistency();
    }

    #[test]
    fn test_add_and_contains() {
        let mut set: Set<u64> = HashSet::new();
        for i in 0..500 {
            let (value, is_new) = set.add(i * 3);
            assert_eq!(*value, i * 3);
            assert!(is_new);
        }
        for i in 0..500 {
            assert!(!set.add(i * 3).1);
            assert!(set.contains(&(i * 3)));
            assert!(!set.contains(&(i * 3 + 1)));
        }
        assert_eq!(set.len(), 500);
        set.check_consistency();
    }

    #[test]
    fn test_remove_and_take() {
        let mut set: Set<i64> = (0..100).collect();
        assert!(set.remove(&10));
        assert!(!set.remove(&10));
        assert_eq!(set.take(&20), Some(20));
        assert_eq!(set.take(&20), None);
        assert_eq!(set.len(), 98);
        set.check_consistency();

        for i in 0..100 {
            set.remove(&i);
        }
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 64);
        set.check_consistency();
    }

    /// A key that borrows as its raw id, so lookups can use plain `u32`s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Tag(u32);

    impl Borrow<u32> for Tag {
        fn borrow(&self) -> &u32 {
            &self.0
        }
    }

    impl crate::hash_traits::EmptyValue for Tag {
        fn empty_value() -> Self {
            Tag(u32::MAX)
        }
    }

    impl HashTraits for Tag {
        const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = true;

        fn is_empty_value(value: &Self) -> bool {
            value.0 == u32::MAX
        }

        fn construct_deleted_value(slot: &mut core::mem::MaybeUninit<Self>) {
            slot.write(Tag(u32::MAX - 1));
        }

        fn is_deleted_value(value: &Self) -> bool {
            value.0 == u32::MAX - 1
        }
    }

    #[test]
    fn test_borrowed_lookup() {
        let mut set: Set<Tag> = HashSet::new();
        set.add(Tag(4));
        set.add(Tag(8));

        assert!(set.contains(&4u32));
        assert_eq!(set.find(&8u32), Some(&Tag(8)));
        assert!(set.remove(&4u32));
        assert!(!set.contains(&Tag(4)));
        set.check_consistency();
    }

    /// Finds `u64` elements from `u32` probes, widening only on insertion.
    struct Widen;

    impl HashTranslator<u64, u32> for Widen {
        fn hash<S: BuildHasher>(hash_builder: &S, key: &u32) -> u64 {
            hash_builder.hash_one(u64::from(*key))
        }

        fn equal(stored: &u64, key: &u32) -> bool {
            *stored == u64::from(*key)
        }
    }

    impl InsertTranslator<u64, u32> for Widen {
        fn translate(key: u32) -> u64 {
            u64::from(key)
        }
    }

    #[test]
    fn test_translator_forms() {
        let mut set: Set<u64> = HashSet::new();
        let (value, is_new) = set.add_with::<Widen, _>(3u32);
        assert_eq!(*value, 3);
        assert!(is_new);
        assert!(!set.add_with::<Widen, _>(3u32).1);

        assert!(set.contains_with::<Widen, _>(&3u32));
        assert!(!set.contains_with::<Widen, _>(&4u32));
        assert_eq!(set.find_with::<Widen, _>(&3u32), Some(&3));
        assert!(set.contains(&3));

        for i in 0..200u32 {
            set.add_with::<Widen, _>(i);
        }
        assert_eq!(set.len(), 200);
        set.check_consistency();
    }

    #[test]
    fn test_clear_releases_storage() {
        let mut set: Set<u32> = (0..1000).collect();
        assert_eq!(set.capacity(), 2048);
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 0);
        set.add(5);
        assert_eq!(set.capacity(), 64);
    }

    #[test]
    fn test_iter_and_drain() {
        let mut set: Set<u16> = (0..50).collect();
        let mut values: Vec<_> = set.iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..50).collect::<Vec<_>>());
        assert_eq!(set.iter().len(), 50);

        let mut drained: Vec<_> = set.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, values);
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 0);
    }

    #[test]
    fn test_into_iterator() {
        let set: Set<u8> = [1, 2, 3].into_iter().collect();
        let mut values: Vec<_> = set.into_iter().collect();
        values.sort_unstable();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn test_retain() {
        let mut set: Set<u32> = (0..400).collect();
        set.retain(|v| v % 10 == 0);
        assert_eq!(set.len(), 40);
        assert!(set.iter().all(|v| v % 10 == 0));
        set.check_consistency();
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a: Set<i32> = [1, 2, 3].into_iter().collect();
        let b: Set<i32> = [3, 1, 2].into_iter().collect();
        let c: Set<i32> = [1, 2].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_set_algebra() {
        let a: Set<i32> = [1, 2, 3, 4].into_iter().collect();
        let b: Set<i32> = [3, 4, 5].into_iter().collect();
        let small: Set<i32> = [1, 2].into_iter().collect();

        let mut union: Vec<_> = a.union(&b).copied().collect();
        union.sort_unstable();
        assert_eq!(union, [1, 2, 3, 4, 5]);

        let mut intersection: Vec<_> = a.intersection(&b).copied().collect();
        intersection.sort_unstable();
        assert_eq!(intersection, [3, 4]);

        let mut difference: Vec<_> = a.difference(&b).copied().collect();
        difference.sort_unstable();
        assert_eq!(difference, [1, 2]);

        assert!(small.is_subset(&a));
        assert!(a.is_superset(&small));
        assert!(!small.is_subset(&b));
        assert!(small.is_disjoint(&b));
        assert!(!a.is_disjoint(&b));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut set: Set<u64> = (0..100).collect();
        for i in 0..50 {
            set.remove(&i);
        }
        let copy = set.clone();
        set.clear();
        assert_eq!(copy.len(), 50);
        assert!(copy.contains(&99));
        copy.check_consistency();
    }

    #[test]
    fn test_debug_lists_elements() {
        let set: Set<u8> = [9].into_iter().collect();
        assert_eq!(alloc::format!("{set:?}"), "{9}");
    }
}
