//! A hash map over a [`HashTable`] of key/value pairs, with `set`/`add`
//! insertion, peek-style `get` and an entry API.

use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::DefaultHashBuilder;
use crate::error::TryReserveError;
use crate::hash_table;
use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_traits::{EmptyValue, HashTraits};
use crate::translator::{BorrowTranslator, HashTranslator, IdentityTranslator, InsertTranslator};

fn make_hasher<K, V, S>(hash_builder: &S) -> impl Fn(&(K, V)) -> u64 + '_
where
    K: Hash,
    S: BuildHasher,
{
    move |(key, _)| hash_builder.hash_one(key)
}

/// A hash map backed by a [`HashTable`] of `(K, V)` pairs.
///
/// Keys implement [`HashTraits`], which reserves two of their values as the
/// empty and deleted sentinels (`MAX` and `MAX - 1` for integers), and mapped
/// values implement [`EmptyValue`]. [`get`](HashMap::get) returns a clone of
/// the mapped value, or the empty value for absent keys.
///
/// # Examples
///
/// ```rust
/// # use tomb_hash::HashMap;
/// #
/// let mut scores: HashMap<u32, u32> = HashMap::new();
///
/// assert!(scores.set(1, 10).is_new_entry);
/// assert!(!scores.add(1, 20).is_new_entry);
/// assert_eq!(scores.get(&1), 10);
///
/// // Absent keys read as the mapped type's empty value.
/// assert_eq!(scores.get(&2), u32::MAX);
/// assert_eq!(scores.get_ref(&2), None);
///
/// assert_eq!(scores.take(&1), 10);
/// assert!(scores.is_empty());
/// ```
pub struct HashMap<K: HashTraits, V: EmptyValue, S = DefaultHashBuilder> {
    table: HashTable<(K, V)>,
    hash_builder: S,
}

/// The result of [`HashMap::set`] and [`HashMap::add`]: the stored key and
/// mapped value, and whether the key was newly inserted.
#[derive(Debug)]
pub struct AddResult<'a, K, V> {
    /// The key as stored in the map.
    pub key: &'a K,
    /// The mapped value stored for `key`.
    pub value: &'a mut V,
    /// `true` if the key was not present before.
    pub is_new_entry: bool,
}

impl<K, V, S> Clone for HashMap<K, V, S>
where
    K: HashTraits + Clone,
    V: EmptyValue + Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: HashTraits + Debug,
    V: EmptyValue + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.table.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue,
    S: BuildHasher,
{
    /// Creates a new hash map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use tomb_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 0);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a new hash map that holds at least `capacity` entries without
    /// rehashing, using the given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the underlying table. At most half of
    /// them hold entries.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries and releases the table's memory.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, make_hasher::<K, V, S>(&self.hash_builder));
    }

    /// Fallible counterpart of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table
            .try_reserve(additional, make_hasher::<K, V, S>(&self.hash_builder))
    }

    /// Shrinks the table as far as the load bounds allow and purges
    /// tombstones.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit(make_hasher::<K, V, S>(&self.hash_builder));
    }

    fn add_internal<T, Q>(&mut self, key: Q, value: V, overwrite: bool) -> AddResult<'_, K, V>
    where
        T: InsertTranslator<K, Q>,
    {
        let hash = T::hash(&self.hash_builder, &key);
        let hash_builder = &self.hash_builder;
        match self.table.entry(hash, |(stored, _)| T::equal(stored, &key)) {
            TableEntry::Occupied(entry) => {
                let (stored, mapped) = entry.into_mut();
                if overwrite {
                    *mapped = value;
                }
                AddResult {
                    key: stored,
                    value: mapped,
                    is_new_entry: false,
                }
            }
            TableEntry::Vacant(entry) => {
                let (stored, mapped) = entry.insert(
                    (T::translate(key), value),
                    make_hasher::<K, V, S>(hash_builder),
                );
                AddResult {
                    key: stored,
                    value: mapped,
                    is_new_entry: true,
                }
            }
        }
    }

    /// Inserts `key` with `value`, overwriting the mapped value if the key is
    /// already present. The stored key is kept in that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashMap;
    /// #
    /// let mut map: HashMap<u8, String> = HashMap::new();
    /// assert!(map.set(3, "three".into()).is_new_entry);
    ///
    /// let result = map.set(3, "drei".into());
    /// assert!(!result.is_new_entry);
    /// assert_eq!(result.value, "drei");
    /// ```
    pub fn set(&mut self, key: K, value: V) -> AddResult<'_, K, V> {
        self.add_internal::<IdentityTranslator, K>(key, value, true)
    }

    /// Inserts `key` with `value` unless the key is already present, in
    /// which case the map is left unchanged and `value` is dropped.
    pub fn add(&mut self, key: K, value: V) -> AddResult<'_, K, V> {
        self.add_internal::<IdentityTranslator, K>(key, value, false)
    }

    /// Like [`add`](Self::add), but looks the key up through the translator
    /// `T` and only builds the stored key (with
    /// [`InsertTranslator::translate`]) when it is absent.
    pub fn add_with<T, Q>(&mut self, key: Q, value: V) -> AddResult<'_, K, V>
    where
        T: InsertTranslator<K, Q>,
    {
        self.add_internal::<T, Q>(key, value, false)
    }

    /// Inserts a key-value pair, returning the previous mapped value if the
    /// key was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        let hash_builder = &self.hash_builder;
        match self.table.entry(hash, |(stored, _)| *stored == key) {
            TableEntry::Occupied(mut entry) => Some(core::mem::replace(&mut entry.get_mut().1, value)),
            TableEntry::Vacant(entry) => {
                entry.insert((key, value), make_hasher::<K, V, S>(hash_builder));
                None
            }
        }
    }

    /// Finds the entry for `key` through the translator `T`.
    pub fn find_with<T, Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        T: HashTranslator<K, Q>,
        Q: ?Sized,
    {
        let hash = T::hash(&self.hash_builder, key);
        self.table
            .find(hash, |(stored, _)| T::equal(stored, key))
            .map(|(k, v)| (k, v))
    }

    /// Returns `true` if the translator `T` finds `key`.
    pub fn contains_with<T, Q>(&self, key: &Q) -> bool
    where
        T: HashTranslator<K, Q>,
        Q: ?Sized,
    {
        self.find_with::<T, Q>(key).is_some()
    }

    /// Returns the mapped value the translator `T` finds for `key`.
    pub fn get_with<T, Q>(&self, key: &Q) -> Option<&V>
    where
        T: HashTranslator<K, Q>,
        Q: ?Sized,
    {
        self.find_with::<T, Q>(key).map(|(_, v)| v)
    }

    /// Returns the stored key and mapped value for `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_with::<BorrowTranslator, Q>(key)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Returns a clone of the mapped value for `key`, or
    /// [`V::empty_value()`](EmptyValue::empty_value) if the key is absent.
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_ref(key).cloned().unwrap_or_else(V::empty_value)
    }

    /// Returns a reference to the mapped value for `key`.
    pub fn get_ref<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the mapped value for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, |(stored, _)| stored.borrow() == key)
            .map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored key and mapped value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(
            hash,
            |(stored, _)| stored.borrow() == key,
            make_hasher::<K, V, S>(&self.hash_builder),
        )
    }

    /// Removes `key` from the map. Returns `false` if it was absent.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).is_some()
    }

    /// Removes `key` and returns its mapped value, or
    /// [`V::empty_value()`](EmptyValue::empty_value) if the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashMap;
    /// #
    /// let mut map: HashMap<u64, Vec<u8>> = HashMap::new();
    /// map.set(1, vec![1, 2, 3]);
    ///
    /// assert_eq!(map.take(&1), [1, 2, 3]);
    /// assert!(map.take(&1).is_empty());
    /// ```
    pub fn take<Q>(&mut self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.remove_entry(key) {
            Some((_, value)) => value,
            None => V::empty_value(),
        }
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::HashMap;
    /// #
    /// let mut counts: HashMap<u32, usize> = HashMap::new();
    /// for id in [3, 1, 3, 3] {
    ///     *counts.entry(id).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get(&3), 3);
    /// assert_eq!(counts.get(&1), 1);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, S> {
        let hash = self.hash_builder.hash_one(&key);
        let hash_builder = &self.hash_builder;
        match self.table.entry(hash, |(stored, _)| *stored == key) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry {
                entry,
                hash_builder,
            }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry {
                entry,
                key,
                hash_builder,
            }),
        }
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(
            |(k, v)| f(k, v),
            make_hasher::<K, V, S>(&self.hash_builder),
        );
    }

    /// Verifies the invariants of the underlying table.
    ///
    /// # Panics
    ///
    /// Panics if the table is inconsistent, which indicates a `Hash`/`Eq`
    /// implementation that disagrees with itself or a bug in this crate.
    pub fn check_consistency(&self) {
        self.table
            .check_consistency(make_hasher::<K, V, S>(&self.hash_builder));
    }

    /// Returns the probe counters of the underlying table.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> crate::stats::TableStats {
        self.table.stats()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: HashTraits,
    V: EmptyValue,
{
    /// An iterator over `(&K, &V)` pairs in arbitrary order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// An iterator over `(&K, &mut V)` pairs in arbitrary order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// An iterator over the keys in arbitrary order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            inner: self.table.iter(),
        }
    }

    /// An iterator over the mapped values in arbitrary order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values {
            inner: self.table.iter(),
        }
    }

    /// An iterator over mutable mapped values in arbitrary order.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Removes every entry, yielding the pairs. The table's memory is
    /// released when the iterator is dropped.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue,
    S: BuildHasher + Default,
{
    /// Creates an empty map using the default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map that holds at least `capacity` entries without
    /// rehashing, using the default hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue + PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get_ref(k) == Some(v))
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue + Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    V: EmptyValue,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get_ref(key) {
            Some(value) => value,
            None => panic!("key not found in HashMap"),
        }
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: HashTraits + Hash + Eq,
    V: EmptyValue,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashMap<K, V, S>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K: HashTraits, V: EmptyValue, S> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, S>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, S>),
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    K: HashTraits + Hash,
    V: EmptyValue,
    S: BuildHasher,
{
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the mapped value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns a
    /// mutable reference to the mapped value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the mapped value of an occupied entry.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    K: HashTraits + Hash,
    V: EmptyValue + Default,
    S: BuildHasher,
{
    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry in a [`HashMap`].
pub struct VacantEntry<'a, K: HashTraits, V: EmptyValue, S> {
    entry: hash_table::VacantEntry<'a, (K, V)>,
    key: K,
    hash_builder: &'a S,
}

impl<'a, K, V, S> VacantEntry<'a, K, V, S>
where
    K: HashTraits + Hash,
    V: EmptyValue,
    S: BuildHasher,
{
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the entry's key with `value`.
    pub fn insert(self, value: V) -> &'a mut V {
        let (_, mapped) = self
            .entry
            .insert((self.key, value), make_hasher::<K, V, S>(self.hash_builder));
        mapped
    }
}

/// A view into an occupied entry in a [`HashMap`].
pub struct OccupiedEntry<'a, K: HashTraits, V: EmptyValue, S> {
    entry: hash_table::OccupiedEntry<'a, (K, V)>,
    hash_builder: &'a S,
}

impl<'a, K, V, S> OccupiedEntry<'a, K, V, S>
where
    K: HashTraits + Hash,
    V: EmptyValue,
    S: BuildHasher,
{
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the mapped value.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the mapped value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference bound to the map.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Replaces the mapped value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning the mapped value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Removes the entry, returning the stored key and mapped value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove(make_hasher::<K, V, S>(self.hash_builder))
    }
}

/// An iterator over the entries of a [`HashMap`].
pub struct Iter<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashMap`].
pub struct IterMut<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`HashMap`].
pub struct Keys<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the mapped values of a [`HashMap`].
pub struct Values<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Values<'a, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for Values<'_, K, V> {}

/// A mutable iterator over the mapped values of a [`HashMap`].
pub struct ValuesMut<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// A draining iterator over the entries of a [`HashMap`].
pub struct Drain<'a, K: HashTraits, V: EmptyValue> {
    inner: hash_table::Drain<'a, (K, V)>,
}

impl<K, V> Iterator for Drain<'_, K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An owning iterator over the entries of a [`HashMap`].
pub struct IntoIter<K: HashTraits, V: EmptyValue> {
    inner: hash_table::IntoIter<(K, V)>,
}

impl<K, V> Iterator for IntoIter<K, V>
where
    K: HashTraits,
    V: EmptyValue,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: HashTraits, V: EmptyValue> ExactSizeIterator for IntoIter<K, V> {}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
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

    type Map<K, V> = HashMap<K, V, SipHashBuilder>;

    #[test]
    fn test_set_overwrites_and_add_keeps() {
        let mut map: Map<u32, u32> = HashMap::new();
        assert!(map.set(1, 10).is_new_entry);

        let result = map.add(1, 20);
        assert!(!result.is_new_entry);
        assert_eq!(*result.value, 10);

        let result = map.set(1, 30);
        assert!(!result.is_new_entry);
        assert_eq!(*result.key, 1);
        assert_eq!(*result.value, 30);

        assert_eq!(map.insert(1, 40), Some(30));
        assert_eq!(map.insert(2, 50), None);
        assert_eq!(map.len(), 2);
        map.check_consistency();
    }

    #[test]
    fn test_absent_keys_read_as_empty_value() {
        let mut map: Map<u64, String> = HashMap::new();
        map.set(7, "seven".to_string());

        assert_eq!(map.get(&7), "seven");
        assert_eq!(map.get(&8), "");
        assert_eq!(map.get_ref(&8), None);

        assert_eq!(map.take(&7), "seven");
        assert_eq!(map.take(&7), "");
        assert!(map.is_empty());
    }

    #[test]
    fn test_many_inserts_and_removals() {
        let mut map: Map<u64, u64> = HashMap::new();
        for i in 0..2000 {
            assert!(map.set(i, i * 2).is_new_entry);
        }
        assert_eq!(map.len(), 2000);
        assert_eq!(map.capacity(), 4096);
        map.check_consistency();

        for i in (0..2000).step_by(2) {
            assert!(map.remove(&i));
        }
        for i in 0..2000 {
            assert_eq!(map.contains(&i), i % 2 == 1);
        }
        map.check_consistency();

        for i in 0..2000 {
            map.remove(&i);
        }
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 64);
        map.check_consistency();
    }

    #[test]
    fn test_with_capacity_and_reserve() {
        let mut map: Map<u32, u8> = HashMap::with_capacity(100);
        assert_eq!(map.capacity(), 256);

        map.reserve(1000);
        assert_eq!(map.capacity(), 2048);
        assert!(map.try_reserve(usize::MAX).is_err());

        map.set(1, 1);
        map.shrink_to_fit();
        assert_eq!(map.capacity(), 64);
        assert_eq!(map.get(&1), 1);
    }

    #[test]
    fn test_removal_from_presized_map_halves_once() {
        let mut map: Map<u32, u32> = HashMap::with_capacity(1000);
        assert_eq!(map.capacity(), 2048);
        map.set(1, 1);
        map.set(2, 2);

        map.remove(&2);
        assert_eq!(map.capacity(), 1024);
        map.take(&1);
        assert_eq!(map.capacity(), 512);
        map.check_consistency();
    }

    #[test]
    fn test_entry_api() {
        let mut counts: Map<u32, usize> = HashMap::new();
        for id in [5, 1, 5, 2, 5, 1] {
            counts.entry(id).and_modify(|c| *c += 1).or_insert(1);
        }
        assert_eq!(counts.get(&5), 3);
        assert_eq!(counts.get(&1), 2);
        assert_eq!(counts.get(&2), 1);

        *counts.entry(9).or_default() += 4;
        assert_eq!(counts.get(&9), 4);
        assert_eq!(*counts.entry(9).key(), 9);

        match counts.entry(1) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.insert(100), 2);
                assert_eq!(entry.remove_entry(), (1, 100));
            }
            Entry::Vacant(_) => panic!("1 should be present"),
        }
        match counts.entry(42) {
            Entry::Vacant(entry) => assert_eq!(entry.into_key(), 42),
            Entry::Occupied(_) => panic!("42 should be absent"),
        }
        assert!(!counts.contains(&1));
        assert!(!counts.contains(&42));
        counts.check_consistency();
    }

    /// Looks up `u64` keys from `u32` probes.
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
        let mut map: Map<u64, u32> = HashMap::new();
        let result = map.add_with::<Widen, _>(6u32, 60);
        assert!(result.is_new_entry);
        assert_eq!(*result.key, 6u64);
        assert!(!map.add_with::<Widen, _>(6u32, 61).is_new_entry);

        assert_eq!(map.get_with::<Widen, _>(&6u32), Some(&60));
        assert_eq!(map.find_with::<Widen, _>(&6u32), Some((&6, &60)));
        assert!(!map.contains_with::<Widen, _>(&7u32));
        assert_eq!(map.get(&6), 60);
    }

    #[test]
    fn test_iterators() {
        let mut map: Map<u32, u32> = (0..50).map(|i| (i, i * 10)).collect();
        assert_eq!(map.iter().len(), 50);

        let mut keys: Vec<u32> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());

        for value in map.values_mut() {
            *value += 1;
        }
        for (key, value) in &mut map {
            *value += *key;
        }
        let total: u32 = map.values().sum();
        assert_eq!(total, (0..50).map(|i| i * 11 + 1).sum::<u32>());

        let mut pairs: Vec<(u32, u32)> = map.clone().into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs[3], (3, 34));

        let drained: Vec<_> = map.drain().collect();
        assert_eq!(drained.len(), 50);
        assert!(map.is_empty());
        map.check_consistency();
    }

    #[test]
    fn test_retain() {
        let mut map: Map<u64, u64> = (0..1000).map(|i| (i, i)).collect();
        map.retain(|k, v| {
            *v += 1;
            k % 3 == 0
        });
        assert_eq!(map.len(), 334);
        assert_eq!(map.get(&999), 1000);
        assert!(!map.contains(&998));
        map.check_consistency();
    }

    #[test]
    fn test_eq_index_and_clone() {
        let a: Map<u32, u32> = (0..20).map(|i| (i, i)).collect();
        let mut b: Map<u32, u32> = (0..20).rev().map(|i| (i, i)).collect();
        assert_eq!(a, b);
        assert_eq!(a[&7], 7);

        b.set(7, 8);
        assert_ne!(a, b);
        b.remove(&7);
        assert_ne!(a, b);

        let c = a.clone();
        assert_eq!(a, c);
        c.check_consistency();
    }

    #[test]
    #[should_panic(expected = "key not found in HashMap")]
    fn test_index_panics_on_missing_key() {
        let map: Map<u32, u32> = HashMap::new();
        assert_eq!(map[&1], 0);
    }

    #[test]
    fn test_clear_releases_storage() {
        let mut map: Map<u32, String> = (0..100).map(|i| (i, i.to_string())).collect();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), 0);
        map.set(3, "3".to_string());
        assert_eq!(map.get(&3), "3");
        map.check_consistency();
    }
}
