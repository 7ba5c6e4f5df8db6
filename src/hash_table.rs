//! The open-addressing engine underneath every container in this crate.
//!
//! Slots are probed with double hashing: the sequence starts at
//! `hash & mask` and advances by an odd step derived from the hash, which
//! visits every slot of the power-of-two table. Removal leaves a tombstone so
//! that probe sequences passing through the slot stay intact; tombstones are
//! reused by later insertions on the same probe path and purged by rehashing.
//!
//! Slot states are encoded in the values themselves through
//! [`HashTraits`], so the table has no metadata array.

use alloc::alloc::{alloc, alloc_zeroed, dealloc, handle_alloc_error};
use core::alloc::Layout;
use core::fmt::{self, Debug};
use core::marker::PhantomData;
use core::mem::{ManuallyDrop, MaybeUninit};
use core::ptr::NonNull;

use crate::error::TryReserveError;
use crate::hash_traits::HashTraits;
#[cfg(feature = "stats")]
use crate::stats::{ProbeHistogram, TableStats};
use crate::stats::StatsRecorder;

/// Live plus deleted slots stay below `table_size / MAX_LOAD`.
const MAX_LOAD: usize = 2;

/// Tables shrink once live slots fall below `table_size / MIN_LOAD`.
const MIN_LOAD: usize = 6;

/// Secondary hash used to derive the probe step.
#[inline(always)]
fn double_hash(hash: u64) -> usize {
    let mut key = (hash as u32) ^ ((hash >> 32) as u32);
    key = (!key).wrapping_add(key >> 23);
    key ^= key << 12;
    key ^= key >> 7;
    key ^= key << 2;
    key ^= key >> 20;
    key as usize
}

#[cold]
#[inline(never)]
#[track_caller]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

/// Finds the first empty slot on `hash`'s probe path.
///
/// # Safety
///
/// `table` must point to `mask + 1` initialized slots, at least one of which
/// is empty.
#[inline]
unsafe fn probe_for_reinsert<V: HashTraits>(table: NonNull<V>, mask: usize, hash: u64) -> usize {
    let mut index = hash as usize & mask;
    let mut step = 0;
    // SAFETY: every index is masked into bounds and the caller guarantees an
    // empty slot exists, so the walk terminates.
    unsafe {
        while !V::is_empty_value(table.add(index).as_ref()) {
            if step == 0 {
                step = 1 | double_hash(hash);
            }
            index = index.wrapping_add(step) & mask;
        }
    }
    index
}

/// A handle to a live slot, returned by [`HashTable::find_bucket`] and
/// [`OccupiedEntry::bucket`].
///
/// A bucket stays meaningful only until the table is next mutated. Debug
/// builds record the table's generation and panic when a stale handle is
/// used; all builds panic when the handle points at a slot that is no longer
/// live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    index: usize,
    #[cfg(debug_assertions)]
    generation: u64,
}

impl Bucket {
    /// Raw slot index of this bucket.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// An open-addressing hash table with double-hash probing and tombstones.
///
/// `HashTable<V>` stores values of type `V` directly in a power-of-two array
/// of slots. Like the containers built on top of it, it never hashes or
/// compares values on its own: every lookup takes the precomputed hash and an
/// equality predicate, and every operation that may move values to a new
/// array takes a `hasher` closure that recomputes the hash of a stored value.
/// The hash and the predicate must agree with the hasher; the table is free
/// to lose track of values otherwise (but it stays memory safe).
///
/// Empty and deleted slots are recognised through the value type's
/// [`HashTraits`], so the sentinel values of `V` can never be stored.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use siphasher::sip::SipHasher;
/// # use tomb_hash::hash_table::Entry;
/// # use tomb_hash::hash_table::HashTable;
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// #
/// // (id, score) pairs, keyed by id
/// let mut table: HashTable<(u64, u32)> = HashTable::new();
/// let hasher = |entry: &(u64, u32)| hash_id(entry.0);
///
/// match table.entry(hash_id(123), |entry| entry.0 == 123) {
///     Entry::Vacant(entry) => {
///         entry.insert((123, 7), hasher);
///     }
///     Entry::Occupied(_) => unreachable!(),
/// }
///
/// assert_eq!(table.find(hash_id(123), |entry| entry.0 == 123), Some(&(123, 7)));
/// assert_eq!(table.capacity(), 64);
/// ```
pub struct HashTable<V: HashTraits> {
    table: NonNull<V>,
    table_size: usize,
    table_size_mask: usize,
    key_count: usize,
    deleted_count: usize,

    #[cfg(debug_assertions)]
    generation: u64,

    stats: StatsRecorder,

    _phantom: PhantomData<V>,
}

// SAFETY: the table owns its values exclusively, like a `Vec<V>`.
unsafe impl<V: HashTraits + Send> Send for HashTable<V> {}

// SAFETY: shared access only hands out `&V`. Statistics counters are plain
// cells, so tables that record them are not shared across threads.
#[cfg(not(feature = "stats"))]
unsafe impl<V: HashTraits + Sync> Sync for HashTable<V> {}

impl<V> HashTable<V>
where
    V: HashTraits,
{
    /// Creates an empty table. No memory is allocated until the first
    /// insertion.
    pub const fn new() -> Self {
        Self {
            table: NonNull::dangling(),
            table_size: 0,
            table_size_mask: 0,
            key_count: 0,
            deleted_count: 0,
            #[cfg(debug_assertions)]
            generation: 0,
            stats: StatsRecorder::new(),
            _phantom: PhantomData,
        }
    }

    /// Creates a table that can hold `capacity` values without rehashing.
    ///
    /// The slot count is the smallest power of two, at least
    /// [`V::MINIMUM_TABLE_SIZE`](HashTraits::MINIMUM_TABLE_SIZE), that keeps
    /// `capacity` values below the expand threshold.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tomb_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 256);
    ///
    /// let table: HashTable<u64> = HashTable::with_capacity(0);
    /// assert_eq!(table.capacity(), 0);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity != 0 {
            let size = Self::table_size_for(capacity).unwrap_or_else(|| capacity_overflow());
            table.install_empty(Self::allocate_table(size), size);
        }
        table
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.key_count
    }

    /// Returns `true` if the table holds no live values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.key_count == 0
    }

    /// Number of allocated slots, zero or a power of two.
    ///
    /// At most half of the slots are ever live or deleted at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table_size
    }

    /// Number of tombstones currently in the table.
    #[inline]
    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    #[inline(always)]
    fn should_expand(&self) -> bool {
        (self.key_count + self.deleted_count) * MAX_LOAD >= self.table_size
    }

    #[inline(always)]
    fn must_rehash_in_place(&self) -> bool {
        self.key_count * MIN_LOAD < self.table_size * 2
    }

    #[inline(always)]
    fn should_shrink(&self) -> bool {
        self.key_count * MIN_LOAD < self.table_size && self.table_size > V::MINIMUM_TABLE_SIZE
    }

    /// Smallest valid table size holding `len` live values below the expand
    /// threshold, or `None` on overflow.
    fn table_size_for(len: usize) -> Option<usize> {
        let needed = len.checked_mul(MAX_LOAD)?.checked_add(1)?;
        Some(needed.checked_next_power_of_two()?.max(V::MINIMUM_TABLE_SIZE))
    }

    /// Whether `len` live values fit next to the current tombstones without
    /// reaching the expand threshold.
    fn fits(&self, len: usize) -> bool {
        len.checked_add(self.deleted_count)
            .and_then(|slots| slots.checked_mul(MAX_LOAD))
            .is_some_and(|slots| slots < self.table_size)
    }

    #[inline(always)]
    fn invalidate_buckets(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    /// # Safety
    ///
    /// `index` must be less than `table_size`.
    #[inline(always)]
    unsafe fn slot(&self, index: usize) -> &V {
        debug_assert!(index < self.table_size);
        // SAFETY: the caller keeps `index` in bounds and every slot holds a
        // valid value.
        unsafe { self.table.add(index).as_ref() }
    }

    /// # Safety
    ///
    /// `index` must be less than `table_size`.
    #[inline(always)]
    unsafe fn slot_mut(&mut self, index: usize) -> &mut V {
        debug_assert!(index < self.table_size);
        // SAFETY: as for `slot`, and `&mut self` guarantees exclusivity.
        unsafe { self.table.add(index).as_mut() }
    }

    #[inline(always)]
    fn is_live(value: &V) -> bool {
        !V::is_empty_value(value) && !V::is_deleted_value(value)
    }

    fn try_allocate_table(size: usize) -> Result<NonNull<V>, TryReserveError> {
        debug_assert!(size.is_power_of_two() && size >= V::MINIMUM_TABLE_SIZE);
        let layout = Layout::array::<V>(size).map_err(|_| TryReserveError::CapacityOverflow)?;

        let table = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: the layout has a non-zero size.
            let raw = unsafe {
                if V::EMPTY_VALUE_IS_ZERO {
                    alloc_zeroed(layout)
                } else {
                    alloc(layout)
                }
            };
            NonNull::new(raw.cast::<V>()).ok_or(TryReserveError::AllocError { layout })?
        };

        if !V::EMPTY_VALUE_IS_ZERO {
            for index in 0..size {
                // SAFETY: `index` is within the allocation.
                unsafe { table.add(index).write(V::empty_value()) };
            }
        }

        Ok(table)
    }

    fn allocate_table(size: usize) -> NonNull<V> {
        match Self::try_allocate_table(size) {
            Ok(table) => table,
            Err(TryReserveError::CapacityOverflow) => capacity_overflow(),
            Err(TryReserveError::AllocError { layout }) => handle_alloc_error(layout),
        }
    }

    /// Drops every non-deleted slot and releases the array.
    ///
    /// # Safety
    ///
    /// `table` must come from `allocate_table(size)` (or be dangling with
    /// `size == 0`) and no slot other than tombstones may have been moved out.
    unsafe fn free_table(table: NonNull<V>, size: usize) {
        // SAFETY: slots `0..size` are initialized; tombstones are skipped and
        // never dropped.
        unsafe {
            if V::NEEDS_DESTRUCTION {
                for index in 0..size {
                    let slot = table.add(index);
                    if !V::is_deleted_value(slot.as_ref()) {
                        slot.drop_in_place();
                    }
                }
            }

            if let Ok(layout) = Layout::array::<V>(size)
                && layout.size() != 0
            {
                dealloc(table.as_ptr().cast(), layout);
            }
        }
    }

    fn install_empty(&mut self, table: NonNull<V>, size: usize) {
        debug_assert_eq!(self.table_size, 0);
        self.table = table;
        self.table_size = size;
        self.table_size_mask = size - 1;
    }

    #[cfg(debug_assertions)]
    fn check_key(eq: &impl Fn(&V) -> bool) {
        if !V::SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED {
            return;
        }

        let empty = V::empty_value();
        debug_assert!(!eq(&empty), "key compares equal to the empty sentinel");

        let mut deleted = MaybeUninit::uninit();
        V::construct_deleted_value(&mut deleted);
        // SAFETY: `construct_deleted_value` initializes the slot. The marker
        // is never dropped, like every other tombstone.
        let deleted = unsafe { deleted.assume_init_ref() };
        debug_assert!(!eq(deleted), "key compares equal to the deleted sentinel");
    }

    #[inline]
    fn lookup(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        #[cfg(debug_assertions)]
        Self::check_key(&eq);

        if self.table_size == 0 {
            return None;
        }

        self.stats.record_access();
        let mut index = hash as usize & self.table_size_mask;
        let mut step = 0;
        let mut probe_count = 0;

        loop {
            // SAFETY: `index` is masked into bounds.
            let entry = unsafe { self.slot(index) };

            if V::SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED {
                if eq(entry) {
                    return Some(index);
                }
                if V::is_empty_value(entry) {
                    return None;
                }
            } else {
                if V::is_empty_value(entry) {
                    return None;
                }
                if !V::is_deleted_value(entry) && eq(entry) {
                    return Some(index);
                }
            }

            probe_count += 1;
            self.stats.record_collision(probe_count);
            if step == 0 {
                step = 1 | double_hash(hash);
            }
            index = index.wrapping_add(step) & self.table_size_mask;
        }
    }

    /// Returns the slot holding a match, or the slot an insertion should use:
    /// the first tombstone on the probe path if there was one, else the empty
    /// slot that ended the walk.
    #[inline]
    fn lookup_for_writing(&self, hash: u64, eq: impl Fn(&V) -> bool) -> (usize, bool) {
        debug_assert!(self.table_size != 0);

        self.stats.record_access();
        let mut index = hash as usize & self.table_size_mask;
        let mut step = 0;
        let mut probe_count = 0;
        let mut deleted_entry = None;

        loop {
            // SAFETY: `index` is masked into bounds.
            let entry = unsafe { self.slot(index) };

            if V::is_empty_value(entry) {
                return (deleted_entry.unwrap_or(index), false);
            }

            if V::SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED {
                if eq(entry) {
                    return (index, true);
                }
                if deleted_entry.is_none() && V::is_deleted_value(entry) {
                    deleted_entry = Some(index);
                }
            } else if V::is_deleted_value(entry) {
                if deleted_entry.is_none() {
                    deleted_entry = Some(index);
                }
            } else if eq(entry) {
                return (index, true);
            }

            probe_count += 1;
            self.stats.record_collision(probe_count);
            if step == 0 {
                step = 1 | double_hash(hash);
            }
            index = index.wrapping_add(step) & self.table_size_mask;
        }
    }

    /// Moves every live value into `new_table` and installs it, freeing the
    /// old array. Returns the new index of the value at `pivot`.
    ///
    /// Each moved slot in the old array is re-marked as deleted right away,
    /// so a panicking `hasher` leaves the table valid; values already moved
    /// are leaked in that case.
    fn rehash_into(
        &mut self,
        new_table: NonNull<V>,
        new_table_size: usize,
        hasher: impl Fn(&V) -> u64,
        pivot: Option<usize>,
    ) -> Option<usize> {
        let old_table = self.table;
        let old_table_size = self.table_size;
        let new_mask = new_table_size - 1;
        let purged = self.deleted_count;
        let mut moved = 0;
        let mut new_pivot = None;

        self.invalidate_buckets();
        self.stats.record_rehash();
        log::trace!(
            "rehash: {old_table_size} -> {new_table_size} slots, {} live, {purged} tombstones purged",
            self.key_count
        );

        for index in 0..old_table_size {
            // SAFETY: `index` is in bounds of the old array.
            let slot = unsafe { old_table.add(index) };
            let entry = unsafe { slot.as_ref() };
            if !Self::is_live(entry) {
                continue;
            }

            let hash = hasher(entry);
            self.stats.record_reinsert();

            // SAFETY: the new array has more slots than live values, so an
            // empty slot exists. The old slot is overwritten with a tombstone
            // immediately after its value is moved out.
            let target_index = unsafe {
                let target_index = probe_for_reinsert(new_table, new_mask, hash);
                let target = new_table.add(target_index);
                if V::NEEDS_DESTRUCTION {
                    target.drop_in_place();
                }
                target.write(slot.read());
                V::construct_deleted_value(slot.cast::<MaybeUninit<V>>().as_mut());
                target_index
            };

            self.key_count -= 1;
            self.deleted_count += 1;
            moved += 1;

            if pivot == Some(index) {
                new_pivot = Some(target_index);
            }
        }

        self.table = new_table;
        self.table_size = new_table_size;
        self.table_size_mask = new_mask;
        self.key_count = moved;
        self.deleted_count = 0;

        // SAFETY: every live value was moved out and replaced by a tombstone.
        unsafe { Self::free_table(old_table, old_table_size) };

        new_pivot
    }

    fn rehash_to(
        &mut self,
        new_table_size: usize,
        hasher: impl Fn(&V) -> u64,
        pivot: Option<usize>,
    ) -> Option<usize> {
        let new_table = Self::allocate_table(new_table_size);
        self.rehash_into(new_table, new_table_size, hasher, pivot)
    }

    fn expand_tracking(&mut self, hasher: impl Fn(&V) -> u64, pivot: Option<usize>) -> Option<usize> {
        let new_size = if self.table_size == 0 {
            V::MINIMUM_TABLE_SIZE
        } else if self.must_rehash_in_place() {
            self.table_size
        } else {
            self.table_size
                .checked_mul(2)
                .unwrap_or_else(|| capacity_overflow())
        };
        self.rehash_to(new_size, hasher, pivot)
    }

    /// Grows the table, or rehashes it in place when most of the occupied
    /// slots are tombstones.
    ///
    /// An unallocated table gets [`V::MINIMUM_TABLE_SIZE`](HashTraits::MINIMUM_TABLE_SIZE)
    /// slots. Insertions call this automatically.
    pub fn expand(&mut self, hasher: impl Fn(&V) -> u64) {
        self.expand_tracking(hasher, None);
    }

    /// Moves every live value into a fresh array of `new_table_size` slots,
    /// dropping all tombstones.
    ///
    /// # Panics
    ///
    /// Panics if `new_table_size` is not a power of two, is below
    /// [`V::MINIMUM_TABLE_SIZE`](HashTraits::MINIMUM_TABLE_SIZE), or is too
    /// small to keep the current values below the expand threshold.
    pub fn rehash(&mut self, new_table_size: usize, hasher: impl Fn(&V) -> u64) {
        assert!(
            new_table_size.is_power_of_two() && new_table_size >= V::MINIMUM_TABLE_SIZE,
            "table size {new_table_size} must be a power of two of at least {}",
            V::MINIMUM_TABLE_SIZE
        );
        assert!(
            self.key_count * MAX_LOAD < new_table_size,
            "table size {new_table_size} is too small for {} values",
            self.key_count
        );
        self.rehash_to(new_table_size, hasher, None);
    }

    fn shrink_if_needed(&mut self, hasher: impl Fn(&V) -> u64) {
        if !self.should_shrink() {
            return;
        }

        self.rehash_to(self.table_size / 2, hasher, None);
    }

    /// Reserves room for at least `additional` more values without
    /// rehashing.
    ///
    /// # Panics
    ///
    /// Panics if the new slot count overflows `usize`. Aborts through
    /// [`handle_alloc_error`] if the allocation fails.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&V) -> u64) {
        let needed = self
            .key_count
            .checked_add(additional)
            .unwrap_or_else(|| capacity_overflow());
        if self.fits(needed) {
            return;
        }

        let new_size = Self::table_size_for(needed).unwrap_or_else(|| capacity_overflow());
        self.rehash_to(new_size.max(self.table_size), hasher, None);
    }

    /// Fallible counterpart of [`reserve`](Self::reserve).
    ///
    /// # Errors
    ///
    /// Returns [`TryReserveError`] if the slot count overflows or the
    /// allocator fails. The table is unchanged in that case.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<(), TryReserveError> {
        let needed = self
            .key_count
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        if self.fits(needed) {
            return Ok(());
        }

        let new_size = Self::table_size_for(needed)
            .ok_or(TryReserveError::CapacityOverflow)?
            .max(self.table_size);
        let new_table = Self::try_allocate_table(new_size).inspect_err(|err| {
            log::debug!("try_reserve({additional}) failed: {err}");
        })?;
        self.rehash_into(new_table, new_size, hasher, None);
        Ok(())
    }

    /// Shrinks the array to the smallest size that holds the live values and
    /// purges all tombstones. An empty table releases its array.
    pub fn shrink_to_fit(&mut self, hasher: impl Fn(&V) -> u64) {
        if self.key_count == 0 {
            self.clear();
            return;
        }

        let Some(new_size) = Self::table_size_for(self.key_count) else {
            return;
        };
        if new_size < self.table_size || self.deleted_count != 0 {
            self.rehash_to(new_size, hasher, None);
        }
    }

    /// Removes every value and releases the array.
    pub fn clear(&mut self) {
        self.invalidate_buckets();
        let table = core::mem::replace(&mut self.table, NonNull::dangling());
        let size = core::mem::take(&mut self.table_size);
        self.table_size_mask = 0;
        self.key_count = 0;
        self.deleted_count = 0;

        // SAFETY: the array came from `allocate_table(size)` and only its
        // tombstones hold moved-out values.
        unsafe { Self::free_table(table, size) };
    }

    /// Finds the value matching `eq` on `hash`'s probe path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use std::hash::RandomState;
    /// # use tomb_hash::hash_table::HashTable;
    /// #
    /// let state = RandomState::new();
    /// let hasher = |value: &u32| state.hash_one(value);
    ///
    /// let mut table = HashTable::new();
    /// table.add(state.hash_one(7u32), |v| *v == 7, || 7u32, hasher);
    ///
    /// assert_eq!(table.find(state.hash_one(7u32), |v| *v == 7), Some(&7));
    /// assert_eq!(table.find(state.hash_one(8u32), |v| *v == 8), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.lookup(hash, eq)?;
        // SAFETY: `lookup` only returns in-bounds indices.
        Some(unsafe { self.slot(index) })
    }

    /// Mutable counterpart of [`find`](Self::find).
    ///
    /// Changing the value in a way that changes its hash or equality leaves
    /// it unreachable.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.lookup(hash, eq)?;
        // SAFETY: `lookup` only returns in-bounds indices.
        Some(unsafe { self.slot_mut(index) })
    }

    /// Returns `true` if a value matching `eq` is present.
    #[inline]
    pub fn contains(&self, hash: u64, eq: impl Fn(&V) -> bool) -> bool {
        self.lookup(hash, eq).is_some()
    }

    /// Returns a handle to the slot holding the value matching `eq`.
    pub fn find_bucket(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<Bucket> {
        self.lookup(hash, eq).map(|index| self.bucket_at(index))
    }

    fn bucket_at(&self, index: usize) -> Bucket {
        Bucket {
            index,
            #[cfg(debug_assertions)]
            generation: self.generation,
        }
    }

    #[track_caller]
    fn check_bucket(&self, bucket: Bucket) -> usize {
        #[cfg(debug_assertions)]
        assert_eq!(
            bucket.generation, self.generation,
            "stale bucket: the table was mutated after the bucket was created"
        );
        assert!(
            // SAFETY: the index is checked before the slot is read.
            bucket.index < self.table_size && Self::is_live(unsafe { self.slot(bucket.index) }),
            "bucket {} does not refer to a live slot",
            bucket.index
        );
        bucket.index
    }

    /// Returns the value at `bucket`.
    ///
    /// # Panics
    ///
    /// Panics if the bucket no longer refers to a live slot, and in debug
    /// builds if the table was mutated after the bucket was created.
    #[track_caller]
    pub fn get(&self, bucket: Bucket) -> &V {
        let index = self.check_bucket(bucket);
        // SAFETY: `check_bucket` validated the index.
        unsafe { self.slot(index) }
    }

    /// Mutable counterpart of [`get`](Self::get).
    #[track_caller]
    pub fn get_mut(&mut self, bucket: Bucket) -> &mut V {
        let index = self.check_bucket(bucket);
        // SAFETY: `check_bucket` validated the index.
        unsafe { self.slot_mut(index) }
    }

    /// Gets the entry for the value matching `eq`, for in-place insertion or
    /// modification.
    ///
    /// An unallocated table allocates its minimum size here. A vacant entry
    /// points at the first tombstone on the probe path when there is one, so
    /// that removed slots are reused before fresh ones.
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V> {
        #[cfg(debug_assertions)]
        Self::check_key(&eq);

        self.invalidate_buckets();
        if self.table_size == 0 {
            self.install_empty(Self::allocate_table(V::MINIMUM_TABLE_SIZE), V::MINIMUM_TABLE_SIZE);
        }

        let (index, found) = self.lookup_for_writing(hash, eq);
        if found {
            Entry::Occupied(OccupiedEntry { table: self, index })
        } else {
            Entry::Vacant(VacantEntry { table: self, index })
        }
    }

    /// Inserts the value produced by `make` unless a value matching `eq` is
    /// already present.
    ///
    /// Returns the stored value and whether it was newly inserted. `make` is
    /// only called on the not-found path.
    pub fn add(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        make: impl FnOnce() -> V,
        hasher: impl Fn(&V) -> u64,
    ) -> (&mut V, bool) {
        match self.entry(hash, eq) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(make(), hasher), true),
        }
    }

    /// Moves the value at `index` out and leaves a tombstone, without
    /// shrinking.
    ///
    /// # Safety
    ///
    /// `index` must refer to a live slot.
    unsafe fn take_slot(&mut self, index: usize) -> V {
        self.invalidate_buckets();
        self.stats.record_remove();
        // SAFETY: the slot is live; its value is moved out and replaced by
        // the deleted marker before anything else observes it.
        let value = unsafe {
            let slot = self.table.add(index);
            let value = slot.read();
            V::construct_deleted_value(slot.cast::<MaybeUninit<V>>().as_mut());
            value
        };
        self.key_count -= 1;
        self.deleted_count += 1;
        value
    }

    fn remove_at(&mut self, index: usize, hasher: impl Fn(&V) -> u64) -> V {
        // SAFETY: callers pass indices of live slots.
        let value = unsafe { self.take_slot(index) };
        self.shrink_if_needed(hasher);
        value
    }

    /// Removes and returns the value matching `eq`.
    ///
    /// The slot becomes a tombstone; the table shrinks when few enough live
    /// values remain.
    pub fn remove(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        hasher: impl Fn(&V) -> u64,
    ) -> Option<V> {
        let index = self.lookup(hash, eq)?;
        Some(self.remove_at(index, hasher))
    }

    /// Removes and returns the value at `bucket`.
    ///
    /// # Panics
    ///
    /// As for [`get`](Self::get).
    #[track_caller]
    pub fn remove_bucket(&mut self, bucket: Bucket, hasher: impl Fn(&V) -> u64) -> V {
        let index = self.check_bucket(bucket);
        self.remove_at(index, hasher)
    }

    /// Keeps only the values for which `f` returns `true`, then shrinks if
    /// the table became sparse.
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool, hasher: impl Fn(&V) -> u64) {
        self.invalidate_buckets();
        for index in 0..self.table_size {
            // SAFETY: `index` is in bounds.
            let entry = unsafe { self.slot_mut(index) };
            if Self::is_live(entry) && !f(entry) {
                // SAFETY: the slot was just checked to be live.
                drop(unsafe { self.take_slot(index) });
            }
        }
        self.shrink_if_needed(hasher);
    }

    /// Iterates over the live values in slot order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            index: 0,
            remaining: self.key_count,
        }
    }

    /// Iterates mutably over the live values in slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            table: self.table,
            table_size: self.table_size,
            index: 0,
            remaining: self.key_count,
            _marker: PhantomData,
        }
    }

    /// Removes every value, yielding them in slot order. The array is
    /// released when the iterator is dropped, as with [`clear`](Self::clear).
    pub fn drain(&mut self) -> Drain<'_, V> {
        self.invalidate_buckets();
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Verifies the table's internal invariants.
    ///
    /// Recounts live and deleted slots, re-finds every live value through
    /// its hash, and checks the size, mask and load bounds.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first violated invariant.
    pub fn check_consistency(&self, hasher: impl Fn(&V) -> u64) {
        if self.table_size == 0 {
            assert_eq!(self.key_count, 0, "unallocated table reports live values");
            assert_eq!(self.deleted_count, 0, "unallocated table reports tombstones");
            return;
        }

        assert!(
            self.table_size.is_power_of_two(),
            "table size {} is not a power of two",
            self.table_size
        );
        assert!(
            self.table_size >= V::MINIMUM_TABLE_SIZE,
            "table size {} is below the minimum {}",
            self.table_size,
            V::MINIMUM_TABLE_SIZE
        );
        assert_eq!(self.table_size_mask, self.table_size - 1, "mask does not match size");

        let mut live = 0;
        let mut deleted = 0;
        for index in 0..self.table_size {
            // SAFETY: `index` is in bounds.
            let entry = unsafe { self.slot(index) };
            if V::is_deleted_value(entry) {
                deleted += 1;
            } else if !V::is_empty_value(entry) {
                live += 1;
                let found = self.lookup(hasher(entry), |candidate| core::ptr::eq(candidate, entry));
                assert_eq!(found, Some(index), "value in slot {index} is unreachable from its hash");
            }
        }

        assert_eq!(live, self.key_count, "live slot count mismatch");
        assert_eq!(deleted, self.deleted_count, "tombstone count mismatch");
        assert!(
            !self.should_expand(),
            "{} live and {} deleted slots exceed the load bound of {} slots",
            self.key_count,
            self.deleted_count,
            self.table_size
        );
    }

    /// Returns a snapshot of this table's probe counters.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> TableStats {
        self.stats.snapshot()
    }

    /// Computes the current probe length of every live value.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self, hasher: impl Fn(&V) -> u64) -> ProbeHistogram {
        let mut histogram = ProbeHistogram::default();
        for target in 0..self.table_size {
            // SAFETY: `target` is in bounds.
            let entry = unsafe { self.slot(target) };
            if !Self::is_live(entry) {
                continue;
            }

            let hash = hasher(entry);
            let mut index = hash as usize & self.table_size_mask;
            let step = 1 | double_hash(hash);
            let mut probe_length = 0;
            while index != target {
                index = index.wrapping_add(step) & self.table_size_mask;
                probe_length += 1;
            }
            histogram.record(probe_length);
        }
        histogram
    }
}

impl<V> Default for HashTable<V>
where
    V: HashTraits,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for HashTable<V>
where
    V: HashTraits,
{
    fn drop(&mut self) {
        // SAFETY: the array came from `allocate_table` and only tombstones
        // hold moved-out values.
        unsafe { Self::free_table(self.table, self.table_size) }
    }
}

impl<V> Clone for HashTable<V>
where
    V: HashTraits + Clone,
{
    /// Copies the table slot by slot: live values are cloned into the same
    /// positions and tombstones are re-marked, so no rehash is needed.
    fn clone(&self) -> Self {
        let mut new_table = Self::new();
        if self.table_size == 0 {
            return new_table;
        }
        new_table.install_empty(Self::allocate_table(self.table_size), self.table_size);

        for index in 0..self.table_size {
            // SAFETY: both arrays have `table_size` initialized slots.
            // `new_table` counts each slot as it is filled, so a panicking
            // `clone` drops it in a valid state.
            unsafe {
                let entry = self.slot(index);
                let target = new_table.table.add(index);
                if V::is_deleted_value(entry) {
                    if V::NEEDS_DESTRUCTION {
                        target.drop_in_place();
                    }
                    V::construct_deleted_value(target.cast::<MaybeUninit<V>>().as_mut());
                    new_table.deleted_count += 1;
                } else if !V::is_empty_value(entry) {
                    let value = entry.clone();
                    if V::NEEDS_DESTRUCTION {
                        target.drop_in_place();
                    }
                    target.write(value);
                    new_table.key_count += 1;
                }
            }
        }

        debug_assert_eq!(new_table.key_count, self.key_count);
        debug_assert_eq!(new_table.deleted_count, self.deleted_count);
        new_table
    }
}

impl<V> Debug for HashTable<V>
where
    V: HashTraits + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Entries<'a, V: HashTraits>(&'a HashTable<V>);

        impl<V: HashTraits + Debug> Debug for Entries<'_, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_list().entries(self.0.iter()).finish()
            }
        }

        f.debug_struct("HashTable")
            .field("len", &self.key_count)
            .field("deleted", &self.deleted_count)
            .field("capacity", &self.table_size)
            .field("entries", &Entries(self))
            .finish()
    }
}

impl<V> IntoIterator for HashTable<V>
where
    V: HashTraits,
{
    type Item = V;
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        let this = ManuallyDrop::new(self);
        IntoIter {
            table: this.table,
            table_size: this.table_size,
            index: 0,
            remaining: this.key_count,
            _marker: PhantomData,
        }
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V>
where
    V: HashTraits,
{
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A view into a single slot of a [`HashTable`], which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
/// Methods that may insert take the table's `hasher`, because an insertion
/// can trigger a rehash.
///
/// [`entry`]: HashTable::entry
///
/// # Examples
///
/// ```rust
/// # use core::hash::BuildHasher;
/// # use std::hash::RandomState;
/// # use tomb_hash::hash_table::Entry;
/// # use tomb_hash::hash_table::HashTable;
/// #
/// let state = RandomState::new();
/// let hasher = |entry: &(u32, u32)| state.hash_one(entry.0);
/// let mut table = HashTable::new();
///
/// match table.entry(state.hash_one(1u32), |entry: &(u32, u32)| entry.0 == 1) {
///     Entry::Vacant(entry) => {
///         entry.insert((1, 10), hasher);
///     }
///     Entry::Occupied(entry) => {
///         println!("already present: {:?}", entry.get());
///     }
/// }
/// assert_eq!(table.len(), 1);
/// ```
pub enum Entry<'a, V: HashTraits> {
    /// The value is not present; the entry points at the slot an insertion
    /// will use.
    Vacant(VacantEntry<'a, V>),
    /// The value is present.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V>
where
    V: HashTraits,
{
    /// Inserts `default` if the entry is vacant and returns the stored
    /// value.
    pub fn or_insert(self, default: V, hasher: impl Fn(&V) -> u64) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default, hasher),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns
    /// the stored value. The closure is not called for occupied entries.
    pub fn or_insert_with(
        self,
        default: impl FnOnce() -> V,
        hasher: impl Fn(&V) -> u64,
    ) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default(), hasher),
        }
    }

    /// Applies `f` to an occupied entry's value. Vacant entries return
    /// `None` without inserting.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns the stored
    /// value.
    pub fn or_default(self, hasher: impl Fn(&V) -> u64) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default, hasher)
    }
}

/// A view into a vacant slot of a [`HashTable`]; see [`Entry`].
pub struct VacantEntry<'a, V: HashTraits> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> VacantEntry<'a, V>
where
    V: HashTraits,
{
    /// Inserts `value` and returns a reference to it in its final slot.
    ///
    /// Reusing a tombstone lowers the deleted count. If the insertion brings
    /// the table to its load bound the table is expanded, and the returned
    /// reference follows the value to its new slot.
    pub fn insert(self, value: V, hasher: impl Fn(&V) -> u64) -> &'a mut V {
        debug_assert!(
            HashTable::<V>::is_live(&value),
            "inserted value is an empty or deleted sentinel"
        );

        let table = self.table;
        // SAFETY: `index` was produced by `lookup_for_writing` on the current
        // array and refers to an empty slot or a tombstone.
        unsafe {
            let slot = table.table.add(self.index);
            if V::is_deleted_value(slot.as_ref()) {
                table.deleted_count -= 1;
            } else if V::NEEDS_DESTRUCTION {
                slot.drop_in_place();
            }
            slot.write(value);
        }
        table.key_count += 1;

        let mut index = self.index;
        if table.should_expand() {
            index = match table.expand_tracking(hasher, Some(index)) {
                Some(index) => index,
                None => unreachable!("inserted value was not moved by the rehash"),
            };
        }

        // SAFETY: `index` refers to the live slot holding the new value.
        unsafe { table.slot_mut(index) }
    }
}

/// A view into an occupied slot of a [`HashTable`]; see [`Entry`].
pub struct OccupiedEntry<'a, V: HashTraits> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V>
where
    V: HashTraits,
{
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: the index was found live by `lookup_for_writing`.
        unsafe { self.table.slot(self.index) }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: as for `get`.
        unsafe { self.table.slot_mut(self.index) }
    }

    /// Converts the entry into a mutable reference bound to the table's
    /// lifetime.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: as for `get`.
        unsafe { self.table.slot_mut(self.index) }
    }

    /// Returns a detached handle to this slot.
    pub fn bucket(&self) -> Bucket {
        self.table.bucket_at(self.index)
    }

    /// Removes the value, leaving a tombstone, and returns it.
    pub fn remove(self, hasher: impl Fn(&V) -> u64) -> V {
        self.table.remove_at(self.index, hasher)
    }
}

/// An iterator over the live values of a [`HashTable`], in slot order.
///
/// This struct is created by the [`iter`] method on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V: HashTraits> {
    table: &'a HashTable<V>,
    index: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V>
where
    V: HashTraits,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining != 0 && self.index < self.table.table_size {
            // SAFETY: `index` was just checked against `table_size`.
            let entry = unsafe { self.table.slot(self.index) };
            self.index += 1;
            if HashTable::<V>::is_live(entry) {
                self.remaining -= 1;
                return Some(entry);
            }
        }
        // A sentinel written through a mutable reference leaves fewer live
        // slots than counted.
        self.remaining = 0;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: HashTraits> ExactSizeIterator for Iter<'_, V> {}

impl<V: HashTraits> core::iter::FusedIterator for Iter<'_, V> {}

impl<V: HashTraits> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

/// A mutable iterator over the live values of a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V: HashTraits> {
    table: NonNull<V>,
    table_size: usize,
    index: usize,
    remaining: usize,
    _marker: PhantomData<&'a mut V>,
}

// SAFETY: `IterMut` behaves like `&mut [V]`.
unsafe impl<V: HashTraits + Send> Send for IterMut<'_, V> {}

impl<'a, V> Iterator for IterMut<'a, V>
where
    V: HashTraits,
{
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining != 0 && self.index < self.table_size {
            // SAFETY: in bounds as for `Iter`; each live slot is yielded at
            // most once, so the mutable references never alias.
            let entry = unsafe { self.table.add(self.index).as_mut() };
            self.index += 1;
            if HashTable::<V>::is_live(entry) {
                self.remaining -= 1;
                return Some(entry);
            }
        }
        self.remaining = 0;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: HashTraits> ExactSizeIterator for IterMut<'_, V> {}

/// An owning iterator over the values of a [`HashTable`].
pub struct IntoIter<V: HashTraits> {
    table: NonNull<V>,
    table_size: usize,
    index: usize,
    remaining: usize,
    _marker: PhantomData<V>,
}

// SAFETY: the iterator owns the remaining values.
unsafe impl<V: HashTraits + Send> Send for IntoIter<V> {}

impl<V> Iterator for IntoIter<V>
where
    V: HashTraits,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining != 0 && self.index < self.table_size {
            // SAFETY: in bounds as for `Iter`. A yielded slot is re-marked as
            // deleted so that `drop` skips it.
            unsafe {
                let slot = self.table.add(self.index);
                self.index += 1;
                if HashTable::<V>::is_live(slot.as_ref()) {
                    self.remaining -= 1;
                    let value = slot.read();
                    V::construct_deleted_value(slot.cast::<MaybeUninit<V>>().as_mut());
                    return Some(value);
                }
            }
        }
        self.remaining = 0;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: HashTraits> ExactSizeIterator for IntoIter<V> {}

impl<V> Drop for IntoIter<V>
where
    V: HashTraits,
{
    fn drop(&mut self) {
        // SAFETY: yielded slots hold tombstones; everything else is intact.
        unsafe { HashTable::<V>::free_table(self.table, self.table_size) }
    }
}

/// A draining iterator over the values of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`]. Values
/// that are not consumed are dropped with the iterator, and the table's array
/// is released.
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V>
where
    V: HashTraits,
{
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<V> Iterator for Drain<'_, V>
where
    V: HashTraits,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        while self.table.key_count != 0 && self.index < self.table.table_size {
            let index = self.index;
            self.index += 1;
            // SAFETY: `index` was just checked against `table_size`.
            if HashTable::<V>::is_live(unsafe { self.table.slot(index) }) {
                // SAFETY: the slot was just checked to be live.
                return Some(unsafe { self.table.take_slot(index) });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.key_count, Some(self.table.key_count))
    }
}

impl<V: HashTraits> ExactSizeIterator for Drain<'_, V> {}

impl<V> Drop for Drain<'_, V>
where
    V: HashTraits,
{
    fn drop(&mut self) {
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::hash_traits::EmptyValue;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn hash(&self, key: u64) -> u64 {
            let mut h = SipHasher::new_with_keys(self.k0, self.k1);
            h.write_u64(key);
            h.finish()
        }
    }

    type Item = (u64, i32);

    fn insert(state: &HashState, table: &mut HashTable<Item>, key: u64, value: i32) -> bool {
        let hasher = |item: &Item| state.hash(item.0);
        let (_, inserted) = table.add(state.hash(key), |item| item.0 == key, || (key, value), hasher);
        inserted
    }

    fn remove(state: &HashState, table: &mut HashTable<Item>, key: u64) -> Option<Item> {
        table.remove(state.hash(key), |item| item.0 == key, |item| state.hash(item.0))
    }

    fn find(state: &HashState, table: &HashTable<Item>, key: u64) -> Option<i32> {
        table.find(state.hash(key), |item| item.0 == key).map(|item| item.1)
    }

    /// Mapped value that counts its drops.
    #[derive(Debug)]
    struct Counted(Option<Rc<Cell<usize>>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            if let Some(drops) = &self.0 {
                drops.set(drops.get() + 1);
            }
        }
    }

    impl EmptyValue for Counted {
        fn empty_value() -> Self {
            Counted(None)
        }
    }

    /// Zero-initialised handle that is not safe to compare against
    /// sentinels, with a small minimum size.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Handle(u32);

    impl EmptyValue for Handle {
        const EMPTY_VALUE_IS_ZERO: bool = true;

        fn empty_value() -> Self {
            Handle(0)
        }
    }

    impl HashTraits for Handle {
        const MINIMUM_TABLE_SIZE: usize = 8;

        fn is_empty_value(value: &Self) -> bool {
            value.0 == 0
        }

        fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
            slot.write(Handle(u32::MAX));
        }

        fn is_deleted_value(value: &Self) -> bool {
            value.0 == u32::MAX
        }
    }

    #[test]
    fn double_hash_step_is_odd_after_masking() {
        for hash in [0u64, 1, 0xdead_beef, u64::MAX, 1 << 40] {
            assert_eq!((1 | double_hash(hash)) % 2, 1);
        }
        assert_ne!(double_hash(1), double_hash(2));
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table = HashTable::new();
        assert_eq!(table.capacity(), 0);

        for k in 0..32u64 {
            assert!(insert(&state, &mut table, k, k as i32 * 2));
            assert_eq!(find(&state, &table, k), Some(k as i32 * 2), "{table:#?}");
        }

        assert_eq!(table.len(), 32);
        assert_eq!(table.capacity(), 128);
        assert_eq!(find(&state, &table, 99), None);
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn add_keeps_existing_value() {
        let state = HashState::default();
        let mut table = HashTable::new();

        assert!(insert(&state, &mut table, 7, 1));
        assert!(!insert(&state, &mut table, 7, 2));
        assert_eq!(find(&state, &table, 7), Some(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn first_insertion_allocates_minimum_size() {
        let state = HashState::default();
        let mut table = HashTable::new();
        insert(&state, &mut table, 1, 1);
        assert_eq!(table.capacity(), <Item as HashTraits>::MINIMUM_TABLE_SIZE);

        let mut handles: HashTable<Handle> = HashTable::new();
        handles.add(state.hash(1), |h| h.0 == 1, || Handle(1), |h| state.hash(h.0 as u64));
        assert_eq!(handles.capacity(), 8);
    }

    #[test]
    fn growth_keeps_load_bound() {
        let state = HashState::default();
        let mut table = HashTable::new();

        for k in 0..1000u64 {
            insert(&state, &mut table, k, k as i32);
            assert!(table.capacity().is_power_of_two());
            assert!((table.len() + table.deleted_count()) * 2 < table.capacity());
        }

        assert_eq!(table.capacity(), 2048);
        for k in 0..1000u64 {
            assert_eq!(find(&state, &table, k), Some(k as i32));
        }
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn remove_leaves_tombstone_that_is_reused() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..10u64 {
            insert(&state, &mut table, k, 0);
        }

        assert_eq!(remove(&state, &mut table, 3), Some((3, 0)));
        assert_eq!(table.len(), 9);
        assert_eq!(table.deleted_count(), 1);
        assert_eq!(remove(&state, &mut table, 3), None);
        assert_eq!(table.deleted_count(), 1);

        // The key's own probe path passes through its old slot first.
        assert!(insert(&state, &mut table, 3, 1));
        assert_eq!(table.deleted_count(), 0);
        assert_eq!(find(&state, &table, 3), Some(1));
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn lookups_walk_past_tombstones() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..30u64 {
            insert(&state, &mut table, k, k as i32);
        }
        for k in (0..30u64).step_by(2) {
            remove(&state, &mut table, k);
        }
        for k in 0..30u64 {
            let expected = (k % 2 == 1).then_some(k as i32);
            assert_eq!(find(&state, &table, k), expected);
        }
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn expand_rehashes_in_place_when_mostly_tombstones() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..31u64 {
            insert(&state, &mut table, k, 0);
        }
        for k in 0..20u64 {
            remove(&state, &mut table, k);
        }
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.deleted_count(), 20);

        table.expand(|item| state.hash(item.0));
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.deleted_count(), 0);
        assert_eq!(table.len(), 11);
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn removals_shrink_the_table() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..1000u64 {
            insert(&state, &mut table, k, 0);
        }
        for k in 10..1000u64 {
            remove(&state, &mut table, k);
        }

        assert_eq!(table.len(), 10);
        assert_eq!(table.capacity(), 64);
        for k in 0..10u64 {
            assert_eq!(find(&state, &table, k), Some(0));
        }
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn explicit_rehash() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..20u64 {
            insert(&state, &mut table, k, 0);
        }
        table.rehash(512, |item| state.hash(item.0));
        assert_eq!(table.capacity(), 512);
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    #[should_panic(expected = "too small")]
    fn rehash_rejects_undersized_tables() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..40u64 {
            insert(&state, &mut table, k, 0);
        }
        table.rehash(64, |item| state.hash(item.0));
    }

    #[test]
    fn reserve_and_shrink_to_fit() {
        let state = HashState::default();
        let hasher = |item: &Item| state.hash(item.0);
        let mut table = HashTable::new();

        table.reserve(100, hasher);
        assert_eq!(table.capacity(), 256);
        for k in 0..100u64 {
            insert(&state, &mut table, k, 0);
        }
        assert_eq!(table.capacity(), 256);

        for k in 0..90u64 {
            table.find_mut(state.hash(k), |item| item.0 == k).unwrap().1 = 1;
        }
        table.retain(|item| item.1 == 0, hasher);
        assert_eq!(table.len(), 10);

        table.shrink_to_fit(hasher);
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.deleted_count(), 0);
        table.check_consistency(hasher);

        table.retain(|_| false, hasher);
        table.shrink_to_fit(hasher);
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn try_reserve_reports_overflow() {
        let state = HashState::default();
        let hasher = |item: &Item| state.hash(item.0);
        let mut table = HashTable::new();
        insert(&state, &mut table, 1, 1);

        assert_eq!(
            table.try_reserve(usize::MAX, hasher),
            Err(TryReserveError::CapacityOverflow)
        );
        assert_eq!(table.capacity(), 64);

        assert_eq!(table.try_reserve(1000, hasher), Ok(()));
        assert_eq!(table.capacity(), 2048);
        assert_eq!(find(&state, &table, 1), Some(1));
    }

    #[test]
    fn clear_releases_storage() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..100u64 {
            insert(&state, &mut table, k, 0);
        }
        remove(&state, &mut table, 5);

        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.deleted_count(), 0);
        assert_eq!(table.capacity(), 0);
        assert_eq!(find(&state, &table, 1), None);
        table.check_consistency(|item| state.hash(item.0));

        insert(&state, &mut table, 1, 1);
        assert_eq!(find(&state, &table, 1), Some(1));
    }

    #[test]
    fn live_values_are_dropped_exactly_once() {
        let state = HashState::default();
        let drops = Rc::new(Cell::new(0));
        let hasher = |item: &(u64, Counted)| state.hash(item.0);

        let mut table = HashTable::new();
        for k in 0..200u64 {
            let value = Counted(Some(drops.clone()));
            table.add(state.hash(k), |item| item.0 == k, || (k, value), hasher);
        }
        assert_eq!(drops.get(), 0, "rehashing must move, not drop");

        let removed = table.remove(state.hash(3), |item| item.0 == 3, hasher);
        assert!(removed.is_some());
        drop(removed);
        assert_eq!(drops.get(), 1);

        table.retain(|item| item.0 >= 100, hasher);
        assert_eq!(drops.get(), 100);

        drop(table);
        assert_eq!(drops.get(), 200);
    }

    #[test]
    fn into_iter_drops_unconsumed_values() {
        let state = HashState::default();
        let drops = Rc::new(Cell::new(0));
        let hasher = |item: &(u64, Counted)| state.hash(item.0);

        let mut table = HashTable::new();
        for k in 0..10u64 {
            let value = Counted(Some(drops.clone()));
            table.add(state.hash(k), |item| item.0 == k, || (k, value), hasher);
        }

        let mut iter = table.into_iter();
        assert_eq!(iter.len(), 10);
        let taken: Vec<_> = iter.by_ref().take(4).collect();
        assert_eq!(iter.len(), 6);
        drop(iter);
        assert_eq!(drops.get(), 6);
        drop(taken);
        assert_eq!(drops.get(), 10);
    }

    #[test]
    fn drain_empties_and_releases() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..50u64 {
            insert(&state, &mut table, k, k as i32);
        }

        let mut drained: Vec<_> = table.drain().map(|item| item.0).collect();
        drained.sort_unstable();
        assert_eq!(drained, (0..50).collect::<Vec<_>>());
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 0);

        for k in 0..5u64 {
            insert(&state, &mut table, k, 0);
        }
        let partial = table.drain().next();
        assert!(partial.is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn iter_and_iter_mut_visit_live_values() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..40u64 {
            insert(&state, &mut table, k, 1);
        }
        for k in 0..10u64 {
            remove(&state, &mut table, k);
        }

        assert_eq!(table.iter().len(), 30);
        for item in table.iter_mut() {
            item.1 = item.0 as i32;
        }
        let mut keys: Vec<_> = table.iter().map(|item| item.0).collect();
        keys.sort_unstable();
        assert_eq!(keys, (10..40).collect::<Vec<_>>());
        assert!(table.iter().all(|item| item.1 == item.0 as i32));
    }

    #[test]
    fn clone_copies_slots_and_tombstones() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..20u64 {
            insert(&state, &mut table, k, k as i32);
        }
        remove(&state, &mut table, 4);

        let copy = table.clone();
        assert_eq!(copy.len(), table.len());
        assert_eq!(copy.capacity(), table.capacity());
        assert_eq!(copy.deleted_count(), 1);
        for k in 0..20u64 {
            assert_eq!(find(&state, &copy, k), find(&state, &table, k));
        }
        copy.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn zeroed_handles_use_the_guarded_probe_loop() {
        let state = HashState::default();
        let hasher = |h: &Handle| state.hash(h.0 as u64);
        let mut table = HashTable::with_capacity(3);
        assert_eq!(table.capacity(), 8);

        for id in 1..=100u32 {
            table.add(state.hash(id as u64), |h| h.0 == id, || Handle(id), hasher);
        }
        for id in (1..=100u32).filter(|id| id % 3 == 0) {
            assert!(table.remove(state.hash(id as u64), |h| h.0 == id, hasher).is_some());
        }
        for id in 1..=100u32 {
            let found = table.contains(state.hash(id as u64), |h| h.0 == id);
            assert_eq!(found, id % 3 != 0);
        }
        table.check_consistency(hasher);
    }

    #[test]
    fn entry_api() {
        let state = HashState::default();
        let hasher = |item: &Item| state.hash(item.0);
        let mut table = HashTable::new();

        let value = table
            .entry(state.hash(1), |item: &Item| item.0 == 1)
            .or_insert((1, 10), hasher);
        assert_eq!(*value, (1, 10));

        let value = table
            .entry(state.hash(1), |item: &Item| item.0 == 1)
            .or_insert_with(|| panic!("occupied entries do not build values"), hasher);
        value.1 += 1;

        let modified = table
            .entry(state.hash(1), |item: &Item| item.0 == 1)
            .and_modify(|item| item.1 *= 2);
        assert_eq!(modified.map(|item| item.1), Some(22));
        assert!(table.entry(state.hash(2), |item: &Item| item.0 == 2).and_modify(|_| {}).is_none());

        match table.entry(state.hash(1), |item: &Item| item.0 == 1) {
            Entry::Occupied(entry) => assert_eq!(entry.remove(hasher), (1, 22)),
            Entry::Vacant(_) => unreachable!(),
        }
        assert!(table.is_empty());
        assert_eq!(table.deleted_count(), 1);
    }

    #[test]
    fn buckets_address_live_slots() {
        let state = HashState::default();
        let mut table = HashTable::new();
        insert(&state, &mut table, 9, 90);

        let bucket = table.find_bucket(state.hash(9), |item| item.0 == 9).unwrap();
        assert_eq!(table.get(bucket), &(9, 90));
        table.get_mut(bucket).1 = 91;
        assert_eq!(table.remove_bucket(bucket, |item| state.hash(item.0)), (9, 91));
        assert!(table.find_bucket(state.hash(9), |item| item.0 == 9).is_none());
    }

    #[test]
    #[should_panic(expected = "bucket")]
    fn removed_bucket_is_rejected() {
        let state = HashState::default();
        let mut table = HashTable::new();
        insert(&state, &mut table, 9, 90);
        let bucket = table.find_bucket(state.hash(9), |item| item.0 == 9).unwrap();
        remove(&state, &mut table, 9);
        table.get(bucket);
    }

    #[test]
    fn shrinking_halves_once_per_removal() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(1000);
        assert_eq!(table.capacity(), 2048);
        insert(&state, &mut table, 1, 0);

        let mut capacity = 2048;
        for _ in 0..6 {
            insert(&state, &mut table, 2, 0);
            assert_eq!(table.capacity(), capacity);
            remove(&state, &mut table, 2);
            capacity = (capacity / 2).max(64);
            assert_eq!(table.capacity(), capacity);
        }
        assert_eq!(find(&state, &table, 1), Some(0));
        table.check_consistency(|item| state.hash(item.0));
    }

    #[test]
    fn sentinel_written_through_iter_mut_ends_iteration() {
        let state = HashState::default();
        let hasher = |v: &u64| state.hash(*v);
        let mut table: HashTable<u64> = HashTable::new();
        table.add(state.hash(5), |v| *v == 5, || 5, hasher);

        for value in table.iter_mut() {
            *value = u64::MAX - 1;
        }
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().count(), 0);
        assert_eq!(table.iter_mut().count(), 0);
        assert_eq!(table.clone().into_iter().count(), 0);

        assert_eq!(table.drain().count(), 0);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "stale bucket")]
    fn stale_bucket_panics_in_debug() {
        let state = HashState::default();
        let mut table = HashTable::new();
        insert(&state, &mut table, 9, 90);
        let bucket = table.find_bucket(state.hash(9), |item| item.0 == 9).unwrap();
        insert(&state, &mut table, 10, 100);
        table.get(bucket);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "empty sentinel")]
    fn sentinel_keys_are_rejected_in_debug() {
        let state = HashState::default();
        let mut table = HashTable::new();
        insert(&state, &mut table, u64::MAX, 0);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn stats_count_rehashes_and_removes() {
        let state = HashState::default();
        let mut table = HashTable::new();
        for k in 0..100u64 {
            insert(&state, &mut table, k, 0);
        }
        remove(&state, &mut table, 1);

        let stats = table.stats();
        assert_eq!(stats.rehashes, 2);
        assert_eq!(stats.reinserts, 32 + 64);
        assert_eq!(stats.removes, 1);
        assert!(stats.accesses >= 101);

        let histogram = table.probe_histogram(|item| state.hash(item.0));
        assert_eq!(histogram.total(), 99);
    }
}
