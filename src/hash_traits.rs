//! Per-type descriptions of the sentinel values that mark empty and deleted
//! slots.
//!
//! The table never keeps a side array of slot states. Instead every slot
//! always holds a valid value, and the value's own [`HashTraits`] decide
//! whether it is the empty sentinel, the deleted (tombstone) sentinel or a
//! live element. This means the two sentinel values of a key type are not
//! available as application keys: integers reserve `MAX` and `MAX - 1`,
//! pointers reserve null and the all-ones address.
//!
//! Mapped values only need to know how to produce an empty value, which is
//! described by [`EmptyValue`].

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::mem::MaybeUninit;

/// Default lower bound for the number of slots in an allocated table.
pub const DEFAULT_MINIMUM_TABLE_SIZE: usize = 64;

/// How a type fills a slot that holds no element.
///
/// Every key type and every mapped type stored in a table implements this
/// trait. [`HashMap::get`](crate::HashMap::get) also returns
/// [`empty_value`](EmptyValue::empty_value) for absent keys.
pub trait EmptyValue: Sized {
    /// `true` when [`empty_value`](EmptyValue::empty_value) is represented by
    /// all-zero bytes. Tables of such values are allocated zeroed instead of
    /// writing the empty value into every slot.
    ///
    /// Setting this for a type whose empty value is not all zeroes is
    /// undefined behavior.
    const EMPTY_VALUE_IS_ZERO: bool = false;

    /// Whether slots holding this type must be dropped explicitly.
    const NEEDS_DESTRUCTION: bool = core::mem::needs_drop::<Self>();

    /// The value stored in empty slots.
    fn empty_value() -> Self;
}

/// Sentinel description for types used as keys.
///
/// # Contract
///
/// - [`is_empty_value`](HashTraits::is_empty_value) must hold for
///   [`empty_value`](EmptyValue::empty_value) and
///   [`is_deleted_value`](HashTraits::is_deleted_value) must hold for whatever
///   [`construct_deleted_value`](HashTraits::construct_deleted_value) writes.
///   The two predicates must never both hold for the same value.
/// - Neither sentinel may compare equal to a key the application stores.
///   This is checked with debug assertions when
///   [`SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED`](HashTraits::SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED)
///   is set, and unchecked otherwise.
/// - The deleted value is never dropped, so it must not own resources, and
///   `construct_deleted_value` must not panic.
pub trait HashTraits: EmptyValue {
    /// Smallest number of slots an allocated table will use. Must be a power
    /// of two.
    const MINIMUM_TABLE_SIZE: usize = DEFAULT_MINIMUM_TABLE_SIZE;

    /// Whether key equality may be evaluated against the empty and deleted
    /// sentinels. When set, probing compares first and only then checks for
    /// the empty sentinel, skipping the per-slot deleted check.
    const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = false;

    /// Returns `true` if `value` is the empty sentinel.
    fn is_empty_value(value: &Self) -> bool;

    /// Writes the deleted sentinel into `slot`.
    fn construct_deleted_value(slot: &mut MaybeUninit<Self>);

    /// Returns `true` if `value` is the deleted sentinel.
    fn is_deleted_value(value: &Self) -> bool;
}

macro_rules! impl_integer_traits {
    ($($int:ty),* $(,)?) => {
        $(
            impl EmptyValue for $int {
                const NEEDS_DESTRUCTION: bool = false;

                #[inline(always)]
                fn empty_value() -> Self {
                    <$int>::MAX
                }
            }

            impl HashTraits for $int {
                const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = true;

                #[inline(always)]
                fn is_empty_value(value: &Self) -> bool {
                    *value == <$int>::MAX
                }

                #[inline(always)]
                fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
                    slot.write(<$int>::MAX - 1);
                }

                #[inline(always)]
                fn is_deleted_value(value: &Self) -> bool {
                    *value == <$int>::MAX - 1
                }
            }
        )*
    };
}

impl_integer_traits!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

// The two highest scalar values are permanent noncharacters.
impl EmptyValue for char {
    const NEEDS_DESTRUCTION: bool = false;

    #[inline(always)]
    fn empty_value() -> Self {
        '\u{10FFFF}'
    }
}

impl HashTraits for char {
    const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = true;

    #[inline(always)]
    fn is_empty_value(value: &Self) -> bool {
        *value == '\u{10FFFF}'
    }

    #[inline(always)]
    fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
        slot.write('\u{10FFFE}');
    }

    #[inline(always)]
    fn is_deleted_value(value: &Self) -> bool {
        *value == '\u{10FFFE}'
    }
}

macro_rules! impl_pointer_traits {
    ($($ptr:ty => $null:path, $marker:path);* $(;)?) => {
        $(
            impl<T> EmptyValue for $ptr {
                const EMPTY_VALUE_IS_ZERO: bool = true;
                const NEEDS_DESTRUCTION: bool = false;

                #[inline(always)]
                fn empty_value() -> Self {
                    $null()
                }
            }

            impl<T> HashTraits for $ptr {
                const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = true;

                #[inline(always)]
                fn is_empty_value(value: &Self) -> bool {
                    value.is_null()
                }

                #[inline(always)]
                fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
                    slot.write($marker(usize::MAX));
                }

                #[inline(always)]
                fn is_deleted_value(value: &Self) -> bool {
                    value.addr() == usize::MAX
                }
            }
        )*
    };
}

impl_pointer_traits! {
    *const T => core::ptr::null, core::ptr::without_provenance;
    *mut T => core::ptr::null_mut, core::ptr::without_provenance_mut;
}

/// Pairs are the slot type of maps. Empty and deleted detection looks at the
/// key half only; a deleted pair holds the key's deleted marker next to an
/// empty mapped value.
impl<K, V> EmptyValue for (K, V)
where
    K: EmptyValue,
    V: EmptyValue,
{
    const EMPTY_VALUE_IS_ZERO: bool = K::EMPTY_VALUE_IS_ZERO && V::EMPTY_VALUE_IS_ZERO;
    const NEEDS_DESTRUCTION: bool = K::NEEDS_DESTRUCTION || V::NEEDS_DESTRUCTION;

    #[inline(always)]
    fn empty_value() -> Self {
        (K::empty_value(), V::empty_value())
    }
}

impl<K, V> HashTraits for (K, V)
where
    K: HashTraits,
    V: EmptyValue,
{
    const MINIMUM_TABLE_SIZE: usize = K::MINIMUM_TABLE_SIZE;
    const SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED: bool = K::SAFE_TO_COMPARE_TO_EMPTY_OR_DELETED;

    #[inline(always)]
    fn is_empty_value(value: &Self) -> bool {
        K::is_empty_value(&value.0)
    }

    #[inline(always)]
    fn construct_deleted_value(slot: &mut MaybeUninit<Self>) {
        let mut key = MaybeUninit::<K>::uninit();
        K::construct_deleted_value(&mut key);
        // SAFETY: `construct_deleted_value` initializes the slot it is given.
        slot.write((unsafe { key.assume_init() }, V::empty_value()));
    }

    #[inline(always)]
    fn is_deleted_value(value: &Self) -> bool {
        K::is_deleted_value(&value.0)
    }
}

impl EmptyValue for bool {
    const EMPTY_VALUE_IS_ZERO: bool = true;

    fn empty_value() -> Self {
        false
    }
}

impl EmptyValue for () {
    fn empty_value() -> Self {}
}

impl EmptyValue for &str {
    fn empty_value() -> Self {
        ""
    }
}

impl EmptyValue for f32 {
    const EMPTY_VALUE_IS_ZERO: bool = true;

    fn empty_value() -> Self {
        0.0
    }
}

impl EmptyValue for f64 {
    const EMPTY_VALUE_IS_ZERO: bool = true;

    fn empty_value() -> Self {
        0.0
    }
}

impl EmptyValue for String {
    fn empty_value() -> Self {
        String::new()
    }
}

impl EmptyValue for Box<str> {
    fn empty_value() -> Self {
        Box::default()
    }
}

impl<T> EmptyValue for Vec<T> {
    fn empty_value() -> Self {
        Vec::new()
    }
}

impl<T> EmptyValue for Option<T> {
    fn empty_value() -> Self {
        None
    }
}
