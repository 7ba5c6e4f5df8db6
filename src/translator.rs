//! Heterogeneous lookup and insertion.
//!
//! A translator lets a container be searched with a value of some other type
//! `Q` than its key type `K`, and lets an insertion build the key from `Q`
//! only once it is known to be absent. The translator's hash must agree with
//! the hash the container computes for stored keys, and its equality must
//! agree with the key's own equality.
//!
//! ```rust
//! # use core::hash::{BuildHasher, Hash};
//! # use tomb_hash::HashSet;
//! # use tomb_hash::translator::{HashTranslator, InsertTranslator};
//! #
//! /// Looks up `u64` keys by their decimal representation.
//! struct Decimal;
//!
//! impl HashTranslator<u64, str> for Decimal {
//!     fn hash<S: BuildHasher>(hash_builder: &S, key: &str) -> u64 {
//!         hash_builder.hash_one(key.parse::<u64>().unwrap_or(0))
//!     }
//!
//!     fn equal(stored: &u64, key: &str) -> bool {
//!         key.parse::<u64>().ok() == Some(*stored)
//!     }
//! }
//!
//! impl<'a> InsertTranslator<u64, &'a str> for Decimal {
//!     fn translate(key: &'a str) -> u64 {
//!         key.parse().unwrap_or(0)
//!     }
//! }
//!
//! impl<'a> HashTranslator<u64, &'a str> for Decimal {
//!     fn hash<S: BuildHasher>(hash_builder: &S, key: &&'a str) -> u64 {
//!         <Decimal as HashTranslator<u64, str>>::hash(hash_builder, key)
//!     }
//!
//!     fn equal(stored: &u64, key: &&'a str) -> bool {
//!         <Decimal as HashTranslator<u64, str>>::equal(stored, key)
//!     }
//! }
//!
//! let mut set: HashSet<u64> = HashSet::new();
//! set.add_with::<Decimal, _>("42");
//! assert!(set.contains(&42));
//! assert!(set.contains_with::<Decimal, _>("42"));
//! ```

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};

/// Hashes and compares lookup values of type `Q` against stored keys of type
/// `K`.
pub trait HashTranslator<K, Q: ?Sized> {
    /// Hashes `key` so that it matches the hash of an equal stored key.
    fn hash<S: BuildHasher>(hash_builder: &S, key: &Q) -> u64;

    /// Returns `true` if `stored` matches `key`.
    fn equal(stored: &K, key: &Q) -> bool;
}

/// A translator that can also build a stored key from the lookup value.
pub trait InsertTranslator<K, Q>: HashTranslator<K, Q> {
    /// Converts `key` into the stored key. Only called when no equal key is
    /// present.
    fn translate(key: Q) -> K;
}

/// The translator containers use for their own key type.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl<K> HashTranslator<K, K> for IdentityTranslator
where
    K: Hash + Eq,
{
    #[inline]
    fn hash<S: BuildHasher>(hash_builder: &S, key: &K) -> u64 {
        hash_builder.hash_one(key)
    }

    #[inline]
    fn equal(stored: &K, key: &K) -> bool {
        stored == key
    }
}

impl<K> InsertTranslator<K, K> for IdentityTranslator
where
    K: Hash + Eq,
{
    #[inline]
    fn translate(key: K) -> K {
        key
    }
}

/// Translates through [`Borrow`], the way `std` collections look keys up.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorrowTranslator;

impl<K, Q> HashTranslator<K, Q> for BorrowTranslator
where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
{
    #[inline]
    fn hash<S: BuildHasher>(hash_builder: &S, key: &Q) -> u64 {
        hash_builder.hash_one(key)
    }

    #[inline]
    fn equal(stored: &K, key: &Q) -> bool {
        stored.borrow() == key
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Default)]
    struct SipBuilder;

    impl BuildHasher for SipBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(1, 2)
        }
    }

    #[test]
    fn identity_matches_the_key_hash() {
        let builder = SipBuilder;
        let key = String::from("tomb");
        assert_eq!(
            <IdentityTranslator as HashTranslator<String, String>>::hash(&builder, &key),
            builder.hash_one(&key)
        );
        assert!(IdentityTranslator::equal(&key, &String::from("tomb")));
        assert_eq!(IdentityTranslator::translate(key.clone()), key);
    }

    #[test]
    fn borrow_hashes_like_the_owned_key() {
        let builder = SipBuilder;
        let owned = String::from("stone");
        assert_eq!(
            <BorrowTranslator as HashTranslator<String, str>>::hash(&builder, "stone"),
            builder.hash_one(&owned)
        );
        assert!(<BorrowTranslator as HashTranslator<String, str>>::equal(&owned, "stone"));
        assert!(!<BorrowTranslator as HashTranslator<String, str>>::equal(&owned, "stones"));
    }
}
