#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;

pub mod hash_map;
pub mod hash_set;
pub mod hash_table;
pub mod hash_traits;
pub mod linked_hash_set;
pub mod stats;
pub mod translator;

pub use error::TryReserveError;
pub use hash_map::AddResult;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use hash_table::HashTable;
pub use hash_traits::EmptyValue;
pub use hash_traits::HashTraits;
pub use linked_hash_set::LinkedHashSet;
#[cfg(feature = "stats")]
pub use stats::{ProbeHistogram, TableStats};
pub use translator::{BorrowTranslator, HashTranslator, IdentityTranslator, InsertTranslator};

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder containers use unless one is given.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder containers use unless one is given.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder when no hasher feature is enabled. It cannot be
        /// constructed, so containers need an explicit hasher builder.
        #[derive(Debug, Clone, Copy)]
        pub enum DefaultHashBuilder {}
    }
}
