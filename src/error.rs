use core::alloc::Layout;
use core::fmt;

/// The error type for `try_reserve` methods.
///
/// Every other allocating operation aborts through
/// [`handle_alloc_error`](alloc::alloc::handle_alloc_error) on allocation
/// failure and panics on size overflow.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TryReserveError {
    /// The requested number of slots exceeds what can be addressed.
    CapacityOverflow,

    /// The allocator returned an error.
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")?;
        match self {
            TryReserveError::CapacityOverflow => {
                f.write_str(" because the computed capacity exceeded the collection's maximum")
            }
            TryReserveError::AllocError { layout } => write!(
                f,
                " because the memory allocator returned an error for {} bytes",
                layout.size()
            ),
        }
    }
}

impl core::error::Error for TryReserveError {}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_mentions_the_cause() {
        let overflow = TryReserveError::CapacityOverflow.to_string();
        assert!(overflow.contains("capacity exceeded"));

        let layout = Layout::from_size_align(4096, 8).unwrap();
        let alloc = TryReserveError::AllocError { layout }.to_string();
        assert!(alloc.contains("4096 bytes"), "{alloc}");
    }
}
