//! CPU-side allocators for GPU address ranges.
//!
//! - [`PoolAllocator`] - Fixed-size slot allocation with cycle-based deferred reuse
//! - [`VirtualAddress`] - Opaque offset handed out by the allocators
//!
//! The allocators never touch GPU memory. They hand out offsets into an address
//! range owned by someone else and make sure an offset is not handed out again
//! while the GPU may still be reading through it.

mod pool;

pub use pool::{PoolAllocator, PoolAllocatorDescriptor};

/// An offset into an allocator's address range.
///
/// [`VirtualAddress::NULL`] is returned when an allocation fails. Callers must
/// check for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    /// Sentinel for a failed allocation.
    pub const NULL: Self = Self(u64::MAX);

    pub fn new(ptr: u64) -> Self {
        Self(ptr)
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Raw address value.
    pub fn ptr(self) -> u64 {
        self.0
    }
}

impl Default for VirtualAddress {
    fn default() -> Self {
        Self::NULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_address() {
        assert!(VirtualAddress::NULL.is_null());
        assert!(VirtualAddress::default().is_null());
        assert!(!VirtualAddress::new(0).is_null());
        assert_eq!(VirtualAddress::new(256).ptr(), 256);
    }
}
