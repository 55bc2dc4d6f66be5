//! Fixed-size pool allocator with deferred reclamation.
//!
//! Every allocation occupies exactly one element of `element_size` bytes. Freed
//! elements are not reused straight away: they are parked as garbage stamped
//! with the current collect cycle and only return to the free list once
//! [`PoolAllocator::garbage_collect`] has advanced the cycle by
//! `garbage_collect_latency`. The owning system calls `garbage_collect` once per
//! frame boundary, so the latency is the number of frames the GPU may still be
//! consuming a freed element.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::{PoolAllocator, PoolAllocatorDescriptor};
//!
//! let mut pool = PoolAllocator::new();
//! pool.init(PoolAllocatorDescriptor {
//!     element_size: 256,
//!     capacity_in_bytes: 1024,
//!     address_base: 0,
//!     garbage_collect_latency: 1,
//! })
//! .unwrap();
//!
//! let address = pool.allocate(200, 16);
//! assert_eq!(address.ptr(), 0);
//!
//! pool.deallocate(address);
//! pool.garbage_collect();
//! assert_eq!(pool.allocate(200, 16), address);
//! ```

use std::collections::VecDeque;

use super::VirtualAddress;
use crate::error::{contract_violation, RhiError, RhiResult};

/// Parameters for [`PoolAllocator::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAllocatorDescriptor {
    /// Size of every element, in bytes.
    pub element_size: u64,
    /// Total size of the managed range, in bytes.
    pub capacity_in_bytes: u64,
    /// Address of the first element.
    pub address_base: u64,
    /// Collect cycles a freed element waits before reuse.
    pub garbage_collect_latency: u64,
}

impl Default for PoolAllocatorDescriptor {
    fn default() -> Self {
        Self {
            element_size: 0,
            capacity_in_bytes: 0,
            address_base: 0,
            garbage_collect_latency: 0,
        }
    }
}

/// A freed element waiting for its latency to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Garbage {
    element_index: u64,
    collect_cycle: u64,
}

/// Bump allocator over fixed-size elements with cycle-based garbage collection.
#[derive(Debug, Default)]
pub struct PoolAllocator {
    descriptor: Option<PoolAllocatorDescriptor>,
    element_count: u64,
    /// Free element indices. Allocation pops from the back.
    free_list: Vec<u64>,
    /// Freed elements in collect cycle order.
    garbage: VecDeque<Garbage>,
    /// Per element: handed out and not yet freed.
    live: Vec<bool>,
    garbage_collect_cycle: u64,
    allocation_count: u64,
}

impl PoolAllocator {
    /// Create an uninitialized allocator. Every allocation fails until [`init`](Self::init).
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the allocator.
    ///
    /// Seeds the free list with every element, highest index first, so the
    /// first allocations get the lowest addresses.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - element size is zero or the capacity is smaller than one element
    /// * `InvalidOperation` - the allocator is already initialized
    pub fn init(&mut self, descriptor: PoolAllocatorDescriptor) -> RhiResult<()> {
        if self.descriptor.is_some() {
            return Err(RhiError::InvalidOperation(
                "pool allocator is already initialized".to_string(),
            ));
        }
        if descriptor.element_size == 0 {
            return Err(RhiError::InvalidArgument(
                "pool element size must be non-zero".to_string(),
            ));
        }
        if descriptor.capacity_in_bytes < descriptor.element_size {
            return Err(RhiError::InvalidArgument(format!(
                "pool capacity {} is smaller than one element ({} bytes)",
                descriptor.capacity_in_bytes, descriptor.element_size
            )));
        }

        self.element_count = descriptor.capacity_in_bytes / descriptor.element_size;
        self.free_list.clear();
        self.free_list.extend((0..self.element_count).rev());
        self.garbage.clear();
        self.live.clear();
        self.live.resize(self.element_count as usize, false);
        self.garbage_collect_cycle = 0;
        self.allocation_count = 0;
        self.descriptor = Some(descriptor);

        log::debug!(
            "PoolAllocator: {} elements of {} bytes at {:#x}, latency {}",
            self.element_count,
            descriptor.element_size,
            descriptor.address_base,
            descriptor.garbage_collect_latency
        );
        Ok(())
    }

    /// Release everything and return to the uninitialized state.
    pub fn shutdown(&mut self) {
        if self.descriptor.is_none() {
            return;
        }
        self.garbage_collect_force();
        if self.allocation_count != 0 {
            log::warn!(
                "PoolAllocator: shutting down with {} live allocations",
                self.allocation_count
            );
        }
        *self = Self::default();
    }

    /// Allocate one element.
    ///
    /// Returns [`VirtualAddress::NULL`] when `byte_count` is zero, when the
    /// request does not fit in one element, or when the pool is exhausted.
    pub fn allocate(&mut self, byte_count: u64, byte_alignment: u64) -> VirtualAddress {
        let Some(descriptor) = self.descriptor else {
            log::warn!("PoolAllocator: allocate called before init");
            return VirtualAddress::NULL;
        };
        if byte_count == 0 {
            return VirtualAddress::NULL;
        }
        if byte_alignment > descriptor.element_size {
            log::warn!(
                "PoolAllocator: alignment {} exceeds element size {}",
                byte_alignment,
                descriptor.element_size
            );
            return VirtualAddress::NULL;
        }
        if byte_count > descriptor.element_size {
            log::warn!(
                "PoolAllocator: {} bytes requested from a pool of {} byte elements",
                byte_count,
                descriptor.element_size
            );
            return VirtualAddress::NULL;
        }

        let Some(element_index) = self.free_list.pop() else {
            return VirtualAddress::NULL;
        };
        self.live[element_index as usize] = true;
        self.allocation_count += 1;
        VirtualAddress::new(descriptor.address_base + element_index * descriptor.element_size)
    }

    /// Free an element. It becomes reusable after the garbage collect latency.
    ///
    /// Freeing an address this pool did not hand out is a contract violation.
    pub fn deallocate(&mut self, address: VirtualAddress) {
        let Some(descriptor) = self.descriptor else {
            contract_violation!("PoolAllocator: deallocate called before init");
            return;
        };
        if address.is_null() {
            return;
        }

        let Some(offset) = address.ptr().checked_sub(descriptor.address_base) else {
            contract_violation!(
                "PoolAllocator: address {:#x} is below the pool base {:#x}",
                address.ptr(),
                descriptor.address_base
            );
            return;
        };
        if offset % descriptor.element_size != 0 {
            contract_violation!(
                "PoolAllocator: address {:#x} is not aligned to the element size {}",
                address.ptr(),
                descriptor.element_size
            );
            return;
        }
        let element_index = offset / descriptor.element_size;
        if element_index >= self.element_count {
            contract_violation!(
                "PoolAllocator: address {:#x} is outside the pool",
                address.ptr()
            );
            return;
        }
        if !self.live[element_index as usize] {
            contract_violation!(
                "PoolAllocator: address {:#x} is not a live allocation",
                address.ptr()
            );
            return;
        }

        self.live[element_index as usize] = false;
        self.allocation_count -= 1;
        self.garbage.push_back(Garbage {
            element_index,
            collect_cycle: self.garbage_collect_cycle,
        });
    }

    /// Advance the collect cycle and reclaim garbage old enough to reuse.
    ///
    /// Must run exactly once per frame boundary.
    pub fn garbage_collect(&mut self) {
        let Some(descriptor) = self.descriptor else {
            return;
        };
        self.garbage_collect_cycle += 1;

        while let Some(entry) = self.garbage.front() {
            if self.garbage_collect_cycle - entry.collect_cycle < descriptor.garbage_collect_latency {
                break;
            }
            self.free_list.push(entry.element_index);
            self.garbage.pop_front();
        }
    }

    /// Reclaim all garbage regardless of age.
    ///
    /// Only for teardown: the GPU may still be reading recently freed elements.
    pub fn garbage_collect_force(&mut self) {
        let reclaimed = self.garbage.len();
        self.free_list
            .extend(self.garbage.drain(..).map(|entry| entry.element_index));
        if reclaimed > 0 {
            log::trace!("PoolAllocator: force-collected {} elements", reclaimed);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn descriptor(&self) -> Option<&PoolAllocatorDescriptor> {
        self.descriptor.as_ref()
    }

    /// Element size in bytes, zero before init.
    pub fn element_size(&self) -> u64 {
        self.descriptor.map_or(0, |d| d.element_size)
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    /// Bytes held by live allocations.
    pub fn allocated_byte_count(&self) -> u64 {
        self.allocation_count * self.element_size()
    }

    /// Elements freed but not yet reclaimed.
    pub fn garbage_count(&self) -> usize {
        self.garbage.len()
    }

    /// Elements ready to be allocated.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Current collect cycle.
    pub fn garbage_collect_cycle(&self) -> u64 {
        self.garbage_collect_cycle
    }
}
