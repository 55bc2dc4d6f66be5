//! Transient attachment placement.
//!
//! Transient attachments live for a single frame. Each frame gets one heap
//! block from a [`PoolAllocator`] whose element is a whole transient heap.
//! Freed blocks stay parked for `garbage_collect_latency` frames, which is
//! what keeps the CPU from handing out memory the GPU is still reading.
//!
//! Inside the block, attachments are placed with aligned first-fit in
//! declaration order. An attachment's range is released once its last scope
//! has been passed, so later attachments can reuse it. Every placement is
//! reported to the [`AliasingBarrierTracker`] in that same order.
//!
//! When a reused range was last touched on a different hardware queue than
//! the scope taking it over, the pool adds an aliasing dependency to the
//! graph. The compiler then turns that edge into a cross-queue fence.

use crate::aliasing::{AliasedResource, AliasingBarrierTracker};
use crate::allocator::{PoolAllocator, PoolAllocatorDescriptor, VirtualAddress};
use crate::error::{RhiError, RhiResult};
use crate::graph::{AttachmentHandle, AttachmentLifetime, FrameGraph, ScopeHandle};
use crate::types::{HardwareQueueClass, ResourceHandle, QUEUE_CLASS_COUNT};

/// Transient resource handles have this bit set. The low bits hold the
/// absolute heap offset.
pub const TRANSIENT_HANDLE_BIT: u64 = 1 << 63;

/// Where a transient attachment was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientPlacement {
    /// Absolute address (heap block base plus local offset).
    pub address: u64,
    /// Offset inside this frame's heap block.
    pub local_offset: u64,
    pub size: u64,
    pub resource: ResourceHandle,
}

/// Placement counters for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransientStatistics {
    /// Attachments placed in the heap.
    pub placed_count: usize,
    /// Placements that reuse memory of an earlier attachment.
    pub aliased_count: usize,
    /// Sum of all placed attachment sizes.
    pub requested_bytes: u64,
    /// High-water mark inside the heap block.
    pub peak_bytes: u64,
    /// Cross-queue edges added to the graph for reused memory.
    pub aliasing_dependency_count: usize,
}

/// A released range and the scopes that last touched it, per queue class.
#[derive(Debug, Clone, Copy)]
struct Retired {
    begin: u64,
    end: u64,
    last_users: [Option<ScopeHandle>; QUEUE_CLASS_COUNT],
}

/// Places transient attachments into per-frame heap blocks.
#[derive(Debug)]
pub struct TransientAttachmentPool {
    allocator: PoolAllocator,
    heap_size: u64,
    alignment: u64,
    block: VirtualAddress,
    placements: Vec<Option<TransientPlacement>>,
    statistics: TransientStatistics,
}

impl TransientAttachmentPool {
    /// Create the pool. `descriptor.element_size` is the heap block size.
    pub fn new(descriptor: PoolAllocatorDescriptor, alignment: u64) -> RhiResult<Self> {
        let mut allocator = PoolAllocator::new();
        allocator.init(descriptor)?;
        Ok(Self {
            allocator,
            heap_size: descriptor.element_size,
            alignment: alignment.max(1),
            block: VirtualAddress::NULL,
            placements: Vec::new(),
            statistics: TransientStatistics::default(),
        })
    }

    /// Advance the garbage collect cycle and take a heap block for the frame.
    pub fn begin_frame(&mut self) -> RhiResult<()> {
        if !self.block.is_null() {
            return Err(RhiError::InvalidOperation(
                "transient heap block already taken for this frame".to_string(),
            ));
        }
        self.allocator.garbage_collect();
        self.block = self.allocator.allocate(self.heap_size, self.alignment);
        if self.block.is_null() {
            return Err(RhiError::OutOfMemory(format!(
                "no transient heap block free ({} in use, {} awaiting reuse)",
                self.allocator.allocation_count(),
                self.allocator.garbage_count()
            )));
        }
        self.placements.clear();
        self.statistics = TransientStatistics::default();
        log::trace!(
            "TransientAttachmentPool: frame heap block at {:#x}",
            self.block.ptr()
        );
        Ok(())
    }

    /// Place every transient attachment of a finalized graph.
    ///
    /// Placements are added to `tracker` in first-use order. Returns the
    /// number of attachments placed.
    pub fn place(
        &mut self,
        graph: &mut FrameGraph,
        tracker: &mut AliasingBarrierTracker,
    ) -> RhiResult<usize> {
        if self.block.is_null() {
            return Err(RhiError::InvalidOperation(
                "place called outside of a frame".to_string(),
            ));
        }
        if !graph.is_finalized() {
            return Err(RhiError::InvalidOperation(
                "transient placement needs a finalized frame graph".to_string(),
            ));
        }

        self.placements.clear();
        self.placements.resize(graph.attachment_count(), None);
        self.statistics = TransientStatistics::default();

        // (offset, size) in block-local bytes, sorted by offset
        let mut free: Vec<(u64, u64)> = vec![(0, self.heap_size)];
        let mut live: Vec<AttachmentHandle> = Vec::new();
        let mut retired: Vec<Retired> = Vec::new();
        let mut aliasing_edges: Vec<(ScopeHandle, ScopeHandle)> = Vec::new();

        for (scope_index, scope) in graph.scopes().iter().enumerate() {
            let current = ScopeHandle::new(scope_index as u32);

            let mut index = 0;
            while index < live.len() {
                let handle = live[index];
                let attachment = graph.attachment(handle);
                if attachment.last_use().is_some_and(|last| last < current) {
                    live.swap_remove(index);
                    if let Some(placement) = self.placements[handle.index()] {
                        release(&mut free, placement.local_offset, placement.size);
                        let mut last_users = [None; QUEUE_CLASS_COUNT];
                        for &(user, _) in attachment.usages() {
                            let queue = graph.scope(user).queue_class();
                            last_users[queue.index()] = Some(user);
                        }
                        retired.push(Retired {
                            begin: placement.local_offset,
                            end: placement.local_offset + placement.size,
                            last_users,
                        });
                    }
                } else {
                    index += 1;
                }
            }

            for usage in scope.attachments() {
                let attachment = graph.attachment(usage.attachment);
                let AttachmentLifetime::Transient { size, alignment } = attachment.lifetime() else {
                    continue;
                };
                if attachment.first_use() != Some(current) {
                    continue;
                }

                let alignment = alignment.max(self.alignment);
                let Some(local_offset) = self.take(&mut free, size, alignment) else {
                    return Err(RhiError::OutOfTransientMemory {
                        attachment: attachment.name().to_string(),
                        size,
                        heap_size: self.heap_size,
                    });
                };
                let address = self.block.ptr() + local_offset;
                let placement = TransientPlacement {
                    address,
                    local_offset,
                    size,
                    resource: ResourceHandle(TRANSIENT_HANDLE_BIT | address),
                };
                self.placements[usage.attachment.index()] = Some(placement);
                live.push(usage.attachment);

                // The new occupant takes over the bytes it covers. Once it
                // retires, its own users stand for everything before it.
                let (begin, end) = (local_offset, local_offset + size);
                let mut aliased = false;
                let mut remaining = Vec::with_capacity(retired.len());
                for previous in retired.drain(..) {
                    if previous.end <= begin || end <= previous.begin {
                        remaining.push(previous);
                        continue;
                    }
                    aliased = true;
                    for queue in HardwareQueueClass::ALL {
                        if queue == scope.queue_class() {
                            continue;
                        }
                        if let Some(user) = previous.last_users[queue.index()] {
                            aliasing_edges.push((current, user));
                        }
                    }
                    if previous.begin < begin {
                        remaining.push(Retired { end: begin, ..previous });
                    }
                    if end < previous.end {
                        remaining.push(Retired { begin: end, ..previous });
                    }
                }
                retired = remaining;

                self.statistics.placed_count += 1;
                self.statistics.requested_bytes += size;
                self.statistics.peak_bytes = self.statistics.peak_bytes.max(local_offset + size);
                if aliased {
                    self.statistics.aliased_count += 1;
                }

                tracker.add_resource(AliasedResource {
                    attachment: usage.attachment,
                    begin_scope: current,
                    end_scope: attachment.last_use().unwrap_or(current),
                    resource: placement.resource,
                    byte_offset_min: address,
                    byte_offset_max: address + size - 1,
                    kind: attachment.kind(),
                });

                log::trace!(
                    "TransientAttachmentPool: '{}' at {:#x} ({} bytes){}",
                    attachment.name(),
                    address,
                    size,
                    if aliased { ", aliased" } else { "" }
                );
            }
        }

        aliasing_edges.sort_unstable();
        aliasing_edges.dedup();
        for (dependent, dependency) in aliasing_edges {
            graph.add_aliasing_dependency(dependent, dependency)?;
            self.statistics.aliasing_dependency_count += 1;
        }

        Ok(self.statistics.placed_count)
    }

    /// Aligned first-fit. Returns the block-local offset.
    fn take(&self, free: &mut Vec<(u64, u64)>, size: u64, alignment: u64) -> Option<u64> {
        let base = self.block.ptr();
        for index in 0..free.len() {
            let (offset, length) = free[index];
            let aligned = align_up(base + offset, alignment) - base;
            let padding = aligned - offset;
            if padding + size > length {
                continue;
            }

            let tail = length - padding - size;
            free.remove(index);
            if tail > 0 {
                free.insert(index, (aligned + size, tail));
            }
            if padding > 0 {
                free.insert(index, (offset, padding));
            }
            return Some(aligned);
        }
        None
    }

    /// Give the frame's heap block back to the pool.
    ///
    /// The block becomes reusable once the garbage collect latency elapsed.
    pub fn end_frame(&mut self) {
        if self.block.is_null() {
            return;
        }
        self.allocator.deallocate(self.block);
        self.block = VirtualAddress::NULL;
    }

    /// Release the current block and reclaim everything.
    pub fn shutdown(&mut self) {
        self.end_frame();
        self.allocator.garbage_collect_force();
        self.allocator.shutdown();
        self.placements.clear();
    }

    /// Placement of a transient attachment in the current frame.
    pub fn placement(&self, attachment: AttachmentHandle) -> Option<TransientPlacement> {
        self.placements.get(attachment.index()).copied().flatten()
    }

    pub fn statistics(&self) -> &TransientStatistics {
        &self.statistics
    }

    /// Heap block of the current frame, `NULL` between frames.
    pub fn block_address(&self) -> VirtualAddress {
        self.block
    }

    pub fn heap_size(&self) -> u64 {
        self.heap_size
    }

    pub fn allocator(&self) -> &PoolAllocator {
        &self.allocator
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Return a range to the sorted free list, merging with its neighbours.
fn release(free: &mut Vec<(u64, u64)>, offset: u64, size: u64) {
    let index = free.partition_point(|&(start, _)| start < offset);
    free.insert(index, (offset, size));

    if index + 1 < free.len() && free[index].0 + free[index].1 == free[index + 1].0 {
        free[index].1 += free[index + 1].1;
        free.remove(index + 1);
    }
    if index > 0 && free[index - 1].0 + free[index - 1].1 == free[index].0 {
        free[index - 1].1 += free[index].1;
        free.remove(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scope;
    use crate::types::AttachmentAccess;

    fn pool(heap_size: u64) -> TransientAttachmentPool {
        let mut pool = TransientAttachmentPool::new(
            PoolAllocatorDescriptor {
                element_size: heap_size,
                capacity_in_bytes: heap_size * 3,
                address_base: 0x10000,
                garbage_collect_latency: 2,
            },
            256,
        )
        .unwrap();
        pool.begin_frame().unwrap();
        pool
    }

    #[test]
    fn test_release_merges_neighbours() {
        let mut free = vec![(0, 64), (256, 64)];
        release(&mut free, 64, 192);
        assert_eq!(free, vec![(0, 320)]);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(512, 256), 512);
    }

    #[test]
    fn test_overlapping_lifetimes_get_disjoint_ranges() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let a = graph.create_transient_image("a", 1024, 256).unwrap();
        let b = graph.create_transient_image("b", 1024, 256).unwrap();
        graph
            .add_scope(
                Scope::new("both", HardwareQueueClass::Graphics)
                    .with_attachment(a, AttachmentAccess::Write)
                    .with_attachment(b, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        assert_eq!(pool.place(&mut graph, &mut tracker).unwrap(), 2);
        let pa = pool.placement(a).unwrap();
        let pb = pool.placement(b).unwrap();
        assert_eq!(pa.address, 0x10000);
        assert_eq!(pb.address, 0x10000 + 1024);
        assert_eq!(pool.statistics().aliased_count, 0);
        assert_eq!(tracker.resource_count(), 2);
    }

    #[test]
    fn test_disjoint_lifetimes_share_memory() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let a = graph.create_transient_buffer("a", 2048, 256).unwrap();
        let b = graph.create_transient_buffer("b", 2048, 256).unwrap();
        graph
            .add_scope(
                Scope::new("first", HardwareQueueClass::Graphics)
                    .with_attachment(a, AttachmentAccess::Write),
            )
            .unwrap();
        graph
            .add_scope(
                Scope::new("second", HardwareQueueClass::Graphics)
                    .with_attachment(b, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        pool.place(&mut graph, &mut tracker).unwrap();
        assert_eq!(pool.placement(a).unwrap().address, pool.placement(b).unwrap().address);
        assert_eq!(pool.statistics().aliased_count, 1);
        assert_eq!(pool.statistics().peak_bytes, 2048);
        // same queue, no extra edge
        assert_eq!(pool.statistics().aliasing_dependency_count, 0);
    }

    #[test]
    fn test_cross_queue_reuse_adds_dependency() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let x = graph.create_transient_image("x", 4096, 256).unwrap();
        let y = graph.create_transient_image("y", 4096, 256).unwrap();
        graph
            .add_scope(
                Scope::new("a", HardwareQueueClass::Graphics)
                    .with_attachment(x, AttachmentAccess::Write),
            )
            .unwrap();
        let b = graph
            .add_scope(
                Scope::new("b", HardwareQueueClass::Compute)
                    .with_attachment(x, AttachmentAccess::Read),
            )
            .unwrap();
        let c = graph
            .add_scope(
                Scope::new("c", HardwareQueueClass::Graphics)
                    .with_attachment(y, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        pool.place(&mut graph, &mut tracker).unwrap();
        assert_eq!(graph.scope(c).producers(HardwareQueueClass::Compute), &[b]);
        assert_eq!(pool.statistics().aliasing_dependency_count, 1);
    }

    #[test]
    fn test_takeover_hides_older_occupants() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let x = graph.create_transient_image("x", 4096, 256).unwrap();
        let y = graph.create_transient_image("y", 4096, 256).unwrap();
        let z = graph.create_transient_image("z", 4096, 256).unwrap();
        let c0 = graph
            .add_scope(
                Scope::new("c0", HardwareQueueClass::Compute)
                    .with_attachment(x, AttachmentAccess::Write),
            )
            .unwrap();
        let g1 = graph
            .add_scope(
                Scope::new("g1", HardwareQueueClass::Graphics)
                    .with_attachment(y, AttachmentAccess::Write),
            )
            .unwrap();
        let g2 = graph
            .add_scope(
                Scope::new("g2", HardwareQueueClass::Graphics)
                    .with_attachment(z, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        pool.place(&mut graph, &mut tracker).unwrap();
        assert_eq!(pool.statistics().aliased_count, 2);
        assert_eq!(pool.statistics().aliasing_dependency_count, 1);
        assert_eq!(graph.scope(g1).producers(HardwareQueueClass::Compute), &[c0]);
        // g1 already waited for c0 and runs before g2 on the same queue
        assert!(graph.scope(g2).producers(HardwareQueueClass::Compute).is_empty());
    }

    #[test]
    fn test_partial_takeover_keeps_uncovered_history() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let wide = graph.create_transient_buffer("wide", 4096, 256).unwrap();
        let low = graph.create_transient_buffer("low", 2048, 256).unwrap();
        let full = graph.create_transient_buffer("full", 4096, 256).unwrap();
        let c0 = graph
            .add_scope(
                Scope::new("c0", HardwareQueueClass::Compute)
                    .with_attachment(wide, AttachmentAccess::Write),
            )
            .unwrap();
        let g1 = graph
            .add_scope(
                Scope::new("g1", HardwareQueueClass::Graphics)
                    .with_attachment(low, AttachmentAccess::Write),
            )
            .unwrap();
        let k2 = graph
            .add_scope(
                Scope::new("k2", HardwareQueueClass::Copy)
                    .with_attachment(full, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        pool.place(&mut graph, &mut tracker).unwrap();
        assert_eq!(graph.scope(g1).producers(HardwareQueueClass::Compute), &[c0]);
        // upper half still belongs to c0, lower half to g1
        assert_eq!(graph.scope(k2).producers(HardwareQueueClass::Compute), &[c0]);
        assert_eq!(graph.scope(k2).producers(HardwareQueueClass::Graphics), &[g1]);
        assert_eq!(pool.statistics().aliasing_dependency_count, 3);
    }

    #[test]
    fn test_place_twice_resets_statistics() {
        let mut pool = pool(4096);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let a = graph.create_transient_image("a", 1024, 256).unwrap();
        graph
            .add_scope(
                Scope::new("draw", HardwareQueueClass::Graphics)
                    .with_attachment(a, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        pool.place(&mut graph, &mut tracker).unwrap();
        pool.place(&mut graph, &mut tracker).unwrap();
        assert_eq!(pool.statistics().placed_count, 1);
        assert_eq!(pool.statistics().requested_bytes, 1024);
        assert_eq!(tracker.resource_count(), 1);
    }

    #[test]
    fn test_heap_exhaustion_fails_frame() {
        let mut pool = pool(1024);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        let big = graph.create_transient_image("big", 2048, 256).unwrap();
        graph
            .add_scope(
                Scope::new("draw", HardwareQueueClass::Graphics)
                    .with_attachment(big, AttachmentAccess::Write),
            )
            .unwrap();
        graph.finalize();

        let result = pool.place(&mut graph, &mut tracker);
        assert_eq!(
            result,
            Err(RhiError::OutOfTransientMemory {
                attachment: "big".to_string(),
                size: 2048,
                heap_size: 1024,
            })
        );
    }

    #[test]
    fn test_place_requires_finalized_graph() {
        let mut pool = pool(1024);
        let mut tracker = AliasingBarrierTracker::new();
        let mut graph = FrameGraph::new();
        assert!(matches!(
            pool.place(&mut graph, &mut tracker),
            Err(RhiError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_blocks_rotate_through_latency() {
        let mut pool = pool(1024);
        let first = pool.block_address();
        pool.end_frame();

        pool.begin_frame().unwrap();
        let second = pool.block_address();
        assert_ne!(first, second);
        pool.end_frame();

        pool.begin_frame().unwrap();
        assert_eq!(pool.block_address(), first);
        pool.end_frame();
    }

    #[test]
    fn test_begin_frame_twice_fails() {
        let mut pool = pool(1024);
        assert!(matches!(
            pool.begin_frame(),
            Err(RhiError::InvalidOperation(_))
        ));
    }
}
