//! Aliasing barrier tracker.

use std::collections::HashSet;

use crate::graph::AttachmentHandle;

use super::{get_overlap, AliasedResource, AliasingBarrierBackend};

/// Collects heap occupants for one frame and emits de-duplicated barriers.
///
/// Resources must be added in program order: the order in which the GPU
/// first touches them. [`end`](Self::end) then compares every newly added
/// resource with the occupants added before it.
#[derive(Debug, Default)]
pub struct AliasingBarrierTracker {
    resources: Vec<AliasedResource>,
    /// Guards against the same occupant being added twice in one frame.
    known: HashSet<AliasedResource>,
    /// Index of the first resource not yet processed by `end`.
    pending_start: usize,
    /// Pairs (before, after) already emitted this frame.
    barriers: HashSet<(AttachmentHandle, AttachmentHandle)>,
}

impl AliasingBarrierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an occupant. Adding an identical occupant again is ignored.
    pub fn add_resource(&mut self, resource: AliasedResource) {
        debug_assert!(resource.byte_offset_min <= resource.byte_offset_max);
        if !self.known.insert(resource) {
            log::trace!(
                "AliasingBarrierTracker: ignoring duplicate occupant {:?}",
                resource.attachment
            );
            return;
        }
        self.resources.push(resource);
    }

    /// Emit barriers for every occupant added since the last call.
    ///
    /// Returns the number of barriers emitted.
    pub fn end(&mut self, backend: &mut dyn AliasingBarrierBackend) -> usize {
        let mut emitted = 0;

        for index in self.pending_start..self.resources.len() {
            let after = self.resources[index];

            for before in self.resources[..index].iter().rev() {
                if before.attachment != after.attachment {
                    let overlap = get_overlap(before, &after);
                    if overlap.requires_barrier()
                        && self.barriers.insert((before.attachment, after.attachment))
                    {
                        log::trace!(
                            "AliasingBarrierTracker: barrier {:?} -> {:?} ({:?})",
                            before.attachment,
                            after.attachment,
                            overlap
                        );
                        backend.append_barrier_internal(before, &after, overlap);
                        emitted += 1;
                    }
                }

                // Everything older lies behind this occupant.
                if before.contains(&after) {
                    break;
                }
            }
        }

        self.pending_start = self.resources.len();
        emitted
    }

    /// Forget all occupants and emitted barriers. Called once per frame.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.known.clear();
        self.barriers.clear();
        self.pending_start = 0;
    }

    /// Occupants added this frame.
    pub fn resources(&self) -> &[AliasedResource] {
        &self.resources
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Barriers emitted this frame.
    pub fn barrier_count(&self) -> usize {
        self.barriers.len()
    }
}
