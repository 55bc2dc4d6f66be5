//! Aliasing barriers for transient attachments that share heap memory.
//!
//! Two transient attachments alias when their byte ranges in the transient
//! heap intersect. Before the later one is first used, the GPU must be told
//! that the earlier one's contents are gone. The
//! [`AliasingBarrierTracker`] collects the heap occupants of a frame in
//! program order and emits exactly one barrier request per aliasing pair
//! through an [`AliasingBarrierBackend`].
//!
//! | Overlap | Barrier |
//! |---------|---------|
//! | [`Disjoint`](AliasingOverlap::Disjoint) | none |
//! | [`Partial`](AliasingOverlap::Partial) | yes |
//! | [`Complete`](AliasingOverlap::Complete) | yes |

mod tracker;

pub use tracker::AliasingBarrierTracker;

use crate::graph::{AttachmentHandle, ScopeHandle};
use crate::types::{AttachmentKind, ResourceHandle};

/// One occupant of a transient heap range.
///
/// Byte offsets are absolute and inclusive: a 256 byte placement at offset
/// 1024 has `byte_offset_min = 1024` and `byte_offset_max = 1279`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasedResource {
    pub attachment: AttachmentHandle,
    /// First scope using the attachment.
    pub begin_scope: ScopeHandle,
    /// Last scope using the attachment.
    pub end_scope: ScopeHandle,
    pub resource: ResourceHandle,
    pub byte_offset_min: u64,
    pub byte_offset_max: u64,
    pub kind: AttachmentKind,
}

impl AliasedResource {
    /// Size of the occupied range in bytes.
    pub fn byte_size(&self) -> u64 {
        self.byte_offset_max - self.byte_offset_min + 1
    }

    /// Check whether this range fully covers `other`.
    pub fn contains(&self, other: &AliasedResource) -> bool {
        self.byte_offset_min <= other.byte_offset_min && other.byte_offset_max <= self.byte_offset_max
    }
}

/// How two heap ranges intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasingOverlap {
    /// No byte in common.
    Disjoint,
    /// Some bytes in common, neither range contains the other.
    Partial,
    /// One range contains the other.
    Complete,
}

impl AliasingOverlap {
    /// Check whether the overlap needs an aliasing barrier.
    pub fn requires_barrier(self) -> bool {
        !matches!(self, Self::Disjoint)
    }
}

/// Classify the overlap of two occupants. Symmetric in its arguments.
pub fn get_overlap(before: &AliasedResource, after: &AliasedResource) -> AliasingOverlap {
    if after.byte_offset_max < before.byte_offset_min || before.byte_offset_max < after.byte_offset_min {
        AliasingOverlap::Disjoint
    } else if before.contains(after) || after.contains(before) {
        AliasingOverlap::Complete
    } else {
        AliasingOverlap::Partial
    }
}

/// Backend hook that turns barrier requests into native commands.
pub trait AliasingBarrierBackend {
    /// Record a barrier between the previous occupant `before` and the new
    /// occupant `after` of an overlapping heap range.
    fn append_barrier_internal(
        &mut self,
        before: &AliasedResource,
        after: &AliasedResource,
        overlap: AliasingOverlap,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn occupant(index: u32, min: u64, max: u64) -> AliasedResource {
        AliasedResource {
            attachment: AttachmentHandle::new(index),
            begin_scope: ScopeHandle::new(index),
            end_scope: ScopeHandle::new(index),
            resource: ResourceHandle::NULL,
            byte_offset_min: min,
            byte_offset_max: max,
            kind: AttachmentKind::Image,
        }
    }

    #[rstest]
    #[case::disjoint_before((0, 99), (100, 199), AliasingOverlap::Disjoint)]
    #[case::disjoint_after((200, 299), (0, 199), AliasingOverlap::Disjoint)]
    #[case::touching_edge((0, 100), (100, 199), AliasingOverlap::Partial)]
    #[case::straddling((0, 149), (100, 199), AliasingOverlap::Partial)]
    #[case::identical((0, 255), (0, 255), AliasingOverlap::Complete)]
    #[case::inner((0, 255), (64, 127), AliasingOverlap::Complete)]
    #[case::outer((64, 127), (0, 255), AliasingOverlap::Complete)]
    #[case::single_byte((10, 10), (10, 10), AliasingOverlap::Complete)]
    fn test_overlap_classification(
        #[case] before: (u64, u64),
        #[case] after: (u64, u64),
        #[case] expected: AliasingOverlap,
    ) {
        let a = occupant(0, before.0, before.1);
        let b = occupant(1, after.0, after.1);
        assert_eq!(get_overlap(&a, &b), expected);
        assert_eq!(get_overlap(&b, &a), expected);
    }

    #[test]
    fn test_requires_barrier() {
        assert!(!AliasingOverlap::Disjoint.requires_barrier());
        assert!(AliasingOverlap::Partial.requires_barrier());
        assert!(AliasingOverlap::Complete.requires_barrier());
    }

    #[test]
    fn test_byte_size_is_inclusive() {
        assert_eq!(occupant(0, 1024, 1279).byte_size(), 256);
    }
}
