//! Shared scheduling types: queue classes, attachment access, fence values.

use std::ops::{Deref, DerefMut, Index, IndexMut};

use bitflags::bitflags;

/// Number of hardware queue classes.
pub const QUEUE_CLASS_COUNT: usize = 3;

/// Class of hardware queue a scope executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum HardwareQueueClass {
    /// Graphics queue, also capable of compute and copy work.
    #[default]
    Graphics,
    /// Async compute queue.
    Compute,
    /// Copy / transfer queue.
    Copy,
}

impl HardwareQueueClass {
    /// All queue classes in index order.
    pub const ALL: [HardwareQueueClass; QUEUE_CLASS_COUNT] = [
        HardwareQueueClass::Graphics,
        HardwareQueueClass::Compute,
        HardwareQueueClass::Copy,
    ];

    /// Index of this class into per-queue arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Copy => 2,
        }
    }

    /// Queue class for an index produced by [`index`](Self::index).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Single-bit mask for this class.
    pub fn mask(self) -> HardwareQueueClassMask {
        match self {
            Self::Graphics => HardwareQueueClassMask::GRAPHICS,
            Self::Compute => HardwareQueueClassMask::COMPUTE,
            Self::Copy => HardwareQueueClassMask::COPY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Copy => "copy",
        }
    }
}

bitflags! {
    /// Set of hardware queue classes enabled for a compile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HardwareQueueClassMask: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const COPY = 1 << 2;
    }
}

impl HardwareQueueClassMask {
    /// Check whether a queue class is part of the mask.
    pub fn contains_class(self, class: HardwareQueueClass) -> bool {
        self.contains(class.mask())
    }
}

impl Default for HardwareQueueClassMask {
    fn default() -> Self {
        Self::all()
    }
}

/// How a scope accesses an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentAccess {
    Read,
    Write,
    ReadWrite,
}

impl AttachmentAccess {
    /// Check if this access writes the attachment.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Check if this access reads the attachment.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }
}

/// Kind of resource backing an attachment.
///
/// Image and buffer aliasing may need differently shaped barriers, so the kind
/// is carried through to the barrier backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Image,
    Buffer,
}

/// Opaque handle to a backend resource.
///
/// Imported attachments carry the handle the client imported; transient
/// attachments get a handle derived from their heap placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceHandle(pub u64);

impl ResourceHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One fence value per hardware queue class.
///
/// A value of zero means "no wait" for that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct FenceValues(pub [u64; QUEUE_CLASS_COUNT]);

impl FenceValues {
    pub const fn new() -> Self {
        Self([0; QUEUE_CLASS_COUNT])
    }

    /// Values with a single queue set.
    pub fn from_queue_value(queue: HardwareQueueClass, value: u64) -> Self {
        let mut values = Self::new();
        values[queue] = value;
        values
    }

    /// Check whether every queue entry is zero.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&value| value == 0)
    }

    /// Raise each entry to the maximum of both sets.
    pub fn merge_max(&mut self, other: &FenceValues) {
        for (value, other) in self.0.iter_mut().zip(other.0.iter()) {
            *value = (*value).max(*other);
        }
    }

    /// Iterate over the queues with a non-zero value.
    pub fn iter(&self) -> impl Iterator<Item = (HardwareQueueClass, u64)> + '_ {
        HardwareQueueClass::ALL
            .iter()
            .zip(self.0.iter())
            .filter(|(_, &value)| value != 0)
            .map(|(&queue, &value)| (queue, value))
    }
}

impl Deref for FenceValues {
    type Target = [u64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FenceValues {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Index<HardwareQueueClass> for FenceValues {
    type Output = u64;

    fn index(&self, queue: HardwareQueueClass) -> &u64 {
        &self.0[queue.index()]
    }
}

impl IndexMut<HardwareQueueClass> for FenceValues {
    fn index_mut(&mut self, queue: HardwareQueueClass) -> &mut u64 {
        &mut self.0[queue.index()]
    }
}
