//! Scope types.

use crate::types::{AttachmentAccess, FenceValues, HardwareQueueClass, QUEUE_CLASS_COUNT};

use super::{AttachmentHandle, ScopeHandle};

/// A single attachment usage declared by a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeAttachment {
    pub attachment: AttachmentHandle,
    pub access: AttachmentAccess,
}

/// A unit of GPU work with explicit attachment usages.
///
/// Scopes are configured before being added to a
/// [`FrameGraph`](super::FrameGraph). The graph fills in the dependency lists
/// when it is finalized, and the
/// [`FrameGraphCompiler`](crate::compiler::FrameGraphCompiler) fills in the
/// fence values. After that the scope is read-only until the frame ends.
///
/// # Example
///
/// ```
/// use redlilium_rhi::{AttachmentAccess, FrameGraph, HardwareQueueClass, Scope};
///
/// let mut graph = FrameGraph::new();
/// let depth = graph.create_transient_image("depth", 4096, 256).unwrap();
///
/// let scope = Scope::new("depth_prepass", HardwareQueueClass::Graphics)
///     .with_attachment(depth, AttachmentAccess::Write)
///     .with_estimated_item_count(512);
/// graph.add_scope(scope).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    queue_class: HardwareQueueClass,
    attachments: Vec<ScopeAttachment>,
    estimated_item_count: u32,
    handle: Option<ScopeHandle>,
    /// Earlier scopes this one must run after, on any queue.
    dependencies: Vec<ScopeHandle>,
    /// Dependencies bucketed by the queue class they run on.
    producers: [Vec<ScopeHandle>; QUEUE_CLASS_COUNT],
    /// Later scopes depending on this one, bucketed by queue class.
    consumers: [Vec<ScopeHandle>; QUEUE_CLASS_COUNT],
    wait_fences: FenceValues,
    signal_fence: Option<u64>,
}

impl Scope {
    /// Create a new scope on the given queue class.
    pub fn new(name: impl Into<String>, queue_class: HardwareQueueClass) -> Self {
        Self {
            name: name.into(),
            queue_class,
            attachments: Vec::new(),
            estimated_item_count: 1,
            handle: None,
            dependencies: Vec::new(),
            producers: Default::default(),
            consumers: Default::default(),
            wait_fences: FenceValues::new(),
            signal_fence: None,
        }
    }

    /// Declare an attachment usage.
    ///
    /// Usages are evaluated in declaration order. Declaring the same attachment
    /// twice merges the accesses.
    pub fn use_attachment(&mut self, attachment: AttachmentHandle, access: AttachmentAccess) {
        if let Some(existing) = self
            .attachments
            .iter_mut()
            .find(|usage| usage.attachment == attachment)
        {
            if existing.access != access {
                existing.access = AttachmentAccess::ReadWrite;
            }
            return;
        }
        self.attachments.push(ScopeAttachment { attachment, access });
    }

    /// Builder form of [`use_attachment`](Self::use_attachment).
    pub fn with_attachment(mut self, attachment: AttachmentHandle, access: AttachmentAccess) -> Self {
        self.use_attachment(attachment, access);
        self
    }

    /// Hint for how much work the scope records (draws, dispatches).
    pub fn with_estimated_item_count(mut self, count: u32) -> Self {
        self.estimated_item_count = count.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    pub fn attachments(&self) -> &[ScopeAttachment] {
        &self.attachments
    }

    /// Access this scope declared for an attachment, if any.
    pub fn access_of(&self, attachment: AttachmentHandle) -> Option<AttachmentAccess> {
        self.attachments
            .iter()
            .find(|usage| usage.attachment == attachment)
            .map(|usage| usage.access)
    }

    pub fn estimated_item_count(&self) -> u32 {
        self.estimated_item_count
    }

    /// Handle assigned when the scope was added to a graph.
    pub fn handle(&self) -> Option<ScopeHandle> {
        self.handle
    }

    /// Every earlier scope this one depends on.
    pub fn dependencies(&self) -> &[ScopeHandle] {
        &self.dependencies
    }

    /// Dependencies running on `queue_class`, in declaration order.
    pub fn producers(&self, queue_class: HardwareQueueClass) -> &[ScopeHandle] {
        &self.producers[queue_class.index()]
    }

    /// Dependents running on `queue_class`, in declaration order.
    pub fn consumers(&self, queue_class: HardwareQueueClass) -> &[ScopeHandle] {
        &self.consumers[queue_class.index()]
    }

    /// Check whether any dependent runs on a different queue class.
    pub fn has_cross_queue_consumers(&self) -> bool {
        HardwareQueueClass::ALL
            .iter()
            .filter(|&&queue| queue != self.queue_class)
            .any(|&queue| !self.consumers(queue).is_empty())
    }

    /// Fence value this scope waits for on `queue_class`, zero for none.
    pub fn wait_fence(&self, queue_class: HardwareQueueClass) -> u64 {
        self.wait_fences[queue_class]
    }

    pub fn wait_fences(&self) -> &FenceValues {
        &self.wait_fences
    }

    /// Fence value signaled on this scope's queue after it completes.
    pub fn signal_fence(&self) -> Option<u64> {
        self.signal_fence
    }

    pub(crate) fn set_handle(&mut self, handle: ScopeHandle) {
        self.handle = Some(handle);
    }

    /// Record an edge towards an earlier scope. Returns false if it already existed.
    pub(crate) fn add_producer(&mut self, producer: ScopeHandle, queue_class: HardwareQueueClass) -> bool {
        if self.dependencies.contains(&producer) {
            return false;
        }
        self.dependencies.push(producer);
        let bucket = &mut self.producers[queue_class.index()];
        let position = bucket.partition_point(|&existing| existing < producer);
        bucket.insert(position, producer);
        true
    }

    pub(crate) fn add_consumer(&mut self, consumer: ScopeHandle, queue_class: HardwareQueueClass) {
        let bucket = &mut self.consumers[queue_class.index()];
        if let Err(position) = bucket.binary_search(&consumer) {
            bucket.insert(position, consumer);
        }
    }

    pub(crate) fn set_wait_fence(&mut self, queue_class: HardwareQueueClass, value: u64) {
        self.wait_fences[queue_class] = value;
    }

    pub(crate) fn set_signal_fence(&mut self, value: u64) {
        self.signal_fence = Some(value);
    }

    pub(crate) fn clear_fences(&mut self) {
        self.wait_fences = FenceValues::new();
        self.signal_fence = None;
    }
}
