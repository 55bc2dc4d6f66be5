//! Scheduler configuration.
//!
//! [`SchedulerConfig`] is the single configuration surface of the crate. The
//! component descriptors ([`PoolAllocatorDescriptor`],
//! [`ExecuterDescriptor`]) are derived from it by the
//! [`FrameScheduler`](crate::scheduler::FrameScheduler).

use crate::allocator::PoolAllocatorDescriptor;
use crate::error::{RhiError, RhiResult};
use crate::executer::{ExecuterDescriptor, JobPolicy};
use crate::types::HardwareQueueClassMask;

/// Configuration for a [`FrameScheduler`](crate::scheduler::FrameScheduler).
///
/// # Example
///
/// ```
/// use redlilium_rhi::{JobPolicy, SchedulerConfig};
///
/// let config = SchedulerConfig::default()
///     .with_transient_heap_size(16 * 1024 * 1024)
///     .with_job_policy(JobPolicy::Parallel)
///     .with_async_queues(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Size of one frame's transient heap block in bytes.
    pub transient_heap_size: u64,
    /// Alignment applied to every transient placement.
    pub transient_heap_alignment: u64,
    /// Number of frames the GPU may still be consuming while the CPU builds a new one.
    pub frames_in_flight: u32,
    /// Collect cycles a freed heap block waits before it can be reused.
    pub garbage_collect_latency: u64,
    /// Base of the virtual address range handed out by the transient pool.
    pub address_base: u64,
    /// Serial or parallel command list recording.
    pub job_policy: JobPolicy,
    /// Worker threads used by [`JobPolicy::Parallel`]. `None` uses available parallelism.
    pub worker_thread_count: Option<usize>,
    /// Upper bound on scopes recorded together in one execute group.
    pub max_scopes_per_group: usize,
    /// Skip cross-queue fence assignment entirely.
    pub disable_async_queues: bool,
    /// Queue classes considered when wiring cross-queue fences.
    pub hardware_queue_classes: HardwareQueueClassMask,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            transient_heap_size: 64 * 1024 * 1024,
            transient_heap_alignment: 256,
            frames_in_flight: 2,
            garbage_collect_latency: 2,
            address_base: 0,
            job_policy: JobPolicy::Serial,
            worker_thread_count: None,
            max_scopes_per_group: 8,
            disable_async_queues: false,
            hardware_queue_classes: HardwareQueueClassMask::all(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transient_heap_size(mut self, size: u64) -> Self {
        self.transient_heap_size = size;
        self
    }

    pub fn with_transient_heap_alignment(mut self, alignment: u64) -> Self {
        self.transient_heap_alignment = alignment;
        self
    }

    /// Set frames in flight. The garbage collect latency follows it.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self.garbage_collect_latency = frames as u64;
        self
    }

    pub fn with_garbage_collect_latency(mut self, latency: u64) -> Self {
        self.garbage_collect_latency = latency;
        self
    }

    pub fn with_address_base(mut self, base: u64) -> Self {
        self.address_base = base;
        self
    }

    pub fn with_job_policy(mut self, policy: JobPolicy) -> Self {
        self.job_policy = policy;
        self
    }

    pub fn with_worker_thread_count(mut self, count: usize) -> Self {
        self.worker_thread_count = Some(count);
        self
    }

    pub fn with_max_scopes_per_group(mut self, count: usize) -> Self {
        self.max_scopes_per_group = count;
        self
    }

    /// Enable or disable cross-queue (async) fence wiring.
    pub fn with_async_queues(mut self, enabled: bool) -> Self {
        self.disable_async_queues = !enabled;
        self
    }

    pub fn with_hardware_queue_classes(mut self, classes: HardwareQueueClassMask) -> Self {
        self.hardware_queue_classes = classes;
        self
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> RhiResult<()> {
        if self.transient_heap_size == 0 {
            return Err(RhiError::InvalidArgument(
                "transient heap size must be non-zero".to_string(),
            ));
        }
        if !self.transient_heap_alignment.is_power_of_two() {
            return Err(RhiError::InvalidArgument(format!(
                "transient heap alignment {} is not a power of two",
                self.transient_heap_alignment
            )));
        }
        if self.transient_heap_size < self.transient_heap_alignment {
            return Err(RhiError::InvalidArgument(format!(
                "transient heap size {} is smaller than its alignment {}",
                self.transient_heap_size, self.transient_heap_alignment
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(RhiError::InvalidArgument(
                "frames in flight must be at least 1".to_string(),
            ));
        }
        if self
            .transient_heap_size
            .checked_mul(self.transient_block_count())
            .and_then(|bytes| bytes.checked_add(self.address_base))
            .is_none()
        {
            return Err(RhiError::InvalidArgument(format!(
                "{} transient heap blocks of {} bytes overflow the address range",
                self.transient_block_count(),
                self.transient_heap_size
            )));
        }
        if self.max_scopes_per_group == 0 {
            return Err(RhiError::InvalidArgument(
                "max scopes per group must be at least 1".to_string(),
            ));
        }
        if self.worker_thread_count == Some(0) {
            return Err(RhiError::InvalidArgument(
                "worker thread count must be at least 1".to_string(),
            ));
        }
        if self.hardware_queue_classes.is_empty() {
            return Err(RhiError::InvalidArgument(
                "at least one hardware queue class must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of heap blocks the transient pool reserves.
    ///
    /// A block freed at the end of a frame stays unavailable for
    /// `garbage_collect_latency` cycles, so the pool needs one block per
    /// retained frame plus the one being built.
    pub fn transient_block_count(&self) -> u64 {
        self.garbage_collect_latency
            .max(self.frames_in_flight as u64)
            .saturating_add(1)
    }

    /// Descriptor for the pool allocator backing transient heap blocks.
    pub fn pool_descriptor(&self) -> PoolAllocatorDescriptor {
        PoolAllocatorDescriptor {
            element_size: self.transient_heap_size,
            capacity_in_bytes: self.transient_heap_size * self.transient_block_count(),
            address_base: self.address_base,
            garbage_collect_latency: self.garbage_collect_latency,
        }
    }

    /// Descriptor for the frame graph executer.
    pub fn executer_descriptor(&self) -> ExecuterDescriptor {
        ExecuterDescriptor {
            job_policy: self.job_policy,
            worker_thread_count: self.worker_thread_count,
            max_scopes_per_group: self.max_scopes_per_group,
        }
    }
}
