//! Frame graph compilation.
//!
//! This module turns a finalized [`FrameGraph`](crate::graph::FrameGraph)
//! into a fenced schedule by assigning cross-queue wait and signal values to
//! its scopes.
//!
//! # Design
//!
//! The compiler does not reorder anything. Scopes keep their declaration
//! order, which is also the submission order. It performs one pass:
//!
//! 1. **Signal** - A scope with a consumer on another queue class signals
//!    `++counter[own queue]` once it completes.
//! 2. **Wait** - A scope with producers on another queue class waits on that
//!    queue for the signal value of the nearest prior producer.
//!
//! Producers on the same queue class need no fence: a hardware queue
//! executes its submissions in order.
//!
//! Fence counters live in the compiler and keep counting across frames. A
//! value is never reused within the lifetime of the process, so a wait can
//! never be satisfied by an older frame's signal.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::compiler::{CompileRequest, FrameGraphCompiler};
//! use redlilium_rhi::{AttachmentAccess, FrameGraph, HardwareQueueClass, HardwareQueueClassMask, Scope};
//!
//! let mut graph = FrameGraph::new();
//! let shadow = graph.create_transient_image("shadow", 4096, 256).unwrap();
//! let render = graph
//!     .add_scope(Scope::new("render", HardwareQueueClass::Graphics).with_attachment(shadow, AttachmentAccess::Write))
//!     .unwrap();
//! let blur = graph
//!     .add_scope(Scope::new("blur", HardwareQueueClass::Compute).with_attachment(shadow, AttachmentAccess::Read))
//!     .unwrap();
//! graph.finalize();
//!
//! let mut compiler = FrameGraphCompiler::new();
//! compiler.compile(&mut graph, HardwareQueueClassMask::all(), CompileRequest::default());
//!
//! assert_eq!(graph.scope(render).signal_fence(), Some(1));
//! assert_eq!(graph.scope(blur).wait_fence(HardwareQueueClass::Graphics), 1);
//! ```

use crate::graph::{FrameGraph, ScopeHandle};
use crate::types::{FenceValues, HardwareQueueClass, HardwareQueueClassMask};

/// Per-compile options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileRequest {
    /// Run everything as if on one queue: no fences are assigned.
    pub disable_async_queues: bool,
}

/// Counters describing one compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStatistics {
    /// Scopes visited.
    pub scope_count: usize,
    /// Scopes that signal a fence.
    pub signal_count: usize,
    /// (scope, queue) pairs with a non-zero wait.
    pub wait_count: usize,
}

/// Assigns cross-queue fence values. Owns the per-queue fence counters.
#[derive(Debug, Default)]
pub struct FrameGraphCompiler {
    fence_counters: FenceValues,
}

impl FrameGraphCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign wait and signal fences to every scope of `graph`.
    ///
    /// Only queue classes in `hardware_queue_classes` take part. Fences from a
    /// previous compile of the same graph are cleared first.
    pub fn compile(
        &mut self,
        graph: &mut FrameGraph,
        hardware_queue_classes: HardwareQueueClassMask,
        request: CompileRequest,
    ) -> CompileStatistics {
        let mut statistics = CompileStatistics {
            scope_count: graph.scope_count(),
            ..Default::default()
        };

        for scope in graph.scopes_mut() {
            scope.clear_fences();
        }

        if request.disable_async_queues {
            log::trace!("FrameGraphCompiler: async queues disabled, no fences assigned");
            return statistics;
        }

        for index in 0..graph.scope_count() {
            let handle = ScopeHandle::new(index as u32);
            let scope = graph.scope(handle);
            let own_queue = scope.queue_class();
            if !hardware_queue_classes.contains_class(own_queue) {
                continue;
            }

            let mut waits = FenceValues::new();
            for queue in HardwareQueueClass::ALL {
                if queue == own_queue || !hardware_queue_classes.contains_class(queue) {
                    continue;
                }
                // Producers are sorted, so the last one is the nearest.
                if let Some(&producer) = scope.producers(queue).last() {
                    if let Some(value) = graph.scope(producer).signal_fence() {
                        waits[queue] = value;
                    }
                }
            }

            let signals = HardwareQueueClass::ALL.iter().any(|&queue| {
                queue != own_queue
                    && hardware_queue_classes.contains_class(queue)
                    && !scope.consumers(queue).is_empty()
            });

            let scope = &mut graph.scopes_mut()[index];
            for (queue, value) in waits.iter() {
                if value != 0 {
                    scope.set_wait_fence(queue, value);
                    statistics.wait_count += 1;
                }
            }
            if signals {
                self.fence_counters[own_queue] += 1;
                let value = self.fence_counters[own_queue];
                scope.set_signal_fence(value);
                statistics.signal_count += 1;
                log::trace!(
                    "FrameGraphCompiler: '{}' signals {} fence {}",
                    scope.name(),
                    own_queue.name(),
                    value
                );
            }
        }

        log::debug!(
            "FrameGraphCompiler: {} scopes, {} signals, {} waits",
            statistics.scope_count,
            statistics.signal_count,
            statistics.wait_count
        );
        statistics
    }

    /// Last fence value signaled on `queue`, zero if none yet.
    pub fn last_signaled(&self, queue: HardwareQueueClass) -> u64 {
        self.fence_counters[queue]
    }

    pub fn fence_counters(&self) -> &FenceValues {
        &self.fence_counters
    }
}
