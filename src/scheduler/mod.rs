//! Frame scheduling.
//!
//! [`FrameScheduler`] owns every piece of state that outlives a single frame
//! and drives one frame through its stages:
//!
//! | Stage | Call | Work |
//! |-------|------|------|
//! | Begin | [`begin_frame`](FrameScheduler::begin_frame) | Reset the barrier tracker, take a transient heap block |
//! | Build | client code | Declare attachments and scopes on the [`FrameGraph`] |
//! | Compile | [`compile`](FrameScheduler::compile) | Finalize, place transients, emit aliasing barriers, assign fences |
//! | Execute | [`execute`](FrameScheduler::execute) | Record and submit execute groups |
//! | End | [`end_frame`](FrameScheduler::end_frame) | Release the heap block, advance the frame counter |
//!
//! A frame whose compile fails is dropped: call `end_frame` and carry on with
//! the next one.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::backend::dummy::{DummyBarrierBackend, DummyCommandList, DummyQueue};
//! use redlilium_rhi::{
//!     AttachmentAccess, ExecuteContext, FrameScheduler, HardwareQueueClass, Scope, SchedulerConfig,
//! };
//!
//! let config = SchedulerConfig::default().with_transient_heap_size(1 << 20);
//! let mut scheduler = FrameScheduler::new(config, DummyQueue::new(), DummyBarrierBackend::new()).unwrap();
//!
//! let mut graph = scheduler.begin_frame().unwrap();
//! let hdr = graph.create_transient_image("hdr", 4096, 256).unwrap();
//! graph
//!     .add_scope(Scope::new("lighting", HardwareQueueClass::Graphics).with_attachment(hdr, AttachmentAccess::Write))
//!     .unwrap();
//!
//! let stats = scheduler.compile(&mut graph).unwrap();
//! assert_eq!(stats.transient.placed_count, 1);
//!
//! scheduler
//!     .execute(&graph, &|_scope: &Scope, _context: &mut ExecuteContext<DummyCommandList>| {})
//!     .unwrap();
//! scheduler.end_frame();
//! assert_eq!(scheduler.frame_count(), 1);
//! ```

use crate::aliasing::{AliasingBarrierBackend, AliasingBarrierTracker};
use crate::backend::CommandQueue;
use crate::compiler::{CompileRequest, CompileStatistics, FrameGraphCompiler};
use crate::config::SchedulerConfig;
use crate::error::{RhiError, RhiResult};
use crate::executer::{FrameGraphExecuter, ScopeRecorder};
use crate::graph::{AttachmentHandle, FrameGraph};
use crate::transient::{TransientAttachmentPool, TransientPlacement, TransientStatistics};

/// What compiling one frame produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    pub frame_index: u64,
    pub scope_count: usize,
    pub attachment_count: usize,
    pub transient: TransientStatistics,
    /// Aliasing barriers emitted to the backend.
    pub barrier_count: usize,
    pub compile: CompileStatistics,
}

/// Owns the cross-frame scheduling state and drives frames through it.
pub struct FrameScheduler<Q: CommandQueue, B: AliasingBarrierBackend> {
    config: SchedulerConfig,
    transient: TransientAttachmentPool,
    tracker: AliasingBarrierTracker,
    compiler: FrameGraphCompiler,
    executer: FrameGraphExecuter<Q>,
    barrier_backend: B,
    frame_count: u64,
    frame_in_flight: bool,
    /// Set once the current frame's graph went through `compile`.
    frame_compiled: bool,
    last_statistics: FrameStatistics,
}

impl<Q: CommandQueue, B: AliasingBarrierBackend> FrameScheduler<Q, B> {
    /// Build the scheduler from a validated configuration.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - the configuration failed validation
    pub fn new(config: SchedulerConfig, queue: Q, barrier_backend: B) -> RhiResult<Self> {
        config.validate()?;

        let transient =
            TransientAttachmentPool::new(config.pool_descriptor(), config.transient_heap_alignment)?;
        let mut executer = FrameGraphExecuter::new();
        executer.init(config.executer_descriptor(), queue)?;

        log::info!(
            "FrameScheduler: {} byte transient heap, {} frames in flight, {:?} recording",
            config.transient_heap_size,
            config.frames_in_flight,
            config.job_policy
        );

        Ok(Self {
            config,
            transient,
            tracker: AliasingBarrierTracker::new(),
            compiler: FrameGraphCompiler::new(),
            executer,
            barrier_backend,
            frame_count: 0,
            frame_in_flight: false,
            frame_compiled: false,
            last_statistics: FrameStatistics::default(),
        })
    }

    /// Start a frame and hand out its empty graph.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` - the previous frame was not ended
    /// * `OutOfMemory` - every transient heap block is still in use
    pub fn begin_frame(&mut self) -> RhiResult<FrameGraph> {
        if self.frame_in_flight {
            return Err(RhiError::InvalidOperation(format!(
                "frame {} was not ended",
                self.frame_count
            )));
        }
        self.tracker.reset();
        self.transient.begin_frame()?;
        self.frame_in_flight = true;
        self.frame_compiled = false;
        log::trace!("FrameScheduler: begin frame {}", self.frame_count);
        Ok(FrameGraph::for_frame(self.frame_count))
    }

    /// Finalize the graph, place transients, emit barriers and assign fences.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` - no frame in flight, or this frame was already compiled
    /// * `OutOfTransientMemory` - the transients do not fit in the heap block
    pub fn compile(&mut self, graph: &mut FrameGraph) -> RhiResult<FrameStatistics> {
        self.check_frame(graph)?;
        if self.frame_compiled {
            return Err(RhiError::InvalidOperation(format!(
                "frame {} was already compiled",
                self.frame_count
            )));
        }
        self.frame_compiled = true;

        graph.finalize();
        if let Err(err) = self.transient.place(graph, &mut self.tracker) {
            log::warn!("FrameScheduler: dropping frame {}: {}", self.frame_count, err);
            return Err(err);
        }
        let barrier_count = self.tracker.end(&mut self.barrier_backend);
        let compile = self.compiler.compile(
            graph,
            self.config.hardware_queue_classes,
            CompileRequest {
                disable_async_queues: self.config.disable_async_queues,
            },
        );

        self.last_statistics = FrameStatistics {
            frame_index: self.frame_count,
            scope_count: graph.scope_count(),
            attachment_count: graph.attachment_count(),
            transient: *self.transient.statistics(),
            barrier_count,
            compile,
        };
        log::debug!(
            "FrameScheduler: frame {} compiled, {} scopes, {} transients, {} barriers",
            self.frame_count,
            self.last_statistics.scope_count,
            self.last_statistics.transient.placed_count,
            barrier_count
        );
        Ok(self.last_statistics)
    }

    /// Record and submit a compiled graph.
    pub fn execute<R>(&mut self, graph: &FrameGraph, recorder: &R) -> RhiResult<()>
    where
        R: ScopeRecorder<Q::CommandList>,
    {
        self.check_frame(graph)?;
        if !graph.is_finalized() {
            return Err(RhiError::InvalidOperation(
                "frame graph must be compiled before execution".to_string(),
            ));
        }
        self.executer.execute(graph, recorder);
        Ok(())
    }

    /// Finish the current frame. Its heap block is reused after the latency.
    pub fn end_frame(&mut self) {
        if !self.frame_in_flight {
            log::warn!("FrameScheduler: end_frame without begin_frame");
            return;
        }
        self.transient.end_frame();
        self.frame_in_flight = false;
        self.frame_compiled = false;
        self.frame_count += 1;
    }

    /// Tear everything down and hand the queue back.
    pub fn shutdown(&mut self) -> Option<Q> {
        if self.frame_in_flight {
            self.end_frame();
        }
        self.tracker.reset();
        self.transient.shutdown();
        self.executer.shutdown()
    }

    fn check_frame(&self, graph: &FrameGraph) -> RhiResult<()> {
        if !self.frame_in_flight {
            return Err(RhiError::InvalidOperation(
                "no frame in flight".to_string(),
            ));
        }
        if graph.frame_index() != self.frame_count {
            return Err(RhiError::InvalidArgument(format!(
                "graph belongs to frame {}, current frame is {}",
                graph.frame_index(),
                self.frame_count
            )));
        }
        Ok(())
    }

    /// Placement of a transient attachment in the current frame.
    pub fn placement(&self, attachment: AttachmentHandle) -> Option<TransientPlacement> {
        self.transient.placement(attachment)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Frames ended so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_frame_in_flight(&self) -> bool {
        self.frame_in_flight
    }

    pub fn last_statistics(&self) -> &FrameStatistics {
        &self.last_statistics
    }

    pub fn transient_pool(&self) -> &TransientAttachmentPool {
        &self.transient
    }

    pub fn tracker(&self) -> &AliasingBarrierTracker {
        &self.tracker
    }

    pub fn compiler(&self) -> &FrameGraphCompiler {
        &self.compiler
    }

    pub fn executer(&self) -> &FrameGraphExecuter<Q> {
        &self.executer
    }

    pub fn executer_mut(&mut self) -> &mut FrameGraphExecuter<Q> {
        &mut self.executer
    }

    pub fn barrier_backend(&self) -> &B {
        &self.barrier_backend
    }

    pub fn barrier_backend_mut(&mut self) -> &mut B {
        &mut self.barrier_backend
    }
}
