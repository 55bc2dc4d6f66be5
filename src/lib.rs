//! # RedLilium RHI
//!
//! Frame graph scheduling and transient resource aliasing for the RedLilium
//! render hardware interface.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - Scopes, attachments and their hazards for one frame
//! - [`PoolAllocator`] - Fixed-size slot allocation with deferred reuse
//! - [`AliasingBarrierTracker`] - Barriers between transients sharing memory
//! - [`FrameGraphCompiler`] - Cross-queue wait and signal fences
//! - [`FrameGraphExecuter`] - Parallel recording, ordered submission
//! - [`FrameScheduler`] - Owns all of the above and drives one frame at a time
//!
//! Native backends plug in through the traits in [`backend`]. The
//! [`backend::dummy`] backend records everything and needs no GPU.
//!
//! ## Example
//!
//! ```
//! use redlilium_rhi::backend::dummy::{DummyBarrierBackend, DummyCommandList, DummyQueue};
//! use redlilium_rhi::{
//!     AttachmentAccess, ExecuteContext, FrameScheduler, HardwareQueueClass, Scope, SchedulerConfig,
//! };
//!
//! redlilium_rhi::init();
//! let queue = DummyQueue::new();
//! let mut scheduler =
//!     FrameScheduler::new(SchedulerConfig::default(), queue.clone(), DummyBarrierBackend::new()).unwrap();
//!
//! let mut graph = scheduler.begin_frame().unwrap();
//! let depth = graph.create_transient_image("depth", 1 << 16, 256).unwrap();
//! graph
//!     .add_scope(Scope::new("prepass", HardwareQueueClass::Graphics).with_attachment(depth, AttachmentAccess::Write))
//!     .unwrap();
//! graph
//!     .add_scope(Scope::new("ssao", HardwareQueueClass::Compute).with_attachment(depth, AttachmentAccess::Read))
//!     .unwrap();
//!
//! scheduler.compile(&mut graph).unwrap();
//! scheduler
//!     .execute(&graph, &|scope: &Scope, context: &mut ExecuteContext<DummyCommandList>| {
//!         context.command_list().push_command(scope.name());
//!     })
//!     .unwrap();
//! scheduler.end_frame();
//!
//! assert_eq!(queue.submitted_scope_names(), ["prepass", "ssao"]);
//! ```

pub mod aliasing;
pub mod allocator;
pub mod backend;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executer;
pub mod graph;
pub mod scheduler;
pub mod transient;
pub mod types;

// Re-export main types for convenience
pub use aliasing::{
    get_overlap, AliasedResource, AliasingBarrierBackend, AliasingBarrierTracker, AliasingOverlap,
};
pub use allocator::{PoolAllocator, PoolAllocatorDescriptor, VirtualAddress};
pub use backend::{CommandList, CommandQueue, ExecuteWorkRequest};
pub use compiler::{CompileRequest, CompileStatistics, FrameGraphCompiler};
pub use config::SchedulerConfig;
pub use error::{RhiError, RhiResult};
pub use executer::{
    ExecuteContext, ExecuteGroup, ExecuteGroupState, ExecuterDescriptor, FrameGraphExecuter,
    JobPolicy, ScopeRecorder,
};
pub use graph::{
    Attachment, AttachmentHandle, AttachmentLifetime, FrameGraph, GraphError, Scope,
    ScopeAttachment, ScopeHandle,
};
pub use scheduler::{FrameScheduler, FrameStatistics};
pub use transient::{TransientAttachmentPool, TransientPlacement, TransientStatistics};
pub use types::{
    AttachmentAccess, AttachmentKind, FenceValues, HardwareQueueClass, HardwareQueueClassMask,
    ResourceHandle, QUEUE_CLASS_COUNT,
};

/// RHI library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the RHI.
///
/// Only logs the version. Logging must be set up by the caller.
pub fn init() {
    log::info!("RedLilium RHI v{} initialized", VERSION);
}
