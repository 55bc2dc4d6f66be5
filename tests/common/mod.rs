//! Common utilities for scheduler integration tests.
//!
//! Everything runs on the dummy backend, so no GPU is needed.

#![allow(dead_code)]

use redlilium_rhi::backend::dummy::{DummyBarrierBackend, DummyCommandList, DummyQueue};
use redlilium_rhi::{
    AttachmentAccess, AttachmentHandle, ExecuteContext, FrameGraph, FrameScheduler,
    HardwareQueueClass, Scope, ScopeHandle, SchedulerConfig,
};

pub type TestScheduler = FrameScheduler<DummyQueue, DummyBarrierBackend>;

/// Install a test logger once. Set `RUST_LOG=trace` to see scheduler events.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scheduler on the dummy backend plus a handle to inspect its submissions.
pub fn create_scheduler(config: SchedulerConfig) -> (TestScheduler, DummyQueue) {
    init_logging();
    let queue = DummyQueue::new();
    let scheduler = FrameScheduler::new(config, queue.clone(), DummyBarrierBackend::new())
        .expect("scheduler config should be valid");
    (scheduler, queue)
}

/// Small heap config used by most tests.
pub fn small_config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_transient_heap_size(64 * 1024)
        .with_transient_heap_alignment(256)
}

pub fn writer(
    graph: &mut FrameGraph,
    name: &str,
    queue: HardwareQueueClass,
    attachment: AttachmentHandle,
) -> ScopeHandle {
    graph
        .add_scope(Scope::new(name, queue).with_attachment(attachment, AttachmentAccess::Write))
        .expect("scope should be accepted")
}

pub fn reader(
    graph: &mut FrameGraph,
    name: &str,
    queue: HardwareQueueClass,
    attachment: AttachmentHandle,
) -> ScopeHandle {
    graph
        .add_scope(Scope::new(name, queue).with_attachment(attachment, AttachmentAccess::Read))
        .expect("scope should be accepted")
}

/// Recorder that pushes one command named after the scope.
pub fn record_scope_name(scope: &Scope, context: &mut ExecuteContext<DummyCommandList>) {
    context.command_list().push_command(scope.name());
}
