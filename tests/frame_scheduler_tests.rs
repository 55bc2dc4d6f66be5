//! End-to-end tests for the frame scheduler on the dummy backend.
//!
//! # Test Categories
//!
//! - **Aliasing**: transient memory reuse and the barriers it produces
//! - **Fences**: cross-queue waits match producer signals, across frames
//! - **Frames**: heap block rotation and dropped frames

mod common;

use rstest::rstest;

use common::{create_scheduler, reader, record_scope_name, small_config, writer};
use redlilium_rhi::backend::dummy::RecordedBarrier;
use redlilium_rhi::{
    AliasingOverlap, AttachmentAccess, HardwareQueueClass, JobPolicy, RhiError, Scope,
};

// ============================================================================
// Aliasing
// ============================================================================

/// A writes X on graphics, B reads X on compute, C writes Y on graphics and
/// Y reuses X's memory.
#[rstest]
#[case::serial(JobPolicy::Serial)]
#[case::parallel(JobPolicy::Parallel)]
fn test_end_to_end_aliasing_and_fences(#[case] policy: JobPolicy) {
    let (mut scheduler, queue) = create_scheduler(small_config().with_job_policy(policy));

    let mut graph = scheduler.begin_frame().unwrap();
    let x = graph.create_transient_image("x", 4096, 256).unwrap();
    let y = graph.create_transient_image("y", 4096, 256).unwrap();
    let a = writer(&mut graph, "a", HardwareQueueClass::Graphics, x);
    let b = reader(&mut graph, "b", HardwareQueueClass::Compute, x);
    let c = writer(&mut graph, "c", HardwareQueueClass::Graphics, y);

    let stats = scheduler.compile(&mut graph).unwrap();

    // Y took over X's range
    let px = scheduler.placement(x).unwrap();
    let py = scheduler.placement(y).unwrap();
    assert_eq!(px.address, py.address);
    assert_eq!(stats.transient.aliased_count, 1);

    // exactly one barrier, X -> Y, complete overlap
    assert_eq!(stats.barrier_count, 1);
    assert_eq!(
        scheduler.barrier_backend().barriers(),
        &[RecordedBarrier {
            before: x,
            after: y,
            overlap: AliasingOverlap::Complete,
        }]
    );

    // B waits on A's signal
    let a_signal = graph.scope(a).signal_fence().unwrap();
    assert_eq!(graph.scope(b).wait_fence(HardwareQueueClass::Graphics), a_signal);
    // C waits for B before reusing the memory
    let b_signal = graph.scope(b).signal_fence().unwrap();
    assert_eq!(graph.scope(c).wait_fence(HardwareQueueClass::Compute), b_signal);

    scheduler.execute(&graph, &record_scope_name).unwrap();
    scheduler.end_frame();

    let submissions = queue.submissions();
    assert_eq!(queue.submitted_scope_names(), ["a", "b", "c"]);
    assert!(submissions.iter().all(|work| work.waits_satisfied));
    let commands: Vec<String> = submissions.iter().flat_map(|w| w.commands.clone()).collect();
    assert_eq!(commands, ["a", "b", "c"]);
}

#[test]
fn test_barriers_emitted_once_per_pair() {
    let (mut scheduler, _) = create_scheduler(small_config());

    let mut graph = scheduler.begin_frame().unwrap();
    let first = graph.create_transient_buffer("first", 8192, 256).unwrap();
    let second = graph.create_transient_buffer("second", 8192, 256).unwrap();
    writer(&mut graph, "produce", HardwareQueueClass::Graphics, first);
    reader(&mut graph, "consume", HardwareQueueClass::Graphics, first);
    graph
        .add_scope(
            Scope::new("reuse", HardwareQueueClass::Graphics)
                .with_attachment(second, AttachmentAccess::Write)
                .with_estimated_item_count(4),
        )
        .unwrap();
    reader(&mut graph, "reuse_read", HardwareQueueClass::Graphics, second);

    scheduler.compile(&mut graph).unwrap();
    assert_eq!(scheduler.barrier_backend().barriers().len(), 1);
    assert_eq!(scheduler.tracker().barrier_count(), 1);
    // same queue, no aliasing fence
    assert_eq!(scheduler.last_statistics().transient.aliasing_dependency_count, 0);
    scheduler.end_frame();
}

#[test]
fn test_overlapping_lifetimes_never_alias() {
    let (mut scheduler, _) = create_scheduler(small_config());

    let mut graph = scheduler.begin_frame().unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| graph.create_transient_image(format!("rt{i}"), 4096, 256).unwrap())
        .collect();
    let mut scope = Scope::new("mrt", HardwareQueueClass::Graphics);
    for &handle in &handles {
        scope.use_attachment(handle, AttachmentAccess::Write);
    }
    graph.add_scope(scope).unwrap();

    let stats = scheduler.compile(&mut graph).unwrap();
    assert_eq!(stats.transient.placed_count, 4);
    assert_eq!(stats.transient.aliased_count, 0);
    assert_eq!(stats.barrier_count, 0);

    let mut ranges: Vec<_> = handles
        .iter()
        .map(|&h| scheduler.placement(h).unwrap())
        .map(|p| (p.address, p.address + p.size))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "ranges overlap: {:?}", pair);
    }
    scheduler.end_frame();
}

// ============================================================================
// Fences
// ============================================================================

#[test]
fn test_fence_values_increase_across_frames() {
    let (mut scheduler, queue) = create_scheduler(small_config());
    let mut previous = 0;

    for _ in 0..4 {
        let mut graph = scheduler.begin_frame().unwrap();
        let data = graph.create_transient_buffer("data", 1024, 256).unwrap();
        let upload = writer(&mut graph, "upload", HardwareQueueClass::Copy, data);
        let render = reader(&mut graph, "render", HardwareQueueClass::Graphics, data);
        scheduler.compile(&mut graph).unwrap();

        let signal = graph.scope(upload).signal_fence().unwrap();
        assert!(signal > previous);
        assert_eq!(graph.scope(render).wait_fence(HardwareQueueClass::Copy), signal);
        previous = signal;

        scheduler.execute(&graph, &record_scope_name).unwrap();
        scheduler.end_frame();
    }

    assert_eq!(scheduler.compiler().last_signaled(HardwareQueueClass::Copy), previous);
    assert_eq!(queue.signaled()[HardwareQueueClass::Copy], previous);
    assert!(queue.submissions().iter().all(|work| work.waits_satisfied));
}

#[test]
fn test_disabled_async_queues_submit_without_fences() {
    let (mut scheduler, queue) = create_scheduler(small_config().with_async_queues(false));

    let mut graph = scheduler.begin_frame().unwrap();
    let x = graph.create_transient_image("x", 1024, 256).unwrap();
    writer(&mut graph, "a", HardwareQueueClass::Graphics, x);
    reader(&mut graph, "b", HardwareQueueClass::Compute, x);
    let stats = scheduler.compile(&mut graph).unwrap();
    assert_eq!(stats.compile.signal_count, 0);

    scheduler.execute(&graph, &record_scope_name).unwrap();
    scheduler.end_frame();

    let submissions = queue.submissions();
    assert!(submissions.iter().all(|work| work.signal_fence.is_none()));
    assert!(submissions.iter().all(|work| work.wait_fences.is_empty()));
}

// ============================================================================
// Frames
// ============================================================================

#[test]
fn test_graph_errors_surface_through_scheduler() {
    let (mut scheduler, _) = create_scheduler(small_config());
    let mut graph = scheduler.begin_frame().unwrap();
    let a = graph
        .add_scope(Scope::new("a", HardwareQueueClass::Graphics))
        .unwrap();
    let b = graph
        .add_scope(Scope::new("b", HardwareQueueClass::Graphics))
        .unwrap();

    let err: RhiError = graph.add_dependency(a, b).unwrap_err().into();
    assert!(matches!(err, RhiError::Graph(_)));
    scheduler.end_frame();
}

#[test]
fn test_heap_blocks_are_recycled_after_latency() {
    let config = small_config().with_frames_in_flight(2);
    let (mut scheduler, _) = create_scheduler(config);
    let mut blocks = Vec::new();

    for _ in 0..6 {
        let mut graph = scheduler.begin_frame().unwrap();
        let x = graph.create_transient_image("x", 256, 256).unwrap();
        writer(&mut graph, "draw", HardwareQueueClass::Graphics, x);
        scheduler.compile(&mut graph).unwrap();
        blocks.push(scheduler.transient_pool().block_address());
        scheduler.end_frame();
    }

    // a freed block waits out the latency before the next frame can take it
    for window in blocks.windows(2) {
        assert_ne!(window[0], window[1]);
    }
    assert_eq!(blocks[0], blocks[2]);
    assert_eq!(blocks[1], blocks[3]);
}
