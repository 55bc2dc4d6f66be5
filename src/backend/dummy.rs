//! Dummy backend for testing and development.
//!
//! This backend doesn't touch a GPU. Submissions complete immediately and
//! every request is recorded so tests can inspect what the scheduler did.
//! [`DummyQueue`] is cheap to clone and all clones share the same record, so
//! a test can keep one clone while the executer owns another.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::aliasing::{AliasedResource, AliasingBarrierBackend, AliasingOverlap};
use crate::graph::AttachmentHandle;
use crate::types::{FenceValues, HardwareQueueClass};

use super::{CommandList, CommandQueue, ExecuteWorkRequest};

/// Command list that stores the commands pushed into it.
#[derive(Debug, Default)]
pub struct DummyCommandList {
    queue_class: HardwareQueueClass,
    scope_name: Option<String>,
    open: bool,
    commands: Vec<String>,
}

impl DummyCommandList {
    pub fn new(queue_class: HardwareQueueClass) -> Self {
        Self {
            queue_class,
            ..Default::default()
        }
    }

    /// Record a fake command.
    pub fn push_command(&mut self, command: impl Into<String>) {
        debug_assert!(self.open, "recording into a closed command list");
        self.commands.push(command.into());
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// Scope the list was last opened for.
    pub fn scope_name(&self) -> Option<&str> {
        self.scope_name.as_deref()
    }
}

impl CommandList for DummyCommandList {
    fn open(&mut self, scope_name: &str) {
        self.scope_name = Some(scope_name.to_string());
        self.open = true;
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// A submission as seen by the dummy queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedWork {
    pub group_index: usize,
    pub queue_class: HardwareQueueClass,
    pub scope_names: Vec<String>,
    /// Commands of every list in the group, flattened in scope order.
    pub commands: Vec<String>,
    pub wait_fences: FenceValues,
    pub signal_fence: Option<u64>,
    /// Whether every wait was already signaled when the work arrived.
    pub waits_satisfied: bool,
}

#[derive(Debug, Default)]
struct DummyQueueState {
    submissions: Vec<SubmittedWork>,
    signaled: FenceValues,
    command_lists_created: usize,
}

/// Queue that completes every submission on arrival.
#[derive(Debug, Clone, Default)]
pub struct DummyQueue {
    state: Arc<Mutex<DummyQueueState>>,
}

impl DummyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Every submission so far, in arrival order.
    pub fn submissions(&self) -> Vec<SubmittedWork> {
        self.state.lock().submissions.clone()
    }

    /// Scope names of every submission, flattened in arrival order.
    pub fn submitted_scope_names(&self) -> Vec<String> {
        self.state
            .lock()
            .submissions
            .iter()
            .flat_map(|work| work.scope_names.iter().cloned())
            .collect()
    }

    /// Highest fence value signaled per queue class.
    pub fn signaled(&self) -> FenceValues {
        self.state.lock().signaled
    }

    pub fn command_lists_created(&self) -> usize {
        self.state.lock().command_lists_created
    }

    pub fn clear(&self) {
        self.state.lock().submissions.clear();
    }
}

impl CommandQueue for DummyQueue {
    type CommandList = DummyCommandList;

    fn create_command_list(&mut self, queue_class: HardwareQueueClass) -> DummyCommandList {
        self.state.lock().command_lists_created += 1;
        DummyCommandList::new(queue_class)
    }

    fn execute_work(&mut self, request: ExecuteWorkRequest<DummyCommandList>) {
        let mut state = self.state.lock();

        let waits_satisfied = request
            .wait_fences
            .iter()
            .all(|(queue, value)| state.signaled[queue] >= value);
        if !waits_satisfied {
            log::warn!(
                "DummyQueue: group {} waits on {:?} but only {:?} is signaled",
                request.group_index,
                request.wait_fences,
                state.signaled
            );
        }

        if let Some(value) = request.signal_fence {
            let signaled = &mut state.signaled[request.queue_class];
            *signaled = (*signaled).max(value);
        }

        log::trace!(
            "DummyQueue: executing group {} on {} queue ({} lists)",
            request.group_index,
            request.queue_class.name(),
            request.command_lists.len()
        );

        let commands = request
            .command_lists
            .iter()
            .flat_map(|list| list.commands().iter().cloned())
            .collect();
        state.submissions.push(SubmittedWork {
            group_index: request.group_index,
            queue_class: request.queue_class,
            scope_names: request.scope_names,
            commands,
            wait_fences: request.wait_fences,
            signal_fence: request.signal_fence,
            waits_satisfied,
        });
    }
}

/// An aliasing barrier as seen by the dummy barrier backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedBarrier {
    pub before: AttachmentHandle,
    pub after: AttachmentHandle,
    pub overlap: AliasingOverlap,
}

/// Barrier backend that records every request.
#[derive(Debug, Default)]
pub struct DummyBarrierBackend {
    barriers: Vec<RecordedBarrier>,
}

impl DummyBarrierBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn barriers(&self) -> &[RecordedBarrier] {
        &self.barriers
    }

    pub fn clear(&mut self) {
        self.barriers.clear();
    }
}

impl AliasingBarrierBackend for DummyBarrierBackend {
    fn append_barrier_internal(
        &mut self,
        before: &AliasedResource,
        after: &AliasedResource,
        overlap: AliasingOverlap,
    ) {
        self.barriers.push(RecordedBarrier {
            before: before.attachment,
            after: after.attachment,
            overlap,
        });
    }
}
