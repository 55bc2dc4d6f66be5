//! Backend abstraction layer.
//!
//! The scheduler never encodes native commands itself. It talks to a backend
//! through the small traits below:
//!
//! - [`CommandList`] - one per scope, opened and closed around recording
//! - [`CommandQueue`] - creates command lists and submits execute groups
//! - [`AliasingBarrierBackend`](crate::aliasing::AliasingBarrierBackend) -
//!   receives aliasing barrier requests
//!
//! The [`dummy`] backend implements all of them without a GPU and records
//! what it was asked to do.

pub mod dummy;

use crate::types::{FenceValues, HardwareQueueClass};

/// A native command list recording the work of one scope.
pub trait CommandList: Send {
    /// Start recording for the named scope.
    fn open(&mut self, scope_name: &str);

    /// Finish recording.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// One execute group handed to the queue for submission.
#[derive(Debug)]
pub struct ExecuteWorkRequest<L> {
    /// Position of the group in submission order for this frame.
    pub group_index: usize,
    pub queue_class: HardwareQueueClass,
    /// Recorded command lists in scope order.
    pub command_lists: Vec<L>,
    /// Names of the scopes recorded into `command_lists`.
    pub scope_names: Vec<String>,
    /// Per queue class fence values to wait for before the group starts.
    pub wait_fences: FenceValues,
    /// Fence value to signal on `queue_class` when the group completes.
    pub signal_fence: Option<u64>,
}

/// A native submission queue set.
///
/// Implementations must accept [`execute_work`](Self::execute_work) calls in
/// the order they arrive. The executer guarantees that order is the frame's
/// declaration order.
pub trait CommandQueue: Send {
    type CommandList: CommandList;

    /// Create a command list for a scope running on `queue_class`.
    fn create_command_list(&mut self, queue_class: HardwareQueueClass) -> Self::CommandList;

    /// Submit one group of recorded command lists.
    fn execute_work(&mut self, request: ExecuteWorkRequest<Self::CommandList>);
}
