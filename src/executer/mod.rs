//! Frame graph execution.
//!
//! The [`FrameGraphExecuter`] turns a compiled
//! [`FrameGraph`](crate::graph::FrameGraph) into command list submissions.
//!
//! # Groups
//!
//! Scopes are partitioned into [`ExecuteGroup`]s: contiguous runs of scopes
//! on the same queue class. A group holds at most `max_scopes_per_group`
//! scopes. A scope that waits on a fence always starts a new group and a
//! scope that signals a fence always ends its group, so fences sit on group
//! boundaries.
//!
//! # Recording and submission
//!
//! Groups can be recorded in any order, serially or on worker threads. They
//! are submitted strictly in declaration order: a finished group is marked
//! submittable and then, under the single submission lock, the executer
//! submits groups from the front of the pending queue for as long as the
//! front is submittable.
//!
//! ```text
//! record order:   G2  G0  G1
//! submit order:   --  G0  G1 G2
//! ```
//!
//! Lock order is submission lock, then group lock. Recording only ever holds
//! its own group lock.
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::backend::dummy::{DummyCommandList, DummyQueue};
//! use redlilium_rhi::{ExecuteContext, ExecuterDescriptor, FrameGraph, FrameGraphExecuter, HardwareQueueClass, Scope};
//!
//! let queue = DummyQueue::new();
//! let mut executer = FrameGraphExecuter::new();
//! executer.init(ExecuterDescriptor::default(), queue.clone()).unwrap();
//!
//! let mut graph = FrameGraph::new();
//! graph.add_scope(Scope::new("clear", HardwareQueueClass::Graphics)).unwrap();
//! graph.finalize();
//!
//! executer.execute(&graph, &|_scope: &Scope, context: &mut ExecuteContext<DummyCommandList>| {
//!     context.command_list().push_command("clear");
//! });
//! assert_eq!(queue.submitted_scope_names(), ["clear"]);
//! ```

mod context;
mod group;

pub use context::ExecuteContext;
pub use group::{ExecuteGroup, ExecuteGroupState};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::backend::CommandQueue;
use crate::error::{contract_violation, RhiError, RhiResult};
use crate::graph::{FrameGraph, Scope, ScopeHandle};

/// How execute groups are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobPolicy {
    /// Record every group on the calling thread.
    #[default]
    Serial,
    /// Record groups on scoped worker threads.
    Parallel,
}

/// Parameters for [`FrameGraphExecuter::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuterDescriptor {
    pub job_policy: JobPolicy,
    /// Worker threads for [`JobPolicy::Parallel`]. `None` uses available parallelism.
    pub worker_thread_count: Option<usize>,
    pub max_scopes_per_group: usize,
}

impl Default for ExecuterDescriptor {
    fn default() -> Self {
        Self {
            job_policy: JobPolicy::Serial,
            worker_thread_count: None,
            max_scopes_per_group: 8,
        }
    }
}

/// Fills the command list of one scope.
///
/// Implemented by the pipeline layer. Closures taking a scope and a context
/// implement it too.
pub trait ScopeRecorder<L>: Sync {
    fn record(&self, scope: &Scope, context: &mut ExecuteContext<L>);
}

impl<L, F> ScopeRecorder<L> for F
where
    F: Fn(&Scope, &mut ExecuteContext<L>) + Sync,
{
    fn record(&self, scope: &Scope, context: &mut ExecuteContext<L>) {
        self(scope, context)
    }
}

/// Submission state shared by every group. Guarded by one mutex.
#[derive(Debug)]
struct Submission<Q> {
    queue: Option<Q>,
    /// Group indices not yet submitted, in declaration order.
    pending: VecDeque<usize>,
    /// Set once a group's recording has finished.
    ready: Vec<bool>,
}

impl<Q> Default for Submission<Q> {
    fn default() -> Self {
        Self {
            queue: None,
            pending: VecDeque::new(),
            ready: Vec::new(),
        }
    }
}

type GroupOf<Q> = ExecuteGroup<<Q as CommandQueue>::CommandList>;

/// Records execute groups and submits them in declaration order.
pub struct FrameGraphExecuter<Q: CommandQueue> {
    descriptor: ExecuterDescriptor,
    initialized: bool,
    groups: Vec<Mutex<GroupOf<Q>>>,
    submission: Mutex<Submission<Q>>,
    submitted_count: AtomicUsize,
}

impl<Q: CommandQueue> Default for FrameGraphExecuter<Q> {
    fn default() -> Self {
        Self {
            descriptor: ExecuterDescriptor::default(),
            initialized: false,
            groups: Vec::new(),
            submission: Mutex::new(Submission::default()),
            submitted_count: AtomicUsize::new(0),
        }
    }
}

impl<Q: CommandQueue> FrameGraphExecuter<Q> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the queue and apply the descriptor.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` - the executer is already initialized
    /// * `InvalidArgument` - `max_scopes_per_group` or `worker_thread_count` is zero
    pub fn init(&mut self, descriptor: ExecuterDescriptor, queue: Q) -> RhiResult<()> {
        if self.initialized {
            return Err(RhiError::InvalidOperation(
                "frame graph executer is already initialized".to_string(),
            ));
        }
        if descriptor.max_scopes_per_group == 0 {
            return Err(RhiError::InvalidArgument(
                "max scopes per group must be at least 1".to_string(),
            ));
        }
        if descriptor.worker_thread_count == Some(0) {
            return Err(RhiError::InvalidArgument(
                "worker thread count must be at least 1".to_string(),
            ));
        }

        self.descriptor = descriptor;
        *self.submission.get_mut() = Submission {
            queue: Some(queue),
            ..Default::default()
        };
        self.initialized = true;
        log::debug!(
            "FrameGraphExecuter: initialized ({:?}, up to {} scopes per group)",
            descriptor.job_policy,
            descriptor.max_scopes_per_group
        );
        Ok(())
    }

    /// Release per-frame state and hand the queue back.
    ///
    /// No group may be pending.
    pub fn shutdown(&mut self) -> Option<Q> {
        if !self.initialized {
            return None;
        }
        let submission = self.submission.get_mut();
        if !submission.pending.is_empty() {
            contract_violation!(
                "FrameGraphExecuter: shutdown with {} groups pending",
                submission.pending.len()
            );
            return None;
        }

        self.groups.clear();
        self.initialized = false;
        std::mem::take(submission).queue
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_job_policy(&mut self, policy: JobPolicy) {
        self.descriptor.job_policy = policy;
    }

    pub fn job_policy(&self) -> JobPolicy {
        self.descriptor.job_policy
    }

    pub fn descriptor(&self) -> &ExecuterDescriptor {
        &self.descriptor
    }

    /// Partition the graph's scopes into groups and queue them for submission.
    ///
    /// Fences must already be assigned. No group of a previous frame may
    /// still be pending.
    pub fn begin(&mut self, graph: &FrameGraph) {
        if !self.initialized {
            contract_violation!("FrameGraphExecuter: begin called before init");
            return;
        }
        let submission = self.submission.get_mut();
        if !submission.pending.is_empty() {
            contract_violation!(
                "FrameGraphExecuter: begin with {} groups of the previous frame pending",
                submission.pending.len()
            );
            return;
        }
        let Some(queue) = submission.queue.as_mut() else {
            contract_violation!("FrameGraphExecuter: no queue");
            return;
        };

        let max_scopes = self.descriptor.max_scopes_per_group;
        let mut groups: Vec<GroupOf<Q>> = Vec::new();
        let mut close_current = true;

        for (index, scope) in graph.scopes().iter().enumerate() {
            let starts_group = match groups.last() {
                None => true,
                Some(group) => {
                    close_current
                        || group.queue_class() != scope.queue_class()
                        || group.context_count() >= max_scopes
                        || !scope.wait_fences().is_empty()
                }
            };
            if starts_group {
                groups.push(ExecuteGroup::new(groups.len(), scope.queue_class()));
            }

            let command_list = queue.create_command_list(scope.queue_class());
            if let Some(group) = groups.last_mut() {
                group.push_context(
                    ScopeHandle::new(index as u32),
                    scope.name().to_string(),
                    command_list,
                    scope.wait_fences(),
                    scope.signal_fence(),
                );
            }
            close_current = scope.signal_fence().is_some();
        }

        submission.pending = (0..groups.len()).collect();
        submission.ready = vec![false; groups.len()];
        self.groups = groups.into_iter().map(Mutex::new).collect();

        log::debug!(
            "FrameGraphExecuter: {} scopes in {} groups",
            graph.scope_count(),
            self.groups.len()
        );
    }

    /// Lock a group for recording.
    ///
    /// The returned guard must be dropped before calling
    /// [`end_group`](Self::end_group) for the same group.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn begin_group(&self, index: usize) -> MutexGuard<'_, ExecuteGroup<Q::CommandList>> {
        let group = self.groups[index].lock();
        if group.state() != ExecuteGroupState::Building || group.is_complete() {
            contract_violation!(
                "FrameGraphExecuter: begin_group({}) in state {:?}",
                index,
                group.state()
            );
        }
        log::trace!(
            "FrameGraphExecuter: recording group {} ({} scopes)",
            index,
            group.context_count()
        );
        group
    }

    /// Hand a fully recorded group back and submit every group that is ready.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn end_group(&self, index: usize) {
        {
            let mut group = self.groups[index].lock();
            if group.state() != ExecuteGroupState::Complete {
                contract_violation!(
                    "FrameGraphExecuter: end_group({}) in state {:?}",
                    index,
                    group.state()
                );
                return;
            }
            group.mark_submittable();
        }

        let mut submission = self.submission.lock();
        let submission = &mut *submission;
        submission.ready[index] = true;

        while let Some(&front) = submission.pending.front() {
            if !submission.ready[front] {
                break;
            }
            let request = self.groups[front].lock().take_request();
            log::trace!(
                "FrameGraphExecuter: submitting group {} on {} queue",
                front,
                request.queue_class.name()
            );
            if let Some(queue) = submission.queue.as_mut() {
                queue.execute_work(request);
            }
            submission.pending.pop_front();
            self.submitted_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Finish the frame. Every group must have been submitted.
    pub fn end(&mut self) {
        let submission = self.submission.get_mut();
        if !submission.pending.is_empty() {
            contract_violation!(
                "FrameGraphExecuter: end with {} groups not submitted",
                submission.pending.len()
            );
            return;
        }
        submission.ready.clear();
        self.groups.clear();
    }

    /// Record and submit every scope of `graph` with the configured job policy.
    pub fn execute<R>(&mut self, graph: &FrameGraph, recorder: &R)
    where
        R: ScopeRecorder<Q::CommandList>,
    {
        self.begin(graph);

        let group_count = self.groups.len();
        match self.descriptor.job_policy {
            JobPolicy::Serial => {
                for index in 0..group_count {
                    self.record_group(index, graph, recorder);
                }
            }
            JobPolicy::Parallel => {
                let workers = self
                    .descriptor
                    .worker_thread_count
                    .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
                    .min(group_count)
                    .max(1);
                let next = AtomicUsize::new(0);
                let this = &*self;

                std::thread::scope(|scope| {
                    for _ in 0..workers {
                        scope.spawn(|| loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            if index >= group_count {
                                break;
                            }
                            this.record_group(index, graph, recorder);
                        });
                    }
                });
            }
        }

        self.end();
    }

    fn record_group<R>(&self, index: usize, graph: &FrameGraph, recorder: &R)
    where
        R: ScopeRecorder<Q::CommandList>,
    {
        {
            let mut group = self.begin_group(index);
            for context_index in 0..group.context_count() {
                let scope = graph.scope(group.context(context_index).scope());
                let context = group.begin_context(context_index);
                recorder.record(scope, context);
                group.end_context(context_index);
            }
        }
        self.end_group(index);
    }

    /// Groups of the current frame.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Groups submitted since init.
    pub fn submitted_count(&self) -> usize {
        self.submitted_count.load(Ordering::Relaxed)
    }

    /// Groups of the current frame not yet submitted.
    pub fn pending_count(&self) -> usize {
        self.submission.lock().pending.len()
    }
}

impl<Q: CommandQueue> std::fmt::Debug for FrameGraphExecuter<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraphExecuter")
            .field("descriptor", &self.descriptor)
            .field("initialized", &self.initialized)
            .field("group_count", &self.groups.len())
            .field("submitted_count", &self.submitted_count())
            .finish()
    }
}
