//! Execute groups.

use crate::backend::{CommandList, ExecuteWorkRequest};
use crate::error::contract_violation;
use crate::graph::ScopeHandle;
use crate::types::{FenceValues, HardwareQueueClass};

use super::context::{ContextState, ExecuteContext};

/// Lifecycle of an [`ExecuteGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteGroupState {
    /// Contexts are being recorded.
    Building,
    /// Every context has ended.
    Complete,
    /// Handed back to the executer, waiting for earlier groups.
    Submittable,
    /// Passed to the queue.
    Submitted,
}

/// A contiguous run of scopes on one queue class, recorded and submitted together.
#[derive(Debug)]
pub struct ExecuteGroup<L> {
    index: usize,
    queue_class: HardwareQueueClass,
    contexts: Vec<ExecuteContext<L>>,
    wait_fences: FenceValues,
    signal_fence: Option<u64>,
    state: ExecuteGroupState,
    ended_count: usize,
}

impl<L: CommandList> ExecuteGroup<L> {
    pub(crate) fn new(index: usize, queue_class: HardwareQueueClass) -> Self {
        Self {
            index,
            queue_class,
            contexts: Vec::new(),
            wait_fences: FenceValues::new(),
            signal_fence: None,
            state: ExecuteGroupState::Building,
            ended_count: 0,
        }
    }

    pub(crate) fn push_context(
        &mut self,
        scope: ScopeHandle,
        scope_name: String,
        command_list: L,
        wait_fences: &FenceValues,
        signal_fence: Option<u64>,
    ) {
        self.contexts
            .push(ExecuteContext::new(scope, scope_name, command_list));
        self.wait_fences.merge_max(wait_fences);
        if signal_fence.is_some() {
            self.signal_fence = signal_fence;
        }
    }

    /// Position of the group in submission order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    pub fn state(&self) -> ExecuteGroupState {
        self.state
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Context of the `index`-th scope in the group.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn context(&self, index: usize) -> &ExecuteContext<L> {
        &self.contexts[index]
    }

    /// Scopes in the group, in declaration order.
    pub fn scopes(&self) -> impl Iterator<Item = ScopeHandle> + '_ {
        self.contexts.iter().map(|context| context.scope())
    }

    pub fn wait_fences(&self) -> &FenceValues {
        &self.wait_fences
    }

    pub fn signal_fence(&self) -> Option<u64> {
        self.signal_fence
    }

    /// Open the command list of the `index`-th scope.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn begin_context(&mut self, index: usize) -> &mut ExecuteContext<L> {
        let state = self.state;
        let context = &mut self.contexts[index];
        if state != ExecuteGroupState::Building {
            contract_violation!(
                "ExecuteGroup {}: begin_context({}) in state {:?}",
                self.index,
                index,
                state
            );
            return context;
        }
        if context.state() != ContextState::Pending {
            contract_violation!(
                "ExecuteGroup {}: context '{}' was already begun",
                self.index,
                context.scope_name()
            );
            return context;
        }

        let name = context.scope_name().to_string();
        context.command_list().open(&name);
        context.set_state(ContextState::Recording);
        context
    }

    /// Close the command list of the `index`-th scope.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn end_context(&mut self, index: usize) {
        let context = &mut self.contexts[index];
        if context.state() != ContextState::Recording {
            contract_violation!(
                "ExecuteGroup {}: end_context on '{}' which is not recording",
                self.index,
                context.scope_name()
            );
            return;
        }

        context.command_list().close();
        context.set_state(ContextState::Ended);
        self.ended_count += 1;
        if self.ended_count == self.contexts.len() {
            self.state = ExecuteGroupState::Complete;
        }
    }

    /// Check whether every context has ended.
    pub fn is_complete(&self) -> bool {
        self.ended_count == self.contexts.len()
    }

    pub(crate) fn mark_submittable(&mut self) {
        self.state = ExecuteGroupState::Submittable;
    }

    /// Move the recorded command lists out for submission.
    pub(crate) fn take_request(&mut self) -> ExecuteWorkRequest<L> {
        let (scope_names, command_lists) = std::mem::take(&mut self.contexts)
            .into_iter()
            .map(ExecuteContext::into_parts)
            .unzip();
        self.state = ExecuteGroupState::Submitted;
        ExecuteWorkRequest {
            group_index: self.index,
            queue_class: self.queue_class,
            command_lists,
            scope_names,
            wait_fences: self.wait_fences,
            signal_fence: self.signal_fence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyCommandList;

    fn group(scopes: u32) -> ExecuteGroup<DummyCommandList> {
        let mut group = ExecuteGroup::new(0, HardwareQueueClass::Graphics);
        for i in 0..scopes {
            group.push_context(
                ScopeHandle::new(i),
                format!("scope{i}"),
                DummyCommandList::new(HardwareQueueClass::Graphics),
                &FenceValues::new(),
                None,
            );
        }
        group
    }

    #[test]
    fn test_group_completes_when_all_contexts_end() {
        let mut group = group(2);
        assert_eq!(group.state(), ExecuteGroupState::Building);

        group.begin_context(0).command_list().push_command("draw");
        group.end_context(0);
        assert!(!group.is_complete());

        group.begin_context(1);
        assert!(group.context(1).is_recording());
        group.end_context(1);
        assert!(group.is_complete());
        assert_eq!(group.state(), ExecuteGroupState::Complete);
    }

    #[test]
    fn test_take_request_keeps_scope_order() {
        let mut group = group(3);
        for i in 0..3 {
            group.begin_context(i);
            group.end_context(i);
        }
        let request = group.take_request();
        assert_eq!(request.scope_names, ["scope0", "scope1", "scope2"]);
        assert_eq!(request.command_lists.len(), 3);
        assert_eq!(group.state(), ExecuteGroupState::Submitted);
    }

    #[test]
    fn test_fences_merge_over_contexts() {
        let mut group: ExecuteGroup<DummyCommandList> =
            ExecuteGroup::new(4, HardwareQueueClass::Compute);
        group.push_context(
            ScopeHandle::new(0),
            "a".to_string(),
            DummyCommandList::new(HardwareQueueClass::Compute),
            &FenceValues::from_queue_value(HardwareQueueClass::Graphics, 3),
            None,
        );
        group.push_context(
            ScopeHandle::new(1),
            "b".to_string(),
            DummyCommandList::new(HardwareQueueClass::Compute),
            &FenceValues::new(),
            Some(7),
        );
        assert_eq!(group.wait_fences()[HardwareQueueClass::Graphics], 3);
        assert_eq!(group.signal_fence(), Some(7));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not recording")]
    fn test_end_context_without_begin_panics_in_debug() {
        let mut group = group(1);
        group.end_context(0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already begun")]
    fn test_begin_context_twice_panics_in_debug() {
        let mut group = group(1);
        group.begin_context(0);
        group.begin_context(0);
    }
}
