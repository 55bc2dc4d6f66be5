//! Per-scope recording context.

use crate::graph::ScopeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextState {
    Pending,
    Recording,
    Ended,
}

/// Recording state of one scope inside an [`ExecuteGroup`](super::ExecuteGroup).
///
/// Owns the scope's command list until the group is submitted.
#[derive(Debug)]
pub struct ExecuteContext<L> {
    scope: ScopeHandle,
    scope_name: String,
    command_list: L,
    state: ContextState,
}

impl<L> ExecuteContext<L> {
    pub(crate) fn new(scope: ScopeHandle, scope_name: String, command_list: L) -> Self {
        Self {
            scope,
            scope_name,
            command_list,
            state: ContextState::Pending,
        }
    }

    pub fn scope(&self) -> ScopeHandle {
        self.scope
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Command list to record into.
    pub fn command_list(&mut self) -> &mut L {
        &mut self.command_list
    }

    pub fn is_recording(&self) -> bool {
        self.state == ContextState::Recording
    }

    pub fn is_ended(&self) -> bool {
        self.state == ContextState::Ended
    }

    pub(crate) fn state(&self) -> ContextState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    pub(crate) fn into_parts(self) -> (String, L) {
        (self.scope_name, self.command_list)
    }
}
