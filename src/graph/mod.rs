//! Frame graph: the declared scopes and attachments of one frame.
//!
//! The frame graph stores scopes in declaration order. That order is the
//! authoritative submission order, so dependencies may only point backwards.
//! Hazard edges (read-after-write, write-after-read, write-after-write) are
//! derived from the declared attachment usages when the graph is finalized.
//!
//! # Architecture
//!
//! | Stage | Type | Purpose |
//! |-------|------|---------|
//! | **Graph** | [`FrameGraph`] | Scopes, attachments, dependencies (this module) |
//! | Transients | [`TransientAttachmentPool`](crate::transient::TransientAttachmentPool) | Heap placement and aliasing |
//! | Compile | [`FrameGraphCompiler`](crate::compiler::FrameGraphCompiler) | Cross-queue fences |
//! | Execute | [`FrameGraphExecuter`](crate::executer::FrameGraphExecuter) | Recording and submission |
//!
//! # Example
//!
//! ```
//! use redlilium_rhi::{AttachmentAccess, FrameGraph, HardwareQueueClass, Scope};
//!
//! let mut graph = FrameGraph::new();
//! let gbuffer = graph.create_transient_image("gbuffer", 1 << 20, 256).unwrap();
//!
//! let geometry = graph
//!     .add_scope(
//!         Scope::new("geometry", HardwareQueueClass::Graphics)
//!             .with_attachment(gbuffer, AttachmentAccess::Write),
//!     )
//!     .unwrap();
//! let lighting = graph
//!     .add_scope(
//!         Scope::new("lighting", HardwareQueueClass::Compute)
//!             .with_attachment(gbuffer, AttachmentAccess::Read),
//!     )
//!     .unwrap();
//!
//! graph.finalize();
//! assert_eq!(graph.scope(lighting).producers(HardwareQueueClass::Graphics), &[geometry]);
//! ```

mod attachment;
mod scope;

pub use attachment::{Attachment, AttachmentLifetime};
pub use scope::{Scope, ScopeAttachment};

use thiserror::Error;

use crate::types::{AttachmentAccess, AttachmentKind, ResourceHandle};

/// Handle to a scope in a frame graph.
///
/// `ScopeHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `FrameGraph` that created it. Handles compare in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeHandle(u32);

impl ScopeHandle {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an attachment in a frame graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentHandle(u32);

impl AttachmentHandle {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Errors that can occur during frame graph construction.
///
/// These reject a malformed frame. They never leave the graph half-modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph was finalized and no longer accepts declarations.
    #[error("frame graph is finalized")]
    GraphFinalized,
    /// A scope references an attachment that was never declared.
    #[error("scope '{scope}' references undeclared attachment {attachment:?}")]
    UnknownAttachment {
        scope: String,
        attachment: AttachmentHandle,
    },
    /// A handle does not refer to a scope in this graph.
    #[error("unknown scope handle {0:?}")]
    UnknownScope(ScopeHandle),
    /// A scope with this name was already added.
    #[error("duplicate scope '{0}'")]
    DuplicateScope(String),
    /// An attachment with this name was already declared.
    #[error("duplicate attachment '{0}'")]
    DuplicateAttachment(String),
    /// A transient attachment was declared with a zero size or invalid alignment.
    #[error("invalid size for attachment '{0}'")]
    InvalidAttachmentSize(String),
    /// A dependency points at a scope declared later.
    #[error("scope '{dependent}' cannot depend on later scope '{dependency}'")]
    ForwardDependency {
        dependent: String,
        dependency: String,
    },
    /// A scope was made to depend on itself.
    #[error("scope '{0}' cannot depend on itself")]
    SelfDependency(String),
}

/// The declared work of one frame.
#[derive(Debug, Default)]
pub struct FrameGraph {
    frame_index: u64,
    /// All scopes in declaration order.
    scopes: Vec<Scope>,
    attachments: Vec<Attachment>,
    finalized: bool,
}

impl FrameGraph {
    /// Create a new empty frame graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty frame graph tagged with a frame index.
    pub fn for_frame(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Self::default()
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Import an externally owned image.
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        resource: ResourceHandle,
    ) -> Result<AttachmentHandle, GraphError> {
        self.declare_attachment(
            name.into(),
            AttachmentKind::Image,
            AttachmentLifetime::Imported(resource),
        )
    }

    /// Import an externally owned buffer.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        resource: ResourceHandle,
    ) -> Result<AttachmentHandle, GraphError> {
        self.declare_attachment(
            name.into(),
            AttachmentKind::Buffer,
            AttachmentLifetime::Imported(resource),
        )
    }

    /// Declare a frame-local image placed in the transient heap.
    pub fn create_transient_image(
        &mut self,
        name: impl Into<String>,
        size: u64,
        alignment: u64,
    ) -> Result<AttachmentHandle, GraphError> {
        self.declare_transient(name.into(), AttachmentKind::Image, size, alignment)
    }

    /// Declare a frame-local buffer placed in the transient heap.
    pub fn create_transient_buffer(
        &mut self,
        name: impl Into<String>,
        size: u64,
        alignment: u64,
    ) -> Result<AttachmentHandle, GraphError> {
        self.declare_transient(name.into(), AttachmentKind::Buffer, size, alignment)
    }

    fn declare_transient(
        &mut self,
        name: String,
        kind: AttachmentKind,
        size: u64,
        alignment: u64,
    ) -> Result<AttachmentHandle, GraphError> {
        if size == 0 || (alignment != 0 && !alignment.is_power_of_two()) {
            return Err(GraphError::InvalidAttachmentSize(name));
        }
        self.declare_attachment(
            name,
            kind,
            AttachmentLifetime::Transient {
                size,
                alignment: alignment.max(1),
            },
        )
    }

    fn declare_attachment(
        &mut self,
        name: String,
        kind: AttachmentKind,
        lifetime: AttachmentLifetime,
    ) -> Result<AttachmentHandle, GraphError> {
        if self.finalized {
            return Err(GraphError::GraphFinalized);
        }
        if self.attachments.iter().any(|a| a.name() == name) {
            return Err(GraphError::DuplicateAttachment(name));
        }
        let handle = AttachmentHandle::new(self.attachments.len() as u32);
        self.attachments.push(Attachment::new(name, kind, lifetime));
        Ok(handle)
    }

    /// Add a scope to the graph.
    ///
    /// The scope should be fully configured before adding.
    /// Returns a `ScopeHandle` for referencing this scope.
    pub fn add_scope(&mut self, mut scope: Scope) -> Result<ScopeHandle, GraphError> {
        if self.finalized {
            return Err(GraphError::GraphFinalized);
        }
        if let Some(usage) = scope
            .attachments()
            .iter()
            .find(|usage| usage.attachment.index() >= self.attachments.len())
        {
            return Err(GraphError::UnknownAttachment {
                scope: scope.name().to_string(),
                attachment: usage.attachment,
            });
        }
        if self.scopes.iter().any(|s| s.name() == scope.name()) {
            return Err(GraphError::DuplicateScope(scope.name().to_string()));
        }

        let handle = ScopeHandle::new(self.scopes.len() as u32);
        scope.set_handle(handle);
        log::trace!(
            "FrameGraph: added scope '{}' on {} queue",
            scope.name(),
            scope.queue_class().name()
        );
        self.scopes.push(scope);
        Ok(handle)
    }

    /// Add an explicit dependency between scopes.
    ///
    /// The `dependent` scope will execute after the `dependency` scope. The
    /// dependency must have been declared first.
    pub fn add_dependency(
        &mut self,
        dependent: ScopeHandle,
        dependency: ScopeHandle,
    ) -> Result<(), GraphError> {
        if self.finalized {
            return Err(GraphError::GraphFinalized);
        }
        self.validate_edge(dependent, dependency)?;
        self.connect(dependent, dependency);
        Ok(())
    }

    /// Record that `dependent` reuses memory last touched by `dependency`.
    ///
    /// Unlike [`add_dependency`](Self::add_dependency) this is allowed after
    /// finalize, since aliasing is only known once transients are placed.
    pub(crate) fn add_aliasing_dependency(
        &mut self,
        dependent: ScopeHandle,
        dependency: ScopeHandle,
    ) -> Result<(), GraphError> {
        self.validate_edge(dependent, dependency)?;
        self.connect(dependent, dependency);
        Ok(())
    }

    fn validate_edge(&self, dependent: ScopeHandle, dependency: ScopeHandle) -> Result<(), GraphError> {
        let dependent_scope = self
            .scopes
            .get(dependent.index())
            .ok_or(GraphError::UnknownScope(dependent))?;
        let dependency_scope = self
            .scopes
            .get(dependency.index())
            .ok_or(GraphError::UnknownScope(dependency))?;
        if dependent == dependency {
            return Err(GraphError::SelfDependency(dependent_scope.name().to_string()));
        }
        if dependency > dependent {
            return Err(GraphError::ForwardDependency {
                dependent: dependent_scope.name().to_string(),
                dependency: dependency_scope.name().to_string(),
            });
        }
        Ok(())
    }

    /// Link two scopes. `dependency` must be declared before `dependent`.
    fn connect(&mut self, dependent: ScopeHandle, dependency: ScopeHandle) {
        debug_assert!(dependency < dependent);
        let dependency_queue = self.scopes[dependency.index()].queue_class();
        let dependent_queue = self.scopes[dependent.index()].queue_class();
        if self.scopes[dependent.index()].add_producer(dependency, dependency_queue) {
            self.scopes[dependency.index()].add_consumer(dependent, dependent_queue);
        }
    }

    /// Derive hazard edges from attachment usage and lock the graph.
    ///
    /// Calling this again after the graph is finalized does nothing.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }

        let mut edges = Vec::new();
        for attachment_index in 0..self.attachments.len() {
            let handle = AttachmentHandle::new(attachment_index as u32);
            let mut last_writer: Option<ScopeHandle> = None;
            let mut readers_since_write: Vec<ScopeHandle> = Vec::new();

            for (scope_index, scope) in self.scopes.iter().enumerate() {
                let Some(access) = scope.access_of(handle) else {
                    continue;
                };
                let current = ScopeHandle::new(scope_index as u32);
                self.attachments[attachment_index].push_usage(current, access);

                if access.is_read() {
                    if let Some(writer) = last_writer {
                        edges.push((current, writer));
                    }
                }
                if access.is_write() {
                    if readers_since_write.is_empty() {
                        // write-after-write
                        if let Some(writer) = last_writer {
                            edges.push((current, writer));
                        }
                    } else {
                        // write-after-read
                        edges.extend(
                            readers_since_write
                                .iter()
                                .filter(|&&reader| reader != current)
                                .map(|&reader| (current, reader)),
                        );
                    }
                    last_writer = Some(current);
                    readers_since_write.clear();
                } else {
                    readers_since_write.push(current);
                }
            }
        }

        for (dependent, dependency) in edges {
            if dependent != dependency {
                self.connect(dependent, dependency);
            }
        }
        self.finalized = true;

        log::debug!(
            "FrameGraph: finalized frame {} with {} scopes and {} attachments",
            self.frame_index,
            self.scopes.len(),
            self.attachments.len()
        );
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// All scopes in declaration order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut [Scope] {
        &mut self.scopes
    }

    /// Get a scope by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn scope(&self, handle: ScopeHandle) -> &Scope {
        &self.scopes[handle.index()]
    }

    /// Look up a scope by name.
    pub fn find_scope(&self, name: &str) -> Option<ScopeHandle> {
        self.scopes
            .iter()
            .position(|scope| scope.name() == name)
            .map(|index| ScopeHandle::new(index as u32))
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// All declared attachments.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Get an attachment by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this graph.
    pub fn attachment(&self, handle: AttachmentHandle) -> &Attachment {
        &self.attachments[handle.index()]
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Accesses to `attachment`, in declaration order.
    pub fn attachment_usages(
        &self,
        attachment: AttachmentHandle,
    ) -> impl Iterator<Item = (ScopeHandle, AttachmentAccess)> + '_ {
        self.attachments[attachment.index()].usages().iter().copied()
    }
}
