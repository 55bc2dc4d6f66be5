//! Attachment declarations.

use crate::types::{AttachmentAccess, AttachmentKind, ResourceHandle};

use super::ScopeHandle;

/// Where an attachment's memory comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentLifetime {
    /// Owned outside the frame graph (swapchain images, persistent buffers).
    Imported(ResourceHandle),
    /// Lives only for this frame and is placed in the transient heap.
    Transient { size: u64, alignment: u64 },
}

/// A named logical image or buffer used by scopes.
#[derive(Debug, Clone)]
pub struct Attachment {
    name: String,
    kind: AttachmentKind,
    lifetime: AttachmentLifetime,
    /// Scopes using this attachment in declaration order. Filled on finalize.
    usages: Vec<(ScopeHandle, AttachmentAccess)>,
}

impl Attachment {
    pub(crate) fn new(name: String, kind: AttachmentKind, lifetime: AttachmentLifetime) -> Self {
        Self {
            name,
            kind,
            lifetime,
            usages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn lifetime(&self) -> AttachmentLifetime {
        self.lifetime
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.lifetime, AttachmentLifetime::Transient { .. })
    }

    /// Byte size of a transient attachment, `None` for imported ones.
    pub fn transient_size(&self) -> Option<u64> {
        match self.lifetime {
            AttachmentLifetime::Transient { size, .. } => Some(size),
            AttachmentLifetime::Imported(_) => None,
        }
    }

    /// Scopes using this attachment, in declaration order.
    pub fn usages(&self) -> &[(ScopeHandle, AttachmentAccess)] {
        &self.usages
    }

    /// First scope using the attachment.
    pub fn first_use(&self) -> Option<ScopeHandle> {
        self.usages.first().map(|&(scope, _)| scope)
    }

    /// Last scope using the attachment.
    pub fn last_use(&self) -> Option<ScopeHandle> {
        self.usages.last().map(|&(scope, _)| scope)
    }

    pub(crate) fn push_usage(&mut self, scope: ScopeHandle, access: AttachmentAccess) {
        self.usages.push((scope, access));
    }
}
