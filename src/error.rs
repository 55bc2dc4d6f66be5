//! RHI error types.
//!
//! Low-level components (pool allocator, aliasing tracker) never panic on
//! recoverable input. They report through sentinel values or the errors below.
//! Caller-contract violations (misaligned frees, executer state machine misuse)
//! go through [`contract_violation!`] instead: they are logged always and are
//! fatal in builds with debug assertions.

use thiserror::Error;

use crate::graph::GraphError;

/// Errors that can occur while scheduling a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// An argument or descriptor field is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not valid in the object's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A fixed-capacity pool has no free element left.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The frame's transient attachments do not fit in the transient heap.
    #[error("transient heap exhausted placing '{attachment}' ({size} bytes, heap is {heap_size} bytes)")]
    OutOfTransientMemory {
        attachment: String,
        size: u64,
        heap_size: u64,
    },
    /// The frame graph was rejected.
    #[error("frame graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Result alias used throughout the crate.
pub type RhiResult<T> = Result<T, RhiError>;

/// Reports a broken caller contract.
///
/// Always logs at error level. With debug assertions enabled this panics, so a
/// bad schedule is caught at the call site. Without them the caller is
/// expected to return early and leave its state untouched.
macro_rules! contract_violation {
    ($($arg:tt)+) => {{
        log::error!($($arg)+);
        if cfg!(debug_assertions) {
            panic!($($arg)+);
        }
    }};
}

pub(crate) use contract_violation;
