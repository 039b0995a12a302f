use crate::queue::TaskQueueHandle;
use crate::sync::TransactionState;
use crate::tree::NodeId;
use tether_types::WindowId;
use thiserror::Error;

/// Violations of the tree's structural invariants
///
/// These indicate a bug in the calling code and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist or was disposed")]
    NodeNotFound(NodeId),

    #[error("node {0} already has a parent")]
    AlreadyAttached(NodeId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("the window root cannot be {0}")]
    RootNode(&'static str),

    #[error("node {0} is still attached and cannot be disposed")]
    StillAttached(NodeId),

    #[error("node {0} cannot claim modality")]
    NotModalCapable(NodeId),

    #[error("window {window} mutated outside an active context")]
    OutsideContext { window: WindowId },

    #[error("window {0} has been disposed")]
    Disposed(WindowId),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("window {0} not found")]
    WindowNotFound(WindowId),

    #[error("window {0} is already active in this context")]
    ReentrantWindow(WindowId),

    #[error("timed out waiting for window {0}")]
    LockTimeout(WindowId),

    #[error("transaction is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: TransactionState,
        actual: TransactionState,
    },

    #[error("building window {window} failed: {error:#}")]
    WindowInit { window: WindowId, error: anyhow::Error },

    #[error("input processing failed: {0:#}")]
    Input(anyhow::Error),

    #[error("validation of node {node} failed: {error:#}")]
    Validation { node: NodeId, error: anyhow::Error },

    #[error("render failed: {0:#}")]
    Render(anyhow::Error),

    #[error("deferred task failed: {0:#}")]
    Task(anyhow::Error),

    #[error("task queues of window {0} have been disposed")]
    QueueDisposed(WindowId),

    #[error("window {window} has no task queue {queue}")]
    TaskQueueNotFound { window: WindowId, queue: TaskQueueHandle },

    #[error("application already disposed")]
    ApplicationDisposed,

    #[error("window {0} is closed")]
    WindowClosed(WindowId),
}

impl SyncError {
    /// Failures raised by collaborator code rather than by the engine itself
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            SyncError::WindowInit { .. }
                | SyncError::Input(_)
                | SyncError::Validation { .. }
                | SyncError::Render(_)
                | SyncError::Task(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
