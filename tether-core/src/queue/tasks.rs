use crate::context::WindowContext;
use crate::error::{Result, SyncError};
use crossbeam_channel::Sender;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_types::WindowId;
use tracing::{debug, trace};

/// Work injected from outside a transaction, run inside the next one
pub trait DeferredTask: Send + 'static {
    fn run(self: Box<Self>, cx: &mut WindowContext<'_>) -> anyhow::Result<()>;
}

impl<F> DeferredTask for F
where
    F: FnOnce(&mut WindowContext<'_>) -> anyhow::Result<()> + Send + 'static,
{
    fn run(self: Box<Self>, cx: &mut WindowContext<'_>) -> anyhow::Result<()> {
        (*self)(cx)
    }
}

/// Opaque handle of one task queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskQueueHandle(u64);

impl fmt::Display for TaskQueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

#[derive(Default)]
struct QueueState {
    queues: IndexMap<TaskQueueHandle, Vec<Box<dyn DeferredTask>>>,
    disposed: bool,
}

/// The deferred task queues of one window
///
/// Lives outside the window lock so producers on other threads never wait
/// for a running transaction.
pub struct TaskQueues {
    window: WindowId,
    state: Mutex<QueueState>,
    next_handle: AtomicU64,
    waker: Option<Sender<WindowId>>,
}

impl TaskQueues {
    pub fn new(window: WindowId, waker: Option<Sender<WindowId>>) -> Self {
        Self {
            window,
            state: Mutex::new(QueueState::default()),
            next_handle: AtomicU64::new(1),
            waker,
        }
    }

    pub fn create_queue(&self) -> Result<TaskQueueHandle> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SyncError::QueueDisposed(self.window.clone()));
        }
        let handle = TaskQueueHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.queues.insert(handle, Vec::new());
        debug!(window = %self.window, queue = %handle, "task queue created");
        Ok(handle)
    }

    /// Remove a queue, dropping whatever it still holds
    pub fn remove_queue(&self, handle: TaskQueueHandle) -> bool {
        let removed = self.state.lock().queues.shift_remove(&handle);
        if let Some(tasks) = &removed {
            debug!(
                window = %self.window,
                queue = %handle,
                dropped = tasks.len(),
                "task queue removed"
            );
        }
        removed.is_some()
    }

    /// Append a closure to a queue
    pub fn enqueue<F>(&self, handle: TaskQueueHandle, task: F) -> Result<()>
    where
        F: FnOnce(&mut WindowContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.enqueue_task(handle, Box::new(task))
    }

    /// Append a task to a queue and signal that work is available
    pub fn enqueue_task(&self, handle: TaskQueueHandle, task: Box<dyn DeferredTask>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(SyncError::QueueDisposed(self.window.clone()));
            }
            let queue = state
                .queues
                .get_mut(&handle)
                .ok_or_else(|| SyncError::TaskQueueNotFound {
                    window: self.window.clone(),
                    queue: handle,
                })?;
            queue.push(task);
        }
        self.wake();
        Ok(())
    }

    pub fn has_tasks(&self) -> bool {
        self.state.lock().queues.values().any(|queue| !queue.is_empty())
    }

    pub fn queue_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// Take every queued task, queue by queue in creation order
    pub fn drain_all(&self) -> Vec<Box<dyn DeferredTask>> {
        let mut state = self.state.lock();
        let mut drained = Vec::new();
        for queue in state.queues.values_mut() {
            drained.append(queue);
        }
        drained
    }

    /// Tear the queues down; only the first call has an effect
    pub fn dispose(&self) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }
        state.disposed = true;
        let dropped: usize = state.queues.values().map(Vec::len).sum();
        state.queues.clear();
        debug!(window = %self.window, dropped, "task queues disposed");
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub(crate) fn wake(&self) {
        if let Some(waker) = &self.waker {
            if waker.send(self.window.clone()).is_err() {
                trace!(window = %self.window, "wake receiver dropped");
            }
        }
    }
}
