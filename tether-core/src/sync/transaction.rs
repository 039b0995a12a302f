use super::synchronization::{OutputProcessor, RenderContext, Validator};
use crate::application::{Application, WindowHandle};
use crate::context::{ContextStack, WindowContext};
use crate::error::{Result, SyncError};
use crate::tree::NodeId;
use crate::update::UpdateBatch;
use crate::window::Window;
use parking_lot::RawMutex;
use parking_lot::lock_api::ArcMutexGuard;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_types::WindowId;
use tracing::{debug, trace, warn};

/// Progress of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InputApplied,
    Validated,
    DiffComputed,
    Rendered,
    Committed,
    Errored,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Errored)
    }
}

/// What a committed transaction did
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSummary {
    pub window: WindowId,
    pub transaction_id: u64,
    pub full_refresh: bool,
    pub update_count: usize,
    pub async_pushes: usize,
    pub window_closed: bool,
    pub elapsed: Duration,
}

/// Exclusive ownership of one window for one synchronization
///
/// Steps must run in order: [`apply_input`](Self::apply_input),
/// [`validate`](Self::validate), [`compute_diff`](Self::compute_diff),
/// [`render`](Self::render), [`commit`](Self::commit). Dropping the
/// transaction before commit purges the pending diff if the transaction
/// mutated the tree or produced output; otherwise the diff, posted commands
/// and pushed batches stay for the next transaction. The window lock is
/// released on every path.
pub struct Transaction<'a> {
    app: &'a Application,
    handle: Arc<WindowHandle>,
    window: ArcMutexGuard<RawMutex, Window>,
    stack: ContextStack,
    state: TransactionState,
    started: Instant,
    mutations_at_start: u64,
    pushed: Vec<UpdateBatch>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(app: &'a Application, handle: Arc<WindowHandle>) -> Result<Self> {
        let id = handle.id().clone();
        let mut window = handle
            .window
            .try_lock_arc_for(app.config().lock_timeout)
            .ok_or_else(|| SyncError::LockTimeout(id.clone()))?;
        if window.is_disposed() {
            return Err(SyncError::WindowClosed(id));
        }

        let mut stack = ContextStack::new();
        stack.push(id.clone());
        window.enter_context();
        if handle.take_full_refresh_request() {
            window.request_full_refresh();
        }
        let mutations_at_start = window.mutations();
        debug!(window = %id, "transaction started");

        Ok(Self {
            app,
            handle,
            window,
            stack,
            state: TransactionState::Idle,
            started: Instant::now(),
            mutations_at_start,
            pushed: Vec::new(),
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn window_id(&self) -> &WindowId {
        self.handle.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Id assigned once input has been applied
    pub fn transaction_id(&self) -> u64 {
        self.window.transaction_id()
    }

    pub fn modal_root(&self) -> Option<NodeId> {
        self.window.modal_root()
    }

    /// Render the whole tree this time, e.g. for a client's first request
    pub fn request_full_refresh(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Idle
            | TransactionState::InputApplied
            | TransactionState::Validated => {
                self.window.request_full_refresh();
                Ok(())
            }
            actual => Err(SyncError::InvalidState {
                expected: TransactionState::Validated,
                actual,
            }),
        }
    }

    /// Let the input collaborator mutate the tree, then run deferred tasks
    pub fn apply_input<F>(&mut self, input: F) -> Result<()>
    where
        F: FnOnce(&mut WindowContext<'_>) -> anyhow::Result<()>,
    {
        self.ensure_state(TransactionState::Idle)?;
        let result = {
            let mut cx = WindowContext::new(&mut *self.window, self.app, &mut self.stack);
            input(&mut cx)
        };
        if let Err(error) = result {
            self.state = TransactionState::Errored;
            return Err(SyncError::Input(error));
        }

        self.run_deferred()?;
        let id = self.window.begin_update();
        trace!(window = %self.handle.id(), txn = id, "input applied");
        self.state = TransactionState::InputApplied;
        Ok(())
    }

    fn run_deferred(&mut self) -> Result<()> {
        let tasks = self.handle.tasks.drain_all();
        if tasks.is_empty() {
            return Ok(());
        }
        let total = tasks.len();
        for (ran, task) in tasks.into_iter().enumerate() {
            let result = {
                let mut cx = WindowContext::new(&mut *self.window, self.app, &mut self.stack);
                task.run(&mut cx)
            };
            if let Err(error) = result {
                warn!(
                    window = %self.handle.id(),
                    dropped = total - ran - 1,
                    "deferred task failed"
                );
                self.state = TransactionState::Errored;
                return Err(SyncError::Task(error));
            }
        }
        debug!(window = %self.handle.id(), tasks = total, "deferred tasks ran");
        Ok(())
    }

    /// Visit every node once, parents before children
    ///
    /// Children are read after their parent's hook returns, so nodes the hook
    /// adds are visited too.
    pub fn validate<V: Validator + ?Sized>(&mut self, validator: &mut V) -> Result<()> {
        self.ensure_state(TransactionState::InputApplied)?;
        let mut stack = vec![self.window.root()];
        let mut visited = 0usize;
        while let Some(node) = stack.pop() {
            if !self.window.tree().contains(node) {
                continue;
            }
            let result = {
                let mut cx = WindowContext::new(&mut *self.window, self.app, &mut self.stack);
                validator.validate(&mut cx, node)
            };
            if let Err(error) = result {
                self.state = TransactionState::Errored;
                return Err(SyncError::Validation { node, error });
            }
            visited += 1;
            stack.extend(self.window.tree().children(node).iter().rev().copied());
        }
        trace!(window = %self.handle.id(), visited, "validated");
        self.state = TransactionState::Validated;
        Ok(())
    }

    /// Freeze the diff and evict render states it invalidates
    ///
    /// Batches pushed by sibling windows since the last synchronization are
    /// collected at the same time; see [`pushed_updates`](Self::pushed_updates).
    pub fn compute_diff(&mut self) -> Result<&UpdateBatch> {
        self.ensure_state(TransactionState::Validated)?;
        let posted = self.handle.take_posted();
        self.window.absorb_commands(posted);
        self.window.purge_render_states();
        self.pushed = self.handle.inbox.drain();
        self.state = TransactionState::DiffComputed;

        let batch = self.window.updates().snapshot();
        debug!(
            window = %self.handle.id(),
            updates = batch.update_count(),
            full_refresh = batch.is_full_refresh(),
            pushed = self.pushed.len(),
            "diff computed"
        );
        Ok(batch)
    }

    /// The frozen diff, available from `compute_diff` until commit
    pub fn diff(&self) -> Result<&UpdateBatch> {
        match self.state {
            TransactionState::DiffComputed | TransactionState::Rendered => {
                Ok(self.window.updates().snapshot())
            }
            actual => Err(SyncError::InvalidState {
                expected: TransactionState::DiffComputed,
                actual,
            }),
        }
    }

    /// Batches pushed by sibling windows, oldest first
    pub fn pushed_updates(&self) -> &[UpdateBatch] {
        &self.pushed
    }

    /// Hand the diff to the output collaborator
    ///
    /// A failure is reported but not rolled back. Dropping the transaction
    /// then purges the diff and, under `full_refresh_on_error`, flags a full
    /// refresh.
    pub fn render<O: OutputProcessor + ?Sized>(&mut self, output: &mut O) -> Result<O::Output> {
        self.ensure_state(TransactionState::DiffComputed)?;
        let window_id = self.handle.id().clone();
        let transaction_id = self.window.transaction_id();
        let modal_root = self.window.modal_root();
        let focused = self.window.focused();

        let result = {
            let (tree, updates, render_states) = self.window.render_parts();
            let mut cx = RenderContext {
                window: &window_id,
                transaction_id,
                tree,
                batch: updates.snapshot(),
                pushed: &self.pushed,
                render_states,
                modal_root,
                focused,
            };
            output.render(&mut cx)
        };
        match result {
            Ok(rendered) => {
                self.state = TransactionState::Rendered;
                Ok(rendered)
            }
            Err(error) => {
                self.state = TransactionState::Errored;
                Err(SyncError::Render(error))
            }
        }
    }

    /// Purge the diff, push sibling windows' pending updates and release
    pub fn commit(mut self) -> Result<CommitSummary> {
        self.ensure_state(TransactionState::Rendered)?;
        let snapshot = self.window.updates().snapshot();
        let full_refresh = snapshot.is_full_refresh();
        let update_count = snapshot.update_count();

        self.window.updates_mut().purge();
        self.window.process_removals();
        let async_pushes = self.flush_async();

        let window_closed = match self.app.remove_if_closing(self.handle.id()) {
            Some(handle) => {
                handle.tasks.dispose();
                self.window.dispose();
                true
            }
            None => false,
        };

        self.state = TransactionState::Committed;
        let summary = CommitSummary {
            window: self.handle.id().clone(),
            transaction_id: self.window.transaction_id(),
            full_refresh,
            update_count,
            async_pushes,
            window_closed,
            elapsed: self.started.elapsed(),
        };
        debug!(
            window = %summary.window,
            txn = summary.transaction_id,
            async_pushes,
            elapsed_us = summary.elapsed.as_micros() as u64,
            "transaction committed"
        );
        Ok(summary)
    }

    /// Release without committing; same as dropping
    pub fn end(self) {}

    /// Move pending updates of idle sibling windows into their inboxes
    ///
    /// Windows held by another transaction are skipped; they deliver their
    /// own diff when that transaction commits.
    fn flush_async(&self) -> usize {
        if !self.app.config().allow_async_window_updates {
            return 0;
        }
        let mut pushes = 0;
        for handle in self.app.siblings(self.handle.id()) {
            if !handle.inbox.is_enabled() {
                continue;
            }
            let Some(mut other) = handle.window.try_lock() else {
                trace!(window = %handle.id(), "window busy, async update left pending");
                continue;
            };
            if other.is_disposed() {
                continue;
            }
            other.absorb_commands(handle.take_posted());
            if !other.updates().has_pending() {
                continue;
            }
            // pushed under the target's lock so a failing transaction there
            // can restore its drained batches ahead of this one
            let batch = other.take_pending();
            handle.inbox.push(batch);
            drop(other);
            handle.wake();
            pushes += 1;
            debug!(from = %self.handle.id(), to = %handle.id(), "async update pushed");
        }
        pushes
    }

    fn ensure_state(&self, expected: TransactionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SyncError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl Transaction<'_> {
    /// Leave the window consistent after an uncommitted end
    fn recover(&mut self) {
        let mutated = self.window.mutations() != self.mutations_at_start;
        let produced = self.state == TransactionState::Rendered;
        let pushed = std::mem::take(&mut self.pushed);

        if !mutated && !produced {
            let restored = pushed.len();
            self.handle.inbox.restore(pushed);
            debug!(
                window = %self.handle.id(),
                state = ?self.state,
                restored,
                "transaction ended before any mutation, pending state kept"
            );
            return;
        }

        let batch = self.window.updates_mut().take();
        self.window.process_removals();
        if self.app.config().full_refresh_on_error {
            let commands = pushed
                .into_iter()
                .flat_map(UpdateBatch::into_commands)
                .chain(batch.into_commands())
                .collect();
            self.handle.restore_posted(commands);
            self.handle.request_full_refresh();
        } else {
            self.handle.restore_posted(batch.into_commands());
            self.handle.inbox.restore(pushed);
        }
        warn!(
            window = %self.handle.id(),
            state = ?self.state,
            mutated,
            "transaction ended without commit, diff purged"
        );
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Committed {
            self.recover();
        }
        if self.handle.take_dispose_pending() {
            self.window.dispose();
        }
        self.window.exit_context();
        self.stack.pop();
    }
}
