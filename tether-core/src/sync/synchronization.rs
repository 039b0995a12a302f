use super::transaction::CommitSummary;
use crate::application::Application;
use crate::context::WindowContext;
use crate::error::Result;
use crate::render_state::RenderStateCache;
use crate::tree::{NodeId, Tree};
use crate::update::UpdateBatch;
use std::any::Any;
use tether_types::{RenderId, WindowId};
use tracing::{debug, warn};

/// Applies decoded client input to the window
pub trait InputProcessor {
    fn process(&mut self, cx: &mut WindowContext<'_>) -> anyhow::Result<()>;
}

impl<F> InputProcessor for F
where
    F: FnMut(&mut WindowContext<'_>) -> anyhow::Result<()>,
{
    fn process(&mut self, cx: &mut WindowContext<'_>) -> anyhow::Result<()> {
        self(cx)
    }
}

/// Per-node hook run once per transaction before the diff is taken
pub trait Validator {
    fn validate(&mut self, cx: &mut WindowContext<'_>, node: NodeId) -> anyhow::Result<()>;
}

impl<F> Validator for F
where
    F: FnMut(&mut WindowContext<'_>, NodeId) -> anyhow::Result<()>,
{
    fn validate(&mut self, cx: &mut WindowContext<'_>, node: NodeId) -> anyhow::Result<()> {
        self(cx, node)
    }
}

/// Validator for windows without validation needs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoValidation;

impl Validator for NoValidation {
    fn validate(&mut self, _cx: &mut WindowContext<'_>, _node: NodeId) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Turns a frozen diff into whatever the transport sends back
pub trait OutputProcessor {
    type Output;

    fn render(&mut self, cx: &mut RenderContext<'_>) -> anyhow::Result<Self::Output>;
}

/// Read-only view of a window for rendering, plus its render-state cache
pub struct RenderContext<'a> {
    pub(crate) window: &'a WindowId,
    pub(crate) transaction_id: u64,
    pub(crate) tree: &'a Tree,
    pub(crate) batch: &'a UpdateBatch,
    pub(crate) pushed: &'a [UpdateBatch],
    pub(crate) render_states: &'a mut RenderStateCache,
    pub(crate) modal_root: Option<NodeId>,
    pub(crate) focused: Option<NodeId>,
}

impl RenderContext<'_> {
    pub fn window_id(&self) -> &WindowId {
        self.window
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn tree(&self) -> &Tree {
        self.tree
    }

    /// The diff of this transaction
    pub fn batch(&self) -> &UpdateBatch {
        self.batch
    }

    /// Batches pushed by sibling windows, to be rendered before `batch`
    pub fn pushed(&self) -> &[UpdateBatch] {
        self.pushed
    }

    pub fn modal_root(&self) -> Option<NodeId> {
        self.modal_root
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn render_id(&self, node: NodeId) -> Option<&RenderId> {
        self.tree.get(node)?.render_id()
    }

    pub fn render_state<T: Any>(&self, node: NodeId) -> Option<&T> {
        self.render_states.get(node)
    }

    pub fn render_state_mut<T: Any>(&mut self, node: NodeId) -> Option<&mut T> {
        self.render_states.get_mut(node)
    }

    pub fn set_render_state<T: Any + Send>(&mut self, node: NodeId, state: T) {
        self.render_states.set(node, state);
    }

    pub fn clear_render_state(&mut self, node: NodeId) -> bool {
        self.render_states.clear(node)
    }
}

/// One client request against one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub window: WindowId,
    /// First request of a client view: render everything
    pub init: bool,
}

impl SyncRequest {
    pub fn new(window: WindowId) -> Self {
        Self { window, init: false }
    }

    pub fn init(window: WindowId) -> Self {
        Self { window, init: true }
    }
}

#[derive(Debug)]
pub struct SyncOutcome<T> {
    pub output: T,
    pub summary: CommitSummary,
}

/// Drives one complete transaction with caller-supplied collaborators
pub struct Synchronization<'a> {
    app: &'a Application,
}

impl<'a> Synchronization<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Input, deferred tasks, validation, diff, render, commit
    ///
    /// Any failure ends the transaction early and releases the window before
    /// the error is returned. The pending diff is purged only if the tree was
    /// already mutated.
    pub fn process<I, V, O>(
        &self,
        request: &SyncRequest,
        input: &mut I,
        validator: &mut V,
        output: &mut O,
    ) -> Result<SyncOutcome<O::Output>>
    where
        I: InputProcessor + ?Sized,
        V: Validator + ?Sized,
        O: OutputProcessor + ?Sized,
    {
        let mut txn = self.app.begin_transaction(&request.window)?;
        if request.init {
            txn.request_full_refresh()?;
        }

        let result = (|| {
            txn.apply_input(|cx| input.process(cx))?;
            txn.validate(validator)?;
            txn.compute_diff()?;
            txn.render(output)
        })();

        match result {
            Ok(output) => {
                let summary = txn.commit()?;
                Ok(SyncOutcome { output, summary })
            }
            Err(err) => {
                if err.is_collaborator_failure() {
                    warn!(window = %request.window, error = %err, "synchronization failed");
                } else {
                    debug!(window = %request.window, error = %err, "synchronization aborted");
                }
                Err(err)
            }
        }
    }
}
