//! Explicit execution context
//!
//! The window a piece of code acts on is carried in a [`ContextStack`]
//! passed down the call chain. Entering another window pushes it and the
//! matching pop happens when the scope ends, on unwind included.

use crate::application::Application;
use crate::error::Result;
use crate::tree::NodeId;
use crate::window::Window;
use smallvec::SmallVec;
use std::ops::{Deref, DerefMut};
use tether_types::WindowId;
use tracing::debug;

/// Stack of windows the current call chain has entered
#[derive(Debug, Default)]
pub struct ContextStack {
    windows: SmallVec<[WindowId; 4]>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The innermost active window
    pub fn current(&self) -> Option<&WindowId> {
        self.windows.last()
    }

    pub fn contains(&self, window: &WindowId) -> bool {
        self.windows.iter().any(|w| w == window)
    }

    pub fn depth(&self) -> usize {
        self.windows.len()
    }

    pub(crate) fn push(&mut self, window: WindowId) {
        self.windows.push(window);
    }

    pub(crate) fn pop(&mut self) -> Option<WindowId> {
        self.windows.pop()
    }
}

/// Paired entry into a window: exits and pops on drop
pub(crate) struct ContextScope<'s, 'w> {
    window: &'w mut Window,
    stack: &'s mut ContextStack,
}

impl<'s, 'w> ContextScope<'s, 'w> {
    pub fn enter(window: &'w mut Window, stack: &'s mut ContextStack) -> Self {
        stack.push(window.id().clone());
        window.enter_context();
        Self { window, stack }
    }

    pub fn window(&mut self) -> &mut Window {
        self.window
    }

    pub fn context<'a>(&'a mut self, app: &'a Application) -> WindowContext<'a> {
        WindowContext::new(self.window, app, self.stack)
    }
}

impl Drop for ContextScope<'_, '_> {
    fn drop(&mut self) {
        self.window.exit_context();
        self.stack.pop();
    }
}

/// Access to the active window handed to collaborator code
///
/// Derefs to [`Window`] for the mutation API.
pub struct WindowContext<'a> {
    window: &'a mut Window,
    app: &'a Application,
    stack: &'a mut ContextStack,
}

impl<'a> WindowContext<'a> {
    pub(crate) fn new(
        window: &'a mut Window,
        app: &'a Application,
        stack: &'a mut ContextStack,
    ) -> Self {
        Self { window, app, stack }
    }

    pub fn window(&self) -> &Window {
        self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        self.window
    }

    pub fn app(&self) -> &Application {
        self.app
    }

    pub fn stack(&self) -> &ContextStack {
        self.stack
    }

    /// Run `f` against another window of the application
    ///
    /// The other window's lock is taken for the duration of `f`; this
    /// window stays locked and is restored as current afterwards.
    pub fn switch_into<R>(
        &mut self,
        window: &WindowId,
        f: impl FnOnce(&mut WindowContext<'_>) -> R,
    ) -> Result<R> {
        self.app.switch_into(self.stack, window, f)
    }

    /// Open a new window; `build` populates it before it is registered
    pub fn open_window(
        &mut self,
        build: impl FnOnce(&mut Window) -> anyhow::Result<()>,
    ) -> Result<WindowId> {
        self.app.open_window(build)
    }

    pub fn close_window(&mut self, window: &WindowId) -> Result<()> {
        self.app.close_window(window)
    }

    /// Whether input addressed to `node` passes the modal gate
    ///
    /// Rejected input is not an error; decoders drop it.
    pub fn accepts_input(&self, node: NodeId) -> bool {
        let accepted = self.window.verify_modal_context(node);
        if !accepted {
            debug!(window = %self.window.id(), %node, "input outside modal context ignored");
        }
        accepted
    }
}

impl Deref for WindowContext<'_> {
    type Target = Window;

    fn deref(&self) -> &Window {
        self.window
    }
}

impl DerefMut for WindowContext<'_> {
    fn deref_mut(&mut self) -> &mut Window {
        self.window
    }
}
