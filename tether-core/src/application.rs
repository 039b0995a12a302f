use crate::config::AppConfig;
use crate::context::{ContextScope, ContextStack, WindowContext};
use crate::error::{Result, SyncError};
use crate::queue::{AsyncInbox, DeferredTask, TaskQueueHandle, TaskQueues};
use crate::sync::Transaction;
use crate::window::Window;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use smartstring::alias::String as SmartString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tether_types::{Command, WindowId};
use tracing::{debug, info, warn};

/// Shared state of one window
///
/// Only the tree itself sits behind the window lock. Task queues, the async
/// inbox and posted commands are reachable while a transaction runs.
pub(crate) struct WindowHandle {
    id: WindowId,
    pub(crate) window: Arc<Mutex<Window>>,
    pub(crate) tasks: TaskQueues,
    pub(crate) inbox: AsyncInbox,
    posted: Mutex<Vec<Command>>,
    full_refresh_requested: AtomicBool,
    dispose_pending: AtomicBool,
}

impl WindowHandle {
    fn new(window: Window, waker: Option<Sender<WindowId>>) -> Self {
        let id = window.id().clone();
        Self {
            tasks: TaskQueues::new(id.clone(), waker),
            id,
            window: Arc::new(Mutex::new(window)),
            inbox: AsyncInbox::new(),
            posted: Mutex::new(Vec::new()),
            full_refresh_requested: AtomicBool::new(false),
            dispose_pending: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &WindowId {
        &self.id
    }

    /// Queue a command for the window without taking its lock
    pub fn post_command(&self, command: Command) {
        self.posted.lock().push(command);
        self.tasks.wake();
    }

    pub fn take_posted(&self) -> Vec<Command> {
        std::mem::take(&mut *self.posted.lock())
    }

    /// Put back commands a failed transaction absorbed, ahead of newer ones
    pub fn restore_posted(&self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        let mut posted = self.posted.lock();
        posted.splice(0..0, commands);
    }

    pub fn has_posted(&self) -> bool {
        !self.posted.lock().is_empty()
    }

    pub fn request_full_refresh(&self) {
        self.full_refresh_requested.store(true, Ordering::Release);
    }

    pub fn take_full_refresh_request(&self) -> bool {
        self.full_refresh_requested.swap(false, Ordering::AcqRel)
    }

    pub fn wake(&self) {
        self.tasks.wake();
    }

    /// Leave teardown to whoever holds the window lock
    pub fn mark_dispose_pending(&self) {
        self.dispose_pending.store(true, Ordering::Release);
    }

    pub fn take_dispose_pending(&self) -> bool {
        self.dispose_pending.swap(false, Ordering::AcqRel)
    }
}

#[derive(Default)]
struct WindowSet {
    active: Vec<Arc<WindowHandle>>,
    closing: Vec<Arc<WindowHandle>>,
}

impl WindowSet {
    fn find(&self, id: &WindowId) -> Option<&Arc<WindowHandle>> {
        self.active
            .iter()
            .chain(self.closing.iter())
            .find(|handle| handle.id() == id)
    }

    fn update_async_inboxes(&self, allowed: bool) {
        let enabled = allowed && self.active.len() > 1;
        for handle in &self.active {
            handle.inbox.set_enabled(enabled);
        }
    }
}

/// All windows of one user session
///
/// Transactions of different windows run in parallel; each window is
/// serialized by its own lock.
pub struct Application {
    config: AppConfig,
    windows: RwLock<WindowSet>,
    next_window: AtomicU64,
    locale: RwLock<SmartString>,
    disposed: AtomicBool,
    waker: Option<Sender<WindowId>>,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(WindowSet::default()),
            next_window: AtomicU64::new(0),
            locale: RwLock::new(SmartString::new()),
            disposed: AtomicBool::new(false),
            waker: None,
        }
    }

    /// Notify `waker` with the window id whenever a window has work to pick up
    pub fn with_waker(config: AppConfig, waker: Sender<WindowId>) -> Self {
        Self {
            waker: Some(waker),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Create and register a window
    ///
    /// `build` runs with the window active but before registration, so what
    /// it does is part of the initial render rather than a diff. Every
    /// window after the first is announced to the main window with an
    /// `OpenWindow` command carrying the title and open features `build` set.
    pub fn open_window(
        &self,
        build: impl FnOnce(&mut Window) -> anyhow::Result<()>,
    ) -> Result<WindowId> {
        if self.is_disposed() {
            return Err(SyncError::ApplicationDisposed);
        }
        let seq = self.next_window.fetch_add(1, Ordering::Relaxed);
        let id = if seq == 0 {
            WindowId::new(self.config.default_window_id.as_str())
        } else {
            WindowId::new(format!("w_{seq}"))
        };

        let mut window = Window::new(id.clone());
        {
            let mut stack = ContextStack::new();
            let mut scope = ContextScope::enter(&mut window, &mut stack);
            build(scope.window()).map_err(|error| SyncError::WindowInit {
                window: id.clone(),
                error,
            })?;
        }
        window.set_recording(true);
        let open = window.open_command();

        let handle = Arc::new(WindowHandle::new(window, self.waker.clone()));
        let mut windows = self.windows.write();
        windows.active.push(handle);
        if windows.active.len() > 1 {
            windows.active[0].post_command(open);
        }
        windows.update_async_inboxes(self.config.allow_async_window_updates);
        info!(window = %id, windows = windows.active.len(), "window opened");
        Ok(id)
    }

    /// Move a window to the closing set
    ///
    /// The window stays reachable until the end of its own next transaction,
    /// which delivers the `CloseWindow` command and then removes it.
    pub fn close_window(&self, id: &WindowId) -> Result<()> {
        let mut windows = self.windows.write();
        let Some(position) = windows.active.iter().position(|handle| handle.id() == id) else {
            if windows.closing.iter().any(|handle| handle.id() == id) {
                return Ok(());
            }
            return Err(SyncError::WindowNotFound(id.clone()));
        };
        let handle = windows.active.remove(position);
        handle.inbox.set_enabled(false);
        handle.post_command(Command::CloseWindow);
        windows.closing.push(handle);
        windows.update_async_inboxes(self.config.allow_async_window_updates);
        info!(window = %id, "window closing");
        Ok(())
    }

    /// Take a window out of the closing set, if it is there
    pub(crate) fn remove_if_closing(&self, id: &WindowId) -> Option<Arc<WindowHandle>> {
        let mut windows = self.windows.write();
        let position = windows.closing.iter().position(|handle| handle.id() == id)?;
        let handle = windows.closing.remove(position);
        debug!(window = %id, "closed window removed");
        Some(handle)
    }

    pub(crate) fn handle(&self, id: &WindowId) -> Result<Arc<WindowHandle>> {
        self.windows
            .read()
            .find(id)
            .cloned()
            .ok_or_else(|| SyncError::WindowNotFound(id.clone()))
    }

    /// Every window other than `id`, active ones first
    pub(crate) fn siblings(&self, id: &WindowId) -> Vec<Arc<WindowHandle>> {
        let windows = self.windows.read();
        windows
            .active
            .iter()
            .chain(windows.closing.iter())
            .filter(|handle| handle.id() != id)
            .cloned()
            .collect()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        let windows = self.windows.read();
        windows
            .active
            .iter()
            .chain(windows.closing.iter())
            .map(|handle| handle.id().clone())
            .collect()
    }

    pub fn active_window_ids(&self) -> Vec<WindowId> {
        self.windows
            .read()
            .active
            .iter()
            .map(|handle| handle.id().clone())
            .collect()
    }

    pub fn contains_window(&self, id: &WindowId) -> bool {
        self.windows.read().find(id).is_some()
    }

    pub fn is_window_active(&self, id: &WindowId) -> bool {
        self.windows.read().active.iter().any(|handle| handle.id() == id)
    }

    /// Acquire exclusive access to a window for one synchronization
    pub fn begin_transaction(&self, id: &WindowId) -> Result<Transaction<'_>> {
        if self.is_disposed() {
            return Err(SyncError::ApplicationDisposed);
        }
        Transaction::begin(self, self.handle(id)?)
    }

    /// Run `f` against `id`, entered on top of `stack`
    ///
    /// Fails if the window is already on the stack, since its lock is held
    /// further up the call chain.
    pub fn switch_into<R>(
        &self,
        stack: &mut ContextStack,
        id: &WindowId,
        f: impl FnOnce(&mut WindowContext<'_>) -> R,
    ) -> Result<R> {
        if stack.contains(id) {
            return Err(SyncError::ReentrantWindow(id.clone()));
        }
        let handle = self.handle(id)?;
        let mut window = handle
            .window
            .try_lock_for(self.config.lock_timeout)
            .ok_or_else(|| SyncError::LockTimeout(id.clone()))?;
        if window.is_disposed() {
            return Err(SyncError::WindowClosed(id.clone()));
        }

        let result = {
            let mut scope = ContextScope::enter(&mut *window, stack);
            let mut cx = scope.context(self);
            f(&mut cx)
        };
        if handle.take_dispose_pending() {
            window.dispose();
        } else if window.updates().has_pending() {
            handle.wake();
        }
        Ok(result)
    }

    pub fn create_task_queue(&self, id: &WindowId) -> Result<TaskQueueHandle> {
        self.handle(id)?.tasks.create_queue()
    }

    pub fn remove_task_queue(&self, id: &WindowId, queue: TaskQueueHandle) -> Result<bool> {
        Ok(self.handle(id)?.tasks.remove_queue(queue))
    }

    /// Queue work to run inside the window's next transaction
    pub fn enqueue_deferred<F>(&self, id: &WindowId, queue: TaskQueueHandle, task: F) -> Result<()>
    where
        F: FnOnce(&mut WindowContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.handle(id)?.tasks.enqueue(queue, task)
    }

    pub fn enqueue_deferred_task(
        &self,
        id: &WindowId,
        queue: TaskQueueHandle,
        task: Box<dyn DeferredTask>,
    ) -> Result<()> {
        self.handle(id)?.tasks.enqueue_task(queue, task)
    }

    /// Take the window's queued tasks without running them
    pub fn drain_deferred(&self, id: &WindowId) -> Result<Vec<Box<dyn DeferredTask>>> {
        Ok(self.handle(id)?.tasks.drain_all())
    }

    pub fn has_queued_tasks(&self, id: &WindowId) -> Result<bool> {
        Ok(self.handle(id)?.tasks.has_tasks())
    }

    /// Whether the window's client should come back for a synchronization
    ///
    /// A window locked by a running transaction reports only what waits
    /// outside its lock; that transaction delivers its own diff.
    pub fn has_async_updates(&self, id: &WindowId) -> Result<bool> {
        let handle = self.handle(id)?;
        Ok(!handle.inbox.is_empty()
            || handle.has_posted()
            || handle.tasks.has_tasks()
            || handle
                .window
                .try_lock()
                .is_some_and(|window| window.updates().has_pending()))
    }

    /// Flag a full refresh for the window's next transaction
    pub fn request_full_refresh(&self, id: &WindowId) -> Result<()> {
        self.handle(id)?.request_full_refresh();
        Ok(())
    }

    pub fn locale(&self) -> String {
        self.locale.read().to_string()
    }

    /// Change the locale; every window re-renders in full on its next transaction
    pub fn set_locale(&self, locale: &str) {
        {
            let mut current = self.locale.write();
            if current.as_str() == locale {
                return;
            }
            *current = locale.into();
        }
        let windows = self.windows.read();
        for handle in windows.active.iter().chain(windows.closing.iter()) {
            handle.request_full_refresh();
        }
        debug!(locale, "locale changed");
    }

    /// Tear down every window; a second call is an error
    ///
    /// A window still locked after `lock_timeout` is torn down by the
    /// transaction holding it when that transaction ends. Must not be called
    /// while this thread holds a window lock.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(SyncError::ApplicationDisposed);
        }
        let handles: Vec<Arc<WindowHandle>> = {
            let mut windows = self.windows.write();
            let mut handles = std::mem::take(&mut windows.active);
            handles.append(&mut windows.closing);
            handles
        };
        for handle in &handles {
            handle.tasks.dispose();
            match handle.window.try_lock_for(self.config.lock_timeout) {
                Some(mut window) => {
                    window.dispose();
                }
                None => {
                    handle.mark_dispose_pending();
                    // the holder may have released between the timeout and the mark
                    if let Some(mut window) = handle.window.try_lock() {
                        if handle.take_dispose_pending() {
                            window.dispose();
                        }
                    }
                    warn!(window = %handle.id(), "window busy, dispose deferred to lock holder");
                }
            }
        }
        info!(windows = handles.len(), "application disposed");
        Ok(())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("windows", &self.window_ids())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
