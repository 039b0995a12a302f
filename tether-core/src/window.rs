use crate::error::TreeError;
use crate::modal;
use crate::render_state::RenderStateCache;
use crate::tree::{Node, NodeId, Tree};
use crate::update::{UpdateBatch, UpdateManager};
use ahash::AHashMap;
use std::any::Any;
use std::fmt;
use std::time::Instant;
use tether_types::{Command, OpenFeatures, PropertyValue, RenderId, WindowId};
use tracing::{debug, trace};

/// Window property carrying the render-id of the focused node
pub const FOCUS_PROPERTY: &str = "focus";

/// Window property carrying the client window's title
pub const TITLE_PROPERTY: &str = "title";

/// Property recorded when a node starts or stops claiming modality
pub const MODAL_PROPERTY: &str = "modal";

/// A session root: one component tree synchronized with one client view
///
/// Mutations are only accepted while the window is active in some context,
/// that is inside a transaction or a `switch_into` scope.
pub struct Window {
    id: WindowId,
    tree: Tree,
    index: AHashMap<RenderId, NodeId>,
    pending_unregister: Vec<(RenderId, NodeId)>,
    next_render_seq: u64,
    updates: UpdateManager,
    render_states: RenderStateCache,
    modal_claimants: Vec<NodeId>,
    focused: Option<NodeId>,
    title: Option<String>,
    open_features: OpenFeatures,
    context_depth: u32,
    recording: bool,
    transaction_id: u64,
    last_update: Option<Instant>,
    mutations: u64,
    disposed: bool,
}

impl Window {
    pub fn new(id: WindowId) -> Self {
        let mut window = Self {
            id,
            tree: Tree::new(Node::new("Window")),
            index: AHashMap::new(),
            pending_unregister: Vec::new(),
            next_render_seq: 0,
            updates: UpdateManager::new(),
            render_states: RenderStateCache::new(),
            modal_claimants: Vec::new(),
            focused: None,
            title: None,
            open_features: OpenFeatures::default(),
            context_depth: 0,
            recording: false,
            transaction_id: 0,
            last_update: None,
            mutations: 0,
            disposed: false,
        };
        let root = window.tree.root();
        window.register_subtree(root);
        window
    }

    pub fn id(&self) -> &WindowId {
        &self.id
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.tree.node(id)
    }

    pub fn node_by_render_id(&self, id: &RenderId) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    pub fn render_id(&self, node: NodeId) -> Option<&RenderId> {
        self.tree.get(node)?.render_id()
    }

    /// Whether the node is attached and indexed under its current render-id
    pub fn is_registered(&self, node: NodeId) -> bool {
        match self.render_id(node) {
            Some(id) => self.index.get(id) == Some(&node) && self.tree.is_attached(node),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.context_depth > 0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn updates(&self) -> &UpdateManager {
        &self.updates
    }

    pub fn render_states(&self) -> &RenderStateCache {
        &self.render_states
    }

    pub fn render_states_mut(&mut self) -> &mut RenderStateCache {
        &mut self.render_states
    }

    pub fn render_state<T: Any>(&self, node: NodeId) -> Option<&T> {
        self.render_states.get(node)
    }

    pub fn set_render_state<T: Any + Send>(&mut self, node: NodeId, state: T) {
        self.render_states.set(node, state);
    }

    pub fn modal_claimants(&self) -> &[NodeId] {
        &self.modal_claimants
    }

    /// Resolve the node that currently gates input
    pub fn modal_root(&self) -> Option<NodeId> {
        modal::resolve_modal_root(&self.tree, &self.modal_claimants)
    }

    /// Whether input addressed to `node` is legal under the current modal root
    pub fn verify_modal_context(&self, node: NodeId) -> bool {
        modal::verify_modal_context(&self.tree, self.modal_root(), node)
    }

    /// The focused node, if it is still registered
    pub fn focused(&self) -> Option<NodeId> {
        self.focused.filter(|node| self.is_registered(*node))
    }

    pub fn create_node(&mut self, node: Node) -> NodeId {
        self.tree.create(node)
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.insert_at(parent, None, child)
    }

    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.insert_at(parent, Some(index), child)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.ensure_active()?;
        if self.tree.parent(child) != Some(parent) {
            return Err(TreeError::NotAChild { parent, child });
        }
        let was_attached = self.tree.is_attached(parent);
        if self.recording {
            self.updates.record_child_remove(&self.tree, parent, child);
        }
        self.tree.detach(parent, child)?;
        if was_attached {
            self.unregister_subtree(child);
        }
        self.mutations += 1;
        Ok(())
    }

    /// Detach a node from whatever parent it has
    pub fn remove(&mut self, node: NodeId) -> Result<(), TreeError> {
        if node == self.root() {
            return Err(TreeError::RootNode("removed"));
        }
        match self.tree.node(node)?.parent() {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    pub fn remove_all(&mut self, parent: NodeId) -> Result<(), TreeError> {
        let children = self.tree.node(parent)?.children().to_vec();
        for child in children.into_iter().rev() {
            self.remove_child(parent, child)?;
        }
        Ok(())
    }

    /// Free a detached node and its subtree
    pub fn dispose_node(&mut self, node: NodeId) -> Result<usize, TreeError> {
        let subtree = self.tree.subtree(node);
        let freed = self.tree.dispose(node)?;
        for id in subtree {
            self.render_states.clear(id);
        }
        Ok(freed)
    }

    /// Set a property, returning the previous value
    pub fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<PropertyValue, TreeError> {
        self.ensure_active()?;
        let value = value.into();
        let old = self.tree.node_mut(node)?.put_property(name, value.clone());
        if self.recording {
            self.updates
                .record_property_change(&self.tree, node, name, old.clone(), value);
        }
        self.mutations += 1;
        Ok(old)
    }

    /// Show or hide a node
    ///
    /// Hiding is reported to the client as a removal from the parent and
    /// showing as an add.
    pub fn set_visible(&mut self, node: NodeId, visible: bool) -> Result<(), TreeError> {
        self.ensure_active()?;
        if node == self.root() {
            return Err(TreeError::RootNode("hidden"));
        }
        if self.tree.node(node)?.is_visible() == visible {
            return Ok(());
        }
        let parent = self.tree.parent(node);
        if visible {
            self.tree.node_mut(node)?.set_visible_flag(true);
            if let (true, Some(parent)) = (self.recording, parent) {
                self.updates.record_child_add(&self.tree, parent, node);
            }
        } else {
            if let (true, Some(parent)) = (self.recording, parent) {
                self.updates.record_child_remove(&self.tree, parent, node);
            }
            self.tree.node_mut(node)?.set_visible_flag(false);
        }
        self.mutations += 1;
        Ok(())
    }

    pub fn set_layout_data(
        &mut self,
        node: NodeId,
        value: Option<PropertyValue>,
    ) -> Result<(), TreeError> {
        self.ensure_active()?;
        let old = self.tree.node_mut(node)?.replace_layout_data(value.clone());
        if old == value {
            return Ok(());
        }
        if let (true, Some(parent)) = (self.recording, self.tree.parent(node)) {
            self.updates.record_layout_data_update(&self.tree, parent, node);
        }
        self.mutations += 1;
        Ok(())
    }

    /// Start or stop claiming modality on a modal-capable node
    pub fn set_modal(&mut self, node: NodeId, modal: bool) -> Result<(), TreeError> {
        self.ensure_active()?;
        let entry = self.tree.node_mut(node)?;
        let previous = entry.as_modal().ok_or(TreeError::NotModalCapable(node))?;
        if previous.modal == modal {
            return Ok(());
        }
        entry.set_modal_flag(modal);

        if self.is_registered(node) {
            if modal {
                self.claim_modal(node);
            } else {
                self.modal_claimants.retain(|claimant| *claimant != node);
            }
        }
        if self.recording {
            self.updates.record_property_change(
                &self.tree,
                node,
                MODAL_PROPERTY,
                previous.modal.into(),
                modal.into(),
            );
        }
        self.mutations += 1;
        Ok(())
    }

    pub fn set_focus_delegate(
        &mut self,
        node: NodeId,
        target: Option<NodeId>,
    ) -> Result<(), TreeError> {
        self.ensure_active()?;
        self.tree.node_mut(node)?.set_focus_delegate(target);
        Ok(())
    }

    /// Focus a node, following its focus delegate
    pub fn set_focused(&mut self, node: Option<NodeId>) -> Result<(), TreeError> {
        self.ensure_active()?;
        let target = match node {
            Some(id) => {
                let delegate = self
                    .tree
                    .node(id)?
                    .focus_delegate()
                    .filter(|delegate| self.tree.contains(*delegate));
                Some(delegate.unwrap_or(id))
            }
            None => None,
        };
        let current = self.focused();
        if target == current {
            return Ok(());
        }

        let old = self.focus_value(current);
        self.focused = target;
        if self.recording {
            let new = self.focus_value(target);
            self.updates.record_window_property(FOCUS_PROPERTY, old, new);
        }
        self.mutations += 1;
        Ok(())
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<String>) -> Result<(), TreeError> {
        self.ensure_active()?;
        if self.title == title {
            return Ok(());
        }
        let old = self.title.take().map(PropertyValue::from).unwrap_or(PropertyValue::Nil);
        if self.recording {
            let new = title.clone().map(PropertyValue::from).unwrap_or(PropertyValue::Nil);
            self.updates.record_window_property(TITLE_PROPERTY, old, new);
        }
        self.title = title;
        self.mutations += 1;
        Ok(())
    }

    /// Browser chrome the client should give this window when opening it
    pub fn open_features(&self) -> OpenFeatures {
        self.open_features
    }

    /// Only consulted when the window is opened
    pub fn set_open_features(&mut self, features: OpenFeatures) {
        self.open_features = features;
    }

    /// Command asking the main window's client to open this window
    pub fn open_command(&self) -> Command {
        Command::OpenWindow {
            window: self.id.clone(),
            title: self.title.clone(),
            features: self.open_features,
        }
    }

    /// Queue a command for this window's client
    pub fn enqueue_command(&mut self, command: Command) -> Result<(), TreeError> {
        self.ensure_active()?;
        self.updates.enqueue_command(command);
        Ok(())
    }

    pub fn request_full_refresh(&mut self) {
        self.updates.request_full_refresh();
    }

    pub(crate) fn enter_context(&mut self) {
        self.context_depth += 1;
    }

    pub(crate) fn exit_context(&mut self) {
        self.context_depth = self.context_depth.saturating_sub(1);
    }

    /// Start recording mutations; set once the application registers the window
    pub(crate) fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub(crate) fn mutations(&self) -> u64 {
        self.mutations
    }

    pub(crate) fn updates_mut(&mut self) -> &mut UpdateManager {
        &mut self.updates
    }

    /// Split borrow used while rendering
    pub(crate) fn render_parts(&mut self) -> (&Tree, &UpdateManager, &mut RenderStateCache) {
        (&self.tree, &self.updates, &mut self.render_states)
    }

    pub(crate) fn begin_update(&mut self) -> u64 {
        self.transaction_id += 1;
        self.last_update = Some(Instant::now());
        self.transaction_id
    }

    pub(crate) fn absorb_commands(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.updates.enqueue_command(command);
        }
    }

    /// Evict render states the pending diff invalidates
    pub(crate) fn purge_render_states(&mut self) {
        if self.updates.is_full_refresh() {
            self.render_states.clear_all();
        } else {
            self.render_states.purge(&self.tree, self.updates.snapshot());
        }
    }

    /// Move the pending diff out for delivery outside a transaction
    pub(crate) fn take_pending(&mut self) -> UpdateBatch {
        self.purge_render_states();
        let batch = self.updates.take();
        self.process_removals();
        batch
    }

    /// Finish unregistering nodes detached since the last boundary
    pub(crate) fn process_removals(&mut self) {
        if self.pending_unregister.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_unregister);
        let count = pending.len();
        for (id, node) in pending {
            let attached = self.tree.is_attached(node);
            let current = self.tree.get(node).and_then(Node::render_id) == Some(&id);
            if self.index.get(&id) == Some(&node) && !(attached && current) {
                self.index.remove(&id);
            }
            if !attached {
                if let Ok(entry) = self.tree.node_mut(node) {
                    entry.last_render_id = Some(id);
                }
                self.modal_claimants.retain(|claimant| *claimant != node);
            }
        }
        self.modal_claimants.retain(|claimant| self.tree.contains(*claimant));
        trace!(window = %self.id, count, "unregistered removed nodes");
    }

    /// Tear down caches and bookkeeping; only the first call has an effect
    pub(crate) fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.updates.purge();
        self.render_states.clear_all();
        self.pending_unregister.clear();
        self.modal_claimants.clear();
        self.focused = None;
        self.index.clear();
        debug!(window = %self.id, "window disposed");
        true
    }

    fn ensure_active(&self) -> Result<(), TreeError> {
        if self.disposed {
            return Err(TreeError::Disposed(self.id.clone()));
        }
        if self.context_depth == 0 {
            return Err(TreeError::OutsideContext {
                window: self.id.clone(),
            });
        }
        Ok(())
    }

    fn insert_at(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.ensure_active()?;
        self.tree.insert_child(parent, index, child)?;
        if self.tree.is_attached(child) {
            self.register_subtree(child);
        }
        if self.recording {
            self.updates.record_child_add(&self.tree, parent, child);
        }
        self.mutations += 1;
        Ok(())
    }

    fn register_subtree(&mut self, node: NodeId) {
        for id in self.tree.subtree(node) {
            let Ok(entry) = self.tree.node_mut(id) else {
                continue;
            };
            let render_id = match &entry.render_id {
                Some(existing) if !self.index.contains_key(existing) => existing.clone(),
                _ => {
                    self.next_render_seq += 1;
                    let fresh = RenderId::from_sequence(self.next_render_seq);
                    entry.render_id = Some(fresh.clone());
                    fresh
                }
            };
            let claims = entry.as_modal().is_some_and(|capability| capability.modal);
            self.index.insert(render_id, id);
            if claims {
                self.claim_modal(id);
            }
        }
    }

    fn unregister_subtree(&mut self, node: NodeId) {
        for id in self.tree.subtree(node) {
            if let Some(render_id) = self.tree.get(id).and_then(Node::render_id) {
                self.pending_unregister.push((render_id.clone(), id));
            }
        }
    }

    fn claim_modal(&mut self, node: NodeId) {
        if !self.modal_claimants.contains(&node) {
            self.modal_claimants.push(node);
        }
    }

    fn focus_value(&self, node: Option<NodeId>) -> PropertyValue {
        node.and_then(|id| self.render_id(id))
            .map(|id| PropertyValue::from(id.as_str()))
            .unwrap_or(PropertyValue::Nil)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("nodes", &self.tree.len())
            .field("transaction_id", &self.transaction_id)
            .field("active", &self.is_active())
            .field("disposed", &self.disposed)
            .finish()
    }
}
