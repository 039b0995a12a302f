use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
use std::fmt;
use tether_types::{PropertyValue, RenderId};

/// Generational handle into a window's node arena
///
/// A handle whose slot has been reused no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Modal capability of a node, present only on nodes that can claim modality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalCapability {
    pub modal: bool,
}

/// A unit of the server-held UI tree
///
/// The engine treats `kind` and the property values as opaque; it only
/// tracks structure, visibility and changes.
#[derive(Debug, Clone)]
pub struct Node {
    kind: SmartString,
    properties: SmallVec<[(SmartString, PropertyValue); 4]>,
    layout_data: Option<PropertyValue>,
    visible: bool,
    modal: Option<bool>,
    focus_delegate: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) render_id: Option<RenderId>,
    pub(crate) last_render_id: Option<RenderId>,
}

impl Node {
    pub fn new(kind: impl Into<SmartString>) -> Self {
        Self {
            kind: kind.into(),
            properties: SmallVec::new(),
            layout_data: None,
            visible: true,
            modal: None,
            focus_delegate: None,
            children: Vec::new(),
            parent: None,
            render_id: None,
            last_render_id: None,
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.put_property(name, value.into());
        self
    }

    pub fn with_layout_data(mut self, value: impl Into<PropertyValue>) -> Self {
        self.layout_data = Some(value.into());
        self
    }

    /// Give the node the modal capability, initially not claiming modality
    pub fn modal_capable(mut self) -> Self {
        self.modal.get_or_insert(false);
        self
    }

    /// Give the node the modal capability and claim modality
    pub fn modal(mut self) -> Self {
        self.modal = Some(true);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Delegate focus requests to another node, usually a descendant
    pub fn with_focus_delegate(mut self, target: NodeId) -> Self {
        self.focus_delegate = Some(target);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn layout_data(&self) -> Option<&PropertyValue> {
        self.layout_data.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn as_modal(&self) -> Option<ModalCapability> {
        self.modal.map(|modal| ModalCapability { modal })
    }

    pub fn focus_delegate(&self) -> Option<NodeId> {
        self.focus_delegate
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn render_id(&self) -> Option<&RenderId> {
        self.render_id.as_ref()
    }

    /// Render-id the node had when it was last unregistered
    pub fn last_render_id(&self) -> Option<&RenderId> {
        self.last_render_id.as_ref()
    }

    /// Store a property, returning the previous value (`Nil` when unset)
    ///
    /// Storing `Nil` removes the property.
    pub(crate) fn put_property(&mut self, name: &str, value: PropertyValue) -> PropertyValue {
        let position = self.properties.iter().position(|(key, _)| key == name);
        match (position, value.is_nil()) {
            (Some(i), true) => self.properties.remove(i).1,
            (Some(i), false) => std::mem::replace(&mut self.properties[i].1, value),
            (None, true) => PropertyValue::Nil,
            (None, false) => {
                self.properties.push((name.into(), value));
                PropertyValue::Nil
            }
        }
    }

    pub(crate) fn replace_layout_data(
        &mut self,
        value: Option<PropertyValue>,
    ) -> Option<PropertyValue> {
        std::mem::replace(&mut self.layout_data, value)
    }

    pub(crate) fn set_visible_flag(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_modal_flag(&mut self, modal: bool) -> bool {
        match self.modal.as_mut() {
            Some(flag) => {
                *flag = modal;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_focus_delegate(&mut self, target: Option<NodeId>) {
        self.focus_delegate = target;
    }
}
