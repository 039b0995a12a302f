//! Incremental synchronization of server-held component trees
//!
//! A [`Window`] owns one tree and records every mutation into an
//! [`UpdateManager`]. A [`Transaction`] takes the window's lock, lets
//! collaborators apply input, validates, freezes the diff, hands it to an
//! [`OutputProcessor`] and commits. Windows of one user session live in an
//! [`Application`].

pub mod application;
pub mod config;
pub mod context;
pub mod error;
pub mod modal;
pub mod queue;
pub mod render_state;
pub mod sync;
pub mod tree;
pub mod update;
pub mod window;

pub use application::Application;
pub use config::AppConfig;
pub use context::{ContextStack, WindowContext};
pub use error::{Result, SyncError, TreeError};
pub use queue::{DeferredTask, TaskQueueHandle};
pub use render_state::RenderStateCache;
pub use sync::{
    CommitSummary, DiffLog, InputProcessor, NoValidation, OutputProcessor, RenderContext,
    SyncOutcome, SyncRequest, Synchronization, Transaction, TransactionState, Validator,
};
pub use tree::{ModalCapability, Node, NodeId, Tree};
pub use update::{ComponentUpdate, PropertyUpdate, UpdateBatch, UpdateManager};
pub use window::{FOCUS_PROPERTY, MODAL_PROPERTY, TITLE_PROPERTY, Window};

pub use tether_types::{Command, OpenFeatures, PropertyValue, RenderId, WindowId};
