mod command;
mod ids;
mod value;

pub use command::{Command, OpenFeatures};
pub use ids::{RenderId, SessionId, WindowId};
pub use value::PropertyValue;
