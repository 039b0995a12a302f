mod manager;
mod record;

pub use manager::{UpdateBatch, UpdateManager};
pub use record::{ComponentUpdate, PropertyUpdate};
