mod inbox;
mod tasks;

pub use inbox::AsyncInbox;
pub use tasks::{DeferredTask, TaskQueueHandle, TaskQueues};
