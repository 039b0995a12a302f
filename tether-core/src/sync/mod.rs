mod log;
mod synchronization;
mod transaction;

pub use log::DiffLog;
pub use synchronization::{
    InputProcessor, NoValidation, OutputProcessor, RenderContext, SyncOutcome, SyncRequest,
    Synchronization, Validator,
};
pub use transaction::{CommitSummary, Transaction, TransactionState};
