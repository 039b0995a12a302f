//! Host surface for the synchronization engine
//!
//! Maps top-level sessions to applications and runs transactions for a
//! transport. Logging is installed here, not in the engine.

mod config;
mod host;
mod metrics;
mod registry;

pub use config::{ConfigError, ServerConfig, init_tracing};
pub use host::{HostError, Result, SyncHost};
pub use metrics::SyncMetrics;
pub use registry::{SessionRegistry, UserInstance};
