use std::time::Duration;

/// Per-application engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Push diffs of idle windows when another window of the same
    /// application commits
    pub allow_async_window_updates: bool,
    /// How long to wait for a window that another transaction holds
    pub lock_timeout: Duration,
    /// Flag a full refresh after a failure that left the tree mutated
    pub full_refresh_on_error: bool,
    /// Id given to the first window of an application
    pub default_window_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            allow_async_window_updates: true,
            lock_timeout: Duration::from_secs(5),
            full_refresh_on_error: true,
            default_window_id: "main".to_string(),
        }
    }
}

impl AppConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_async_window_updates(mut self, enabled: bool) -> Self {
        self.allow_async_window_updates = enabled;
        self
    }

    pub fn with_full_refresh_on_error(mut self, enabled: bool) -> Self {
        self.full_refresh_on_error = enabled;
        self
    }
}
