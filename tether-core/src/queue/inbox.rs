use crate::update::UpdateBatch;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};

/// Batches pushed to a window by transactions of its sibling windows
///
/// The window's own next transaction drains them and delivers them ahead of
/// its own diff.
pub struct AsyncInbox {
    tx: Sender<UpdateBatch>,
    rx: Receiver<UpdateBatch>,
    enabled: AtomicBool,
}

impl AsyncInbox {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn push(&self, batch: UpdateBatch) {
        // both ends live in self, so the channel cannot be disconnected
        let _ = self.tx.send(batch);
    }

    pub fn drain(&self) -> Vec<UpdateBatch> {
        self.rx.try_iter().collect()
    }

    /// Put drained batches back ahead of anything pushed since
    ///
    /// Callers hold the window lock, which every pusher takes too.
    pub fn restore(&self, batches: Vec<UpdateBatch>) {
        if batches.is_empty() {
            return;
        }
        let newer = self.drain();
        for batch in batches.into_iter().chain(newer) {
            self.push(batch);
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for AsyncInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::UpdateManager;
    use tether_types::Command;

    fn named(name: &str) -> UpdateBatch {
        let mut manager = UpdateManager::new();
        manager.enqueue_command(Command::custom(name, serde_json::Value::Null));
        manager.take()
    }

    #[test]
    fn test_restore_keeps_older_batches_first() {
        let inbox = AsyncInbox::new();
        inbox.push(named("first"));
        let drained = inbox.drain();
        inbox.push(named("second"));

        inbox.restore(drained);
        let names: Vec<String> = inbox
            .drain()
            .iter()
            .map(|b| b.commands()[0].name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_push_and_drain_in_order() {
        let inbox = AsyncInbox::new();
        assert!(!inbox.is_enabled());
        for name in ["first", "second"] {
            let mut manager = UpdateManager::new();
            manager.enqueue_command(Command::custom(name, serde_json::Value::Null));
            inbox.push(manager.take());
        }
        assert_eq!(inbox.len(), 2);

        let drained = inbox.drain();
        let names: Vec<&str> = drained.iter().map(|b| b.commands()[0].name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(inbox.is_empty());
    }
}
