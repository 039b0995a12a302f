use ahash::AHashMap;
use crossbeam_channel::{Receiver, unbounded};
use parking_lot::RwLock;
use std::sync::Arc;
use tether_core::{AppConfig, Application};
use tether_types::{SessionId, WindowId};

/// One user session: its application and the wake-ups it has produced
pub struct UserInstance {
    id: SessionId,
    app: Arc<Application>,
    wakeups: Receiver<WindowId>,
}

impl UserInstance {
    fn new(id: SessionId, config: AppConfig) -> Self {
        let (waker, wakeups) = unbounded();
        Self {
            id,
            app: Arc::new(Application::with_waker(config, waker)),
            wakeups,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// Windows signalled since the last call, each listed once, oldest first
    pub fn take_wakeups(&self) -> Vec<WindowId> {
        let mut windows: Vec<WindowId> = Vec::new();
        for window in self.wakeups.try_iter() {
            if !windows.contains(&window) {
                windows.push(window);
            }
        }
        windows
    }
}

/// Session id to user instance
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<AHashMap<SessionId, Arc<UserInstance>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the instance for `id`, or `None` if the session already exists
    pub fn create(&self, id: SessionId, config: AppConfig) -> Option<Arc<UserInstance>> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return None;
        }
        let instance = Arc::new(UserInstance::new(id.clone(), config));
        sessions.insert(id, instance.clone());
        Some(instance)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<UserInstance>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<UserInstance>> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
