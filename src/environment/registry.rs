use super::{Environment, EventHub};
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, OnceLock};

/// Shared, lockable access to one backend plus its event hub.
#[derive(Clone)]
pub struct EnvironmentHandle {
    backend: Arc<Mutex<Box<dyn Environment>>>,
    events: Arc<EventHub>,
    name: &'static str,
}

impl EnvironmentHandle {
    pub fn new<E: Environment + 'static>(env: E) -> Self {
        let name = env.name();
        Self {
            backend: Arc::new(Mutex::new(Box::new(env))),
            events: Arc::new(EventHub::new()),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Environment>> {
        self.backend.lock()
    }

    pub fn same_as(&self, other: &EnvironmentHandle) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Set-once slot for the process environment.
#[derive(Default)]
pub struct EnvironmentRegistry {
    slot: OnceLock<EnvironmentHandle>,
}

static GLOBAL: EnvironmentRegistry = EnvironmentRegistry::new();

impl EnvironmentRegistry {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    pub fn global() -> &'static EnvironmentRegistry {
        &GLOBAL
    }

    /// Stores `handle` unless a handle is already set. The first handle
    /// always stays.
    pub fn set(&self, handle: EnvironmentHandle) -> bool {
        match self.slot.set(handle) {
            Ok(()) => {
                log::info!("environment set to {}", self.slot.get().map_or("?", |h| h.name()));
                true
            }
            Err(rejected) => {
                log::error!(
                    "environment is already set, ignoring {} backend",
                    rejected.name()
                );
                false
            }
        }
    }

    pub fn get(&self) -> Option<EnvironmentHandle> {
        let handle = self.slot.get().cloned();
        if handle.is_none() {
            log::error!("environment is not set");
        }
        handle
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvironmentHandle, EnvironmentRegistry};
    use crate::environment::HeadlessEnvironment;

    #[test]
    fn registry_accepts_exactly_one_environment() {
        let registry = EnvironmentRegistry::new();
        assert!(registry.get().is_none());

        let first = EnvironmentHandle::new(HeadlessEnvironment::new());
        let second = EnvironmentHandle::new(HeadlessEnvironment::new());
        assert!(registry.set(first.clone()));
        assert!(!registry.set(second.clone()));
        assert!(!registry.set(second.clone()));

        let current = registry.get().unwrap();
        assert!(current.same_as(&first));
        assert!(!current.same_as(&second));
    }
}
