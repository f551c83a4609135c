use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    events::Event,
    store::{IngestOutcome, SessionStore},
};

/// Handle to a session shared by the ingest worker and the inspector UI.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionStore>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, event: Event) -> IngestOutcome {
        self.write(|store| store.ingest(event))
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionStore) -> R) -> R {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut SessionStore) -> R) -> R {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_paused(&self) -> bool {
        self.write(|store| {
            let paused = !store.is_paused();
            store.set_paused(paused);
            paused
        })
    }
}
