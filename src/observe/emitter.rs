use std::sync::Mutex;

use event_emitter_rs::EventEmitter;
use tracing::warn;

use super::{Change, ChangeKind, ObservableContainer};

/// Observer that re-emits changes through an [`EventEmitter`].
///
/// Each change is emitted under its kind name (`"added"`, `"updated"`,
/// `"removed"`, `"field"`). Listeners run on the emitter's own threads, so
/// delivery is asynchronous.
///
/// ```ignore
/// let observer = Arc::new(EmitterObserver::new());
/// observer.on(ChangeKind::Added, |change| println!("{:?}", change));
/// let store = Store::new(Config::new().with_observer(observer.clone()));
/// ```
pub struct EmitterObserver {
    emitter: Mutex<EventEmitter>,
}

impl EmitterObserver {
    pub fn new() -> Self {
        Self {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Register a listener for one kind of change. Returns the listener id.
    pub fn on<F>(&self, kind: ChangeKind, listener: F) -> Option<String>
    where
        F: Fn(Change) + Send + Sync + 'static,
    {
        let mut emitter = self.emitter.lock().ok()?;
        Some(emitter.on(kind.as_str(), listener))
    }

    pub fn remove_listener(&self, id: &str) -> bool {
        match self.emitter.lock() {
            Ok(mut emitter) => emitter.remove_listener(id).is_some(),
            Err(_) => false,
        }
    }
}

impl Default for EmitterObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableContainer for EmitterObserver {
    fn notify(&self, change: &Change) {
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(change.kind.as_str(), change.clone());
            }
            Err(_) => warn!(kind = change.kind.as_str(), "emitter lock poisoned, change dropped"),
        }
    }
}
