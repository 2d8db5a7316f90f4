//! Change notification.
//!
//! The store reports every structural change (record added, synced, removed)
//! and every local field write to an optional [`ObservableContainer`]. Nothing
//! in the store depends on what the observer does with it.

#[cfg(feature = "emitter")]
mod emitter;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[cfg(feature = "emitter")]
pub use emitter::EmitterObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
    Field,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
            ChangeKind::Removed => "removed",
            ChangeKind::Field => "field",
        }
    }
}

/// One observed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub record_type: String,
    /// Server id, `None` while the record is unpersisted.
    pub id: Option<String>,
    /// Attribute name for [`ChangeKind::Field`].
    pub field: Option<String>,
}

impl Change {
    pub fn new(kind: ChangeKind, record_type: impl Into<String>, id: Option<String>) -> Self {
        Self {
            kind,
            record_type: record_type.into(),
            id,
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

pub trait ObservableContainer: Send + Sync {
    fn notify(&self, change: &Change);
}

/// Keeps every change in memory, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    changes: Arc<Mutex<Vec<Change>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<Change> {
        self.changes
            .lock()
            .map(|changes| changes.clone())
            .unwrap_or_default()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> Vec<Change> {
        self.changes()
            .into_iter()
            .filter(|change| change.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.clear();
        }
    }
}

impl ObservableContainer for RecordingObserver {
    fn notify(&self, change: &Change) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(change.clone());
        }
    }
}
