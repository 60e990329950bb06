use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::models::SecretRecord;
use crate::remote::api::SecretWire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Local,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Detected while pushing a local edit.
    Update,
    /// Discovered while applying pulled server changes.
    Sync,
}

/// A local pending record paired with the server's current version.
///
/// `server_binary` holds the server attachment bytes, already inline-decoded
/// or chunk-downloaded, so resolution never has to reach the network for
/// payload it compared against.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub server_id: String,
    pub local_id: Uuid,
    pub local: SecretRecord,
    pub server: SecretWire,
    pub server_binary: Option<Vec<u8>>,
    pub reason: ConflictReason,
    pub detected_at: DateTime<Utc>,
}

/// Queue of open conflicts with a single "current" index the resolution
/// view navigates. At most one conflict exists per `(server_id, local_id)`.
#[derive(Default)]
pub struct ConflictQueue {
    conflicts: Vec<Conflict>,
    current: Option<usize>,
    view_open: bool,
}

impl ConflictQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn view_open(&self) -> bool {
        self.view_open
    }

    pub fn current(&self) -> Option<&Conflict> {
        self.current.and_then(|index| self.conflicts.get(index))
    }

    pub fn contains(&self, server_id: &str, local_id: Uuid) -> bool {
        self.conflicts
            .iter()
            .any(|existing| existing.server_id == server_id && existing.local_id == local_id)
    }

    /// Adds a conflict unless one with the same identity is already open.
    /// Returns whether the conflict was inserted. The first conflict opens
    /// the resolution view and becomes current.
    pub fn add(&mut self, conflict: Conflict) -> bool {
        let duplicate = self.conflicts.iter().any(|existing| {
            existing.server_id == conflict.server_id && existing.local_id == conflict.local_id
        });
        if duplicate {
            return false;
        }

        self.conflicts.push(conflict);
        if !self.view_open {
            self.current = Some(self.conflicts.len() - 1);
            self.view_open = true;
        } else if self.current.is_none() {
            self.current = Some(0);
        }
        true
    }

    /// Removes the conflict with the given identity, wherever it sits.
    /// The current index keeps tracking the entry it pointed at, clamped
    /// into the shorter queue; the view closes once the queue drains.
    pub fn remove(&mut self, server_id: &str, local_id: Uuid) -> Option<Conflict> {
        let index = self
            .conflicts
            .iter()
            .position(|c| c.server_id == server_id && c.local_id == local_id)?;

        let removed = self.conflicts.remove(index);
        if self.conflicts.is_empty() {
            self.current = None;
            self.view_open = false;
        } else if let Some(current) = self.current {
            if index < current {
                self.current = Some(current - 1);
            } else if current >= self.conflicts.len() {
                self.current = Some(self.conflicts.len() - 1);
            }
        }
        Some(removed)
    }

    pub fn can_go_next(&self) -> bool {
        matches!(self.current, Some(index) if index + 1 < self.conflicts.len())
    }

    pub fn can_go_prev(&self) -> bool {
        matches!(self.current, Some(index) if index > 0)
    }

    pub fn go_next(&mut self) {
        if self.can_go_next() {
            self.current = self.current.map(|index| index + 1);
        }
    }

    pub fn go_prev(&mut self) {
        if self.can_go_prev() {
            self.current = self.current.map(|index| index - 1);
        }
    }

    pub fn open_view(&mut self) {
        if !self.conflicts.is_empty() {
            if self.current.is_none() {
                self.current = Some(0);
            }
            self.view_open = true;
        }
    }

    pub fn close_view(&mut self) {
        self.view_open = false;
    }
}
