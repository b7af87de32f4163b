use std::collections::HashMap;

use crate::types::IdentityId;

/// Per-identity notification progress.
///
/// Progress is monotonic for the life of the process: an identity that has
/// been announced is never announced again, and one that has alerted never
/// alerts again, no matter how many frames it keeps appearing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Seen,
    Alerted,
}

/// Remembers which identities have already been announced and alerted.
#[derive(Debug, Default)]
pub struct AlertTracker {
    states: HashMap<IdentityId, TrackState>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted sighting of `id`.
    ///
    /// Returns `true` exactly once per identity: the first accepted
    /// sighting. Later sightings return `false`.
    pub fn mark_seen(&mut self, id: IdentityId) -> bool {
        use std::collections::hash_map::Entry;
        match self.states.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(TrackState::Seen);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Record that an alert is being raised for `id`.
    ///
    /// Returns `true` exactly once per identity; after that the identity
    /// stays in the alerted state for the rest of the process.
    pub fn mark_alerted(&mut self, id: IdentityId) -> bool {
        match self.states.get(&id) {
            Some(TrackState::Alerted) => false,
            _ => {
                self.states.insert(id, TrackState::Alerted);
                true
            }
        }
    }

    pub fn is_seen(&self, id: IdentityId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn is_alerted(&self, id: IdentityId) -> bool {
        self.states.get(&id) == Some(&TrackState::Alerted)
    }

    /// Number of distinct identities accepted so far.
    pub fn seen_count(&self) -> usize {
        self.states.len()
    }
}
