//! Process-local index from world object identifier to local state.
//!
//! Each process owns its mirror. Host and client mirrors converge through
//! replicated messages but are never shared directly. Bindings to engine
//! representations are local-only and never transmitted.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SyncError};
use crate::world::{GameObjectHandle, WorldObject, WorldObjectId};

/// A mirrored world object and its optional engine representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// The logical record.
    pub object: WorldObject,
    /// Live representation, if one is bound.
    pub game_object: Option<GameObjectHandle>,
}

/// Resolution of an identifier against the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Known with a live representation.
    Bound(&'a WorldObject, GameObjectHandle),
    /// Known but no live representation.
    Unbound(&'a WorldObject),
    /// Destroyed earlier by this process.
    Destroyed,
    /// Never seen.
    Unknown,
}

impl Resolution<'_> {
    /// Turn a non-resolving outcome into its error.
    pub fn into_error(self, id: WorldObjectId) -> Option<SyncError> {
        match self {
            Resolution::Bound(..) => None,
            Resolution::Unbound(_) => Some(SyncError::UnknownGameObject(id)),
            Resolution::Destroyed => Some(SyncError::AlreadyDestroyed(id)),
            Resolution::Unknown => Some(SyncError::UnknownWorldObject(id)),
        }
    }
}

/// Bidirectional index of world objects known to this process.
#[derive(Debug, Clone, Default)]
pub struct WorldObjectMirror {
    entries: HashMap<WorldObjectId, MirrorEntry>,
    by_game_object: HashMap<GameObjectHandle, WorldObjectId>,
    destroyed: HashSet<WorldObjectId>,
}

impl WorldObjectMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a record, or replace the record of a known id.
    ///
    /// An existing binding is kept. Returns the previous record.
    pub fn track(&mut self, object: WorldObject) -> Option<WorldObject> {
        let id = object.id;
        if self.destroyed.remove(&id) {
            tracing::warn!(id, "mirror: re-tracking a destroyed identifier");
        }
        match self.entries.get_mut(&id) {
            Some(entry) => Some(std::mem::replace(&mut entry.object, object)),
            None => {
                self.entries.insert(
                    id,
                    MirrorEntry {
                        object,
                        game_object: None,
                    },
                );
                None
            }
        }
    }

    /// Look up the record for an id.
    #[must_use]
    pub fn lookup(&self, id: WorldObjectId) -> Option<&WorldObject> {
        self.entries.get(&id).map(|entry| &entry.object)
    }

    /// Mutable access to the record for an id.
    pub fn lookup_mut(&mut self, id: WorldObjectId) -> Option<&mut WorldObject> {
        self.entries.get_mut(&id).map(|entry| &mut entry.object)
    }

    /// Live representation bound to an id.
    #[must_use]
    pub fn game_object(&self, id: WorldObjectId) -> Option<GameObjectHandle> {
        self.entries.get(&id).and_then(|entry| entry.game_object)
    }

    /// Reverse lookup from a representation to its world object id.
    #[must_use]
    pub fn id_of(&self, game_object: GameObjectHandle) -> Option<WorldObjectId> {
        self.by_game_object.get(&game_object).copied()
    }

    /// Classify an identifier.
    #[must_use]
    pub fn resolve(&self, id: WorldObjectId) -> Resolution<'_> {
        match self.entries.get(&id) {
            Some(MirrorEntry {
                object,
                game_object: Some(go),
            }) => Resolution::Bound(object, *go),
            Some(MirrorEntry {
                object,
                game_object: None,
            }) => Resolution::Unbound(object),
            None if self.destroyed.contains(&id) => Resolution::Destroyed,
            None => Resolution::Unknown,
        }
    }

    /// Bind a live representation to a known id.
    ///
    /// Returns the previously bound representation, if any.
    pub fn bind(
        &mut self,
        id: WorldObjectId,
        game_object: GameObjectHandle,
    ) -> Result<Option<GameObjectHandle>> {
        let entry = match self.entries.get_mut(&id) {
            Some(entry) => entry,
            None if self.destroyed.contains(&id) => return Err(SyncError::AlreadyDestroyed(id)),
            None => return Err(SyncError::UnknownWorldObject(id)),
        };
        let previous = entry.game_object.replace(game_object);
        if let Some(previous) = previous {
            self.by_game_object.remove(&previous);
        }
        self.by_game_object.insert(game_object, id);
        Ok(previous)
    }

    /// Remove the binding of an id. The record stays tracked.
    pub fn unbind(&mut self, id: WorldObjectId) -> Option<GameObjectHandle> {
        let previous = self.entries.get_mut(&id)?.game_object.take();
        if let Some(previous) = previous {
            self.by_game_object.remove(&previous);
        }
        previous
    }

    /// Drop an id after its world object was destroyed.
    ///
    /// The id is remembered so later references resolve as
    /// [`Resolution::Destroyed`] rather than unknown.
    pub fn forget(&mut self, id: WorldObjectId) -> Option<MirrorEntry> {
        let entry = self.entries.remove(&id)?;
        if let Some(go) = entry.game_object {
            self.by_game_object.remove(&go);
        }
        self.destroyed.insert(id);
        Some(entry)
    }

    /// Check if an id was destroyed by this process.
    #[must_use]
    pub fn is_destroyed(&self, id: WorldObjectId) -> bool {
        self.destroyed.contains(&id)
    }

    /// Check if an id is currently tracked.
    #[must_use]
    pub fn contains(&self, id: WorldObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked ids in ascending order.
    #[must_use]
    pub fn ids_sorted(&self) -> Vec<WorldObjectId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
