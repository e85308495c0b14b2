//! In-memory registry holding the current artifact of each world.
//!
//! Artifacts are shared as `Arc`s. `put` swaps the slot under a write lock,
//! so a reader sees either the old artifact or the new one, and readers that
//! already hold the old `Arc` keep scoring against it unaffected.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use island_core::error::{Error, Operation, Result};

use crate::artifact::IslandArtifact;

#[derive(Debug, Default)]
pub struct ArtifactStore {
    slots: RwLock<HashMap<String, Arc<IslandArtifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `artifact` as the world's current island, returning the one it replaced.
    pub fn put(&self, artifact: Arc<IslandArtifact>) -> Option<Arc<IslandArtifact>> {
        let world_id = artifact.world_id().to_string();
        self.slots.write().unwrap_or_else(PoisonError::into_inner).insert(world_id, artifact)
    }

    /// Install `artifact` only if the world has no current island. Returns
    /// whichever artifact holds the slot afterwards.
    pub fn put_if_absent(&self, artifact: Arc<IslandArtifact>) -> Arc<IslandArtifact> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        match slots.entry(artifact.world_id().to_string()) {
            Entry::Occupied(current) => current.get().clone(),
            Entry::Vacant(slot) => slot.insert(artifact).clone(),
        }
    }

    pub fn get(&self, world_id: &str, op: Operation) -> Result<Arc<IslandArtifact>> {
        self.lookup(world_id).ok_or_else(|| Error::not_found(world_id, op))
    }

    pub fn lookup(&self, world_id: &str) -> Option<Arc<IslandArtifact>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).get(world_id).cloned()
    }

    pub fn exists(&self, world_id: &str) -> bool {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).contains_key(world_id)
    }

    pub fn evict(&self, world_id: &str) -> Option<Arc<IslandArtifact>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).remove(world_id)
    }

    pub fn worlds(&self) -> Vec<String> {
        let mut worlds: Vec<String> = self.slots.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        worlds.sort();
        worlds
    }
}
