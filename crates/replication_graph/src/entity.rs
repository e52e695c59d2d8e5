//! Networked entity bookkeeping.
//!
//! The graph keeps one [`EntityRecord`] per networked entity so removals can
//! be routed to the same node the entity was added to, even if the class
//! policy changed in between.

use crate::class::RoutingCategory;
use crate::types::{ClassId, EntityId, RegionName, Vec3};
use std::collections::BTreeMap;

/// Lifecycle notification payload for an entity becoming networked.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkedEntity {
    pub id: EntityId,
    pub class: ClassId,
    pub location: Vec3,
    /// Streaming region the entity belongs to, if any
    pub streaming_region: Option<RegionName>,
    /// Initial dormancy, only meaningful for dormancy-routed classes
    pub dormant: bool,
}

impl NetworkedEntity {
    pub fn new(id: EntityId, class: ClassId) -> Self {
        Self {
            id,
            class,
            location: Vec3::zero(),
            streaming_region: None,
            dormant: false,
        }
    }

    pub fn at(mut self, location: Vec3) -> Self {
        self.location = location;
        self
    }

    pub fn in_region(mut self, region: impl Into<RegionName>) -> Self {
        self.streaming_region = Some(region.into());
        self
    }

    pub fn dormant(mut self) -> Self {
        self.dormant = true;
        self
    }
}

/// State the graph tracks for every networked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub class: ClassId,
    /// Category the entity was routed with
    pub category: RoutingCategory,
    pub location: Vec3,
    pub streaming_region: Option<RegionName>,
    pub dormant: bool,
    /// Torn-off entities are no longer valid for replication gathers
    pub torn_off: bool,
}

impl EntityRecord {
    pub fn is_valid_for_gather(&self) -> bool {
        !self.torn_off
    }
}

/// Every networked entity, ordered by handle.
#[derive(Debug, Default)]
pub struct EntityTable {
    records: BTreeMap<EntityId, EntityRecord>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, record: EntityRecord) -> Option<EntityRecord> {
        self.records.insert(id, record)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntityRecord> {
        self.records.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityRecord)> + '_ {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
