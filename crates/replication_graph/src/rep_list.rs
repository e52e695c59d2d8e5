//! Duplicate-free entity lists.
//!
//! [`ActorRepList`] is the building block of every node: an ordered sequence of
//! entity handles with O(1) membership tests and O(1) swap-remove. Order is
//! not part of the contract; only uniqueness is.
//!
//! [`FrequencyBuckets`] splits one logical list across N rotating buckets so
//! that a large homogeneous set is only fully replicated once every N ticks.

use crate::types::EntityId;
use std::collections::HashMap;

/// Ordered, duplicate-free list of entity handles.
#[derive(Debug, Clone, Default)]
pub struct ActorRepList {
    items: Vec<EntityId>,
    index: HashMap<EntityId, usize>,
}

impl ActorRepList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Appends `entity` unless it is already present. Returns `true` if it was added.
    pub fn conditional_add(&mut self, entity: EntityId) -> bool {
        if self.index.contains_key(&entity) {
            return false;
        }
        self.index.insert(entity, self.items.len());
        self.items.push(entity);
        true
    }

    /// Removes `entity` by swapping the last element into its slot.
    /// Returns `false` if the entity was not in the list.
    pub fn remove_fast(&mut self, entity: EntityId) -> bool {
        let Some(slot) = self.index.remove(&entity) else {
            return false;
        };
        self.items.swap_remove(slot);
        if let Some(&moved) = self.items.get(slot) {
            self.index.insert(moved, slot);
        }
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityId> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.items
    }

    /// Empties the list, keeping its allocation.
    pub fn reset(&mut self) {
        self.items.clear();
        self.index.clear();
    }
}

impl<'a> IntoIterator for &'a ActorRepList {
    type Item = &'a EntityId;
    type IntoIter = std::slice::Iter<'a, EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<EntityId> for ActorRepList {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut list = ActorRepList::new();
        for entity in iter {
            list.conditional_add(entity);
        }
        list
    }
}

/// A logical entity list spread across rotating buckets.
///
/// New members go to the smallest bucket so the buckets stay balanced. The
/// bucket for a given tick is `tick % bucket_count`.
#[derive(Debug, Clone)]
pub struct FrequencyBuckets {
    buckets: Vec<ActorRepList>,
}

impl FrequencyBuckets {
    /// Creates `bucket_count` empty buckets (at least one).
    pub fn new(bucket_count: usize) -> Self {
        let count = bucket_count.max(1);
        Self {
            buckets: (0..count).map(|_| ActorRepList::new()).collect(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of members across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(ActorRepList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(ActorRepList::is_empty)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.buckets.iter().any(|bucket| bucket.contains(entity))
    }

    /// Adds `entity` to the least populated bucket. No-op if already a member.
    pub fn add(&mut self, entity: EntityId) -> bool {
        if self.contains(entity) {
            return false;
        }
        let smallest = self
            .buckets
            .iter_mut()
            .min_by_key(|bucket| bucket.len());
        match smallest {
            Some(bucket) => bucket.conditional_add(entity),
            None => false,
        }
    }

    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.buckets.iter_mut().any(|bucket| bucket.remove_fast(entity))
    }

    /// The bucket scheduled for full replication on `tick`.
    pub fn active_bucket(&self, tick: u64) -> &[EntityId] {
        let idx = (tick % self.buckets.len() as u64) as usize;
        self.buckets[idx].as_slice()
    }

    /// Every bucket except the one active on `tick`.
    pub fn inactive_buckets(&self, tick: u64) -> impl Iterator<Item = &[EntityId]> + '_ {
        let active = (tick % self.buckets.len() as u64) as usize;
        self.buckets
            .iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != active)
            .map(|(_, bucket)| bucket.as_slice())
    }

    pub fn buckets(&self) -> &[ActorRepList] {
        &self.buckets
    }

    /// Changes the number of buckets and redistributes every member.
    pub fn set_bucket_count(&mut self, bucket_count: usize) {
        let count = bucket_count.max(1);
        if count == self.buckets.len() {
            return;
        }
        let members: Vec<EntityId> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.iter().copied())
            .collect();
        self.buckets = (0..count).map(|_| ActorRepList::new()).collect();
        for entity in members {
            self.add(entity);
        }
    }

    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            bucket.reset();
        }
    }
}

impl Default for FrequencyBuckets {
    fn default() -> Self {
        Self::new(1)
    }
}
