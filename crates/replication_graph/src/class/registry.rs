//! Class descriptor arena.
//!
//! Entity classes form a single-inheritance tree. Each class module registers
//! its descriptor at startup with an explicit parent index; there is no
//! runtime class enumeration.

use crate::error::RepGraphError;
use crate::types::ClassId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Legacy per-entity relevance attributes of a class' default instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassDefaults {
    /// The class is a networked type at all
    pub replicated: bool,
    /// Relevant to every connection regardless of distance
    pub always_relevant: bool,
    /// Relevant only to the owning connection
    pub only_relevant_to_owner: bool,
    /// Relevancy is delegated to the owner
    pub net_use_owner_relevancy: bool,
    /// Squared distance beyond which the entity is culled
    pub net_cull_distance_squared: f64,
    /// Target update frequency in Hz
    pub net_update_frequency: f64,
}

impl ClassDefaults {
    /// Defaults of a plain replicated, spatialized entity.
    pub fn replicated() -> Self {
        Self {
            replicated: true,
            ..Self::default()
        }
    }

    pub fn always_relevant(mut self) -> Self {
        self.always_relevant = true;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.only_relevant_to_owner = true;
        self
    }

    pub fn owner_relevancy(mut self) -> Self {
        self.net_use_owner_relevancy = true;
        self
    }

    pub fn with_cull_distance(mut self, distance: f64) -> Self {
        self.net_cull_distance_squared = distance * distance;
        self
    }

    pub fn with_update_frequency(mut self, frequency: f64) -> Self {
        self.net_update_frequency = frequency;
        self
    }

    /// True if the four relevance flags match `other`'s.
    pub fn same_relevance_flags(&self, other: &ClassDefaults) -> bool {
        self.replicated == other.replicated
            && self.always_relevant == other.always_relevant
            && self.only_relevant_to_owner == other.only_relevant_to_owner
            && self.net_use_owner_relevancy == other.net_use_owner_relevancy
    }
}

impl Default for ClassDefaults {
    fn default() -> Self {
        Self {
            replicated: false,
            always_relevant: false,
            only_relevant_to_owner: false,
            net_use_owner_relevancy: false,
            net_cull_distance_squared: 225_000_000.0, // 15000 units
            net_update_frequency: 100.0,
        }
    }
}

/// One entry of the class arena.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    pub parent: Option<ClassId>,
    /// `None` for abstract classes without a default instance
    pub defaults: Option<ClassDefaults>,
}

/// Arena of class descriptors addressed by [`ClassId`].
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassDescriptor>,
    by_name: HashMap<String, ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class. Parents must be registered before their children.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parent: Option<ClassId>,
        defaults: Option<ClassDefaults>,
    ) -> Result<ClassId, RepGraphError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(RepGraphError::DuplicateClass(name));
        }
        if let Some(parent) = parent {
            if self.classes.get(parent.index()).is_none() {
                return Err(RepGraphError::UnknownClass(parent));
            }
        }

        let id = ClassId(self.classes.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.classes.push(ClassDescriptor {
            name,
            parent,
            defaults,
        });
        Ok(id)
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(id.index())
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Looks a class up by name, failing with [`RepGraphError::UnknownClassName`].
    pub fn require(&self, name: &str) -> Result<ClassId, RepGraphError> {
        self.find(name)
            .ok_or_else(|| RepGraphError::UnknownClassName(name.to_string()))
    }

    pub fn name(&self, id: ClassId) -> &str {
        self.get(id).map(|c| c.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.get(id).and_then(|c| c.parent)
    }

    pub fn defaults(&self, id: ClassId) -> Option<&ClassDefaults> {
        self.get(id).and_then(|c| c.defaults.as_ref())
    }

    /// Iterates `id` and then each of its ancestors up to the root.
    pub fn lineage(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        let start = self.get(id).map(|_| id);
        std::iter::successors(start, move |current| self.parent(*current))
    }

    /// True if `id` is `ancestor` or derives from it.
    pub fn is_child_of(&self, id: ClassId, ancestor: ClassId) -> bool {
        self.lineage(id).any(|class| class == ancestor)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All registered classes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassDescriptor)> + '_ {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, desc)| (ClassId(idx as u32), desc))
    }
}
