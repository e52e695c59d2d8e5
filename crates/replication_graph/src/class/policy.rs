//! Class routing policy.
//!
//! Every networked class resolves to exactly one [`RoutingCategory`]. The table
//! only stores explicit overrides and classes whose legacy relevance flags
//! differ from their parent; everything else is resolved by walking the
//! parent chain.

use super::registry::ClassRegistry;
use crate::types::ClassId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Node a class is routed to when its entities become networked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoutingCategory {
    /// Not added to any node. Special-cased entities (player states, debug
    /// observers) are picked up by dedicated nodes instead.
    NotRouted,
    /// Global always-relevant list, or a streaming-level list when tagged with a region.
    RelevantAllConnections,

    // Spatialized categories only below this line. See `is_spatialized`.
    /// Grid node; the entity never moves.
    SpatializeStatic,
    /// Grid node; the entity moves and is re-evaluated as it crosses cells.
    SpatializeDynamic,
    /// Grid node; static while dormant, dynamic while awake.
    SpatializeDormancy,
}

impl RoutingCategory {
    pub fn is_spatialized(self) -> bool {
        self >= RoutingCategory::SpatializeStatic
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingCategory::NotRouted => "NotRouted",
            RoutingCategory::RelevantAllConnections => "RelevantAllConnections",
            RoutingCategory::SpatializeStatic => "SpatializeStatic",
            RoutingCategory::SpatializeDynamic => "SpatializeDynamic",
            RoutingCategory::SpatializeDormancy => "SpatializeDormancy",
        }
    }
}

impl fmt::Display for RoutingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class to routing-category table with inheritance-aware resolution.
#[derive(Debug, Default)]
pub struct ClassPolicyTable {
    entries: HashMap<ClassId, RoutingCategory>,
}

impl ClassPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the routing category of `class`.
    ///
    /// Explicit entries win. Classes without a default instance, and classes
    /// that are not replicated, are `NotRouted`. A class whose relevance flags
    /// match its parent's resolves to whatever the parent resolves to.
    pub fn resolve(&self, classes: &ClassRegistry, class: ClassId) -> RoutingCategory {
        if let Some(category) = self.entries.get(&class) {
            return *category;
        }

        let Some(defaults) = classes.defaults(class) else {
            return RoutingCategory::NotRouted;
        };
        if !defaults.replicated {
            return RoutingCategory::NotRouted;
        }

        if let Some(parent) = classes.parent(class) {
            if let Some(parent_defaults) = classes.defaults(parent) {
                if parent_defaults.same_relevance_flags(defaults) {
                    return self.resolve(classes, parent);
                }
            }
        }

        let spatialize = !(defaults.always_relevant
            || defaults.only_relevant_to_owner
            || defaults.net_use_owner_relevancy);

        if spatialize {
            RoutingCategory::SpatializeDynamic
        } else if defaults.always_relevant && !defaults.only_relevant_to_owner {
            RoutingCategory::RelevantAllConnections
        } else {
            RoutingCategory::NotRouted
        }
    }

    /// Stores an explicit override for `class`.
    ///
    /// Routing an always-relevant class into the grid is contradictory; it is
    /// logged and the override still takes effect.
    pub fn register(&mut self, classes: &ClassRegistry, class: ClassId, category: RoutingCategory) {
        if category.is_spatialized() {
            if let Some(defaults) = classes.defaults(class) {
                if defaults.always_relevant {
                    warn!(
                        "⚠️ Replicated class {} is always relevant but is routed into a spatialized node ({})",
                        classes.name(class),
                        category
                    );
                }
            }
        }
        self.entries.insert(class, category);
    }

    /// Bootstrap registration of a replicated class.
    ///
    /// The derived category is only stored when it differs from the parent's
    /// resolved category. Returns `true` if an entry was written.
    pub fn register_derived(&mut self, classes: &ClassRegistry, class: ClassId) -> bool {
        if self.entries.contains_key(&class) {
            return false;
        }

        let category = self.resolve(classes, class);
        if let Some(parent) = classes.parent(class) {
            if self.resolve(classes, parent) == category {
                debug!(
                    "Class {} inherits routing {} from {}",
                    classes.name(class),
                    category,
                    classes.name(parent)
                );
                return false;
            }
        }

        self.entries.insert(class, category);
        true
    }

    /// The stored entry for `class`, if any. Does not walk the parent chain.
    pub fn get(&self, class: ClassId) -> Option<RoutingCategory> {
        self.entries.get(&class).copied()
    }

    pub fn is_stored(&self, class: ClassId) -> bool {
        self.entries.contains_key(&class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entries ordered by class id.
    pub fn entries(&self) -> Vec<(ClassId, RoutingCategory)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(class, _)| *class);
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Whether a multicast RPC on an entity of a class may open a channel to a
/// connection that does not have one yet.
///
/// Lookups walk the parent chain for the nearest override; classes without
/// one open channels.
#[derive(Debug, Default)]
pub struct MulticastChannelPolicy {
    overrides: HashMap<ClassId, bool>,
}

impl MulticastChannelPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, class: ClassId, open_channel: bool) {
        self.overrides.insert(class, open_channel);
    }

    pub fn open_channel(&self, classes: &ClassRegistry, class: ClassId) -> bool {
        classes
            .lineage(class)
            .find_map(|c| self.overrides.get(&c).copied())
            .unwrap_or(true)
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
    }
}
