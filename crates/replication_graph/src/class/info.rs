//! Per-class replication tunables.
//!
//! Classes configured administratively are recorded as explicitly set and
//! never re-derived; neither are their descendants, which read the nearest
//! explicitly-set ancestor's info. Every other class derives its info lazily
//! from the legacy defaults on first reference.

use super::policy::ClassPolicyTable;
use super::registry::ClassRegistry;
use crate::types::{ClassId, EntityId};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Replication period in ticks for a target update frequency.
///
/// `round(tick_rate / frequency)`, never less than one tick.
pub fn replication_period_for_frequency(tick_rate: f64, frequency: f64) -> u32 {
    // `as` saturates: zero frequency means "as rarely as possible".
    let period = (tick_rate / frequency).round() as u32;
    period.max(1)
}

/// Named fast-path update function.
///
/// Called at most once per tick per entity to decide whether a cheap shared
/// update should be broadcast instead of a full one.
#[derive(Debug, Clone, Copy)]
pub struct FastSharedPath {
    pub name: &'static str,
    pub func: fn(EntityId) -> bool,
}

impl FastSharedPath {
    pub fn new(name: &'static str, func: fn(EntityId) -> bool) -> Self {
        Self { name, func }
    }

    pub fn call(&self, entity: EntityId) -> bool {
        (self.func)(entity)
    }
}

/// Per-class replication settings consumed by the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct ClassReplicationInfo {
    /// Squared distance beyond which the class is culled. Zero disables culling.
    pub cull_distance_squared: f64,
    /// Replicate once every this many ticks
    pub replication_period_frame: u32,
    pub distance_priority_scale: f32,
    pub starvation_priority_scale: f32,
    /// Ticks an idle channel stays open
    pub channel_frame_timeout: u32,
    pub fast_shared_path: Option<FastSharedPath>,
}

impl Default for ClassReplicationInfo {
    fn default() -> Self {
        Self {
            cull_distance_squared: 0.0,
            replication_period_frame: 1,
            distance_priority_scale: 1.0,
            starvation_priority_scale: 1.0,
            channel_frame_timeout: 4,
            fast_shared_path: None,
        }
    }
}

impl ClassReplicationInfo {
    pub fn cull_distance(&self) -> f64 {
        self.cull_distance_squared.sqrt()
    }

    pub fn set_cull_distance_squared(&mut self, distance_squared: f64) {
        self.cull_distance_squared = distance_squared.max(0.0);
    }

    /// Lists every setting that differs from [`ClassReplicationInfo::default`].
    pub fn debug_string_delta(&self) -> String {
        let defaults = ClassReplicationInfo::default();
        let mut out = String::new();

        if self.distance_priority_scale != defaults.distance_priority_scale {
            let _ = write!(out, "DistanceScale: {:.2} ", self.distance_priority_scale);
        }
        if self.starvation_priority_scale != defaults.starvation_priority_scale {
            let _ = write!(out, "StarvationScale: {:.2} ", self.starvation_priority_scale);
        }
        if self.channel_frame_timeout != defaults.channel_frame_timeout {
            let _ = write!(out, "ChannelTimeout: {} ", self.channel_frame_timeout);
        }
        if self.cull_distance_squared != defaults.cull_distance_squared {
            let _ = write!(out, "CullDistance: {:.2} ", self.cull_distance());
        }
        if self.replication_period_frame != defaults.replication_period_frame {
            let _ = write!(out, "ReplicationPeriodFrame: {} ", self.replication_period_frame);
        }
        if let Some(path) = &self.fast_shared_path {
            let _ = write!(out, "FastSharedPath: {} ", path.name);
        }

        if out.is_empty() {
            "Default".to_string()
        } else {
            out.truncate(out.trim_end().len());
            out
        }
    }
}

/// Bandwidth budget of the fast shared path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastSharedPathConstants {
    pub max_bits_per_frame: u32,
    /// Fraction of the cull distance within which fast-path updates are sent
    pub distance_requirement_pct: f32,
}

impl FastSharedPathConstants {
    /// `kbytes_per_sec * 1024 * 8 / tick_rate` bits per tick.
    pub fn new(kbytes_per_sec: u32, tick_rate: f64, distance_requirement_pct: f32) -> Self {
        let bits_per_sec = f64::from(kbytes_per_sec) * 1024.0 * 8.0;
        Self {
            max_bits_per_frame: (bits_per_sec / tick_rate.max(1.0)) as u32,
            distance_requirement_pct,
        }
    }
}

impl Default for FastSharedPathConstants {
    fn default() -> Self {
        Self {
            max_bits_per_frame: 0,
            distance_requirement_pct: 1.0,
        }
    }
}

/// Owner of every [`ClassReplicationInfo`].
#[derive(Debug)]
pub struct ClassReplicationInfoRegistry {
    infos: HashMap<ClassId, ClassReplicationInfo>,
    explicitly_set: Vec<ClassId>,
    tick_rate: f64,
    log_lazy_init: bool,
}

impl ClassReplicationInfoRegistry {
    pub fn new(tick_rate: f64) -> Self {
        Self {
            infos: HashMap::new(),
            explicitly_set: Vec::new(),
            tick_rate,
            log_lazy_init: false,
        }
    }

    /// Enables the lazily-initialized class diagnostics.
    pub fn with_lazy_init_logging(mut self, enabled: bool) -> Self {
        self.log_lazy_init = enabled;
        self
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    /// Administrative override. The class and its descendants are never derived.
    pub fn set_explicit(&mut self, class: ClassId, info: ClassReplicationInfo) {
        self.infos.insert(class, info);
        if !self.explicitly_set.contains(&class) {
            self.explicitly_set.push(class);
        }
    }

    pub fn is_explicit(&self, class: ClassId) -> bool {
        self.explicitly_set.contains(&class)
    }

    /// The nearest explicitly-set class in `class`'s lineage.
    pub fn explicit_ancestor(&self, classes: &ClassRegistry, class: ClassId) -> Option<ClassId> {
        classes.lineage(class).find(|c| self.is_explicit(*c))
    }

    /// Nearest stored info in the lineage, without deriving anything.
    pub fn info(&self, classes: &ClassRegistry, class: ClassId) -> Option<&ClassReplicationInfo> {
        classes.lineage(class).find_map(|c| self.infos.get(&c))
    }

    /// Derives and stores the info of `class` unless it is covered by an
    /// explicitly-set class. Returns `true` if an entry was written.
    pub fn register_derived(
        &mut self,
        classes: &ClassRegistry,
        policy: &ClassPolicyTable,
        class: ClassId,
    ) -> bool {
        if self.explicit_ancestor(classes, class).is_some() {
            return false;
        }
        let info = self.derive(classes, policy, class);
        debug!(
            "Class {} registered with replication info: {}",
            classes.name(class),
            info.debug_string_delta()
        );
        self.infos.insert(class, info);
        true
    }

    /// Returns the info of `class`, deriving it on first reference.
    ///
    /// The routing category must already be resolvable through `policy`,
    /// since cull distance is only derived for spatialized classes.
    pub fn get_or_init(
        &mut self,
        classes: &ClassRegistry,
        policy: &ClassPolicyTable,
        class: ClassId,
    ) -> ClassReplicationInfo {
        if let Some(info) = self.infos.get(&class) {
            return *info;
        }

        if let Some(ancestor) = self.explicit_ancestor(classes, class) {
            if self.log_lazy_init {
                warn!(
                    "{} skipped lazy initialization because it is covered by {}",
                    classes.name(class),
                    classes.name(ancestor)
                );
            }
            return self.infos.get(&ancestor).copied().unwrap_or_default();
        }

        let info = self.derive(classes, policy, class);
        self.infos.insert(class, info);

        if self.log_lazy_init {
            self.log_lazy_init_delta(classes, policy, class, &info);
        }
        info
    }

    fn derive(
        &self,
        classes: &ClassRegistry,
        policy: &ClassPolicyTable,
        class: ClassId,
    ) -> ClassReplicationInfo {
        let mut info = ClassReplicationInfo::default();
        let Some(defaults) = classes.defaults(class) else {
            return info;
        };

        if policy.resolve(classes, class).is_spatialized() {
            info.set_cull_distance_squared(defaults.net_cull_distance_squared);
        }
        info.replication_period_frame =
            replication_period_for_frequency(self.tick_rate, defaults.net_update_frequency);
        info
    }

    fn log_lazy_init_delta(
        &self,
        classes: &ClassRegistry,
        policy: &ClassPolicyTable,
        class: ClassId,
        info: &ClassReplicationInfo,
    ) {
        let parent = classes.parent(class);
        let parent_name = parent.map(|p| classes.name(p)).unwrap_or("None");
        warn!(
            "{} was lazily initialized (parent: {}) {}",
            classes.name(class),
            parent_name,
            policy.resolve(classes, class)
        );

        let Some(parent) = parent else {
            return;
        };
        let parent_delta = self
            .info(classes, parent)
            .map(ClassReplicationInfo::debug_string_delta)
            .unwrap_or_else(|| ClassReplicationInfo::default().debug_string_delta());
        let class_delta = info.debug_string_delta();
        if parent_delta != class_delta {
            warn!("Differences found!");
            warn!("  Parent: {}", parent_delta);
            warn!("  Class : {}", class_delta);
        }
    }

    /// Stored infos ordered by class id.
    pub fn entries(&self) -> Vec<(ClassId, ClassReplicationInfo)> {
        let mut entries: Vec<_> = self.infos.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(class, _)| *class);
        entries
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Forgets every stored and explicitly-set class.
    pub fn reset(&mut self) {
        self.infos.clear();
        self.explicitly_set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDefaults, RoutingCategory};

    #[test]
    fn period_rounds_and_clamps() {
        assert_eq!(replication_period_for_frequency(20.0, 5.0), 4);
        assert_eq!(replication_period_for_frequency(30.0, 100.0), 1);
        assert_eq!(replication_period_for_frequency(30.0, 2.0), 15);
        assert_eq!(replication_period_for_frequency(30.0, 0.0), u32::MAX);
    }

    #[test]
    fn fast_path_budget() {
        let constants = FastSharedPathConstants::new(10, 20.0, 0.8);
        assert_eq!(constants.max_bits_per_frame, 4096);
        assert_eq!(constants.distance_requirement_pct, 0.8);
    }

    #[test]
    fn cull_distance_only_for_spatialized_classes() {
        let mut classes = ClassRegistry::new();
        let actor = classes
            .register(
                "Actor",
                None,
                Some(ClassDefaults::replicated().with_cull_distance(5000.0).with_update_frequency(10.0)),
            )
            .unwrap();
        let manager = classes
            .register(
                "Manager",
                Some(actor),
                Some(ClassDefaults::replicated().always_relevant().with_cull_distance(5000.0)),
            )
            .unwrap();
        let policy = ClassPolicyTable::new();
        let mut infos = ClassReplicationInfoRegistry::new(30.0);

        let spatial = infos.get_or_init(&classes, &policy, actor);
        assert_eq!(spatial.cull_distance_squared, 25_000_000.0);
        assert_eq!(spatial.replication_period_frame, 3);

        let global = infos.get_or_init(&classes, &policy, manager);
        assert_eq!(policy.resolve(&classes, manager), RoutingCategory::RelevantAllConnections);
        assert_eq!(global.cull_distance_squared, 0.0);
    }

    #[test]
    fn explicit_classes_are_never_rederived() {
        let mut classes = ClassRegistry::new();
        let actor = classes.register("Actor", None, Some(ClassDefaults::replicated())).unwrap();
        let pawn = classes.register("Pawn", Some(actor), Some(ClassDefaults::replicated())).unwrap();
        let hero = classes
            .register("Hero", Some(pawn), Some(ClassDefaults::replicated().with_update_frequency(1.0)))
            .unwrap();
        let policy = ClassPolicyTable::new();
        let mut infos = ClassReplicationInfoRegistry::new(30.0);

        let explicit = ClassReplicationInfo {
            channel_frame_timeout: 9,
            ..ClassReplicationInfo::default()
        };
        infos.set_explicit(pawn, explicit);

        assert!(!infos.register_derived(&classes, &policy, hero));
        let hero_info = infos.get_or_init(&classes, &policy, hero);
        assert_eq!(hero_info.channel_frame_timeout, 9);
        assert_eq!(hero_info.replication_period_frame, 1);
        assert_eq!(infos.explicit_ancestor(&classes, hero), Some(pawn));
        assert!(infos.register_derived(&classes, &policy, actor));
    }

    #[test]
    fn debug_delta_lists_changed_fields() {
        assert_eq!(ClassReplicationInfo::default().debug_string_delta(), "Default");
        let info = ClassReplicationInfo {
            cull_distance_squared: 100.0,
            replication_period_frame: 4,
            ..ClassReplicationInfo::default()
        };
        assert_eq!(info.debug_string_delta(), "CullDistance: 10.00 ReplicationPeriodFrame: 4");
    }
}
