//! Uniform 2D spatialization grid.
//!
//! Cell `(x, y)` covers `[bias + x * cell_size, bias + (x + 1) * cell_size)` on
//! each axis. An entity is a member of every cell its cull disc overlaps, so a
//! viewpoint only needs to look at the cells its own relevancy disc overlaps.
//!
//! Each cell holds a static list and a set of rotating dynamic buckets:
//!
//! - static entities never move; their cells change only through
//!   [`SpatialGridNode::reevaluate_static`]
//! - dynamic entities move between cells as they cross cell boundaries
//! - dormancy entities are static while dormant and dynamic while awake
//!
//! Entities appearing below the grid origin trigger a rebuild that shifts
//! the bias by whole cells. Classes on the rebuild deny-list never trigger a
//! rebuild: they are clamped into the edge cells instead and keep their cell
//! membership across rebuilds caused by others.

use super::{GatherParams, GatheredLists, ReplicationNode};
use crate::class::ClassRegistry;
use crate::debug::NodeDebugLog;
use crate::rep_list::{ActorRepList, FrequencyBuckets};
use crate::types::{ClassId, EntityId, Vec2, Vec3};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Non-negative cell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellCoord {
    pub x: usize,
    pub y: usize,
}

impl CellCoord {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Insert payload for the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridActor {
    pub entity: EntityId,
    pub class: ClassId,
    pub location: Vec3,
    /// Radius of the entity's footprint. Zero covers only the containing cell.
    pub cull_distance: f64,
}

/// Grid counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GridStats {
    pub rebuild_count: u64,
    pub clamped_inserts: u64,
    pub columns: usize,
    pub static_entities: usize,
    pub dynamic_entities: usize,
    pub dormant_entities: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Static,
    Dynamic,
    Dormant { awake: bool },
}

impl Membership {
    fn in_dynamic_buckets(self) -> bool {
        matches!(self, Membership::Dynamic | Membership::Dormant { awake: true })
    }

    fn label(self) -> &'static str {
        match self {
            Membership::Static => "static",
            Membership::Dynamic => "dynamic",
            Membership::Dormant { .. } => "dormancy",
        }
    }
}

type CellList = SmallVec<[CellCoord; 4]>;

#[derive(Debug)]
struct GridEntry {
    location: Vec2,
    cull_distance: f64,
    membership: Membership,
    deny_listed: bool,
    cells: CellList,
}

#[derive(Debug)]
struct GridCell {
    statics: ActorRepList,
    dynamics: FrequencyBuckets,
}

impl GridCell {
    fn new(bucket_count: usize) -> Self {
        Self {
            statics: ActorRepList::new(),
            dynamics: FrequencyBuckets::new(bucket_count),
        }
    }

    fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.dynamics.is_empty()
    }
}

/// Signed inclusive cell range before clamping.
#[derive(Debug, Clone, Copy)]
struct CellRange {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

#[derive(Debug)]
pub struct SpatialGridNode {
    cell_size: f64,
    bias: Vec2,
    /// `columns[x][y]`; columns grow independently
    columns: Vec<Vec<GridCell>>,
    entries: HashMap<EntityId, GridEntry>,
    rebuild_deny_list: Vec<ClassId>,
    dynamic_bucket_count: usize,
    enable_fast_shared_path: bool,
    rebuild_count: u64,
    clamped_inserts: u64,
}

impl SpatialGridNode {
    pub fn new(cell_size: f64, bias: Vec2) -> Self {
        Self {
            cell_size,
            bias,
            columns: Vec::new(),
            entries: HashMap::new(),
            rebuild_deny_list: Vec::new(),
            dynamic_bucket_count: 1,
            enable_fast_shared_path: false,
            rebuild_count: 0,
            clamped_inserts: 0,
        }
    }

    pub fn with_dynamic_buckets(mut self, bucket_count: usize) -> Self {
        self.set_dynamic_bucket_count(bucket_count);
        self
    }

    pub fn with_fast_shared_path(mut self, enabled: bool) -> Self {
        self.enable_fast_shared_path = enabled;
        self
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn bias(&self) -> Vec2 {
        self.bias
    }

    pub fn set_fast_shared_path(&mut self, enabled: bool) {
        self.enable_fast_shared_path = enabled;
    }

    pub fn dynamic_bucket_count(&self) -> usize {
        self.dynamic_bucket_count
    }

    /// Changes the number of dynamic buckets in every cell, rebalancing members.
    pub fn set_dynamic_bucket_count(&mut self, bucket_count: usize) {
        self.dynamic_bucket_count = bucket_count.max(1);
        for cell in self.columns.iter_mut().flatten() {
            cell.dynamics.set_bucket_count(self.dynamic_bucket_count);
        }
    }

    /// Entities of `class` and its descendants never trigger a rebuild.
    pub fn add_to_class_rebuild_deny_list(&mut self, class: ClassId) {
        if !self.rebuild_deny_list.contains(&class) {
            self.rebuild_deny_list.push(class);
        }
    }

    pub fn is_rebuild_deny_listed(&self, classes: &ClassRegistry, class: ClassId) -> bool {
        self.rebuild_deny_list
            .iter()
            .any(|denied| classes.is_child_of(class, *denied))
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    pub fn add_static(&mut self, classes: &ClassRegistry, actor: GridActor) {
        self.add(classes, actor, Membership::Static);
    }

    pub fn add_dynamic(&mut self, classes: &ClassRegistry, actor: GridActor) {
        self.add(classes, actor, Membership::Dynamic);
    }

    /// Adds a dormancy-routed entity, static while `dormant`.
    pub fn add_dormant(&mut self, classes: &ClassRegistry, actor: GridActor, dormant: bool) {
        self.add(classes, actor, Membership::Dormant { awake: !dormant });
    }

    pub fn remove_static(&mut self, entity: EntityId) -> bool {
        self.remove(entity, "static")
    }

    pub fn remove_dynamic(&mut self, entity: EntityId) -> bool {
        self.remove(entity, "dynamic")
    }

    pub fn remove_dormant(&mut self, entity: EntityId) -> bool {
        self.remove(entity, "dormancy")
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cells `entity` is currently a member of.
    pub fn entity_cells(&self, entity: EntityId) -> Option<&[CellCoord]> {
        self.entries.get(&entity).map(|entry| entry.cells.as_slice())
    }

    fn add(&mut self, classes: &ClassRegistry, actor: GridActor, membership: Membership) {
        if self.entries.contains_key(&actor.entity) {
            warn!(
                "⚠️ {} added to the spatial grid twice; replacing its previous membership",
                actor.entity
            );
            self.remove(actor.entity, membership.label());
        }

        let deny_listed = self.is_rebuild_deny_listed(classes, actor.class);
        let location = actor.location.xy();
        let cull_distance = actor.cull_distance.max(0.0);
        let cells = self.place(location, cull_distance, deny_listed);

        let entry = GridEntry {
            location,
            cull_distance,
            membership,
            deny_listed,
            cells,
        };
        self.link(actor.entity, &entry);
        self.entries.insert(actor.entity, entry);
    }

    fn remove(&mut self, entity: EntityId, kind: &'static str) -> bool {
        let Some(entry) = self.entries.remove(&entity) else {
            warn!("⚠️ Tried to remove {} {} from the spatial grid but it was not found", kind, entity);
            return false;
        };
        if entry.membership.label() != kind {
            debug!(
                "{} removed as {} but was tracked as {}",
                entity,
                kind,
                entry.membership.label()
            );
        }
        self.unlink(entity, &entry);
        true
    }

    /// Moves a dormancy entity between the static and dynamic structures.
    pub fn set_dormant(&mut self, entity: EntityId, dormant: bool) {
        let Some(current) = self.entries.get(&entity).map(|e| e.membership) else {
            warn!("⚠️ Dormancy change for {} which is not in the spatial grid", entity);
            return;
        };
        let Membership::Dormant { awake } = current else {
            debug!("Ignoring dormancy change for non-dormancy {} {}", current.label(), entity);
            return;
        };
        if awake != dormant {
            return;
        }

        if let Some(mut entry) = self.entries.remove(&entity) {
            self.unlink(entity, &entry);
            entry.membership = Membership::Dormant { awake: !dormant };
            self.link(entity, &entry);
            self.entries.insert(entity, entry);
        }
    }

    /// Movement notification. Only entities in the dynamic buckets are re-evaluated.
    pub fn notify_entity_moved(&mut self, entity: EntityId, location: Vec3) {
        let Some(entry) = self.entries.get(&entity) else {
            warn!("⚠️ Movement for {} which is not in the spatial grid", entity);
            return;
        };
        if !entry.membership.in_dynamic_buckets() {
            return;
        }
        self.relocate(entity, location.xy());
    }

    /// Explicit re-evaluation of a static (or sleeping dormancy) entity's cells.
    pub fn reevaluate_static(&mut self, entity: EntityId, location: Vec3) {
        if !self.entries.contains_key(&entity) {
            warn!("⚠️ Re-evaluation for {} which is not in the spatial grid", entity);
            return;
        }
        self.relocate(entity, location.xy());
    }

    fn relocate(&mut self, entity: EntityId, location: Vec2) {
        let Some((cull_distance, deny_listed)) = self
            .entries
            .get(&entity)
            .map(|e| (e.cull_distance, e.deny_listed))
        else {
            return;
        };

        let cells = self.place(location, cull_distance, deny_listed);
        if let Some(mut entry) = self.entries.remove(&entity) {
            entry.location = location;
            if entry.cells != cells {
                self.unlink(entity, &entry);
                entry.cells = cells;
                self.link(entity, &entry);
            }
            self.entries.insert(entity, entry);
        }
    }

    /// Drops every entity and cell, keeping the current bias.
    pub fn reset(&mut self) {
        self.columns.clear();
        self.entries.clear();
    }

    pub fn stats(&self) -> GridStats {
        let mut stats = GridStats {
            rebuild_count: self.rebuild_count,
            clamped_inserts: self.clamped_inserts,
            columns: self.columns.len(),
            ..GridStats::default()
        };
        for entry in self.entries.values() {
            match entry.membership {
                Membership::Static => stats.static_entities += 1,
                Membership::Dynamic => stats.dynamic_entities += 1,
                Membership::Dormant { .. } => stats.dormant_entities += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------------
    // Cell math
    // ------------------------------------------------------------------------

    fn axis_index(&self, value: f64, bias: f64) -> i64 {
        ((value - bias) / self.cell_size).floor() as i64
    }

    /// Cell containing `location`, or `None` if it lies below the grid origin.
    pub fn cell_coord(&self, location: Vec2) -> Option<CellCoord> {
        let x = self.axis_index(location.x, self.bias.x);
        let y = self.axis_index(location.y, self.bias.y);
        (x >= 0 && y >= 0).then(|| CellCoord::new(x as usize, y as usize))
    }

    /// Distance² from `point` to the closed square of signed cell `(x, y)`.
    fn cell_distance_squared(&self, x: i64, y: i64, point: Vec2) -> f64 {
        let min_x = self.bias.x + x as f64 * self.cell_size;
        let min_y = self.bias.y + y as f64 * self.cell_size;
        let nearest = Vec2::new(
            point.x.clamp(min_x, min_x + self.cell_size),
            point.y.clamp(min_y, min_y + self.cell_size),
        );
        nearest.distance_squared(point)
    }

    /// Range of cells an entity footprint can touch.
    fn footprint_range(&self, location: Vec2, radius: f64) -> CellRange {
        CellRange {
            min_x: self.axis_index(location.x - radius, self.bias.x),
            min_y: self.axis_index(location.y - radius, self.bias.y),
            max_x: self.axis_index(location.x + radius, self.bias.x),
            max_y: self.axis_index(location.y + radius, self.bias.y),
        }
    }

    /// Range of cells a query disc can touch, including cells that only share
    /// a boundary with the disc.
    fn query_range(&self, location: Vec2, radius: f64) -> CellRange {
        let lower = |value: f64, bias: f64| ((value - bias) / self.cell_size).ceil() as i64 - 1;
        CellRange {
            min_x: lower(location.x - radius, self.bias.x),
            min_y: lower(location.y - radius, self.bias.y),
            max_x: self.axis_index(location.x + radius, self.bias.x),
            max_y: self.axis_index(location.y + radius, self.bias.y),
        }
    }

    /// Computes the cells of a footprint, rebuilding the grid first if a
    /// non-deny-listed footprint reaches below the origin.
    fn place(&mut self, location: Vec2, radius: f64, deny_listed: bool) -> CellList {
        let range = self.footprint_range(location, radius);
        let below = range.min_x < 0 || range.min_y < 0;

        if below && !deny_listed {
            let shift_x = (-range.min_x).max(0) as usize;
            let shift_y = (-range.min_y).max(0) as usize;
            self.rebuild(shift_x, shift_y);
            let range = self.footprint_range(location, radius);
            return self.cells_in(range, location, radius);
        }

        if below {
            self.clamped_inserts += 1;
        }
        self.cells_in(range, location, radius)
    }

    /// Cells in `range` overlapping the disc, clamped to non-negative indices.
    fn cells_in(&self, range: CellRange, location: Vec2, radius: f64) -> CellList {
        let radius_squared = radius * radius;
        let mut cells = CellList::new();
        for x in range.min_x..=range.max_x {
            for y in range.min_y..=range.max_y {
                if self.cell_distance_squared(x, y, location) > radius_squared {
                    continue;
                }
                let coord = CellCoord::new(x.max(0) as usize, y.max(0) as usize);
                if !cells.contains(&coord) {
                    cells.push(coord);
                }
            }
        }
        cells
    }

    /// Existing cells overlapping the query disc around `location`.
    pub fn query_cells(&self, location: Vec2, radius: f64) -> Vec<CellCoord> {
        let radius = radius.max(0.0);
        let radius_squared = radius * radius;
        let range = self.query_range(location, radius);
        let max_x = range.max_x.min(self.columns.len() as i64 - 1);

        let mut cells = Vec::new();
        for x in range.min_x.max(0)..=max_x {
            let rows = self.columns[x as usize].len() as i64;
            for y in range.min_y.max(0)..=range.max_y.min(rows - 1) {
                if self.cell_distance_squared(x, y, location) <= radius_squared {
                    cells.push(CellCoord::new(x as usize, y as usize));
                }
            }
        }
        cells
    }

    fn cell(&self, coord: CellCoord) -> Option<&GridCell> {
        self.columns.get(coord.x).and_then(|column| column.get(coord.y))
    }

    fn cell_mut(&mut self, coord: CellCoord) -> &mut GridCell {
        let bucket_count = self.dynamic_bucket_count;
        if self.columns.len() <= coord.x {
            self.columns.resize_with(coord.x + 1, Vec::new);
        }
        let column = &mut self.columns[coord.x];
        if column.len() <= coord.y {
            column.resize_with(coord.y + 1, || GridCell::new(bucket_count));
        }
        &mut column[coord.y]
    }

    fn link(&mut self, entity: EntityId, entry: &GridEntry) {
        let dynamic = entry.membership.in_dynamic_buckets();
        for coord in &entry.cells {
            let cell = self.cell_mut(*coord);
            if dynamic {
                cell.dynamics.add(entity);
            } else {
                cell.statics.conditional_add(entity);
            }
        }
    }

    fn unlink(&mut self, entity: EntityId, entry: &GridEntry) {
        for coord in &entry.cells {
            if let Some(cell) = self
                .columns
                .get_mut(coord.x)
                .and_then(|column| column.get_mut(coord.y))
            {
                cell.statics.remove_fast(entity);
                cell.dynamics.remove(entity);
            }
        }
    }

    /// Shifts the origin down by whole cells and re-links every entity.
    fn rebuild(&mut self, shift_x: usize, shift_y: usize) {
        self.bias.x -= shift_x as f64 * self.cell_size;
        self.bias.y -= shift_y as f64 * self.cell_size;
        self.rebuild_count += 1;

        info!(
            "🧱 Rebuilding spatial grid: bias shifted by ({}, {}) cells to ({:.1}, {:.1})",
            shift_x, shift_y, self.bias.x, self.bias.y
        );

        self.columns.clear();
        let mut entries: Vec<(EntityId, GridEntry)> = self.entries.drain().collect();
        entries.sort_by_key(|(entity, _)| *entity);

        for (entity, mut entry) in entries {
            entry.cells = if entry.deny_listed {
                entry
                    .cells
                    .iter()
                    .map(|c| CellCoord::new(c.x + shift_x, c.y + shift_y))
                    .collect()
            } else {
                let range = self.footprint_range(entry.location, entry.cull_distance);
                self.cells_in(range, entry.location, entry.cull_distance)
            };
            self.link(entity, &entry);
            self.entries.insert(entity, entry);
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Every entity in the cells overlapping the disc of `radius` around
    /// `location`. Cells are visited lazily and each entity is yielded once.
    pub fn gather_near(&self, location: Vec3, radius: f64) -> GatherNear<'_> {
        GatherNear {
            grid: self,
            cells: self.query_cells(location.xy(), radius).into_iter(),
            pending: Vec::new(),
            current: [].iter(),
            seen: HashSet::new(),
        }
    }
}

impl ReplicationNode for SpatialGridNode {
    fn name(&self) -> &'static str {
        "SpatialGrid"
    }

    fn gather<'a>(&'a self, params: &GatherParams<'_>, out: &mut GatheredLists<'a>) {
        let tick = params.tick.tick;
        let mut visited: HashSet<CellCoord> = HashSet::new();

        for viewpoint in params.viewpoints {
            for coord in self.query_cells(viewpoint.location.xy(), viewpoint.relevancy_radius) {
                if !visited.insert(coord) {
                    continue;
                }

                let Some(cell) = self.cell(coord) else {
                    continue;
                };
                out.add_replication_list(cell.statics.as_slice());
                out.add_replication_list(cell.dynamics.active_bucket(tick));
                if self.enable_fast_shared_path {
                    for bucket in cell.dynamics.inactive_buckets(tick) {
                        out.add_fast_shared_list(bucket);
                    }
                }
            }
        }
    }

    fn log_node(&self, log: &mut NodeDebugLog) {
        log.log(format!(
            "{} (cell size {:.0}, bias ({:.0}, {:.0}), {} entities)",
            self.name(),
            self.cell_size,
            self.bias.x,
            self.bias.y,
            self.entries.len()
        ));
        log.push_indent();
        for (x, column) in self.columns.iter().enumerate() {
            for (y, cell) in column.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                log.log(format!("Cell ({}, {})", x, y));
                log.push_indent();
                log.log_rep_list("Static", &cell.statics);
                for (i, bucket) in cell.dynamics.buckets().iter().enumerate() {
                    log.log_rep_list(&format!("Dynamic[{}]", i), bucket);
                }
                log.pop_indent();
            }
        }
        log.pop_indent();
    }
}

/// Lazy, de-duplicated iterator returned by [`SpatialGridNode::gather_near`].
pub struct GatherNear<'a> {
    grid: &'a SpatialGridNode,
    cells: std::vec::IntoIter<CellCoord>,
    pending: Vec<&'a [EntityId]>,
    current: std::slice::Iter<'a, EntityId>,
    seen: HashSet<EntityId>,
}

impl Iterator for GatherNear<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            if let Some(entity) = self.current.next() {
                if self.seen.insert(*entity) {
                    return Some(*entity);
                }
                continue;
            }
            if let Some(list) = self.pending.pop() {
                self.current = list.iter();
                continue;
            }

            let coord = self.cells.next()?;
            if let Some(cell) = self.grid.cell(coord) {
                self.pending.push(cell.statics.as_slice());
                self.pending
                    .extend(cell.dynamics.buckets().iter().map(ActorRepList::as_slice));
            }
        }
    }
}
