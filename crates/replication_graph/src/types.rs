//! # Core Type Definitions
//!
//! Fundamental identifiers and geometry shared by every node of the routing graph.
//!
//! ## Key Types
//!
//! - [`EntityId`] - Handle of a networked entity
//! - [`ClassId`] - Index of a class descriptor inside the [`ClassRegistry`](crate::class::ClassRegistry)
//! - [`ConnectionId`] - Handle of a client connection
//! - [`Vec2`] / [`Vec3`] - Double precision world positions
//! - [`Viewpoint`] - A position/owner pair used for spatial relevance

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a streaming region (sub-level) that a client can have visible.
pub type RegionName = compact_str::CompactString;

// ============================================================================
// Identifiers
// ============================================================================

/// Handle of a networked entity.
///
/// Handles are opaque to the graph; the simulation owns the actual entity and
/// guarantees a handle is not reused while it is still registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Index of a class descriptor in the class arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// 2D vector in the horizontal plane used by the spatial grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: Vec2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// 3D world position with double precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate (ignored by the 2D grid)
    pub z: f64,
}

impl Vec3 {
    /// Creates a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Squared euclidean distance to `other`.
    pub fn distance_squared(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: Vec3) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Projection onto the horizontal plane.
    pub fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Component-wise linear interpolation; `alpha` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Vec3, alpha: f64) -> Vec3 {
        let t = alpha.clamp(0.0, 1.0);
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }
}

// ============================================================================
// Viewers
// ============================================================================

/// Entities owned by the controller behind a viewpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControllerView {
    /// The controller's player-state record
    pub player_state: Option<EntityId>,
    /// The pawn currently possessed by the controller
    pub pawn: Option<EntityId>,
    /// The pawn the view target resolves to, when the view target is a pawn
    pub view_target_pawn: Option<EntityId>,
}

/// A position/owner pair used for spatial relevance (a camera or possessed entity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    /// The viewing entity (usually the controller)
    pub viewer: EntityId,
    /// The entity the viewer is currently looking through
    pub view_target: EntityId,
    /// World location of the view
    pub location: Vec3,
    /// Radius around `location` whose grid cells are gathered. Zero gathers only the
    /// cell containing the viewpoint.
    #[serde(default)]
    pub relevancy_radius: f64,
    /// Present when the viewer is a player controller
    #[serde(default)]
    pub controller: Option<ControllerView>,
}

impl Viewpoint {
    /// Creates a viewpoint that views through itself.
    pub fn new(viewer: EntityId, location: Vec3) -> Self {
        Self {
            viewer,
            view_target: viewer,
            location,
            relevancy_radius: 0.0,
            controller: None,
        }
    }

    pub fn with_view_target(mut self, view_target: EntityId) -> Self {
        self.view_target = view_target;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.relevancy_radius = radius.max(0.0);
        self
    }

    pub fn with_controller(mut self, controller: ControllerView) -> Self {
        self.controller = Some(controller);
        self
    }
}

/// Tick clock sample handed to every prepare/gather pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TickInfo {
    /// Monotonic replication frame number
    pub tick: u64,
}

impl TickInfo {
    pub const fn new(tick: u64) -> Self {
        Self { tick }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_clamps_alpha() {
        let a = Vec3::zero();
        let b = Vec3::new(10.0, 20.0, -10.0);
        assert_eq!(a.lerp(b, 0.5), Vec3::new(5.0, 10.0, -5.0));
        assert_eq!(a.lerp(b, 2.0), b);
        assert_eq!(a.lerp(b, -1.0), a);
    }

    #[test]
    fn viewpoint_builder_defaults_to_self_view() {
        let vp = Viewpoint::new(EntityId(3), Vec3::zero()).with_radius(-5.0);
        assert_eq!(vp.view_target, EntityId(3));
        assert_eq!(vp.relevancy_radius, 0.0);
        assert!(vp.controller.is_none());
    }
}
