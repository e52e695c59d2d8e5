//! # Rewind History
//!
//! Short time-indexed history of an entity's bounding volume, used to
//! validate hits against where the entity was when the client fired.
//! Frames older than `max_record_time` (relative to the newest frame) are
//! dropped on record. Lookups between two frames interpolate linearly.

use crate::types::Aabb;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default duration of retained history, in seconds.
pub const DEFAULT_MAX_RECORD_TIME: f64 = 0.8;

/// Errors returned by history lookups.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RewindError {
    #[error("No frames have been recorded")]
    NoHistory,

    #[error("Requested time {requested} is older than the oldest frame at {oldest}")]
    TooFarBack { requested: f64, oldest: f64 },
}

/// One recorded frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramePackage {
    /// World time of the sample in seconds
    pub time: f64,
    pub hit_box: Aabb,
    /// The entity teleported into this frame; interpolating across it is meaningless
    pub teleported: bool,
}

impl FramePackage {
    pub fn new(hit_box: Aabb, teleported: bool, time: f64) -> Self {
        Self {
            time,
            hit_box,
            teleported,
        }
    }

    /// Interpolates between `older` and `younger` at `time`.
    fn interpolate(older: &FramePackage, younger: &FramePackage, time: f64) -> FramePackage {
        let span = younger.time - older.time;
        let alpha = if span > 0.0 {
            ((time - older.time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        FramePackage {
            time,
            hit_box: Aabb::new(
                older.hit_box.min.lerp(younger.hit_box.min, alpha),
                older.hit_box.max.lerp(younger.hit_box.max, alpha),
            ),
            teleported: older.teleported || younger.teleported,
        }
    }
}

/// Per-entity frame history, newest frame at the front.
#[derive(Debug, Clone)]
pub struct RewindHistory {
    max_record_time: f64,
    frames: VecDeque<FramePackage>,
    just_teleported: bool,
}

impl Default for RewindHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_TIME)
    }
}

impl RewindHistory {
    pub fn new(max_record_time: f64) -> Self {
        Self {
            max_record_time: max_record_time.max(0.0),
            frames: VecDeque::new(),
            just_teleported: false,
        }
    }

    pub fn max_record_time(&self) -> f64 {
        self.max_record_time
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn newest(&self) -> Option<&FramePackage> {
        self.frames.front()
    }

    pub fn oldest(&self) -> Option<&FramePackage> {
        self.frames.back()
    }

    /// Iterates frames from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &FramePackage> + '_ {
        self.frames.iter()
    }

    /// Flags the next [`tick`](Self::tick) sample as a teleport.
    pub fn set_just_teleported(&mut self, teleported: bool) {
        self.just_teleported = teleported;
    }

    /// Records the per-tick sample, consuming the pending teleport flag.
    pub fn tick(&mut self, hit_box: Aabb, time: f64) {
        let teleported = std::mem::take(&mut self.just_teleported);
        self.record(hit_box, teleported, time);
    }

    /// Prunes frames that fell out of the retained window, then pushes a new
    /// newest frame.
    pub fn record(&mut self, hit_box: Aabb, teleported: bool, time: f64) {
        if self.frames.len() > 1 {
            while let (Some(newest), Some(oldest)) = (self.frames.front(), self.frames.back()) {
                if newest.time - oldest.time <= self.max_record_time {
                    break;
                }
                self.frames.pop_back();
            }
        }
        self.frames
            .push_front(FramePackage::new(hit_box, teleported, time));
    }

    /// State of the entity at `time`.
    ///
    /// Times at or after the newest frame return the newest frame.
    pub fn frame_at(&self, time: f64) -> Result<FramePackage, RewindError> {
        let (Some(newest), Some(oldest)) = (self.frames.front(), self.frames.back()) else {
            return Err(RewindError::NoHistory);
        };

        if time < oldest.time {
            return Err(RewindError::TooFarBack {
                requested: time,
                oldest: oldest.time,
            });
        }
        if time >= newest.time {
            return Ok(*newest);
        }

        // Walk from newest to oldest until `older` is at or before `time`.
        let mut younger = newest;
        for older in self.frames.iter().skip(1) {
            if older.time == time {
                return Ok(*older);
            }
            if older.time < time {
                return Ok(FramePackage::interpolate(older, younger, time));
            }
            younger = older;
        }

        Ok(*oldest)
    }

    /// Bounding volume at `time`.
    pub fn rewound_hit_box(&self, time: f64) -> Result<Aabb, RewindError> {
        self.frame_at(time).map(|frame| frame.hit_box)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.just_teleported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn cube_at(x: f64) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn empty_history_has_nothing_to_return() {
        let history = RewindHistory::default();
        assert_eq!(history.frame_at(1.0), Err(RewindError::NoHistory));
    }

    #[test]
    fn old_frames_are_pruned_relative_to_newest() {
        let mut history = RewindHistory::new(0.5);
        for i in 0..10 {
            history.record(cube_at(i as f64), false, i as f64 * 0.1);
        }
        // Pruning happens before the push, so the window is exceeded by at most one frame.
        let newest = history.newest().map(|f| f.time).unwrap_or_default();
        let oldest = history.oldest().map(|f| f.time).unwrap_or_default();
        assert!((newest - 0.9).abs() < 1e-9);
        assert!(newest - oldest <= 0.5 + 0.1 + 1e-9);
        assert!(history.len() < 10);
    }

    #[test]
    fn lookups_clamp_and_interpolate() {
        let mut history = RewindHistory::new(10.0);
        history.record(cube_at(0.0), false, 1.0);
        history.record(cube_at(10.0), false, 2.0);
        history.record(cube_at(20.0), true, 3.0);

        assert!(matches!(
            history.frame_at(0.5),
            Err(RewindError::TooFarBack { .. })
        ));

        assert_eq!(history.frame_at(5.0).map(|f| f.time), Ok(3.0));
        assert_eq!(history.frame_at(2.0), Ok(FramePackage::new(cube_at(10.0), false, 2.0)));
        assert_eq!(history.frame_at(1.0).map(|f| f.hit_box), Ok(cube_at(0.0)));

        let mid = history.frame_at(1.5).unwrap();
        assert_eq!(mid.time, 1.5);
        assert_eq!(mid.hit_box, cube_at(5.0));
        assert!(!mid.teleported);

        let across_teleport = history.frame_at(2.25).unwrap();
        assert!(across_teleport.teleported);
        assert_eq!(across_teleport.hit_box, cube_at(12.5));
    }

    #[test]
    fn tick_consumes_teleport_flag() {
        let mut history = RewindHistory::default();
        history.set_just_teleported(true);
        history.tick(cube_at(0.0), 0.1);
        history.tick(cube_at(1.0), 0.2);

        let flags: Vec<bool> = history.iter().map(|f| f.teleported).collect();
        assert_eq!(flags, vec![false, true]);
    }
}
