//! Routing graph configuration.
//!
//! Every field has a serde default so partial configuration files are
//! accepted. [`RepGraphConfig::validate`] is run by
//! [`ReplicationRoutingGraph::new`](crate::ReplicationRoutingGraph::new).

use crate::class::RoutingCategory;
use crate::error::ConfigValidationError;
use serde::{Deserialize, Serialize};

/// Per-class override applied during bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSettings {
    /// Registered class name
    pub class: String,
    /// Explicit routing category for the class
    #[serde(default)]
    pub mapping: Option<RoutingCategory>,
    /// Whether multicast RPCs may open a channel for this class
    #[serde(default)]
    pub rpc_multicast_open_channel: Option<bool>,
}

impl ClassSettings {
    pub fn routed(class: impl Into<String>, mapping: RoutingCategory) -> Self {
        Self {
            class: class.into(),
            mapping: Some(mapping),
            rpc_multicast_open_channel: None,
        }
    }
}

/// Settings of one routing graph instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepGraphConfig {
    /// Side length of a grid cell in world units
    #[serde(default = "default_cell_size")]
    pub spatial_grid_cell_size: f64,
    /// Initial "min X" of the grid. The grid rebases if entities appear below it.
    #[serde(default = "default_spatial_bias")]
    pub spatial_bias_x: f64,
    /// Initial "min Y" of the grid
    #[serde(default = "default_spatial_bias")]
    pub spatial_bias_y: f64,
    /// Deny-lists the root class from grid rebuilds
    #[serde(default = "default_true")]
    pub disable_spatial_rebuilds: bool,
    /// Classes (and their descendants) that never trigger a grid rebuild
    #[serde(default)]
    pub spatial_rebuild_deny_list: Vec<String>,
    /// Buckets dynamic spatialized entities are spread across
    #[serde(default = "default_dynamic_buckets")]
    pub dynamic_actor_frequency_buckets: usize,
    #[serde(default = "default_true")]
    pub enable_fast_shared_path: bool,
    /// Fast shared path bandwidth, counted separately from the transport budget
    #[serde(default = "default_fast_path_kbytes")]
    pub target_kbytes_sec_fast_shared_path: u32,
    #[serde(default = "default_fast_path_cull_pct")]
    pub fast_shared_path_cull_dist_pct: f32,
    /// Destruction notices for spatialized entities further than this are dropped
    #[serde(default = "default_destruction_max_dist")]
    pub destruction_info_max_dist: f64,
    /// Server tick rate used for period and bit budget math
    #[serde(default = "default_tick_rate")]
    pub net_server_max_tick_rate: f64,
    /// Class throttled by the frequency limiter node
    #[serde(default = "default_player_state_class")]
    pub player_state_class: String,
    #[serde(default = "default_player_state_per_frame")]
    pub player_state_target_actors_per_frame: usize,
    /// Class whose defaults seed the explicit pawn replication info
    #[serde(default)]
    pub base_pawn_class: Option<String>,
    /// Logs classes whose info is derived lazily after bootstrap
    #[serde(default)]
    pub log_lazy_init_classes: bool,
    /// Logs client streaming-level visibility changes
    #[serde(default)]
    pub display_client_level_streaming: bool,
    /// Kept last: serialized as an array of tables
    #[serde(default)]
    pub class_settings: Vec<ClassSettings>,
}

fn default_cell_size() -> f64 {
    10_000.0
}

fn default_spatial_bias() -> f64 {
    -200_000.0
}

fn default_true() -> bool {
    true
}

fn default_dynamic_buckets() -> usize {
    3
}

fn default_fast_path_kbytes() -> u32 {
    10
}

fn default_fast_path_cull_pct() -> f32 {
    0.8
}

fn default_destruction_max_dist() -> f64 {
    30_000.0
}

fn default_tick_rate() -> f64 {
    30.0
}

fn default_player_state_class() -> String {
    "PlayerState".to_string()
}

fn default_player_state_per_frame() -> usize {
    2
}

impl Default for RepGraphConfig {
    fn default() -> Self {
        Self {
            spatial_grid_cell_size: default_cell_size(),
            spatial_bias_x: default_spatial_bias(),
            spatial_bias_y: default_spatial_bias(),
            disable_spatial_rebuilds: true,
            spatial_rebuild_deny_list: Vec::new(),
            dynamic_actor_frequency_buckets: default_dynamic_buckets(),
            enable_fast_shared_path: true,
            target_kbytes_sec_fast_shared_path: default_fast_path_kbytes(),
            fast_shared_path_cull_dist_pct: default_fast_path_cull_pct(),
            destruction_info_max_dist: default_destruction_max_dist(),
            net_server_max_tick_rate: default_tick_rate(),
            player_state_class: default_player_state_class(),
            player_state_target_actors_per_frame: default_player_state_per_frame(),
            base_pawn_class: None,
            log_lazy_init_classes: false,
            display_client_level_streaming: false,
            class_settings: Vec::new(),
        }
    }
}

impl RepGraphConfig {
    /// Squared destruction-notice cutoff.
    pub fn destruction_info_max_dist_squared(&self) -> f64 {
        self.destruction_info_max_dist * self.destruction_info_max_dist
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.spatial_grid_cell_size.is_finite() || self.spatial_grid_cell_size <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "spatial_grid_cell_size must be a positive number".to_string(),
            ));
        }

        if !self.spatial_bias_x.is_finite() || !self.spatial_bias_y.is_finite() {
            return Err(ConfigValidationError::InvalidValue(
                "spatial bias must be finite".to_string(),
            ));
        }

        if self.dynamic_actor_frequency_buckets == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dynamic_actor_frequency_buckets must be at least 1".to_string(),
            ));
        }

        if !self.net_server_max_tick_rate.is_finite() || self.net_server_max_tick_rate <= 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "net_server_max_tick_rate must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.fast_shared_path_cull_dist_pct) {
            return Err(ConfigValidationError::InvalidValue(
                "fast_shared_path_cull_dist_pct must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.destruction_info_max_dist < 0.0 {
            return Err(ConfigValidationError::InvalidValue(
                "destruction_info_max_dist cannot be negative".to_string(),
            ));
        }

        if self.player_state_target_actors_per_frame == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "player_state_target_actors_per_frame must be at least 1".to_string(),
            ));
        }

        if let Some(setting) = self.class_settings.iter().find(|s| s.class.is_empty()) {
            return Err(ConfigValidationError::InvalidValue(format!(
                "class_settings entry has an empty class name: {:?}",
                setting
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RepGraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.destruction_info_max_dist_squared(), 900_000_000.0);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RepGraphConfig =
            serde_json::from_str(r#"{ "spatial_grid_cell_size": 500.0 }"#).unwrap();
        assert_eq!(config.spatial_grid_cell_size, 500.0);
        assert_eq!(config.dynamic_actor_frequency_buckets, 3);
        assert_eq!(config.player_state_class, "PlayerState");
        assert!(config.disable_spatial_rebuilds);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = RepGraphConfig {
            dynamic_actor_frequency_buckets: 0,
            ..RepGraphConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RepGraphConfig {
            spatial_grid_cell_size: 0.0,
            ..RepGraphConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RepGraphConfig {
            net_server_max_tick_rate: f64::NAN,
            ..RepGraphConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RepGraphConfig {
            class_settings: vec![ClassSettings::routed("", RoutingCategory::NotRouted)],
            ..RepGraphConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn class_settings_deserialize_category_names() {
        let setting: ClassSettings = serde_json::from_str(
            r#"{ "class": "Door", "mapping": "SpatializeDormancy", "rpc_multicast_open_channel": false }"#,
        )
        .unwrap();
        assert_eq!(setting.mapping, Some(RoutingCategory::SpatializeDormancy));
        assert_eq!(setting.rpc_multicast_open_channel, Some(false));
    }
}
