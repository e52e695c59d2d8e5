//! Configuration management for the repgraph host.
//!
//! Loads the TOML configuration file, creating one with defaults when it does
//! not exist. The `[replication]` table is handed to the routing graph as-is.

use crate::simulation::demo_class_settings;
use replication_graph::RepGraphConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_tick_interval() -> u64 {
    33 // ~30 ticks per second
}

fn default_connections() -> usize {
    4
}

fn default_projectiles() -> usize {
    64
}

fn default_static_props() -> usize {
    32
}

fn default_doors() -> usize {
    8
}

fn default_world_extent() -> f64 {
    60_000.0
}

fn default_relevancy_radius() -> f64 {
    15_000.0
}

fn default_report_interval() -> u64 {
    30
}

fn default_door_toggle_ticks() -> u64 {
    45
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Simulated world settings
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Routing graph configuration
    #[serde(default = "default_replication")]
    pub replication: RepGraphConfig,
}

/// Simulated world driving the routing graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Ticks to run before exiting (0 runs until shutdown)
    #[serde(default)]
    pub max_ticks: u64,
    /// Simulated client connections
    #[serde(default = "default_connections")]
    pub connections: usize,
    #[serde(default = "default_projectiles")]
    pub projectiles: usize,
    #[serde(default = "default_static_props")]
    pub static_props: usize,
    #[serde(default = "default_doors")]
    pub doors: usize,
    /// Half-width of the square the world is spawned in
    #[serde(default = "default_world_extent")]
    pub world_extent: f64,
    /// Relevancy radius of each connection's viewpoint
    #[serde(default = "default_relevancy_radius")]
    pub relevancy_radius: f64,
    /// Ticks between summary log lines
    #[serde(default = "default_report_interval")]
    pub report_interval_ticks: u64,
    /// Ticks between door dormancy flips
    #[serde(default = "default_door_toggle_ticks")]
    pub door_toggle_ticks: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_ticks: 0,
            connections: default_connections(),
            projectiles: default_projectiles(),
            static_props: default_static_props(),
            doors: default_doors(),
            world_extent: default_world_extent(),
            relevancy_radius: default_relevancy_radius(),
            report_interval_ticks: default_report_interval(),
            door_toggle_ticks: default_door_toggle_ticks(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Separate level for the routing engine's own logs
    #[serde(default)]
    pub graph_level: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            graph_level: None,
        }
    }
}

/// Routing configuration matching the demo class hierarchy.
fn default_replication() -> RepGraphConfig {
    RepGraphConfig {
        base_pawn_class: Some("Pawn".to_string()),
        class_settings: demo_class_settings(),
        ..RepGraphConfig::default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            logging: LoggingSettings::default(),
            replication: default_replication(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file
    /// and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for correctness and consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.simulation.tick_interval_ms == 0 {
            return Err("simulation.tick_interval_ms must be greater than 0".to_string());
        }

        if !self.simulation.world_extent.is_finite() || self.simulation.world_extent <= 0.0 {
            return Err("simulation.world_extent must be a positive number".to_string());
        }

        if self.simulation.relevancy_radius < 0.0 {
            return Err("simulation.relevancy_radius cannot be negative".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if let Some(graph_level) = &self.logging.graph_level {
            if !valid_levels.contains(&graph_level.as_str()) {
                return Err(format!("Invalid logging.graph_level: {graph_level}"));
            }
        }

        self.replication
            .validate()
            .map_err(|e| format!("replication: {e}"))
    }
}
