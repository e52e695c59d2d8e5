//! # repgraph - Replication Routing Simulator
//!
//! Drives a [`replication_graph::ReplicationRoutingGraph`] with a simulated
//! world at a fixed tick rate. Useful for watching routing decisions and
//! candidate counts under a given configuration.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration until Ctrl+C
//! repgraph
//!
//! # Run 300 ticks and print the routing tables
//! repgraph --config sim.toml --ticks 300 --dump-routing
//!
//! # JSON logging
//! repgraph --json-logs
//! ```
//!
//! ## Configuration
//!
//! Configuration is loaded from a TOML file (default: `repgraph.toml`). If the
//! file doesn't exist, a default configuration will be created.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;
mod simulation;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the simulator.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{LoggingSettings, SimulationSettings};
pub use simulation::{demo_class_settings, install_demo_classes, SimulationWorld, TickReport};

#[cfg(test)]
mod tests {
    use super::*;
    use replication_graph::ConnectionId;
    use tempfile::tempdir;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.simulation.connections = 2;
        config.simulation.projectiles = 6;
        config.simulation.static_props = 4;
        config.simulation.doors = 2;
        config.simulation.tick_interval_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_application_applies_cli_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repgraph.toml");
        let toml_content = toml::to_string_pretty(&small_config()).unwrap();
        tokio::fs::write(&path, toml_content).await.unwrap();

        let args = cli::CliArgs::parse_from([
            "repgraph".to_string(),
            "--config".to_string(),
            path.display().to_string(),
            "--ticks".to_string(),
            "5".to_string(),
            "--dump-routing".to_string(),
        ])
        .unwrap();

        let app = Application::new(args).await.unwrap();
        assert_eq!(app.graph().connection_count(), 2);
        app.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repgraph.toml");
        let args = cli::CliArgs::parse_from([
            "repgraph".to_string(),
            "--config".to_string(),
            path.display().to_string(),
            "--log-level".to_string(),
            "chatty".to_string(),
        ])
        .unwrap();

        assert!(Application::new(args).await.is_err());
        // The default file is still written on first load.
        assert!(path.exists());
    }

    #[test]
    fn test_ticks_gather_every_connection() {
        let (mut graph, mut world) = app::build_world(&small_config()).unwrap();
        let mut previous = None;
        for tick in 0..4 {
            world.step(&mut graph, tick).unwrap();
            let report = world.replicate(&mut graph, tick).unwrap();
            assert_eq!(report.connections, 2);
            assert!(report.replicate > 0);
            previous = Some(report);
        }
        assert_eq!(previous.map(|r| r.tick), Some(3));
        assert!(graph.connection(ConnectionId(1)).is_some());
    }
}
