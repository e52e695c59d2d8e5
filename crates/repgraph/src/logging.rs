//! Tracing setup for the simulator.
//!
//! The engine logs under the `replication_graph` target, which can be given
//! its own level so per-tick routing detail does not drown the host output.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for `config`: the host level plus the optional engine override.
pub fn filter_directives(config: &LoggingSettings) -> String {
    match &config.graph_level {
        Some(graph_level) => format!("{},replication_graph={}", config.level, graph_level),
        None => config.level.clone(),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured levels.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let directives = filter_directives(config);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directives)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let json = json_format || config.json_format;

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_names(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false).with_thread_names(true))
            .try_init()?;
    }

    info!(directives = %directives, json, "🔧 Logging initialized");
    Ok(())
}

/// Displays the startup banner through the logger.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║          🛰️  REPGRAPH SIMULATOR           ║");
    info!("║                  v{:<8}               ║", version);
    info!("╚══════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_level_adds_an_engine_directive() {
        let mut config = LoggingSettings::default();
        assert_eq!(filter_directives(&config), "info");

        config.graph_level = Some("trace".to_string());
        assert_eq!(filter_directives(&config), "info,replication_graph=trace");
        assert!(EnvFilter::try_new(filter_directives(&config)).is_ok());
    }
}
