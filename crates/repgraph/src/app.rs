//! Main application logic and lifecycle management.
//!
//! The `Application` builds the routing graph from the loaded configuration,
//! spawns the simulated world and runs the fixed-rate tick loop until the tick
//! budget is spent or a shutdown signal arrives.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::wait_for_shutdown,
    simulation::{install_demo_classes, SimulationWorld, TickReport},
};
use replication_graph::{format_class_info_table, format_routing_table, ReplicationRoutingGraph};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Running simulation and the graph it drives.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    graph: ReplicationRoutingGraph,
    world: SimulationWorld,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Register classes and bootstrap the routing tables
    /// 5. Spawn the simulated world
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Some(ticks) = args.ticks {
            config.simulation.max_ticks = ticks;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let (graph, world) = build_world(&config)?;

        if args.dump_routing {
            log_table("🗺️ Routing policies", &format_routing_table(&graph.dump_routing()));
            log_table("📐 Class replication info", &format_class_info_table(&graph.dump_class_info()));
        }

        Ok(Self { config, graph, world })
    }

    /// Runs the tick loop.
    ///
    /// Stops after `simulation.max_ticks` ticks, or on SIGINT/SIGTERM when the
    /// budget is zero.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting replication routing simulation");
        self.log_configuration_summary();

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.simulation.tick_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        info!("✅ Simulation is now running!");
        if self.config.simulation.max_ticks == 0 {
            info!("🛑 Press Ctrl+C to gracefully shutdown");
        }

        let mut tick = 0u64;
        let mut totals = TickReport::default();
        loop {
            if self.config.simulation.max_ticks > 0 && tick >= self.config.simulation.max_ticks {
                info!("⏱️ Tick budget of {} reached", self.config.simulation.max_ticks);
                break;
            }

            tokio::select! {
                result = &mut shutdown => {
                    match result {
                        Ok(signal) => info!(signal, tick, "📡 Shutdown signal received, stopping tick loop"),
                        Err(e) => warn!("⚠️ Signal handler failed: {e}"),
                    }
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick_once(tick)?;
                    totals.replicate += report.replicate;
                    totals.fast_shared += report.fast_shared;
                    totals.destruction_notices += report.destruction_notices;
                    tick += 1;
                }
            }
        }

        totals.tick = tick;
        self.log_final_statistics(&totals);
        info!("✅ Simulation shutdown complete");
        Ok(())
    }

    /// Advances the world and gathers every connection once.
    pub fn tick_once(&mut self, tick: u64) -> Result<TickReport, Box<dyn std::error::Error>> {
        self.world.step(&mut self.graph, tick)?;
        let report = self.world.replicate(&mut self.graph, tick)?;

        let interval = self.config.simulation.report_interval_ticks;
        if interval > 0 && tick % interval == 0 {
            info!(
                "📊 Tick {} - {} connections | {} candidates | {} fast path | {} destruction notices",
                report.tick,
                report.connections,
                report.replicate,
                report.fast_shared,
                report.destruction_notices
            );
            let stats = self.graph.grid_stats();
            info!(
                "  🧱 Grid: {} columns | {} static | {} dynamic | {} dormant | {} rebuilds",
                stats.columns,
                stats.static_entities,
                stats.dynamic_entities,
                stats.dormant_entities,
                stats.rebuild_count
            );
            if let Some(first) = self.world.connection_ids().first() {
                if let Some(hit_box) = self.world.rewound_pawn_hit_box(*first, 0.1) {
                    debug!("{} pawn 100ms ago centered at {:?}", first, hit_box.center());
                }
            }
        }
        Ok(report)
    }

    #[cfg(test)]
    pub fn graph(&self) -> &ReplicationRoutingGraph {
        &self.graph
    }

    fn log_configuration_summary(&self) {
        let sim = &self.config.simulation;
        let rep = &self.config.replication;
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Tick interval: {}ms", sim.tick_interval_ms);
        info!("  👥 Connections: {}", sim.connections);
        info!(
            "  🌍 World extent: {:.0} units | relevancy radius {:.0}",
            sim.world_extent, sim.relevancy_radius
        );
        info!(
            "  🧱 Grid cell size: {:.0} | dynamic buckets: {}",
            rep.spatial_grid_cell_size, rep.dynamic_actor_frequency_buckets
        );
        info!(
            "  ⚡ Fast shared path: {} ({} bits/frame)",
            rep.enable_fast_shared_path,
            self.graph.fast_shared_path_constants().max_bits_per_frame
        );
    }

    fn log_final_statistics(&self, totals: &TickReport) {
        info!("📊 Final Statistics:");
        info!("  - Ticks simulated: {}", totals.tick);
        info!("  - Entities networked: {}", self.graph.entity_count());
        info!("  - Replication candidates: {}", totals.replicate);
        info!("  - Fast path candidates: {}", totals.fast_shared);
        info!("  - Destruction notices: {}", totals.destruction_notices);
    }
}

/// Bootstraps the graph and spawns the simulated world from `config`.
pub fn build_world(
    config: &AppConfig,
) -> Result<(ReplicationRoutingGraph, SimulationWorld), Box<dyn std::error::Error>> {
    let mut graph = ReplicationRoutingGraph::new(config.replication.clone())?;
    let classes = install_demo_classes(&mut graph)?;
    graph.init_global_class_settings()?;
    let world = SimulationWorld::spawn(&mut graph, classes, config.simulation.clone())?;
    Ok((graph, world))
}

fn log_table(title: &str, table: &str) {
    info!("{}", title);
    for line in table.lines() {
        info!("  {}", line);
    }
}
