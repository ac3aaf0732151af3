//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! server startup, monitoring, and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use signal_events::ShutdownState;
use signal_server::SignalServer;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main application struct.
///
/// Manages the complete lifecycle of the Switchboard server: configuration
/// loading, server initialization, health monitoring, and graceful
/// shutdown handling.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Signaling server instance
    server: SignalServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// initializes the signaling server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        info!(
            "✅ Configuration loaded successfully from {}",
            args.config_path.display()
        );

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let server = SignalServer::new(server_config);

        info!("🚀 Switchboard Signaling Server v{}", env!("CARGO_PKG_VERSION"));
        info!("🏗️ Architecture: State Registry + Overridable Event Bus");
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the application until a shutdown signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Switchboard Signaling Server");
        self.log_configuration_summary();

        let bus = self.server.bus();
        let initial_stats = bus.stats();
        info!("📊 Initial Event Bus State:");
        info!("  - Listeners registered: {}", initial_stats.total_listeners);
        info!("  - Events emitted: {}", initial_stats.events_emitted);

        let config = self.config.clone();

        // Shutdown state shared between the signal handler and the accept
        // loop.
        let shutdown_state = ShutdownState::new();
        let shutdown_state_for_server = shutdown_state.clone();

        let server = Arc::new(self.server);
        let server_handle = {
            let server = server.clone();
            tokio::spawn(async move {
                match server
                    .start_with_shutdown_state(shutdown_state_for_server)
                    .await
                {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        // Periodic health reporting.
        let monitoring_handle = {
            let bus = bus.clone();
            let sockets = server.sockets();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(tokio::time::Duration::from_secs(60));
                let mut last_events_emitted = 0u64;
                loop {
                    interval.tick().await;
                    let stats = bus.stats();
                    let events_this_period = stats.events_emitted - last_events_emitted;
                    last_events_emitted = stats.events_emitted;
                    info!(
                        "📊 System Health - {} events/min | {} listeners | {} sockets",
                        events_this_period,
                        stats.total_listeners,
                        sockets.count().await
                    );
                }
            })
        };

        info!("✅ Switchboard Server is now running!");
        info!(
            "📡 Ready to accept connections on {}",
            config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        // Block until the first shutdown signal.
        let signal_shutdown_state = setup_signal_handlers().await?;

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up immediate shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting immediately");
            std::process::exit(1);
        });

        if signal_shutdown_state.is_shutdown_initiated() {
            shutdown_state.initiate_shutdown();
        }
        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        monitoring_handle.abort();
        server.shutdown();

        info!("⏳ Waiting for server task to complete gracefully...");
        match tokio::time::timeout(tokio::time::Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(e) => warn!(
                "⏰ Server task did not complete within timeout, proceeding: {:?}",
                e
            ),
        }

        // Give connection tasks time to flush close frames.
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

        let final_stats = bus.stats();
        info!("📊 Final Statistics:");
        info!("  - Total events processed: {}", final_stats.events_emitted);
        info!("  - Listeners registered: {}", final_stats.total_listeners);

        info!("✅ Switchboard Server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  ⏱️ Connection timeout: {}s",
            self.config.server.connection_timeout
        );
        info!(
            "  🚪 Default room: '{}' (auto-create: {})",
            self.config.signaling.default_room, self.config.signaling.auto_create_rooms
        );
        info!(
            "  🧊 ICE servers configured: {}",
            self.config.signaling.ice_servers.len()
        );
    }
}
