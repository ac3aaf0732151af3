//! Server core: wiring, accept loop, and shutdown.

use crate::config::ServerConfig;
use crate::error::{SignalError, SignalResult};
use crate::protocol::router::{EventPayload, Router, EVENT_STARTUP};
use crate::server::handlers;
use crate::state::server::ServerState;
use crate::transport::{SignalResponseSender, SocketManager};
use signal_events::{EventBus, ShutdownState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// The signaling server.
///
/// Owns the state registry, the event bus with the default protocol
/// listeners, the socket registry, and the accept loop. Everything an
/// embedding application customizes goes through [`SignalServer::bus`] and
/// [`SignalServer::state`].
#[derive(Debug)]
pub struct SignalServer {
    config: ServerConfig,
    state: Arc<ServerState>,
    bus: Arc<EventBus<EventPayload>>,
    sockets: Arc<SocketManager>,
    router: Arc<Router>,
    shutdown_sender: broadcast::Sender<()>,
}

impl SignalServer {
    /// Creates a server with the given configuration.
    ///
    /// The default protocol listeners are registered immediately so an
    /// embedder can override any of them before [`SignalServer::start`].
    pub fn new(config: ServerConfig) -> Self {
        let state = ServerState::new();
        let bus = Arc::new(EventBus::new());
        let sockets = Arc::new(SocketManager::new());
        let router = Router::new(state.clone(), bus.clone());
        router.register_default_listeners();
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            config,
            state,
            bus,
            sockets,
            router,
            shutdown_sender,
        }
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The state registry.
    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// The event bus carrying all protocol topics.
    pub fn bus(&self) -> Arc<EventBus<EventPayload>> {
        self.bus.clone()
    }

    /// The socket registry.
    pub fn sockets(&self) -> Arc<SocketManager> {
        self.sockets.clone()
    }

    /// The router owning the default listeners.
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Injects the transport sender and applies configured option
    /// overrides. Run automatically by [`SignalServer::start`]; exposed so
    /// embedders driving the state registry without the accept loop get
    /// the same wiring.
    pub async fn init_state(&self) -> SignalResult<()> {
        self.state
            .set_client_sender(Arc::new(SignalResponseSender::new(self.sockets.clone())))
            .await;
        for (name, value) in &self.config.option_overrides {
            self.state.set_option(name, value.clone()).await?;
        }
        Ok(())
    }

    /// Starts the server and runs until shutdown is signaled.
    pub async fn start(&self) -> SignalResult<()> {
        self.start_internal(None).await
    }

    /// Starts the server with an externally observable shutdown state.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> SignalResult<()> {
        self.start_internal(Some(shutdown_state)).await
    }

    async fn start_internal(&self, shutdown_state: Option<ShutdownState>) -> SignalResult<()> {
        self.init_state().await?;
        if let Err(e) = self
            .bus
            .emit(EVENT_STARTUP, EventPayload::lifecycle("server"))
            .await
        {
            warn!("Startup event failed: {}", e);
        }

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                SignalError::Server(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;
        info!("🚀 Listening on {}", self.config.bind_address);

        let mut shutdown_rx = self.shutdown_sender.subscribe();
        let mut shutdown_poll = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("🛑 Accept loop stopping");
                    break;
                }
                _ = shutdown_poll.tick() => {
                    if let Some(state) = &shutdown_state {
                        if state.is_shutdown_initiated() {
                            info!("🛑 Accept loop stopping on external shutdown");
                            let _ = self.shutdown_sender.send(());
                            break;
                        }
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if self.sockets.count().await >= self.config.max_connections {
                                warn!("⚠️ Connection from {} refused: at capacity", addr);
                                drop(stream);
                                continue;
                            }
                            let sockets = self.sockets.clone();
                            let bus = self.bus.clone();
                            let max_message_size = self.config.max_message_size;
                            let conn_shutdown = self.shutdown_sender.subscribe();
                            tokio::spawn(async move {
                                handlers::handle_connection(
                                    stream,
                                    addr,
                                    sockets,
                                    bus,
                                    max_message_size,
                                    conn_shutdown,
                                )
                                .await;
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
            }
        }

        if let Some(state) = &shutdown_state {
            state.complete_shutdown();
        }
        Ok(())
    }

    /// Signals the accept loop and every connection task to stop.
    pub fn shutdown(&self) {
        info!("🛑 Shutdown requested");
        let _ = self.shutdown_sender.send(());
    }
}
