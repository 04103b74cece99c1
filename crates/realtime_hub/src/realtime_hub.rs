use crate::domain::{Hub, HubHandle, SessionConfig};
use crate::websocket::{serve, StreamingState};
use sensorhub_runner::AppProcess;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::debug;

/// Configuration for the realtime hub module
pub struct RealtimeHubConfig {
    /// Interface the streaming endpoint binds to
    pub http_host: String,
    pub http_port: u16,
    /// Capacity of the hub's inbound broadcast stream
    pub broadcast_channel_capacity: usize,
    /// Per-subscriber queue and keep-alive settings
    pub session: SessionConfig,
}

/// Hub dispatch loop plus the WebSocket endpoint feeding it subscribers
pub struct RealtimeHub {
    hub: Hub,
    handle: HubHandle,
    listener: TcpListener,
    session_config: SessionConfig,
}

impl RealtimeHub {
    /// Build the hub and bind the streaming listener
    ///
    /// # Arguments
    ///
    /// * `config` - Listener address, broadcast capacity and session settings
    ///
    /// Fails if the listener cannot be bound.
    pub async fn new(config: RealtimeHubConfig) -> anyhow::Result<Self> {
        debug!("initializing realtime hub module");

        let (hub, handle) = Hub::new(config.broadcast_channel_capacity);
        let listener =
            TcpListener::bind((config.http_host.as_str(), config.http_port)).await?;

        Ok(Self {
            hub,
            handle,
            listener,
            session_config: config.session,
        })
    }

    /// Handle for producers such as the ingestion worker
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Address the listener is bound to, useful when binding port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Split into the dispatch loop and the HTTP server, both stopped by the runner's token
    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let Self {
            mut hub,
            handle,
            listener,
            session_config,
        } = self;

        let dispatch: AppProcess = Box::new(move |ctx| {
            Box::pin(async move {
                hub.run(ctx).await;
                Ok(())
            })
        });

        let http: AppProcess = Box::new(move |ctx| {
            Box::pin(async move {
                let state = StreamingState::new(handle, session_config, ctx.clone());
                serve(listener, state, ctx).await
            })
        });

        vec![("realtime_hub_dispatch", dispatch), ("realtime_hub_http", http)]
    }
}
