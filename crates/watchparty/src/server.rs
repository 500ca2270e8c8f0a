//! `WatchPartyServer` builder and server loop.
//!
//! This is the entry point for running a watch-party server. It ties
//! together all the layers: transport → protocol → room, plus the HTTP
//! bootstrap API on its own listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use watchparty_protocol::{Codec, JsonCodec};
use watchparty_room::{RoomConfig, RoomRegistry};
use watchparty_transport::{Transport, WebSocketTransport};

use crate::WatchPartyError;
use crate::handler::{ConnectionConfig, ServerState, handle_connection};
use crate::http;

/// Builder for configuring and starting a watch-party server.
///
/// # Example
///
/// ```rust,no_run
/// use watchparty::prelude::*;
///
/// # async fn run() -> Result<(), WatchPartyError> {
/// let server = WatchPartyServer::builder()
///     .bind("0.0.0.0:8080")
///     .http_bind("0.0.0.0:8081")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct WatchPartyServerBuilder {
    ws_addr: String,
    http_addr: Option<String>,
    room_config: RoomConfig,
    connection_config: ConnectionConfig,
}

impl WatchPartyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            ws_addr: "127.0.0.1:8080".to_string(),
            http_addr: Some("127.0.0.1:8081".to_string()),
            room_config: RoomConfig::default(),
            connection_config: ConnectionConfig::default(),
        }
    }

    /// Sets the address the WebSocket listener binds to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.ws_addr = addr.to_string();
        self
    }

    /// Sets the address the HTTP API binds to.
    pub fn http_bind(mut self, addr: &str) -> Self {
        self.http_addr = Some(addr.to_string());
        self
    }

    /// Serves WebSocket traffic only.
    pub fn without_http(mut self) -> Self {
        self.http_addr = None;
        self
    }

    /// Sets the configuration every room is created with.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Closes connections that stay completely silent for `timeout`.
    /// Off unless set; a dropped participant is otherwise only noticed
    /// when the socket itself fails.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.connection_config.idle_timeout = Some(timeout);
        self
    }

    /// Binds both listeners.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`, which is what browsers
    /// speak.
    pub async fn build(self) -> Result<WatchPartyServer<JsonCodec>, WatchPartyError> {
        let transport = WebSocketTransport::bind(&self.ws_addr).await?;
        let http = match &self.http_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let state = Arc::new(ServerState {
            registry: RoomRegistry::new(self.room_config),
            codec: JsonCodec,
            connection: self.connection_config,
        });

        Ok(WatchPartyServer {
            transport,
            http,
            state,
        })
    }
}

impl Default for WatchPartyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound watch-party server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WatchPartyServer<C: Codec> {
    transport: WebSocketTransport,
    http: Option<TcpListener>,
    state: Arc<ServerState<C>>,
}

impl WatchPartyServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> WatchPartyServerBuilder {
        WatchPartyServerBuilder::new()
    }
}

impl<C: Codec> WatchPartyServer<C> {
    /// Returns the address the WebSocket listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address the HTTP API is bound to, if it is enabled.
    pub fn http_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.http.as_ref().map(TcpListener::local_addr)
    }

    /// The registry shared by the WebSocket router and the HTTP API.
    pub fn registry(&self) -> RoomRegistry {
        self.state.registry.clone()
    }

    /// Runs the server.
    ///
    /// Spawns the HTTP API, then accepts WebSocket connections and spawns a
    /// handler task for each one. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), WatchPartyError> {
        if let Some(listener) = self.http.take() {
            let app = http::router(self.state.registry.clone());
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "http server stopped");
                }
            });
        }

        tracing::info!("watch-party server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
