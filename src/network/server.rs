//! WebSocket Game Server
//!
//! Accepts connections on `/game/{matchId}/{participantId}`, binds each one to
//! its match session and relays client frames into the session.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message, WebSocketStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::session::{ConnectionId, MatchRegistry};

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket handshake or transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake completed without a match route.
    #[error("Connection has no match route")]
    MissingRoute,
}

/// Match and participant named by a connection path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Match id.
    pub match_id: String,
    /// Participant id.
    pub participant_id: String,
}

impl Route {
    /// Parse `/game/{matchId}/{participantId}`.
    pub fn parse(path: &str) -> Option<Route> {
        let mut parts = path.trim_matches('/').split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("game"), Some(match_id), Some(participant_id), None)
                if !match_id.is_empty() && !participant_id.is_empty() =>
            {
                Some(Route {
                    match_id: match_id.to_string(),
                    participant_id: participant_id.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Connected client state.
struct ConnectedClient {
    /// Match the connection is bound to.
    match_id: String,
    /// Participant id from the route.
    participant_id: String,
    /// Connection time.
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Live matches.
    registry: Arc<MatchRegistry>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// One permit per accepted socket, handshaking or bound.
    connection_slots: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            registry: Arc::new(MatchRegistry::new(config.rng_seed)),
            connection_slots: Arc::new(Semaphore::new(config.max_connections.min(Semaphore::MAX_PERMITS))),
            config,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Match registry, for the matchmaking hand-off.
    pub fn registry(&self) -> Arc<MatchRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(addr = %listener.local_addr()?, version = %self.config.version, "Game server listening");

        let cleanup_registry = self.registry.clone();
        let cleanup_every = self.config.cleanup_interval;
        let grace = self.config.abandon_grace;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_registry, cleanup_every, grace).await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Ok(permit) = self.connection_slots.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr, permit);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Complete the websocket handshake, rejecting unknown paths with 404.
    async fn accept_routed(
        stream: TcpStream,
    ) -> Result<(WebSocketStream<TcpStream>, Route), GameServerError> {
        let mut route = None;
        let callback = |request: &Request, response: Response| {
            match Route::parse(request.uri().path()) {
                Some(parsed) => {
                    route = Some(parsed);
                    Ok(response)
                }
                None => {
                    let mut rejection = ErrorResponse::new(Some("Unknown route".to_string()));
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    Err(rejection)
                }
            }
        };

        let ws_stream = accept_hdr_async(stream, callback).await?;
        let route = route.ok_or(GameServerError::MissingRoute)?;
        Ok((ws_stream, route))
    }

    /// Handle a new WebSocket connection.
    ///
    /// `permit` is held until the connection task ends.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, permit: OwnedSemaphorePermit) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let (ws_stream, route) = match Self::accept_routed(stream).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(buffer);

            // Bind to the match and queue the current snapshot before any broadcast.
            let session = registry.get_or_create(&route.match_id).await;
            let (conn_id, seat) = {
                let mut session = session.write().await;
                let (conn_id, seat) = session.connect(&route.participant_id, msg_tx.clone());
                session.send_snapshot_to(&conn_id);
                (conn_id, seat)
            };
            info!(
                match_id = %route.match_id,
                participant = %route.participant_id,
                ?seat,
                %addr,
                "Client joined match"
            );

            {
                let mut clients = clients.write().await;
                clients.insert(conn_id, ConnectedClient {
                    match_id: route.match_id.clone(),
                    participant_id: route.participant_id.clone(),
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Dropping frame from {}: {}", addr, e);
                                        continue;
                                    }
                                };

                                // Rejections are reported through the broadcast status line.
                                let _ = session.write().await.handle(&conn_id, client_msg);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            let abandoned = session.write().await.disconnect(&conn_id);
            if abandoned {
                info!(match_id = %route.match_id, "Match has no connections left");
            }

            let mut clients = clients.write().await;
            if let Some(client) = clients.remove(&conn_id) {
                debug!(
                    match_id = %client.match_id,
                    participant = %client.participant_id,
                    connected_secs = client.connected_at.elapsed().as_secs(),
                    "Client {} cleaned up",
                    addr
                );
            }
        });
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(registry: Arc<MatchRegistry>, every: Duration, grace: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;
            let removed = registry.cleanup(grace).await;
            if !removed.is_empty() {
                debug!(count = removed.len(), "Cleanup pass removed matches");
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live match count.
    pub async fn match_count(&self) -> usize {
        self.registry.match_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parsing() {
        assert_eq!(
            Route::parse("/game/m-1/alice"),
            Some(Route { match_id: "m-1".into(), participant_id: "alice".into() })
        );
        assert_eq!(
            Route::parse("/game/m-1/alice/"),
            Some(Route { match_id: "m-1".into(), participant_id: "alice".into() })
        );
        assert_eq!(Route::parse("/game/m-1"), None);
        assert_eq!(Route::parse("/lobby/m-1/alice"), None);
        assert_eq!(Route::parse("/game//alice"), None);
        assert_eq!(Route::parse("/game/m-1/alice/extra"), None);
        assert_eq!(Route::parse("/"), None);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);
        server.shutdown();
        // Should not panic
    }

    #[tokio::test]
    async fn test_registry_shared_with_server() {
        let server = GameServer::new(ServerConfig::default());
        server
            .registry()
            .register_match("m", ["a".into(), "b".into()], None)
            .await;
        assert_eq!(server.match_count().await, 1);
    }
}
