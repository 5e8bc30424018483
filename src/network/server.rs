//! WebSocket Server
//!
//! Async WebSocket server in front of the [`GameEngine`]. Each connection
//! gets a reader loop and a writer task joined by an mpsc channel; a single
//! forwarder task fans engine events out to the connections watching them.
//!
//! ```text
//!   client ──text──► reader ──dispatch──► GameEngine
//!      ▲                │                     │ events
//!      └──── writer ◄── mpsc ◄── forwarder ◄──┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::engine::{GameEngine, GameError, SessionEvent, SessionId};
use crate::network::protocol::{ClientMessage, ClientRequest, ErrorCode, ServerMessage};

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind or accept.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Last frame received.
    last_activity: Instant,
    /// Sessions whose events stream to this client.
    watching: BTreeSet<SessionId>,
    /// Message sender (for pushed events).
    sender: mpsc::Sender<ServerMessage>,
    /// Wakes the reader loop when the client is dropped for idleness.
    kick: Arc<Notify>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The SpinServe server.
pub struct SpinServer {
    /// Server configuration.
    config: ServerConfig,
    /// The engine requests are dispatched to.
    engine: Arc<GameEngine>,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl SpinServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: Arc<GameEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.run_on(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!("SpinServe server listening on {}", listener.local_addr()?);

        let forwarder_handle = tokio::spawn(Self::run_event_forwarder(
            self.engine.subscribe(),
            self.clients.clone(),
        ));
        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.clients.clone(),
            self.engine.clone(),
            self.config.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
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

        forwarder_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            match Self::serve_connection(stream, addr, engine, clients, shutdown_rx).await {
                Ok(()) => info!("Client {} cleaned up", addr),
                Err(e) => error!("Connection {} failed: {}", addr, e),
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: Arc<GameEngine>,
        clients: Clients,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
        let kick = Arc::new(Notify::new());

        // Register client
        {
            let mut clients = clients.write().await;
            clients.insert(addr, ConnectedClient {
                connected_at: Instant::now(),
                last_activity: Instant::now(),
                watching: BTreeSet::new(),
                sender: msg_tx.clone(),
                kick: kick.clone(),
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
            let _ = ws_sender.close().await;
        });

        let result = loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            // Update activity
                            {
                                let mut clients = clients.write().await;
                                if let Some(client) = clients.get_mut(&addr) {
                                    client.last_activity = Instant::now();
                                }
                            }

                            let response = match ClientMessage::from_json(&text) {
                                Ok(client_msg) => Self::dispatch(&engine, &clients, addr, client_msg).await,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    ServerMessage::error(None, ErrorCode::InvalidRequest, format!("Invalid message format: {}", e))
                                }
                            };
                            if msg_tx.send(response).await.is_err() {
                                break Ok(());
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break Ok(());
                        }
                        Some(Err(e)) => break Err(ServerError::from(e)),
                        _ => {}
                    }
                }
                _ = kick.notified() => {
                    info!("Closing idle client {}", addr);
                    break Ok(());
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break Ok(());
                }
            }
        };

        // Dropping every sender lets the writer drain and close the socket.
        let connected_for = clients
            .write()
            .await
            .remove(&addr)
            .map(|client| client.connected_at.elapsed());
        drop(msg_tx);
        if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
            debug!("Writer for {} did not drain in time", addr);
        }
        if let Some(connected_for) = connected_for {
            debug!("Client {} was connected for {:?}", addr, connected_for);
        }

        result
    }

    /// Execute one request and build its response.
    async fn dispatch(
        engine: &GameEngine,
        clients: &Clients,
        addr: SocketAddr,
        msg: ClientMessage,
    ) -> ServerMessage {
        let request_id = msg.request_id;
        let reply = |result: Result<ServerMessage, GameError>| {
            result.unwrap_or_else(|e| ServerMessage::game_error(request_id, &e))
        };

        match msg.request {
            ClientRequest::OpenSession { restaurant_id, table_id } => {
                let session = engine.open_session(restaurant_id, table_id).await;
                ServerMessage::Session { request_id, session }
            }
            ClientRequest::AddOrderItems { session_id, items } => reply(
                engine
                    .add_order_items(session_id, items)
                    .await
                    .map(|session| ServerMessage::Session { request_id, session }),
            ),
            ClientRequest::MarkPuzzleSolved { session_id } => reply(
                engine
                    .mark_puzzle_solved(session_id)
                    .await
                    .map(|session| ServerMessage::Session { request_id, session }),
            ),
            ClientRequest::RequestSpin { session_id } => reply(
                engine
                    .request_spin(session_id)
                    .await
                    .map(|outcome| ServerMessage::Spin { request_id, outcome }),
            ),
            ClientRequest::GetSession { session_id } => reply(
                engine
                    .get_session(session_id)
                    .await
                    .map(|session| ServerMessage::Session { request_id, session }),
            ),
            ClientRequest::RefreshBill { session_id } => reply(
                engine
                    .refresh_bill(session_id)
                    .await
                    .map(|session| ServerMessage::Session { request_id, session }),
            ),
            ClientRequest::GetBill { session_id } => reply(
                engine
                    .get_bill(session_id)
                    .await
                    .map(|bill| ServerMessage::Bill { request_id, bill }),
            ),
            ClientRequest::CloseSession { session_id } => reply(
                engine
                    .close_session(session_id)
                    .await
                    .map(|bill| ServerMessage::Bill { request_id, bill }),
            ),
            ClientRequest::ListOpenSessions { restaurant_id } => {
                let sessions = engine.list_open_sessions(restaurant_id.as_ref()).await;
                ServerMessage::Sessions { request_id, sessions }
            }
            ClientRequest::GetGameConfig { restaurant_id } => {
                match engine.configs().get_game_config(&restaurant_id).await {
                    Some(config) => ServerMessage::GameConfig { request_id, config },
                    None => ServerMessage::game_error(request_id, &GameError::ConfigMissing(restaurant_id)),
                }
            }
            ClientRequest::SetGameConfig { restaurant_id, config, menu } => {
                match engine.configs().set_game_config(restaurant_id.clone(), config, &menu).await {
                    Ok(version) => ServerMessage::ConfigSaved { request_id, restaurant_id, version },
                    Err(e) => ServerMessage::config_error(request_id, &e),
                }
            }
            ClientRequest::UpdateMenu { restaurant_id, menu } => {
                let problem = engine
                    .configs()
                    .revalidate(&restaurant_id, &menu)
                    .await
                    .map(|e| e.to_string());
                ServerMessage::MenuChecked { request_id, restaurant_id, problem }
            }
            ClientRequest::AuditSession { session_id } => reply(
                engine
                    .audit_session(session_id)
                    .await
                    .map(|report| ServerMessage::Audit { request_id, report }),
            ),
            ClientRequest::Watch { session_id } => {
                if let Err(e) = engine.get_session(session_id).await {
                    return ServerMessage::game_error(request_id, &e);
                }
                Self::set_watching(clients, addr, session_id, true).await;
                ServerMessage::Watching { request_id, session_id, active: true }
            }
            ClientRequest::Unwatch { session_id } => {
                Self::set_watching(clients, addr, session_id, false).await;
                ServerMessage::Watching { request_id, session_id, active: false }
            }
            ClientRequest::Ping { timestamp } => ServerMessage::Pong {
                request_id,
                timestamp,
                server_time: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            },
        }
    }

    async fn set_watching(clients: &Clients, addr: SocketAddr, session_id: SessionId, active: bool) {
        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&addr) {
            if active {
                client.watching.insert(session_id);
            } else {
                client.watching.remove(&session_id);
            }
        }
    }

    /// Fan engine events out to watching clients.
    async fn run_event_forwarder(mut events: broadcast::Receiver<SessionEvent>, clients: Clients) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let clients = clients.read().await;
                    for (addr, client) in clients.iter() {
                        if !client.watching.contains(&event.session_id) {
                            continue;
                        }
                        // A full queue means a slow client; it can re-poll.
                        if client.sender.try_send(ServerMessage::Event(event.clone())).is_err() {
                            debug!("Dropped event for {}", addr);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event forwarder lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(clients: Clients, engine: Arc<GameEngine>, config: ServerConfig) {
        let mut interval = interval(config.cleanup_interval);

        loop {
            interval.tick().await;

            // Cleanup idle connections
            let now = Instant::now();
            {
                let mut clients = clients.write().await;
                clients.retain(|addr, client| {
                    if now.duration_since(client.last_activity) > config.idle_timeout {
                        client.kick.notify_one();
                        info!("Removed idle client {}", addr);
                        false
                    } else {
                        true
                    }
                });
            }

            // Cleanup closed sessions
            engine.purge_closed(config.closed_retention).await;
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

    /// Get session count.
    pub async fn session_count(&self) -> usize {
        self.engine.session_count().await
    }

    /// The engine behind this server.
    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::money::Money;
    use crate::core::rng::FixedSeed;
    use crate::engine::{ConfigStore, GameStatus, OrderLine, SessionEventKind, TableId};
    use crate::wheel::config::{MenuItemId, MenuSnapshot, RestaurantGameConfig, RestaurantId};
    use crate::wheel::reward::Reward;
    use crate::wheel::table::Slot;

    fn scenario_config() -> RestaurantGameConfig {
        RestaurantGameConfig {
            unlock_initial: Money::from_major(200),
            unlock_increment: Money::from_major(50),
            slots: vec![
                Slot::empty("Try Again", 60),
                Slot::prize("10% Off", 40, Reward::percentage(10, "10% Off").unwrap()),
            ],
        }
    }

    async fn test_engine() -> Arc<GameEngine> {
        let store = Arc::new(ConfigStore::new());
        store
            .set_game_config(RestaurantId::new("rest_001"), scenario_config(), &MenuSnapshot::default())
            .await
            .unwrap();
        Arc::new(GameEngine::with_seed_source(EngineConfig::default(), store, Arc::new(FixedSeed(1))))
    }

    fn test_server(engine: Arc<GameEngine>) -> SpinServer {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        SpinServer::new(config, engine)
    }

    fn request(request_id: u64, request: ClientRequest) -> ClientMessage {
        ClientMessage::new(Some(request_id), request)
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn session_of(msg: ServerMessage) -> crate::engine::SessionSnapshot {
        match msg {
            ServerMessage::Session { session, .. } => session,
            other => panic!("Expected session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = test_server(test_engine().await);
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_scenario() {
        let server = test_server(test_engine().await);
        let engine = server.engine();

        let opened = SpinServer::dispatch(engine, &server.clients, addr(), request(1, ClientRequest::OpenSession {
            restaurant_id: RestaurantId::new("rest_001"),
            table_id: TableId::new("T1"),
        }))
        .await;
        let session_id = session_of(opened).session.id;

        let items = vec![OrderLine::new(MenuItemId::new("meals"), "Meals", 2, Money::from_major(110))];
        let added = SpinServer::dispatch(engine, &server.clients, addr(), request(2, ClientRequest::AddOrderItems {
            session_id,
            items,
        }))
        .await;
        assert_eq!(session_of(added).session.game_status, GameStatus::Unlocked);

        let early = SpinServer::dispatch(engine, &server.clients, addr(), request(3, ClientRequest::RequestSpin { session_id })).await;
        match early {
            ServerMessage::Error { request_id, code, .. } => {
                assert_eq!(request_id, Some(3));
                assert_eq!(code, ErrorCode::NotEligible);
            }
            other => panic!("Expected error, got {:?}", other),
        }

        SpinServer::dispatch(engine, &server.clients, addr(), request(4, ClientRequest::MarkPuzzleSolved { session_id })).await;
        let spun = SpinServer::dispatch(engine, &server.clients, addr(), request(5, ClientRequest::RequestSpin { session_id })).await;
        match spun {
            ServerMessage::Spin { request_id, outcome } => {
                assert_eq!(request_id, Some(5));
                assert_eq!(outcome.slot_index, 1);
                assert_eq!(outcome.record.seed, Some(1));
            }
            other => panic!("Expected spin, got {:?}", other),
        }

        let closed = SpinServer::dispatch(engine, &server.clients, addr(), request(6, ClientRequest::CloseSession { session_id })).await;
        match closed {
            ServerMessage::Bill { bill, .. } => assert_eq!(bill.total_payable, Money::from_major(198)),
            other => panic!("Expected bill, got {:?}", other),
        }

        let audit = SpinServer::dispatch(engine, &server.clients, addr(), request(7, ClientRequest::AuditSession { session_id })).await;
        match audit {
            ServerMessage::Audit { report, .. } => assert!(report.is_valid()),
            other => panic!("Expected audit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_config_requests() {
        let server = test_server(test_engine().await);
        let engine = server.engine();
        let rid = RestaurantId::new("rest_002");

        let missing = SpinServer::dispatch(engine, &server.clients, addr(), request(1, ClientRequest::GetGameConfig {
            restaurant_id: rid.clone(),
        }))
        .await;
        assert!(matches!(missing, ServerMessage::Error { code: ErrorCode::ConfigMissing, .. }));

        let mut bad = scenario_config();
        bad.slots[1].probability = 41;
        let rejected = SpinServer::dispatch(engine, &server.clients, addr(), request(2, ClientRequest::SetGameConfig {
            restaurant_id: rid.clone(),
            config: bad,
            menu: MenuSnapshot::default(),
        }))
        .await;
        assert!(matches!(rejected, ServerMessage::Error { code: ErrorCode::InvalidConfig, .. }));

        let saved = SpinServer::dispatch(engine, &server.clients, addr(), request(3, ClientRequest::SetGameConfig {
            restaurant_id: rid.clone(),
            config: scenario_config(),
            menu: MenuSnapshot::default(),
        }))
        .await;
        assert!(matches!(saved, ServerMessage::ConfigSaved { version: 1, .. }));

        let checked = SpinServer::dispatch(engine, &server.clients, addr(), request(4, ClientRequest::UpdateMenu {
            restaurant_id: rid.clone(),
            menu: MenuSnapshot::default(),
        }))
        .await;
        assert!(matches!(checked, ServerMessage::MenuChecked { problem: None, .. }));
    }

    #[tokio::test]
    async fn test_watch_unknown_session() {
        let server = test_server(test_engine().await);
        let reply = SpinServer::dispatch(server.engine(), &server.clients, addr(), request(1, ClientRequest::Watch {
            session_id: SessionId::new([5; 16]),
        }))
        .await;
        assert!(matches!(reply, ServerMessage::Error { code: ErrorCode::SessionNotFound, .. }));
    }

    #[tokio::test]
    async fn test_websocket_roundtrip() {
        let server = Arc::new(test_server(test_engine().await));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.run_on(listener).await })
        };

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", local)).await.unwrap();

        async fn next_message<S>(ws: &mut S) -> ServerMessage
        where
            S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
        {
            loop {
                let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                    .await
                    .expect("timed out")
                    .expect("stream ended")
                    .expect("websocket error");
                if let Message::Text(text) = frame {
                    return ServerMessage::from_json(&text).unwrap();
                }
            }
        }

        ws.send(Message::Text("not json".to_string())).await.unwrap();
        assert!(matches!(
            next_message(&mut ws).await,
            ServerMessage::Error { code: ErrorCode::InvalidRequest, .. }
        ));

        let open = request(1, ClientRequest::OpenSession {
            restaurant_id: RestaurantId::new("rest_001"),
            table_id: TableId::new("T9"),
        });
        ws.send(Message::Text(open.to_json().unwrap())).await.unwrap();
        let session_id = session_of(next_message(&mut ws).await).session.id;

        let watch = request(2, ClientRequest::Watch { session_id });
        ws.send(Message::Text(watch.to_json().unwrap())).await.unwrap();
        assert!(matches!(next_message(&mut ws).await, ServerMessage::Watching { active: true, .. }));

        let add = request(3, ClientRequest::AddOrderItems {
            session_id,
            items: vec![OrderLine::new(MenuItemId::new("meals"), "Meals", 1, Money::from_major(220))],
        });
        ws.send(Message::Text(add.to_json().unwrap())).await.unwrap();

        let mut responses = 0;
        let mut event_kinds = Vec::new();
        let unlocked = |kinds: &Vec<SessionEventKind>| {
            kinds.iter().any(|k| matches!(k, SessionEventKind::Unlocked { .. }))
        };
        while responses == 0 || !unlocked(&event_kinds) {
            match next_message(&mut ws).await {
                ServerMessage::Session { request_id: Some(3), .. } => responses += 1,
                ServerMessage::Event(event) => event_kinds.push(event.kind),
                other => panic!("Unexpected message {:?}", other),
            }
        }
        assert_eq!(responses, 1);
        assert!(event_kinds.iter().any(|k| matches!(k, SessionEventKind::ItemsAdded { .. })));

        server.shutdown();
        assert!(matches!(next_message(&mut ws).await, ServerMessage::Shutdown { .. }));
        running.await.unwrap().unwrap();
    }
}
