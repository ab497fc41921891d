//! HTTP + WebSocket signal server implementation

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use meetline_core::{ConnectionId, ServerConfig};

use crate::http;
use crate::mailer::Mailer;
use crate::registry::{ConnectionRegistry, EventReceiver};
use crate::router::{Dispatch, SignalRouter};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Shared state for the axum handlers
#[derive(Clone)]
pub struct AppState {
    pub router: SignalRouter,
    pub mailer: Arc<dyn Mailer>,
}

/// Signal server state
pub struct SignalServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    mailer: Arc<dyn Mailer>,
}

impl SignalServer {
    pub fn new(config: ServerConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            mailer,
        }
    }

    /// The registry owned by this server
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Build the axum application
    pub fn app(&self) -> Result<Router, ServerError> {
        let state = AppState {
            router: SignalRouter::new(self.registry.clone()),
            mailer: self.mailer.clone(),
        };

        Ok(Router::new()
            .route("/ws", get(ws_upgrade))
            .route("/send-invite", post(http::send_invite))
            .route("/health", get(http::health))
            .layer(self.cors()?)
            .layer(TraceLayer::new_for_http())
            .with_state(state))
    }

    fn cors(&self) -> Result<CorsLayer, ServerError> {
        let methods = [Method::GET, Method::POST];
        if self.config.cors_origin == "*" {
            return Ok(CorsLayer::permissive().allow_methods(methods));
        }

        let origin: HeaderValue = self
            .config
            .cors_origin
            .parse()
            .map_err(|_| ServerError::Config(format!("bad CORS origin {:?}", self.config.cors_origin)))?;

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true))
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(&self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// All connections are drained from the registry once it does.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app()?;
        info!("Signal server listening on {}", listener.local_addr()?);

        let registry = self.registry.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                registry.drain();
            })
            .await?;

        info!("Signal server stopped");
        Ok(())
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.router))
}

/// Drive one peer from connect to disconnect
async fn handle_socket(socket: WebSocket, router: SignalRouter) {
    // The queue already holds the `connected` greeting
    let (id, outbound) = match router.registry().connect() {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Refusing connection: {}", e);
            return;
        }
    };

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = tokio::spawn(write_events(id.clone(), ws_sender, outbound));
    let mut writer_done = false;

    loop {
        let msg = tokio::select! {
            msg = ws_receiver.next() => msg,
            // Queue closed (registry drained) or socket write failed
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("WebSocket error on {}: {:?}", id, e);
                break;
            }
        };

        if let Dispatch::Unroutable(target) = router.handle_frame(&id, &text) {
            // Nothing goes back to the sender; the router already logged it
            debug!(connection_id = %id, ?target, "invite not routed");
        }
    }

    // Dropping the registry entry closes the queue and ends the writer
    router.registry().disconnect(&id);
    if !writer_done {
        if let Err(e) = writer.await {
            debug!("Writer task for {} ended abnormally: {}", id, e);
        }
    }

    debug!("Connection closed: {}", id);
}

/// Forward queued events onto the socket until the queue closes
async fn write_events(
    id: ConnectionId,
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: EventReceiver,
) {
    while let Some(event) = outbound.recv().await {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode event for {}: {}", id, e);
                continue;
            }
        };

        if ws_sender.send(Message::Text(json)).await.is_err() {
            debug!("Socket for {} went away", id);
            break;
        }
    }

    let _ = ws_sender.close().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use meetline_core::RoomId;

    use super::*;
    use crate::mailer::testing::RecordingMailer;
    use crate::messages::OutboundEvent;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Harness {
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        shutdown: Option<oneshot::Sender<()>>,
        handle: tokio::task::JoinHandle<Result<(), ServerError>>,
    }

    async fn start() -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = SignalServer::new(ServerConfig::default(), Arc::new(RecordingMailer::default()));
        let registry = server.registry();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async move {
                    let _ = rx.await;
                })
                .await
        });

        Harness {
            addr,
            registry,
            shutdown: Some(tx),
            handle,
        }
    }

    /// Connect and read the greeting carrying our id
    async fn connect(addr: SocketAddr) -> (Client, ConnectionId) {
        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        match recv(&mut ws).await {
            OutboundEvent::Connected { connection_id } => (ws, connection_id),
            other => panic!("expected greeting, got {:?}", other),
        }
    }

    async fn recv(ws: &mut Client) -> OutboundEvent {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return OutboundEvent::from_json(&text).unwrap();
            }
        }
    }

    async fn assert_silent(ws: &mut Client) {
        let pending = timeout(Duration::from_millis(200), ws.next()).await;
        assert!(pending.is_err(), "unexpected message: {:?}", pending);
    }

    async fn send(ws: &mut Client, frame: serde_json::Value) {
        ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
    }

    async fn wait_for_len(registry: &ConnectionRegistry, len: usize) {
        for _ in 0..100 {
            if registry.len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry never reached {} connections (has {})", len, registry.len());
    }

    #[tokio::test]
    async fn test_offer_broadcast_except_sender() {
        let harness = start().await;
        let (mut a, _) = connect(harness.addr).await;
        let (mut b, _) = connect(harness.addr).await;
        let (mut c, _) = connect(harness.addr).await;

        let offer = json!({"type": "offer", "sdp": "v=0"});
        send(&mut a, json!({"event": "offer", "payload": offer})).await;

        assert_eq!(recv(&mut b).await, OutboundEvent::Offer { payload: offer.clone() });
        assert_eq!(recv(&mut c).await, OutboundEvent::Offer { payload: offer });
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn test_invite_reaches_only_target() {
        let harness = start().await;
        let (mut a, _) = connect(harness.addr).await;
        let (mut b, b_id) = connect(harness.addr).await;
        let (mut c, _) = connect(harness.addr).await;

        send(
            &mut a,
            json!({"event": "invite", "room": "abc123", "participant_id": b_id}),
        )
        .await;

        assert_eq!(
            recv(&mut b).await,
            OutboundEvent::Invitation { room: RoomId::from("abc123") }
        );
        assert_silent(&mut b).await;
        assert_silent(&mut a).await;
        assert_silent(&mut c).await;
    }

    #[tokio::test]
    async fn test_disconnected_peer_gets_nothing() {
        let harness = start().await;
        let (mut a, _) = connect(harness.addr).await;
        let (mut b, b_id) = connect(harness.addr).await;
        let (mut c, _) = connect(harness.addr).await;

        b.close(None).await.unwrap();
        wait_for_len(&harness.registry, 2).await;
        assert!(!harness.registry.contains(&b_id));

        send(&mut a, json!({"event": "offer", "payload": "sdp"})).await;
        assert_eq!(recv(&mut c).await, OutboundEvent::Offer { payload: json!("sdp") });

        // An invite to the departed id goes nowhere and isn't fatal
        send(
            &mut a,
            json!({"event": "invite", "room": "abc123", "participant_id": b_id}),
        )
        .await;
        assert_silent(&mut c).await;
    }

    #[tokio::test]
    async fn test_bad_frames_keep_connection_open() {
        let harness = start().await;
        let (mut a, _) = connect(harness.addr).await;
        let (mut b, _) = connect(harness.addr).await;

        a.send(WsMessage::Text("not json".into())).await.unwrap();
        a.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
        send(&mut a, json!({"event": "candidate"})).await;
        send(&mut a, json!({"event": "candidate", "payload": null})).await;
        send(&mut a, json!({"event": "invite", "room": "abc123"})).await;
        assert_silent(&mut b).await;

        let candidate = json!({"candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 54321 typ host"});
        send(&mut a, json!({"event": "candidate", "payload": candidate})).await;
        assert_eq!(recv(&mut b).await, OutboundEvent::Candidate { payload: candidate });
        assert_eq!(harness.registry.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_registry() {
        let mut harness = start().await;
        let (mut a, _) = connect(harness.addr).await;
        assert_eq!(harness.registry.len(), 1);

        let client = tokio::spawn(async move { timeout(Duration::from_secs(2), a.next()).await });

        harness.shutdown.take().unwrap().send(()).unwrap();
        timeout(Duration::from_secs(5), harness.handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(harness.registry.is_empty());

        // The writer closes our socket once its queue is gone
        let next = client.await.unwrap().unwrap();
        assert!(matches!(next, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
    }

    #[test]
    fn test_bad_cors_origin_rejected() {
        let config = ServerConfig {
            cors_origin: "bad\norigin".into(),
            ..ServerConfig::default()
        };
        let server = SignalServer::new(config, Arc::new(RecordingMailer::default()));
        assert!(matches!(server.app(), Err(ServerError::Config(_))));
    }
}
