//! WebSocket-Listener – Bindet Socket, nimmt Upgrades auf `/call` an
//!
//! Der `SignalingServer` bindet einen TCP-Socket und bedient ihn mit axum.
//! Jede akzeptierte WebSocket-Verbindung laeuft als eigener tokio-Task in
//! einer `ClientConnection`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// Zustand des `/call`-Handlers
#[derive(Clone)]
struct CallState {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Baut den axum-Router mit dem WebSocket-Endpunkt
pub fn signaling_router(state: Arc<SignalingState>, shutdown_rx: watch::Receiver<bool>) -> Router {
    let pfad = state.config.pfad.clone();
    Router::new()
        .route(&pfad, get(call_handler))
        .with_state(CallState { state, shutdown_rx })
}

async fn call_handler(
    ws: WebSocketUpgrade,
    State(call): State<CallState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(platz) = call.state.platz_reservieren() else {
        let max = call.state.config.max_verbindungen;
        tracing::warn!(peer = %peer_addr, max, "Server voll – Verbindung abgelehnt");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
    };

    tracing::debug!(peer = %peer_addr, "WebSocket-Upgrade akzeptiert");
    let verbindung = ClientConnection::neu(Arc::clone(&call.state), peer_addr);
    let shutdown_rx = call.shutdown_rx.clone();
    // Scheitert das Upgrade, faellt der Platz mit der Closure
    ws.on_upgrade(move |socket| verbindung.verarbeiten(socket, shutdown_rx, platz))
}

/// WebSocket-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet den Socket und bedient Verbindungen bis zum Shutdown-Signal
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> SignalingResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.mit_listener_starten(listener, shutdown_rx).await
    }

    /// Wie `starten`, aber mit bereits gebundenem Listener
    pub async fn mit_listener_starten(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            pfad = %self.state.config.pfad,
            server = %self.state.config.server_name,
            "WebSocket Signaling-Server gestartet"
        );

        let app = signaling_router(Arc::clone(&self.state), shutdown_rx.clone());
        let mut shutdown = shutdown_rx;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        })
        .await?;

        tracing::info!("WebSocket Signaling-Server gestoppt");
        Ok(())
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
