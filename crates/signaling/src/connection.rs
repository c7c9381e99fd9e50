//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Nachrichten werden strikt in Ankunftsreihenfolge
//! verarbeitet; ausgehende Nachrichten kommen aus der Send-Queue der Session.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen WebSocket-Ping
//! - Kommt innerhalb von `verbindungs_timeout_sek` kein Frame, wird getrennt
//! - Beim Trennen laeuft derselbe Abbau wie bei `stop`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use onair_core::types::SessionId;
use onair_protocol::{ClientNachricht, ServerNachricht};
use tokio::sync::OwnedSemaphorePermit;

use crate::error::SignalingError;
use crate::server_state::SignalingState;
use crate::session::Session;

/// Ergebnis der Verarbeitung eines eingehenden Frames
enum FrameErgebnis {
    Weiter,
    Beenden,
}

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    session_id: SessionId,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer SessionId
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            session_id: SessionId::zufaellig(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal eingeht.
    /// Der Verbindungsplatz wird erst nach dem Abbau der Session frei.
    pub async fn verarbeiten(
        self,
        mut socket: WebSocket,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
        _platz: OwnedSemaphorePermit,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek.max(1));
        let coordinator = &self.state.coordinator;

        let (session, mut sende_rx) = coordinator.verbinden(self.session_id.clone());
        tracing::info!(peer = %peer_addr, session_id = %session.id(), "Neue Verbindung");

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, session_id = %session.id(), "Verbindungs-Timeout");
                break;
            }

            let ping_verzoegerung = naechster_ping.saturating_duration_since(jetzt);

            tokio::select! {
                // Eingehender Frame vom Client
                frame = socket.recv() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            if let FrameErgebnis::Beenden = self.frame_verarbeiten(&session, nachricht).await {
                                tracing::info!(peer = %peer_addr, session_id = %session.id(), "Verbindung vom Client geschlossen");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "WebSocket-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, session_id = %session.id(), "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = nachricht_senden(&mut socket, &ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                    naechster_ping = Instant::now() + keepalive_intervall;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        coordinator.trennen(&session).await;
        tracing::info!(peer = %peer_addr, session_id = %session.id(), "Verbindungs-Task beendet");
    }

    async fn frame_verarbeiten(
        &self,
        session: &Arc<Session>,
        frame: Message,
    ) -> FrameErgebnis {
        match frame {
            Message::Text(text) => {
                match ClientNachricht::from_json(&text) {
                    Ok(nachricht) => {
                        self.state.coordinator.verarbeiten(session, nachricht).await;
                    }
                    Err(e) => {
                        let fehler = SignalingError::protokoll(e.to_string());
                        tracing::warn!(
                            session_id = %session.id(),
                            fehler = %fehler,
                            "Unbekannte oder ungueltige Nachricht ignoriert"
                        );
                    }
                }
                FrameErgebnis::Weiter
            }
            Message::Close(_) => FrameErgebnis::Beenden,
            // Pong zaehlt nur fuer den Timeout, Ping beantwortet axum selbst
            Message::Ping(_) | Message::Pong(_) => FrameErgebnis::Weiter,
            Message::Binary(_) => {
                tracing::debug!(session_id = %session.id(), "Binaer-Frame ignoriert");
                FrameErgebnis::Weiter
            }
        }
    }
}

async fn nachricht_senden(socket: &mut WebSocket, nachricht: &ServerNachricht) -> Result<(), axum::Error> {
    match nachricht.to_json() {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(fehler = %e, "Serialisierung fehlgeschlagen");
            Ok(())
        }
    }
}
