//! Session – eine verbundene Client-Verbindung
//!
//! Haelt den Sender der ausgehenden Queue, den (optionalen) eigenen
//! WebRTC-Endpoint und eine Sperre, die Verhandlungen derselben Verbindung
//! serialisiert. Die Rolle dient nur der Diagnose; massgeblich fuer den
//! Ablauf ist die Mitgliedschaft in der `RaumRegistry`.

use onair_core::types::{EndpointId, SessionId};
use onair_media::{MedienEngine, MedienObjekt};
use onair_protocol::ServerNachricht;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Session
pub const SEND_QUEUE_GROESSE: usize = 64;

/// Rolle einer Session (nur fuer Logs und Diagnose)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolle {
    Unbestimmt,
    Presenter,
    Viewer,
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unbestimmt => "unbestimmt",
            Self::Presenter => "presenter",
            Self::Viewer => "viewer",
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    tx: mpsc::Sender<ServerNachricht>,
    endpoint: Mutex<Option<EndpointId>>,
    rolle: Mutex<Rolle>,
    verhandlung: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn neu(id: SessionId, tx: mpsc::Sender<ServerNachricht>) -> Self {
        Self {
            id,
            tx,
            endpoint: Mutex::new(None),
            rolle: Mutex::new(Rolle::Unbestimmt),
            verhandlung: tokio::sync::Mutex::new(()),
        }
    }

    /// Erstellt eine Session mit frischer Send-Queue und gibt deren Empfaenger zurueck
    pub fn mit_queue(id: SessionId) -> (Self, mpsc::Receiver<ServerNachricht>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        (Self::neu(id, tx), rx)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn rolle(&self) -> Rolle {
        *self.rolle.lock()
    }

    pub fn rolle_setzen(&self, rolle: Rolle) {
        *self.rolle.lock() = rolle;
    }

    /// Aktueller Endpoint (falls verhandelt)
    pub fn endpoint(&self) -> Option<EndpointId> {
        self.endpoint.lock().clone()
    }

    /// Setzt den Endpoint und gibt einen eventuell vorher gesetzten zurueck
    pub fn endpoint_setzen(&self, endpoint: EndpointId) -> Option<EndpointId> {
        self.endpoint.lock().replace(endpoint)
    }

    /// Entnimmt den Endpoint; danach ist die Session ohne Endpoint
    pub fn endpoint_nehmen(&self) -> Option<EndpointId> {
        self.endpoint.lock().take()
    }

    /// Entnimmt den Endpoint nur, wenn es noch `erwartet` ist
    ///
    /// Ein inzwischen neu gesetzter Endpoint bleibt unberuehrt.
    pub fn endpoint_nehmen_wenn(&self, erwartet: &EndpointId) -> bool {
        let mut endpoint = self.endpoint.lock();
        if endpoint.as_ref() == Some(erwartet) {
            *endpoint = None;
            true
        } else {
            false
        }
    }

    /// Sendet eine Nachricht nicht-blockierend an den Client
    pub fn senden(&self, nachricht: ServerNachricht) -> SignalingResult<()> {
        self.tx.try_send(nachricht).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SignalingError::SendeQueueVoll,
            mpsc::error::TrySendError::Closed(_) => SignalingError::KanalGeschlossen,
        })
    }

    /// Wie `senden`, Fehler werden nur geloggt
    pub fn senden_oder_loggen(&self, nachricht: ServerNachricht) {
        match self.senden(nachricht) {
            Ok(()) => {}
            Err(SignalingError::SendeQueueVoll) => {
                tracing::warn!(session_id = %self.id, "Send-Queue voll – Nachricht verworfen");
            }
            Err(e) => {
                tracing::debug!(session_id = %self.id, fehler = %e, "Nachricht nicht zustellbar");
            }
        }
    }

    /// Gibt den eigenen Endpoint frei (idempotent)
    ///
    /// Gibt die freigegebene EndpointId zurueck, beim zweiten Aufruf `None`.
    pub async fn freigeben(&self, engine: &dyn MedienEngine) -> Option<EndpointId> {
        let endpoint = self.endpoint_nehmen()?;
        if let Err(e) = engine
            .freigeben(&MedienObjekt::Endpoint(endpoint.clone()))
            .await
        {
            tracing::warn!(
                session_id = %self.id,
                endpoint = %endpoint,
                fehler = %e,
                "Endpoint-Freigabe fehlgeschlagen"
            );
        }
        Some(endpoint)
    }

    /// Sperrt Verhandlungen dieser Session bis der Guard fallen gelassen wird
    pub async fn verhandlung_sperren(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.verhandlung.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onair_media::SimulierteEngine;

    #[test]
    fn senden_und_kanal_geschlossen() {
        let (session, rx) = Session::mit_queue(SessionId::neu("s1"));
        assert!(session.senden(ServerNachricht::StopCommunication).is_ok());
        drop(rx);
        assert!(matches!(
            session.senden(ServerNachricht::StopCommunication),
            Err(SignalingError::KanalGeschlossen)
        ));
    }

    #[test]
    fn volle_queue_wird_gemeldet() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::neu(SessionId::neu("s2"), tx);
        session.senden(ServerNachricht::StopCommunication).unwrap();
        assert!(matches!(
            session.senden(ServerNachricht::StopCommunication),
            Err(SignalingError::SendeQueueVoll)
        ));
        // Darf nicht paniken
        session.senden_oder_loggen(ServerNachricht::StopCommunication);
    }

    #[tokio::test]
    async fn freigeben_ist_idempotent() {
        let engine = SimulierteEngine::neu();
        let pipeline = engine.pipeline_erstellen().await.unwrap();
        let ep = engine.endpoint_erstellen(&pipeline, false).await.unwrap();

        let (session, _rx) = Session::mit_queue(SessionId::neu("s3"));
        assert!(session.endpoint_setzen(ep.clone()).is_none());

        assert_eq!(session.freigeben(&engine).await, Some(ep.clone()));
        assert_eq!(session.freigeben(&engine).await, None);
        assert_eq!(engine.freigabe_aufrufe(&MedienObjekt::Endpoint(ep)), 1);
        assert!(session.endpoint().is_none());
    }

    #[test]
    fn endpoint_nehmen_wenn_laesst_neuen_endpoint_stehen() {
        let (session, _rx) = Session::mit_queue(SessionId::neu("s5"));
        let alt = EndpointId::neu("ep-alt");
        let neu = EndpointId::neu("ep-neu");

        assert!(!session.endpoint_nehmen_wenn(&alt));
        session.endpoint_setzen(neu.clone());
        assert!(!session.endpoint_nehmen_wenn(&alt));
        assert_eq!(session.endpoint(), Some(neu.clone()));

        assert!(session.endpoint_nehmen_wenn(&neu));
        assert!(session.endpoint().is_none());
    }

    #[test]
    fn rolle_standard_unbestimmt() {
        let (session, _rx) = Session::mit_queue(SessionId::neu("s4"));
        assert_eq!(session.rolle(), Rolle::Unbestimmt);
        session.rolle_setzen(Rolle::Viewer);
        assert_eq!(session.rolle().to_string(), "viewer");
    }
}
