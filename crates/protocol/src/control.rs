//! Signaling-Protokoll (WebSocket, JSON)
//!
//! Definiert alle Nachrichten die zwischen Browser-Client und Server
//! ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht ist ein JSON-Objekt mit Diskriminator-Feld `id`
//! - Tagged Enums fuer typsichere Nachrichtentypen
//! - SDP-Angebote und -Antworten sind opake Strings
//!
//! ```text
//! Client -> Server: presenter | viewer | onIceCandidate | stop
//! Server -> Client: presenterResponse | viewerResponse | iceCandidate | stopCommunication
//! ```

use onair_core::types::{IceKandidat, SessionId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Eingehende Nachrichten vom Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientNachricht {
    /// Client moechte als Presenter senden
    Presenter {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },
    /// Client moechte den Raum eines Presenters ansehen
    Viewer {
        /// SessionId des Presenters, dessen Raum betreten werden soll
        target: SessionId,
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },
    /// ICE-Kandidat des Clients fuer seinen eigenen Endpoint
    OnIceCandidate { candidate: IceKandidat },
    /// Sendung beenden bzw. Raum verlassen
    Stop,
}

impl ClientNachricht {
    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Kurzname fuer Logging
    pub fn art(&self) -> &'static str {
        match self {
            Self::Presenter { .. } => "presenter",
            Self::Viewer { .. } => "viewer",
            Self::OnIceCandidate { .. } => "onIceCandidate",
            Self::Stop => "stop",
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Ergebnis einer Presenter- oder Viewer-Anfrage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "lowercase")]
pub enum Antwort {
    Accepted {
        #[serde(rename = "sdpAnswer")]
        sdp_answer: String,
        /// Eigene SessionId des Presenters – Viewer geben sie als `target` an
        #[serde(
            rename = "presenterId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        presenter_id: Option<SessionId>,
    },
    Rejected { message: String },
}

/// Ausgehende Nachrichten an den Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerNachricht {
    PresenterResponse(Antwort),
    ViewerResponse(Antwort),
    /// Von der Media-Engine gefundener Kandidat fuer den Endpoint des Clients
    IceCandidate { candidate: IceKandidat },
    /// Der Presenter hat die Sendung beendet
    StopCommunication,
}

impl ServerNachricht {
    /// Presenter-Verhandlung erfolgreich
    pub fn presenter_akzeptiert(sdp_answer: impl Into<String>, presenter_id: SessionId) -> Self {
        Self::PresenterResponse(Antwort::Accepted {
            sdp_answer: sdp_answer.into(),
            presenter_id: Some(presenter_id),
        })
    }

    /// Presenter-Anfrage abgelehnt
    pub fn presenter_abgelehnt(message: impl Into<String>) -> Self {
        Self::PresenterResponse(Antwort::Rejected {
            message: message.into(),
        })
    }

    /// Viewer-Verhandlung erfolgreich
    pub fn viewer_akzeptiert(sdp_answer: impl Into<String>) -> Self {
        Self::ViewerResponse(Antwort::Accepted {
            sdp_answer: sdp_answer.into(),
            presenter_id: None,
        })
    }

    /// Viewer-Anfrage abgelehnt
    pub fn viewer_abgelehnt(message: impl Into<String>) -> Self {
        Self::ViewerResponse(Antwort::Rejected {
            message: message.into(),
        })
    }

    /// Kandidaten-Event
    pub fn ice_kandidat(candidate: IceKandidat) -> Self {
        Self::IceCandidate { candidate }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Prueft ob es sich um eine Ablehnung handelt
    pub fn ist_abgelehnt(&self) -> bool {
        matches!(
            self,
            Self::PresenterResponse(Antwort::Rejected { .. })
                | Self::ViewerResponse(Antwort::Rejected { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
