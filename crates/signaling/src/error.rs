//! Fehlertypen fuer den Signaling-Service

use onair_media::MedienFehler;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Session haelt bereits einen (reservierten oder aktiven) Raum
    #[error("Session sendet bereits")]
    SendetBereits,

    /// Session ist bereits Viewer in einem Raum
    #[error("Session schaut bereits zu")]
    SchautBereits,

    /// Kein aktiver Raum fuer die angegebene Presenter-Session
    #[error("Kein aktiver Presenter")]
    KeinPresenter,

    /// Media-Engine hat die Verhandlung abgelehnt
    #[error("Verhandlung fehlgeschlagen: {0}")]
    VerhandlungFehlgeschlagen(String),

    /// Ausgehender Kanal der Session ist geschlossen
    #[error("Kanal geschlossen")]
    KanalGeschlossen,

    /// Send-Queue der Session ist voll
    #[error("Send-Queue voll")]
    SendeQueueVoll,

    /// Media-Engine nicht erreichbar
    #[error("Media-Engine nicht erreichbar: {0}")]
    EngineNichtErreichbar(String),

    /// Verhandlung hat das Zeitlimit ueberschritten
    #[error("Zeitlimit der Verhandlung ueberschritten")]
    Zeitlimit,

    /// Nicht interpretierbare Client-Nachricht
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// IO-Fehler (Listener)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Text, den der anfragende Client in einer `rejected`-Antwort erhaelt
    pub fn client_nachricht(&self) -> String {
        match self {
            Self::SendetBereits => {
                "Already presenting in this session. Stop the current broadcast first.".into()
            }
            Self::SchautBereits => "You are already viewing in this session. \
                 Use a different browser to add additional viewers."
                .into(),
            Self::KeinPresenter => "No active sender now. Become sender or . Try again later ...".into(),
            Self::VerhandlungFehlgeschlagen(grund) => grund.clone(),
            Self::EngineNichtErreichbar(_) => "Media server unavailable. Try again later ...".into(),
            Self::Zeitlimit => "negotiation timed out".into(),
            Self::KanalGeschlossen
            | Self::SendeQueueVoll
            | Self::Protokoll(_)
            | Self::Io(_) => "Internal server error".into(),
        }
    }

    /// Label fuer die Verhandlungs-Metrik
    pub fn metrik_ergebnis(&self) -> &'static str {
        match self {
            Self::Zeitlimit => "zeitlimit",
            Self::EngineNichtErreichbar(_) => "engine_fehler",
            _ => "abgelehnt",
        }
    }
}

impl From<MedienFehler> for SignalingError {
    fn from(fehler: MedienFehler) -> Self {
        match fehler {
            MedienFehler::NichtErreichbar(grund) => Self::EngineNichtErreichbar(grund),
            MedienFehler::Zeitlimit(methode) => {
                Self::EngineNichtErreichbar(format!("keine Antwort auf '{methode}'"))
            }
            MedienFehler::VerhandlungFehlgeschlagen(grund) => Self::VerhandlungFehlgeschlagen(grund),
            andere => Self::VerhandlungFehlgeschlagen(andere.to_string()),
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
