//! Fehlertypen fuer onair
//!
//! Prozessweite Fehler (Konfiguration, Start, Netzwerk). Die Fachschichten
//! (Media-Adapter, Signaling) definieren eigene Fehler und werden an der
//! Server-Grenze hierher konvertiert.

use thiserror::Error;

/// Globaler Result-Alias fuer onair
pub type Result<T> = std::result::Result<T, OnairError>;

/// Prozessweite Fehler im onair-Server
#[derive(Debug, Error)]
pub enum OnairError {
    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Netzwerk ---
    #[error("Bind fehlgeschlagen ({adresse}): {grund}")]
    Bind { adresse: String, grund: String },

    #[error("Media-Engine nicht erreichbar: {0}")]
    MedienEngine(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl OnairError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = OnairError::konfiguration("port = 0");
        assert_eq!(e.to_string(), "Konfigurationsfehler: port = 0");
    }

    #[test]
    fn bind_fehler_enthaelt_adresse() {
        let e = OnairError::Bind {
            adresse: "0.0.0.0:8080".into(),
            grund: "Address in use".into(),
        };
        assert!(e.to_string().contains("0.0.0.0:8080"));
    }
}
