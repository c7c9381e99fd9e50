//! Fehlertypen fuer den Media-Engine-Adapter

use thiserror::Error;

/// Fehlertyp fuer alle Aufrufe an die Media-Engine
#[derive(Debug, Clone, Error)]
pub enum MedienFehler {
    /// SDP-Angebot konnte nicht verarbeitet werden
    #[error("Verhandlung fehlgeschlagen: {0}")]
    VerhandlungFehlgeschlagen(String),

    /// Keine Verbindung zur Media-Engine
    #[error("Media-Engine nicht erreichbar: {0}")]
    NichtErreichbar(String),

    /// Die Media-Engine hat einen Fehler gemeldet
    #[error("Media-Engine meldet Fehler {code}: {nachricht}")]
    Rpc { code: i64, nachricht: String },

    /// Objekt ist der Media-Engine nicht (mehr) bekannt
    #[error("Unbekanntes Medienobjekt: {0}")]
    UnbekanntesObjekt(String),

    /// Keine Antwort innerhalb des RPC-Zeitlimits
    #[error("Zeitlimit fuer '{0}' ueberschritten")]
    Zeitlimit(String),

    /// Antwort hatte nicht das erwartete Format
    #[error("Ungueltige Antwort der Media-Engine: {0}")]
    UngueltigeAntwort(String),
}

impl MedienFehler {
    /// Erstellt einen Verbindungsfehler
    pub fn nicht_erreichbar(msg: impl Into<String>) -> Self {
        Self::NichtErreichbar(msg.into())
    }

    /// Gibt true zurueck wenn die Engine selbst nicht verfuegbar ist
    pub fn ist_nicht_erreichbar(&self) -> bool {
        matches!(self, Self::NichtErreichbar(_) | Self::Zeitlimit(_))
    }
}

/// Result-Typ fuer den Media-Engine-Adapter
pub type MedienResult<T> = Result<T, MedienFehler>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = MedienFehler::Rpc {
            code: 40101,
            nachricht: "Object not found".into(),
        };
        assert_eq!(
            e.to_string(),
            "Media-Engine meldet Fehler 40101: Object not found"
        );
    }

    #[test]
    fn erreichbarkeit_erkennung() {
        assert!(MedienFehler::nicht_erreichbar("weg").ist_nicht_erreichbar());
        assert!(MedienFehler::Zeitlimit("create".into()).ist_nicht_erreichbar());
        assert!(!MedienFehler::VerhandlungFehlgeschlagen("sdp".into()).ist_nicht_erreichbar());
    }
}
