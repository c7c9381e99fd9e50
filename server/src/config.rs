//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, der Server laeuft also auch ohne Konfigurationsdatei
//! (dann mit Kurento unter `ws://localhost:8888/kurento`).

use std::net::SocketAddr;
use std::time::Duration;

use onair_core::{OnairError, Result};
use onair_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub medien: MedienEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers (nur Logs)
    pub name: String,
    /// Maximale Anzahl gleichzeitiger WebSocket-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "onair".into(),
            max_verbindungen: 1024,
        }
    }
}

/// Netzwerk-Einstellungen des Signaling-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
    /// HTTP-Pfad fuer das WebSocket-Upgrade
    pub pfad: String,
    pub keepalive_sek: u64,
    /// Verbindung wird getrennt, wenn so lange kein Frame eingeht
    pub verbindungs_timeout_sek: u64,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8080,
            pfad: "/call".into(),
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

/// Welche Media-Engine verwendet wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTyp {
    #[default]
    Kurento,
    /// In-Process-Simulation ohne Medienserver (lokale Entwicklung)
    Simulation,
}

impl std::fmt::Display for EngineTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kurento => write!(f, "kurento"),
            Self::Simulation => write!(f, "simulation"),
        }
    }
}

/// Media-Engine-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    pub engine: EngineTyp,
    pub kurento_url: String,
    /// Zeitlimit fuer eine komplette Presenter- oder Viewer-Verhandlung
    pub verhandlungs_timeout_ms: u64,
    /// Zeitlimit fuer einen einzelnen JSON-RPC-Aufruf
    pub rpc_timeout_ms: u64,
    pub datenkanaele: bool,
}

impl Default for MedienEinstellungen {
    fn default() -> Self {
        Self {
            engine: EngineTyp::Kurento,
            kurento_url: "ws://localhost:8888/kurento".into(),
            verhandlungs_timeout_ms: 10_000,
            rpc_timeout_ms: 5_000,
            datenkanaele: true,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Filter-Direktive: "trace", "debug", "info", ... oder `crate=level`-Listen
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| OnairError::konfiguration(format!("'{pfad}': {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(OnairError::konfiguration(format!(
                    "'{pfad}' nicht lesbar: {e}"
                )))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn pruefen(&self) -> Result<()> {
        if !self.netzwerk.pfad.starts_with('/') {
            return Err(OnairError::konfiguration(format!(
                "netzwerk.pfad muss mit '/' beginnen: '{}'",
                self.netzwerk.pfad
            )));
        }
        if self.server.max_verbindungen == 0 {
            return Err(OnairError::konfiguration(
                "server.max_verbindungen muss groesser als 0 sein",
            ));
        }
        if self.medien.verhandlungs_timeout_ms == 0 || self.medien.rpc_timeout_ms == 0 {
            return Err(OnairError::konfiguration(
                "medien: Zeitlimits muessen groesser als 0 sein",
            ));
        }
        self.signaling_bind_adresse()?;
        if self.observability.aktiviert {
            self.observability_bind_adresse()?;
        }
        Ok(())
    }

    /// Bind-Adresse des WebSocket-Signaling-Endpunkts
    pub fn signaling_bind_adresse(&self) -> Result<SocketAddr> {
        self.adresse_parsen(self.netzwerk.port)
    }

    /// Bind-Adresse fuer Metriken und Health
    pub fn observability_bind_adresse(&self) -> Result<SocketAddr> {
        self.adresse_parsen(self.observability.port)
    }

    fn adresse_parsen(&self, port: u16) -> Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, port);
        text.parse()
            .map_err(|e| OnairError::konfiguration(format!("Ungueltige Adresse '{text}': {e}")))
    }

    pub fn verhandlungs_timeout(&self) -> Duration {
        Duration::from_millis(self.medien.verhandlungs_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.medien.rpc_timeout_ms)
    }

    /// Leitet die Konfiguration des Signaling-Dienstes ab
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_verbindungen: self.server.max_verbindungen,
            pfad: self.netzwerk.pfad.clone(),
            keepalive_sek: self.netzwerk.keepalive_sek,
            verbindungs_timeout_sek: self.netzwerk.verbindungs_timeout_sek,
            verhandlungs_timeout: self.verhandlungs_timeout(),
            datenkanaele: self.medien.datenkanaele,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.netzwerk.port, 8080);
        assert_eq!(cfg.netzwerk.pfad, "/call");
        assert_eq!(cfg.medien.engine, EngineTyp::Kurento);
        assert_eq!(cfg.medien.kurento_url, "ws://localhost:8888/kurento");
        assert_eq!(cfg.observability.port, 9300);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.signaling_bind_adresse().unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let cfg = ServerConfig::aus_toml(
            r#"
            [server]
            name = "Sendezentrale"

            [netzwerk]
            port = 9000

            [medien]
            engine = "simulation"
            verhandlungs_timeout_ms = 2500
        "#,
        )
        .unwrap();
        assert_eq!(cfg.server.name, "Sendezentrale");
        assert_eq!(cfg.netzwerk.port, 9000);
        assert_eq!(cfg.medien.engine, EngineTyp::Simulation);
        assert_eq!(cfg.verhandlungs_timeout(), Duration::from_millis(2500));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.pfad, "/call");
        assert_eq!(cfg.medien.rpc_timeout_ms, 5000);
        assert!(cfg.medien.datenkanaele);
    }

    #[test]
    fn unbekannte_engine_ist_fehler() {
        let ergebnis = ServerConfig::aus_toml("[medien]\nengine = \"janus\"\n");
        assert!(ergebnis.is_err());
    }

    #[test]
    fn pruefung_erkennt_ungueltige_werte() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.pfad = "call".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein-host".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ServerConfig::default();
        cfg.medien.verhandlungs_timeout_ms = 0;
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_verbindungen = 7;
        cfg.medien.datenkanaele = false;
        let sc = cfg.signaling_config();
        assert_eq!(sc.max_verbindungen, 7);
        assert!(!sc.datenkanaele);
        assert_eq!(sc.verhandlungs_timeout, Duration::from_secs(10));
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/gibt/es/nicht/onair.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, 8080);
    }
}
