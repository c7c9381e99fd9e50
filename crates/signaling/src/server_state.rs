//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Konfiguration, Koordinator und Metriken als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use std::sync::Arc;
use std::time::{Duration, Instant};

use onair_media::MedienEngine;
use onair_observability::OnairMetrics;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::coordinator::SignalingCoordinator;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers (nur Logs)
    pub server_name: String,
    /// Maximale gleichzeitige WebSocket-Verbindungen
    pub max_verbindungen: usize,
    /// HTTP-Pfad des WebSocket-Endpunkts
    pub pfad: String,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Zeitlimit fuer eine Presenter- oder Viewer-Verhandlung
    pub verhandlungs_timeout: Duration,
    /// WebRTC-Datenkanaele auf den Endpoints aktivieren
    pub datenkanaele: bool,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "onair".to_string(),
            max_verbindungen: 1024,
            pfad: "/call".to_string(),
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            verhandlungs_timeout: Duration::from_secs(10),
            datenkanaele: true,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Signaling-Koordinator (Sessions, Raeume, Verhandlungen)
    pub coordinator: SignalingCoordinator,
    /// Prometheus-Metriken
    pub metriken: OnairMetrics,
    /// Ein Platz pro Verbindung, vor dem Upgrade reserviert
    verbindungs_plaetze: Arc<Semaphore>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden (startet den
    /// Ereignis-Router des Koordinators).
    pub fn neu(
        config: SignalingConfig,
        engine: Arc<dyn MedienEngine>,
        metriken: OnairMetrics,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let verbindungs_plaetze = Arc::new(Semaphore::new(config.max_verbindungen));
        let coordinator =
            SignalingCoordinator::neu(engine, Arc::clone(&config), metriken.clone());
        Arc::new(Self {
            config,
            coordinator,
            metriken,
            verbindungs_plaetze,
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz, `None` wenn `max_verbindungen` erreicht ist
    ///
    /// Der Platz wird frei, sobald das Permit fallen gelassen wird.
    pub fn platz_reservieren(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.verbindungs_plaetze).try_acquire_owned().ok()
    }

    /// Anzahl noch freier Verbindungsplaetze
    pub fn freie_plaetze(&self) -> usize {
        self.verbindungs_plaetze.available_permits()
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
