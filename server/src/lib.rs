//! onair-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Media-Engine, Signaling-Server und
//! Observability-Server und stellt den Einstiegspunkt fuer
//! Integrationstests bereit.

pub mod config;

use std::sync::Arc;

use config::{EngineTyp, ServerConfig};
use onair_core::{OnairError, Result};
use onair_media::{KurentoEngine, MedienEngine, SimulierteEngine};
use onair_observability::{observability_server_starten, HealthState, OnairMetrics};
use onair_signaling::{SignalingServer, SignalingState};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen"),
            }
            let _ = shutdown_tx.send(true);
        });

        self.mit_shutdown_starten(shutdown_rx).await
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown_rx` `true` meldet
    ///
    /// Reihenfolge:
    /// 1. Media-Engine verbinden (Kurento oder Simulation)
    /// 2. Metriken und Signaling-Zustand anlegen
    /// 3. Observability-Server starten (optional)
    /// 4. WebSocket-Listener binden und bedienen
    pub async fn mit_shutdown_starten(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let signaling_addr = self.config.signaling_bind_adresse()?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %signaling_addr,
            pfad = %self.config.netzwerk.pfad,
            engine = %self.config.medien.engine,
            "Server startet"
        );

        let engine = self.engine_erstellen().await?;
        let metriken = OnairMetrics::neu()?;
        let state = SignalingState::neu(
            self.config.signaling_config(),
            Arc::clone(&engine),
            metriken.clone(),
        );

        let observability = if self.config.observability.aktiviert {
            let addr = self.config.observability_bind_adresse()?;
            let pruef_engine = Arc::clone(&engine);
            let health = HealthState::neu().mit_engine_pruefung(move || pruef_engine.ist_verfuegbar());
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet mit Fehler");
                }
            }))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let listener = TcpListener::bind(signaling_addr)
            .await
            .map_err(|e| OnairError::Bind {
                adresse: signaling_addr.to_string(),
                grund: e.to_string(),
            })?;

        SignalingServer::neu(state, signaling_addr)
            .mit_listener_starten(listener, shutdown_rx)
            .await
            .map_err(|e| OnairError::intern(format!("Signaling-Server: {e}")))?;

        if let Some(task) = observability {
            let _ = task.await;
        }

        tracing::info!("Server beendet");
        Ok(())
    }

    /// Erstellt die konfigurierte Media-Engine
    pub async fn engine_erstellen(&self) -> Result<Arc<dyn MedienEngine>> {
        match self.config.medien.engine {
            EngineTyp::Kurento => {
                let url = &self.config.medien.kurento_url;
                let engine = KurentoEngine::oeffnen(url, self.config.rpc_timeout())
                    .await
                    .map_err(|e| OnairError::MedienEngine(format!("{url}: {e}")))?;
                tracing::info!(url = %url, "Mit Kurento Media Server verbunden");
                Ok(Arc::new(engine))
            }
            EngineTyp::Simulation => {
                tracing::warn!("Simulierte Media-Engine aktiv, es fliessen keine Medien");
                Ok(Arc::new(SimulierteEngine::neu()))
            }
        }
    }
}
