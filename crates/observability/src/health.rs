//! Health-Check-Endpunkt fuer onair
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Erreichbarkeit der Media-Engine

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server laeuft, Media-Engine nicht erreichbar
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub media_engine_connected: bool,
}

type EnginePruefung = Arc<dyn Fn() -> bool + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    engine_pruefung: EnginePruefung,
}

impl HealthState {
    /// Health-Zustand ohne Media-Engine-Pruefung (immer erreichbar)
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            engine_pruefung: Arc::new(|| true),
        }
    }

    /// Setzt die Funktion, die die Erreichbarkeit der Media-Engine meldet
    pub fn mit_engine_pruefung(mut self, pruefung: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.engine_pruefung = Arc::new(pruefung);
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn engine_verbunden(&self) -> bool {
        (self.engine_pruefung)()
    }

    pub fn antwort(&self) -> HealthResponse {
        let media_engine_connected = self.engine_verbunden();
        HealthResponse {
            status: if media_engine_connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            media_engine_connected,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – immer 200, der Zustand steht im Body
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
