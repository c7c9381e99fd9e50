//! Prometheus-kompatible Metriken fuer onair
//!
//! Registrierte Metriken:
//! - `onair_connected_sessions` – Gauge: Aktuell verbundene Sessions
//! - `onair_rooms_active` – Gauge: Aktive Raeume (Presenter mit Pipeline)
//! - `onair_viewers_active` – Gauge: Viewer in allen Raeumen
//! - `onair_negotiations_total` – Counter: Verhandlungen (rolle, ergebnis)
//! - `onair_candidates_forwarded_total` – Counter: An Clients weitergeleitete Kandidaten
//! - `onair_candidates_received_total` – Counter: An die Engine uebergebene Kandidaten
//! - `onair_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `onair_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//! - `process_*` – Prozessmetriken (nur Linux)

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle onair-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metriken.
#[derive(Clone)]
pub struct OnairMetrics {
    pub registry: Arc<Registry>,

    // Signaling-Metriken
    pub verbundene_sitzungen: IntGauge,
    pub aktive_raeume: IntGauge,
    pub aktive_viewer: IntGauge,
    pub verhandlungen_total: IntCounterVec,
    pub kandidaten_weitergeleitet_total: IntCounter,
    pub kandidaten_empfangen_total: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl OnairMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Signaling ---
        let verbundene_sitzungen = IntGauge::with_opts(Opts::new(
            "onair_connected_sessions",
            "Anzahl aktuell verbundener Sessions",
        ))?;
        registry.register(Box::new(verbundene_sitzungen.clone()))?;

        let aktive_raeume = IntGauge::with_opts(Opts::new(
            "onair_rooms_active",
            "Anzahl aktiver Raeume",
        ))?;
        registry.register(Box::new(aktive_raeume.clone()))?;

        let aktive_viewer = IntGauge::with_opts(Opts::new(
            "onair_viewers_active",
            "Anzahl Viewer ueber alle Raeume",
        ))?;
        registry.register(Box::new(aktive_viewer.clone()))?;

        let verhandlungen_total = IntCounterVec::new(
            Opts::new(
                "onair_negotiations_total",
                "Abgeschlossene Presenter-/Viewer-Verhandlungen",
            ),
            &["rolle", "ergebnis"],
        )?;
        registry.register(Box::new(verhandlungen_total.clone()))?;

        let kandidaten_weitergeleitet_total = IntCounter::with_opts(Opts::new(
            "onair_candidates_forwarded_total",
            "An Clients weitergeleitete ICE-Kandidaten",
        ))?;
        registry.register(Box::new(kandidaten_weitergeleitet_total.clone()))?;

        let kandidaten_empfangen_total = IntCounter::with_opts(Opts::new(
            "onair_candidates_received_total",
            "Von Clients empfangene und an die Engine uebergebene ICE-Kandidaten",
        ))?;
        registry.register(Box::new(kandidaten_empfangen_total.clone()))?;

        // --- HTTP ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("onair_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "onair_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        // --- Prozess (CPU, RSS, offene FDs) ---
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbundene_sitzungen,
            aktive_raeume,
            aktive_viewer,
            verhandlungen_total,
            kandidaten_weitergeleitet_total,
            kandidaten_empfangen_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt eine abgeschlossene Verhandlung
    ///
    /// `rolle`: "presenter" | "viewer", `ergebnis`: "akzeptiert" | "abgelehnt" | "zeitlimit"
    pub fn verhandlung_zaehlen(&self, rolle: &str, ergebnis: &str) {
        self.verhandlungen_total
            .with_label_values(&[rolle, ergebnis])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: OnairMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<OnairMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = OnairMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zwei_instanzen_kollidieren_nicht() {
        // Jede Instanz hat ihre eigene Registry
        let a = OnairMetrics::neu().unwrap();
        let b = OnairMetrics::neu().unwrap();
        a.aktive_raeume.set(3);
        assert_eq!(b.aktive_raeume.get(), 0);
    }

    #[test]
    fn verhandlung_zaehlen_mit_labels() {
        let metriken = OnairMetrics::neu().unwrap();
        metriken.verhandlung_zaehlen("viewer", "abgelehnt");
        metriken.verhandlung_zaehlen("viewer", "abgelehnt");
        metriken.verhandlung_zaehlen("presenter", "akzeptiert");

        let wert = metriken
            .verhandlungen_total
            .with_label_values(&["viewer", "abgelehnt"])
            .get();
        assert_eq!(wert, 2);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = OnairMetrics::neu().unwrap();
        metriken.verbundene_sitzungen.set(5);
        metriken.kandidaten_weitergeleitet_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("onair_connected_sessions 5"));
        assert!(output.contains("onair_candidates_forwarded_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = OnairMetrics::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken.verhandlung_zaehlen("presenter", "akzeptiert");
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/test"])
            .observe(0.01);

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "onair_connected_sessions",
            "onair_rooms_active",
            "onair_viewers_active",
            "onair_negotiations_total",
            "onair_candidates_forwarded_total",
            "onair_candidates_received_total",
            "onair_http_requests_total",
            "onair_http_request_duration_seconds",
        ] {
            assert!(namen.contains(&name), "{name} fehlt in der Registry");
        }
    }
}
