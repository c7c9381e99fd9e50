//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `ONAIR_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `onair_signaling=debug,info`)
//! - `ONAIR_LOG_FORMAT`: Format (text/json)
//!
//! Die Umgebungsvariablen haben Vorrang vor den Werten aus `config.toml`.

use tracing_subscriber::{fmt, EnvFilter};

const ENV_LEVEL: &str = "ONAIR_LOG_LEVEL";
const ENV_FORMAT: &str = "ONAIR_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Unbekannte Werte fallen auf `Text` zurueck
    pub fn parsen(wert: &str) -> Self {
        if wert.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Effektive Logging-Einstellungen nach Zusammenfuehrung von Config und Umgebung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEinstellungen {
    pub filter: String,
    pub format: LogFormat,
}

impl LogEinstellungen {
    /// Fuehrt Config-Werte mit optionalen Umgebungswerten zusammen
    pub fn zusammenfuehren(
        config_level: &str,
        config_format: &str,
        env_level: Option<String>,
        env_format: Option<String>,
    ) -> Self {
        let filter = env_level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| config_level.to_string());
        let format = LogFormat::parsen(env_format.as_deref().unwrap_or(config_format));
        Self { filter, format }
    }

    /// Liest die Umgebungsvariablen und faellt auf die Config-Werte zurueck
    pub fn aus_umgebung(config_level: &str, config_format: &str) -> Self {
        Self::zusammenfuehren(
            config_level,
            config_format,
            std::env::var(ENV_LEVEL).ok(),
            std::env::var(ENV_FORMAT).ok(),
        )
    }
}

/// Initialisiert das Logging-System.
///
/// Ungueltige Filter-Direktiven fallen auf `info` zurueck. Ein zweiter
/// Aufruf (z.B. in Tests) wird ignoriert.
pub fn logging_initialisieren(level: &str, format: &str) {
    let einstellungen = LogEinstellungen::aus_umgebung(level, format);
    let filter = EnvFilter::try_new(&einstellungen.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match einstellungen.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_werte_ohne_umgebung() {
        let e = LogEinstellungen::zusammenfuehren("debug", "json", None, None);
        assert_eq!(e.filter, "debug");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn umgebung_hat_vorrang() {
        let e = LogEinstellungen::zusammenfuehren(
            "info",
            "text",
            Some("onair_signaling=trace".into()),
            Some("json".into()),
        );
        assert_eq!(e.filter, "onair_signaling=trace");
        assert_eq!(e.format, LogFormat::Json);
    }

    #[test]
    fn leerer_env_level_wird_ignoriert() {
        let e = LogEinstellungen::zusammenfuehren("warn", "text", Some("  ".into()), None);
        assert_eq!(e.filter, "warn");
    }

    #[test]
    fn unbekanntes_format_ist_text() {
        assert_eq!(LogFormat::parsen("xml"), LogFormat::Text);
        assert_eq!(LogFormat::parsen("JSON"), LogFormat::Json);
    }

    #[test]
    fn doppelte_initialisierung_paniced_nicht() {
        logging_initialisieren("info", "text");
        logging_initialisieren("debug", "json");
    }
}
