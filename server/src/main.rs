//! onair Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::{Context, Result};
use onair_observability::logging_initialisieren;
use onair_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("ONAIR_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = ServerConfig::laden(&config_pfad)
        .with_context(|| format!("Konfiguration '{config_pfad}' konnte nicht geladen werden"))?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "onair Server wird initialisiert"
    );

    Server::neu(config)
        .starten()
        .await
        .context("Server-Start fehlgeschlagen")?;

    Ok(())
}
