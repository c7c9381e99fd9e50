//! onair-core – Gemeinsame Typen
//!
//! Identifikationstypen fuer Sessions und Medienobjekte, der ICE-Kandidat
//! sowie der prozessweite Fehlertyp. Wird von Protokoll, Media-Adapter,
//! Signaling und Server gemeinsam genutzt.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{OnairError, Result};
pub use types::{EndpointId, IceKandidat, PipelineId, SessionId};
