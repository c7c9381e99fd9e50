//! onair-media – Media-Engine-Adapter
//!
//! Die eigentliche Medienverarbeitung (SDP-Verhandlung, ICE, Weiterleitung)
//! uebernimmt eine externe Media-Engine. Dieses Crate definiert die
//! Schnittstelle dazu und zwei Implementierungen:
//!
//! ```text
//! MedienEngine (Trait)
//!     |
//!     +-- KurentoEngine     (JSON-RPC 2.0 ueber WebSocket zum Kurento Media Server)
//!     +-- SimulierteEngine  (In-Process, fuer Tests und lokale Entwicklung)
//! ```
//!
//! Kandidaten-Events werden nicht ueber Callbacks pro Endpoint zugestellt,
//! sondern als geordneter Strom von `MedienEreignis`-Werten, die den
//! Endpoint explizit benennen. Der Signaling-Kern routet anhand dieser ID.

pub mod engine;
pub mod error;
pub mod kurento;
pub mod simulation;

// Bequeme Re-Exporte
pub use engine::{EreignisVerteiler, MedienEngine, MedienEreignis, MedienObjekt};
pub use error::{MedienFehler, MedienResult};
pub use kurento::KurentoEngine;
pub use simulation::{SimOperation, SimulierteEngine};
