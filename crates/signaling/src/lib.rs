//! onair-signaling – Signaling-Kern und WebSocket-Transport
//!
//! Vermittelt SDP-Angebote und ICE-Kandidaten zwischen einem Presenter und
//! beliebig vielen Viewern. Die eigentliche Medienverarbeitung uebernimmt
//! die Media-Engine hinter `onair_media::MedienEngine`.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket-Listener (SignalingServer, GET /call)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! SignalingCoordinator
//!     +-- RaumRegistry   (Presenter -> Raum, Viewer -> Presenter)
//!     +-- Session        (Send-Queue, eigener Endpoint)
//!     +-- MedienEngine   (Pipeline, Endpoints, SDP, ICE)
//!     +-- Ereignis-Router (Kandidaten nach EndpointId -> Session)
//! ```

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod server;
pub mod server_state;
pub mod session;

// Bequeme Re-Exporte
pub use connection::ClientConnection;
pub use coordinator::SignalingCoordinator;
pub use error::{SignalingError, SignalingResult};
pub use registry::{AufgeloesterRaum, RaumRegistry, RaumZugang};
pub use server::{signaling_router, SignalingServer};
pub use server_state::{SignalingConfig, SignalingState};
pub use session::{Rolle, Session, SEND_QUEUE_GROESSE};
