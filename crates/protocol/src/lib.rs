//! onair-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Browser-Client
//! und Server ueber die WebSocket-Verbindung ausgetauscht werden.

pub mod control;

pub use control::{Antwort, ClientNachricht, ServerNachricht};
