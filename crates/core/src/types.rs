//! Gemeinsame Identifikationstypen fuer onair
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Session-, Pipeline- und Endpoint-Kennungen zur Compilezeit auszuschliessen.
//! Pipeline- und Endpoint-IDs sind fuer den Signaling-Kern opak – sie werden
//! von der Media-Engine vergeben und unveraendert zurueckgereicht.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Kennung einer Client-Verbindung
///
/// Wird vom Transport vergeben und bleibt fuer die Lebensdauer der
/// Verbindung stabil. Der Presenter-Raum wird ueber diese Kennung adressiert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Uebernimmt eine vom Transport vorgegebene Kennung
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Erstellt eine neue zufaellige SessionId (UUIDv4)
    pub fn zufaellig() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Gibt die Kennung als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::neu(id)
    }
}

/// Opake Kennung einer Media-Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline:{}", self.0)
    }
}

/// Opake Kennung eines WebRTC-Endpoints innerhalb einer Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint:{}", self.0)
    }
}

/// ICE-Kandidat wie er zwischen Browser, Signaling und Media-Engine
/// ausgetauscht wird
///
/// Feldnamen entsprechen `RTCIceCandidateInit` (camelCase auf dem Draht).
/// Fehlende oder `null`-Werte bei `sdpMid`/`sdpMLineIndex` ergeben den
/// Standardwert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceKandidat {
    pub candidate: String,
    #[serde(default, deserialize_with = "null_als_standard")]
    pub sdp_mid: String,
    #[serde(default, deserialize_with = "null_als_standard")]
    pub sdp_m_line_index: u32,
}

fn null_als_standard<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_zufaellig_eindeutig() {
        let a = SessionId::zufaellig();
        let b = SessionId::zufaellig();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn session_id_display_ohne_praefix() {
        // Die SessionId wird Viewern als `target` mitgeteilt und muss roh bleiben
        let id = SessionId::neu("abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn endpoint_id_display() {
        let id = EndpointId::neu("e1");
        assert!(id.to_string().starts_with("endpoint:"));
    }

    #[test]
    fn session_id_serialisiert_transparent() {
        let id = SessionId::neu("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
    }

    #[test]
    fn ice_kandidat_camel_case() {
        let json = r#"{"candidate":"candidate:1 1 UDP 2122 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let k: IceKandidat = serde_json::from_str(json).unwrap();
        assert_eq!(k.sdp_mid, "0");
        assert_eq!(k.sdp_m_line_index, 0);

        let zurueck = serde_json::to_string(&k).unwrap();
        assert!(zurueck.contains("\"sdpMLineIndex\":0"));
    }

    #[test]
    fn ice_kandidat_null_felder_standardwerte() {
        let json = r#"{"candidate":"candidate:2 1 UDP 1 10.0.0.2 5002 typ host","sdpMid":null,"sdpMLineIndex":null}"#;
        let k: IceKandidat = serde_json::from_str(json).unwrap();
        assert_eq!(k.sdp_mid, "");
        assert_eq!(k.sdp_m_line_index, 0);
    }

    #[test]
    fn ice_kandidat_fehlende_felder_standardwerte() {
        let k: IceKandidat = serde_json::from_str(r#"{"candidate":"c"}"#).unwrap();
        assert_eq!(k.sdp_mid, "");
        assert_eq!(k.sdp_m_line_index, 0);
    }
}
