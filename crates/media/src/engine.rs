//! Schnittstelle zur Media-Engine
//!
//! Der Signaling-Kern kennt nur diesen Trait. Welche Engine dahinter steht
//! (Kurento oder Simulation) entscheidet die Konfiguration beim Start.

use async_trait::async_trait;
use onair_core::types::{EndpointId, IceKandidat, PipelineId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::MedienResult;

/// Ein von der Media-Engine verwaltetes Objekt, das freigegeben werden kann
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MedienObjekt {
    Pipeline(PipelineId),
    Endpoint(EndpointId),
}

impl MedienObjekt {
    /// Opake Kennung des Objekts bei der Engine
    pub fn kennung(&self) -> &str {
        match self {
            Self::Pipeline(id) => id.as_str(),
            Self::Endpoint(id) => id.as_str(),
        }
    }
}

impl std::fmt::Display for MedienObjekt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipeline(id) => id.fmt(f),
            Self::Endpoint(id) => id.fmt(f),
        }
    }
}

/// Asynchrones Ereignis der Media-Engine
///
/// Ereignisse nennen immer den Endpoint, zu dem sie gehoeren. Die Zuordnung
/// zur Session erfolgt erst im Signaling-Kern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MedienEreignis {
    /// Die Engine hat einen lokalen ICE-Kandidaten fuer einen Endpoint gefunden
    KandidatGefunden {
        endpoint: EndpointId,
        kandidat: IceKandidat,
    },
}

impl MedienEreignis {
    pub fn endpoint(&self) -> &EndpointId {
        match self {
            Self::KandidatGefunden { endpoint, .. } => endpoint,
        }
    }
}

/// Operationen die der Signaling-Kern von einer Media-Engine benoetigt
///
/// Alle Methoden sind `&self` – Implementierungen muessen intern
/// synchronisieren und von beliebig vielen Tasks gleichzeitig nutzbar sein.
#[async_trait]
pub trait MedienEngine: Send + Sync + 'static {
    /// Erstellt eine neue Media-Pipeline
    async fn pipeline_erstellen(&self) -> MedienResult<PipelineId>;

    /// Erstellt einen WebRTC-Endpoint in der angegebenen Pipeline
    ///
    /// Kandidaten-Ereignisse dieses Endpoints werden ab hier geliefert.
    async fn endpoint_erstellen(
        &self,
        pipeline: &PipelineId,
        datenkanaele: bool,
    ) -> MedienResult<EndpointId>;

    /// Verarbeitet ein SDP-Angebot und liefert die SDP-Antwort
    async fn angebot_verarbeiten(
        &self,
        endpoint: &EndpointId,
        sdp_angebot: &str,
    ) -> MedienResult<String>;

    /// Startet die ICE-Kandidatensuche fuer einen Endpoint
    async fn kandidaten_sammeln(&self, endpoint: &EndpointId) -> MedienResult<()>;

    /// Verbindet den Medienausgang von `quelle` mit `senke`
    async fn verbinden(&self, quelle: &EndpointId, senke: &EndpointId) -> MedienResult<()>;

    /// Uebergibt einen entfernten ICE-Kandidaten an einen Endpoint
    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &EndpointId,
        kandidat: &IceKandidat,
    ) -> MedienResult<()>;

    /// Gibt ein Objekt frei. Bereits freigegebene Objekte gelten als Erfolg.
    async fn freigeben(&self, objekt: &MedienObjekt) -> MedienResult<()>;

    /// Neuer Empfaenger fuer alle kuenftigen Ereignisse (in Engine-Reihenfolge)
    fn ereignisse_abonnieren(&self) -> mpsc::UnboundedReceiver<MedienEreignis>;

    /// Gibt an ob die Engine derzeit erreichbar ist (fuer Health-Checks)
    fn ist_verfuegbar(&self) -> bool;
}

// ---------------------------------------------------------------------------
// EreignisVerteiler
// ---------------------------------------------------------------------------

/// Verteilt Engine-Ereignisse an alle Abonnenten
///
/// Geschlossene Empfaenger werden beim naechsten Senden entfernt.
#[derive(Default)]
pub struct EreignisVerteiler {
    abonnenten: Mutex<Vec<mpsc::UnboundedSender<MedienEreignis>>>,
}

impl EreignisVerteiler {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn abonnieren(&self) -> mpsc::UnboundedReceiver<MedienEreignis> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.abonnenten.lock().push(tx);
        rx
    }

    pub fn senden(&self, ereignis: MedienEreignis) {
        let mut abonnenten = self.abonnenten.lock();
        abonnenten.retain(|tx| tx.send(ereignis.clone()).is_ok());
        if abonnenten.is_empty() {
            tracing::trace!(endpoint = %ereignis.endpoint(), "Ereignis ohne Abonnenten verworfen");
        }
    }

    pub fn anzahl_abonnenten(&self) -> usize {
        self.abonnenten.lock().len()
    }
}
